//! C ABI facade over the Helm control-plane engine.
//!
//! One engine lives in a process-global slot behind a mutex; every export
//! recovers from lock poisoning instead of panicking across the boundary.
//! Data crosses as JSON-encoded UTF-8 `*mut c_char`; callers free returned
//! strings with [`helm_free_string`].

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use lazy_static::lazy_static;
use serde::Serialize;

use helm_core::boundary::{
    InstalledPackageDto, ManagerStatusDto, OutdatedPackageDto, PinDto, PlanStepDto, SearchHitDto,
    TaskDto, TaskLogDto, TaskOutputDto, to_dtos,
};
use helm_core::engine::{CoreEngine, EngineConfig};
use helm_core::models::{ManagerId, TaskId};

struct FfiState {
    engine: Arc<CoreEngine>,
    runtime: tokio::runtime::Runtime,
}

lazy_static! {
    static ref STATE: Mutex<Option<FfiState>> = Mutex::new(None);
    static ref LAST_ERROR_KEY: Mutex<Option<String>> = Mutex::new(None);
}

const LOCK_POISONED_ERROR_KEY: &str = "service.error.internal";

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            eprintln!("helm-ffi: recovering from poisoned mutex: {context}");
            if let Ok(mut key) = LAST_ERROR_KEY.try_lock() {
                *key = Some(LOCK_POISONED_ERROR_KEY.to_string());
            }
            poisoned.into_inner()
        }
    }
}

fn set_last_error_key(key: &str) {
    *lock_or_recover(&LAST_ERROR_KEY, "last_error_key") = Some(key.to_string());
}

fn with_engine<T>(operation: impl FnOnce(&FfiState) -> T) -> Option<T> {
    let guard = lock_or_recover(&STATE, "state");
    match guard.as_ref() {
        Some(state) => Some(operation(state)),
        None => {
            set_last_error_key("service.error.internal");
            None
        }
    }
}

fn json_out<T: Serialize>(value: &T) -> *mut c_char {
    let Ok(json) = serde_json::to_string(value) else {
        return std::ptr::null_mut();
    };
    match CString::new(json) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// # Safety
/// `value` must be null or a valid NUL-terminated string.
unsafe fn str_arg<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(value) }.to_str().ok()
}

unsafe fn manager_arg(value: *const c_char) -> Option<ManagerId> {
    unsafe { str_arg(value) }.and_then(|raw| raw.parse().ok())
}

fn task_id_or_error(result: Result<TaskId, helm_core::models::CoreError>) -> i64 {
    match result {
        Ok(task_id) => task_id.0 as i64,
        Err(error) => {
            set_last_error_key(error.error_key());
            -1
        }
    }
}

/// Initialize the engine against a data directory. Idempotent.
///
/// # Safety
/// `data_dir` must be a valid, non-null, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_init(data_dir: *const c_char) -> bool {
    let Some(dir) = (unsafe { str_arg(data_dir) }) else {
        return false;
    };

    let mut guard = lock_or_recover(&STATE, "state");
    if guard.is_some() {
        return true;
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("helm-ffi: failed to build tokio runtime: {error}");
            return false;
        }
    };

    let config = EngineConfig {
        data_dir: PathBuf::from(dir),
        warmup_search: false,
    };
    let engine = {
        let _entered = runtime.enter();
        CoreEngine::open(config)
    };

    match engine {
        Ok(engine) => {
            *guard = Some(FfiState { engine, runtime });
            true
        }
        Err(error) => {
            eprintln!("helm-ffi: engine init failed: {error}");
            false
        }
    }
}

/// Free a string previously returned by any `helm_*` export.
///
/// # Safety
/// `value` must be a pointer returned by this library, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_free_string(value: *mut c_char) {
    if !value.is_null() {
        drop(unsafe { CString::from_raw(value) });
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_trigger_refresh() -> i64 {
    with_engine(|state| {
        let _entered = state.runtime.enter();
        state.engine.trigger_refresh() as i64
    })
    .unwrap_or(-1)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_list_tasks(limit: i64) -> *mut c_char {
    with_engine(|state| {
        match state.engine.list_tasks(limit.max(0) as usize) {
            Ok(tasks) => json_out(&to_dtos::<_, TaskDto>(&tasks)),
            Err(error) => {
                set_last_error_key(error.error_key());
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_cancel_task(task_id: i64) -> bool {
    if task_id < 0 {
        return false;
    }
    with_engine(|state| {
        state
            .runtime
            .block_on(state.engine.cancel_task(TaskId(task_id as u64)))
    })
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_list_installed_packages() -> *mut c_char {
    with_engine(|state| match state.engine.list_installed_packages() {
        Ok(packages) => json_out(&to_dtos::<_, InstalledPackageDto>(&packages)),
        Err(error) => {
            set_last_error_key(error.error_key());
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_list_outdated_packages() -> *mut c_char {
    with_engine(|state| match state.engine.list_outdated_packages() {
        Ok(packages) => json_out(&to_dtos::<_, OutdatedPackageDto>(&packages)),
        Err(error) => {
            set_last_error_key(error.error_key());
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_list_manager_status() -> *mut c_char {
    with_engine(|state| match state.engine.list_manager_status() {
        Ok(statuses) => json_out(&to_dtos::<_, ManagerStatusDto>(&statuses)),
        Err(error) => {
            set_last_error_key(error.error_key());
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// # Safety
/// `manager_id` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_set_manager_enabled(
    manager_id: *const c_char,
    enabled: bool,
) -> bool {
    let Some(manager) = (unsafe { manager_arg(manager_id) }) else {
        set_last_error_key("service.error.invalid_input");
        return false;
    };
    with_engine(|state| state.engine.set_manager_enabled(manager, enabled).is_ok())
        .unwrap_or(false)
}

/// # Safety
/// `query` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_search_local(query: *const c_char) -> *mut c_char {
    let Some(query) = (unsafe { str_arg(query) }) else {
        return std::ptr::null_mut();
    };
    with_engine(|state| {
        let _entered = state.runtime.enter();
        match state.engine.search_local(query) {
            Ok(hits) => json_out(&to_dtos::<_, SearchHitDto>(&hits)),
            Err(error) => {
                set_last_error_key(error.error_key());
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// # Safety
/// `manager_id` and `query` must be valid, NUL-terminated UTF-8 C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_trigger_remote_search_for_manager(
    manager_id: *const c_char,
    query: *const c_char,
) -> i64 {
    let (Some(manager), Some(query)) =
        (unsafe { manager_arg(manager_id) }, unsafe { str_arg(query) })
    else {
        set_last_error_key("service.error.invalid_input");
        return -1;
    };
    with_engine(|state| {
        task_id_or_error(
            state
                .runtime
                .block_on(state.engine.trigger_remote_search_for_manager(manager, query)),
        )
    })
    .unwrap_or(-1)
}

/// # Safety
/// `manager_id` and `package_name` must be valid, NUL-terminated UTF-8 C
/// strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_install_package(
    manager_id: *const c_char,
    package_name: *const c_char,
) -> i64 {
    let (Some(manager), Some(name)) =
        (unsafe { manager_arg(manager_id) }, unsafe { str_arg(package_name) })
    else {
        set_last_error_key("service.error.invalid_input");
        return -1;
    };
    with_engine(|state| {
        task_id_or_error(
            state
                .runtime
                .block_on(state.engine.install_package(manager, name, None)),
        )
    })
    .unwrap_or(-1)
}

/// # Safety
/// `manager_id` and `package_name` must be valid, NUL-terminated UTF-8 C
/// strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_uninstall_package(
    manager_id: *const c_char,
    package_name: *const c_char,
) -> i64 {
    let (Some(manager), Some(name)) =
        (unsafe { manager_arg(manager_id) }, unsafe { str_arg(package_name) })
    else {
        set_last_error_key("service.error.invalid_input");
        return -1;
    };
    with_engine(|state| {
        task_id_or_error(
            state
                .runtime
                .block_on(state.engine.uninstall_package(manager, name)),
        )
    })
    .unwrap_or(-1)
}

/// # Safety
/// `manager_id` and `package_name` must be valid, NUL-terminated UTF-8 C
/// strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_upgrade_package(
    manager_id: *const c_char,
    package_name: *const c_char,
) -> i64 {
    let (Some(manager), Some(name)) =
        (unsafe { manager_arg(manager_id) }, unsafe { str_arg(package_name) })
    else {
        set_last_error_key("service.error.invalid_input");
        return -1;
    };
    with_engine(|state| {
        task_id_or_error(
            state
                .runtime
                .block_on(state.engine.upgrade_package(manager, name)),
        )
    })
    .unwrap_or(-1)
}

/// # Safety
/// `manager_id` and `package_name` must be valid, NUL-terminated UTF-8 C
/// strings; `version` may be null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_pin_package(
    manager_id: *const c_char,
    package_name: *const c_char,
    version: *const c_char,
) -> bool {
    let (Some(manager), Some(name)) =
        (unsafe { manager_arg(manager_id) }, unsafe { str_arg(package_name) })
    else {
        set_last_error_key("service.error.invalid_input");
        return false;
    };
    let version = unsafe { str_arg(version) }.map(str::to_owned);
    with_engine(|state| {
        state
            .runtime
            .block_on(state.engine.pin_package(manager, name, version))
            .unwrap_or(false)
    })
    .unwrap_or(false)
}

/// # Safety
/// `manager_id` and `package_name` must be valid, NUL-terminated UTF-8 C
/// strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_unpin_package(
    manager_id: *const c_char,
    package_name: *const c_char,
) -> bool {
    let (Some(manager), Some(name)) =
        (unsafe { manager_arg(manager_id) }, unsafe { str_arg(package_name) })
    else {
        set_last_error_key("service.error.invalid_input");
        return false;
    };
    with_engine(|state| {
        state
            .runtime
            .block_on(state.engine.unpin_package(manager, name))
            .unwrap_or(false)
    })
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_list_pins() -> *mut c_char {
    with_engine(|state| match state.engine.list_pins() {
        Ok(pins) => json_out(&to_dtos::<_, PinDto>(&pins)),
        Err(error) => {
            set_last_error_key(error.error_key());
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// # Safety
/// `manager_id` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_install_manager(manager_id: *const c_char) -> i64 {
    let Some(manager) = (unsafe { manager_arg(manager_id) }) else {
        set_last_error_key("service.error.invalid_input");
        return -1;
    };
    with_engine(|state| {
        task_id_or_error(state.runtime.block_on(state.engine.install_manager(manager)))
    })
    .unwrap_or(-1)
}

/// # Safety
/// `manager_id` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_update_manager(manager_id: *const c_char) -> i64 {
    let Some(manager) = (unsafe { manager_arg(manager_id) }) else {
        set_last_error_key("service.error.invalid_input");
        return -1;
    };
    with_engine(|state| {
        task_id_or_error(state.runtime.block_on(state.engine.update_manager(manager)))
    })
    .unwrap_or(-1)
}

/// # Safety
/// `manager_id` must be a valid, NUL-terminated UTF-8 C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_uninstall_manager(manager_id: *const c_char) -> i64 {
    let Some(manager) = (unsafe { manager_arg(manager_id) }) else {
        set_last_error_key("service.error.invalid_input");
        return -1;
    };
    with_engine(|state| {
        task_id_or_error(state.runtime.block_on(state.engine.uninstall_manager(manager)))
    })
    .unwrap_or(-1)
}

/// Returns the upgrade batch id, or -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn helm_upgrade_all(include_pinned: bool, allow_os_updates: bool) -> i64 {
    with_engine(|state| {
        let _entered = state.runtime.enter();
        match state.engine.upgrade_all(include_pinned, allow_os_updates) {
            Ok(batch_id) => batch_id as i64,
            Err(error) => {
                set_last_error_key(error.error_key());
                -1
            }
        }
    })
    .unwrap_or(-1)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_preview_upgrade_plan(
    include_pinned: bool,
    allow_os_updates: bool,
) -> *mut c_char {
    with_engine(|state| {
        match state.engine.preview_upgrade_plan(include_pinned, allow_os_updates) {
            Ok(plan) => json_out(&to_dtos::<_, PlanStepDto>(&plan)),
            Err(error) => {
                set_last_error_key(error.error_key());
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Returns the number of cancelled steps, or -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn helm_cancel_remaining_upgrades() -> i64 {
    with_engine(|state| {
        match state.runtime.block_on(state.engine.cancel_remaining_upgrades()) {
            Ok(cancelled) => cancelled as i64,
            Err(error) => {
                set_last_error_key(error.error_key());
                -1
            }
        }
    })
    .unwrap_or(-1)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_get_safe_mode() -> bool {
    with_engine(|state| state.engine.get_safe_mode().unwrap_or(false)).unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_set_safe_mode(enabled: bool) -> bool {
    with_engine(|state| state.engine.set_safe_mode(enabled).unwrap_or(false)).unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_get_homebrew_keg_auto_cleanup() -> bool {
    with_engine(|state| state.engine.get_homebrew_keg_auto_cleanup().unwrap_or(false))
        .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_set_homebrew_keg_auto_cleanup(enabled: bool) -> bool {
    with_engine(|state| {
        state
            .engine
            .set_homebrew_keg_auto_cleanup(enabled)
            .unwrap_or(false)
    })
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_list_package_keg_policies() -> *mut c_char {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct KegPolicyDto {
        manager_id: String,
        package_name: String,
        policy: String,
    }

    with_engine(|state| match state.engine.list_package_keg_policies() {
        Ok(policies) => {
            let dtos: Vec<KegPolicyDto> = policies
                .iter()
                .map(|entry| KegPolicyDto {
                    manager_id: entry.package.manager.as_str().to_string(),
                    package_name: entry.package.name.clone(),
                    policy: entry.policy.as_str().to_string(),
                })
                .collect();
            json_out(&dtos)
        }
        Err(error) => {
            set_last_error_key(error.error_key());
            std::ptr::null_mut()
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// `policy_mode`: `-1` clears the override, `0` keeps old kegs, `1` cleans
/// them up after upgrades.
///
/// # Safety
/// `manager_id` and `package_name` must be valid, NUL-terminated UTF-8 C
/// strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn helm_set_package_keg_policy(
    manager_id: *const c_char,
    package_name: *const c_char,
    policy_mode: i64,
) -> bool {
    let (Some(manager), Some(name)) =
        (unsafe { manager_arg(manager_id) }, unsafe { str_arg(package_name) })
    else {
        set_last_error_key("service.error.invalid_input");
        return false;
    };
    with_engine(|state| {
        state
            .engine
            .set_package_keg_policy(manager, name, policy_mode)
            .unwrap_or(false)
    })
    .unwrap_or(false)
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_get_task_output(task_id: i64) -> *mut c_char {
    if task_id < 0 {
        return std::ptr::null_mut();
    }
    with_engine(|state| {
        match state.engine.get_task_output(TaskId(task_id as u64)) {
            Ok(Some(output)) => json_out(&TaskOutputDto::from(&output)),
            Ok(None) => std::ptr::null_mut(),
            Err(error) => {
                set_last_error_key(error.error_key());
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_list_task_logs(task_id: i64, limit: i64) -> *mut c_char {
    if task_id < 0 {
        return std::ptr::null_mut();
    }
    with_engine(|state| {
        match state
            .engine
            .list_task_logs(TaskId(task_id as u64), limit.max(0) as usize)
        {
            Ok(logs) => json_out(&to_dtos::<_, TaskLogDto>(&logs)),
            Err(error) => {
                set_last_error_key(error.error_key());
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Drain the most recent localization-ready error key, if any.
#[unsafe(no_mangle)]
pub extern "C" fn helm_take_last_error_key() -> *mut c_char {
    let local = lock_or_recover(&LAST_ERROR_KEY, "last_error_key").take();
    let engine_key = with_engine(|state| state.engine.take_last_error_key()).flatten();

    match local.or(engine_key) {
        Some(key) => CString::new(key)
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn helm_reset_database() -> bool {
    with_engine(|state| state.engine.reset_database().unwrap_or(false)).unwrap_or(false)
}
