//! Helm RPC host: newline-delimited JSON requests on stdin, one JSON
//! response per line on stdout. The data directory comes from
//! `HELM_DATA_DIR`; `-v`/`--verbose` raises the log level. Nothing else is
//! configurable from the outside.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use helm_core::boundary::{
    InstalledPackageDto, ManagerStatusDto, OutdatedPackageDto, PinDto, PlanStepDto, SearchHitDto,
    TaskDto, TaskLogDto, TaskOutputDto, to_dtos,
};
use helm_core::engine::{CoreEngine, EngineConfig};
use helm_core::models::{CoreError, CoreResult, ManagerId, TaskId};

#[derive(Debug, Deserialize)]
struct Request {
    op: String,
    #[serde(default)]
    params: Value,
}

fn main() {
    let verbose = std::env::args()
        .skip(1)
        .any(|arg| arg == "-v" || arg == "--verbose");
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    runtime.block_on(async {
        let engine = match CoreEngine::open(EngineConfig::from_env()) {
            Ok(engine) => engine,
            Err(error) => {
                tracing::error!("engine init failed: {error}");
                std::process::exit(1);
            }
        };

        serve(engine).await;
    });
}

async fn serve(engine: Arc<CoreEngine>) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!("stdin read failed: {error}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                tracing::debug!(op = %request.op, "rpc request");
                match dispatch(&engine, &request).await {
                    Ok(result) => json!({ "ok": true, "result": result }),
                    Err(error) => {
                        tracing::debug!(op = %request.op, kind = error.kind.as_str(), "rpc error");
                        json!({
                            "ok": false,
                            "errorKey": error.error_key(),
                            "message": error.message,
                        })
                    }
                }
            }
            Err(error) => json!({
                "ok": false,
                "errorKey": "service.error.invalid_input",
                "message": format!("malformed request: {error}"),
            }),
        };

        let mut encoded = response.to_string();
        encoded.push('\n');
        if stdout.write_all(encoded.as_bytes()).await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

fn manager_param(params: &Value) -> CoreResult<ManagerId> {
    params
        .get("managerId")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| CoreError::invalid_input("missing or unknown 'managerId'"))
}

fn string_param(params: &Value, key: &str) -> CoreResult<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CoreError::invalid_input(format!("missing '{key}'")))
}

fn bool_param(params: &Value, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn u64_param(params: &Value, key: &str) -> CoreResult<u64> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| CoreError::invalid_input(format!("missing '{key}'")))
}

fn limit_param(params: &Value, default: usize) -> usize {
    params
        .get("limit")
        .and_then(Value::as_u64)
        .map(|limit| limit as usize)
        .unwrap_or(default)
}

async fn dispatch(engine: &Arc<CoreEngine>, request: &Request) -> CoreResult<Value> {
    let params = &request.params;
    match request.op.as_str() {
        "trigger_refresh" => Ok(json!(engine.trigger_refresh())),
        "list_tasks" => {
            let tasks = engine.list_tasks(limit_param(params, 200))?;
            Ok(serde_json::to_value(to_dtos::<_, TaskDto>(&tasks)).unwrap_or_default())
        }
        "cancel_task" => {
            let task_id = TaskId(u64_param(params, "taskId")?);
            Ok(json!(engine.cancel_task(task_id).await))
        }
        "list_installed_packages" => {
            let packages = engine.list_installed_packages()?;
            Ok(
                serde_json::to_value(to_dtos::<_, InstalledPackageDto>(&packages))
                    .unwrap_or_default(),
            )
        }
        "list_outdated_packages" => {
            let packages = engine.list_outdated_packages()?;
            Ok(
                serde_json::to_value(to_dtos::<_, OutdatedPackageDto>(&packages))
                    .unwrap_or_default(),
            )
        }
        "list_manager_status" => {
            let statuses = engine.list_manager_status()?;
            Ok(serde_json::to_value(to_dtos::<_, ManagerStatusDto>(&statuses))
                .unwrap_or_default())
        }
        "set_manager_enabled" => {
            let manager = manager_param(params)?;
            engine.set_manager_enabled(manager, bool_param(params, "enabled"))?;
            Ok(json!(true))
        }
        "search_local" => {
            let query = string_param(params, "query")?;
            let hits = engine.search_local(&query)?;
            Ok(serde_json::to_value(to_dtos::<_, SearchHitDto>(&hits)).unwrap_or_default())
        }
        "trigger_remote_search_for_manager" => {
            let manager = manager_param(params)?;
            let query = string_param(params, "query")?;
            let task_id = engine.trigger_remote_search_for_manager(manager, &query).await?;
            Ok(json!(task_id.0))
        }
        "install_package" => {
            let manager = manager_param(params)?;
            let name = string_param(params, "packageName")?;
            let version = params
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_owned);
            let task_id = engine.install_package(manager, &name, version).await?;
            Ok(json!(task_id.0))
        }
        "uninstall_package" => {
            let manager = manager_param(params)?;
            let name = string_param(params, "packageName")?;
            let task_id = engine.uninstall_package(manager, &name).await?;
            Ok(json!(task_id.0))
        }
        "upgrade_package" => {
            let manager = manager_param(params)?;
            let name = string_param(params, "packageName")?;
            let task_id = engine.upgrade_package(manager, &name).await?;
            Ok(json!(task_id.0))
        }
        "pin_package" => {
            let manager = manager_param(params)?;
            let name = string_param(params, "packageName")?;
            let version = params
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_owned);
            Ok(json!(engine.pin_package(manager, &name, version).await?))
        }
        "unpin_package" => {
            let manager = manager_param(params)?;
            let name = string_param(params, "packageName")?;
            Ok(json!(engine.unpin_package(manager, &name).await?))
        }
        "list_pins" => {
            let pins = engine.list_pins()?;
            Ok(serde_json::to_value(to_dtos::<_, PinDto>(&pins)).unwrap_or_default())
        }
        "install_manager" => {
            let manager = manager_param(params)?;
            Ok(json!(engine.install_manager(manager).await?.0))
        }
        "update_manager" => {
            let manager = manager_param(params)?;
            Ok(json!(engine.update_manager(manager).await?.0))
        }
        "uninstall_manager" => {
            let manager = manager_param(params)?;
            Ok(json!(engine.uninstall_manager(manager).await?.0))
        }
        "upgrade_all" => {
            let batch_id = engine.upgrade_all(
                bool_param(params, "includePinned"),
                bool_param(params, "allowOsUpdates"),
            )?;
            Ok(json!(batch_id))
        }
        "preview_upgrade_plan" => {
            let plan = engine.preview_upgrade_plan(
                bool_param(params, "includePinned"),
                bool_param(params, "allowOsUpdates"),
            )?;
            Ok(serde_json::to_value(to_dtos::<_, PlanStepDto>(&plan)).unwrap_or_default())
        }
        "cancel_remaining_upgrades" => {
            Ok(json!(engine.cancel_remaining_upgrades().await?))
        }
        "get_safe_mode" => Ok(json!(engine.get_safe_mode()?)),
        "set_safe_mode" => Ok(json!(engine.set_safe_mode(bool_param(params, "enabled"))?)),
        "get_homebrew_keg_auto_cleanup" => Ok(json!(engine.get_homebrew_keg_auto_cleanup()?)),
        "set_homebrew_keg_auto_cleanup" => Ok(json!(
            engine.set_homebrew_keg_auto_cleanup(bool_param(params, "enabled"))?
        )),
        "list_package_keg_policies" => {
            let policies = engine.list_package_keg_policies()?;
            let encoded: Vec<Value> = policies
                .iter()
                .map(|entry| {
                    json!({
                        "managerId": entry.package.manager.as_str(),
                        "packageName": entry.package.name,
                        "policy": entry.policy.as_str(),
                    })
                })
                .collect();
            Ok(Value::Array(encoded))
        }
        "set_package_keg_policy" => {
            let manager = manager_param(params)?;
            let name = string_param(params, "packageName")?;
            let mode = params
                .get("mode")
                .and_then(Value::as_i64)
                .ok_or_else(|| CoreError::invalid_input("missing 'mode'"))?;
            Ok(json!(engine.set_package_keg_policy(manager, &name, mode)?))
        }
        "get_task_output" => {
            let task_id = TaskId(u64_param(params, "taskId")?);
            match engine.get_task_output(task_id)? {
                Some(output) => {
                    Ok(serde_json::to_value(TaskOutputDto::from(&output)).unwrap_or_default())
                }
                None => Ok(Value::Null),
            }
        }
        "list_task_logs" => {
            let task_id = TaskId(u64_param(params, "taskId")?);
            let logs = engine.list_task_logs(task_id, limit_param(params, 200))?;
            Ok(serde_json::to_value(to_dtos::<_, TaskLogDto>(&logs)).unwrap_or_default())
        }
        "take_last_error_key" => Ok(match engine.take_last_error_key() {
            Some(key) => Value::String(key),
            None => Value::Null,
        }),
        "reset_database" => Ok(json!(engine.reset_database()?)),
        other => Err(CoreError::invalid_input(format!("unknown operation '{other}'"))),
    }
}
