use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{
    CoreResult, DetectionInfo, KegPolicy, ManagerId, PackageKegPolicy, PackageRef,
};
use crate::persistence::StatusStore;
use crate::sqlite::store::{SqliteStore, from_flag, normalize_text, parse_manager, to_flag};

const SAFE_MODE_KEY: &str = "safe_mode";
const KEG_AUTO_CLEANUP_KEY: &str = "homebrew_keg_auto_cleanup";

impl StatusStore for SqliteStore {
    fn upsert_detection(&self, manager: ManagerId, info: &DetectionInfo) -> CoreResult<()> {
        let detected = info.installed;
        let version = normalize_text(info.version.clone());
        let executable_path = normalize_text(
            info.executable_path
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
        );

        self.with_write("upsert_detection", move |connection| {
            connection.execute(
                "INSERT INTO manager_status
                    (manager_id, detected, version, executable_path, last_seen_at_unix)
                 VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))
                 ON CONFLICT(manager_id) DO UPDATE SET
                    detected = excluded.detected,
                    version = excluded.version,
                    executable_path = excluded.executable_path,
                    last_seen_at_unix = excluded.last_seen_at_unix",
                (
                    manager.as_str(),
                    to_flag(detected),
                    version.as_deref(),
                    executable_path.as_deref(),
                ),
            )?;
            Ok(())
        })
    }

    fn list_detections(&self) -> CoreResult<Vec<(ManagerId, DetectionInfo)>> {
        self.with_read("list_detections", |connection| {
            let mut statement = connection.prepare(
                "SELECT manager_id, detected, version, executable_path FROM manager_status",
            )?;
            let rows = statement.query_map([], |row| {
                let manager: String = row.get(0)?;
                Ok((
                    parse_manager(&manager)?,
                    DetectionInfo {
                        installed: from_flag(row.get(1)?),
                        version: row.get(2)?,
                        executable_path: row
                            .get::<_, Option<String>>(3)?
                            .map(PathBuf::from),
                    },
                ))
            })?;
            rows.collect()
        })
    }

    fn detection_fresh(&self, manager: ManagerId, window_secs: i64) -> CoreResult<bool> {
        self.with_read("detection_fresh", move |connection| {
            let mut statement = connection.prepare(
                "SELECT 1 FROM manager_status
                 WHERE manager_id = ?1
                   AND last_seen_at_unix > strftime('%s', 'now') - ?2",
            )?;
            statement.exists((manager.as_str(), window_secs))
        })
    }

    fn set_manager_enabled(&self, manager: ManagerId, enabled: bool) -> CoreResult<()> {
        self.with_write("set_manager_enabled", move |connection| {
            connection.execute(
                "INSERT INTO manager_status (manager_id, detected, enabled, last_seen_at_unix)
                 VALUES (?1, 0, ?2, strftime('%s', 'now'))
                 ON CONFLICT(manager_id) DO UPDATE SET enabled = excluded.enabled",
                (manager.as_str(), to_flag(enabled)),
            )?;
            Ok(())
        })
    }

    fn manager_enabled_overrides(&self) -> CoreResult<HashMap<ManagerId, bool>> {
        self.with_read("manager_enabled_overrides", |connection| {
            let mut statement = connection.prepare(
                "SELECT manager_id, enabled FROM manager_status WHERE enabled IS NOT NULL",
            )?;
            let rows = statement.query_map([], |row| {
                let manager: String = row.get(0)?;
                Ok((parse_manager(&manager)?, from_flag(row.get(1)?)))
            })?;
            rows.collect()
        })
    }

    fn set_safe_mode(&self, enabled: bool) -> CoreResult<()> {
        self.set_setting(SAFE_MODE_KEY, if enabled { "1" } else { "0" })
    }

    fn safe_mode(&self) -> CoreResult<bool> {
        Ok(self.setting(SAFE_MODE_KEY)?.as_deref() == Some("1"))
    }

    fn set_keg_auto_cleanup(&self, enabled: bool) -> CoreResult<()> {
        self.set_setting(KEG_AUTO_CLEANUP_KEY, if enabled { "1" } else { "0" })
    }

    fn keg_auto_cleanup(&self) -> CoreResult<bool> {
        Ok(self.setting(KEG_AUTO_CLEANUP_KEY)?.as_deref() == Some("1"))
    }

    fn set_package_keg_policy(
        &self,
        package: &PackageRef,
        policy: Option<KegPolicy>,
    ) -> CoreResult<()> {
        let manager = package.manager;
        let name = package.name.clone();
        self.with_write("set_package_keg_policy", move |connection| {
            match policy {
                Some(policy) => {
                    connection.execute(
                        "INSERT INTO package_keg_policies (manager_id, package_name, policy)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(manager_id, package_name) DO UPDATE SET
                            policy = excluded.policy",
                        (manager.as_str(), name.as_str(), policy.as_str()),
                    )?;
                }
                None => {
                    connection.execute(
                        "DELETE FROM package_keg_policies
                         WHERE manager_id = ?1 AND package_name = ?2",
                        (manager.as_str(), name.as_str()),
                    )?;
                }
            }
            Ok(())
        })
    }

    fn package_keg_policy(&self, package: &PackageRef) -> CoreResult<Option<KegPolicy>> {
        let manager = package.manager;
        let name = package.name.clone();
        self.with_read("package_keg_policy", move |connection| {
            let mut statement = connection.prepare(
                "SELECT policy FROM package_keg_policies
                 WHERE manager_id = ?1 AND package_name = ?2",
            )?;
            let mut rows = statement.query_map((manager.as_str(), name.as_str()), |row| {
                let policy: String = row.get(0)?;
                Ok(policy.parse::<KegPolicy>().ok())
            })?;
            Ok(rows.next().transpose()?.flatten())
        })
    }

    fn list_package_keg_policies(&self) -> CoreResult<Vec<PackageKegPolicy>> {
        self.with_read("list_package_keg_policies", |connection| {
            let mut statement = connection.prepare(
                "SELECT manager_id, package_name, policy FROM package_keg_policies
                 ORDER BY manager_id, package_name",
            )?;
            let rows = statement.query_map([], |row| {
                let manager: String = row.get(0)?;
                let name: String = row.get(1)?;
                let policy: String = row.get(2)?;
                Ok((parse_manager(&manager)?, name, policy))
            })?;

            let mut policies = Vec::new();
            for row in rows {
                let (manager, name, policy) = row?;
                // Unknown policy strings are dropped, not fatal.
                if let Ok(policy) = policy.parse::<KegPolicy>() {
                    policies.push(PackageKegPolicy {
                        package: PackageRef::new(manager, name),
                        policy,
                    });
                }
            }
            Ok(policies)
        })
    }
}

impl SqliteStore {
    fn set_setting(&self, key: &'static str, value: &str) -> CoreResult<()> {
        let value = value.to_owned();
        self.with_write("set_setting", move |connection| {
            connection.execute(
                "INSERT INTO app_settings (setting_key, setting_value) VALUES (?1, ?2)
                 ON CONFLICT(setting_key) DO UPDATE SET setting_value = excluded.setting_value",
                (key, value.as_str()),
            )?;
            Ok(())
        })
    }

    fn setting(&self, key: &'static str) -> CoreResult<Option<String>> {
        self.with_read("setting", move |connection| {
            let mut statement = connection
                .prepare("SELECT setting_value FROM app_settings WHERE setting_key = ?1")?;
            let mut rows = statement.query_map([key], |row| row.get::<_, String>(0))?;
            rows.next().transpose()
        })
    }
}
