use crate::models::{
    CoreResult, InstalledPackage, ManagerId, OutdatedPackage, PackageRef, PinKind, PinRecord,
};
use crate::persistence::{PackageStore, PinStore};
use crate::sqlite::store::{
    SqliteStore, from_flag, normalize_text, parse_manager, time_from_unix, to_flag, unix_from_time,
};

impl PackageStore for SqliteStore {
    fn replace_installed(
        &self,
        manager: ManagerId,
        packages: &[InstalledPackage],
    ) -> CoreResult<()> {
        let rows: Vec<(String, Option<String>, bool)> = packages
            .iter()
            .map(|package| {
                (
                    package.package.name.clone(),
                    normalize_text(package.installed_version.clone()),
                    package.pinned,
                )
            })
            .collect();

        self.with_write("replace_installed", move |connection| {
            let transaction = connection.transaction()?;
            transaction.execute(
                "DELETE FROM installed_packages WHERE manager_id = ?1",
                [manager.as_str()],
            )?;
            {
                let mut statement = transaction.prepare(
                    "INSERT INTO installed_packages
                        (manager_id, package_name, installed_version, pinned, updated_at_unix)
                     VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now'))",
                )?;
                for (name, version, pinned) in &rows {
                    statement.execute((
                        manager.as_str(),
                        name.as_str(),
                        version.as_deref(),
                        to_flag(*pinned),
                    ))?;
                }
            }
            transaction.commit()
        })
    }

    fn replace_outdated(
        &self,
        manager: ManagerId,
        packages: &[OutdatedPackage],
    ) -> CoreResult<()> {
        let rows: Vec<(String, Option<String>, String, bool, bool)> = packages
            .iter()
            .map(|package| {
                (
                    package.package.name.clone(),
                    normalize_text(package.installed_version.clone()),
                    package.candidate_version.clone(),
                    package.pinned,
                    package.restart_required,
                )
            })
            .collect();

        self.with_write("replace_outdated", move |connection| {
            let transaction = connection.transaction()?;
            transaction.execute(
                "DELETE FROM outdated_packages WHERE manager_id = ?1",
                [manager.as_str()],
            )?;
            {
                let mut statement = transaction.prepare(
                    "INSERT INTO outdated_packages
                        (manager_id, package_name, installed_version, candidate_version,
                         pinned, restart_required, updated_at_unix)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, strftime('%s', 'now'))",
                )?;
                for (name, installed, candidate, pinned, restart) in &rows {
                    statement.execute((
                        manager.as_str(),
                        name.as_str(),
                        installed.as_deref(),
                        candidate.as_str(),
                        to_flag(*pinned),
                        to_flag(*restart),
                    ))?;
                }
            }
            transaction.commit()
        })
    }

    fn remove_outdated(&self, package: &PackageRef) -> CoreResult<()> {
        let manager = package.manager;
        let name = package.name.clone();
        self.with_write("remove_outdated", move |connection| {
            connection.execute(
                "DELETE FROM outdated_packages WHERE manager_id = ?1 AND package_name = ?2",
                (manager.as_str(), name.as_str()),
            )?;
            Ok(())
        })
    }

    fn list_installed(&self) -> CoreResult<Vec<InstalledPackage>> {
        self.with_read("list_installed", |connection| {
            let mut statement = connection.prepare(
                "SELECT manager_id, package_name, installed_version, pinned
                 FROM installed_packages
                 ORDER BY manager_id, package_name",
            )?;
            let rows = statement.query_map([], |row| {
                let manager: String = row.get(0)?;
                Ok(InstalledPackage {
                    package: PackageRef::new(parse_manager(&manager)?, row.get::<_, String>(1)?),
                    installed_version: row.get(2)?,
                    pinned: from_flag(row.get(3)?),
                })
            })?;
            rows.collect()
        })
    }

    fn list_outdated(&self) -> CoreResult<Vec<OutdatedPackage>> {
        self.with_read("list_outdated", |connection| {
            let mut statement = connection.prepare(
                "SELECT manager_id, package_name, installed_version, candidate_version,
                        pinned, restart_required
                 FROM outdated_packages
                 ORDER BY manager_id, package_name",
            )?;
            let rows = statement.query_map([], |row| {
                let manager: String = row.get(0)?;
                Ok(OutdatedPackage {
                    package: PackageRef::new(parse_manager(&manager)?, row.get::<_, String>(1)?),
                    installed_version: row.get(2)?,
                    candidate_version: row.get(3)?,
                    pinned: from_flag(row.get(4)?),
                    restart_required: from_flag(row.get(5)?),
                })
            })?;
            rows.collect()
        })
    }
}

impl PinStore for SqliteStore {
    fn upsert_pin(&self, pin: &PinRecord) -> CoreResult<()> {
        let manager = pin.package.manager;
        let name = pin.package.name.clone();
        let kind = pin.kind;
        let version = normalize_text(pin.version.clone());
        let pinned_at = unix_from_time(pin.pinned_at);

        self.with_write("upsert_pin", move |connection| {
            connection.execute(
                "INSERT INTO pin_records
                    (manager_id, package_name, pin_kind, pinned_version, pinned_at_unix)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(manager_id, package_name) DO UPDATE SET
                    pin_kind = excluded.pin_kind,
                    pinned_version = excluded.pinned_version,
                    pinned_at_unix = excluded.pinned_at_unix",
                (
                    manager.as_str(),
                    name.as_str(),
                    kind.as_str(),
                    version.as_deref(),
                    pinned_at,
                ),
            )?;
            Ok(())
        })
    }

    fn remove_pin(&self, package: &PackageRef) -> CoreResult<()> {
        let manager = package.manager;
        let name = package.name.clone();
        self.with_write("remove_pin", move |connection| {
            connection.execute(
                "DELETE FROM pin_records WHERE manager_id = ?1 AND package_name = ?2",
                (manager.as_str(), name.as_str()),
            )?;
            Ok(())
        })
    }

    fn pin_for(&self, package: &PackageRef) -> CoreResult<Option<PinRecord>> {
        let manager = package.manager;
        let name = package.name.clone();
        self.with_read("pin_for", move |connection| {
            let mut statement = connection.prepare(
                "SELECT manager_id, package_name, pin_kind, pinned_version, pinned_at_unix
                 FROM pin_records
                 WHERE manager_id = ?1 AND package_name = ?2",
            )?;
            let mut rows =
                statement.query_map((manager.as_str(), name.as_str()), pin_from_row)?;
            rows.next().transpose()
        })
    }

    fn list_pins(&self) -> CoreResult<Vec<PinRecord>> {
        self.with_read("list_pins", |connection| {
            let mut statement = connection.prepare(
                "SELECT manager_id, package_name, pin_kind, pinned_version, pinned_at_unix
                 FROM pin_records
                 ORDER BY manager_id, package_name",
            )?;
            let rows = statement.query_map([], pin_from_row)?;
            rows.collect()
        })
    }
}

fn pin_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PinRecord> {
    let manager: String = row.get(0)?;
    let kind: String = row.get(2)?;
    Ok(PinRecord {
        package: PackageRef::new(parse_manager(&manager)?, row.get::<_, String>(1)?),
        kind: kind.parse().unwrap_or(PinKind::Virtual),
        version: row.get(3)?,
        pinned_at: time_from_unix(row.get(4)?),
    })
}
