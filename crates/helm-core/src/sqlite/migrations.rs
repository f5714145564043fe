//! Numbered, reversible schema migrations. Each runs in its own transaction
//! and is recorded in `helm_schema_migrations`.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: Migration = Migration {
    version: 1,
    name: "core_package_state",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS installed_packages (
    manager_id TEXT NOT NULL,
    package_name TEXT NOT NULL,
    installed_version TEXT,
    pinned INTEGER NOT NULL DEFAULT 0,
    updated_at_unix INTEGER NOT NULL,
    PRIMARY KEY (manager_id, package_name)
);

CREATE TABLE IF NOT EXISTS outdated_packages (
    manager_id TEXT NOT NULL,
    package_name TEXT NOT NULL,
    installed_version TEXT,
    candidate_version TEXT NOT NULL,
    pinned INTEGER NOT NULL DEFAULT 0,
    restart_required INTEGER NOT NULL DEFAULT 0,
    updated_at_unix INTEGER NOT NULL,
    PRIMARY KEY (manager_id, package_name)
);

CREATE TABLE IF NOT EXISTS pin_records (
    manager_id TEXT NOT NULL,
    package_name TEXT NOT NULL,
    pin_kind TEXT NOT NULL,
    pinned_version TEXT,
    pinned_at_unix INTEGER NOT NULL,
    PRIMARY KEY (manager_id, package_name)
);

CREATE TABLE IF NOT EXISTS search_cache (
    source_manager TEXT NOT NULL,
    package_name TEXT NOT NULL,
    version TEXT,
    summary TEXT,
    origin_query TEXT NOT NULL,
    last_enriched_at_unix INTEGER NOT NULL,
    PRIMARY KEY (source_manager, package_name)
);

CREATE TABLE IF NOT EXISTS manager_status (
    manager_id TEXT PRIMARY KEY,
    detected INTEGER NOT NULL DEFAULT 0,
    version TEXT,
    executable_path TEXT,
    enabled INTEGER,
    last_seen_at_unix INTEGER NOT NULL
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS manager_status;
DROP TABLE IF EXISTS search_cache;
DROP TABLE IF EXISTS pin_records;
DROP TABLE IF EXISTS outdated_packages;
DROP TABLE IF EXISTS installed_packages;
"#,
};

const MIGRATION_0002: Migration = Migration {
    version: 2,
    name: "task_lifecycle",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS tasks (
    task_id INTEGER PRIMARY KEY,
    manager_id TEXT NOT NULL,
    task_type TEXT NOT NULL,
    status TEXT NOT NULL,
    label_key TEXT NOT NULL DEFAULT '',
    label_args TEXT NOT NULL DEFAULT '{}',
    created_at_unix INTEGER NOT NULL,
    terminal_at_unix INTEGER,
    error_kind TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_manager_status ON tasks (manager_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_created ON tasks (created_at_unix DESC);

CREATE TABLE IF NOT EXISTS task_output (
    task_id INTEGER PRIMARY KEY,
    stdout TEXT,
    stderr TEXT,
    exit_code INTEGER,
    truncated INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS task_logs (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at_unix INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_logs_task ON task_logs (task_id, log_id);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_task_logs_task;
DROP TABLE IF EXISTS task_logs;
DROP TABLE IF EXISTS task_output;
DROP INDEX IF EXISTS idx_tasks_created;
DROP INDEX IF EXISTS idx_tasks_manager_status;
DROP TABLE IF EXISTS tasks;
"#,
};

const MIGRATION_0003: Migration = Migration {
    version: 3,
    name: "policy_settings",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS app_settings (
    setting_key TEXT PRIMARY KEY,
    setting_value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS package_keg_policies (
    manager_id TEXT NOT NULL,
    package_name TEXT NOT NULL,
    policy TEXT NOT NULL,
    PRIMARY KEY (manager_id, package_name)
);
"#,
    down_sql: r#"
DROP TABLE IF EXISTS package_keg_policies;
DROP TABLE IF EXISTS app_settings;
"#,
};

const MIGRATIONS: [Migration; 3] = [MIGRATION_0001, MIGRATION_0002, MIGRATION_0003];

pub fn migrations() -> &'static [Migration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
