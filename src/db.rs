// ==========================================
// 志愿者配对系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 幂等建表（CREATE TABLE IF NOT EXISTS），记录 schema_version
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project (
    project_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    finalized_at TEXT
);

CREATE TABLE IF NOT EXISTS client (
    client_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    src_id TEXT,
    gender TEXT,
    race TEXT,
    languages_json TEXT NOT NULL DEFAULT '[]',
    address TEXT,
    location TEXT NOT NULL,
    lat REAL,
    lon REAL
);
CREATE INDEX IF NOT EXISTS idx_client_project ON client(project_id);

CREATE TABLE IF NOT EXISTS volunteer (
    volunteer_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    email TEXT,
    languages_json TEXT NOT NULL DEFAULT '[]',
    regions_json TEXT NOT NULL DEFAULT '[]',
    available_days_json TEXT NOT NULL DEFAULT '[]',
    available_time TEXT,
    is_joining_as_group INTEGER NOT NULL DEFAULT 0,
    group_name TEXT,
    has_experience INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'PENDING',
    selected_for_training INTEGER NOT NULL DEFAULT 0,
    training_attended TEXT NOT NULL DEFAULT 'UNKNOWN'
);
CREATE INDEX IF NOT EXISTS idx_volunteer_project ON volunteer(project_id);

CREATE TABLE IF NOT EXISTS client_group (
    group_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    location TEXT NOT NULL,
    is_auto INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (project_id, name)
);

CREATE TABLE IF NOT EXISTS client_group_member (
    group_id TEXT NOT NULL REFERENCES client_group(group_id) ON DELETE CASCADE,
    client_id TEXT NOT NULL UNIQUE REFERENCES client(client_id) ON DELETE CASCADE,
    tier TEXT NOT NULL,
    position INTEGER NOT NULL,
    PRIMARY KEY (group_id, client_id)
);

CREATE TABLE IF NOT EXISTS volunteer_pair (
    pair_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
    volunteer1_id TEXT NOT NULL REFERENCES volunteer(volunteer_id),
    volunteer2_id TEXT NOT NULL REFERENCES volunteer(volunteer_id),
    compatibility_score REAL NOT NULL,
    is_manual INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    CHECK (volunteer1_id <> volunteer2_id)
);
CREATE INDEX IF NOT EXISTS idx_pair_project ON volunteer_pair(project_id);

-- volunteer_pair_id 不设外键: 删除配对后分配行保留为 NEEDS_REASSIGNMENT
CREATE TABLE IF NOT EXISTS assignment (
    assignment_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES project(project_id) ON DELETE CASCADE,
    client_id TEXT NOT NULL UNIQUE REFERENCES client(client_id) ON DELETE CASCADE,
    group_id TEXT NOT NULL REFERENCES client_group(group_id) ON DELETE CASCADE,
    volunteer_pair_id TEXT NOT NULL,
    language_match INTEGER NOT NULL,
    region_match INTEGER NOT NULL,
    language_match_pct REAL NOT NULL,
    region_match_pct REAL NOT NULL,
    confidence REAL NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE',
    assigned_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_assignment_group ON assignment(group_id);
CREATE INDEX IF NOT EXISTS idx_assignment_pair ON assignment(volunteer_pair_id);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    payload_json TEXT,
    detail TEXT
);
CREATE INDEX IF NOT EXISTS idx_action_log_project ON action_log(project_id, action_ts);

CREATE TABLE IF NOT EXISTS config_kv (
    project_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (project_id, key)
);
"#;

/// 幂等建表，并在首次建库时写入 schema_version
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    if read_schema_version(conn)?.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

/// 读取 schema_version（若表不存在或为空则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
