// ==========================================
// 标本导入系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键/busy_timeout）
// - 提供建表脚本，供 CLI init-db 与测试共用
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::time::Duration;

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "SPECIMEN_IMPORT_DB_PATH";

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 建表脚本（幂等）
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS participant (
    container_id TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (container_id, participant_id)
);

CREATE TABLE IF NOT EXISTS specimen (
    container_id TEXT NOT NULL,
    sample_id TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    visit REAL,
    draw_timestamp TEXT,
    primary_type TEXT,
    additive_type TEXT,
    derivative_type TEXT,
    PRIMARY KEY (container_id, sample_id),
    FOREIGN KEY (container_id, participant_id)
        REFERENCES participant(container_id, participant_id)
);

CREATE TABLE IF NOT EXISTS vial (
    container_id TEXT NOT NULL,
    global_unique_id TEXT NOT NULL,
    sample_id TEXT NOT NULL,
    volume REAL,
    volume_units TEXT,
    extras_json TEXT,
    batch_id TEXT NOT NULL,
    PRIMARY KEY (container_id, global_unique_id),
    FOREIGN KEY (container_id, sample_id)
        REFERENCES specimen(container_id, sample_id)
);

CREATE TABLE IF NOT EXISTS specimen_event (
    event_id TEXT PRIMARY KEY,
    container_id TEXT NOT NULL,
    global_unique_id TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    recorded_by TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    FOREIGN KEY (container_id, global_unique_id)
        REFERENCES vial(container_id, global_unique_id)
);

CREATE TABLE IF NOT EXISTS import_batch (
    batch_id TEXT PRIMARY KEY,
    container_id TEXT NOT NULL,
    imported_by TEXT NOT NULL,
    mode TEXT NOT NULL CHECK (mode IN ('REPLACE', 'MERGE')),
    total_rows INTEGER NOT NULL,
    participant_count INTEGER NOT NULL,
    specimen_count INTEGER NOT NULL,
    vial_count INTEGER NOT NULL,
    imported_at TEXT NOT NULL,
    elapsed_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vial_sample ON vial(container_id, sample_id);
CREATE INDEX IF NOT EXISTS idx_event_batch ON specimen_event(batch_id);
CREATE INDEX IF NOT EXISTS idx_batch_container ON import_batch(container_id, imported_at);

INSERT OR IGNORE INTO schema_version (version) VALUES (1);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
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

/// 初始化 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

/// 读取 schema_version（若表不存在则返回 None）
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

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 SPECIMEN_IMPORT_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./specimen_import.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("specimen-import");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("specimen_import.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(
            read_schema_version(&conn).unwrap(),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }
}
