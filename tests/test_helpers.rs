// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、研究配置、测试数据等功能
// ==========================================

#![allow(dead_code)]

use rusqlite::Connection;
use specimen_import::config::ConfigManager;
use specimen_import::db::{init_schema, open_sqlite_connection};
use specimen_import::domain::types::TimepointType;
use specimen_import::importer::SpecimenImporterImpl;
use specimen_import::repository::SqliteSpecimenStore;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const TEST_CONTAINER: &str = "study-a";

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("temp path is not utf-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 写入研究配置
pub fn insert_test_config(
    conn: &Connection,
    container_id: &str,
    timepoint: TimepointType,
) -> Result<(), Box<dyn Error>> {
    conn.execute(
        "INSERT OR REPLACE INTO config_kv (scope_id, key, value) VALUES (?1, 'timepoint_type', ?2)",
        rusqlite::params![container_id, timepoint.to_string()],
    )?;
    Ok(())
}

/// 打开共享连接（导入器与断言查询共用）
pub fn shared_connection(db_path: &str) -> Arc<Mutex<Connection>> {
    let conn = open_sqlite_connection(db_path).expect("Failed to open db");
    Arc::new(Mutex::new(conn))
}

/// 创建测试用的 SpecimenImporter（配置读自 config_kv）
pub fn create_test_importer(
    db_path: &str,
    timepoint: TimepointType,
) -> SpecimenImporterImpl<Arc<SqliteSpecimenStore>, ConfigManager> {
    let conn = shared_connection(db_path);
    {
        let guard = conn.lock().expect("lock");
        insert_test_config(&guard, TEST_CONTAINER, timepoint).expect("Failed to insert config");
    }
    let config =
        ConfigManager::from_connection(conn.clone(), TEST_CONTAINER).expect("Failed to create config");
    let store = Arc::new(SqliteSpecimenStore::from_connection(conn));
    SpecimenImporterImpl::new(store, config)
}

/// 测试数据文件路径
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/specimens")
        .join(name)
}

/// 读取测试数据文件
pub fn fixture_text(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).expect("Failed to read fixture")
}

/// 生成 n 行合法的访视制数据（受试者/样本/管号带前缀，便于并发批次互不冲突）
pub fn generate_visit_rows(prefix: &str, n: usize) -> String {
    let mut text =
        String::from("Participant Id\tSequence Num\tdraw Timestamp\tspecimen Number\tglobal Unique Id\ttotal Volume\n");
    for i in 1..=n {
        text.push_str(&format!(
            "{p}-P{ptid}\t{visit}\t2024-02-{day:02} 08:00\t{p}-S{i}\t{p}-V{i}\t1.5\n",
            p = prefix,
            ptid = (i - 1) / 4 + 1,
            visit = (i - 1) % 4 + 1,
            day = (i - 1) % 28 + 1,
            i = i,
        ));
    }
    text
}
