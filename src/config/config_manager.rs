// ==========================================
// 标本导入系统 - 配置管理器
// ==========================================
// 职责: 研究级配置加载、查询、写入
// 存储: config_kv 表 (scope_id = 容器 ID)
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::study_context_trait::{StudyContext, StudyContextProvider, DEFAULT_SUBJECT_NOUN};
use crate::db::open_sqlite_connection;
use crate::domain::types::TimepointType;
use crate::importer::file_parser::DEFAULT_INFER_ROWS;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
    container_id: String,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - container_id: 研究容器 ID（配置作用域）
    pub fn new(db_path: &str, container_id: impl Into<String>) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            container_id: container_id.into(),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(
        conn: Arc<Mutex<Connection>>,
        container_id: impl Into<String>,
    ) -> ConfigResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| ConfigError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self {
            conn,
            container_id: container_id.into(),
        })
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    fn lock(&self) -> ConfigResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取本容器的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.lock()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![self.container_id, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入本容器的配置值（UPSERT）
    pub fn set_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![self.container_id, key, value],
        )?;
        Ok(())
    }

    pub fn set_timepoint_type(&self, timepoint: TimepointType) -> ConfigResult<()> {
        self.set_value(config_keys::TIMEPOINT_TYPE, &timepoint.to_string())
    }

    pub fn set_subject_noun(&self, noun: &str) -> ConfigResult<()> {
        self.set_value(config_keys::SUBJECT_NOUN, noun.trim())
    }

    /// 获取本容器所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.lock()?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let config_map = stmt
            .query_map(params![self.container_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(json!(config_map).to_string())
    }

    // ===== 研究设置 =====

    /// 时间点类型：非 VISIT/DATE 视为配置错误（不回退默认值）
    pub fn get_timepoint_type(&self) -> ConfigResult<TimepointType> {
        let value = self.get_config_or_default(config_keys::TIMEPOINT_TYPE, "VISIT")?;
        TimepointType::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
            container_id: self.container_id.clone(),
            key: config_keys::TIMEPOINT_TYPE.to_string(),
            value,
        })
    }

    pub fn get_subject_noun(&self) -> ConfigResult<String> {
        let value = self.get_config_or_default(config_keys::SUBJECT_NOUN, DEFAULT_SUBJECT_NOUN)?;
        if value.trim().is_empty() {
            return Ok(DEFAULT_SUBJECT_NOUN.to_string());
        }
        Ok(value.trim().to_string())
    }

    pub fn get_strict_type_conversion(&self) -> ConfigResult<bool> {
        let value = self.get_config_or_default(config_keys::STRICT_TYPE_CONVERSION, "true")?;
        match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => {
                warn!(
                    config_key = config_keys::STRICT_TYPE_CONVERSION,
                    raw_value = %value,
                    "严格类型转换配置格式错误，使用默认值 true"
                );
                Ok(true)
            }
        }
    }

    pub fn get_type_inference_rows(&self) -> ConfigResult<usize> {
        let value = self.get_config_or_default(
            config_keys::TYPE_INFERENCE_ROWS,
            &DEFAULT_INFER_ROWS.to_string(),
        )?;
        match value.trim().parse::<usize>() {
            Ok(rows) if rows > 0 => Ok(rows),
            _ => {
                warn!(
                    config_key = config_keys::TYPE_INFERENCE_ROWS,
                    raw_value = %value,
                    "类型推断行数配置格式错误，使用默认值"
                );
                Ok(DEFAULT_INFER_ROWS)
            }
        }
    }
}

// ==========================================
// StudyContextProvider Trait 实现
// ==========================================
#[async_trait]
impl StudyContextProvider for ConfigManager {
    async fn load_context(&self) -> ConfigResult<StudyContext> {
        Ok(StudyContext {
            container_id: self.container_id.clone(),
            timepoint_type: self.get_timepoint_type()?,
            subject_noun: self.get_subject_noun()?,
            strict_type_conversion: self.get_strict_type_conversion()?,
            type_inference_rows: self.get_type_inference_rows()?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 研究时间点类型（VISIT / DATE）
    pub const TIMEPOINT_TYPE: &str = "timepoint_type";
    // 受试者称谓（模板表头使用）
    pub const SUBJECT_NOUN: &str = "subject_noun";

    // 导入解析
    pub const STRICT_TYPE_CONVERSION: &str = "strict_type_conversion";
    pub const TYPE_INFERENCE_ROWS: &str = "type_inference_rows";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn manager(container: &str) -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)), container).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_unconfigured() {
        let config = manager("study-a");
        let ctx = config.load_context().await.unwrap();

        assert_eq!(ctx.container_id, "study-a");
        assert_eq!(ctx.timepoint_type, TimepointType::Visit);
        assert_eq!(ctx.subject_noun, "Participant");
        assert!(ctx.strict_type_conversion);
        assert_eq!(ctx.type_inference_rows, DEFAULT_INFER_ROWS);
    }

    #[tokio::test]
    async fn test_set_and_read_back() {
        let config = manager("study-a");
        config.set_timepoint_type(TimepointType::Date).unwrap();
        config.set_subject_noun(" Mouse ").unwrap();
        config
            .set_value(config_keys::STRICT_TYPE_CONVERSION, "false")
            .unwrap();
        config.set_value(config_keys::TYPE_INFERENCE_ROWS, "0").unwrap();

        let ctx = config.load_context().await.unwrap();
        assert_eq!(ctx.timepoint_type, TimepointType::Date);
        assert_eq!(ctx.subject_noun, "Mouse");
        assert!(!ctx.strict_type_conversion);
        // 非法值回退默认
        assert_eq!(ctx.type_inference_rows, DEFAULT_INFER_ROWS);

        let snapshot = config.get_config_snapshot().unwrap();
        assert!(snapshot.contains("\"timepoint_type\":\"DATE\""));
    }

    #[tokio::test]
    async fn test_unknown_timepoint_type_is_error() {
        let config = manager("study-a");
        config.set_value(config_keys::TIMEPOINT_TYPE, "WEEKLY").unwrap();

        let err = config.load_context().await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_scopes_are_isolated() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let shared = Arc::new(Mutex::new(conn));
        let a = ConfigManager::from_connection(shared.clone(), "study-a").unwrap();
        let b = ConfigManager::from_connection(shared, "study-b").unwrap();

        a.set_timepoint_type(TimepointType::Date).unwrap();
        assert_eq!(a.get_timepoint_type().unwrap(), TimepointType::Date);
        assert_eq!(b.get_timepoint_type().unwrap(), TimepointType::Visit);
    }
}
