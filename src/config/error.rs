// ==========================================
// 标本导入系统 - 配置层错误类型
// ==========================================

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read study configuration: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("could not acquire configuration lock: {0}")]
    LockError(String),

    /// 研究未配置合法的时间点类型（访视制/日期制）
    #[error("invalid value \"{value}\" for setting {key} in container {container_id}")]
    InvalidValue {
        container_id: String,
        key: String,
        value: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
