// ==========================================
// 标本导入系统 - 配置层
// ==========================================
// 职责: 研究级配置管理（时间点类型、受试者称谓、解析选项）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod error;
pub mod study_context_trait;

pub use config_manager::{config_keys, ConfigManager};
pub use error::{ConfigError, ConfigResult};
pub use study_context_trait::{StudyContext, StudyContextProvider, DEFAULT_SUBJECT_NOUN};
