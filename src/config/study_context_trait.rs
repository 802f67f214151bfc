// ==========================================
// 标本导入系统 - 研究上下文读取 Trait
// ==========================================
// 职责: 定义导入管道所需的研究级配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::error::ConfigResult;
use crate::domain::types::TimepointType;
use crate::importer::file_parser::DEFAULT_INFER_ROWS;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 默认受试者称谓
pub const DEFAULT_SUBJECT_NOUN: &str = "Participant";

// ==========================================
// StudyContext - 单个研究容器的导入上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyContext {
    pub container_id: String,
    pub timepoint_type: TimepointType,
    pub subject_noun: String,
    pub strict_type_conversion: bool,
    pub type_inference_rows: usize,
}

impl StudyContext {
    /// 以默认设置创建（访视制、严格类型转换）
    pub fn new(container_id: impl Into<String>, timepoint_type: TimepointType) -> Self {
        Self {
            container_id: container_id.into(),
            timepoint_type,
            subject_noun: DEFAULT_SUBJECT_NOUN.to_string(),
            strict_type_conversion: true,
            type_inference_rows: DEFAULT_INFER_ROWS,
        }
    }
}

// ==========================================
// StudyContextProvider Trait
// ==========================================
// 用途: 每次导入开始时读取一次研究上下文
// 实现者: ConfigManager（config_kv 表）, StudyContext（固定值）
#[async_trait]
pub trait StudyContextProvider: Send + Sync {
    /// 读取研究上下文
    ///
    /// # 返回
    /// - Err(ConfigError::InvalidValue): timepoint_type 不是 VISIT/DATE
    async fn load_context(&self) -> ConfigResult<StudyContext>;
}

#[async_trait]
impl StudyContextProvider for StudyContext {
    async fn load_context(&self) -> ConfigResult<StudyContext> {
        Ok(self.clone())
    }
}
