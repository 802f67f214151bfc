// ==========================================
// 标本导入系统 - API 层
// ==========================================
// 职责: 面向调用方（CLI/上层服务）的上传接口
// ==========================================

pub mod error;
pub mod upload_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use upload_api::{SpecimenUploadApi, UploadResponse};
