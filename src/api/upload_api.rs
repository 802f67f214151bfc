// ==========================================
// 标本上传API
// ==========================================
// 职责: 封装标本上传、模板下载、批次查询
// 说明: 调用方已完成权限校验，actor 为操作人标识
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, StudyContextProvider};
use crate::db::configure_sqlite_connection;
use crate::domain::specimen::{ImportBatch, ImportRequest, ImportSummary, VialRecord};
use crate::domain::types::ImportMode;
use crate::importer::{template_header, ImportResult, SpecimenImporter, SpecimenImporterImpl};
use crate::repository::SqliteSpecimenStore;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// 上传响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// 是否全部写入成功
    pub success: bool,
    /// 批次ID（仅成功时）
    pub batch_id: Option<String>,
    /// 导入汇总（仅成功时）
    pub summary: Option<ImportSummary>,
    /// 有序错误消息（失败时非空）
    pub errors: Vec<String>,
}

impl UploadResponse {
    fn from_result(result: ImportResult<ImportSummary>) -> Self {
        match result {
            Ok(summary) => Self {
                success: true,
                batch_id: Some(summary.batch_id.clone()),
                summary: Some(summary),
                errors: Vec::new(),
            },
            Err(e) => Self {
                success: false,
                batch_id: None,
                summary: None,
                errors: e.messages(),
            },
        }
    }
}

/// 标本上传API（单个研究容器）
pub struct SpecimenUploadApi {
    store: Arc<SqliteSpecimenStore>,
    importer: SpecimenImporterImpl<Arc<SqliteSpecimenStore>, ConfigManager>,
    container_id: String,
}

impl SpecimenUploadApi {
    /// 创建新的 SpecimenUploadApi 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - container_id: 研究容器 ID
    pub fn new(db_path: &str, container_id: &str) -> ApiResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| ApiError::DatabaseError(format!("could not open {}: {}", db_path, e)))?;
        Self::from_connection(Arc::new(Mutex::new(conn)), container_id)
    }

    /// 从已有连接创建（配置与标本数据共用同一连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>, container_id: &str) -> ApiResult<Self> {
        if container_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("container id must not be empty".to_string()));
        }
        {
            let guard = conn
                .lock()
                .map_err(|e| ApiError::InternalError(e.to_string()))?;
            configure_sqlite_connection(&guard)
                .map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }

        let config = ConfigManager::from_connection(conn.clone(), container_id)?;
        let store = Arc::new(SqliteSpecimenStore::from_connection(conn));

        Ok(Self {
            importer: SpecimenImporterImpl::new(store.clone(), config),
            store,
            container_id: container_id.to_string(),
        })
    }

    fn request(actor: &str, mode: ImportMode) -> ApiResult<ImportRequest> {
        if actor.trim().is_empty() {
            return Err(ApiError::InvalidInput("actor must not be empty".to_string()));
        }
        Ok(ImportRequest::new(actor.trim(), mode))
    }

    /// 上传制表符分隔的标本清单
    ///
    /// # 返回
    /// - Ok(UploadResponse): 导入结果（失败原因在 errors 中）
    /// - Err(ApiError): 调用参数错误
    pub async fn upload_specimens(
        &self,
        text: &str,
        actor: &str,
        mode: ImportMode,
    ) -> ApiResult<UploadResponse> {
        let request = Self::request(actor, mode)?;
        let response = UploadResponse::from_result(self.importer.import_text(text, &request).await);
        info!(
            container = %self.container_id,
            success = response.success,
            errors = response.errors.len(),
            "上传处理完成"
        );
        Ok(response)
    }

    /// 上传标本文件（.tsv/.txt/.csv/.xlsx/.xls）
    pub async fn upload_file(
        &self,
        file_path: &Path,
        actor: &str,
        mode: ImportMode,
    ) -> ApiResult<UploadResponse> {
        let request = Self::request(actor, mode)?;
        Ok(UploadResponse::from_result(
            self.importer.import_file(file_path, &request).await,
        ))
    }

    /// 当前研究的上传模板表头
    pub async fn template(&self) -> ApiResult<String> {
        let ctx = self.importer_config().load_context().await?;
        Ok(template_header(ctx.timepoint_type, &ctx.subject_noun))
    }

    /// 最近的导入批次（本容器）
    pub fn recent_batches(&self, limit: usize) -> ApiResult<Vec<ImportBatch>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit must be positive".to_string()));
        }
        Ok(self.store.list_batches(Some(&self.container_id), limit)?)
    }

    /// 本容器的全部管记录
    pub fn list_vials(&self) -> ApiResult<Vec<VialRecord>> {
        Ok(self.store.list_vials(&self.container_id)?)
    }

    fn importer_config(&self) -> &ConfigManager {
        self.importer.config()
    }
}
