// ==========================================
// 标本导入系统 - 导入管道 Trait
// ==========================================
// 职责: 定义导入各阶段接口（不包含实现）
// 管道: 加载 → 列名解析 → 逐行校验 → 提交
// ==========================================

use crate::domain::specimen::{ColumnLabels, ImportRequest, ImportSummary, RawRow, ResolvedRow};
use crate::domain::types::TimepointType;
use crate::importer::error::{ImportResult, ValidationErrors};
use crate::importer::file_parser::LoaderOptions;
use crate::importer::specimen_validator::ValidatedBatch;
use async_trait::async_trait;
use std::path::Path;

// ==========================================
// SpecimenImporter Trait
// ==========================================
// 用途: 标本导入主接口
// 实现者: SpecimenImporterImpl
#[async_trait]
pub trait SpecimenImporter: Send + Sync {
    /// 导入一段分隔文本（默认制表符分隔，首行为表头）
    ///
    /// # 返回
    /// - Ok(ImportSummary): 全部写入成功
    /// - Err: 加载/校验/持久化错误，数据库无任何改动
    async fn import_text(
        &self,
        text: &str,
        request: &ImportRequest,
    ) -> ImportResult<ImportSummary>;

    /// 从文件导入（.tsv/.txt/.csv/.xlsx/.xls）
    async fn import_file(
        &self,
        file_path: &Path,
        request: &ImportRequest,
    ) -> ImportResult<ImportSummary>;

    /// 批量导入多个文本（并发执行）
    ///
    /// # 说明
    /// - 每个文本的导入是独立的，互不影响
    /// - 结果顺序与输入顺序一致
    async fn batch_import(
        &self,
        documents: Vec<String>,
        request: &ImportRequest,
    ) -> Vec<ImportResult<ImportSummary>>;
}

// ==========================================
// TabularLoader Trait
// ==========================================
// 用途: 分隔文本解析（阶段 1）
// 实现者: TabLoader
pub trait TabularLoader: Send + Sync {
    /// 解析文本为带类型的原始行
    ///
    /// # 返回
    /// - Ok(Vec<RawRow>): 行号从 1 开始（不含表头）
    /// - Err: 格式错误、严格模式下的类型转换错误
    fn load(&self, text: &str, options: &LoaderOptions) -> ImportResult<Vec<RawRow>>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析（阶段 1，文件入口）
// 实现者: UniversalFileParser, ExcelParser
pub trait FileParser: Send + Sync {
    fn parse_file(&self, file_path: &Path, options: &LoaderOptions) -> ImportResult<Vec<RawRow>>;
}

// ==========================================
// FieldMapper Trait
// ==========================================
// 用途: 列名别名解析（阶段 2）
// 实现者: FieldMapper
pub trait FieldMapper: Send + Sync {
    /// 将原始行的列名解析为标准字段
    ///
    /// # 返回
    /// - 解析后的行（未识别列保留在 extras）
    /// - 每个标准字段对应的上传列名（用于错误消息）
    fn resolve_rows(&self, rows: Vec<RawRow>) -> (Vec<ResolvedRow>, ColumnLabels);
}

// ==========================================
// RowValidator Trait
// ==========================================
// 用途: 逐行业务校验（阶段 3）
// 实现者: SpecimenValidator
pub trait RowValidator: Send + Sync {
    /// 校验整批数据
    ///
    /// # 返回
    /// - Ok(ValidatedBatch): 无错误，可提交
    /// - Err(ValidationErrors): 有序错误列表（有上限）
    fn validate(
        &self,
        rows: Vec<ResolvedRow>,
        labels: ColumnLabels,
        timepoint: TimepointType,
    ) -> Result<ValidatedBatch, ValidationErrors>;
}
