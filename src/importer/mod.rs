// ==========================================
// 标本导入系统 - 导入层
// ==========================================
// 职责: 制表符分隔的标本清单导入
// 管道: 加载 → 列名解析 → 逐行校验 → 事务提交
// 支持: TSV, CSV, Excel
// ==========================================

// 模块声明
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod import_committer;
pub mod specimen_importer_impl;
pub mod specimen_importer_trait;
pub mod specimen_validator;
pub mod template;

// 重导出核心类型
pub use error::{ImportError, ImportResult, ValidationError, ValidationErrors};
pub use field_mapper::{resolve_label, FieldMapper as FieldMapperImpl};
pub use file_parser::{ExcelParser, LoaderOptions, TabLoader, UniversalFileParser};
pub use import_committer::{CommitContext, ImportCommitter};
pub use specimen_importer_impl::SpecimenImporterImpl;
pub use specimen_validator::{SpecimenValidator, ValidatedBatch, MAX_VALIDATION_ERRORS};
pub use template::{template_columns, template_header};

// 重导出 Trait 接口
pub use specimen_importer_trait::{
    FieldMapper, FileParser, RowValidator, SpecimenImporter, TabularLoader,
};
