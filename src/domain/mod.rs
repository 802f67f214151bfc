// ==========================================
// 标本导入系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含校验规则
// ==========================================

pub mod specimen;
pub mod types;

// 重导出核心类型
pub use specimen::{
    CellValue, ColumnLabels, ImportBatch, ImportRequest, ImportSummary, RawRow, ResolvedRow,
    SpecimenIdentity, VialRecord,
};
pub use types::{CanonicalField, ColumnType, EntityKind, ImportMode, TimepointType};
