// ==========================================
// 标本导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 研究标本清单（制表符分隔）导入
// 管道: 加载 → 列名解析 → 逐行校验 → 事务提交
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 持久化端口与 SQLite 实现
pub mod repository;

// 导入层 - 导入管道
pub mod importer;

// 配置层 - 研究级配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 上传接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{CanonicalField, ColumnType, EntityKind, ImportMode, TimepointType};

// 领域实体
pub use domain::{
    CellValue, ColumnLabels, ImportBatch, ImportRequest, ImportSummary, RawRow, ResolvedRow,
    VialRecord,
};

// 导入管道
pub use importer::{ImportError, ImportResult, SpecimenImporter, SpecimenImporterImpl};

// API
pub use api::{SpecimenUploadApi, UploadResponse};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "specimen-import";
