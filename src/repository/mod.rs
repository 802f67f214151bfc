// ==========================================
// 标本导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供事务化写入端口与读侧查询,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod specimen_store;
pub mod specimen_store_impl;

pub use error::{RepositoryError, RepositoryResult};
pub use specimen_store::{FieldValue, RowFields, SpecimenStore, StoreTransaction};
pub use specimen_store_impl::SqliteSpecimenStore;
