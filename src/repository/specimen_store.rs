// ==========================================
// 标本导入系统 - 持久化端口 Trait
// ==========================================
// 职责: 定义事务化写入接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据写入
// ==========================================
// 提交器只依赖本端口，不依赖具体存储
// ==========================================

use crate::domain::specimen::SpecimenIdentity;
use crate::domain::types::EntityKind;
use crate::repository::error::RepositoryResult;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// 写入字段值（与存储无关）
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Timestamp(NaiveDateTime),
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map(FieldValue::Real).unwrap_or(FieldValue::Null)
    }
}

impl From<Option<NaiveDateTime>> for FieldValue {
    fn from(value: Option<NaiveDateTime>) -> Self {
        value.map(FieldValue::Timestamp).unwrap_or(FieldValue::Null)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

/// 一行待写入字段（列名 → 值），列名由调用方以常量给出
pub type RowFields = Vec<(&'static str, FieldValue)>;

// ==========================================
// SpecimenStore Trait
// ==========================================
// 用途: 开启容器级写事务
// 实现者: SqliteSpecimenStore
pub trait SpecimenStore: Send + Sync {
    /// 开启事务；事务内所有写入都归属 container_id
    ///
    /// # 返回
    /// - Ok(事务句柄)：未提交即丢弃时必须回滚
    /// - Err: 连接/锁错误
    fn begin_transaction(&self, container_id: &str)
        -> RepositoryResult<Box<dyn StoreTransaction + '_>>;
}

// 共享所有权的 Store（导入器与读侧查询共用同一连接）
impl<T: SpecimenStore + ?Sized> SpecimenStore for Arc<T> {
    fn begin_transaction(
        &self,
        container_id: &str,
    ) -> RepositoryResult<Box<dyn StoreTransaction + '_>> {
        (**self).begin_transaction(container_id)
    }
}

// ==========================================
// StoreTransaction Trait
// ==========================================
// 用途: 单个原子写事务
pub trait StoreTransaction {
    /// 插入一行（容器列由事务自动补齐）
    fn insert_row(&mut self, kind: EntityKind, fields: RowFields) -> RepositoryResult<()>;

    /// 查询本容器内已存在的样本归属（事务内可见未提交写入）
    fn find_specimen(&mut self, sample_id: &str) -> RepositoryResult<Option<SpecimenIdentity>>;

    /// 清空本容器的标本数据（受试者/样本/管/事件），返回删除行数
    fn clear_container(&mut self) -> RepositoryResult<usize>;

    /// 提交
    fn commit(self: Box<Self>) -> RepositoryResult<()>;

    /// 回滚
    fn rollback(self: Box<Self>) -> RepositoryResult<()>;
}
