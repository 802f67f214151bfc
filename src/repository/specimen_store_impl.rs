// ==========================================
// 标本导入系统 - 持久化端口 SQLite 实现
// ==========================================
// 职责: 实现事务化写入 + 读侧查询（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================
// 事务持有连接锁直到提交/回滚，同一 Store 上的并发导入因此串行化，
// 其他连接也看不到未提交的部分数据
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::specimen::{ImportBatch, SpecimenIdentity, VialRecord};
use crate::domain::types::{EntityKind, ImportMode};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::specimen_store::{FieldValue, RowFields, SpecimenStore, StoreTransaction};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{ToSqlOutput, Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::Text(s.clone()),
            FieldValue::Integer(i) => Value::Integer(*i),
            FieldValue::Real(f) => Value::Real(*f),
            FieldValue::Timestamp(ts) => Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        }))
    }
}

fn parse_db_timestamp(raw: Option<String>) -> Option<NaiveDateTime> {
    raw.and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok())
}

fn parse_import_mode(raw: &str) -> ImportMode {
    match raw.trim().to_uppercase().as_str() {
        "MERGE" => ImportMode::Merge,
        _ => ImportMode::Replace,
    }
}

// ==========================================
// SqliteSpecimenStore
// ==========================================
pub struct SqliteSpecimenStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSpecimenStore {
    /// 创建新的 Store 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（测试与 CLI 共用连接时使用）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 统计容器内某类实体行数
    pub fn count_rows(&self, kind: EntityKind, container_id: &str) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE container_id = ?1",
            kind.table_name()
        );
        let count = conn.query_row(&sql, params![container_id], |row| row.get(0))?;
        Ok(count)
    }

    /// 查询容器内所有管（按管号排序）
    pub fn list_vials(&self, container_id: &str) -> RepositoryResult<Vec<VialRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT v.global_unique_id, v.sample_id, s.participant_id, s.visit,
                   s.draw_timestamp, v.volume, v.volume_units, s.primary_type,
                   s.additive_type, s.derivative_type, v.batch_id
            FROM vial v
            JOIN specimen s
              ON s.container_id = v.container_id AND s.sample_id = v.sample_id
            WHERE v.container_id = ?1
            ORDER BY v.global_unique_id
            "#,
        )?;

        let vials = stmt
            .query_map(params![container_id], |row| {
                Ok(VialRecord {
                    global_unique_id: row.get(0)?,
                    sample_id: row.get(1)?,
                    participant_id: row.get(2)?,
                    visit: row.get(3)?,
                    draw_timestamp: parse_db_timestamp(row.get(4)?),
                    volume: row.get(5)?,
                    volume_units: row.get(6)?,
                    primary_type: row.get(7)?,
                    additive_type: row.get(8)?,
                    derivative_type: row.get(9)?,
                    batch_id: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(vials)
    }

    /// 查询最近的导入批次
    ///
    /// # 参数
    /// - container_id: 为 None 时查询所有容器
    /// - limit: 返回记录数限制
    pub fn list_batches(
        &self,
        container_id: Option<&str>,
        limit: usize,
    ) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT batch_id, container_id, imported_by, mode, total_rows,
                   participant_count, specimen_count, vial_count, imported_at, elapsed_ms
            FROM import_batch
            WHERE ?1 IS NULL OR container_id = ?1
            ORDER BY imported_at DESC
            LIMIT ?2
            "#,
        )?;

        let batches = stmt
            .query_map(params![container_id, limit as i64], |row| {
                let imported_at: String = row.get(8)?;
                let mode: String = row.get(3)?;
                Ok(ImportBatch {
                    batch_id: row.get(0)?,
                    container_id: row.get(1)?,
                    imported_by: row.get(2)?,
                    mode: parse_import_mode(&mode),
                    total_rows: row.get(4)?,
                    participant_count: row.get(5)?,
                    specimen_count: row.get(6)?,
                    vial_count: row.get(7)?,
                    imported_at: DateTime::parse_from_rfc3339(&imported_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e))
                        })?,
                    elapsed_ms: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(batches)
    }
}

impl SpecimenStore for SqliteSpecimenStore {
    fn begin_transaction(
        &self,
        container_id: &str,
    ) -> RepositoryResult<Box<dyn StoreTransaction + '_>> {
        let conn = self.lock()?;
        // IMMEDIATE: 开启即占写锁，避免提交时才发现冲突
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        debug!(container_id = %container_id, "事务已开启");

        Ok(Box::new(SqliteTransaction {
            conn,
            container_id: container_id.to_string(),
            open: true,
        }))
    }
}

// ==========================================
// SqliteTransaction
// ==========================================
struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    container_id: String,
    open: bool,
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn insert_row(&mut self, kind: EntityKind, fields: RowFields) -> RepositoryResult<()> {
        let mut columns = Vec::with_capacity(fields.len() + 1);
        let mut values = Vec::with_capacity(fields.len() + 1);
        columns.push("container_id");
        values.push(FieldValue::Text(self.container_id.clone()));
        for (column, value) in fields {
            columns.push(column);
            values.push(value);
        }

        let placeholders = (1..=values.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT {}INTO {} ({}) VALUES ({})",
            if kind.ignore_existing() { "OR IGNORE " } else { "" },
            kind.table_name(),
            columns.join(", "),
            placeholders
        );

        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    fn find_specimen(&mut self, sample_id: &str) -> RepositoryResult<Option<SpecimenIdentity>> {
        let identity = self
            .conn
            .query_row(
                r#"
                SELECT participant_id, visit, draw_timestamp
                FROM specimen
                WHERE container_id = ?1 AND sample_id = ?2
                "#,
                params![self.container_id, sample_id],
                |row| {
                    Ok(SpecimenIdentity {
                        participant_id: row.get(0)?,
                        visit: row.get(1)?,
                        draw_timestamp: parse_db_timestamp(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(identity)
    }

    fn clear_container(&mut self) -> RepositoryResult<usize> {
        let mut deleted = 0;
        // 按外键依赖逆序删除
        for kind in [
            EntityKind::SpecimenEvent,
            EntityKind::Vial,
            EntityKind::Specimen,
            EntityKind::Participant,
        ] {
            let sql = format!("DELETE FROM {} WHERE container_id = ?1", kind.table_name());
            deleted += self.conn.execute(&sql, params![self.container_id])?;
        }
        Ok(deleted)
    }

    fn commit(mut self: Box<Self>) -> RepositoryResult<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        self.open = false;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> RepositoryResult<()> {
        self.open = false;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        // 未提交即丢弃：回滚，不留残余写入
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(container_id = %self.container_id, error = %e, "事务回滚失败");
            }
        }
    }
}
