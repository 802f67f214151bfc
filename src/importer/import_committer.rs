// ==========================================
// 标本导入系统 - 导入提交器
// ==========================================
// 职责: 将校验通过的批次在单个事务内写入持久化端口
// 写入顺序: [清空容器] → 受试者 → 样本 → 管 → 事件 → 批次记录
// 红线: 任一写入失败即整体回滚，不留部分数据
// 红线: 样本号只能归属一个 (受试者, 访视键)，归属冲突同样回滚
// ==========================================

use crate::domain::specimen::{ImportSummary, ResolvedRow, SpecimenIdentity};
use crate::domain::types::{CanonicalField, EntityKind, ImportMode};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::specimen_validator::ValidatedBatch;
use crate::repository::{FieldValue, RepositoryError, SpecimenStore, StoreTransaction};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 事件类型：导入
pub const IMPORT_EVENT_TYPE: &str = "IMPORT";

/// 单次提交的上下文
#[derive(Debug, Clone)]
pub struct CommitContext {
    pub batch_id: String,
    pub container_id: String,
    pub actor: String,
    pub mode: ImportMode,
    pub started: Instant,
}

pub struct ImportCommitter;

impl ImportCommitter {
    /// 提交整批数据
    ///
    /// # 返回
    /// - Ok(ImportSummary): 事务已提交
    /// - Err(ImportError::Persistence): 事务已回滚
    pub fn commit(
        &self,
        store: &dyn SpecimenStore,
        batch: &ValidatedBatch,
        ctx: &CommitContext,
    ) -> ImportResult<ImportSummary> {
        let mut tx = store
            .begin_transaction(&ctx.container_id)
            .map_err(|e| persistence_error(None, e))?;

        match self.write_all(tx.as_mut(), batch, ctx) {
            Ok(summary) => {
                tx.commit().map_err(|e| persistence_error(None, e))?;
                info!(
                    batch_id = %summary.batch_id,
                    vials = summary.vials,
                    elapsed_ms = summary.elapsed_ms,
                    "事务已提交"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(batch_id = %ctx.batch_id, error = %e, "写入失败，回滚事务");
                if let Err(rb) = tx.rollback() {
                    warn!(batch_id = %ctx.batch_id, error = %rb, "事务回滚失败");
                }
                Err(e)
            }
        }
    }

    fn write_all(
        &self,
        tx: &mut dyn StoreTransaction,
        batch: &ValidatedBatch,
        ctx: &CommitContext,
    ) -> ImportResult<ImportSummary> {
        if ctx.mode == ImportMode::Replace {
            let removed = tx
                .clear_container()
                .map_err(|e| persistence_error(None, e))?;
            debug!(container_id = %ctx.container_id, removed = removed, "已清空容器旧数据");
        }

        let now = Utc::now();

        // === 受试者 ===
        let mut participants = HashSet::new();
        for row in &batch.rows {
            let Some(ptid) = row.get_key(CanonicalField::ParticipantId) else {
                continue;
            };
            if participants.insert(ptid.clone()) {
                tx.insert_row(
                    EntityKind::Participant,
                    vec![
                        ("participant_id", FieldValue::Text(ptid)),
                        ("created_at", FieldValue::Timestamp(now.naive_utc())),
                    ],
                )
                .map_err(|e| persistence_error(Some(row.row_number), e))?;
            }
        }

        // === 样本 ===
        // 样本键（样本号，缺省为管号）只能归属一个 (受试者, 访视键)
        let mut specimens: HashMap<String, (SpecimenIdentity, usize)> = HashMap::new();
        for row in &batch.rows {
            let sample_key = sample_key(row);
            let identity = SpecimenIdentity::from_row(row);

            if let Some((first, first_row)) = specimens.get(&sample_key) {
                if !first.same_sample(&identity, batch.timepoint) {
                    return Err(ownership_conflict(
                        row.row_number,
                        &sample_key,
                        format!("{} on row {}", first.describe(batch.timepoint), first_row),
                    ));
                }
                continue;
            }

            // MERGE: 库中已有同号样本时必须归属一致，一致则沿用
            if ctx.mode == ImportMode::Merge {
                let existing = tx
                    .find_specimen(&sample_key)
                    .map_err(|e| persistence_error(Some(row.row_number), e))?;
                if let Some(existing) = existing {
                    if !existing.same_sample(&identity, batch.timepoint) {
                        return Err(ownership_conflict(
                            row.row_number,
                            &sample_key,
                            format!("{} in an earlier import", existing.describe(batch.timepoint)),
                        ));
                    }
                    specimens.insert(sample_key, (identity, row.row_number));
                    continue;
                }
            }

            tx.insert_row(
                EntityKind::Specimen,
                vec![
                    ("sample_id", FieldValue::Text(sample_key.clone())),
                    ("participant_id", FieldValue::Text(identity.participant_id.clone())),
                    ("visit", FieldValue::from(identity.visit)),
                    ("draw_timestamp", FieldValue::from(identity.draw_timestamp)),
                    ("primary_type", text_field(row, CanonicalField::PrimarySpecimenType)),
                    ("additive_type", text_field(row, CanonicalField::AdditiveType)),
                    ("derivative_type", text_field(row, CanonicalField::DerivativeType)),
                ],
            )
            .map_err(|e| persistence_error(Some(row.row_number), e))?;
            specimens.insert(sample_key, (identity, row.row_number));
        }

        // === 管 ===
        let mut vial_ids = Vec::with_capacity(batch.rows.len());
        for row in &batch.rows {
            let vial_id = row
                .get_key(CanonicalField::VialId)
                .unwrap_or_else(|| sample_key(row));
            let extras_json = if row.extras.is_empty() {
                FieldValue::Null
            } else {
                let json = serde_json::to_string(&row.extras)
                    .map_err(|e| ImportError::InternalError(e.to_string()))?;
                FieldValue::Text(json)
            };

            tx.insert_row(
                EntityKind::Vial,
                vec![
                    ("global_unique_id", FieldValue::Text(vial_id.clone())),
                    ("sample_id", FieldValue::Text(sample_key(row))),
                    (
                        "volume",
                        FieldValue::from(row.get(CanonicalField::Volume).and_then(|v| v.as_f64())),
                    ),
                    ("volume_units", text_field(row, CanonicalField::Units)),
                    ("extras_json", extras_json),
                    ("batch_id", FieldValue::from(ctx.batch_id.as_str())),
                ],
            )
            .map_err(|e| persistence_error(Some(row.row_number), e))?;
            vial_ids.push((row.row_number, vial_id));
        }

        // === 事件 ===
        for (row_number, vial_id) in &vial_ids {
            tx.insert_row(
                EntityKind::SpecimenEvent,
                vec![
                    ("event_id", FieldValue::Text(Uuid::new_v4().to_string())),
                    ("global_unique_id", FieldValue::Text(vial_id.clone())),
                    ("batch_id", FieldValue::from(ctx.batch_id.as_str())),
                    ("event_type", FieldValue::from(IMPORT_EVENT_TYPE)),
                    ("recorded_by", FieldValue::from(ctx.actor.as_str())),
                    ("recorded_at", FieldValue::Timestamp(now.naive_utc())),
                ],
            )
            .map_err(|e| persistence_error(Some(*row_number), e))?;
        }

        // === 批次记录 ===
        let elapsed_ms = ctx.started.elapsed().as_millis() as i64;
        tx.insert_row(
            EntityKind::ImportBatch,
            vec![
                ("batch_id", FieldValue::from(ctx.batch_id.as_str())),
                ("imported_by", FieldValue::from(ctx.actor.as_str())),
                ("mode", FieldValue::Text(ctx.mode.to_string())),
                ("total_rows", FieldValue::Integer(batch.rows.len() as i64)),
                ("participant_count", FieldValue::Integer(participants.len() as i64)),
                ("specimen_count", FieldValue::Integer(specimens.len() as i64)),
                ("vial_count", FieldValue::Integer(vial_ids.len() as i64)),
                ("imported_at", FieldValue::Text(now.to_rfc3339())),
                ("elapsed_ms", FieldValue::Integer(elapsed_ms)),
            ],
        )
        .map_err(|e| persistence_error(None, e))?;

        Ok(ImportSummary {
            batch_id: ctx.batch_id.clone(),
            container_id: ctx.container_id.clone(),
            rows: batch.rows.len(),
            participants: participants.len(),
            specimens: specimens.len(),
            vials: vial_ids.len(),
            events: vial_ids.len(),
            elapsed_ms,
        })
    }
}

/// 样本键：SampleId，缺省时退回 VialId
fn sample_key(row: &ResolvedRow) -> String {
    row.get_key(CanonicalField::SampleId)
        .or_else(|| row.get_key(CanonicalField::VialId))
        .unwrap_or_default()
}

fn text_field(row: &ResolvedRow, field: CanonicalField) -> FieldValue {
    FieldValue::from(row.get_key(field))
}

fn ownership_conflict(row: usize, sample_key: &str, owner: String) -> ImportError {
    ImportError::Persistence {
        message: format!(
            "Row {}: specimen {} is already recorded for {}.",
            row, sample_key, owner
        ),
    }
}

fn persistence_error(row: Option<usize>, err: RepositoryError) -> ImportError {
    let message = match row {
        Some(row) => format!("Row {}: {}", row, err),
        None => err.to_string(),
    };
    ImportError::Persistence { message }
}
