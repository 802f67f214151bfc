// ==========================================
// 标本导入系统 - 行校验器实现
// ==========================================
// 职责: 必填 / 样本-访视一致性 / 管号缺省与唯一性
// ==========================================
// 红线: 校验器不触发任何持久化
// 红线: 数据问题一律累积为错误返回，不 panic
// 规则按输入顺序逐行执行，行号 1-based
// 累积满 MAX_VALIDATION_ERRORS 条后停止扫描
// ==========================================

use crate::domain::specimen::{CellValue, ColumnLabels, ResolvedRow};
use crate::domain::types::{CanonicalField, TimepointType};
use crate::importer::error::{ValidationError, ValidationErrors};
use crate::importer::specimen_importer_trait::RowValidator;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 错误累积上限（避免级联错误刷屏）
pub const MAX_VALIDATION_ERRORS: usize = 3;

/// 缺失管号在重复提示中的显示值
pub const MISSING_VALUE: &str = "<missing>";

// ==========================================
// ValidatedBatch - 校验通过的批次
// ==========================================
// rows 已应用 VialId 缺省（= SampleId）
#[derive(Debug, Clone)]
pub struct ValidatedBatch {
    pub rows: Vec<ResolvedRow>,
    pub labels: ColumnLabels,
    pub timepoint: TimepointType,
}

/// 样本身份：(受试者, 访视键取值)，按结构相等比较（含空值）
type SampleIdentity = (Option<String>, Option<CellValue>);

/// 有上限的错误累积器
struct ErrorAccumulator {
    errors: Vec<ValidationError>,
    limit: usize,
}

impl ErrorAccumulator {
    fn new(limit: usize) -> Self {
        Self {
            errors: Vec::new(),
            limit,
        }
    }

    /// 达到上限后同一行的后续错误也不再记录（上限是错误条数，不是行数）
    fn push(&mut self, error: ValidationError) {
        if !self.is_full() {
            self.errors.push(error);
        }
    }

    fn is_full(&self) -> bool {
        self.errors.len() >= self.limit
    }

    fn finish<T>(self, ok: T) -> Result<T, ValidationErrors> {
        if self.errors.is_empty() {
            Ok(ok)
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

pub struct SpecimenValidator {
    max_errors: usize,
}

impl Default for SpecimenValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecimenValidator {
    pub fn new() -> Self {
        Self {
            max_errors: MAX_VALIDATION_ERRORS,
        }
    }

    fn required(row: &ResolvedRow, field: CanonicalField, labels: &ColumnLabels) -> ValidationError {
        ValidationError::RequiredField {
            row: row.row_number,
            field,
            label: labels.label_for(field).to_string(),
        }
    }
}

impl RowValidator for SpecimenValidator {
    fn validate(
        &self,
        rows: Vec<ResolvedRow>,
        labels: ColumnLabels,
        timepoint: TimepointType,
    ) -> Result<ValidatedBatch, ValidationErrors> {
        // 空批次：只报一条，不执行逐行规则
        if rows.is_empty() {
            return Err(ValidationErrors(vec![ValidationError::NoData]));
        }

        let visit_key = CanonicalField::visit_key(timepoint);
        let mut acc = ErrorAccumulator::new(self.max_errors);
        let mut sample_identities: HashMap<String, (SampleIdentity, usize)> = HashMap::new();
        // 缺失管号以 None 参与唯一性判定：第二个缺失管号的行即触发重复
        let mut seen_vials: HashSet<Option<String>> = HashSet::new();
        let mut validated = Vec::with_capacity(rows.len());

        for mut row in rows {
            // 受试者必填
            if row.get(CanonicalField::ParticipantId).is_none() {
                acc.push(Self::required(&row, CanonicalField::ParticipantId, &labels));
            }

            // 采样时间始终必填；访视制研究另需访视号
            if row.get(CanonicalField::DrawTimestamp).is_none() {
                acc.push(Self::required(&row, CanonicalField::DrawTimestamp, &labels));
            }
            if !timepoint.is_date_based() && row.get(CanonicalField::Visit).is_none() {
                acc.push(Self::required(&row, CanonicalField::Visit, &labels));
            }

            // 同一样本号必须对应同一 (受试者, 访视键)
            if let Some(sample_id) = row.get_key(CanonicalField::SampleId) {
                let identity: SampleIdentity = (
                    row.get_key(CanonicalField::ParticipantId),
                    row.get(visit_key).cloned(),
                );
                match sample_identities.get(&sample_id) {
                    Some((first, first_row)) if *first != identity => {
                        acc.push(ValidationError::InconsistentSample {
                            row: row.row_number,
                            sample_id,
                            first_row: *first_row,
                            participant_label: labels
                                .label_for(CanonicalField::ParticipantId)
                                .to_string(),
                            visit_label: labels.label_for(visit_key).to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        sample_identities.insert(sample_id, (identity, row.row_number));
                    }
                }
            }

            // 管号缺省为样本号；两者皆缺失则报必填
            if row.get(CanonicalField::VialId).is_none() {
                match row.get(CanonicalField::SampleId).cloned() {
                    Some(sample) => row.set(CanonicalField::VialId, sample),
                    None => acc.push(Self::required(&row, CanonicalField::VialId, &labels)),
                }
            }

            // 管号批内唯一
            let vial_id = row.get_key(CanonicalField::VialId);
            if !seen_vials.insert(vial_id.clone()) {
                acc.push(ValidationError::DuplicateVial {
                    row: row.row_number,
                    value: vial_id.unwrap_or_else(|| MISSING_VALUE.to_string()),
                    label: labels.label_for(CanonicalField::VialId).to_string(),
                });
            }

            validated.push(row);

            if acc.is_full() {
                debug!(rows_scanned = validated.len(), "校验错误已达上限，停止扫描");
                break;
            }
        }

        acc.finish(ValidatedBatch {
            rows: validated,
            labels,
            timepoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> CellValue {
        CellValue::Timestamp(
            NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn row(
        row_number: usize,
        ptid: Option<&str>,
        visit: Option<f64>,
        sample: Option<&str>,
        vial: Option<&str>,
    ) -> ResolvedRow {
        let mut r = ResolvedRow::new(row_number);
        if let Some(p) = ptid {
            r.set(CanonicalField::ParticipantId, CellValue::Text(p.to_string()));
        }
        if let Some(v) = visit {
            r.set(CanonicalField::Visit, CellValue::Number(v));
        }
        if let Some(s) = sample {
            r.set(CanonicalField::SampleId, CellValue::Text(s.to_string()));
        }
        if let Some(v) = vial {
            r.set(CanonicalField::VialId, CellValue::Text(v.to_string()));
        }
        r.set(CanonicalField::DrawTimestamp, ts(1));
        r
    }

    fn validate(rows: Vec<ResolvedRow>) -> Result<ValidatedBatch, ValidationErrors> {
        SpecimenValidator::new().validate(rows, ColumnLabels::default(), TimepointType::Visit)
    }

    #[test]
    fn test_clean_batch_has_no_errors() {
        let batch = validate(vec![
            row(1, Some("P1"), Some(1.0), Some("S1"), Some("V1")),
            row(2, Some("P1"), Some(1.0), Some("S1"), Some("V2")),
            row(3, Some("P2"), Some(2.0), Some("S2"), None),
        ])
        .unwrap();

        assert_eq!(batch.rows.len(), 3);
        // 管号缺省为样本号
        assert_eq!(
            batch.rows[2].get_key(CanonicalField::VialId),
            Some("S2".to_string())
        );
    }

    #[test]
    fn test_empty_batch_yields_single_error() {
        let errors = validate(vec![]).unwrap_err();
        assert_eq!(errors.0, vec![ValidationError::NoData]);
        assert_eq!(errors.messages()[0], "No specimen data was provided.");
    }

    #[test]
    fn test_missing_participant_uses_uploader_label() {
        let mut labels = ColumnLabels::default();
        labels.record(CanonicalField::ParticipantId, "Subject");

        let errors = SpecimenValidator::new()
            .validate(
                vec![row(1, None, Some(1.0), Some("S1"), None)],
                labels,
                TimepointType::Visit,
            )
            .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.messages()[0], "Row 1: field Subject is required.");
    }

    #[test]
    fn test_visit_required_only_for_visit_based_studies() {
        let rows = vec![row(1, Some("P1"), None, Some("S1"), None)];

        let errors = validate(rows.clone()).unwrap_err();
        assert!(matches!(
            errors.0[0],
            ValidationError::RequiredField { field: CanonicalField::Visit, row: 1, .. }
        ));

        let ok = SpecimenValidator::new().validate(rows, ColumnLabels::default(), TimepointType::Date);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_draw_timestamp_always_required() {
        let mut r = row(1, Some("P1"), Some(1.0), Some("S1"), None);
        r.fields.remove(&CanonicalField::DrawTimestamp);

        let errors = SpecimenValidator::new()
            .validate(vec![r], ColumnLabels::default(), TimepointType::Date)
            .unwrap_err();

        assert!(matches!(
            errors.0[0],
            ValidationError::RequiredField { field: CanonicalField::DrawTimestamp, .. }
        ));
    }

    #[test]
    fn test_inconsistent_sample_reports_second_row() {
        let errors = validate(vec![
            row(1, Some("P1"), Some(1.0), Some("S1"), Some("V1")),
            row(2, Some("P1"), Some(2.0), Some("S1"), Some("V2")),
        ])
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        match &errors.0[0] {
            ValidationError::InconsistentSample { row, sample_id, first_row, .. } => {
                assert_eq!(*row, 2);
                assert_eq!(sample_id, "S1");
                assert_eq!(*first_row, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_inconsistent_sample_in_date_based_study_compares_timestamps() {
        let r1 = row(1, Some("P1"), None, Some("S1"), Some("V1"));
        let mut r2 = row(2, Some("P1"), None, Some("S1"), Some("V2"));
        r2.set(CanonicalField::DrawTimestamp, ts(2));

        let errors = SpecimenValidator::new()
            .validate(vec![r1, r2], ColumnLabels::default(), TimepointType::Date)
            .unwrap_err();

        assert_eq!(errors.0[0].row(), Some(2));
    }

    #[test]
    fn test_duplicate_defaulted_vial() {
        // 同一样本、同一身份的两行：身份一致，但管号都缺省为 S1 → 第 2 行重复
        let errors = validate(vec![
            row(1, Some("P1"), Some(1.0), Some("S1"), None),
            row(2, Some("P1"), Some(1.0), Some("S1"), None),
        ])
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.0[0],
            ValidationError::DuplicateVial {
                row: 2,
                value: "S1".to_string(),
                label: "VialId".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_explicit_vial() {
        let errors = validate(vec![
            row(1, Some("P1"), Some(1.0), Some("S1"), Some("V1")),
            row(2, Some("P2"), Some(1.0), Some("S2"), Some("V1")),
        ])
        .unwrap_err();

        assert!(matches!(errors.0[0], ValidationError::DuplicateVial { row: 2, .. }));
    }

    #[test]
    fn test_missing_vial_and_sample() {
        let errors = validate(vec![
            row(1, Some("P1"), Some(1.0), None, None),
            row(2, Some("P2"), Some(1.0), None, None),
        ])
        .unwrap_err();

        // 行 1: 管号必填；行 2: 管号必填 + 缺失值重复
        assert_eq!(errors.len(), 3);
        assert!(matches!(
            errors.0[0],
            ValidationError::RequiredField { row: 1, field: CanonicalField::VialId, .. }
        ));
        assert_eq!(
            errors.0[2],
            ValidationError::DuplicateVial {
                row: 2,
                value: MISSING_VALUE.to_string(),
                label: "VialId".to_string(),
            }
        );
    }

    #[test]
    fn test_error_cap_stops_at_three() {
        let rows = (1..=5)
            .map(|i| {
                let sample = format!("S{}", i);
                row(i, None, Some(1.0), Some(sample.as_str()), None)
            })
            .collect();

        let errors = validate(rows).unwrap_err();

        assert_eq!(errors.len(), MAX_VALIDATION_ERRORS);
        let reported_rows: Vec<_> = errors.iter().filter_map(ValidationError::row).collect();
        assert_eq!(reported_rows, vec![1, 2, 3]);
    }

    #[test]
    fn test_error_cap_within_single_row() {
        // 单行即产生 4 条错误：只保留前 3 条
        let mut r = ResolvedRow::new(1);
        r.extras
            .insert("Comment".to_string(), CellValue::Text("x".to_string()));

        let errors = validate(vec![r]).unwrap_err();
        assert_eq!(errors.len(), MAX_VALIDATION_ERRORS);
    }
}
