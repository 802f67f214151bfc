// ==========================================
// 标本导入系统 - 列别名解析器实现
// ==========================================
// 职责: 上传者列名 → 规范字段；记录 规范字段 → 上传者列名
// ==========================================
// 别名表为进程级常量，首次使用时构建，之后只读
// 未识别列名原样保留（作为 extras），解析是全函数，不会失败
// ==========================================

use crate::domain::specimen::{ColumnLabels, RawRow, ResolvedRow};
use crate::domain::types::{CanonicalField, ColumnType};
use crate::importer::file_parser::{normalize_label, LoaderOptions};
use crate::importer::specimen_importer_trait::FieldMapper as FieldMapperTrait;
use std::collections::HashMap;
use std::sync::LazyLock;

/// 可接受的表头写法（大小写/空白不敏感）
const ALIASES: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::ParticipantId,
        &["ParticipantId", "Participant Id", "Subject"],
    ),
    (CanonicalField::Visit, &["SequenceNum", "Sequence Num", "Visit"]),
    (CanonicalField::SampleId, &["specimenNumber", "specimen Number"]),
    (CanonicalField::Volume, &["totalVolume", "total Volume"]),
    (CanonicalField::Units, &["volumeUnits", "volume Units"]),
    (
        CanonicalField::PrimarySpecimenType,
        &["primaryType", "primary Type"],
    ),
    (CanonicalField::AdditiveType, &["additiveType", "additive Type"]),
    (
        CanonicalField::DerivativeType,
        &["derivativeType", "derivative Type"],
    ),
    (
        CanonicalField::DrawTimestamp,
        &["drawTimestamp", "draw Timestamp"],
    ),
    (CanonicalField::VialId, &["globalUniqueId", "global Unique Id"]),
];

static ALIAS_TABLE: LazyLock<HashMap<String, CanonicalField>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    // 规范名自身也可解析（保证幂等）
    for field in CanonicalField::ALL {
        table.insert(normalize_label(field.name()), field);
    }
    for (field, spellings) in ALIASES {
        for spelling in *spellings {
            table.insert(normalize_label(spelling), *field);
        }
    }
    table
});

/// 解析单个列名；未知列名返回 None
pub fn resolve_label(label: &str) -> Option<CanonicalField> {
    ALIAS_TABLE.get(&normalize_label(label)).copied()
}

/// 规范字段在加载阶段的类型提示
pub fn column_type_hint(field: CanonicalField) -> ColumnType {
    match field {
        CanonicalField::Visit | CanonicalField::Volume => ColumnType::Number,
        CanonicalField::DrawTimestamp => ColumnType::Timestamp,
        // 标识与类型字段一律按文本读取，避免 "007" 被读成整数
        _ => ColumnType::Text,
    }
}

/// 为所有已知写法生成加载器类型提示
pub fn with_type_hints(mut options: LoaderOptions) -> LoaderOptions {
    for field in CanonicalField::ALL {
        options = options.with_hint(field.name(), column_type_hint(field));
    }
    for (field, spellings) in ALIASES {
        for spelling in *spellings {
            options = options.with_hint(spelling, column_type_hint(*field));
        }
    }
    options
}

/// 列名解析器
///
/// 除固定别名外，还接受研究自定义的受试者列名（如 "Mouse Id"）
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    subject_label: Option<String>,
}

impl FieldMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以研究的受试者称谓构造（"{noun} Id" 解析为 ParticipantId）
    pub fn for_subject_noun(noun: &str) -> Self {
        let label = normalize_label(&subject_id_label(noun));
        Self {
            subject_label: (!label.is_empty() && label != "id").then_some(label),
        }
    }

    /// 解析单个列名（固定别名优先）
    pub fn resolve(&self, label: &str) -> Option<CanonicalField> {
        resolve_label(label).or_else(|| {
            self.subject_label
                .as_deref()
                .filter(|subject| *subject == normalize_label(label))
                .map(|_| CanonicalField::ParticipantId)
        })
    }

    /// 在固定别名提示之外，补充受试者列的文本提示
    pub fn type_hints(&self, options: LoaderOptions) -> LoaderOptions {
        let options = with_type_hints(options);
        match &self.subject_label {
            Some(label) => options.with_hint(label, ColumnType::Text),
            None => options,
        }
    }
}

/// 受试者列的人类可读列名
pub fn subject_id_label(noun: &str) -> String {
    format!("{} Id", noun.trim())
}

impl FieldMapperTrait for FieldMapper {
    fn resolve_rows(&self, rows: Vec<RawRow>) -> (Vec<ResolvedRow>, ColumnLabels) {
        let mut labels = ColumnLabels::default();
        let mut resolved = Vec::with_capacity(rows.len());

        // 表头在所有行上一致，取首行登记列名；无数据行时 labels 为空
        if let Some(first) = rows.first() {
            for (label, _) in &first.cells {
                if let Some(field) = self.resolve(label) {
                    labels.record(field, label);
                }
            }
        }

        for row in rows {
            let mut out = ResolvedRow::new(row.row_number);
            for (label, value) in row.cells {
                let Some(value) = value else {
                    continue;
                };
                match self.resolve(&label) {
                    // 同一字段多列时，首个非空值优先
                    Some(field) => {
                        out.fields.entry(field).or_insert(value);
                    }
                    None => {
                        out.extras.insert(label, value);
                    }
                }
            }
            resolved.push(out);
        }

        (resolved, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::specimen::CellValue;

    fn text(s: &str) -> Option<CellValue> {
        Some(CellValue::Text(s.to_string()))
    }

    #[test]
    fn test_resolve_known_aliases() {
        assert_eq!(resolve_label("Participant Id"), Some(CanonicalField::ParticipantId));
        assert_eq!(resolve_label("SUBJECT"), Some(CanonicalField::ParticipantId));
        assert_eq!(resolve_label("total Volume"), Some(CanonicalField::Volume));
        assert_eq!(resolve_label("sequencenum"), Some(CanonicalField::Visit));
        assert_eq!(resolve_label("Global Unique  Id"), Some(CanonicalField::VialId));
        assert_eq!(resolve_label(" draw timestamp "), Some(CanonicalField::DrawTimestamp));
    }

    #[test]
    fn test_resolve_is_idempotent_on_canonical_names() {
        for field in CanonicalField::ALL {
            assert_eq!(resolve_label(field.name()), Some(field));
        }
    }

    #[test]
    fn test_unknown_label_passes_through() {
        assert_eq!(resolve_label("Freezer Box"), None);

        let rows = vec![RawRow {
            row_number: 1,
            cells: vec![
                ("Subject".to_string(), text("P1")),
                ("Freezer Box".to_string(), text("B-12")),
            ],
        }];
        let (resolved, _) = FieldMapper::new().resolve_rows(rows);

        assert_eq!(resolved[0].get(CanonicalField::ParticipantId), text("P1").as_ref());
        assert_eq!(resolved[0].extras.get("Freezer Box"), text("B-12").as_ref());
    }

    #[test]
    fn test_labels_keep_uploader_spelling() {
        let rows = vec![RawRow {
            row_number: 1,
            cells: vec![
                ("Subject".to_string(), None),
                ("global Unique Id".to_string(), text("V1")),
            ],
        }];
        let (resolved, labels) = FieldMapper::new().resolve_rows(rows);

        assert_eq!(labels.label_for(CanonicalField::ParticipantId), "Subject");
        assert_eq!(labels.label_for(CanonicalField::VialId), "global Unique Id");
        assert_eq!(labels.label_for(CanonicalField::SampleId), "SampleId");
        // 空值不进入 fields
        assert!(resolved[0].get(CanonicalField::ParticipantId).is_none());
    }

    #[test]
    fn test_type_hints_cover_aliases() {
        let options = with_type_hints(LoaderOptions::default());
        assert_eq!(options.hint_for("Sequence Num"), Some(ColumnType::Number));
        assert_eq!(options.hint_for("draw Timestamp"), Some(ColumnType::Timestamp));
        assert_eq!(options.hint_for("Subject"), Some(ColumnType::Text));
        assert_eq!(options.hint_for("Freezer Box"), None);
    }

    #[test]
    fn test_subject_noun_label_resolves() {
        let mapper = FieldMapper::for_subject_noun("Mouse");
        assert_eq!(mapper.resolve("Mouse Id"), Some(CanonicalField::ParticipantId));
        assert_eq!(mapper.resolve("mouseid"), Some(CanonicalField::ParticipantId));
        assert_eq!(FieldMapper::new().resolve("Mouse Id"), None);

        let rows = vec![RawRow {
            row_number: 1,
            cells: vec![("Mouse Id".to_string(), text("M-7"))],
        }];
        let (resolved, labels) = mapper.resolve_rows(rows);
        assert_eq!(resolved[0].get_key(CanonicalField::ParticipantId).as_deref(), Some("M-7"));
        assert_eq!(labels.label_for(CanonicalField::ParticipantId), "Mouse Id");

        let options = mapper.type_hints(LoaderOptions::default());
        assert_eq!(options.hint_for("Mouse Id"), Some(ColumnType::Text));
    }
}
