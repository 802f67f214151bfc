// ==========================================
// 标本导入系统 - 标本领域模型
// ==========================================
// 生命周期: RawRow / ResolvedRow 仅存在于单次上传请求内
// ==========================================

use crate::domain::types::{CanonicalField, ImportMode, TimepointType};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// CellValue - 单元格类型化取值
// ==========================================
// 空单元格不构造 CellValue（以 None 表示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Number(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

impl CellValue {
    /// 作为标识使用时的文本形式（受试者号/样本号/管号）
    pub fn to_key_string(&self) -> String {
        self.to_string()
    }

    /// 数值视图（访视序号/体积）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(v) => Some(*v as f64),
            CellValue::Number(v) => Some(*v),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            CellValue::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(v) => write!(f, "{}", v),
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

// ==========================================
// RawRow - 原始行
// ==========================================
// 用途: Loader 输出，列名为上传者原始表头（未规范化）
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_number: usize, // 1-based，不含表头
    pub cells: Vec<(String, Option<CellValue>)>,
}

impl RawRow {
    pub fn get(&self, label: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(l, _)| l == label)
            .and_then(|(_, v)| v.as_ref())
    }
}

// ==========================================
// ResolvedRow - 别名解析后的行
// ==========================================
// fields: 已识别的规范字段
// extras: 未识别列（原样保留，不做校验）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRow {
    pub row_number: usize,
    pub fields: BTreeMap<CanonicalField, CellValue>,
    pub extras: BTreeMap<String, CellValue>,
}

impl ResolvedRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            ..Default::default()
        }
    }

    pub fn get(&self, field: CanonicalField) -> Option<&CellValue> {
        self.fields.get(&field)
    }

    pub fn get_key(&self, field: CanonicalField) -> Option<String> {
        self.get(field).map(CellValue::to_key_string)
    }

    pub fn set(&mut self, field: CanonicalField, value: CellValue) {
        self.fields.insert(field, value);
    }
}

// ==========================================
// ColumnLabels - 规范字段 → 上传者实际列名
// ==========================================
// 用途: 错误信息引用上传者自己的列名
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLabels {
    labels: BTreeMap<CanonicalField, String>,
}

impl ColumnLabels {
    /// 记录首次出现的列名（同一字段多列时保留第一个）
    pub fn record(&mut self, field: CanonicalField, label: &str) {
        self.labels
            .entry(field)
            .or_insert_with(|| label.to_string());
    }

    /// 上传者列名；未使用时回退为规范名
    pub fn label_for(&self, field: CanonicalField) -> &str {
        self.labels
            .get(&field)
            .map(String::as_str)
            .unwrap_or_else(|| field.name())
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.labels.contains_key(&field)
    }
}

// ==========================================
// ImportRequest - 导入请求参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub actor: String, // 操作人（权限已由调用方校验）
    pub mode: ImportMode,
}

impl ImportRequest {
    pub fn new(actor: impl Into<String>, mode: ImportMode) -> Self {
        Self {
            actor: actor.into(),
            mode,
        }
    }
}

// ==========================================
// ImportSummary - 提交结果汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub batch_id: String,
    pub container_id: String,
    pub rows: usize,
    pub participants: usize,
    pub specimens: usize,
    pub vials: usize,
    pub events: usize,
    pub elapsed_ms: i64,
}

// ==========================================
// ImportBatch - 导入批次审计记录
// ==========================================
// 对齐: import_batch 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub container_id: String,
    pub imported_by: String,
    pub mode: ImportMode,
    pub total_rows: i64,
    pub participant_count: i64,
    pub specimen_count: i64,
    pub vial_count: i64,
    pub imported_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

// ==========================================
// SpecimenIdentity - 样本归属
// ==========================================
// 同一样本号只能属于一个 (受试者, 访视键)
#[derive(Debug, Clone, PartialEq)]
pub struct SpecimenIdentity {
    pub participant_id: String,
    pub visit: Option<f64>,
    pub draw_timestamp: Option<NaiveDateTime>,
}

impl SpecimenIdentity {
    pub fn from_row(row: &ResolvedRow) -> Self {
        Self {
            participant_id: row.get_key(CanonicalField::ParticipantId).unwrap_or_default(),
            visit: row.get(CanonicalField::Visit).and_then(CellValue::as_f64),
            draw_timestamp: row
                .get(CanonicalField::DrawTimestamp)
                .and_then(CellValue::as_timestamp),
        }
    }

    /// 按研究的访视键比较（访视制比较访视号，日期制比较采样时间）
    pub fn same_sample(&self, other: &SpecimenIdentity, timepoint: TimepointType) -> bool {
        if self.participant_id != other.participant_id {
            return false;
        }
        match timepoint {
            TimepointType::Visit => self.visit == other.visit,
            TimepointType::Date => self.draw_timestamp == other.draw_timestamp,
        }
    }

    pub fn describe(&self, timepoint: TimepointType) -> String {
        let key = match timepoint {
            TimepointType::Visit => self
                .visit
                .map(|v| format!("visit {}", v))
                .unwrap_or_else(|| "no visit".to_string()),
            TimepointType::Date => self
                .draw_timestamp
                .map(|ts| format!("draw timestamp {}", ts.format("%Y-%m-%d %H:%M:%S")))
                .unwrap_or_else(|| "no draw timestamp".to_string()),
        };
        format!("participant {}, {}", self.participant_id, key)
    }
}

// ==========================================
// VialRecord - 管记录（读侧视图）
// ==========================================
// 对齐: vial JOIN specimen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VialRecord {
    pub global_unique_id: String,
    pub sample_id: String,
    pub participant_id: String,
    pub visit: Option<f64>,
    pub draw_timestamp: Option<NaiveDateTime>,
    pub volume: Option<f64>,
    pub volume_units: Option<String>,
    pub primary_type: Option<String>,
    pub additive_type: Option<String>,
    pub derivative_type: Option<String>,
    pub batch_id: String,
}
