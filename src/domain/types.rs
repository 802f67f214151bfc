// ==========================================
// 标本导入系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 时间点类型 (Timepoint Type)
// ==========================================
// VISIT: 按访视序号索引；DATE: 按采样时间索引
// 序列化格式: SCREAMING_SNAKE_CASE (与 config_kv 一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimepointType {
    Visit, // 访视制
    Date,  // 日期制
}

impl TimepointType {
    pub fn is_date_based(&self) -> bool {
        matches!(self, TimepointType::Date)
    }

    /// 从配置字符串解析（大小写不敏感）
    ///
    /// 未知取值返回 None，由调用方决定是否报错
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "VISIT" => Some(TimepointType::Visit),
            "DATE" => Some(TimepointType::Date),
            _ => None,
        }
    }
}

impl fmt::Display for TimepointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimepointType::Visit => write!(f, "VISIT"),
            TimepointType::Date => write!(f, "DATE"),
        }
    }
}

// ==========================================
// 导入模式 (Import Mode)
// ==========================================
// REPLACE: 导入前清空本容器已有标本数据（同一事务内）
// MERGE: 保留已有数据，仅追加
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    #[default]
    Replace,
    Merge,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Replace => write!(f, "REPLACE"),
            ImportMode::Merge => write!(f, "MERGE"),
        }
    }
}

// ==========================================
// 列类型 (Column Type)
// ==========================================
// 由 Loader 推断或由调用方提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Text,
    Integer,
    Number,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => write!(f, "text"),
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Number => write!(f, "number"),
            ColumnType::Timestamp => write!(f, "timestamp"),
        }
    }
}

// ==========================================
// 规范字段 (Canonical Field)
// ==========================================
// 固定枚举集合；Visit / DrawTimestamp 之一作为研究的 "访视键"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalField {
    ParticipantId,
    Visit,
    DrawTimestamp,
    SampleId,
    VialId,
    Volume,
    Units,
    PrimarySpecimenType,
    AdditiveType,
    DerivativeType,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 10] = [
        CanonicalField::ParticipantId,
        CanonicalField::Visit,
        CanonicalField::DrawTimestamp,
        CanonicalField::SampleId,
        CanonicalField::VialId,
        CanonicalField::Volume,
        CanonicalField::Units,
        CanonicalField::PrimarySpecimenType,
        CanonicalField::AdditiveType,
        CanonicalField::DerivativeType,
    ];

    /// 规范名（错误信息在无别名时回退使用）
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::ParticipantId => "ParticipantId",
            CanonicalField::Visit => "Visit",
            CanonicalField::DrawTimestamp => "DrawTimestamp",
            CanonicalField::SampleId => "SampleId",
            CanonicalField::VialId => "VialId",
            CanonicalField::Volume => "Volume",
            CanonicalField::Units => "Units",
            CanonicalField::PrimarySpecimenType => "PrimarySpecimenType",
            CanonicalField::AdditiveType => "AdditiveType",
            CanonicalField::DerivativeType => "DerivativeType",
        }
    }

    /// 研究的访视键字段
    pub fn visit_key(timepoint: TimepointType) -> CanonicalField {
        match timepoint {
            TimepointType::Visit => CanonicalField::Visit,
            TimepointType::Date => CanonicalField::DrawTimestamp,
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ==========================================
// 持久化实体类型 (Entity Kind)
// ==========================================
// 用途: 持久化端口 insert_row 的目标表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Participant,
    Specimen,
    Vial,
    SpecimenEvent,
    ImportBatch,
}

impl EntityKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Participant => "participant",
            EntityKind::Specimen => "specimen",
            EntityKind::Vial => "vial",
            EntityKind::SpecimenEvent => "specimen_event",
            EntityKind::ImportBatch => "import_batch",
        }
    }

    /// 已存在时是否静默跳过（MERGE 模式下受试者可能已存在；样本归属由提交器核对）
    pub fn ignore_existing(&self) -> bool {
        matches!(self, EntityKind::Participant)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timepoint_parse() {
        assert_eq!(TimepointType::parse("visit"), Some(TimepointType::Visit));
        assert_eq!(TimepointType::parse(" DATE "), Some(TimepointType::Date));
        assert_eq!(TimepointType::parse("continuous"), None);
    }

    #[test]
    fn test_visit_key() {
        assert_eq!(
            CanonicalField::visit_key(TimepointType::Visit),
            CanonicalField::Visit
        );
        assert_eq!(
            CanonicalField::visit_key(TimepointType::Date),
            CanonicalField::DrawTimestamp
        );
    }
}
