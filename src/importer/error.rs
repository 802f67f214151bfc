// ==========================================
// 标本导入系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================
// 分类:
// - 加载错误（致命，校验前终止）
// - 校验错误（累积，整批拒绝）
// - 持久化错误（致命，事务整体回滚）
// ==========================================

use crate::config::ConfigError;
use crate::domain::types::CanonicalField;
use crate::repository::RepositoryError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 单条校验错误（行号均为 1-based）
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ValidationError {
    #[error("No specimen data was provided.")]
    NoData,

    #[error("Row {row}: field {label} is required.")]
    RequiredField {
        row: usize,
        field: CanonicalField,
        label: String,
    },

    #[error("Row {row}: specimen {sample_id} has inconsistent {participant_label}/{visit_label} values (first seen on row {first_row}).")]
    InconsistentSample {
        row: usize,
        sample_id: String,
        first_row: usize,
        participant_label: String,
        visit_label: String,
    },

    #[error("Row {row}: duplicate value {value} for field {label}.")]
    DuplicateVial {
        row: usize,
        value: String,
        label: String,
    },
}

impl ValidationError {
    pub fn row(&self) -> Option<usize> {
        match self {
            ValidationError::NoData => None,
            ValidationError::RequiredField { row, .. }
            | ValidationError::InconsistentSample { row, .. }
            | ValidationError::DuplicateVial { row, .. } => Some(*row),
        }
    }
}

/// 有序的校验错误列表（非空时整批拒绝）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join(" "))
    }
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 加载错误 =====
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0} (expected .tsv, .txt, .csv, .xlsx or .xls)")]
    UnsupportedFormat(String),

    #[error("Could not read the uploaded file: {0}")]
    FileReadError(String),

    #[error("Could not parse the specimen data: {0}")]
    ParseError(String),

    #[error("Could not parse the Excel workbook: {0}")]
    ExcelParseError(String),

    #[error("Row {row}, column {column}: could not convert \"{value}\" to {expected}. {guidance}")]
    ConversionError {
        row: usize,
        column: String,
        value: String,
        expected: String,
        guidance: String,
    },

    // ===== 校验错误 =====
    #[error("Specimen data failed validation: {0}")]
    Validation(ValidationErrors),

    // ===== 持久化错误 =====
    #[error("Import failed while saving specimen data: {message}")]
    Persistence { message: String },

    // ===== 配置错误 =====
    #[error("Study configuration error: {0}")]
    Config(String),

    // ===== 通用错误 =====
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ImportError {
    /// 是否为加载阶段错误
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileReadError(_)
                | ImportError::ParseError(_)
                | ImportError::ExcelParseError(_)
                | ImportError::ConversionError { .. }
        )
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, ImportError::Validation(_))
    }

    pub fn is_persistence_error(&self) -> bool {
        matches!(self, ImportError::Persistence { .. })
    }

    /// 展开为面向用户的有序消息列表（校验错误逐条展开）
    pub fn messages(&self) -> Vec<String> {
        match self {
            ImportError::Validation(errors) => errors.messages(),
            other => vec![other.to_string()],
        }
    }
}

impl From<ValidationErrors> for ImportError {
    fn from(errors: ValidationErrors) -> Self {
        ImportError::Validation(errors)
    }
}

impl From<RepositoryError> for ImportError {
    fn from(err: RepositoryError) -> Self {
        ImportError::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for ImportError {
    fn from(err: ConfigError) -> Self {
        ImportError::Config(err.to_string())
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::ParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_flattened() {
        let err = ImportError::Validation(ValidationErrors(vec![
            ValidationError::RequiredField {
                row: 1,
                field: CanonicalField::ParticipantId,
                label: "Subject".to_string(),
            },
            ValidationError::DuplicateVial {
                row: 2,
                value: "V1".to_string(),
                label: "globalUniqueId".to_string(),
            },
        ]));

        let messages = err.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "Row 1: field Subject is required.");
        assert_eq!(messages[1], "Row 2: duplicate value V1 for field globalUniqueId.");
    }

    #[test]
    fn test_persistence_error_is_single_message() {
        let err = ImportError::Persistence {
            message: "UNIQUE constraint failed".to_string(),
        };
        assert!(err.is_persistence_error());
        assert_eq!(err.messages().len(), 1);
    }
}
