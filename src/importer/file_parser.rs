// ==========================================
// 标本导入系统 - 表格加载器实现
// ==========================================
// 支持: 文本（TSV 默认）/ .tsv .txt .csv / Excel (.xlsx/.xls)
// ==========================================
// 职责: 分隔文本 → 有序 RawRow（列类型推断 + 严格模式转换）
// 红线: 严格模式下任一单元格转换失败即整体失败，不产出部分数据
// ==========================================

use crate::domain::specimen::{CellValue, RawRow};
use crate::domain::types::ColumnType;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::specimen_importer_trait::{FileParser, TabularLoader};
use calamine::{open_workbook_auto, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;

/// 默认参与类型推断的行数
pub const DEFAULT_INFER_ROWS: usize = 100;

const NUMBER_GUIDANCE: &str = "Numbers must contain only digits and decimal separators.";
const TIMESTAMP_GUIDANCE: &str =
    "Timestamps must look like YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS].";

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// 列名规范化（小写 + 去除所有空白）
///
/// 加载器类型提示与别名解析共用同一口径
pub fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

// ==========================================
// LoaderOptions - 加载参数
// ==========================================
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub has_header: bool,
    pub strict: bool,
    pub delimiter: u8,
    pub infer_rows: usize,
    hints: HashMap<String, ColumnType>, // key: 规范化列名
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            strict: true,
            delimiter: b'\t',
            infer_rows: DEFAULT_INFER_ROWS,
            hints: HashMap::new(),
        }
    }
}

impl LoaderOptions {
    /// 指定列类型（覆盖推断），列名大小写/空白不敏感
    pub fn with_hint(mut self, label: &str, column_type: ColumnType) -> Self {
        self.hints.insert(normalize_label(label), column_type);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn hint_for(&self, label: &str) -> Option<ColumnType> {
        self.hints.get(&normalize_label(label)).copied()
    }
}

// ==========================================
// TabLoader - 内存文本加载器
// ==========================================
pub struct TabLoader;

impl TabularLoader for TabLoader {
    fn load(&self, text: &str, options: &LoaderOptions) -> ImportResult<Vec<RawRow>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .from_reader(text.as_bytes());

        let mut grid = Vec::new();
        for result in reader.records() {
            let record = result?;
            grid.push(record.iter().map(|v| v.trim().to_string()).collect());
        }

        build_rows(grid, options)
    }
}

/// 字符串网格 → 类型化 RawRow
fn build_rows(grid: Vec<Vec<String>>, options: &LoaderOptions) -> ImportResult<Vec<RawRow>> {
    // 跳过完全空白的行
    let mut lines = grid
        .into_iter()
        .filter(|line| line.iter().any(|v| !v.is_empty()));

    let (headers, data): (Vec<String>, Vec<Vec<String>>) = if options.has_header {
        let Some(header_line) = lines.next() else {
            return Ok(Vec::new());
        };
        let headers = header_line
            .into_iter()
            .enumerate()
            .map(|(idx, h)| {
                if h.is_empty() {
                    format!("column{}", idx + 1)
                } else {
                    h
                }
            })
            .collect();
        (headers, lines.collect())
    } else {
        let data: Vec<Vec<String>> = lines.collect();
        let width = data.iter().map(Vec::len).max().unwrap_or(0);
        ((1..=width).map(|i| format!("column{}", i)).collect(), data)
    };

    let column_types: Vec<ColumnType> = headers
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            options.hint_for(label).unwrap_or_else(|| {
                infer_column_type(
                    data.iter()
                        .filter_map(|line| line.get(idx))
                        .filter(|v| !v.is_empty())
                        .take(options.infer_rows)
                        .map(String::as_str),
                )
            })
        })
        .collect();

    let mut rows = Vec::with_capacity(data.len());
    for (line_idx, line) in data.into_iter().enumerate() {
        let row_number = line_idx + 1;

        // 表头之外不允许出现非空单元格
        if let Some(last) = line.iter().rposition(|v| !v.is_empty()) {
            if last >= headers.len() {
                return Err(ImportError::ParseError(format!(
                    "Row {} has {} values but the header has only {} columns.",
                    row_number,
                    last + 1,
                    headers.len()
                )));
            }
        }

        let mut cells = Vec::with_capacity(headers.len());

        for (col_idx, label) in headers.iter().enumerate() {
            let raw = line.get(col_idx).map(String::as_str).unwrap_or("");
            if raw.is_empty() {
                cells.push((label.clone(), None));
                continue;
            }

            let column_type = column_types[col_idx];
            let value = match convert_cell(raw, column_type) {
                Some(value) => value,
                None if options.strict => {
                    return Err(ImportError::ConversionError {
                        row: row_number,
                        column: label.clone(),
                        value: raw.to_string(),
                        expected: column_type.to_string(),
                        guidance: guidance_for(column_type).to_string(),
                    });
                }
                None => CellValue::Text(raw.to_string()),
            };
            cells.push((label.clone(), Some(value)));
        }

        rows.push(RawRow { row_number, cells });
    }

    Ok(rows)
}

/// 列类型推断：整数 → 数值 → 时间 → 文本
fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut seen = false;
    let (mut all_int, mut all_num, mut all_ts) = (true, true, true);

    for value in values {
        seen = true;
        all_int = all_int && value.parse::<i64>().is_ok();
        all_num = all_num && parse_number(value).is_some();
        all_ts = all_ts && parse_timestamp(value).is_some();
        if !all_int && !all_num && !all_ts {
            return ColumnType::Text;
        }
    }

    match (seen, all_int, all_num, all_ts) {
        (false, ..) => ColumnType::Text,
        (true, true, _, _) => ColumnType::Integer,
        (true, _, true, _) => ColumnType::Number,
        (true, _, _, true) => ColumnType::Timestamp,
        _ => ColumnType::Text,
    }
}

fn convert_cell(raw: &str, column_type: ColumnType) -> Option<CellValue> {
    match column_type {
        ColumnType::Text => Some(CellValue::Text(raw.to_string())),
        ColumnType::Integer => raw.parse::<i64>().ok().map(CellValue::Integer),
        ColumnType::Number => parse_number(raw).map(CellValue::Number),
        ColumnType::Timestamp => parse_timestamp(raw).map(CellValue::Timestamp),
    }
}

fn guidance_for(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer | ColumnType::Number => NUMBER_GUIDANCE,
        ColumnType::Timestamp => TIMESTAMP_GUIDANCE,
        ColumnType::Text => "",
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 解析时间戳（纯日期补 00:00:00）
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ==========================================
// 文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_file(&self, file_path: &Path, options: &LoaderOptions) -> ImportResult<Vec<RawRow>> {
        // 检查文件存在
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "tsv" | "txt" => {
                let text = std::fs::read_to_string(file_path)?;
                TabLoader.load(&text, &options.clone().with_delimiter(b'\t'))
            }
            "csv" => {
                let text = std::fs::read_to_string(file_path)?;
                TabLoader.load(&text, &options.clone().with_delimiter(b','))
            }
            "xlsx" | "xls" => ExcelParser.parse_file(file_path, options),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
// 只读取第一个工作表
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_file(&self, file_path: &Path, options: &LoaderOptions) -> ImportResult<Vec<RawRow>> {
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        let sheet_names = workbook.sheet_names();
        let Some(sheet_name) = sheet_names.first().cloned() else {
            return Err(ImportError::ExcelParseError(
                "workbook has no worksheets".to_string(),
            ));
        };

        let range = workbook.worksheet_range(&sheet_name)?;
        let grid = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string().trim().to_string())
                    .collect()
            })
            .collect();

        build_rows(grid, options)
    }
}
