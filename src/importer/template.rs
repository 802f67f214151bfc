// ==========================================
// 标本导入系统 - 上传模板表头
// ==========================================
// 职责: 生成可直接填写的 TSV 表头行
// 约束: 每个列名都能经列名解析器解析回标准字段
// ==========================================

use crate::domain::types::TimepointType;
use crate::importer::field_mapper::subject_id_label;

/// 模板中除受试者列外的固定列（访视列仅访视制研究输出）
const VISIT_LABEL: &str = "Sequence Num";
const SPECIMEN_LABELS: &[&str] = &[
    "draw Timestamp",
    "specimen Number",
    "global Unique Id",
    "total Volume",
    "volume Units",
    "primary Type",
    "additive Type",
    "derivative Type",
];

/// 模板列名列表
pub fn template_columns(timepoint: TimepointType, subject_noun: &str) -> Vec<String> {
    let mut columns = vec![subject_id_label(subject_noun)];
    if !timepoint.is_date_based() {
        columns.push(VISIT_LABEL.to_string());
    }
    columns.extend(SPECIMEN_LABELS.iter().map(|label| label.to_string()));
    columns
}

/// 模板表头行（制表符分隔，以换行结尾）
pub fn template_header(timepoint: TimepointType, subject_noun: &str) -> String {
    let mut header = template_columns(timepoint, subject_noun).join("\t");
    header.push('\n');
    header
}
