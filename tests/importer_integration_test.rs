// ==========================================
// SpecimenImporter 集成测试
// ==========================================
// 测试目标: 验证完整的标本导入流程（临时 SQLite 文件）
// ==========================================

mod test_helpers;

use specimen_import::domain::specimen::ImportRequest;
use specimen_import::domain::types::{EntityKind, ImportMode, TimepointType};
use specimen_import::importer::{SpecimenImporter, MAX_VALIDATION_ERRORS};
use specimen_import::logging;
use test_helpers::{create_test_db, create_test_importer, fixture, fixture_text, TEST_CONTAINER};

fn request(mode: ImportMode) -> ImportRequest {
    ImportRequest::new("lab-tech", mode)
}

#[tokio::test]
async fn test_import_clean_visit_file() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Visit);

    let summary = importer
        .import_file(&fixture("clean_visit.tsv"), &request(ImportMode::Replace))
        .await
        .expect("import should succeed");

    assert_eq!(summary.container_id, TEST_CONTAINER);
    assert_eq!(summary.rows, 4);
    assert_eq!(summary.participants, 2);
    assert_eq!(summary.specimens, 3);
    assert_eq!(summary.vials, 4);
    assert_eq!(summary.events, 4);

    let store = importer.store();
    assert_eq!(store.count_rows(EntityKind::Participant, TEST_CONTAINER).unwrap(), 2);
    assert_eq!(store.count_rows(EntityKind::Specimen, TEST_CONTAINER).unwrap(), 3);

    let vials = store.list_vials(TEST_CONTAINER).unwrap();
    assert_eq!(vials.len(), 4);
    // 缺失管号时以样本号作为管号
    let defaulted = vials
        .iter()
        .find(|v| v.global_unique_id == "S003")
        .expect("vial id should default to the sample id");
    assert_eq!(defaulted.participant_id, "P002");
    assert_eq!(defaulted.primary_type.as_deref(), Some("Urine"));
    assert_eq!(defaulted.volume, Some(3.0));

    let first = vials.iter().find(|v| v.global_unique_id == "V001").unwrap();
    assert_eq!(first.visit, Some(1.0));
    assert_eq!(first.volume_units.as_deref(), Some("mL"));
    assert_eq!(
        first.draw_timestamp.map(|ts| ts.to_string()),
        Some("2024-01-15 08:30:00".to_string())
    );

    let batches = store.list_batches(Some(TEST_CONTAINER), 5).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].batch_id, summary.batch_id);
    assert_eq!(batches[0].imported_by, "lab-tech");
    assert_eq!(batches[0].vial_count, 4);
}

#[tokio::test]
async fn test_error_cap_stops_at_three() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Visit);

    let err = importer
        .import_text(&fixture_text("missing_participants.tsv"), &request(ImportMode::Replace))
        .await
        .unwrap_err();

    let messages = err.messages();
    assert_eq!(messages.len(), MAX_VALIDATION_ERRORS);
    assert_eq!(
        messages,
        vec![
            "Row 1: field Subject is required.".to_string(),
            "Row 2: field Subject is required.".to_string(),
            "Row 3: field Subject is required.".to_string(),
        ]
    );
    assert_eq!(
        importer.store().count_rows(EntityKind::Vial, TEST_CONTAINER).unwrap(),
        0
    );
}

#[tokio::test]
async fn test_duplicate_vial_reported_with_uploader_label() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Visit);
    let text = "Subject\tVisit\tdraw Timestamp\tspecimen Number\tGLOBAL UNIQUE ID\n\
                P1\t1\t2024-01-01\tS1\tV1\n\
                P1\t1\t2024-01-01\tS2\tV1\n";

    let err = importer
        .import_text(text, &request(ImportMode::Replace))
        .await
        .unwrap_err();

    assert!(err.is_validation_error());
    assert_eq!(
        err.messages(),
        vec!["Row 2: duplicate value V1 for field GLOBAL UNIQUE ID.".to_string()]
    );
}

#[tokio::test]
async fn test_repeated_sample_defaults_collide_on_vial() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Visit);
    let text = "ParticipantId\tVisit\tDrawTimestamp\tSampleId\n\
                P1\t1\t2024-01-01\tS1\n\
                P1\t1\t2024-01-01\tS1\n";

    let err = importer
        .import_text(text, &request(ImportMode::Replace))
        .await
        .unwrap_err();

    // 样本身份一致不报错；两行的管号都缺省为 S1，第二行重复
    assert_eq!(
        err.messages(),
        vec!["Row 2: duplicate value S1 for field VialId.".to_string()]
    );
}

#[tokio::test]
async fn test_date_based_study_keeps_identifier_text() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Date);

    let summary = importer
        .import_file(&fixture("date_based.tsv"), &request(ImportMode::Replace))
        .await
        .expect("date-based import should not require a visit column");

    assert_eq!(summary.participants, 1);
    let vials = importer.store().list_vials(TEST_CONTAINER).unwrap();
    assert_eq!(vials[0].participant_id, "007");
    assert_eq!(vials[0].visit, None);
}

#[tokio::test]
async fn test_visit_based_study_requires_visit() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Visit);

    let err = importer
        .import_file(&fixture("date_based.tsv"), &request(ImportMode::Replace))
        .await
        .unwrap_err();

    assert_eq!(
        err.messages(),
        vec![
            "Row 1: field Visit is required.".to_string(),
            "Row 2: field Visit is required.".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_replace_then_merge() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Date);

    importer
        .import_file(&fixture("date_based.tsv"), &request(ImportMode::Replace))
        .await
        .unwrap();

    let more = "Participant Id\tdraw Timestamp\tspecimen Number\n008\t2024-04-01\tS-9\n";
    importer
        .import_text(more, &request(ImportMode::Merge))
        .await
        .unwrap();
    assert_eq!(importer.store().list_vials(TEST_CONTAINER).unwrap().len(), 3);

    importer
        .import_text(more, &request(ImportMode::Replace))
        .await
        .unwrap();
    let vials = importer.store().list_vials(TEST_CONTAINER).unwrap();
    assert_eq!(vials.len(), 1);
    assert_eq!(vials[0].global_unique_id, "S-9");
    assert_eq!(
        importer.store().count_rows(EntityKind::ImportBatch, TEST_CONTAINER).unwrap(),
        3
    );
}

#[tokio::test]
async fn test_missing_file_is_load_error() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Visit);

    let err = importer
        .import_file(&fixture("does_not_exist.tsv"), &request(ImportMode::Replace))
        .await
        .unwrap_err();

    assert!(err.is_load_error());
    assert_eq!(err.messages().len(), 1);
}

#[tokio::test]
async fn test_vial_without_sample_cannot_join_another_participants_sample() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let importer = create_test_importer(&db_path, TimepointType::Visit);
    // 第 2 行没有样本号，其管号 S1 与第 1 行的样本号同名
    let text = "Participant Id\tSequence Num\tdraw Timestamp\tspecimen Number\tglobal Unique Id\n\
                P1\t1\t2024-01-01\tS1\tV1\n\
                P2\t5\t2024-01-01\t\tS1\n";

    let err = importer
        .import_text(text, &request(ImportMode::Replace))
        .await
        .unwrap_err();

    assert!(err.is_persistence_error());
    assert_eq!(
        err.messages(),
        vec![
            "Import failed while saving specimen data: Row 2: specimen S1 is already recorded \
             for participant P1, visit 1 on row 1."
                .to_string()
        ]
    );
    let store = importer.store();
    assert_eq!(store.count_rows(EntityKind::Specimen, TEST_CONTAINER).unwrap(), 0);
    assert_eq!(store.count_rows(EntityKind::Vial, TEST_CONTAINER).unwrap(), 0);
}
