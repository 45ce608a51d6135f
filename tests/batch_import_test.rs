// ==========================================
// 批量导入测试
// ==========================================
// 测试目标: 多文件并发导入,单个文件失败不影响其他文件
// ==========================================


use estimate_importer::config::ConfigManager;
use estimate_importer::importer::*;
use estimate_importer::logging;
use rust_decimal::Decimal;
use std::path::PathBuf;
use test_helpers::*;

#[tokio::test]
async fn test_batch_import_multiple_files() {
    logging::init_test();

    let archive = six_archive(&[("documento.xml", &simple_six_document())])
        .expect("Failed to build archive");
    let (_six_dir, six_path) = write_temp_file("scuola.six", &archive).expect("Failed to write file");
    let (_xpwe_dir, xpwe_path) = write_temp_file(
        "computo.xpwe",
        xpwe_document(&xpwe_vc_item(1, "7", "2", &[])).as_bytes(),
    )
    .expect("Failed to write file");
    let missing_path = PathBuf::from("/nonexistent/computo.six");

    let importer = EstimateImporterImpl::new(ConfigManager::new());
    let results = importer
        .batch_import(
            vec![six_path, missing_path, xpwe_path],
            ImportOptions::default(),
        )
        .await;

    assert_eq!(results.len(), 3);

    let six = results[0].as_ref().expect("SIX import failed");
    assert_eq!(six.estimate.total_amount, Some(Decimal::new(5000, 2)));
    assert_eq!(six.batch.file_name.as_deref(), Some("scuola.six"));

    let error = results[1].as_ref().expect_err("missing file must fail");
    assert!(error.contains("computo.six"));

    let xpwe = results[2].as_ref().expect("XPWE import failed");
    assert_eq!(xpwe.estimate.total_amount, Some(Decimal::new(4000, 2)));

    // 批次 ID 互不相同
    assert_ne!(six.batch.batch_id, xpwe.batch.batch_id);
}

#[tokio::test]
async fn test_batch_import_applies_estimate_selection() {
    let definitions = six_product("P1", "A.01", "Intonaco", Some("1"), &[("10", "10")], &[]);
    let estimates = [
        six_preventivo("PV1", "Base", Some("10"), &six_rilevazione("P1", 1, &[("+", vec![("1", 1)])], &[])),
        six_preventivo("PV2", "Variante", Some("10"), &six_rilevazione("P1", 1, &[("+", vec![("3", 1)])], &[])),
    ]
    .concat();
    let xml = six_document(None, &definitions, &estimates);
    let (_dir, path) = write_temp_file("varianti.xml", xml.as_bytes()).expect("Failed to write file");

    let importer = EstimateImporterImpl::new(ConfigManager::new());

    let ambiguous = importer
        .batch_import(vec![path.clone()], ImportOptions::default())
        .await;
    assert!(ambiguous[0].is_err());

    let selected = importer
        .batch_import(vec![path], ImportOptions::with_estimate("PV2"))
        .await;
    let report = selected[0].as_ref().expect("Import failed");
    assert_eq!(report.estimate.estimate_id, "PV2");
    assert_eq!(report.estimate.total_amount, Some(Decimal::new(3000, 2)));
}
