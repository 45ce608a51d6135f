// ==========================================
// 配置集成测试
// ==========================================
// 测试目标: JSON 配置覆写对导入流程的影响
// ==========================================


use estimate_importer::config::{ConfigManager, ImportConfigReader};
use estimate_importer::importer::*;
use rust_decimal::Decimal;
use test_helpers::*;

fn two_list_document() -> String {
    let definitions = format!(
        r#"<listaQuotazione listaQuotazioneId="20"><descrizione breve="Listino variante"/></listaQuotazione>{}"#,
        six_product("P1", "A.01", "Intonaco", Some("1"), &[("10", "10"), ("20", "8")], &[])
    );
    let body = [
        six_rilevazione("P1", 1, &[("+", vec![("1+2+3", 1)])], &[]),
        six_rilevazione("P1", 2, &[("+", vec![("2", 1)])], &["cfr 1"]),
    ]
    .concat();
    six_document(None, &definitions, &six_preventivo("PV1", "Progetto", Some("10"), &body))
}

#[test]
fn test_json_config_overrides_defaults() {
    let manager = ConfigManager::from_json_str(
        r#"{
            "max_formula_length": 16,
            "preferred_price_list_keywords": ["variante"],
            "reference_pattern": "(?i)cfr\\s+(\\d+)",
            "fallback_wbs6_code": " ALTRO "
        }"#,
    )
    .expect("Failed to parse config");

    let snapshot = manager.snapshot().expect("Invalid config");
    assert_eq!(snapshot.max_formula_length, 16);
    assert_eq!(snapshot.preferred_price_list_keywords, vec!["variante".to_string()]);
    assert_eq!(snapshot.fallback_wbs6_code, "ALTRO");

    let report = EstimateImporterImpl::new(manager)
        .import_bytes(None, two_list_document().as_bytes(), &ImportOptions::default())
        .expect("Import failed");

    let variante = report
        .estimate
        .price_lists
        .iter()
        .find(|pl| pl.canonical_id == "listino_variante")
        .expect("price list");
    assert!(variante.preferred);

    // "cfr 1" 由自定义正则识别: 2 × 6
    let voices = &report.estimate.voices;
    assert_eq!(voices[0].quantity, Decimal::new(600, 2));
    assert_eq!(voices[1].quantity, Decimal::new(1200, 2));
}

#[test]
fn test_formula_length_limit_blanks_cell() {
    let mut manager = ConfigManager::new();
    manager.set("max_formula_length", "3");

    let report = EstimateImporterImpl::new(manager)
        .import_bytes(None, two_list_document().as_bytes(), &ImportOptions::default())
        .expect("Import failed");

    // "1+2+3" 超长 → 非数值;默认正则不识别 "cfr 1" → 第 2 行按直接工程量计
    assert_eq!(report.summary.ignored_empty_rows, 1);
    assert_eq!(report.estimate.voices.len(), 1);
    assert_eq!(report.estimate.total_amount, Some(Decimal::new(2000, 2)));
}

#[test]
fn test_invalid_config_value_fails_import() {
    let mut manager = ConfigManager::new();
    manager.set("reference_pattern", "vedi (");

    let result = EstimateImporterImpl::new(manager).import_bytes(
        None,
        simple_six_document().as_bytes(),
        &ImportOptions::default(),
    );
    assert!(matches!(result, Err(ImportError::ConfigValueError { .. })));
}

#[test]
fn test_config_file_missing() {
    assert!(matches!(
        ConfigManager::from_json_file("/nonexistent/import.json"),
        Err(ImportError::FileNotFound(_))
    ));
}
