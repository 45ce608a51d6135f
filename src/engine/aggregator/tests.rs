use super::*;
use crate::domain::catalog::{DefinitionTables, PriceList, Product, Unit};
use crate::domain::measurement::{Measurement, ProgressiveKey, ReferenceEntry};
use crate::domain::types::{AnomalyKind, Operation};
use crate::engine::wbs::WbsBuilder;
use crate::importer::error::ImportError;
use indexmap::IndexMap;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

// ==========================================
// 测试辅助函数
// ==========================================

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// 创建测试用的产品
fn product(id: &str, code: &str, prices: &[(&str, &str)], wbs6: Option<&str>) -> Product {
    let mut price_by_list = IndexMap::new();
    let mut price_priority = HashMap::new();
    for (list, value) in prices {
        price_by_list.insert(list.to_string(), d(value));
        price_priority.insert(
            list.to_string(),
            if *list == "prezzi_base" { 2 } else { 0 },
        );
    }
    Product {
        id: id.to_string(),
        code: code.to_string(),
        description: format!("Voce {}", code),
        unit: Some("U1".to_string()),
        price_by_list,
        price_priority,
        wbs6_code: wbs6.map(String::from),
        wbs6_description: None,
        wbs7_code: None,
        wbs7_description: None,
        is_parent_voice: false,
        enriched_description: format!("Voce {}", code),
    }
}

fn price_list(id: &str, priority: u8) -> PriceList {
    PriceList {
        raw_id: id.to_string(),
        canonical_id: id.to_string(),
        label: id.to_string(),
        priority,
        preferred: false,
    }
}

/// 创建测试用的定义表
fn tables() -> DefinitionTables {
    let mut tables = DefinitionTables::default();
    tables.units.insert(
        "U1".to_string(),
        Unit {
            id: "U1".to_string(),
            symbol: "m2".to_string(),
        },
    );
    tables.price_lists = vec![
        price_list("prezzi_base", 2),
        price_list("listino_a", 0),
        price_list("listino_b", 0),
    ];
    for p in [
        product("P1", "A.01", &[("prezzi_base", "10.00")], Some("OS01")),
        product(
            "P2",
            "B.02",
            &[("listino_a", "5.00"), ("listino_b", "7.00")],
            Some("OS02"),
        ),
        product("P3", "C.03", &[], Some("OS03")),
        product("P4", "L032.020.07", &[("prezzi_base", "1.00")], None),
    ] {
        tables.products.insert(p.id.clone(), p);
    }
    tables
}

/// 创建已解析的测量行
fn row(sequence_index: usize, product_id: &str, quantity: Option<&str>) -> Measurement {
    Measurement {
        estimate_id: "E1".to_string(),
        sequence_index,
        row_index: 0,
        product_id: product_id.to_string(),
        progressive: Some(sequence_index as i64 + 1),
        price_list_id_raw: None,
        spatial_wbs_refs: vec![],
        operation: Operation::Add,
        cells: vec![],
        comments: vec![],
        reference_entries: vec![],
        quantity_direct: quantity.map(d),
        quantity_resolved: quantity.map(d),
    }
}

fn aggregate(tables: &DefinitionTables, rows: &[Measurement]) -> AggregationOutput {
    let wbs = WbsBuilder::new("UNMAPPED");
    let mut aggregator = VoiceAggregator::new("E1", tables, &wbs, vec!["prezzi_base".to_string()]);
    aggregator.extend(rows).unwrap();
    aggregator.finish().unwrap()
}

// ==========================================
// 金额与数量
// ==========================================

#[test]
fn test_single_row_voice() {
    let tables = tables();
    let out = aggregate(&tables, &[row(0, "P1", Some("5"))]);

    assert_eq!(out.voices.len(), 1);
    let voice = &out.voices[0];
    assert_eq!(voice.order, 1);
    assert_eq!(voice.quantity.to_string(), "5.00");
    assert_eq!(voice.unit_price, d("10.00"));
    assert_eq!(voice.amount.to_string(), "50.00");
    assert_eq!(voice.unit.as_deref(), Some("m2"));
    assert_eq!(out.total_amount.unwrap().to_string(), "50.00");
    assert_eq!(out.stats.imported, 1);
}

#[test]
fn test_amount_rounded_per_row_not_per_voice() {
    let tables = tables();
    let mut first = row(0, "P4", Some("0.005"));
    first.row_index = 0;
    let mut second = row(0, "P4", Some("0.005"));
    second.row_index = 1;
    let out = aggregate(&tables, &[first, second]);

    assert_eq!(out.voices.len(), 1);
    // 每行 round_half_up(0.005 × 1, 2) = 0.01
    assert_eq!(out.voices[0].amount, d("0.02"));
    // 数量累加不舍入: 0.010 → 0.01
    assert_eq!(out.voices[0].quantity, d("0.01"));
    assert_eq!(out.voices[0].metadata.measurement_rows, 2);
}

#[test]
fn test_deduction_rows_net_out() {
    let tables = tables();
    let out = aggregate(
        &tables,
        &[row(0, "P1", Some("5")), row(0, "P1", Some("-5"))],
    );
    assert_eq!(out.voices[0].quantity.to_string(), "0.00");
    assert_eq!(out.voices[0].amount.to_string(), "0.00");
    assert_eq!(out.total_amount.unwrap().to_string(), "0.00");
}

#[test]
fn test_different_sequence_index_not_merged() {
    let tables = tables();
    let mut first = row(0, "P1", Some("1"));
    let mut second = row(1, "P1", Some("2"));
    first.progressive = None;
    second.progressive = None;
    let out = aggregate(&tables, &[first, second]);
    assert_eq!(out.voices.len(), 2);
    assert_eq!(out.voices[1].order, 2);
    assert_eq!(out.total_amount, Some(d("30.00")));
    assert_eq!(out.total_quantity, Some(d("3.00")));
}

#[test]
fn test_unit_price_quantized_to_two_places() {
    let mut tables = tables();
    let integral = product("P5", "D.04", &[("prezzi_base", "10")], Some("OS04"));
    tables.products.insert(integral.id.clone(), integral);

    let out = aggregate(&tables, &[row(0, "P5", Some("3"))]);
    assert_eq!(out.voices[0].unit_price.to_string(), "10.00");
    assert_eq!(out.voices[0].amount.to_string(), "30.00");
}

#[test]
fn test_total_overflow_is_error() {
    let tables = tables();
    let huge = "50000000000000000000000000000";
    let rows = [row(0, "P4", Some(huge)), row(1, "P4", Some(huge))];

    let wbs = WbsBuilder::new("UNMAPPED");
    let mut aggregator = VoiceAggregator::new("E1", &tables, &wbs, vec!["prezzi_base".to_string()]);
    aggregator.extend(&rows).unwrap();
    assert!(matches!(
        aggregator.finish(),
        Err(ImportError::InternalError(_))
    ));
}

proptest! {
    #[test]
    fn prop_totals_invariant_under_row_permutation(
        rows in proptest::collection::vec(
            (0..4usize, 0..4usize, -100_000..100_000i64, 0..3u32, any::<u32>()),
            1..24,
        )
    ) {
        let tables = tables();
        let products = ["P1", "P2", "P3", "P4"];
        let original: Vec<(u32, Measurement)> = rows
            .iter()
            .enumerate()
            .map(|(i, (seq, product, mantissa, scale, sort_key))| {
                let mut measurement = row(*seq, products[*product], None);
                measurement.row_index = i;
                measurement.quantity_resolved = Some(Decimal::new(*mantissa, *scale));
                (*sort_key, measurement)
            })
            .collect();
        let mut permuted = original.clone();
        permuted.sort_by_key(|(sort_key, _)| *sort_key);

        let before: Vec<Measurement> = original.into_iter().map(|(_, m)| m).collect();
        let after: Vec<Measurement> = permuted.into_iter().map(|(_, m)| m).collect();
        let a = aggregate(&tables, &before);
        let b = aggregate(&tables, &after);

        prop_assert_eq!(a.total_amount, b.total_amount);
        prop_assert_eq!(a.total_quantity, b.total_quantity);
        prop_assert_eq!(a.voices.len(), b.voices.len());
    }
}

// ==========================================
// 可恢复异常
// ==========================================

#[test]
fn test_missing_product_skipped() {
    let tables = tables();
    let out = aggregate(
        &tables,
        &[row(0, "NOPE", Some("3")), row(1, "P1", Some("1"))],
    );
    assert_eq!(out.voices.len(), 1);
    assert_eq!(out.stats.ignored_missing_product, 1);
    assert_eq!(out.stats.measurements_total, 2);
    assert_eq!(out.anomalies[0].kind, AnomalyKind::MissingProduct);
}

#[test]
fn test_empty_rows_produce_no_voice() {
    let tables = tables();
    let out = aggregate(&tables, &[row(0, "P1", None)]);
    assert!(out.voices.is_empty());
    assert_eq!(out.total_amount, None);
    assert_eq!(out.stats.ignored_empty_rows, 1);
}

#[test]
fn test_explicit_zero_row_produces_voice() {
    let tables = tables();
    let out = aggregate(&tables, &[row(0, "P1", Some("0"))]);
    assert_eq!(out.voices.len(), 1);
    assert_eq!(out.voices[0].amount.to_string(), "0.00");
}

#[test]
fn test_missing_price_zeroed() {
    let tables = tables();
    let out = aggregate(&tables, &[row(0, "P3", Some("4"))]);
    assert_eq!(out.voices[0].unit_price, Decimal::ZERO);
    assert_eq!(out.voices[0].amount.to_string(), "0.00");
    assert_eq!(out.stats.missing_price_zeroed, 1);
}

#[test]
fn test_first_seen_price_wins() {
    let tables = tables();
    let mut first = row(0, "P2", Some("1"));
    first.price_list_id_raw = Some("listino_b".to_string());
    let mut second = row(0, "P2", Some("1"));
    second.price_list_id_raw = Some("listino_a".to_string());
    let out = aggregate(&tables, &[first, second]);

    assert_eq!(out.voices.len(), 1);
    assert_eq!(out.voices[0].unit_price, d("7.00"));
    assert_eq!(out.voices[0].amount, d("14.00"));
    assert_eq!(out.stats.price_conflicts, 1);
    assert_eq!(
        out.voices[0].metadata.price_list_used.as_deref(),
        Some("listino_b")
    );
}

#[test]
fn test_fallback_wbs6_counted_once_per_voice() {
    let tables = tables();
    let mut second = row(0, "P4", Some("1"));
    second.row_index = 1;
    let out = aggregate(&tables, &[row(0, "P4", Some("1")), second]);
    assert_eq!(out.stats.fallback_wbs6_generated, 1);
    let voice = &out.voices[0];
    assert!(voice.metadata.fallback_wbs6);
    assert_eq!(voice.wbs_level(6).unwrap().code, "L03202007");
}

#[test]
fn test_metadata_collects_notes_and_references() {
    let tables = tables();
    let mut r = row(0, "P1", Some("2"));
    r.comments = vec!["vedi voce 7".to_string(), "  ".to_string()];
    r.reference_entries = vec![ReferenceEntry {
        target: ProgressiveKey::new("E1", 7),
        multiplier: Decimal::ONE,
    }];
    let out = aggregate(&tables, &[r]);
    let meta = &out.voices[0].metadata;
    assert_eq!(out.voices[0].notes, vec!["vedi voce 7".to_string()]);
    assert_eq!(meta.reference_keys, vec!["E1#7".to_string()]);
    assert_eq!(meta.progressive_keys, vec!["E1#1".to_string()]);
    assert!(meta.price_list_ids.contains(&"prezzi_base".to_string()));
}

// ==========================================
// 价目目录
// ==========================================

#[test]
fn test_price_catalog_dedup() {
    let mut tables = tables();
    let duplicate = product("P9", " a.01 ", &[("listino_a", "9.00")], Some("os01"));
    tables.products.insert(duplicate.id.clone(), duplicate);

    let catalog = build_price_catalog(&tables, &["prezzi_base".to_string()]);
    assert_eq!(catalog.len(), 4);
    let first = &catalog[0];
    assert_eq!(first.product_id, "P1");
    assert_eq!(first.prices.len(), 2);
    assert_eq!(first.preferred_price, Some(d("10.00")));
    assert_eq!(first.unit.as_deref(), Some("m2"));
}
