// ==========================================
// 计量计价导入 - XPWE (PriMus) 方言解析
// ==========================================
// 分类: DGSuperCategorie → 空间 1, DGCategorie → 2, DGSubCategorie → 3
//       DGSuperCapitoli → WBS6, DGCapitoli → WBS7
// 价目: EPItem 的 Prezzo1..Prezzo5 → 价目表 prezzo1..prezzo5（第 1 列为基准价）
// 计量: VCItem > PweVCMisure > RGItem,单元格位置 1-4 依次为
//       PartiUguali / Lunghezza / Larghezza / HPeso
// 红线: XPWE 文档只有一个预算方案 computo
// ==========================================

use crate::domain::measurement::{ParsedDocument, ParsedEstimate, RawCell, RawMeasurement};
use crate::domain::types::{GroupKind, Operation, SourceFormat};
use crate::engine::session::ParseSession;
use crate::importer::definition_tables::{parse_decimal, DefinitionTablesBuilder, ProductDraft};
use crate::importer::error::ImportResult;
use crate::importer::estimate_importer_trait::DialectParser;
use crate::importer::xml_tree::{XmlDocument, XmlElement};
use tracing::{debug, info, warn};

pub const XPWE_ESTIMATE_ID: &str = "computo";

const PRICE_COLUMNS: usize = 5;
const BASE_PRICE_LABEL: &str = "Prezzi base";
const DEDUCTION_FLAG: i64 = 1;

/// (元素名, 分组 ID 前缀, 分组类型, 类型标签)
const CATEGORY_KINDS: [(&str, &str, GroupKind, &str); 5] = [
    ("DGSuperCategorieItem", "spcat", GroupKind::Spatial(1), "SuperCategorie"),
    ("DGCategorieItem", "cat", GroupKind::Spatial(2), "Categorie"),
    ("DGSubCategorieItem", "sbcat", GroupKind::Spatial(3), "SubCategorie"),
    ("DGSuperCapitoliItem", "spcap", GroupKind::Wbs6, "SuperCapitoli"),
    ("DGCapitoliItem", "cap", GroupKind::Wbs7, "Capitoli"),
];

/// 分类引用 → 分组 ID（0/空 表示未分类）
fn group_ref(prefix: &str, value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value == "0" {
        return None;
    }
    Some(format!("{}:{}", prefix, value))
}

fn price_list_id(column: usize) -> String {
    format!("prezzo{}", column)
}

// ==========================================
// XpweParser - XPWE 方言解析器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct XpweParser;

impl XpweParser {
    pub fn new() -> Self {
        Self
    }

    fn title(root: &XmlElement) -> Option<String> {
        root.descendants("Oggetto")
            .into_iter()
            .find_map(XmlElement::text)
            .map(str::to_string)
    }

    fn parse_categories(root: &XmlElement, builder: &mut DefinitionTablesBuilder<'_>) {
        for (element_name, prefix, kind, label) in CATEGORY_KINDS {
            for item in root.descendants(element_name) {
                let Some(id) = group_ref(prefix, item.attr("ID")) else {
                    continue;
                };
                let description = item
                    .child_text("DesSintetica")
                    .or_else(|| item.child_text("DesEstesa"));
                let code = item.child_text("Codice").or(description);
                builder.add_group_value_with_kind(&id, code, description, label, kind);
            }
        }
    }

    fn parse_price_list(root: &XmlElement, builder: &mut DefinitionTablesBuilder<'_>) {
        let items = root.descendants("EPItem");

        // 只登记实际出现价格的列（第 1 列总是登记）
        let mut used = [false; PRICE_COLUMNS];
        let mut drafts = Vec::with_capacity(items.len());
        for item in items {
            let Some(id) = item.attr("ID") else {
                continue;
            };
            let mut prices = Vec::new();
            for column in 1..=PRICE_COLUMNS {
                let Some(value) = item
                    .child_text(&format!("Prezzo{}", column))
                    .and_then(parse_decimal)
                else {
                    continue;
                };
                if column > 1 && value.is_zero() {
                    continue;
                }
                used[column - 1] = true;
                prices.push((price_list_id(column), value));
            }

            let description = item
                .child_text("DesBreve")
                .or_else(|| item.child_text("DesRidotta"))
                .or_else(|| item.child_text("DesEstesa"))
                .unwrap_or_default();

            drafts.push(ProductDraft {
                id: id.to_string(),
                code: item.child_text("Tariffa").unwrap_or(id).to_string(),
                description: description.to_string(),
                unit_ref: item.child_text("UnMisura").map(str::to_string),
                prices,
                group_refs: [
                    group_ref("spcap", item.child_text("IDSpCap")),
                    group_ref("cap", item.child_text("IDCap")),
                ]
                .into_iter()
                .flatten()
                .collect(),
                is_parent_voice: None,
            });
        }

        if !drafts.is_empty() {
            used[0] = true;
        }
        for (index, _) in used.iter().enumerate().filter(|(_, used)| **used) {
            let column = index + 1;
            let label = if column == 1 {
                BASE_PRICE_LABEL.to_string()
            } else {
                format!("Prezzo {}", column)
            };
            builder.add_price_list(&price_list_id(column), Some(&label));
        }
        for draft in drafts {
            builder.add_product(draft);
        }
    }

    fn parse_estimate(root: &XmlElement, label: Option<String>) -> ParsedEstimate {
        let mut measurements = Vec::new();

        for (sequence_index, item) in root.descendants("VCItem").into_iter().enumerate() {
            let Some(product_id) = item.child_text("IDEP") else {
                warn!(sequence_index, "VCItem 缺少 IDEP,跳过");
                continue;
            };
            let progressive = item.attr("ID").and_then(|p| p.parse::<i64>().ok());
            let spatial_wbs_refs: Vec<String> = [
                group_ref("spcat", item.child_text("IDSpCat")),
                group_ref("cat", item.child_text("IDCat")),
                group_ref("sbcat", item.child_text("IDSbCat")),
            ]
            .into_iter()
            .flatten()
            .collect();

            let template = RawMeasurement {
                estimate_id: XPWE_ESTIMATE_ID.to_string(),
                sequence_index,
                row_index: 0,
                product_id: product_id.to_string(),
                progressive,
                price_list_id_raw: None,
                spatial_wbs_refs,
                operation: Operation::Add,
                cells: Vec::new(),
                comments: Vec::new(),
                linked_progressives: Vec::new(),
            };

            let rows: Vec<&XmlElement> = item.descendants("RGItem");
            if rows.is_empty() {
                // 无测量明细: Quantita 作为单一单元格
                let mut raw = template.clone();
                if let Some(quantity) = item.child_text("Quantita") {
                    raw.cells.push(RawCell::new(1, quantity));
                }
                measurements.push(raw);
                continue;
            }

            for (row_index, row) in rows.into_iter().enumerate() {
                let mut raw = template.clone();
                raw.row_index = row_index;
                raw.cells = ["PartiUguali", "Lunghezza", "Larghezza", "HPeso"]
                    .iter()
                    .enumerate()
                    .filter_map(|(i, field)| {
                        row.child_text(field)
                            .map(|text| RawCell::new(i as u32 + 1, text))
                    })
                    .collect();

                let flags = row
                    .child_text("Flags")
                    .and_then(|f| f.parse::<i64>().ok())
                    .unwrap_or(0);
                if flags & DEDUCTION_FLAG != 0 {
                    raw.operation = Operation::Subtract;
                }
                if let Some(target) = row
                    .child_text("IDVV")
                    .and_then(|v| v.parse::<i64>().ok())
                    .filter(|v| *v > 0)
                {
                    raw.linked_progressives.push(target);
                }
                if let Some(description) = row.child_text("Descrizione") {
                    raw.comments.push(description.to_string());
                }
                measurements.push(raw);
            }
        }

        debug!(rows = measurements.len(), "computo 解析完成");
        ParsedEstimate {
            id: XPWE_ESTIMATE_ID.to_string(),
            label,
            default_price_list_raw: Some(price_list_id(1)),
            measurements,
        }
    }
}

impl DialectParser for XpweParser {
    fn dialect(&self) -> &'static str {
        "XPWE"
    }

    fn parse(
        &self,
        document: &XmlDocument,
        source_format: SourceFormat,
        session: &mut ParseSession,
    ) -> ImportResult<ParsedDocument> {
        let root = &document.root;

        let tables = {
            let mut builder = DefinitionTablesBuilder::new(session.canonicalizer_mut());
            Self::parse_categories(root, &mut builder);
            Self::parse_price_list(root, &mut builder);
            builder.finish()
        };

        let title = Self::title(root);
        let estimate = Self::parse_estimate(root, title.clone());

        info!(
            products = tables.products.len(),
            rows = estimate.measurements.len(),
            "XPWE 文档解析完成"
        );

        Ok(ParsedDocument {
            source_format,
            title,
            tables,
            estimates: vec![estimate],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;

    const DOC: &str = r#"<PweDocumento>
  <PweDatiGenerali>
    <PweDGProgetto><PweDGDatiGenerali><Oggetto>Ristrutturazione</Oggetto></PweDGDatiGenerali></PweDGProgetto>
    <PweDGCapitoliCategorie>
      <PweDGSuperCapitoli><DGSuperCapitoliItem ID="1"><DesSintetica>Opere edili</DesSintetica></DGSuperCapitoliItem></PweDGSuperCapitoli>
      <PweDGSuperCategorie><DGSuperCategorieItem ID="2"><DesSintetica>Piano terra</DesSintetica></DGSuperCategorieItem></PweDGSuperCategorie>
    </PweDGCapitoliCategorie>
  </PweDatiGenerali>
  <PweMisurazioni>
    <PweElencoPrezzi>
      <EPItem ID="7">
        <Tariffa>E.01</Tariffa><DesBreve>Muratura</DesBreve><UnMisura>m2</UnMisura>
        <Prezzo1>20,00</Prezzo1><Prezzo2>0</Prezzo2><Prezzo3>18.5</Prezzo3>
        <IDSpCap>1</IDSpCap><IDCap>0</IDCap>
      </EPItem>
    </PweElencoPrezzi>
    <PweVociComputo>
      <VCItem ID="1"><IDEP>7</IDEP><Quantita>3</Quantita><IDSpCat>2</IDSpCat><IDCat>0</IDCat></VCItem>
      <VCItem ID="2"><IDEP>7</IDEP><Quantita>0</Quantita>
        <PweVCMisure>
          <RGItem ID="1"><IDVV>0</IDVV><Descrizione>muro</Descrizione><PartiUguali>2</PartiUguali><Lunghezza>3</Lunghezza><HPeso>1,5</HPeso><Flags>0</Flags></RGItem>
          <RGItem ID="2"><IDVV>1</IDVV><Descrizione>Vedi voce n° 1</Descrizione><Flags>1</Flags></RGItem>
        </PweVCMisure>
      </VCItem>
    </PweVociComputo>
  </PweMisurazioni>
</PweDocumento>"#;

    fn parse() -> ParsedDocument {
        let mut session = ParseSession::new(ImportConfig::default()).unwrap();
        let document = XmlDocument::parse(DOC).unwrap();
        XpweParser::new()
            .parse(&document, SourceFormat::Xpwe, &mut session)
            .unwrap()
    }

    #[test]
    fn test_parse_price_list_columns() {
        let doc = parse();
        let ids: Vec<_> = doc
            .tables
            .price_lists
            .iter()
            .map(|pl| pl.canonical_id.as_str())
            .collect();
        assert_eq!(ids, vec!["prezzi_base", "prezzo_3"]);

        let product = doc.tables.product("7").unwrap();
        assert_eq!(product.code, "E.01");
        assert_eq!(product.price_by_list.len(), 2);
        assert_eq!(product.wbs6_code.as_deref(), Some("Opere edili"));
        assert_eq!(doc.title.as_deref(), Some("Ristrutturazione"));
    }

    #[test]
    fn test_parse_voices_and_rows() {
        let doc = parse();
        let estimate = &doc.estimates[0];
        assert_eq!(estimate.id, XPWE_ESTIMATE_ID);
        let rows = &estimate.measurements;
        assert_eq!(rows.len(), 3);

        // 无明细行: Quantita 作为单元格
        assert_eq!(rows[0].cells, vec![RawCell::new(1, "3")]);
        assert_eq!(rows[0].spatial_wbs_refs, vec!["spcat:2".to_string()]);

        assert_eq!(rows[1].cells.len(), 3);
        assert_eq!(rows[1].cells[2], RawCell::new(4, "1,5"));
        assert_eq!(rows[2].operation, Operation::Subtract);
        assert_eq!(rows[2].linked_progressives, vec![1]);
        assert_eq!(rows[2].progressive, Some(2));
    }
}
