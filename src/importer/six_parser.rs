// ==========================================
// 计量计价导入 - SIX (STR Vision) 方言解析
// ==========================================
// 输入: 命名空间无关的 XML 树
// 输出: 定义表 + 每个 preventivo 的原始测量行
// ==========================================
// 元素（本地名）:
//   unitaDiMisura / listino | listaQuotazione / gruppo > grpValore
//   prodotto > prdDescrizione, prdQuotazione, prdGrpValore
//   preventivo > prvDescrizione, prvRilevazione > prvGrpValore, prvCommento,
//                prvMisura > prvCella, prvCommento
// ==========================================

use crate::domain::measurement::{ParsedDocument, ParsedEstimate, RawCell, RawMeasurement};
use crate::domain::types::{Operation, SourceFormat};
use crate::engine::session::ParseSession;
use crate::importer::definition_tables::{
    parse_decimal, parse_flag, DefinitionTablesBuilder, ProductDraft,
};
use crate::importer::error::ImportResult;
use crate::importer::estimate_importer_trait::DialectParser;
use crate::importer::xml_tree::{XmlDocument, XmlElement};
use tracing::{debug, info, warn};

// ==========================================
// SixParser - SIX 方言解析器
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct SixParser;

impl SixParser {
    pub fn new() -> Self {
        Self
    }

    fn description_of(element: &XmlElement, child: &str) -> Option<String> {
        element
            .child(child)
            .and_then(|d| d.attr("breve").or_else(|| d.attr("estesa")).or_else(|| d.text()))
            .map(str::to_string)
    }

    fn comment_text(element: &XmlElement) -> Option<String> {
        element
            .attr("estesa")
            .or_else(|| element.attr("breve"))
            .or_else(|| element.text())
            .map(str::to_string)
    }

    /// 文档标题: intestazione/descrizione@breve,否则首个 prvDescrizione@breve
    fn title(root: &XmlElement) -> Option<String> {
        root.descendants("intestazione")
            .into_iter()
            .find_map(|header| header.child("descrizione").and_then(|d| d.attr("breve")))
            .or_else(|| {
                root.descendants("prvDescrizione")
                    .into_iter()
                    .find_map(|d| d.attr("breve"))
            })
            .map(str::to_string)
    }

    // ==========================================
    // 定义表
    // ==========================================

    fn parse_definitions(root: &XmlElement, builder: &mut DefinitionTablesBuilder<'_>) {
        for unit in root.descendants("unitaDiMisura") {
            if let Some(id) = unit.attr("unitaDiMisuraId") {
                builder.add_unit(id, unit.attr("simbolo"));
            }
        }

        for (element, id_attr) in root
            .descendants("listino")
            .into_iter()
            .map(|e| (e, "listinoId"))
            .chain(
                root.descendants("listaQuotazione")
                    .into_iter()
                    .map(|e| (e, "listaQuotazioneId")),
            )
        {
            let Some(raw_id) = element.attr(id_attr) else {
                continue;
            };
            let label = element
                .child("descrizione")
                .and_then(|d| d.attr("breve"))
                .or_else(|| element.attr("descrizione"));
            builder.add_price_list(raw_id, label);
        }

        for group in root.descendants("gruppo") {
            let label = group.attr("tipo").unwrap_or_default();
            for value in group.children("grpValore") {
                let Some(id) = value.attr("grpValoreId") else {
                    continue;
                };
                let description = value
                    .child("vlrDescrizione")
                    .and_then(|d| d.attr("breve"))
                    .or_else(|| value.attr("descrizione"));
                builder.add_group_value(id, value.attr("vlrId"), description, label);
            }
        }

        for product in root.descendants("prodotto") {
            let Some(id) = product.attr("prodottoId") else {
                continue;
            };
            let prices: Vec<_> = product
                .children("prdQuotazione")
                .filter_map(|q| {
                    let list = q.attr("listaQuotazioneId")?;
                    let value = parse_decimal(q.attr("valore")?)?;
                    Some((list.to_string(), value))
                })
                .collect();
            // 报价引用的价目表未单独定义时按 raw_id 登记
            for (list, _) in &prices {
                if !builder.has_price_list(list) {
                    builder.add_price_list(list, None);
                }
            }
            let unit_ref = product.attr("unitaDiMisuraId").map(str::to_string);
            let is_parent_voice = if product.attr("voceMadre").is_some() {
                Some(parse_flag(product.attr("voceMadre")))
            } else {
                None
            };

            builder.add_product(ProductDraft {
                id: id.to_string(),
                code: product.attr("prdId").unwrap_or(id).to_string(),
                description: Self::description_of(product, "prdDescrizione").unwrap_or_default(),
                unit_ref,
                prices,
                group_refs: product
                    .children("prdGrpValore")
                    .filter_map(|g| g.attr("grpValoreId"))
                    .map(str::to_string)
                    .collect(),
                is_parent_voice,
            });
        }
    }

    // ==========================================
    // 预算方案
    // ==========================================

    fn parse_estimate(preventivo: &XmlElement, index: usize) -> ParsedEstimate {
        let id = preventivo
            .attr("preventivoId")
            .or_else(|| preventivo.attr("prvId"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("preventivo-{}", index + 1));
        let label = preventivo
            .child("prvDescrizione")
            .and_then(|d| d.attr("breve"))
            .map(str::to_string);

        let mut measurements = Vec::new();
        for (sequence_index, rilevazione) in preventivo
            .descendants("prvRilevazione")
            .into_iter()
            .enumerate()
        {
            let Some(product_id) = rilevazione.attr("prodottoId") else {
                warn!(estimate_id = %id, sequence_index, "rilevazione 缺少 prodottoId,跳过");
                continue;
            };
            let progressive = rilevazione
                .attr("progressivo")
                .and_then(|p| p.parse::<i64>().ok());
            let spatial_wbs_refs: Vec<String> = rilevazione
                .children("prvGrpValore")
                .filter_map(|g| g.attr("grpValoreId"))
                .map(str::to_string)
                .collect();
            let item_comments: Vec<String> = rilevazione
                .children("prvCommento")
                .filter_map(Self::comment_text)
                .collect();

            let template = RawMeasurement {
                estimate_id: id.clone(),
                sequence_index,
                row_index: 0,
                product_id: product_id.to_string(),
                progressive,
                price_list_id_raw: rilevazione.attr("listaQuotazioneId").map(str::to_string),
                spatial_wbs_refs,
                operation: Operation::Add,
                cells: Vec::new(),
                comments: Vec::new(),
                linked_progressives: Vec::new(),
            };

            let rows: Vec<&XmlElement> = rilevazione.children("prvMisura").collect();
            if rows.is_empty() {
                // 无测量行: 条目级注释挂在一条空行上（可能携带引用）
                let mut raw = template.clone();
                raw.comments = item_comments;
                measurements.push(raw);
                continue;
            }

            for (row_index, row) in rows.into_iter().enumerate() {
                let mut raw = template.clone();
                raw.row_index = row_index;
                raw.operation = Operation::from_symbol(row.attr("operazione"));
                raw.cells = row
                    .children("prvCella")
                    .map(|cell| RawCell {
                        position: cell.attr("posizione").and_then(|p| p.parse::<u32>().ok()),
                        text: cell
                            .attr("testo")
                            .or_else(|| cell.text())
                            .unwrap_or_default()
                            .to_string(),
                    })
                    .collect();
                // 条目级注释只挂在首行,避免引用重复计入
                if row_index == 0 {
                    raw.comments.extend(item_comments.iter().cloned());
                }
                raw.comments
                    .extend(row.children("prvCommento").filter_map(Self::comment_text));
                measurements.push(raw);
            }
        }

        debug!(estimate_id = %id, rows = measurements.len(), "preventivo 解析完成");
        ParsedEstimate {
            id,
            label,
            default_price_list_raw: preventivo.attr("listaQuotazioneId").map(str::to_string),
            measurements,
        }
    }
}

impl DialectParser for SixParser {
    fn dialect(&self) -> &'static str {
        "SIX"
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
            Self::parse_definitions(root, &mut builder);
            builder.finish()
        };

        let estimates: Vec<ParsedEstimate> = root
            .descendants("preventivo")
            .into_iter()
            .enumerate()
            .map(|(index, preventivo)| Self::parse_estimate(preventivo, index))
            .collect();

        info!(
            namespace = ?document.namespace,
            products = tables.products.len(),
            estimates = estimates.len(),
            "SIX 文档解析完成"
        );

        Ok(ParsedDocument {
            source_format,
            title: Self::title(root),
            tables,
            estimates,
        })
    }
}
