// ==========================================
// 计量计价导入 - 文件识别与容器解包
// ==========================================
// 支持: .six (zip 容器) / .xml (裸 SIX 或 XPWE,按内容嗅探) / .xpwe
// 红线: 尺寸检查在任何解析之前完成
// ==========================================

use crate::domain::types::SourceFormat;
use crate::importer::error::{ImportError, ImportResult};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const XPWE_ROOT: &str = "PweDocumento";
const SNIFF_WINDOW: usize = 4096;

// ==========================================
// SourceDocument - 物化后的 XML 文本
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub format: SourceFormat,
    pub file_name: Option<String>,
    pub member_name: Option<String>, // 容器内选中的成员
    pub xml: String,
}

/// 识别来源格式
///
/// # 规则
/// - .six → 容器
/// - .xpwe → XPWE
/// - .xml / 无扩展名 → 嗅探: zip 魔数 → 容器; 根元素 PweDocumento → XPWE; 否则 SIX
/// - 其他扩展名 → UnsupportedFormat
pub fn detect_format(file_name: Option<&str>, bytes: &[u8]) -> ImportResult<SourceFormat> {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("six") => Ok(SourceFormat::SixArchive),
        Some("xpwe") => Ok(SourceFormat::Xpwe),
        Some("xml") | None => Ok(sniff_format(bytes)),
        Some(other) => Err(ImportError::UnsupportedFormat(format!(".{}", other))),
    }
}

fn sniff_format(bytes: &[u8]) -> SourceFormat {
    if bytes.starts_with(ZIP_MAGIC) {
        return SourceFormat::SixArchive;
    }
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    let head = String::from_utf8_lossy(window);
    if head.contains(&format!("<{}", XPWE_ROOT)) || head.contains(&format!(":{}", XPWE_ROOT)) {
        SourceFormat::Xpwe
    } else {
        SourceFormat::SixXml
    }
}

/// 尺寸检查
pub fn ensure_size(size: usize, limit: usize) -> ImportResult<()> {
    if size > limit {
        return Err(ImportError::DocumentTooLarge { size, limit });
    }
    Ok(())
}

/// 字节 → 文本（去 BOM;非 UTF-8 按 Latin-1 解码）
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("文档非 UTF-8,按 Latin-1 解码");
            bytes.iter().map(|b| char::from(*b)).collect()
        }
    }
}

/// 从 .six 容器选取 XML 成员
///
/// # 规则
/// 成员名按字典序排序;首个以 documento.xml 结尾者优先,否则首个 .xml,都没有 → InvalidContainer
pub fn extract_container(bytes: &[u8], limit: usize) -> ImportResult<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();

    let selected = names
        .iter()
        .find(|n| n.to_lowercase().ends_with("documento.xml"))
        .or_else(|| names.iter().find(|n| n.to_lowercase().ends_with(".xml")))
        .cloned()
        .ok_or_else(|| ImportError::InvalidContainer("容器内没有 XML 文档".to_string()))?;

    let mut member = archive.by_name(&selected)?;
    ensure_size(usize::try_from(member.size()).unwrap_or(usize::MAX), limit)?;

    let mut content = Vec::new();
    member
        .by_ref()
        .take(limit as u64 + 1)
        .read_to_end(&mut content)
        .map_err(|e| ImportError::InvalidContainer(e.to_string()))?;
    ensure_size(content.len(), limit)?;

    debug!(member = %selected, bytes = content.len(), "容器成员已解包");
    Ok((selected, content))
}

/// 读取并物化源文档
///
/// # 参数
/// - limit: 文档字节上限（容器本身与解包后的成员分别检查）
pub fn load_document(
    file_name: Option<&str>,
    bytes: &[u8],
    limit: usize,
) -> ImportResult<SourceDocument> {
    ensure_size(bytes.len(), limit)?;
    let format = detect_format(file_name, bytes)?;

    let (member_name, xml) = match format {
        SourceFormat::SixArchive => {
            let (name, content) = extract_container(bytes, limit)?;
            (Some(name), decode_text(&content))
        }
        SourceFormat::SixXml | SourceFormat::Xpwe => (None, decode_text(bytes)),
    };

    Ok(SourceDocument {
        format,
        file_name: file_name.map(str::to_string),
        member_name,
        xml,
    })
}

/// 从磁盘读取
pub fn read_file(path: &Path, limit: usize) -> ImportResult<Vec<u8>> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    let size = std::fs::metadata(path)?.len();
    ensure_size(usize::try_from(size).unwrap_or(usize::MAX), limit)?;
    Ok(std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn zip_of(members: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect_format(Some("a.SIX"), b"").unwrap(), SourceFormat::SixArchive);
        assert_eq!(detect_format(Some("a.xpwe"), b"").unwrap(), SourceFormat::Xpwe);
        assert!(matches!(
            detect_format(Some("a.xlsx"), b""),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_detect_by_content() {
        assert_eq!(
            detect_format(Some("a.xml"), b"<?xml version=\"1.0\"?><PweDocumento/>").unwrap(),
            SourceFormat::Xpwe
        );
        assert_eq!(
            detect_format(None, b"<documento xmlns=\"six.xsd\"/>").unwrap(),
            SourceFormat::SixXml
        );
        assert_eq!(detect_format(None, ZIP_MAGIC).unwrap(), SourceFormat::SixArchive);
    }

    #[test]
    fn test_container_member_selection() {
        let bytes = zip_of(&[
            ("b/altro.xml", "<b/>"),
            ("a/readme.txt", "x"),
            ("z/documento.xml", "<doc/>"),
        ]);
        let (name, content) = extract_container(&bytes, 1024).unwrap();
        assert_eq!(name, "z/documento.xml");
        assert_eq!(content, b"<doc/>");

        let bytes = zip_of(&[("b.xml", "<b/>"), ("a.xml", "<a/>")]);
        assert_eq!(extract_container(&bytes, 1024).unwrap().0, "a.xml");
    }

    #[test]
    fn test_container_without_xml_is_invalid() {
        let bytes = zip_of(&[("readme.txt", "x")]);
        assert!(matches!(
            extract_container(&bytes, 1024),
            Err(ImportError::InvalidContainer(_))
        ));
        assert!(matches!(
            load_document(Some("broken.six"), b"not a zip", 1024),
            Err(ImportError::InvalidContainer(_))
        ));
    }

    #[test]
    fn test_size_guard_and_bom() {
        assert!(matches!(
            load_document(Some("a.xml"), b"<a/>", 2),
            Err(ImportError::DocumentTooLarge { size: 4, limit: 2 })
        ));
        let doc = load_document(Some("a.xml"), b"\xEF\xBB\xBF<a/>", 100).unwrap();
        assert_eq!(doc.xml, "<a/>");
        assert_eq!(decode_text(b"caf\xE8"), "caf\u{e8}");
    }

    #[test]
    fn test_read_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.six");
        assert!(matches!(
            read_file(&missing, 10),
            Err(ImportError::FileNotFound(_))
        ));
    }
}
