// ==========================================
// 计量计价导入 - 命名空间无关 XML 树
// ==========================================
// 工具: quick-xml 事件流 → 拥有所有权的元素树
// 规则: 元素/属性一律按本地名存储;根元素 xmlns 只检测一次并记录
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

// ==========================================
// XmlElement - 元素节点
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    /// 首个同名子元素
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// 全部同名子元素
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// 深度优先（文档顺序）查找全部同名后代
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.name == name {
                found.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    /// 属性值（已去空白,空值 → None）
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// 文本内容（已去空白,空值 → None）
    pub fn text(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// 子元素文本
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(XmlElement::text)
    }
}

// ==========================================
// XmlDocument - 文档
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlElement,
    pub namespace: Option<String>, // 根元素默认命名空间
}

impl XmlDocument {
    /// 解析 XML 文本
    pub fn parse(xml: &str) -> ImportResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut namespace: Option<String> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let (element, xmlns) = open_element(&start)?;
                    if stack.is_empty() && root.is_none() {
                        namespace = xmlns;
                    }
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let (element, xmlns) = open_element(&start)?;
                    if stack.is_empty() && root.is_none() {
                        namespace = xmlns;
                    }
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        ImportError::XmlParseError("结束标签没有匹配的开始标签".to_string())
                    })?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ImportError::XmlParseError("文档意外结束,存在未闭合元素".to_string()));
        }
        let root = root.ok_or_else(|| ImportError::XmlParseError("文档没有根元素".to_string()))?;
        Ok(Self { root, namespace })
    }
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

/// 开始标签 → 元素（返回默认命名空间声明）
fn open_element(start: &BytesStart<'_>) -> ImportResult<(XmlElement, Option<String>)> {
    let mut element = XmlElement {
        name: local_name(start.name().as_ref()),
        ..XmlElement::default()
    };
    let mut xmlns = None;

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| ImportError::XmlParseError(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        if key == "xmlns" {
            xmlns = Some(value);
            continue;
        }
        if key.starts_with("xmlns:") {
            continue;
        }
        element.attributes.push((local_name(key.as_bytes()), value));
    }
    Ok((element, xmlns))
}
