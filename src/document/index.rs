//! Structural index over an XML document.
//!
//! The document is streamed once through quick-xml. Each element becomes a
//! fixed-size [`ElementRecord`] holding links to its parent, first child and
//! next sibling; names are interned into a tag table and every attribute value
//! or text node lives in a single string arena addressed by [`Span`]s. No
//! per-node owned strings are kept, so multi-million element PNML files stay
//! compact.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::error::DocumentError;

/// Position of an element in document order
pub type NodeId = u32;

/// Byte range inside the string arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: u32,
}

#[derive(Debug, Clone)]
pub struct ElementRecord {
    pub tag: u32,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub first_attribute: usize,
    pub attribute_count: u32,
    pub text: Option<Span>,
}

#[derive(Debug, Clone, Copy)]
struct AttributeRecord {
    name: u32,
    value: Span,
}

#[derive(Debug, Default)]
pub struct StructuralIndex {
    names: Vec<String>,
    name_ids: FxHashMap<String, u32>,
    elements: Vec<ElementRecord>,
    attributes: Vec<AttributeRecord>,
    arena: String,
}

impl StructuralIndex {
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        info!("Indexing PNML document {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn parse_str(xml: &str) -> Result<Self, DocumentError> {
        Self::from_reader(xml.as_bytes())
    }

    pub fn from_reader<R: BufRead>(input: R) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_reader(input);
        let mut builder = IndexBuilder::default();
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| DocumentError::Parse {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                })?;
            let position = reader.buffer_position() as u64;
            match event {
                Event::Start(start) => builder.open(&start, position)?,
                Event::Empty(start) => {
                    builder.open(&start, position)?;
                    builder.close();
                }
                Event::End(_) => builder.close(),
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| DocumentError::Parse {
                        position,
                        message: e.to_string(),
                    })?;
                    builder.text(&text, position)?;
                }
                Event::CData(data) => {
                    builder.text(&String::from_utf8_lossy(&data.into_inner()), position)?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let index = builder.finish();
        if index.elements.is_empty() {
            return Err(DocumentError::EmptyDocument);
        }
        debug!(
            "Indexed {} elements, {} attributes, {} distinct names ({} arena bytes)",
            index.elements.len(),
            index.attributes.len(),
            index.names.len(),
            index.arena.len()
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, node: NodeId) -> &ElementRecord {
        &self.elements[node as usize]
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.element(node).parent
    }

    pub fn name(&self, node: NodeId) -> &str {
        &self.names[self.element(node).tag as usize]
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        let record = self.element(node);
        let start = record.first_attribute;
        let end = start + record.attribute_count as usize;
        self.attributes[start..end]
            .iter()
            .find(|attr| self.names[attr.name as usize] == name)
            .map(|attr| self.slice(attr.value))
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        self.element(node).text.map(|span| self.slice(span))
    }

    /// Direct children of `node`, in document order
    pub fn children(&self, node: NodeId) -> Children<'_> {
        Children {
            index: self,
            next: self.element(node).first_child,
        }
    }

    fn slice(&self, span: Span) -> &str {
        &self.arena[span.start..span.start + span.len as usize]
    }
}

pub struct Children<'a> {
    index: &'a StructuralIndex,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.index.element(current).next_sibling;
        Some(current)
    }
}

/// Narrow an index quantity, failing instead of wrapping
fn checked_u32(value: usize, what: &str, position: u64) -> Result<u32, DocumentError> {
    u32::try_from(value).map_err(|_| DocumentError::Parse {
        position,
        message: format!("{} {} exceeds the index limit of {}", what, value, u32::MAX),
    })
}

/// Open elements with the last child seen so far, for sibling linking
#[derive(Default)]
struct IndexBuilder {
    index: StructuralIndex,
    open: Vec<(NodeId, Option<NodeId>)>,
}

impl IndexBuilder {
    fn intern_name(&mut self, name: &[u8], position: u64) -> Result<u32, DocumentError> {
        let name = String::from_utf8_lossy(name);
        if let Some(&id) = self.index.name_ids.get(name.as_ref()) {
            return Ok(id);
        }
        let id = checked_u32(self.index.names.len(), "distinct names", position)?;
        self.index.names.push(name.to_string());
        self.index.name_ids.insert(name.into_owned(), id);
        Ok(id)
    }

    fn store(&mut self, value: &str, position: u64) -> Result<Span, DocumentError> {
        let len = checked_u32(value.len(), "value length", position)?;
        let start = self.index.arena.len();
        self.index.arena.push_str(value);
        Ok(Span { start, len })
    }

    fn open(&mut self, start: &BytesStart<'_>, position: u64) -> Result<(), DocumentError> {
        // The element count itself must fit a NodeId too
        let node: NodeId = checked_u32(self.index.elements.len() + 1, "element count", position)? - 1;
        let tag = self.intern_name(start.local_name().as_ref(), position)?;
        let first_attribute = self.index.attributes.len();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| DocumentError::Parse {
                position,
                message: e.to_string(),
            })?;
            let value = attr.unescape_value().map_err(|e| DocumentError::Parse {
                position,
                message: e.to_string(),
            })?;
            let name = self.intern_name(attr.key.local_name().as_ref(), position)?;
            let value = self.store(&value, position)?;
            self.index.attributes.push(AttributeRecord { name, value });
        }

        let parent = self.open.last().map(|&(id, _)| id);
        if let Some((parent_id, last_child)) = self.open.last_mut() {
            match *last_child {
                Some(previous) => self.index.elements[previous as usize].next_sibling = Some(node),
                None => self.index.elements[*parent_id as usize].first_child = Some(node),
            }
            *last_child = Some(node);
        }

        let attribute_count = checked_u32(
            self.index.attributes.len() - first_attribute,
            "attribute count",
            position,
        )?;
        self.index.elements.push(ElementRecord {
            tag,
            parent,
            first_child: None,
            next_sibling: None,
            first_attribute,
            attribute_count,
            text: None,
        });
        self.open.push((node, None));
        Ok(())
    }

    fn close(&mut self) {
        self.open.pop();
    }

    /// Only the first non-blank text node of an element is kept
    fn text(&mut self, text: &str, position: u64) -> Result<(), DocumentError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let Some(&(node, _)) = self.open.last() else {
            return Ok(());
        };
        if self.index.elements[node as usize].text.is_none() {
            let span = self.store(text, position)?;
            self.index.elements[node as usize].text = Some(span);
        }
        Ok(())
    }

    fn finish(self) -> StructuralIndex {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pnml xmlns="http://www.pnml.org/version-2009/grammar/pnml">
  <net id="n" type="http://www.pnml.org/version-2009/grammar/ptnet">
    <place id="p1"><name><text>ready &amp; waiting</text></name></place>
    <place id="p2"/>
    <arc id="a1" source="p1" target="t1"/>
  </net>
</pnml>"#;

    #[test]
    fn test_links_and_names() {
        let index = StructuralIndex::parse_str(SAMPLE).unwrap();
        assert_eq!(index.name(0), "pnml");
        assert_eq!(index.parent(0), None);

        let net: Vec<NodeId> = index.children(0).collect();
        assert_eq!(net.len(), 1);
        assert_eq!(index.name(net[0]), "net");

        let names: Vec<&str> = index.children(net[0]).map(|n| index.name(n)).collect();
        assert_eq!(names, vec!["place", "place", "arc"]);
    }

    #[test]
    fn test_attributes_and_text() {
        let index = StructuralIndex::parse_str(SAMPLE).unwrap();
        let net = index.children(0).next().unwrap();
        let p1 = index.children(net).next().unwrap();
        assert_eq!(index.attribute(p1, "id"), Some("p1"));
        assert_eq!(index.attribute(p1, "missing"), None);

        let name = index.children(p1).next().unwrap();
        let text = index.children(name).next().unwrap();
        assert_eq!(index.text(text), Some("ready & waiting"));
        assert_eq!(index.text(name), None);

        let arc = index.children(net).nth(2).unwrap();
        assert_eq!(index.attribute(arc, "source"), Some("p1"));
        assert_eq!(index.attribute(arc, "target"), Some("t1"));
    }

    #[test]
    fn test_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.pnml");
        std::fs::write(&path, SAMPLE).unwrap();

        let index = StructuralIndex::from_path(&path).unwrap();
        assert_eq!(index.len(), 7);
    }

    #[test]
    fn test_empty_document_is_rejected() {
        let err = StructuralIndex::parse_str("<?xml version=\"1.0\"?>").unwrap_err();
        assert!(matches!(err, DocumentError::EmptyDocument));
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let err = StructuralIndex::parse_str("<pnml><net></pnml>").unwrap_err();
        assert!(matches!(err, DocumentError::Parse { .. }));
    }

    #[test]
    fn test_index_limits_fail_instead_of_wrapping() {
        assert_eq!(checked_u32(7, "element count", 0).unwrap(), 7);
        let err = checked_u32(u32::MAX as usize + 1, "element count", 42).unwrap_err();
        assert!(matches!(err, DocumentError::Parse { position: 42, .. }));
    }
}
