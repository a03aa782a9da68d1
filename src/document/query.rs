//! Location-path queries over a [`StructuralIndex`].
//!
//! Supported grammar (enough for every PNML/NUPN selection the exporter makes):
//!
//! ```text
//! expr      := "count(" path ")" | path
//! path      := ( "/" | "//" ) step { ( "/" | "//" ) step }
//! step      := name | "*"  { "[" predicate "]" }
//! predicate := "@" attr "=" quoted | "@" attr | name | "not(" name ")" | "not(@" attr ")"
//! ```
//!
//! Paths are absolute. Matching runs right-to-left from a candidate element up
//! its ancestor chain, so a query is evaluated by one scan of the index in
//! document order.

use crate::document::index::{NodeId, StructuralIndex};
use crate::error::DocumentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    AttributeEquals { name: String, value: String },
    HasAttribute(String),
    LacksAttribute(String),
    HasChild(String),
    LacksChild(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub axis: Axis,
    /// `None` for the `*` wildcard
    pub name: Option<String>,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Nodes(PathQuery),
    Count(PathQuery),
}

impl Query {
    pub fn parse(expr: &str) -> Result<Self, DocumentError> {
        let trimmed = expr.trim();
        if let Some(inner) = trimmed
            .strip_prefix("count(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return Ok(Query::Count(PathQuery::parse(expr, inner)?));
        }
        Ok(Query::Nodes(PathQuery::parse(expr, trimmed)?))
    }
}

fn invalid(query: &str, message: impl Into<String>) -> DocumentError {
    DocumentError::Query {
        query: query.to_string(),
        message: message.into(),
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn split_name(text: &str) -> (&str, &str) {
    let end = text
        .char_indices()
        .find(|&(_, c)| !is_name_char(c))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text.split_at(end)
}

/// Index of the `]` closing a predicate, skipping quoted literals
fn predicate_end(text: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

impl PathQuery {
    fn parse(query: &str, text: &str) -> Result<Self, DocumentError> {
        let mut rest = text.trim();
        if !rest.starts_with('/') {
            return Err(invalid(query, "only absolute paths are supported"));
        }

        let mut steps = Vec::new();
        while !rest.is_empty() {
            let axis = if let Some(r) = rest.strip_prefix("//") {
                rest = r;
                Axis::Descendant
            } else if let Some(r) = rest.strip_prefix('/') {
                rest = r;
                Axis::Child
            } else {
                return Err(invalid(query, format!("unexpected '{}'", rest)));
            };

            let name = if let Some(r) = rest.strip_prefix('*') {
                rest = r;
                None
            } else {
                let (name, r) = split_name(rest);
                if name.is_empty() {
                    return Err(invalid(query, "missing element name"));
                }
                rest = r;
                Some(name.to_string())
            };

            let mut predicates = Vec::new();
            while let Some(r) = rest.strip_prefix('[') {
                let end = predicate_end(r).ok_or_else(|| invalid(query, "unclosed predicate"))?;
                predicates.push(Predicate::parse(query, r[..end].trim())?);
                rest = &r[end + 1..];
            }

            steps.push(Step {
                axis,
                name,
                predicates,
            });
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn matches(&self, index: &StructuralIndex, node: NodeId) -> bool {
        !self.steps.is_empty() && self.matches_step(index, node, self.steps.len() - 1)
    }

    fn matches_step(&self, index: &StructuralIndex, node: NodeId, k: usize) -> bool {
        let step = &self.steps[k];
        if !step.accepts(index, node) {
            return false;
        }
        if k == 0 {
            return match step.axis {
                Axis::Child => index.parent(node).is_none(),
                Axis::Descendant => true,
            };
        }
        match step.axis {
            Axis::Child => index
                .parent(node)
                .is_some_and(|parent| self.matches_step(index, parent, k - 1)),
            Axis::Descendant => {
                let mut ancestor = index.parent(node);
                while let Some(candidate) = ancestor {
                    if self.matches_step(index, candidate, k - 1) {
                        return true;
                    }
                    ancestor = index.parent(candidate);
                }
                false
            }
        }
    }

    pub fn count(&self, index: &StructuralIndex) -> usize {
        (0..index.len() as NodeId)
            .filter(|&node| self.matches(index, node))
            .count()
    }
}

impl Step {
    fn accepts(&self, index: &StructuralIndex, node: NodeId) -> bool {
        if let Some(name) = &self.name {
            if index.name(node) != name {
                return false;
            }
        }
        self.predicates.iter().all(|p| p.holds(index, node))
    }
}

impl Predicate {
    fn parse(query: &str, text: &str) -> Result<Self, DocumentError> {
        if let Some(attr) = text.strip_prefix('@') {
            return match attr.split_once('=') {
                Some((name, value)) => {
                    let value = value.trim();
                    let unquoted = value
                        .strip_prefix('\'')
                        .and_then(|v| v.strip_suffix('\''))
                        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                        .ok_or_else(|| invalid(query, "attribute value must be quoted"))?;
                    Ok(Predicate::AttributeEquals {
                        name: name.trim().to_string(),
                        value: unquoted.to_string(),
                    })
                }
                None => Ok(Predicate::HasAttribute(attr.trim().to_string())),
            };
        }

        if let Some(inner) = text.strip_prefix("not(").and_then(|t| t.strip_suffix(')')) {
            let inner = inner.trim();
            if let Some(attr) = inner.strip_prefix('@') {
                return Ok(Predicate::LacksAttribute(attr.trim().to_string()));
            }
            let (name, rest) = split_name(inner);
            if name.is_empty() || !rest.is_empty() {
                return Err(invalid(query, format!("unsupported predicate 'not({})'", inner)));
            }
            return Ok(Predicate::LacksChild(name.to_string()));
        }

        let (name, rest) = split_name(text);
        if name.is_empty() || !rest.is_empty() {
            return Err(invalid(query, format!("unsupported predicate '{}'", text)));
        }
        Ok(Predicate::HasChild(name.to_string()))
    }

    fn holds(&self, index: &StructuralIndex, node: NodeId) -> bool {
        match self {
            Predicate::AttributeEquals { name, value } => {
                index.attribute(node, name) == Some(value.as_str())
            }
            Predicate::HasAttribute(name) => index.attribute(node, name).is_some(),
            Predicate::LacksAttribute(name) => index.attribute(node, name).is_none(),
            Predicate::HasChild(name) => index.children(node).any(|c| index.name(c) == name),
            Predicate::LacksChild(name) => !index.children(node).any(|c| index.name(c) == name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET: &str = r#"<pnml>
  <net id="n">
    <page id="pg">
      <place id="p1"><initialMarking><text>1</text></initialMarking></place>
      <place id="p2"/>
      <page id="nested"><place id="p3"/></page>
      <transition id="t1"/>
    </page>
    <toolspecific tool="other"><size places="9"/></toolspecific>
    <toolspecific tool="nupn" version="1.1"><size places="3"/></toolspecific>
  </net>
</pnml>"#;

    fn matching_ids(index: &StructuralIndex, expr: &str) -> Vec<String> {
        let Query::Nodes(path) = Query::parse(expr).unwrap() else {
            panic!("expected a node query");
        };
        (0..index.len() as NodeId)
            .filter(|&n| path.matches(index, n))
            .map(|n| index.attribute(n, "id").unwrap_or("").to_string())
            .collect()
    }

    #[test]
    fn test_descendant_steps_reach_nested_pages() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        assert_eq!(matching_ids(&index, "//place"), vec!["p1", "p2", "p3"]);
        assert_eq!(matching_ids(&index, "/pnml/net//place"), vec!["p1", "p2", "p3"]);
        assert_eq!(matching_ids(&index, "/pnml/net/page/place"), vec!["p1", "p2"]);
    }

    #[test]
    fn test_child_predicates() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        assert_eq!(matching_ids(&index, "//place[initialMarking]"), vec!["p1"]);
        assert_eq!(
            matching_ids(&index, "//place[not(initialMarking)]"),
            vec!["p2", "p3"]
        );
    }

    #[test]
    fn test_attribute_predicate_selects_nupn_toolspecific() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        let Query::Nodes(path) =
            Query::parse("/pnml/net/toolspecific[@tool='nupn']/size").unwrap()
        else {
            panic!("expected a node query");
        };
        let sizes: Vec<&str> = (0..index.len() as NodeId)
            .filter(|&n| path.matches(&index, n))
            .filter_map(|n| index.attribute(n, "places"))
            .collect();
        assert_eq!(sizes, vec!["3"]);
    }

    #[test]
    fn test_root_step_must_be_document_element() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        assert!(matching_ids(&index, "/net").is_empty());
    }

    #[test]
    fn test_count() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        let Query::Count(path) = Query::parse("count(//place)").unwrap() else {
            panic!("expected a count query");
        };
        assert_eq!(path.count(&index), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Query::parse("place").is_err());
        assert!(Query::parse("//place[@id=p1]").is_err());
        assert!(Query::parse("//place[initialMarking").is_err());
        assert!(Query::parse("//").is_err());
        assert!(Query::parse("//place[position() > 1]").is_err());
    }

    #[test]
    fn test_quoted_bracket_in_predicate() {
        let query = Query::parse("//arc[@id='a]1']").unwrap();
        let Query::Nodes(path) = query else {
            panic!("expected a node query");
        };
        assert_eq!(
            path.steps()[0].predicates,
            vec![Predicate::AttributeEquals {
                name: "id".to_string(),
                value: "a]1".to_string()
            }]
        );
    }
}
