// Cursor over a StructuralIndex
//
// Holds the current element, a stack of saved positions and at most one
// selected query with its scan position.

use tracing::trace;

use super::index::{NodeId, StructuralIndex};
use super::query::{PathQuery, Query};
use super::DocumentCursor;
use crate::error::DocumentError;

struct ActiveQuery {
    path: PathQuery,
    next: NodeId,
}

pub struct IndexCursor<'a> {
    index: &'a StructuralIndex,
    current: NodeId,
    stack: Vec<NodeId>,
    query: Option<ActiveQuery>,
}

impl<'a> IndexCursor<'a> {
    pub fn new(index: &'a StructuralIndex) -> Self {
        Self {
            index,
            current: 0,
            stack: Vec::new(),
            query: None,
        }
    }

    #[cfg(test)]
    fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    fn move_to(&mut self, target: Option<NodeId>) -> bool {
        match target {
            Some(node) => {
                self.current = node;
                true
            }
            None => false,
        }
    }
}

impl DocumentCursor for IndexCursor<'_> {
    fn to_root(&mut self) -> Result<(), DocumentError> {
        if self.index.is_empty() {
            return Err(DocumentError::EmptyDocument);
        }
        self.current = 0;
        Ok(())
    }

    fn to_first_child(&mut self) -> Result<bool, DocumentError> {
        Ok(self.move_to(self.index.element(self.current).first_child))
    }

    fn to_next_sibling(&mut self) -> Result<bool, DocumentError> {
        Ok(self.move_to(self.index.element(self.current).next_sibling))
    }

    fn to_parent(&mut self) -> Result<bool, DocumentError> {
        Ok(self.move_to(self.index.parent(self.current)))
    }

    fn push(&mut self) {
        self.stack.push(self.current);
    }

    fn pop(&mut self) -> Result<(), DocumentError> {
        self.current = self.stack.pop().ok_or(DocumentError::EmptyStack)?;
        Ok(())
    }

    fn element_name(&self) -> &str {
        self.index.name(self.current)
    }

    fn attribute_value(&self, name: &str) -> Result<Option<&str>, DocumentError> {
        Ok(self.index.attribute(self.current, name))
    }

    fn text_value(&self) -> Result<Option<&str>, DocumentError> {
        Ok(self.index.text(self.current))
    }

    fn select(&mut self, query: &str) -> Result<(), DocumentError> {
        match Query::parse(query)? {
            Query::Nodes(path) => {
                trace!("Selected query {}", query);
                self.query = Some(ActiveQuery { path, next: 0 });
                Ok(())
            }
            Query::Count(_) => Err(DocumentError::Query {
                query: query.to_string(),
                message: "numeric expression cannot select nodes".to_string(),
            }),
        }
    }

    fn next_match(&mut self) -> Result<bool, DocumentError> {
        let active = self.query.as_mut().ok_or(DocumentError::NoQuery)?;
        let total = self.index.len() as NodeId;
        while active.next < total {
            let candidate = active.next;
            active.next += 1;
            if active.path.matches(self.index, candidate) {
                self.current = candidate;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn reset_query(&mut self) {
        self.query = None;
    }

    fn evaluate_number(&mut self, query: &str) -> Result<f64, DocumentError> {
        match Query::parse(query)? {
            Query::Count(path) => Ok(path.count(self.index) as f64),
            Query::Nodes(_) => Err(DocumentError::Query {
                query: query.to_string(),
                message: "not a numeric expression".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET: &str = r#"<pnml><net id="n">
  <place id="p1"><name><text>first</text></name><initialMarking><text> 2 </text></initialMarking></place>
  <place id="p2"/>
  <transition id="t1"/>
</net></pnml>"#;

    #[test]
    fn test_navigation_and_stack() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        let mut cursor = IndexCursor::new(&index);
        cursor.to_root().unwrap();
        assert_eq!(cursor.element_name(), "pnml");
        assert!(!cursor.to_parent().unwrap());

        assert!(cursor.to_first_child().unwrap());
        assert_eq!(cursor.element_name(), "net");
        cursor.push();
        assert!(cursor.to_first_child().unwrap());
        assert!(cursor.to_next_sibling().unwrap());
        assert_eq!(cursor.attribute_value("id").unwrap(), Some("p2"));
        assert!(!cursor.to_first_child().unwrap());

        cursor.pop().unwrap();
        assert_eq!(cursor.element_name(), "net");
        assert!(matches!(cursor.pop(), Err(DocumentError::EmptyStack)));
    }

    #[test]
    fn test_child_named_and_text() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        let mut cursor = IndexCursor::new(&index);
        cursor.select("//place").unwrap();
        assert!(cursor.next_match().unwrap());

        assert!(cursor.to_child_named("initialMarking").unwrap());
        assert!(cursor.to_child_named("text").unwrap());
        assert_eq!(cursor.text_value().unwrap().map(str::trim), Some("2"));

        cursor.to_parent().unwrap();
        assert!(!cursor.to_child_named("graphics").unwrap());
        assert_eq!(cursor.element_name(), "initialMarking");
    }

    #[test]
    fn test_query_survives_navigation() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        let mut cursor = IndexCursor::new(&index);
        cursor.select("//place").unwrap();

        let mut seen = Vec::new();
        while cursor.next_match().unwrap() {
            cursor.push();
            seen.push(cursor.required_attribute("id").unwrap().to_string());
            cursor.to_root().unwrap();
            cursor.pop().unwrap();
        }
        assert_eq!(seen, vec!["p1", "p2"]);
        assert_eq!(cursor.stack_depth(), 0);

        cursor.reset_query();
        assert!(matches!(cursor.next_match(), Err(DocumentError::NoQuery)));
    }

    #[test]
    fn test_evaluate_number() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        let mut cursor = IndexCursor::new(&index);
        assert_eq!(cursor.evaluate_number("count(//place)").unwrap(), 2.0);
        assert_eq!(cursor.evaluate_number("count(//arc)").unwrap(), 0.0);
        assert!(cursor.evaluate_number("//place").is_err());
        assert!(cursor.select("count(//place)").is_err());
    }

    #[test]
    fn test_missing_required_attribute() {
        let index = StructuralIndex::parse_str(NET).unwrap();
        let cursor = IndexCursor::new(&index);
        let err = cursor.required_attribute("id").unwrap_err();
        assert!(matches!(
            err,
            DocumentError::MissingAttribute { ref element, ref attribute }
                if element == "pnml" && attribute == "id"
        ));
    }
}
