//! Document access for the extraction engine.
//!
//! The engine never sees XML directly. It drives a [`DocumentCursor`]: a
//! stateful navigator with a position stack and a path-query selector, the
//! same shape as the VTD-style navigators used for huge PNML files.
//!
//! - `index.rs` - [`StructuralIndex`], an offset-based element index built by
//!   streaming the file once
//! - `query.rs` - the location-path subset used by the extraction phases
//! - `cursor.rs` - [`IndexCursor`], the cursor over a [`StructuralIndex`]

pub mod cursor;
pub mod index;
pub mod query;

pub use cursor::IndexCursor;
pub use index::{NodeId, StructuralIndex};
pub use query::Query;

use crate::error::DocumentError;

/// Navigator over a source document.
///
/// Moves return `Ok(false)` and leave the position unchanged when the target
/// does not exist. A query selected with [`select`](Self::select) is consumed
/// with [`next_match`](Self::next_match), which moves the cursor onto each
/// match in document order; navigation between matches does not disturb the
/// query.
pub trait DocumentCursor {
    /// Move to the document's root element
    fn to_root(&mut self) -> Result<(), DocumentError>;
    fn to_first_child(&mut self) -> Result<bool, DocumentError>;
    fn to_next_sibling(&mut self) -> Result<bool, DocumentError>;
    fn to_parent(&mut self) -> Result<bool, DocumentError>;

    /// Save the current position
    fn push(&mut self);
    /// Restore the last saved position
    fn pop(&mut self) -> Result<(), DocumentError>;

    /// Local name of the element under the cursor
    fn element_name(&self) -> &str;
    fn attribute_value(&self, name: &str) -> Result<Option<&str>, DocumentError>;
    /// First non-blank text node directly under the current element
    fn text_value(&self) -> Result<Option<&str>, DocumentError>;

    fn select(&mut self, query: &str) -> Result<(), DocumentError>;
    /// Move to the next match of the selected query; `false` once exhausted
    fn next_match(&mut self) -> Result<bool, DocumentError>;
    fn reset_query(&mut self);
    /// Evaluate a numeric expression such as `count(//place)`
    fn evaluate_number(&mut self, query: &str) -> Result<f64, DocumentError>;

    fn matches_element(&self, name: &str) -> bool {
        self.element_name() == name
    }

    /// Move to the first child named `name`; stays put when there is none
    fn to_child_named(&mut self, name: &str) -> Result<bool, DocumentError> {
        if !self.to_first_child()? {
            return Ok(false);
        }
        loop {
            if self.matches_element(name) {
                return Ok(true);
            }
            if !self.to_next_sibling()? {
                self.to_parent()?;
                return Ok(false);
            }
        }
    }

    fn required_attribute(&self, name: &str) -> Result<&str, DocumentError> {
        self.attribute_value(name)?
            .ok_or_else(|| DocumentError::MissingAttribute {
                element: self.element_name().to_string(),
                attribute: name.to_string(),
            })
    }
}
