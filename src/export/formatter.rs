// NUPN line formatter
//
// Every statement is rendered into one reusable buffer, copied out as an owned
// line and the buffer cleared. Counts carry a `#` prefix; ranges are written
// `first...last`, with `1...0` for the empty range.

use std::fmt::Write as _;

use super::constants::*;

#[derive(Debug, Default)]
pub struct NupnFormatter {
    buf: String,
}

impl NupnFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_line(&mut self) -> String {
        self.buf.push_str(NL);
        let line = self.buf.clone();
        self.buf.clear();
        line
    }

    fn push_count(&mut self, count: usize) {
        let _ = write!(self.buf, "{}{}{}", WS, HK, count);
    }

    fn push_range(&mut self, first: u64, last: u64) {
        let _ = write!(self.buf, "{}{}{}{}", WS, first, DOTS, last);
    }

    fn push_ids(&mut self, ids: &[u64]) {
        for id in ids {
            let _ = write!(self.buf, "{}{}", WS, id);
        }
    }

    /// `#count first...last` for `count` ids starting at `first`
    fn push_counted_range(&mut self, count: u64, first: u64) {
        let _ = write!(self.buf, "{}{}{}", WS, HK, count);
        if count == 0 {
            self.push_range(1, 0);
        } else {
            self.push_range(first, first + count - 1);
        }
    }

    pub fn creator_pragma(&mut self, version: &str) -> String {
        let _ = write!(self.buf, "{} {} {}", PRAGMA_CREATOR, CREATOR_NAME, version);
        self.take_line()
    }

    pub fn unit_safe_pragma(&mut self) -> String {
        self.buf.push_str(PRAGMA_UNIT_SAFE);
        self.take_line()
    }

    pub fn multiple_initial_tokens_pragma(
        &mut self,
        total_tokens: u64,
        unsafe_places: usize,
        min: u64,
        max: u64,
    ) -> String {
        let _ = write!(self.buf, "{}{}{}{}", PRAGMA_MULTIPLE_INIT_TOKENS, WS, HK, total_tokens);
        self.push_count(unsafe_places);
        self.push_range(min, max);
        self.take_line()
    }

    pub fn places(&mut self, declared: u64, first_place: u64) -> String {
        self.buf.push_str(PLACES);
        self.push_counted_range(declared, first_place);
        self.take_line()
    }

    /// `initial place <id>` for a single place, `initial places #n ...` otherwise
    pub fn initial_places(&mut self, ids: &[u64]) -> String {
        if let [only] = ids {
            let _ = write!(self.buf, "{}{}{}", INIT_PLACE, WS, only);
        } else {
            self.buf.push_str(INIT_PLACES);
            self.push_count(ids.len());
            self.push_ids(ids);
        }
        self.take_line()
    }

    /// `units #n 0...n-1` and `root unit <id>`, as one fragment
    pub fn units_header(&mut self, unit_count: u64, root_unit: u64) -> String {
        self.buf.push_str(UNITS);
        self.push_counted_range(unit_count, 0);
        let _ = write!(self.buf, "{}{}{}{}", NL, ROOT_UNIT, WS, root_unit);
        self.take_line()
    }

    /// Unit line. Places are range-compressed to their first and last id;
    /// sub-units are listed one by one.
    pub fn unit(&mut self, unit_id: u64, places: &[u64], subunits: &[u64]) -> String {
        let _ = write!(self.buf, "{}{}", UNIT_PREFIX, unit_id);
        self.push_count(places.len());
        match (places.first(), places.last()) {
            (Some(&first), Some(&last)) => self.push_range(first, last),
            _ => self.push_range(1, 0),
        }
        self.push_count(subunits.len());
        self.push_ids(subunits);
        self.take_line()
    }

    pub fn transitions(&mut self, declared: u64, first_transition: u64) -> String {
        self.buf.push_str(TRANSITIONS);
        self.push_counted_range(declared, first_transition);
        self.take_line()
    }

    pub fn transition(&mut self, id: u64, inputs: &[u64], outputs: &[u64]) -> String {
        let _ = write!(self.buf, "{}{}", TRANSITION_PREFIX, id);
        self.push_count(inputs.len());
        self.push_ids(inputs);
        self.push_count(outputs.len());
        self.push_ids(outputs);
        self.take_line()
    }

    pub fn place_label(&mut self, id: u64, label: &str) -> String {
        let _ = write!(self.buf, "{}{}{}{}", PLACE_LABEL_PREFIX, id, WS, label);
        self.take_line()
    }

    pub fn transition_label(&mut self, id: u64, label: &str) -> String {
        let _ = write!(self.buf, "{}{}{}{}", TRANSITION_LABEL_PREFIX, id, WS, label);
        self.take_line()
    }

    /// Label-section pragma: widest label, then which label blocks follow
    pub fn labels_pragma(&mut self, label_width: usize, has_transitions: bool) -> String {
        let _ = write!(self.buf, "{}{}{}{}", PRAGMA_LABELS, WS, HK, label_width);
        let _ = write!(self.buf, "{}{}", WS, PLACE_LABEL_PREFIX);
        if has_transitions {
            let _ = write!(self.buf, "{}", TRANSITION_LABEL_PREFIX);
        }
        self.take_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_places_and_transitions_summary() {
        let mut f = NupnFormatter::new();
        assert_eq!(f.places(3, 0), "places #3 0...2\n");
        assert_eq!(f.places(3, 1), "places #3 1...3\n");
        assert_eq!(f.transitions(2, 0), "transitions #2 0...1\n");
        assert_eq!(f.transitions(0, 0), "transitions #0 1...0\n");
    }

    #[test]
    fn test_initial_places() {
        let mut f = NupnFormatter::new();
        assert_eq!(f.initial_places(&[4]), "initial place 4\n");
        assert_eq!(f.initial_places(&[0, 2, 5]), "initial places #3 0 2 5\n");
        assert_eq!(f.initial_places(&[]), "initial places #0\n");
    }

    #[test]
    fn test_units() {
        let mut f = NupnFormatter::new();
        assert_eq!(f.units_header(1, 0), "units #1 0...0\nroot unit 0\n");
        assert_eq!(f.unit(0, &[0, 1, 2], &[]), "U0 #3 0...2 #0\n");
        assert_eq!(f.unit(2, &[5], &[3, 4]), "U2 #1 5...5 #2 3 4\n");
        assert_eq!(f.unit(1, &[], &[2]), "U1 #0 1...0 #1 2\n");
    }

    #[test]
    fn test_transition_lines() {
        let mut f = NupnFormatter::new();
        assert_eq!(f.transition(0, &[0, 1], &[2]), "T0 #2 0 1 #1 2\n");
        assert_eq!(f.transition(7, &[], &[]), "T7 #0 #0\n");
    }

    #[test]
    fn test_pragmas() {
        let mut f = NupnFormatter::new();
        assert_eq!(f.creator_pragma("1.2.3"), "!creator pnml2nupn 1.2.3\n");
        assert_eq!(f.unit_safe_pragma(), "!unit_safe\n");
        assert_eq!(
            f.multiple_initial_tokens_pragma(5, 2, 2, 3),
            "!multiple_initial_tokens #5 #2 2...3\n"
        );
        assert_eq!(f.labels_pragma(12, true), "!labels #12 PT\n");
        assert_eq!(f.labels_pragma(3, false), "!labels #3 P\n");
    }

    #[test]
    fn test_labels() {
        let mut f = NupnFormatter::new();
        assert_eq!(f.place_label(3, "idle"), "P3 idle\n");
        assert_eq!(f.transition_label(0, "fire"), "T0 fire\n");
    }

    #[test]
    fn test_buffer_is_cleared_between_lines() {
        let mut f = NupnFormatter::new();
        f.places(1, 0);
        assert_eq!(f.unit_safe_pragma(), "!unit_safe\n");
        assert!(f.buf.is_empty());
    }
}
