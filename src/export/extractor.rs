//! NUPN extraction engine.
//!
//! Drives a [`DocumentCursor`] through a fixed sequence of [`Phase`]s. Every
//! phase starts from the document root with a fresh query, populates the id
//! tables and side structures, and sends finished lines to the writer
//! pipeline. All run state lives in one [`NupnExtractor`], consumed by
//! [`NupnExtractor::extract`]; any fatal error rolls the pipeline back so no
//! output file survives a failed run.
//!
//! Unit place lists are range-compressed to their first and last NUPN id.
//! This is exact only when a unit's places got consecutive ids, which holds
//! when each place is listed by a single unit.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

use super::formatter::NupnFormatter;
use super::interning::IdTable;
use super::invariants::{check_marking_invariants, MarkingSummary};
use super::paths::*;
use super::writer::{StreamKind, WriterPipeline};
use crate::config::ExportOptions;
use crate::document::DocumentCursor;
use crate::error::{DocumentError, ExportError, PipelineError};
use crate::utils::paths::OutputPaths;

const UNIT_PLACES: &str = "places";
const UNIT_SUBUNITS: &str = "subunits";

/// Extraction phases, in the only order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sizes,
    Structure,
    Units,
    InitialMarking,
    PlaceNames,
    PlacesOutput,
    Transitions,
    Arcs,
    TransitionsOutput,
    Finalize,
}

impl Phase {
    pub const ORDER: [Phase; 10] = [
        Phase::Sizes,
        Phase::Structure,
        Phase::Units,
        Phase::InitialMarking,
        Phase::PlaceNames,
        Phase::PlacesOutput,
        Phase::Transitions,
        Phase::Arcs,
        Phase::TransitionsOutput,
        Phase::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Sizes => "sizes",
            Phase::Structure => "structure",
            Phase::Units => "units",
            Phase::InitialMarking => "initial marking",
            Phase::PlaceNames => "place names",
            Phase::PlacesOutput => "places output",
            Phase::Transitions => "transitions",
            Phase::Arcs => "arcs",
            Phase::TransitionsOutput => "transitions output",
            Phase::Finalize => "finalize",
        }
    }
}

/// An initially marked place
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkedPlace {
    pub pnml_id: String,
    pub tokens: u64,
    pub nupn_id: u64,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub declared_places: u64,
    pub declared_transitions: u64,
    pub declared_arcs: u64,
    pub counted_places: u64,
    pub counted_transitions: u64,
    pub declared_units: u64,
    pub units: u64,
    pub root_unit: String,
    pub unit_safe: bool,
    pub interned_places: u64,
    pub interned_transitions: u64,
    /// Sum of the place counts over all unit lines
    pub unit_place_entries: u64,
    /// Sum of the sub-unit counts over all unit lines
    pub unit_subunit_entries: u64,
    pub marking: MarkingSummary,
    pub marked_places: Vec<MarkedPlace>,
    pub recorded_arcs: u64,
    pub forward_transitions: Vec<String>,
    pub unresolved_references: u64,
    pub label_width: usize,
    pub signature_messages: Vec<String>,
}

impl ConversionReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Read a node's PNML id; with `names`, also record its display name
fn read_node_id<C: DocumentCursor>(
    cursor: &mut C,
    names: Option<&mut FxHashMap<String, String>>,
) -> Result<String, DocumentError> {
    let id = cursor.required_attribute(ID_ATTR)?.to_string();
    if let Some(names) = names {
        cursor.push();
        if cursor.to_child_named(NAME)? && cursor.to_child_named(TEXT)? {
            // Labels are single-line statements
            let name = cursor
                .text_value()?
                .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|n| !n.is_empty());
            if let Some(name) = name {
                names.insert(id.clone(), name);
            }
        }
        cursor.pop()?;
    }
    Ok(id)
}

/// Text of the first child named `name`, cursor left in place
fn child_text<C: DocumentCursor>(
    cursor: &mut C,
    name: &str,
) -> Result<Option<String>, DocumentError> {
    cursor.push();
    let text = if cursor.to_child_named(name)? {
        cursor.text_value()?.map(str::to_string)
    } else {
        None
    };
    cursor.pop()?;
    Ok(text)
}

fn parse_number(value: &str, context: &str) -> Result<u64, DocumentError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| DocumentError::InvalidNumber {
            value: value.to_string(),
            context: context.to_string(),
        })
}

fn label_for<'a>(
    pnml_id: &'a str,
    use_names: bool,
    names: &'a FxHashMap<String, String>,
) -> &'a str {
    if use_names {
        names.get(pnml_id).map(String::as_str).unwrap_or(pnml_id)
    } else {
        pnml_id
    }
}

pub struct NupnExtractor<'o, C: DocumentCursor> {
    cursor: C,
    options: &'o ExportOptions,
    formatter: NupnFormatter,
    places: IdTable,
    transitions: IdTable,
    units: IdTable,
    place_names: FxHashMap<String, String>,
    transition_names: FxHashMap<String, String>,
    marked_places: Vec<MarkedPlace>,
    unit_lines: Vec<String>,
    inputs: FxHashMap<u64, Vec<u64>>,
    outputs: FxHashMap<u64, Vec<u64>>,
    label_width: usize,
    root_unit: Option<String>,
    report: ConversionReport,
}

impl<'o, C: DocumentCursor> NupnExtractor<'o, C> {
    pub fn new(cursor: C, options: &'o ExportOptions) -> Self {
        Self {
            cursor,
            options,
            formatter: NupnFormatter::new(),
            places: IdTable::starting_at(options.first_place_number),
            transitions: IdTable::starting_at(options.first_transition_number),
            units: IdTable::starting_at(0),
            place_names: FxHashMap::default(),
            transition_names: FxHashMap::default(),
            marked_places: Vec::new(),
            unit_lines: Vec::new(),
            inputs: FxHashMap::default(),
            outputs: FxHashMap::default(),
            label_width: 0,
            root_unit: None,
            report: ConversionReport::default(),
        }
    }

    /// Convert the document into `output`. On failure every output file of
    /// the run is removed before the error is returned.
    pub fn extract(mut self, output: &Path) -> Result<ConversionReport, ExportError> {
        info!("Starting the extraction of native NUPN from PNML.");
        let mut pipeline = WriterPipeline::start(OutputPaths::for_output(output))?;

        match self.run(&mut pipeline) {
            Ok(()) => {
                self.report.output = output.to_path_buf();
                info!("See NUPN file: {}", output.display());
                Ok(self.report)
            }
            Err(e) => {
                pipeline.rollback();
                error!("Emergency stop. Cancelled the translation and released opened resources.");
                Err(e)
            }
        }
    }

    fn run(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        let creator = self.formatter.creator_pragma(env!("CARGO_PKG_VERSION"));
        pipeline.send(StreamKind::Main, creator)?;

        for phase in Phase::ORDER {
            debug!("Entering phase: {}", phase.as_str());
            self.run_phase(phase, pipeline)?;
        }
        Ok(())
    }

    fn run_phase(&mut self, phase: Phase, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        match phase {
            Phase::Sizes => self.extract_sizes(),
            Phase::Structure => self.extract_structure(pipeline),
            Phase::Units => self.extract_units(),
            Phase::InitialMarking => self.collect_initial_places(pipeline),
            Phase::PlaceNames => self.collect_non_initial_place_names(),
            Phase::PlacesOutput => self.write_places(pipeline),
            Phase::Transitions => self.collect_transitions(pipeline),
            Phase::Arcs => self.collect_arcs(pipeline),
            Phase::TransitionsOutput => self.write_transitions(pipeline),
            Phase::Finalize => self.finalize(pipeline),
        }
    }

    /// Start a phase query from the document root
    fn select(&mut self, query: &str) -> Result<(), DocumentError> {
        self.cursor.to_root()?;
        self.cursor.select(query)
    }

    fn number_attribute(&self, name: &str) -> Result<u64, DocumentError> {
        let value = self.cursor.required_attribute(name)?;
        parse_number(value, &format!("attribute '{}'", name))
    }

    fn extract_sizes(&mut self) -> Result<(), ExportError> {
        info!("Extracting sizes.");
        self.select(NUPN_SIZE)?;
        let mut found = false;
        while self.cursor.next_match()? {
            self.cursor.push();
            self.report.declared_places = self.number_attribute(PLACES_ATTR)?;
            self.report.declared_transitions = self.number_attribute(TRANSITIONS_ATTR)?;
            self.report.declared_arcs = self.number_attribute(ARCS_ATTR)?;
            found = true;
            self.cursor.pop()?;
        }
        self.cursor.reset_query();
        if !found {
            return Err(DocumentError::MissingElement {
                query: NUPN_SIZE.to_string(),
            }
            .into());
        }
        info!(
            "Nb places = {}; nb transitions = {}; nb arcs = {}",
            self.report.declared_places, self.report.declared_transitions, self.report.declared_arcs
        );
        Ok(())
    }

    fn extract_structure(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        info!("Extracting NUPN toolinfo structure.");
        self.select(NUPN_STRUCTURE)?;
        while self.cursor.next_match()? {
            self.cursor.push();
            self.report.declared_units = self.number_attribute(UNITS_ATTR)?;
            let root = self.cursor.required_attribute(ROOT_ATTR)?.to_string();
            self.units.intern(&root);
            self.report.unit_safe = self
                .cursor
                .attribute_value(SAFE_ATTR)?
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
            self.root_unit = Some(root);
            self.cursor.pop()?;
        }
        self.cursor.reset_query();

        let Some(root) = self.root_unit.clone() else {
            return Err(DocumentError::MissingElement {
                query: NUPN_STRUCTURE.to_string(),
            }
            .into());
        };
        info!(
            "Nb units = {}; root unit id = {}; is Safe = {}",
            self.report.declared_units, root, self.report.unit_safe
        );
        self.report.root_unit = root;

        if self.report.unit_safe {
            pipeline.send(StreamKind::Main, self.formatter.unit_safe_pragma())?;
        }
        Ok(())
    }

    /// Sole allocator of place ids: places are numbered in the order the unit
    /// lists mention them.
    fn extract_units(&mut self) -> Result<(), ExportError> {
        info!("Extracting units.");
        self.select(NUPN_UNIT)?;
        let mut place_ids: Vec<u64> = Vec::new();
        let mut subunit_ids: Vec<u64> = Vec::new();

        while self.cursor.next_match()? {
            self.cursor.push();
            let unit_pnml_id = self.cursor.required_attribute(ID_ATTR)?.to_string();
            let unit_id = self.units.intern(&unit_pnml_id);

            if let Some(list) = child_text(&mut self.cursor, UNIT_PLACES)? {
                place_ids.extend(list.split_whitespace().map(|p| self.places.intern(p)));
            }
            if let Some(list) = child_text(&mut self.cursor, UNIT_SUBUNITS)? {
                subunit_ids.extend(list.split_whitespace().map(|u| self.units.intern(u)));
            }
            debug!(
                "Collected places in unit {} ({}): {:?}",
                unit_pnml_id, unit_id, place_ids
            );

            self.report.unit_place_entries += place_ids.len() as u64;
            self.report.unit_subunit_entries += subunit_ids.len() as u64;
            self.unit_lines
                .push(self.formatter.unit(unit_id, &place_ids, &subunit_ids));
            place_ids.clear();
            subunit_ids.clear();
            self.cursor.pop()?;
        }
        self.cursor.reset_query();

        self.report.units = self.units.len() as u64;
        self.report.interned_places = self.places.len() as u64;
        Ok(())
    }

    fn collect_initial_places(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        info!("Collecting initially marked places.");
        self.select(MARKED_PLACES)?;
        let mut summary = MarkingSummary::default();
        let mut unsafe_places: Vec<String> = Vec::new();
        let names = self.options.use_place_names;

        while self.cursor.next_match()? {
            self.cursor.push();
            let text = child_text(&mut self.cursor, TEXT)?.unwrap_or_default();
            let tokens = parse_number(&text, "initial marking")?;
            self.cursor.to_parent()?;
            let place = read_node_id(&mut self.cursor, names.then_some(&mut self.place_names))?;
            self.cursor.pop()?;

            if tokens == 0 {
                debug!("Place {} has an empty initial marking", place);
                continue;
            }
            if summary.record(tokens) {
                unsafe_places.push(place.clone());
            }
            match self.places.get(&place) {
                Some(nupn_id) => self.marked_places.push(MarkedPlace {
                    pnml_id: place,
                    tokens,
                    nupn_id,
                }),
                None => {
                    error!(
                        "Marked place {} was not reported in the NUPN toolspecific section!",
                        place
                    );
                    self.report.unresolved_references += 1;
                }
            }
        }
        self.cursor.reset_query();
        info!("{} initial place(s)", summary.initial_places);
        trace!("Initial places: {:?}", self.marked_places);

        if let Some((min, max)) = summary.unsafe_range() {
            let pragma = self.formatter.multiple_initial_tokens_pragma(
                summary.total_tokens,
                unsafe_places.len(),
                min,
                max,
            );
            pipeline.send(StreamKind::Main, pragma)?;
            warn!("There are {} unsafe initial places in this net.", unsafe_places.len());
            warn!("Unsafe initial places: {:?}", unsafe_places);
            check_marking_invariants(&summary);
            self.report.signature_messages.push(format!(
                "decreased to one the marking of {} initial places",
                unsafe_places.len()
            ));
        }
        self.report.marking = summary;
        self.report.marked_places = self.marked_places.clone();
        Ok(())
    }

    fn collect_non_initial_place_names(&mut self) -> Result<(), ExportError> {
        if !self.options.use_place_names {
            return Ok(());
        }
        info!("Collecting names of non-initial places.");
        self.select(PLACES_EXCEPT_MARKED)?;
        while self.cursor.next_match()? {
            self.cursor.push();
            read_node_id(&mut self.cursor, Some(&mut self.place_names))?;
            self.cursor.pop()?;
        }
        self.cursor.reset_query();
        Ok(())
    }

    /// Places summary, initial places, units and place labels
    fn write_places(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        info!("Exporting places.");
        self.cursor.to_root()?;
        let counted = self.cursor.evaluate_number(COUNT_PLACES)? as u64;
        self.report.counted_places = counted;
        if counted != self.report.declared_places {
            error!(
                "The number of places I counted in the PNML file ({}) is not equal to the number reported ({}) in the NUPN size element!",
                counted, self.report.declared_places
            );
            warn!("I will output in the NUPN the number reported in the NUPN size element.");
        }
        let line = self
            .formatter
            .places(self.report.declared_places, self.options.first_place_number);
        pipeline.send(StreamKind::Main, line)?;

        info!("Exporting initial places.");
        let initial: Vec<u64> = self.marked_places.iter().map(|m| m.nupn_id).collect();
        if initial.is_empty() {
            warn!("No initially marked place found in this net.");
        }
        pipeline.send(StreamKind::Main, self.formatter.initial_places(&initial))?;

        info!("Exporting units.");
        let unit_count = self.units.len() as u64;
        if unit_count != self.report.declared_units {
            warn!(
                "Found {} units while the NUPN structure element reports {}",
                unit_count, self.report.declared_units
            );
        }
        let root_id = self
            .root_unit
            .as_deref()
            .and_then(|root| self.units.get(root))
            .unwrap_or(0);
        pipeline.send(StreamKind::Main, self.formatter.units_header(unit_count, root_id))?;
        for line in self.unit_lines.drain(..) {
            pipeline.send(StreamKind::Main, line)?;
        }

        self.write_place_labels(pipeline)?;
        Ok(())
    }

    fn write_place_labels(&mut self, pipeline: &mut WriterPipeline) -> Result<(), PipelineError> {
        let use_names = self.options.use_place_names;
        for (pnml_id, nupn_id) in self.places.sorted_by_id() {
            let label = label_for(pnml_id, use_names, &self.place_names);
            trace!("Outputing mapping between nupn place id {} and its label {}", nupn_id, label);
            self.label_width = self.label_width.max(label.chars().count());
            pipeline.send(StreamKind::PlaceLabels, self.formatter.place_label(nupn_id, label))?;
        }
        Ok(())
    }

    fn emit_transition_label(
        &mut self,
        pipeline: &mut WriterPipeline,
        nupn_id: u64,
        pnml_id: &str,
    ) -> Result<(), PipelineError> {
        let label = label_for(pnml_id, self.options.use_transition_names, &self.transition_names);
        self.label_width = self.label_width.max(label.chars().count());
        let line = self.formatter.transition_label(nupn_id, label);
        pipeline.send(StreamKind::TransitionLabels, line)
    }

    fn collect_transitions(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        info!("Collecting transitions.");
        self.select(TRANSITIONS)?;
        let names = self.options.use_transition_names;
        while self.cursor.next_match()? {
            self.cursor.push();
            let id = read_node_id(&mut self.cursor, names.then_some(&mut self.transition_names))?;
            self.cursor.pop()?;

            if self.transitions.contains(&id) {
                warn!("Transition {} is declared more than once; keeping its first id", id);
                continue;
            }
            let nupn_id = self.transitions.intern(&id);
            self.emit_transition_label(pipeline, nupn_id, &id)?;
        }
        self.cursor.reset_query();
        Ok(())
    }

    /// Record every arc on its transition; an arc whose source is a known
    /// transition is an output arc, otherwise its target must be the
    /// transition. A target that is not known yet is registered on the spot.
    fn collect_arcs(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        info!("Collecting arcs.");
        self.select(ARCS)?;
        while self.cursor.next_match()? {
            self.cursor.push();
            let arc = self.cursor.attribute_value(ID_ATTR)?.unwrap_or("").to_string();
            let source = self.cursor.required_attribute(SOURCE_ATTR)?.to_string();
            let target = self.cursor.required_attribute(TARGET_ATTR)?.to_string();
            self.cursor.pop()?;

            if let Some(transition) = self.transitions.get(&source) {
                match self.places.get(&target) {
                    Some(place) => self.outputs.entry(transition).or_default().push(place),
                    None => self.unresolved_arc_place(&arc, &target),
                }
                continue;
            }

            let transition = match self.transitions.get(&target) {
                Some(transition) => transition,
                None => {
                    warn!(
                        "New transition {} referenced by arc {}, that I did not find earlier while parsing all transitions.",
                        target, arc
                    );
                    let transition = self.transitions.intern(&target);
                    self.emit_transition_label(pipeline, transition, &target)?;
                    self.report.forward_transitions.push(target.clone());
                    warn!("Added new transition {} referenced by arc {}.", target, arc);
                    transition
                }
            };
            match self.places.get(&source) {
                Some(place) => self.inputs.entry(transition).or_default().push(place),
                None => self.unresolved_arc_place(&arc, &source),
            }
        }
        self.cursor.reset_query();
        Ok(())
    }

    fn unresolved_arc_place(&mut self, arc: &str, place: &str) {
        error!(
            "Arc {} references place {} which was not reported in any NUPN unit; arc skipped",
            arc, place
        );
        self.report.unresolved_references += 1;
    }

    fn write_transitions(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        info!("Exporting transitions.");
        self.cursor.to_root()?;
        let counted = self.cursor.evaluate_number(COUNT_TRANSITIONS)? as u64;
        self.report.counted_transitions = counted;
        if counted != self.report.declared_transitions {
            error!(
                "The number of transitions I counted in the PNML file ({}) is not equal to the number reported ({}) in the NUPN size element!",
                counted, self.report.declared_transitions
            );
            warn!("I will output in the NUPN the number reported in the NUPN size element.");
        }
        let line = self.formatter.transitions(
            self.report.declared_transitions,
            self.options.first_transition_number,
        );
        pipeline.send(StreamKind::Main, line)?;

        let all: BTreeSet<u64> = self.transitions.ids().collect();
        let mut recorded = 0u64;
        for transition in all {
            let inputs = self.inputs.get(&transition).map(Vec::as_slice).unwrap_or(&[]);
            let outputs = self.outputs.get(&transition).map(Vec::as_slice).unwrap_or(&[]);
            recorded += (inputs.len() + outputs.len()) as u64;
            let line = self.formatter.transition(transition, inputs, outputs);
            pipeline.send(StreamKind::Main, line)?;
        }

        self.report.recorded_arcs = recorded;
        self.report.interned_transitions = self.transitions.len() as u64;
        if recorded != self.report.declared_arcs {
            warn!(
                "Recorded {} arcs while the NUPN size element reports {}",
                recorded, self.report.declared_arcs
            );
        }
        Ok(())
    }

    fn finalize(&mut self, pipeline: &mut WriterPipeline) -> Result<(), ExportError> {
        let pragma = self
            .formatter
            .labels_pragma(self.label_width, !self.transitions.is_empty());
        pipeline.send(StreamKind::Main, pragma)?;
        self.report.label_width = self.label_width;

        pipeline.finish(self.options.delete_temporary_files)
    }
}
