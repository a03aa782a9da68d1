//! External 1-safety check.
//!
//! The net is translated to CAMI next to the input file, then handed to the
//! `bounds` tool (`bounds <file.cami> -i`). Every output line shaped like
//! `<place> [<min>...<max>]` carries the bounds of one place; the net is
//! 1-safe when all of them are 0 or 1.
//!
//! This path is independent of the conversion: any failure (missing tool,
//! rejected input, non-zero exit, timeout) yields a verdict that is not
//! safe instead of an error.

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ExportOptions;
use crate::document::{DocumentCursor, IndexCursor, StructuralIndex};
use crate::export::interning::IdTable;
use crate::export::paths::*;
use crate::utils::paths::{cami_path_for, delete_files};

const UNKNOWN_CAMI_COMMAND: &str = "Unknown CAMI command";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

static BOUNDS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)\s\[(\d).{3}(\d)\]$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Safe,
    Unsafe,
    /// The check could not be carried out
    Indeterminate(String),
}

impl SafetyVerdict {
    pub fn is_net_1_safe(&self) -> bool {
        matches!(self, SafetyVerdict::Safe)
    }
}

/// Interpret the standard output of `bounds -i`
pub fn parse_bounds_output<S: AsRef<str>>(lines: &[S]) -> SafetyVerdict {
    let Some(first) = lines.first() else {
        return SafetyVerdict::Indeterminate("bounds produced no output".to_string());
    };
    if first.as_ref().trim().eq_ignore_ascii_case(UNKNOWN_CAMI_COMMAND) {
        return SafetyVerdict::Indeterminate("bounds rejected the CAMI input".to_string());
    }

    let mut seen = 0usize;
    let mut safe = true;
    for line in lines {
        let Some(caps) = BOUNDS_LINE.captures(line.as_ref()) else {
            continue;
        };
        seen += 1;
        let bounded = |i: usize| matches!(caps.get(i).map(|m| m.as_str()), Some("0" | "1"));
        if !(bounded(2) && bounded(3)) {
            debug!("Place {} is not 1-safe", caps[1].trim());
            safe = false;
        }
    }

    match (seen, safe) {
        (0, _) => SafetyVerdict::Indeterminate("no place bounds in bounds output".to_string()),
        (_, true) => SafetyVerdict::Safe,
        (_, false) => SafetyVerdict::Unsafe,
    }
}

/// Counts of a CAMI translation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CamiSummary {
    pub places: usize,
    pub transitions: usize,
    pub arcs: usize,
}

fn cami_string(value: &str) -> String {
    format!("{}:{}", value.len(), value)
}

/// Text of `child/text` under the current element
fn labelled_text<C: DocumentCursor>(cursor: &mut C, child: &str) -> Result<Option<String>> {
    cursor.push();
    let text = if cursor.to_child_named(child)? && cursor.to_child_named(TEXT)? {
        cursor.text_value()?.map(|t| t.trim().to_string())
    } else {
        None
    };
    cursor.pop()?;
    Ok(text)
}

/// Write the P/T net under `cursor` as a CAMI command stream.
///
/// Nodes are numbered from 1 in the order places, transitions, then arcs.
pub fn write_cami<C: DocumentCursor, W: Write>(cursor: &mut C, out: &mut W) -> Result<CamiSummary> {
    let mut nodes = IdTable::starting_at(1);
    let mut summary = CamiSummary::default();
    writeln!(out, "DB()")?;

    cursor.to_root()?;
    cursor.select(ALL_PLACES)?;
    while cursor.next_match()? {
        let id = cursor.required_attribute(ID_ATTR)?.to_string();
        let node = nodes.intern(&id);
        let name = labelled_text(cursor, NAME)?.unwrap_or_else(|| id.clone());
        writeln!(out, "CN({},{})", cami_string("place"), node)?;
        writeln!(out, "CT({},{},{})", cami_string("name"), node, cami_string(&name))?;
        if let Some(marking) = labelled_text(cursor, INITIAL_MARKING)? {
            if marking.parse::<u64>().is_ok_and(|m| m > 0) {
                writeln!(out, "CT({},{},{})", cami_string("marking"), node, cami_string(&marking))?;
            }
        }
        summary.places += 1;
    }
    cursor.reset_query();

    cursor.to_root()?;
    cursor.select(TRANSITIONS)?;
    while cursor.next_match()? {
        let id = cursor.required_attribute(ID_ATTR)?.to_string();
        let node = nodes.intern(&id);
        let name = labelled_text(cursor, NAME)?.unwrap_or_else(|| id.clone());
        writeln!(out, "CN({},{})", cami_string("transition"), node)?;
        writeln!(out, "CT({},{},{})", cami_string("name"), node, cami_string(&name))?;
        summary.transitions += 1;
    }
    cursor.reset_query();

    cursor.to_root()?;
    cursor.select(ARCS)?;
    let mut arc = nodes.next_id();
    while cursor.next_match()? {
        let source = cursor.required_attribute(SOURCE_ATTR)?;
        let target = cursor.required_attribute(TARGET_ATTR)?;
        let from = nodes
            .get(source)
            .ok_or_else(|| anyhow!("arc source '{}' is neither a place nor a transition", source))?;
        let to = nodes
            .get(target)
            .ok_or_else(|| anyhow!("arc target '{}' is neither a place nor a transition", target))?;
        let valuation = labelled_text(cursor, INSCRIPTION)?.unwrap_or_else(|| "1".to_string());
        writeln!(out, "CA({},{},{},{})", cami_string("arc"), arc, from, to)?;
        writeln!(out, "CT({},{},{})", cami_string("valuation"), arc, cami_string(&valuation))?;
        arc += 1;
        summary.arcs += 1;
    }
    cursor.reset_query();

    writeln!(out, "FB()")?;
    Ok(summary)
}

/// Run `bounds <cami> -i` and collect its standard output; the process is
/// killed once `timeout` elapses.
fn run_bounds(bounds: &Path, cami: &Path, timeout: Duration) -> Result<SafetyVerdict> {
    let mut child = Command::new(bounds)
        .arg(cami)
        .arg("-i")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to launch {}", bounds.display()))?;

    let stdout = child
        .stdout
        .take()
        .context("bounds standard output is not captured")?;
    let reader = thread::Builder::new()
        .name("nupn-bounds-reader".to_string())
        .spawn(move || BufReader::new(stdout).lines().collect::<std::io::Result<Vec<String>>>())
        .context("failed to spawn bounds reader thread")?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().context("failed to poll bounds")? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                warn!("bounds did not finish within {:?}; killing it", timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Ok(SafetyVerdict::Indeterminate(format!(
                    "bounds timed out after {:?}",
                    timeout
                )));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let lines = reader
        .join()
        .map_err(|_| anyhow!("bounds reader thread panicked"))?
        .context("failed to read bounds output")?;

    if !status.success() {
        return Ok(SafetyVerdict::Indeterminate(format!("bounds exited with {}", status)));
    }
    Ok(parse_bounds_output(&lines))
}

pub struct SafetyChecker<'o> {
    options: &'o ExportOptions,
}

impl<'o> SafetyChecker<'o> {
    pub fn new(options: &'o ExportOptions) -> Self {
        Self { options }
    }

    /// Decide whether the net in `input` is 1-safe
    pub fn check(&self, input: &Path) -> SafetyVerdict {
        info!("Checking whether the net in {} is 1-safe.", input.display());
        match self.try_check(input) {
            Ok(verdict) => {
                info!("Safety verdict: {:?}", verdict);
                verdict
            }
            Err(e) => {
                warn!("Safety check failed: {:#}", e);
                SafetyVerdict::Indeterminate(format!("{:#}", e))
            }
        }
    }

    fn try_check(&self, input: &Path) -> Result<SafetyVerdict> {
        let Some(bounds) = self.options.bounds_executable.as_deref() else {
            bail!("no bounds executable configured");
        };

        let index = StructuralIndex::from_path(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let cami = cami_path_for(input);
        let result = Self::translate(&index, &cami)
            .and_then(|_| run_bounds(bounds, &cami, self.options.safety_check_timeout()));

        if self.options.delete_temporary_files {
            delete_files(&[&cami]);
        }
        result
    }

    fn translate(index: &StructuralIndex, cami: &Path) -> Result<()> {
        let file = File::create(cami)
            .with_context(|| format!("failed to create {}", cami.display()))?;
        let mut out = BufWriter::new(file);
        let summary = write_cami(&mut IndexCursor::new(index), &mut out)
            .with_context(|| format!("failed to translate the net to {}", cami.display()))?;
        out.flush()
            .with_context(|| format!("failed to write {}", cami.display()))?;
        debug!(
            "CAMI translation: {} places, {} transitions, {} arcs",
            summary.places, summary.transitions, summary.arcs
        );
        Ok(())
    }
}
