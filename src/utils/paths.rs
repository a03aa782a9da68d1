// Output file naming and cleanup
//
// A conversion of `model.pnml` writes `model.nupn` plus two transient side
// files, `model.trans` and `model.places`, next to it. The safety checker
// writes `model.cami` next to the input.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::export::constants::{CAMI_EXT, NUPN_EXT, PLACES_EXT, TRANS_EXT};
use crate::export::writer::StreamKind;

/// Paths of the three output streams of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub main: PathBuf,
    pub transitions: PathBuf,
    pub places: PathBuf,
}

impl OutputPaths {
    /// Side files share the output's base name
    pub fn for_output(output: &Path) -> Self {
        let base = base_name(output);
        Self {
            main: output.to_path_buf(),
            transitions: with_suffix(&base, TRANS_EXT),
            places: with_suffix(&base, PLACES_EXT),
        }
    }

    pub fn for_stream(&self, kind: StreamKind) -> &Path {
        match kind {
            StreamKind::Main => &self.main,
            StreamKind::TransitionLabels => &self.transitions,
            StreamKind::PlaceLabels => &self.places,
        }
    }
}

/// Path without its last extension
pub fn base_name(path: &Path) -> PathBuf {
    match path.file_stem() {
        Some(stem) => path.with_file_name(stem),
        None => path.to_path_buf(),
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Default NUPN output path for a PNML input
pub fn nupn_path_for(input: &Path) -> PathBuf {
    with_suffix(&base_name(input), NUPN_EXT)
}

/// CAMI file written next to a PNML input
pub fn cami_path_for(input: &Path) -> PathBuf {
    with_suffix(&base_name(input), CAMI_EXT)
}

/// Remove files, ignoring those that do not exist
pub fn delete_files(paths: &[&Path]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!("Deleted {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_side_files_share_base_name() {
        let paths = OutputPaths::for_output(Path::new("/models/philo.nupn"));
        assert_eq!(paths.main, PathBuf::from("/models/philo.nupn"));
        assert_eq!(paths.transitions, PathBuf::from("/models/philo.trans"));
        assert_eq!(paths.places, PathBuf::from("/models/philo.places"));
        assert_eq!(
            paths.for_stream(StreamKind::PlaceLabels),
            Path::new("/models/philo.places")
        );
    }

    #[test]
    fn test_only_last_extension_is_replaced() {
        assert_eq!(
            nupn_path_for(Path::new("nets/model.v2.pnml")),
            PathBuf::from("nets/model.v2.nupn")
        );
        assert_eq!(
            cami_path_for(Path::new("nets/model.pnml")),
            PathBuf::from("nets/model.cami")
        );
    }

    #[test]
    fn test_output_without_extension() {
        let paths = OutputPaths::for_output(Path::new("out/model"));
        assert_eq!(paths.transitions, PathBuf::from("out/model.trans"));
    }

    #[test]
    fn test_delete_files_ignores_missing() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present.trans");
        let missing = temp_dir.path().join("missing.places");
        fs::write(&present, "T0 t\n").unwrap();

        delete_files(&[&present, &missing]);
        assert!(!present.exists());
    }
}
