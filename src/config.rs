// Conversion options
//
// Loaded from a TOML file or string; every field has a default so a partial
// file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Options consumed by the extraction engine and the safety checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Use place display names instead of PNML ids as place labels
    pub use_place_names: bool,
    /// Use transition display names instead of PNML ids as transition labels
    pub use_transition_names: bool,
    /// First NUPN place number
    pub first_place_number: u64,
    /// First NUPN transition number
    pub first_transition_number: u64,
    /// Delete label side files and the CAMI file once they are no longer needed
    pub delete_temporary_files: bool,
    /// Path to the `bounds` executable used by the 1-safety checker
    pub bounds_executable: Option<PathBuf>,
    /// Upper bound on the wait for the `bounds` executable
    pub safety_check_timeout_secs: u64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            use_place_names: false,
            use_transition_names: false,
            first_place_number: 0,
            first_transition_number: 0,
            delete_temporary_files: true,
            bounds_executable: None,
            safety_check_timeout_secs: 5,
        }
    }
}

impl ExportOptions {
    /// Parse options from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn safety_check_timeout(&self) -> Duration {
        Duration::from_secs(self.safety_check_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let options = ExportOptions::default();
        assert!(!options.use_place_names);
        assert!(!options.use_transition_names);
        assert_eq!(options.first_place_number, 0);
        assert_eq!(options.first_transition_number, 0);
        assert!(options.delete_temporary_files);
        assert_eq!(options.safety_check_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = ExportOptions::from_toml_str(
            "use_place_names = true\nfirst_transition_number = 1\n",
        )
        .unwrap();
        assert!(options.use_place_names);
        assert_eq!(options.first_transition_number, 1);
        assert_eq!(options.first_place_number, 0);
        assert!(options.delete_temporary_files);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pnml2nupn.toml");
        fs::write(
            &path,
            "delete_temporary_files = false\nbounds_executable = \"/opt/cadp/bounds\"\n",
        )
        .unwrap();

        let options = ExportOptions::load(&path).unwrap();
        assert!(!options.delete_temporary_files);
        assert_eq!(
            options.bounds_executable.as_deref(),
            Some(Path::new("/opt/cadp/bounds"))
        );
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let err = ExportOptions::from_toml_str("first_place_number = \"zero\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = ExportOptions::load(&temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
