// File: src/config.rs
//
// Compiler and runtime options, loaded from a TOML file.
// Every field has a default so a config file only needs to name what it
// changes; command-line flags are applied on top by the binary.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::IckError;

/// Name of the config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "comefrom.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Deepest the nexting stack may grow before E123
    pub max_nexting_depth: usize,
    /// Fold constant expressions while lowering
    pub optimize: bool,
    /// Enforce the PLEASE ratio (E079 / E099)
    pub politeness: bool,
    /// Link the system library after user libraries
    pub stdlib: bool,
    /// Seed for the %-chance and random-number source
    pub seed: Option<u64>,
    /// Log every executed statement
    pub trace: bool,
    /// Labels a library exports; all labels when absent
    pub public_labels: Option<Vec<u32>>,
    /// Libraries linked into every program, in order
    pub libraries: Vec<PathBuf>,
    /// Directories searched for libraries given by bare name
    pub search_paths: Vec<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_nexting_depth: 80,
            optimize: true,
            politeness: true,
            stdlib: true,
            seed: None,
            trace: false,
            public_labels: None,
            libraries: Vec::new(),
            search_paths: Vec::new(),
        }
    }
}

impl Options {
    pub fn from_toml_str(text: &str) -> Result<Self, IckError> {
        toml::from_str(text).map_err(|e| IckError::config(format!("({})", e.message())))
    }

    pub fn load(path: &Path) -> Result<Self, IckError> {
        let text = fs::read_to_string(path)
            .map_err(|e| IckError::config(format!("({}: {})", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if given, else `comefrom.toml` in the working directory
    /// if one exists, else the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, IckError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.is_file() {
                    Self::load(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCode, ErrorKind};

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.max_nexting_depth, 80);
        assert!(options.optimize && options.politeness && options.stdlib);
        assert_eq!(options.public_labels, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let options = Options::from_toml_str(
            "max_nexting_depth = 10\nseed = 42\npublic_labels = [1000, 1010]\n",
        )
        .unwrap();
        assert_eq!(options.max_nexting_depth, 10);
        assert_eq!(options.seed, Some(42));
        assert_eq!(options.public_labels, Some(vec![1000, 1010]));
        assert!(options.optimize);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = Options::from_toml_str("max_depth = 3").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(err.code, ErrorCode::E2001);
    }
}
