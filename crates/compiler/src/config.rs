//! Build configuration
//!
//! An optional `tapl.toml` next to the source file (or in the working
//! directory) overrides the build defaults:
//!
//! ```toml
//! [build]
//! build_dir = "out"
//! cc = "clang"
//! clang_format = "clang-format-18"
//! run = false
//! ```
//!
//! Command-line flags override file values, which override the built-in
//! defaults.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "tapl.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    /// Directory the generated C sources and the executable land in
    pub build_dir: Option<PathBuf>,
    /// C compiler binary
    pub cc: Option<String>,
    /// C formatter binary
    pub clang_format: Option<String>,
    /// Whether to run the produced executable after building
    pub run: Option<bool>,
}

impl BuildConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse {CONFIG_FILE}: {e}"))
    }

    /// Load the configuration for a source file: `tapl.toml` next to the
    /// file wins over one in the working directory; neither existing
    /// yields the defaults
    pub fn load(source_file: &Path) -> Result<Self, String> {
        let mut candidates = Vec::new();
        if let Some(parent) = source_file.parent()
            && !parent.as_os_str().is_empty()
        {
            candidates.push(parent.join(CONFIG_FILE));
        }
        candidates.push(PathBuf::from(CONFIG_FILE));

        for candidate in candidates {
            if candidate.is_file() {
                let content = fs::read_to_string(&candidate)
                    .map_err(|e| format!("Failed to read {}: {e}", candidate.display()))?;
                return Self::from_toml(&content);
            }
        }
        Ok(Self::default())
    }

    pub fn build_dir(&self) -> PathBuf {
        self.build
            .build_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("build"))
    }

    pub fn cc(&self) -> String {
        self.build.cc.clone().unwrap_or_else(|| "gcc".to_string())
    }

    pub fn clang_format(&self) -> String {
        self.build
            .clang_format
            .clone()
            .unwrap_or_else(|| "clang-format".to_string())
    }

    pub fn run(&self) -> bool {
        self.build.run.unwrap_or(true)
    }
}
