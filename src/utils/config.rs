//! Per-project build configuration.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = ".qgd.json";

/// Build configuration loaded from `<project>/.qgd.json`, with defaults
/// when the file is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Files larger than this are skipped during packing.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Include hidden files and directories in the walk.
    #[serde(default)]
    pub include_hidden: bool,

    /// Follow symbolic links during the walk.
    #[serde(default)]
    pub follow_links: bool,

    /// Glob patterns (matched against project-relative paths) to exclude.
    #[serde(default)]
    pub excludes: Vec<String>,
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            include_hidden: false,
            follow_links: false,
            excludes: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Load config from the project directory, or return defaults if there
    /// is no config file.
    pub fn load(project: &Path) -> Result<Self> {
        let config_path = project.join(CONFIG_FILE);

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: BuildConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Compile the exclude patterns into a matcher.
    pub fn exclude_matcher(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();

        for pattern in &self.excludes {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid exclude pattern '{}'", pattern))?;
            builder.add(glob);
        }

        builder.build().context("Failed to compile exclude patterns")
    }
}
