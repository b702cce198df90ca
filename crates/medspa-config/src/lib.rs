// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the medspa pipeline.
//!
//! Layered TOML + environment configuration with strict key checking
//! (`deny_unknown_fields`), cross-section validation, and miette diagnostics
//! with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use medspa_config::load_and_validate;
//!
//! let config = load_and_validate(None).expect("config errors");
//! println!("workers: {}", config.worker.count);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::MedspaConfig;

/// Load configuration and validate it.
///
/// With `path`, only that file (plus env overrides) is read; otherwise the
/// standard lookup paths are merged. Figment errors become diagnostics with
/// source spans where the offending file can be read back.
pub fn load_and_validate(path: Option<&Path>) -> Result<MedspaConfig, Vec<ConfigError>> {
    let loaded = match path {
        Some(p) => loader::load_config_from_path(p),
        None => loader::load_config(),
    };
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let files = match path {
                Some(p) => vec![p.to_path_buf()],
                None => loader::config_file_candidates(),
            };
            Err(diagnostic::figment_to_config_errors(
                err,
                &read_sources(&files),
            ))
        }
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<MedspaConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn read_sources(paths: &[std::path::PathBuf]) -> Vec<(String, String)> {
    paths
        .iter()
        .filter_map(|p| {
            let content = std::fs::read_to_string(p).ok()?;
            // Figment reports file sources by absolute path.
            let name = std::fs::canonicalize(p)
                .unwrap_or_else(|_| p.clone())
                .display()
                .to_string();
            Some((name, content))
        })
        .collect()
}
