// SPDX-FileCopyrightText: 2026 Medspa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `/etc/medspa/medspa.toml`, `~/.config/medspa/medspa.toml`,
//! `./medspa.toml`, then `MEDSPA_` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MedspaConfig;

/// Top-level sections, longest first so `retry_sender_` wins over shorter prefixes.
const SECTIONS: &[&str] = &[
    "observability",
    "hosted_poller",
    "retry_sender",
    "supervisor",
    "anthropic",
    "storage",
    "deposit",
    "outbox",
    "worker",
    "telnyx",
    "queue",
    "jobs",
];

/// Candidate config files, lowest precedence first.
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/medspa/medspa.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("medspa/medspa.toml"));
    }
    paths.push(PathBuf::from("medspa.toml"));
    paths
}

/// Load configuration from the standard lookup paths with env var overrides.
pub fn load_config() -> Result<MedspaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no environment).
pub fn load_config_from_str(toml_content: &str) -> Result<MedspaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MedspaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MedspaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MedspaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    config_file_candidates()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(MedspaConfig::default())),
            |fig, path| fig.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Maps a lowercased, prefix-stripped env key to a dotted config path.
///
/// `worker_receive_wait_secs` becomes `worker.receive_wait_secs`; only the
/// section prefix is split so underscores inside field names survive.
pub fn map_env_key(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|field| format!("{section}.{field}"))
        })
        .unwrap_or_else(|| key.to_string())
}

fn env_provider() -> Env {
    Env::prefixed("MEDSPA_").map(|key| map_env_key(key.as_str()).into())
}
