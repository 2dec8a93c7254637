//! Update manifest parsing
//!
//! Every remote source publishes a manifest named [`MANIFEST_FILE_NAME`] at
//! its root. It is a YAML document listing the update rules in order:
//!
//! ```yaml
//! rules:
//!   - name: Card pack
//!     server_path: Content/Cards
//!     client_path: /home/user/game/UserData/chara
//!     recursive: true
//!     remove_extraneous: false
//!     versioning: size
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use crate::domain::{UpdateError, UpdateRule, VersioningPolicy};

/// Well-known manifest file name, looked up case-insensitively in the remote root
pub const MANIFEST_FILE_NAME: &str = "update-manifest.yaml";

/// Per-source parameters applied while parsing a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestOptions {
    /// Priority attached to every task produced from this manifest. When two
    /// sources publish a rule for the same local directory, callers prefer
    /// the higher priority.
    pub priority: i32,
    /// Minimum number of rules a manifest must declare to be accepted
    pub min_rules: usize,
}

impl ManifestOptions {
    pub const fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            min_rules: 0,
        }
    }
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self::with_priority(1)
    }
}

/// A parsed manifest
#[derive(Debug)]
pub struct Manifest {
    /// One entry per declared record, in declaration order. A record that is
    /// not a valid rule keeps its slot as a configuration error.
    pub rules: Vec<Result<UpdateRule, UpdateError>>,
    /// Priority inherited from the source's [`ManifestOptions`]
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    #[serde(default)]
    rules: Vec<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct ManifestRecord {
    name: Option<String>,
    server_path: String,
    client_path: PathBuf,
    #[serde(default = "default_recursive")]
    recursive: bool,
    #[serde(default)]
    remove_extraneous: bool,
    #[serde(default = "default_versioning")]
    versioning: String,
}

fn default_recursive() -> bool {
    true
}

fn default_versioning() -> String {
    "size".to_string()
}

/// Parses a manifest byte stream into an ordered list of rules.
///
/// Malformed YAML or fewer records than `options.min_rules` fail the whole
/// manifest. A record with missing fields, a relative client path, or an
/// unknown versioning mode fails only its own slot.
pub fn parse_manifest(bytes: &[u8], options: &ManifestOptions) -> Result<Manifest, UpdateError> {
    let document: ManifestDocument = serde_yaml::from_slice(bytes)
        .map_err(|e| UpdateError::Configuration(format!("invalid update manifest: {e}")))?;

    let rules: Vec<_> = document
        .rules
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let record: ManifestRecord = serde_yaml::from_value(value).map_err(|e| {
                UpdateError::Configuration(format!("rule {index}: invalid record: {e}"))
            })?;
            into_rule(index, record)
        })
        .collect();

    if rules.len() < options.min_rules {
        return Err(UpdateError::Configuration(format!(
            "update manifest declares {} rules, at least {} required",
            rules.len(),
            options.min_rules
        )));
    }

    Ok(Manifest {
        rules,
        priority: options.priority,
    })
}

fn into_rule(index: usize, record: ManifestRecord) -> Result<UpdateRule, UpdateError> {
    if !record.client_path.is_absolute() {
        return Err(UpdateError::Configuration(format!(
            "rule {index}: client path must be absolute: {}",
            record.client_path.display()
        )));
    }
    let versioning: VersioningPolicy = record
        .versioning
        .parse()
        .map_err(|_| {
            UpdateError::Configuration(format!(
                "rule {index}: unknown versioning mode '{}'; valid options: size, date",
                record.versioning
            ))
        })?;

    Ok(UpdateRule {
        name: record.name.filter(|n| !n.trim().is_empty()),
        server_path: record.server_path,
        client_path: record.client_path,
        recursive: record.recursive,
        remove_extraneous: record.remove_extraneous,
        versioning,
    })
}
