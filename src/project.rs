//! The `rust-project.json` descriptor read by rust-analyzer.
//!
//! Output must be byte-stable for a given sysroot: keys sorted, four space
//! indentation, no trailing newline.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use thiserror::Error;

pub const ROOT_MODULE: &str = "src/main.rs";
pub const EDITION: &str = "2021";

// Field order is the serialized key order. Keep every struct sorted.

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDescriptor {
    pub crates: Vec<CrateRoot>,
    pub sysroot: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrateRoot {
    pub cfg: Vec<String>,
    pub deps: Vec<CrateDependency>,
    pub edition: String,
    pub env: BTreeMap<String, String>,
    pub is_proc_macro: bool,
    pub root_module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrateDependency {
    #[serde(rename = "crate")]
    pub krate: usize,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("serializing project descriptor: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("project descriptor is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

impl ProjectDescriptor {
    pub fn new(sysroot: impl Into<String>) -> Self {
        Self {
            crates: vec![CrateRoot {
                cfg: Vec::new(),
                deps: Vec::new(),
                edition: EDITION.to_string(),
                env: BTreeMap::new(),
                is_proc_macro: false,
                root_module: ROOT_MODULE.to_string(),
            }],
            sysroot: sysroot.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProjectError> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Serialize in memory, then write through a temp file so a failed run
/// never leaves a truncated descriptor behind.
pub fn write_descriptor(path: &Path, descriptor: &ProjectDescriptor) -> anyhow::Result<()> {
    let data = descriptor.to_json()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating descriptor directory {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)
        .with_context(|| format!("writing temp descriptor {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("committing descriptor to {}", path.display()));
    }
    Ok(())
}
