//! Device inventories and variable files
//!
//! Both are read as TOML or JSON depending on the file extension. An inventory
//! is either a bare JSON array of devices or a document with a `devices` list
//! (`[[devices]]` tables in TOML).

use anyhow::{Context, Result, bail};
use dispatch::Device;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use template::Variables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Toml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => bail!(
                "Unsupported file type for {} (expected .toml or .json)",
                path.display()
            ),
        }
    }
}

fn parse<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = FileFormat::from_path(path)?;
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    match format {
        FileFormat::Toml => {
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
        }
        FileFormat::Json => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display())),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InventoryFile {
    List(Vec<Device>),
    Document { devices: Vec<Device> },
}

/// Load the devices listed in `path`.
pub fn load_devices(path: &Path) -> Result<Vec<Device>> {
    let devices = match parse::<InventoryFile>(path)? {
        InventoryFile::List(devices) | InventoryFile::Document { devices } => devices,
    };
    log::debug!("Loaded {} device(s) from {}", devices.len(), path.display());
    Ok(devices)
}

/// Load a flat variable map from `path`.
pub fn load_variables(path: &Path) -> Result<Variables> {
    parse(path)
}

/// Variables from an optional file, then `key=value` overrides in order.
pub fn collect_variables(file: Option<&Path>, assignments: &[String]) -> Result<Variables> {
    let mut variables = match file {
        Some(path) => load_variables(path)?,
        None => Variables::new(),
    };
    for assignment in assignments {
        let (key, value) = Variables::parse_assignment(assignment).map_err(anyhow::Error::msg)?;
        variables.insert(key, value);
    }
    Ok(variables)
}
