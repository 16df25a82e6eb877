use std::path::Path;

use anyhow::{Context, Result};

use x64gen_rs::instructions::{load_table_json, x64_table};
use x64gen_rs::{GenConfig, InstrDesc};

/// Instruction rows from a JSON file, or the built-in table.
pub fn load_table(path: Option<&Path>) -> Result<Vec<InstrDesc>> {
    let Some(path) = path else { return Ok(x64_table()) };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let rows = load_table_json(&text).with_context(|| format!("parsing {}", path.display()))?;
    anyhow::ensure!(!rows.is_empty(), "{} holds no instructions", path.display());
    Ok(rows)
}

pub fn load_config(path: Option<&Path>) -> Result<GenConfig> {
    let Some(path) = path else { return Ok(GenConfig::default()) };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    GenConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))
}
