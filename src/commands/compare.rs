//! `netintent compare`: diff two local configuration trees, no daemon needed.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config;
use crate::domain::drift;
use crate::sources::parse_tree;

use super::output;

pub fn run(
    source: &Path,
    device: &Path,
    fail_on_critical: bool,
    format: &str,
    config_path: Option<&Path>,
) -> Result<()> {
    let cfg = config::load_with(config_path)?;
    let source_tree = read_tree(source)?;
    let device_tree = read_tree(device)?;

    let report = drift::compare(&source_tree, &device_tree, &cfg.comparison.severity_rules);
    output::print_output(format, &report, output::print_report)?;

    if fail_on_critical && report.count_by_severity(drift::Severity::Critical) > 0 {
        std::process::exit(2);
    }
    Ok(())
}

/// Files ending in `.json` are parsed as JSON, anything else as YAML.
fn read_tree(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml")
        .to_ascii_lowercase();
    let ext = if ext == "json" { "json" } else { "yaml" };
    parse_tree(&path.display().to_string(), ext, &content)
        .with_context(|| format!("parsing {}", path.display()))
}
