//! JSON reporter
//!
//! Outputs the full ScanResult as pretty-printed JSON.
//! Useful for machine consumption, piping to jq, or further processing.

use crate::models::ScanResult;
use anyhow::Result;

/// Render result as JSON
pub fn render(result: &ScanResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
