//! Persistence layer.
//!
//! Saves and loads small JSON documents (currently the Telegram sink
//! settings). The ledger and agent session are in-memory
//! only and never touch disk.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Save a value to a pretty-printed JSON file.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise document")?;

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    debug!(path = %path.display(), "Document saved");
    Ok(())
}

/// Load a value from a JSON file.
/// Returns None if the file doesn't exist.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        debug!(path = %path.display(), "No saved document found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: T = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    info!(path = %path.display(), "Document loaded from disk");
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
