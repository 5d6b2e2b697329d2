//! Startup assets: the course outline and the session instruction template.

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing::{info, warn};
use tutor_core::{instructions::DEFAULT_TEMPLATE, outline::CourseOutline};

/// File name of the instruction template inside the prompts directory.
pub const INSTRUCTIONS_FILE: &str = "session_instructions.md";

/// Reads a JSON course outline. With no path the course starts empty and
/// clients are expected to send `set_outline`.
pub fn load_outline(path: Option<&Path>) -> Result<CourseOutline> {
    let Some(path) = path else {
        warn!("No outline configured. Starting with an empty course.");
        return Ok(CourseOutline::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read outline from {}", path.display()))?;
    let outline: CourseOutline = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse outline in {}", path.display()))?;
    info!(path = %path.display(), sections = outline.sections.len(), "Outline loaded.");
    Ok(outline)
}

/// Loads `session_instructions.md` from the prompts directory, falling back to
/// the compiled-in template when the file is absent.
pub fn load_instructions_template(prompts_path: &Path) -> Result<String> {
    let path = prompts_path.join(INSTRUCTIONS_FILE);
    if !path.is_file() {
        info!(path = %path.display(), "No instruction template found. Using the built-in one.");
        return Ok(DEFAULT_TEMPLATE.to_string());
    }
    fs::read_to_string(&path)
        .with_context(|| format!("Failed to read instruction template {}", path.display()))
}
