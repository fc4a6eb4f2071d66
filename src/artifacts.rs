//! Debug artifacts — HTML dumps from failed capture attempts.
//!
//! When an attempt navigates but nothing parses, the captured HTML is the
//! only evidence of what the page actually served. Dumps are best-effort:
//! a failure to write one is logged, never escalated.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Write the captured HTML under `debug_dir` as `last_page_<tag>.html`,
/// overwriting any previous dump with the same tag.
pub fn dump_html(debug_dir: &Path, tag: &str, html: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(debug_dir)
        .with_context(|| format!("failed to create {}", debug_dir.display()))?;
    let path = debug_dir.join(format!("last_page_{tag}.html"));
    std::fs::write(&path, html)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Best-effort variant used from the orchestrator's failure paths.
pub fn try_dump_html(debug_dir: &Path, tag: &str, html: &str) {
    if html.is_empty() {
        return;
    }
    if let Err(e) = dump_html(debug_dir, tag, html) {
        warn!("debug dump failed: {e:#}");
    }
}
