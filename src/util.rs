//! Shared utility functions for the Foreman crate.

use std::io::Write;
use std::path::Path;

/// Write `content` to `path` atomically.
///
/// Writes to a temp file in the same directory, fsyncs, then renames over
/// the target. A crash mid-write leaves the previous document intact.
pub fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp = dir.join(format!(".{}.tmp.{}", file_name, std::process::id()));

    let result = (|| {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Truncate a string to at most `max` characters, appending an ellipsis
/// marker when content was dropped. Used to keep agent output snippets
/// readable in recorded errors.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max).collect();
    format!("{}...", truncated.trim_end())
}
