use anyhow::Result;
use std::path::Path;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    if seconds < 10.0 {
        return format!("{:.2}s", seconds);
    }

    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Reduce a client-supplied filename to its final component with safe characters
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned = base
        .chars()
        .map(|c| match c {
            // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
            c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
            // Replace everything else with underscore
            _ => '_',
        })
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Check if a file exists and is readable
pub fn check_file_accessible(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("File does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("Path is not a file: {}", path.display());
    }

    // Try to read metadata to check permissions
    std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Cannot access file {}: {}", path.display(), e))?;

    Ok(())
}
