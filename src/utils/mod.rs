use std::path::Path;
use std::process::Stdio;

use crate::engine::EngineResources;

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

/// Report engine executables that cannot be run
pub async fn check_dependencies(resources: &EngineResources) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&resources.core).await {
        missing.push(format!(
            "{} - required to convert video audio",
            resources.core.display()
        ));
    }

    if !check_command_available(&resources.probe).await {
        missing.push(format!(
            "{} - required to read media durations",
            resources.probe.display()
        ));
    }

    missing
}

/// Check if a command runs with `-version`
pub async fn check_command_available(command: &Path) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
