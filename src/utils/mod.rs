// Tue Jan 13 2026 - Alex

pub mod logging;
pub mod process;

pub use logging::LoggingUtils;
pub use process::{run_command, run_shell, CommandError, CommandOutput};

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();

    if total_secs < 0.001 {
        format!("{}µs", duration.as_micros())
    } else if total_secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0).floor();
        let secs = total_secs % 60.0;
        format!("{:.0}m {:.1}s", mins, secs)
    }
}

pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Expresses `path` relative to `base`, walking up with `..` where needed.
/// Mixed absolute/relative inputs return `path` unchanged.
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() != base.is_absolute() {
        return path.to_path_buf();
    }

    if let Ok(stripped) = path.strip_prefix(base) {
        return if stripped.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            stripped.to_path_buf()
        };
    }

    let path_parts: Vec<Component> = path.components().filter(|c| *c != Component::CurDir).collect();
    let base_parts: Vec<Component> = base.components().filter(|c| *c != Component::CurDir).collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_micros(12)), "12µs");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30.0s");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "stage", "stages"), "1 stage");
        assert_eq!(pluralize(3, "stage", "stages"), "3 stages");
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path(Path::new("/data/run/out/a.mrc"), Path::new("/data/run")), PathBuf::from("out/a.mrc"));
        assert_eq!(relative_path(Path::new("/data/raw/a.tif"), Path::new("/data/run")), PathBuf::from("../raw/a.tif"));
        assert_eq!(relative_path(Path::new("/data/run"), Path::new("/data/run")), PathBuf::from("."));
        assert_eq!(relative_path(Path::new("/data"), Path::new("/data/run/x")), PathBuf::from("../.."));
        assert_eq!(relative_path(Path::new("rel/a"), Path::new("/abs")), PathBuf::from("rel/a"));
    }
}
