//! Resource Descriptor
//!
//! Tasks, threads and limits requested for one benchmark run, plus the
//! duration strings used throughout spec sources and `ifsbench.toml`.

use serde::Serialize;
use std::time::Duration;

/// Default grace period between SIGTERM and SIGKILL
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Default wall-time limit
pub const DEFAULT_WALL_TIME: Duration = Duration::from_secs(3600);

/// Compute resources for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resources {
    /// MPI tasks
    pub tasks: u32,
    /// OpenMP threads per task
    pub threads_per_task: u32,
    /// Node count
    pub nodes: Option<u32>,
    /// Memory limit per node in megabytes
    pub memory_mb: Option<u64>,
    /// Wall-time limit, measured from launch
    pub wall_time: Duration,
    /// Time allowed for a graceful shutdown before SIGKILL
    pub grace_period: Duration,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            tasks: 1,
            threads_per_task: 1,
            nodes: None,
            memory_mb: None,
            wall_time: DEFAULT_WALL_TIME,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl Resources {
    /// Problems with these resources, one message each
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.tasks == 0 {
            problems.push("resources.tasks must be positive".to_string());
        }
        if self.threads_per_task == 0 {
            problems.push("resources.threads_per_task must be positive".to_string());
        }
        if self.nodes == Some(0) {
            problems.push("resources.nodes must be positive".to_string());
        }
        if self.memory_mb == Some(0) {
            problems.push("resources.memory_mb must be positive".to_string());
        }
        if self.wall_time.is_zero() {
            problems.push("resources.wall_time must be positive".to_string());
        }
        problems
    }
}

/// Parse a duration string such as `"500ms"`, `"3s"`, `"2m"`, `"1h"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // The unit is the trailing run of letters, so exponents like `1e3s` stay in the number
    let (num_part, unit_part) = match s.trim_end_matches(char::is_alphabetic) {
        num if num.len() == s.len() => (s, "s"),
        num => s.split_at(num.len()),
    };

    let value: f64 = num_part
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration number '{}'", num_part))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("invalid duration '{}'", s));
    }

    let seconds_per_unit = match unit_part.trim().to_lowercase().as_str() {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "s" | "sec" => 1.0,
        "m" | "min" => 60.0,
        "h" => 3600.0,
        other => return Err(format!("unknown duration unit '{}'", other)),
    };

    Duration::try_from_secs_f64(value * seconds_per_unit).map_err(|_| format!("duration '{}' is too large", s))
}

/// Compact rendering used in listings (`90s`, `30m`, `2h`, `1.5s`)
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if d.subsec_nanos() != 0 {
        if secs == 0 {
            return format!("{}ms", d.as_millis());
        }
        return format!("{:.3}s", d.as_secs_f64());
    }
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("100us").unwrap(), Duration::from_micros(100));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("3 fortnights").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_parse_duration_exponents() {
        assert_eq!(parse_duration("1e3s").unwrap(), Duration::from_secs(1000));
        assert_eq!(parse_duration("1.5e1m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("2E2").unwrap(), Duration::from_secs(200));
        assert!(parse_duration("1e").is_err());
        assert!(parse_duration("inf").is_err());
    }

    #[test]
    fn test_parse_duration_too_large() {
        let err = parse_duration("100000000000000000000000h").unwrap_err();
        assert!(err.contains("too large"), "{}", err);
        assert!(parse_duration("1e300").is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(1800)), "30m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
    }

    #[test]
    fn test_problems() {
        assert!(Resources::default().problems().is_empty());

        let bad = Resources {
            tasks: 0,
            nodes: Some(0),
            wall_time: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(bad.problems().len(), 3);
    }
}
