//! Host Metadata
//!
//! Recorded in every manifest so runs on different machines can be told
//! apart. Linux-specific details degrade to `None` elsewhere.

use serde::{Deserialize, Serialize};

/// Machine a run executed on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Host name
    pub hostname: String,
    /// Operating system
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// CPU model name
    pub cpu: Option<String>,
    /// Available cores
    pub cpu_cores: u32,
    /// Total memory in GB
    pub memory_gb: Option<f64>,
}

impl HostInfo {
    /// Describe the current machine
    pub fn collect() -> Self {
        Self {
            hostname: hostname().unwrap_or_else(|| "unknown".to_string()),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu: cpu_model(),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1),
            memory_gb: memory_gb(),
        }
    }
}

fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if ret != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec()).ok().filter(|h| !h.is_empty())
}

fn cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo").ok().and_then(|content| {
            content
                .lines()
                .find(|l| l.starts_with("model name"))
                .and_then(|l| l.split(':').nth(1))
                .map(|s| s.trim().to_string())
        })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn memory_gb() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/meminfo").ok().and_then(|content| {
            content
                .lines()
                .find(|l| l.starts_with("MemTotal"))
                .and_then(|l| l.split_whitespace().nth(1).and_then(|s| s.parse::<u64>().ok()))
                .map(|kb| kb as f64 / 1024.0 / 1024.0)
        })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect() {
        let host = HostInfo::collect();
        assert!(!host.hostname.is_empty());
        assert!(host.cpu_cores >= 1);
        assert_eq!(host.os, std::env::consts::OS);
    }
}
