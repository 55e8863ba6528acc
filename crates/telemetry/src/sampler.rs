use std::fs;
use std::path::PathBuf;

use sysinfo::{Pid, System};
use tracing::debug;

use crate::ThermalLevel;

/// Reads the current process's resident memory via sysinfo.
pub struct MemorySampler {
    system: System,
    pid: Option<Pid>,
}

impl MemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                debug!(error = err, "current pid unavailable, memory sampling disabled");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Resident set size in bytes, or `None` when the process cannot be read.
    pub fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_process(pid);
        self.system.process(pid).map(|process| process.memory())
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

// Millidegree thresholds separating the four thermal levels.
const FAIR_MILLI_C: i64 = 60_000;
const SERIOUS_MILLI_C: i64 = 75_000;
const CRITICAL_MILLI_C: i64 = 85_000;

/// Polls the kernel thermal zones and coarsens the hottest reading onto
/// [`ThermalLevel`]. Hosts without readable zones report `Nominal`.
pub struct ThermalProbe {
    zones: Vec<PathBuf>,
}

impl ThermalProbe {
    pub fn discover() -> Self {
        let mut zones = Vec::new();
        if let Ok(entries) = fs::read_dir("/sys/class/thermal") {
            for entry in entries.flatten() {
                let path = entry.path();
                if path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("thermal_zone"))
                {
                    zones.push(path.join("temp"));
                }
            }
        }
        if zones.is_empty() {
            debug!("no thermal zones found, thermal level pinned to nominal");
        }
        Self { zones }
    }

    pub fn level(&self) -> ThermalLevel {
        let hottest = self
            .zones
            .iter()
            .filter_map(|path| fs::read_to_string(path).ok())
            .filter_map(|raw| raw.trim().parse::<i64>().ok())
            .max();
        match hottest {
            Some(milli) => classify(milli),
            None => ThermalLevel::Nominal,
        }
    }
}

fn classify(milli_celsius: i64) -> ThermalLevel {
    if milli_celsius >= CRITICAL_MILLI_C {
        ThermalLevel::Critical
    } else if milli_celsius >= SERIOUS_MILLI_C {
        ThermalLevel::Serious
    } else if milli_celsius >= FAIR_MILLI_C {
        ThermalLevel::Fair
    } else {
        ThermalLevel::Nominal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify(45_000), ThermalLevel::Nominal);
        assert_eq!(classify(60_000), ThermalLevel::Fair);
        assert_eq!(classify(75_000), ThermalLevel::Serious);
        assert_eq!(classify(90_000), ThermalLevel::Critical);
    }
}
