//! Host health snapshot
//!
//! Describes the machine a service runs on: OS details, per-CPU load,
//! memory and disk usage per mount point. Published as an `event: "host"`
//! document next to the service's `status` events.

use crate::health::event::{safe_marshal, EVENT_TYPE};
use crate::health::reporter::local_hostname;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use sysinfo::{Disks, System};

/// Value of the `event` field on host snapshots
pub const HOST_EVENT: &str = "host";

// CPU usage is a delta between refreshes, so one System lives for the process
static SYSTEM: LazyLock<Mutex<System>> = LazyLock::new(|| {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_memory();
    Mutex::new(sys)
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub arch: String,
    pub uptime_secs: u64,
    pub boot_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuStat {
    pub name: String,
    /// Percent busy since the previous snapshot
    pub usage_percent: f32,
    pub frequency_mhz: u64,
}

/// Memory and swap, in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStat {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
    pub swap_total: u64,
    pub swap_used: u64,
}

/// Usage of one mounted filesystem, in bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub device: String,
    pub filesystem: String,
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub used_percent: f64,
}

/// Point-in-time host snapshot.
///
/// ```json
/// {"hostname":"host123","timestamp":1559761560,"etype":"health","event":"host",
///  "host":{...},"cpus":[...],"memory":{...},"disks":{"/":{...}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostHealth {
    pub hostname: String,
    pub timestamp: i64,
    #[serde(rename = "etype")]
    pub event_type: String,
    pub event: String,
    pub host: HostInfo,
    pub cpus: Vec<CpuStat>,
    pub memory: MemoryStat,
    /// Keyed by mount point
    pub disks: BTreeMap<String, DiskUsage>,
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Collect a host snapshot stamped with `now`.
///
/// Reads procfs or the platform equivalent and may block briefly; call it
/// through `spawn_blocking` from async code. CPU usage covers the time
/// since the previous call, so the first snapshot in a process reads low.
pub fn host_health(now: DateTime<Utc>) -> HostHealth {
    let (cpus, memory) = {
        let mut sys = SYSTEM.lock();
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpus = sys
            .cpus()
            .iter()
            .map(|cpu| CpuStat {
                name: cpu.name().to_string(),
                usage_percent: cpu.cpu_usage(),
                frequency_mhz: cpu.frequency(),
            })
            .collect();

        let total = sys.total_memory();
        let available = sys.available_memory();
        let used = total.saturating_sub(available);
        let memory = MemoryStat {
            total,
            available,
            used,
            free: sys.free_memory(),
            used_percent: percent(used, total),
            swap_total: sys.total_swap(),
            swap_used: sys.used_swap(),
        };
        (cpus, memory)
    };

    let disks = Disks::new_with_refreshed_list()
        .list()
        .iter()
        .map(|disk| {
            let total = disk.total_space();
            let available = disk.available_space();
            let used = total.saturating_sub(available);
            let usage = DiskUsage {
                device: disk.name().to_string_lossy().to_string(),
                filesystem: disk.file_system().to_string_lossy().to_string(),
                total,
                available,
                used,
                used_percent: percent(used, total),
            };
            (disk.mount_point().to_string_lossy().to_string(), usage)
        })
        .collect();

    let unknown = || "unknown".to_string();
    HostHealth {
        hostname: local_hostname(),
        timestamp: now.timestamp(),
        event_type: EVENT_TYPE.to_string(),
        event: HOST_EVENT.to_string(),
        host: HostInfo {
            os_name: System::name().unwrap_or_else(unknown),
            os_version: System::os_version().unwrap_or_else(unknown),
            kernel_version: System::kernel_version().unwrap_or_else(unknown),
            arch: std::env::consts::ARCH.to_string(),
            uptime_secs: System::uptime(),
            boot_time: System::boot_time(),
        },
        cpus,
        memory,
        disks,
    }
}

/// [`host_health`] encoded with [`safe_marshal`]
pub fn host_health_bytes(now: DateTime<Utc>) -> Vec<u8> {
    safe_marshal(&host_health(now))
}
