// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! System metrics and process control

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use sysinfo::{Disks, Networks, Pid, System};

use crate::{RavenError, Result};

const GB: f64 = 1024.0 * 1024.0 * 1024.0;
const MB: f64 = 1024.0 * 1024.0;

/// Quick CPU/RAM/disk summary used in spoken replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub disk_percent: f64,
    pub processes: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub percent: f64,
    pub cores: usize,
    /// MHz, when the platform reports it
    pub frequency: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub percent: f64,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// Full metrics for the system page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu: CpuMetrics,
    pub ram: UsageMetrics,
    pub disk: UsageMetrics,
    pub processes: usize,
    pub network: NetworkMetrics,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
    pub status: String,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub username: String,
    pub os: String,
    pub os_version: String,
    pub architecture: String,
    pub kernel: String,
    pub boot_time: String,
}

/// Process list ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessSort {
    #[default]
    Cpu,
    Memory,
    Name,
}

impl std::str::FromStr for ProcessSort {
    type Err = RavenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            "name" => Ok(Self::Name),
            other => Err(RavenError::InvalidRequest(format!("Unknown sort key: {}", other))),
        }
    }
}

/// Access to OS metrics and processes.
///
/// Methods may block (CPU usage needs two samples), so async callers run
/// them on the blocking pool.
pub trait SystemProbe: Send + Sync {
    fn snapshot(&self) -> Result<SystemSnapshot>;

    fn metrics(&self) -> Result<SystemMetrics>;

    /// Processes sorted by `sort`, then truncated to `limit`
    fn processes(&self, sort: ProcessSort, limit: usize) -> Result<Vec<ProcessInfo>>;

    fn system_info(&self) -> Result<SystemInfo>;

    /// Processes whose name contains `fragment` (case-insensitive)
    fn find_processes(&self, fragment: &str) -> Result<Vec<ProcessInfo>>;

    /// Terminate a process, returning its name
    fn terminate(&self, pid: u32) -> Result<String>;

    /// Resident memory of this process in MB
    fn own_memory_mb(&self) -> Result<f64>;
}

/// Sort then truncate a process list
pub fn sort_processes(processes: &mut Vec<ProcessInfo>, sort: ProcessSort, limit: usize) {
    match sort {
        ProcessSort::Cpu => processes.sort_by(|a, b| b.cpu.total_cmp(&a.cpu)),
        ProcessSort::Memory => processes.sort_by(|a, b| b.memory.total_cmp(&a.memory)),
        ProcessSort::Name => processes.sort_by_key(|p| p.name.to_lowercase()),
    }
    processes.truncate(limit);
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// [`SystemProbe`] backed by the `sysinfo` crate
pub struct SysinfoProbe {
    sys: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    fn lock_sys(&self) -> Result<std::sync::MutexGuard<'_, System>> {
        self.sys.lock().map_err(|_| RavenError::System("System probe lock poisoned".to_string()))
    }

    /// Refresh CPU twice with the minimum interval so usage is meaningful
    fn sample_cpu(sys: &mut System) {
        sys.refresh_cpu();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu();
    }

    fn sample_processes(sys: &mut System) {
        sys.refresh_processes();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_processes();
    }

    /// Usage of the disk mounted at the filesystem root
    fn root_disk() -> UsageMetrics {
        let disks = Disks::new_with_refreshed_list();
        let root = if cfg!(windows) { Path::new("C:\\") } else { Path::new("/") };
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == root)
            .or_else(|| disks.list().first());

        match disk {
            Some(d) => {
                let total = d.total_space() as f64;
                let free = d.available_space() as f64;
                let used = (total - free).max(0.0);
                UsageMetrics {
                    percent: if total > 0.0 { round1(used / total * 100.0) } else { 0.0 },
                    total_gb: round2(total / GB),
                    used_gb: round2(used / GB),
                    free_gb: round2(free / GB),
                }
            }
            None => UsageMetrics { percent: 0.0, total_gb: 0.0, used_gb: 0.0, free_gb: 0.0 },
        }
    }

    fn ram(sys: &System) -> UsageMetrics {
        let total = sys.total_memory() as f64;
        let used = sys.used_memory() as f64;
        let free = sys.free_memory() as f64;
        UsageMetrics {
            percent: if total > 0.0 { round1(used / total * 100.0) } else { 0.0 },
            total_gb: round2(total / GB),
            used_gb: round2(used / GB),
            free_gb: round2(free / GB),
        }
    }

    fn collect_processes(sys: &System) -> Vec<ProcessInfo> {
        let total = sys.total_memory() as f64;
        sys.processes()
            .values()
            .map(|p| ProcessInfo {
                pid: p.pid().as_u32(),
                name: p.name().chars().take(50).collect(),
                cpu: round2(f64::from(p.cpu_usage())),
                memory: if total > 0.0 { round2(p.memory() as f64 / total * 100.0) } else { 0.0 },
                status: p.status().to_string(),
                memory_bytes: p.memory(),
            })
            .collect()
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn snapshot(&self) -> Result<SystemSnapshot> {
        let mut sys = self.lock_sys()?;
        Self::sample_cpu(&mut sys);
        sys.refresh_memory();
        sys.refresh_processes();

        Ok(SystemSnapshot {
            cpu_percent: round1(f64::from(sys.global_cpu_info().cpu_usage())),
            ram_percent: Self::ram(&sys).percent,
            disk_percent: Self::root_disk().percent,
            processes: sys.processes().len(),
            timestamp: Utc::now(),
        })
    }

    fn metrics(&self) -> Result<SystemMetrics> {
        let mut sys = self.lock_sys()?;
        Self::sample_cpu(&mut sys);
        sys.refresh_memory();
        sys.refresh_processes();

        let frequency = sys.global_cpu_info().frequency();
        let networks = Networks::new_with_refreshed_list();
        let (bytes_sent, bytes_recv) = networks
            .list()
            .values()
            .fold((0u64, 0u64), |(sent, recv), data| {
                (sent + data.total_transmitted(), recv + data.total_received())
            });

        Ok(SystemMetrics {
            cpu: CpuMetrics {
                percent: round1(f64::from(sys.global_cpu_info().cpu_usage())),
                cores: sys.cpus().len(),
                frequency: if frequency > 0 { Some(frequency) } else { None },
            },
            ram: Self::ram(&sys),
            disk: Self::root_disk(),
            processes: sys.processes().len(),
            network: NetworkMetrics { bytes_sent, bytes_recv },
            timestamp: Utc::now(),
        })
    }

    fn processes(&self, sort: ProcessSort, limit: usize) -> Result<Vec<ProcessInfo>> {
        let mut sys = self.lock_sys()?;
        sys.refresh_memory();
        Self::sample_processes(&mut sys);

        let mut processes = Self::collect_processes(&sys);
        sort_processes(&mut processes, sort, limit);
        Ok(processes)
    }

    fn system_info(&self) -> Result<SystemInfo> {
        let boot = Local
            .timestamp_opt(System::boot_time() as i64, 0)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(SystemInfo {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            username,
            os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version().unwrap_or_default(),
            architecture: std::env::consts::ARCH.to_string(),
            kernel: System::kernel_version().unwrap_or_default(),
            boot_time: boot,
        })
    }

    fn find_processes(&self, fragment: &str) -> Result<Vec<ProcessInfo>> {
        let mut sys = self.lock_sys()?;
        sys.refresh_memory();
        sys.refresh_processes();

        let needle = fragment.to_lowercase();
        let mut found: Vec<ProcessInfo> = Self::collect_processes(&sys)
            .into_iter()
            .filter(|p| p.name.to_lowercase().contains(&needle))
            .collect();
        found.sort_by_key(|p| p.pid);
        Ok(found)
    }

    fn terminate(&self, pid: u32) -> Result<String> {
        let mut sys = self.lock_sys()?;
        sys.refresh_processes();

        let process = sys
            .process(Pid::from_u32(pid))
            .ok_or(RavenError::ProcessNotFound(pid))?;
        let name = process.name().to_string();

        let killed = process
            .kill_with(sysinfo::Signal::Term)
            .unwrap_or_else(|| process.kill());
        if killed {
            tracing::info!("Terminated process {} ({})", pid, name);
            Ok(name)
        } else {
            Err(RavenError::PermissionDenied(format!("cannot terminate process {} ({})", pid, name)))
        }
    }

    fn own_memory_mb(&self) -> Result<f64> {
        let pid = sysinfo::get_current_pid().map_err(|e| RavenError::System(e.to_string()))?;
        let mut sys = self.lock_sys()?;
        sys.refresh_process(pid);
        let bytes = sys.process(pid).map(|p| p.memory()).unwrap_or(0);
        Ok(round2(bytes as f64 / MB))
    }
}
