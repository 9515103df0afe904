// PEGASUSQ LINUX PLATFORM
// PROCFS/SYSFS BACKEND FOR THE Platform TRAIT.
//
//   TOPOLOGY   /sys/devices/system/cpu/{online,possible,cpuN/online}
//   HOTPLUG    WRITE 1/0 TO cpuN/online
//   ACCOUNTING /proc/stat cpuN LINES (USER_HZ TICKS -> US), procs_running
//   DVFS       cpuN/cpufreq/scaling_{cur,min,max}_freq, scaling_setspeed
//
// scaling_setspeed ONLY EXISTS UNDER THE userspace CPUFREQ GOVERNOR.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use regex::Regex;

use crate::error::{GovernorError, Result};
use crate::platform::{IdleTime, Platform, Relation};

const SYS_CPU: &str = "/sys/devices/system/cpu";
const PROC_STAT: &str = "/proc/stat";

// /proc/stat IS RE-READ AT MOST ONCE PER MILLISECOND
const STAT_CACHE_NS: u64 = 1_000_000;

// --- PARSING ---

// COUNT CPUS IN A KERNEL RANGE LIST ("0-3,5")
pub fn parse_cpu_range(raw: &str) -> usize {
    expand_cpu_range(raw).len()
}

pub fn expand_cpu_range(raw: &str) -> Vec<usize> {
    let mut cpus = Vec::new();
    for range in raw.trim().split(',') {
        let parts: Vec<&str> = range.trim().split('-').collect();
        match parts.len() {
            1 => {
                if let Ok(c) = parts[0].parse::<usize>() {
                    cpus.push(c);
                }
            }
            2 => {
                if let (Ok(lo), Ok(hi)) = (parts[0].parse::<usize>(), parts[1].parse::<usize>()) {
                    if lo <= hi {
                        cpus.extend(lo..=hi);
                    }
                }
            }
            _ => {}
        }
    }
    cpus
}

// PER-CPU TIMES FROM ONE /proc/stat cpuN LINE, IN USER_HZ TICKS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatTicks {
    pub idle: u64,
    pub iowait: u64,
    pub nice: u64,
    pub total: u64,
}

// FIELDS: user nice system idle iowait irq softirq steal [guest guest_nice]
// GUEST TIME IS ALREADY INCLUDED IN user/nice AND IS NOT ADDED TO THE TOTAL.
pub fn parse_stat_fields(fields: &str) -> Option<StatTicks> {
    let v: Vec<u64> = fields
        .split_whitespace()
        .map(|f| f.parse::<u64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if v.len() < 5 {
        return None;
    }
    Some(StatTicks {
        idle: v[3],
        iowait: v[4],
        nice: v[1],
        total: v.iter().take(8).sum(),
    })
}

pub struct StatParser {
    cpu_line: Regex,
    procs_running: Regex,
}

impl StatParser {
    pub fn new() -> Result<Self> {
        let compile = |re: &str| Regex::new(re).map_err(|e| GovernorError::Refused(e.to_string()));
        Ok(Self {
            cpu_line: compile(r"(?m)^cpu(\d+)\s+([\d ]+)$")?,
            procs_running: compile(r"(?m)^procs_running\s+(\d+)")?,
        })
    }

    pub fn cpus(&self, stat: &str) -> HashMap<usize, StatTicks> {
        self.cpu_line
            .captures_iter(stat)
            .filter_map(|c| {
                let cpu = c[1].parse::<usize>().ok()?;
                let ticks = parse_stat_fields(&c[2])?;
                Some((cpu, ticks))
            })
            .collect()
    }

    pub fn procs_running(&self, stat: &str) -> u64 {
        self.procs_running
            .captures(stat)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0)
    }
}

// PICK THE SUPPORTED FREQUENCY FOR A TARGET, WITHIN [min, max].
// AN EMPTY TABLE PASSES THE CLAMPED TARGET THROUGH.
pub fn resolve_frequency(target: u32, relation: Relation, table: &[u32], min: u32, max: u32) -> u32 {
    let target = target.clamp(min.min(max), max.max(min));
    let mut usable: Vec<u32> = table.iter().copied().filter(|f| *f >= min && *f <= max).collect();
    if usable.is_empty() {
        return target;
    }
    usable.sort_unstable();

    match relation {
        Relation::AtOrAbove => usable
            .iter()
            .copied()
            .find(|f| *f >= target)
            .unwrap_or(usable[usable.len() - 1]),
        Relation::AtOrBelow => usable
            .iter()
            .rev()
            .copied()
            .find(|f| *f <= target)
            .unwrap_or(usable[0]),
    }
}

// --- BACKEND ---

struct StatCache {
    read_ns: u64,
    cpus: HashMap<usize, StatTicks>,
    procs_running: u64,
}

pub struct SysfsPlatform {
    sys_cpu: PathBuf,
    proc_stat: PathBuf,
    parser: StatParser,
    clk_tck: u64,
    possible: usize,
    cache: Mutex<Option<StatCache>>,
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn read_u32(path: &Path) -> u32 {
    read_trimmed(path).and_then(|s| s.parse().ok()).unwrap_or(0)
}

pub fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    (ts.tv_sec as u64) * 1_000_000_000 + (ts.tv_nsec as u64)
}

impl SysfsPlatform {
    pub fn new() -> Result<Self> {
        Self::with_roots(SYS_CPU, PROC_STAT)
    }

    pub fn with_roots(sys_cpu: impl Into<PathBuf>, proc_stat: impl Into<PathBuf>) -> Result<Self> {
        let sys_cpu = sys_cpu.into();
        let possible_path = sys_cpu.join("possible");
        let raw = fs::read_to_string(&possible_path)
            .map_err(|e| GovernorError::platform(possible_path.display().to_string(), e))?;
        let possible = parse_cpu_range(&raw).max(1);

        let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        Ok(Self {
            sys_cpu,
            proc_stat: proc_stat.into(),
            parser: StatParser::new()?,
            clk_tck: if tck > 0 { tck as u64 } else { 100 },
            possible,
            cache: Mutex::new(None),
        })
    }

    fn cpu_dir(&self, cpu: usize) -> PathBuf {
        self.sys_cpu.join(format!("cpu{}", cpu))
    }

    fn cpufreq(&self, policy: usize, file: &str) -> PathBuf {
        self.cpu_dir(policy).join("cpufreq").join(file)
    }

    fn ticks_to_us(&self, ticks: u64) -> u64 {
        ticks.saturating_mul(1_000_000) / self.clk_tck
    }

    fn with_stat<T>(&self, f: impl FnOnce(&StatCache) -> T) -> Option<T> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let now = monotonic_ns();
        let stale = cache
            .as_ref()
            .map(|c| now.saturating_sub(c.read_ns) >= STAT_CACHE_NS)
            .unwrap_or(true);
        if stale {
            let raw = fs::read_to_string(&self.proc_stat).ok()?;
            *cache = Some(StatCache {
                read_ns: now,
                cpus: self.parser.cpus(&raw),
                procs_running: self.parser.procs_running(&raw),
            });
        }
        cache.as_ref().map(f)
    }

    fn cpu_ticks(&self, cpu: usize) -> StatTicks {
        self.with_stat(|c| c.cpus.get(&cpu).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    fn write_online(&self, cpu: usize, on: bool) -> Result<()> {
        let path = self.cpu_dir(cpu).join("online");
        fs::write(&path, if on { "1" } else { "0" })
            .map_err(|e| GovernorError::platform(path.display().to_string(), e))
    }

    pub fn available_frequencies(&self, policy: usize) -> Vec<u32> {
        read_trimmed(&self.cpufreq(policy, "scaling_available_frequencies"))
            .map(|s| s.split_whitespace().filter_map(|f| f.parse().ok()).collect())
            .unwrap_or_default()
    }

    pub fn scaling_governor(&self, policy: usize) -> Option<String> {
        read_trimmed(&self.cpufreq(policy, "scaling_governor"))
    }
}

impl Platform for SysfsPlatform {
    fn cpu_online(&self, cpu: usize) -> bool {
        if cpu >= self.possible {
            return false;
        }
        // cpu0 USUALLY HAS NO online FILE
        match read_trimmed(&self.cpu_dir(cpu).join("online")) {
            Some(v) => v == "1",
            None => cpu == 0 || self.cpu_dir(cpu).exists(),
        }
    }

    fn num_online_cpus(&self) -> usize {
        read_trimmed(&self.sys_cpu.join("online"))
            .map(|s| parse_cpu_range(&s))
            .unwrap_or(1)
    }

    fn num_possible_cpus(&self) -> usize {
        self.possible
    }

    fn cpu_up(&self, cpu: usize) -> Result<()> {
        self.write_online(cpu, true)
    }

    fn cpu_down(&self, cpu: usize) -> Result<()> {
        if cpu == 0 {
            return Err(GovernorError::Refused("CPU 0 CANNOT GO OFFLINE".to_string()));
        }
        self.write_online(cpu, false)
    }

    // idle EXCLUDES iowait, AS /proc/stat REPORTS IT
    fn idle_time(&self, cpu: usize) -> IdleTime {
        let t = self.cpu_ticks(cpu);
        IdleTime {
            idle_us: self.ticks_to_us(t.idle),
            wall_us: self.ticks_to_us(t.total),
        }
    }

    fn iowait_time(&self, cpu: usize) -> u64 {
        self.ticks_to_us(self.cpu_ticks(cpu).iowait)
    }

    fn nice_time(&self, cpu: usize) -> u64 {
        self.ticks_to_us(self.cpu_ticks(cpu).nice)
    }

    fn runnable_tasks(&self) -> u64 {
        self.with_stat(|c| c.procs_running).unwrap_or(0)
    }

    fn set_frequency(&self, policy: usize, target_khz: u32, relation: Relation) -> Result<()> {
        let min = self.policy_min(policy);
        let max = self.policy_max(policy);
        let table = self.available_frequencies(policy);
        let freq = resolve_frequency(target_khz, relation, &table, min, max);

        let path = self.cpufreq(policy, "scaling_setspeed");
        fs::write(&path, freq.to_string())
            .map_err(|e| GovernorError::platform(path.display().to_string(), e))
    }

    fn current_frequency(&self, policy: usize) -> u32 {
        read_u32(&self.cpufreq(policy, "scaling_cur_freq"))
    }

    fn policy_min(&self, policy: usize) -> u32 {
        read_u32(&self.cpufreq(policy, "scaling_min_freq"))
    }

    fn policy_max(&self, policy: usize) -> u32 {
        read_u32(&self.cpufreq(policy, "scaling_max_freq"))
    }

    fn policy_cpus(&self, policy: usize) -> Vec<usize> {
        read_trimmed(&self.cpufreq(policy, "related_cpus"))
            .map(|s| s.split_whitespace().filter_map(|c| c.parse().ok()).collect::<Vec<usize>>())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec![policy])
    }

    fn now_ns(&self) -> u64 {
        monotonic_ns()
    }
}
