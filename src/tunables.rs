// PEGASUSQ TUNABLES
// PURE-RUST MODULE: NO PLATFORM DEPENDENCIES
// THE HOT SAMPLING PATH READS EVERY SCALAR LOCK-FREE. ONLY THE CONFIGURATION
// SURFACE WRITES. MULTI-FIELD SIDE EFFECTS (LOCKS, POLICY SWITCH, REBASELINE)
// ARE HANDED BACK TO THE GOVERNOR AS A StoreEffect.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::error::{GovernorError, Result};

// SAMPLING

pub const DEF_SAMPLING_RATE_US: u32 = 50_000;    // 50MS
pub const MIN_SAMPLING_RATE_US: u32 = 10_000;    // 10MS FLOOR
pub const DEF_SAMPLING_DOWN_FACTOR: u32 = 2;
pub const MAX_SAMPLING_DOWN_FACTOR: u32 = 100_000;

// DVFS

pub const DEF_UP_THRESHOLD: u32 = 85;
pub const MIN_UP_THRESHOLD: u32 = 11;
pub const MAX_UP_THRESHOLD: u32 = 100;
pub const DEF_DOWN_DIFFERENTIAL: u32 = 5;
pub const DEF_FREQ_STEP: u32 = 40;

// BELOW THIS FREQUENCY THE GOVERNOR RAMPS UP EAGERLY
pub const FREQ_FOR_RESPONSIVENESS: u32 = 500_000;
pub const UP_THRESHOLD_AT_MIN_FREQ: u32 = 40;

// HOTPLUG

pub const MAX_HOTPLUG_RATE: usize = 40;
pub const DEF_CPU_UP_RATE: u32 = 10;
pub const DEF_CPU_DOWN_RATE: u32 = 20;
pub const DEF_CPU_UP_FREQ: u32 = 500_000;
pub const DEF_CPU_DOWN_FREQ: u32 = 200_000;
pub const DEF_UP_NR_CPUS: u32 = 1;

pub const HOTPLUG_DOWN_INDEX: usize = 0;
pub const HOTPLUG_UP_INDEX: usize = 1;

// RUN-QUEUE SAMPLER PERIOD
pub const RQ_SAMPLE_MS: u64 = 10;

// EARLY-SUSPEND PROFILE
pub const SUSPEND_FREQ_STEP: u32 = 20;
pub const SUSPEND_SAMPLING_MULT: u32 = 4;

// HOTPLUG POLICY

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HotplugPolicyKind {
    // WINDOWED check_up/check_down DRIVEN BY FREQ + RUN-QUEUE HISTORY
    Android = 0,
    // CONTINUATION COUNTS ON FREQUENCY, EVALUATED OFF THE SAMPLING TICK
    Slp = 1,
}

impl HotplugPolicyKind {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Android,
            _ => Self::Slp,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Slp => "slp",
        }
    }
}

impl FromStr for HotplugPolicyKind {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "android" | "0" => Ok(Self::Android),
            "slp" | "1" => Ok(Self::Slp),
            other => Err(GovernorError::Parse {
                name: "hotplug_policy".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

// PER-CORE-COUNT THRESHOLD TABLES
// ROW = ONLINE - 1, COLUMN = {DOWN, UP}. ROW 0 HAS NO DOWN ENTRY, THE LAST ROW NO UP ENTRY.
// FOR 4 CPUS THIS IS EXACTLY:
//   rq   {0, 100}  {100, 200}  {200, 300}  {300, 0}
//   freq {0, 500000} {200000, 500000} {200000, 500000} {200000, 0}

pub fn default_hotplug_rq(possible: usize) -> Vec<[u32; 2]> {
    (0..possible)
        .map(|row| {
            let down = if row == 0 { 0 } else { 100 * row as u32 };
            let up = if row + 1 == possible { 0 } else { 100 * (row as u32 + 1) };
            [down, up]
        })
        .collect()
}

pub fn default_hotplug_freq(possible: usize) -> Vec<[u32; 2]> {
    (0..possible)
        .map(|row| {
            let down = if row == 0 { 0 } else { DEF_CPU_DOWN_FREQ };
            let up = if row + 1 == possible { 0 } else { DEF_CPU_UP_FREQ };
            [down, up]
        })
        .collect()
}

// ATTRIBUTE NAMES
// MIRRORS THE KERNEL SYSFS GROUP. TABLE ENTRIES ARE hotplug_{freq,rq}_<ONLINE>_<0|1>.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Tunable {
    SamplingRate,
    SamplingRateMin,
    IoIsBusy,
    UpThreshold,
    SamplingDownFactor,
    IgnoreNiceLoad,
    DownDifferential,
    FreqStep,
    CpuUpRate,
    CpuDownRate,
    CpuUpFreq,
    CpuDownFreq,
    UpNrCpus,
    MaxCpuLock,
    MinCpuLock,
    HotplugLock,
    DvfsDebug,
    HotplugPolicy,
    MaxFreq,
    MinFreq,
    HotplugFreq { row: usize, col: usize },
    HotplugRq { row: usize, col: usize },
}

impl Tunable {
    pub const SCALARS: [Tunable; 20] = [
        Tunable::SamplingRate,
        Tunable::SamplingRateMin,
        Tunable::IoIsBusy,
        Tunable::UpThreshold,
        Tunable::SamplingDownFactor,
        Tunable::IgnoreNiceLoad,
        Tunable::DownDifferential,
        Tunable::FreqStep,
        Tunable::CpuUpRate,
        Tunable::CpuDownRate,
        Tunable::CpuUpFreq,
        Tunable::CpuDownFreq,
        Tunable::UpNrCpus,
        Tunable::MaxCpuLock,
        Tunable::MinCpuLock,
        Tunable::HotplugLock,
        Tunable::DvfsDebug,
        Tunable::HotplugPolicy,
        Tunable::MaxFreq,
        Tunable::MinFreq,
    ];

    pub fn name(self) -> String {
        match self {
            Self::SamplingRate => "sampling_rate".into(),
            Self::SamplingRateMin => "sampling_rate_min".into(),
            Self::IoIsBusy => "io_is_busy".into(),
            Self::UpThreshold => "up_threshold".into(),
            Self::SamplingDownFactor => "sampling_down_factor".into(),
            Self::IgnoreNiceLoad => "ignore_nice_load".into(),
            Self::DownDifferential => "down_differential".into(),
            Self::FreqStep => "freq_step".into(),
            Self::CpuUpRate => "cpu_up_rate".into(),
            Self::CpuDownRate => "cpu_down_rate".into(),
            Self::CpuUpFreq => "cpu_up_freq".into(),
            Self::CpuDownFreq => "cpu_down_freq".into(),
            Self::UpNrCpus => "up_nr_cpus".into(),
            Self::MaxCpuLock => "max_cpu_lock".into(),
            Self::MinCpuLock => "min_cpu_lock".into(),
            Self::HotplugLock => "hotplug_lock".into(),
            Self::DvfsDebug => "dvfs_debug".into(),
            Self::HotplugPolicy => "hotplug_policy".into(),
            Self::MaxFreq => "max_freq".into(),
            Self::MinFreq => "min_freq".into(),
            Self::HotplugFreq { row, col } => format!("hotplug_freq_{}_{}", row + 1, col),
            Self::HotplugRq { row, col } => format!("hotplug_rq_{}_{}", row + 1, col),
        }
    }

    pub fn read_only(self) -> bool {
        matches!(self, Self::SamplingRateMin | Self::MaxFreq | Self::MinFreq)
    }
}

impl FromStr for Tunable {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        if let Some(t) = Self::SCALARS.iter().find(|t| t.name() == name) {
            return Ok(*t);
        }
        let table = |rest: &str| -> Option<(usize, usize)> {
            let (online, col) = rest.split_once('_')?;
            let online: usize = online.parse().ok()?;
            let col: usize = col.parse().ok()?;
            if online == 0 || col > 1 {
                return None;
            }
            Some((online - 1, col))
        };
        let parsed = if let Some(rest) = name.strip_prefix("hotplug_freq_") {
            table(rest).map(|(row, col)| Self::HotplugFreq { row, col })
        } else if let Some(rest) = name.strip_prefix("hotplug_rq_") {
            table(rest).map(|(row, col)| Self::HotplugRq { row, col })
        } else {
            None
        };
        parsed.ok_or_else(|| GovernorError::UnknownTunable(name.to_string()))
    }
}

// SIDE EFFECTS THE GOVERNOR MUST PERFORM AFTER A SUCCESSFUL STORE

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StoreEffect {
    None,
    // sampling_down_factor CHANGED: EVERY rate_mult BACK TO 1
    ResetRateMult,
    // ignore_nice_load CHANGED: RE-READ EVERY PER-CPU BASELINE
    Rebaseline,
    // hotplug_lock WRITE, ALREADY CLAMPED. THE GOVERNOR OWNS THE LOCK API.
    HotplugLock(usize),
    // min_cpu_lock WRITE, ALREADY CLAMPED
    MinCpuLock(usize),
    SwitchPolicy(HotplugPolicyKind),
}

pub struct TunableStore {
    possible: usize,
    sampling_rate: AtomicU32,
    min_sampling_rate: AtomicU32,
    io_is_busy: AtomicBool,
    up_threshold: AtomicU32,
    sampling_down_factor: AtomicU32,
    ignore_nice: AtomicBool,
    down_differential: AtomicU32,
    freq_step: AtomicU32,
    cpu_up_rate: AtomicU32,
    cpu_down_rate: AtomicU32,
    cpu_up_freq: AtomicU32,
    cpu_down_freq: AtomicU32,
    up_nr_cpus: AtomicU32,
    max_cpu_lock: AtomicU32,
    min_cpu_lock: AtomicU32,
    hotplug_lock: AtomicU32,
    dvfs_debug: AtomicBool,
    policy: AtomicU8,
    max_freq: AtomicU32,
    min_freq: AtomicU32,
    hotplug_freq: Vec<[AtomicU32; 2]>,
    hotplug_rq: Vec<[AtomicU32; 2]>,
}

fn atomic_table(rows: Vec<[u32; 2]>) -> Vec<[AtomicU32; 2]> {
    rows.into_iter()
        .map(|[d, u]| [AtomicU32::new(d), AtomicU32::new(u)])
        .collect()
}

fn parse_u32(t: Tunable, input: &str) -> Result<u32> {
    input.trim().parse::<u32>().map_err(|_| GovernorError::Parse {
        name: t.name(),
        value: input.trim().to_string(),
    })
}

fn check_range(t: Tunable, v: u32, min: u32, max: u32) -> Result<u32> {
    if v < min || v > max {
        return Err(GovernorError::InvalidValue {
            name: t.name(),
            value: v as u64,
            min: min as u64,
            max: max as u64,
        });
    }
    Ok(v)
}

impl TunableStore {
    pub fn new(possible: usize) -> Self {
        let possible = possible.max(1);
        Self {
            possible,
            sampling_rate: AtomicU32::new(DEF_SAMPLING_RATE_US),
            min_sampling_rate: AtomicU32::new(MIN_SAMPLING_RATE_US),
            io_is_busy: AtomicBool::new(false),
            up_threshold: AtomicU32::new(DEF_UP_THRESHOLD),
            sampling_down_factor: AtomicU32::new(DEF_SAMPLING_DOWN_FACTOR),
            ignore_nice: AtomicBool::new(false),
            down_differential: AtomicU32::new(DEF_DOWN_DIFFERENTIAL),
            freq_step: AtomicU32::new(DEF_FREQ_STEP),
            cpu_up_rate: AtomicU32::new(DEF_CPU_UP_RATE),
            cpu_down_rate: AtomicU32::new(DEF_CPU_DOWN_RATE),
            cpu_up_freq: AtomicU32::new(DEF_CPU_UP_FREQ),
            cpu_down_freq: AtomicU32::new(DEF_CPU_DOWN_FREQ),
            up_nr_cpus: AtomicU32::new(DEF_UP_NR_CPUS),
            max_cpu_lock: AtomicU32::new(0),
            min_cpu_lock: AtomicU32::new(0),
            hotplug_lock: AtomicU32::new(0),
            dvfs_debug: AtomicBool::new(false),
            policy: AtomicU8::new(HotplugPolicyKind::Android as u8),
            max_freq: AtomicU32::new(0),
            min_freq: AtomicU32::new(0),
            hotplug_freq: atomic_table(default_hotplug_freq(possible)),
            hotplug_rq: atomic_table(default_hotplug_rq(possible)),
        }
    }

    pub fn possible(&self) -> usize {
        self.possible
    }

    // --- HOT-PATH READS ---

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate.load(Ordering::Relaxed)
    }

    pub fn io_is_busy(&self) -> bool {
        self.io_is_busy.load(Ordering::Relaxed)
    }

    pub fn up_threshold(&self) -> u32 {
        self.up_threshold.load(Ordering::Relaxed)
    }

    pub fn sampling_down_factor(&self) -> u32 {
        self.sampling_down_factor.load(Ordering::Relaxed)
    }

    pub fn ignore_nice(&self) -> bool {
        self.ignore_nice.load(Ordering::Relaxed)
    }

    pub fn down_differential(&self) -> u32 {
        self.down_differential.load(Ordering::Relaxed)
    }

    pub fn freq_step(&self) -> u32 {
        self.freq_step.load(Ordering::Relaxed)
    }

    pub fn cpu_up_rate(&self) -> u32 {
        self.cpu_up_rate.load(Ordering::Relaxed)
    }

    pub fn cpu_down_rate(&self) -> u32 {
        self.cpu_down_rate.load(Ordering::Relaxed)
    }

    // HISTORY WRAPS AT THE LONGER OF THE TWO WINDOWS
    pub fn max_hotplug_rate(&self) -> usize {
        (self.cpu_up_rate().max(self.cpu_down_rate()) as usize).clamp(1, MAX_HOTPLUG_RATE)
    }

    pub fn cpu_up_freq(&self) -> u32 {
        self.cpu_up_freq.load(Ordering::Relaxed)
    }

    pub fn cpu_down_freq(&self) -> u32 {
        self.cpu_down_freq.load(Ordering::Relaxed)
    }

    pub fn up_nr_cpus(&self) -> usize {
        self.up_nr_cpus.load(Ordering::Relaxed) as usize
    }

    pub fn max_cpu_lock(&self) -> usize {
        self.max_cpu_lock.load(Ordering::Relaxed) as usize
    }

    pub fn min_cpu_lock(&self) -> usize {
        self.min_cpu_lock.load(Ordering::Relaxed) as usize
    }

    // USER-FACING PIN (THE GLOBAL LOCK LIVES IN hotplug::HotplugLock)
    pub fn hotplug_lock(&self) -> usize {
        self.hotplug_lock.load(Ordering::Relaxed) as usize
    }

    pub fn dvfs_debug(&self) -> bool {
        self.dvfs_debug.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> HotplugPolicyKind {
        HotplugPolicyKind::from_u8(self.policy.load(Ordering::Relaxed))
    }

    pub fn max_freq(&self) -> u32 {
        self.max_freq.load(Ordering::Relaxed)
    }

    pub fn min_freq(&self) -> u32 {
        self.min_freq.load(Ordering::Relaxed)
    }

    // (FREQ, RQ) THRESHOLD FOR A GIVEN ONLINE COUNT AND DIRECTION
    pub fn hotplug_threshold(&self, online: usize, col: usize) -> Option<(u32, u32)> {
        let row = online.checked_sub(1)?;
        let freq = self.hotplug_freq.get(row)?[col].load(Ordering::Relaxed);
        let rq = self.hotplug_rq.get(row)?[col].load(Ordering::Relaxed);
        Some((freq, rq))
    }

    // --- GOVERNOR-INTERNAL WRITES (NO VALIDATION) ---

    pub fn set_sampling_rate_raw(&self, us: u32) {
        self.sampling_rate.store(us, Ordering::Relaxed);
    }

    pub fn set_freq_step_raw(&self, pct: u32) {
        self.freq_step.store(pct, Ordering::Relaxed);
    }

    pub fn set_hotplug_lock_raw(&self, n: usize) {
        self.hotplug_lock.store(n as u32, Ordering::Relaxed);
    }

    pub fn set_min_cpu_lock_raw(&self, n: usize) {
        self.min_cpu_lock.store(n as u32, Ordering::Relaxed);
    }

    pub fn set_policy_raw(&self, kind: HotplugPolicyKind) {
        self.policy.store(kind as u8, Ordering::Relaxed);
    }

    pub fn set_freq_bounds(&self, min_khz: u32, max_khz: u32) {
        self.min_freq.store(min_khz, Ordering::Relaxed);
        self.max_freq.store(max_khz, Ordering::Relaxed);
    }

    // --- CONFIGURATION SURFACE ---

    // VALIDATE AND APPLY ONE WRITE. A REJECTED WRITE LEAVES THE STORE UNTOUCHED.
    pub fn store(&self, t: Tunable, input: &str) -> Result<StoreEffect> {
        if t.read_only() {
            return Err(GovernorError::ReadOnly(t.name()));
        }
        if t == Tunable::HotplugPolicy {
            return Ok(StoreEffect::SwitchPolicy(input.parse()?));
        }

        let v = parse_u32(t, input)?;
        let possible = self.possible as u32;

        match t {
            Tunable::SamplingRate => {
                let floor = self.min_sampling_rate.load(Ordering::Relaxed);
                self.sampling_rate.store(v.max(floor), Ordering::Relaxed);
            }
            Tunable::IoIsBusy => self.io_is_busy.store(v != 0, Ordering::Relaxed),
            Tunable::UpThreshold => {
                let v = check_range(t, v, MIN_UP_THRESHOLD, MAX_UP_THRESHOLD)?;
                self.up_threshold.store(v, Ordering::Relaxed);
            }
            Tunable::SamplingDownFactor => {
                let v = check_range(t, v, 1, MAX_SAMPLING_DOWN_FACTOR)?;
                self.sampling_down_factor.store(v, Ordering::Relaxed);
                return Ok(StoreEffect::ResetRateMult);
            }
            Tunable::IgnoreNiceLoad => {
                let on = v != 0;
                if self.ignore_nice.swap(on, Ordering::Relaxed) == on {
                    return Ok(StoreEffect::None);
                }
                return Ok(StoreEffect::Rebaseline);
            }
            Tunable::DownDifferential => self.down_differential.store(v.min(100), Ordering::Relaxed),
            Tunable::FreqStep => self.freq_step.store(v.min(100), Ordering::Relaxed),
            Tunable::CpuUpRate => {
                self.cpu_up_rate.store(v.clamp(1, MAX_HOTPLUG_RATE as u32), Ordering::Relaxed)
            }
            Tunable::CpuDownRate => {
                self.cpu_down_rate.store(v.clamp(1, MAX_HOTPLUG_RATE as u32), Ordering::Relaxed)
            }
            Tunable::CpuUpFreq => {
                let max = self.max_freq();
                let v = if max > 0 { v.min(max) } else { v };
                self.cpu_up_freq.store(v, Ordering::Relaxed);
            }
            Tunable::CpuDownFreq => {
                self.cpu_down_freq.store(v.max(self.min_freq()), Ordering::Relaxed);
            }
            Tunable::UpNrCpus => self.up_nr_cpus.store(v.min(possible), Ordering::Relaxed),
            Tunable::MaxCpuLock => self.max_cpu_lock.store(v.min(possible), Ordering::Relaxed),
            Tunable::MinCpuLock => return Ok(StoreEffect::MinCpuLock(v.min(possible) as usize)),
            Tunable::HotplugLock => return Ok(StoreEffect::HotplugLock(v.min(possible) as usize)),
            Tunable::DvfsDebug => self.dvfs_debug.store(v != 0, Ordering::Relaxed),
            Tunable::HotplugFreq { row, col } => {
                let slot = self.hotplug_freq.get(row)
                    .ok_or_else(|| GovernorError::UnknownTunable(t.name()))?;
                slot[col].store(v, Ordering::Relaxed);
            }
            Tunable::HotplugRq { row, col } => {
                let slot = self.hotplug_rq.get(row)
                    .ok_or_else(|| GovernorError::UnknownTunable(t.name()))?;
                slot[col].store(v, Ordering::Relaxed);
            }
            Tunable::HotplugPolicy
            | Tunable::SamplingRateMin
            | Tunable::MaxFreq
            | Tunable::MinFreq => unreachable!("handled above"),
        }
        Ok(StoreEffect::None)
    }

    pub fn show(&self, t: Tunable) -> Result<String> {
        let v = match t {
            Tunable::SamplingRate => self.sampling_rate() as u64,
            Tunable::SamplingRateMin => self.min_sampling_rate.load(Ordering::Relaxed) as u64,
            Tunable::IoIsBusy => self.io_is_busy() as u64,
            Tunable::UpThreshold => self.up_threshold() as u64,
            Tunable::SamplingDownFactor => self.sampling_down_factor() as u64,
            Tunable::IgnoreNiceLoad => self.ignore_nice() as u64,
            Tunable::DownDifferential => self.down_differential() as u64,
            Tunable::FreqStep => self.freq_step() as u64,
            Tunable::CpuUpRate => self.cpu_up_rate() as u64,
            Tunable::CpuDownRate => self.cpu_down_rate() as u64,
            Tunable::CpuUpFreq => self.cpu_up_freq() as u64,
            Tunable::CpuDownFreq => self.cpu_down_freq() as u64,
            Tunable::UpNrCpus => self.up_nr_cpus() as u64,
            Tunable::MaxCpuLock => self.max_cpu_lock() as u64,
            Tunable::MinCpuLock => self.min_cpu_lock() as u64,
            Tunable::HotplugLock => self.hotplug_lock() as u64,
            Tunable::DvfsDebug => self.dvfs_debug() as u64,
            Tunable::HotplugPolicy => return Ok(self.policy().label().to_string()),
            Tunable::MaxFreq => self.max_freq() as u64,
            Tunable::MinFreq => self.min_freq() as u64,
            Tunable::HotplugFreq { row, col } => self.hotplug_freq.get(row)
                .ok_or_else(|| GovernorError::UnknownTunable(t.name()))?[col]
                .load(Ordering::Relaxed) as u64,
            Tunable::HotplugRq { row, col } => self.hotplug_rq.get(row)
                .ok_or_else(|| GovernorError::UnknownTunable(t.name()))?[col]
                .load(Ordering::Relaxed) as u64,
        };
        Ok(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_match_quad_core_layout() {
        assert_eq!(default_hotplug_rq(4), vec![[0, 100], [100, 200], [200, 300], [300, 0]]);
        assert_eq!(
            default_hotplug_freq(4),
            vec![[0, 500_000], [200_000, 500_000], [200_000, 500_000], [200_000, 0]]
        );
    }

    #[test]
    fn parse_table_names() {
        assert_eq!(
            "hotplug_freq_2_0".parse::<Tunable>().unwrap(),
            Tunable::HotplugFreq { row: 1, col: 0 }
        );
        assert_eq!(
            "hotplug_rq_1_1".parse::<Tunable>().unwrap(),
            Tunable::HotplugRq { row: 0, col: 1 }
        );
        assert!("hotplug_rq_0_1".parse::<Tunable>().is_err());
        assert!("hotplug_rq_1_2".parse::<Tunable>().is_err());
        assert!("bogus".parse::<Tunable>().is_err());
    }

    #[test]
    fn scalar_names_round_trip() {
        for t in Tunable::SCALARS {
            assert_eq!(t.name().parse::<Tunable>().unwrap(), t);
        }
    }

    #[test]
    fn table_row_past_possible_is_unknown() {
        let store = TunableStore::new(2);
        let t: Tunable = "hotplug_freq_3_0".parse().unwrap();
        assert!(matches!(store.store(t, "1"), Err(GovernorError::UnknownTunable(_))));
    }

    #[test]
    fn read_only_rejected() {
        let store = TunableStore::new(4);
        assert!(matches!(store.store(Tunable::MaxFreq, "1"), Err(GovernorError::ReadOnly(_))));
    }

    #[test]
    fn rates_never_zero() {
        let store = TunableStore::new(4);
        store.store(Tunable::CpuUpRate, "0").unwrap();
        assert_eq!(store.cpu_up_rate(), 1);
        store.store(Tunable::CpuDownRate, "99").unwrap();
        assert_eq!(store.cpu_down_rate(), MAX_HOTPLUG_RATE as u32);
        assert_eq!(store.max_hotplug_rate(), MAX_HOTPLUG_RATE);
    }
}
