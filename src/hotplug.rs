// PEGASUSQ HOTPLUG DECISIONS
//
// TWO STRATEGIES, ONE ACTIVE AT A TIME:
//   ANDROID: WINDOWED check_up/check_down OVER THE USAGE HISTORY. A CORE COMES
//            UP ONLY IF THE *MINIMUM* FREQ AND RQ OVER THE WHOLE WINDOW CLEAR
//            THE THRESHOLD, SO A ONE-TICK SPIKE NEVER HOTPLUGS. RUNS INSIDE THE
//            SAMPLING TICK.
//   SLP:     CONTINUATION COUNTS OF AT/ABOVE-ON AND AT/BELOW-OFF FREQUENCY PER
//            ONLINE-CORE COUNT. DEFERRED TO THE ACTUATOR THREAD SO A SLOW
//            HOTPLUG NEVER BLOCKS SAMPLING.
//
// BOTH RESPECT THE SAME LOCKS: A NONZERO HOTPLUG LOCK VETOES EVERYTHING,
// min/max_cpu_lock FORCE OR REFUSE BEFORE ANY HISTORY IS CONSULTED.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::{debug, info};

use crate::error::{GovernorError, Result};
use crate::history::UsageHistory;
use crate::tunables::{HotplugPolicyKind, TunableStore, HOTPLUG_DOWN_INDEX, HOTPLUG_UP_INDEX};

// --- HOTPLUG LOCK ---

// EXACT ONLINE-CORE PIN SHARED BY THE MANUAL TUNABLE, SUSPEND AND REBOOT.
// lock = DESIRED ONLINE COUNT (0 = FREE), count = HOLDERS OF THAT VALUE.
pub struct HotplugLock {
    lock: AtomicUsize,
    count: AtomicUsize,
    gate: Mutex<()>,
}

impl HotplugLock {
    pub fn new() -> Self {
        Self {
            lock: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            gate: Mutex::new(()),
        }
    }

    pub fn get(&self) -> usize {
        self.lock.load(Ordering::Acquire)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_locked(&self) -> bool {
        self.get() != 0
    }

    // TAKE A REFERENCE ON n CORES. FAILS IF A SMALLER PIN IS ALREADY HELD.
    pub fn acquire(&self, n: usize) -> Result<()> {
        let _g = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        let held = self.get();
        if held != 0 && held < n {
            return Err(GovernorError::LockConflict { held, requested: n });
        }
        if held == n {
            self.count.fetch_add(1, Ordering::AcqRel);
        } else {
            self.count.store(1, Ordering::Release);
            self.lock.store(n, Ordering::Release);
        }
        Ok(())
    }

    // DROP A REFERENCE. THE PIN CLEARS WHEN THE LAST HOLDER LEAVES.
    pub fn release(&self, n: usize) {
        let _g = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        let held = self.get();
        if held < n {
            return;
        }
        if held == n {
            let prev = self.count.load(Ordering::Acquire);
            self.count.store(prev.saturating_sub(1), Ordering::Release);
        }
        if self.count() == 0 {
            self.lock.store(0, Ordering::Release);
        }
    }

    // HARD PIN FOR SUSPEND/REBOOT. BYPASSES REFERENCE COUNTING.
    pub fn force(&self, n: usize) {
        let _g = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        self.lock.store(n, Ordering::Release);
    }
}

impl Default for HotplugLock {
    fn default() -> Self {
        Self::new()
    }
}

// --- DECISIONS ---

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HotplugDecision {
    Up,
    Down,
    Stay,
}

impl HotplugDecision {
    pub fn label(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Stay => "-",
        }
    }
}

// EVERYTHING A STRATEGY MAY LOOK AT, SNAPSHOTTED FOR ONE EVALUATION
pub struct HotplugContext<'a> {
    pub tunables: &'a TunableStore,
    pub online: usize,
    pub possible: usize,
    pub lock: usize,
    // LIVE PERF REQUEST: KEEP AT LEAST THIS MANY CORES
    pub dynamic_min: Option<usize>,
}

// Some(v) SHORT-CIRCUITS THE UP TEST, None MEANS "CONSULT HISTORY"
fn up_gate(ctx: &HotplugContext) -> Option<bool> {
    if ctx.lock != 0 {
        return Some(false);
    }
    if ctx.online >= ctx.possible {
        return Some(false);
    }
    let max_lock = ctx.tunables.max_cpu_lock();
    if max_lock != 0 && ctx.online >= max_lock {
        return Some(false);
    }
    let min_lock = ctx.tunables.min_cpu_lock();
    if min_lock != 0 && ctx.online < min_lock {
        return Some(true);
    }
    None
}

fn down_gate(ctx: &HotplugContext) -> Option<bool> {
    if ctx.lock != 0 {
        return Some(false);
    }
    if ctx.online <= 1 {
        return Some(false);
    }
    let max_lock = ctx.tunables.max_cpu_lock();
    if max_lock != 0 && ctx.online > max_lock {
        return Some(true);
    }
    let min_lock = ctx.tunables.min_cpu_lock();
    if min_lock != 0 && ctx.online <= min_lock {
        return Some(false);
    }
    if let Some(dyn_min) = ctx.dynamic_min {
        if ctx.online <= dyn_min {
            return Some(false);
        }
    }
    None
}

// BRING A CORE UP?
pub fn check_up(history: &mut UsageHistory, ctx: &HotplugContext) -> bool {
    if let Some(v) = up_gate(ctx) {
        return v;
    }

    let up_rate = ctx.tunables.cpu_up_rate() as usize;
    if !history.at_boundary(up_rate) {
        return false;
    }

    let (up_freq, up_rq) = match ctx.tunables.hotplug_threshold(ctx.online, HOTPLUG_UP_INDEX) {
        Some(t) => t,
        None => return false,
    };

    let mut min_freq = u32::MAX;
    let mut min_rq = u32::MAX;
    for usage in history.window(up_rate) {
        min_freq = min_freq.min(usage.freq);
        min_rq = min_rq.min(usage.rq_avg);
        if ctx.tunables.dvfs_debug() {
            debug!("CHECK UP: FREQ {} RQ {} LOAD {:?}", usage.freq, usage.rq_avg, usage.load);
        }
    }

    if min_freq >= up_freq && min_rq > up_rq {
        info!("HOTPLUG IN: ONLINE {} FREQ {}>={} RQ {}>{}",
              ctx.online, min_freq, up_freq, min_rq, up_rq);
        history.reset();
        return true;
    }
    false
}

// TAKE A CORE DOWN?
pub fn check_down(history: &mut UsageHistory, ctx: &HotplugContext) -> bool {
    if let Some(v) = down_gate(ctx) {
        return v;
    }

    let down_rate = ctx.tunables.cpu_down_rate() as usize;
    if !history.at_boundary(down_rate) {
        return false;
    }

    let (down_freq, down_rq) = match ctx.tunables.hotplug_threshold(ctx.online, HOTPLUG_DOWN_INDEX) {
        Some(t) => t,
        None => return false,
    };

    let mut max_freq = 0u32;
    let mut max_rq = 0u32;
    for usage in history.window(down_rate) {
        max_freq = max_freq.max(usage.freq);
        max_rq = max_rq.max(usage.rq_avg);
        if ctx.tunables.dvfs_debug() {
            debug!("CHECK DOWN: FREQ {} RQ {} LOAD {:?}", usage.freq, usage.rq_avg, usage.load);
        }
    }

    if max_freq <= down_freq && max_rq <= down_rq {
        info!("HOTPLUG OUT: ONLINE {} FREQ {}<={} RQ {}<={}",
              ctx.online, max_freq, down_freq, max_rq, down_rq);
        history.reset();
        return true;
    }
    false
}

// --- STRATEGIES ---

pub trait HotplugPolicy: Send {
    fn kind(&self) -> HotplugPolicyKind;

    // TRUE IF evaluate() MUST RUN OFF THE SAMPLING TICK
    fn deferred(&self) -> bool {
        false
    }

    fn evaluate(&mut self, history: &mut UsageHistory, ctx: &HotplugContext) -> HotplugDecision;

    fn reset(&mut self) {}
}

pub fn policy_for(kind: HotplugPolicyKind, possible: usize) -> Box<dyn HotplugPolicy> {
    match kind {
        HotplugPolicyKind::Android => Box::new(AndroidHotplug),
        HotplugPolicyKind::Slp => Box::new(SlpHotplug::new(possible)),
    }
}

pub struct AndroidHotplug;

impl HotplugPolicy for AndroidHotplug {
    fn kind(&self) -> HotplugPolicyKind {
        HotplugPolicyKind::Android
    }

    fn evaluate(&mut self, history: &mut UsageHistory, ctx: &HotplugContext) -> HotplugDecision {
        if check_up(history, ctx) {
            HotplugDecision::Up
        } else if check_down(history, ctx) {
            HotplugDecision::Down
        } else {
            HotplugDecision::Stay
        }
    }
}

// MULTI-LEVEL CONTINUATION COUNTS, ONE PAIR PER ONLINE-CORE COUNT
pub struct SlpHotplug {
    up_count: Vec<u32>,
    down_count: Vec<u32>,
}

impl SlpHotplug {
    pub fn new(possible: usize) -> Self {
        Self {
            up_count: vec![0; possible.max(1)],
            down_count: vec![0; possible.max(1)],
        }
    }

    pub fn counts(&self, online: usize) -> (u32, u32) {
        let row = online.saturating_sub(1);
        (
            self.up_count.get(row).copied().unwrap_or(0),
            self.down_count.get(row).copied().unwrap_or(0),
        )
    }

    fn clear(&mut self) {
        self.up_count.iter_mut().for_each(|c| *c = 0);
        self.down_count.iter_mut().for_each(|c| *c = 0);
    }
}

impl HotplugPolicy for SlpHotplug {
    fn kind(&self) -> HotplugPolicyKind {
        HotplugPolicyKind::Slp
    }

    fn deferred(&self) -> bool {
        true
    }

    fn evaluate(&mut self, history: &mut UsageHistory, ctx: &HotplugContext) -> HotplugDecision {
        let freq = match history.latest() {
            Some(u) => u.freq,
            None => return HotplugDecision::Stay,
        };

        if let Some(forced) = up_gate(ctx) {
            if forced {
                self.clear();
                return HotplugDecision::Up;
            }
        }
        if let Some(forced) = down_gate(ctx) {
            if forced {
                self.clear();
                return HotplugDecision::Down;
            }
        }

        let row = ctx.online.saturating_sub(1);
        if row >= self.up_count.len() {
            return HotplugDecision::Stay;
        }

        let t = ctx.tunables;
        let (on_table, _) = t.hotplug_threshold(ctx.online, HOTPLUG_UP_INDEX).unwrap_or((0, 0));
        let (off_table, _) = t.hotplug_threshold(ctx.online, HOTPLUG_DOWN_INDEX).unwrap_or((0, 0));
        let on = on_table.max(t.cpu_up_freq());
        let off = off_table.min(t.cpu_down_freq());

        if freq >= on && up_gate(ctx).is_none() {
            self.up_count[row] += 1;
            self.down_count[row] = 0;
            if self.up_count[row] >= t.cpu_up_rate() {
                info!("SLP HOTPLUG IN: ONLINE {} FREQ {}>={} FOR {} TICKS",
                      ctx.online, freq, on, self.up_count[row]);
                self.clear();
                history.reset();
                return HotplugDecision::Up;
            }
        } else if freq <= off && down_gate(ctx).is_none() {
            self.down_count[row] += 1;
            self.up_count[row] = 0;
            if self.down_count[row] >= t.cpu_down_rate() {
                info!("SLP HOTPLUG OUT: ONLINE {} FREQ {}<={} FOR {} TICKS",
                      ctx.online, freq, off, self.down_count[row]);
                self.clear();
                history.reset();
                return HotplugDecision::Down;
            }
        } else {
            self.up_count[row] = 0;
            self.down_count[row] = 0;
        }
        HotplugDecision::Stay
    }

    fn reset(&mut self) {
        self.clear();
    }
}
