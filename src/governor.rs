// PEGASUSQ GOVERNOR CORE
//
// ONE Governor DRIVES ANY NUMBER OF CPUFREQ POLICIES. EACH RUNNING POLICY OWNS
// A PERIODIC TICK; THE TICK HOLDS THE POLICY'S timer_mutex FOR ITS WHOLE RUN,
// WHICH IS ALSO WHAT update_limits() TAKES. EVERYTHING ELSE IS SHARED:
//   TunableStore      ATOMIC SCALARS, LOCK-FREE ON THE HOT PATH
//   HotplugLock       EXACT ONLINE-COUNT PIN (USER, SUSPEND, PM, REBOOT)
//   hotplug mutex     USAGE HISTORY + ACTIVE STRATEGY (APPEND AND CHECK TOGETHER)
//   RunQueueSampler   10MS RQ AVERAGE, ANDROID POLICY ONLY
//   HotplugActuator   SINGLE QUEUE FOR EVERY ONLINE/OFFLINE CHANGE
//
// ONLY THE LOWEST RUNNING POLICY WITH AN ONLINE CPU CONSUMES THE RQ AVERAGE,
// APPENDS HISTORY AND RUNS THE HOTPLUG STRATEGY. OTHER POLICIES SAMPLE LOAD,
// RUN DVFS AND PUBLISH THEIR PER-CPU LOADS FOR THE OWNER'S NEXT SLOT.
//
// Governor::new() RUNS REAL TIMERS AND THE ACTUATOR THREAD.
// Governor::manual() RUNS NOTHING ON ITS OWN: THE CALLER DRIVES tick() AND
// QUEUED HOTPLUG WORK EXECUTES INLINE. SAME CODE PATHS OTHERWISE.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::{debug, info, warn};

use crate::actuator::{cpu_down_work, cpu_up_work, HotplugActuator, HotplugWork, WorkHandler};
use crate::dvfs::{self, DvfsAction, DvfsInput, DvfsParams};
use crate::error::{GovernorError, Result};
use crate::event::{EventLog, Snapshot};
use crate::history::UsageHistory;
use crate::hotplug::{policy_for, HotplugContext, HotplugDecision, HotplugLock, HotplugPolicy};
use crate::load::PerCpuState;
use crate::platform::{Platform, PowerEvent, Relation};
use crate::runqueue::RunQueueSampler;
use crate::timer::DelayedWork;
use crate::tunables::{
    HotplugPolicyKind, StoreEffect, Tunable, TunableStore, SUSPEND_FREQ_STEP, SUSPEND_SAMPLING_MULT,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// NEXT TICK DELAY IN MICROSECONDS.
// WITH MORE THAN ONE CPU ONLINE, ALIGN TO A MULTIPLE OF THE DELAY SO ALL
// POLICIES WAKE TOGETHER. NEVER LESS THAN HALF THE NOMINAL RATE.
pub fn aligned_delay(nominal_us: u32, rate_mult: u32, now_us: u64, online: usize) -> Duration {
    let nominal = nominal_us as u64;
    let mut delay = nominal * rate_mult.max(1) as u64;
    if online > 1 && delay != 0 {
        delay -= now_us % delay;
    }
    let floor = nominal / 2;
    if delay < floor {
        delay = floor;
    }
    Duration::from_micros(delay.max(1))
}

struct HotplugState {
    history: UsageHistory,
    policy: Box<dyn HotplugPolicy>,
    // LATEST LOAD PER CPU, WRITTEN BY EVERY POLICY'S TICK
    loads: Vec<u32>,
}

// EVERYTHING THE TICK MUTATES, BEHIND timer_mutex
struct TickState {
    cpus: Vec<PerCpuState>,
    policy_min: u32,
    policy_max: u32,
}

struct PolicyState {
    cpu: usize,
    timer_mutex: Mutex<TickState>,
    rate_mult: AtomicU32,
    timer: Mutex<Option<DelayedWork>>,
}

#[derive(Clone, Copy, Debug)]
struct SuspendSnapshot {
    hotplug_lock: usize,
    freq_step: u32,
    sampling_rate: u32,
}

struct Core {
    platform: Arc<dyn Platform>,
    tunables: Arc<TunableStore>,
    lock: HotplugLock,
    hotplug: Mutex<HotplugState>,
    rq: Arc<RunQueueSampler>,
    actuator: Option<HotplugActuator>,
    policies: Mutex<HashMap<usize, Arc<PolicyState>>>,
    notifiers: AtomicBool,
    suspended: Mutex<Option<SuspendSnapshot>>,
    pm_saved: Mutex<Option<usize>>,
    // (MINIMUM ONLINE, EXPIRY NS)
    dynamic_min: Mutex<Option<(usize, u64)>>,
    events: Mutex<EventLog>,
    timers: bool,
    self_ref: Weak<Core>,
}

pub struct Governor {
    core: Arc<Core>,
}

impl Governor {
    // LIVE GOVERNOR: PERIODIC TIMERS AND A HOTPLUG ACTUATOR THREAD
    pub fn new(platform: Arc<dyn Platform>) -> Result<Self> {
        let mut spawn_err = None;
        let core = Arc::new_cyclic(|weak: &Weak<Core>| {
            let handler: Weak<dyn WorkHandler> = weak.clone();
            let actuator = match HotplugActuator::spawn(handler) {
                Ok(a) => Some(a),
                Err(e) => {
                    spawn_err = Some(e);
                    None
                }
            };
            Core::build(platform, actuator, true, weak.clone())
        });
        if let Some(e) = spawn_err {
            return Err(GovernorError::platform("pegasusq-hotplug", e));
        }
        Ok(Self { core })
    }

    // CALLER-DRIVEN GOVERNOR: NO THREADS, HOTPLUG WORK RUNS INLINE
    pub fn manual(platform: Arc<dyn Platform>) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<Core>| Core::build(platform, None, false, weak.clone()));
        Self { core }
    }

    // --- LIFECYCLE ---

    pub fn start(&self, policy_cpu: usize) -> Result<()> {
        self.core.start(policy_cpu)
    }

    pub fn stop(&self, policy_cpu: usize) -> Result<()> {
        self.core.stop(policy_cpu)
    }

    pub fn update_limits(&self, policy_cpu: usize) -> Result<()> {
        self.core.update_limits(policy_cpu)
    }

    // ONE SAMPLING TICK. RETURNS THE DELAY UNTIL THE NEXT ONE.
    pub fn tick(&self, policy_cpu: usize) -> Result<Duration> {
        self.core.tick(policy_cpu)
    }

    pub fn shutdown(&self) {
        let running: Vec<usize> = lock(&self.core.policies).keys().copied().collect();
        for cpu in running {
            let _ = self.core.stop(cpu);
        }
        self.core.rq.stop();
        if let Some(act) = &self.core.actuator {
            act.shutdown();
        }
    }

    pub fn running_policies(&self) -> Vec<usize> {
        let mut v: Vec<usize> = lock(&self.core.policies).keys().copied().collect();
        v.sort_unstable();
        v
    }

    // --- CONFIGURATION SURFACE ---

    pub fn store_tunable(&self, name: &str, value: &str) -> Result<()> {
        self.core.store_tunable(name, value)
    }

    pub fn show_tunable(&self, name: &str) -> Result<String> {
        if name.trim() == "online_cpus" {
            return Ok(self.core.platform.num_online_cpus().to_string());
        }
        self.core.tunables.show(name.parse()?)
    }

    pub fn tunables(&self) -> &Arc<TunableStore> {
        &self.core.tunables
    }

    // --- HOTPLUG LOCK API ---

    pub fn cpu_lock(&self, num_cores: usize) -> Result<()> {
        self.core.cpu_lock(num_cores)
    }

    pub fn cpu_unlock(&self, num_cores: usize) {
        self.core.lock.release(num_cores);
    }

    pub fn hotplug_lock(&self) -> usize {
        self.core.lock.get()
    }

    pub fn apply_hotplug_lock(&self) {
        self.core.apply_hotplug_lock();
    }

    // SHORT-LIVED "KEEP n CORES" REQUEST. n = 0 CLEARS IT.
    pub fn request_min_online(&self, n: usize, duration: Duration) {
        let mut dm = lock(&self.core.dynamic_min);
        if n == 0 {
            *dm = None;
            return;
        }
        let expiry = self.core.platform.now_ns().saturating_add(duration.as_nanos() as u64);
        *dm = Some((n, expiry));
        info!("DYNAMIC MIN ONLINE {} FOR {:?}", n, duration);
    }

    pub fn dynamic_min(&self) -> Option<usize> {
        self.core.dynamic_min()
    }

    // --- POWER-STATE NOTIFICATIONS ---

    pub fn power_event(&self, ev: PowerEvent) {
        self.core.power_event(ev);
    }

    pub fn is_suspended(&self) -> bool {
        lock(&self.core.suspended).is_some()
    }

    // --- INTROSPECTION ---

    pub fn rate_mult(&self, policy_cpu: usize) -> Option<u32> {
        lock(&self.core.policies)
            .get(&policy_cpu)
            .map(|p| p.rate_mult.load(Ordering::Relaxed))
    }

    pub fn history_len(&self) -> usize {
        lock(&self.core.hotplug).history.len()
    }

    pub fn hotplug_policy(&self) -> HotplugPolicyKind {
        lock(&self.core.hotplug).policy.kind()
    }

    pub fn rq_sampler_running(&self) -> bool {
        self.core.rq.is_running()
    }

    pub fn notifiers_registered(&self) -> bool {
        self.core.notifiers.load(Ordering::Acquire)
    }

    // ONE RUN-QUEUE SAMPLE, FOR CALLER-DRIVEN GOVERNORS
    pub fn sample_runqueue(&self) {
        let p = &self.core.platform;
        self.core.rq.sample(p.runnable_tasks(), p.now_ns());
    }

    // WAIT FOR QUEUED HOTPLUG WORK TO DRAIN
    pub fn flush_hotplug(&self) {
        if let Some(act) = &self.core.actuator {
            act.flush();
        }
    }

    pub fn last_event(&self) -> Option<Snapshot> {
        lock(&self.core.events).latest().copied()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.core.events).len()
    }

    pub fn dump_log(&self) {
        lock(&self.core.events).dump();
    }

    pub fn summary(&self) {
        lock(&self.core.events).summary();
    }
}

impl Drop for Governor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Core {
    fn build(
        platform: Arc<dyn Platform>,
        actuator: Option<HotplugActuator>,
        timers: bool,
        self_ref: Weak<Core>,
    ) -> Self {
        let possible = platform.num_possible_cpus().max(1);
        let tunables = Arc::new(TunableStore::new(possible));
        let kind = tunables.policy();
        Self {
            platform,
            tunables,
            lock: HotplugLock::new(),
            hotplug: Mutex::new(HotplugState {
                history: UsageHistory::new(possible),
                policy: policy_for(kind, possible),
                loads: vec![0; possible],
            }),
            rq: Arc::new(RunQueueSampler::new()),
            actuator,
            policies: Mutex::new(HashMap::new()),
            notifiers: AtomicBool::new(false),
            suspended: Mutex::new(None),
            pm_saved: Mutex::new(None),
            dynamic_min: Mutex::new(None),
            events: Mutex::new(EventLog::new()),
            timers,
            self_ref,
        }
    }

    fn possible(&self) -> usize {
        self.tunables.possible()
    }

    fn policy(&self, policy_cpu: usize) -> Result<Arc<PolicyState>> {
        lock(&self.policies)
            .get(&policy_cpu)
            .cloned()
            .ok_or(GovernorError::NotRunning(policy_cpu))
    }

    fn start_rq(&self) {
        if self.timers {
            self.rq.start(self.platform.clone());
        } else {
            self.rq.reset();
        }
    }

    // --- GOV_START / GOV_STOP / GOV_LIMITS ---

    fn start(&self, policy_cpu: usize) -> Result<()> {
        if lock(&self.policies).contains_key(&policy_cpu) {
            return Err(GovernorError::AlreadyRunning(policy_cpu));
        }
        let p = &*self.platform;
        if !p.cpu_online(policy_cpu) {
            return Err(GovernorError::CpuOffline(policy_cpu));
        }
        let cur = p.current_frequency(policy_cpu);
        if cur == 0 {
            return Err(GovernorError::NoFrequency(policy_cpu));
        }

        let policy_min = p.policy_min(policy_cpu);
        let policy_max = p.policy_max(policy_cpu);
        self.tunables.set_freq_bounds(policy_min, policy_max);

        {
            let mut hp = lock(&self.hotplug);
            hp.history.reset();
            hp.policy.reset();
        }
        if self.tunables.policy() == HotplugPolicyKind::Android {
            self.start_rq();
        }

        let cpus: Vec<PerCpuState> = p
            .policy_cpus(policy_cpu)
            .into_iter()
            .map(|cpu| {
                let mut s = PerCpuState::new(p, cpu);
                s.baselined = p.cpu_online(cpu);
                s
            })
            .collect();
        let state = Arc::new(PolicyState {
            cpu: policy_cpu,
            timer_mutex: Mutex::new(TickState {
                cpus,
                policy_min,
                policy_max,
            }),
            rate_mult: AtomicU32::new(1),
            timer: Mutex::new(None),
        });

        {
            let mut policies = lock(&self.policies);
            if policies.is_empty() {
                self.notifiers.store(true, Ordering::Release);
                info!("NOTIFIERS REGISTERED (REBOOT, PM)");
            }
            policies.insert(policy_cpu, state.clone());
        }

        if self.timers {
            let first = aligned_delay(
                self.tunables.sampling_rate(),
                1,
                p.now_ns() / 1_000,
                p.num_online_cpus(),
            );
            let core = self.self_ref.clone();
            let work = DelayedWork::spawn(&format!("pegasusq-{}", policy_cpu), first, move || {
                let core = core.upgrade()?;
                core.tick(policy_cpu).ok()
            })
            .map_err(|e| GovernorError::platform(format!("pegasusq-{}", policy_cpu), e));
            match work {
                Ok(w) => *lock(&state.timer) = Some(w),
                Err(e) => {
                    lock(&self.policies).remove(&policy_cpu);
                    return Err(e);
                }
            }
        }

        info!("GOV_START POLICY {} CUR {} MIN {} MAX {} HOTPLUG {}",
              policy_cpu, cur, policy_min, policy_max, self.tunables.policy().label());
        Ok(())
    }

    fn stop(&self, policy_cpu: usize) -> Result<()> {
        let (state, last) = {
            let mut policies = lock(&self.policies);
            let state = policies
                .remove(&policy_cpu)
                .ok_or(GovernorError::NotRunning(policy_cpu))?;
            (state, policies.is_empty())
        };

        // WAITS FOR AN IN-FLIGHT TICK
        let timer = lock(&state.timer).take();
        if let Some(t) = timer {
            t.cancel_sync();
        }
        if let Some(act) = &self.actuator {
            act.cancel_pending();
        }

        if last {
            self.rq.stop();
            self.notifiers.store(false, Ordering::Release);
            info!("NOTIFIERS UNREGISTERED");
        }
        info!("GOV_STOP POLICY {}", state.cpu);
        Ok(())
    }

    fn update_limits(&self, policy_cpu: usize) -> Result<()> {
        let state = self.policy(policy_cpu)?;
        let mut tick = lock(&state.timer_mutex);
        let p = &*self.platform;

        tick.policy_min = p.policy_min(policy_cpu);
        tick.policy_max = p.policy_max(policy_cpu);
        self.tunables.set_freq_bounds(tick.policy_min, tick.policy_max);

        let cur = p.current_frequency(policy_cpu);
        if tick.policy_max < cur {
            p.set_frequency(policy_cpu, tick.policy_max, Relation::AtOrBelow)?;
        } else if tick.policy_min > cur {
            p.set_frequency(policy_cpu, tick.policy_min, Relation::AtOrAbove)?;
        }
        info!("GOV_LIMITS POLICY {} MIN {} MAX {}", policy_cpu, tick.policy_min, tick.policy_max);
        Ok(())
    }

    // --- THE TICK ---

    fn tick(&self, policy_cpu: usize) -> Result<Duration> {
        let state = self.policy(policy_cpu)?;
        let p = &*self.platform;
        let t = &*self.tunables;

        let mut guard = lock(&state.timer_mutex);
        let tick = &mut *guard;

        // EVERY CPU OF THE POLICY IS OFFLINE: NOTHING TO SAMPLE OR DRIVE
        if !tick.cpus.iter().any(|c| p.cpu_online(c.cpu)) {
            let mut hp = lock(&self.hotplug);
            for pcpu in tick.cpus.iter_mut() {
                pcpu.baselined = false;
                if let Some(slot) = hp.loads.get_mut(pcpu.cpu) {
                    *slot = 0;
                }
            }
            drop(hp);
            let rate_mult = state.rate_mult.load(Ordering::Relaxed);
            drop(guard);
            return Ok(aligned_delay(t.sampling_rate(), rate_mult, p.now_ns() / 1_000,
                                    p.num_online_cpus()));
        }

        let cur = p.current_frequency(policy_cpu);
        let ignore_nice = t.ignore_nice();
        let io_is_busy = t.io_is_busy();

        // LOAD
        let mut max_load_freq: u64 = 0;
        let mut max_load: u32 = 0;
        for pcpu in tick.cpus.iter_mut() {
            if !p.cpu_online(pcpu.cpu) {
                pcpu.baselined = false;
                pcpu.load = 0;
                continue;
            }
            // JUST CAME ONLINE: THIS TICK ONLY ESTABLISHES THE BASELINE
            if !pcpu.baselined {
                pcpu.rebaseline(p);
                continue;
            }
            if let Some(load) = pcpu.sample(p, ignore_nice, io_is_busy) {
                let freq = p
                    .average_frequency(policy_cpu, pcpu.cpu)
                    .filter(|f| *f != 0)
                    .unwrap_or(cur);
                max_load_freq = max_load_freq.max(load as u64 * freq as u64);
                max_load = max_load.max(load);
            }
        }

        // HOTPLUG: ONE POLICY APPENDS AND CHECKS, UNDER ONE LOCK.
        // THE OTHERS ONLY PUBLISH THEIR LOADS INTO THE NEXT SLOT.
        let owner = self.owns_hotplug(policy_cpu);
        let rq_avg = if owner { self.rq.take_avg() } else { 0 };
        let (decision, deferred) = {
            let mut hp = lock(&self.hotplug);
            let hp = &mut *hp;
            for pcpu in &tick.cpus {
                if let Some(slot) = hp.loads.get_mut(pcpu.cpu) {
                    *slot = pcpu.load;
                }
            }
            if !owner {
                (HotplugDecision::Stay, false)
            } else {
                hp.history.append(cur, rq_avg, &hp.loads);
                if hp.policy.deferred() {
                    (HotplugDecision::Stay, true)
                } else {
                    let ctx = self.hotplug_ctx();
                    let d = hp.policy.evaluate(&mut hp.history, &ctx);
                    hp.history.wrap(t.max_hotplug_rate());
                    (d, false)
                }
            }
        };
        match decision {
            HotplugDecision::Up => self.queue(HotplugWork::Up),
            HotplugDecision::Down => self.queue(HotplugWork::Down),
            HotplugDecision::Stay => {}
        }

        // DVFS
        let params = DvfsParams {
            up_threshold: t.up_threshold(),
            down_differential: t.down_differential(),
            freq_step: t.freq_step(),
            sampling_down_factor: t.sampling_down_factor(),
        };
        let input = DvfsInput {
            max_load_freq,
            cur,
            policy_min: tick.policy_min,
            policy_max: tick.policy_max,
        };
        let mut rate_mult = state.rate_mult.load(Ordering::Relaxed);
        let action = dvfs::decide(&params, &input, &mut rate_mult);
        state.rate_mult.store(rate_mult, Ordering::Relaxed);

        let request = match action {
            DvfsAction::RampUp(f) if cur != tick.policy_max && f != cur => Some(f),
            DvfsAction::RampDown(f) if f != cur => Some(f),
            _ => None,
        };
        if t.dvfs_debug() {
            debug!("DVFS POLICY {} CUR {} MAX_LOAD_FREQ {} -> {:?} RATE_MULT {}",
                   policy_cpu, cur, max_load_freq, action, rate_mult);
        }
        if let Some(target) = request {
            if let Err(e) = p.set_frequency(policy_cpu, target, action.relation()) {
                warn!("SET FREQUENCY {} ON POLICY {} FAILED: {}", target, policy_cpu, e);
            }
        }

        let online = p.num_online_cpus();
        lock(&self.events).record(Snapshot {
            ts_ns: p.now_ns(),
            freq: cur,
            target: request.unwrap_or(0),
            rq_avg,
            online: online as u32,
            max_load,
            decision,
        });

        if deferred {
            self.queue(HotplugWork::Evaluate);
        }

        drop(guard);
        Ok(aligned_delay(t.sampling_rate(), rate_mult, p.now_ns() / 1_000, online))
    }

    // THE LOWEST-NUMBERED RUNNING POLICY WHOSE CPU IS ONLINE DRIVES HOTPLUG
    fn owns_hotplug(&self, policy_cpu: usize) -> bool {
        let p = &*self.platform;
        let policies = lock(&self.policies);
        let owner = policies
            .keys()
            .copied()
            .filter(|cpu| p.cpu_online(*cpu))
            .min()
            .or_else(|| policies.keys().copied().min());
        owner == Some(policy_cpu)
    }

    fn hotplug_ctx(&self) -> HotplugContext<'_> {
        HotplugContext {
            tunables: &self.tunables,
            online: self.platform.num_online_cpus(),
            possible: self.platform.num_possible_cpus(),
            lock: self.lock.get(),
            dynamic_min: self.dynamic_min(),
        }
    }

    fn dynamic_min(&self) -> Option<usize> {
        let mut dm = lock(&self.dynamic_min);
        match *dm {
            Some((n, expiry)) if self.platform.now_ns() < expiry => Some(n),
            Some(_) => {
                *dm = None;
                None
            }
            None => None,
        }
    }

    // --- HOTPLUG WORK ---

    fn queue(&self, work: HotplugWork) {
        match &self.actuator {
            Some(act) => {
                act.queue(work);
            }
            None => self.run(work),
        }
    }

    // SLP EVALUATION, RUN OFF THE TICK
    fn evaluate_deferred(&self) -> HotplugDecision {
        let decision = {
            let mut hp = lock(&self.hotplug);
            let hp = &mut *hp;
            let ctx = self.hotplug_ctx();
            let d = hp.policy.evaluate(&mut hp.history, &ctx);
            hp.history.wrap(self.tunables.max_hotplug_rate());
            d
        };
        if decision != HotplugDecision::Stay {
            lock(&self.events).mark_latest(decision);
        }
        decision
    }

    fn cpu_lock(&self, num_cores: usize) -> Result<()> {
        self.lock.acquire(num_cores)?;
        self.apply_hotplug_lock();
        Ok(())
    }

    // QUEUE THE WORK THAT MOVES THE ONLINE COUNT TOWARD THE PIN
    fn apply_hotplug_lock(&self) {
        let pin = self.lock.get();
        if pin == 0 {
            return;
        }
        let online = self.platform.num_online_cpus();
        if pin > online {
            self.queue(HotplugWork::Up);
        } else if pin < online {
            self.queue(HotplugWork::Down);
        }
    }

    // --- CONFIGURATION ---

    fn store_tunable(&self, name: &str, value: &str) -> Result<()> {
        if name.trim() == "online_cpus" {
            return Err(GovernorError::ReadOnly("online_cpus".to_string()));
        }
        let t: Tunable = name.parse()?;
        let effect = self.tunables.store(t, value)?;

        match effect {
            StoreEffect::None => {}
            StoreEffect::ResetRateMult => {
                for state in lock(&self.policies).values() {
                    state.rate_mult.store(1, Ordering::Relaxed);
                }
            }
            StoreEffect::Rebaseline => {
                let states: Vec<Arc<PolicyState>> = lock(&self.policies).values().cloned().collect();
                for state in states {
                    let mut tick = lock(&state.timer_mutex);
                    for pcpu in tick.cpus.iter_mut() {
                        if self.platform.cpu_online(pcpu.cpu) {
                            pcpu.rebaseline(&*self.platform);
                        }
                    }
                }
            }
            StoreEffect::HotplugLock(n) => self.store_hotplug_lock(n)?,
            StoreEffect::MinCpuLock(n) => {
                self.tunables.set_min_cpu_lock_raw(n);
                if n != 0 && n > self.platform.num_online_cpus() {
                    self.queue(HotplugWork::Up);
                }
            }
            StoreEffect::SwitchPolicy(kind) => self.switch_policy(kind),
        }
        debug!("STORE {} = {}", t.name(), value.trim());
        Ok(())
    }

    // THE USER PIN REPLACES ITS OWN PREVIOUS VALUE. ON CONFLICT THE OLD PIN IS PUT BACK.
    fn store_hotplug_lock(&self, n: usize) -> Result<()> {
        let prev = self.tunables.hotplug_lock();
        if prev != 0 {
            self.lock.release(prev);
        }
        if n == 0 {
            self.tunables.set_hotplug_lock_raw(0);
            return Ok(());
        }
        if let Err(e) = self.cpu_lock(n) {
            warn!("HOTPLUG LOCK {} REJECTED: {}", n, e);
            if prev != 0 {
                let _ = self.lock.acquire(prev);
            }
            return Err(e);
        }
        self.tunables.set_hotplug_lock_raw(n);
        Ok(())
    }

    fn switch_policy(&self, kind: HotplugPolicyKind) {
        {
            let mut hp = lock(&self.hotplug);
            if hp.policy.kind() == kind {
                return;
            }
            hp.policy = policy_for(kind, self.possible());
            hp.history.reset();
        }
        self.tunables.set_policy_raw(kind);

        let running = !lock(&self.policies).is_empty();
        match kind {
            HotplugPolicyKind::Android if running => self.start_rq(),
            HotplugPolicyKind::Android => {}
            HotplugPolicyKind::Slp => self.rq.stop(),
        }
        info!("HOTPLUG POLICY -> {}", kind.label());
    }

    // --- POWER EVENTS ---

    fn power_event(&self, ev: PowerEvent) {
        match ev {
            PowerEvent::EarlySuspend => {
                let mut suspended = lock(&self.suspended);
                if suspended.is_some() {
                    return;
                }
                let t = &*self.tunables;
                *suspended = Some(SuspendSnapshot {
                    hotplug_lock: self.lock.get(),
                    freq_step: t.freq_step(),
                    sampling_rate: t.sampling_rate(),
                });
                t.set_freq_step_raw(SUSPEND_FREQ_STEP);
                t.set_sampling_rate_raw(t.sampling_rate().saturating_mul(SUSPEND_SAMPLING_MULT));
                let pin = t.min_cpu_lock().max(1);
                self.lock.force(pin);
                drop(suspended);

                self.apply_hotplug_lock();
                self.rq.stop();
                info!("EARLY SUSPEND: PIN {} CORES", pin);
            }
            PowerEvent::LateResume => {
                let saved = match lock(&self.suspended).take() {
                    Some(s) => s,
                    None => return,
                };
                let t = &*self.tunables;
                self.lock.force(saved.hotplug_lock);
                t.set_freq_step_raw(saved.freq_step);
                t.set_sampling_rate_raw(saved.sampling_rate);

                self.apply_hotplug_lock();
                if t.policy() == HotplugPolicyKind::Android && !lock(&self.policies).is_empty() {
                    self.start_rq();
                }
                info!("LATE RESUME: PIN {}", saved.hotplug_lock);
            }
            PowerEvent::SuspendPrepare | PowerEvent::Reboot if !self.notifiers.load(Ordering::Acquire) => {
                debug!("{:?} IGNORED: NO GOVERNOR RUNNING", ev);
            }
            PowerEvent::SuspendPrepare => {
                *lock(&self.pm_saved) = Some(self.lock.get());
                self.lock.force(1);
                self.apply_hotplug_lock();
                info!("PM SUSPEND PREPARE: PIN 1 CORE");
            }
            PowerEvent::PostSuspend => {
                if let Some(saved) = lock(&self.pm_saved).take() {
                    self.lock.force(saved);
                    self.apply_hotplug_lock();
                    info!("PM POST SUSPEND: PIN {}", saved);
                }
            }
            PowerEvent::Reboot => {
                self.lock.force(1);
                self.apply_hotplug_lock();
                info!("REBOOT: PIN 1 CORE");
            }
        }
    }
}

impl WorkHandler for Core {
    fn run(&self, work: HotplugWork) {
        let p = &*self.platform;
        match work {
            HotplugWork::Up => {
                cpu_up_work(p, &self.tunables, &self.lock);
            }
            HotplugWork::Down => {
                cpu_down_work(p, &self.lock);
            }
            HotplugWork::Evaluate => match self.evaluate_deferred() {
                HotplugDecision::Up => {
                    cpu_up_work(p, &self.tunables, &self.lock);
                }
                HotplugDecision::Down => {
                    cpu_down_work(p, &self.lock);
                }
                HotplugDecision::Stay => {}
            },
        }
    }
}
