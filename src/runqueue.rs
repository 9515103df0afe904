// PEGASUSQ RUN-QUEUE SAMPLER
// TIME-WEIGHTED AVERAGE OF (RUNNABLE TASKS * 100), SAMPLED EVERY 10MS ON ITS
// OWN TIMER. THE GOVERNOR CONSUMES THE AVERAGE ONCE PER TICK (READ-AND-RESET).
// ONLY RUNS UNDER THE ANDROID HOTPLUG POLICY.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::warn;

use crate::platform::Platform;
use crate::timer::DelayedWork;
use crate::tunables::RQ_SAMPLE_MS;

#[derive(Default, Debug, Clone, Copy)]
struct RqState {
    nr_run_avg: u64,
    last_time_ns: u64,
    total_time_ms: u64,
}

pub struct RunQueueSampler {
    state: Mutex<RqState>,
    work: Mutex<Option<DelayedWork>>,
}

impl RunQueueSampler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RqState::default()),
            work: Mutex::new(None),
        }
    }

    // ONE RQ TICK
    pub fn sample(&self, runnable: u64, now_ns: u64) {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if s.last_time_ns == 0 {
            s.last_time_ns = now_ns;
        }

        let mut nr_run = runnable * 100;
        let time_diff_ms = now_ns.saturating_sub(s.last_time_ns) / 1_000_000;

        if time_diff_ms != 0 && s.total_time_ms != 0 {
            nr_run = (nr_run * time_diff_ms + s.nr_run_avg * s.total_time_ms)
                / (s.total_time_ms + time_diff_ms);
        }

        s.nr_run_avg = nr_run;
        s.total_time_ms += time_diff_ms;
        s.last_time_ns = now_ns;
    }

    // CONSUME-ONCE: RETURNS THE AVERAGE AND STARTS A FRESH WINDOW
    pub fn take_avg(&self) -> u32 {
        let mut s = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let avg = s.nr_run_avg;
        s.nr_run_avg = 0;
        s.total_time_ms = 0;
        avg.min(u32::MAX as u64) as u32
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = RqState::default();
    }

    pub fn is_running(&self) -> bool {
        self.work.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    // START THE 10MS TIMER. NO-OP IF ALREADY RUNNING.
    pub fn start(self: &Arc<Self>, platform: Arc<dyn Platform>) {
        let mut work = self.work.lock().unwrap_or_else(|e| e.into_inner());
        if work.is_some() {
            return;
        }
        self.reset();

        let period = Duration::from_millis(RQ_SAMPLE_MS);
        let sampler: Weak<Self> = Arc::downgrade(self);
        match DelayedWork::spawn("pegasusq-rq", period, move || {
            let sampler = sampler.upgrade()?;
            sampler.sample(platform.runnable_tasks(), platform.now_ns());
            Some(period)
        }) {
            Ok(w) => *work = Some(w),
            Err(e) => warn!("RQ SAMPLER START FAILED: {}", e),
        }
    }

    // CANCEL THE TIMER, WAITING FOR AN IN-FLIGHT SAMPLE
    pub fn stop(&self) {
        let work = self.work.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(w) = work {
            w.cancel_sync();
        }
    }
}

impl Default for RunQueueSampler {
    fn default() -> Self {
        Self::new()
    }
}
