// IN-MEMORY PLATFORM FOR INTEGRATION TESTS
// COUNTERS ONLY MOVE WHEN A TEST CALLS advance(). THE CLOCK STARTS NONZERO.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pegasusq::error::{GovernorError, Result};
use pegasusq::{IdleTime, Platform, Relation};

pub const MIN_KHZ: u32 = 200_000;
pub const MAX_KHZ: u32 = 1_000_000;

pub struct FakeState {
    pub online: Vec<bool>,
    pub idle: Vec<u64>,
    pub iowait: Vec<u64>,
    pub nice: Vec<u64>,
    pub wall: Vec<u64>,
    pub runnable: u64,
    pub cur: u32,
    pub min: u32,
    pub max: u32,
    pub avg: Option<u32>,
    pub now_ns: u64,
    pub set_calls: Vec<(u32, Relation)>,
    pub ups: Vec<usize>,
    pub downs: Vec<usize>,
    pub fail_hotplug: bool,
    // cpu_up SLEEPS THIS LONG WITHOUT HOLDING THE STATE LOCK
    pub up_delay: Option<Duration>,
}

pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new(possible: usize, online: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                online: (0..possible).map(|c| c < online.max(1)).collect(),
                idle: vec![0; possible],
                iowait: vec![0; possible],
                nice: vec![0; possible],
                wall: vec![0; possible],
                runnable: 0,
                cur: 400_000,
                min: MIN_KHZ,
                max: MAX_KHZ,
                avg: None,
                now_ns: 1_000_000_000,
                set_calls: Vec::new(),
                ups: Vec::new(),
                downs: Vec::new(),
                fail_hotplug: false,
                up_delay: None,
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    // ADVANCE THE CLOCK; EVERY ONLINE CPU IS busy_pct BUSY FOR THE INTERVAL
    pub fn advance(&self, us: u64, busy_pct: u64) {
        let mut s = self.state();
        s.now_ns += us * 1_000;
        for cpu in 0..s.online.len() {
            if s.online[cpu] {
                s.wall[cpu] += us;
                s.idle[cpu] += us * (100 - busy_pct.min(100)) / 100;
            }
        }
    }

    pub fn online_count(&self) -> usize {
        self.state().online.iter().filter(|o| **o).count()
    }

    pub fn last_set(&self) -> Option<(u32, Relation)> {
        self.state().set_calls.last().copied()
    }
}

impl Platform for FakePlatform {
    fn cpu_online(&self, cpu: usize) -> bool {
        self.state().online.get(cpu).copied().unwrap_or(false)
    }

    fn num_online_cpus(&self) -> usize {
        self.online_count()
    }

    fn num_possible_cpus(&self) -> usize {
        self.state().online.len()
    }

    fn cpu_up(&self, cpu: usize) -> Result<()> {
        let delay = self.state().up_delay;
        if let Some(d) = delay {
            std::thread::sleep(d);
        }
        let mut s = self.state();
        if s.fail_hotplug {
            return Err(GovernorError::Refused(format!("cpu{} up", cpu)));
        }
        s.online[cpu] = true;
        s.ups.push(cpu);
        Ok(())
    }

    fn cpu_down(&self, cpu: usize) -> Result<()> {
        let mut s = self.state();
        if s.fail_hotplug || cpu == 0 {
            return Err(GovernorError::Refused(format!("cpu{} down", cpu)));
        }
        s.online[cpu] = false;
        s.downs.push(cpu);
        Ok(())
    }

    fn idle_time(&self, cpu: usize) -> IdleTime {
        let s = self.state();
        IdleTime {
            idle_us: s.idle[cpu],
            wall_us: s.wall[cpu],
        }
    }

    fn iowait_time(&self, cpu: usize) -> u64 {
        self.state().iowait[cpu]
    }

    fn nice_time(&self, cpu: usize) -> u64 {
        self.state().nice[cpu]
    }

    fn runnable_tasks(&self) -> u64 {
        self.state().runnable
    }

    fn set_frequency(&self, _policy: usize, target_khz: u32, relation: Relation) -> Result<()> {
        let mut s = self.state();
        s.set_calls.push((target_khz, relation));
        s.cur = target_khz.clamp(s.min, s.max);
        Ok(())
    }

    fn current_frequency(&self, _policy: usize) -> u32 {
        self.state().cur
    }

    fn policy_min(&self, _policy: usize) -> u32 {
        self.state().min
    }

    fn policy_max(&self, _policy: usize) -> u32 {
        self.state().max
    }

    fn average_frequency(&self, _policy: usize, _cpu: usize) -> Option<u32> {
        self.state().avg
    }

    fn now_ns(&self) -> u64 {
        self.state().now_ns
    }
}
