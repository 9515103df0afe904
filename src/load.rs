// PEGASUSQ LOAD SAMPLER
// CONVERTS CUMULATIVE IDLE/IOWAIT/NICE/WALL COUNTERS INTO A 0-100 LOAD FOR THE
// SAMPLING INTERVAL. COUNTERS ARE KEPT PER CPU AND ALWAYS ADVANCE, EVEN WHEN
// A SAMPLE IS SKIPPED, SO THE NEXT DELTA STARTS FROM A CONSISTENT BASELINE.

use crate::platform::Platform;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub idle: u64,
    pub iowait: u64,
    pub wall: u64,
    pub nice: u64,
}

impl CpuCounters {
    pub fn read(platform: &dyn Platform, cpu: usize) -> Self {
        let t = platform.idle_time(cpu);
        Self {
            idle: t.idle_us,
            iowait: platform.iowait_time(cpu),
            wall: t.wall_us,
            nice: platform.nice_time(cpu),
        }
    }
}

// PER-CPU GOVERNOR STATE
#[derive(Clone, Debug, Default)]
pub struct PerCpuState {
    pub cpu: usize,
    pub prev: CpuCounters,
    // LAST LOAD ACTUALLY COMPUTED. A SKIPPED SAMPLE LEAVES IT ALONE.
    pub load: u32,
    // FALSE UNTIL A BASELINE HAS BEEN TAKEN (NEW OR JUST-ONLINED CPU)
    pub baselined: bool,
}

impl PerCpuState {
    pub fn new(platform: &dyn Platform, cpu: usize) -> Self {
        Self {
            cpu,
            prev: CpuCounters::read(platform, cpu),
            load: 0,
            baselined: true,
        }
    }

    pub fn rebaseline(&mut self, platform: &dyn Platform) {
        self.prev = CpuCounters::read(platform, self.cpu);
        self.baselined = true;
    }

    // ONE SAMPLING STEP. RETURNS None WHEN THE INTERVAL IS UNUSABLE.
    pub fn sample(&mut self, platform: &dyn Platform, ignore_nice: bool, io_is_busy: bool) -> Option<u32> {
        let now = CpuCounters::read(platform, self.cpu);
        let prev = std::mem::replace(&mut self.prev, now);
        let load = compute_load(&prev, &now, ignore_nice, io_is_busy)?;
        self.load = load;
        Some(load)
    }
}

// LOAD FOR ONE INTERVAL. UNSIGNED WRAPPING DELTAS: A WRAPPED OR REWOUND
// COUNTER SHOWS UP AS wall < idle AND THE SAMPLE IS DROPPED.
pub fn compute_load(prev: &CpuCounters, now: &CpuCounters, ignore_nice: bool, io_is_busy: bool) -> Option<u32> {
    let wall = now.wall.wrapping_sub(prev.wall);
    let mut idle = now.idle.wrapping_sub(prev.idle);
    let iowait = now.iowait.wrapping_sub(prev.iowait);

    // NICE TIME COUNTS AS IDLE
    if ignore_nice {
        idle = idle.wrapping_add(now.nice.wrapping_sub(prev.nice));
    }

    // IO WAIT COUNTS AS BUSY
    if io_is_busy && idle >= iowait {
        idle -= iowait;
    }

    if wall == 0 || wall < idle {
        return None;
    }

    Some((100 * (wall - idle) / wall) as u32)
}
