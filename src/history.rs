// PEGASUSQ USAGE HISTORY
// FIXED RING OF MAX_HOTPLUG_RATE SLOTS, ONE PER SAMPLING TICK.
// THE CURSOR IS ALSO "TICKS SINCE LAST HOTPLUG DECISION": A DECISION RESETS
// IT, AND IT WRAPS AT THE LONGEST CONFIGURED WINDOW. PRE-ALLOCATED, NO HEAP
// ALLOCATION WHILE SAMPLING.

use crate::tunables::MAX_HOTPLUG_RATE;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuUsage {
    pub freq: u32,
    pub rq_avg: u32,
    pub load: Vec<u32>,
}

pub struct UsageHistory {
    usage: Vec<CpuUsage>,
    num_hist: usize,
}

impl UsageHistory {
    pub fn new(nr_cpus: usize) -> Self {
        Self {
            usage: vec![
                CpuUsage { freq: 0, rq_avg: 0, load: vec![0; nr_cpus] };
                MAX_HOTPLUG_RATE
            ],
            num_hist: 0,
        }
    }

    // RECORD ONE TICK. LOADS BEYOND THE SLOT WIDTH ARE DROPPED.
    pub fn append(&mut self, freq: u32, rq_avg: u32, loads: &[u32]) {
        if self.num_hist >= MAX_HOTPLUG_RATE {
            self.num_hist = 0;
        }
        let slot = &mut self.usage[self.num_hist];
        slot.freq = freq;
        slot.rq_avg = rq_avg;
        for (dst, src) in slot.load.iter_mut().zip(loads) {
            *dst = *src;
        }
        self.num_hist += 1;
    }

    // TICKS RECORDED SINCE THE LAST RESET
    pub fn len(&self) -> usize {
        self.num_hist
    }

    pub fn is_empty(&self) -> bool {
        self.num_hist == 0
    }

    // TRUE WHEN A FULL WINDOW OF rate TICKS HAS JUST COMPLETED
    pub fn at_boundary(&self, rate: usize) -> bool {
        rate != 0 && self.num_hist != 0 && self.num_hist % rate == 0
    }

    // THE LAST rate ENTRIES, OLDEST FIRST. NEVER READS OUTSIDE [num_hist - rate, num_hist).
    pub fn window(&self, rate: usize) -> &[CpuUsage] {
        let start = self.num_hist.saturating_sub(rate);
        &self.usage[start..self.num_hist]
    }

    pub fn latest(&self) -> Option<&CpuUsage> {
        self.num_hist.checked_sub(1).map(|i| &self.usage[i])
    }

    pub fn reset(&mut self) {
        self.num_hist = 0;
    }

    // WRAP WITHOUT A DECISION ONCE THE LONGEST WINDOW IS FULL
    pub fn wrap(&mut self, max_rate: usize) {
        if self.num_hist >= max_rate {
            self.num_hist = 0;
        }
    }
}
