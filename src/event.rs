// PEGASUSQ EVENT LOG
// RECORDS ONE SNAPSHOT PER GOVERNOR TICK
// PRE-ALLOCATED RING BUFFER. NO HEAP ALLOCATION WHILE SAMPLING.
// WRAPS AROUND AT CAPACITY, OLDEST ENTRIES OVERWRITTEN.

use crate::hotplug::HotplugDecision;

const MAX_SNAPSHOTS: usize = 8192;

#[derive(Clone, Copy)]
pub struct Snapshot {
    pub ts_ns:    u64,
    pub freq:     u32,
    // 0 = NO DRIVER CALL THIS TICK
    pub target:   u32,
    pub rq_avg:   u32,
    pub online:   u32,
    pub max_load: u32,
    pub decision: HotplugDecision,
}

const EMPTY: Snapshot = Snapshot {
    ts_ns: 0,
    freq: 0,
    target: 0,
    rq_avg: 0,
    online: 0,
    max_load: 0,
    decision: HotplugDecision::Stay,
};

pub struct EventLog {
    snapshots: Vec<Snapshot>,
    head:      usize,
    len:       usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            snapshots: vec![EMPTY; MAX_SNAPSHOTS],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    // OVERWRITES OLDEST ENTRY WHEN FULL
    pub fn record(&mut self, snap: Snapshot) {
        self.snapshots[self.head] = snap;
        self.head = (self.head + 1) % MAX_SNAPSHOTS;
        if self.len < MAX_SNAPSHOTS {
            self.len += 1;
        }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        if self.len == 0 {
            return None;
        }
        Some(&self.snapshots[(self.head + MAX_SNAPSHOTS - 1) % MAX_SNAPSHOTS])
    }

    // DEFERRED HOTPLUG DECISIONS LAND AFTER THE TICK THAT TRIGGERED THEM
    pub fn mark_latest(&mut self, decision: HotplugDecision) {
        if self.len == 0 {
            return;
        }
        let i = (self.head + MAX_SNAPSHOTS - 1) % MAX_SNAPSHOTS;
        self.snapshots[i].decision = decision;
    }

    // OLDEST TO NEWEST, ACROSS THE WRAP POINT
    pub fn iter_chronological(&self) -> impl Iterator<Item = &Snapshot> {
        let start = if self.len < MAX_SNAPSHOTS { 0 } else { self.head };
        (0..self.len).map(move |i| {
            &self.snapshots[(start + i) % MAX_SNAPSHOTS]
        })
    }

    // ONE LINE PER TICK, OLDEST FIRST
    pub fn dump(&self) {
        let mut iter = self.iter_chronological();
        let first = match iter.next() {
            Some(s) => s,
            None => return,
        };
        let base_ts = first.ts_ns;

        println!("\n{:<10} {:<10} {:<10} {:<8} {:<8} {:<8} {:<6}",
            "TIME_S", "FREQ", "TARGET", "RQ", "ONLINE", "LOAD", "HP");
        println!("{}", "-".repeat(66));

        for s in std::iter::once(first).chain(iter) {
            let elapsed_s = s.ts_ns.saturating_sub(base_ts) as f64 / 1_000_000_000.0;
            let target = if s.target == 0 { "-".to_string() } else { s.target.to_string() };
            println!("{:<10.2} {:<10} {:<10} {:<8} {:<8} {:<8} {:<6}",
                elapsed_s, s.freq, target, s.rq_avg, s.online, s.max_load, s.decision.label());
        }

        if self.len == MAX_SNAPSHOTS {
            println!("\n(RING BUFFER WRAPPED -- SHOWING MOST RECENT {} SNAPSHOTS)", MAX_SNAPSHOTS);
        }
        println!("TOTAL SNAPSHOTS: {}", self.len);
    }

    // FREQUENCY AND HOTPLUG TOTALS OVER THE RETAINED TICKS
    pub fn summary(&self) {
        if self.len < 2 {
            return;
        }

        let snapshots: Vec<&Snapshot> = self.iter_chronological().collect();
        let (first, last) = (snapshots[0], snapshots[snapshots.len() - 1]);

        let freq_changes = snapshots.iter().filter(|s| s.target != 0).count();
        let ups = snapshots.iter().filter(|s| s.decision == HotplugDecision::Up).count();
        let downs = snapshots.iter().filter(|s| s.decision == HotplugDecision::Down).count();
        let peak_freq = snapshots.iter().map(|s| s.freq).max().unwrap_or(0);
        let avg_freq = snapshots.iter().map(|s| s.freq as u64).sum::<u64>() / snapshots.len() as u64;
        let avg_online = snapshots.iter().map(|s| s.online as f64).sum::<f64>() / snapshots.len() as f64;
        let peak_rq = snapshots.iter().map(|s| s.rq_avg).max().unwrap_or(0);

        let elapsed_s = last.ts_ns.saturating_sub(first.ts_ns) as f64 / 1_000_000_000.0;

        println!("\n{}", "=".repeat(50));
        println!("PEGASUSQ SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  TICKS:             {}", self.len);
        println!("  FREQ REQUESTS:     {}", freq_changes);
        println!("  AVG FREQ:          {} KHZ", avg_freq);
        println!("  PEAK FREQ:         {} KHZ", peak_freq);
        println!("  PEAK RQ AVG:       {}", peak_rq);
        println!("  HOTPLUG IN/OUT:    {} / {}", ups, downs);
        println!("  AVG ONLINE:        {:.2}", avg_online);
        println!("  ELAPSED:           {:.1}s", elapsed_s);
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
