// PEGASUSQ HOTPLUG ACTUATOR
// ONE WORKER THREAD OWNS EVERY ONLINE/OFFLINE CHANGE ("CPU 0'S QUEUE").
// QUEUEING WORK THAT IS ALREADY PENDING IS A NO-OP, SO REQUESTS COALESCE BUT
// ARE NEVER DROPPED AND NEVER RUN CONCURRENTLY.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;

use log::{info, warn};

use crate::hotplug::HotplugLock;
use crate::platform::Platform;
use crate::tunables::TunableStore;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HotplugWork {
    Up,
    Down,
    // RUN THE DEFERRED (SLP) STRATEGY ON THE LATEST HISTORY
    Evaluate,
}

pub trait WorkHandler: Send + Sync {
    fn run(&self, work: HotplugWork);
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<HotplugWork>,
    running: bool,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    idle: Condvar,
}

pub struct HotplugActuator {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HotplugActuator {
    pub fn spawn(handler: Weak<dyn WorkHandler>) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
            idle: Condvar::new(),
        });
        let s = shared.clone();

        let handle = std::thread::Builder::new()
            .name("pegasusq-hotplug".to_string())
            .spawn(move || worker(s, handler))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    // queue_work SEMANTICS: ALREADY PENDING -> NOTHING TO DO
    pub fn queue(&self, work: HotplugWork) -> bool {
        let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        if q.shutdown || q.pending.contains(&work) {
            return false;
        }
        q.pending.push_back(work);
        self.shared.wake.notify_one();
        true
    }

    // WAIT UNTIL THE QUEUE IS EMPTY AND NOTHING IS IN FLIGHT
    pub fn flush(&self) {
        let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        while !q.shutdown && (q.running || !q.pending.is_empty()) {
            q = self.shared.idle.wait(q).unwrap_or_else(|e| e.into_inner());
        }
    }

    // DROP PENDING WORK AND WAIT FOR THE IN-FLIGHT ITEM (cancel_work_sync)
    pub fn cancel_pending(&self) {
        let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        q.pending.clear();
        while q.running {
            q = self.shared.idle.wait(q).unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn shutdown(&self) {
        {
            let mut q = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
            q.shutdown = true;
            q.pending.clear();
            self.shared.wake.notify_all();
            self.shared.idle.notify_all();
        }
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(h) = handle {
            if h.thread().id() != std::thread::current().id() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for HotplugActuator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(shared: Arc<Shared>, handler: Weak<dyn WorkHandler>) {
    loop {
        let work = {
            let mut q = shared.queue.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if q.shutdown {
                    return;
                }
                if let Some(w) = q.pending.pop_front() {
                    q.running = true;
                    break w;
                }
                q = shared.wake.wait(q).unwrap_or_else(|e| e.into_inner());
            }
        };

        if let Some(h) = handler.upgrade() {
            h.run(work);
        }

        let mut q = shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        q.running = false;
        if q.pending.is_empty() {
            shared.idle.notify_all();
        }
    }
}

// --- UP / DOWN WORK ---

// HOW MANY CORES THE UP WORK SHOULD BRING ONLINE
pub fn nr_up(tunables: &TunableStore, lock: usize, online: usize) -> usize {
    let min_lock = tunables.min_cpu_lock();
    if lock != 0 && min_lock != 0 {
        lock.max(min_lock).saturating_sub(online)
    } else if lock != 0 {
        lock.saturating_sub(online)
    } else if min_lock != 0 {
        tunables.up_nr_cpus().max(min_lock.saturating_sub(online))
    } else {
        tunables.up_nr_cpus()
    }
}

// HOW MANY CORES THE DOWN WORK SHOULD TAKE OFFLINE
pub fn nr_down(lock: usize, online: usize) -> usize {
    if lock != 0 {
        online.saturating_sub(lock)
    } else {
        1
    }
}

// BRING OFFLINE CPUS UP IN ASCENDING ORDER. CPU 0 IS NEVER TOUCHED.
// FAILURES ARE LOGGED AND LEFT FOR THE NEXT DECISION TO RETRY.
pub fn cpu_up_work(platform: &dyn Platform, tunables: &TunableStore, lock: &HotplugLock) -> usize {
    let online = platform.num_online_cpus();
    let mut remaining = nr_up(tunables, lock.get(), online);
    let mut brought = 0;

    for cpu in 1..platform.num_possible_cpus() {
        if remaining == 0 {
            break;
        }
        if platform.cpu_online(cpu) {
            continue;
        }
        remaining -= 1;
        match platform.cpu_up(cpu) {
            Ok(()) => {
                info!("CPU_UP {}", cpu);
                brought += 1;
            }
            Err(e) => warn!("CPU_UP {} FAILED: {}", cpu, e),
        }
    }
    brought
}

// TAKE ONLINE CPUS DOWN IN ASCENDING ORDER. CPU 0 IS NEVER TOUCHED.
pub fn cpu_down_work(platform: &dyn Platform, lock: &HotplugLock) -> usize {
    let online = platform.num_online_cpus();
    let mut remaining = nr_down(lock.get(), online);
    let mut taken = 0;

    for cpu in 1..platform.num_possible_cpus() {
        if remaining == 0 {
            break;
        }
        if !platform.cpu_online(cpu) {
            continue;
        }
        remaining -= 1;
        match platform.cpu_down(cpu) {
            Ok(()) => {
                info!("CPU_DOWN {}", cpu);
                taken += 1;
            }
            Err(e) => warn!("CPU_DOWN {} FAILED: {}", cpu, e),
        }
    }
    taken
}
