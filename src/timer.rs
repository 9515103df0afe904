// PEGASUSQ DELAYED WORK
// A SELF-REQUEUEING PERIODIC TASK ON ITS OWN WORKER THREAD.
// THE CLOSURE RETURNS THE NEXT DELAY, OR None TO STOP.
// cancel_sync() WAKES THE WORKER AND JOINS IT: ONCE IT RETURNS, NO RUN IS IN
// FLIGHT AND NONE WILL START.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct Cancel {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

pub struct DelayedWork {
    cancel: Arc<Cancel>,
    handle: Option<JoinHandle<()>>,
}

impl DelayedWork {
    pub fn spawn<F>(name: &str, first: Duration, mut work: F) -> std::io::Result<Self>
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let cancel = Arc::new(Cancel {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        });
        let c = cancel.clone();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut delay = first;
                loop {
                    let deadline = Instant::now() + delay;
                    let mut cancelled = c.cancelled.lock().unwrap_or_else(|e| e.into_inner());
                    while !*cancelled {
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        cancelled = c.wake.wait_timeout(cancelled, deadline - now)
                            .unwrap_or_else(|e| e.into_inner())
                            .0;
                    }
                    if *cancelled {
                        return;
                    }
                    drop(cancelled);

                    match work() {
                        Some(next) => delay = next,
                        None => return,
                    }
                }
            })?;

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    pub fn cancel_sync(mut self) {
        self.cancel_inner();
    }

    fn cancel_inner(&mut self) {
        *self.cancel.cancelled.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.cancel.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            // CANCELLED FROM INSIDE OUR OWN RUN: THE LOOP EXITS ON RETURN
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for DelayedWork {
    fn drop(&mut self) {
        self.cancel_inner();
    }
}
