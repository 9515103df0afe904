// PEGASUSQ PLATFORM BOUNDARY
// EVERYTHING THE GOVERNOR NEEDS FROM THE OS: HOTPLUG, DVFS, CPU TIME ACCOUNTING.
// THE CONTROL LOGIC NEVER TOUCHES SYSFS DIRECTLY. sysfs.rs IMPLEMENTS THIS
// FOR LINUX, TESTS IMPLEMENT IT IN MEMORY.
//
// FREQUENCIES ARE kHz (CPUFREQ UNITS). CPU TIMES ARE CUMULATIVE MICROSECONDS.

use crate::error::Result;

// DRIVER TARGET RELATION
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    // LOWEST SUPPORTED FREQUENCY AT OR ABOVE TARGET
    AtOrAbove,
    // HIGHEST SUPPORTED FREQUENCY AT OR BELOW TARGET
    AtOrBelow,
}

// CUMULATIVE IDLE TIME AND THE WALL CLOCK IT WAS SAMPLED AT
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdleTime {
    pub idle_us: u64,
    pub wall_us: u64,
}

// POWER-STATE NOTIFICATIONS DELIVERED BY THE HOST
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerEvent {
    EarlySuspend,
    LateResume,
    SuspendPrepare,
    PostSuspend,
    Reboot,
}

pub trait Platform: Send + Sync {
    // TOPOLOGY
    fn cpu_online(&self, cpu: usize) -> bool;
    fn num_online_cpus(&self) -> usize;
    fn num_possible_cpus(&self) -> usize;

    // HOTPLUG (BLOCKING)
    fn cpu_up(&self, cpu: usize) -> Result<()>;
    fn cpu_down(&self, cpu: usize) -> Result<()>;

    // ACCOUNTING
    fn idle_time(&self, cpu: usize) -> IdleTime;
    fn iowait_time(&self, cpu: usize) -> u64;
    fn nice_time(&self, cpu: usize) -> u64;
    fn runnable_tasks(&self) -> u64;

    // DVFS (set_frequency IS BLOCKING)
    fn set_frequency(&self, policy: usize, target_khz: u32, relation: Relation) -> Result<()>;
    fn current_frequency(&self, policy: usize) -> u32;
    fn policy_min(&self, policy: usize) -> u32;
    fn policy_max(&self, policy: usize) -> u32;

    // CPUS SHARING THE POLICY'S CLOCK
    fn policy_cpus(&self, policy: usize) -> Vec<usize> {
        vec![policy]
    }

    // DRIVER-REPORTED AVERAGE FREQUENCY OVER THE LAST INTERVAL, IF THE DRIVER KEEPS ONE
    fn average_frequency(&self, _policy: usize, _cpu: usize) -> Option<u32> {
        None
    }

    // MONOTONIC CLOCK
    fn now_ns(&self) -> u64;
}
