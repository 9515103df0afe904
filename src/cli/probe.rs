use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;

use pegasusq::load::PerCpuState;
use pegasusq::sysfs::SysfsPlatform;
use pegasusq::Platform;

static RUNNING: AtomicBool = AtomicBool::new(true);

// ONE LINE PER INTERVAL: cpu0 cpu1 ... rq
// OFFLINE CPUS PRINT "-", A SKIPPED SAMPLE PRINTS "?"
pub fn run_probe(interval: Duration) -> Result<()> {
    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::Relaxed);
    })
    .ok();

    let platform = SysfsPlatform::new()?;
    let mut cpus: Vec<PerCpuState> = (0..platform.num_possible_cpus())
        .map(|cpu| PerCpuState::new(&platform, cpu))
        .collect();

    let header: Vec<String> = (0..cpus.len()).map(|c| format!("CPU{}", c)).collect();
    println!("{}  RQ  FREQ", header.join("  "));

    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(interval);

        let cols: Vec<String> = cpus
            .iter_mut()
            .map(|s| {
                if !platform.cpu_online(s.cpu) {
                    s.baselined = false;
                    return format!("{:>4}", "-");
                }
                if !s.baselined {
                    s.rebaseline(&platform);
                    return format!("{:>4}", "?");
                }
                match s.sample(&platform, false, false) {
                    Some(load) => format!("{:>4}", load),
                    None => format!("{:>4}", "?"),
                }
            })
            .collect();
        println!("{}  {:>2}  {}", cols.join("  "), platform.runnable_tasks(),
                 platform.current_frequency(0));
    }
    Ok(())
}
