use std::io::Read;
use std::path::Path;

use anyhow::Result;

use pegasusq::sysfs::{parse_cpu_range, SysfsPlatform};
use pegasusq::Platform;

const REQUIRED_CONFIG: [&str; 2] = ["CONFIG_HOTPLUG_CPU=y", "CONFIG_CPU_FREQ_GOV_USERSPACE=y"];

fn check_kernel_config() -> bool {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (SKIPPED)");
            return true;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (SKIPPED)");
        return true;
    }

    let mut ok = true;
    for opt in REQUIRED_CONFIG {
        let name = opt.trim_end_matches("=y");
        if config.lines().any(|l| l.trim() == opt) {
            println!("  {:<32}OK", name);
        } else {
            println!("  {:<32}NOT SET", name);
            ok = false;
        }
    }
    ok
}

fn check_path(label: &str, path: &str) -> bool {
    if Path::new(path).exists() {
        println!("  {:<32}OK", label);
        true
    } else {
        println!("  {:<32}MISSING ({})", label, path);
        false
    }
}

pub fn run_check() -> Result<()> {
    println!("PEGASUSQ ENVIRONMENT CHECK");
    println!();

    let mut ok = true;

    println!("KERNEL CONFIG:");
    if !check_kernel_config() {
        ok = false;
    }
    println!();

    println!("SYSFS:");
    ok &= check_path("cpu/possible", "/sys/devices/system/cpu/possible");
    ok &= check_path("cpu0/cpufreq", "/sys/devices/system/cpu/cpu0/cpufreq");
    ok &= check_path("/proc/stat", "/proc/stat");
    let hotplug = std::fs::read_to_string("/sys/devices/system/cpu/possible")
        .map(|s| parse_cpu_range(&s))
        .unwrap_or(0);
    if hotplug > 1 {
        ok &= check_path("cpu1/online", "/sys/devices/system/cpu/cpu1/online");
    }
    println!();

    match SysfsPlatform::new() {
        Ok(p) => {
            let gov = p.scaling_governor(0).unwrap_or_default();
            println!("  CPUS                            {} possible, {} online",
                     p.num_possible_cpus(), p.num_online_cpus());
            println!("  FREQUENCY                       {} kHz ({}..{})",
                     p.current_frequency(0), p.policy_min(0), p.policy_max(0));
            if gov == "userspace" {
                println!("  scaling_governor                userspace");
            } else {
                println!("  scaling_governor                {} (NEEDS userspace)",
                         if gov.is_empty() { "unknown" } else { &gov });
                ok = false;
            }
            let table = p.available_frequencies(0);
            if table.is_empty() {
                println!("  available frequencies           NONE LISTED (TARGETS PASS THROUGH)");
            } else {
                println!("  available frequencies           {:?}", table);
            }
        }
        Err(e) => {
            println!("  PLATFORM                        UNAVAILABLE ({})", e);
            ok = false;
        }
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        println!("  Select the userspace governor:");
        println!("    echo userspace | sudo tee /sys/devices/system/cpu/cpu*/cpufreq/scaling_governor");
        std::process::exit(1);
    }

    Ok(())
}
