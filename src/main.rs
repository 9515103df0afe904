// PEGASUSQ -- CPU FREQUENCY AND HOTPLUG GOVERNOR
// USERSPACE DRIVER FOR THE pegasusq CONTROL LOOP
//
// FREQUENCY REQUESTS GO THROUGH scaling_setspeed (userspace CPUFREQ GOVERNOR),
// HOTPLUG THROUGH cpuN/online. NEEDS ROOT.

mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use pegasusq::sysfs::SysfsPlatform;
use pegasusq::{Governor, Platform, PowerEvent};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);
static SUSPEND: AtomicBool = AtomicBool::new(false);
static RESUME: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "pegasusq")]
#[command(about = "PEGASUSQ -- CPU FREQUENCY AND HOTPLUG GOVERNOR")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Command {
    // RUN THE GOVERNOR (DEFAULT)
    Run(RunArgs),
    // CHECK KERNEL CONFIG AND SYSFS
    Check,
    // PRINT PER-CPU LOAD ONCE PER INTERVAL
    Probe {
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    // SAMPLING PERIOD IN MICROSECONDS
    #[arg(long)]
    sampling_rate: Option<u32>,

    // LOAD PERCENT ABOVE WHICH FREQUENCY RAMPS UP (11-100)
    #[arg(long)]
    up_threshold: Option<u32>,

    // RAMP-UP STEP AS PERCENT OF MAX FREQUENCY
    #[arg(long)]
    freq_step: Option<u32>,

    // HOTPLUG POLICY: android OR slp
    #[arg(long)]
    policy: Option<String>,

    // ANY TUNABLE, name=value (REPEATABLE)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    // DEBUG LOGGING AND PER-SECOND TELEMETRY
    #[arg(long)]
    verbose: bool,

    // DUMP FULL EVENT LOG ON EXIT
    #[arg(long)]
    dump_log: bool,

    // EXIT AFTER N SECONDS
    #[arg(long)]
    duration: Option<u64>,
}

extern "C" fn on_power_signal(sig: libc::c_int) {
    if sig == libc::SIGUSR1 {
        SUSPEND.store(true, Ordering::Relaxed);
    } else if sig == libc::SIGUSR2 {
        RESUME.store(true, Ordering::Relaxed);
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let loglevel = if verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        loglevel,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )?;
    Ok(())
}

// FLAGS FIRST, THEN --set IN ORDER
fn tunable_writes(args: &RunArgs) -> Result<Vec<(String, String)>> {
    let mut writes = Vec::new();
    if let Some(v) = args.sampling_rate {
        writes.push(("sampling_rate".to_string(), v.to_string()));
    }
    if let Some(v) = args.up_threshold {
        writes.push(("up_threshold".to_string(), v.to_string()));
    }
    if let Some(v) = args.freq_step {
        writes.push(("freq_step".to_string(), v.to_string()));
    }
    if let Some(p) = &args.policy {
        writes.push(("hotplug_policy".to_string(), p.clone()));
    }
    for kv in &args.set {
        let (name, value) = match kv.split_once('=') {
            Some(pair) => pair,
            None => bail!("--set EXPECTS name=value, GOT {:?}", kv),
        };
        writes.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(writes)
}

// ONE GOVERNOR INSTANCE PER CPUFREQ POLICY (FIRST ONLINE CPU OF EACH CLOCK DOMAIN)
fn start_policies(governor: &Governor, platform: &dyn Platform) -> Result<Vec<usize>> {
    let mut covered = vec![false; platform.num_possible_cpus()];
    let mut started = Vec::new();
    for cpu in 0..platform.num_possible_cpus() {
        if covered[cpu] || !platform.cpu_online(cpu) {
            continue;
        }
        for c in platform.policy_cpus(cpu) {
            if let Some(slot) = covered.get_mut(c) {
                *slot = true;
            }
        }
        match governor.start(cpu) {
            Ok(()) => started.push(cpu),
            Err(e) => warn!("POLICY {} NOT STARTED: {}", cpu, e),
        }
    }
    if started.is_empty() {
        bail!("NO CPUFREQ POLICY COULD BE STARTED");
    }
    Ok(started)
}

fn run(args: RunArgs) -> Result<()> {
    init_logging(args.verbose)?;

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })
    .context("Error setting Ctrl-C handler")?;
    unsafe {
        libc::signal(libc::SIGUSR1, on_power_signal as libc::sighandler_t);
        libc::signal(libc::SIGUSR2, on_power_signal as libc::sighandler_t);
    }

    let sysfs = Arc::new(SysfsPlatform::new()?);
    let scaling_governor = sysfs.scaling_governor(0).unwrap_or_default();
    if scaling_governor != "userspace" {
        warn!("SCALING GOVERNOR IS {:?}, NOT userspace: FREQUENCY REQUESTS WILL FAIL",
              scaling_governor);
    }
    let platform: Arc<dyn Platform> = sysfs.clone();

    let writes = tunable_writes(&args)?;
    let governor = Governor::new(platform.clone())?;
    let policies = start_policies(&governor, &*platform)?;
    for (name, value) in &writes {
        governor
            .store_tunable(name, value)
            .with_context(|| format!("{} = {}", name, value))?;
    }

    println!("PEGASUSQ");
    println!("CPUS:            {} possible, {} online",
             platform.num_possible_cpus(), platform.num_online_cpus());
    println!("POLICIES:        {:?}", policies);
    println!("SCALING GOV:     {}",
             if scaling_governor.is_empty() { "unknown" } else { &scaling_governor });
    println!("HOTPLUG POLICY:  {}", governor.show_tunable("hotplug_policy")?);
    println!("SAMPLING RATE:   {} us", governor.show_tunable("sampling_rate")?);
    println!("UP THRESHOLD:    {}", governor.show_tunable("up_threshold")?);
    println!("FREQ:            {}..{} kHz",
             governor.show_tunable("min_freq")?, governor.show_tunable("max_freq")?);
    println!();
    println!("PEGASUSQ IS ACTIVE (CTRL+C TO EXIT, SIGUSR1 SUSPEND, SIGUSR2 RESUME)");

    let started = Instant::now();
    let mut last_report = Instant::now();
    while !SHUTDOWN.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if SUSPEND.swap(false, Ordering::Relaxed) {
            governor.power_event(PowerEvent::EarlySuspend);
        }
        if RESUME.swap(false, Ordering::Relaxed) {
            governor.power_event(PowerEvent::LateResume);
        }

        if args.verbose && last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            if let Some(s) = governor.last_event() {
                println!("FREQ {:>8}  RQ {:>5}  ONLINE {}  LOAD {:>3}  LOCK {}",
                         s.freq, s.rq_avg, s.online, s.max_load, governor.hotplug_lock());
            }
        }

        if let Some(secs) = args.duration {
            if started.elapsed() >= Duration::from_secs(secs) {
                break;
            }
        }
    }

    println!("PEGASUSQ IS SHUTTING DOWN");
    governor.shutdown();
    info!("{} TICKS RECORDED", governor.event_count());

    if args.dump_log {
        governor.dump_log();
    }
    governor.summary();
    println!("PEGASUSQ OUT.");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => run(cli.run),
        Some(Command::Run(args)) => run(args),
        Some(Command::Check) => cli::check::run_check(),
        Some(Command::Probe { interval_ms }) => cli::probe::run_probe(Duration::from_millis(interval_ms)),
    }
}
