// PEGASUSQ GOVERNOR TESTS
// CALLER-DRIVEN GOVERNOR ON AN IN-MEMORY PLATFORM: EVERY TICK IS EXPLICIT,
// HOTPLUG WORK RUNS INLINE.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakePlatform, MAX_KHZ};
use pegasusq::hotplug::HotplugDecision;
use pegasusq::tunables::HotplugPolicyKind;
use pegasusq::{Governor, GovernorError, Platform, PowerEvent, Relation};

const TICK_US: u64 = 50_000;

fn governor(possible: usize, online: usize) -> (Arc<FakePlatform>, Governor) {
    let p = FakePlatform::new(possible, online);
    let g = Governor::manual(p.clone());
    (p, g)
}

fn tick_at(p: &FakePlatform, g: &Governor, busy_pct: u64) -> Duration {
    p.advance(TICK_US, busy_pct);
    g.tick(0).unwrap()
}

// === LIFECYCLE ===

#[test]
fn start_rejects_offline_cpu() {
    let (_p, g) = governor(4, 1);
    assert!(matches!(g.start(2), Err(GovernorError::CpuOffline(2))));
    assert!(g.running_policies().is_empty());
}

#[test]
fn start_rejects_zero_frequency() {
    let (p, g) = governor(4, 1);
    p.state().cur = 0;
    assert!(matches!(g.start(0), Err(GovernorError::NoFrequency(0))));
}

#[test]
fn double_start_and_stray_stop() {
    let (_p, g) = governor(4, 1);
    g.start(0).unwrap();
    assert!(matches!(g.start(0), Err(GovernorError::AlreadyRunning(0))));
    g.stop(0).unwrap();
    assert!(matches!(g.stop(0), Err(GovernorError::NotRunning(0))));
    assert!(matches!(g.tick(0), Err(GovernorError::NotRunning(0))));
}

#[test]
fn start_caches_bounds_and_registers_notifiers() {
    let (_p, g) = governor(4, 1);
    assert!(!g.notifiers_registered());
    g.start(0).unwrap();
    assert_eq!(g.show_tunable("max_freq").unwrap(), MAX_KHZ.to_string());
    assert_eq!(g.show_tunable("min_freq").unwrap(), "200000");
    assert!(g.notifiers_registered());
    assert_eq!(g.rate_mult(0), Some(1));
    g.stop(0).unwrap();
    assert!(!g.notifiers_registered());
}

// === DVFS THROUGH THE TICK ===

#[test]
fn busy_tick_steps_frequency_up() {
    let (p, g) = governor(4, 1);
    g.start(0).unwrap();

    // 90% AT 400MHZ -> 400_000 + 40% OF 1GHZ
    tick_at(&p, &g, 90);
    assert_eq!(p.last_set(), Some((800_000, Relation::AtOrAbove)));
    assert_eq!(p.state().cur, 800_000);
    assert_eq!(g.event_count(), 1);
    assert_eq!(g.last_event().unwrap().target, 800_000);
}

#[test]
fn pinned_at_max_slows_sampling() {
    let (p, g) = governor(4, 1);
    p.state().cur = 800_000;
    g.start(0).unwrap();

    let delay = tick_at(&p, &g, 95);
    assert_eq!(p.state().cur, MAX_KHZ);
    assert_eq!(g.rate_mult(0), Some(2));
    assert_eq!(delay, Duration::from_micros(2 * TICK_US));

    // ALREADY AT MAX: NO FURTHER DRIVER CALL
    let calls = p.state().set_calls.len();
    tick_at(&p, &g, 95);
    assert_eq!(p.state().set_calls.len(), calls);
}

#[test]
fn ramp_down_resets_multiplier() {
    let (p, g) = governor(4, 1);
    p.state().cur = 800_000;
    g.start(0).unwrap();
    tick_at(&p, &g, 95);
    assert_eq!(g.rate_mult(0), Some(2));

    // 10% AT 1GHZ -> 125_000, FLOORED TO 200_000, THEN THE 500MHZ RESPONSIVENESS CLAMP
    tick_at(&p, &g, 10);
    assert_eq!(g.rate_mult(0), Some(1));
    assert_eq!(p.last_set(), Some((500_000, Relation::AtOrAbove)));
}

#[test]
fn ramp_down_to_current_skips_driver_but_resets_multiplier() {
    let (p, g) = governor(4, 1);
    p.state().cur = 800_000;
    g.start(0).unwrap();
    tick_at(&p, &g, 95);
    assert_eq!(g.rate_mult(0), Some(2));

    // POLICY MIN RAISED TO CUR: RAMP-DOWN TARGET == CUR
    p.state().min = MAX_KHZ;
    g.update_limits(0).unwrap();
    let calls = p.state().set_calls.len();
    tick_at(&p, &g, 10);
    assert_eq!(g.rate_mult(0), Some(1));
    assert_eq!(p.state().set_calls.len(), calls);
}

#[test]
fn sampling_down_factor_store_resets_multiplier() {
    let (p, g) = governor(4, 1);
    p.state().cur = 800_000;
    g.start(0).unwrap();
    tick_at(&p, &g, 95);
    assert_eq!(g.rate_mult(0), Some(2));

    g.store_tunable("sampling_down_factor", "5").unwrap();
    assert_eq!(g.rate_mult(0), Some(1));
}

#[test]
fn skipped_sample_reports_no_load() {
    let (p, g) = governor(4, 1);
    g.start(0).unwrap();
    // NO TIME PASSES: wall_delta == 0, NOTHING CONTRIBUTES TO max_load_freq
    g.tick(0).unwrap();
    assert_eq!(g.last_event().unwrap().max_load, 0);
    assert_eq!(p.last_set(), Some((200_000, Relation::AtOrAbove)));
}

#[test]
fn average_frequency_feeds_load() {
    let (p, g) = governor(4, 1);
    p.state().cur = 800_000;
    // DRIVER SAYS THE INTERVAL AVERAGED 400MHZ: 90% OF THAT IS BELOW 85% OF 800MHZ
    p.state().avg = Some(400_000);
    g.start(0).unwrap();
    tick_at(&p, &g, 90);
    let (target, _) = p.last_set().unwrap();
    assert!(target < 800_000, "target {}", target);
}

#[test]
fn limits_force_frequency_into_bounds() {
    let (p, g) = governor(4, 1);
    p.state().cur = 800_000;
    g.start(0).unwrap();

    p.state().max = 600_000;
    g.update_limits(0).unwrap();
    assert_eq!(p.last_set(), Some((600_000, Relation::AtOrBelow)));
    assert_eq!(g.show_tunable("max_freq").unwrap(), "600000");

    p.state().min = 700_000;
    p.state().max = MAX_KHZ;
    g.update_limits(0).unwrap();
    assert_eq!(p.last_set(), Some((700_000, Relation::AtOrAbove)));

    assert!(matches!(g.update_limits(3), Err(GovernorError::NotRunning(3))));
}

// === CONFIGURATION SURFACE ===

#[test]
fn rejected_writes_change_nothing() {
    let (_p, g) = governor(4, 1);
    g.start(0).unwrap();

    assert!(matches!(g.store_tunable("up_threshold", "5"), Err(GovernorError::InvalidValue { .. })));
    assert!(matches!(g.store_tunable("up_threshold", "101"), Err(GovernorError::InvalidValue { .. })));
    assert_eq!(g.show_tunable("up_threshold").unwrap(), "85");

    assert!(matches!(g.store_tunable("sampling_down_factor", "0"), Err(GovernorError::InvalidValue { .. })));
    assert_eq!(g.show_tunable("sampling_down_factor").unwrap(), "2");

    assert!(matches!(g.store_tunable("freq_step", "abc"), Err(GovernorError::Parse { .. })));
    assert_eq!(g.show_tunable("freq_step").unwrap(), "40");

    assert!(matches!(g.store_tunable("no_such_knob", "1"), Err(GovernorError::UnknownTunable(_))));
    assert!(matches!(g.store_tunable("max_freq", "1"), Err(GovernorError::ReadOnly(_))));
    assert!(matches!(g.store_tunable("online_cpus", "2"), Err(GovernorError::ReadOnly(_))));
    assert!(matches!(g.store_tunable("hotplug_policy", "fast"), Err(GovernorError::Parse { .. })));
}

#[test]
fn clamps_apply_on_store() {
    let (_p, g) = governor(4, 1);
    g.start(0).unwrap();

    g.store_tunable("sampling_rate", "1000").unwrap();
    assert_eq!(g.show_tunable("sampling_rate").unwrap(), "10000");
    g.store_tunable("freq_step", "250").unwrap();
    assert_eq!(g.show_tunable("freq_step").unwrap(), "100");
    g.store_tunable("cpu_up_rate", "90").unwrap();
    assert_eq!(g.show_tunable("cpu_up_rate").unwrap(), "40");
    g.store_tunable("cpu_up_freq", "5000000").unwrap();
    assert_eq!(g.show_tunable("cpu_up_freq").unwrap(), MAX_KHZ.to_string());
    g.store_tunable("cpu_down_freq", "1").unwrap();
    assert_eq!(g.show_tunable("cpu_down_freq").unwrap(), "200000");
    g.store_tunable("max_cpu_lock", "16").unwrap();
    assert_eq!(g.show_tunable("max_cpu_lock").unwrap(), "4");
    g.store_tunable("hotplug_rq_2_1", "250").unwrap();
    assert_eq!(g.show_tunable("hotplug_rq_2_1").unwrap(), "250");
    assert_eq!(g.show_tunable("online_cpus").unwrap(), "1");
}

#[test]
fn ignore_nice_rebaselines() {
    let (p, g) = governor(4, 1);
    g.start(0).unwrap();
    p.advance(TICK_US, 90);
    g.store_tunable("ignore_nice_load", "1").unwrap();
    assert_eq!(g.show_tunable("ignore_nice_load").unwrap(), "1");
    // THE 90% INTERVAL WAS ABSORBED BY THE NEW BASELINE
    g.tick(0).unwrap();
    assert_eq!(g.last_event().unwrap().max_load, 0);
}

// === HOTPLUG LOCK ===

#[test]
fn hotplug_lock_store_moves_online_count() {
    let (p, g) = governor(4, 1);
    g.start(0).unwrap();

    g.store_tunable("hotplug_lock", "3").unwrap();
    assert_eq!(g.hotplug_lock(), 3);
    assert_eq!(p.online_count(), 3);

    g.store_tunable("hotplug_lock", "1").unwrap();
    assert_eq!(g.hotplug_lock(), 1);
    assert_eq!(p.online_count(), 1);

    g.store_tunable("hotplug_lock", "0").unwrap();
    assert_eq!(g.hotplug_lock(), 0);
    assert_eq!(g.show_tunable("hotplug_lock").unwrap(), "0");
}

#[test]
fn conflicting_lock_is_rejected() {
    let (_p, g) = governor(4, 1);
    g.start(0).unwrap();
    g.cpu_lock(1).unwrap();

    let err = g.store_tunable("hotplug_lock", "3").unwrap_err();
    assert!(matches!(err, GovernorError::LockConflict { held: 1, requested: 3 }));
    assert_eq!(g.hotplug_lock(), 1);
    assert_eq!(g.show_tunable("hotplug_lock").unwrap(), "0");

    g.cpu_unlock(1);
    assert_eq!(g.hotplug_lock(), 0);
}

#[test]
fn min_cpu_lock_store_brings_cores_up() {
    let (p, g) = governor(4, 1);
    g.start(0).unwrap();
    g.store_tunable("min_cpu_lock", "3").unwrap();
    assert_eq!(p.online_count(), 3);
    assert_eq!(g.show_tunable("min_cpu_lock").unwrap(), "3");
}

#[test]
fn locked_governor_never_hotplugs_from_history() {
    let (p, g) = governor(4, 1);
    p.state().cur = 600_000;
    p.state().runnable = 4;
    g.start(0).unwrap();
    g.store_tunable("cpu_up_rate", "1").unwrap();
    g.cpu_lock(1).unwrap();

    for _ in 0..5 {
        g.sample_runqueue();
        tick_at(&p, &g, 84);
    }
    assert_eq!(p.online_count(), 1);
    assert!(p.state().ups.is_empty());
}

// === ANDROID HOTPLUG THROUGH THE TICK ===

#[test]
fn sustained_load_brings_core_up_on_window_boundary() {
    let (p, g) = governor(4, 1);
    // 84% AT 600MHZ SITS IN THE DVFS HOLD BAND
    p.state().cur = 600_000;
    p.state().runnable = 3;
    g.start(0).unwrap();
    g.store_tunable("cpu_up_rate", "2").unwrap();

    g.sample_runqueue();
    tick_at(&p, &g, 84);
    assert_eq!(p.online_count(), 1);
    assert_eq!(g.history_len(), 1);

    g.sample_runqueue();
    tick_at(&p, &g, 84);
    assert_eq!(p.online_count(), 2);
    assert_eq!(g.history_len(), 0);
    assert_eq!(g.last_event().unwrap().decision, HotplugDecision::Up);
    assert_eq!(g.last_event().unwrap().rq_avg, 300);
}

#[test]
fn history_wraps_at_longest_window() {
    let (p, g) = governor(4, 1);
    p.state().cur = 600_000;
    g.start(0).unwrap();
    g.store_tunable("cpu_up_rate", "2").unwrap();
    g.store_tunable("cpu_down_rate", "3").unwrap();

    // NO RUN-QUEUE PRESSURE: NEVER FIRES
    for _ in 0..3 {
        tick_at(&p, &g, 84);
    }
    assert_eq!(g.history_len(), 0);
    tick_at(&p, &g, 84);
    assert_eq!(g.history_len(), 1);
}

#[test]
fn dynamic_minimum_expires() {
    let (p, g) = governor(4, 2);
    g.request_min_online(2, Duration::from_millis(100));
    assert_eq!(g.dynamic_min(), Some(2));
    p.advance(200_000, 0);
    assert_eq!(g.dynamic_min(), None);

    g.request_min_online(3, Duration::from_secs(10));
    g.request_min_online(0, Duration::from_secs(10));
    assert_eq!(g.dynamic_min(), None);
}

#[test]
fn dynamic_minimum_holds_cores_online() {
    let (p, g) = governor(4, 2);
    p.state().cur = 200_000;
    g.start(0).unwrap();
    g.store_tunable("cpu_down_rate", "1").unwrap();
    g.request_min_online(2, Duration::from_secs(60));

    tick_at(&p, &g, 0);
    tick_at(&p, &g, 0);
    assert_eq!(p.online_count(), 2);

    g.request_min_online(0, Duration::ZERO);
    tick_at(&p, &g, 0);
    assert_eq!(p.online_count(), 1);
}

// === SLP POLICY ===

#[test]
fn slp_policy_hotplugs_from_frequency_alone() {
    let (p, g) = governor(4, 1);
    p.state().cur = 600_000;
    g.start(0).unwrap();
    g.store_tunable("hotplug_policy", "slp").unwrap();
    g.store_tunable("cpu_up_rate", "2").unwrap();
    assert_eq!(g.hotplug_policy(), HotplugPolicyKind::Slp);
    assert_eq!(g.show_tunable("hotplug_policy").unwrap(), "slp");

    tick_at(&p, &g, 84);
    assert_eq!(p.online_count(), 1);
    tick_at(&p, &g, 84);
    assert_eq!(p.online_count(), 2);
    assert_eq!(g.last_event().unwrap().decision, HotplugDecision::Up);

    g.store_tunable("hotplug_policy", "android").unwrap();
    assert_eq!(g.hotplug_policy(), HotplugPolicyKind::Android);
    assert_eq!(g.history_len(), 0);
}

// === MULTIPLE POLICIES ===

#[test]
fn two_policies_share_one_history_slot_per_period() {
    let (p, g) = governor(4, 2);
    p.state().cur = 600_000;
    p.state().runnable = 3;
    g.start(0).unwrap();
    g.start(1).unwrap();
    g.store_tunable("cpu_up_rate", "2").unwrap();

    let period = || {
        g.sample_runqueue();
        p.advance(TICK_US, 84);
        g.tick(0).unwrap();
        g.tick(1).unwrap();
    };

    period();
    assert_eq!(g.history_len(), 1);
    assert_eq!(p.online_count(), 2);

    // ROW 2 UP THRESHOLD IS RQ 200; ONLY THE FIRST POLICY CONSUMED THE 300
    period();
    assert_eq!(p.online_count(), 3);
    assert_eq!(p.state().ups, vec![2]);
    assert_eq!(g.history_len(), 0);
}

#[test]
fn second_policy_never_consumes_the_runqueue() {
    let (p, g) = governor(4, 2);
    p.state().runnable = 2;
    g.start(0).unwrap();
    g.start(1).unwrap();

    g.sample_runqueue();
    p.advance(TICK_US, 50);
    g.tick(1).unwrap();
    assert_eq!(g.last_event().unwrap().rq_avg, 0);
    assert_eq!(g.history_len(), 0);

    g.tick(0).unwrap();
    assert_eq!(g.last_event().unwrap().rq_avg, 200);
    assert_eq!(g.history_len(), 1);
}

#[test]
fn offline_policy_tick_only_reschedules() {
    let (p, g) = governor(2, 2);
    g.start(0).unwrap();
    g.start(1).unwrap();
    g.store_tunable("hotplug_lock", "1").unwrap();
    assert!(!p.cpu_online(1));

    let sets = p.state().set_calls.len();
    let events = g.event_count();
    let history = g.history_len();

    p.advance(TICK_US, 100);
    let delay = g.tick(1).unwrap();
    assert!(delay > Duration::ZERO);
    assert_eq!(p.state().set_calls.len(), sets);
    assert_eq!(g.event_count(), events);
    assert_eq!(g.history_len(), history);

    // THE REMAINING POLICY TAKES OVER THE HOTPLUG PATH
    g.tick(0).unwrap();
    assert_eq!(g.event_count(), events + 1);
    assert_eq!(g.history_len(), history + 1);
}

// === POWER EVENTS ===

#[test]
fn early_suspend_pins_and_slows_then_resume_restores() {
    let (p, g) = governor(4, 3);
    g.start(0).unwrap();
    g.store_tunable("sampling_rate", "60000").unwrap();

    g.power_event(PowerEvent::EarlySuspend);
    assert!(g.is_suspended());
    assert_eq!(g.hotplug_lock(), 1);
    assert_eq!(p.online_count(), 1);
    assert_eq!(g.show_tunable("freq_step").unwrap(), "20");
    assert_eq!(g.show_tunable("sampling_rate").unwrap(), "240000");

    g.power_event(PowerEvent::LateResume);
    assert!(!g.is_suspended());
    assert_eq!(g.hotplug_lock(), 0);
    assert_eq!(g.show_tunable("freq_step").unwrap(), "40");
    assert_eq!(g.show_tunable("sampling_rate").unwrap(), "60000");
}

#[test]
fn early_suspend_honours_min_cpu_lock() {
    let (_p, g) = governor(4, 2);
    g.start(0).unwrap();
    g.store_tunable("min_cpu_lock", "2").unwrap();
    g.power_event(PowerEvent::EarlySuspend);
    assert_eq!(g.hotplug_lock(), 2);
}

#[test]
fn resume_reapplies_saved_lock() {
    let (p, g) = governor(4, 1);
    g.start(0).unwrap();
    g.store_tunable("hotplug_lock", "3").unwrap();
    assert_eq!(p.online_count(), 3);

    g.power_event(PowerEvent::EarlySuspend);
    assert_eq!(p.online_count(), 1);
    g.power_event(PowerEvent::LateResume);
    assert_eq!(g.hotplug_lock(), 3);
    assert_eq!(p.online_count(), 3);
}

#[test]
fn pm_suspend_pins_one_core_until_post_suspend() {
    let (p, g) = governor(4, 1);
    g.start(0).unwrap();
    g.store_tunable("hotplug_lock", "2").unwrap();
    assert_eq!(p.online_count(), 2);

    g.power_event(PowerEvent::SuspendPrepare);
    assert_eq!(g.hotplug_lock(), 1);
    assert_eq!(p.online_count(), 1);

    g.power_event(PowerEvent::PostSuspend);
    assert_eq!(g.hotplug_lock(), 2);
    assert_eq!(p.online_count(), 2);
}

#[test]
fn reboot_pins_one_core() {
    let (p, g) = governor(4, 4);
    g.start(0).unwrap();
    g.power_event(PowerEvent::Reboot);
    assert_eq!(g.hotplug_lock(), 1);
    assert_eq!(p.online_count(), 1);
}

#[test]
fn pm_events_ignored_without_running_governor() {
    let (p, g) = governor(4, 4);
    g.power_event(PowerEvent::Reboot);
    assert_eq!(g.hotplug_lock(), 0);
    assert_eq!(p.online_count(), 4);
}

// === LIVE TIMERS AND ACTUATOR THREAD ===

#[test]
fn threaded_governor_lifecycle() {
    let p = FakePlatform::new(4, 1);
    let g = Governor::new(p.clone()).unwrap();

    g.start(0).unwrap();
    assert!(g.rq_sampler_running());

    g.store_tunable("hotplug_policy", "slp").unwrap();
    assert!(!g.rq_sampler_running());
    g.store_tunable("hotplug_policy", "android").unwrap();
    assert!(g.rq_sampler_running());

    g.store_tunable("hotplug_lock", "2").unwrap();
    g.flush_hotplug();
    assert_eq!(p.online_count(), 2);

    g.stop(0).unwrap();
    assert!(!g.rq_sampler_running());
    assert!(!g.notifiers_registered());
}

#[test]
fn slow_cpu_up_does_not_stall_the_tick() {
    let p = FakePlatform::new(4, 1);
    p.state().cur = 600_000;
    p.state().up_delay = Some(Duration::from_millis(300));
    let g = Governor::new(p.clone()).unwrap();
    // KEEP THE LIVE TIMER OUT OF THE WAY; THE TEST DRIVES THE TICKS
    g.store_tunable("sampling_rate", "10000000").unwrap();
    g.store_tunable("hotplug_policy", "slp").unwrap();
    g.store_tunable("cpu_up_rate", "1").unwrap();
    g.start(0).unwrap();

    tick_at(&p, &g, 84);
    std::thread::sleep(Duration::from_millis(50));

    let begun = std::time::Instant::now();
    tick_at(&p, &g, 84);
    assert!(begun.elapsed() < Duration::from_millis(150), "TICK TOOK {:?}", begun.elapsed());
    assert!(p.state().ups.is_empty());

    g.flush_hotplug();
    assert!(p.online_count() >= 2);
    assert_eq!(p.state().ups[0], 1);
    g.stop(0).unwrap();
}

#[test]
fn online_cpus_show_and_shutdown_clear_policies() {
    let (p, g) = governor(2, 2);
    g.start(0).unwrap();
    assert_eq!(g.show_tunable("online_cpus").unwrap(), p.num_online_cpus().to_string());
    g.shutdown();
    assert!(g.running_policies().is_empty());
}
