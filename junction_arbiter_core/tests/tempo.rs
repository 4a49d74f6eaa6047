use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use junction_arbiter_core::*;

fn fast_tempo(interval_ms: u64) -> TempoCfg {
    TempoCfg {
        pause_poll_ms: 5,
        ..TempoCfg::with_interval(Duration::from_millis(interval_ms))
    }
}

fn is_invalid(r: Result<Scheduler>) -> bool {
    matches!(r, Err(Error::InvalidConfig(_)))
}

#[test]
fn rejects_bad_tempo() {
    assert!(is_invalid(Scheduler::new(TempoCfg {
        junction_interval_secs: 0.0,
        ..TempoCfg::default()
    })));
    assert!(is_invalid(Scheduler::new(TempoCfg {
        junction_interval_secs: -1.0,
        ..TempoCfg::default()
    })));
    assert!(is_invalid(Scheduler::new(TempoCfg {
        time_scale: 0.0,
        ..TempoCfg::default()
    })));
    assert!(is_invalid(Scheduler::new(TempoCfg {
        lookahead_count: 0,
        ..TempoCfg::default()
    })));
    assert!(Scheduler::new(TempoCfg::default()).is_ok());
}

#[test]
fn fixed_interval_offsets() {
    let s = Scheduler::new(TempoCfg::with_interval(Duration::from_secs(2))).unwrap();
    let j = Junction::new(1, "A");
    assert_eq!(s.scheduled_offset(0, &j), Duration::ZERO);
    assert_eq!(s.scheduled_offset(3, &j), Duration::from_secs(6));

    s.start();
    let t0 = s.scheduled_time(0, &j);
    let t3 = s.scheduled_time(3, &j);
    assert_eq!(t3 - t0, Duration::from_secs(6));
}

#[test]
fn real_time_offsets_scale_and_lead() {
    let s = Scheduler::new(TempoCfg {
        mode: DispatchMode::RealTime,
        time_scale: 2.0,
        pre_dispatch_secs: 5.0,
        ..TempoCfg::default()
    })
    .unwrap();

    let far = Junction::new(1, "far").with_cumulative(1_000, 100);
    let near = Junction::new(2, "near").with_cumulative(10, 4);
    assert_eq!(s.scheduled_offset(9, &far), Duration::from_secs(45));
    assert_eq!(s.scheduled_offset(0, &near), Duration::ZERO);
}

#[test]
fn other_modes_time_like_fixed_interval() {
    for mode in [DispatchMode::DistanceBased, DispatchMode::Manual] {
        let s = Scheduler::new(TempoCfg {
            mode,
            junction_interval_secs: 1.5,
            ..TempoCfg::default()
        })
        .unwrap();
        let j = Junction::new(1, "A").with_cumulative(0, 999);
        assert_eq!(s.scheduled_offset(2, &j), Duration::from_secs(3));
    }
}

#[test]
fn interval_change_only_affects_later_computations() {
    let s = Scheduler::new(TempoCfg::with_interval(Duration::from_secs(1))).unwrap();
    let j = Junction::new(1, "A");
    let before = s.scheduled_offset(4, &j);

    s.set_interval(Duration::from_millis(250)).unwrap();
    assert_eq!(before, Duration::from_secs(4));
    assert_eq!(s.scheduled_offset(4, &j), Duration::from_secs(1));
    assert_eq!(s.interval(), Duration::from_millis(250));

    assert!(matches!(s.set_interval(Duration::ZERO), Err(Error::InvalidConfig(_))));
    assert_eq!(s.interval(), Duration::from_millis(250));
}

#[test]
fn schedule_is_computed_up_front() {
    let s = Scheduler::new(fast_tempo(100)).unwrap();
    let junctions: Vec<Junction> = (0..4).map(|i| Junction::new(i, format!("J{i}"))).collect();
    let plan = s.schedule(&junctions);

    assert!(s.is_started());
    assert_eq!(plan.len(), 4);
    for (i, slot) in plan.iter().enumerate() {
        assert_eq!(slot.index, i);
        assert_eq!(slot.junction.junction_id, i as u32);
        assert_eq!(slot.offset, Duration::from_millis(100 * i as u64));
    }
    assert_eq!(plan[3].at - plan[0].at, Duration::from_millis(300));
    assert!(plan[3].at_wall > plan[0].at_wall);
}

#[test]
fn plan_keeps_a_pause_taken_after_start() {
    let s = Scheduler::new(fast_tempo(10)).unwrap();
    let junctions: Vec<Junction> = (0..3).map(|i| Junction::new(i, format!("J{i}"))).collect();
    s.start();
    s.pause();

    let plan = s.plan(&junctions);
    assert_eq!(plan.len(), 3);
    assert!(s.is_paused());

    s.schedule(&junctions);
    assert!(!s.is_paused());
}

#[test]
fn out_of_range_durations_are_rejected() {
    let huge = TempoCfg {
        junction_interval_secs: 1e30,
        ..TempoCfg::default()
    };
    assert!(matches!(huge.validate(), Err(Error::InvalidConfig(_))));
    assert_eq!(huge.interval(), Duration::from_secs_f64(MAX_CFG_SECS));
    assert!(is_invalid(Scheduler::new(huge)));

    assert!(is_invalid(Scheduler::new(TempoCfg {
        pre_dispatch_secs: 1e300,
        ..TempoCfg::default()
    })));

    let s = Scheduler::new(TempoCfg::default()).unwrap();
    assert!(s.set_interval(Duration::from_secs(30 * 24 * 3600)).is_err());
    assert_eq!(s.interval(), Duration::from_secs(30));

    assert!(matches!(
        PipelineCfg::from_json_str(r#"{ "contestant_timeout_secs": 1e30 }"#),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        PipelineCfg::from_json_str(r#"{ "finalize_timeout_secs": 1e30 }"#),
        Err(Error::InvalidConfig(_))
    ));
    assert!(PipelineCfg::from_json_str(r#"{ "finalize_timeout_secs": 0.0 }"#).is_ok());
}

#[test]
fn extreme_real_time_offsets_do_not_overflow() {
    let s = Scheduler::new(TempoCfg {
        mode: DispatchMode::RealTime,
        time_scale: 1e-300,
        ..TempoCfg::default()
    })
    .unwrap();
    let far = Junction::new(1, "far").with_cumulative(0, u64::MAX);

    s.start();
    let offset = s.scheduled_offset(0, &far);
    assert!(offset > Duration::from_secs(365 * 24 * 3600));
    let at = s.scheduled_time(0, &far);
    assert!(at > Instant::now());
    assert_eq!(s.schedule(std::slice::from_ref(&far)).len(), 1);
}

#[test]
fn elapsed_excludes_paused_time() {
    let s = Scheduler::new(fast_tempo(10)).unwrap();
    assert_eq!(s.elapsed(), Duration::ZERO);

    s.start();
    thread::sleep(Duration::from_millis(30));
    s.pause();
    assert!(s.is_paused());
    let at_pause = s.elapsed();

    thread::sleep(Duration::from_millis(300));
    let while_paused = s.elapsed();
    s.resume();
    let after = s.elapsed();

    assert!(while_paused.saturating_sub(at_pause) < Duration::from_millis(50));
    assert!(after.saturating_sub(at_pause) < Duration::from_millis(100));
    assert!(after >= at_pause);
}

#[test]
fn wait_until_past_target_returns_quickly() {
    let s = Scheduler::new(fast_tempo(10)).unwrap();
    let waited = s.wait_until(Instant::now());
    assert!(waited < Duration::from_millis(50));
}

#[test]
fn wait_until_reaches_target() {
    let s = Scheduler::new(fast_tempo(10)).unwrap();
    let target = Instant::now() + Duration::from_millis(60);
    s.wait_until(target);
    assert!(Instant::now() >= target);
}

#[test]
fn wait_until_holds_while_paused() {
    let s = Arc::new(Scheduler::new(fast_tempo(10)).unwrap());
    s.start();
    s.pause();

    let resumer = Arc::clone(&s);
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        resumer.resume();
    });

    let began = Instant::now();
    s.wait_until(Instant::now());
    assert!(began.elapsed() >= Duration::from_millis(140));
    t.join().unwrap();
}

#[test]
fn wait_can_be_cancelled() {
    let s = Scheduler::new(fast_tempo(10)).unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let setter = Arc::clone(&flag);
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        setter.store(true, Ordering::SeqCst);
    });

    let began = Instant::now();
    let out = s.wait_until_or_cancel(Instant::now() + Duration::from_secs(10), || flag.load(Ordering::SeqCst));
    assert!(out.is_none());
    assert!(began.elapsed() < Duration::from_secs(2));
    t.join().unwrap();
}

#[test]
fn totals_and_progress() {
    let s = Scheduler::new(TempoCfg::with_interval(Duration::from_secs(2))).unwrap();
    assert_eq!(s.total_duration(0), Duration::ZERO);
    assert_eq!(s.total_duration(1), Duration::ZERO);
    assert_eq!(s.total_duration(5), Duration::from_secs(8));

    let p = s.progress(1, 4);
    assert_eq!(p.percent, 25.0);
    assert_eq!(p.remaining, 2);
    assert_eq!(p.estimated_remaining, Duration::from_secs(4));
    assert!(!p.is_paused);
}

#[test]
fn pipeline_cfg_from_json() {
    let cfg = PipelineCfg::from_json_str(
        r#"{ "tempo": { "junction_interval_secs": 5.0, "mode": "real_time" }, "contestant_timeout_secs": 2.5 }"#,
    )
    .unwrap();
    assert_eq!(cfg.tempo.interval(), Duration::from_secs(5));
    assert_eq!(cfg.tempo.mode, DispatchMode::RealTime);
    assert_eq!(cfg.tempo.lookahead_count, 1);
    assert_eq!(cfg.contestant_timeout(), Duration::from_millis(2_500));
    assert_eq!(cfg.max_concurrent_junctions, 3);
    assert_eq!(cfg.arbiter.relevance_weight, 0.45);

    assert!(matches!(PipelineCfg::from_json_str("{ not json"), Err(Error::InvalidConfig(_))));
    assert!(matches!(
        PipelineCfg::from_json_str(r#"{ "tempo": { "time_scale": -1.0 } }"#),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        PipelineCfg::from_json_str(r#"{ "max_concurrent_junctions": 0 }"#),
        Err(Error::InvalidConfig(_))
    ));
}

#[cfg(feature = "async")]
#[tokio::test]
async fn async_wait_reaches_target() {
    let s = Scheduler::new(fast_tempo(10)).unwrap();
    let target = Instant::now() + Duration::from_millis(40);
    s.wait_until_async(target).await;
    assert!(Instant::now() >= target);
}
