//! Flow metering through the controller: warm-up, rate at shutoff, volume
//! apportioning and real-time samples

mod common;

use irrigo_core::{
    Event, EventKind, FlowMeter, LogKind, LogRecord, Options, ProgramData, SensorType, StationDriver,
};

use common::{run_until, started, MockBoard, SIX_AM};

const MS_BASE: u32 = 1_000_000;

fn flow_board() -> MockBoard {
    MockBoard::new(SIX_AM - 1)
        .with_options(Options::new().with_sensor(SensorType::Flow).with_pulse_rate(100))
        .with_program(ProgramData::daily("lawn", 360).with_duration(0, 200))
}

#[test]
fn test_warmup_pulses_excluded_from_rate() {
    let flow = FlowMeter::new();
    let mut ctl = started(flow_board(), &flow);

    // Valve opens at SIX_AM + 1; pulses follow at these offsets (seconds)
    let offsets = [0u32, 40, 90, 91, 130];
    run_until(&mut ctl, SIX_AM + 1);
    assert!(ctl.board().bit(0));
    for &offset in offsets.iter() {
        run_until(&mut ctl, SIX_AM + 1 + offset as u64);
        assert!(flow.on_pulse(MS_BASE + offset * 1_000));
    }

    let snap = flow.snapshot();
    assert_eq!(snap.count, 5);
    assert_eq!(snap.measured_pulses(), 3);
    assert_eq!(snap.begin_ms, MS_BASE + 90_000);
    assert_eq!(snap.stop_ms, MS_BASE + 130_000);

    run_until(&mut ctl, SIX_AM + 201);
    // 60000 / (40000 / 3) with integer ms per pulse
    let expected = 60_000.0 / 13_333.0;
    assert!((ctl.status().last_gpm - expected).abs() < 1e-3);

    let logs = ctl.board().logs_of(LogKind::Station);
    match logs.as_slice() {
        [LogRecord::Station { gpm: Some(gpm), duration: 200, .. }] => {
            assert!((gpm - expected).abs() < 1e-3)
        }
        other => panic!("unexpected station log {:?}", other),
    }

    // Every pulse landed while the only valve was open
    let close = ctl.board().station_events(EventKind::StationClose, 0);
    match close[0].0 {
        Event::StationClose(r) => assert!((r.volume - 5.0).abs() < 1e-4),
        _ => unreachable!(),
    }
}

#[test]
fn test_idle_transition_logs_pulses() {
    let flow = FlowMeter::new();
    let mut ctl = started(flow_board(), &flow);

    run_until(&mut ctl, SIX_AM + 10);
    for i in 0..4u32 {
        flow.on_pulse(MS_BASE + i * 1_000);
    }
    run_until(&mut ctl, SIX_AM + 201);

    let logs = ctl.board().logs_of(LogKind::FlowSense);
    assert_eq!(
        logs,
        vec![LogRecord::FlowSense {
            pulses: 4,
            duration: 201,
            end: SIX_AM + 201,
        }]
    );
}

#[test]
fn test_volume_split_between_open_runs() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_options(Options::new().with_sensor(SensorType::Flow))
        .with_program(
            ProgramData::daily("beds", 360)
                .with_duration(0, 120)
                .with_duration(1, 120),
        );
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM + 3);
    for i in 0..4u32 {
        flow.on_pulse(MS_BASE + i * 100);
    }
    run_until(&mut ctl, SIX_AM + 4);

    let a = ctl.queue().run_for(0).map(|r| r.pulses());
    let b = ctl.queue().run_for(1).map(|r| r.pulses());
    assert_eq!(a, Some(2.0));
    assert_eq!(b, Some(2.0));
    let program = ctl.queue().programs().next().map(|p| p.volume);
    assert_eq!(program, Some(4.0));
}

#[test]
fn test_pulses_ignored_without_flow_sensor() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_program(ProgramData::daily("lawn", 360).with_duration(0, 60));
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM + 5);
    assert!(!flow.is_enabled());
    assert!(!flow.on_pulse(MS_BASE));
    assert_eq!(flow.pulse_count(), 0);
}

#[test]
fn test_realtime_samples_every_window() {
    let flow = FlowMeter::new();
    let mut ctl = started(flow_board(), &flow);

    let offsets = [0u32, 40, 90, 91, 130];
    for &offset in offsets.iter() {
        run_until(&mut ctl, SIX_AM + 1 + offset as u64);
        flow.on_pulse(MS_BASE + offset * 1_000);
    }
    run_until(&mut ctl, SIX_AM + 179);

    let samples = ctl.board().events_of(EventKind::FlowUpdate);
    assert_eq!(samples.len(), 6);
    let mut total = 0.0;
    for (event, _) in samples {
        match event {
            Event::FlowUpdate { volume, duration } => {
                assert_eq!(duration, 30);
                total += volume;
            }
            _ => unreachable!(),
        }
    }
    assert!((total - 5.0).abs() < 1e-4);
}
