//! Program matching, placement and manual starts through the controller

mod common;

use irrigo_core::{
    ControllerError, ControllerState, Event, EventKind, FlowMeter, LogKind, LogRecord, MasterId,
    MasterRule, Options, ProgramData, ProgramId, StationDriver, StationFlags,
};

use common::{run_until, started, MockBoard, SIX_AM};

fn start_of(event: &Event) -> u64 {
    match event {
        Event::StationSchedule(r) | Event::StationOpen(r) | Event::StationClose(r) => r.start,
        other => panic!("not a station event: {:?}", other),
    }
}

fn duration_of(event: &Event) -> u64 {
    match event {
        Event::StationSchedule(r) | Event::StationOpen(r) | Event::StationClose(r) => r.duration,
        other => panic!("not a station event: {:?}", other),
    }
}

#[test]
fn test_unweathered_program_ignores_percentage() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_options(Options::new().with_water_percentage(50))
        .with_program(ProgramData::daily("lawn", 360).with_duration(0, 300));
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM);
    let scheduled = ctl.board().station_events(EventKind::StationSchedule, 0);
    assert_eq!(scheduled.len(), 1);
    assert_eq!(duration_of(&scheduled[0].0), 300);
    assert_eq!(start_of(&scheduled[0].0), SIX_AM + 1);
    assert_eq!(ctl.state(), ControllerState::Running);
}

#[test]
fn test_tiny_weathered_run_is_dropped() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_options(Options::new().with_water_percentage(15))
        .with_program(
            ProgramData::daily("lawn", 360)
                .with_weather(true)
                .with_duration(0, 40),
        );
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM + 5);
    assert!(ctl.queue().is_empty());
    assert_eq!(ctl.state(), ControllerState::Idle);
    assert_eq!(ctl.board().count(EventKind::StationSchedule), 0);
}

#[test]
fn test_weathered_run_records_water_level() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_options(Options::new().with_water_percentage(50))
        .with_program(
            ProgramData::daily("lawn", 360)
                .with_weather(true)
                .with_duration(0, 600),
        );
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM);
    let (event, _) = ctl.board().station_events(EventKind::StationSchedule, 0)[0];
    match event {
        Event::StationSchedule(r) => {
            assert_eq!(r.duration, 300);
            assert_eq!(r.water_level, 50);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_sequential_stations_queue_behind_each_other() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_options(
            Options::new()
                .with_station_delay(5)
                .with_station(0, StationFlags::SEQUENTIAL)
                .with_station(1, StationFlags::SEQUENTIAL),
        )
        .with_program(
            ProgramData::daily("beds", 360)
                .with_duration(0, 100)
                .with_duration(1, 50),
        );
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM);
    let s0 = ctl.board().station_events(EventKind::StationSchedule, 0);
    let s1 = ctl.board().station_events(EventKind::StationSchedule, 1);
    assert_eq!(start_of(&s0[0].0), SIX_AM + 1);
    assert_eq!(start_of(&s1[0].0), SIX_AM + 106);
    assert_eq!(ctl.queue().last_sequential_stop(), SIX_AM + 156);

    // Station 1 opens only once station 0 and the delay are over
    run_until(&mut ctl, SIX_AM + 105);
    assert!(!ctl.board().bit(1));
    run_until(&mut ctl, SIX_AM + 106);
    assert!(ctl.board().bit(1));
    assert!(!ctl.board().bit(0));
}

#[test]
fn test_concurrent_stations_stagger_by_one_second() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1).with_program(
        ProgramData::daily("beds", 360)
            .with_duration(0, 100)
            .with_duration(1, 50),
    );
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM);
    let s0 = ctl.board().station_events(EventKind::StationSchedule, 0);
    let s1 = ctl.board().station_events(EventKind::StationSchedule, 1);
    assert_eq!(start_of(&s0[0].0), SIX_AM + 1);
    assert_eq!(start_of(&s1[0].0), SIX_AM + 2);
    assert_eq!(ctl.board().count(EventKind::ProgramSchedule), 1);

    run_until(&mut ctl, SIX_AM + 2);
    assert!(ctl.board().bit(0) && ctl.board().bit(1));
}

#[test]
fn test_full_run_lifecycle() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_program(ProgramData::daily("lawn", 360).with_duration(2, 60));
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM + 1);
    assert!(ctl.board().applied[2]);
    assert_eq!(ctl.board().count(EventKind::ProgramStart), 1);
    assert_eq!(ctl.board().station_events(EventKind::StationOpen, 2).len(), 1);

    run_until(&mut ctl, SIX_AM + 60);
    assert!(ctl.board().applied[2]);

    run_until(&mut ctl, SIX_AM + 61);
    assert!(!ctl.board().applied[2]);
    assert_eq!(ctl.state(), ControllerState::Idle);
    assert_eq!(ctl.board().count(EventKind::ProgramStop), 1);

    let close = ctl.board().station_events(EventKind::StationClose, 2);
    assert_eq!(close.len(), 1);
    assert_eq!(duration_of(&close[0].0), 60);

    let logs = ctl.board().logs_of(LogKind::Station);
    assert_eq!(
        logs,
        vec![LogRecord::Station {
            program: ProgramId::Stored(1),
            station: 2,
            duration: 60,
            end: SIX_AM + 61,
            gpm: None,
        }]
    );
    let last = ctl.last_run().expect("last run recorded");
    assert_eq!((last.station, last.duration), (2, 60));
}

#[test]
fn test_disabled_and_master_stations_never_scheduled() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_options(
            Options::new()
                .with_station(1, StationFlags::DISABLED)
                .with_master(MasterId::One, MasterRule::new(7)),
        )
        .with_program(
            ProgramData::daily("all", 360)
                .with_duration(0, 60)
                .with_duration(1, 60)
                .with_duration(7, 60),
        );
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM);
    assert_eq!(ctl.queue().len(), 1);
    assert!(ctl.queue().run_for(1).is_none());
    assert!(ctl.queue().run_for(7).is_none());
}

#[test]
fn test_program_fires_once_per_minute() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_program(ProgramData::daily("lawn", 360).with_duration(0, 30));
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM + 59);
    assert_eq!(ctl.board().count(EventKind::ProgramSchedule), 1);
    assert_eq!(ctl.board().station_events(EventKind::StationOpen, 0).len(), 1);
}

fn station_log(program: u8, duration: u64, end: u64) -> LogRecord {
    LogRecord::Station {
        program: ProgramId::Stored(program),
        station: 0,
        duration,
        end,
        gpm: None,
    }
}

#[test]
fn test_duplicate_station_runs_back_to_back() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_program(ProgramData::daily("a", 360).with_duration(0, 60))
        .with_program(ProgramData::daily("b", 360).with_duration(0, 60));
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM);
    assert_eq!(ctl.queue().len(), 2);
    let scheduled = ctl.board().station_events(EventKind::StationSchedule, 0);
    let starts: Vec<u64> = scheduled.iter().map(|(e, _)| start_of(e)).collect();
    assert_eq!(starts, vec![SIX_AM + 1, SIX_AM + 61]);
    // The index follows the earliest run
    assert_eq!(ctl.queue().run_for(0).map(|r| r.start()), Some(SIX_AM + 1));
    assert!(ctl.queue().index_consistent());

    run_until(&mut ctl, SIX_AM + 61);
    let opens = ctl.board().station_events(EventKind::StationOpen, 0);
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[0].1, SIX_AM + 1);
    assert_eq!(opens[1].1, SIX_AM + 61);
    assert!(ctl.board().bit(0));
    assert!(ctl.queue().index_consistent());

    run_until(&mut ctl, SIX_AM + 120);
    assert!(ctl.board().bit(0));
    assert_eq!(ctl.board().station_events(EventKind::StationClose, 0).len(), 1);

    run_until(&mut ctl, SIX_AM + 122);
    let closes = ctl.board().station_events(EventKind::StationClose, 0);
    assert_eq!(closes.len(), 2);
    assert_eq!(closes[1].1, SIX_AM + 121);
    assert_eq!(duration_of(&closes[1].0), 60);
    assert_eq!(
        ctl.board().logs_of(LogKind::Station),
        vec![
            station_log(1, 60, SIX_AM + 61),
            station_log(2, 60, SIX_AM + 121),
        ]
    );
    assert_eq!(ctl.board().count(EventKind::ProgramStop), 2);
    assert_eq!(ctl.state(), ControllerState::Idle);
}

#[test]
fn test_shorter_duplicate_run_keeps_its_duration() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_program(ProgramData::daily("a", 360).with_duration(0, 60))
        .with_program(ProgramData::daily("b", 360).with_duration(0, 30));
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM + 92);
    let opens = ctl.board().station_events(EventKind::StationOpen, 0);
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[1].1, SIX_AM + 61);
    assert_eq!(
        ctl.board().logs_of(LogKind::Station),
        vec![
            station_log(1, 60, SIX_AM + 61),
            station_log(2, 30, SIX_AM + 91),
        ]
    );
    assert_eq!(ctl.state(), ControllerState::Idle);
}

#[test]
fn test_manual_test_program() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM)
        .with_options(Options::new().with_master(MasterId::One, MasterRule::new(7)));
    let mut ctl = started(board, &flow);

    assert_eq!(ctl.manual_start_program(0, false), Ok(7));
    let runs: Vec<_> = ctl.queue().iter().map(|(_, r)| *r).collect();
    assert!(runs.iter().all(|r| r.duration == 60 && r.program == ProgramId::Test));
    assert_eq!(ctl.state(), ControllerState::Running);
}

#[test]
fn test_manual_short_test_program() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM);
    let mut ctl = started(board, &flow);

    assert_eq!(ctl.manual_start_program(255, false), Ok(8));
    assert!(ctl
        .queue()
        .iter()
        .all(|(_, r)| r.duration == 2 && r.program == ProgramId::ShortTest));

    run_until(&mut ctl, SIX_AM + 10);
    assert_eq!(ctl.board().count(EventKind::StationClose), 8);
    assert_eq!(ctl.state(), ControllerState::Idle);
}

#[test]
fn test_manual_stored_program_with_weather() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM + 3600)
        .with_options(Options::new().with_water_percentage(10))
        .with_program(
            ProgramData::daily("lawn", 360)
                .with_duration(0, 60)
                .with_duration(1, 600),
        );
    let mut ctl = started(board, &flow);

    // Manual runs skip the low-water cutoff
    assert_eq!(ctl.manual_start_program(1, true), Ok(2));
    let s0 = ctl.queue().run_for(0).copied().expect("station 0 queued");
    let s1 = ctl.queue().run_for(1).copied().expect("station 1 queued");
    assert_eq!((s0.duration, s0.water_level), (6, 10));
    assert_eq!(s1.duration, 60);
    assert_eq!(s0.program, ProgramId::Manual);
}

#[test]
fn test_manual_start_replaces_running_runs() {
    let flow = FlowMeter::new();
    let board = MockBoard::new(SIX_AM - 1)
        .with_program(ProgramData::daily("lawn", 360).with_duration(0, 600))
        .with_program(ProgramData::daily("other", 0).with_duration(3, 60));
    let mut ctl = started(board, &flow);

    run_until(&mut ctl, SIX_AM + 10);
    assert!(ctl.board().bit(0));

    assert_eq!(ctl.manual_start_program(2, false), Ok(1));
    assert!(!ctl.board().bit(0));
    assert!(ctl.queue().run_for(0).is_none());
    // Immediate reset writes no log
    assert!(ctl.board().logs_of(LogKind::Station).is_empty());
}

#[test]
fn test_manual_start_unknown_program() {
    let flow = FlowMeter::new();
    let mut ctl = started(MockBoard::new(SIX_AM), &flow);

    assert_eq!(
        ctl.manual_start_program(3, false),
        Err(ControllerError::UnknownProgram { pid: 3 })
    );
    assert_eq!(
        ctl.manual_start_program(254, false),
        Err(ControllerError::UnknownProgram { pid: 254 })
    );
    assert!(ctl.queue().is_empty());
}
