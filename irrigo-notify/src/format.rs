//! Event renderings
//!
//! Every renderer takes the event plus the controller time it was emitted
//! at, and a [`NameLookup`] for the device, station and program names.
//! Timestamps in JSON and line protocol output are UTC; only [`text`]
//! shows local time.
//!
//! Each event covers a time [`Span`]:
//!
//! | Event | start | end |
//! |-------|-------|-----|
//! | program events | earliest run start | latest run end |
//! | station events | run start | start + duration |
//! | rain delay start | emit time | + remaining delay |
//! | rain delay stop, rain sensor off, flow update | emit time - duration | emit time |
//! | everything else | emit time | emit time |

use std::fmt::Write as _;
use std::net::Ipv4Addr;

use chrono::DateTime;
use irrigo_core::{Event, ProgramId, StationId, Timestamp};
use serde_json::{json, Map, Value};

/// Resolves names for human-readable output
pub trait NameLookup {
    /// Name of the controller itself; empty for none
    fn unit_name(&self) -> String {
        String::new()
    }
    /// Display name of a station
    fn station_name(&self, sid: StationId) -> String;
    /// Display name of a program
    fn program_name(&self, program: ProgramId) -> String;
}

/// Generated names: `S01`, `S02`, ... and `Program 1`, `Program 2`, ...
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNames;

impl NameLookup for DefaultNames {
    fn station_name(&self, sid: StationId) -> String {
        format!("S{:02}", sid as u16 + 1)
    }

    fn program_name(&self, program: ProgramId) -> String {
        match program {
            ProgramId::Test => "Test".into(),
            ProgramId::ShortTest => "Short Test".into(),
            ProgramId::Manual => "Manual".into(),
            ProgramId::Stored(n) => format!("Program {}", n),
        }
    }
}

/// Time covered by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First second
    pub start: Timestamp,
    /// Last second
    pub end: Timestamp,
    /// `end - start`
    pub duration: u64,
}

impl Span {
    fn at(t: Timestamp) -> Self {
        Self {
            start: t,
            end: t,
            duration: 0,
        }
    }

    fn ending(end: Timestamp, duration: u64) -> Self {
        Self {
            start: end.saturating_sub(duration),
            end,
            duration,
        }
    }

    fn starting(start: Timestamp, duration: u64) -> Self {
        Self {
            start,
            end: start + duration,
            duration,
        }
    }
}

/// Span of `event` emitted at `at`
pub fn span(event: &Event, at: Timestamp) -> Span {
    match event {
        Event::ProgramSchedule(p) | Event::ProgramStart(p) | Event::ProgramStop(p) => Span {
            start: p.start,
            end: p.end,
            duration: p.end.saturating_sub(p.start),
        },
        Event::StationSchedule(r) | Event::StationOpen(r) | Event::StationClose(r) => {
            Span::starting(r.start, r.duration)
        }
        Event::RainDelayStart { duration } => Span::starting(at, *duration),
        Event::RainDelayStop { duration }
        | Event::RainSensorOff { duration }
        | Event::FlowUpdate { duration, .. } => Span::ending(at, *duration),
        _ => Span::at(at),
    }
}

/// Group name shared by related events (`station`, `rain_delay`, ...)
pub const fn category(event: &Event) -> &'static str {
    match event {
        Event::ProgramSchedule(_) | Event::ProgramStart(_) | Event::ProgramStop(_) => "program",
        Event::StationSchedule(_) | Event::StationOpen(_) | Event::StationClose(_) => "station",
        Event::RainSensorOn | Event::RainSensorOff { .. } => "rain_sensor",
        Event::RainDelayStart { .. } | Event::RainDelayStop { .. } => "rain_delay",
        Event::FlowUpdate { .. } => "flow",
        Event::WeatherCall { .. } => "weather_call",
        Event::WaterLevel { .. } => "water_level",
        Event::IpUpdate { .. } => "ip_update",
        Event::RebootComplete => "reboot",
    }
}

/// Type name used in JSON output
pub const fn type_name(event: &Event) -> &'static str {
    match event {
        Event::ProgramSchedule(_) => "program_schedule",
        Event::ProgramStart(_) => "program_start",
        Event::ProgramStop(_) => "program_stop",
        Event::StationSchedule(_) => "station_schedule",
        Event::StationOpen(_) => "station_open",
        Event::StationClose(_) => "station_close",
        other => category(other),
    }
}

// 1 = scheduled, 2 = running, 0 = stopped
fn status(event: &Event) -> Option<u8> {
    match event {
        Event::ProgramSchedule(_) | Event::StationSchedule(_) => Some(1),
        Event::ProgramStart(_) | Event::StationOpen(_) => Some(2),
        Event::ProgramStop(_) | Event::StationClose(_) => Some(0),
        Event::RainSensorOn | Event::RainDelayStart { .. } | Event::RainDelayStop { .. } => {
            Some(1)
        }
        Event::RainSensorOff { .. } => Some(0),
        Event::WeatherCall { success } => Some(*success as u8),
        _ => None,
    }
}

fn subject(event: &Event, names: &dyn NameLookup) -> Option<(u8, String)> {
    match event {
        Event::ProgramSchedule(p) | Event::ProgramStart(p) | Event::ProgramStop(p) => {
            Some((p.program.code(), names.program_name(p.program)))
        }
        Event::StationSchedule(r) | Event::StationOpen(r) | Event::StationClose(r) => {
            Some((r.station, names.station_name(r.station)))
        }
        _ => None,
    }
}

fn water_level(event: &Event) -> Option<u8> {
    match event {
        Event::ProgramSchedule(p) | Event::ProgramStart(p) | Event::ProgramStop(p) => {
            Some(p.water_level)
        }
        Event::StationSchedule(r) | Event::StationOpen(r) | Event::StationClose(r) => {
            Some(r.water_level)
        }
        Event::WaterLevel { percent } => Some(*percent),
        _ => None,
    }
}

/// Volume and average flow rate per minute, for events that report volume
pub fn volume_and_rate(event: &Event, at: Timestamp) -> Option<(f32, f32)> {
    let volume = match event {
        Event::ProgramStop(p) => p.volume,
        Event::StationClose(r) => r.volume,
        Event::FlowUpdate { volume, .. } => *volume,
        _ => return None,
    };
    let duration = span(event, at).duration;
    let rate = if duration == 0 {
        0.0
    } else {
        volume * 60.0 / duration as f32
    };
    Some((volume, rate))
}

/// Local wall clock time, `YYYY-MM-DD HH:MM:SS`
pub fn local_time(at: Timestamp, utc_offset: i32) -> String {
    let secs = at as i64 + utc_offset as i64;
    match DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => at.to_string(),
    }
}

/// Duration as `1 h 2 min 3 s`, dropping leading zero units
pub fn human_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{} h {} min {} s", h, m, s)
    } else if m > 0 {
        format!("{} min {} s", m, s)
    } else {
        format!("{} s", s)
    }
}

/// One-line human-readable message, prefixed with the unit name if set
pub fn text(event: &Event, at: Timestamp, names: &dyn NameLookup, utc_offset: i32) -> String {
    let unit = names.unit_name();
    let mut msg = if unit.is_empty() {
        String::new()
    } else {
        format!("{}: ", unit)
    };
    let sp = span(event, at);
    let name = subject(event, names).map(|(_, n)| n).unwrap_or_default();
    let wl = water_level(event).unwrap_or(100);
    let (volume, rate) = volume_and_rate(event, at).unwrap_or((0.0, 0.0));
    let dur = human_duration(sp.duration);

    let _ = match event {
        Event::ProgramSchedule(_) => write!(
            msg,
            "Program {} scheduled at {} for {} with water level of {}%.",
            name,
            local_time(sp.start, utc_offset),
            dur,
            wl
        ),
        Event::ProgramStart(_) => write!(
            msg,
            "Program {} running for {} with water level of {}%.",
            name, dur, wl
        ),
        Event::ProgramStop(_) => write!(
            msg,
            "Program {} ran for {} with volume of {:.2} and flow rate at {:.2}.",
            name, dur, volume, rate
        ),
        Event::StationSchedule(_) => write!(
            msg,
            "Station {} scheduled at {} for {} with water level of {}%.",
            name,
            local_time(sp.start, utc_offset),
            dur,
            wl
        ),
        Event::StationOpen(_) => write!(
            msg,
            "Station {} running for {} with water level of {}%.",
            name, dur, wl
        ),
        Event::StationClose(_) => write!(
            msg,
            "Station {} ran for {} with volume of {:.2} and flow rate at {:.2}.",
            name, dur, volume, rate
        ),
        Event::RainSensorOn => write!(msg, "Rain sensor activated."),
        Event::RainSensorOff { .. } => write!(msg, "Rain sensor de-activated after {}.", dur),
        Event::RainDelayStart { .. } => write!(msg, "Rain delay started for {}.", dur),
        Event::RainDelayStop { .. } => write!(msg, "Rain delay finished after {}.", dur),
        Event::FlowUpdate { .. } => write!(
            msg,
            "{:.2} of water delivered at flow rate of {:.2} during last {}.",
            volume, rate, dur
        ),
        Event::WeatherCall { success: true } => write!(msg, "Weather call succeeded."),
        Event::WeatherCall { success: false } => write!(msg, "Weather call failed."),
        Event::WaterLevel { percent } => write!(msg, "Water level set to {}%.", percent),
        Event::IpUpdate { ip } => {
            write!(msg, "External IP address updated to {}.", Ipv4Addr::from(*ip))
        }
        Event::RebootComplete => write!(
            msg,
            "Controller restarted at {}.",
            local_time(at, utc_offset)
        ),
    };
    msg
}

fn round2(x: f32) -> f64 {
    (x as f64 * 100.0).round() / 100.0
}

/// Single most relevant value of an event
///
/// Names for program and station events, numbers for sensor and weather
/// events, the address for IP updates.
pub fn value(event: &Event, at: Timestamp, names: &dyn NameLookup) -> Value {
    if let Some((_, name)) = subject(event, names) {
        return json!(name);
    }
    match event {
        Event::RainSensorOn => json!(1),
        Event::RainSensorOff { .. } => json!(0),
        Event::RainDelayStart { duration } | Event::RainDelayStop { duration } => json!(duration),
        Event::FlowUpdate { .. } => {
            let (_, rate) = volume_and_rate(event, at).unwrap_or((0.0, 0.0));
            json!(round2(rate))
        }
        Event::WeatherCall { success } => json!(*success as u8),
        Event::WaterLevel { percent } => json!(percent),
        Event::IpUpdate { ip } => json!(Ipv4Addr::from(*ip).to_string()),
        Event::RebootComplete => json!("Restart"),
        _ => Value::Null,
    }
}

/// JSON envelope: `{"timestamp", "type", "data": {...}}`
pub fn json(event: &Event, at: Timestamp, names: &dyn NameLookup) -> Value {
    let sp = span(event, at);
    let subject = subject(event, names);
    let mut data = Map::new();
    data.insert("unit".into(), json!(names.unit_name()));
    if let Some((id, name)) = &subject {
        data.insert("id".into(), json!(id));
        data.insert("name".into(), json!(name));
    }
    data.insert("start".into(), json!(sp.start));
    if sp.duration > 0 || matches!(event, Event::StationClose(_) | Event::ProgramStop(_)) {
        data.insert("end".into(), json!(sp.end));
        data.insert("duration".into(), json!(sp.duration));
    }
    match event {
        Event::WaterLevel { percent } => {
            data.insert("level".into(), json!(percent));
        }
        _ => {
            if let Some(wl) = water_level(event) {
                data.insert("water_level".into(), json!(wl));
            }
        }
    }
    if let Some((volume, rate)) = volume_and_rate(event, at) {
        data.insert("volume".into(), json!(round2(volume)));
        data.insert("flow".into(), json!(round2(rate)));
    }
    // Run events carry their state in `type`
    if let (None, Some(status)) = (&subject, status(event)) {
        data.insert("status".into(), json!(status));
    }
    if let Event::IpUpdate { ip } = event {
        data.insert("ip".into(), json!(Ipv4Addr::from(*ip).to_string()));
    }

    json!({
        "timestamp": at,
        "type": type_name(event),
        "data": Value::Object(data),
    })
}

fn tag_value(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '=')
        .collect()
}

/// InfluxDB line protocol, server-assigned timestamp
///
/// `<category>,unit_tag=<unit>[,name_tag=<name>] <fields>`, times in
/// milliseconds.
pub fn influx(event: &Event, at: Timestamp, names: &dyn NameLookup) -> String {
    let sp = span(event, at);
    let unit = tag_value(&names.unit_name());
    let mut line = format!(
        "{},unit_tag={}",
        category(event),
        if unit.is_empty() { "irrigo" } else { unit.as_str() }
    );
    let subject = subject(event, names);
    if let Some((_, name)) = &subject {
        let _ = write!(line, ",name_tag={}", tag_value(name));
    }

    let mut fields: Vec<String> = Vec::new();
    if let Some(status) = status(event) {
        fields.push(format!("status={}i", status));
    }
    if let Some((id, name)) = &subject {
        fields.push(format!("id={}i", id));
        fields.push(format!("name=\"{}\"", name.replace('"', "\\\"")));
    }
    fields.push(format!("start={}000i", sp.start));
    if sp.duration > 0 || matches!(event, Event::StationClose(_) | Event::ProgramStop(_)) {
        fields.push(format!("end={}000i", sp.end));
        fields.push(format!("duration={}i", sp.duration));
    }
    match event {
        Event::WaterLevel { percent } => fields.push(format!("level={}i", percent)),
        _ => {
            if let Some(wl) = water_level(event) {
                fields.push(format!("water_level={}i", wl));
            }
        }
    }
    if let Some((volume, rate)) = volume_and_rate(event, at) {
        fields.push(format!("volume={:.2},flow={:.2}", volume, rate));
    }
    if let Event::IpUpdate { ip } = event {
        fields.push(format!("ip=\"{}\"", Ipv4Addr::from(*ip)));
    }

    let _ = write!(line, " {}", fields.join(","));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use irrigo_core::{ProgramReport, RunReport};

    const T: Timestamp = 1_704_088_800; // 2024-01-01 06:00:00 UTC

    struct Garden;

    impl NameLookup for Garden {
        fn unit_name(&self) -> String {
            "Back Yard".into()
        }
        fn station_name(&self, _sid: StationId) -> String {
            "Rose Bed".into()
        }
        fn program_name(&self, _p: ProgramId) -> String {
            "Morning".into()
        }
    }

    fn close() -> RunReport {
        RunReport {
            station: 2,
            program: ProgramId::Stored(1),
            start: T,
            duration: 125,
            water_level: 80,
            volume: 10.0,
        }
    }

    #[test]
    fn test_default_names() {
        assert_eq!(DefaultNames.station_name(0), "S01");
        assert_eq!(DefaultNames.station_name(199), "S200");
        assert_eq!(DefaultNames.program_name(ProgramId::Stored(3)), "Program 3");
        assert_eq!(DefaultNames.unit_name(), "");
    }

    #[test]
    fn test_spans() {
        assert_eq!(
            span(&Event::StationClose(close()), T + 125),
            Span { start: T, end: T + 125, duration: 125 }
        );
        assert_eq!(
            span(&Event::RainDelayStart { duration: 3600 }, T),
            Span { start: T, end: T + 3600, duration: 3600 }
        );
        assert_eq!(
            span(&Event::RainSensorOff { duration: 30 }, T),
            Span { start: T - 30, end: T, duration: 30 }
        );
        assert_eq!(span(&Event::RebootComplete, T), Span { start: T, end: T, duration: 0 });
    }

    #[test]
    fn test_local_time_offset() {
        assert_eq!(local_time(T, 0), "2024-01-01 06:00:00");
        assert_eq!(local_time(T, -5 * 3600), "2024-01-01 01:00:00");
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(5), "5 s");
        assert_eq!(human_duration(125), "2 min 5 s");
        assert_eq!(human_duration(3_725), "1 h 2 min 5 s");
    }

    #[test]
    fn test_text_messages() {
        assert_eq!(
            text(&Event::StationClose(close()), T + 125, &DefaultNames, 0),
            "Station S03 ran for 2 min 5 s with volume of 10.00 and flow rate at 4.80."
        );
        assert_eq!(
            text(&Event::StationOpen(close()), T, &Garden, 0),
            "Back Yard: Station Rose Bed running for 2 min 5 s with water level of 80%."
        );
        assert_eq!(
            text(&Event::IpUpdate { ip: 0x0a00_0001 }, T, &DefaultNames, 0),
            "External IP address updated to 10.0.0.1."
        );
        assert_eq!(
            text(&Event::RebootComplete, T, &DefaultNames, 3600),
            "Controller restarted at 2024-01-01 07:00:00."
        );
        assert_eq!(
            text(&Event::RainSensorOff { duration: 90 }, T, &DefaultNames, 0),
            "Rain sensor de-activated after 1 min 30 s."
        );
    }

    #[test]
    fn test_values() {
        assert_eq!(value(&Event::StationClose(close()), T, &Garden), json!("Rose Bed"));
        assert_eq!(value(&Event::RainSensorOn, T, &DefaultNames), json!(1));
        assert_eq!(value(&Event::WeatherCall { success: false }, T, &DefaultNames), json!(0));
        assert_eq!(value(&Event::WaterLevel { percent: 70 }, T, &DefaultNames), json!(70));
        assert_eq!(
            value(&Event::FlowUpdate { volume: 3.0, duration: 30 }, T, &DefaultNames),
            json!(6.0)
        );
        assert_eq!(value(&Event::RebootComplete, T, &DefaultNames), json!("Restart"));
    }

    #[test]
    fn test_json_station_close() {
        let v = json(&Event::StationClose(close()), T + 125, &DefaultNames);
        assert_eq!(v["timestamp"], T + 125);
        assert_eq!(v["type"], "station_close");
        let data = &v["data"];
        assert_eq!(data["id"], 2);
        assert_eq!(data["name"], "S03");
        assert_eq!(data["start"], T);
        assert_eq!(data["end"], T + 125);
        assert_eq!(data["duration"], 125);
        assert_eq!(data["water_level"], 80);
        assert_eq!(data["volume"], 10.0);
        assert_eq!(data["flow"], 4.8);
        assert!(data.get("status").is_none());
    }

    #[test]
    fn test_json_sensor_and_ip() {
        let v = json(&Event::RainSensorOff { duration: 30 }, T, &DefaultNames);
        assert_eq!(v["type"], "rain_sensor");
        assert_eq!(v["data"]["status"], 0);
        assert_eq!(v["data"]["start"], T - 30);

        let v = json(&Event::IpUpdate { ip: 0xc0a8_0102 }, T, &DefaultNames);
        assert_eq!(v["type"], "ip_update");
        assert_eq!(v["data"]["ip"], "192.168.1.2");

        let v = json(&Event::WaterLevel { percent: 70 }, T, &DefaultNames);
        assert_eq!(v["data"]["level"], 70);
    }

    #[test]
    fn test_influx_lines() {
        assert_eq!(
            influx(&Event::StationClose(close()), T + 125, &Garden),
            format!(
                "station,unit_tag=BackYard,name_tag=RoseBed \
                 status=0i,id=2i,name=\"Rose Bed\",start={}000i,end={}000i,duration=125i,\
                 water_level=80i,volume=10.00,flow=4.80",
                T,
                T + 125
            )
        );
        assert_eq!(
            influx(&Event::RebootComplete, 5, &DefaultNames),
            "reboot,unit_tag=irrigo start=5000i"
        );
        assert_eq!(
            influx(&Event::WeatherCall { success: true }, 1, &DefaultNames),
            "weather_call,unit_tag=irrigo status=1i,start=1000i"
        );
        let report = ProgramReport {
            program: ProgramId::Stored(2),
            start: 100,
            end: 160,
            water_level: 50,
            volume: 0.0,
        };
        assert_eq!(
            influx(&Event::ProgramStart(report), 100, &DefaultNames),
            "program,unit_tag=irrigo,name_tag=Program2 \
             status=2i,id=2i,name=\"Program 2\",start=100000i,end=160000i,duration=60i,water_level=50i"
        );
    }
}
