//! Tests for the simulated device session

mod common;

use common::*;
use obd2_lib::engine::{RecordOptions, RecordingEngine};
use obd2_lib::log::CsvLog;
use obd2_lib::resolver::supported_live_data;
use obd2_lib::response::normalize;
use obd2_lib::simulator::{Profile, SimulatedSession};
use std::time::Duration;

async fn sample(session: &mut SimulatedSession, name: &str) -> Option<(f64, &'static str)> {
    let response = session.query(&command(name)).await.unwrap();
    normalize(&response)
}

#[tokio::test]
async fn test_every_profile_pid_is_supported() {
    let catalog = StandardCatalog::new();
    for profile in Profile::ALL {
        let session = SimulatedSession::new(profile, &catalog);
        let live = supported_live_data(session.supported_commands());
        assert_eq!(live.len(), 10, "{profile}");
        assert!(session.supported_commands().contains(&command("VIN")));
        assert!(!session.supported_commands().contains(&command("PIDS_A")));
        assert_eq!(session.port_name(), format!("simulator:{profile}"));
    }
}

#[tokio::test]
async fn test_vehicle_info_is_text_and_unsupported_is_null() {
    let catalog = StandardCatalog::new();
    let mut session = SimulatedSession::new(Profile::Idle, &catalog);

    let vin = session.query(&command("VIN")).await.unwrap();
    assert!(matches!(vin, Response::NonNumeric(Payload::Text(ref s)) if s.len() == 17));
    assert!(session.query(&command("OIL_TEMP")).await.unwrap().is_null());
}

#[tokio::test(start_paused = true)]
async fn test_idle_patterns() {
    let catalog = StandardCatalog::new();
    let mut session = SimulatedSession::new(Profile::Idle, &catalog).with_seed(7);

    assert_eq!(sample(&mut session, "SPEED").await, Some((0.0, "km/h")));
    assert_eq!(sample(&mut session, "BAROMETRIC_PRESSURE").await, Some((101.0, "kPa")));
    assert_eq!(sample(&mut session, "RPM").await, Some((750.0, "rpm")));

    // A quarter of the 5 s period puts the sine at its peak
    tokio::time::advance(Duration::from_millis(1250)).await;
    let (rpm, _) = sample(&mut session, "RPM").await.unwrap();
    assert!((rpm - 800.0).abs() < 1e-6, "rpm = {rpm}");
}

#[tokio::test]
async fn test_seeded_random_walks_are_deterministic_and_bounded() {
    let catalog = StandardCatalog::new();
    let mut a = SimulatedSession::new(Profile::City, &catalog).with_seed(42);
    let mut b = SimulatedSession::new(Profile::City, &catalog).with_seed(42);

    for _ in 0..200 {
        let (va, unit) = sample(&mut a, "RPM").await.unwrap();
        let (vb, _) = sample(&mut b, "RPM").await.unwrap();
        assert_eq!(va, vb);
        assert_eq!(unit, "rpm");
        assert!((700.0..=4500.0).contains(&va), "rpm = {va}");

        let (speed, _) = sample(&mut a, "SPEED").await.unwrap();
        sample(&mut b, "SPEED").await.unwrap();
        assert!((0.0..=80.0).contains(&speed), "speed = {speed}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_recording_from_the_simulator() {
    let catalog = StandardCatalog::new();
    let mut session = SimulatedSession::new(Profile::Highway, &catalog).with_seed(1);
    let commands = supported_live_data(session.supported_commands());
    let mut sink = CsvLog::from_writer(Vec::new());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        trigger.cancel();
    });

    let summary = RecordingEngine::new(RecordOptions::new().interval(Duration::from_secs(1)))
        .run(&mut session, &commands, &mut sink, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.cycles, 11);
    assert_eq!(summary.record_count, 11 * commands.len() as u64);
    assert_eq!(summary.stats.len(), commands.len());
    for stats in &summary.stats {
        assert_eq!(stats.count, 11);
        assert!(stats.min <= stats.average() && stats.average() <= stats.max);
    }
    let speed = summary.stats.iter().find(|s| s.name == "SPEED").unwrap();
    assert!(speed.min >= 90.0 && speed.max <= 110.0);
}
