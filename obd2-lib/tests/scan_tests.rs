//! Tests for the scan pass and the catalog dump

mod common;

use common::*;
use obd2_lib::log::write_catalog_dump;
use obd2_lib::scan::scan;

#[tokio::test]
async fn test_scan_reports_vehicle_info_supported_list_and_values() {
    let catalog = StandardCatalog::new();
    let rpm = command("RPM");
    let mut session = ScriptedSession::new(vec![
        Ok(Response::text("1HGCM82633A004352")),
        Ok(Response::NonNumeric(Payload::Flags(vec!["MIL=OFF".into(), "DTC_COUNT=0".into()]))),
        value(&rpm, 812.0),
        null(),
    ])
    .supporting(&["PIDS_A", "STATUS", "RPM", "SPEED", "VIN", "PIDS_9A"]);

    let report = scan(&mut session, &catalog).await.unwrap();

    assert_eq!(report.protocol, "Scripted");
    let info: Vec<(&str, String)> = report
        .vehicle_info
        .iter()
        .map(|e| (e.command.name.as_str(), e.response.to_string()))
        .collect();
    assert_eq!(
        info,
        vec![
            ("VIN", "1HGCM82633A004352".to_string()),
            ("CALIBRATION_ID", "(no data)".to_string()),
            ("CVN", "(no data)".to_string()),
            ("ECU_NAME", "(no data)".to_string()),
        ]
    );

    let supported: Vec<&str> = report.supported.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(supported, vec!["STATUS", "RPM", "SPEED"]);

    // Non-numeric values are kept for display; only RPM is recordable
    assert_eq!(report.values.len(), 3);
    assert!(!report.values[0].response.is_null());
    assert!(!report.values[0].is_recordable());
    assert!(report.values[1].is_recordable());
    assert!(report.values[2].response.is_null());
    assert_eq!(report.recordable_count(), 1);

    // Unsupported vehicle-info commands are not sent to the device
    assert_eq!(session.queries.len(), 4);
    assert_eq!(session.remaining(), 0);
}

#[tokio::test]
async fn test_scan_without_live_data_is_not_an_error() {
    let catalog = StandardCatalog::new();
    let mut session = ScriptedSession::new(Vec::new()).supporting(&["PIDS_A"]);

    let report = scan(&mut session, &catalog).await.unwrap();
    assert!(report.supported.is_empty());
    assert!(report.values.is_empty());
    assert!(report.vehicle_info.iter().all(|e| e.response.is_null()));
    assert!(session.queries.is_empty());
}

#[tokio::test]
async fn test_scan_treats_query_failure_as_no_data() {
    let catalog = StandardCatalog::new();
    let mut session = ScriptedSession::new(vec![Err(SessionError::Timeout("010C".into()))]).supporting(&["RPM"]);

    let report = scan(&mut session, &catalog).await.unwrap();
    assert!(report.values[0].response.is_null());
}

#[tokio::test]
async fn test_scan_fails_on_session_loss() {
    let catalog = StandardCatalog::new();
    let mut session =
        ScriptedSession::new(vec![Err(SessionError::Disconnected("gone".into()))]).supporting(&["RPM", "SPEED"]);

    let result = scan(&mut session, &catalog).await;
    assert!(matches!(result, Err(ObdError::SessionFailed { records: 0, .. })));
}

#[tokio::test]
async fn test_catalog_dump_of_scan_results() {
    let catalog = StandardCatalog::new();
    let mut session = ScriptedSession::new(Vec::new()).supporting(&["SPEED", "RPM", "PIDS_A", "VIN"]);
    let report = scan(&mut session, &catalog).await.unwrap();

    let mut out = Vec::new();
    write_catalog_dump(&mut out, &report.supported).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec!["pid,name,description", "010C,RPM,Engine RPM", "010D,SPEED,Vehicle Speed"]
    );
}
