use anyhow::{Context, Result};
use obd2_lib::constants::CATALOG_DUMP_FILE;
use obd2_lib::response::Response;
use obd2_lib::scan::ScanReport;
use obd2_lib::{DeviceSession, StandardCatalog, normalize, write_catalog_dump};
use std::fs::{self, File};
use std::path::Path;

/// Print vehicle info, the supported PID table and current values, then dump the table to CSV.
pub async fn run<S: DeviceSession>(session: &mut S, catalog: &StandardCatalog, output_dir: &Path) -> Result<()> {
    let report = obd2_lib::scan(session, catalog).await?;

    print_vehicle_info(&report);
    print_supported(&report);

    fs::create_dir_all(output_dir).with_context(|| format!("Failed to create {:?}", output_dir))?;
    let path = output_dir.join(CATALOG_DUMP_FILE);
    let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    write_catalog_dump(file, &report.supported)?;
    println!("\nSaved to {}", path.display());

    print_values(&report);
    Ok(())
}

fn print_vehicle_info(report: &ScanReport) {
    println!("\n=== Vehicle Information (Mode 09) ===");
    for entry in &report.vehicle_info {
        match &entry.response {
            Response::Null => println!("  {}: (not supported)", entry.command.name),
            response => println!("  {}: {}", entry.command.name, response),
        }
    }
}

fn print_supported(report: &ScanReport) {
    println!("\n=== Supported Mode 01 PIDs ({}) ===", report.supported.len());
    println!("  {:<6} {:<35} Description", "PID", "Name");
    println!("  {:<6} {:<35} ---", "---", "---");
    for command in &report.supported {
        println!("  {:<6} {:<35} {}", command.code(), command.name, command.description);
    }
}

fn print_values(report: &ScanReport) {
    println!("\n=== Current Values ===");
    println!("  {:<6} {:<30} {:<15} Unit", "PID", "Name", "Value");
    println!("  {:<6} {:<30} {:<15} ---", "---", "---", "---");
    for entry in report.values.iter().filter(|e| !e.response.is_null()) {
        let command = &entry.command;
        match normalize(&entry.response) {
            Some((value, unit)) => println!("  {:<6} {:<30} {:<15.2} {}", command.code(), command.name, value, unit),
            None => {
                let shown: String = entry.response.to_string().chars().take(50).collect();
                println!("  {:<6} {:<30} {:<15} {}", command.code(), command.name, "(non-numeric)", shown)
            }
        }
    }
    println!(
        "\n  Numeric PIDs: {}/{} (usable for recording)",
        report.recordable_count(),
        report.supported.len()
    );
}
