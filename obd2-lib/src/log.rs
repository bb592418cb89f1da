//! Durable CSV output: the per-session recording log and the catalog dump.

use crate::command::CommandDescriptor;
use crate::constants::{CATALOG_DUMP_HEADER, LOG_FILE_STAMP_FORMAT, LOG_HEADER, LOG_TIMESTAMP_FORMAT};
use crate::error::ObdError;
use chrono::{DateTime, Local};
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One successful numeric query.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Local>,
    pub command: CommandDescriptor,
    pub value: f64,
    pub unit: String,
}

impl Reading {
    pub fn new(command: &CommandDescriptor, value: f64, unit: &str) -> Self {
        Self {
            timestamp: Local::now(),
            command: command.clone(),
            value,
            unit: unit.to_string(),
        }
    }
}

/// Destination of recorded readings.
pub trait RecordSink {
    fn write_header(&mut self) -> Result<(), ObdError>;
    fn append(&mut self, reading: &Reading) -> Result<(), ObdError>;
    fn flush(&mut self) -> Result<(), ObdError>;
}

/// `timestamp,pid,name,value,unit` CSV log.
pub struct CsvLog<W: Write> {
    writer: Writer<W>,
    path: Option<PathBuf>,
    rows: u64,
}

impl CsvLog<File> {
    /// Create `capture_YYYYMMDD_HHMMSS.csv` in `dir`, creating `dir` if needed.
    pub fn create(dir: &Path, started_at: DateTime<Local>) -> Result<Self, ObdError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("capture_{}.csv", started_at.format(LOG_FILE_STAMP_FORMAT)));
        let file = File::create(&path)?;
        debug!("Opened recording log {}", path.display());

        let mut log = Self::from_writer(file);
        log.path = Some(path);
        Ok(log)
    }
}

impl<W: Write> CsvLog<W> {
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: WriterBuilder::new().has_headers(false).from_writer(inner),
            path: None,
            rows: 0,
        }
    }

    /// File path, when the log was opened with [`CsvLog::create`].
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Data rows written so far, header excluded.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, ObdError> {
        self.writer
            .into_inner()
            .map_err(|e| ObdError::Io(io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

impl<W: Write> RecordSink for CsvLog<W> {
    fn write_header(&mut self) -> Result<(), ObdError> {
        self.writer.write_record(LOG_HEADER)?;
        Ok(())
    }

    fn append(&mut self, reading: &Reading) -> Result<(), ObdError> {
        self.writer.write_record([
            reading.timestamp.format(LOG_TIMESTAMP_FORMAT).to_string(),
            reading.command.code(),
            reading.command.name.clone(),
            reading.value.to_string(),
            reading.unit.clone(),
        ])?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ObdError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CatalogRow<'a> {
    pid: String,
    name: &'a str,
    description: &'a str,
}

/// Write the `pid,name,description` listing of `commands`.
pub fn write_catalog_dump<W: Write>(writer: W, commands: &[CommandDescriptor]) -> Result<(), ObdError> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(CATALOG_DUMP_HEADER)?;
    for command in commands {
        wtr.serialize(CatalogRow {
            pid: command.code(),
            name: &command.name,
            description: &command.description,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Decoder;
    use chrono::TimeZone;

    fn rpm() -> CommandDescriptor {
        CommandDescriptor::new(1, 0x0C, "RPM", "Engine RPM", Decoder::Rpm)
    }

    #[test]
    fn test_log_row_format() {
        let mut log = CsvLog::from_writer(Vec::new());
        log.write_header().unwrap();
        let reading = Reading {
            timestamp: Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            command: rpm(),
            value: 812.5,
            unit: "rpm".into(),
        };
        log.append(&reading).unwrap();
        log.append(&Reading { unit: String::new(), ..reading }).unwrap();
        assert_eq!(log.rows(), 2);

        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,pid,name,value,unit");
        assert_eq!(lines[1], "2024-03-09T14:05:07.000,010C,RPM,812.5,rpm");
        assert_eq!(lines[2], "2024-03-09T14:05:07.000,010C,RPM,812.5,");
    }

    #[test]
    fn test_create_names_file_after_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let out = dir.path().join("output");

        let mut log = CsvLog::create(&out, started).unwrap();
        log.write_header().unwrap();
        log.flush().unwrap();

        let path = log.path().unwrap().to_path_buf();
        assert_eq!(path, out.join("capture_20240309_140507.csv"));
        assert_eq!(fs::read_to_string(path).unwrap(), "timestamp,pid,name,value,unit\n");
    }

    #[test]
    fn test_catalog_dump_quotes_commas() {
        let commands = vec![
            rpm(),
            CommandDescriptor::new(1, 0x0D, "SPEED", "Vehicle Speed, km/h", Decoder::Speed),
        ];
        let mut out = Vec::new();
        write_catalog_dump(&mut out, &commands).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "pid,name,description\n010C,RPM,Engine RPM\n010D,SPEED,\"Vehicle Speed, km/h\"\n"
        );
    }
}
