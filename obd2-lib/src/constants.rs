// Protocol and file-format constants for OBD-II capture

use std::time::Duration;

/// Service 01: current powertrain data
pub const LIVE_DATA_SERVICE: u8 = 0x01;

/// Service 09: vehicle information
pub const VEHICLE_INFO_SERVICE: u8 = 0x09;

/// Positive responses echo the service id with this bit set (0x01 -> 0x41)
pub const RESPONSE_SERVICE_OFFSET: u8 = 0x40;

/// Name prefix of the supported-PIDs bitmap commands (PIDS_A, PIDS_B, ...)
pub const SUPPORT_BITMAP_PREFIX: &str = "PIDS_";

/// Each supported-PIDs bitmap covers the next 32 PIDs
pub const SUPPORT_BITMAP_SPAN: u8 = 0x20;

/// Vehicle information commands queried by a scan, in display order
pub const VEHICLE_INFO_COMMANDS: [&str; 4] = ["VIN", "CALIBRATION_ID", "CVN", "ECU_NAME"];

/// Header row of a recording log
pub const LOG_HEADER: [&str; 5] = ["timestamp", "pid", "name", "value", "unit"];

/// Header row of the supported-PIDs catalog dump
pub const CATALOG_DUMP_HEADER: [&str; 3] = ["pid", "name", "description"];

/// File name of the supported-PIDs catalog dump
pub const CATALOG_DUMP_FILE: &str = "supported_pids.csv";

/// Timestamp format of log rows (ISO 8601, millisecond precision)
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Format of the start-time identifier in recording file names
pub const LOG_FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Default serial device of a Bluetooth SPP ELM327 adapter
pub const DEFAULT_PORT: &str = "/dev/rfcomm0";

/// Default ELM327 serial baud rate
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Time allowed for a single adapter command, protocol search included
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// ELM327 prompt that terminates every response
pub const ELM_PROMPT: u8 = b'>';

/// Size of each serial read
pub const READ_CHUNK_SIZE: usize = 1024;
