pub mod command;
pub mod constants;
pub mod decode;
pub mod device;
pub mod engine;
pub mod error;
pub mod log;
pub mod resolver;
pub mod response;
pub mod scan;
pub mod serial;
pub mod session;
pub mod simulator;
pub mod stats;

// Re-export the main entry points for easy access
pub use command::{CommandCatalog, CommandDescriptor, CommandKey, StandardCatalog};
pub use device::{Elm327, Elm327Config};
pub use engine::{Progress, RecordOptions, RecordingEngine, SessionSummary};
pub use error::{ObdError, SessionError};
pub use log::{CsvLog, Reading, RecordSink, write_catalog_dump};
pub use resolver::{Resolution, resolve};
pub use response::{Response, normalize};
pub use scan::{ScanReport, scan};
pub use serial::SerialPort;
pub use session::DeviceSession;
pub use simulator::{Profile, SimulatedSession};
pub use stats::{PidStats, StatsAggregator};
