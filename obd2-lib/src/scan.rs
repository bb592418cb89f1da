//! One-shot discovery pass over a connected vehicle.

use crate::command::{CommandCatalog, CommandDescriptor};
use crate::constants::VEHICLE_INFO_COMMANDS;
use crate::error::ObdError;
use crate::resolver::supported_live_data;
use crate::response::{Response, normalize};
use crate::session::DeviceSession;
use tracing::{info, warn};

/// A command together with the single response it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    pub command: CommandDescriptor,
    pub response: Response,
}

impl ScanEntry {
    pub fn is_recordable(&self) -> bool {
        normalize(&self.response).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub port: String,
    pub protocol: String,
    /// Vehicle information (VIN, calibration, ...). Unsupported entries hold [`Response::Null`].
    pub vehicle_info: Vec<ScanEntry>,
    /// Supported service 01 commands, sorted by key. May be empty.
    pub supported: Vec<CommandDescriptor>,
    /// Current value of every supported command, in the same order.
    pub values: Vec<ScanEntry>,
}

impl ScanReport {
    pub fn recordable_count(&self) -> usize {
        self.values.iter().filter(|e| e.is_recordable()).count()
    }
}

/// Query vehicle info, list the supported live-data PIDs and read each one once.
///
/// Recoverable query failures show up as [`Response::Null`]. Session loss
/// aborts the scan with [`ObdError::SessionFailed`].
pub async fn scan<S: DeviceSession>(session: &mut S, catalog: &impl CommandCatalog) -> Result<ScanReport, ObdError> {
    let mut vehicle_info = Vec::new();
    for name in VEHICLE_INFO_COMMANDS {
        let Some(command) = catalog.by_name(name) else {
            continue;
        };
        let response = if session.supported_commands().contains(command) {
            query_once(session, command).await?
        } else {
            Response::Null
        };
        vehicle_info.push(ScanEntry {
            command: command.clone(),
            response,
        });
    }

    let supported = supported_live_data(session.supported_commands());
    info!("{} supported live-data PID(s) on {}", supported.len(), session.port_name());

    let mut values = Vec::with_capacity(supported.len());
    for command in &supported {
        let response = query_once(session, command).await?;
        values.push(ScanEntry {
            command: command.clone(),
            response,
        });
    }

    Ok(ScanReport {
        port: session.port_name().to_string(),
        protocol: session.protocol_name().to_string(),
        vehicle_info,
        supported,
        values,
    })
}

async fn query_once<S: DeviceSession>(session: &mut S, command: &CommandDescriptor) -> Result<Response, ObdError> {
    match session.query(command).await {
        Ok(response) => Ok(response),
        Err(e) if e.is_fatal() => Err(ObdError::SessionFailed { records: 0, source: e }),
        Err(e) => {
            warn!("{}: {}", command, e);
            Ok(Response::Null)
        }
    }
}
