use crate::command::CommandDescriptor;
use crate::error::SessionError;
use crate::response::Response;
use std::collections::BTreeSet;

/// A connected diagnostic adapter.
///
/// Queries are strictly sequential request/response round-trips; the engine
/// never issues a second query before the first one returns.
#[allow(async_fn_in_trait)]
pub trait DeviceSession {
    /// Issue one query.
    ///
    /// `Ok(Response::Null)` means the PID is unsupported or has no data right
    /// now. An `Err` whose [`SessionError::is_fatal`] is false only affects
    /// this query.
    async fn query(&mut self, command: &CommandDescriptor) -> Result<Response, SessionError>;

    /// Commands the connected vehicle reports as supported.
    fn supported_commands(&self) -> &BTreeSet<CommandDescriptor>;

    /// Human-readable name of the negotiated vehicle protocol.
    fn protocol_name(&self) -> &str;

    /// Identifier of the underlying transport (port path, profile name, ...).
    fn port_name(&self) -> &str;

    /// Release the transport.
    async fn close(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}
