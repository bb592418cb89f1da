//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use obd2_lib::command::{CommandCatalog, CommandDescriptor, CommandKey, StandardCatalog};
#[allow(unused_imports)]
pub use obd2_lib::error::{ObdError, SessionError};
#[allow(unused_imports)]
pub use obd2_lib::response::{Measurement, Payload, Response};
#[allow(unused_imports)]
pub use obd2_lib::session::DeviceSession;
#[allow(unused_imports)]
pub use tokio_util::sync::CancellationToken;

use obd2_lib::decode::Decoder;
use std::collections::{BTreeSet, VecDeque};

/// Look up a standard catalog entry by name
#[allow(dead_code)]
pub fn command(name: &str) -> CommandDescriptor {
    StandardCatalog::new()
        .by_name(name)
        .cloned()
        .unwrap_or_else(|| panic!("{name} is not in the standard catalog"))
}

/// Numeric response carrying the physical value `value` as decoded by `command`
#[allow(dead_code)]
pub fn value(command: &CommandDescriptor, value: f64) -> Result<Response, SessionError> {
    Ok(Response::Numeric(
        command.decoder.measurement(value).expect("numeric decoder"),
    ))
}

#[allow(dead_code)]
pub fn null() -> Result<Response, SessionError> {
    Ok(Response::Null)
}

/// DeviceSession test double replaying canned responses in query order.
///
/// Once the script is exhausted every query answers `Null` and, when a token
/// was attached, cancels it.
pub struct ScriptedSession {
    script: VecDeque<Result<Response, SessionError>>,
    supported: BTreeSet<CommandDescriptor>,
    cancel_when_done: Option<CancellationToken>,
    pub queries: Vec<CommandKey>,
    pub closed: bool,
}

#[allow(dead_code)]
impl ScriptedSession {
    pub fn new(script: Vec<Result<Response, SessionError>>) -> Self {
        Self {
            script: script.into(),
            supported: BTreeSet::new(),
            cancel_when_done: None,
            queries: Vec::new(),
            closed: false,
        }
    }

    pub fn supporting(mut self, names: &[&str]) -> Self {
        self.supported = names.iter().map(|n| command(n)).collect();
        self
    }

    pub fn cancel_when_done(mut self, token: CancellationToken) -> Self {
        self.cancel_when_done = Some(token);
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DeviceSession for ScriptedSession {
    async fn query(&mut self, command: &CommandDescriptor) -> Result<Response, SessionError> {
        self.queries.push(command.key());
        match self.script.pop_front() {
            Some(next) => next,
            None => {
                if let Some(token) = &self.cancel_when_done {
                    token.cancel();
                }
                Ok(Response::Null)
            }
        }
    }

    fn supported_commands(&self) -> &BTreeSet<CommandDescriptor> {
        &self.supported
    }

    fn protocol_name(&self) -> &str {
        "Scripted"
    }

    fn port_name(&self) -> &str {
        "scripted"
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        Ok(())
    }
}

/// Descriptor outside the standard catalog, for catalog-independent tests
#[allow(dead_code)]
pub fn custom(service: u8, pid: u8, name: &str) -> CommandDescriptor {
    CommandDescriptor::new(service, pid, name, format!("{name} (custom)"), Decoder::Count)
}
