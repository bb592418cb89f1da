//! Turns a user PID list into the ordered command list to poll.

use crate::command::{CommandCatalog, CommandDescriptor, CommandKey};
use crate::constants::LIVE_DATA_SERVICE;
use crate::error::ObdError;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Commands to poll, in polling order, without duplicates.
    pub commands: Vec<CommandDescriptor>,
    /// Tokens that did not resolve; each one was reported as a warning.
    pub unknown: Vec<String>,
}

/// Service 01 commands the device supports, bitmap entries excluded, sorted by key.
///
/// An empty result is valid here; scanning a vehicle without live data is not an error.
pub fn supported_live_data(supported: &BTreeSet<CommandDescriptor>) -> Vec<CommandDescriptor> {
    supported
        .iter()
        .filter(|c| c.service == LIVE_DATA_SERVICE && !c.is_support_bitmap())
        .cloned()
        .collect()
}

/// Resolve a comma-separated PID list, or every supported live-data PID when `pids` is `None`.
///
/// Tokens are symbolic names (`RPM`) or a 2-digit decimal service followed by a
/// 2-digit hex PID (`010C`). Unknown tokens are skipped with a warning. An
/// explicit list keeps the order of its tokens; the first occurrence of a
/// repeated command wins.
pub fn resolve(
    pids: Option<&str>,
    catalog: &impl CommandCatalog,
    supported: &BTreeSet<CommandDescriptor>,
) -> Result<Resolution, ObdError> {
    let resolution = match pids {
        None => Resolution {
            commands: supported_live_data(supported),
            unknown: Vec::new(),
        },
        Some(list) => resolve_list(list, catalog),
    };

    if resolution.commands.is_empty() {
        return Err(ObdError::NoPidsResolved);
    }
    Ok(resolution)
}

fn resolve_list(list: &str, catalog: &impl CommandCatalog) -> Resolution {
    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();

    for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match resolve_token(token, catalog) {
            Some(command) => {
                if seen.insert(command.key()) {
                    resolution.commands.push(command.clone());
                }
            }
            None => {
                warn!("{}, skipping.", ObdError::UnknownPid(token.to_string()));
                resolution.unknown.push(token.to_string());
            }
        }
    }
    resolution
}

fn resolve_token<'a>(token: &str, catalog: &'a impl CommandCatalog) -> Option<&'a CommandDescriptor> {
    if let Some(command) = catalog.by_name(token).filter(|c| c.service == LIVE_DATA_SERVICE) {
        return Some(command);
    }
    parse_code(token).and_then(|key| catalog.lookup(key))
}

/// Parse `SSPP`: decimal service digits followed by hex PID digits.
fn parse_code(token: &str) -> Option<CommandKey> {
    if token.len() != 4 || !token.is_ascii() {
        return None;
    }
    let (service, pid) = token.split_at(2);
    if !service.bytes().all(|b| b.is_ascii_digit()) || !pid.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let service = service.parse::<u8>().ok()?;
    let pid = u8::from_str_radix(pid, 16).ok()?;
    Some(CommandKey::new(service, pid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("010C"), Some(CommandKey::new(1, 0x0C)));
        assert_eq!(parse_code("010c"), Some(CommandKey::new(1, 0x0C)));
        assert_eq!(parse_code("0902"), Some(CommandKey::new(9, 0x02)));
        assert_eq!(parse_code("0A0C"), None);
        assert_eq!(parse_code("010"), None);
        assert_eq!(parse_code("010C0"), None);
        assert_eq!(parse_code("01XZ"), None);
        assert_eq!(parse_code("+10C"), None);
    }
}
