use crate::command::{CommandCatalog, CommandDescriptor, CommandKey};
use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_COMMAND_TIMEOUT, DEFAULT_PORT, ELM_PROMPT, LIVE_DATA_SERVICE, READ_CHUNK_SIZE,
    RESPONSE_SERVICE_OFFSET, SUPPORT_BITMAP_SPAN, VEHICLE_INFO_SERVICE,
};
use crate::error::{ObdError, SessionError};
use crate::response::Response;
use crate::serial::SerialPort;
use crate::session::DeviceSession;
use bytes::BytesMut;
use std::collections::BTreeSet;
use std::future::poll_fn;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::process::Command;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

// Adapter replies that carry no data for the requested PID
const NULL_MARKERS: [&str; 5] = ["NO DATA", "ERROR", "UNABLE TO CONNECT", "STOPPED", "?"];

// Serial device name prefixes offered as hints when a connection fails
const PORT_HINT_PREFIXES: [&str; 3] = ["rfcomm", "tty.OBD", "ttyUSB"];

const STTY_TIMEOUT: Duration = Duration::from_secs(3);
const RESET_SETTLE: Duration = Duration::from_secs(1);

// Line noise after opening the port or resetting the adapter: (max wait, quiet gap)
const OPEN_DRAIN: (Duration, Duration) = (Duration::from_secs(2), Duration::from_millis(500));
const RESET_DRAIN: (Duration, Duration) = (Duration::from_millis(500), Duration::from_millis(200));

// Upper bound on reads when discarding stale input before a command
const DRAIN_MAX_READS: usize = 50;

/// Connection settings for an [`Elm327`] adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elm327Config {
    pub port: String,
    pub baud_rate: u32,
    pub command_timeout: Duration,
}

impl Default for Elm327Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl Elm327Config {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

/// ELM327-compatible adapter on a byte transport, normally a [`SerialPort`].
pub struct Elm327<T = SerialPort> {
    port: T,
    // Bytes read past the last prompt; stale by the time the next command is sent
    pending: BytesMut,
    config: Elm327Config,
    protocol: String,
    supported: BTreeSet<CommandDescriptor>,
}

impl Elm327<SerialPort> {
    /// Open the serial port, initialize the adapter and discover supported commands.
    pub async fn connect(config: Elm327Config, catalog: &impl CommandCatalog) -> Result<Self, ObdError> {
        info!("Opening OBD-II adapter on {}...", config.port);
        let port = SerialPort::open(&config.port).map_err(|e| connection_failed(&config.port, e.to_string()))?;

        configure_port(&config).await;
        Self::with_transport(port, config, catalog).await
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Elm327<T> {
    /// Initialize an adapter reachable over `port` and discover supported commands.
    pub async fn with_transport(port: T, config: Elm327Config, catalog: &impl CommandCatalog) -> Result<Self, ObdError> {
        let mut elm = Self::new(port, config);

        if let Err(e) = elm.initialize().await {
            return Err(connection_failed(&elm.config.port, e.to_string()));
        }
        elm.supported = elm
            .discover_supported(catalog)
            .await
            .map_err(|e| connection_failed(&elm.config.port, e.to_string()))?;

        info!(
            "Connected: protocol {}, {} supported command(s)",
            elm.protocol,
            elm.supported.len()
        );
        Ok(elm)
    }

    fn new(port: T, config: Elm327Config) -> Self {
        Self {
            port,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
            protocol: String::new(),
            supported: BTreeSet::new(),
        }
    }

    async fn initialize(&mut self) -> Result<(), SessionError> {
        self.drain_until_quiet(OPEN_DRAIN).await?;

        // The reset reply is often junk; only the prompt matters
        match self.send_command("ATZ").await {
            Ok(reply) => debug!("ATZ -> {}", sanitize(&reply)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("ATZ: {} (may be normal during reset)", e),
        }
        tokio::time::sleep(RESET_SETTLE).await;
        self.drain_until_quiet(RESET_DRAIN).await?;

        let echo = self.send_command("ATE0").await?;
        if !echo.contains("OK") {
            warn!("ATE0 did not return OK, continuing anyway");
        }
        for cmd in ["ATL0", "ATS0", "ATH0", "ATSP0"] {
            let reply = self.send_command(cmd).await?;
            debug!("{} -> {}", cmd, sanitize(&reply));
        }

        info!("Searching for vehicle protocol...");
        let search = self.send_command("0100").await?;
        if search.to_ascii_uppercase().contains("UNABLE TO CONNECT") {
            warn!("Vehicle not responding (ignition off?)");
        }

        let dpn = self.send_command("ATDPN").await?;
        self.protocol = protocol_name(&dpn);

        let ati = self.send_command("ATI").await?;
        if !ati.contains("ELM327") {
            return Err(SessionError::Query(format!("ELM327 not detected (ATI: {})", sanitize(&ati))));
        }
        info!("{} initialized", ati.trim());
        Ok(())
    }

    /// Walk the supported-PIDs bitmap chains of services 01 and 09.
    async fn discover_supported(
        &mut self,
        catalog: &impl CommandCatalog,
    ) -> Result<BTreeSet<CommandDescriptor>, SessionError> {
        let mut supported = BTreeSet::new();

        for service in [LIVE_DATA_SERVICE, VEHICLE_INFO_SERVICE] {
            let mut base: u8 = 0;
            loop {
                let key = CommandKey::new(service, base);
                let reply = match self.send_command(&key.to_string()).await {
                    Ok(reply) => reply,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("{}: {}", key, e);
                        break;
                    }
                };
                let Some(bits) = parse_response(&reply, key).and_then(|d| bitmap_word(&d)) else {
                    break;
                };

                supported.extend(catalog.lookup(key).cloned());
                supported.extend(supported_keys(service, base, bits).filter_map(|k| catalog.lookup(k).cloned()));

                // Bit 0 flags the next bitmap in the chain
                if bits & 1 == 0 || service == VEHICLE_INFO_SERVICE {
                    break;
                }
                match base.checked_add(SUPPORT_BITMAP_SPAN) {
                    Some(next) => base = next,
                    None => break,
                }
            }
        }
        Ok(supported)
    }

    /// Send one command and collect the reply up to the prompt.
    ///
    /// The whole round trip, write included, is bounded by the command timeout.
    async fn send_command(&mut self, cmd: &str) -> Result<String, SessionError> {
        debug!("-> {}", cmd);
        let reply = timeout(self.config.command_timeout, self.exchange(cmd))
            .await
            .map_err(|_| SessionError::Timeout(cmd.to_string()))??;
        debug!("<- {}", sanitize(&reply));
        Ok(reply)
    }

    async fn exchange(&mut self, cmd: &str) -> Result<String, SessionError> {
        self.discard_input().await?;
        self.port.write_all(format!("{cmd}\r").as_bytes()).await?;
        self.port.flush().await?;
        self.read_until_prompt().await
    }

    async fn read_until_prompt(&mut self) -> Result<String, SessionError> {
        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == ELM_PROMPT) {
                let reply = self.pending.split_to(end + 1);
                return Ok(String::from_utf8_lossy(&reply[..end]).trim().to_string());
            }
            self.pending.reserve(READ_CHUNK_SIZE);
            if self.port.read_buf(&mut self.pending).await? == 0 {
                return Err(SessionError::Disconnected("serial port closed".to_string()));
            }
        }
    }

    /// Drop buffered bytes and whatever the adapter has already sent, without waiting.
    ///
    /// Late replies to timed-out commands would otherwise be read as the
    /// answer to this one.
    async fn discard_input(&mut self) -> Result<(), SessionError> {
        let mut drained = self.pending.len();
        self.pending.clear();

        let mut scratch = [0u8; READ_CHUNK_SIZE];
        for _ in 0..DRAIN_MAX_READS {
            match try_read(&mut self.port, &mut scratch).await? {
                Some(n) if n > 0 => drained += n,
                _ => break,
            }
        }
        if drained > 0 {
            debug!("Drained {} stale byte(s)", drained);
        }
        Ok(())
    }

    /// Read and discard input until the line stays quiet for `quiet`, up to `max_wait`.
    async fn drain_until_quiet(&mut self, (max_wait, quiet): (Duration, Duration)) -> Result<(), SessionError> {
        self.pending.clear();
        let deadline = Instant::now() + max_wait;
        let mut scratch = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut drained = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            scratch.clear();
            match timeout(quiet.min(remaining), self.port.read_buf(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => drained += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }
        if drained > 0 {
            debug!("Drained {} byte(s) of line noise", drained);
        }
        Ok(())
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> DeviceSession for Elm327<T> {
    async fn query(&mut self, command: &CommandDescriptor) -> Result<Response, SessionError> {
        let reply = self.send_command(&command.code()).await?;
        Ok(match parse_response(&reply, command.key()) {
            Some(data) => command.decode(&data),
            None => Response::Null,
        })
    }

    fn supported_commands(&self) -> &BTreeSet<CommandDescriptor> {
        &self.supported
    }

    fn protocol_name(&self) -> &str {
        &self.protocol
    }

    fn port_name(&self) -> &str {
        &self.config.port
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.port.flush().await?;
        info!("Closed {}", self.config.port);
        Ok(())
    }
}

/// One read attempt that never waits: `None` when no input is ready.
async fn try_read<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<Option<usize>> {
    poll_fn(|cx| {
        let mut read_buf = ReadBuf::new(&mut *buf);
        match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(Some(read_buf.filled().len()))),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Ready(Ok(None)),
        }
    })
    .await
}

/// Put the tty into raw mode at the configured baud rate.
///
/// A failure is logged; some adapters work with the existing line settings.
async fn configure_port(config: &Elm327Config) {
    let baud = config.baud_rate.to_string();
    let stty = Command::new("stty")
        .arg("-F")
        .arg(&config.port)
        .args([baud.as_str(), "raw", "-echo", "-echoe", "-echok", "-echoctl", "-echoke", "-hupcl", "clocal"])
        .output();

    match timeout(STTY_TIMEOUT, stty).await {
        Ok(Ok(out)) if out.status.success() => {
            info!("Configured {}: {} baud, raw mode", config.port, config.baud_rate)
        }
        Ok(Ok(out)) => warn!(
            "stty failed (may still work): {}",
            String::from_utf8_lossy(&out.stderr).trim()
        ),
        Ok(Err(e)) => warn!("stty failed (may still work): {}", e),
        Err(_) => warn!("stty timed out (may still work)"),
    }
}

/// Extract the data bytes answering `key` from a raw adapter reply.
///
/// Handles `SEARCHING...` preambles, CAN multi-frame replies (`0: 49 02 01 ...`)
/// and line-per-message legacy replies. Returns `None` for adapter error
/// replies or when no line echoes the expected service and PID.
pub fn parse_response(raw: &str, key: CommandKey) -> Option<Vec<u8>> {
    let upper = raw.to_ascii_uppercase();
    if NULL_MARKERS.iter().any(|m| upper.contains(m)) {
        return None;
    }

    let header = [key.service.wrapping_add(RESPONSE_SERVICE_OFFSET), key.pid];
    let mut data = Vec::new();
    let mut found = false;

    for line in upper.split(['\r', '\n']).map(str::trim).filter(|l| !l.is_empty()) {
        let line = match line.split_once(':') {
            Some((_, frame)) => frame,
            // A bare short number is the byte count of a multi-frame reply
            None if line.len() <= 3 => continue,
            None => line,
        };
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        let Ok(bytes) = hex::decode(&compact) else {
            continue;
        };
        if let Some(rest) = bytes.strip_prefix(&header[..]) {
            found = true;
            data.extend_from_slice(rest);
        } else if found {
            data.extend_from_slice(&bytes);
        }
    }

    found.then_some(data)
}

fn bitmap_word(data: &[u8]) -> Option<u32> {
    let word: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(word))
}

/// PIDs flagged in a bitmap that starts right after `base`. MSB is `base + 1`.
pub fn supported_keys(service: u8, base: u8, bits: u32) -> impl Iterator<Item = CommandKey> {
    (0..32u16)
        .filter(move |i| bits & (1 << (31 - i)) != 0)
        .map(move |i| base as u16 + i + 1)
        .filter(|pid| *pid <= u8::MAX as u16)
        .map(move |pid| CommandKey::new(service, pid as u8))
}

fn protocol_name(dpn: &str) -> String {
    let id = dpn.trim().trim_start_matches('A');
    let name = match id {
        "1" => "SAE J1850 PWM",
        "2" => "SAE J1850 VPW",
        "3" => "ISO 9141-2",
        "4" => "ISO 14230-4 (KWP 5BAUD)",
        "5" => "ISO 14230-4 (KWP FAST)",
        "6" => "ISO 15765-4 (CAN 11/500)",
        "7" => "ISO 15765-4 (CAN 29/500)",
        "8" => "ISO 15765-4 (CAN 11/250)",
        "9" => "ISO 15765-4 (CAN 29/250)",
        "A" => "SAE J1939 (CAN 29/250)",
        _ => return format!("Unknown ({})", dpn.trim()),
    };
    name.to_string()
}

fn sanitize(s: &str) -> String {
    s.replace('\r', "\\r").replace('\n', "\\n").chars().take(200).collect()
}

fn connection_failed(port: &str, reason: String) -> ObdError {
    let candidates = candidate_ports(Path::new("/dev"));
    let hint = if candidates.is_empty() {
        "no candidate serial ports found (/dev/rfcomm*, /dev/tty.OBD*, /dev/ttyUSB*)".to_string()
    } else {
        format!("candidate ports: {}", candidates.join(", "))
    };
    ObdError::ConnectionFailed {
        port: port.to_string(),
        reason: format!("{reason}; {hint}"),
    }
}

/// Serial devices under `dir` that look like OBD-II adapters.
pub fn candidate_ports(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut ports: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            PORT_HINT_PREFIXES.iter().any(|p| name.starts_with(p))
        })
        .map(|e| e.path().display().to_string())
        .collect();
    ports.sort();
    ports
}
