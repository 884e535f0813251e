//! Outbound command formatting for the LR2 dialects, plus the hex codec the
//! line protocol uses for payloads.

use core::fmt::Write as _;

use heapless::String;

/// Longest payload `mac tx` accepts.
pub const MAX_MAC_PAYLOAD: usize = 222;
/// Longest payload `radio tx` accepts.
pub const MAX_RADIO_PAYLOAD: usize = 255;

/// Capacity for one formatted command line: `radio tx` with a maximum
/// payload in hex, plus the CR/LF terminator.
pub(crate) const COMMAND_CAPACITY: usize = 544;

pub(crate) type CommandLine = String<COMMAND_CAPACITY>;

/// Which command dialect a cycle is running, and therefore which reply
/// completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `mac tx <cnf|uncnf> <port> <hex>`, completed by `mac_tx_ok`.
    MacTx,
    /// `mac join <otaa|abp>`, completed by `accepted`.
    Join,
    /// `radio tx <hex>`, completed by `radio_tx_ok`.
    RadioTx,
    /// `radio rx <window>`, completed by a `radio_rx <hex>` line.
    RadioRx,
    /// A raw configuration command, completed by `ok`.
    Raw,
}

impl CommandKind {
    /// The token that completes this dialect successfully.
    pub(crate) fn success_token(self) -> &'static [u8] {
        match self {
            CommandKind::MacTx => b"mac_tx_ok",
            CommandKind::Join => b"accepted",
            CommandKind::RadioTx => b"radio_tx_ok",
            CommandKind::RadioRx => b"radio_rx",
            CommandKind::Raw => b"ok",
        }
    }

    /// Whether the success reply carries data after the token.
    pub(crate) fn reply_has_payload(self) -> bool {
        matches!(self, CommandKind::RadioRx)
    }
}

/// Activation flavor for `mac join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Over-the-air activation.
    Otaa,
    /// Activation by personalization.
    Abp,
}

pub(crate) fn mac_tx(payload: &[u8], port: u8, confirmed: bool) -> Result<CommandLine, ()> {
    if payload.len() > MAX_MAC_PAYLOAD {
        return Err(());
    }
    let kind = if confirmed { "cnf" } else { "uncnf" };
    let mut line = CommandLine::new();
    write!(line, "mac tx {kind} {port} ").map_err(drop)?;
    push_hex(&mut line, payload)?;
    line.push_str("\r\n")?;
    Ok(line)
}

pub(crate) fn join(mode: JoinMode) -> Result<CommandLine, ()> {
    let mode = match mode {
        JoinMode::Otaa => "otaa",
        JoinMode::Abp => "abp",
    };
    let mut line = CommandLine::new();
    write!(line, "mac join {mode}\r\n").map_err(drop)?;
    Ok(line)
}

pub(crate) fn radio_tx(payload: &[u8]) -> Result<CommandLine, ()> {
    if payload.len() > MAX_RADIO_PAYLOAD {
        return Err(());
    }
    let mut line = CommandLine::new();
    line.push_str("radio tx ")?;
    push_hex(&mut line, payload)?;
    line.push_str("\r\n")?;
    Ok(line)
}

pub(crate) fn radio_rx(window_ms: u16) -> Result<CommandLine, ()> {
    let mut line = CommandLine::new();
    write!(line, "radio rx {window_ms}\r\n").map_err(drop)?;
    Ok(line)
}

pub(crate) fn raw(command: &str) -> Result<CommandLine, ()> {
    let mut line = CommandLine::new();
    line.push_str(command)?;
    line.push_str("\r\n")?;
    Ok(line)
}

fn push_hex(line: &mut CommandLine, bytes: &[u8]) -> Result<(), ()> {
    for byte in bytes {
        write!(line, "{byte:02X}").map_err(drop)?;
    }
    Ok(())
}

/// Decodes an ASCII hex field into `dst`, returning the decoded length.
///
/// Rejects odd-length input, non-hex digits, and input that does not fit
/// `dst`. Both digit cases are accepted.
pub fn decode_hex(src: &[u8], dst: &mut [u8]) -> Option<usize> {
    if src.len() % 2 != 0 || src.len() / 2 > dst.len() {
        return None;
    }
    for (i, pair) in src.chunks_exact(2).enumerate() {
        dst[i] = (hex_val(pair[0])? << 4) | hex_val(pair[1])?;
    }
    Some(src.len() / 2)
}

fn hex_val(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Splits a `mac_rx <port> <hex>` downlink event line, decoding the payload
/// into `dst`. Returns the port and the decoded length, or `None` if the
/// line is not a well-formed downlink event.
///
/// Meant for use inside an unsolicited-line handler registered with
/// [`Lr2Engine::set_event_handler`](crate::Lr2Engine::set_event_handler).
pub fn parse_mac_rx(line: &[u8], dst: &mut [u8]) -> Option<(u8, usize)> {
    let rest = line.strip_prefix(b"mac_rx ")?;
    let mut fields = rest.split(|&b| b == b' ').filter(|f| !f.is_empty());
    let port = core::str::from_utf8(fields.next()?).ok()?.parse().ok()?;
    let data = fields.next().unwrap_or(b"");
    let len = decode_hex(data, dst)?;
    Some((port, len))
}
