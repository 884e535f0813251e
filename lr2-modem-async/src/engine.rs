//! The command/response cycle state machine.
//!
//! [`Lr2Engine`] is sans-io: it is fed received bytes and a millisecond
//! clock, and reports the cycle outcome. It never touches the transport;
//! transmitting and pacing are the dispatcher's job ([`crate::Lr2Modem`], or
//! a bare-metal loop driven from a [`crate::clock::Ticker`]).

use heapless::Vec;
use log::{info, trace};

use crate::command::CommandKind;
use crate::line::{LineAssembler, LINE_CAPACITY};
use crate::status::Status;
use crate::watchdog::Watchdog;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Lr2Config {
    /// Watchdog limit the dispatcher applies to every command cycle, in
    /// milliseconds. The default of 30 s covers the slowest join and
    /// confirmed-uplink exchanges.
    pub command_timeout_ms: u32,
    /// With no event handler registered, echo unmatched lines through the
    /// log at `info` level instead of discarding them.
    pub echo_unsolicited: bool,
}

impl Default for Lr2Config {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            echo_unsolicited: false,
        }
    }
}

/// Where the current command/response cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// No command outstanding.
    Idle,
    /// A command was transmitted and its reply has not arrived yet.
    AwaitingReply(CommandKind),
    /// The expected success reply arrived and is stored for the caller.
    ReplyReady,
    /// A recognized error token, or the watchdog, ended the cycle.
    ReplyError(Status),
}

/// The protocol engine for one LR2 modem.
///
/// One engine per transport. All methods are main-context; the only state
/// shared with interrupt context lives outside the engine, in the byte queue
/// behind [`crate::RxSink`].
pub struct Lr2Engine<'cb> {
    config: Lr2Config,
    assembler: LineAssembler,
    state: ResponseState,
    watchdog: Watchdog,
    reply: Vec<u8, LINE_CAPACITY>,
    on_event: Option<&'cb mut dyn FnMut(&[u8])>,
}

impl<'cb> Lr2Engine<'cb> {
    pub fn new(config: Lr2Config) -> Self {
        Self {
            config,
            assembler: LineAssembler::new(),
            state: ResponseState::Idle,
            watchdog: Watchdog::new(),
            reply: Vec::new(),
            on_event: None,
        }
    }

    pub fn config(&self) -> &Lr2Config {
        &self.config
    }

    /// Registers the handler invoked with every unsolicited line.
    ///
    /// The line is passed raw, without its terminator. Configured once at
    /// startup; see [`crate::command::parse_mac_rx`] for picking downlink
    /// events out of the stream.
    pub fn set_event_handler(&mut self, handler: &'cb mut dyn FnMut(&[u8])) {
        self.on_event = Some(handler);
    }

    pub fn state(&self) -> ResponseState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ResponseState::Idle)
    }

    /// Claims the engine for one command cycle.
    ///
    /// Fails with [`Status::Busy`] while another cycle is outstanding. The
    /// dispatcher checks this before any byte reaches the wire, which keeps
    /// reply matching unambiguous: at most one command is ever in flight.
    pub fn start(&mut self, kind: CommandKind) -> Result<(), Status> {
        if !self.is_idle() {
            return Err(Status::Busy);
        }
        self.reply.clear();
        self.state = ResponseState::AwaitingReply(kind);
        Ok(())
    }

    /// Opens the timeout window. Called once the command bytes are on the
    /// wire; a transmit that fails must call [`reset`](Self::reset) instead.
    pub fn arm(&mut self, now_ms: u32, limit_ms: u32) {
        self.watchdog.arm(now_ms, limit_ms);
    }

    /// Abandons any outstanding cycle and any partially assembled line,
    /// returning the engine to idle.
    pub fn reset(&mut self) {
        self.watchdog.disarm();
        self.assembler.flush();
        self.state = ResponseState::Idle;
    }

    /// Main-context byte input: assembles lines and routes each completed
    /// one. Bytes normally arrive here by draining the receive queue.
    pub fn feed_byte(&mut self, byte: u8) {
        if let Some(line) = self.assembler.push(byte) {
            self.route(&line);
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed_byte(byte);
        }
    }

    /// Advances the cycle, reporting the outcome once it has resolved.
    ///
    /// Lines are routed as they are fed, strictly before the watchdog check
    /// here. A reply and a deadline landing on the same poll therefore
    /// resolve in the reply's favor, while a timeout observed on an earlier
    /// poll is terminal: the watchdog has already disarmed itself, and any
    /// later reply is routed as unsolicited.
    pub fn process(&mut self, now_ms: u32) -> Option<Status> {
        if matches!(self.state, ResponseState::AwaitingReply(_)) && self.watchdog.poll(now_ms) {
            self.state = ResponseState::ReplyError(Status::Timeout);
        }
        let status = match self.state {
            ResponseState::ReplyReady => Status::Ok,
            ResponseState::ReplyError(status) => status,
            _ => return None,
        };
        self.finish();
        Some(status)
    }

    /// The line that completed the last cycle, without its terminator.
    /// Valid until the next [`start`](Self::start).
    pub fn reply(&self) -> &[u8] {
        &self.reply
    }

    /// Length of the line currently being assembled.
    pub fn pending_line_len(&self) -> usize {
        self.assembler.len()
    }

    fn finish(&mut self) {
        self.watchdog.disarm();
        // A timed-out cycle may leave a half-assembled line behind; flush it
        // so the next cycle starts from a clean buffer.
        self.assembler.flush();
        self.state = ResponseState::Idle;
    }

    fn route(&mut self, line: &[u8]) {
        if let ResponseState::AwaitingReply(kind) = self.state {
            if reply_matches(kind, line) {
                trace!("lr2: reply matched ({} bytes)", line.len());
                self.reply.clear();
                // Same capacity as the assembler, so this cannot fail.
                let _ = self.reply.extend_from_slice(line);
                self.state = ResponseState::ReplyReady;
                return;
            }
            if let Some(status) = Status::from_error_token(line) {
                trace!("lr2: error reply {status:?}");
                self.state = ResponseState::ReplyError(status);
                return;
            }
        }
        self.unsolicited(line);
    }

    fn unsolicited(&mut self, line: &[u8]) {
        if let Some(handler) = self.on_event.as_mut() {
            handler(line);
        } else if self.config.echo_unsolicited {
            info!(
                "lr2: {}",
                core::str::from_utf8(line).unwrap_or("<non-utf8 line>")
            );
        } else {
            trace!("lr2: discarded unsolicited line ({} bytes)", line.len());
        }
    }
}

/// An expected reply must be the whole line, or for payload-bearing replies
/// the whole first word. A prefix of a token is never a match.
fn reply_matches(kind: CommandKind, line: &[u8]) -> bool {
    let token = kind.success_token();
    if kind.reply_has_payload() {
        match line.strip_prefix(token) {
            Some(rest) => rest.is_empty() || rest[0] == b' ',
            None => false,
        }
    } else {
        line == token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::LINE_CAPACITY;

    fn engine() -> Lr2Engine<'static> {
        Lr2Engine::new(Lr2Config::default())
    }

    #[test]
    fn successful_mac_tx_cycle() {
        let mut engine = engine();
        engine.start(CommandKind::MacTx).unwrap();
        engine.arm(0, 5_000);
        engine.feed(b"mac_tx_ok\r\n");
        assert_eq!(engine.process(10), Some(Status::Ok));
        assert!(engine.is_idle());
        assert_eq!(engine.pending_line_len(), 0);
        assert_eq!(engine.reply(), b"mac_tx_ok");
    }

    #[test]
    fn join_error_token_maps_to_its_status() {
        let mut engine = engine();
        engine.start(CommandKind::Join).unwrap();
        engine.arm(0, 5_000);
        engine.feed(b"not_joined\r\n");
        assert_eq!(engine.process(1), Some(Status::NotJoined));
        assert!(engine.is_idle());
        assert_eq!(engine.pending_line_len(), 0);
    }

    #[test]
    fn times_out_without_a_reply() {
        let mut engine = engine();
        engine.start(CommandKind::RadioTx).unwrap();
        engine.arm(0, 50);
        assert_eq!(engine.process(49), None);
        assert_eq!(engine.process(51), Some(Status::Timeout));
        assert!(engine.is_idle());
        assert_eq!(engine.pending_line_len(), 0);
    }

    #[test]
    fn second_start_is_rejected_while_awaiting() {
        let mut engine = engine();
        engine.start(CommandKind::MacTx).unwrap();
        assert_eq!(engine.start(CommandKind::Join), Err(Status::Busy));
        assert_eq!(
            engine.state(),
            ResponseState::AwaitingReply(CommandKind::MacTx)
        );
    }

    #[test]
    fn reply_routed_on_the_deadline_poll_wins() {
        let mut engine = engine();
        engine.start(CommandKind::MacTx).unwrap();
        engine.arm(0, 50);
        engine.feed(b"mac_tx_ok\r\n");
        // The deadline has passed by this poll, but the reply was routed
        // first: the watchdog had not fired on any earlier poll, so the
        // reply is the outcome.
        assert_eq!(engine.process(60), Some(Status::Ok));
    }

    #[test]
    fn late_reply_cannot_overwrite_a_timeout() {
        let mut late = std::vec::Vec::new();
        let mut handler = |line: &[u8]| late.push(line.to_vec());
        let mut engine = Lr2Engine::new(Lr2Config::default());
        engine.set_event_handler(&mut handler);

        engine.start(CommandKind::RadioTx).unwrap();
        engine.arm(0, 50);
        assert_eq!(engine.process(51), Some(Status::Timeout));

        engine.feed(b"radio_tx_ok\r\n");
        assert_eq!(engine.process(60), None);
        assert!(engine.is_idle());
        drop(engine);
        assert_eq!(late, [b"radio_tx_ok".to_vec()]);
    }

    #[test]
    fn unsolicited_event_reaches_the_handler_while_idle() {
        let mut events = std::vec::Vec::new();
        let mut handler = |line: &[u8]| events.push(line.to_vec());
        let mut engine = Lr2Engine::new(Lr2Config::default());
        engine.set_event_handler(&mut handler);

        engine.feed(b"mac_rx 1 48656c6c6f\r\n");
        assert_eq!(engine.process(0), None);
        assert!(engine.is_idle());
        drop(engine);
        assert_eq!(events, [b"mac_rx 1 48656c6c6f".to_vec()]);
    }

    #[test]
    fn sync_match_takes_priority_over_the_handler() {
        let mut events = std::vec::Vec::new();
        let mut handler = |line: &[u8]| events.push(line.to_vec());
        let mut engine = Lr2Engine::new(Lr2Config::default());
        engine.set_event_handler(&mut handler);

        engine.start(CommandKind::RadioRx).unwrap();
        engine.arm(0, 1_000);
        engine.feed(b"radio_rx  AB\r\n");
        assert_eq!(engine.process(1), Some(Status::Ok));
        assert_eq!(engine.reply(), b"radio_rx  AB");
        drop(engine);
        assert!(events.is_empty());
    }

    #[test]
    fn partial_or_extended_token_never_matches() {
        let mut engine = engine();
        engine.start(CommandKind::MacTx).unwrap();
        engine.arm(0, 100);
        engine.feed(b"mac_tx_o\r\n");
        engine.feed(b"mac_tx_okk\r\n");
        assert_eq!(engine.process(10), None);
        engine.feed(b"mac_tx_ok\r\n");
        assert_eq!(engine.process(20), Some(Status::Ok));
    }

    #[test]
    fn payload_bearing_token_must_be_a_whole_word() {
        let mut engine = engine();
        engine.start(CommandKind::RadioRx).unwrap();
        engine.arm(0, 100);
        engine.feed(b"radio_rxAB\r\n");
        assert_eq!(engine.process(1), None);
        engine.feed(b"radio_rx  AB\r\n");
        assert_eq!(engine.process(2), Some(Status::Ok));
    }

    #[test]
    fn intermediate_ok_does_not_complete_mac_tx() {
        let mut engine = engine();
        engine.start(CommandKind::MacTx).unwrap();
        engine.arm(0, 100);
        // The modem acknowledges the command with a plain `ok` before the
        // terminal `mac_tx_ok`; the cycle must keep waiting through it.
        engine.feed(b"ok\r\n");
        assert_eq!(engine.process(5), None);
        engine.feed(b"mac_tx_ok\r\n");
        assert_eq!(engine.process(6), Some(Status::Ok));
    }

    #[test]
    fn raw_command_completes_on_ok() {
        let mut engine = engine();
        engine.start(CommandKind::Raw).unwrap();
        engine.arm(0, 100);
        engine.feed(b"ok\r\n");
        assert_eq!(engine.process(1), Some(Status::Ok));
    }

    #[test]
    fn overflowed_line_resolves_through_the_watchdog() {
        let mut engine = engine();
        engine.start(CommandKind::MacTx).unwrap();
        engine.arm(0, 50);
        for _ in 0..LINE_CAPACITY + 40 {
            engine.feed_byte(b'x');
        }
        engine.feed(b"\r\n");
        assert_eq!(engine.process(10), None);
        assert_eq!(engine.process(51), Some(Status::Timeout));
        assert_eq!(engine.pending_line_len(), 0);
    }

    #[test]
    fn cycle_driven_by_a_ticker() {
        let ticker = crate::clock::Ticker::new();
        let mut engine = engine();
        engine.start(CommandKind::Join).unwrap();
        engine.arm(ticker.now(), 50);
        for _ in 0..49 {
            ticker.tick();
        }
        assert_eq!(engine.process(ticker.now()), None);
        ticker.tick();
        assert_eq!(engine.process(ticker.now()), Some(Status::Timeout));
    }

    #[test]
    fn reset_returns_to_idle_from_awaiting() {
        let mut engine = engine();
        engine.start(CommandKind::Join).unwrap();
        engine.feed(b"partial");
        engine.reset();
        assert!(engine.is_idle());
        assert_eq!(engine.pending_line_len(), 0);
        assert!(engine.start(CommandKind::MacTx).is_ok());
    }
}
