//! The caller-facing modem driver: command dispatch over an async transport.

use embassy_time::{Instant, Timer};
use embedded_io_async::Write;
use heapless::spsc::{Consumer, Producer, Queue};
use log::{trace, warn};

use crate::command::{self, CommandKind, JoinMode};
use crate::engine::{Lr2Config, Lr2Engine};
use crate::status::Status;

/// Depth of the byte queue between the receive interrupt and the engine.
pub const RX_QUEUE_LEN: usize = 512;

/// The byte queue feeding the engine. Create one (typically in a `static`)
/// and split it with [`rx_channel`].
pub type RxQueue = Queue<u8, RX_QUEUE_LEN>;

/// The engine-side half of the queue, passed to [`Lr2Modem::new`].
pub type RxConsumer<'a> = Consumer<'a, u8, RX_QUEUE_LEN>;

/// Splits `queue` into the interrupt-side sink and the engine-side consumer.
pub fn rx_channel(queue: &mut RxQueue) -> (RxSink<'_>, RxConsumer<'_>) {
    let (producer, consumer) = queue.split();
    (RxSink { producer }, consumer)
}

/// Interrupt-side byte sink.
///
/// [`feed_byte`](RxSink::feed_byte) is O(1), allocation-free and
/// non-blocking, so it can run inside the UART receive interrupt (or a
/// dedicated receive task). If the queue is full the byte is dropped: the
/// garbled line that results fails to match anything and the cycle resolves
/// through the watchdog, the same graceful degradation as line truncation.
pub struct RxSink<'a> {
    producer: Producer<'a, u8, RX_QUEUE_LEN>,
}

impl RxSink<'_> {
    /// Hands one received byte to the engine.
    pub fn feed_byte(&mut self, byte: u8) {
        let _ = self.producer.enqueue(byte);
    }

    /// Hands a chunk of received bytes to the engine (DMA receive paths).
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed_byte(byte);
        }
    }
}

/// Errors of the driver itself, as opposed to [`Status`] outcomes reported
/// by the modem.
#[derive(Debug)]
pub enum Lr2Error<E> {
    /// Writing the command to the transport failed. The watchdog was never
    /// armed and the engine is back to idle.
    Transport(E),
    /// The payload exceeds what the dialect can carry. Nothing was
    /// transmitted.
    PayloadTooLarge,
    /// A received frame does not fit the caller's buffer.
    BufferTooSmall,
    /// A matched reply carried a payload that was not valid hex.
    InvalidReply,
}

const POLL_INTERVAL_MS: u64 = 1;

/// The LR2 modem driver.
///
/// Owns the transmit half of the transport and the protocol engine. Receive
/// bytes arrive through the [`RxSink`] handed to the UART receive path; the
/// dispatch loop drains them cooperatively while a command is in flight.
///
/// At most one command may be outstanding: a dispatch issued while another
/// cycle is running returns [`Status::Busy`] without transmitting anything.
pub struct Lr2Modem<'a, W: Write> {
    tx: W,
    rx: RxConsumer<'a>,
    engine: Lr2Engine<'a>,
}

impl<'a, W: Write> Lr2Modem<'a, W> {
    pub fn new(tx: W, rx: RxConsumer<'a>, config: Lr2Config) -> Self {
        Self {
            tx,
            rx,
            engine: Lr2Engine::new(config),
        }
    }

    /// Registers the handler invoked with every unsolicited line.
    pub fn set_event_handler(&mut self, handler: &'a mut dyn FnMut(&[u8])) {
        self.engine.set_event_handler(handler);
    }

    /// The underlying sans-io engine.
    pub fn engine_mut(&mut self) -> &mut Lr2Engine<'a> {
        &mut self.engine
    }

    /// Drains received bytes and advances the engine. Call periodically when
    /// no command is in flight so unsolicited events reach the handler.
    pub fn service(&mut self) {
        self.drain_rx();
        self.engine.process(now_ms());
    }

    /// Sends an uplink: `mac tx <cnf|uncnf> <port> <hex>`.
    ///
    /// Returns [`Status::Ok`] when the modem reports `mac_tx_ok`, the mapped
    /// status for a recognized error token, or [`Status::Timeout`].
    pub async fn send_mac(
        &mut self,
        payload: &[u8],
        port: u8,
        confirmed: bool,
    ) -> Result<Status, Lr2Error<W::Error>> {
        let line =
            command::mac_tx(payload, port, confirmed).map_err(|()| Lr2Error::PayloadTooLarge)?;
        self.run_cycle(CommandKind::MacTx, line.as_bytes()).await
    }

    /// Starts a join exchange: `mac join <otaa|abp>`.
    pub async fn join(&mut self, mode: JoinMode) -> Result<Status, Lr2Error<W::Error>> {
        let line = command::join(mode).map_err(|()| Lr2Error::PayloadTooLarge)?;
        self.run_cycle(CommandKind::Join, line.as_bytes()).await
    }

    /// Transmits a raw radio frame: `radio tx <hex>`.
    pub async fn send_radio(&mut self, payload: &[u8]) -> Result<Status, Lr2Error<W::Error>> {
        let line = command::radio_tx(payload).map_err(|()| Lr2Error::PayloadTooLarge)?;
        self.run_cycle(CommandKind::RadioTx, line.as_bytes()).await
    }

    /// Opens a receive window: `radio rx <window_ms>` (0 = continuous).
    ///
    /// On [`Status::Ok`] the received frame has been decoded into `buf` and
    /// its length is returned alongside the status.
    pub async fn receive_radio(
        &mut self,
        window_ms: u16,
        buf: &mut [u8],
    ) -> Result<(Status, usize), Lr2Error<W::Error>> {
        let line = command::radio_rx(window_ms).map_err(|()| Lr2Error::PayloadTooLarge)?;
        let status = self.run_cycle(CommandKind::RadioRx, line.as_bytes()).await?;
        if status != Status::Ok {
            return Ok((status, 0));
        }
        let field = match self.engine.reply().strip_prefix(b"radio_rx") {
            Some(rest) => trim_spaces(rest),
            None => &[],
        };
        if field.len() / 2 > buf.len() {
            return Err(Lr2Error::BufferTooSmall);
        }
        let len = command::decode_hex(field, buf).ok_or(Lr2Error::InvalidReply)?;
        Ok((Status::Ok, len))
    }

    /// Sends a raw configuration command (for example
    /// `mac set devaddr 01020304`) and waits for the modem's `ok`.
    pub async fn send_raw(&mut self, raw: &str) -> Result<Status, Lr2Error<W::Error>> {
        let line = command::raw(raw).map_err(|()| Lr2Error::PayloadTooLarge)?;
        self.run_cycle(CommandKind::Raw, line.as_bytes()).await
    }

    /// One command/response cycle: claim the engine, transmit, arm the
    /// watchdog, then poll cooperatively until the cycle resolves.
    async fn run_cycle(
        &mut self,
        kind: CommandKind,
        line: &[u8],
    ) -> Result<Status, Lr2Error<W::Error>> {
        if self.engine.start(kind).is_err() {
            return Ok(Status::Busy);
        }
        trace!(
            "lr2: tx {}",
            core::str::from_utf8(line).unwrap_or("<non-utf8>")
        );
        if let Err(err) = self.write_line(line).await {
            warn!("lr2: transport write failed: {err:?}");
            self.engine.reset();
            return Err(Lr2Error::Transport(err));
        }
        let limit = self.engine.config().command_timeout_ms;
        self.engine.arm(now_ms(), limit);
        loop {
            self.drain_rx();
            if let Some(status) = self.engine.process(now_ms()) {
                return Ok(status);
            }
            Timer::after_millis(POLL_INTERVAL_MS).await;
        }
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<(), W::Error> {
        self.tx.write_all(line).await?;
        self.tx.flush().await
    }

    fn drain_rx(&mut self) {
        while let Some(byte) = self.rx.dequeue() {
            self.engine.feed_byte(byte);
        }
    }
}

fn now_ms() -> u32 {
    Instant::now().as_millis() as u32
}

fn trim_spaces(mut bytes: &[u8]) -> &[u8] {
    while let Some((&b' ', rest)) = bytes.split_first() {
        bytes = rest;
    }
    bytes
}
