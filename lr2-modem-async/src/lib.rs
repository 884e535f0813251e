//! An asynchronous, `no_std` driver for the AT-command protocol of the LR2
//! LoRaWAN radio modem.
//!
//! The LR2 is controlled over a UART with CR/LF-terminated text lines. Each
//! command is answered by a status token such as `mac_tx_ok` or
//! `invalid_param`, but the modem also emits unsolicited event lines at any
//! time (for example `mac_rx 1 48656C6C6F` for a downlink frame), so the
//! receive stream cannot be read request/response style. This crate
//! implements the protocol engine that sorts this out:
//!
//! - [`RxSink`]: interrupt-safe byte sink feeding the engine through a
//!   single-producer single-consumer queue.
//! - [`Lr2Engine`]: the sans-io cycle state machine, covering line assembly,
//!   reply routing and the watchdog timeout. It can be driven directly from
//!   a bare-metal loop clocked by a [`clock::Ticker`].
//! - [`Lr2Modem`]: the async front-end over any [`embedded_io_async::Write`]
//!   transport, exposing `send_mac`, `join`, `send_radio`, `receive_radio`
//!   and `send_raw`.
//!
//! One command may be outstanding at a time; a dispatch issued while a cycle
//! is running returns [`Status::Busy`] without touching the wire. Every
//! cycle ends in a matched reply, a recognized error token, or a watchdog
//! timeout, and a timeout is terminal: a reply that arrives late is routed
//! as an unsolicited line, never as the answer to the timed-out command.
//!
//! # Usage
//!
//! The driver is transport-agnostic; on an ESP32-class target the wiring
//! looks like this:
//!
//! ```ignore
//! use lr2_modem_async::{rx_channel, JoinMode, Lr2Config, Lr2Modem, RxQueue, RxSink, Status};
//!
//! #[esp_hal_embassy::main]
//! async fn main(spawner: Spawner) {
//!     let peripherals = esp_hal::init(esp_hal::Config::default());
//!     let uart = esp_hal::uart::Uart::new(peripherals.UART1, esp_hal::uart::Config::default())
//!         .unwrap()
//!         .with_tx(peripherals.GPIO43)
//!         .with_rx(peripherals.GPIO44)
//!         .into_async();
//!     let (rx, tx) = uart.split();
//!
//!     static RX_QUEUE: static_cell::StaticCell<RxQueue> = static_cell::StaticCell::new();
//!     let (sink, consumer) = rx_channel(RX_QUEUE.init(RxQueue::new()));
//!     spawner.spawn(rx_task(rx, sink)).unwrap();
//!
//!     let mut modem = Lr2Modem::new(tx, consumer, Lr2Config::default());
//!     if let Ok(Status::Ok) = modem.join(JoinMode::Otaa).await {
//!         let _ = modem.send_mac(b"hello", 1, false).await;
//!     }
//! }
//!
//! #[embassy_executor::task]
//! async fn rx_task(mut rx: UartRx<'static, Async>, mut sink: RxSink<'static>) {
//!     let mut buf = [0u8; 64];
//!     loop {
//!         if let Ok(len) = rx.read_async(&mut buf).await {
//!             sink.feed(&buf[..len]);
//!         }
//!     }
//! }
//! ```
//!
//! Without an executor, the engine runs the same cycle by hand: feed it the
//! received bytes and the tick count, and poll for the outcome.
//!
//! ```
//! use lr2_modem_async::{CommandKind, Lr2Config, Lr2Engine, Status};
//!
//! let mut engine = Lr2Engine::new(Lr2Config::default());
//! engine.start(CommandKind::MacTx).unwrap();
//! engine.arm(0, 5_000); // the command bytes go out via the transport here
//! engine.feed(b"mac_tx_ok\r\n"); // bytes drained from the receive queue
//! assert_eq!(engine.process(3), Some(Status::Ok));
//! ```

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod command;
pub mod engine;
pub mod status;
pub mod watchdog;

mod line;
mod modem;

pub use command::{CommandKind, JoinMode, MAX_MAC_PAYLOAD, MAX_RADIO_PAYLOAD};
pub use engine::{Lr2Config, Lr2Engine, ResponseState};
pub use line::LINE_CAPACITY;
pub use modem::{rx_channel, Lr2Error, Lr2Modem, RxConsumer, RxQueue, RxSink, RX_QUEUE_LEN};
pub use status::Status;
