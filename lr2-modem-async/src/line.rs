//! Line assembly from the raw receive byte stream.

use heapless::Vec;
use log::warn;

/// Capacity of the receive line buffer.
///
/// Sized for the longest line the modem produces: a `radio_rx` reply carrying
/// a 255-byte payload in hex.
pub const LINE_CAPACITY: usize = 528;

/// Accumulates bytes into CR/LF-terminated lines.
///
/// A line longer than [`LINE_CAPACITY`] is truncated: once the buffer is full
/// the remaining bytes are dropped until the next terminator, and the
/// truncated prefix is submitted as the line. Losing data this way is
/// deliberate; the buffer bound is never exceeded. Truncated lines almost
/// always fail to match any expected token, so a cycle affected by one
/// resolves through the watchdog.
pub(crate) struct LineAssembler {
    buf: Vec<u8, LINE_CAPACITY>,
    overflow: bool,
}

impl LineAssembler {
    pub(crate) const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflow: false,
        }
    }

    /// Feeds one byte, returning the completed line when `byte` terminates
    /// one. The assembler is left cleared and accumulating.
    ///
    /// Both `\r` and `\n` terminate; the empty "line" inside a CRLF pair is
    /// swallowed, as are blank lines.
    pub(crate) fn push(&mut self, byte: u8) -> Option<Vec<u8, LINE_CAPACITY>> {
        match byte {
            b'\r' | b'\n' => {
                if self.overflow {
                    warn!("lr2: rx line truncated to {} bytes", self.buf.len());
                }
                self.overflow = false;
                if self.buf.is_empty() {
                    return None;
                }
                Some(core::mem::take(&mut self.buf))
            }
            _ if self.overflow => None,
            _ => {
                if self.buf.push(byte).is_err() {
                    self.overflow = true;
                }
                None
            }
        }
    }

    /// Discards any partially assembled line.
    pub(crate) fn flush(&mut self) {
        self.buf.clear();
        self.overflow = false;
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_terminated_lines() {
        let mut asm = LineAssembler::new();
        assert!(asm.push(b'o').is_none());
        assert!(asm.push(b'k').is_none());
        let line = asm.push(b'\r').unwrap();
        assert_eq!(line.as_slice(), b"ok");
        // The LF half of the CRLF pair is swallowed.
        assert!(asm.push(b'\n').is_none());
        assert_eq!(asm.len(), 0);
    }

    #[test]
    fn blank_lines_are_discarded() {
        let mut asm = LineAssembler::new();
        assert!(asm.push(b'\r').is_none());
        assert!(asm.push(b'\n').is_none());
        assert!(asm.push(b'\n').is_none());
        assert_eq!(asm.len(), 0);
    }

    #[test]
    fn truncates_oversized_lines_without_spilling() {
        let mut asm = LineAssembler::new();
        for i in 0..LINE_CAPACITY + 7 {
            assert!(asm.push(b'a' + (i % 26) as u8).is_none());
        }
        assert_eq!(asm.len(), LINE_CAPACITY);

        let line = asm.push(b'\n').unwrap();
        assert_eq!(line.len(), LINE_CAPACITY);

        // The next line is unaffected by the earlier overflow.
        assert!(asm.push(b'h').is_none());
        assert!(asm.push(b'i').is_none());
        assert_eq!(asm.push(b'\r').unwrap().as_slice(), b"hi");
    }

    #[test]
    fn flush_discards_partial_line() {
        let mut asm = LineAssembler::new();
        asm.push(b'j');
        asm.push(b'u');
        asm.push(b'n');
        asm.push(b'k');
        asm.flush();
        assert_eq!(asm.len(), 0);
        assert!(asm.push(b'\n').is_none());
    }
}
