//! Status taxonomy for LR2 command/response cycles.

/// Outcome of one command/response cycle.
///
/// `Ok` means the dialect's success reply arrived. The error variants map
/// one-to-one onto the status tokens the modem firmware prints; `Timeout`
/// is raised by the driver's own watchdog and uses a code far away from the
/// token codes so retry logic can always tell an unresponsive modem from a
/// protocol rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// The expected success reply arrived.
    Ok = 0,
    /// `invalid_param`: the modem rejected the command syntax or arguments.
    InvalidParam = 1,
    /// `not_joined`: no network session; join first.
    NotJoined = 2,
    /// `no_free_ch`: all channels are busy with duty-cycle restrictions.
    NoFreeChannel = 3,
    /// `silent`: the device is in silent-immediately state.
    Silent = 4,
    /// `busy`: the radio (or this driver, see [`Lr2Modem`]) already has a
    /// command in flight.
    ///
    /// [`Lr2Modem`]: crate::Lr2Modem
    Busy = 5,
    /// `mac_err`: the MAC layer reported a transmission error.
    MacError = 6,
    /// `radio_err`: the radio reported a transmission or reception error.
    RadioError = 7,
    /// `denied`: the network rejected the join request.
    Denied = 8,
    /// `keys_not_init`: session keys were never configured.
    KeysNotInit = 9,
    /// `invalid_data_len`: the payload does not fit the current data rate.
    InvalidDataLen = 10,
    /// `frame_counter_err_rejoin_needed`: the frame counter rolled over.
    FrameCounterError = 11,
    /// `mac_paused`: the MAC layer is paused and cannot transmit.
    MacPaused = 12,
    /// No matching reply arrived within the watchdog limit.
    Timeout = 0xFF,
}

const ERROR_TOKENS: &[(&[u8], Status)] = &[
    (b"invalid_param", Status::InvalidParam),
    (b"not_joined", Status::NotJoined),
    (b"no_free_ch", Status::NoFreeChannel),
    (b"silent", Status::Silent),
    (b"busy", Status::Busy),
    (b"mac_err", Status::MacError),
    (b"radio_err", Status::RadioError),
    (b"denied", Status::Denied),
    (b"keys_not_init", Status::KeysNotInit),
    (b"invalid_data_len", Status::InvalidDataLen),
    (b"frame_counter_err_rejoin_needed", Status::FrameCounterError),
    (b"mac_paused", Status::MacPaused),
];

impl Status {
    /// The integer code for this status, for callers that keep the modem's
    /// C-style numeric convention.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Maps a complete response line to the error status it names.
    ///
    /// Exact match only: a prefix or extension of a token is not that token.
    pub fn from_error_token(line: &[u8]) -> Option<Status> {
        for &(token, status) in ERROR_TOKENS {
            if token == line {
                return Some(status);
            }
        }
        None
    }
}
