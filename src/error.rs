/// Error taxonomy for the radio/protocol core.
///
/// Decoders and classifiers never fail up (they consume what they can and
/// return a best-effort result); this enum is for the small set of
/// component-boundary operations — arbiter transitions, queue enqueue,
/// persistence, driver calls — that the rest of the system needs to branch
/// on. See the module docs on `arbiter`, `capture`, and `odid` for where each
/// variant is produced.
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirhoundError {
    /// The requested radio stack can't claim the controller right now.
    RadioBusy,
    /// An IE, ODID message, or EAPOL frame was shorter than its declared length.
    ParseTruncated,
    /// The writer queue is saturated; the source buffer was freed.
    QueueFull,
    /// A string field contained a byte outside the printable ASCII range.
    DecodeUnprintable,
    /// A persisted-settings write failed; the in-memory value still applies.
    PersistFailure,
    /// The underlying radio driver returned an error.
    DriverError,
    /// A bounded device table is full; new entries are rejected.
    ResourceExhausted,
    /// A GATT/handshake/NTP/HTTP operation exceeded its deadline.
    ProtocolTimeout,
}

impl fmt::Display for AirhoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::RadioBusy => "radio busy",
            Self::ParseTruncated => "frame truncated",
            Self::QueueFull => "writer queue full",
            Self::DecodeUnprintable => "unprintable field",
            Self::PersistFailure => "persist failure",
            Self::DriverError => "driver error",
            Self::ResourceExhausted => "resource exhausted",
            Self::ProtocolTimeout => "protocol timeout",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for AirhoundError {}

pub type Result<T> = core::result::Result<T, AirhoundError>;
