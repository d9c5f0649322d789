/// Failure modes for the public control-block operations.
///
/// The wire protocol this engine implements signals failure with negative
/// return codes; this is the idiomatic translation of that convention into a
/// typed Rust error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("message needs {fragments} fragments but local rcv_wnd is only {rcv_wnd}")]
    MessageTooLarge { fragments: usize, rcv_wnd: u16 },

    #[error("output buffer holds {available} bytes but {needed} are needed")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("flush() called before the first update()")]
    NotYetUpdated,

    #[error("datagram truncated: {remaining} bytes remain, header needs {} more", crate::segment::HEADER_LEN)]
    TruncatedHeader { remaining: usize },

    #[error("unrecognized command byte {cmd}")]
    UnknownCommand { cmd: u8 },

    #[error("conversation id mismatch: expected {expected}, got {actual}")]
    ConversationMismatch { expected: u32, actual: u32 },

    #[error("segment declares {declared} payload bytes but only {remaining} remain")]
    TruncatedPayload { declared: usize, remaining: usize },

    #[error("no message ready in rcv_queue")]
    RecvQueueEmpty,

    #[error("next message is incomplete: waiting on more fragments")]
    IncompleteMessage,

    #[error("mtu {mtu} is below the minimum of 50 bytes")]
    InvalidMtu { mtu: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
