/// Outcome of one SWD transaction's acknowledgement phase, and the other
/// ways a transaction can fail to complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SwdError {
    #[error("target responded WAIT")]
    AckWait,
    #[error("target responded FAULT; clear via DP ABORT before retrying")]
    AckFault,
    #[error("protocol desynchronisation: unrecognised ack {0:#05b}")]
    AckProtocol(u8),
    #[error("USB read returned fewer bytes than the frame required")]
    ReadTimeout,
    #[error("received data parity disagreed with DParity")]
    Parity,
    #[error("DP powerup request did not complete (STATUS top nibble != 0xF)")]
    Powerup,
}

pub type Result<T> = std::result::Result<T, SwdError>;

impl From<mpsse_bsp::Error> for SwdError {
    fn from(_: mpsse_bsp::Error) -> Self {
        SwdError::ReadTimeout
    }
}
