//! Errors shared by the sensor configurator, the handoff protocol and the `Camera` facade.

use crate::d5m::bus::BusError;
use crate::frame_buf::BufferHandle;

/// Errors in this crate, generic over the I2C error type.
#[derive(Debug, Eq, PartialEq)]
pub enum Error<E> {
    /// A serial transaction failed: sensor unreachable or NACKed.
    BusTransfer(BusError<E>),

    /// The read half of a read-modify-write failed, so the bits it should have preserved are
    /// unknown. Nothing was written to that register.
    Configuration(BusError<E>),

    /// The handoff protocol was driven out of sequence. This is a programming error.
    Protocol(ProtocolViolation),

    /// No frame completed within the requested time.
    Timeout,

    /// The wait was aborted by `cancel`.
    Cancelled,
}

impl<E> Error<E> {
    /// Register identifier of a failed bus transaction, if this is a bus error.
    pub fn register(&self) -> Option<u8> {
        match self {
            Error::BusTransfer(e) | Error::Configuration(e) => Some(e.register()),
            _ => None,
        }
    }
}

/// Misuse of the frame handoff protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolViolation {
    /// A completion is being harvested right now.
    DrainInProgress,
    /// The buffer is held by the consumer or holds an unconsumed frame, it can't be a target.
    BufferInUse(BufferHandle),
    /// Nothing has completed since the last harvest.
    NoPendingFrame,
    /// The buffer handed back was not the one the consumer holds.
    NotHeld(BufferHandle),
    /// The sensor can't be reconfigured while a capture is armed.
    CaptureActive,
}

/// Why `wait_for_frame` returned without a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitError {
    Timeout,
    Cancelled,
    Protocol(ProtocolViolation),
}

impl<E> From<BusError<E>> for Error<E> {
    fn from(e: BusError<E>) -> Self {
        Error::BusTransfer(e)
    }
}

impl<E> From<ProtocolViolation> for Error<E> {
    fn from(v: ProtocolViolation) -> Self {
        Error::Protocol(v)
    }
}

impl<E> From<WaitError> for Error<E> {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::Timeout => Error::Timeout,
            WaitError::Cancelled => Error::Cancelled,
            WaitError::Protocol(v) => Error::Protocol(v),
        }
    }
}
