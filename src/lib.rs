//! Bring-up and double-buffered frame capture for the Terasic TRDB-D5M camera.
//!
//! The sensor (an MT9P031) is configured over I2C through `embedded-hal`. Frames are written to
//! memory by a camera controller block, and `handoff::FrameHandoff` passes the filled buffers
//! between that controller's interrupt and the consumer, ping-ponging between two buffers.

#![cfg_attr(not(test), no_std)]

pub mod d5m;
pub mod error;
pub mod frame_buf;
pub mod handoff;


pub use d5m::config::{AddressMode, PatternKind, PixelClockDivider, SensorOptions, TestPattern};
pub use d5m::controller::{AckMode, Controller, VolatileBlock};
pub use d5m::Camera;
pub use error::{Error, ProtocolViolation, WaitError};
pub use frame_buf::{BufferHandle, FrameBuffer, PingPong, SENTINEL};
pub use handoff::{FrameHandoff, InterruptNotifier, PollNotifier};
