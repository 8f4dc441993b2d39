//! The `transport` module is responsible for the byte-stream side of the
//! mbus protocol.
//!
//! It defines the reserved protocol names, the JSON envelope exchanged with
//! the broker, the length-prefixed framing around it, and the non-blocking
//! TCP stream the client loop drives.

pub mod codec;
pub mod message;
pub mod names;
pub mod socket;

pub use codec::{FrameDecoder, encode_frame};
pub use message::{Envelope, MessageType};
