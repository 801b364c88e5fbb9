//! Mail I/O: attachment extraction from raw messages and reply delivery.

pub mod channel;
pub mod email;

pub use channel::*;
pub use email::{EmailReplySender, parse_attachments};
