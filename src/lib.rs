//! QR Reply: publishes email attachments and answers with their QR codes.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod store;
