//! Email attachment pipeline.
//!
//! Every inbound email flows through:
//! 1. `intake::decode_batch()`: notification batch → `InboundMessage`s
//! 2. `AttachmentPipeline::process_email()`: fetch, extract, classify
//! 3. One generation unit per attachment: publish file + QR code
//! 4. `reply::compose()`: sorted results → text and HTML reply

pub mod classifier;
pub mod intake;
pub mod processor;
pub mod reply;
pub mod sanitize;
pub mod types;

pub use intake::decode_batch;
pub use processor::AttachmentPipeline;
