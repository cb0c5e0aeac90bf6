//! Progress reporting seam
//!
//! Transfers report through a sink so the CLI can render a bar without
//! the transport knowing anything about terminals. The sink is optional;
//! `NoProgress` drops everything.

/// Receives transfer progress in bytes
pub trait ProgressSink: Send + Sync {
    /// A transfer of `total` bytes is starting
    fn start(&self, total: u64);
    /// `done` additional bytes have completed
    fn update(&self, done: u64);
    /// The transfer finished
    fn finish(&self);
}

/// Sink that discards all progress
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _total: u64) {}
    fn update(&self, _done: u64) {}
    fn finish(&self) {}
}
