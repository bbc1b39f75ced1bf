//! Host-facing control bridge: versioned envelopes over stdin/stdout.

pub mod contract;
pub mod handler;
pub mod stdio;
