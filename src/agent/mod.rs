//! Agent process plumbing.
//!
//! Everything the supervisor needs to talk to one agent over its stdio:
//! - `spawner`: process launch plus the kill/reap primitives.
//! - `codec`: newline framing with a per-line size ceiling.
//! - `reader`: background task turning stdout lines into protocol items.
//! - `handshake`: the `init` + `task` lines written to stdin.

pub mod codec;
pub mod handshake;
pub mod reader;
pub mod spawner;
