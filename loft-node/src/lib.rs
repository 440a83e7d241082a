//! Loft node building blocks: config, TCP transport, filesystem kv backend,
//! console loop. The binary in `main.rs` wires them together.

pub mod config;
pub mod kv_fs;
pub mod repl;
pub mod transport_tcp;
