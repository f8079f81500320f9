//! The HTTP listener (spec §5, §6), grounded on
//! `ProxyRequestHandler` in `request_handler.py`: request decoding,
//! hop-by-hop header filtering, per-query interception via
//! `cleanflux-core::pipeline`, and passthrough of everything else to the
//! real backend.
//!
//! `do_CONNECT`/TLS interception (the original's cert-minting code path)
//! is not reproduced — out of scope per the spec's Non-goals.

mod handler;
mod headers;
mod request;
mod server;
mod state;

pub use server::{run, ProxyError, ServerConfig};
pub use state::ProxyState;
