//! Query-interception pipeline for the cleanflux time-series proxy.
//!
//! Ties together tokenizing a query ([`parser`], built on [`ast`] and
//! [`scan`]), decomposing and rewriting its FROM target
//! ([`measurement`], [`modifier`]), choosing a retention policy and bucket
//! width ([`catalog`], [`rp_selector`]), keeping results within a points
//! budget ([`points_limiter`]), correcting known backend quirks
//! ([`rules`]) and re-serializing the result ([`tabular`],
//! [`serializer`]). [`pipeline`] is the orchestration entry point that
//! wires all of the above together for one incoming query.

pub mod ast;
pub mod catalog;
pub mod error;
pub mod interval;
pub mod measurement;
pub mod modifier;
pub mod parser;
pub mod pipeline;
pub mod points_limiter;
pub mod rp_selector;
pub mod rules;
pub mod scan;
pub mod serializer;
pub mod tabular;

pub use error::{CleanfluxError, Result};
pub use pipeline::{process_query, PipelineConfig};
