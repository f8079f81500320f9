//! Blocking HTTP client for the InfluxDB query API (spec §4.6
//! "BackendClient"), grounded on `robustify_influxdb_client`'s custom
//! `request` method and `pd_query` in `querying.py`.

mod client;
mod decode;

pub use client::{ReqwestBackendClient, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
