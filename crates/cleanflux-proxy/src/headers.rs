//! Hop-by-hop header filtering (RFC 2616 §13.5.1), grounded on
//! `filter_headers` in `request_handler.py`.

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Headers to forward, with hop-by-hop entries (and any stale
/// `content-length`, recomputed by the caller once the body is final)
/// dropped.
pub fn filter_headers(headers: &[tiny_http::Header]) -> Vec<tiny_http::Header> {
    headers
        .iter()
        .filter(|h| !is_hop_by_hop(h.field.as_str().as_str()) && !h.field.equiv("content-length"))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_hop_by_hop_headers_case_insensitively() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("TRANSFER-ENCODING"));
        assert!(!is_hop_by_hop("Content-Type"));
    }
}
