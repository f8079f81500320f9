//! Continuous-query enrichment at catalog-build time (spec §4.4's
//! "ContinuousQuery binding"), grounded on `get_rp_list` in `querying.py`:
//! the same pass that walks `SHOW CONTINUOUS QUERIES` output there and
//! assigns each target RP its bucket width.

use cleanflux_core::catalog::{ContinuousQuery, RpCatalog};

/// Assign `RetentionPolicy.interval` to every RP that is the target of a
/// non-renaming continuous query, exactly once, and add RPs the catalog
/// hasn't otherwise seen. Process-global and run once at catalog-build
/// time — never refreshed mid-request.
pub fn enrich_from_cqs(catalog: &mut RpCatalog, cqs: &[ContinuousQuery]) {
    catalog.enrich_from_continuous_queries(cqs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleanflux_core::catalog::RetentionPolicy;

    #[test]
    fn delegates_to_core_catalog_enrichment() {
        let mut catalog = RpCatalog::new();
        catalog.insert_schema("telemetry", vec![RetentionPolicy::new("autogen", None).default_flag(true)]);
        enrich_from_cqs(
            &mut catalog,
            &[ContinuousQuery {
                schema: "telemetry".into(),
                source_rp: "autogen".into(),
                target_rp: "downsampled_1h".into(),
                interval: "1h".into(),
            }],
        );
        assert!(catalog.find_rp("telemetry", "downsampled_1h").is_some());
    }
}
