//! Shared, read-only state every worker thread queries against — built
//! once at startup from the loaded configuration plus the assembled
//! `RpCatalog`.

use cleanflux_backend::ReqwestBackendClient;
use cleanflux_core::catalog::{AggregationProperties, CounterOverflows, RpCatalog};
use cleanflux_core::rules::RuleName;

pub struct ProxyState {
    pub backend_netloc: String,
    pub backend: ReqwestBackendClient,
    pub forward_client: reqwest::blocking::Client,
    pub catalog: RpCatalog,
    pub aggregation_properties: AggregationProperties,
    pub counter_overflows: CounterOverflows,
    pub enabled_rules: Vec<RuleName>,
    pub max_nb_points_per_series: Option<i64>,
    pub max_nb_points_per_query: Option<i64>,
    pub override_explicit_rp: bool,
}
