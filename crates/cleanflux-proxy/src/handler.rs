//! One request, start to finish, grounded on `do_GET`/`do_POST`/
//! `_handle_request`/`_return_response` in `request_handler.py`.
//!
//! Only `GET` (`do_GET`, aliased as `do_HEAD`/`do_OPTIONS` in the
//! original) attempts interception; `POST` always passes through, exactly
//! as in the original — `do_POST` never calls `_get_alt_data`.

use std::io::Read;
use std::sync::Arc;

use cleanflux_core::pipeline::{process_query, PipelineConfig};
use cleanflux_core::serializer::serialize_envelope;
use cleanflux_core::tabular::{BackendClient, TabularResult};
use tiny_http::{Header, Method, Request, Response};
use tracing::{debug, warn};

use crate::headers::filter_headers;
use crate::request::{parse_query_params, split_path_and_query};
use crate::state::ProxyState;

pub fn handle(mut request: Request, state: &Arc<ProxyState>, now_ns: i64) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query_string) = split_path_and_query(&url);
    let params = parse_query_params(query_string);

    if method == Method::Get && path == "/query" && !params.queries.is_empty() {
        match try_intercept(&params, state, now_ns) {
            Some(body) => {
                respond_json(request, body);
                return;
            }
            None => {
                debug!("no query needed rewriting, forwarding request untouched");
            }
        }
    }

    let mut body = Vec::new();
    if method == Method::Post {
        if let Err(e) = request.as_reader().read_to_end(&mut body) {
            warn!(error = %e, "failed to read request body");
        }
    }
    forward_raw(request, state, &method, &url, &body);
}

/// Run every `q=` statement through the pipeline. Returns `None` (forward
/// the original request untouched) unless at least one statement needed
/// rewriting — mirroring `get_alt_data`'s `got_alt_data` flag, the
/// remaining (unmodified) statements are still re-issued directly so the
/// JSON envelope covers every statement in the request.
fn try_intercept(params: &crate::request::QueryParams, state: &Arc<ProxyState>, now_ns: i64) -> Option<serde_json::Value> {
    let schema = params.schema.as_deref();
    let user = params.user.as_deref().unwrap_or("");
    let password = params.password.as_deref().unwrap_or("");

    let config = PipelineConfig {
        catalog: &state.catalog,
        aggregation_properties: &state.aggregation_properties,
        counter_overflows: &state.counter_overflows,
        enabled_rules: &state.enabled_rules,
        max_nb_points_per_series: state.max_nb_points_per_series,
        max_nb_points_per_query: state.max_nb_points_per_query,
        override_explicit_rp: state.override_explicit_rp,
    };

    let mut outcomes: Vec<Option<TabularResult>> = Vec::with_capacity(params.queries.len());
    let mut any_rewritten = false;
    for query in &params.queries {
        match process_query(query, schema, user, password, &config, now_ns, &state.backend) {
            Ok(Some(result)) => {
                any_rewritten = true;
                outcomes.push(Some(result));
            }
            Ok(None) => outcomes.push(None),
            Err(e) => {
                warn!(error = %e, query, "pipeline error, forwarding original query untouched for this statement");
                outcomes.push(None);
            }
        }
    }

    if !any_rewritten {
        return None;
    }

    let mut results = Vec::with_capacity(outcomes.len());
    for (outcome, query) in outcomes.into_iter().zip(&params.queries) {
        let result = match outcome {
            Some(result) => result,
            None => match state.backend.execute(schema.unwrap_or_default(), user, password, query) {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, query, "backend request failed while assembling alternate data");
                    TabularResult::new()
                }
            },
        };
        results.push(result);
    }

    Some(serialize_envelope(&results, params.epoch.as_deref()))
}

fn respond_json(request: Request, body: serde_json::Value) {
    let text = body.to_string();
    let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("static header is valid");
    let response = Response::from_string(text).with_header(header);
    if let Err(e) = request.respond(response) {
        warn!(error = %e, "failed to write response");
    }
}

fn forward_raw(request: Request, state: &Arc<ProxyState>, method: &Method, url: &str, body: &[u8]) {
    let forwarded_headers = filter_headers(request.headers());
    let backend_url = format!("http://{}{}", state.backend_netloc, url);

    let reqwest_method = match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Patch => reqwest::Method::PATCH,
        _ => reqwest::Method::GET,
    };

    let mut builder = state.forward_client.request(reqwest_method, &backend_url);
    for header in &forwarded_headers {
        builder = builder.header(header.field.as_str().as_str(), header.value.as_str());
    }
    if !body.is_empty() {
        builder = builder.body(body.to_vec());
    }

    match builder.send() {
        Ok(upstream) => {
            let status = upstream.status().as_u16();
            let response_headers: Vec<(String, String)> = upstream
                .headers()
                .iter()
                .filter(|(name, _)| !crate::headers::is_hop_by_hop(name.as_str()) && name.as_str() != "content-length")
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            let payload = upstream.bytes().map(|b| b.to_vec()).unwrap_or_default();

            let mut response = Response::from_data(payload).with_status_code(status);
            for (name, value) in response_headers {
                if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                    response = response.with_header(header);
                }
            }
            if let Err(e) = request.respond(response) {
                warn!(error = %e, "failed to write forwarded response");
            }
        }
        Err(e) => {
            let body = format!("Invalid response from backend: '{e}'. Server might be busy");
            warn!(error = %e, "backend forwarding failed");
            let response = Response::from_string(body).with_status_code(503);
            let _ = request.respond(response);
        }
    }
}
