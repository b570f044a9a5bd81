//! Backend reachability probe.
//!
//! Pings the PostgREST root of the configured backend so the operator knows
//! before the first login whether records will reach the server.

use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// URL of the REST root for `base_url`.
pub fn probe_url(base_url: &str) -> String {
    format!("{}/rest/v1/", base_url.trim().trim_end_matches('/'))
}

/// Return the HTTP status the backend answers with, or why it did not.
///
/// Any HTTP answer counts as reachable; a 401 usually means a wrong API key.
pub async fn probe(base_url: &str, api_key: &str) -> Result<reqwest::StatusCode, String> {
    let url = probe_url(base_url);
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| format!("HTTP client error: {}", e))?;
    let response = client
        .get(&url)
        .header("apikey", api_key)
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| format!("backend unreachable at {}: {}", url, e))?;
    Ok(response.status())
}
