use std::fs;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Certificate, Client, Identity, Proxy, Response};
use serde::de::DeserializeOwned;
use tisdk_common::config::NetworkConfig;
use tisdk_common::error::{Result, TiError};
use tracing::debug;

const USER_AGENT_STRING: &str = "tisdk (Rust; SDK manager)";

/// Builds a client honoring the proxy, CA, TLS verification and client identity settings.
///
/// No timeout is configured unless `network.timeout` is set.
pub fn build_http_client(network: &NetworkConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

    let mut builder = Client::builder()
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(timeout) = network.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy) = &network.proxy {
        debug!("Using proxy {}", proxy);
        let proxy = Proxy::all(proxy)
            .map_err(|e| TiError::Config(format!("Invalid proxy '{proxy}': {e}")))?;
        builder = builder.proxy(proxy);
    }

    if let Some(pem) = &network.ca {
        let cert = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| TiError::Config(format!("Invalid CA certificate: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    if let Some(ca_file) = &network.ca_file {
        let pem = fs::read(ca_file).map_err(|e| {
            TiError::Config(format!("Failed to read CA file {}: {e}", ca_file.display()))
        })?;
        let cert = Certificate::from_pem(&pem).map_err(|e| {
            TiError::Config(format!("Invalid CA file {}: {e}", ca_file.display()))
        })?;
        builder = builder.add_root_certificate(cert);
    }

    if network.strict_ssl == Some(false) {
        debug!("TLS certificate verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }

    match (&network.cert_file, &network.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let cert = fs::read(cert_file).map_err(|e| {
                TiError::Config(format!("Failed to read cert file {}: {e}", cert_file.display()))
            })?;
            let key = fs::read(key_file).map_err(|e| {
                TiError::Config(format!("Failed to read key file {}: {e}", key_file.display()))
            })?;
            let identity = Identity::from_pkcs8_pem(&cert, &key)
                .map_err(|e| TiError::Config(format!("Invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(TiError::Config(
                "Client certificate and key must be configured together".to_string(),
            ))
        }
    }

    builder
        .build()
        .map_err(|e| TiError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Sends a GET and turns transport failures and error statuses into [`TiError`]s.
///
/// There is no retry; failures surface immediately.
pub async fn get_checked(client: &Client, url: &str) -> Result<Response> {
    let response = client.get(url).send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        TiError::Transport(format!("Request to {url} failed: {e}"))
    })?;

    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);
    if status.as_u16() >= 400 {
        return Err(TiError::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

/// Fetches a URL and parses the body as JSON.
pub async fn fetch_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    debug!("Fetching {}", url);
    let response = get_checked(client, url).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| TiError::Transport(format!("Failed to read response from {url}: {e}")))?;
    serde_json::from_slice(&body).map_err(TiError::from)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use httpmock::prelude::*;

    use super::*;

    #[test]
    fn default_client_builds() {
        assert!(build_http_client(&NetworkConfig::default()).is_ok());
    }

    #[test]
    fn rejects_half_configured_identity() {
        let network = NetworkConfig {
            cert_file: Some(PathBuf::from("/nonexistent/cert.pem")),
            ..NetworkConfig::default()
        };
        let err = build_http_client(&network).unwrap_err();
        assert_eq!(err.code(), "ECONFIG");
    }

    #[tokio::test]
    async fn fetch_json_parses_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/branches.json");
                then.status(200)
                    .header("Content-Type", "application/octet-stream")
                    .body(r#"{"defaultBranch":"master","branches":["master"]}"#);
            })
            .await;

        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let value: serde_json::Value = fetch_json(&client, &server.url("/branches.json"))
            .await
            .unwrap();
        assert_eq!(value["defaultBranch"], "master");
    }

    #[tokio::test]
    async fn fetch_json_reports_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/bad-request");
                then.status(400).body("Bad request");
            })
            .await;

        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let err = fetch_json::<serde_json::Value>(&client, &server.url("/bad-request"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), "400 Bad Request");
    }

    #[tokio::test]
    async fn fetch_json_rejects_invalid_json() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/bad.json");
                then.status(200).body("{{{{");
            })
            .await;

        let client = build_http_client(&NetworkConfig::default()).unwrap();
        let err = fetch_json::<serde_json::Value>(&client, &server.url("/bad.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, TiError::Json(_)));
    }
}
