//! Blocking REST client for the detector integration service.
//!
//! The service orchestrates the detector, backend, writer and
//! visualization components; this client only models the handful of
//! operations the tools use. Every response carries a `state` field which
//! is `"ok"` unless the request was rejected.

use serde::Deserialize;
use std::time::Duration;

use super::config::IntegrationConfig;
use super::error::ClientError;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    state: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    config: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct DetectorClient {
    address: String,
    http: reqwest::blocking::Client,
}

impl DetectorClient {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.trim_end_matches('/').to_string(),
            http: reqwest::blocking::Client::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{}", self.address, endpoint)
    }

    fn check(response: reqwest::blocking::Response) -> Result<ApiResponse, ClientError> {
        let api: ApiResponse = response.error_for_status()?.json()?;
        if api.state != "ok" {
            let reason = api.status.unwrap_or(api.state);
            return Err(ClientError::Service(reason));
        }
        Ok(api)
    }

    /// Current state of the integration pipeline, e.g.
    /// `IntegrationStatus.RUNNING`.
    pub fn get_status(&self) -> Result<String, ClientError> {
        let api = Self::check(self.http.get(self.url("status")).send()?)?;
        api.status
            .ok_or_else(|| ClientError::BadResponse(String::from("status response had no status")))
    }

    /// Reset the pipeline into its initial state.
    pub fn reset(&self) -> Result<(), ClientError> {
        Self::check(self.http.post(self.url("reset")).send()?)?;
        Ok(())
    }

    pub fn start(&self) -> Result<(), ClientError> {
        Self::check(self.http.post(self.url("start")).send()?)?;
        Ok(())
    }

    pub fn stop(&self) -> Result<(), ClientError> {
        Self::check(self.http.post(self.url("stop")).send()?)?;
        Ok(())
    }

    /// Configure writer, backend, detector and bsread in one call.
    pub fn set_config(&self, config: &IntegrationConfig) -> Result<(), ClientError> {
        Self::check(self.http.put(self.url("config")).json(config).send()?)?;
        Ok(())
    }

    pub fn get_config(&self) -> Result<serde_json::Value, ClientError> {
        let api = Self::check(self.http.get(self.url("config")).send()?)?;
        api.config
            .ok_or_else(|| ClientError::BadResponse(String::from("config response had no config")))
    }

    /// Pass a low-level command to the detector, e.g.
    /// `set_detector_value("clearbit", "0x5d 12")`.
    pub fn set_detector_value(&self, command: &str, value: &str) -> Result<(), ClientError> {
        let payload = serde_json::json!({ "command": command, "value": value });
        Self::check(
            self.http
                .post(self.url("detector/value"))
                .json(&payload)
                .send()?,
        )?;
        Ok(())
    }

    /// Poll until the reported status leaves `state`; returns the first
    /// different status.
    pub fn wait_while(&self, state: &str, poll: Duration) -> Result<String, ClientError> {
        loop {
            let status = self.get_status()?;
            if status != state {
                return Ok(status);
            }
            std::thread::sleep(poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_get_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/status");
            then.status(200)
                .json_body(serde_json::json!({"state": "ok", "status": "IntegrationStatus.INITIALIZED"}));
        });

        let client = DetectorClient::new(&server.base_url());
        assert_eq!(client.get_status().unwrap(), "IntegrationStatus.INITIALIZED");
    }

    #[test]
    fn test_rejected_request_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v1/start");
            then.status(200)
                .json_body(serde_json::json!({"state": "error", "status": "not configured"}));
        });

        let client = DetectorClient::new(&server.base_url());
        assert!(matches!(client.start(), Err(ClientError::Service(_))));
    }

    #[test]
    fn test_set_detector_value_payload() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1/detector/value")
                .json_body(serde_json::json!({"command": "clearbit", "value": "0x5d 12"}));
            then.status(200).json_body(serde_json::json!({"state": "ok"}));
        });

        let client = DetectorClient::new(&server.base_url());
        client.set_detector_value("clearbit", "0x5d 12").unwrap();
        mock.assert();
    }
}
