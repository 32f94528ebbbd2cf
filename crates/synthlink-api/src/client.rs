// Controller HTTP client
//
// Wraps `reqwest::Client` with URL construction relative to the editor's
// base URL, status checking, and body decoding. Every endpoint the
// controller serves is a GET, including the ones with side effects.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{DeviceListing, ParameterValue, ParametersPayload};
use crate::transport::TransportConfig;

const BODY_PREVIEW_CHARS: usize = 200;

/// Raw HTTP client for the controller's `api/*` endpoints.
///
/// The `base_url` is the editor root (e.g. `http://localhost:8080/`);
/// endpoint paths are appended as segments so device names are
/// percent-encoded.
#[derive(Debug, Clone)]
pub struct EditorClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl EditorClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout: transport.timeout,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }

    /// The editor base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The duplex channel endpoint: `ws://<host>/ws`, or `wss` when the
    /// editor is served over HTTPS.
    pub fn ws_url(&self) -> Result<Url, Error> {
        let mut url = self.endpoint(&["ws"])?;
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocketConnect(format!("cannot derive {scheme} URL from {}", self.base_url)))?;
        Ok(url)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET api/devices`
    pub async fn list_devices(&self) -> Result<DeviceListing, Error> {
        let url = self.endpoint(&["api", "devices"])?;
        self.get_json(url).await
    }

    /// `GET api/parameters`
    pub async fn list_parameters(&self) -> Result<Vec<ParameterValue>, Error> {
        let url = self.endpoint(&["api", "parameters"])?;
        let payload: ParametersPayload = self.get_json(url).await?;
        Ok(payload.into_values())
    }

    /// `GET api/parameters/update`
    ///
    /// The controller answers once every parameter has been re-read from
    /// the hardware, so no per-request timeout is applied here.
    pub async fn update_parameters(&self) -> Result<(), Error> {
        let url = self.endpoint(&["api", "parameters", "update"])?;
        self.send_get(url, None).await.map(drop)
    }

    /// `GET api/input/{name}`. The response body is not interpreted.
    pub async fn select_input(&self, name: &str) -> Result<(), Error> {
        let url = self.endpoint(&["api", "input", name])?;
        self.send_get(url, Some(self.timeout)).await.map(drop)
    }

    /// `GET api/output/{name}`. The response body is not interpreted.
    pub async fn select_output(&self, name: &str) -> Result<(), Error> {
        let url = self.endpoint(&["api", "output", name])?;
        self.send_get(url, Some(self.timeout)).await.map(drop)
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Append path segments to the base URL, percent-encoding each one.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let resp = self.send_get(url, Some(self.timeout)).await?;
        let body = resp.text().await.map_err(Error::Transport)?;

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body,
        })
    }

    /// Send a GET and fail on any non-2xx status.
    async fn send_get(&self, url: Url, timeout: Option<Duration>) -> Result<reqwest::Response, Error> {
        debug!("GET {}", url);

        let endpoint = url.path().to_owned();
        let mut request = self.http.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_secs: timeout.map_or(0, |t| t.as_secs()),
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                endpoint,
                status: status.as_u16(),
                body: preview(&body),
            });
        }

        Ok(resp)
    }
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> EditorClient {
        EditorClient::with_client(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn endpoint_appends_segments() {
        let c = client("http://localhost:8080");
        let url = c.endpoint(&["api", "devices"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/devices");
    }

    #[test]
    fn endpoint_respects_base_path() {
        let c = client("http://studio.local/editor/");
        let url = c.endpoint(&["api", "parameters", "update"]).unwrap();
        assert_eq!(url.as_str(), "http://studio.local/editor/api/parameters/update");
    }

    #[test]
    fn device_names_are_percent_encoded() {
        let c = client("http://localhost:8080/");
        let url = c.endpoint(&["api", "input", "USB MIDI 1/2"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/input/USB%20MIDI%201%2F2"
        );
    }

    #[test]
    fn ws_url_follows_scheme() {
        assert_eq!(
            client("http://localhost:8080/").ws_url().unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            client("https://studio.local/").ws_url().unwrap().as_str(),
            "wss://studio.local/ws"
        );
    }

    #[test]
    fn preview_is_char_safe() {
        let body = "é".repeat(300);
        assert_eq!(preview(&body).chars().count(), BODY_PREVIEW_CHARS);
    }
}
