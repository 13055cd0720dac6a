use async_trait::async_trait;
use std::collections::BTreeMap;
use url::Url;

use super::{Transport, TransportRequest, TransportResponse};
use crate::error::TransportError;
use crate::keys::{url_resource_key, DEFAULT_RESOURCE};
use crate::request::Method;

/// [`Transport`] over HTTP(S) using a shared `reqwest` client.
///
/// Relative targets are resolved against the optional base URL. Timeouts are
/// not configured on the client; the executor owns them.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::Other(err.to_string()))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(base_url)
            .map_err(|err| TransportError::InvalidRequest(format!("{base_url}: {err}")))?;
        self.base_url = Some(url);
        Ok(self)
    }

    fn resolve(&self, target: &str) -> Result<Url, TransportError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(target),
            None => Url::parse(target),
        };
        resolved.map_err(|err| TransportError::InvalidRequest(format!("{target}: {err}")))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = self.resolve(&request.target)?;
        let mut builder = self.client.request(to_reqwest_method(request.method), url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = &request.payload {
            let body = serde_json::to_vec(payload)
                .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_connect() {
                TransportError::Connect(err.to_string())
            } else {
                TransportError::Other(err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Other(err.to_string()))?;

        Ok(TransportResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    fn resource_key(&self, target: &str) -> String {
        self.resolve(target)
            .ok()
            .and_then(|url| url_resource_key(&url))
            .unwrap_or_else(|| DEFAULT_RESOURCE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_against_base() {
        let transport = HttpTransport::new()
            .unwrap()
            .with_base_url("https://api.test/v1/")
            .unwrap();
        let url = transport.resolve("users?page=2").unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/users?page=2");
    }

    #[test]
    fn test_resource_key_uses_resolved_host() {
        let transport = HttpTransport::new()
            .unwrap()
            .with_base_url("https://api.test:8443/v1/")
            .unwrap();
        assert_eq!(transport.resource_key("/v1/users"), "api.test:8443");
        assert_eq!(transport.resource_key("orders/9"), "api.test:8443");
        assert_eq!(transport.resource_key("https://other.test/x"), "other.test");

        let bare = HttpTransport::new().unwrap();
        assert_eq!(bare.resource_key("/users"), DEFAULT_RESOURCE);
    }

    #[test]
    fn test_relative_without_base_is_invalid() {
        let transport = HttpTransport::new().unwrap();
        assert!(matches!(
            transport.resolve("/users"),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
