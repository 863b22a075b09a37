//! S3-compatible HTTP object-store backend.
//!
//! Objects live at `{endpoint}/{bucket}/{key}` (path-style) or
//! `{bucket}.{endpoint-host}/{key}` (virtual-hosted); object metadata rides
//! in `x-amz-meta-*` headers. A 404 is the absence signal; any other
//! non-success status is a backend error. Request signing is out of scope:
//! the gateway is expected to accept anonymous access or a static bearer
//! token.

use std::collections::HashMap;
use std::time::Duration;

use remcache_core::{Error, Result};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use url::Url;

use crate::backend::{Object, ObjectBackend};

const METADATA_HEADER_PREFIX: &str = "x-amz-meta-";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How object URLs address the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressingStyle {
    /// `https://{bucket}.{endpoint-host}/{key}`
    #[default]
    VirtualHosted,
    /// `https://{endpoint-host}/{bucket}/{key}`
    Path,
}

/// Configuration for the HTTP backend, resolved once at startup.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Object-store base URL, scheme included.
    pub endpoint: String,
    /// Bucket holding cached artifacts.
    pub bucket: String,
    pub addressing: AddressingStyle,
    /// Optional static bearer token attached to every request.
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl HttpBackendConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        HttpBackendConfig {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            addressing: AddressingStyle::default(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// S3-compatible gateway client.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| Error::configuration(format!("build http client: {error}")))?;
        let base_url = bucket_base_url(&config)?;

        Ok(HttpBackend {
            client,
            base_url,
            auth_token: config.auth_token,
        })
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                Error::configuration(format!("endpoint '{}' cannot carry a path", self.base_url))
            })?;
            segments.pop_if_empty().extend(key.split('/'));
        }
        Ok(url)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn bucket_base_url(config: &HttpBackendConfig) -> Result<Url> {
    let mut url = Url::parse(&config.endpoint)
        .map_err(|error| Error::configuration(format!("invalid endpoint: {error}")))?;

    match config.addressing {
        AddressingStyle::VirtualHosted => {
            let host = url.host_str().ok_or_else(|| {
                Error::configuration(format!("endpoint '{}' has no host", config.endpoint))
            })?;
            let bucket_host = format!("{}.{host}", config.bucket);
            url.set_host(Some(&bucket_host)).map_err(|error| {
                Error::configuration(format!("invalid bucket host '{bucket_host}': {error}"))
            })?;
        }
        AddressingStyle::Path => {
            let mut segments = url.path_segments_mut().map_err(|()| {
                Error::configuration(format!("endpoint '{}' cannot carry a path", config.endpoint))
            })?;
            segments.pop_if_empty().push(&config.bucket);
        }
    }

    Ok(url)
}

fn metadata_from_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[async_trait::async_trait]
impl ObjectBackend for HttpBackend {
    async fn get(&self, key: &str) -> Result<Option<Object>> {
        let url = self.object_url(key)?;
        let response = self
            .request(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|error| Error::backend(key, format!("get {url}: {error}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::backend(
                key,
                format!("get {url}: unexpected status {}", response.status()),
            ));
        }

        let metadata = metadata_from_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|error| Error::backend(key, format!("get {url}: read body: {error}")))?;

        Ok(Some(Object { body, metadata }))
    }

    async fn put(&self, key: &str, object: Object) -> Result<()> {
        let url = self.object_url(key)?;
        let mut request = self.request(self.client.put(url.clone())).body(object.body);
        for (name, value) in &object.metadata {
            let header = format!("{METADATA_HEADER_PREFIX}{name}");
            request = request.header(header.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|error| Error::backend(key, format!("put {url}: {error}")))?;
        if !response.status().is_success() {
            return Err(Error::backend(
                key,
                format!("put {url}: unexpected status {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(addressing: AddressingStyle) -> HttpBackend {
        let config = HttpBackendConfig {
            addressing,
            ..HttpBackendConfig::new("https://s3.example.com", "artifacts")
        };
        HttpBackend::new(config).expect("backend")
    }

    #[test]
    fn virtual_hosted_urls_put_the_bucket_in_the_host() {
        let url = backend(AddressingStyle::VirtualHosted)
            .object_url("aabb")
            .expect("url");
        assert_eq!(url.as_str(), "https://artifacts.s3.example.com/aabb");
    }

    #[test]
    fn path_style_urls_put_the_bucket_in_the_path() {
        let url = backend(AddressingStyle::Path).object_url("aabb").expect("url");
        assert_eq!(url.as_str(), "https://s3.example.com/artifacts/aabb");
    }

    #[test]
    fn prefixed_keys_keep_their_separator_as_a_path_boundary() {
        let url = backend(AddressingStyle::Path)
            .object_url("ci/aabb")
            .expect("url");
        assert_eq!(url.as_str(), "https://s3.example.com/artifacts/ci/aabb");
    }

    #[test]
    fn metadata_headers_are_stripped_to_their_suffix() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-meta-outputid", "bb".parse().expect("value"));
        headers.insert("content-length", "3".parse().expect("value"));

        let metadata = metadata_from_headers(&headers);
        assert_eq!(metadata.get("outputid").map(String::as_str), Some("bb"));
        assert_eq!(metadata.len(), 1);
    }

    #[test]
    fn invalid_endpoint_is_a_configuration_error() {
        let result = HttpBackend::new(HttpBackendConfig::new("not a url", "artifacts"));
        assert!(matches!(
            result,
            Err(remcache_core::Error::Configuration { .. })
        ));
    }
}
