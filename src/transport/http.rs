//! HTTP transport speaking the Cloud Files v1 wire protocol.
//!
//! Authentication is a GET against the identity endpoint with
//! `X-Auth-User`/`X-Auth-Key` headers; the response carries the token and the
//! per-account storage/CDN URLs in headers. Object operations are plain
//! HEAD/GET/PUT/DELETE requests on `{storage_url}/{container}/{name}`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{AuthGrant, ByteStream, ContainerInfo, ObjectInfo, Transport};
use crate::config::StorageOptions;
use crate::error::{Result, StorageError};

const AUTH_USER_HEADER: &str = "X-Auth-User";
const AUTH_KEY_HEADER: &str = "X-Auth-Key";
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const STORAGE_URL_HEADER: &str = "X-Storage-Url";
const CDN_URL_HEADER: &str = "X-CDN-Management-Url";

/// v1 tokens are valid for 24h; renew a little early.
const TOKEN_TTL_SECS: i64 = 23 * 3600;

/// Timestamp format used in JSON container listings.
const LISTING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    auth_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a transport against the given identity endpoint. Every request
    /// issued through it is bounded by `timeout`.
    pub fn new(auth_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let auth_url = auth_url.into();
        Url::parse(&auth_url)
            .map_err(|e| StorageError::Config(format!("invalid auth URL \"{}\": {}", auth_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, auth_url, timeout })
    }

    /// Build a transport whose request bound comes from the options'
    /// configured timeout.
    pub fn from_options(auth_url: impl Into<String>, options: &StorageOptions) -> Result<Self> {
        Self::new(auth_url, options.timeout())
    }

    /// The per-request bound every call through this transport carries.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn container_url(&self, grant: &AuthGrant, container: &str) -> String {
        format!(
            "{}/{}",
            grant.storage_url.trim_end_matches('/'),
            urlencoding::encode(container)
        )
    }

    fn object_url(&self, grant: &AuthGrant, container: &str, name: &str) -> String {
        format!(
            "{}/{}",
            self.container_url(grant, container),
            encode_object_path(name)
        )
    }
}

/// Percent-encode each path segment but keep the slashes: object names are
/// opaque and may themselves contain separators.
fn encode_object_path(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn header_u64(headers: &HeaderMap, name: &str) -> u64 {
    header_string(headers, name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn require_header(headers: &HeaderMap, name: &str) -> Result<String> {
    header_string(headers, name)
        .ok_or_else(|| StorageError::Transfer(format!("auth response missing {} header", name)))
}

/// Object sizes must be exact; a HEAD without a usable Content-Length is a
/// failed lookup, not a zero-byte object.
fn require_content_length(headers: &HeaderMap, name: &str) -> Result<u64> {
    header_string(headers, "Content-Length")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            StorageError::Transfer(format!(
                "object lookup for \"{}\" returned no usable Content-Length",
                name
            ))
        })
}

/// Parse an HTTP date header (RFC 2822 style).
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse the naive UTC timestamps container listings use.
fn parse_listing_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, LISTING_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

async fn transfer_error(context: &str, response: Response) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = body.trim();
    if detail.is_empty() {
        StorageError::Transfer(format!("{}: HTTP {}", context, status))
    } else {
        StorageError::Transfer(format!("{}: HTTP {} - {}", context, status, detail))
    }
}

#[derive(Debug, Deserialize)]
struct ListingEntry {
    name: String,
    bytes: u64,
    last_modified: String,
    content_type: String,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn authenticate(&self, username: &str, api_key: &str) -> Result<AuthGrant> {
        let response = self
            .client
            .get(&self.auth_url)
            .header(AUTH_USER_HEADER, username)
            .header(AUTH_KEY_HEADER, api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StorageError::Authentication(format!(
                "credentials rejected for user \"{}\"",
                username
            )));
        }
        if !status.is_success() {
            return Err(transfer_error("authentication", response).await);
        }

        let headers = response.headers();
        let grant = AuthGrant {
            token: require_header(headers, AUTH_TOKEN_HEADER)?,
            storage_url: require_header(headers, STORAGE_URL_HEADER)?,
            cdn_url: header_string(headers, CDN_URL_HEADER),
            expires_at: Utc::now() + chrono::Duration::seconds(TOKEN_TTL_SECS),
        };
        tracing::debug!("authenticated against {}", self.auth_url);
        Ok(grant)
    }

    async fn head_container(&self, grant: &AuthGrant, container: &str) -> Result<ContainerInfo> {
        let url = self.container_url(grant, container);
        let response = self
            .client
            .head(&url)
            .header(AUTH_TOKEN_HEADER, &grant.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::container_not_found(container));
        }
        if !response.status().is_success() {
            return Err(transfer_error("container lookup", response).await);
        }

        let headers = response.headers();
        Ok(ContainerInfo {
            name: container.to_string(),
            object_count: header_u64(headers, "X-Container-Object-Count"),
            bytes_used: header_u64(headers, "X-Container-Bytes-Used"),
        })
    }

    async fn head_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
    ) -> Result<ObjectInfo> {
        let url = self.object_url(grant, container, name);
        let response = self
            .client
            .head(&url)
            .header(AUTH_TOKEN_HEADER, &grant.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::object_not_found(name));
        }
        if !response.status().is_success() {
            return Err(transfer_error("object lookup", response).await);
        }

        let headers = response.headers();
        let last_modified = match header_string(headers, "Last-Modified")
            .as_deref()
            .and_then(parse_http_date)
        {
            Some(ts) => ts,
            None => {
                tracing::warn!("object \"{}\" has no parsable Last-Modified header", name);
                Utc::now()
            }
        };

        Ok(ObjectInfo {
            name: name.to_string(),
            size: require_content_length(headers, name)?,
            last_modified,
            content_type: header_string(headers, "Content-Type")
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        })
    }

    async fn get_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
    ) -> Result<ByteStream> {
        let url = self.object_url(grant, container, name);
        let response = self
            .client
            .get(&url)
            .header(AUTH_TOKEN_HEADER, &grant.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::object_not_found(name));
        }
        if !response.status().is_success() {
            return Err(transfer_error("object download", response).await);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(stream.boxed())
    }

    async fn put_object(
        &self,
        grant: &AuthGrant,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<()> {
        let url = self.object_url(grant, container, name);
        let response = self
            .client
            .put(&url)
            .header(AUTH_TOKEN_HEADER, &grant.token)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(transfer_error("object store", response).await);
        }
        Ok(())
    }

    async fn delete_object(&self, grant: &AuthGrant, container: &str, name: &str) -> Result<()> {
        let url = self.object_url(grant, container, name);
        let response = self
            .client
            .delete(&url)
            .header(AUTH_TOKEN_HEADER, &grant.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::object_not_found(name));
        }
        if !response.status().is_success() {
            return Err(transfer_error("object delete", response).await);
        }
        Ok(())
    }

    async fn list_objects(&self, grant: &AuthGrant, container: &str) -> Result<Vec<ObjectInfo>> {
        let url = format!("{}?format=json", self.container_url(grant, container));
        let response = self
            .client
            .get(&url)
            .header(AUTH_TOKEN_HEADER, &grant.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::container_not_found(container));
        }
        if !response.status().is_success() {
            return Err(transfer_error("container listing", response).await);
        }

        let entries: Vec<ListingEntry> = response.json().await?;
        Ok(entries
            .into_iter()
            .map(|entry| ObjectInfo {
                size: entry.bytes,
                last_modified: parse_listing_time(&entry.last_modified).unwrap_or_else(|| {
                    tracing::warn!(
                        "listing entry \"{}\" has unparsable timestamp \"{}\"",
                        entry.name,
                        entry.last_modified
                    );
                    Utc::now()
                }),
                content_type: entry.content_type,
                name: entry.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_object_path_keeps_slashes() {
        assert_eq!(encode_object_path("a/b/c.txt"), "a/b/c.txt");
        assert_eq!(
            encode_object_path("reports/2014 Q1.pdf"),
            "reports/2014%20Q1.pdf"
        );
    }

    #[test]
    fn test_object_url_joins_on_storage_url() {
        let transport =
            HttpTransport::new("https://auth.example.test/v1.0", Duration::from_secs(5)).unwrap();
        let grant = AuthGrant {
            token: "tok".into(),
            storage_url: "https://storage.example.test/v1/acct/".into(),
            cdn_url: None,
            expires_at: Utc::now(),
        };
        assert_eq!(
            transport.object_url(&grant, "media", "a/b.txt"),
            "https://storage.example.test/v1/acct/media/a/b.txt"
        );
    }

    #[test]
    fn test_from_options_carries_configured_timeout() {
        let options = StorageOptions::new("user", "key", "DFW", "media")
            .with_timeout(Duration::from_secs(7));
        let transport =
            HttpTransport::from_options("https://auth.example.test/v1.0", &options).unwrap();
        assert_eq!(transport.timeout(), Duration::from_secs(7));
    }

    #[test]
    fn test_missing_content_length_is_transfer_error() {
        use reqwest::header::HeaderValue;

        let headers = HeaderMap::new();
        let err = require_content_length(&headers, "a.txt").unwrap_err();
        match err {
            StorageError::Transfer(msg) => {
                assert!(msg.contains("a.txt"));
                assert!(msg.contains("Content-Length"));
            }
            other => panic!("expected Transfer error, got {:?}", other),
        }

        let mut headers = HeaderMap::new();
        headers.insert("Content-Length", HeaderValue::from_static("nonsense"));
        assert!(require_content_length(&headers, "a.txt").is_err());

        headers.insert("Content-Length", HeaderValue::from_static("42"));
        assert_eq!(require_content_length(&headers, "a.txt").unwrap(), 42);
    }

    #[test]
    fn test_invalid_auth_url_is_config_error() {
        let err = HttpTransport::new("not a url", Duration::from_secs(5)).unwrap_err();
        match err {
            StorageError::Config(msg) => assert!(msg.contains("auth URL")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Wed, 15 Jan 2014 16:41:49 GMT").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2014-01-15T16:41:49+00:00");
    }

    #[test]
    fn test_parse_listing_time() {
        let parsed = parse_listing_time("2014-01-15T16:41:49.390270").unwrap();
        assert_eq!(parsed.timestamp(), 1389804109);
        assert!(parse_listing_time("garbage").is_none());
    }
}
