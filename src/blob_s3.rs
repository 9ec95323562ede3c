//! S3-compatible blob store.
//!
//! Uploads the corpus artifact with a signed `PutObject` and reads it back
//! with a signed `GetObject`, using the S3 REST API and AWS Signature V4
//! directly. Works against AWS S3 and any S3-compatible endpoint, including
//! the Google Cloud Storage XML API with HMAC keys, which is how the
//! artifact reaches a `gs://` bucket for the Vertex corpus.
//!
//! ```toml
//! [blob_store]
//! backend = "s3"
//! bucket = "exam-rag"
//! region = "us-east-1"
//! prefix = "rag/"
//! # endpoint_url = "https://storage.googleapis.com"
//! # uri_scheme = "gs"
//! ```
//!
//! Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
//! optionally `AWS_SESSION_TOKEN`.
//!
//! On AWS the bucket is addressed virtual-host style
//! (`<bucket>.s3.<region>.amazonaws.com`); custom endpoints use path style
//! (`<endpoint>/<bucket>/<key>`), which every compatible service accepts.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::S3BlobConfig;
use crate::models::BlobLocation;
use crate::traits::BlobStore;

type HmacSha256 = Hmac<Sha256>;

// ============ AWS Credentials ============

pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Store ============

pub struct S3BlobStore {
    config: S3BlobConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3BlobStore {
    pub fn new(config: S3BlobConfig, creds: AwsCredentials) -> Self {
        Self {
            config,
            creds,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(config: S3BlobConfig) -> Result<Self> {
        Ok(Self::new(config, AwsCredentials::from_env()?))
    }

    /// Bucket key for an object name, under the configured prefix.
    fn object_key(&self, object_name: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        let name = object_name.trim_start_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    fn location_uri(&self, key: &str) -> String {
        format!("{}://{}/{}", self.config.uri_scheme, self.config.bucket, key)
    }

    /// Inverse of [`location_uri`](Self::location_uri).
    fn key_from_uri<'a>(&self, uri: &'a str) -> Result<&'a str> {
        let prefix = format!("{}://{}/", self.config.uri_scheme, self.config.bucket);
        uri.strip_prefix(prefix.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("{} is not an object in bucket {}", uri, self.config.bucket))
    }

    async fn send(
        &self,
        method: reqwest::Method,
        key: &str,
        body: Option<&[u8]>,
    ) -> Result<reqwest::Response> {
        let target = ObjectTarget::new(&self.config, key);
        let payload_hash = hex_sha256(body.unwrap_or_default());
        let signed = sign_request(
            method.as_str(),
            &target.host,
            &target.canonical_uri,
            &payload_hash,
            &self.creds,
            &self.config.region,
            Utc::now(),
        );

        let mut req = self
            .client
            .request(method.clone(), &target.url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &signed.amz_date);
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if let Some(bytes) = body {
            req = req
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(bytes.to_vec());
        }

        debug!(method = %method, url = %target.url, "s3 request");
        req.send()
            .await
            .map_err(|e| anyhow!("{} {} failed: {}", method, self.location_uri(key), e))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(&self, object_name: &str, body: &[u8]) -> Result<BlobLocation> {
        let key = self.object_key(object_name);
        let resp = self.send(reqwest::Method::PUT, &key, Some(body)).await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for {}: {}",
                status,
                self.location_uri(&key),
                text.chars().take(500).collect::<String>()
            );
        }

        Ok(BlobLocation {
            uri: self.location_uri(&key),
            size: body.len() as u64,
        })
    }

    async fn get(&self, location: &BlobLocation) -> Result<Vec<u8>> {
        let key = self.key_from_uri(&location.uri)?;
        let resp = self.send(reqwest::Method::GET, key, None).await?;

        if !resp.status().is_success() {
            bail!(
                "S3 GetObject failed (HTTP {}) for {}",
                resp.status(),
                location.uri
            );
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

// ============ Addressing ============

/// Where a signed request for one object goes.
struct ObjectTarget {
    url: String,
    host: String,
    canonical_uri: String,
}

impl ObjectTarget {
    fn new(config: &S3BlobConfig, key: &str) -> Self {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");

        match config.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                let canonical_uri = format!("/{}/{}", uri_encode(&config.bucket), encoded_key);
                Self {
                    url: format!("{}://{}{}", scheme, host, canonical_uri),
                    host,
                    canonical_uri,
                }
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", config.bucket, config.region);
                let canonical_uri = format!("/{}", encoded_key);
                Self {
                    url: format!("https://{}{}", host, canonical_uri),
                    host,
                    canonical_uri,
                }
            }
        }
    }
}

// ============ AWS SigV4 ============

struct SignedRequest {
    authorization: String,
    amz_date: String,
}

/// Sign a request with no query string.
///
/// Signed headers are `host`, `x-amz-content-sha256`, `x-amz-date` and,
/// with temporary credentials, `x-amz-security-token`.
fn sign_request(
    method: &str,
    host: &str,
    canonical_uri: &str,
    payload_hash: &str,
    creds: &AwsCredentials,
    region: &str,
    now: DateTime<Utc>,
) -> SignedRequest {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
    let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

    SignedRequest {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything but `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
