//! # Object Storage
//!
//! The service never receives file bytes. Creating a document or an import
//! issues a presigned upload descriptor; reading a COMPLETE document issues a
//! presigned download URL. Object keys are derived from identifiers so a
//! storage notification can be mapped back to its record.
//!
//! ## Keys
//!
//! ```text
//! documents: {storage_credentials_id}/{shipper_wallet_id}/{vault_id}/{document_id}.{ext}
//! imports:   {owner_id}/{import_id}.{ext}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use transmission_core::{DocumentId, ImportId, StorageCredentialsId, UserId, WalletId};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("storage returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("malformed object key: {0}")]
    MalformedKey(String),
}

// ─── Keys ────────────────────────────────────────────────────────────

/// Bucket an object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Documents,
    Imports,
}

/// Key of a document object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub storage_credentials_id: StorageCredentialsId,
    pub shipper_wallet_id: WalletId,
    pub vault_id: Uuid,
    pub document_id: DocumentId,
    pub extension: String,
}

impl ObjectKey {
    /// Parse a key produced by `Display`.
    pub fn parse(key: &str) -> Result<Self, StorageError> {
        let malformed = || StorageError::MalformedKey(key.to_string());
        let parts: Vec<&str> = key.trim_start_matches('/').split('/').collect();
        let [credentials, wallet, vault, file] = parts.as_slice() else {
            return Err(malformed());
        };
        let (document, extension) = file.rsplit_once('.').ok_or_else(malformed)?;
        if extension.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            storage_credentials_id: StorageCredentialsId::new(*credentials)
                .map_err(|_| malformed())?,
            shipper_wallet_id: WalletId::new(*wallet).map_err(|_| malformed())?,
            vault_id: vault.parse().map_err(|_| malformed())?,
            document_id: document.parse().map_err(|_| malformed())?,
            extension: extension.to_string(),
        })
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}.{}",
            self.storage_credentials_id,
            self.shipper_wallet_id,
            self.vault_id,
            self.document_id,
            self.extension
        )
    }
}

/// Key of an import object.
pub fn import_key(owner: &UserId, import: &ImportId, extension: &str) -> String {
    format!("{owner}/{import}.{extension}")
}

// ─── Presigning ──────────────────────────────────────────────────────

/// Presigned POST: the client posts the file to `url` with `fields` as form
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadDescriptor {
    pub url: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct StorageConfig {
    pub base_url: Url,
    pub document_bucket: String,
    pub import_bucket: String,
    pub signing_secret: Vec<u8>,
    pub presign_ttl: Duration,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_url", &self.base_url.as_str())
            .field("document_bucket", &self.document_bucket)
            .field("import_bucket", &self.import_bucket)
            .field("signing_secret", &"[REDACTED]")
            .field("presign_ttl", &self.presign_ttl)
            .finish()
    }
}

/// Object storage collaborator.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn presign_upload(&self, bucket: Bucket, key: &str, content_type: &str, now: DateTime<Utc>) -> UploadDescriptor;

    fn presign_download(&self, bucket: Bucket, key: &str, now: DateTime<Utc>) -> String;

    /// Whether the object is present.
    async fn object_exists(&self, bucket: Bucket, key: &str) -> Result<bool, StorageError>;
}

/// Storage behind an S3-compatible endpoint that accepts HMAC-SHA256 signed
/// URLs.
#[derive(Debug, Clone)]
pub struct SignedUrlStorage {
    http: reqwest::Client,
    config: StorageConfig,
}

impl SignedUrlStorage {
    pub fn new(http: reqwest::Client, config: StorageConfig) -> Self {
        Self { http, config }
    }

    fn bucket_name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Documents => &self.config.document_bucket,
            Bucket::Imports => &self.config.import_bucket,
        }
    }

    fn object_url(&self, bucket: Bucket, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            self.bucket_name(bucket),
            key
        )
    }

    fn expires(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() + self.config.presign_ttl.as_secs() as i64
    }

    fn sign(&self, method: &str, bucket: Bucket, key: &str, expires: i64) -> String {
        signature(
            &self.config.signing_secret,
            method,
            self.bucket_name(bucket),
            key,
            expires,
        )
    }
}

fn signature(secret: &[u8], method: &str, bucket: &str, key: &str, expires: i64) -> String {
    // new_from_slice accepts keys of any length for HMAC.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(format!("{method}\n{bucket}/{key}\n{expires}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl ObjectStorage for SignedUrlStorage {
    fn presign_upload(&self, bucket: Bucket, key: &str, content_type: &str, now: DateTime<Utc>) -> UploadDescriptor {
        let expires = self.expires(now);
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), key.to_string());
        fields.insert("Content-Type".to_string(), content_type.to_string());
        fields.insert("expires".to_string(), expires.to_string());
        fields.insert(
            "signature".to_string(),
            self.sign("POST", bucket, key, expires),
        );
        UploadDescriptor {
            url: format!(
                "{}/{}",
                self.config.base_url.as_str().trim_end_matches('/'),
                self.bucket_name(bucket)
            ),
            fields,
        }
    }

    fn presign_download(&self, bucket: Bucket, key: &str, now: DateTime<Utc>) -> String {
        let expires = self.expires(now);
        format!(
            "{}?expires={expires}&signature={}",
            self.object_url(bucket, key),
            self.sign("GET", bucket, key, expires)
        )
    }

    async fn object_exists(&self, bucket: Bucket, key: &str) -> Result<bool, StorageError> {
        let now = Utc::now();
        let expires = self.expires(now);
        let url = format!(
            "{}?expires={expires}&signature={}",
            self.object_url(bucket, key),
            self.sign("HEAD", bucket, key, expires)
        );
        let resp = self
            .http
            .head(&url)
            .send()
            .await
            .map_err(|e| StorageError::Http {
                url: self.object_url(bucket, key),
                source: e,
            })?;
        match resp.status().as_u16() {
            200..=299 => Ok(true),
            404 => Ok(false),
            status => Err(StorageError::Status {
                url: self.object_url(bucket, key),
                status,
            }),
        }
    }
}

/// Constant-time comparison of a presented notification token.
pub fn events_token_matches(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
