//! Cloud Storage for Firebase adapter for product images.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{BlobRef, BlobStore, CatalogError};
use crate::config::FirebaseConfig;
use crate::identity::TokenSource;

/// Firebase Storage REST base URL.
const STORAGE_URL: &str = "https://firebasestorage.googleapis.com/v0/b";

/// Firebase Storage-backed [`BlobStore`].
#[derive(Clone)]
pub struct CloudStorageBlobs {
    client: reqwest::Client,
    /// `.../b/{bucket}/o`
    objects_url: String,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    /// Comma-separated list; the first one is used in download URLs.
    download_tokens: Option<String>,
}

impl CloudStorageBlobs {
    /// Create a new storage client for the configured bucket.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: &FirebaseConfig,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            objects_url: format!("{STORAGE_URL}/{}/o", config.storage_bucket),
            tokens,
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.objects_url, urlencoding::encode(path))
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.bearer_token().await {
            Some(token) => request.header(
                reqwest::header::AUTHORIZATION,
                format!("Firebase {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CatalogError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(response.url().path().to_owned()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl BlobStore for CloudStorageBlobs {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<BlobRef, CatalogError> {
        let mut url = Url::parse(&self.objects_url)
            .map_err(|e| CatalogError::Parse(format!("storage url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);

        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);
        let response = Self::check(self.authorize(request).await.send().await?).await?;
        let metadata: ObjectMetadata = response.json().await?;

        debug!(path = %metadata.name, "Uploaded blob");
        Ok(BlobRef {
            path: metadata.name,
            download_token: metadata
                .download_tokens
                .and_then(|t| t.split(',').next().map(str::to_owned))
                .filter(|t| !t.is_empty()),
        })
    }

    async fn resolve_url(&self, blob: &BlobRef) -> Result<Url, CatalogError> {
        let mut url = Url::parse(&self.object_url(&blob.path))
            .map_err(|e| CatalogError::Parse(format!("storage url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = &blob.download_token {
                query.append_pair("token", token);
            }
        }
        Ok(url)
    }

    #[instrument(skip(self), fields(path = %blob.path))]
    async fn delete(&self, blob: &BlobRef) -> Result<(), CatalogError> {
        let request = self.client.delete(self.object_url(&blob.path));
        Self::check(self.authorize(request).await.send().await?).await?;
        Ok(())
    }

    fn blob_for_url(&self, url: &str) -> Option<BlobRef> {
        parse_download_url(url)
    }
}

/// Recover the object path and token from a Firebase download URL.
fn parse_download_url(url: &str) -> Option<BlobRef> {
    let url = Url::parse(url).ok()?;
    let (_, encoded) = url.path().split_once("/o/")?;
    let path = urlencoding::decode(encoded).ok()?.into_owned();
    if path.is_empty() {
        return None;
    }

    let download_token = url
        .query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned());

    Some(BlobRef {
        path,
        download_token,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::Anonymous;
    use secrecy::SecretString;

    fn blobs() -> CloudStorageBlobs {
        let config = FirebaseConfig {
            api_key: SecretString::from("AIzaSyD-k3yF0rT3st1ngPurp0s3s"),
            project_id: "valfinds".to_string(),
            storage_bucket: "valfinds.appspot.com".to_string(),
        };
        CloudStorageBlobs::new(&config, Arc::new(Anonymous)).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_url_encodes_path() {
        let blob = BlobRef {
            path: "products/42_jacket.jpg".to_string(),
            download_token: Some("tok-1".to_string()),
        };

        let url = blobs().resolve_url(&blob).await.unwrap();
        assert_eq!(
            url.as_str(),
            "https://firebasestorage.googleapis.com/v0/b/valfinds.appspot.com/o/products%2F42_jacket.jpg?alt=media&token=tok-1"
        );
    }

    #[tokio::test]
    async fn test_blob_for_url_inverts_resolve_url() {
        let store = blobs();
        let blob = BlobRef {
            path: "products/7_red coat.png".to_string(),
            download_token: Some("abc".to_string()),
        };

        let url = store.resolve_url(&blob).await.unwrap();
        assert_eq!(store.blob_for_url(url.as_str()), Some(blob));
    }

    #[test]
    fn test_parse_foreign_url() {
        assert!(parse_download_url("https://cdn.example.com/jacket.jpg").is_none());
        assert!(parse_download_url("not a url").is_none());
    }

    #[test]
    fn test_parse_url_without_token() {
        let blob = parse_download_url(
            "https://firebasestorage.googleapis.com/v0/b/bucket/o/products%2F1_a.jpg?alt=media",
        )
        .unwrap();
        assert_eq!(blob.path, "products/1_a.jpg");
        assert!(blob.download_token.is_none());
    }
}
