//! Google Cloud Storage object store
//!
//! The storage location is the bucket name, so one store serves every bucket
//! the service account can reach.

use async_trait::async_trait;

use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};

use crate::error::{Error, Result};

use super::object_store::ObjectStore;

/// Google Cloud Storage object store
pub struct GcsObjectStore {
    client: GcsClient,
    /// Bucket probed by `health_check`
    probe_bucket: Option<String>,
}

impl GcsObjectStore {
    /// Create a client from ambient credentials
    pub async fn new(probe_bucket: Option<String>) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| Error::Config(format!("Failed to create GCS client: {}", e)))?;

        Ok(Self {
            client: GcsClient::new(config),
            probe_bucket,
        })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn get_object(&self, location: &str, key: &str) -> Result<Vec<u8>> {
        self.client
            .download_object(
                &GetObjectRequest {
                    bucket: location.to_string(),
                    object: key.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| Error::object_store(format!("Failed to download gs://{}/{}: {}", location, key, e)))
    }

    async fn put_object(
        &self,
        location: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String> {
        let mut media = Media::new(key.to_string());
        media.content_type = content_type.to_string().into();
        let upload_type = UploadType::Simple(media);

        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: location.to_string(),
                    ..Default::default()
                },
                data.to_vec(),
                &upload_type,
            )
            .await
            .map_err(|e| Error::object_store(format!("Failed to upload gs://{}/{}: {}", location, key, e)))?;

        Ok(format!("gs://{}/{}", location, key))
    }

    async fn health_check(&self) -> Result<bool> {
        let Some(bucket) = &self.probe_bucket else {
            return Ok(true);
        };

        let request = ListObjectsRequest {
            bucket: bucket.clone(),
            max_results: Some(1),
            ..Default::default()
        };
        Ok(self.client.list_objects(&request).await.is_ok())
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
