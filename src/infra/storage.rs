use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use url::Url;

use crate::config::AppConfig;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `path` and return a stable retrieval URL.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
    public_base: Url,
}

impl ObjectStorage {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.s3_endpoint.clone())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let client = Client::from_conf(s3_builder.build());

        let public_endpoint = config
            .s3_public_endpoint
            .as_deref()
            .unwrap_or(&config.s3_endpoint);

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
            public_base: public_base(public_endpoint, &config.s3_bucket)?,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for ObjectStorage {
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await?;

        Ok(self.public_base.join(path)?.to_string())
    }
}

/// Path-style base URL for public object reads, e.g. `https://cdn.example/bucket/`.
pub fn public_base(endpoint: &str, bucket: &str) -> Result<Url> {
    let mut url = if endpoint.contains("://") {
        Url::parse(endpoint)?
    } else {
        Url::parse(&format!("http://{}", endpoint))?
    };
    url.path_segments_mut()
        .map_err(|_| anyhow!("invalid public endpoint: {}", endpoint))?
        .pop_if_empty()
        .push(bucket)
        .push("");
    Ok(url)
}
