use super::traits::StorageService;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client, config::BehaviorVersion, config::Credentials, config::Region, primitives::ByteStream,
};

pub struct R2StorageService {
    client: Client,
    bucket: String,
    public_url: String,
}

impl R2StorageService {
    pub fn new(
        key: String,
        secret: String,
        endpoint: String,
        bucket: String,
        public_url: String,
    ) -> Self {
        let creds = Credentials::new(key, secret, None, None, "r2");
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(creds)
            .endpoint_url(endpoint)
            .region(Region::new("auto"))
            .build();
        Self {
            client: Client::from_conf(config),
            bucket,
            public_url,
        }
    }
}

#[async_trait]
impl StorageService for R2StorageService {
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &[(&str, String)],
    ) -> anyhow::Result<String> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .cache_control("public, max-age=31536000, immutable");
        for (name, value) in metadata {
            request = request.metadata(*name, value);
        }
        request.send().await?;
        Ok(self.get_url(key))
    }

    fn get_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url.trim_end_matches('/'), key)
    }
}
