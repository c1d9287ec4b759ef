use async_trait::async_trait;

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Upload an object and return its public URL.
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: &[(&str, String)],
    ) -> anyhow::Result<String>;

    fn get_url(&self, key: &str) -> String;
}
