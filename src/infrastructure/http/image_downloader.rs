//! Source-image fetching.
//!
//! The upstream product-image hosts reject requests without a browser
//! user-agent and a marketplace referer, so both are always sent.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";
const REFERER: &str = "https://detail.tmall.com/";

pub struct ImageDownloader {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl ImageDownloader {
    pub fn new(max_retries: u32, retry_delay: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            max_retries,
            retry_delay,
        })
    }

    /// Fetch image bytes from `url` with bounded retries.
    ///
    /// Protocol-relative URLs are fetched over https. Payloads that are
    /// neither JPEG nor PNG are re-encoded to JPEG quality 95 so every
    /// downstream decoder succeeds.
    pub async fn fetch(&self, url: &str, request_id: &str) -> anyhow::Result<Bytes> {
        let url = normalize_url(url);

        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            match self.fetch_once(&url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::warn!(
                            request_id,
                            "Image download retry ({}/{}): {}",
                            attempt,
                            self.max_retries,
                            e
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no download attempts were made")))
    }

    async fn fetch_once(&self, url: &str) -> anyhow::Result<Bytes> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Referer", REFERER)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("request to {} failed: {}", url, e))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("image fetch returned HTTP {}: {}", status, url);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read image body from {}: {}", url, e))?;

        if bytes.is_empty() {
            anyhow::bail!("image fetch returned empty body from {}", url);
        }

        if content_type.contains("image/jpeg") || content_type.contains("image/png") {
            return Ok(bytes);
        }

        tracing::warn!(
            "Unexpected Content-Type '{}' for {}. Re-encoding to JPEG.",
            content_type,
            url
        );
        reencode_jpeg(&bytes)
    }
}

/// `//host/path` URLs are fetched with an https scheme.
pub fn normalize_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        url.to_string()
    }
}

fn reencode_jpeg(bytes: &[u8]) -> anyhow::Result<Bytes> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| anyhow::anyhow!("failed to decode odd-content-type payload: {}", e))?;
    let rgb = decoded.to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, 95);
    rgb.write_with_encoder(encoder)
        .map_err(|e| anyhow::anyhow!("failed to re-encode payload to JPEG: {}", e))?;
    Ok(Bytes::from(buffer.into_inner()))
}
