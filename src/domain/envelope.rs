//! Queue message schemas and object-store naming.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One translation request as published on the ingress queue.
///
/// Immutable once published; `request_id` is assigned on dequeue when the
/// producer left it out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub request_id: Option<String>,
    pub image_id: String,
    pub image_url: String,
    #[serde(default)]
    pub is_long: bool,
}

impl Envelope {
    /// Decode an ingress payload, assigning a request id if absent.
    pub fn decode(payload: &[u8]) -> anyhow::Result<AcceptedEnvelope> {
        let envelope: Envelope = serde_json::from_slice(payload)?;
        let request_id = match envelope.request_id {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        Ok(AcceptedEnvelope {
            request_id,
            image_id: envelope.image_id,
            image_url: envelope.image_url,
            is_long: envelope.is_long,
        })
    }
}

/// An envelope after acceptance: the request id is always present.
#[derive(Debug, Clone)]
pub struct AcceptedEnvelope {
    pub request_id: String,
    pub image_id: String,
    pub image_url: String,
    pub is_long: bool,
}

/// Message pushed to the success queue: the new public URL for the image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessMessage {
    pub image_id: String,
    pub image_url: String,
}

/// Message pushed to the error queue. `error_message` names the failed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub image_id: String,
    pub error_message: String,
}

/// Build the object-store key for an uploaded result.
///
/// Layout: `translated_image/<YYYY-MM-DD>/<product_id>/<suffix>-<request_id[..5]>.jpg`
/// where `product_id` is the part of `image_id` before the first `-` and
/// `suffix` the part after it (the whole `image_id` when there is no `-`).
pub fn object_key(image_id: &str, request_id: &str, date: chrono::NaiveDate) -> String {
    let (product_id, suffix) = match image_id.split_once('-') {
        Some((product, rest)) => (product, rest),
        None => (image_id, image_id),
    };
    let short_request: String = request_id.chars().take(5).collect();
    format!(
        "translated_image/{}/{}/{}-{}.jpg",
        date.format("%Y-%m-%d"),
        product_id,
        suffix,
        short_request
    )
}
