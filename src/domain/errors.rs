//! Per-request failure taxonomy.
//!
//! Every variant maps to exactly one error-queue emission whose message
//! names the failed stage. Translation failures are absent on purpose:
//! they are soft and degrade to inpaint-only rendering instead of
//! reaching the error queue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Image download failed: {0}")]
    Download(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Mask generation and preprocessing failed: {0}")]
    Preprocess(String),

    #[error("Inpainting failed: {0}")]
    Inpaint(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Request timed out waiting for pipeline results")]
    JoinTimeout,
}
