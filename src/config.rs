//! Worker configuration loading from environment variables.
//!
//! All configuration is loaded from the environment at startup via standard `std::env::var`.
//! This keeps the worker 12-factor: the same binary runs locally, in Docker, or on a GPU
//! node with nothing but environment changes.
//!
//! # Environment Variables
//!
//! ## Required Variables
//! - `REDIS_URL`: Redis connection URL (task, success and error queues)
//! - `GEMINI_API_KEY`: API key for the translation endpoint
//! - `R2_ENDPOINT`: Cloudflare R2 API endpoint
//! - `R2_BUCKET_NAME`: S3-compatible bucket name
//! - `R2_DOMAIN`: Public URL base for uploaded objects
//! - `CLOUDFLARE_ACCESS_KEY_ID`: R2 access key
//! - `CLOUDFLARE_SECRET_KEY`: R2 secret key
//! - `FONT_PATH`: TTF font used when re-rendering translated text
//!
//! ## Optional Variables
//! - `GEMINI_MODEL_NAME`: translation model name (default: "gemini-2.0-flash")
//! - `TRANSLATION_RPS`: max translation requests per second (default: 1.0)
//! - `CPU_WORKER_COUNT`: blocking-pool size for image work (default: 16)
//! - `MAX_CONCURRENT_TASKS`: in-flight request cap (default: 24)
//! - `MAX_PENDING_TASKS`: admission-control ceiling (default: 48)
//! - `WORKER_COLLECT_BATCH_SIZE`: inpaint collect batch size (default: 16)
//! - `INPAINTER_GPU_BATCH_SIZE`: GPU micro-batch size (default: 4)
//! - `WORKER_BATCH_MAX_WAIT_TIME_SECONDS`: batch flush timeout (default: 5)
//! - `MASK_PADDING_PIXELS`: per-polygon mask growth (default: 5)
//! - `RESIZE_TARGET_WIDTH` / `RESIZE_TARGET_HEIGHT`: short-image canvas (default: 1024x1024)
//! - `JPEG_QUALITY`: quality for uploaded JPEGs (default: 90)
//! - `USE_CUDA`: run ONNX sessions on the CUDA provider (default: true)
//! - `OCR_DET_MODEL_PATH` / `OCR_REC_MODEL_PATH` / `OCR_DICT_PATH`: OCR model files
//! - `INPAINT_MODEL_PATH`: 512x512 inpainting ONNX model
//! - `UPSCALE_MODEL_PATH`: 2x upscaler ONNX model
//! - `IMAGE_DOWNLOAD_MAX_RETRIES`: download attempts (default: 3)
//! - `IMAGE_DOWNLOAD_RETRY_DELAY`: seconds between attempts (default: 2)
//! - `SHUTDOWN_MAX_WAIT_SECONDS`: graceful-shutdown drain budget (default: 60)
//! - `LOG_LEVEL`: default tracing filter when `RUST_LOG` is unset (default: "info")

use serde::Deserialize;

/// Complete worker configuration loaded from environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Redis connection URL for the task/success/error queues
    pub redis_url: String,

    /// API key for the translation endpoint
    pub gemini_api_key: String,

    /// Translation model name
    pub gemini_model_name: String,

    /// Maximum translation requests per second, process-wide
    pub translation_rps: f64,

    /// Blocking-pool size for mask synthesis, preprocessing, rendering and codecs
    pub cpu_worker_count: usize,

    /// Maximum number of requests being processed at once
    pub max_concurrent_tasks: usize,

    /// Dequeued-but-unfinished ceiling; above it the pop loop backs off
    pub max_pending_tasks: usize,

    /// Jobs collected per inpaint batch before a flush
    pub worker_collect_batch_size: usize,

    /// Images submitted to the inpainting model in one call
    pub inpainter_gpu_batch_size: usize,

    /// Seconds to wait for a batch to fill before flushing anyway
    pub worker_batch_max_wait_time_seconds: u64,

    /// Pixels each mask polygon is grown by before rasterization
    pub mask_padding_pixels: i32,

    /// Short-image output canvas width
    pub resize_target_width: u32,

    /// Short-image output canvas height
    pub resize_target_height: u32,

    /// JPEG quality for uploaded images (1-100)
    pub jpeg_quality: u8,

    /// Run ONNX sessions on the CUDA execution provider
    pub use_cuda: bool,

    /// TTF font used for rendered text
    pub font_path: String,

    /// OCR detection model path
    pub ocr_det_model_path: String,

    /// OCR recognition model path
    pub ocr_rec_model_path: String,

    /// OCR recognition charset file path
    pub ocr_dict_path: String,

    /// Inpainting model path (512x512 input)
    pub inpaint_model_path: String,

    /// 2x upscaler model path
    pub upscale_model_path: String,

    /// Cloudflare R2 API endpoint
    pub r2_endpoint: String,

    /// R2 bucket name
    pub r2_bucket_name: String,

    /// Public URL base for uploaded objects
    pub r2_domain: String,

    /// R2 access key ID
    pub cloudflare_access_key_id: String,

    /// R2 secret access key
    pub cloudflare_secret_key: String,

    /// Image download attempts before giving up
    pub image_download_max_retries: u32,

    /// Seconds between download attempts
    pub image_download_retry_delay: u64,

    /// Seconds to wait for in-flight requests to drain on shutdown
    pub shutdown_max_wait_seconds: u64,

    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required environment variable is missing or
    /// cannot be parsed to the expected type. A failure here aborts startup.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            redis_url: env_required("REDIS_URL")?,
            gemini_api_key: env_required("GEMINI_API_KEY")?,
            gemini_model_name: env_or("GEMINI_MODEL_NAME", "gemini-2.0-flash".to_string())?,
            translation_rps: env_or("TRANSLATION_RPS", 1.0)?,
            cpu_worker_count: env_or("CPU_WORKER_COUNT", 16)?,
            max_concurrent_tasks: env_or("MAX_CONCURRENT_TASKS", 24)?,
            max_pending_tasks: env_or("MAX_PENDING_TASKS", 48)?,
            worker_collect_batch_size: env_or("WORKER_COLLECT_BATCH_SIZE", 16)?,
            inpainter_gpu_batch_size: env_or("INPAINTER_GPU_BATCH_SIZE", 4)?,
            worker_batch_max_wait_time_seconds: env_or("WORKER_BATCH_MAX_WAIT_TIME_SECONDS", 5)?,
            mask_padding_pixels: env_or("MASK_PADDING_PIXELS", 5)?,
            resize_target_width: env_or("RESIZE_TARGET_WIDTH", 1024)?,
            resize_target_height: env_or("RESIZE_TARGET_HEIGHT", 1024)?,
            jpeg_quality: env_or("JPEG_QUALITY", 90)?,
            use_cuda: env_or("USE_CUDA", true)?,
            font_path: env_required("FONT_PATH")?,
            ocr_det_model_path: env_or("OCR_DET_MODEL_PATH", "./models/ocr_det.onnx".to_string())?,
            ocr_rec_model_path: env_or("OCR_REC_MODEL_PATH", "./models/ocr_rec.onnx".to_string())?,
            ocr_dict_path: env_or("OCR_DICT_PATH", "./models/ocr_keys.txt".to_string())?,
            inpaint_model_path: env_or("INPAINT_MODEL_PATH", "./models/lama_512.onnx".to_string())?,
            upscale_model_path: env_or(
                "UPSCALE_MODEL_PATH",
                "./models/upscale_2x.onnx".to_string(),
            )?,
            r2_endpoint: env_required("R2_ENDPOINT")?,
            r2_bucket_name: env_required("R2_BUCKET_NAME")?,
            r2_domain: env_required("R2_DOMAIN")?,
            cloudflare_access_key_id: env_required("CLOUDFLARE_ACCESS_KEY_ID")?,
            cloudflare_secret_key: env_required("CLOUDFLARE_SECRET_KEY")?,
            image_download_max_retries: env_or("IMAGE_DOWNLOAD_MAX_RETRIES", 3)?,
            image_download_retry_delay: env_or("IMAGE_DOWNLOAD_RETRY_DELAY", 2)?,
            shutdown_max_wait_seconds: env_or("SHUTDOWN_MAX_WAIT_SECONDS", 60)?,
            log_level: env_or("LOG_LEVEL", "info".to_string())?,
        })
    }
}

/// Load a required environment variable.
///
/// # Errors
///
/// Returns an error if the variable is not set.
fn env_required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("Missing required environment variable: {}", key))
}

/// Load an environment variable with a default value.
///
/// Returns the parsed environment variable if set, otherwise returns the default.
///
/// # Errors
///
/// Returns an error if the variable is set but cannot be parsed.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}
