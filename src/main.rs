use image_translate_worker::{
    config::Config,
    infrastructure::{
        http::image_downloader::ImageDownloader,
        ml::{
            onnx_inpainter::OnnxInpainter, onnx_ocr::OnnxOcrService, onnx_upscaler::OnnxUpscaler,
            traits::OcrService,
        },
        queue::redis_queue::RedisQueue,
        storage::r2_storage_service::R2StorageService,
        translation::{gemini_translator::GeminiTranslator, rate_limiter::RateLimiter},
    },
    pipeline::{
        batcher::{BatcherConfig, InpaintBatcher},
        dispatcher::{Dispatcher, DispatcherConfig},
        join::JoinCoordinator,
        render::Renderer,
        uploader::Uploader,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    // Initialize logging with safe environment filter
    // Uses RUST_LOG if set, otherwise falls back to LOG_LEVEL
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // The blocking pool is the CPU worker pool: mask synthesis,
    // preprocessing, rendering and codecs all run there.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.cpu_worker_count)
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = Arc::new(RedisQueue::new(redis));

    let downloader = Arc::new(ImageDownloader::new(
        config.image_download_max_retries,
        Duration::from_secs(config.image_download_retry_delay),
    )?);

    let ocr = Arc::new(OnnxOcrService::new(
        &config.ocr_det_model_path,
        &config.ocr_rec_model_path,
        &config.ocr_dict_path,
        config.use_cuda,
    )?);
    ocr.warm_up().await?;

    let inpainter = Arc::new(OnnxInpainter::new(
        &config.inpaint_model_path,
        config.use_cuda,
    )?);
    let upscaler = Arc::new(OnnxUpscaler::new(
        &config.upscale_model_path,
        config.use_cuda,
    )?);

    let rate_limiter = Arc::new(RateLimiter::new(config.translation_rps));
    let translator = Arc::new(GeminiTranslator::new(
        &config.gemini_api_key,
        &config.gemini_model_name,
        rate_limiter,
    )?);

    let storage = Arc::new(R2StorageService::new(
        config.cloudflare_access_key_id.clone(),
        config.cloudflare_secret_key.clone(),
        config.r2_endpoint.clone(),
        config.r2_bucket_name.clone(),
        config.r2_domain.clone(),
    ));
    let uploader = Arc::new(Uploader::new(storage, config.jpeg_quality));

    let short_canvas = (config.resize_target_width, config.resize_target_height);
    let renderer = Arc::new(Renderer::new(
        &config.font_path,
        config.mask_padding_pixels,
        short_canvas,
    )?);

    let shutdown = CancellationToken::new();
    let batcher = InpaintBatcher::spawn(
        inpainter,
        upscaler,
        BatcherConfig {
            collect_batch_size: config.worker_collect_batch_size,
            gpu_batch_size: config.inpainter_gpu_batch_size,
            max_wait: Duration::from_secs(config.worker_batch_max_wait_time_seconds),
        },
        shutdown.clone(),
    );

    let dispatcher = Dispatcher::new(
        queue,
        downloader,
        ocr,
        translator,
        batcher,
        Arc::new(JoinCoordinator::new()),
        renderer,
        uploader,
        DispatcherConfig {
            max_concurrent_tasks: config.max_concurrent_tasks,
            max_pending_tasks: config.max_pending_tasks,
            mask_padding: config.mask_padding_pixels,
            short_canvas,
        },
        shutdown.clone(),
    );

    let dispatcher_task = tokio::spawn(dispatcher.clone().run());
    tracing::info!("image-translate-worker online");

    shutdown_signal().await;
    tracing::info!("Shutdown requested; draining in-flight requests");
    shutdown.cancel();
    dispatcher
        .drain(Duration::from_secs(config.shutdown_max_wait_seconds))
        .await;
    dispatcher_task.abort();
    tracing::info!("image-translate-worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, initiating graceful shutdown");
        }
    }
}
