//! Per-request lifecycle orchestration.
//!
//! The pop loop enforces two gates: a task semaphore bounding in-flight
//! requests (acquired before the envelope is even decoded) and a pending
//! counter for admission control (above the ceiling the loop backs off
//! instead of popping). Every accepted envelope produces exactly one
//! terminal emission (success or error), enforced by a per-request
//! finish-once guard that also releases the permit and the counter.

use crate::domain::envelope::{AcceptedEnvelope, Envelope, ErrorMessage, SuccessMessage};
use crate::domain::errors::StageError;
use crate::domain::jobs::{InpaintJob, RenderJob};
use crate::domain::text_box::{TextBox, TranslatedItem, filter_chinese};
use crate::infrastructure::http::image_downloader::ImageDownloader;
use crate::infrastructure::ml::traits::OcrService;
use crate::infrastructure::queue::traits::TaskQueue;
use crate::infrastructure::translation::traits::Translator;
use crate::pipeline::batcher::InpaintBatcher;
use crate::pipeline::join::{InpaintDeposit, JoinCoordinator};
use crate::pipeline::render::Renderer;
use crate::pipeline::uploader::Uploader;
use crate::pipeline::{mask, preprocess, resize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Join entries older than this are evicted to the error path.
const JOIN_STALE_AFTER: Duration = Duration::from_secs(300);
/// Interval between stale-entry sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
/// Back-off when the pending counter exceeds its ceiling.
const ADMISSION_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_concurrent_tasks: usize,
    pub max_pending_tasks: usize,
    pub mask_padding: i32,
    pub short_canvas: (u32, u32),
}

/// Book-keeping for one accepted envelope. The permit and the pending
/// counter are released on terminal emission, exactly once.
struct RequestContext {
    request_id: String,
    image_id: String,
    is_long: bool,
    finished: AtomicBool,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl RequestContext {
    /// Claims the right to emit the terminal result. False means another
    /// path already finished this request.
    fn begin_finish(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }
}

pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    downloader: Arc<ImageDownloader>,
    ocr: Arc<dyn OcrService>,
    translator: Arc<dyn Translator>,
    batcher: Arc<InpaintBatcher>,
    join: Arc<JoinCoordinator>,
    renderer: Arc<Renderer>,
    uploader: Arc<Uploader>,
    semaphore: Arc<Semaphore>,
    pending: AtomicUsize,
    contexts: Mutex<HashMap<String, Arc<RequestContext>>>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        downloader: Arc<ImageDownloader>,
        ocr: Arc<dyn OcrService>,
        translator: Arc<dyn Translator>,
        batcher: Arc<InpaintBatcher>,
        join: Arc<JoinCoordinator>,
        renderer: Arc<Renderer>,
        uploader: Arc<Uploader>,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Arc::new(Self {
            queue,
            downloader,
            ocr,
            translator,
            batcher,
            join,
            renderer,
            uploader,
            semaphore,
            pending: AtomicUsize::new(0),
            contexts: Mutex::new(HashMap::new()),
            config,
            shutdown,
        })
    }

    /// Requests dequeued but not yet terminally emitted.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Main pop loop. Returns when shutdown is requested; in-flight
    /// requests keep running (see [`Dispatcher::drain`]).
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Dispatcher started");
        self.clone().spawn_sweeper();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            // Admission control: too much accepted-but-unfinished work.
            if self.pending_count() > self.config.max_pending_tasks {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ADMISSION_BACKOFF) => continue,
                }
            }

            let popped = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                popped = self.queue.pop_task() => popped,
            };

            match popped {
                Ok(Some(payload)) => {
                    // Reserve a permit before decoding. The popped envelope
                    // has no ack to fall back on, so the wait is not
                    // interruptible by shutdown.
                    let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    self.accept(payload, permit).await;
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("Queue pop failed: {}. Backing off.", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        tracing::info!("Dispatcher stopped accepting envelopes");
    }

    async fn accept(self: &Arc<Self>, payload: Vec<u8>, permit: OwnedSemaphorePermit) {
        self.pending.fetch_add(1, Ordering::SeqCst);

        let envelope = match Envelope::decode(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!("Failed to decode envelope JSON: {}", e);
                let message = ErrorMessage {
                    image_id: "N/A".to_string(),
                    error_message: format!("Envelope decode error: {}", e),
                };
                if let Err(push_error) = self.queue.push_error(&message).await {
                    tracing::error!("Failed to push decode error: {}", push_error);
                }
                self.pending.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                return;
            }
        };

        let context = Arc::new(RequestContext {
            request_id: envelope.request_id.clone(),
            image_id: envelope.image_id.clone(),
            is_long: envelope.is_long,
            finished: AtomicBool::new(false),
            permit: Mutex::new(Some(permit)),
        });
        self.contexts
            .lock()
            .expect("context map poisoned")
            .insert(envelope.request_id.clone(), context.clone());

        let this = self.clone();
        tokio::spawn(async move {
            this.process_request(context, envelope).await;
        });
    }

    /// Steps 1-8 of the per-request flow.
    async fn process_request(self: Arc<Self>, context: Arc<RequestContext>, envelope: AcceptedEnvelope) {
        let request_id = context.request_id.as_str();
        tracing::debug!(request_id, "Processing {}", envelope.image_url);

        // 1. Download.
        let bytes = match self.downloader.fetch(&envelope.image_url, request_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.emit_error(&context, StageError::Download(e.to_string())).await;
                return;
            }
        };

        // 2. OCR.
        let boxes = match self.ocr.detect(&bytes).await {
            Ok(boxes) => boxes,
            Err(e) => {
                self.emit_error(&context, StageError::Ocr(e.to_string())).await;
                return;
            }
        };

        // 3. Chinese filter; empty means the resize-only short circuit.
        let filtered = filter_chinese(boxes);
        if filtered.is_empty() {
            tracing::info!(request_id, "No Chinese text; taking resize branch");
            self.resize_branch(&context, bytes.to_vec()).await;
            return;
        }

        // 4. Mask synthesis + preprocessing on the CPU pool.
        let mask_padding = self.config.mask_padding;
        let mask_bytes = bytes.to_vec();
        let mask_boxes = filtered.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            let (image, mask) = mask::synthesize(&mask_bytes, &mask_boxes, mask_padding)?;
            let preprocessed = preprocess::preprocess(&image, &mask)?;
            Ok::<_, anyhow::Error>((image, preprocessed))
        })
        .await;
        let (original_image, preprocessed) = match prepared {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                self.emit_error(&context, StageError::Preprocess(e.to_string())).await;
                return;
            }
            Err(e) => {
                self.emit_error(&context, StageError::Preprocess(e.to_string())).await;
                return;
            }
        };

        let original_size = original_image.dimensions();
        let job = InpaintJob {
            request_id: context.request_id.clone(),
            image_id: context.image_id.clone(),
            is_long: context.is_long,
            preprocessed_image: preprocessed.image,
            preprocessed_mask: preprocessed.mask,
            size_before_padding: preprocessed.size_before_padding,
            scale_factor: preprocessed.scale_factor,
            original_size,
        };
        let reply = match self.batcher.submit(job).await {
            Ok(reply) => reply,
            Err(e) => {
                self.emit_error(&context, StageError::Inpaint(e.to_string())).await;
                return;
            }
        };

        // 5-6. Translation branch runs concurrently and deposits its half.
        {
            let this = self.clone();
            let branch_context = context.clone();
            tokio::spawn(async move {
                this.translation_branch(branch_context, filtered).await;
            });
        }

        // 7. Inpainting result deposits the other half.
        match reply.await {
            Ok(Ok(inpainted_image)) => {
                let deposit = InpaintDeposit {
                    original_image,
                    inpainted_image,
                };
                if let Some(render_job) = self.join.deposit_inpainting(
                    &context.request_id,
                    &context.image_id,
                    context.is_long,
                    deposit,
                ) {
                    self.render_and_upload(&context, render_job).await;
                }
            }
            Ok(Err(stage_error)) => {
                self.join.abandon(&context.request_id);
                self.emit_error(&context, stage_error).await;
            }
            Err(_) => {
                self.join.abandon(&context.request_id);
                self.emit_error(
                    &context,
                    StageError::Inpaint("batcher dropped the job".to_string()),
                )
                .await;
            }
        }
    }

    /// Translate the filtered boxes and deposit the result. Translation
    /// failure is soft: the deposit degrades to empty strings so the boxes
    /// are inpainted without new text.
    async fn translation_branch(self: Arc<Self>, context: Arc<RequestContext>, filtered: Vec<TextBox>) {
        let request_id = context.request_id.as_str();
        let translatable: Vec<&TextBox> = filtered
            .iter()
            .filter(|text_box| !text_box.text.trim().is_empty())
            .collect();
        let texts: Vec<String> = translatable
            .iter()
            .map(|text_box| text_box.text.clone())
            .collect();

        let translations = if texts.is_empty() {
            Vec::new()
        } else {
            self.translator.translate_many(&texts, request_id).await
        };

        let items: Vec<TranslatedItem> = if translations.len() == texts.len() && !texts.is_empty() {
            translatable
                .iter()
                .zip(translations)
                .map(|(text_box, translation)| TranslatedItem::from_box(text_box, translation))
                .collect()
        } else {
            if !texts.is_empty() {
                tracing::warn!(
                    request_id,
                    "Translation unavailable ({} of {}); falling back to inpaint-only",
                    translations.len(),
                    texts.len()
                );
            }
            translatable
                .iter()
                .map(|text_box| TranslatedItem::inpaint_only(text_box))
                .collect()
        };

        if let Some(render_job) = self.join.deposit_translation(
            &context.request_id,
            &context.image_id,
            context.is_long,
            items,
        ) {
            self.render_and_upload(&context, render_job).await;
        }
    }

    /// 8. Render the joined request on the CPU pool, upload, emit.
    async fn render_and_upload(&self, context: &Arc<RequestContext>, render_job: RenderJob) {
        let renderer = self.renderer.clone();
        let rendered = tokio::task::spawn_blocking(move || renderer.render(render_job)).await;
        let image = match rendered {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                self.emit_error(context, StageError::Render(e.to_string())).await;
                return;
            }
            Err(e) => {
                self.emit_error(context, StageError::Render(e.to_string())).await;
                return;
            }
        };

        match self
            .uploader
            .upload_image(image, &context.image_id, &context.request_id, "translated")
            .await
        {
            Ok(url) => self.emit_success(context, url).await,
            Err(e) => self.emit_error(context, StageError::Upload(e.to_string())).await,
        }
    }

    /// No-text / no-Chinese-text branch: resize, upload, succeed.
    async fn resize_branch(&self, context: &Arc<RequestContext>, bytes: Vec<u8>) {
        let is_long = context.is_long;
        let short_canvas = self.config.short_canvas;
        let resized = tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)
                .map_err(|e| anyhow::anyhow!("failed to decode image: {}", e))?
                .to_rgb8();
            Ok::<_, anyhow::Error>(resize::resize_no_text(&image, is_long, short_canvas))
        })
        .await;

        let image = match resized {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                self.emit_error(context, StageError::Decode(e.to_string())).await;
                return;
            }
            Err(e) => {
                self.emit_error(context, StageError::Decode(e.to_string())).await;
                return;
            }
        };

        match self
            .uploader
            .upload_image(
                image,
                &context.image_id,
                &context.request_id,
                "resized_no_text",
            )
            .await
        {
            Ok(url) => self.emit_success(context, url).await,
            Err(e) => self.emit_error(context, StageError::Upload(e.to_string())).await,
        }
    }

    async fn emit_success(&self, context: &Arc<RequestContext>, url: String) {
        if !context.begin_finish() {
            return;
        }
        let message = SuccessMessage {
            image_id: context.image_id.clone(),
            image_url: url,
        };
        if let Err(e) = self.queue.push_success(&message).await {
            tracing::error!(
                request_id = %context.request_id,
                "Failed to push success result: {}",
                e
            );
        } else {
            tracing::info!(
                request_id = %context.request_id,
                "Success: {}",
                message.image_url
            );
        }
        self.release(context);
    }

    async fn emit_error(&self, context: &Arc<RequestContext>, error: StageError) {
        if !context.begin_finish() {
            return;
        }
        let message = ErrorMessage {
            image_id: context.image_id.clone(),
            error_message: error.to_string(),
        };
        tracing::error!(
            request_id = %context.request_id,
            "Request failed: {}",
            message.error_message
        );
        if let Err(e) = self.queue.push_error(&message).await {
            tracing::error!(
                request_id = %context.request_id,
                "Failed to push error result: {}",
                e
            );
        }
        self.release(context);
    }

    fn release(&self, context: &Arc<RequestContext>) {
        self.contexts
            .lock()
            .expect("context map poisoned")
            .remove(&context.request_id);
        // Dropping the permit reopens the concurrency gate immediately.
        context.permit.lock().expect("permit poisoned").take();
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Periodically evict join entries whose other branch never reported.
    fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                }
                for stale in self.join.sweep_stale(JOIN_STALE_AFTER) {
                    tracing::warn!(
                        request_id = %stale.request_id,
                        "Join entry expired; routing to error queue"
                    );
                    let context = self
                        .contexts
                        .lock()
                        .expect("context map poisoned")
                        .get(&stale.request_id)
                        .cloned();
                    if let Some(context) = context {
                        self.emit_error(&context, StageError::JoinTimeout).await;
                    }
                }
            }
        });
    }

    /// Wait up to `max_wait` for in-flight requests to finish, polling
    /// once per second and logging every ten.
    pub async fn drain(&self, max_wait: Duration) {
        let started = tokio::time::Instant::now();
        let mut polls = 0u64;
        while self.pending_count() > 0 {
            if started.elapsed() >= max_wait {
                tracing::warn!(
                    "Shutdown drain exceeded {:?} with {} requests in flight",
                    max_wait,
                    self.pending_count()
                );
                return;
            }
            if polls % 10 == 0 {
                tracing::info!(
                    "Waiting for {} in-flight requests to finish",
                    self.pending_count()
                );
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            polls += 1;
        }
        tracing::info!("All in-flight requests finished");
    }
}
