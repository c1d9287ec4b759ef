use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Rgb, RgbImage};
use image_translate_worker::domain::envelope::{ErrorMessage, SuccessMessage};
use image_translate_worker::domain::text_box::TextBox;
use image_translate_worker::infrastructure::http::image_downloader::ImageDownloader;
use image_translate_worker::infrastructure::ml::traits::{InpaintModel, OcrService, UpscaleModel};
use image_translate_worker::infrastructure::queue::traits::TaskQueue;
use image_translate_worker::infrastructure::storage::traits::StorageService;
use image_translate_worker::infrastructure::translation::traits::Translator;
use image_translate_worker::pipeline::batcher::{BatcherConfig, InpaintBatcher};
use image_translate_worker::pipeline::dispatcher::{Dispatcher, DispatcherConfig};
use image_translate_worker::pipeline::join::JoinCoordinator;
use image_translate_worker::pipeline::render::Renderer;
use image_translate_worker::pipeline::uploader::Uploader;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

pub const FONT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/assets/DejaVuSans.ttf");

/// In-memory stand-in for the broker.
#[derive(Default)]
pub struct InMemoryQueue {
    tasks: Mutex<VecDeque<Vec<u8>>>,
    pub successes: Mutex<Vec<SuccessMessage>>,
    pub errors: Mutex<Vec<ErrorMessage>>,
}

impl InMemoryQueue {
    pub fn push_task(&self, payload: Vec<u8>) {
        self.tasks.lock().unwrap().push_back(payload);
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().unwrap().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn pop_task(&self) -> anyhow::Result<Option<Vec<u8>>> {
        if let Some(payload) = self.tasks.lock().unwrap().pop_front() {
            return Ok(Some(payload));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(None)
    }

    async fn push_success(&self, message: &SuccessMessage) -> anyhow::Result<()> {
        self.successes.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn push_error(&self, message: &ErrorMessage) -> anyhow::Result<()> {
        self.errors.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// OCR fake returning a fixed result for every image.
pub struct FakeOcr {
    boxes: Vec<TextBox>,
}

impl FakeOcr {
    pub fn returning(boxes: Vec<TextBox>) -> Arc<Self> {
        Arc::new(Self { boxes })
    }
}

#[async_trait]
impl OcrService for FakeOcr {
    async fn warm_up(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn detect(&self, _image_bytes: &[u8]) -> anyhow::Result<Vec<TextBox>> {
        Ok(self.boxes.clone())
    }
}

/// Inpainting fake: fills masked pixels with mid-gray and counts calls.
#[derive(Default)]
pub struct FakeInpainter {
    pub calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

impl FakeInpainter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InpaintModel for FakeInpainter {
    async fn inpaint_batch(
        &self,
        images: &[RgbImage],
        masks: &[GrayImage],
    ) -> anyhow::Result<Vec<RgbImage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(images.len());
        Ok(images
            .iter()
            .zip(masks)
            .map(|(image, mask)| {
                let mut result = image.clone();
                for (x, y, pixel) in result.enumerate_pixels_mut() {
                    if mask.get_pixel(x, y)[0] > 127 {
                        *pixel = Rgb([128, 128, 128]);
                    }
                }
                result
            })
            .collect())
    }
}

/// Upscaler fake: plain nearest 2x.
pub struct FakeUpscaler;

#[async_trait]
impl UpscaleModel for FakeUpscaler {
    fn factor(&self) -> u32 {
        2
    }

    async fn upscale(&self, image: &RgbImage) -> anyhow::Result<RgbImage> {
        let (width, height) = image.dimensions();
        Ok(image::imageops::resize(
            image,
            width * 2,
            height * 2,
            image::imageops::FilterType::Nearest,
        ))
    }
}

/// Translator fake returning a canned response.
pub struct FakeTranslator {
    response: Vec<String>,
    pub requests: Mutex<Vec<Vec<String>>>,
}

impl FakeTranslator {
    pub fn returning(response: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            response: response.into_iter().map(str::to_string).collect(),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate_many(&self, texts: &[String], _request_id: &str) -> Vec<String> {
        self.requests.lock().unwrap().push(texts.to_vec());
        self.response.clone()
    }
}

/// Storage fake capturing uploads.
#[derive(Default)]
pub struct FakeStorage {
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_upload(&self) -> Option<(String, Vec<u8>)> {
        self.uploads.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StorageService for FakeStorage {
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
        _metadata: &[(&str, String)],
    ) -> anyhow::Result<String> {
        self.uploads.lock().unwrap().push((key.to_string(), data));
        Ok(self.get_url(key))
    }

    fn get_url(&self, key: &str) -> String {
        format!("https://cdn.test/{}", key)
    }
}

/// Everything a scenario needs to drive the worker end to end.
pub struct TestPipeline {
    pub queue: Arc<InMemoryQueue>,
    pub storage: Arc<FakeStorage>,
    pub inpainter: Arc<FakeInpainter>,
    pub translator: Arc<FakeTranslator>,
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: CancellationToken,
}

impl TestPipeline {
    pub fn start(ocr_boxes: Vec<TextBox>, translations: Vec<&str>) -> Self {
        let queue = Arc::new(InMemoryQueue::default());
        let storage = FakeStorage::new();
        let inpainter = FakeInpainter::new();
        let translator = FakeTranslator::returning(translations);
        let shutdown = CancellationToken::new();

        let batcher = InpaintBatcher::spawn(
            inpainter.clone(),
            Arc::new(FakeUpscaler),
            BatcherConfig {
                collect_batch_size: 4,
                gpu_batch_size: 2,
                max_wait: Duration::from_millis(200),
            },
            shutdown.clone(),
        );

        let dispatcher = Dispatcher::new(
            queue.clone(),
            Arc::new(ImageDownloader::new(2, Duration::from_millis(10)).unwrap()),
            FakeOcr::returning(ocr_boxes),
            translator.clone(),
            batcher,
            Arc::new(JoinCoordinator::new()),
            Arc::new(Renderer::new(FONT_PATH, 5, (1024, 1024)).unwrap()),
            Arc::new(Uploader::new(storage.clone(), 90)),
            DispatcherConfig {
                max_concurrent_tasks: 8,
                max_pending_tasks: 16,
                mask_padding: 5,
                short_canvas: (1024, 1024),
            },
            shutdown.clone(),
        );
        tokio::spawn(dispatcher.clone().run());

        Self {
            queue,
            storage,
            inpainter,
            translator,
            dispatcher,
            shutdown,
        }
    }

    pub fn enqueue(&self, request_id: &str, image_id: &str, image_url: &str, is_long: bool) {
        let payload = serde_json::json!({
            "request_id": request_id,
            "image_id": image_id,
            "image_url": image_url,
            "is_long": is_long,
        });
        self.queue.push_task(payload.to_string().into_bytes());
    }

    /// Wait until the queues hold `count` terminal emissions in total.
    pub async fn wait_for_emissions(&self, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.queue.success_count() + self.queue.error_count() >= count {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} emissions (success={}, error={})",
                count,
                self.queue.success_count(),
                self.queue.error_count()
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

/// Encode a JPEG test image of the given size with a dark block covering
/// `text_region` on a light background.
pub fn jpeg_with_text_block(width: u32, height: u32, text_region: (u32, u32, u32, u32)) -> Vec<u8> {
    let (x0, y0, x1, y1) = text_region;
    let image = RgbImage::from_fn(width, height, |x, y| {
        if x >= x0 && x < x1 && y >= y0 && y < y1 {
            Rgb([20, 20, 20])
        } else {
            Rgb([230, 228, 225])
        }
    });
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, 90);
    image.write_with_encoder(encoder).unwrap();
    buffer.into_inner()
}

/// Serve one payload over a throwaway local HTTP server; returns its URL.
pub async fn serve_image(payload: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Serve a handful of requests; download retries may reconnect.
        for _ in 0..16 {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let body = payload.clone();
            tokio::spawn(async move {
                let mut buffer = [0u8; 2048];
                let _ = socket.read(&mut buffer).await;
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}/image.jpg", address)
}

pub fn chinese_box(polygon: Vec<[f32; 2]>, text: &str) -> TextBox {
    TextBox::new(polygon, text, 0.95)
}

pub fn decoded_upload_dimensions(data: &[u8]) -> (u32, u32) {
    let decoded = image::load_from_memory(data).unwrap();
    (decoded.width(), decoded.height())
}
