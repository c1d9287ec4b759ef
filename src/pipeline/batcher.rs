//! Size- and timeout-driven batching in front of the inpainting model.
//!
//! Two independent lanes (short / long layouts) accumulate preprocessed
//! jobs. A lane flushes when it has collected `collect_batch_size` jobs or
//! when `max_wait` has elapsed since its first pending job, whichever comes
//! first. A flush runs the model in `gpu_batch_size` micro-batches; each
//! finished micro-batch hands its members to concurrent postprocessing
//! tasks, so the GPU moves on to the next micro-batch while earlier
//! results are still being restored. Every job is answered exactly once
//! over its reply channel, in completion order.

use crate::domain::errors::StageError;
use crate::domain::jobs::InpaintJob;
use crate::infrastructure::ml::traits::{InpaintModel, UpscaleModel};
use crate::pipeline::postprocess;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub collect_batch_size: usize,
    pub gpu_batch_size: usize,
    pub max_wait: Duration,
}

/// Resolves with the restored full-resolution image, or the job's failure.
pub type InpaintReply = oneshot::Receiver<Result<RgbImage, StageError>>;

struct LaneJob {
    job: InpaintJob,
    reply: oneshot::Sender<Result<RgbImage, StageError>>,
}

pub struct InpaintBatcher {
    short_lane: mpsc::Sender<LaneJob>,
    long_lane: mpsc::Sender<LaneJob>,
}

impl InpaintBatcher {
    /// Start both lane workers and return the shared submission handle.
    pub fn spawn(
        model: Arc<dyn InpaintModel>,
        upscaler: Arc<dyn UpscaleModel>,
        config: BatcherConfig,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (short_tx, short_rx) = mpsc::channel(config.collect_batch_size * 4);
        let (long_tx, long_rx) = mpsc::channel(config.collect_batch_size * 4);

        tokio::spawn(lane_worker(
            "inpaint-short",
            short_rx,
            model.clone(),
            upscaler.clone(),
            config.clone(),
            shutdown.clone(),
        ));
        tokio::spawn(lane_worker(
            "inpaint-long",
            long_rx,
            model,
            upscaler,
            config,
            shutdown,
        ));

        Arc::new(Self {
            short_lane: short_tx,
            long_lane: long_tx,
        })
    }

    /// Queue a job on its layout lane. The returned receiver resolves once
    /// with the restored image or the job's failure; it errors only if the
    /// batcher shut down before answering.
    pub async fn submit(&self, job: InpaintJob) -> anyhow::Result<InpaintReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let lane = if job.is_long {
            &self.long_lane
        } else {
            &self.short_lane
        };
        lane.send(LaneJob {
            job,
            reply: reply_tx,
        })
        .await
        .map_err(|_| anyhow::anyhow!("inpaint batcher is shut down"))?;
        Ok(reply_rx)
    }
}

async fn lane_worker(
    lane_name: &'static str,
    mut receiver: mpsc::Receiver<LaneJob>,
    model: Arc<dyn InpaintModel>,
    upscaler: Arc<dyn UpscaleModel>,
    config: BatcherConfig,
    shutdown: CancellationToken,
) {
    tracing::info!("Batcher lane {} started", lane_name);
    loop {
        let first = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = receiver.recv() => match received {
                Some(job) => job,
                None => break,
            },
        };

        // The wait clock starts at the first pending job.
        let deadline = Instant::now() + config.max_wait;
        let mut batch = vec![first];
        while batch.len() < config.collect_batch_size {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Ok(Some(job)) => batch.push(job),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        tracing::info!("[{}] Flushing batch of {} jobs", lane_name, batch.len());
        run_batch(batch, &model, &upscaler, config.gpu_batch_size).await;
    }
    tracing::info!("Batcher lane {} stopped", lane_name);
}

/// Run one collected batch as GPU micro-batches, spawning postprocessing
/// per result so inference and restoration overlap.
async fn run_batch(
    batch: Vec<LaneJob>,
    model: &Arc<dyn InpaintModel>,
    upscaler: &Arc<dyn UpscaleModel>,
    gpu_batch_size: usize,
) {
    let mut remaining = batch;
    while !remaining.is_empty() {
        let chunk: Vec<LaneJob> = remaining
            .drain(..gpu_batch_size.min(remaining.len()))
            .collect();

        let images: Vec<RgbImage> = chunk
            .iter()
            .map(|member| member.job.preprocessed_image.clone())
            .collect();
        let masks = chunk
            .iter()
            .map(|member| member.job.preprocessed_mask.clone())
            .collect::<Vec<_>>();

        match model.inpaint_batch(&images, &masks).await {
            Ok(results) => {
                for (member, inpainted) in chunk.into_iter().zip(results) {
                    let upscaler = upscaler.clone();
                    tokio::spawn(async move {
                        let LaneJob { job, reply } = member;
                        let outcome = postprocess::restore(
                            inpainted,
                            job.size_before_padding,
                            job.scale_factor,
                            job.original_size,
                            upscaler,
                            job.request_id.clone(),
                        )
                        .await
                        .map_err(|e| StageError::Inpaint(format!("postprocessing: {}", e)));
                        let _ = reply.send(outcome);
                    });
                }
            }
            Err(e) => {
                // An inference failure takes down the whole micro-batch.
                tracing::error!("Inpainting micro-batch failed: {}", e);
                for member in chunk {
                    let _ = member
                        .reply
                        .send(Err(StageError::Inpaint(e.to_string())));
                }
            }
        }
    }
}
