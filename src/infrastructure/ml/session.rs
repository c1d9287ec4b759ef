use ort::execution_providers::CUDA as CUDAExecutionProvider;
use ort::session::Session;
use std::path::Path;

/// Build an ONNX session, optionally on the CUDA execution provider.
///
/// ort falls back to CPU when the CUDA provider cannot be registered, so a
/// CPU-only host with `USE_CUDA=true` degrades instead of failing.
pub fn build_session(model_path: &str, use_cuda: bool) -> anyhow::Result<Session> {
    if !Path::new(model_path).exists() {
        anyhow::bail!("model file not found: {}", model_path);
    }

    let mut builder = Session::builder()?;
    if use_cuda {
        builder =
            builder.with_execution_providers([CUDAExecutionProvider::default().build()])?;
    }
    Ok(builder.commit_from_file(model_path)?)
}
