use async_trait::async_trait;

/// Batch text translation.
///
/// Contract: the output has either the same length as the input (success)
/// or length zero (soft failure after internal retry). Callers treat an
/// empty result as "inpaint-only mode" and never retry further.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate_many(&self, texts: &[String], request_id: &str) -> Vec<String>;
}
