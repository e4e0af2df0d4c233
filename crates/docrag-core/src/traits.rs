pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Boundary to the language model that turns a prompt into an answer.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}
