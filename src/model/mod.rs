use anyhow::Result;
use serde::{Deserialize, Serialize};


#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sampling {
    /// Always take the most likely token.
    Greedy,
    /// temp -> top_p -> min_p -> penalties, then a seeded draw.
    Stochastic,
}


#[derive(Clone, Debug)]
pub struct InferParams {
    /// For `complete` this caps prompt + generated tokens; for `chat` it caps new tokens only.
    pub max_tokens: i32,
    pub sampling: Sampling,
    pub temp: f32,
    pub top_p: f32,
    pub min_p: f32,
    pub repeat_penalty: f32,
    pub seed: u32,
}

impl InferParams {
    pub fn greedy(max_length: i32) -> Self {
        Self {
            max_tokens: max_length,
            sampling: Sampling::Greedy,
            temp: 0.0,
            top_p: 1.0,
            min_p: 0.0,
            repeat_penalty: 1.0,
            seed: 0,
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}


#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}


/// A loaded model. Implementations are built once at startup and only read afterwards.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync + 'static {
    /// Raw completion: encode `input` followed by end-of-sequence, generate, and
    /// return only the newly generated text with special tokens stripped.
    async fn complete(&self, input: &str, params: &InferParams) -> Result<String>;

    /// Render `messages` through the model's chat template and generate the assistant turn.
    async fn chat(&self, messages: &[ChatMessage], params: &InferParams) -> Result<String>;
}


pub mod llama;
pub mod source;

pub use source::ModelSource;
