//! # Model
//!
//! The seam to the reasoning model. The orchestrator only knows this trait; the
//! network backend lives in `streaming_executor`, and tests script their own.

use crate::session::Message;
use crate::tools::ToolSchema;
use anyhow::Result;
use async_trait::async_trait;

/// Everything the model sees for one invocation.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    /// The full session log, in order.
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait Model: Send + Sync {
    /// Performs one model round trip and returns the response as a model-role message.
    ///
    /// The future may be dropped at any await point when a run is cancelled.
    async fn complete(&self, request: ModelRequest) -> Result<Message>;
}
