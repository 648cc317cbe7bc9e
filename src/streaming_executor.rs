use crate::model::{Model, ModelRequest};
use crate::session::{self, Role};
use crate::tools::ToolSchema;
use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::StreamExt;
use openrouter_api::models::tool::{FunctionCall, FunctionDescription, Tool as ApiTool, ToolCall};
use openrouter_api::types::chat::{ChatCompletionRequest, Message};
use openrouter_api::{OpenRouterClient, Ready};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// OpenAI-compatible chat backend, streamed through the OpenRouter client.
///
/// The pinned client's request type has no sampling fields, so `temperature` and
/// `max_tokens` are left to the provider's defaults here.
pub struct OpenRouterModel {
    client: Arc<OpenRouterClient<Ready>>,
    print_stream: bool,
}

impl OpenRouterModel {
    pub fn new(client: OpenRouterClient<Ready>) -> Self {
        Self {
            client: Arc::new(client),
            print_stream: false,
        }
    }

    /// Echo streamed text to stdout as it arrives.
    pub fn with_print_stream(mut self, print_stream: bool) -> Self {
        self.print_stream = print_stream;
        self
    }
}

#[async_trait]
impl Model for OpenRouterModel {
    #[instrument(skip_all, fields(model = %request.model, messages = request.messages.len()))]
    async fn complete(&self, request: ModelRequest) -> Result<session::Message> {
        let request = to_api_request(request);
        stream_and_collect_response(&self.client, request, self.print_stream).await
    }
}

fn to_api_request(request: ModelRequest) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system_prompt) = request.system_prompt {
        messages.push(Message {
            role: "system".to_string(),
            content: system_prompt,
            name: None,
            tool_calls: None,
            tool_call_id: None,
        });
    }
    messages.extend(request.messages.into_iter().map(to_api_message));

    ChatCompletionRequest {
        model: request.model,
        messages,
        tools: Some(request.tools.iter().map(to_api_tool).collect()),
        stream: Some(true),
        response_format: None,
        provider: None,
        models: None,
        transforms: None,
    }
}

fn to_api_message(message: session::Message) -> Message {
    let role = match message.role {
        Role::User => "user",
        Role::Model => "assistant",
        Role::Tool => "tool",
    };
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    kind: "function".to_string(),
                    function_call: FunctionCall {
                        name: call.name,
                        arguments: match call.arguments {
                            Value::String(raw) => raw,
                            other => other.to_string(),
                        },
                    },
                })
                .collect(),
        )
    };
    Message {
        role: role.to_string(),
        content: message.content,
        name: message.name,
        tool_calls,
        tool_call_id: message.tool_call_id,
    }
}

fn to_api_tool(schema: &ToolSchema) -> ApiTool {
    ApiTool::Function {
        function: FunctionDescription {
            name: schema.name.to_string(),
            description: Some(schema.description.to_string()),
            strict: None,
            parameters: schema.parameters.clone(),
        },
    }
}

/// Streams one completion and folds the chunks into a single model message.
pub async fn stream_and_collect_response(
    client: &OpenRouterClient<Ready>,
    mut request: ChatCompletionRequest,
    print_stream: bool,
) -> Result<session::Message> {
    request.stream = Some(true);
    let mut stream = client.chat()?.chat_completion_stream(request);

    let mut content = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let choice = chunk.choices.first();

        if let Some(c) = choice.and_then(|c| c.delta.content.as_deref()) {
            if print_stream {
                use std::io::Write;
                print!("{c}");
                std::io::stdout().flush()?;
            }
            content.push_str(c);
        }

        if let Some(tool_call_chunks) = choice.and_then(|c| c.delta.tool_calls.as_ref()) {
            for chunk in tool_call_chunks {
                merge_tool_call_chunk(&mut tool_calls, chunk);
            }
        }
    }
    if print_stream && !content.is_empty() {
        println!();
    }

    if content.is_empty() && tool_calls.is_empty() {
        bail!("model returned an empty response");
    }
    debug!(content_len = content.len(), tool_calls = tool_calls.len(), "collected model response");

    let tool_calls = tool_calls
        .into_iter()
        .map(|call| {
            let raw = call.function_call.arguments;
            let arguments = if raw.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&raw).unwrap_or(Value::String(raw))
            };
            session::ToolCall::new(call.id, call.function_call.name, arguments)
        })
        .collect();

    Ok(session::Message::model(content, tool_calls))
}

/// A chunk with an id starts a new call; chunks without one continue the previous call.
fn merge_tool_call_chunk(tool_calls: &mut Vec<ToolCall>, chunk: &ToolCall) {
    match tool_calls.last_mut() {
        Some(last) if chunk.id.is_empty() => {
            last.function_call.name.push_str(&chunk.function_call.name);
            last.function_call.arguments.push_str(&chunk.function_call.arguments);
        }
        _ => tool_calls.push(chunk.clone()),
    }
}
