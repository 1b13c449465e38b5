//! Request transformer for OpenAI Chat Completions
//!
//! Also used for OpenAI-compatible servers (vLLM, Ollama, LM Studio,
//! gateways) reached through a `base_url` override.

use serde_json::{Value, json};

use crate::error::LlmError;
use crate::providers::{RequestTransformer, require_model};
use crate::types::{ChatMessage, ChatRequest, ContentPart, Tool, UserContent};

#[derive(Debug, Clone, Default)]
pub struct OpenAiRequestTransformer;

impl RequestTransformer for OpenAiRequestTransformer {
    fn provider_id(&self) -> &str {
        "openai"
    }

    fn transform_chat(&self, req: &ChatRequest) -> Result<Value, LlmError> {
        require_model(req)?;
        if let Some(t) = req.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(LlmError::InvalidInput(
                "OpenAI temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for message in &req.messages {
            messages.push(convert_message(message)?);
        }

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(convert_tool).collect());
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        Ok(body)
    }
}

fn convert_tool(tool: &Tool) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.function.name,
            "description": tool.function.description,
            "parameters": tool.parameters_schema(),
        }
    })
}

pub(crate) fn convert_message(message: &ChatMessage) -> Result<Value, LlmError> {
    Ok(match message {
        ChatMessage::System { content } => json!({ "role": "system", "content": content }),
        ChatMessage::User { content } => json!({
            "role": "user",
            "content": convert_user_content(content),
        }),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut msg = json!({
                "role": "assistant",
                "content": content.as_deref().filter(|c| !c.is_empty()),
            });
            if !tool_calls.is_empty() {
                let calls = tool_calls
                    .iter()
                    .map(|call| {
                        // The API expects arguments as a JSON-encoded string
                        let arguments = serde_json::to_string(&call.input)?;
                        Ok(json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": arguments },
                        }))
                    })
                    .collect::<Result<Vec<_>, serde_json::Error>>()?;
                msg["tool_calls"] = Value::Array(calls);
            }
            msg
        }
        ChatMessage::Tool {
            tool_call_id,
            content,
            ..
        } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
    })
}

fn convert_user_content(content: &UserContent) -> Value {
    match content {
        UserContent::Text(text) => json!(text),
        UserContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                    ContentPart::ImageUrl { url } => {
                        json!({ "type": "image_url", "image_url": { "url": url } })
                    }
                })
                .collect(),
        ),
    }
}
