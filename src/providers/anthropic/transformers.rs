//! Request transformer for Anthropic Messages
//!
//! Anthropic has no `tool` role: tool results travel as `tool_result` blocks
//! inside a user turn, and a tool request is a `tool_use` block inside an
//! assistant turn. Consecutive turns with the same role are merged, since the
//! API requires strict user/assistant alternation.

use serde_json::{Value, json};

use crate::error::LlmError;
use crate::providers::{RequestTransformer, require_model};
use crate::types::{ChatMessage, ChatRequest, ContentPart, Tool, UserContent};

/// Used when a request carries no `max_tokens`; the API requires one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Default)]
pub struct AnthropicRequestTransformer;

impl RequestTransformer for AnthropicRequestTransformer {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn transform_chat(&self, req: &ChatRequest) -> Result<Value, LlmError> {
        require_model(req)?;
        if let Some(t) = req.temperature
            && !(0.0..=1.0).contains(&t)
        {
            return Err(LlmError::InvalidInput(
                "Anthropic temperature must be between 0.0 and 1.0".to_string(),
            ));
        }

        let (messages, inline_system) = convert_messages(&req.messages)?;
        let system = match (&req.system, inline_system) {
            (Some(s), Some(extra)) => Some(format!("{s}\n\n{extra}")),
            (Some(s), None) => Some(s.clone()),
            (None, extra) => extra,
        };

        let mut body = json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(convert_tool).collect());
        }
        Ok(body)
    }
}

fn convert_tool(tool: &Tool) -> Value {
    json!({
        "name": tool.function.name,
        "description": tool.function.description,
        "input_schema": tool.parameters_schema(),
    })
}

/// Convert conversation turns into Anthropic messages.
///
/// Returns the messages plus the text of any system message found among the
/// turns, which Anthropic only accepts as the top-level `system` field.
pub(crate) fn convert_messages(
    messages: &[ChatMessage],
) -> Result<(Vec<Value>, Option<String>), LlmError> {
    let mut out: Vec<(&'static str, Vec<Value>)> = Vec::new();
    let mut system: Option<String> = None;

    for message in messages {
        let (role, blocks) = match message {
            ChatMessage::System { content } => {
                system = Some(match system.take() {
                    Some(prev) => format!("{prev}\n\n{content}"),
                    None => content.clone(),
                });
                continue;
            }
            ChatMessage::User { content } => ("user", convert_user_content(content)),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut blocks = Vec::new();
                if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                for call in tool_calls {
                    let input = if call.input.is_object() {
                        call.input.clone()
                    } else {
                        json!({})
                    };
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": input,
                    }));
                }
                ("assistant", blocks)
            }
            ChatMessage::Tool {
                tool_call_id,
                content,
                ..
            } => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                })],
            ),
        };

        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => out.push((role, blocks)),
        }
    }

    let messages = out
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect();
    Ok((messages, system))
}

fn convert_user_content(content: &UserContent) -> Vec<Value> {
    match content {
        UserContent::Text(text) if text.is_empty() => vec![],
        UserContent::Text(text) => vec![json!({ "type": "text", "text": text })],
        UserContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::ImageUrl { url } => convert_image(url),
            })
            .collect(),
    }
}

fn convert_image(url: &str) -> Value {
    if let Some(rest) = url.strip_prefix("data:")
        && let Some((meta, data)) = rest.split_once(',')
        && let Some(media_type) = meta.strip_suffix(";base64")
    {
        return json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data },
        });
    }
    json!({
        "type": "image",
        "source": { "type": "url", "url": url },
    })
}
