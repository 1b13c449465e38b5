//! Per-turn tool call accumulation
//!
//! Tool calls are keyed by stream index, not id: an index is known from the
//! first chunk while some providers only reveal the id later. Argument text
//! is concatenated verbatim and parsed once, when the provider signals that
//! the turn ended with a tool request.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::invocation::ToolInvocation;

#[derive(Debug)]
struct PendingCall {
    invocation: ToolInvocation,
    arguments: String,
    parameters: Option<Value>,
    takes_arguments: bool,
}

/// A tool call whose arguments could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedCall {
    pub id: String,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    /// Arrival order
    calls: Vec<PendingCall>,
    by_index: HashMap<usize, usize>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool call at `index`.
    ///
    /// With `takes_arguments == false` the tool declares no parameters and
    /// always receives `{}`, whatever argument text arrives.
    pub fn start(&mut self, id: String, index: usize, name: String, takes_arguments: bool) {
        let call = PendingCall {
            invocation: ToolInvocation::new(id, name),
            arguments: String::new(),
            parameters: None,
            takes_arguments,
        };
        match self.by_index.get(&index) {
            Some(&slot) => {
                tracing::warn!(index, "tool call index restarted; discarding earlier arguments");
                self.calls[slot] = call;
            }
            None => {
                self.by_index.insert(index, self.calls.len());
                self.calls.push(call);
            }
        }
    }

    /// Append raw argument text. Returns false when no call is open at `index`.
    pub fn push_fragment(&mut self, index: usize, partial_json: &str) -> bool {
        match self.slot_mut(index) {
            Some(call) => {
                call.arguments.push_str(partial_json);
                true
            }
            None => false,
        }
    }

    /// Record whole-object parameters. Returns false when no call is open at `index`.
    pub fn set_parameters(&mut self, index: usize, input: Value) -> bool {
        match self.slot_mut(index) {
            Some(call) => {
                call.parameters = Some(input);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Parse every open call, in arrival order, and reset.
    pub fn finish(&mut self) -> Vec<Result<ToolInvocation, MalformedCall>> {
        self.by_index.clear();
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|call| {
                let PendingCall {
                    mut invocation,
                    arguments,
                    parameters,
                    takes_arguments,
                } = call;
                match decode_input(&arguments, parameters, takes_arguments) {
                    Ok(input) => {
                        invocation.input = input;
                        Ok(invocation)
                    }
                    Err(reason) => Err(MalformedCall {
                        id: invocation.id,
                        name: invocation.name,
                        reason,
                    }),
                }
            })
            .collect()
    }

    fn slot_mut(&mut self, index: usize) -> Option<&mut PendingCall> {
        let slot = *self.by_index.get(&index)?;
        self.calls.get_mut(slot)
    }
}

fn decode_input(
    arguments: &str,
    parameters: Option<Value>,
    takes_arguments: bool,
) -> Result<Value, String> {
    if !takes_arguments {
        return Ok(Value::Object(Map::new()));
    }
    let value = if !arguments.trim().is_empty() {
        serde_json::from_str::<Value>(arguments).map_err(|e| e.to_string())?
    } else {
        parameters.unwrap_or(Value::Null)
    };
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}
