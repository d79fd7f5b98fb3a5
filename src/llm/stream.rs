//! Server-Sent-Event chunk synthesis.
//!
//! Providers are always called without streaming; when the client asked for
//! a stream, the finished completion is cut into `chat.completion.chunk`
//! frames: a role header, content pieces of at most [`MAX_CHUNK_CHARS`]
//! characters, a final frame carrying the finish reason, and `[DONE]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ChatCompletion, Choice, Role, ToolCall};

/// Largest number of characters carried by one content frame.
pub const MAX_CHUNK_CHARS: usize = 4096;

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub logprobs: Option<Value>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Chunk(ChatCompletionChunk),
    Done,
}

impl StreamFrame {
    /// The frame as it goes on the wire: `data: <payload>\n\n`.
    pub fn to_sse(&self) -> String {
        let payload = match self {
            StreamFrame::Chunk(chunk) => {
                serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string())
            }
            StreamFrame::Done => DONE_SENTINEL.to_string(),
        };
        format!("data: {}\n\n", payload)
    }

    pub fn chunk(&self) -> Option<&ChatCompletionChunk> {
        match self {
            StreamFrame::Chunk(chunk) => Some(chunk),
            StreamFrame::Done => None,
        }
    }
}

/// Split `text` into pieces of at most `MAX_CHUNK_CHARS` characters.
pub fn split_content(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(MAX_CHUNK_CHARS)
            .map(|(offset, _)| offset)
            .unwrap_or(rest.len());
        let (piece, tail) = rest.split_at(end);
        pieces.push(piece);
        rest = tail;
    }
    pieces
}

/// Fragment a finished completion into the ordered SSE frame sequence.
pub fn generate_response_chunks(completion: &ChatCompletion) -> Vec<StreamFrame> {
    let mut frames = Vec::new();

    for choice in &completion.choices {
        for delta in choice_deltas(choice) {
            frames.push(frame(completion, choice.index, delta, None));
        }

        let finish_reason = if has_tool_calls(choice) {
            "tool_calls"
        } else {
            "stop"
        };
        frames.push(frame(
            completion,
            choice.index,
            Delta::default(),
            Some(finish_reason.to_string()),
        ));
    }

    frames.push(StreamFrame::Done);
    frames
}

fn choice_deltas(choice: &Choice) -> Vec<Delta> {
    let mut deltas = vec![Delta {
        role: Some(choice.message.role),
        content: Some(String::new()),
        tool_calls: None,
    }];

    let content = choice.message.content.as_deref().unwrap_or_default();
    deltas.extend(split_content(content).into_iter().map(|piece| Delta {
        content: Some(piece.to_string()),
        ..Delta::default()
    }));

    if let Some(tool_calls) = choice.message.tool_calls.as_ref().filter(|c| !c.is_empty()) {
        let indexed = tool_calls
            .iter()
            .enumerate()
            .map(|(i, call)| ToolCall {
                index: Some(i as u32),
                ..call.clone()
            })
            .collect();
        deltas.push(Delta {
            tool_calls: Some(indexed),
            ..Delta::default()
        });
    }

    deltas
}

fn has_tool_calls(choice: &Choice) -> bool {
    choice
        .message
        .tool_calls
        .as_ref()
        .is_some_and(|calls| !calls.is_empty())
}

fn frame(
    completion: &ChatCompletion,
    index: u32,
    delta: Delta,
    finish_reason: Option<String>,
) -> StreamFrame {
    StreamFrame::Chunk(ChatCompletionChunk {
        id: completion.id.clone(),
        object: "chat.completion.chunk".to_string(),
        created: completion.created,
        model: completion.model.clone(),
        system_fingerprint: completion.system_fingerprint.clone(),
        choices: vec![ChunkChoice {
            index,
            delta,
            logprobs: None,
            finish_reason,
        }],
    })
}

/// Concatenate the content pieces of a frame sequence.
pub fn reassemble(frames: &[StreamFrame]) -> String {
    frames
        .iter()
        .filter_map(StreamFrame::chunk)
        .flat_map(|chunk| chunk.choices.iter())
        .filter(|choice| choice.delta.role.is_none())
        .filter_map(|choice| choice.delta.content.as_deref())
        .collect()
}
