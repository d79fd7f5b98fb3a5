//! Tool-call simulation for providers without native function calling.
//!
//! The available functions are described in an extra system message, the
//! model is asked for a strict JSON reply, and the reply is parsed leniently
//! into at most one `ToolCall`.

use chrono::Utc;
use serde_json::Value;

use super::error::{ErrorKind, ProviderFailure, ProviderResult};
use super::lenient_json;
use super::types::{
    ChatCompletion, ChatCompletionRequest, ChatMessage, Choice, ResponseMessage, Tool, ToolCall,
    Usage,
};

/// Render the system instruction listing every callable function.
pub fn tool_prompt(tools: &[Tool]) -> String {
    let mut prompt = String::from("You have the following functions available to you:\n");
    for tool in tools {
        let parameters = tool
            .function
            .parameters
            .clone()
            .unwrap_or_else(|| Value::Object(Default::default()));
        prompt.push_str(&format!(
            "- Function Name: {}, Parameters: {}\n",
            tool.function.name, parameters
        ));
    }
    prompt.push_str("Please execute any function you deem appropriate based on the context provided.\n");
    prompt.push_str(
        "Respond only with a valid JSON object containing the following keys:\n\
         \"name\": \"function_name\",\n\
         \"arguments\": { \"parameter1\": \"value1\", \"parameter2\": \"value2\" }\n",
    );
    prompt
}

/// Validate the request and append the tool instruction as a system message.
pub fn inject_tool_prompt(request: &mut ChatCompletionRequest) -> ProviderResult<()> {
    let tools = match request.tools.as_deref() {
        Some(tools) if !tools.is_empty() => tools,
        _ => {
            return Err(ProviderFailure::with_message(
                ErrorKind::BadRequest,
                "No tools for function calling specified in the request.",
            ))
        }
    };

    if request.messages.is_empty() {
        return Err(ProviderFailure::with_message(
            ErrorKind::BadRequest,
            "No user messages found in the request.",
        ));
    }

    let prompt = tool_prompt(tools);
    request.messages.push(ChatMessage::system(prompt));
    Ok(())
}

/// Turn the model's free-text reply into tool calls.
///
/// Yields one call when the reply parses to an object with a string `name`
/// and an `arguments` key, and nothing otherwise.
pub fn parse_tool_reply(reply: &str) -> Vec<ToolCall> {
    let Some(Value::Object(object)) = lenient_json::parse(reply).into_value() else {
        tracing::debug!("tool reply did not contain a JSON object");
        return Vec::new();
    };

    let (Some(Value::String(name)), Some(arguments)) = (object.get("name"), object.get("arguments"))
    else {
        return Vec::new();
    };

    let arguments = match arguments {
        Value::String(encoded) => encoded.clone(),
        other => other.to_string(),
    };

    vec![ToolCall::function(0, tool_call_id(), name.clone(), arguments)]
}

fn tool_call_id() -> String {
    format!("call_{}", Utc::now().timestamp_millis())
}

/// Canonical completion for a simulated tool call. Always finishes with
/// `tool_calls`, even when no call could be parsed.
pub fn tool_call_completion(model: &str, tool_calls: Vec<ToolCall>, usage: Usage) -> ChatCompletion {
    let choice = Choice::new(0, ResponseMessage::tool_calls(tool_calls), "tool_calls");
    ChatCompletion::new(model, vec![choice], usage)
}
