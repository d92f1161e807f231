use serde_json::{Map, Value};

/// A tool invocation extracted from a model completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub tool: String,
    pub args: Map<String, Value>,
    /// Optional status line to show the user while the tool runs.
    pub message: Option<String>,
}

/// Extract a tool call from a model completion, tolerating the prose models
/// wrap around JSON.
///
/// A fenced code block is preferred when present; otherwise the span from
/// the first `{` to the last `}` is taken. The candidate must parse as a
/// JSON object with a string `"tool"` key. Anything else returns None and
/// the completion is treated as a conversational answer.
pub fn parse_tool_call(response: &str) -> Option<ParsedToolCall> {
    let candidate = fenced_block(response).unwrap_or(response);

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end < start {
        return None;
    }

    let value: Value = serde_json::from_str(&candidate[start..=end]).ok()?;
    let obj = value.as_object()?;

    let tool = obj.get("tool")?.as_str()?.to_string();
    let args = match obj.get("args") {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return None,
        None => Map::new(),
    };
    let message = obj
        .get("message")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    Some(ParsedToolCall {
        tool,
        args,
        message,
    })
}

/// Contents of the first ``` fence, with any language tag stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let close = after_open.find("```")?;
    let block = &after_open[..close];

    // Skip the language tag line ("json", "javascript", ...) if present.
    match block.find('\n') {
        Some(nl) if !block[..nl].trim().is_empty() && !block[..nl].contains('{') => {
            Some(&block[nl + 1..])
        }
        _ => Some(block),
    }
}
