//! Rendering of a streamed completion into a chat message.

use berth_core::llm::{CompletionResponse, FINISH_REASON_STOP};

const CODE_FENCE: &str = "```";

/// Concatenates the first choice of every chunk up to and including the
/// stop chunk.
///
/// Text outside fenced code blocks is HTML-escaped, text inside is kept raw.
/// Whether a chunk lands inside a fence is decided by the number of fence
/// markers already emitted: an odd count means the fence is open.
pub fn llm_response_to_text(responses: &[CompletionResponse]) -> String {
    let mut result = String::new();
    let mut first = true;

    for response in responses {
        let Some(choice) = response.choices.first() else {
            continue;
        };

        let inside_fence = result.matches(CODE_FENCE).count() % 2 == 1;
        let text = if inside_fence {
            choice.text.clone()
        } else {
            escape_html(&choice.text)
        };

        if first {
            result.push_str(text.trim_start_matches(' '));
            first = false;
        } else {
            result.push_str(&text);
        }

        if choice.finish_reason.as_deref() == Some(FINISH_REASON_STOP) {
            break;
        }
    }

    result
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
