use crate::config::Config;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Chat completion request for a single translation task.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

// Regex patterns for stripping wrapped quotes (cached for performance)
static STANDARD_QUOTES: OnceLock<Regex> = OnceLock::new();
static FANCY_QUOTES: OnceLock<Regex> = OnceLock::new();

fn build_prompt(text: &str, source_name: &str, target_name: &str) -> String {
    format!(
        "Translate the following text from {} to {}. Return only the translated text without any quotation marks, explanations, or additional text:\n\n\"{}\"",
        source_name, target_name, text
    )
}

/// Translate one text through the Groq chat-completions API.
///
/// Language display names are resolved by the caller (once per job, not per
/// task). Every failure comes back as `Error::Provider`; callers decide
/// whether that fails a task or a request. There is no retry here: a failed
/// task is counted, not repeated.
pub async fn translate_text(
    client: &reqwest::Client,
    config: &Config,
    text: &str,
    source_name: &str,
    target_name: &str,
) -> Result<String> {
    let request = ChatRequest {
        model: config.groq_model.clone(),
        messages: vec![Message {
            role: "user".to_string(),
            content: build_prompt(text, source_name, target_name),
        }],
        max_tokens: 150,
        temperature: 0.7,
    };

    let response = client
        .post(&config.groq_api_url)
        .header("Authorization", format!("Bearer {}", config.groq_api_key))
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::Provider(format!("Failed to send request: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
        return Err(Error::Provider(format!("{}: {}", status, body)));
    }

    let chat_response: ChatResponse = response
        .json()
        .await
        .map_err(|e| Error::Provider(format!("Failed to parse response: {}", e)))?;

    let content = chat_response
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .ok_or_else(|| Error::Provider("response contained no choices".to_string()))?;

    Ok(clean_translation(content))
}

/// Strip one layer of wrapping quotation marks the model sometimes adds
/// despite being told not to. Quotes inside the text are left alone.
pub fn clean_translation(text: &str) -> String {
    let trimmed = text.trim();

    let standard =
        STANDARD_QUOTES.get_or_init(|| Regex::new(r#"(?s)^["'](.*)["']$"#).unwrap());
    let cleaned = standard.replace(trimmed, "$1");

    let fancy = FANCY_QUOTES.get_or_init(|| Regex::new(r"(?s)^[“”‘’](.*)[“”‘’]$").unwrap());
    let cleaned = fancy.replace(&cleaned, "$1");

    cleaned.into_owned()
}
