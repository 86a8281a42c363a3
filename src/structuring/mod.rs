use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tera::{Context as TeraContext, Tera};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult, ResponseParseError};
use crate::logging::RunLog;
use crate::providers::Provider;

pub const SENTINEL: &str = "Failed!";

const PROMPT_TEMPLATE: &str = include_str!("prompts/extract_words.tera");
const FENCE_OPEN: &str = "```json\n";
const FENCE_CLOSE: &str = "\n```";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WordEntry {
    #[serde(rename = "Word")]
    pub word: String,
    #[serde(rename = "Translation")]
    pub translation: String,
}

impl WordEntry {
    pub fn new(word: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            translation: translation.into(),
        }
    }
}

/// What a run produces: the extracted word list, or the `["Failed!"]`
/// placeholder when the model's answer could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Structured {
    Entries(Vec<WordEntry>),
    Failed,
}

impl Structured {
    pub fn is_failed(&self) -> bool {
        matches!(self, Structured::Failed)
    }

    pub fn entries(&self) -> &[WordEntry] {
        match self {
            Structured::Entries(entries) => entries,
            Structured::Failed => &[],
        }
    }
}

impl Serialize for Structured {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Structured::Entries(entries) => entries.serialize(serializer),
            Structured::Failed => [SENTINEL].serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Unusable responses and a missing key become `Structured::Failed`.
    #[default]
    Compatible,
    /// Unusable responses and a missing key are returned as errors.
    Strict,
}

#[derive(Debug, Clone)]
pub struct StructuringClient<P: Provider> {
    provider: P,
    mode: ParseMode,
}

impl<P: Provider> StructuringClient<P> {
    pub fn new(provider: P, mode: ParseMode) -> Self {
        Self { provider, mode }
    }

    pub async fn structure(&self, text: &str, log: &mut RunLog) -> PipelineResult<Structured> {
        if !self.provider.has_credentials() {
            if self.mode == ParseMode::Strict {
                return Err(PipelineError::MissingCredential);
            }
            log.error("Please enter your Gemini API key!");
            return Ok(Structured::Failed);
        }

        let prompt = render_prompt(text)
            .map_err(|err| PipelineError::AiService(format!("{:#}", err)))?;

        log.info("Sending text to AI...");
        let response = self
            .provider
            .clone()
            .append_user_input(prompt)
            .generate()
            .await
            .map_err(|err| PipelineError::AiService(format!("{:#}", err)))?;
        if let Some(usage) = &response.usage {
            debug!(
                "model {} used {:?} prompt / {:?} completion tokens",
                response.model.as_deref().unwrap_or("unknown"),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        self.interpret(&response.text, log)
    }

    /// Scrapes the fenced JSON block out of a model answer and validates it.
    pub fn interpret(&self, response: &str, log: &mut RunLog) -> PipelineResult<Structured> {
        let Some(payload) = extract_json_block(response).filter(|payload| !payload.is_empty())
        else {
            return self.reject(ResponseParseError::NoJsonBlock, log);
        };

        log.info("Processing AI response...");
        match parse_entries(payload) {
            Ok(entries) => Ok(Structured::Entries(entries)),
            Err(err) => self.reject(err, log),
        }
    }

    fn reject(&self, err: ResponseParseError, log: &mut RunLog) -> PipelineResult<Structured> {
        log.error(match &err {
            ResponseParseError::NoJsonBlock => "Failed to extract JSON from AI response!".to_string(),
            ResponseParseError::InvalidJson(source) => format!("JSON parsing error: {}", source),
            ResponseParseError::WrongShape(source) => format!("Unexpected JSON shape: {}", source),
        });
        match self.mode {
            ParseMode::Strict => Err(err.into()),
            ParseMode::Compatible => Ok(Structured::Failed),
        }
    }
}

pub fn render_prompt(text: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("text", text);
    Tera::one_off(PROMPT_TEMPLATE, &context, false).with_context(|| "failed to render prompt")
}

/// Returns the text between the first "```json\n" and the following "\n```".
/// Without a closing fence the rest of the response (up to any further opening
/// fence) is returned. `None` when there is no opening fence at all.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let start = response.find(FENCE_OPEN)? + FENCE_OPEN.len();
    let rest = &response[start..];
    let rest = rest.find(FENCE_OPEN).map_or(rest, |next| &rest[..next]);
    Some(rest.find(FENCE_CLOSE).map_or(rest, |end| &rest[..end]))
}

fn parse_entries(payload: &str) -> Result<Vec<WordEntry>, ResponseParseError> {
    let value: Value = serde_json::from_str(payload).map_err(ResponseParseError::InvalidJson)?;
    serde_json::from_value(value).map_err(ResponseParseError::WrongShape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::MockProvider;

    const HALLO: &str = "```json\n[{\"Word\":\"Hallo\",\"Translation\":\"Hello\"}]\n```";

    fn client(provider: MockProvider, mode: ParseMode) -> StructuringClient<MockProvider> {
        StructuringClient::new(provider, mode)
    }

    #[test]
    fn fence_extraction_takes_first_block() {
        let response = "Sure!\n```json\n[1]\n```\nand\n```json\n[2]\n```";
        assert_eq!(extract_json_block(response), Some("[1]"));
    }

    #[test]
    fn fence_without_newline_is_not_a_block() {
        assert_eq!(extract_json_block("```json [1] ```"), None);
        assert_eq!(extract_json_block("```\n[1]\n```"), None);
    }

    #[test]
    fn unclosed_fence_runs_to_end_of_response() {
        assert_eq!(extract_json_block("```json\n[1]"), Some("[1]"));
    }

    #[test]
    fn well_formed_block_yields_entries() {
        let mut log = RunLog::new();
        let result = client(MockProvider::new(""), ParseMode::Compatible)
            .interpret(HALLO, &mut log)
            .unwrap();
        assert_eq!(
            result,
            Structured::Entries(vec![WordEntry::new("Hallo", "Hello")])
        );
        assert!(log.contains("Processing AI response..."));
    }

    #[test]
    fn response_without_fence_is_sentinel() {
        let mut log = RunLog::new();
        let result = client(MockProvider::new(""), ParseMode::Compatible)
            .interpret("[{\"Word\":\"Hallo\",\"Translation\":\"Hello\"}]", &mut log)
            .unwrap();
        assert_eq!(result, Structured::Failed);
        assert!(log.contains("Failed to extract JSON from AI response!"));
    }

    #[test]
    fn invalid_json_is_sentinel_with_parse_error_line() {
        let mut log = RunLog::new();
        let result = client(MockProvider::new(""), ParseMode::Compatible)
            .interpret("```json\n{bad json}\n```", &mut log)
            .unwrap();
        assert_eq!(result, Structured::Failed);
        assert!(log.contains("JSON parsing error:"));
    }

    #[test]
    fn empty_block_is_sentinel() {
        let mut log = RunLog::new();
        let result = client(MockProvider::new(""), ParseMode::Compatible)
            .interpret("```json\n\n```", &mut log)
            .unwrap();
        assert_eq!(result, Structured::Failed);
    }

    #[test]
    fn wrong_shape_is_sentinel() {
        let mut log = RunLog::new();
        let client = client(MockProvider::new(""), ParseMode::Compatible);
        for payload in [
            "```json\n{\"Word\":\"a\",\"Translation\":\"b\"}\n```",
            "```json\n[{\"Word\":\"a\"}]\n```",
            "```json\n[{\"Word\":\"a\",\"Translation\":\"b\",\"Note\":\"c\"}]\n```",
            "```json\n[{\"Word\":1,\"Translation\":\"b\"}]\n```",
        ] {
            assert_eq!(client.interpret(payload, &mut log).unwrap(), Structured::Failed);
        }
        assert!(log.contains("Unexpected JSON shape:"));
    }

    #[test]
    fn strict_mode_surfaces_each_kind() {
        let mut log = RunLog::new();
        let client = client(MockProvider::new(""), ParseMode::Strict);
        assert!(matches!(
            client.interpret("no fence", &mut log),
            Err(PipelineError::ResponseParse(ResponseParseError::NoJsonBlock))
        ));
        assert!(matches!(
            client.interpret("```json\n{bad json}\n```", &mut log),
            Err(PipelineError::ResponseParse(ResponseParseError::InvalidJson(_)))
        ));
        assert!(matches!(
            client.interpret("```json\n[\"Failed!\"]\n```", &mut log),
            Err(PipelineError::ResponseParse(ResponseParseError::WrongShape(_)))
        ));
    }

    #[test]
    fn sentinel_serializes_as_single_string_array() {
        assert_eq!(
            serde_json::to_string(&Structured::Failed).unwrap(),
            "[\"Failed!\"]"
        );
        assert_eq!(
            serde_json::to_string(&Structured::Entries(vec![WordEntry::new("a", "b")])).unwrap(),
            "[{\"Word\":\"a\",\"Translation\":\"b\"}]"
        );
    }

    #[tokio::test]
    async fn empty_key_returns_sentinel_without_calling_provider() {
        let provider = MockProvider::new(HALLO).without_credentials();
        let mut log = RunLog::new();
        let result = client(provider.clone(), ParseMode::Compatible)
            .structure("Hallo", &mut log)
            .await
            .unwrap();
        assert_eq!(result, Structured::Failed);
        assert_eq!(provider.call_count(), 0);
        assert!(log.contains("Please enter your Gemini API key!"));
    }

    #[tokio::test]
    async fn empty_key_in_strict_mode_is_missing_credential() {
        let provider = MockProvider::new(HALLO).without_credentials();
        let mut log = RunLog::new();
        let err = client(provider.clone(), ParseMode::Strict)
            .structure("Hallo", &mut log)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingCredential));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn structure_sends_rendered_prompt_once() {
        let provider = MockProvider::new(HALLO);
        let mut log = RunLog::new();
        let result = client(provider.clone(), ParseMode::Compatible)
            .structure("Hallo\nWelt", &mut log)
            .await
            .unwrap();
        assert_eq!(result.entries(), &[WordEntry::new("Hallo", "Hello")]);
        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("Text:\nHallo\nWelt"));
        assert_eq!(
            log.lines(),
            &["Sending text to AI...", "Processing AI response..."]
        );
    }

    #[tokio::test]
    async fn provider_failure_is_ai_service_error() {
        let provider = MockProvider::failing("connection refused");
        let mut log = RunLog::new();
        let err = client(provider, ParseMode::Compatible)
            .structure("Hallo", &mut log)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AiService(message) if message.contains("connection refused")));
    }

    #[test]
    fn prompt_keeps_text_verbatim() {
        let prompt = render_prompt("a <b> & {{ c }}").unwrap();
        assert!(prompt.starts_with("Extract words and their translations"));
        assert!(prompt.ends_with("Text:\na <b> & {{ c }}"));
    }
}
