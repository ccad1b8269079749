//! Ollama (local LLM) backend implementation.
//!
//! Prompt building and response parsing are pure functions; only
//! [`OllamaBackend::generate`] touches the network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::instrument;

use qa_automator_core::error::BackendError;
use qa_automator_core::model::{AcceptanceCriterion, CriterionResult, Status, TestArtifact};
use qa_automator_core::traits::AnalysisBackend;

use crate::config::OllamaSettings;

const PROMPT_PREAMBLE: &str =
    "You are a QA analyst. Evaluate if the artifact satisfies the acceptance criterion.";
const PROMPT_FORMAT: &str = "Return ONLY JSON with keys: status(pass/fail), confidence(0-1), reasoning, recommended_test_update.";

const DEFAULT_REASONING: &str = "No reasoning returned.";
const DEFAULT_RECOMMENDATION: &str = "No update recommendation returned.";
const INVALID_JSON_RECOMMENDATION: &str = "Retry with stricter prompt or fallback to mock backend.";
const RAW_EXCERPT_CHARS: usize = 200;

/// How much of the artifact is embedded in each prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    /// Max characters of the DOM snapshot.
    pub dom_snapshot_chars: usize,
    /// Max characters of the screenshot's base64 encoding.
    pub image_prefix_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            dom_snapshot_chars: 3000,
            image_prefix_chars: 1200,
        }
    }
}

/// A screenshot summarized for inclusion in a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Leading characters of the file's standard base64 encoding.
    pub base64_prefix: String,
}

/// Read a screenshot's size and base64 prefix.
///
/// Returns `Ok(None)` when the file does not exist. Only the bytes needed
/// for `prefix_chars` characters of base64 are read, so the buffer never
/// grows past the file size whatever the limit.
pub async fn load_screenshot(
    path: &Path,
    prefix_chars: usize,
) -> anyhow::Result<Option<Screenshot>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to stat screenshot: {}", path.display()))
        }
    };

    // Every 3 input bytes encode to 4 base64 characters.
    let bytes_needed = prefix_chars.div_ceil(4).saturating_mul(3);
    let mut buf = Vec::new();
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open screenshot: {}", path.display()))?;
    file.take(bytes_needed as u64)
        .read_to_end(&mut buf)
        .await
        .with_context(|| format!("failed to read screenshot: {}", path.display()))?;

    let mut base64_prefix = STANDARD.encode(&buf);
    base64_prefix.truncate(prefix_chars);

    Ok(Some(Screenshot {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        base64_prefix,
    }))
}

/// Build the judging prompt for one criterion.
pub fn build_prompt(
    criterion: &AcceptanceCriterion,
    artifact: &TestArtifact,
    screenshot: Option<&Screenshot>,
    limits: &PromptLimits,
) -> String {
    let (summary, image_prefix) = match screenshot {
        Some(shot) => (
            format!(
                "Screenshot present: {} ({} bytes)",
                shot.path.display(),
                shot.size_bytes
            ),
            truncate_chars(&shot.base64_prefix, limits.image_prefix_chars),
        ),
        None => ("No screenshot provided.".to_string(), ""),
    };

    [
        PROMPT_PREAMBLE.to_string(),
        PROMPT_FORMAT.to_string(),
        String::new(),
        format!("Criterion: {}", criterion.statement),
        format!("Observed text: {}", artifact.observed_text),
        format!(
            "DOM snapshot: {}",
            truncate_chars(&artifact.dom_snapshot, limits.dom_snapshot_chars)
        ),
        format!("Image summary: {summary}"),
        format!("Image(base64-prefix): {image_prefix}"),
    ]
    .join("\n")
}

/// Map the model's `response` text to a result.
///
/// Text that is not JSON becomes a failing placeholder instead of an error;
/// missing or mistyped fields fall back to safe defaults.
pub fn parse_model_output(criterion: &AcceptanceCriterion, text: &str) -> CriterionResult {
    let data: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(criterion = %criterion.id, error = %e, "model response was not valid JSON");
            return CriterionResult {
                criterion: criterion.clone(),
                status: Status::Fail,
                confidence: 0.0,
                reasoning: format!(
                    "Model response was not valid JSON: {}",
                    truncate_chars(text, RAW_EXCERPT_CHARS)
                ),
                recommended_test_update: INVALID_JSON_RECOMMENDATION.to_string(),
            };
        }
    };

    let status = data
        .get("status")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Status>().ok())
        .unwrap_or(Status::Fail);

    CriterionResult {
        criterion: criterion.clone(),
        status,
        confidence: confidence_of(data.get("confidence")),
        reasoning: text_or(data.get("reasoning"), DEFAULT_REASONING),
        recommended_test_update: text_or(
            data.get("recommended_test_update"),
            DEFAULT_RECOMMENDATION,
        ),
    }
}

/// Numbers and numeric strings, clamped to `[0, 1]`; anything else is 0.
fn confidence_of(value: Option<&Value>) -> f64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

fn text_or(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Longest prefix of `s` with at most `max` characters.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Ollama backend that asks a local model to judge each criterion.
pub struct OllamaBackend {
    host: String,
    model: String,
    timeout: Duration,
    limits: PromptLimits,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateEnvelope {
    #[serde(default)]
    response: Option<String>,
}

impl OllamaBackend {
    pub fn new(settings: &OllamaSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;

        Ok(Self {
            host: settings.host.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            limits: settings.prompt_limits(),
            client,
        })
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn connection_error(&self, detail: impl Into<String>) -> BackendError {
        BackendError::Connection {
            host: self.host.clone(),
            detail: detail.into(),
        }
    }

    /// Send one prompt and return the model's raw `response` text.
    ///
    /// The whole round trip is cancelled once the timeout elapses.
    pub async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let body = GenerateBody {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };
        let url = format!("{}/api/generate", self.host);

        let round_trip = async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| self.connection_error(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(self.connection_error(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    truncate_chars(text.trim(), RAW_EXCERPT_CHARS)
                )));
            }

            let envelope: GenerateEnvelope = response
                .json()
                .await
                .map_err(|e| self.connection_error(format!("failed to parse response: {e}")))?;
            // An absent or empty `response` carries no verdict fields.
            Ok::<_, BackendError>(
                envelope
                    .response
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "{}".to_string()),
            )
        };

        match tokio::time::timeout(self.timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(self.connection_error(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl AnalysisBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, criterion, artifact), fields(model = %self.model, criterion = %criterion.id))]
    async fn evaluate(
        &self,
        criterion: &AcceptanceCriterion,
        artifact: &TestArtifact,
    ) -> anyhow::Result<CriterionResult> {
        let screenshot = match &artifact.screenshot_path {
            Some(path) => load_screenshot(path, self.limits.image_prefix_chars).await?,
            None => None,
        };
        let prompt = build_prompt(criterion, artifact, screenshot.as_ref(), &self.limits);

        let response_text = self.generate(&prompt).await?;
        Ok(parse_model_output(criterion, &response_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn criterion() -> AcceptanceCriterion {
        AcceptanceCriterion::new("AC-1", "dashboard welcome message visible")
    }

    fn artifact() -> TestArtifact {
        TestArtifact {
            title: "Run".into(),
            observed_text: "Dashboard loaded and welcome message visible".into(),
            dom_snapshot: "<h1>Dashboard</h1>".into(),
            screenshot_path: None,
        }
    }

    fn backend(host: &str) -> OllamaBackend {
        let settings = OllamaSettings {
            host: host.to_string(),
            ..OllamaSettings::default()
        };
        OllamaBackend::new(&settings).unwrap()
    }

    // --- prompt building ---

    #[test]
    fn prompt_without_screenshot() {
        let prompt = build_prompt(&criterion(), &artifact(), None, &PromptLimits::default());
        let lines: Vec<&str> = prompt.lines().collect();

        assert_eq!(lines[0], PROMPT_PREAMBLE);
        assert_eq!(lines[1], PROMPT_FORMAT);
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "Criterion: dashboard welcome message visible");
        assert_eq!(
            lines[4],
            "Observed text: Dashboard loaded and welcome message visible"
        );
        assert_eq!(lines[5], "DOM snapshot: <h1>Dashboard</h1>");
        assert_eq!(lines[6], "Image summary: No screenshot provided.");
        assert!(prompt.ends_with("Image(base64-prefix): "));
    }

    #[test]
    fn prompt_truncates_dom_by_chars() {
        let mut a = artifact();
        a.dom_snapshot = "é".repeat(5000);
        let limits = PromptLimits {
            dom_snapshot_chars: 3000,
            image_prefix_chars: 1200,
        };

        let prompt = build_prompt(&criterion(), &a, None, &limits);

        let dom_line = prompt
            .lines()
            .find(|l| l.starts_with("DOM snapshot: "))
            .unwrap();
        assert_eq!(
            dom_line.trim_start_matches("DOM snapshot: ").chars().count(),
            3000
        );
    }

    #[test]
    fn prompt_with_screenshot() {
        let shot = Screenshot {
            path: PathBuf::from("shots/login.png"),
            size_bytes: 4096,
            base64_prefix: "iVBORw0KGgo".into(),
        };

        let prompt = build_prompt(
            &criterion(),
            &artifact(),
            Some(&shot),
            &PromptLimits::default(),
        );

        assert!(prompt.contains("Image summary: Screenshot present: shots/login.png (4096 bytes)"));
        assert!(prompt.contains("Image(base64-prefix): iVBORw0KGgo"));
    }

    #[tokio::test]
    async fn load_screenshot_missing_file() {
        let shot = load_screenshot(Path::new("definitely/not/here.png"), 1200)
            .await
            .unwrap();
        assert!(shot.is_none());
    }

    #[tokio::test]
    async fn load_screenshot_prefix_matches_full_encoding() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shot.png");
        let bytes: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();

        for limit in [0, 1, 5, 1200, 1201] {
            let shot = load_screenshot(&path, limit).await.unwrap().unwrap();
            let full = STANDARD.encode(&bytes);
            assert_eq!(shot.base64_prefix, &full[..limit], "limit {limit}");
            assert_eq!(shot.size_bytes, 5000);
        }
    }

    #[tokio::test]
    async fn load_screenshot_small_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tiny.png");
        std::fs::write(&path, b"abc1").unwrap();

        let shot = load_screenshot(&path, 1200).await.unwrap().unwrap();
        assert_eq!(shot.base64_prefix, STANDARD.encode(b"abc1"));
        assert_eq!(shot.size_bytes, 4);
    }

    #[tokio::test]
    async fn load_screenshot_huge_limit_reads_whole_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tiny.png");
        std::fs::write(&path, b"PNGDATA").unwrap();

        let shot = load_screenshot(&path, 40_000_000_000_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shot.base64_prefix, STANDARD.encode(b"PNGDATA"));
        assert_eq!(shot.size_bytes, 7);

        let shot = load_screenshot(&path, usize::MAX).await.unwrap().unwrap();
        assert_eq!(shot.base64_prefix, STANDARD.encode(b"PNGDATA"));
    }

    #[tokio::test]
    async fn load_screenshot_directory_is_none() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_screenshot(dir.path(), 1200).await.unwrap().is_none());
    }

    // --- response parsing ---

    #[test]
    fn parse_full_response() {
        let text = r#"{
            "status": "pass",
            "confidence": 0.92,
            "reasoning": "Welcome banner is rendered.",
            "recommended_test_update": "Assert the banner text."
        }"#;

        let result = parse_model_output(&criterion(), text);

        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.reasoning, "Welcome banner is rendered.");
        assert_eq!(result.recommended_test_update, "Assert the banner text.");
        assert_eq!(result.criterion.id, "AC-1");
    }

    #[test]
    fn parse_empty_object_uses_defaults() {
        let result = parse_model_output(&criterion(), "{}");

        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasoning, DEFAULT_REASONING);
        assert_eq!(result.recommended_test_update, DEFAULT_RECOMMENDATION);
    }

    #[test]
    fn parse_non_object_json_uses_defaults() {
        let result = parse_model_output(&criterion(), "[1, 2, 3]");
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.reasoning, DEFAULT_REASONING);
    }

    #[test]
    fn parse_lenient_field_types() {
        let text = r#"{"status": " PASS ", "confidence": "0.75"}"#;
        let result = parse_model_output(&criterion(), text);
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.confidence, 0.75);

        let text = r#"{"status": "unsure", "confidence": 7}"#;
        let result = parse_model_output(&criterion(), text);
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.confidence, 1.0);

        let text = r#"{"confidence": true, "reasoning": 42}"#;
        let result = parse_model_output(&criterion(), text);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasoning, DEFAULT_REASONING);
    }

    #[test]
    fn parse_malformed_json_is_failing_placeholder() {
        let raw = format!("Sure! Here is my verdict: {}", "x".repeat(500));

        let result = parse_model_output(&criterion(), &raw);

        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.confidence, 0.0);
        assert!(result
            .reasoning
            .starts_with("Model response was not valid JSON: Sure! Here is my verdict: "));
        assert_eq!(
            result.reasoning.len(),
            "Model response was not valid JSON: ".len() + RAW_EXCERPT_CHARS
        );
        assert_eq!(result.recommended_test_update, INVALID_JSON_RECOMMENDATION);
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    // --- transport ---

    #[tokio::test]
    async fn successful_evaluation() {
        let server = MockServer::start().await;

        let model_output = serde_json::json!({
            "status": "pass",
            "confidence": 0.9,
            "reasoning": "Banner visible.",
            "recommended_test_update": "Keep checks."
        });
        let response_body = serde_json::json!({
            "model": "llama3.1:8b",
            "response": model_output.to_string(),
            "done": true
        });

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.1:8b",
                "stream": false,
                "format": "json"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server.uri());
        let result = backend.evaluate(&criterion(), &artifact()).await.unwrap();

        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.reasoning, "Banner visible.");
    }

    #[tokio::test]
    async fn malformed_model_output_does_not_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "not json at all"})),
            )
            .mount(&server)
            .await;

        let result = backend(&server.uri())
            .evaluate(&criterion(), &artifact())
            .await
            .unwrap();

        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.confidence, 0.0);
        assert!(result.reasoning.contains("not json at all"));
    }

    #[tokio::test]
    async fn missing_response_field_uses_defaults() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})))
            .mount(&server)
            .await;

        let result = backend(&server.uri())
            .evaluate(&criterion(), &artifact())
            .await
            .unwrap();

        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.reasoning, DEFAULT_REASONING);
    }

    #[tokio::test]
    async fn empty_response_field_uses_defaults() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": ""})))
            .mount(&server)
            .await;

        let result = backend(&server.uri())
            .evaluate(&criterion(), &artifact())
            .await
            .unwrap();

        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasoning, DEFAULT_REASONING);
        assert_eq!(result.recommended_test_update, DEFAULT_RECOMMENDATION);
    }

    #[tokio::test]
    async fn server_error_is_connection_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let err = backend(&server.uri())
            .evaluate(&criterion(), &artifact())
            .await
            .unwrap_err();

        let backend_err = err.downcast_ref::<BackendError>().unwrap();
        assert!(backend_err.is_connection());
        let msg = err.to_string();
        assert!(msg.contains(&server.uri()));
        assert!(msg.contains("ollama serve"));
        assert!(msg.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "{}"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let backend = backend(&server.uri()).with_timeout(Duration::from_millis(200));
        let err = backend.generate("prompt").await.unwrap_err();

        assert!(err.is_connection());
        assert!(err.to_string().contains("timed out after 200ms"));
    }

    #[tokio::test]
    async fn unreachable_host_is_connection_error() {
        let backend = backend("http://127.0.0.1:1").with_timeout(Duration::from_secs(5));
        let err = backend.generate("prompt").await.unwrap_err();

        assert!(err.is_connection());
        assert!(err.to_string().contains("http://127.0.0.1:1"));
    }

    #[tokio::test]
    async fn screenshot_is_embedded_in_request() {
        let dir = tempfile::TempDir::new().unwrap();
        let shot_path = dir.path().join("shot.png");
        std::fs::write(&shot_path, b"PNGDATA").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "{}"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut a = artifact();
        a.screenshot_path = Some(shot_path);
        backend(&server.uri())
            .evaluate(&criterion(), &a)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.contains("(7 bytes)"));
        assert!(prompt.contains(&STANDARD.encode(b"PNGDATA")));
    }

    #[test]
    fn host_trailing_slash_is_trimmed() {
        let b = backend("http://localhost:11434/");
        assert_eq!(b.host(), "http://localhost:11434");
        assert_eq!(b.model(), "llama3.1:8b");
    }
}
