// src/validation.rs
//
// Validation gate: submits each surviving candidate's evidence image to an
// external Gemini-style vision endpoint and turns whatever comes back into
// a ValidationVerdict. The gate fails OPEN at every seam:
//   - no API key configured          -> correct / 1.0 / "bypassed"
//   - transport or HTTP error        -> correct / 0.5 / error reason
//   - malformed or invalid response  -> lexical fallback at 0.7
// Losing a verdict must never lose the evidence.

use crate::types::{ValidationVerdict, ValidatorConfig, VerdictStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "\
You are an AI traffic violation detection validator. You will receive an \
annotated image with bounding boxes showing a detected violation. The \
possible violations are:
1. \"no_helmet\" - person riding a motorcycle or scooter without a helmet
2. \"triple_riding\" - more than 2 people on a single motorcycle or scooter
3. \"no_seatbelt\" - person in a car not wearing a seatbelt

Check whether the bounding box correctly identifies the claimed violation \
and whether the detection could be a false positive.

Respond ONLY with a JSON object in this exact format:
{\"status\": \"correct\" or \"incorrect\", \"confidence\": 0.0 to 1.0, \
\"reason\": \"brief explanation\"}

Be strict: only answer \"correct\" if you are confident the detection is \
accurate.";

#[async_trait]
pub trait Validator {
    async fn validate(&self, artifact_path: &Path, violation_type: &str) -> ValidationVerdict;
}

pub struct ValidationGate {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl ValidationGate {
    /// Resolves the API key from the environment first, then the config.
    /// A missing key is an expected state, not an error.
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| config.api_key.clone());
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ValidatorConfig, api_key: Option<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building validation HTTP client")?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request_verdict(
        &self,
        api_key: &str,
        artifact_path: &Path,
        violation_type: &str,
    ) -> Result<String> {
        let image_bytes = std::fs::read(artifact_path)
            .with_context(|| format!("reading artifact {}", artifact_path.display()))?;
        let b64 = base64::engine::general_purpose::STANDARD.encode(&image_bytes);

        let prompt = format!(
            "{}\n\nThe detected violation type is: \"{}\"\n\nAnalyze this \
             annotated image and validate whether the detection is correct.",
            SYSTEM_PROMPT, violation_type
        );

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart {
                        text: Some(prompt),
                        inline_data: None,
                    },
                    RequestPart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: b64,
                        }),
                    },
                ],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, api_key
        );

        let resp = self.http_client.post(&url).json(&request).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("validator returned HTTP {}: {}", status, body);
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .context("validator response carried no text part")
    }
}

#[async_trait]
impl Validator for ValidationGate {
    async fn validate(&self, artifact_path: &Path, violation_type: &str) -> ValidationVerdict {
        let Some(api_key) = self.api_key.as_deref() else {
            info!("Validator not configured, bypassing validation (accepting detection)");
            return ValidationVerdict {
                status: VerdictStatus::Correct,
                confidence: 1.0,
                reason: "validator not configured - bypassed".to_string(),
            };
        };

        info!("Validating '{}' detection against {}", violation_type, self.model);

        match self
            .request_verdict(api_key, artifact_path, violation_type)
            .await
        {
            Ok(text) => {
                let verdict = parse_verdict_text(&text);
                info!(
                    "Verdict for '{}': {:?} (confidence {:.2})",
                    violation_type, verdict.status, verdict.confidence
                );
                verdict
            }
            Err(e) => {
                warn!("Validation call failed, accepting detection: {:#}", e);
                ValidationVerdict {
                    status: VerdictStatus::Correct,
                    confidence: 0.5,
                    reason: format!("validation error: {e:#}"),
                }
            }
        }
    }
}

/// Turn the validator's text into a verdict. A well-formed JSON object with
/// a known status and an in-range confidence wins; everything else drops to
/// the lexical fallback over the raw text.
pub fn parse_verdict_text(text: &str) -> ValidationVerdict {
    if let Some(verdict) = parse_strict_verdict(text) {
        return verdict;
    }
    lexical_fallback(text)
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    status: String,
    confidence: f64,
    reason: String,
}

fn parse_strict_verdict(text: &str) -> Option<ValidationVerdict> {
    let raw: RawVerdict = serde_json::from_str(text.trim()).ok()?;

    let status = match raw.status.as_str() {
        "correct" => VerdictStatus::Correct,
        "incorrect" => VerdictStatus::Incorrect,
        _ => return None,
    };
    if !(0.0..=1.0).contains(&raw.confidence) {
        return None;
    }

    Some(ValidationVerdict {
        status,
        confidence: raw.confidence,
        reason: raw.reason,
    })
}

/// Scan for the token "correct" with "incorrect" absent. Mirrors the
/// validator's own instruction vocabulary; anything else reads as a
/// rejection.
fn lexical_fallback(text: &str) -> ValidationVerdict {
    let lower = text.to_lowercase();
    let status = if lower.contains("correct") && !lower.contains("incorrect") {
        VerdictStatus::Correct
    } else {
        VerdictStatus::Incorrect
    };
    ValidationVerdict {
        status,
        confidence: 0.7,
        reason: "parsed from text response".to_string(),
    }
}

// ── Gemini REST wire types ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ValidatorConfig {
        ValidatorConfig {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_well_formed_correct_verdict() {
        let v = parse_verdict_text(
            r#"{"status": "correct", "confidence": 0.92, "reason": "helmet clearly absent"}"#,
        );
        assert_eq!(v.status, VerdictStatus::Correct);
        assert_eq!(v.confidence, 0.92);
        assert_eq!(v.reason, "helmet clearly absent");
    }

    #[test]
    fn test_well_formed_incorrect_verdict() {
        let v = parse_verdict_text(
            r#"{"status": "incorrect", "confidence": 0.8, "reason": "rider wears a helmet"}"#,
        );
        assert_eq!(v.status, VerdictStatus::Incorrect);
        assert_eq!(v.confidence, 0.8);
    }

    #[test]
    fn test_unknown_status_falls_through_to_lexical_fallback() {
        // "maybe" is not an allowed status; raw text contains "correct"
        // without "incorrect", so the fallback accepts at 0.7
        let v = parse_verdict_text(
            r#"{"status": "maybe", "confidence": 0.9, "reason": "looks correct"}"#,
        );
        assert_eq!(v.status, VerdictStatus::Correct);
        assert_eq!(v.confidence, 0.7);
    }

    #[test]
    fn test_out_of_range_confidence_falls_through() {
        let v = parse_verdict_text(
            r#"{"status": "incorrect", "confidence": 1.7, "reason": "x"}"#,
        );
        // fallback sees the token "incorrect" and rejects
        assert_eq!(v.status, VerdictStatus::Incorrect);
        assert_eq!(v.confidence, 0.7);
    }

    #[test]
    fn test_missing_field_falls_through() {
        let v = parse_verdict_text(r#"{"status": "correct"}"#);
        assert_eq!(v.status, VerdictStatus::Correct);
        assert_eq!(v.confidence, 0.7);
    }

    #[test]
    fn test_prose_response_with_correct_token() {
        let v = parse_verdict_text("I think this is CORRECT because the rider has no helmet.");
        assert_eq!(v.status, VerdictStatus::Correct);
        assert_eq!(v.confidence, 0.7);
        assert_eq!(v.reason, "parsed from text response");
    }

    #[test]
    fn test_prose_response_with_incorrect_token_rejects() {
        // "incorrect" contains "correct" as a substring; the incorrect
        // check must win
        let v = parse_verdict_text("This detection looks incorrect to me.");
        assert_eq!(v.status, VerdictStatus::Incorrect);
        assert_eq!(v.confidence, 0.7);
    }

    #[test]
    fn test_unrelated_prose_rejects() {
        let v = parse_verdict_text("I cannot tell what is in this image.");
        assert_eq!(v.status, VerdictStatus::Incorrect);
    }

    #[tokio::test]
    async fn test_unconfigured_gate_bypasses_with_full_confidence() {
        let gate = ValidationGate::with_api_key(&config(), None).unwrap();
        assert!(!gate.is_available());

        let v = gate.validate(Path::new("crops/whatever.jpg"), "no_helmet").await;
        assert_eq!(v.status, VerdictStatus::Correct);
        assert_eq!(v.confidence, 1.0);
        assert!(v.reason.contains("bypassed"));
    }

    #[tokio::test]
    async fn test_transport_error_fails_open_at_half_confidence() {
        // Artifact path does not exist, so the call errors before any
        // network I/O; the gate must still accept.
        let mut cfg = config();
        cfg.endpoint = "http://127.0.0.1:1".to_string();
        let gate = ValidationGate::with_api_key(&cfg, Some("test-key".to_string())).unwrap();

        let v = gate.validate(Path::new("no/such/artifact.jpg"), "no_helmet").await;
        assert_eq!(v.status, VerdictStatus::Correct);
        assert_eq!(v.confidence, 0.5);
        assert!(v.reason.contains("validation error"));
    }
}
