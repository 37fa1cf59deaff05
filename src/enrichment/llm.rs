//! LLM seam of the enrichment pipeline.
//!
//! The engine treats the model as an untrusted JSON producer: a single
//! strict verdict shape, code fences tolerated, everything else is a
//! failure that falls back to the deterministic baseline.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LLM_TIMEOUT: Duration = Duration::from_secs(60);

pub const SYSTEM_PROMPT: &str = r#"Ты — AI-аналитик службы поддержки банка. Анализируй клиентские обращения и возвращай ТОЛЬКО JSON без markdown.

Формат ответа (строго JSON):
{
  "type": "тип обращения: Жалоба | Претензия | Консультация | Неработоспособность | Смена данных | Спам",
  "sentiment": "Позитивный | Негативный | Нейтральный",
  "priority_1_10": число от 1 до 10,
  "lang": "RU | KZ | EN",
  "summary": "краткое резюме обращения в 1-2 предложениях",
  "recommended_actions": ["действие 1", "действие 2"],
  "geo_city": "город из текста или адреса если упоминается, иначе null",
  "confidence_type": число от 0.0 до 1.0,
  "confidence_sentiment": число от 0.0 до 1.0,
  "confidence_priority": число от 0.0 до 1.0
}

Типы обращений:
- Жалоба — выражение недовольства качеством обслуживания, без требования компенсации
- Претензия — недовольство + требование компенсации, возврата средств, официальная претензия
- Консультация — запрос информации, вопрос, нейтральное обращение
- Неработоспособность — технический сбой, ошибка в приложении/системе, что-то не работает
- Смена данных — запрос на изменение личных данных, реквизитов, адреса, ФИО
- Спам — нежелательная корреспонденция, реклама, мошенничество

Правила:
- VIP и Priority клиенты автоматически получают приоритет >= 7
- Жалобы и Претензии — приоритет >= 6, Претензии >= 8
- Спам — приоритет 1
- Неработоспособность — приоритет >= 6
- Если клиент упоминает город — укажи в geo_city
- recommended_actions — конкретные действия для менеджера (2-4 пункта)
- summary — на русском языке"#;

/// The overlay produced by the model. Every key is required; a response
/// missing any of them counts as an LLM failure.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmVerdict {
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub sentiment: String,
    pub priority_1_10: i32,
    pub lang: String,
    pub summary: String,
    pub recommended_actions: Vec<String>,
    pub geo_city: Option<String>,
    pub confidence_type: f64,
    pub confidence_sentiment: f64,
    pub confidence_priority: f64,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Classify a ticket, optionally with attached images.
    async fn classify(&self, user_message: &str, image_paths: &[PathBuf]) -> Result<LlmVerdict>;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_url,
            api_key,
            model,
        }
    }

    fn user_content(&self, user_message: &str, image_paths: &[PathBuf]) -> Value {
        if image_paths.is_empty() {
            return json!(user_message);
        }

        let mut parts = vec![json!({
            "type": "text",
            "text": format!(
                "{}\n\nВНИМАНИЕ: К обращению приложены изображения. Проанализируй их содержимое и учти при классификации. Если на изображении видна ошибка/скриншот проблемы — тип 'Неработоспособность'. Если документ — учти контекст.",
                user_message
            ),
        })];

        for path in image_paths {
            match load_image_data_uri(path) {
                Ok(uri) => parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": uri },
                })),
                Err(e) => warn!("failed to load image {:?}, skipping: {}", path, e),
            }
        }

        Value::Array(parts)
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn classify(&self, user_message: &str, image_paths: &[PathBuf]) -> Result<LlmVerdict> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": self.user_content(user_message, image_paths) },
            ],
            "max_tokens": 1000,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("llm http request")?;

        let status = response.status();
        let text = response.text().await.context("llm response body")?;

        if !status.is_success() {
            bail!("llm api status {}: {}", status, text);
        }

        let parsed: Value = serde_json::from_str(&text).context("parse llm envelope")?;
        if let Some(message) = parsed["error"]["message"].as_str() {
            bail!("llm error: {}", message);
        }

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("no choices in llm response"))?;

        parse_verdict(content)
    }
}

/// Parse the model's text body into a verdict: strip code fences and
/// clamp the priority into [1, 10].
pub fn parse_verdict(content: &str) -> Result<LlmVerdict> {
    let stripped = strip_code_fences(content);
    let mut verdict: LlmVerdict = serde_json::from_str(stripped.trim())
        .with_context(|| format!("parse llm verdict json (raw: {})", stripped))?;
    verdict.priority_1_10 = verdict.priority_1_10.clamp(1, 10);
    Ok(verdict)
}

/// Remove a ```json ... ``` (or plain ```) wrapper if the model added one.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn load_image_data_uri(path: &Path) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("read image {:?}", path))?;

    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

/// Attachment filenames are a comma-separated list; keep the ones that
/// look like images and actually exist under the images directory.
pub fn resolve_image_paths(attachments: Option<&str>, images_dir: &str) -> Vec<PathBuf> {
    let Some(attachments) = attachments else {
        return Vec::new();
    };
    if attachments.is_empty() || images_dir.is_empty() {
        return Vec::new();
    }

    const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

    attachments
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|name| Path::new(images_dir).join(name))
        .filter(|path| path.exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERDICT_JSON: &str = r#"{
        "type": "Претензия",
        "sentiment": "Негативный",
        "priority_1_10": 9,
        "lang": "RU",
        "summary": "Клиент требует компенсацию",
        "recommended_actions": ["Связаться с клиентом"],
        "geo_city": "Алматы",
        "confidence_type": 0.9,
        "confidence_sentiment": 0.8,
        "confidence_priority": 0.85
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let v = parse_verdict(VERDICT_JSON).unwrap();
        assert_eq!(v.ticket_type, "Претензия");
        assert_eq!(v.priority_1_10, 9);
        assert_eq!(v.geo_city.as_deref(), Some("Алматы"));
    }

    #[test]
    fn test_parse_fenced_json() {
        let fenced = format!("```json\n{}\n```", VERDICT_JSON);
        let v = parse_verdict(&fenced).unwrap();
        assert_eq!(v.ticket_type, "Претензия");

        let fenced = format!("```\n{}\n```", VERDICT_JSON);
        assert!(parse_verdict(&fenced).is_ok());
    }

    #[test]
    fn test_priority_clamped() {
        let raw = VERDICT_JSON.replace("\"priority_1_10\": 9", "\"priority_1_10\": 42");
        assert_eq!(parse_verdict(&raw).unwrap().priority_1_10, 10);

        let raw = VERDICT_JSON.replace("\"priority_1_10\": 9", "\"priority_1_10\": -3");
        assert_eq!(parse_verdict(&raw).unwrap().priority_1_10, 1);
    }

    #[test]
    fn test_missing_field_is_failure() {
        let raw = VERDICT_JSON.replace("\"sentiment\": \"Негативный\",", "");
        assert!(parse_verdict(&raw).is_err());
    }

    #[test]
    fn test_null_geo_city_allowed() {
        let raw = VERDICT_JSON.replace("\"geo_city\": \"Алматы\"", "\"geo_city\": null");
        let v = parse_verdict(&raw).unwrap();
        assert!(v.geo_city.is_none());
    }

    #[test]
    fn test_non_json_is_failure() {
        assert!(parse_verdict("I am sorry, I cannot help with that.").is_err());
    }

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("{}"), "{}");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }

    #[test]
    fn test_resolve_image_paths_filters_non_images() {
        let paths = resolve_image_paths(Some("a.pdf, b.docx"), "/tmp");
        assert!(paths.is_empty());
        assert!(resolve_image_paths(None, "/tmp").is_empty());
        assert!(resolve_image_paths(Some("a.png"), "").is_empty());
    }
}
