use crate::analytics::{mean, total_rows};
use crate::error::{ArgusError, Result};
use crate::models::{CyberIncident, DatasetMetadata, ItTicket};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "web")]
use crate::app::SharedState;
#[cfg(feature = "web")]
use crate::config::Config;
#[cfg(feature = "web")]
use crate::login::{CurrentUser, clear_chat_history, push_chat_message, validate_session};
#[cfg(feature = "web")]
use crate::models::Page;
#[cfg(feature = "web")]
use crate::records::{load_cyber_incidents, load_datasets_metadata, load_it_tickets};
#[cfg(feature = "web")]
use axum::{
    Extension, Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use log::{error, info, warn};
#[cfg(feature = "web")]
use std::time::Duration;

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One entry of the assistant chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub content: String,
}

impl ChatMessage {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        ChatMessage {
            speaker,
            content: content.into(),
        }
    }
}

/// Summary of the platform data handed to the model with every question
pub fn build_data_context(
    incidents: &[CyberIncident],
    datasets: &[DatasetMetadata],
    tickets: &[ItTicket],
) -> String {
    let open_incidents = incidents.iter().filter(|i| i.status == "Open").count();
    let critical = incidents.iter().filter(|i| i.severity == "Critical").count();
    let phishing = incidents.iter().filter(|i| i.category == "Phishing").count();
    let open_tickets = tickets.iter().filter(|t| t.status == "Open").count();
    let resolution: Vec<f64> = tickets.iter().filter_map(|t| t.resolution_time_hours).collect();
    let avg = match mean(&resolution) {
        Some(hours) => format!("{:.1}", hours),
        None => "n/a".to_string(),
    };

    format!(
        "Here is the current data from the platform:

CYBERSECURITY:
- Total incidents: {}
- Open incidents: {}
- Critical incidents: {}
- Phishing incidents: {}

DATASETS:
- Total datasets: {}
- Total rows: {}

IT TICKETS:
- Total tickets: {}
- Open tickets: {}
- Average resolution time: {} hours",
        incidents.len(),
        open_incidents,
        critical,
        phishing,
        datasets.len(),
        total_rows(datasets),
        tickets.len(),
        open_tickets,
        avg
    )
}

/// Full prompt: data context, the question and the answering instruction
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "{}\n\nUser question: {}\n\nPlease provide a helpful response based on the data above.",
        context, question
    )
}

/// Pull the reply text out of a `generateContent` response body
///
/// The text parts of the first candidate are concatenated.
pub fn extract_text(body: &str) -> Result<String> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| ArgusError::Assistant(format!("malformed response: {}", e)))?;

    if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
        return Err(ArgusError::Assistant(format!("prompt blocked: {}", reason)));
    }

    let text: String = json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        Err(ArgusError::Assistant("response contained no text".into()))
    } else {
        Ok(text)
    }
}

/// Message of an API error body, or the raw body when it is not JSON
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Client for the Gemini `generateContent` endpoint
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

#[cfg(feature = "web")]
impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.as_str(),
            config.gemini_base_url.as_str(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Send one prompt and return the generated text
    ///
    /// # Errors
    /// * `Assistant` when no API key is configured, the API answers with a
    ///   non-success status or the response holds no text
    /// * `Http` when the request itself fails; the URL, which carries the
    ///   key, is stripped from the error
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ArgusError::Assistant("GEMINI_API_KEY is not set".into()))?;

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| ArgusError::Http(e.without_url()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ArgusError::Http(e.without_url()))?;
        if !status.is_success() {
            return Err(ArgusError::Assistant(format!(
                "API returned status {}: {}",
                status,
                api_error_message(&text)
            )));
        }

        extract_text(&text)
    }
}

/// Chat form data
#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub message: String,
}

/// Read all three tables and summarise them
///
/// The store lock is released before the summary is built.
#[cfg(feature = "web")]
fn current_context(state: &SharedState) -> Result<String> {
    let (incidents, datasets, tickets) = {
        let mut db = state.database()?;
        (
            load_cyber_incidents(&mut db, &state.seeds)?,
            load_datasets_metadata(&mut db, &state.seeds)?,
            load_it_tickets(&mut db, &state.seeds)?,
        )
    };
    Ok(build_data_context(&incidents, &datasets, &tickets))
}

/// Serve the chat page with the session's history
#[cfg(feature = "web")]
pub async fn serve_assistant(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Response {
    let history = validate_session(&user.session_id)
        .map(|session| session.chat_history)
        .unwrap_or_default();

    let mut data = state.frame(&user, Page::Assistant);
    data["messages"] = serde_json::json!(history);
    data["configured"] = serde_json::json!(state.assistant.is_configured());
    data["model"] = serde_json::json!(state.assistant.model());
    state.render("assistant", &data)
}

/// Answer a chat message
///
/// Failures are shown in the chat as `Error: <message>` in place of a reply.
#[cfg(feature = "web")]
pub async fn handle_chat(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Form(form): Form<ChatForm>,
) -> Response {
    let question = form.message.trim();
    if question.is_empty() {
        return Redirect::to(Page::Assistant.path()).into_response();
    }
    push_chat_message(&user.session_id, ChatMessage::new(Speaker::User, question));

    let reply = match current_context(&state) {
        Ok(context) => {
            let prompt = build_prompt(&context, question);
            match state.assistant.generate(&prompt).await {
                Ok(text) => {
                    info!("assistant answered {} ({} chars)", user.username, text.len());
                    text
                }
                Err(e) => {
                    warn!("assistant request for {} failed: {}", user.username, e);
                    format!("Error: {}", e)
                }
            }
        }
        Err(e) => {
            error!("building assistant context failed: {}", e);
            format!("Error: {}", e)
        }
    };

    push_chat_message(&user.session_id, ChatMessage::new(Speaker::Assistant, reply));
    Redirect::to(Page::Assistant.path()).into_response()
}

/// Empty the session's chat history
#[cfg(feature = "web")]
pub async fn handle_clear(Extension(user): Extension<CurrentUser>) -> Redirect {
    clear_chat_history(&user.session_id);
    Redirect::to(Page::Assistant.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incidents() -> Vec<CyberIncident> {
        let make = |id, severity: &str, category: &str, status: &str| CyberIncident {
            incident_id: id,
            timestamp: "2024-11-01 09:00:00".into(),
            severity: severity.into(),
            category: category.into(),
            status: status.into(),
            description: None,
        };
        vec![
            make(1, "Critical", "Phishing", "Open"),
            make(2, "High", "Phishing", "Resolved"),
            make(3, "Critical", "Malware", "In Progress"),
        ]
    }

    fn tickets(hours: [Option<f64>; 2]) -> Vec<ItTicket> {
        hours
            .iter()
            .enumerate()
            .map(|(i, h)| ItTicket {
                ticket_id: i as i64 + 1,
                priority: "Low".into(),
                description: "d".into(),
                status: if i == 0 { "Open".into() } else { "Resolved".into() },
                assigned_to: "IT_Support_A".into(),
                created_at: "2024-11-01 09:00:00".into(),
                resolution_time_hours: *h,
            })
            .collect()
    }

    #[test]
    fn context_has_the_exact_layout() {
        let datasets = vec![DatasetMetadata {
            dataset_id: 1,
            name: "sales".into(),
            rows: 1500,
            columns: 4,
            uploaded_by: "data_scientist".into(),
            upload_date: "2024-10-01".into(),
        }];
        let context = build_data_context(&incidents(), &datasets, &tickets([Some(3.0), Some(5.0)]));

        assert_eq!(
            context,
            "Here is the current data from the platform:\n\
             \n\
             CYBERSECURITY:\n\
             - Total incidents: 3\n\
             - Open incidents: 1\n\
             - Critical incidents: 2\n\
             - Phishing incidents: 2\n\
             \n\
             DATASETS:\n\
             - Total datasets: 1\n\
             - Total rows: 1500\n\
             \n\
             IT TICKETS:\n\
             - Total tickets: 2\n\
             - Open tickets: 1\n\
             - Average resolution time: 4.0 hours"
        );
    }

    #[test]
    fn context_without_resolution_times() {
        let context = build_data_context(&[], &[], &tickets([None, None]));
        assert!(context.contains("- Total incidents: 0\n"));
        assert!(context.ends_with("- Average resolution time: n/a hours"));
    }

    #[test]
    fn context_row_total_saturates() {
        let huge = |id| DatasetMetadata {
            dataset_id: id,
            name: "huge".into(),
            rows: i64::MAX,
            columns: 1,
            uploaded_by: "it_admin".into(),
            upload_date: "2024-10-01".into(),
        };
        let context = build_data_context(&[], &[huge(1), huge(2)], &[]);
        assert!(context.contains(&format!("- Total rows: {}\n", i64::MAX)));
    }

    #[test]
    fn prompt_wraps_the_question() {
        let prompt = build_prompt("CTX", "How many open tickets?");
        assert_eq!(
            prompt,
            "CTX\n\nUser question: How many open tickets?\n\n\
             Please provide a helpful response based on the data above."
        );
    }

    #[test]
    fn reply_text_is_joined_from_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"There are "},{"text":"2 open tickets."}],"role":"model"}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "There are 2 open tickets.");
    }

    #[test]
    fn unusable_replies_are_errors() {
        for body in [
            "not json",
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"content":{"parts":[]}}]}"#,
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#,
        ] {
            assert!(matches!(extract_text(body), Err(ArgusError::Assistant(_))), "{}", body);
        }
    }

    #[test]
    fn api_errors_surface_their_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid.");
        assert_eq!(api_error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[cfg(feature = "web")]
    mod client {
        use super::super::*;
        use axum::{
            Json, Router,
            extract::{Path, Query},
            http::StatusCode,
            routing::post,
        };
        use std::collections::HashMap;

        async fn fake_generate(
            Path(rest): Path<String>,
            Query(query): Query<HashMap<String, String>>,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            if query.get("key").map(String::as_str) != Some("test-key") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": {"message": "API key not valid."}})),
                );
            }
            let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or("");
            let reply = format!("{} | {}", rest, prompt);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "candidates": [{ "content": { "parts": [{ "text": reply }] } }]
                })),
            )
        }

        async fn fake_server() -> String {
            let app = Router::new().route("/v1beta/models/*rest", post(fake_generate));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}", addr)
        }

        #[tokio::test]
        async fn missing_key_is_reported_without_a_request() {
            let client = GeminiClient::new(None, "gemini-2.5-flash", "http://127.0.0.1:9").unwrap();
            assert!(!client.is_configured());
            let err = client.generate("hi").await.unwrap_err();
            assert!(err.to_string().contains("GEMINI_API_KEY"));
        }

        #[tokio::test]
        async fn generate_posts_the_prompt() {
            let base = fake_server().await;
            let client =
                GeminiClient::new(Some("test-key".into()), "gemini-test", base.as_str()).unwrap();

            let reply = client.generate("hello").await.unwrap();
            assert!(reply.ends_with("gemini-test:generateContent | hello"), "{}", reply);
        }

        #[tokio::test]
        async fn rejected_key_is_an_assistant_error() {
            let base = fake_server().await;
            let client =
                GeminiClient::new(Some("wrong".into()), "gemini-test", base.as_str()).unwrap();

            match client.generate("hello").await {
                Err(ArgusError::Assistant(msg)) => {
                    assert!(msg.contains("400"));
                    assert!(msg.contains("API key not valid."));
                }
                other => panic!("unexpected result {:?}", other),
            }
        }
    }
}
