//! HTTP collaborators for the command router
//!
//! - [`HttpExecutor`]: `POST {command}` to the execution endpoint, expecting
//!   `{output}` on success and `{error}` otherwise.
//! - [`ChatTranslator`]: chat-completion request asking for a single shell
//!   command, returning `choices[0].message.content`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::router::{CommandExecutor, CommandTranslator, RouteError, EXECUTION_FAILED};

/// Fallback message when the translation endpoint gives no reason
pub const TRANSLATION_FAILED: &str = "Failed to process input";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI coding assistant. Convert natural language to shell commands. Only respond with the command prefixed with $, no explanations.";

fn build_client(timeout: Duration) -> Result<Client, RouteError> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| RouteError::Network(format!("failed to build HTTP client: {e}")))
}

fn network_error(error: reqwest::Error) -> RouteError {
    if error.is_timeout() {
        RouteError::Network("Request timed out".to_string())
    } else {
        RouteError::Network(format!("Request failed: {error}"))
    }
}

/// Message from an `error` field that is either a string or `{message}`
fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(message) => Some(message.clone()),
        Value::Object(object) => object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Status and parsed JSON body; an unparsable body becomes `Value::Null`
async fn send(request: reqwest::RequestBuilder) -> Result<(reqwest::StatusCode, Value), RouteError> {
    let response = request.send().await.map_err(network_error)?;
    let status = response.status();
    let body = response.text().await.map_err(network_error)?;
    let value = serde_json::from_str(&body).unwrap_or(Value::Null);
    Ok((status, value))
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    command: &'a str,
}

/// Client for the remote execution endpoint
pub struct HttpExecutor {
    client: Client,
    url: String,
}

impl HttpExecutor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RouteError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CommandExecutor for HttpExecutor {
    async fn execute(&self, command: &str) -> Result<String, RouteError> {
        debug!("POST {} command={:?}", self.url, command);
        let request = self.client.post(&self.url).json(&ExecuteRequest { command });
        let (status, body) = send(request).await?;

        if !status.is_success() {
            return Err(RouteError::Server {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| EXECUTION_FAILED.to_string()),
            });
        }

        body.get("output")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RouteError::Protocol(error_message(&body).unwrap_or_else(|| EXECUTION_FAILED.to_string()))
            })
    }
}

/// Settings for [`ChatTranslator`]
#[derive(Clone, Debug)]
pub struct ChatSettings {
    pub endpoint: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

/// Natural-language translator backed by a chat-completion endpoint
pub struct ChatTranslator {
    client: Client,
    settings: ChatSettings,
}

impl ChatTranslator {
    pub fn new(settings: ChatSettings) -> Result<Self, RouteError> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            settings,
        })
    }
}

#[async_trait]
impl CommandTranslator for ChatTranslator {
    async fn translate(&self, input: &str) -> Result<String, RouteError> {
        let settings = &self.settings;
        let payload = ChatRequest {
            model: &settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &settings.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };

        debug!("POST {} model={}", settings.endpoint, settings.model);
        let mut request = self.client.post(&settings.endpoint).json(&payload);
        if let Some(key) = &settings.api_key {
            request = request.bearer_auth(key);
        }
        let (status, body) = send(request).await?;

        let reason = || error_message(&body).unwrap_or_else(|| TRANSLATION_FAILED.to_string());
        if !status.is_success() {
            return Err(RouteError::Server {
                status: status.as_u16(),
                message: reason(),
            });
        }

        let parsed: ChatResponse =
            serde_json::from_value(body.clone()).map_err(|_| RouteError::Protocol(reason()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| RouteError::Protocol(reason()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(server: &MockServer) -> HttpExecutor {
        HttpExecutor::new(format!("{}/api/terminal", server.uri()), Duration::from_secs(5))
            .expect("client")
    }

    fn translator(server: &MockServer, api_key: Option<&str>) -> ChatTranslator {
        ChatTranslator::new(ChatSettings {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            model: "test-model".to_string(),
            system_prompt: "sys".to_string(),
            temperature: Some(0.5),
            max_tokens: None,
            api_key: api_key.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[tokio::test]
    async fn test_execute_returns_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/terminal"))
            .and(body_json(json!({ "command": "ls" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": "file1\nfile2" })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(executor(&server).execute("ls").await, Ok("file1\nfile2".to_string()));
    }

    #[tokio::test]
    async fn test_execute_surfaces_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "disk full" })))
            .mount(&server)
            .await;

        assert_eq!(
            executor(&server).execute("df").await,
            Err(RouteError::Server {
                status: 500,
                message: "disk full".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_execute_falls_back_to_generic_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let err = executor(&server).execute("ls").await.unwrap_err();
        assert_eq!(err.to_string(), EXECUTION_FAILED);
    }

    #[tokio::test]
    async fn test_execute_rejects_body_without_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "?" })))
            .mount(&server)
            .await;

        assert_eq!(
            executor(&server).execute("ls").await,
            Err(RouteError::Protocol(EXECUTION_FAILED.to_string()))
        );
    }

    #[tokio::test]
    async fn test_execute_reports_unreachable_endpoint() {
        // Reserve a free port, then release it so nothing is listening there
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let url = format!("http://127.0.0.1:{}/api/terminal", port);

        let err = HttpExecutor::new(url, Duration::from_secs(2))
            .expect("client")
            .execute("ls")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network");
    }

    #[tokio::test]
    async fn test_translate_sends_chat_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header_matcher("authorization", "Bearer secret"))
            .and(body_json(json!({
                "model": "test-model",
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "list files" }
                ],
                "temperature": 0.5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": " $ ls -la \n" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            translator(&server, Some("secret")).translate("list files").await,
            Ok("$ ls -la".to_string())
        );
    }

    #[tokio::test]
    async fn test_translate_reads_nested_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "error": { "message": "invalid api key" } })),
            )
            .mount(&server)
            .await;

        let err = translator(&server, None).translate("x").await.unwrap_err();
        assert_eq!(err.to_string(), "invalid api key");
    }

    #[tokio::test]
    async fn test_translate_without_choices_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        assert_eq!(
            translator(&server, None).translate("x").await,
            Err(RouteError::Protocol(TRANSLATION_FAILED.to_string()))
        );
    }
}
