use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Client for the Ollama chat API, bound to a single model.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: Url,
    model: String,
}

impl OllamaClient {
    /// Creates a new client. `base_url` must end with a `/` for joins to resolve.
    pub fn new(model: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one single-message, non-streaming chat request and returns the raw reply text.
    ///
    /// No retries happen here; callers decide what a failure means.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = self.base_url.join("api/chat")?;
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self.http.post(url).json(&request).send().await?;
        let reply: ChatResponse = parse_json(response).await?;
        Ok(reply.message.map(|message| message.content).unwrap_or_default())
    }

    /// Lists the locally available models; used as a startup reachability probe.
    pub async fn health(&self) -> Result<Vec<String>, GenerationError> {
        let url = self.base_url.join("api/tags")?;
        let response = self.http.get(url).send().await?;
        let tags: TagsResponse = parse_json(response).await?;
        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Errors produced by the generation client.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, GenerationError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(GenerationError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> OllamaClient {
        OllamaClient::new(
            "llama3.2",
            Url::parse(&server.url("/")).expect("url"),
            Client::builder().build().expect("client"),
        )
    }

    #[tokio::test]
    async fn generate_posts_single_message() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat").json_body(json!({
                    "model": "llama3.2",
                    "messages": [{"role": "user", "content": "Describe 75400"}],
                    "stream": false
                }));
                then.status(200).json_body(json!({
                    "model": "llama3.2",
                    "message": {"role": "assistant", "content": "{\"description\":\"x\"}"},
                    "done": true
                }));
            })
            .await;

        let text = client(&server)
            .generate("Describe 75400")
            .await
            .expect("generate");
        mock.assert_async().await;
        assert_eq!(text, "{\"description\":\"x\"}");
    }

    #[tokio::test]
    async fn missing_message_yields_empty_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(200).json_body(json!({"done": true}));
            })
            .await;

        let text = client(&server).generate("prompt").await.expect("generate");
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/chat");
                then.status(500).body("model not loaded");
            })
            .await;

        let err = client(&server)
            .generate("prompt")
            .await
            .expect_err("should error");
        match err {
            GenerationError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn health_lists_models() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200).json_body(json!({
                    "models": [{"name": "llama3.2:latest", "size": 1}]
                }));
            })
            .await;

        let models = client(&server).health().await.expect("health");
        assert_eq!(models, vec!["llama3.2:latest".to_string()]);
    }
}
