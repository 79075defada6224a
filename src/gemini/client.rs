use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::types::{
    Content, FileMetadata, FileResource, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, StartUploadRequest, UploadFileResponse,
};
use super::{GenerationRequest, RemoteError, RemoteFile, RemoteMediaService};
use crate::config::GeminiConfig;
use crate::media::MediaFormat;

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const FALLBACK_MIME: &str = "application/octet-stream";

/// Gemini REST binding for the three remote operations
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    activation_timeout: Duration,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Default Gemini API host
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    /// Create a client. Fails when the key is blank or the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, config: &GeminiConfig) -> anyhow::Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key cannot be empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            activation_timeout: Duration::from_secs(config.activation_timeout_secs),
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, path)
    }

    /// Pass successful responses through, turn everything else into an API error
    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_error_body(status.as_u16(), &body))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::error_for_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| RemoteError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Open a resumable upload session and return its upload URL
    async fn start_upload(
        &self,
        display_name: &str,
        mime_type: &str,
        content_length: usize,
    ) -> Result<String, RemoteError> {
        let response = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", content_length.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&StartUploadRequest {
                file: FileMetadata {
                    display_name: display_name.to_string(),
                },
            })
            .send()
            .await?;

        let response = Self::error_for_status(response).await?;

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| RemoteError::InvalidResponse("Upload session returned no upload URL".to_string()))
    }

    async fn get_file(&self, name: &str) -> Result<FileResource, RemoteError> {
        let response = self
            .client
            .get(self.api_url(name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        Self::read_json(response).await
    }

    /// Poll until the service has finished processing the file
    async fn wait_until_active(&self, mut file: FileResource) -> Result<FileResource, RemoteError> {
        let start_time = Instant::now();
        let mut check_count = 0u64;

        while file.is_processing() {
            check_count += 1;

            // Back off from 2s up to 10s between checks
            let wait_time = Duration::from_secs(std::cmp::min(2 * check_count, 10));
            if start_time.elapsed() + wait_time > self.activation_timeout {
                return Err(RemoteError::FileProcessing(format!(
                    "{} still processing after {}s",
                    file.name,
                    start_time.elapsed().as_secs()
                )));
            }

            tracing::debug!(
                "Remote file {} processing ({}s elapsed, check #{})",
                file.name,
                start_time.elapsed().as_secs(),
                check_count
            );
            sleep(wait_time).await;

            file = self.get_file(&file.name).await?;
        }

        if file.is_failed() {
            return Err(RemoteError::FileProcessing(file.failure_message()));
        }

        Ok(file)
    }
}

#[async_trait]
impl RemoteMediaService for GeminiClient {
    async fn upload(&self, path: &Path) -> Result<RemoteFile, RemoteError> {
        let mime_type = MediaFormat::from_path(path)
            .map(|format| format.mime_type())
            .unwrap_or(FALLBACK_MIME);

        let content = tokio::fs::read(path)
            .await
            .map_err(|e| RemoteError::Io(format!("{}: {}", path.display(), e)))?;

        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        tracing::debug!(
            "Uploading {} ({} bytes, {}) to Gemini Files API",
            display_name,
            content.len(),
            mime_type
        );

        let upload_url = self.start_upload(&display_name, mime_type, content.len()).await?;

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(content)
            .send()
            .await?;

        let uploaded: UploadFileResponse = Self::read_json(response).await?;
        let name = uploaded.file.name.clone();

        // The file exists remotely from here on. Any failure before a handle
        // reaches the caller has to remove it here.
        let activated = self
            .wait_until_active(uploaded.file)
            .await
            .and_then(|file| file.into_remote_file(mime_type));

        match activated {
            Ok(remote_file) => Ok(remote_file),
            Err(err) => {
                if let Err(delete_err) = self.delete(&name).await {
                    tracing::warn!(
                        "Could not delete remote file {} after failed upload: {}",
                        name,
                        delete_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, RemoteError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(&request.prompt), Part::file(&request.file)],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(&request.system_instruction)],
            }),
            generation_config: Some(GenerationConfig {
                temperature: request.temperature,
            }),
        };

        let url = self.api_url(&format!("models/{}:generateContent", request.model));

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;

        let response: GenerateContentResponse = Self::read_json(response).await?;
        response.into_text()
    }

    async fn delete(&self, name: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.api_url(name))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        Self::error_for_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        extract::State,
        http::{header, HeaderMap, Method, StatusCode, Uri},
        response::{IntoResponse, Response},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct Recorded {
        method: Method,
        path: String,
        headers: HeaderMap,
        body: Bytes,
    }

    /// In-process stand-in for the Gemini REST endpoints
    struct FakeGemini {
        finalized: Value,
        polls: Mutex<VecDeque<Value>>,
        generate: (StatusCode, Value),
        delete_status: StatusCode,
        requests: Mutex<Vec<Recorded>>,
    }

    impl FakeGemini {
        fn new(finalized: Value) -> Self {
            Self {
                finalized,
                polls: Mutex::new(VecDeque::new()),
                generate: (StatusCode::OK, json!({})),
                delete_status: StatusCode::OK,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn with_polls(self, polls: Vec<Value>) -> Self {
            *self.polls.lock().unwrap() = polls.into();
            self
        }

        fn with_generate(mut self, status: StatusCode, body: Value) -> Self {
            self.generate = (status, body);
            self
        }

        fn with_delete_status(mut self, status: StatusCode) -> Self {
            self.delete_status = status;
            self
        }

        fn requests_matching(&self, method: Method, prefix: &str) -> Vec<(HeaderMap, Bytes, String)> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.path.starts_with(prefix))
                .map(|r| (r.headers.clone(), r.body.clone(), r.path.clone()))
                .collect()
        }
    }

    async fn handle(
        State(fake): State<Arc<FakeGemini>>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let path = uri.path().to_string();
        fake.requests.lock().unwrap().push(Recorded {
            method: method.clone(),
            path: path.clone(),
            headers: headers.clone(),
            body,
        });

        match (method.as_str(), path.as_str()) {
            ("POST", "/upload/v1beta/files") => {
                let host = headers
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (
                    [(UPLOAD_URL_HEADER, format!("http://{host}/upload-session/1"))],
                    Json(json!({})),
                )
                    .into_response()
            }
            ("POST", "/upload-session/1") => Json(json!({ "file": fake.finalized.clone() })).into_response(),
            ("GET", p) if p.starts_with("/v1beta/files/") => {
                let next = fake.polls.lock().unwrap().pop_front();
                Json(next.unwrap_or_else(|| fake.finalized.clone())).into_response()
            }
            ("DELETE", p) if p.starts_with("/v1beta/files/") => {
                (fake.delete_status, Json(json!({}))).into_response()
            }
            ("POST", p) if p.starts_with("/v1beta/models/") => {
                let (status, body) = fake.generate.clone();
                (status, Json(body)).into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn start(fake: FakeGemini, activation_timeout_secs: u64) -> (Arc<FakeGemini>, GeminiClient) {
        let fake = Arc::new(fake);
        let app = Router::new().fallback(handle).with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let config = GeminiConfig {
            base_url: format!("http://{addr}"),
            request_timeout_secs: 10,
            activation_timeout_secs,
            ..GeminiConfig::default()
        };
        (fake, GeminiClient::new("test-key", &config).unwrap())
    }

    fn file(state: &str) -> Value {
        json!({
            "name": "files/n",
            "uri": "https://generativelanguage.test/v1beta/files/n",
            "mimeType": "audio/mpeg",
            "state": state,
        })
    }

    fn staged_mp3(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("media_1234abcd_talk.mp3");
        std::fs::write(&path, b"ID3 fake audio").unwrap();
        path
    }

    fn generation_request() -> GenerationRequest {
        GenerationRequest {
            model: "gemini-2.5-flash".to_string(),
            system_instruction: "Transcribe then summarize.".to_string(),
            prompt: "Analyze this file.".to_string(),
            file: RemoteFile {
                name: "files/n".to_string(),
                uri: "https://generativelanguage.test/v1beta/files/n".to_string(),
                mime_type: "audio/mpeg".to_string(),
            },
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_upload_uses_resumable_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let path = staged_mp3(&dir);
        let (fake, client) = start(FakeGemini::new(file("ACTIVE")), 30).await;

        let remote = client.upload(&path).await.unwrap();

        assert_eq!(remote.name, "files/n");
        assert_eq!(remote.uri, "https://generativelanguage.test/v1beta/files/n");
        assert_eq!(remote.mime_type, "audio/mpeg");

        let starts = fake.requests_matching(Method::POST, "/upload/v1beta/files");
        assert_eq!(starts.len(), 1);
        let (headers, body, _) = &starts[0];
        assert_eq!(headers[API_KEY_HEADER], "test-key");
        assert_eq!(headers["x-goog-upload-protocol"], "resumable");
        assert_eq!(headers["x-goog-upload-command"], "start");
        assert_eq!(headers["x-goog-upload-header-content-length"], "14");
        assert_eq!(headers["x-goog-upload-header-content-type"], "audio/mpeg");
        let metadata: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(metadata["file"]["display_name"], "media_1234abcd_talk.mp3");

        let finalizes = fake.requests_matching(Method::POST, "/upload-session/");
        assert_eq!(finalizes.len(), 1);
        let (headers, body, _) = &finalizes[0];
        assert_eq!(headers["x-goog-upload-command"], "upload, finalize");
        assert_eq!(headers["x-goog-upload-offset"], "0");
        assert_eq!(&body[..], b"ID3 fake audio");

        assert!(fake.requests_matching(Method::DELETE, "/").is_empty());
    }

    #[tokio::test]
    async fn test_upload_polls_until_active() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, client) = start(
            FakeGemini::new(file("PROCESSING")).with_polls(vec![file("ACTIVE")]),
            30,
        )
        .await;

        let remote = client.upload(&staged_mp3(&dir)).await.unwrap();

        assert_eq!(remote.name, "files/n");
        let polls = fake.requests_matching(Method::GET, "/v1beta/files/n");
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0].0[API_KEY_HEADER], "test-key");
        assert!(fake.requests_matching(Method::DELETE, "/").is_empty());
    }

    #[tokio::test]
    async fn test_failed_processing_deletes_remote_file() {
        let dir = tempfile::tempdir().unwrap();
        let failed = json!({
            "name": "files/n",
            "state": "FAILED",
            "error": { "message": "unsupported codec" },
        });
        let (fake, client) = start(
            FakeGemini::new(file("PROCESSING")).with_polls(vec![failed]),
            30,
        )
        .await;

        let err = client.upload(&staged_mp3(&dir)).await.unwrap_err();

        assert!(matches!(err, RemoteError::FileProcessing(ref m) if m == "unsupported codec"));
        let deletes = fake.requests_matching(Method::DELETE, "/v1beta/files/n");
        assert_eq!(deletes.len(), 1);
    }

    #[tokio::test]
    async fn test_processing_timeout_deletes_remote_file() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, client) = start(FakeGemini::new(file("PROCESSING")), 1).await;

        let err = client.upload(&staged_mp3(&dir)).await.unwrap_err();

        assert!(matches!(err, RemoteError::FileProcessing(ref m) if m.contains("still processing")));
        assert!(fake.requests_matching(Method::GET, "/v1beta/files/").is_empty());
        assert_eq!(fake.requests_matching(Method::DELETE, "/v1beta/files/n").len(), 1);
    }

    #[tokio::test]
    async fn test_stored_file_without_uri_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let (fake, client) = start(
            FakeGemini::new(json!({ "name": "files/n", "state": "ACTIVE" })),
            30,
        )
        .await;

        let err = client.upload(&staged_mp3(&dir)).await.unwrap_err();

        assert!(matches!(err, RemoteError::InvalidResponse(ref m) if m.contains("has no URI")));
        assert_eq!(fake.requests_matching(Method::DELETE, "/v1beta/files/n").len(), 1);
    }

    #[tokio::test]
    async fn test_generate_sends_prompt_with_file_reference() {
        let reply = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "## Transcript\nhello" }] },
                "finishReason": "STOP",
            }]
        });
        let (fake, client) = start(
            FakeGemini::new(file("ACTIVE")).with_generate(StatusCode::OK, reply),
            30,
        )
        .await;

        let text = client.generate(&generation_request()).await.unwrap();
        assert_eq!(text, "## Transcript\nhello");

        let calls = fake.requests_matching(Method::POST, "/v1beta/models/");
        assert_eq!(calls.len(), 1);
        let (headers, body, path) = &calls[0];
        assert_eq!(path, "/v1beta/models/gemini-2.5-flash:generateContent");
        assert_eq!(headers[API_KEY_HEADER], "test-key");

        let sent: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(sent["contents"][0]["role"], "user");
        assert_eq!(sent["contents"][0]["parts"][0]["text"], "Analyze this file.");
        assert_eq!(
            sent["contents"][0]["parts"][1]["fileData"]["fileUri"],
            "https://generativelanguage.test/v1beta/files/n"
        );
        assert_eq!(sent["contents"][0]["parts"][1]["fileData"]["mimeType"], "audio/mpeg");
        assert_eq!(
            sent["systemInstruction"]["parts"][0]["text"],
            "Transcribe then summarize."
        );
        assert_eq!(sent["generationConfig"]["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_error_envelope_on_failed_response() {
        let envelope = json!({
            "error": {
                "code": 429,
                "message": "Resource has been exhausted",
                "status": "RESOURCE_EXHAUSTED",
            }
        });
        let (_fake, client) = start(
            FakeGemini::new(file("ACTIVE")).with_generate(StatusCode::TOO_MANY_REQUESTS, envelope),
            30,
        )
        .await;

        let err = client.generate(&generation_request()).await.unwrap_err();

        match err {
            RemoteError::Api { status, code, message } => {
                assert_eq!(status, 429);
                assert_eq!(code, "RESOURCE_EXHAUSTED");
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_targets_file_resource() {
        let (fake, client) = start(FakeGemini::new(file("ACTIVE")), 30).await;

        client.delete("files/n").await.unwrap();

        let deletes = fake.requests_matching(Method::DELETE, "/v1beta/files/n");
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].0[API_KEY_HEADER], "test-key");
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported() {
        let (_fake, client) = start(
            FakeGemini::new(file("ACTIVE")).with_delete_status(StatusCode::NOT_FOUND),
            30,
        )
        .await;

        let err = client.delete("files/gone").await.unwrap_err();

        assert!(matches!(err, RemoteError::Api { status: 404, .. }));
    }

    #[test]
    fn test_rejects_blank_api_key() {
        assert!(GeminiClient::new("   ", &GeminiConfig::default()).is_err());
    }

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let config = GeminiConfig {
            base_url: "http://localhost:9000/".to_string(),
            ..GeminiConfig::default()
        };
        let client = GeminiClient::new("key", &config).unwrap();

        assert_eq!(client.api_url("files/abc"), "http://localhost:9000/v1beta/files/abc");
        assert_eq!(
            client.api_url("models/gemini-2.5-flash:generateContent"),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
