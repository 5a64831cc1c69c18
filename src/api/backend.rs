//! Transport to the inference backend.
//!
//! [`Backend`] has one method per backend endpoint so the stores and the
//! dispatcher can run against a test double. [`HttpBackend`] is the reqwest
//! implementation used by the binary.

use super::{ChatRequest, ListModelsRequest};
use crate::core::message::FilePayload;
use crate::core::settings::{ApiKeys, AvailableModels, CustomProvider};
use crate::utils::url::{construct_api_url, id_endpoint, DEFAULT_BACKEND_URL};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Reply body of `POST /api/chat`: raw text bytes in arrival order.
pub type ChatByteStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

#[derive(Debug)]
pub enum BackendError {
    /// Connection, timeout, or body decoding failure inside reqwest.
    Http(reqwest::Error),

    /// The backend answered with a non-success status.
    Status {
        status: u16,
        body: String,
    },

    /// The response carried no readable body.
    MissingBody,

    /// Transport failure reported by a non-HTTP backend implementation.
    Transport(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Http(err) => write!(f, "{err}"),
            BackendError::Status { status, body } => write!(f, "{status} - {body}"),
            BackendError::MissingBody => write!(f, "No response body"),
            BackendError::Transport(message) => write!(f, "{message}"),
        }
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BackendError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Http(err)
    }
}

/// One file of `POST /api/upload`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub mime_type: String,
    pub payload: FilePayload,
    pub space_id: String,
    pub chat_id: Option<String>,
    pub add_to_space: bool,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Open the streaming chat call. Status failures are reported before any
    /// bytes are yielded.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatByteStream, BackendError>;

    async fn upload(&self, upload: UploadRequest) -> Result<(), BackendError>;

    async fn save_keys(&self, keys: &ApiKeys) -> Result<(), BackendError>;

    async fn load_keys(&self) -> Result<ApiKeys, BackendError>;

    async fn save_providers(&self, providers: &[CustomProvider]) -> Result<(), BackendError>;

    async fn load_providers(&self) -> Result<Vec<CustomProvider>, BackendError>;

    async fn list_models(&self, request: &ListModelsRequest)
        -> Result<AvailableModels, BackendError>;

    async fn delete_chat(&self, space_id: &str, conversation_id: &str)
        -> Result<(), BackendError>;

    async fn delete_space(&self, space_id: &str) -> Result<(), BackendError>;
}

#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    request_timeout: Option<Duration>,
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BACKEND_URL)
    }
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            request_timeout: None,
        }
    }

    /// Bound every call except the chat stream, whose duration depends on
    /// the length of the reply.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        construct_api_url(&self.base_url, path)
    }

    fn bounded(&self, request: RequestBuilder) -> RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn check_status(response: Response) -> Result<Response, BackendError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        Err(BackendError::Status { status, body })
    }

    async fn send_expecting_success(&self, request: RequestBuilder) -> Result<(), BackendError> {
        let response = self.bounded(request).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatByteStream, BackendError> {
        debug!(provider = %request.provider, model = %request.model, turns = request.messages.len(), "opening chat stream");
        let response = self
            .client
            .post(self.endpoint("api/chat"))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(BackendError::from))
            .boxed())
    }

    async fn upload(&self, upload: UploadRequest) -> Result<(), BackendError> {
        let mut part =
            Part::bytes(upload.payload.as_bytes().to_vec()).file_name(upload.file_name.clone());
        if !upload.mime_type.is_empty() {
            part = part.mime_str(&upload.mime_type)?;
        }

        let mut form = Form::new()
            .part("file", part)
            .text("space_id", upload.space_id.clone());
        if let Some(chat_id) = upload.chat_id.clone() {
            form = form.text("chat_id", chat_id);
        }
        let form = form.text("add_to_space", upload.add_to_space.to_string());

        self.send_expecting_success(self.client.post(self.endpoint("api/upload")).multipart(form))
            .await
    }

    async fn save_keys(&self, keys: &ApiKeys) -> Result<(), BackendError> {
        self.send_expecting_success(self.client.post(self.endpoint("api/save-keys")).json(keys))
            .await
    }

    async fn load_keys(&self) -> Result<ApiKeys, BackendError> {
        let response = self
            .bounded(self.client.get(self.endpoint("api/load-keys")))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<ApiKeys>().await?)
    }

    async fn save_providers(&self, providers: &[CustomProvider]) -> Result<(), BackendError> {
        self.send_expecting_success(
            self.client
                .post(self.endpoint("api/save-providers"))
                .json(providers),
        )
        .await
    }

    async fn load_providers(&self) -> Result<Vec<CustomProvider>, BackendError> {
        let response = self
            .bounded(self.client.get(self.endpoint("api/load-providers")))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<Vec<CustomProvider>>().await?)
    }

    async fn list_models(
        &self,
        request: &ListModelsRequest,
    ) -> Result<AvailableModels, BackendError> {
        let response = self
            .bounded(self.client.post(self.endpoint("api/list-models")).json(request))
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json::<AvailableModels>().await?)
    }

    async fn delete_chat(
        &self,
        space_id: &str,
        conversation_id: &str,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&id_endpoint("api/chats", conversation_id));
        self.send_expecting_success(self.client.delete(url).query(&[("space_id", space_id)]))
            .await
    }

    async fn delete_space(&self, space_id: &str) -> Result<(), BackendError> {
        let url = self.endpoint(&id_endpoint("api/spaces", space_id));
        self.send_expecting_success(self.client.delete(url)).await
    }
}
