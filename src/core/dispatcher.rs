//! Turns user input into backend calls and streams replies into the store.
//!
//! A send walks `Resolving -> (NoModel | NoKey | Streaming) -> (Complete |
//! Failed)`. At most one send or upload runs at a time; overlapping requests
//! are rejected, never queued.

use crate::api::{Backend, BackendError, ChatMessage, ChatRequest, UploadRequest};
use crate::core::ids::next_id;
use crate::core::message::{Attachment, FilePayload, NewMessage, Role};
use crate::core::model_token::ModelToken;
use crate::core::settings::SettingsRegistry;
use crate::core::space::Document;
use crate::core::store::SpacesStore;
use crate::utils::utf8::Utf8ChunkDecoder;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const NO_MODEL_MESSAGE: &str =
    "Please select a model from the dropdown menu above to start chatting.";
pub const DEFAULT_UPLOAD_ACK_DELAY: Duration = Duration::from_millis(1000);

/// Progress of one streamed reply, for callers that render as text arrives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Another send or upload is in flight.
    Busy,
    /// The addressed conversation does not exist.
    NoConversation,
    /// No model was selected; guidance was appended.
    NoModel,
    /// The provider has no credential; an error message was appended.
    NoKey { provider: String },
    Completed { message_id: String },
    /// The reply failed. The placeholder keeps any partial text.
    Failed { message_id: String, error: String },
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub payload: FilePayload,
    pub add_to_knowledge_base: bool,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            payload: FilePayload::new(bytes),
            add_to_knowledge_base: false,
        }
    }

    pub fn into_knowledge_base(mut self) -> Self {
        self.add_to_knowledge_base = true;
        self
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Files the backend accepted.
    pub uploaded: Vec<String>,
    /// Files whose upload failed; they still appear in the transcript.
    pub failed: Vec<String>,
    /// Files registered as knowledge-base documents.
    pub knowledge_base: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Busy,
    NoConversation,
    Done(UploadReport),
}

pub fn no_key_message(provider: &str) -> String {
    format!("Error: No API key found for {provider}. Please configure it in settings.")
}

/// Transcript text for a failed send.
pub fn send_error_message(err: &BackendError) -> String {
    match err {
        BackendError::Status { .. } => format!("Error: Failed to send message: {err}"),
        _ => format!("Error: {err}"),
    }
}

pub fn upload_summary(names: &[&str]) -> String {
    format!("Uploaded {} file(s): {}", names.len(), names.join(", "))
}

pub fn upload_ack_message(knowledge_base: usize, space_name: &str) -> String {
    if knowledge_base > 0 {
        format!(
            "I've received your files. {knowledge_base} file(s) have been added to the {space_name} knowledge base."
        )
    } else {
        "I've received your files. These files are available in this chat context.".to_string()
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatDispatcher {
    store: Arc<SpacesStore>,
    settings: SettingsRegistry,
    backend: Arc<dyn Backend>,
    busy: AtomicBool,
    upload_ack_delay: Duration,
}

impl ChatDispatcher {
    pub fn new(
        store: Arc<SpacesStore>,
        settings: SettingsRegistry,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            store,
            settings,
            backend,
            busy: AtomicBool::new(false),
            upload_ack_delay: DEFAULT_UPLOAD_ACK_DELAY,
        }
    }

    pub fn with_upload_ack_delay(mut self, delay: Duration) -> Self {
        self.upload_ack_delay = delay;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    pub async fn send(
        &self,
        space_id: &str,
        conversation_id: &str,
        content: &str,
        model_token: &str,
    ) -> SendOutcome {
        self.send_inner(space_id, conversation_id, content, model_token, None)
            .await
    }

    /// Like [`ChatDispatcher::send`], also reporting each decoded chunk.
    pub async fn send_with_events(
        &self,
        space_id: &str,
        conversation_id: &str,
        content: &str,
        model_token: &str,
        events: mpsc::UnboundedSender<StreamMessage>,
    ) -> SendOutcome {
        self.send_inner(space_id, conversation_id, content, model_token, Some(&events))
            .await
    }

    async fn send_inner(
        &self,
        space_id: &str,
        conversation_id: &str,
        content: &str,
        model_token: &str,
        events: Option<&mpsc::UnboundedSender<StreamMessage>>,
    ) -> SendOutcome {
        let Some(_busy) = self.try_acquire() else {
            debug!(conversation_id, "send rejected while another request is in flight");
            return SendOutcome::Busy;
        };
        let Some(conversation) = self.store.conversation(space_id, conversation_id) else {
            return SendOutcome::NoConversation;
        };

        let append = |message: NewMessage| {
            self.store
                .add_message_to_conversation(space_id, conversation_id, message)
        };

        let Some(token) = ModelToken::parse(model_token) else {
            append(NewMessage::ai(NO_MODEL_MESSAGE));
            return SendOutcome::NoModel;
        };

        append(NewMessage::user(content));

        let resolved = self.settings.resolve_model(&token);
        if resolved.api_key.is_empty() {
            append(NewMessage::ai(no_key_message(&resolved.provider_label)));
            return SendOutcome::NoKey {
                provider: resolved.provider_label,
            };
        }

        let Some(placeholder) = append(NewMessage::ai("")) else {
            return SendOutcome::NoConversation;
        };

        let mut messages: Vec<ChatMessage> =
            conversation.messages.iter().map(ChatMessage::from).collect();
        messages.push(ChatMessage {
            role: Role::User,
            content: content.to_string(),
        });
        let request = ChatRequest {
            messages,
            provider: resolved.provider_name,
            model: resolved.model_name,
            api_key: resolved.api_key,
            base_url: resolved.base_url,
        };

        info!(
            conversation_id,
            provider = %request.provider,
            model = %request.model,
            "streaming reply"
        );

        match self
            .stream_reply(space_id, conversation_id, &placeholder, &request, events)
            .await
        {
            Ok(()) => {
                if let Some(events) = events {
                    let _ = events.send(StreamMessage::End);
                }
                SendOutcome::Completed {
                    message_id: placeholder,
                }
            }
            Err(err) => {
                warn!(conversation_id, error = %err, "chat stream failed");
                let error = send_error_message(&err);
                append(NewMessage::ai(error.clone()));
                if let Some(events) = events {
                    let _ = events.send(StreamMessage::Error(error.clone()));
                }
                SendOutcome::Failed {
                    message_id: placeholder,
                    error,
                }
            }
        }
    }

    async fn stream_reply(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
        request: &ChatRequest,
        events: Option<&mpsc::UnboundedSender<StreamMessage>>,
    ) -> Result<(), BackendError> {
        let mut stream = self.backend.chat(request).await?;
        let mut decoder = Utf8ChunkDecoder::new();
        let mut accumulated = String::new();

        let mut apply = |text: String| {
            if text.is_empty() {
                return;
            }
            accumulated.push_str(&text);
            self.store
                .update_message_content(space_id, conversation_id, message_id, &accumulated);
            if let Some(events) = events {
                let _ = events.send(StreamMessage::Chunk(text));
            }
        };

        while let Some(chunk) = stream.next().await {
            apply(decoder.decode(&chunk?));
        }
        apply(decoder.finish());
        Ok(())
    }

    /// Upload files one by one, record knowledge-base files as documents,
    /// post a summary message, then an acknowledgement after a short delay.
    pub async fn upload_files(
        &self,
        space_id: &str,
        conversation_id: &str,
        files: Vec<UploadFile>,
    ) -> UploadOutcome {
        let Some(_busy) = self.try_acquire() else {
            return UploadOutcome::Busy;
        };
        let Some(space) = self.store.space(space_id) else {
            return UploadOutcome::NoConversation;
        };
        if space.conversation(conversation_id).is_none() {
            return UploadOutcome::NoConversation;
        }

        let mut report = UploadReport::default();
        for file in &files {
            let upload = UploadRequest {
                file_name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                payload: file.payload.clone(),
                space_id: space_id.to_string(),
                chat_id: Some(conversation_id.to_string()),
                add_to_space: file.add_to_knowledge_base,
            };
            match self.backend.upload(upload).await {
                Ok(()) => report.uploaded.push(file.name.clone()),
                Err(err) => {
                    warn!(file = %file.name, space_id, error = %err, "upload failed");
                    report.failed.push(file.name.clone());
                }
            }
        }

        for file in files.iter().filter(|file| file.add_to_knowledge_base) {
            self.store
                .add_document_to_space(space_id, Document::new(next_id(), &file.name, file.size()));
            report.knowledge_base += 1;
        }

        let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
        let attachments: Vec<Attachment> = files
            .iter()
            .map(|file| Attachment {
                id: next_id(),
                name: file.name.clone(),
                size: file.size(),
                mime_type: file.mime_type.clone(),
                payload: Some(file.payload.clone()),
            })
            .collect();
        self.store.add_message_to_conversation(
            space_id,
            conversation_id,
            NewMessage::user(upload_summary(&names)).with_attachments(attachments),
        );

        tokio::time::sleep(self.upload_ack_delay).await;

        self.store.add_message_to_conversation(
            space_id,
            conversation_id,
            NewMessage::ai(upload_ack_message(report.knowledge_base, &space.name)),
        );

        info!(
            space_id,
            uploaded = report.uploaded.len(),
            failed = report.failed.len(),
            knowledge_base = report.knowledge_base,
            "upload finished"
        );
        UploadOutcome::Done(report)
    }
}

#[cfg(test)]
mod tests;
