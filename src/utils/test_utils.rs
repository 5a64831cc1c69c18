use crate::api::{
    Backend, BackendError, ChatByteStream, ChatRequest, ListModelsRequest, UploadRequest,
};
use crate::core::settings::{ApiKeys, AvailableModels, CustomProvider};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One recorded call against [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Chat(ChatRequest),
    Upload {
        file_name: String,
        space_id: String,
        chat_id: Option<String>,
        add_to_space: bool,
    },
    SaveKeys(ApiKeys),
    LoadKeys,
    SaveProviders(Vec<CustomProvider>),
    LoadProviders,
    ListModels(ListModelsRequest),
    DeleteChat {
        space_id: String,
        conversation_id: String,
    },
    DeleteSpace(String),
}

/// Scripted reply for one chat call.
pub enum ChatScript {
    /// Yield each chunk in order, then end the stream.
    Chunks(Vec<Result<Vec<u8>, BackendError>>),
    /// Fail before any bytes are produced.
    Reject(BackendError),
    /// Yield whatever the test pushes, ending when the sender is dropped.
    Channel(mpsc::UnboundedReceiver<Result<Vec<u8>, BackendError>>),
}

impl ChatScript {
    pub fn text_chunks(chunks: &[&str]) -> Self {
        ChatScript::Chunks(
            chunks
                .iter()
                .map(|chunk| Ok(chunk.as_bytes().to_vec()))
                .collect(),
        )
    }

    pub fn status(status: u16, body: &str) -> Self {
        ChatScript::Reject(BackendError::Status {
            status,
            body: body.to_string(),
        })
    }
}

/// Scripted [`Backend`] that records every call.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    chat_scripts: Mutex<VecDeque<ChatScript>>,
    models: Mutex<VecDeque<Result<AvailableModels, String>>>,
    stored_keys: Mutex<ApiKeys>,
    stored_providers: Mutex<Vec<CustomProvider>>,
    failing_uploads: Mutex<HashSet<String>>,
    fail_deletes: AtomicBool,
    fail_loads: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chat_script(self, script: ChatScript) -> Self {
        self.push_chat_script(script);
        self
    }

    pub fn push_chat_script(&self, script: ChatScript) {
        self.chat_scripts
            .lock()
            .expect("chat script lock")
            .push_back(script);
    }

    /// Queue a model listing. Once the queue is drained every call returns
    /// an empty listing.
    pub fn push_models(&self, models: Result<AvailableModels, String>) {
        self.models.lock().expect("models lock").push_back(models);
    }

    pub fn with_stored_keys(self, keys: ApiKeys) -> Self {
        *self.stored_keys.lock().expect("keys lock") = keys;
        self
    }

    pub fn with_stored_providers(self, providers: Vec<CustomProvider>) -> Self {
        *self.stored_providers.lock().expect("providers lock") = providers;
        self
    }

    pub fn fail_upload(self, file_name: &str) -> Self {
        self.failing_uploads
            .lock()
            .expect("uploads lock")
            .insert(file_name.to_string());
        self
    }

    pub fn fail_deletes(self) -> Self {
        self.fail_deletes.store(true, Ordering::SeqCst);
        self
    }

    pub fn fail_loads(self) -> Self {
        self.fail_loads.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Chat(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn load_failure(&self) -> Result<(), BackendError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            Err(BackendError::Transport("load refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatByteStream, BackendError> {
        self.record(BackendCall::Chat(request.clone()));
        let script = self
            .chat_scripts
            .lock()
            .expect("chat script lock")
            .pop_front()
            .unwrap_or(ChatScript::Chunks(Vec::new()));

        match script {
            ChatScript::Chunks(chunks) => Ok(stream::iter(chunks).boxed()),
            ChatScript::Reject(err) => Err(err),
            ChatScript::Channel(receiver) => Ok(stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|item| (item, receiver))
            })
            .boxed()),
        }
    }

    async fn upload(&self, upload: UploadRequest) -> Result<(), BackendError> {
        self.record(BackendCall::Upload {
            file_name: upload.file_name.clone(),
            space_id: upload.space_id.clone(),
            chat_id: upload.chat_id.clone(),
            add_to_space: upload.add_to_space,
        });
        if self
            .failing_uploads
            .lock()
            .expect("uploads lock")
            .contains(&upload.file_name)
        {
            return Err(BackendError::Status {
                status: 500,
                body: "upload rejected".into(),
            });
        }
        Ok(())
    }

    async fn save_keys(&self, keys: &ApiKeys) -> Result<(), BackendError> {
        self.record(BackendCall::SaveKeys(keys.clone()));
        *self.stored_keys.lock().expect("keys lock") = keys.clone();
        Ok(())
    }

    async fn load_keys(&self) -> Result<ApiKeys, BackendError> {
        self.record(BackendCall::LoadKeys);
        self.load_failure()?;
        Ok(self.stored_keys.lock().expect("keys lock").clone())
    }

    async fn save_providers(&self, providers: &[CustomProvider]) -> Result<(), BackendError> {
        self.record(BackendCall::SaveProviders(providers.to_vec()));
        *self.stored_providers.lock().expect("providers lock") = providers.to_vec();
        Ok(())
    }

    async fn load_providers(&self) -> Result<Vec<CustomProvider>, BackendError> {
        self.record(BackendCall::LoadProviders);
        self.load_failure()?;
        Ok(self.stored_providers.lock().expect("providers lock").clone())
    }

    async fn list_models(
        &self,
        request: &ListModelsRequest,
    ) -> Result<AvailableModels, BackendError> {
        self.record(BackendCall::ListModels(request.clone()));
        let next = self.models.lock().expect("models lock").pop_front();
        match next {
            Some(Ok(models)) => Ok(models),
            Some(Err(message)) => Err(BackendError::Transport(message)),
            None => Ok(AvailableModels::default()),
        }
    }

    async fn delete_chat(
        &self,
        space_id: &str,
        conversation_id: &str,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::DeleteChat {
            space_id: space_id.to_string(),
            conversation_id: conversation_id.to_string(),
        });
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("delete timed out".into()));
        }
        Ok(())
    }

    async fn delete_space(&self, space_id: &str) -> Result<(), BackendError> {
        self.record(BackendCall::DeleteSpace(space_id.to_string()));
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("delete timed out".into()));
        }
        Ok(())
    }
}
