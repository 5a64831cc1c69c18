use super::*;
use crate::core::message::Message;
use crate::core::settings::{BuiltinProvider, NewCustomProvider};
use crate::core::store::{SpacesState, WELCOME_MESSAGE};
use crate::utils::test_utils::{BackendCall, ChatScript, MockBackend};

struct Fixture {
    backend: Arc<MockBackend>,
    store: Arc<SpacesStore>,
    settings: SettingsRegistry,
    dispatcher: ChatDispatcher,
    space_id: String,
    conversation_id: String,
}

impl Fixture {
    fn new(backend: MockBackend) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(SpacesStore::new(backend.clone()));
        let settings = SettingsRegistry::new(backend.clone());
        let dispatcher = ChatDispatcher::new(store.clone(), settings.clone(), backend.clone())
            .with_upload_ack_delay(Duration::ZERO);

        let space = store.create_space("Research");
        let conversation = store
            .create_conversation(&space.id, None)
            .expect("space exists");

        Self {
            backend,
            store,
            settings,
            dispatcher,
            space_id: space.id,
            conversation_id: conversation.id,
        }
    }

    fn messages(&self) -> Vec<Message> {
        self.store
            .conversation(&self.space_id, &self.conversation_id)
            .expect("conversation exists")
            .messages
    }

    fn chat_calls(&self) -> usize {
        self.backend
            .count(|call| matches!(call, BackendCall::Chat(_)))
    }

    async fn send(&self, content: &str, token: &str) -> SendOutcome {
        self.dispatcher
            .send(&self.space_id, &self.conversation_id, content, token)
            .await
    }
}

fn last_message<'a>(state: &'a SpacesState, space_id: &str, conversation_id: &str) -> Option<&'a Message> {
    state.conversation(space_id, conversation_id)?.last_message()
}

#[tokio::test]
async fn no_model_appends_guidance_without_network() {
    let fixture = Fixture::new(MockBackend::new());

    let outcome = fixture.send("hello?", "").await;

    assert_eq!(outcome, SendOutcome::NoModel);
    let messages = fixture.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].is_ai());
    assert_eq!(messages[1].content, NO_MODEL_MESSAGE);
    assert!(fixture.backend.calls().is_empty());
    assert!(!fixture.dispatcher.is_busy());
}

#[tokio::test]
async fn missing_key_names_provider_and_leaves_no_placeholder() {
    let fixture = Fixture::new(MockBackend::new());

    let outcome = fixture.send("hello?", "openai/gpt-4o").await;

    assert_eq!(
        outcome,
        SendOutcome::NoKey {
            provider: "openai".to_string()
        }
    );
    let messages = fixture.messages();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        [
            WELCOME_MESSAGE,
            "hello?",
            "Error: No API key found for openai. Please configure it in settings."
        ]
    );
    assert!(messages.iter().all(|m| !(m.is_ai() && m.content.is_empty())));
    assert_eq!(fixture.chat_calls(), 0);
}

#[tokio::test]
async fn streamed_chunks_fill_placeholder_in_arrival_order() {
    let (tx, rx) = mpsc::unbounded_channel();
    let fixture = Fixture::new(MockBackend::new().with_chat_script(ChatScript::Channel(rx)));
    fixture.settings.set_api_key(BuiltinProvider::OpenAi, "sk-open");
    let mut observer = fixture.store.subscribe();
    let (space_id, conversation_id) = (fixture.space_id.clone(), fixture.conversation_id.clone());

    let driver = async move {
        let mut observed = Vec::new();
        let mut expected = String::new();
        for chunk in ["Hel", "lo ", "world"] {
            tx.send(Ok(chunk.as_bytes().to_vec()))
                .expect("stream still open");
            expected.push_str(chunk);
            let _ = observer
                .wait_for(|state| {
                    last_message(state, &space_id, &conversation_id)
                        .is_some_and(|message| message.is_ai() && message.content == expected)
                })
                .await
                .expect("store alive");
            observed.push(expected.clone());
        }
        drop(tx);
        observed
    };

    let (outcome, observed) = tokio::join!(fixture.send("Say hello", "openai/gpt-4o"), driver);

    assert_eq!(observed, ["Hel", "Hello ", "Hello world"]);
    let SendOutcome::Completed { message_id } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    let messages = fixture.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].content, "Say hello");
    assert_eq!(messages[2].id, message_id);
    assert_eq!(messages[2].content, "Hello world");

    let requests = fixture.backend.chat_requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.provider, "openai");
    assert_eq!(request.model, "gpt-4o");
    assert_eq!(request.api_key, "sk-open");
    assert_eq!(request.base_url, None);
    assert_eq!(
        request.messages,
        vec![
            ChatMessage {
                role: Role::Ai,
                content: WELCOME_MESSAGE.to_string()
            },
            ChatMessage {
                role: Role::User,
                content: "Say hello".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn stream_events_report_each_chunk() {
    let fixture = Fixture::new(
        MockBackend::new().with_chat_script(ChatScript::text_chunks(&["a", "b"])),
    );
    fixture.settings.set_api_key(BuiltinProvider::Groq, "gsk");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = fixture
        .dispatcher
        .send_with_events(&fixture.space_id, &fixture.conversation_id, "hi", "groq/llama", tx)
        .await;
    assert!(matches!(outcome, SendOutcome::Completed { .. }));

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events,
        [
            StreamMessage::Chunk("a".to_string()),
            StreamMessage::Chunk("b".to_string()),
            StreamMessage::End
        ]
    );
}

#[tokio::test]
async fn multibyte_characters_split_across_chunks_are_preserved() {
    let fixture = Fixture::new(MockBackend::new().with_chat_script(ChatScript::Chunks(vec![
        Ok(b"caf\xC3".to_vec()),
        Ok(b"\xA9!".to_vec()),
    ])));
    fixture.settings.set_api_key(BuiltinProvider::Google, "g-key");

    let outcome = fixture.send("coffee?", "google/gemini-pro").await;

    assert!(matches!(outcome, SendOutcome::Completed { .. }));
    assert_eq!(fixture.messages()[2].content, "café!");
}

#[tokio::test]
async fn transport_failure_keeps_partial_text_and_appends_error() {
    let fixture = Fixture::new(MockBackend::new().with_chat_script(ChatScript::Chunks(vec![
        Ok(b"partial ".to_vec()),
        Err(BackendError::Transport("connection reset".to_string())),
    ])));
    fixture.settings.set_api_key(BuiltinProvider::OpenAi, "sk-open");

    let outcome = fixture.send("hi", "openai/gpt-4o").await;

    let messages = fixture.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2].content, "partial ");
    assert_eq!(messages[3].content, "Error: connection reset");
    assert!(messages[3].is_ai());
    assert_eq!(
        outcome,
        SendOutcome::Failed {
            message_id: messages[2].id.clone(),
            error: "Error: connection reset".to_string(),
        }
    );
    assert!(!fixture.dispatcher.is_busy());
}

#[tokio::test]
async fn non_success_status_is_reported_verbatim() {
    let fixture =
        Fixture::new(MockBackend::new().with_chat_script(ChatScript::status(500, "model overloaded")));
    fixture.settings.set_api_key(BuiltinProvider::OpenAi, "sk-open");

    let outcome = fixture.send("hi", "openai/gpt-4o").await;

    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    let messages = fixture.messages();
    assert_eq!(messages[2].content, "");
    assert_eq!(
        messages[3].content,
        "Error: Failed to send message: 500 - model overloaded"
    );
}

#[tokio::test]
async fn missing_body_maps_to_readable_error() {
    let fixture = Fixture::new(
        MockBackend::new().with_chat_script(ChatScript::Reject(BackendError::MissingBody)),
    );
    fixture.settings.set_api_key(BuiltinProvider::OpenAi, "sk-open");

    fixture.send("hi", "openai/gpt-4o").await;

    assert_eq!(
        fixture.messages().last().map(|m| m.content.clone()),
        Some("Error: No response body".to_string())
    );
}

#[tokio::test]
async fn custom_provider_tokens_send_base_url() {
    let fixture = Fixture::new(
        MockBackend::new().with_chat_script(ChatScript::text_chunks(&["ok"])),
    );
    let provider_id = fixture.settings.add_custom_provider(NewCustomProvider {
        name: "Local".to_string(),
        base_url: "http://localhost:1234/v1".to_string(),
        api_key: "local-key".to_string(),
        models: vec!["llama".to_string()],
    });

    let outcome = fixture
        .send("hi", &format!("custom/{provider_id}/llama"))
        .await;

    assert!(matches!(outcome, SendOutcome::Completed { .. }));
    let request = &fixture.backend.chat_requests()[0];
    assert_eq!(request.provider, "custom");
    assert_eq!(request.model, "llama");
    assert_eq!(request.api_key, "local-key");
    assert_eq!(request.base_url.as_deref(), Some("http://localhost:1234/v1"));
}

#[tokio::test]
async fn sends_are_rejected_while_a_stream_is_in_flight() {
    let (tx, rx) = mpsc::unbounded_channel();
    let fixture = Fixture::new(MockBackend::new().with_chat_script(ChatScript::Channel(rx)));
    fixture.settings.set_api_key(BuiltinProvider::OpenAi, "sk-open");
    let mut observer = fixture.store.subscribe();

    let interloper = async {
        let _ = observer
            .wait_for(|state| {
                last_message(state, &fixture.space_id, &fixture.conversation_id)
                    .is_some_and(|message| message.is_ai() && message.content.is_empty())
            })
            .await
            .expect("store alive");
        assert!(fixture.dispatcher.is_busy());
        let second = fixture.send("second", "openai/gpt-4o").await;
        drop(tx);
        second
    };

    let (first, second) = tokio::join!(fixture.send("first", "openai/gpt-4o"), interloper);

    assert_eq!(second, SendOutcome::Busy);
    assert!(matches!(first, SendOutcome::Completed { .. }));
    assert_eq!(fixture.chat_calls(), 1);
    assert!(!fixture.dispatcher.is_busy());
}

#[tokio::test]
async fn unknown_conversation_is_reported() {
    let fixture = Fixture::new(MockBackend::new());
    let outcome = fixture
        .dispatcher
        .send(&fixture.space_id, "missing", "hi", "openai/gpt-4o")
        .await;
    assert_eq!(outcome, SendOutcome::NoConversation);
}

#[tokio::test]
async fn upload_records_documents_and_posts_summary_and_ack() {
    let fixture = Fixture::new(MockBackend::new().fail_upload("draft.pdf"));
    let files = vec![
        UploadFile::new("notes.txt", "text/plain", vec![0; 2048]).into_knowledge_base(),
        UploadFile::new("draft.pdf", "application/pdf", vec![1; 10]),
    ];

    let outcome = fixture
        .dispatcher
        .upload_files(&fixture.space_id, &fixture.conversation_id, files)
        .await;

    assert_eq!(
        outcome,
        UploadOutcome::Done(UploadReport {
            uploaded: vec!["notes.txt".to_string()],
            failed: vec!["draft.pdf".to_string()],
            knowledge_base: 1,
        })
    );

    let space = fixture.store.space(&fixture.space_id).expect("space exists");
    assert_eq!(space.documents.len(), 1);
    assert_eq!(space.documents[0].name, "notes.txt");
    assert_eq!(space.documents[0].size, "2.0 KB");

    let messages = fixture.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[1].is_user());
    assert_eq!(messages[1].content, "Uploaded 2 file(s): notes.txt, draft.pdf");
    let attachments = messages[1].attachments.as_ref().expect("attachments");
    assert_eq!(attachments.len(), 2);
    assert_eq!(attachments[0].size, 2048);
    assert_eq!(attachments[1].mime_type, "application/pdf");
    assert_eq!(
        messages[2].content,
        "I've received your files. 1 file(s) have been added to the Research knowledge base."
    );

    let uploads: Vec<BackendCall> = fixture
        .backend
        .calls()
        .into_iter()
        .filter(|call| matches!(call, BackendCall::Upload { .. }))
        .collect();
    assert_eq!(
        uploads,
        vec![
            BackendCall::Upload {
                file_name: "notes.txt".to_string(),
                space_id: fixture.space_id.clone(),
                chat_id: Some(fixture.conversation_id.clone()),
                add_to_space: true,
            },
            BackendCall::Upload {
                file_name: "draft.pdf".to_string(),
                space_id: fixture.space_id.clone(),
                chat_id: Some(fixture.conversation_id.clone()),
                add_to_space: false,
            },
        ]
    );
}

#[tokio::test]
async fn chat_local_uploads_are_acknowledged_as_such() {
    let fixture = Fixture::new(MockBackend::new());
    let files = vec![UploadFile::new("img.png", "image/png", vec![7; 3])];

    fixture
        .dispatcher
        .upload_files(&fixture.space_id, &fixture.conversation_id, files)
        .await;

    assert!(fixture
        .store
        .space(&fixture.space_id)
        .expect("space exists")
        .documents
        .is_empty());
    assert_eq!(
        fixture.messages().last().map(|m| m.content.clone()),
        Some("I've received your files. These files are available in this chat context.".to_string())
    );
}
