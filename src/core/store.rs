//! The Space / Conversation / Message graph.
//!
//! [`SpacesStore`] is the single state authority for rendering. State lives
//! inside a `watch` channel: every mutation is applied under the channel's
//! write lock and subscribers are notified before the operation returns.
//! Operations addressed at unknown ids change nothing and notify nobody.

use crate::api::Backend;
use crate::core::background::BackgroundTasks;
use crate::core::ids::next_id;
use crate::core::message::NewMessage;
use crate::core::space::{Conversation, Document, Space, SpaceType};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Chat";
pub const WELCOME_MESSAGE: &str = "New conversation started. How can I help?";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpacesState {
    pub spaces: Vec<Space>,
    pub active_space_id: Option<String>,
}

/// Conversations of one space matching a search query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchGroup<'a> {
    pub space: &'a Space,
    pub conversations: Vec<&'a Conversation>,
}

impl SpacesState {
    pub fn space(&self, id: &str) -> Option<&Space> {
        self.spaces.iter().find(|space| space.id == id)
    }

    fn space_mut(&mut self, id: &str) -> Option<&mut Space> {
        self.spaces.iter_mut().find(|space| space.id == id)
    }

    fn conversation_mut(&mut self, space_id: &str, conversation_id: &str) -> Option<&mut Conversation> {
        self.space_mut(space_id)?.conversation_mut(conversation_id)
    }

    pub fn active_space(&self) -> Option<&Space> {
        self.active_space_id.as_deref().and_then(|id| self.space(id))
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_space()?.active_conversation()
    }

    pub fn conversation(&self, space_id: &str, conversation_id: &str) -> Option<&Conversation> {
        self.space(space_id)?.conversation(conversation_id)
    }

    /// Case-insensitive match over titles and message contents. Spaces without
    /// hits are left out; a blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<SearchGroup<'_>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.spaces
            .iter()
            .filter_map(|space| {
                let conversations = space.search_conversations(&needle);
                (!conversations.is_empty()).then_some(SearchGroup {
                    space,
                    conversations,
                })
            })
            .collect()
    }
}

/// Trimmed title, or `None` when nothing is left. Callers check titles with
/// this before creating or renaming a conversation.
pub fn validate_title(input: &str) -> Option<String> {
    let title = input.trim();
    (!title.is_empty()).then(|| title.to_string())
}

pub struct SpacesStore {
    state: watch::Sender<SpacesState>,
    backend: Arc<dyn Backend>,
    tasks: BackgroundTasks,
}

impl SpacesStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (state, _) = watch::channel(SpacesState::default());
        Self {
            state,
            backend,
            tasks: BackgroundTasks::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SpacesState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SpacesState {
        self.state.borrow().clone()
    }

    /// Apply `op` to the state; observers are notified only when it reports
    /// an outcome.
    fn mutate<T>(&self, op: impl FnOnce(&mut SpacesState) -> Option<T>) -> Option<T> {
        let mut outcome = None;
        self.state.send_if_modified(|state| {
            outcome = op(state);
            outcome.is_some()
        });
        outcome
    }

    pub fn active_space(&self) -> Option<Space> {
        self.state.borrow().active_space().cloned()
    }

    pub fn active_conversation(&self) -> Option<Conversation> {
        self.state.borrow().active_conversation().cloned()
    }

    pub fn space(&self, id: &str) -> Option<Space> {
        self.state.borrow().space(id).cloned()
    }

    pub fn conversation(&self, space_id: &str, conversation_id: &str) -> Option<Conversation> {
        self.state
            .borrow()
            .conversation(space_id, conversation_id)
            .cloned()
    }

    /// Conversations in display order: pinned first, then most recent.
    pub fn conversations_display_order(&self, space_id: &str) -> Vec<Conversation> {
        self.state
            .borrow()
            .space(space_id)
            .map(|space| {
                space
                    .conversations_display_order()
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn recent_conversations(&self, space_id: &str, limit: usize) -> Vec<Conversation> {
        self.state
            .borrow()
            .space(space_id)
            .map(|space| {
                space
                    .recent_conversations(limit)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Owned variant of [`SpacesState::search`]: `(space id, space name,
    /// matching conversations)` per space with hits.
    pub fn search(&self, query: &str) -> Vec<(String, String, Vec<Conversation>)> {
        self.state
            .borrow()
            .search(query)
            .into_iter()
            .map(|group| {
                (
                    group.space.id.clone(),
                    group.space.name.clone(),
                    group.conversations.into_iter().cloned().collect(),
                )
            })
            .collect()
    }

    /// Append a new space and make it active.
    pub fn create_space(&self, name: &str) -> Space {
        let space = Space::new(next_id(), name);
        self.state.send_modify(|state| {
            state.spaces.push(space.clone());
            state.active_space_id = Some(space.id.clone());
        });
        info!(space_id = %space.id, "space created");
        space
    }

    /// Activate a space. Switching always lands on the space overview, so the
    /// target's active conversation is cleared.
    pub fn select_space(&self, id: &str) {
        self.mutate(|state| {
            let space = state.space_mut(id)?;
            space.active_conversation_id = None;
            state.active_space_id = Some(id.to_string());
            Some(())
        });
    }

    pub fn update_space_type(&self, id: &str, kind: SpaceType) -> bool {
        self.mutate(|state| {
            state.space_mut(id)?.kind = kind;
            Some(())
        })
        .is_some()
    }

    /// Documents are not de-duplicated by name.
    pub fn add_document_to_space(&self, space_id: &str, document: Document) -> bool {
        self.mutate(|state| {
            state.space_mut(space_id)?.documents.push(document);
            Some(())
        })
        .is_some()
    }

    /// Create a conversation seeded with a welcome message, put it at the
    /// front of the space's list, and make it active. `None` titles use
    /// [`DEFAULT_CONVERSATION_TITLE`].
    pub fn create_conversation(&self, space_id: &str, title: Option<&str>) -> Option<Conversation> {
        let created = self.mutate(|state| {
            let space = state.space_mut(space_id)?;
            let id = next_id();
            let now = Utc::now();
            let welcome = NewMessage::ai(WELCOME_MESSAGE).into_message(format!("{id}_init"), now);
            let conversation = Conversation {
                id: id.clone(),
                title: title.unwrap_or(DEFAULT_CONVERSATION_TITLE).to_string(),
                created_at: now,
                is_pinned: false,
                messages: vec![welcome],
            };
            space.conversations.insert(0, conversation.clone());
            space.active_conversation_id = Some(id);
            Some(conversation)
        });

        if let Some(conversation) = &created {
            info!(space_id, conversation_id = %conversation.id, "conversation created");
        }
        created
    }

    /// Silently ignores ids that do not exist in the space.
    pub fn select_conversation(&self, space_id: &str, conversation_id: &str) {
        self.mutate(|state| {
            let space = state.space_mut(space_id)?;
            space.conversation(conversation_id)?;
            space.active_conversation_id = Some(conversation_id.to_string());
            Some(())
        });
    }

    /// Stamp and append a message. Returns its id for later content updates.
    pub fn add_message_to_conversation(
        &self,
        space_id: &str,
        conversation_id: &str,
        message: NewMessage,
    ) -> Option<String> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(space_id, conversation_id)?;
            let id = next_id();
            conversation
                .messages
                .push(message.into_message(id.clone(), Utc::now()));
            Some(id)
        })
    }

    /// Replace the content of exactly one message. Called once per streamed
    /// chunk with the full accumulated text. Returns whether anything changed.
    pub fn update_message_content(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
        content: &str,
    ) -> bool {
        self.mutate(|state| {
            let message = state
                .conversation_mut(space_id, conversation_id)?
                .message_mut(message_id)?;
            if message.content == content {
                return None;
            }
            message.content.clear();
            message.content.push_str(content);
            Some(())
        })
        .is_some()
    }

    /// Remove a conversation locally and tell the backend in the background.
    /// An active conversation hands over to the first remaining one.
    pub fn delete_conversation(&self, space_id: &str, conversation_id: &str) -> bool {
        let removed = self
            .mutate(|state| {
                let space = state.space_mut(space_id)?;
                let index = space
                    .conversations
                    .iter()
                    .position(|conversation| conversation.id == conversation_id)?;
                space.conversations.remove(index);
                if space.active_conversation_id.as_deref() == Some(conversation_id) {
                    space.active_conversation_id =
                        space.conversations.first().map(|conversation| conversation.id.clone());
                }
                Some(())
            })
            .is_some();

        if removed {
            debug!(space_id, conversation_id, "conversation deleted locally");
            let backend = Arc::clone(&self.backend);
            let (space_id, conversation_id) = (space_id.to_string(), conversation_id.to_string());
            self.tasks.spawn_best_effort("delete-chat", async move {
                backend.delete_chat(&space_id, &conversation_id).await
            });
        }
        removed
    }

    /// Remove a space locally and tell the backend in the background. An
    /// active space hands over to the first remaining one.
    pub fn delete_space(&self, space_id: &str) -> bool {
        let removed = self
            .mutate(|state| {
                let index = state.spaces.iter().position(|space| space.id == space_id)?;
                state.spaces.remove(index);
                if state.active_space_id.as_deref() == Some(space_id) {
                    state.active_space_id = state.spaces.first().map(|space| space.id.clone());
                }
                Some(())
            })
            .is_some();

        if removed {
            debug!(space_id, "space deleted locally");
            let backend = Arc::clone(&self.backend);
            let space_id = space_id.to_string();
            self.tasks.spawn_best_effort("delete-space", async move {
                backend.delete_space(&space_id).await
            });
        }
        removed
    }

    /// Flip the pin. Returns the new pinned state.
    pub fn toggle_pin(&self, space_id: &str, conversation_id: &str) -> Option<bool> {
        self.mutate(|state| {
            let conversation = state.conversation_mut(space_id, conversation_id)?;
            conversation.is_pinned = !conversation.is_pinned;
            Some(conversation.is_pinned)
        })
    }

    /// Replace the title as given; see [`validate_title`].
    pub fn rename_chat(&self, space_id: &str, conversation_id: &str, title: &str) -> bool {
        self.mutate(|state| {
            state.conversation_mut(space_id, conversation_id)?.title = title.to_string();
            Some(())
        })
        .is_some()
    }

    /// Wait for pending backend notifications.
    pub async fn wait_for_background(&self) {
        self.tasks.wait().await;
    }
}
