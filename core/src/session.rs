use crate::api::{Backend, ChatRequest, RawCitation, RawMessage};
use crate::export::{self, ExportFormat};
use crate::notify::{NotificationCenter, Severity};
use crate::store::{self, CredentialStore};
use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which chat surface a controller drives. The document surface is scoped
/// to a project and receives its session id from project selection; the
/// wikipedia surface provisions its own session and persists the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Document,
    Wikipedia,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    fn from_wire(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Self::User
        } else {
            Self::Assistant
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Citation {
    Document { file_name: String, page_number: i64 },
    Wiki { url: String, id: Option<i64> },
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Default)]
struct Inner {
    session_id: Option<String>,
    messages: Vec<ChatMessage>,
    file_names: Vec<String>,
    input_disabled: bool,
}

/// Owns one conversation: the newest-first message list, the session id,
/// and the send gate. Failures surface as notifications and always return
/// the controller to a usable state.
#[derive(Clone)]
pub struct ChatController {
    surface: Surface,
    backend: Arc<dyn Backend>,
    notifier: NotificationCenter,
    store: CredentialStore,
    inner: Arc<RwLock<Inner>>,
}

impl ChatController {
    pub fn new(
        surface: Surface,
        backend: Arc<dyn Backend>,
        notifier: NotificationCenter,
        store: CredentialStore,
    ) -> Self {
        Self {
            surface,
            backend,
            notifier,
            store,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.read().session_id.clone()
    }

    /// Newest-first snapshot of the conversation.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.read().messages.clone()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.inner.read().file_names.clone()
    }

    pub fn input_disabled(&self) -> bool {
        self.inner.read().input_disabled
    }

    pub fn set_session(&self, session_id: impl Into<String>) {
        self.inner.write().session_id = Some(session_id.into());
    }

    /// Document surface entry point: resolve a project into its session and
    /// member files, then load the history.
    pub async fn open_project(&self, project_id: i64) -> Result<()> {
        match self.backend.get_project(project_id).await {
            Ok(details) => match details.session_id {
                Some(session_id) => {
                    {
                        let mut inner = self.inner.write();
                        inner.session_id = Some(session_id);
                        inner.file_names = details.file_names;
                    }
                    self.load_history().await?;
                }
                None => {
                    self.notifier.pop(Severity::Error, "Project not found.");
                }
            },
            Err(err) => {
                tracing::warn!(%err, project_id, "project lookup failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to retrieve project details. Please try again.",
                );
            }
        }
        Ok(())
    }

    /// Wikipedia surface entry point: reuse the persisted session id, or
    /// provision one and persist it for the next run.
    pub async fn ensure_session(&self) -> Result<()> {
        if let Some(stored) = self.store.get(store::SESSION_ID) {
            self.inner.write().session_id = Some(stored);
            return Ok(());
        }
        match self.backend.create_session().await {
            Ok(created) => {
                self.store.set(store::SESSION_ID, &created.session_id)?;
                self.inner.write().session_id = Some(created.session_id);
            }
            Err(err) => {
                tracing::warn!(%err, "session provisioning failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to create session. Please try again.",
                );
            }
        }
        Ok(())
    }

    /// Replace the in-memory list with the server history, reversed so the
    /// newest message renders first. On failure the prior list stays.
    pub async fn load_history(&self) -> Result<()> {
        let Some(session_id) = self.session_id() else {
            self.notifier.pop(
                Severity::Error,
                "Session ID is missing. Cannot retrieve messages.",
            );
            return Ok(());
        };
        match self.backend.session_messages(&session_id).await {
            Ok(history) if !history.messages.is_empty() => {
                let mut mapped: Vec<ChatMessage> = history
                    .messages
                    .iter()
                    .map(|message| self.map_message(message))
                    .collect();
                mapped.reverse();
                self.inner.write().messages = mapped;
            }
            Ok(_) => {
                self.notifier
                    .pop(Severity::Error, "No messages found for this session.");
            }
            Err(err) => {
                tracing::warn!(%err, "history fetch failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to retrieve messages. Please try again.",
                );
            }
        }
        Ok(())
    }

    /// Optimistically prepend the user's entry, then ask the backend for a
    /// reply. The user entry stays visible even when the reply fails; only
    /// the send gate is unwound.
    pub async fn send_message(&self, input: &str) -> Result<()> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(());
        }
        let Some(session_id) = self.session_id() else {
            self.notifier.pop(
                Severity::Error,
                "Session ID is missing. Cannot send message.",
            );
            return Ok(());
        };
        {
            let mut inner = self.inner.write();
            if inner.input_disabled {
                return Ok(());
            }
            inner.input_disabled = true;
            inner.messages.insert(
                0,
                ChatMessage {
                    role: MessageRole::User,
                    text: text.to_string(),
                    citations: Vec::new(),
                },
            );
        }

        let request = ChatRequest {
            session_id,
            question: text.to_string(),
        };
        let result = match self.surface {
            Surface::Document => self.backend.document_chat(&request).await,
            Surface::Wikipedia => self.backend.wikipedia_chat(&request).await,
        };
        match result {
            Ok(reply) if !reply.answer.trim().is_empty() => {
                let raw = match self.surface {
                    Surface::Document => &reply.citation_info,
                    Surface::Wikipedia => &reply.wiki_citations,
                };
                let citations = self.map_citations(raw);
                self.inner.write().messages.insert(
                    0,
                    ChatMessage {
                        role: MessageRole::Assistant,
                        text: reply.answer,
                        citations,
                    },
                );
            }
            Ok(_) => {
                self.notifier
                    .pop(Severity::Error, "No response from the assistant.");
            }
            Err(err) => {
                tracing::warn!(%err, "chat send failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to send message. Please try again.",
                );
            }
        }
        self.inner.write().input_disabled = false;
        Ok(())
    }

    /// Re-fetch the full history and write `chat_history_<session>.<ext>`
    /// into `out_dir`. Returns the written path, or `None` when the export
    /// was refused (missing session, empty history, fetch failure).
    pub async fn export_transcript(
        &self,
        format: ExportFormat,
        out_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let Some(session_id) = self.session_id() else {
            self.notifier.pop(
                Severity::Error,
                "Session ID is missing. Cannot export chat.",
            );
            return Ok(None);
        };
        let history = match self.backend.session_messages(&session_id).await {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(%err, "export fetch failed");
                self.notifier.pop(
                    Severity::Error,
                    "Failed to export messages. Please try again.",
                );
                return Ok(None);
            }
        };
        if history.messages.is_empty() {
            self.notifier
                .pop(Severity::Error, "No messages found to export.");
            return Ok(None);
        }

        let path = out_dir.join(export::transcript_file_name(&session_id, format));
        let bytes = match format {
            ExportFormat::Text => export::render_text(self.surface, &history.messages).into_bytes(),
            ExportFormat::Pdf => export::render_pdf(self.surface, &history.messages),
        };
        std::fs::write(&path, bytes)?;
        Ok(Some(path))
    }

    fn map_message(&self, message: &RawMessage) -> ChatMessage {
        ChatMessage {
            role: MessageRole::from_wire(&message.role),
            text: message.content.clone(),
            citations: self.map_citations(&message.citation_info),
        }
    }

    fn map_citations(&self, raw: &[RawCitation]) -> Vec<Citation> {
        raw.iter()
            .map(|citation| match self.surface {
                Surface::Document => Citation::Document {
                    file_name: citation.file_name.clone(),
                    page_number: citation.page_number.unwrap_or(0),
                },
                // The wire reuses `file_name` for the source url.
                Surface::Wikipedia => Citation::Wiki {
                    url: citation.file_name.clone(),
                    id: citation.id,
                },
            })
            .collect()
    }
}
