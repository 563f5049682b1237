use crate::store::{self, CredentialStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordReset {
    pub identifier: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiFile {
    pub file_id: i64,
    pub file_name: String,
    pub file_path: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<ApiFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: i64,
    pub project_name: String,
    pub created_at: String,
    #[serde(default)]
    pub file_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<ProjectSummary>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub project_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectDetails {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub file_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
}

/// Citation as the backend ships it. The document surface fills
/// `file_name` + `page_number`; the wikipedia surface reuses `file_name`
/// for the source url and sets `id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCitation {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub page_number: Option<i64>,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub citation_info: Vec<RawCitation>,
    #[serde(default)]
    pub wiki_citations: Vec<RawCitation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub citation_info: Vec<RawCitation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHistory {
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authenticated: no access token in the credential store")]
    NotAuthenticated,
    /// Server-supplied `detail`/`message`, or a generic status line.
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// The server detail when there is one, otherwise the caller's fallback
/// message. Controllers use this to surface backend validation text.
pub fn detail_or(err: &ApiError, fallback: &str) -> String {
    match err {
        ApiError::Backend(detail) => detail.clone(),
        _ => fallback.to_string(),
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["detail", "message"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// One method per backend operation. Controllers hold an `Arc<dyn Backend>`
/// so tests can substitute [`MockBackend`] for the HTTP gateway.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_user(&self, request: &CreateUserRequest) -> Result<(), ApiError>;
    async fn oauth_token(&self, username: &str, password: &str)
        -> Result<TokenResponse, ApiError>;
    async fn reset_password(&self, request: &PasswordReset) -> Result<(), ApiError>;
    async fn upload_files(&self, paths: &[PathBuf]) -> Result<(), ApiError>;
    async fn list_files(&self) -> Result<FileList, ApiError>;
    async fn delete_file(&self, file_id: i64) -> Result<(), ApiError>;
    async fn create_project(
        &self,
        project_name: &str,
        file_ids: &[i64],
    ) -> Result<ProjectCreated, ApiError>;
    async fn join_project(&self, project_id: i64) -> Result<ProjectCreated, ApiError>;
    async fn list_projects(&self) -> Result<ProjectList, ApiError>;
    async fn delete_project(&self, project_id: i64) -> Result<(), ApiError>;
    async fn get_project(&self, project_id: i64) -> Result<ProjectDetails, ApiError>;
    async fn create_session(&self) -> Result<SessionCreated, ApiError>;
    async fn document_chat(&self, request: &ChatRequest) -> Result<ChatAnswer, ApiError>;
    async fn wikipedia_chat(&self, request: &ChatRequest) -> Result<ChatAnswer, ApiError>;
    async fn session_messages(&self, session_id: &str) -> Result<MessageHistory, ApiError>;
}

// ---------------------------------------------------------------------------
// HTTP gateway
// ---------------------------------------------------------------------------

/// Thin reqwest wrapper over the chat service's REST surface. The bearer
/// token is read from the credential store at call time, never cached, so
/// a re-login takes effect on the next request. No retries, no client-side
/// timeout policy, no response validation beyond serde.
#[derive(Clone)]
pub struct ApiGateway {
    client: reqwest::Client,
    base_url: String,
    store: CredentialStore,
}

impl ApiGateway {
    pub fn new(base_url: impl Into<String>, store: CredentialStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            store,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.store
            .get(store::ACCESS_TOKEN)
            .ok_or(ApiError::NotAuthenticated)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Backend(extract_detail(&body).unwrap_or_else(
            || format!("request failed with status {status}"),
        )))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(self.bearer()?)
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[async_trait]
impl Backend for ApiGateway {
    async fn create_user(&self, request: &CreateUserRequest) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.endpoint("/auth/create_user"))
            .json(request)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn oauth_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ApiError> {
        let form = [
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ];
        let response = self
            .client
            .post(self.endpoint("/auth/oauth_token"))
            .form(&form)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn reset_password(&self, request: &PasswordReset) -> Result<(), ApiError> {
        let response = self
            .client
            .put(self.endpoint("/auth/password_modification"))
            .json(request)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_files(&self, paths: &[PathBuf]) -> Result<(), ApiError> {
        let mut form = reqwest::multipart::Form::new();
        for path in paths {
            let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let name = path
                .file_name()
                .map(|os| os.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            form = form.part("files", reqwest::multipart::Part::bytes(bytes).file_name(name));
        }
        let response = self
            .client
            .post(self.endpoint("/files/upload"))
            .bearer_auth(self.bearer()?)
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<FileList, ApiError> {
        self.get_json("/files/list").await
    }

    async fn delete_file(&self, file_id: i64) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/files/{file_id}")))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_project(
        &self,
        project_name: &str,
        file_ids: &[i64],
    ) -> Result<ProjectCreated, ApiError> {
        let body = serde_json::json!({
            "project_name": project_name,
            "file_ids": file_ids,
        });
        self.post_json("/projects/create", &body).await
    }

    async fn join_project(&self, project_id: i64) -> Result<ProjectCreated, ApiError> {
        let body = serde_json::json!({});
        self.post_json(&format!("/projects/start/{project_id}"), &body)
            .await
    }

    async fn list_projects(&self) -> Result<ProjectList, ApiError> {
        self.get_json("/projects/list").await
    }

    async fn delete_project(&self, project_id: i64) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.endpoint(&format!("/projects/{project_id}")))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_project(&self, project_id: i64) -> Result<ProjectDetails, ApiError> {
        self.get_json(&format!("/projects/specific/{project_id}"))
            .await
    }

    async fn create_session(&self) -> Result<SessionCreated, ApiError> {
        let body = serde_json::json!({});
        self.post_json("/rag/sessions/create", &body).await
    }

    async fn document_chat(&self, request: &ChatRequest) -> Result<ChatAnswer, ApiError> {
        self.post_json("/rag/document_chat", request).await
    }

    async fn wikipedia_chat(&self, request: &ChatRequest) -> Result<ChatAnswer, ApiError> {
        self.post_json("/rag/wikipedia_chat", request).await
    }

    async fn session_messages(&self, session_id: &str) -> Result<MessageHistory, ApiError> {
        self.get_json(&format!("/rag/sessions/{session_id}/messages"))
            .await
    }
}

// ---------------------------------------------------------------------------
// Mock backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    users: Vec<String>,
    files: Vec<ApiFile>,
    projects: Vec<ProjectSummary>,
    project_sessions: HashMap<i64, String>,
    sessions: HashMap<String, Vec<RawMessage>>,
    next_file_id: i64,
    next_project_id: i64,
    fail_requests: bool,
}

/// Deterministic in-memory stand-in for the chat service, used by the
/// tests crate and the xtask smoke run.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<RwLock<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every subsequent call fails with a backend error.
    pub fn set_fail_requests(&self, fail: bool) {
        self.inner.write().fail_requests = fail;
    }

    fn gate(&self) -> Result<(), ApiError> {
        if self.inner.read().fail_requests {
            Err(ApiError::Backend("mock backend failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn create_user(&self, request: &CreateUserRequest) -> Result<(), ApiError> {
        self.gate()?;
        let mut state = self.inner.write();
        if state.users.iter().any(|u| u == &request.username) {
            return Err(ApiError::Backend(
                "Username or email already exists".to_string(),
            ));
        }
        state.users.push(request.username.clone());
        Ok(())
    }

    async fn oauth_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ApiError> {
        self.gate()?;
        if username.is_empty() || password.is_empty() {
            return Err(ApiError::Backend(
                "Invalid username or password".to_string(),
            ));
        }
        Ok(TokenResponse {
            access_token: format!("mock-token-{}", Uuid::new_v4()),
            token_type: "bearer".to_string(),
        })
    }

    async fn reset_password(&self, request: &PasswordReset) -> Result<(), ApiError> {
        self.gate()?;
        if request.identifier.is_empty() {
            return Err(ApiError::Backend("User not found".to_string()));
        }
        Ok(())
    }

    async fn upload_files(&self, paths: &[PathBuf]) -> Result<(), ApiError> {
        self.gate()?;
        let mut state = self.inner.write();
        for path in paths {
            state.next_file_id += 1;
            let id = state.next_file_id;
            let name = path
                .file_name()
                .map(|os| os.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            state.files.push(ApiFile {
                file_id: id,
                file_name: name,
                file_path: path.display().to_string(),
                uploaded_at: Utc::now().to_rfc3339(),
            });
        }
        Ok(())
    }

    async fn list_files(&self) -> Result<FileList, ApiError> {
        self.gate()?;
        Ok(FileList {
            files: self.inner.read().files.clone(),
        })
    }

    async fn delete_file(&self, file_id: i64) -> Result<(), ApiError> {
        self.gate()?;
        self.inner.write().files.retain(|f| f.file_id != file_id);
        Ok(())
    }

    async fn create_project(
        &self,
        project_name: &str,
        file_ids: &[i64],
    ) -> Result<ProjectCreated, ApiError> {
        self.gate()?;
        let mut state = self.inner.write();
        let known = |id: &i64| state.files.iter().any(|f| f.file_id == *id);
        if file_ids.is_empty() || !file_ids.iter().all(known) {
            return Err(ApiError::Backend(
                "One or more files do not exist or you don't have permission to access them"
                    .to_string(),
            ));
        }
        state.next_project_id += 1;
        let project_id = state.next_project_id;
        let file_names = state
            .files
            .iter()
            .filter(|f| file_ids.contains(&f.file_id))
            .map(|f| f.file_name.clone())
            .collect();
        state.projects.push(ProjectSummary {
            project_id,
            project_name: project_name.to_string(),
            created_at: Utc::now().to_rfc3339(),
            file_names,
        });
        let session_id = Uuid::new_v4().to_string();
        state.sessions.insert(session_id.clone(), Vec::new());
        state.project_sessions.insert(project_id, session_id);
        Ok(ProjectCreated { project_id })
    }

    async fn join_project(&self, project_id: i64) -> Result<ProjectCreated, ApiError> {
        self.gate()?;
        let state = self.inner.read();
        if !state.projects.iter().any(|p| p.project_id == project_id) {
            return Err(ApiError::Backend(
                "Project not found, inactive, or unauthorized".to_string(),
            ));
        }
        Ok(ProjectCreated { project_id })
    }

    async fn list_projects(&self) -> Result<ProjectList, ApiError> {
        self.gate()?;
        let projects = self.inner.read().projects.clone();
        let count = projects.len();
        Ok(ProjectList { projects, count })
    }

    async fn delete_project(&self, project_id: i64) -> Result<(), ApiError> {
        self.gate()?;
        let mut state = self.inner.write();
        state.projects.retain(|p| p.project_id != project_id);
        if let Some(session_id) = state.project_sessions.remove(&project_id) {
            state.sessions.remove(&session_id);
        }
        Ok(())
    }

    async fn get_project(&self, project_id: i64) -> Result<ProjectDetails, ApiError> {
        self.gate()?;
        let state = self.inner.read();
        let project = state
            .projects
            .iter()
            .find(|p| p.project_id == project_id)
            .ok_or_else(|| ApiError::Backend("Project not found or unauthorized".to_string()))?;
        Ok(ProjectDetails {
            session_id: state.project_sessions.get(&project_id).cloned(),
            file_names: project.file_names.clone(),
        })
    }

    async fn create_session(&self) -> Result<SessionCreated, ApiError> {
        self.gate()?;
        let session_id = Uuid::new_v4().to_string();
        self.inner
            .write()
            .sessions
            .insert(session_id.clone(), Vec::new());
        Ok(SessionCreated { session_id })
    }

    async fn document_chat(&self, request: &ChatRequest) -> Result<ChatAnswer, ApiError> {
        self.gate()?;
        let mut state = self.inner.write();
        let history = state.sessions.get_mut(&request.session_id).ok_or_else(|| {
            ApiError::Backend("Session not found. Create a new session first.".to_string())
        })?;
        let citation = RawCitation {
            file_name: "docs/handbook.pdf".to_string(),
            page_number: Some(3),
            id: None,
        };
        let answer = format!("You asked about '{}'.", request.question);
        history.push(RawMessage {
            role: "user".to_string(),
            content: request.question.clone(),
            citation_info: Vec::new(),
        });
        history.push(RawMessage {
            role: "assistant".to_string(),
            content: answer.clone(),
            citation_info: vec![citation.clone()],
        });
        Ok(ChatAnswer {
            answer,
            citation_info: vec![citation],
            wiki_citations: Vec::new(),
        })
    }

    async fn wikipedia_chat(&self, request: &ChatRequest) -> Result<ChatAnswer, ApiError> {
        self.gate()?;
        let mut state = self.inner.write();
        let history = state.sessions.get_mut(&request.session_id).ok_or_else(|| {
            ApiError::Backend("Session not found. Create a new session first.".to_string())
        })?;
        let citation = RawCitation {
            file_name: "https://en.wikipedia.org/wiki/Rust_(programming_language)".to_string(),
            page_number: None,
            id: Some(1),
        };
        let answer = format!("According to Wikipedia: '{}'.", request.question);
        history.push(RawMessage {
            role: "user".to_string(),
            content: request.question.clone(),
            citation_info: Vec::new(),
        });
        history.push(RawMessage {
            role: "assistant".to_string(),
            content: answer.clone(),
            citation_info: vec![citation.clone()],
        });
        Ok(ChatAnswer {
            answer,
            citation_info: Vec::new(),
            wiki_citations: vec![citation],
        })
    }

    async fn session_messages(&self, session_id: &str) -> Result<MessageHistory, ApiError> {
        self.gate()?;
        let state = self.inner.read();
        let messages = state
            .sessions
            .get(session_id)
            .ok_or_else(|| ApiError::Backend(format!("Session {session_id} not found")))?;
        Ok(MessageHistory {
            messages: messages.clone(),
        })
    }
}
