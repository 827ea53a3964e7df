//! REST API Client
//!
//! Typed client for the backend's HTTP API. This module covers everything
//! the backend serves over REST: auth, session and message CRUD, response
//! regeneration, the document corpus, feedback, metrics, and fine-tuning
//! jobs. Live response streaming is not here; that arrives over the
//! [`crate::transport`] socket.
//!
//! # Design Philosophy
//!
//! The [`ChatApi`] trait carries exactly the calls the session store makes,
//! so store logic can be tested against a scripted implementation without a
//! server. [`HttpApi`] is the production implementation and additionally
//! exposes the endpoint families the store never touches (documents,
//! feedback, metrics, fine-tuning) as inherent methods.
//!
//! # Authentication
//!
//! Every authorized request carries the current bearer token. On a 401 the
//! client refreshes the token pair once and retries the request once; a
//! second rejection (or a failed refresh) forces logout: stored tokens are
//! cleared and an auth notification is emitted. Surfaces treat that
//! notification as "show the login screen".

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::notify::{Notification, NotificationKind, Notifier};
use crate::protocol::{MessageId, MessageRole, SessionId};

pub mod auth;
pub mod types;

pub use auth::{default_token_path, AuthState, TokenError, TokenPair};
pub use types::{
    AuthResponse, CreateFineTuneRequest, CreateSessionRequest, DocumentRecord, FeedbackRating,
    FeedbackRequest, FineTuneJob, FineTuneStatus, LoginRequest, MessageRecord, MetricsSnapshot,
    PostMessageRequest, RefreshRequest, RegisterRequest, SessionRecord, UpdateSessionRequest,
    UserProfile,
};

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the REST client
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (network, timeout, decode)
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// Rejected as unauthorized even after a token refresh
    #[error("authentication required")]
    Unauthorized,

    /// Upload aborted via [`HttpApi::cancel_upload`]
    #[error("upload cancelled")]
    UploadCancelled,

    /// Upload task failed outside the request itself
    #[error("upload task failed: {0}")]
    UploadFailed(String),

    /// Local file I/O failed (upload source)
    #[error("failed to read upload file: {0}")]
    Io(#[from] std::io::Error),

    /// Token persistence failed
    #[error("token storage: {0}")]
    TokenStore(#[from] TokenError),
}

/// The REST calls the session store depends on
///
/// Implement this to drive a [`crate::store::ChatStore`] from a scripted
/// backend in tests or from a different wire protocol.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// List all sessions on the account.
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ApiError>;

    /// Create a session; the server assigns the id (and the title when
    /// `title` is `None`).
    async fn create_session(&self, title: Option<String>) -> Result<SessionRecord, ApiError>;

    /// Rename a session.
    async fn rename_session(
        &self,
        session_id: &SessionId,
        title: String,
    ) -> Result<SessionRecord, ApiError>;

    /// Delete a session and its messages.
    async fn delete_session(&self, session_id: &SessionId) -> Result<(), ApiError>;

    /// List the messages of one session, oldest first.
    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<MessageRecord>, ApiError>;

    /// Post a user message; the response is the server-confirmed record.
    async fn post_message(
        &self,
        session_id: &SessionId,
        content: String,
    ) -> Result<MessageRecord, ApiError>;

    /// Request a fresh generation replacing the given assistant message.
    /// The new response arrives over the transport as a stream.
    async fn regenerate(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> Result<(), ApiError>;
}

/// In-flight document upload
///
/// The id is registered for cancellation the moment this handle exists;
/// `join` resolves to the uploaded record or the failure.
pub struct UploadHandle {
    id: Uuid,
    task: JoinHandle<Result<DocumentRecord, ApiError>>,
}

impl UploadHandle {
    /// Cancellation key for [`HttpApi::cancel_upload`].
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the upload to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UploadCancelled`] when the upload was aborted,
    /// or the upload's own failure.
    pub async fn join(self) -> Result<DocumentRecord, ApiError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(ApiError::UploadCancelled),
            Err(err) => Err(ApiError::UploadFailed(err.to_string())),
        }
    }
}

/// Production [`ChatApi`] over HTTP
///
/// Cheap to clone; clones share the connection pool, auth state, and the
/// upload registry.
#[derive(Clone)]
pub struct HttpApi {
    base_url: String,
    http_client: reqwest::Client,
    auth: Arc<AuthState>,
    notifier: Option<Notifier>,
    uploads: Arc<DashMap<Uuid, AbortHandle>>,
}

impl HttpApi {
    /// Create a client for the given base URL with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth: Arc<AuthState>) -> Self {
        Self::with_timeout(base_url, auth, REQUEST_TIMEOUT)
    }

    /// Create a client with an explicit per-request timeout.
    #[must_use]
    pub fn with_timeout(
        base_url: impl Into<String>,
        auth: Arc<AuthState>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            auth,
            notifier: None,
            uploads: Arc::new(DashMap::new()),
        }
    }

    /// Route forced-logout and upload notifications to the given notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Endpoint URL under the API prefix.
    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    /// Attach the current bearer token when present.
    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.bearer() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn non-success statuses into typed errors.
    async fn require_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Send an authorized request; on 401 refresh the token pair once and
    /// retry once. Repeated rejection forces logout.
    async fn execute<B>(&self, build: B) -> Result<reqwest::Response, ApiError>
    where
        B: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let response = self.authorize(build(&self.http_client)).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::require_success(response).await;
        }

        if !self.refresh_tokens().await {
            self.force_logout().await;
            return Err(ApiError::Unauthorized);
        }

        let retry = self.authorize(build(&self.http_client)).send().await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            self.force_logout().await;
            return Err(ApiError::Unauthorized);
        }
        Self::require_success(retry).await
    }

    /// Exchange the refresh token for a fresh pair. `true` on success.
    async fn refresh_tokens(&self) -> bool {
        let Some(refresh_token) = self.auth.refresh_token() else {
            return false;
        };
        tracing::debug!("access token rejected, attempting refresh");

        let response = self
            .http_client
            .post(self.url("auth/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await;

        let response = match response {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "token refresh rejected");
                return false;
            }
            Err(err) => {
                tracing::warn!(error = %err, "token refresh failed");
                return false;
            }
        };

        match response.json::<AuthResponse>().await {
            Ok(fresh) => {
                if let Err(err) = self
                    .auth
                    .store(TokenPair::new(fresh.access_token, fresh.refresh_token))
                    .await
                {
                    // The in-memory pair is already swapped; only the file write failed.
                    tracing::warn!(error = %err, "failed to persist refreshed tokens");
                }
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "malformed refresh response");
                false
            }
        }
    }

    /// Clear stored tokens and tell surfaces to show the login screen.
    async fn force_logout(&self) {
        tracing::warn!("authentication expired, clearing stored tokens");
        if let Err(err) = self.auth.clear().await {
            tracing::warn!(error = %err, "failed to clear stored tokens");
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(
                Notification::error(
                    NotificationKind::Auth,
                    "Session expired. Please log in again.",
                )
                .with_title("Signed out"),
            );
        }
    }

    // =========================================================================
    // Auth endpoints
    // =========================================================================

    /// Log in and persist the issued token pair.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a token-persistence failure.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserProfile>, ApiError> {
        let response = self
            .http_client
            .post(self.url("auth/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let response = Self::require_success(response).await?;

        let AuthResponse {
            access_token,
            refresh_token,
            user,
        } = response.json().await?;
        self.auth
            .store(TokenPair::new(access_token, refresh_token))
            .await?;
        tracing::info!("logged in");
        Ok(user)
    }

    /// Create an account and persist the issued token pair.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a token-persistence failure.
    pub async fn register(&self, request: RegisterRequest) -> Result<Option<UserProfile>, ApiError> {
        let response = self
            .http_client
            .post(self.url("auth/register"))
            .json(&request)
            .send()
            .await?;
        let response = Self::require_success(response).await?;

        let AuthResponse {
            access_token,
            refresh_token,
            user,
        } = response.json().await?;
        self.auth
            .store(TokenPair::new(access_token, refresh_token))
            .await?;
        tracing::info!("account registered");
        Ok(user)
    }

    /// Log out locally: drop and delete the stored token pair.
    ///
    /// # Errors
    ///
    /// Returns an error when the token file cannot be removed.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.auth.clear().await?;
        tracing::info!("logged out");
        Ok(())
    }

    /// Whether a token pair is currently held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    // =========================================================================
    // Document corpus
    // =========================================================================

    /// List the documents in the retrieval corpus.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>, ApiError> {
        let response = self.execute(|c| c.get(self.url("documents"))).await?;
        Ok(response.json().await?)
    }

    /// Start uploading a file into the corpus.
    ///
    /// The upload runs as a background task; the returned handle joins it
    /// and its id cancels it. Must be called within a tokio runtime.
    pub fn begin_upload(&self, path: PathBuf) -> UploadHandle {
        // Sweep registry entries whose task already finished
        self.uploads.retain(|_, handle| !handle.is_finished());

        let upload_id = Uuid::new_v4();
        let api = self.clone();
        let task = tokio::spawn(async move {
            let result = api.upload_to_corpus(&path).await;
            api.uploads.remove(&upload_id);
            result
        });
        self.uploads.insert(upload_id, task.abort_handle());

        UploadHandle {
            id: upload_id,
            task,
        }
    }

    /// Abort an in-flight upload. `false` when no such upload is running.
    pub fn cancel_upload(&self, upload_id: &Uuid) -> bool {
        match self.uploads.remove(upload_id) {
            Some((_, handle)) => {
                handle.abort();
                tracing::debug!(upload_id = %upload_id, "upload cancelled");
                true
            }
            None => false,
        }
    }

    /// Multipart POST of one file, with the standard 401 retry.
    async fn upload_to_corpus(&self, path: &Path) -> Result<DocumentRecord, ApiError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(file = %file_name, size = bytes.len(), "uploading document");

        let url = self.url("documents");
        let response = self
            .execute(|c| {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone());
                let form = reqwest::multipart::Form::new().part("file", part);
                c.post(url.as_str()).multipart(form)
            })
            .await?;

        let record: DocumentRecord = response.json().await?;
        if let Some(notifier) = &self.notifier {
            notifier.notify(Notification::success(
                NotificationKind::Api,
                format!("Uploaded {}", record.name),
            ));
        }
        Ok(record)
    }

    /// Delete a document from the corpus.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("documents/{document_id}"));
        self.execute(|c| c.delete(url.as_str())).await?;
        Ok(())
    }

    // =========================================================================
    // Feedback, metrics, fine-tuning
    // =========================================================================

    /// Submit a rating on an assistant response.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn send_feedback(&self, request: FeedbackRequest) -> Result<(), ApiError> {
        self.execute(|c| c.post(self.url("feedback")).json(&request))
            .await?;
        Ok(())
    }

    /// Fetch the account's usage metrics.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn metrics(&self) -> Result<MetricsSnapshot, ApiError> {
        let response = self.execute(|c| c.get(self.url("metrics"))).await?;
        Ok(response.json().await?)
    }

    /// List fine-tuning jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn list_fine_tune_jobs(&self) -> Result<Vec<FineTuneJob>, ApiError> {
        let response = self.execute(|c| c.get(self.url("fine-tune"))).await?;
        Ok(response.json().await?)
    }

    /// Start a fine-tuning job.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn create_fine_tune_job(
        &self,
        request: CreateFineTuneRequest,
    ) -> Result<FineTuneJob, ApiError> {
        let response = self
            .execute(|c| c.post(self.url("fine-tune")).json(&request))
            .await?;
        Ok(response.json().await?)
    }

    /// Fetch one fine-tuning job.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn fine_tune_job(&self, job_id: &str) -> Result<FineTuneJob, ApiError> {
        let url = self.url(&format!("fine-tune/{job_id}"));
        let response = self.execute(|c| c.get(url.as_str())).await?;
        Ok(response.json().await?)
    }

    /// Cancel a fine-tuning job.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection or a transport failure.
    pub async fn cancel_fine_tune_job(&self, job_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("fine-tune/{job_id}"));
        self.execute(|c| c.delete(url.as_str())).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ApiError> {
        let response = self.execute(|c| c.get(self.url("sessions"))).await?;
        Ok(response.json().await?)
    }

    async fn create_session(&self, title: Option<String>) -> Result<SessionRecord, ApiError> {
        let request = CreateSessionRequest { title };
        let response = self
            .execute(|c| c.post(self.url("sessions")).json(&request))
            .await?;
        Ok(response.json().await?)
    }

    async fn rename_session(
        &self,
        session_id: &SessionId,
        title: String,
    ) -> Result<SessionRecord, ApiError> {
        let url = self.url(&format!("sessions/{session_id}"));
        let request = UpdateSessionRequest { title };
        let response = self
            .execute(|c| c.patch(url.as_str()).json(&request))
            .await?;
        Ok(response.json().await?)
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<(), ApiError> {
        let url = self.url(&format!("sessions/{session_id}"));
        self.execute(|c| c.delete(url.as_str())).await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<MessageRecord>, ApiError> {
        let url = self.url(&format!("sessions/{session_id}/messages"));
        let response = self.execute(|c| c.get(url.as_str())).await?;
        Ok(response.json().await?)
    }

    async fn post_message(
        &self,
        session_id: &SessionId,
        content: String,
    ) -> Result<MessageRecord, ApiError> {
        let url = self.url(&format!("sessions/{session_id}/messages"));
        let request = PostMessageRequest {
            content,
            role: MessageRole::User,
        };
        let response = self
            .execute(|c| c.post(url.as_str()).json(&request))
            .await?;
        Ok(response.json().await?)
    }

    async fn regenerate(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "sessions/{session_id}/messages/{message_id}/regenerate"
        ));
        self.execute(|c| c.post(url.as_str())).await?;
        Ok(())
    }
}
