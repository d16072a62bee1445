//! Seams to the services the core drives but does not own.
//!
//! Generation and sandbox execution are boxed futures the app spawns as
//! abortable tasks. Attachment conversion runs inline during submit.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::mpsc;

use kiln_providers::{
    GenerationRequest, SandboxError, SandboxRequest, chat_endpoint, http_client, sandbox_endpoint,
    stream_fragment, stream_idle_timeout,
};
use kiln_types::{ExecutionResult, GenerationEvent, ImageRef, SecretString};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Produces a stream of fragment snapshots for a request.
///
/// The returned future sends zero or more `Snapshot`s followed by one `Done`
/// or `Error` on `tx`. Dropping the future cancels the run.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<GenerationEvent>,
    ) -> BoxFuture<()>;
}

/// Executes a finished fragment.
pub trait Sandbox: Send + Sync {
    fn execute(&self, request: SandboxRequest) -> BoxFuture<Result<ExecutionResult, SandboxError>>;
}

/// Turns raw attachments into inline image references.
pub trait AttachmentConverter: Send + Sync {
    fn convert(&self, attachments: &[Attachment]) -> anyhow::Result<Vec<ImageRef>>;
}

/// A file handed to `submit`.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Authenticated identity. Its absence means submissions are refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub api_key: Option<SecretString>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            user_id: user_id.into(),
            api_key,
        }
    }
}

/// Encodes image attachments as `data:` URLs and skips everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlConverter;

impl AttachmentConverter for DataUrlConverter {
    fn convert(&self, attachments: &[Attachment]) -> anyhow::Result<Vec<ImageRef>> {
        let mut images = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            if !attachment.is_image() {
                tracing::warn!(
                    name = %attachment.name,
                    mime = %attachment.mime_type,
                    "Skipping non-image attachment"
                );
                continue;
            }
            if attachment.bytes.is_empty() {
                bail!("attachment {} is empty", attachment.name);
            }
            let payload = STANDARD.encode(&attachment.bytes);
            images.push(ImageRef::new(format!(
                "data:{};base64,{payload}",
                attachment.mime_type
            )));
        }
        Ok(images)
    }
}

/// Streams from `{base_url}/api/chat` (or the model's alternate endpoint).
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    base_url: String,
    idle_timeout: Duration,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            idle_timeout: stream_idle_timeout(),
        }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl Generator for HttpGenerator {
    fn generate(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<GenerationEvent>,
    ) -> BoxFuture<()> {
        let url = chat_endpoint(&self.base_url, &request.model.id);
        let idle_timeout = self.idle_timeout;
        Box::pin(async move {
            tracing::info!(%url, messages = request.messages.len(), "Starting generation");
            stream_fragment(http_client(), &url, &request, tx, idle_timeout).await;
        })
    }
}

/// Posts to `{base_url}/api/sandbox`.
#[derive(Debug, Clone)]
pub struct HttpSandbox {
    base_url: String,
}

impl HttpSandbox {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Sandbox for HttpSandbox {
    fn execute(&self, request: SandboxRequest) -> BoxFuture<Result<ExecutionResult, SandboxError>> {
        let url = sandbox_endpoint(&self.base_url);
        Box::pin(async move { kiln_providers::execute(http_client(), &url, &request).await })
    }
}

/// The full set of collaborators an [`App`](crate::App) drives.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn Generator>,
    pub sandbox: Arc<dyn Sandbox>,
    pub converter: Arc<dyn AttachmentConverter>,
}

impl Collaborators {
    /// Collaborators with the default attachment converter.
    pub fn new(generator: impl Generator + 'static, sandbox: impl Sandbox + 'static) -> Self {
        Self {
            generator: Arc::new(generator),
            sandbox: Arc::new(sandbox),
            converter: Arc::new(DataUrlConverter),
        }
    }

    /// HTTP collaborators against one service root.
    pub fn http(base_url: &str) -> Self {
        Self::new(HttpGenerator::new(base_url), HttpSandbox::new(base_url))
    }

    #[must_use]
    pub fn with_converter(mut self, converter: impl AttachmentConverter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
