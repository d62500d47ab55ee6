use async_trait::async_trait;
use base64::Engine as _;
use rig::client::{CompletionClient, Nothing, ProviderClient};
use rig::completion::Prompt;
use rig::message::{DocumentMediaType, ImageMediaType, Message, UserContent};
use rig::providers::{anthropic, ollama, openai};
use rig::OneOrMany;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::{
    ports::{LlmService, VisionService},
    DomainError, MediaKind,
};
use crate::infrastructure::config::{LlmConfig, LlmProvider};

enum Backend {
    OpenAi(openai::Client),
    Ollama(ollama::Client),
    Anthropic(anthropic::Client),
}

/// Language model reached through `rig`. OpenAI and Anthropic read their
/// API keys from the environment; Ollama is addressed by host.
pub struct RigLlm {
    backend: Backend,
    model: String,
    timeout: Duration,
}

impl RigLlm {
    pub fn new(
        provider: LlmProvider,
        model: impl Into<String>,
        ollama_host: &str,
    ) -> Result<Self, DomainError> {
        let backend = match provider {
            LlmProvider::OpenAi => Backend::OpenAi(openai::Client::from_env()),
            LlmProvider::Ollama => Backend::Ollama(
                <ollama::Client>::builder()
                    .api_key(Nothing)
                    .base_url(ollama_host)
                    .build()
                    .map_err(|e| {
                        DomainError::validation(format!("ollama client for {ollama_host}: {e}"))
                    })?,
            ),
            LlmProvider::Anthropic => Backend::Anthropic(anthropic::Client::from_env()),
        };
        Ok(Self {
            backend,
            model: model.into(),
            timeout: Duration::from_secs(120),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, DomainError> {
        Ok(Self::new(config.provider, &config.model, &config.ollama_host)?
            .with_timeout(Duration::from_secs(config.timeout_seconds)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(&self, message: Message) -> Result<String, DomainError> {
        let call = async {
            match &self.backend {
                Backend::OpenAi(client) => {
                    let agent = client.agent(&self.model).build();
                    agent.prompt(message).await
                }
                Backend::Ollama(client) => {
                    let agent = client.agent(&self.model).build();
                    agent.prompt(message).await
                }
                Backend::Anthropic(client) => {
                    let agent = client.agent(&self.model).build();
                    agent.prompt(message).await
                }
            }
        };

        let reply = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| DomainError::timeout("language model call timed out"))?
            .map_err(|e| DomainError::upstream(format!("language model failed: {e}")))?;

        debug!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}

fn attachment(kind: MediaKind, file: &[u8]) -> UserContent {
    let data = base64::engine::general_purpose::STANDARD.encode(file);
    let image = |media| UserContent::image_base64(data.clone(), Some(media), None);
    match kind {
        MediaKind::Pdf => UserContent::document(data.clone(), Some(DocumentMediaType::PDF)),
        MediaKind::Jpeg => image(ImageMediaType::JPEG),
        MediaKind::Png => image(ImageMediaType::PNG),
        MediaKind::Gif => image(ImageMediaType::GIF),
        MediaKind::Webp => image(ImageMediaType::WEBP),
    }
}

#[async_trait]
impl LlmService for RigLlm {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        self.send(Message::from(prompt)).await
    }
}

#[async_trait]
impl VisionService for RigLlm {
    #[instrument(skip_all, fields(model = %self.model, media = kind.mime(), bytes = file.len()))]
    async fn read_file(&self, prompt: &str, kind: MediaKind, file: &[u8]) -> Result<String, DomainError> {
        let content = OneOrMany::many(vec![attachment(kind, file), UserContent::text(prompt)])
            .map_err(|e| DomainError::internal(format!("building vision message: {e}")))?;
        self.send(Message::from(content)).await
    }
}
