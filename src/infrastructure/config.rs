use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_AUTO_TAG: &str = "paperless-gpt-auto";
pub const DEFAULT_OCR_TAG: &str = "paperless-gpt-ocr";
pub const DEFAULT_AUTO_TAGGED_FIELD: &str = "auto_tagged";
pub const DEFAULT_OCR_FIELD: &str = "ocr_textract";
pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
const LOG_LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
    #[error("cannot read config file {path}: {message}")]
    File { path: String, message: String },
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
    Anthropic,
}

impl LlmProvider {
    /// Environment variable holding the provider's API key. Ollama needs none.
    pub fn credential_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigError::invalid(
                "LLM_PROVIDER",
                format!("unknown provider '{other}' (expected openai, ollama or anthropic)"),
            )),
        }
    }
}

/// Engine used by the OCR pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    /// The OCR pipeline does not run.
    #[default]
    None,
    /// A vision-capable language model reads the original file.
    Llm,
}

impl FromStr for OcrEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::invalid(
                "OCR_ENGINE",
                format!("unknown engine '{other}' (expected none or llm)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub engine: OcrEngine,
    /// Defaults to the text model's provider.
    pub vision_provider: Option<LlmProvider>,
    pub vision_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperlessConfig {
    pub base_url: String,
    pub api_token: String,
    #[serde(default = "default_paperless_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_ollama_host")]
    pub ollama_host: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub auto_tag: String,
    pub ocr_tag: String,
    pub auto_tagged_field: Option<String>,
    pub ocr_field: Option<String>,
    pub correspondent_blacklist: Vec<String>,
    pub tag_blacklist: Vec<String>,
    pub page_size: usize,
    pub concurrency: usize,
    pub cache_capacity: usize,
    pub poll_interval_seconds: u64,
    pub backoff_min_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            auto_tag: DEFAULT_AUTO_TAG.into(),
            ocr_tag: DEFAULT_OCR_TAG.into(),
            auto_tagged_field: Some(DEFAULT_AUTO_TAGGED_FIELD.into()),
            ocr_field: Some(DEFAULT_OCR_FIELD.into()),
            correspondent_blacklist: Vec::new(),
            tag_blacklist: Vec::new(),
            page_size: 4,
            concurrency: 4,
            cache_capacity: 100,
            poll_interval_seconds: 10,
            backoff_min_seconds: 10,
            backoff_max_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Process-wide settings, loaded once at startup and passed explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paperless: PaperlessConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub prompts_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AppConfig {
    /// Reads `CONFIG_FILE` when set, the environment otherwise, and checks
    /// provider credentials against the environment either way.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_yaml_file(path)?,
            Err(_) => Self::from_env()?,
        };
        config.check_credentials(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let defaults = PipelineConfig::default();

        let config = Self {
            paperless: PaperlessConfig {
                base_url: required("PAPERLESS_BASE_URL")?,
                api_token: required("PAPERLESS_API_TOKEN")?,
                timeout_seconds: parse_or(&get, "PAPERLESS_TIMEOUT_SECONDS", default_paperless_timeout())?,
            },
            llm: LlmConfig {
                provider: required("LLM_PROVIDER")?.parse()?,
                model: required("LLM_MODEL")?,
                language: get("LLM_LANGUAGE").map_or_else(default_language, |l| title_case(&l)),
                timeout_seconds: parse_or(&get, "LLM_TIMEOUT_SECONDS", default_llm_timeout())?,
                ollama_host: get("OLLAMA_HOST").unwrap_or_else(default_ollama_host),
            },
            pipeline: PipelineConfig {
                auto_tag: get("AUTO_TAG").unwrap_or(defaults.auto_tag),
                ocr_tag: get("OCR_TAG").unwrap_or(defaults.ocr_tag),
                auto_tagged_field: marker_field(&lookup, "AUTO_TAGGED_FIELD", DEFAULT_AUTO_TAGGED_FIELD),
                ocr_field: marker_field(&lookup, "OCR_FIELD", DEFAULT_OCR_FIELD),
                correspondent_blacklist: get("CORRESPONDENT_BLACK_LIST")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
                tag_blacklist: get("TAG_BLACK_LIST").map(|v| split_list(&v)).unwrap_or_default(),
                page_size: parse_or(&get, "POLL_PAGE_SIZE", defaults.page_size)?,
                concurrency: parse_or(&get, "WORKER_CONCURRENCY", defaults.concurrency)?,
                cache_capacity: parse_or(&get, "CACHE_CAPACITY", defaults.cache_capacity)?,
                poll_interval_seconds: parse_or(&get, "POLL_INTERVAL_SECONDS", defaults.poll_interval_seconds)?,
                backoff_min_seconds: parse_or(&get, "BACKOFF_MIN_SECONDS", defaults.backoff_min_seconds)?,
                backoff_max_seconds: parse_or(&get, "BACKOFF_MAX_SECONDS", defaults.backoff_max_seconds)?,
            },
            ocr: OcrConfig {
                engine: get("OCR_ENGINE").map_or(Ok(OcrEngine::None), |v| v.parse())?,
                vision_provider: get("VISION_LLM_PROVIDER").map(|v| v.parse()).transpose()?,
                vision_model: get("VISION_LLM_MODEL"),
            },
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or_else(|| ServerConfig::default().host),
                port: parse_or(&get, "SERVER_PORT", ServerConfig::default().port)?,
                cors_allowed_origins: get("CORS_ALLOWED_ORIGINS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
            },
            prompts_dir: get("PROMPTS_DIR").map(PathBuf::from),
            log_level: get("LOG_LEVEL").unwrap_or_else(default_log_level),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(raw)?;
        config.llm.language = title_case(&config.llm.language);
        for field in [&mut config.pipeline.auto_tagged_field, &mut config.pipeline.ocr_field] {
            if field.as_deref().is_some_and(disables_marker) {
                *field = None;
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paperless.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("PAPERLESS_BASE_URL"));
        }
        if self.paperless.api_token.trim().is_empty() {
            return Err(ConfigError::Missing("PAPERLESS_API_TOKEN"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Missing("LLM_MODEL"));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid(
                "LOG_LEVEL",
                format!("'{}' is not one of debug, info, warn, error", self.log_level),
            ));
        }
        if self.pipeline.auto_tag == self.pipeline.ocr_tag {
            return Err(ConfigError::invalid("OCR_TAG", "must differ from AUTO_TAG"));
        }
        if self.pipeline.backoff_min_seconds == 0 {
            return Err(ConfigError::invalid("BACKOFF_MIN_SECONDS", "must be positive"));
        }
        if self.ocr.engine == OcrEngine::Llm
            && self.ocr.vision_model.as_deref().map_or(true, |m| m.trim().is_empty())
        {
            return Err(ConfigError::Missing("VISION_LLM_MODEL"));
        }
        Ok(())
    }

    pub fn check_credentials<F>(&self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = vec![self.llm.provider];
        if let Some(vision) = self.vision_provider() {
            providers.push(vision);
        }

        for var in providers.iter().filter_map(LlmProvider::credential_var) {
            match lookup(var) {
                Some(value) if !value.trim().is_empty() => {}
                _ => return Err(ConfigError::Missing(var)),
            }
        }
        Ok(())
    }

    /// Provider of the vision model, when the OCR pipeline uses one.
    pub fn vision_provider(&self) -> Option<LlmProvider> {
        match self.ocr.engine {
            OcrEngine::Llm => Some(self.ocr.vision_provider.unwrap_or(self.llm.provider)),
            OcrEngine::None => None,
        }
    }

    /// Default `EnvFilter` directive for `binary` when `RUST_LOG` is unset.
    pub fn log_filter(&self, binary: &str) -> String {
        format!(
            "{binary}={level},doc_enricher={level},tower_http={level}",
            level = self.log_level
        )
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

/// Name of a processed-marker field. Unset means the default; an empty value
/// or `none` turns the marker off.
fn marker_field<F>(lookup: &F, key: &str, default: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Some(default.to_string()),
        Some(raw) if disables_marker(&raw) => None,
        Some(raw) => Some(raw.trim().to_string()),
    }
}

fn disables_marker(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw.eq_ignore_ascii_case("none")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn title_case(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => default_language(),
    }
}

fn default_language() -> String {
    "English".into()
}

fn default_paperless_timeout() -> u64 {
    30
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_ollama_host() -> String {
    DEFAULT_OLLAMA_HOST.into()
}

fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const BASE: [(&str, &str); 4] = [
        ("PAPERLESS_BASE_URL", "http://paperless:8000"),
        ("PAPERLESS_API_TOKEN", "secret"),
        ("LLM_PROVIDER", "ollama"),
        ("LLM_MODEL", "llama3"),
    ];

    fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        BASE.iter().chain(extra).copied().collect()
    }

    #[test]
    fn test_defaults_from_minimal_env() {
        let config = AppConfig::from_lookup(env(&BASE)).unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.language, "English");
        assert_eq!(config.pipeline.auto_tag, DEFAULT_AUTO_TAG);
        assert_eq!(config.pipeline.page_size, 4);
        assert_eq!(config.pipeline.cache_capacity, 100);
        assert_eq!(config.pipeline.ocr_field.as_deref(), Some("ocr_textract"));
        assert_eq!(config.pipeline.poll_interval_seconds, 10);
        assert_eq!(config.pipeline.backoff_max_seconds, 3600);
        assert_eq!(config.llm.ollama_host, "http://127.0.0.1:11434");
        assert_eq!(config.ocr.engine, OcrEngine::None);
        assert_eq!(config.vision_provider(), None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_marker_fields_can_be_disabled() {
        let config = AppConfig::from_lookup(env(&with(&[
            ("AUTO_TAGGED_FIELD", ""),
            ("OCR_FIELD", "None"),
        ])))
        .unwrap();
        assert_eq!(config.pipeline.auto_tagged_field, None);
        assert_eq!(config.pipeline.ocr_field, None);

        let config = AppConfig::from_lookup(env(&with(&[("AUTO_TAGGED_FIELD", " reviewed ")]))).unwrap();
        assert_eq!(config.pipeline.auto_tagged_field.as_deref(), Some("reviewed"));
    }

    #[test]
    fn test_llm_ocr_engine_needs_vision_model() {
        let err = AppConfig::from_lookup(env(&with(&[("OCR_ENGINE", "llm")]))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("VISION_LLM_MODEL")));

        let config = AppConfig::from_lookup(env(&with(&[
            ("OCR_ENGINE", "LLM"),
            ("VISION_LLM_MODEL", "minicpm-v"),
        ])))
        .unwrap();
        assert_eq!(config.vision_provider(), Some(LlmProvider::Ollama));

        let err = AppConfig::from_lookup(env(&with(&[("OCR_ENGINE", "textract")]))).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "OCR_ENGINE", .. }));
    }

    #[test]
    fn test_missing_required_setting() {
        let vars: Vec<_> = BASE
            .iter()
            .filter(|(k, _)| *k != "LLM_MODEL")
            .copied()
            .collect();
        let err = AppConfig::from_lookup(env(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LLM_MODEL")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AppConfig::from_lookup(env(&with(&[("LOG_LEVEL", "verbose")]))).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LOG_LEVEL", .. }));

        let err = AppConfig::from_lookup(env(&with(&[("POLL_PAGE_SIZE", "many")]))).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "POLL_PAGE_SIZE", .. }));

        let vars: Vec<_> = BASE
            .iter()
            .map(|&(k, v)| if k == "LLM_PROVIDER" { (k, "gemini") } else { (k, v) })
            .collect();
        let err = AppConfig::from_lookup(env(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LLM_PROVIDER", .. }));
    }

    #[test]
    fn test_lists_and_language() {
        let config = AppConfig::from_lookup(env(&with(&[
            ("LLM_LANGUAGE", "gERMAN"),
            ("TAG_BLACK_LIST", "private, ,tax "),
            ("CORS_ALLOWED_ORIGINS", "http://a.test,http://b.test"),
        ])))
        .unwrap();

        assert_eq!(config.llm.language, "German");
        assert_eq!(config.pipeline.tag_blacklist, vec!["private", "tax"]);
        assert_eq!(config.server.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_credentials_required_per_provider() {
        let vars = with(&[("OLLAMA_HOST", "http://ollama:11434")]);
        let mut config = AppConfig::from_lookup(env(&vars)).unwrap();
        assert_eq!(config.llm.ollama_host, "http://ollama:11434");
        assert!(config.check_credentials(env(&[])).is_ok());

        config.llm.provider = LlmProvider::OpenAi;
        let err = config.check_credentials(env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPENAI_API_KEY")));
        assert!(config
            .check_credentials(env(&[("OPENAI_API_KEY", "sk-test")]))
            .is_ok());

        config.ocr = OcrConfig {
            engine: OcrEngine::Llm,
            vision_provider: Some(LlmProvider::Anthropic),
            vision_model: Some("claude-sonnet".into()),
        };
        let err = config
            .check_credentials(env(&[("OPENAI_API_KEY", "sk-test")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ANTHROPIC_API_KEY")));
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
paperless:
  base_url: http://paperless:8000
  api_token: secret
llm:
  provider: anthropic
  model: claude-sonnet
  language: french
pipeline:
  page_size: 2
  auto_tagged_field: auto_tagged
  ocr_field: none
ocr:
  engine: llm
  vision_model: claude-sonnet
log_level: debug
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert_eq!(config.llm.language, "French");
        assert_eq!(config.llm.timeout_seconds, 120);
        assert_eq!(config.pipeline.page_size, 2);
        assert_eq!(config.pipeline.concurrency, 4);
        assert_eq!(config.pipeline.auto_tagged_field.as_deref(), Some("auto_tagged"));
        assert_eq!(config.pipeline.ocr_field, None);
        assert_eq!(config.vision_provider(), Some(LlmProvider::Anthropic));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.log_filter("worker"), "worker=debug,doc_enricher=debug,tower_http=debug");
    }

    #[test]
    fn test_yaml_missing_section_fails() {
        assert!(matches!(
            AppConfig::from_yaml_str("llm:\n  provider: ollama\n  model: x\n"),
            Err(ConfigError::Yaml(_))
        ));
    }
}
