use handlebars::Handlebars;
use std::path::Path;
use tracing::{info, warn};

use crate::domain::{ports::PromptRenderer, DomainError, PromptData, PromptTemplate};

fn default_template(template: PromptTemplate) -> &'static str {
    match template {
        PromptTemplate::Json => include_str!("templates/json_prompt.hbs"),
        PromptTemplate::Title => include_str!("templates/title_prompt.hbs"),
        PromptTemplate::Tags => include_str!("templates/tag_prompt.hbs"),
        PromptTemplate::Correspondent => include_str!("templates/correspondent_prompt.hbs"),
        PromptTemplate::DocumentType => include_str!("templates/document_type_prompt.hbs"),
        PromptTemplate::Ocr => include_str!("templates/ocr_prompt.hbs"),
    }
}

fn file_name(template: PromptTemplate) -> String {
    format!("{}_prompt.hbs", template.name())
}

/// Prompt templates compiled once at startup and read-only afterwards.
pub struct HandlebarsPrompts {
    registry: Handlebars<'static>,
}

impl HandlebarsPrompts {
    /// Uses the templates built into the binary.
    pub fn embedded() -> Result<Self, DomainError> {
        let mut prompts = Self::empty();
        for template in PromptTemplate::ALL {
            prompts.register(template, default_template(template))?;
        }
        Ok(prompts)
    }

    /// Loads `<name>_prompt.hbs` files from `dir`. Missing files get the
    /// built-in default written in their place so they can be edited.
    pub fn load(dir: Option<&Path>) -> Result<Self, DomainError> {
        let Some(dir) = dir else {
            return Self::embedded();
        };

        std::fs::create_dir_all(dir).map_err(|e| {
            DomainError::validation(format!("creating prompts dir {}: {e}", dir.display()))
        })?;

        let mut prompts = Self::empty();
        for template in PromptTemplate::ALL {
            let path = dir.join(file_name(template));
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => {
                    info!(path = %path.display(), "loaded prompt template");
                    source
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "using default prompt template");
                    let source = default_template(template);
                    std::fs::write(&path, source).map_err(|e| {
                        DomainError::validation(format!("writing {}: {e}", path.display()))
                    })?;
                    source.to_string()
                }
            };
            prompts.register(template, &source)?;
        }
        Ok(prompts)
    }

    fn empty() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    fn register(&mut self, template: PromptTemplate, source: &str) -> Result<(), DomainError> {
        self.registry
            .register_template_string(template.name(), source)
            .map_err(|e| DomainError::validation(format!("template {}: {e}", template.name())))
    }
}

impl PromptRenderer for HandlebarsPrompts {
    fn render(&self, template: PromptTemplate, data: &PromptData<'_>) -> Result<String, DomainError> {
        self.registry
            .render(template.name(), data)
            .map_err(|e| DomainError::internal(format!("rendering {}: {e}", template.name())))
    }
}
