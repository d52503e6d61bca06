//! Prompt templates.
//!
//! Templates substitute `{{name}}` placeholders and keep or drop
//! `{{#if name}}...{{/if}}` sections depending on whether `name` was given.

use crate::error::PromptError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

const SECTION_OPEN: &str = "{{#if ";
const SECTION_CLOSE: &str = "{{/if}}";

/// A prompt template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name, used in error messages and logs.
    pub name: String,
    /// Template content with placeholders.
    pub content: String,
    /// Optional system prompt template.
    pub system_prompt: Option<String>,
    /// Variable definitions (name -> description).
    pub variables: HashMap<String, VariableDefinition>,
}

/// Definition of a template variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Description of what this variable is for.
    pub description: String,
    /// Whether this variable is required.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<JsonValue>,
}

impl VariableDefinition {
    /// Creates a required variable definition.
    #[must_use]
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional variable definition.
    #[must_use]
    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: false,
            default: None,
        }
    }

    /// Sets a default value.
    #[must_use]
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }
}

impl PromptTemplate {
    /// Creates a new prompt template.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            system_prompt: None,
            variables: HashMap::new(),
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Adds a variable definition.
    #[must_use]
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        definition: VariableDefinition,
    ) -> Self {
        self.variables.insert(name.into(), definition);
        self
    }

    /// Renders the template with the given variables.
    ///
    /// # Errors
    ///
    /// Returns `MissingVariable` if a required variable without a default is
    /// absent, and `ParseFailed` if a section is unclosed or nested.
    pub fn render(&self, variables: &HashMap<String, JsonValue>) -> Result<String, PromptError> {
        self.validate_variables(variables)?;
        self.render_text(&self.content, variables)
    }

    /// Renders the system prompt with the given variables.
    ///
    /// # Errors
    ///
    /// Same as [`PromptTemplate::render`].
    pub fn render_system_prompt(
        &self,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<Option<String>, PromptError> {
        self.system_prompt
            .as_deref()
            .map(|template| self.render_text(template, variables))
            .transpose()
    }

    /// Validates that all required variables are provided.
    ///
    /// # Errors
    ///
    /// Returns the first missing required variable, by name order.
    pub fn validate_variables(
        &self,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<(), PromptError> {
        let mut missing: Vec<&String> = self
            .variables
            .iter()
            .filter(|(_, def)| def.required && def.default.is_none())
            .filter(|(name, _)| lookup(variables, name).is_none())
            .map(|(name, _)| name)
            .collect();
        missing.sort();

        match missing.first() {
            None => Ok(()),
            Some(variable) => Err(PromptError::MissingVariable {
                template: self.name.clone(),
                variable: (*variable).clone(),
            }),
        }
    }

    fn value_of(&self, variables: &HashMap<String, JsonValue>, name: &str) -> Option<String> {
        lookup(variables, name).or_else(|| {
            self.variables
                .get(name)
                .and_then(|def| def.default.as_ref())
                .map(as_text)
        })
    }

    fn render_text(
        &self,
        template: &str,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<String, PromptError> {
        let sectioned = self.render_sections(template, variables)?;

        // Single pass, so substituted values are never scanned for placeholders.
        let mut result = String::with_capacity(sectioned.len());
        let mut rest = sectioned.as_str();
        while let Some(start) = rest.find("{{") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                rest = &rest[start..];
                break;
            };
            let name = after[..end].trim();
            if variables.contains_key(name) || self.variables.contains_key(name) {
                result.push_str(&self.value_of(variables, name).unwrap_or_default());
            } else {
                result.push_str(&rest[start..start + 2 + end + 2]);
            }
            rest = &after[end + 2..];
        }
        result.push_str(rest);

        Ok(result)
    }

    fn render_sections(
        &self,
        template: &str,
        variables: &HashMap<String, JsonValue>,
    ) -> Result<String, PromptError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(SECTION_OPEN) {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + SECTION_OPEN.len()..];

            let name_end = after_open
                .find("}}")
                .ok_or_else(|| self.parse_failed("unterminated section tag"))?;
            let name = after_open[..name_end].trim();
            let body_and_rest = &after_open[name_end + 2..];

            let body_end = body_and_rest
                .find(SECTION_CLOSE)
                .ok_or_else(|| self.parse_failed(format!("section '{name}' is never closed")))?;
            let body = &body_and_rest[..body_end];
            if body.contains(SECTION_OPEN) {
                return Err(self.parse_failed(format!("section '{name}' contains a nested section")));
            }

            if self.value_of(variables, name).is_some() {
                out.push_str(body);
            }
            rest = &body_and_rest[body_end + SECTION_CLOSE.len()..];
        }

        out.push_str(rest);
        Ok(out)
    }

    fn parse_failed(&self, reason: impl Into<String>) -> PromptError {
        PromptError::ParseFailed {
            template: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// A variable counts as provided when it is present and not null, `false`
/// or blank.
fn lookup(variables: &HashMap<String, JsonValue>, name: &str) -> Option<String> {
    variables
        .get(name)
        .filter(|value| !matches!(value, JsonValue::Null | JsonValue::Bool(false)))
        .map(as_text)
        .filter(|text| !text.trim().is_empty())
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
