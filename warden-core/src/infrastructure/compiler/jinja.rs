// warden-core/src/infrastructure/compiler/jinja.rs

// Renders rule SQL (`{{ table }}`, `{{ column }}`) and remediation scripts.

use minijinja::{Environment, UndefinedBehavior};

use crate::application::ports::TemplateEngine;
use crate::domain::catalog::quote_ident;
use crate::error::WardenError;
use crate::infrastructure::error::InfrastructureError;

pub struct JinjaRenderer {
    env: Environment<'static>,
}

impl JinjaRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // A typo in a rule template must fail the rule, not render an empty identifier.
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_filter("ident", |value: String| quote_ident(&value));
        Self { env }
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaRenderer {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, WardenError> {
        self.env
            .render_str(template, context)
            .map_err(|e| WardenError::Infrastructure(InfrastructureError::TemplateError(e)))
    }
}
