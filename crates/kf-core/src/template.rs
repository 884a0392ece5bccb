//! Variable substitution for container command templates.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Variable substitution context for command templates.
///
/// Templates reference variables as `{name}`. Substitution is a single pass,
/// so a substituted value containing braces is copied verbatim. Referencing a
/// variable that was never set is an error.
///
/// # Example
///
/// ```
/// use kf_core::template::TemplateContext;
///
/// let ctx = TemplateContext::new()
///     .with_var("id", "17")
///     .with_var("url", "https://example.com/watch?v=x");
///
/// assert_eq!(ctx.render("/output/{id}.wav").unwrap(), "/output/17.wav");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn with_var(mut self, key: &str, value: impl ToString) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Substitute variables in one template string.
    pub fn render(&self, template: &str) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Err(Error::Validation(format!(
                    "unterminated variable in template: {template}"
                )));
            };
            let name = &after[..close];
            let value = self.vars.get(name).ok_or_else(|| {
                Error::Validation(format!("unknown template variable {{{name}}} in: {template}"))
            })?;
            out.push_str(value);
            rest = &after[close + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }

    /// Substitute variables in every argument of a command template.
    pub fn render_all(&self, templates: &[String]) -> Result<Vec<String>> {
        templates.iter().map(|t| self.render(t)).collect()
    }
}
