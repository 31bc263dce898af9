//! Template interpolation for job files
//!
//! Handles `{{ variable }}` interpolation in string values.
//! Supports nested access like `{{ env.BATCH_API_KEY }}` and `{{ vars.region }}`.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)\s*\}\}")
        .expect("template regex is valid")
});

/// Context for template interpolation
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    /// Environment variables
    pub env: Value,
    /// Additional variables
    pub vars: Value,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding the process environment
    pub fn from_env() -> Self {
        let env: serde_json::Map<String, Value> = std::env::vars()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Self {
            env: Value::Object(env),
            ..Default::default()
        }
    }

    /// Set environment values
    pub fn set_env(&mut self, env: Value) -> &mut Self {
        self.env = env;
        self
    }

    /// Set additional variables
    pub fn set_vars(&mut self, vars: Value) -> &mut Self {
        self.vars = vars;
        self
    }

    /// Get a value by path (e.g., "env.HOME")
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        let (first, rest) = parts.split_first()?;

        let root = match *first {
            "env" => &self.env,
            "vars" => &self.vars,
            // Bare names resolve against vars
            _ => return get_nested_value(&self.vars, &parts),
        };

        get_nested_value(root, rest)
    }
}

/// Get a nested value from a JSON value by path
fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        match current {
            Value::Object(map) => {
                current = map.get(*part)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

/// Render a template string with the given context
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = TEMPLATE_REGEX.replace_all(template, |cap: &regex::Captures<'_>| {
        let var_path = &cap[1];
        match ctx.get(var_path) {
            Some(value) => value_to_string(value),
            None => {
                missing.push(var_path.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Convert a JSON value to a string for template substitution
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render all string values in a JSON value
pub fn render_value(value: &Value, ctx: &TemplateContext) -> Result<Value> {
    match value {
        Value::String(s) if has_templates(s) => Ok(Value::String(render(s, ctx)?)),
        Value::Object(map) => {
            let mut new_map = serde_json::Map::new();
            for (k, v) in map {
                new_map.insert(k.clone(), render_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => {
            let rendered: Result<Vec<_>> = arr.iter().map(|v| render_value(v, ctx)).collect();
            Ok(Value::Array(rendered?))
        }
        _ => Ok(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> TemplateContext {
        let mut ctx = TemplateContext::new();
        ctx.set_env(json!({ "API_KEY": "k-123", "PORT": "5432" }));
        ctx.set_vars(json!({ "region": "eu", "db": { "name": "crm" } }));
        ctx
    }

    #[test]
    fn test_render_env_and_vars() {
        let ctx = context();
        assert_eq!(render("Bearer {{ env.API_KEY }}", &ctx).unwrap(), "Bearer k-123");
        assert_eq!(render("{{vars.region}}-{{ db.name }}", &ctx).unwrap(), "eu-crm");
        assert_eq!(render("no templates", &ctx).unwrap(), "no templates");
    }

    #[test]
    fn test_render_reports_all_missing_variables() {
        let err = render("{{ env.NOPE }} {{ vars.nada }}", &context()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Undefined variable in template: env.NOPE, vars.nada"
        );
    }

    #[test]
    fn test_render_value_nested() {
        let ctx = context();
        let value = json!({
            "connection": { "port": "{{ env.PORT }}" },
            "columns": ["a", "{{ vars.region }}"],
            "count": 3
        });
        let rendered = render_value(&value, &ctx).unwrap();
        assert_eq!(
            rendered,
            json!({
                "connection": { "port": "5432" },
                "columns": ["a", "eu"],
                "count": 3
            })
        );
    }

    #[test]
    fn test_from_env_contains_process_env() {
        let ctx = TemplateContext::from_env();
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(ctx.get("env.PATH"), Some(&Value::String(path)));
        }
    }
}
