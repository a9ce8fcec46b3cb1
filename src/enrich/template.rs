//! Narrowly-scoped text templating for live-data fragments.
//!
//! A template is literal text with `{{ expression }}` placeholders; the
//! expressions are the same sandboxed grammar used for validation rules,
//! evaluated against the live-data JSON bound as `model`. The engine has
//! no access to the host process, file system, or network, and both
//! compilation and rendering failures are structured diagnostics.

use serde_json::Value;

use crate::enrich::expr::{Expr, ExprError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
    #[error("template expression error: {0}")]
    Eval(#[from] ExprError),
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Placeholder(Expr),
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(input: &str) -> Result<Template, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = input;

        while let Some(open) = rest.find("{{") {
            if !rest[..open].is_empty() {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or_else(|| {
                TemplateError::Parse("unclosed `{{` placeholder".to_string())
            })?;
            let inner = after_open[..close].trim();
            if inner.is_empty() {
                return Err(TemplateError::Parse("empty placeholder".to_string()));
            }
            let expr = Expr::parse(inner)
                .map_err(|e| TemplateError::Parse(format!("in `{{{{ {inner} }}}}`: {e}")))?;
            segments.push(Segment::Placeholder(expr));
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Template { segments })
    }

    pub fn render(&self, model: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(expr) => {
                    let value = expr.eval(model)?;
                    out.push_str(&value_to_text(&value));
                }
            }
        }
        Ok(out)
    }
}

/// Plain-text rendering of a JSON value: strings unquoted, null empty,
/// integers without a trailing `.0`, composites as compact JSON.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return format!("{}", f as i64);
                }
            }
            n.to_string()
        }
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_text_passthrough() {
        let template = Template::parse("no placeholders here").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "no placeholders here");
    }

    #[test]
    fn test_single_placeholder() {
        let template = Template::parse("Price: {{ model.price }} EUR").unwrap();
        let model = json!({"price": 19.9});
        assert_eq!(template.render(&model).unwrap(), "Price: 19.9 EUR");
    }

    #[test]
    fn test_integer_numbers_render_without_fraction() {
        let template = Template::parse("{{ model.stock }} in stock").unwrap();
        assert_eq!(template.render(&json!({"stock": 12})).unwrap(), "12 in stock");
        // Arithmetic goes through f64 but still renders as an integer
        let template = Template::parse("{{ model.stock + 1 }}").unwrap();
        assert_eq!(template.render(&json!({"stock": 12})).unwrap(), "13");
    }

    #[test]
    fn test_multiple_placeholders_and_nesting() {
        let template =
            Template::parse("{{model.name}}: {{ model.price.amount }} {{model.price.currency}}")
                .unwrap();
        let model = json!({"name": "Widget", "price": {"amount": 5, "currency": "EUR"}});
        assert_eq!(template.render(&model).unwrap(), "Widget: 5 EUR");
    }

    #[test]
    fn test_null_renders_empty_and_bool_renders_word() {
        let template = Template::parse("[{{ model.missing_ok }}|{{ model.flag }}]").unwrap();
        let model = json!({"missing_ok": null, "flag": true});
        assert_eq!(template.render(&model).unwrap(), "[|true]");
    }

    #[test]
    fn test_array_renders_as_json() {
        let template = Template::parse("{{ model.tags }}").unwrap();
        let model = json!({"tags": ["a", "b"]});
        assert_eq!(template.render(&model).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn test_missing_field_is_a_render_error() {
        let template = Template::parse("{{ model.absent }}").unwrap();
        assert!(matches!(
            template.render(&json!({})),
            Err(TemplateError::Eval(ExprError::MissingField(_)))
        ));
    }

    #[test]
    fn test_unclosed_placeholder_is_a_parse_error() {
        assert!(matches!(
            Template::parse("text {{ model.a"),
            Err(TemplateError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_placeholder_is_a_parse_error() {
        assert!(matches!(Template::parse("{{   }}"), Err(TemplateError::Parse(_))));
    }

    #[test]
    fn test_bad_expression_is_a_parse_error() {
        assert!(matches!(
            Template::parse("{{ model..a }}"),
            Err(TemplateError::Parse(_))
        ));
    }

    #[test]
    fn test_conditional_style_expression() {
        // Templates share the expression grammar, so comparisons work too.
        let template = Template::parse("available: {{ model.stock > 0 }}").unwrap();
        assert_eq!(template.render(&json!({"stock": 3})).unwrap(), "available: true");
    }

    #[test]
    fn test_stray_closing_braces_are_literal_text() {
        let template = Template::parse("a }} b").unwrap();
        assert_eq!(template.render(&json!({})).unwrap(), "a }} b");
    }
}
