//! `{{ expression }}` template interpolation
//!
//! HTTP nodes interpolate URLs, header values, and string bodies against
//! the execution scope. Segments between `{{` and `}}` are compiled with
//! the expression grammar at graph-build time, so their `node.<id>`
//! references contribute implicit edges exactly like condition
//! expressions do.

use super::{compile, stringify, CompiledExpr, Scope};
use seam_node::error::{FlowError, Result};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Expr(CompiledExpr),
}

/// A compiled template string.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Compile a template, turning each `{{ ... }}` segment into a compiled
    /// expression. Text without `{{` compiles to a single literal part.
    pub fn compile(source: &str, max_depth: usize) -> Result<Self> {
        let mut parts = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            if !rest[..open].is_empty() {
                parts.push(Part::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or_else(|| FlowError::Syntax {
                line: 1,
                col: open + 1,
                message: "unterminated '{{' in template".into(),
            })?;
            let expr_source = &after_open[..close];
            parts.push(Part::Expr(compile(expr_source, max_depth)?));
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// Whether the text contains any template segment at all.
    pub fn is_templated(source: &str) -> bool {
        source.contains("{{")
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Union of the node ids referenced by every segment.
    pub fn referenced_nodes(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        for part in &self.parts {
            if let Part::Expr(expr) = part {
                refs.extend(expr.referenced_nodes().iter().cloned());
            }
        }
        refs
    }

    /// Render against a scope. Expression results are stringified the way
    /// `toString()` does: strings verbatim, everything else as JSON text.
    pub fn render(&self, scope: &Scope) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Expr(expr) => {
                    let value: Value = expr.evaluate(scope)?;
                    out.push_str(&stringify(&value));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn scope() -> Scope {
        Scope {
            results: BTreeMap::from([("user".to_string(), json!({"id": 7}))]),
            variables: BTreeMap::from([("host".to_string(), json!("api.example.com"))]),
            ..Scope::default()
        }
    }

    #[test]
    fn renders_mixed_literal_and_expressions() {
        let t = Template::compile("https://{{ variables.host }}/users/{{ node.user.id }}", 64)
            .unwrap();
        assert_eq!(
            t.render(&scope()).unwrap(),
            "https://api.example.com/users/7"
        );
    }

    #[test]
    fn plain_text_renders_verbatim() {
        let t = Template::compile("https://example.com/static", 64).unwrap();
        assert_eq!(t.render(&scope()).unwrap(), "https://example.com/static");
        assert!(!Template::is_templated("https://example.com/static"));
    }

    #[test]
    fn reports_referenced_nodes() {
        let t = Template::compile("{{ node.a.value }}-{{ node.b.value }}", 64).unwrap();
        assert_eq!(
            t.referenced_nodes(),
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn unterminated_segment_is_a_syntax_error() {
        assert!(matches!(
            Template::compile("https://{{ variables.host", 64).unwrap_err(),
            FlowError::Syntax { .. }
        ));
    }

    #[test]
    fn bad_inner_expression_fails_at_compile_time() {
        assert!(Template::compile("{{ bogus( }}", 64).is_err());
    }
}
