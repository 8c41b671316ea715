//! Placeholder substitution for request paths, headers and bodies.
//!
//! Supported placeholders: `{{vu}}`, `{{iteration}}`, `{{timestamp}}`
//! (milliseconds since the Unix epoch) and `{{uuid}}` (fresh v4 per use).
//! Unknown placeholders are left untouched.

use serde_json::Value;

/// Values available to one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateVars {
    /// Session id
    pub vu: u64,
    /// Iteration number within the session
    pub iteration: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl TemplateVars {
    /// Variables stamped with the current time
    pub fn now(vu: u64, iteration: u64) -> Self {
        Self {
            vu,
            iteration,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Substitute placeholders in a string
    pub fn render(&self, template: &str) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let Some(close) = after.find("}}") else {
                out.push_str(&rest[open..]);
                return out;
            };
            let key = after[..close].trim();
            match key {
                "vu" => out.push_str(&self.vu.to_string()),
                "iteration" => out.push_str(&self.iteration.to_string()),
                "timestamp" => out.push_str(&self.timestamp_ms.to_string()),
                "uuid" => out.push_str(&uuid::Uuid::new_v4().to_string()),
                _ => out.push_str(&rest[open..open + 2 + close + 2]),
            }
            rest = &after[close + 2..];
        }
        out.push_str(rest);
        out
    }

    /// Substitute placeholders in every string of a JSON document
    pub fn render_json(&self, template: &Value) -> Value {
        match template {
            Value::String(s) => Value::String(self.render(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> TemplateVars {
        TemplateVars {
            vu: 7,
            iteration: 3,
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_render_plain_passthrough() {
        assert_eq!(vars().render("/api/projects"), "/api/projects");
    }

    #[test]
    fn test_render_known_placeholders() {
        assert_eq!(
            vars().render("/users/{{vu}}/runs/{{ iteration }}?t={{timestamp}}"),
            "/users/7/runs/3?t=1700000000000"
        );
    }

    #[test]
    fn test_render_uuid_is_fresh() {
        let a = vars().render("{{uuid}}");
        let b = vars().render("{{uuid}}");
        assert_eq!(a.len(), 36);
        assert_ne!(a, b);
    }

    #[test]
    fn test_render_unknown_and_unclosed() {
        assert_eq!(vars().render("{{nope}}-{{vu}}"), "{{nope}}-7");
        assert_eq!(vars().render("x{{vu"), "x{{vu");
    }

    #[test]
    fn test_render_json_recurses() {
        let body = json!({
            "name": "Load Test Project {{timestamp}}",
            "tags": ["vu-{{vu}}", 5],
            "nested": { "iteration": "{{iteration}}" },
            "zip": "12345"
        });
        let rendered = vars().render_json(&body);
        assert_eq!(rendered["name"], "Load Test Project 1700000000000");
        assert_eq!(rendered["tags"][0], "vu-7");
        assert_eq!(rendered["tags"][1], 5);
        assert_eq!(rendered["nested"]["iteration"], "3");
        assert_eq!(rendered["zip"], "12345");
    }

    #[test]
    fn test_now_uses_current_time() {
        let v = TemplateVars::now(1, 0);
        assert!(v.timestamp_ms > 1_600_000_000_000);
    }
}
