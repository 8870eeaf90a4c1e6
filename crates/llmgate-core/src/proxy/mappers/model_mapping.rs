//! Model alias resolution for Anthropic model names.

use std::collections::BTreeMap;

/// Where a requested model ends up, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    pub model: String,
    /// `exact`, `wildcard:<pattern>` or `passthrough`
    pub reason: String,
}

/// Priority: exact match > wildcard match > passthrough.
///
/// Wildcard patterns are tried in key order, so the first lexicographic match wins.
pub fn resolve_model_route(original_model: &str, aliases: &BTreeMap<String, String>) -> ModelRoute {
    if let Some(target) = aliases.get(original_model) {
        tracing::info!("[Router] Exact mapping: {} -> {}", original_model, target);
        return ModelRoute { model: target.clone(), reason: "exact".to_string() };
    }

    for (pattern, target) in aliases {
        if pattern.contains('*') && wildcard_match(pattern, original_model) {
            tracing::info!(
                "[Router] Wildcard mapping: {} -> {} (rule: {})",
                original_model,
                target,
                pattern
            );
            return ModelRoute { model: target.clone(), reason: format!("wildcard:{pattern}") };
        }
    }

    ModelRoute { model: original_model.to_string(), reason: "passthrough".to_string() }
}

/// Single `*` wildcard: prefix and suffix must both match.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            text.len() >= prefix.len() + suffix.len()
                && text.starts_with(prefix)
                && text.ends_with(suffix)
        },
        None => pattern == text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_resolve_model_route_exact() {
        let mapping = aliases(&[("claude-x", "gpt-4o"), ("claude-*", "gpt-4")]);
        let route = resolve_model_route("claude-x", &mapping);
        assert_eq!(route.model, "gpt-4o");
        assert_eq!(route.reason, "exact");
    }

    #[test]
    fn test_resolve_model_route_wildcard() {
        let mapping = aliases(&[("claude-3*", "gpt-4o-mini")]);
        let route = resolve_model_route("claude-3-5-haiku-20241022", &mapping);
        assert_eq!(route.model, "gpt-4o-mini");
        assert_eq!(route.reason, "wildcard:claude-3*");
    }

    #[test]
    fn test_resolve_model_route_passthrough() {
        let route = resolve_model_route("gpt-4", &BTreeMap::new());
        assert_eq!(route.model, "gpt-4");
        assert_eq!(route.reason, "passthrough");
    }

    #[test]
    fn test_wildcard_prefix_suffix_do_not_overlap() {
        assert!(wildcard_match("ab*ba", "abba"));
        assert!(!wildcard_match("ab*ba", "aba"));
        assert!(wildcard_match("*-latest", "claude-latest"));
    }
}
