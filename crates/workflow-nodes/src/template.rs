//! `{{name}}` placeholders in prompts, answer templates and URLs

use once_cell::sync::Lazy;
use regex::Regex;
use workflow_engine::{Issue, IssueKind, Node};

static PLACEHOLDER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z_$0-9]*)(?:\.[^}]*)?\s*\}\}").ok());

/// Root names of every placeholder in `text`, in order of appearance
pub fn placeholders(text: &str) -> Vec<&str> {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// One issue per placeholder that names no input of the node
pub fn check_placeholders(node: &Node, text: &str, path: &str) -> Vec<Issue> {
    placeholders(text)
        .into_iter()
        .filter(|name| node.input(name).is_none())
        .map(|name| {
            Issue::new(
                &node.id,
                path,
                IssueKind::InvalidReference,
                format!("'{{{{{}}}}}' does not name an input", name),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("Answer {{query}} using {{ ctx.items }} and {{bad-name}}"),
            vec!["query", "ctx"]
        );
        assert!(placeholders("no placeholders here").is_empty());
    }
}
