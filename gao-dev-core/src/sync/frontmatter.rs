//! Frontmatter codec for markdown files
//!
//! Treats a markdown blob as a structured YAML header between `---` fences
//! plus a free-form body. The header is a [`serde_yaml::Mapping`], which
//! preserves insertion order and round-trips unicode, nested maps, and
//! lists; unknown keys survive a parse/serialize cycle untouched.

use serde_yaml::{Mapping, Value};

use crate::error::Result;

/// Keys every story file must carry in its header
pub const REQUIRED_STORY_KEYS: &[&str] = &["epic", "story_num", "title", "status"];

/// Parse markdown content into `(header, body)`.
///
/// When no header is found, or the header fails to parse as YAML, this
/// yields an empty header and the stripped full text. It never fails.
pub fn parse(content: &str) -> (Mapping, String) {
    if let Some((header, body)) = split_frontmatter(content) {
        let body = body.trim().to_string();
        return match serde_yaml::from_str::<Value>(header) {
            Ok(Value::Mapping(mapping)) => (mapping, body),
            Ok(Value::Null) => (Mapping::new(), body),
            // Header present but not usable as a key-value map
            _ => (Mapping::new(), body),
        };
    }
    (Mapping::new(), content.trim().to_string())
}

/// Serialize a header and body into markdown content.
///
/// Always emits the opening fence, the header in insertion order, the
/// closing fence, a blank line, the body, and a trailing newline.
pub fn serialize(header: &Mapping, body: &str) -> Result<String> {
    let header_yaml = serde_yaml::to_string(header)?;
    Ok(format!("---\n{}---\n\n{}\n", header_yaml, body))
}

/// Check that a header carries all required story keys.
pub fn validate(header: &Mapping) -> bool {
    REQUIRED_STORY_KEYS
        .iter()
        .all(|key| header.contains_key(&Value::String(key.to_string())))
}

/// Split content into the raw header text and the body.
///
/// The header must open with `---` on the first line and close with a
/// `---` line; a closing fence with no trailing newline does not count.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = strip_fence_tail(rest)?;

    let mut search_from = 0;
    while let Some(pos) = rest[search_from..].find("\n---") {
        let fence_at = search_from + pos;
        let after = &rest[fence_at + 4..];
        if let Some(body) = strip_fence_tail(after) {
            return Some((&rest[..fence_at], body));
        }
        search_from = fence_at + 1;
    }
    None
}

/// Consume optional spaces after a fence and the required newline.
fn strip_fence_tail(s: &str) -> Option<&str> {
    let s = s.trim_start_matches(|c| c == ' ' || c == '\t' || c == '\r');
    s.strip_prefix('\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let content = "---\ntitle: My Story\nstatus: pending\n---\n\nStory content here\n";
        let (header, body) = parse(content);
        assert_eq!(
            header.get(&Value::String("title".into())),
            Some(&Value::String("My Story".into()))
        );
        assert_eq!(body, "Story content here");
    }

    #[test]
    fn test_parse_no_frontmatter() {
        let content = "Just some markdown\n\n## With a heading\n";
        let (header, body) = parse(content);
        assert!(header.is_empty());
        assert_eq!(body, "Just some markdown\n\n## With a heading");
    }

    #[test]
    fn test_parse_invalid_yaml_yields_empty_header() {
        let content = "---\n: : not yaml : :\n  - broken\n---\n\nBody\n";
        let (header, body) = parse(content);
        assert!(header.is_empty());
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_parse_empty_header() {
        let content = "---\n\n---\n\nBody\n";
        let (header, body) = parse(content);
        assert!(header.is_empty());
        assert_eq!(body, "Body");
    }

    #[test]
    fn test_parse_unclosed_fence_is_all_body() {
        let content = "---\ntitle: dangling\n\nNo closing fence";
        let (header, body) = parse(content);
        assert!(header.is_empty());
        assert_eq!(body, content.trim());
    }

    #[test]
    fn test_round_trip_preserves_order_and_unknown_keys() {
        let mut header = Mapping::new();
        header.insert(Value::String("epic".into()), Value::Number(1.into()));
        header.insert(Value::String("story_num".into()), Value::Number(2.into()));
        header.insert(Value::String("title".into()), Value::String("Résumé sync".into()));
        header.insert(Value::String("status".into()), Value::String("pending".into()));
        header.insert(
            Value::String("custom_key".into()),
            Value::String("preserved".into()),
        );

        let body = "## Notes\n\nSome body text";
        let text = serialize(&header, body).unwrap();
        let (parsed_header, parsed_body) = parse(&text);

        assert_eq!(parsed_header, header);
        assert_eq!(parsed_body, body);

        // Insertion order survives serialization
        let keys: Vec<_> = parsed_header
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["epic", "story_num", "title", "status", "custom_key"]);
    }

    #[test]
    fn test_serialize_shape() {
        let mut header = Mapping::new();
        header.insert(Value::String("title".into()), Value::String("Test".into()));
        let text = serialize(&header, "Content").unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("\n---\n\nContent\n"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_validate() {
        let mut header = Mapping::new();
        header.insert(Value::String("epic".into()), Value::Number(1.into()));
        assert!(!validate(&header));

        header.insert(Value::String("story_num".into()), Value::Number(1.into()));
        header.insert(Value::String("title".into()), Value::String("Test".into()));
        header.insert(Value::String("status".into()), Value::String("pending".into()));
        assert!(validate(&header));
    }
}
