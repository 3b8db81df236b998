/// Marker the assistant's summary is appended after in an issue's content.
pub const SUMMARY_SEPARATOR: &str = "\n---\nSummary: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedContent {
  pub summary: Option<String>,
  pub body: String,
}

/// Splits stored content at the first summary separator.
///
/// Without a separator the content is returned untouched as the body. With
/// one, both halves are trimmed and an empty summary becomes `None`.
pub fn parse_content(content: Option<&str>) -> ParsedContent {
  let content = content.unwrap_or_default();
  match content.split_once(SUMMARY_SEPARATOR) {
    Some((body, summary)) => {
      let summary = summary.trim();
      ParsedContent {
        summary: (!summary.is_empty()).then(|| summary.to_string()),
        body: body.trim().to_string(),
      }
    }
    None => ParsedContent {
      summary: None,
      body: content.to_string(),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_splits_summary() {
    let parsed = parse_content(Some("A\n---\nSummary: B"));
    assert_eq!(parsed.summary.as_deref(), Some("B"));
    assert_eq!(parsed.body, "A");
  }

  #[test]
  fn test_no_separator_keeps_body() {
    for input in ["", "plain text", "  padded  ", "---\nSummary: no leading newline"] {
      let parsed = parse_content(Some(input));
      assert_eq!(parsed.summary, None);
      assert_eq!(parsed.body, input);
    }
  }

  #[test]
  fn test_missing_content() {
    let parsed = parse_content(None);
    assert_eq!(parsed.summary, None);
    assert_eq!(parsed.body, "");
  }

  #[test]
  fn test_blank_summary_is_none() {
    let parsed = parse_content(Some("  body text \n---\nSummary:    \n"));
    assert_eq!(parsed.summary, None);
    assert_eq!(parsed.body, "body text");
  }

  #[test]
  fn test_only_first_separator_splits() {
    let parsed = parse_content(Some("A\n---\nSummary: B\n---\nSummary: C"));
    assert_eq!(parsed.body, "A");
    assert_eq!(parsed.summary.as_deref(), Some("B\n---\nSummary: C"));
  }
}
