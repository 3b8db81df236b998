use std::cmp::Reverse;

use super::Issue;

/// Issues whose title, content and category together contain every word of
/// `query` (case-insensitive), newest first. A blank query matches nothing.
pub fn search_issues(issues: &[Issue], query: &str) -> Vec<Issue> {
  let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
  if terms.is_empty() {
    return Vec::new();
  }

  let mut matches: Vec<Issue> = issues
    .iter()
    .filter(|issue| {
      let haystack =
        format!("{} {} {}", issue.title, issue.content, issue.category).to_lowercase();
      terms.iter().all(|term| haystack.contains(term.as_str()))
    })
    .cloned()
    .collect();

  matches.sort_by_key(|issue| Reverse(issue.created_at));
  matches
}
