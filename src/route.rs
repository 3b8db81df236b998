//! Hash routes for shareable links: `#/`, `#/issues`, `#/issues/:id` and
//! `#/search`. Hash routing keeps deep links working on static hosting.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
  Chat,
  Issues,
  Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
  pub section: Section,
  pub issue_id: Option<String>,
}

impl Route {
  pub fn issue(id: &str) -> Self {
    Self {
      section: Section::Issues,
      issue_id: Some(id.to_string()),
    }
  }

  /// Accepts a bare hash (`#/issues/abc`) or a full link containing one.
  /// Anything unrecognized routes to the chat.
  pub fn parse(link: &str) -> Self {
    let hash = link.find('#').map_or("", |i| &link[i..]);
    let path = hash.strip_prefix("#/").unwrap_or("");
    let mut parts = path.split('/').filter(|p| !p.is_empty());

    match parts.next() {
      Some("issues") => Self {
        section: Section::Issues,
        issue_id: parts.next().map(str::to_string),
      },
      Some("search") => Self {
        section: Section::Search,
        issue_id: None,
      },
      _ => Self {
        section: Section::Chat,
        issue_id: None,
      },
    }
  }
}

impl std::fmt::Display for Route {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (self.section, &self.issue_id) {
      (Section::Issues, Some(id)) => write!(f, "#/issues/{id}"),
      (Section::Issues, None) => f.write_str("#/issues"),
      (Section::Search, _) => f.write_str("#/search"),
      (Section::Chat, _) => f.write_str("#/"),
    }
  }
}

/// Shareable link to one issue under `base` (e.g. `/issue-desk/`).
pub fn issue_url(base: &str, issue_id: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), Route::issue(issue_id))
}
