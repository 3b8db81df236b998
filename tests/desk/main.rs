use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use issue_desk::config::{MigrationSettings, Settings};
use issue_desk::desk::{Desk, Feed};
use issue_desk::error::DeskError;
use issue_desk::issue::{IssueStatus, NewIssue};
use issue_desk::migrate::{self, MigrationRunner};
use issue_desk::space::{LocalSpace, UserIdentity};

fn user(id: &str) -> Option<UserIdentity> {
  Some(UserIdentity {
    id: id.into(),
    name: Some(format!("{id} name")),
  })
}

fn desk_for(store: &Path, user_id: &str) -> Desk<LocalSpace> {
  Desk::new(LocalSpace::open(store, user(user_id)), Settings::default()).unwrap()
}

fn write_store(store: &Path, objects: serde_json::Value) {
  std::fs::write(store, json!({ "objects": objects }).to_string()).unwrap();
}

fn quick_migrations() -> MigrationSettings {
  MigrationSettings {
    update_delay_secs: 0,
    ..MigrationSettings::default()
  }
}

// --- creating and reading ---

#[tokio::test]
async fn created_issue_is_listed_with_truncated_title_and_number() {
  let dir = TempDir::new().unwrap();
  let desk = desk_for(&dir.path().join("space.json"), "alice");

  let created = desk
    .create_issue(NewIssue {
      title: "A".repeat(80),
      content: "Details".into(),
      category: "Bug report".into(),
      ..NewIssue::default()
    })
    .await
    .unwrap();
  assert_eq!(created.issue_number, Some(1));

  let issues = desk.list_issues().await;
  assert_eq!(issues.len(), 1);
  assert_eq!(issues[0].title.chars().count(), 50);
  assert_eq!(issues[0].category, "Bug");
  assert_eq!(issues[0].created_by.as_deref(), Some("alice"));
  assert_eq!(issues[0].id, created.id);
}

#[tokio::test]
async fn numbers_continue_across_handles() {
  let dir = TempDir::new().unwrap();
  let store = dir.path().join("space.json");

  let first = desk_for(&store, "alice")
    .create_issue(NewIssue {
      title: "First".into(),
      ..NewIssue::default()
    })
    .await
    .unwrap();
  let second = desk_for(&store, "bob")
    .create_issue(NewIssue {
      title: "Second".into(),
      ..NewIssue::default()
    })
    .await
    .unwrap();

  assert_eq!(first.issue_number, Some(1));
  assert_eq!(second.issue_number, Some(2));
}

#[tokio::test]
async fn search_matches_all_terms() {
  let dir = TempDir::new().unwrap();
  let desk = desk_for(&dir.path().join("space.json"), "alice");

  for (title, content) in [
    ("Export fails", "CSV export crashes in Firefox"),
    ("Login slow", "Takes ten seconds in Firefox"),
  ] {
    desk
      .create_issue(NewIssue {
        title: title.into(),
        content: content.into(),
        ..NewIssue::default()
      })
      .await
      .unwrap();
  }

  let hits = desk.search("firefox EXPORT").await;
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].title, "Export fails");
  assert_eq!(desk.search("firefox").await.len(), 2);
  assert!(desk.search("   ").await.is_empty());
}

// --- ownership ---

#[tokio::test]
async fn only_the_author_can_edit() {
  let dir = TempDir::new().unwrap();
  let store = dir.path().join("space.json");
  let alice = desk_for(&store, "alice");
  let bob = desk_for(&store, "bob");

  let issue = alice
    .create_issue(NewIssue {
      title: "Mine".into(),
      ..NewIssue::default()
    })
    .await
    .unwrap();
  let id = issue.id.clone().unwrap();

  let seen_by_bob = bob.find_issue(&id).await.unwrap();
  let err = bob
    .update_status(&seen_by_bob, IssueStatus::Rejected)
    .await
    .unwrap_err();
  assert!(matches!(err, DeskError::Forbidden { ref owner, .. } if owner == "alice"));

  alice.update_status(&issue, IssueStatus::Solved).await.unwrap();
  alice.update_category(&issue, "ux tweaks").await.unwrap();
  let reloaded = bob.find_issue(&id).await.unwrap();
  assert_eq!(reloaded.status, IssueStatus::Solved);
  assert_eq!(reloaded.category, "ux");
}

#[tokio::test]
async fn anyone_may_comment() {
  let dir = TempDir::new().unwrap();
  let store = dir.path().join("space.json");
  let alice = desk_for(&store, "alice");
  let bob = desk_for(&store, "bob");

  let issue = alice
    .create_issue(NewIssue {
      title: "Discuss".into(),
      ..NewIssue::default()
    })
    .await
    .unwrap();
  let id = issue.id.unwrap();

  alice.add_comment(&id, "first").await.unwrap();
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  bob.add_comment(&id, "second").await.unwrap();

  let comments = alice.list_comments(&id).await.unwrap();
  let texts: Vec<&str> = comments.iter().map(|c| c.content.as_str()).collect();
  assert_eq!(texts, vec!["first", "second"]);
  assert_eq!(comments[1].created_by.as_deref(), Some("bob"));
}

#[tokio::test]
async fn attachments_round_trip_through_media() {
  let dir = TempDir::new().unwrap();
  let desk = desk_for(&dir.path().join("space.json"), "alice");
  let image = dir.path().join("screen.PNG");
  let notes = dir.path().join("notes.txt");
  std::fs::write(&image, b"png bytes").unwrap();
  std::fs::write(&notes, b"text").unwrap();

  let issue = desk
    .create_issue(NewIssue {
      title: "With screenshot".into(),
      ..NewIssue::default()
    })
    .await
    .unwrap();
  let issue = desk.attach_files(&issue, &[image, notes]).await.unwrap();

  let attachments = issue.attachments.unwrap();
  assert_eq!(attachments.len(), 1);
  assert!(attachments[0].ends_with(".png"));
  assert_eq!(desk.fetch_attachment(&attachments[0]).await.unwrap(), b"png bytes");
}

// --- legacy data ---

#[tokio::test]
async fn feed_numbers_legacy_issues_by_age() {
  let dir = TempDir::new().unwrap();
  let store = dir.path().join("space.json");
  write_store(
    &store,
    json!([
      {"id": "new", "data": {"type": "issue", "title": "Newer", "createdAt": 1_700_000_200_000i64}},
      {"id": "old", "data": {"type": "Issue", "title": "Older", "createdAt": 1_700_000_100_000i64}},
      {"id": "numbered", "data": {"type": "Issue", "title": "Has one", "createdAt": 1_700_000_000_000i64, "issueNumber": 1}},
    ]),
  );
  let desk = desk_for(&store, "alice");

  let feed = Feed::new();
  assert!(feed.refresh(&desk).await);
  let issues = feed.snapshot();
  let numbers: Vec<(&str, Option<u64>)> = issues
    .iter()
    .map(|i| (i.id.as_deref().unwrap(), i.issue_number))
    .collect();
  assert_eq!(
    numbers,
    vec![("new", Some(3)), ("old", Some(2)), ("numbered", Some(1))]
  );

  // persisted, so a fresh handle sees the same numbers
  let reloaded = desk_for(&store, "bob").find_issue("old").await.unwrap();
  assert_eq!(reloaded.issue_number, Some(2));
}

#[tokio::test]
async fn migration_canonicalizes_legacy_store_once() {
  let dir = TempDir::new().unwrap();
  let store = dir.path().join("space.json");
  write_store(
    &store,
    json!([
      {"id": "flat", "type": "issue", "title": "Flat legacy", "description": "old body", "createdAt": 1_700_000_000_000i64},
      {"id": "wrapped", "data": {"type": "issue", "title": "B".repeat(70), "status": "closed"}},
    ]),
  );
  let space = LocalSpace::open(&store, None);
  let settings = quick_migrations();

  let report = MigrationRunner::new(&space, &settings, migrate::builtin())
    .run()
    .await
    .unwrap();
  assert_eq!(report.from, 0);
  assert_eq!(report.to, 1);

  let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
  let objects = raw["objects"].as_array().unwrap();
  let flat = objects.iter().find(|o| o["id"] == "flat").unwrap();
  assert_eq!(flat["type"], "Issue");
  assert_eq!(flat["content"], "old body");
  assert_eq!(flat["category"], "General");
  let wrapped = objects.iter().find(|o| o["id"] == "wrapped").unwrap();
  assert_eq!(wrapped["data"]["type"], "Issue");
  assert_eq!(wrapped["data"]["title"], "B".repeat(70));
  assert_eq!(wrapped["data"]["status"], "closed");
  assert!(wrapped["data"]["createdAt"].as_i64().unwrap() > 0);

  let again = MigrationRunner::new(&space, &settings, migrate::builtin())
    .run()
    .await
    .unwrap();
  assert!(again.applied.is_empty());
  assert_eq!(again.to, 1);

  let issues = desk_for(&store, "alice").list_issues().await;
  assert_eq!(issues.len(), 2);
  let shown = issues.iter().find(|i| i.id.as_deref() == Some("wrapped")).unwrap();
  assert_eq!(shown.title.chars().count(), 50);
  assert_eq!(shown.status, IssueStatus::Open);
}

#[tokio::test]
async fn signed_out_space_cannot_open_a_desk() {
  let dir = TempDir::new().unwrap();
  let space = LocalSpace::open(&dir.path().join("space.json"), None);
  assert!(matches!(
    Desk::new(space, Settings::default()),
    Err(DeskError::NotSignedIn)
  ));
}
