//! Human-facing sequence numbers for issues.
//!
//! Numbers are assigned out of band: legacy issues get one the first time a
//! client loads them, new issues take `max + 1` at creation. Neither path is
//! transactional. Two clients creating at once can read the same maximum
//! and both write it plus one; nothing here detects that.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{info, warn};

use super::{Issue, ISSUE_TYPE, LEGACY_ISSUE_TYPE};
use crate::error::{DeskError, Result};
use crate::space::{record_data, record_id, Data, ObjectQuery, Space};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberAssignment {
  /// Position in the slice that was planned over.
  pub index: usize,
  pub id: String,
  pub number: u64,
}

#[derive(Debug, Default)]
pub struct NumberingReport {
  pub assigned: Vec<(String, u64)>,
  pub failed: Vec<String>,
}

/// Picks a number for every persisted issue that lacks one.
///
/// Numbers already used anywhere in `issues` are skipped. The oldest
/// unnumbered issue gets the lowest free number, and the counter only moves
/// forward, so no number is handed out twice in one plan.
pub fn plan_numbers(issues: &[Issue]) -> Vec<NumberAssignment> {
  let used: HashSet<u64> = issues.iter().filter_map(|i| i.issue_number).collect();

  let mut pending: Vec<(usize, &Issue)> = issues
    .iter()
    .enumerate()
    .filter(|(_, issue)| issue.issue_number.is_none())
    .filter(|(_, issue)| issue.write_id().is_some())
    .collect();
  pending.sort_by_key(|(_, issue)| issue.created_at);

  let mut next = 1u64;
  let mut plan = Vec::with_capacity(pending.len());
  for (index, issue) in pending {
    while used.contains(&next) {
      next += 1;
    }
    plan.push(NumberAssignment {
      index,
      id: issue.write_id().unwrap_or_default().to_string(),
      number: next,
    });
    next += 1;
  }
  plan
}

/// Writes a number to each unnumbered issue and mirrors successful writes
/// into `issues`. A failed write leaves that issue unnumbered; the rest
/// still go through.
pub async fn assign_missing_numbers<S: Space>(space: &S, issues: &mut [Issue]) -> NumberingReport {
  let plan = plan_numbers(issues);
  let mut report = NumberingReport::default();
  if plan.is_empty() {
    return report;
  }

  info!("assigning numbers to {} issue(s)", plan.len());
  for assignment in plan {
    let mut patch = Data::new();
    patch.insert("issueNumber".into(), Value::from(assignment.number));

    match space.update_object(&assignment.id, patch).await {
      Ok(()) => {
        issues[assignment.index].issue_number = Some(assignment.number);
        info!("issue {} is now #{}", assignment.id, assignment.number);
        report.assigned.push((assignment.id, assignment.number));
      }
      Err(e) => {
        warn!("could not number issue {}: {e}", assignment.id);
        report.failed.push(assignment.id);
      }
    }
  }
  report
}

/// One more than the highest number on any stored issue, looking at up to
/// `scan_limit` records of each type tag.
pub async fn next_issue_number<S: Space>(space: &S, scan_limit: usize) -> Result<u64> {
  let mut seen = HashSet::new();
  let mut highest = 0u64;

  for tag in [LEGACY_ISSUE_TYPE, ISSUE_TYPE] {
    let page = space
      .find_objects(&ObjectQuery::of_type(tag).limit(scan_limit))
      .await?;
    for record in &page.objects {
      if let Some(id) = record_id(record) {
        if !seen.insert(id) {
          continue;
        }
      }
      let number = record_data(record)
        .and_then(|d| d.get("issueNumber"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
      highest = highest.max(number);
    }
  }

  highest
    .checked_add(1)
    .ok_or_else(|| DeskError::Invalid(format!("no issue number left after {highest}")))
}
