use std::future::Future;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AssistantConfig;
use crate::error::{DeskError, Result};
use crate::issue::{IssueStatus, DEFAULT_CATEGORY, DEFAULT_TITLE};

pub const SUMMARY_PROMPT: &str = "Based on our conversation, provide a short title (3-6 words), \
a 2-3 sentence summary, and a category (1-3 words, e.g. Bug, Feature, UX). Reply with JSON only, \
no other text, in exactly this shape: {\"title\": \"...\", \"summary\": \"...\", \"category\": \"...\"}";

pub trait Assistant: Send + Sync {
  fn prompt(&self, text: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Talks to an assistant CLI (`claude -p` by default): the prompt goes in
/// on stdin and the reply is read from stdout.
#[derive(Debug, Clone)]
pub struct CommandAssistant {
  command: String,
  args: Vec<String>,
  timeout: Duration,
}

impl CommandAssistant {
  pub fn new(config: &AssistantConfig) -> Self {
    Self {
      command: config.command.clone(),
      args: config.args.clone(),
      timeout: Duration::from_secs(config.timeout_secs),
    }
  }
}

impl Assistant for CommandAssistant {
  async fn prompt(&self, text: &str) -> Result<String> {
    let runner = self.clone();
    let text = text.to_string();
    tokio::task::spawn_blocking(move || runner.run(&text))
      .await
      .map_err(|e| DeskError::Assistant(format!("spawn_blocking: {e}")))?
  }
}

impl CommandAssistant {
  fn run(&self, prompt: &str) -> Result<String> {
    info!("running {} {}", self.command, self.args.join(" "));
    debug!("prompt: {prompt}");

    let child = Command::new(&self.command)
      .args(&self.args)
      // allow running from inside another assistant session
      .env_remove("CLAUDECODE")
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|e| DeskError::Assistant(format!("failed to start {}: {e}", self.command)))?;

    let output = wait_with_timeout(child, prompt, self.timeout)?;
    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(DeskError::Assistant(format!(
        "{} exited with {}: {stderr}",
        self.command, output.status
      )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!("assistant output length: {} bytes", stdout.len());
    Ok(stdout)
  }
}

fn wait_with_timeout(
  mut child: std::process::Child,
  input: &str,
  timeout: Duration,
) -> Result<std::process::Output> {
  let stdout_pipe = child.stdout.take();
  let stderr_pipe = child.stderr.take();

  let stdout_handle = std::thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = stdout_pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    buf
  });
  let stderr_handle = std::thread::spawn(move || {
    let mut buf = Vec::new();
    if let Some(mut pipe) = stderr_pipe {
      let _ = pipe.read_to_end(&mut buf);
    }
    buf
  });

  // readers are already draining, so a long prompt cannot fill the pipes
  if let Some(mut stdin) = child.stdin.take() {
    if let Err(e) = stdin.write_all(input.as_bytes()) {
      warn!("could not write prompt to assistant: {e}");
    }
  }

  let start = std::time::Instant::now();
  let poll_interval = Duration::from_millis(200);

  loop {
    match child.try_wait()? {
      Some(status) => {
        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();
        return Ok(std::process::Output {
          status,
          stdout,
          stderr,
        });
      }
      None if start.elapsed() >= timeout => {
        warn!("assistant timed out after {}s, killing", timeout.as_secs());
        let _ = child.kill();
        let _ = child.wait();
        return Err(DeskError::Timeout(format!(
          "assistant timed out after {}s",
          timeout.as_secs()
        )));
      }
      None => std::thread::sleep(poll_interval),
    }
  }
}

/// The summary the user reviews before an issue is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSummary {
  pub title: String,
  pub summary: String,
  pub category: String,
  #[serde(default)]
  pub status: IssueStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_bug: Option<bool>,
}

impl IssueSummary {
  pub fn fallback(raw: &str) -> Self {
    Self {
      title: DEFAULT_TITLE.to_string(),
      summary: raw.to_string(),
      category: DEFAULT_CATEGORY.to_string(),
      status: IssueStatus::Open,
      is_bug: None,
    }
  }
}

#[derive(Deserialize)]
struct SummaryReply {
  title: Option<String>,
  summary: Option<String>,
  category: Option<String>,
  #[serde(rename = "isBug")]
  is_bug: Option<bool>,
}

/// Reads the assistant's summary reply. Anything that is not the expected
/// JSON becomes the summary text of a default summary.
pub fn parse_summary(raw: &str) -> IssueSummary {
  let raw = raw.trim();
  match serde_json::from_str::<SummaryReply>(extract_json(raw)) {
    Ok(reply) => IssueSummary {
      title: reply.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      summary: reply.summary.unwrap_or_default(),
      category: reply
        .category
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
      status: IssueStatus::Open,
      is_bug: reply.is_bug,
    },
    Err(e) => {
      warn!("assistant summary was not valid JSON ({e}), keeping raw text");
      IssueSummary::fallback(raw)
    }
  }
}

/// Assistant replies are not always bare JSON: they may sit in a markdown
/// code block or between sentences. Cuts out the JSON part.
fn extract_json(text: &str) -> &str {
  if let Some(start) = text.find("```json") {
    let json_start = start + 7;
    if let Some(end) = text[json_start..].find("```") {
      return text[json_start..json_start + end].trim();
    }
  }
  if let Some(start) = text.find("```") {
    let json_start = start + 3;
    let json_start = text[json_start..]
      .find('\n')
      .map(|n| json_start + n + 1)
      .unwrap_or(json_start);
    if let Some(end) = text[json_start..].find("```") {
      return text[json_start..json_start + end].trim();
    }
  }
  if let Some(start) = text.find('{') {
    if let Some(end) = text.rfind('}') {
      if end > start {
        return &text[start..=end];
      }
    }
  }
  text.trim()
}
