use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use issue_desk::assistant::CommandAssistant;
use issue_desk::chat::{self, ChatStore};
use issue_desk::config::Config;
use issue_desk::desk::{Desk, Feed};
use issue_desk::error::Result;
use issue_desk::issue::{format_date, Issue, IssueStatus, NewIssue};
use issue_desk::migrate::{self, MigrationRunner};
use issue_desk::route::{issue_url, Route, Section};
use issue_desk::space::{LocalSpace, Space};

#[derive(Parser)]
#[command(
  name = "issue-desk",
  about = "Report, search and triage issues through an assistant chat"
)]
struct Cli {
  #[command(subcommand)]
  command: Commands,

  /// Path to config file
  #[arg(short, long, default_value = "issue-desk.yaml")]
  config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
  /// List issues, newest first
  List,
  /// Search titles, content and categories
  Search {
    /// Space-separated terms; all must match
    query: String,
  },
  /// Show one issue with its comments
  Show {
    /// Issue ID
    id: String,
  },
  /// Resolve a shared link (e.g. `/issue-desk/#/issues/<id>`)
  Open { link: String },
  /// Create an issue directly, without the chat
  Create {
    /// Issue title
    title: String,
    /// Issue content
    #[arg(long, default_value = "")]
    content: String,
    /// Category (first word is kept)
    #[arg(long, default_value = "")]
    category: String,
    /// Mark as a bug report
    #[arg(long)]
    bug: bool,
    /// Images to attach
    #[arg(long)]
    attach: Vec<PathBuf>,
  },
  /// Send a message in the issue chat
  Chat { message: String },
  /// Ask the assistant to summarize the chat
  Summarize,
  /// Save the summarized chat as an issue
  Approve,
  /// Throw away the current chat
  Discard,
  /// Change the status of an issue you created
  Status {
    /// Issue ID
    id: String,
    /// Open, Solved or Rejected
    status: IssueStatus,
  },
  /// Change the category of an issue you created
  Recategorize {
    /// Issue ID
    id: String,
    category: String,
  },
  /// Comment on an issue
  Comment {
    /// Issue ID
    id: String,
    text: String,
  },
  /// Attach images to an issue you created
  Attach {
    /// Issue ID
    id: String,
    #[arg(required = true)]
    files: Vec<PathBuf>,
  },
  /// Download an attachment
  Media {
    /// Attachment reference as listed by `show`
    reference: String,
    /// Output file
    output: PathBuf,
  },
  /// Give every unnumbered issue a number
  Number,
  /// Apply pending data migrations
  Migrate,
  /// Keep the issue list up to date until interrupted
  Watch,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();

  if let Err(e) = run(cli).await {
    error!("{e}");
    std::process::exit(1);
  }
}

async fn run(cli: Cli) -> Result<()> {
  let config = Config::load(&cli.config)?;

  match cli.command {
    Commands::List => cmd_list(&desk(&config)?).await,
    Commands::Search { query } => cmd_search(&desk(&config)?, &query).await,
    Commands::Show { id } => cmd_show(&desk(&config)?, &id).await,
    Commands::Open { link } => cmd_open(&config, &link).await,
    Commands::Create {
      title,
      content,
      category,
      bug,
      attach,
    } => cmd_create(&desk(&config)?, title, content, category, bug, &attach).await,
    Commands::Chat { message } => cmd_chat(&config, &message).await,
    Commands::Summarize => cmd_summarize(&config).await,
    Commands::Approve => cmd_approve(&config).await,
    Commands::Discard => {
      ChatStore::new(&config.settings.chat_state_file).clear();
      println!("Chat discarded.");
      Ok(())
    }
    Commands::Status { id, status } => {
      let desk = desk(&config)?;
      let issue = desk.find_issue(&id).await?;
      let issue = desk.update_status(&issue, status).await?;
      println!("{issue} is now {}", issue.status);
      Ok(())
    }
    Commands::Recategorize { id, category } => {
      let desk = desk(&config)?;
      let issue = desk.find_issue(&id).await?;
      let issue = desk.update_category(&issue, &category).await?;
      println!("{issue} is now in {}", issue.category);
      Ok(())
    }
    Commands::Comment { id, text } => {
      let desk = desk(&config)?;
      desk.find_issue(&id).await?;
      let comment = desk.add_comment(&id, &text).await?;
      println!("Commented on {id} as {}", comment.author());
      Ok(())
    }
    Commands::Attach { id, files } => {
      let desk = desk(&config)?;
      let issue = desk.find_issue(&id).await?;
      let issue = desk.attach_files(&issue, &files).await?;
      println!(
        "{issue} has {} attachment(s)",
        issue.attachments.as_ref().map_or(0, Vec::len)
      );
      Ok(())
    }
    Commands::Media { reference, output } => {
      let bytes = desk(&config)?.fetch_attachment(&reference).await?;
      std::fs::write(&output, &bytes)?;
      println!("Saved {} bytes to {}", bytes.len(), output.display());
      Ok(())
    }
    Commands::Number => cmd_number(&desk(&config)?).await,
    Commands::Migrate => cmd_migrate(&config).await,
    Commands::Watch => cmd_watch(&desk(&config)?).await,
  }
}

fn open_space(config: &Config) -> LocalSpace {
  LocalSpace::open(&config.space.store, config.user.identity())
}

fn desk(config: &Config) -> Result<Desk<LocalSpace>> {
  Desk::new(open_space(config), config.settings.clone())
}

fn print_issues(issues: &[Issue]) {
  if issues.is_empty() {
    println!("No issues.");
    return;
  }
  for issue in issues {
    let id = issue.id.as_deref().unwrap_or("-");
    println!(
      "{:<6} {:<9} {:<12} {}  ({}, {id})",
      issue
        .issue_number
        .map_or_else(|| "#-".to_string(), |n| format!("#{n}")),
      issue.status.as_str(),
      issue.category,
      issue.display_title(),
      format_date(issue.created_at),
    );
  }
}

async fn cmd_list(desk: &Desk<LocalSpace>) -> Result<()> {
  let feed = Feed::new();
  feed.refresh(desk).await;
  print_issues(&feed.snapshot());
  Ok(())
}

async fn cmd_search(desk: &Desk<LocalSpace>, query: &str) -> Result<()> {
  let results = desk.search(query).await;
  println!("{} result(s) for {query:?}", results.len());
  print_issues(&results);
  Ok(())
}

async fn cmd_show(desk: &Desk<LocalSpace>, id: &str) -> Result<()> {
  let issue = desk.find_issue(id).await?;
  let parsed = issue.parsed_content();

  println!("{issue}");
  println!("{}", "=".repeat(issue.to_string().chars().count()));
  println!("Status:   {}", issue.status);
  println!("Category: {}", issue.category);
  if issue.is_bug == Some(true) {
    println!("Type:     Bug");
  }
  println!(
    "Created:  {} by {}",
    format_date(issue.created_at),
    issue.created_by_name.as_deref().unwrap_or("Unknown User")
  );
  println!("Link:     {}", issue_url(&desk.settings().base_url, id));
  println!();

  if let Some(summary) = &parsed.summary {
    println!("Summary: {summary}");
    println!();
  }
  println!("{}", parsed.body);

  if let Some(attachments) = issue.attachments.as_ref().filter(|a| !a.is_empty()) {
    println!();
    println!("Attachments:");
    for reference in attachments {
      println!("  {reference}");
    }
  }

  let comments = desk.list_comments(id).await?;
  if !comments.is_empty() {
    println!();
    println!("Comments ({}):", comments.len());
    for comment in &comments {
      println!(
        "  [{}] {}: {}",
        format_date(comment.created_at),
        comment.author(),
        comment.content
      );
    }
  }

  Ok(())
}

async fn cmd_open(config: &Config, link: &str) -> Result<()> {
  let route = Route::parse(link);
  debug!("resolved {link} to {route}");

  match (route.section, route.issue_id) {
    (Section::Issues, Some(id)) => cmd_show(&desk(config)?, &id).await,
    (Section::Issues, None) => cmd_list(&desk(config)?).await,
    (Section::Search, _) => {
      println!("Use `issue-desk search <query>` to search issues.");
      Ok(())
    }
    (Section::Chat, _) => {
      let state = ChatStore::new(&config.settings.chat_state_file).load();
      if state.messages.is_empty() {
        println!("No chat in progress. Start one with `issue-desk chat <message>`.");
      } else {
        println!("{}", chat::transcript(&state.messages));
      }
      Ok(())
    }
  }
}

async fn cmd_create(
  desk: &Desk<LocalSpace>,
  title: String,
  content: String,
  category: String,
  bug: bool,
  attach: &[PathBuf],
) -> Result<()> {
  let issue = desk
    .create_issue(NewIssue {
      title,
      content,
      category,
      is_bug: bug.then_some(true),
      ..NewIssue::default()
    })
    .await?;

  let issue = if attach.is_empty() {
    issue
  } else {
    desk.attach_files(&issue, attach).await?
  };

  println!("Created {issue}");
  if let Some(id) = &issue.id {
    println!("{}", issue_url(&desk.settings().base_url, id));
  }
  Ok(())
}

async fn cmd_chat(config: &Config, message: &str) -> Result<()> {
  let store = ChatStore::new(&config.settings.chat_state_file);
  let mut state = store.load();
  state.input = message.to_string();
  store.save(&state);

  let assistant = CommandAssistant::new(&config.assistant);
  let reply = chat::send_message(&assistant, &mut state, message).await?;
  store.save(&state);

  println!("{reply}");
  Ok(())
}

async fn cmd_summarize(config: &Config) -> Result<()> {
  let store = ChatStore::new(&config.settings.chat_state_file);
  let mut state = store.load();

  let assistant = CommandAssistant::new(&config.assistant);
  let summary = chat::request_summary(&assistant, &mut state).await?;
  store.save(&state);

  println!("Title:    {}", summary.title);
  println!("Category: {}", summary.category);
  println!("Summary:  {}", summary.summary);
  println!();
  println!("Run `issue-desk approve` to save it, or keep chatting.");
  Ok(())
}

async fn cmd_approve(config: &Config) -> Result<()> {
  let desk = desk(config)?;
  let store = ChatStore::new(&config.settings.chat_state_file);
  let mut state = store.load();

  let issue = chat::approve(&desk, &mut state).await?;
  store.clear();

  println!("Saved {issue}");
  if let Some(id) = &issue.id {
    println!("{}", issue_url(&config.settings.base_url, id));
  }
  Ok(())
}

async fn cmd_number(desk: &Desk<LocalSpace>) -> Result<()> {
  let mut issues = desk.list_issues().await;
  let report = desk.assign_missing_numbers(&mut issues).await;

  for (id, number) in &report.assigned {
    println!("  #{number} -> {id}");
  }
  println!(
    "Assigned {} number(s), {} failed.",
    report.assigned.len(),
    report.failed.len()
  );
  Ok(())
}

async fn cmd_migrate(config: &Config) -> Result<()> {
  let space = open_space(config);
  let report = MigrationRunner::new(&space, &config.migrations, migrate::builtin())
    .run()
    .await?;

  if report.applied.is_empty() {
    println!("Schema is up to date (version {}).", report.to);
  } else {
    println!(
      "Migrated from version {} to {}: {}",
      report.from,
      report.to,
      report.applied.join(", ")
    );
  }
  Ok(())
}

async fn cmd_watch(desk: &Desk<LocalSpace>) -> Result<()> {
  let interval = Duration::from_secs(desk.settings().poll_interval_secs);
  let feed = Feed::new();
  let mut events = desk.space().subscribe();

  loop {
    info!("refreshing issues...");
    if feed.refresh(desk).await {
      print_issues(&feed.snapshot());
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            return Ok(());
        }
        event = events.recv() => match event {
            Ok(event) => debug!("space changed: {event:?}"),
            Err(RecvError::Lagged(n)) => warn!("missed {n} change event(s)"),
            Err(RecvError::Closed) => return Ok(()),
        },
        _ = tokio::time::sleep(interval) => {}
    }
  }
}
