mod cache;
mod config;
mod db;
mod error;
mod event;
mod http;
mod lifecycle;
mod logging;
mod platform;
mod push;
mod router;
mod sync;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheStorage, SqliteStorage};
use crate::db::Database;
use crate::event::{EventOutcome, WorkerEvent};
use crate::http::{Method, Request};
use crate::lifecycle::LifecycleState;
use crate::platform::{HostPlatform, HttpNetwork};
use crate::sync::{ActionKind, PendingStore, SqlitePendingStore};

type HostWorker = worker::Worker<HttpNetwork, SqliteStorage, SqlitePendingStore, HostPlatform>;

#[derive(Parser, Debug)]
#[command(name = "dialdeck-worker")]
#[command(about = "Offline request router and background sync worker for DialDeck")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/dialdeck-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also write logs to a daily file in the data directory
  #[arg(long)]
  log_file: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the app shell, then activate and drop stale buckets
  Install {
    /// Stop after installing and leave the version waiting
    #[arg(long)]
    wait: bool,
  },
  /// Activate a version left waiting by `install --wait`
  Activate,
  /// Route one request through the worker and print the response
  Fetch {
    /// Absolute URL or path relative to the origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,
    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Queue an offline write for background sync
  Queue {
    /// send-message or make-call
    tag: String,
    /// JSON payload
    payload: String,
  },
  /// Replay queued writes for a tag (default: every registered tag)
  Sync { tag: Option<String> },
  /// Show a notification for a push payload
  Push { payload: Option<String> },
  /// Handle a click on a pushed notification
  Click {
    #[arg(default_value = "view")]
    action: String,
  },
  /// List cache buckets and pending actions
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let log_dir = if args.log_file {
    Some(config.data_dir()?)
  } else {
    None
  };
  let _log_guard = logging::init(log_dir.as_deref())?;

  let db = Arc::new(Database::open(&config.database_path()?)?);
  let platform = Arc::new(HostPlatform::new(Arc::clone(&db)));
  let worker = HostWorker::new(
    config.clone(),
    Arc::new(HttpNetwork::new(config.timeout())?),
    Arc::new(SqliteStorage::new(Arc::clone(&db))),
    Arc::new(SqlitePendingStore::new(Arc::clone(&db))),
    Arc::clone(&platform),
  )?;

  match args.command {
    Command::Install { wait } => {
      if worker.state() == LifecycleState::Active {
        println!("{} is already active", worker.config().version);
        return Ok(());
      }
      run(&worker, WorkerEvent::Install).await?;
      if !wait {
        run(&worker, WorkerEvent::Activate).await?;
      }
    }
    Command::Activate => run(&worker, WorkerEvent::Activate).await?,
    Command::Fetch {
      url,
      method,
      navigate,
      data,
    } => {
      let url = config.resolve(&url)?;
      let mut request = if navigate {
        Request::navigation(url)
      } else {
        Request::get(url)
      };
      request.method = method.parse::<Method>()?;
      if let Some(data) = data {
        let payload: serde_json::Value =
          serde_json::from_str(&data).map_err(|e| eyre!("Invalid JSON body: {}", e))?;
        let body = Request::post_json(request.url.clone(), &payload)?;
        request.headers = body.headers;
        request.body = body.body;
      }
      run(&worker, WorkerEvent::Fetch(request)).await?;
    }
    Command::Queue { tag, payload } => {
      let kind: ActionKind = tag.parse()?;
      let payload: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| eyre!("Invalid JSON payload: {}", e))?;
      let action = worker.queue().enqueue(kind, payload, platform.as_ref())?;
      println!("queued {} {}", action.kind, action.id);
    }
    Command::Sync { tag } => {
      let tags = match tag {
        Some(tag) => vec![tag.parse::<ActionKind>()?],
        None => platform.registered_tags()?,
      };
      if tags.is_empty() {
        println!("nothing to sync");
      }
      for kind in tags {
        let event = WorkerEvent::Sync(kind.tag().to_string());
        let EventOutcome::Synced(report) = worker.dispatch(event).await? else {
          continue;
        };
        println!(
          "{}: {} attempted, {} succeeded, {} left",
          kind,
          report.attempted,
          report.succeeded,
          report.failed.len()
        );
        if report.is_drained() {
          platform.clear_registration(kind)?;
        }
      }
    }
    Command::Push { payload } => {
      run(&worker, WorkerEvent::Push(payload.map(String::into_bytes))).await?;
    }
    Command::Click { action } => {
      let event = WorkerEvent::NotificationClick {
        tag: push::NOTIFICATION_TAG.to_string(),
        action: Some(action),
      };
      run(&worker, event).await?;
    }
    Command::Status => print_status(&worker, &platform)?,
  }

  Ok(())
}

/// Dispatch one event and print what it produced.
async fn run(worker: &HostWorker, event: WorkerEvent) -> Result<()> {
  match worker.dispatch(event).await? {
    EventOutcome::Installed(count) => println!("cached {} app-shell assets", count),
    EventOutcome::Activated(deleted) => {
      println!("{} as {}", worker.state(), worker.config().version);
      for name in deleted {
        println!("deleted bucket {}", name);
      }
    }
    EventOutcome::Response(result) => {
      println!("{} ({})", result.data.status, result.source);
      if let Some(cached_at) = result.cached_at {
        println!("cached at {}", cached_at.to_rfc3339());
      }
      for (name, value) in &result.data.headers {
        println!("{}: {}", name, value);
      }
      println!();
      println!("{}", result.data.text());
    }
    EventOutcome::Synced(report) => println!(
      "{} attempted, {} succeeded, {} left",
      report.attempted,
      report.succeeded,
      report.failed.len()
    ),
    EventOutcome::Notified(notification) => {
      println!("{}: {}", notification.title, notification.body)
    }
    EventOutcome::Clicked(opened) => {
      if opened {
        println!("opened {}", worker.config().push.view_route);
      }
    }
  }
  Ok(())
}

fn print_status(worker: &HostWorker, platform: &HostPlatform) -> Result<()> {
  println!("version {}: {}", worker.config().version, worker.state());
  let live = worker.config().buckets();
  for name in worker.storage().bucket_names()? {
    let marker = if live.is_live(&name) { "*" } else { " " };
    println!("{} {} ({} entries)", marker, name, worker.storage().entry_count(&name)?);
  }
  for kind in ActionKind::ALL {
    println!("{}: {} pending", kind, worker.queue().store().count(kind)?);
  }
  let registered: Vec<String> = platform
    .registered_tags()?
    .iter()
    .map(ToString::to_string)
    .collect();
  println!("registered sync tags: {}", registered.join(", "));
  Ok(())
}
