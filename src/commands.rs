//! Command line commands and their output.

use chrono::NaiveDate;
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::io::Write;
use tracing::warn;

use crate::app::App;
use crate::cache::{Cached, RefreshOutcome, ResourceKind};
use crate::error::StoreError;
use crate::format;
use crate::hydra::{AssociationStore, RestoMenu, RestoMenus, SchamperArticle, MENU_DATE_FORMAT};
use crate::preferences::PreferenceSource;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Show the resto menu of a day
  Menu {
    /// Day to show (YYYY-MM-DD, defaults to today)
    #[arg(short, long, value_parser = parse_date)]
    date: Option<NaiveDate>,
  },
  /// Show the latest Schamper articles
  News {
    /// Maximum number of articles
    #[arg(short, long, default_value_t = 10)]
    limit: usize,
  },
  /// List student associations
  Associations {
    /// Only show associations from the preferences
    #[arg(short, long)]
    preferred: bool,
  },
  /// Fetch fresh content for a kind, regardless of its age
  Refresh { kind: ResourceKind },
  /// Drop cached content of one kind, or everything
  Evict { kind: Option<ResourceKind> },
  /// Show what is cached and how old it is
  Status,
  /// Show or change preferences
  Prefs {
    #[command(subcommand)]
    action: PrefsAction,
  },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PrefsAction {
  Show,
  Set { name: String, value: String },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
  NaiveDate::parse_from_str(s, MENU_DATE_FORMAT).map_err(|e| format!("Invalid date {}: {}", s, e))
}

/// Run a command against the app, writing human readable output to `out`.
pub async fn run<W: Write>(app: &App, command: Command, out: &mut W) -> Result<()> {
  match command {
    Command::Menu { date } => {
      let today = app.clock().now().date_naive();
      let date = date.unwrap_or(today);
      let menu = resolve(app, app.resto.menu(date), || app.resto.refresh_menu(date), out).await?;
      match menu {
        Some(menu) => print_menu(app, &menu, today, out)?,
        None => writeln!(out, "No menu available for {}", date)?,
      }
    }
    Command::News { limit } => {
      let articles = resolve(app, app.schamper.articles(), || app.schamper.refresh(), out).await?;
      match articles {
        Some(articles) => print_articles(app, &articles, limit, out)?,
        None => writeln!(out, "No articles available")?,
      }
    }
    Command::Associations { preferred } => {
      let cached = resolve(
        app,
        app.associations.associations(),
        || app.associations.refresh(),
        out,
      )
      .await?;
      let prefs = app.preferences().snapshot();
      let shown = if preferred {
        cached.map(|list| list.map(|all| AssociationStore::filter_preferred(all, &prefs)))
      } else {
        cached
      };
      match shown {
        Some(list) if !list.data.is_empty() => {
          for association in &list.data {
            writeln!(out, "{:<16} {}", association.internal_name, association.name())?;
          }
        }
        _ => writeln!(out, "No associations available")?,
      }
    }
    Command::Refresh { kind } => {
      let outcome = match kind {
        ResourceKind::Association => {
          let store = app.associations.data_store();
          store.force_refresh(&store.key(None)).await
        }
        ResourceKind::RestoMenu => {
          let today = app.clock().now().date_naive();
          let store = app.resto.data_store();
          store.force_refresh(&RestoMenus::key(today)).await
        }
        ResourceKind::SchamperArticle => app.schamper.force_refresh().await,
      };
      match outcome {
        RefreshOutcome::Updated(_) => writeln!(out, "{}: updated", kind)?,
        RefreshOutcome::NotModified(_) => writeln!(out, "{}: not modified", kind)?,
        RefreshOutcome::Failed(e) => return Err(eyre!("Failed to refresh {}: {}", kind, e)),
      }
    }
    Command::Evict { kind: None } => {
      app.clear_cache()?;
      writeln!(out, "cache cleared")?;
    }
    Command::Evict { kind: Some(kind) } => {
      match kind {
        ResourceKind::Association => app.associations.data_store().evict_all(),
        ResourceKind::RestoMenu => app.resto.data_store().evict_all(),
        ResourceKind::SchamperArticle => app.schamper.data_store().evict_all(),
      }
      .map_err(|e| eyre!("Failed to evict {}: {}", kind, e))?;
      writeln!(out, "{}: evicted", kind)?;
    }
    Command::Status => print_status(app, out)?,
    Command::Prefs { action } => match action {
      PrefsAction::Show => {
        for (name, value) in app.preferences().snapshot().entries() {
          writeln!(out, "{} = {}", name, value)?;
        }
      }
      PrefsAction::Set { name, value } => {
        app.preferences().set(&name, &value)?;
        writeln!(out, "{} = {}", name, value)?;
      }
    },
  }

  Ok(())
}

/// Serve fresh cached content directly; otherwise wait for a refresh and fall
/// back to whatever was cached when it fails.
async fn resolve<T, F, Fut, W>(
  app: &App,
  cached: Option<Cached<T>>,
  refresh: F,
  out: &mut W,
) -> Result<Option<Cached<T>>>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<Cached<T>, StoreError>>,
  W: Write,
{
  if let Some(current) = &cached {
    if !current.is_stale() || !app.preferences().refresh_enabled() {
      return Ok(cached);
    }
  }

  match refresh().await {
    Ok(fresh) => Ok(Some(fresh)),
    Err(e) => {
      warn!(error = %e, "refresh failed, showing cached content");
      writeln!(out, "Could not refresh: {}", e)?;
      Ok(cached)
    }
  }
}

fn print_menu<W: Write>(
  app: &App,
  menu: &Cached<RestoMenu>,
  today: NaiveDate,
  out: &mut W,
) -> Result<()> {
  let now = app.clock().now();
  writeln!(
    out,
    "Menu for {} (fetched {})",
    format::menu_day_label(menu.data.date, today),
    menu.age_display(now)
  )?;

  if let Some(message) = &menu.data.message {
    writeln!(out, "{}", message)?;
  }
  if !menu.data.open {
    writeln!(out, "Resto closed")?;
    return Ok(());
  }

  for soup in menu.data.soups() {
    writeln!(out, "  Soup  {:<40} {}", soup.name, soup.price)?;
  }
  for meal in menu.data.main_courses() {
    writeln!(out, "  Main  {:<40} {}", meal.name, meal.price)?;
  }
  if !menu.data.vegetables.is_empty() {
    writeln!(out, "  Vegetables: {}", menu.data.vegetables.join(", "))?;
  }
  Ok(())
}

fn print_articles<W: Write>(
  app: &App,
  articles: &Cached<Vec<SchamperArticle>>,
  limit: usize,
  out: &mut W,
) -> Result<()> {
  writeln!(
    out,
    "Schamper (fetched {})",
    articles.age_display(app.clock().now())
  )?;
  for article in articles.data.iter().take(limit) {
    writeln!(
      out,
      "  {}  {}",
      format::article_timestamp(article.pub_date),
      article.title
    )?;
  }
  Ok(())
}

fn print_status<W: Write>(app: &App, out: &mut W) -> Result<()> {
  let now = app.clock().now();
  let mut rows = Vec::new();

  let associations = app.associations.data_store();
  for key in associations.cached_keys()? {
    rows.push((key.to_string(), associations.last_updated(&key)));
  }
  let resto = app.resto.data_store();
  for key in resto.cached_keys()? {
    rows.push((key.to_string(), resto.last_updated(&key)));
  }
  let schamper = app.schamper.data_store();
  for key in schamper.cached_keys()? {
    rows.push((key.to_string(), schamper.last_updated(&key)));
  }

  if rows.is_empty() {
    writeln!(out, "Cache is empty")?;
  }
  for (key, updated) in rows {
    let age = updated
      .map(|at| format::relative_to(at, now))
      .unwrap_or_else(|| "never".to_string());
    writeln!(out, "{:<32} {}", key, age)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::app::AppParts;
  use crate::cache::{CacheStorage, MemoryStorage, RefreshSettings, StalenessPolicy};
  use crate::clock::ManualClock;
  use crate::preferences::PreferencesService;
  use crate::testing::{content, ScriptedFetcher};
  use chrono::{TimeZone, Utc};
  use std::sync::Arc;
  use std::time::Duration;
  use tokio::runtime::Handle;

  const MENU: &str = r#"{
    "date": "2024-05-01",
    "open": true,
    "meals": [
      {"kind": "soup", "type": "main", "name": "Tomatensoep", "price": "€ 0,60"},
      {"kind": "meat", "type": "main", "name": "Stoofvlees", "price": "€ 4,20"}
    ],
    "vegetables": ["Wortelen"]
  }"#;

  fn app(fetcher: Arc<ScriptedFetcher>) -> (App, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
      Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    ));
    let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
    let app = App::from_parts(
      AppParts {
        storage,
        fetcher,
        preferences: Arc::new(PreferencesService::default()),
        clock: clock.clone(),
        policy: StalenessPolicy::default(),
        settings: RefreshSettings {
          retry_delay: Duration::from_millis(1),
          ..RefreshSettings::default()
        },
        language: "nl".to_string(),
      },
      Handle::current(),
    );
    (app, clock)
  }

  async fn output(app: &App, command: Command) -> String {
    let mut out = Vec::new();
    run(app, command, &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
  }

  #[tokio::test]
  async fn test_menu_fetches_then_serves_cache() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![content(MENU, "v1")]));
    let (app, _clock) = app(fetcher.clone());

    let first = output(&app, Command::Menu { date: None }).await;
    assert!(first.contains("Menu for today (fetched just now)"));
    assert!(first.contains("Soup  Tomatensoep"));
    assert!(first.contains("Main  Stoofvlees"));
    assert!(first.contains("Vegetables: Wortelen"));

    let second = output(&app, Command::Menu { date: None }).await;
    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test]
  async fn test_stale_menu_shown_when_refresh_fails() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![content(MENU, "v1")]));
    let (app, clock) = app(fetcher);

    output(&app, Command::Menu { date: None }).await;
    clock.advance(chrono::Duration::hours(25));

    // Script is exhausted, so both attempts fail
    let out = output(
      &app,
      Command::Menu {
        date: NaiveDate::from_ymd_opt(2024, 5, 1),
      },
    )
    .await;
    assert!(out.contains("Could not refresh"));
    assert!(out.contains("Menu for yesterday (fetched yesterday)"));
  }

  #[tokio::test]
  async fn test_refresh_failure_is_an_error() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![Err(StoreError::Server(
      "HTTP 500".to_string(),
    ))]));
    let (app, _clock) = app(fetcher);

    let mut out = Vec::new();
    let err = run(
      &app,
      Command::Refresh {
        kind: ResourceKind::SchamperArticle,
      },
      &mut out,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("Failed to refresh schamper-article"));
  }

  #[tokio::test]
  async fn test_status_and_evict() {
    let fetcher = Arc::new(ScriptedFetcher::new(vec![content("[]", "v1")]));
    let (app, _clock) = app(fetcher);

    assert_eq!(output(&app, Command::Status).await, "Cache is empty\n");

    let refreshed = output(
      &app,
      Command::Refresh {
        kind: ResourceKind::Association,
      },
    )
    .await;
    assert_eq!(refreshed, "association: updated\n");
    assert!(output(&app, Command::Status).await.starts_with("association "));

    output(
      &app,
      Command::Evict {
        kind: Some(ResourceKind::Association),
      },
    )
    .await;
    assert_eq!(output(&app, Command::Status).await, "Cache is empty\n");
  }

  #[tokio::test]
  async fn test_prefs_set_and_show() {
    let (app, _clock) = app(Arc::new(ScriptedFetcher::new(vec![])));

    output(
      &app,
      Command::Prefs {
        action: PrefsAction::Set {
          name: "refresh_enabled".to_string(),
          value: "false".to_string(),
        },
      },
    )
    .await;
    let shown = output(
      &app,
      Command::Prefs {
        action: PrefsAction::Show,
      },
    )
    .await;
    assert!(shown.contains("refresh_enabled = false"));
  }

  #[test]
  fn test_parse_date() {
    assert_eq!(
      parse_date("2024-05-01").unwrap(),
      NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    );
    assert!(parse_date("01/05/2024").is_err());
  }
}
