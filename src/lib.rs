pub mod cli;
pub mod db;
pub mod history;
pub mod notify;
pub mod session;
pub mod settings;
pub mod surface;
pub mod timer;
mod utils;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command, OutputFormat};
use db::Database;
use history::{
    metrics::{all_tags, daily_totals, filter_by_tag},
    HistoryEntry, HistoryStore, OfflineStore, RemoteHistoryStore,
};
use notify::SoundNotifier;
use session::{HistorySource, SessionController, SessionUpdate};
use settings::{default_data_dir, SettingsStore, UserSettings, SETTINGS_FILE};
use timer::{EngineConfig, TimerEngine};

const CACHE_FILE: &str = "timespent.sqlite3";

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    let data_dir = match cli.data_dir.clone() {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let settings_store = SettingsStore::new(data_dir.join(SETTINGS_FILE))?;
    if let Command::Volume { level } = cli.command {
        let stored = settings_store.set_volume(level)?;
        if stored == 0.0 {
            println!("Notification tone muted.");
        } else {
            println!("Notification volume set to {stored:.2}.");
        }
        return Ok(());
    }
    if let Command::Start {
        minutes: Some(minutes),
        remember: true,
        ..
    } = &cli.command
    {
        let stored = settings_store.set_default_minutes(*minutes)?;
        info!("default duration is now {stored} minutes");
    }
    let settings = settings_store.settings();
    let database = Database::new(data_dir.join(CACHE_FILE))?;

    let api_url = settings
        .api_base_url(cli.api_url.as_deref())
        .map(str::to_string);
    match api_url {
        Some(url) => {
            let store = RemoteHistoryStore::new(url).context("Invalid history API URL")?;
            execute(cli, settings, database, store).await
        }
        None => {
            info!("no history API configured, working from the local cache");
            execute(cli, settings, database, OfflineStore).await
        }
    }
}

async fn execute<S: HistoryStore>(
    cli: Cli,
    settings: UserSettings,
    database: Database,
    store: S,
) -> Result<()> {
    let limits = settings.limits();
    let cancel_token = CancellationToken::new();
    let (timer, events, engine_task) = TimerEngine::spawn(
        EngineConfig {
            initial_duration_seconds: limits.duration_seconds,
            max_duration_seconds: limits.max_minutes * 60,
        },
        cancel_token.clone(),
    );
    let notifier = Arc::new(SoundNotifier::new(
        settings.sound_enabled,
        settings.volume,
    ));
    let mut controller =
        SessionController::new(timer, events, store, database, notifier, limits);

    let result = handle_command(cli.command, cli.output, &settings, &mut controller).await;

    cancel_token.cancel();
    if let Err(err) = engine_task.await {
        error!("timer engine task failed: {err}");
    }
    result
}

async fn handle_command<S: HistoryStore>(
    command: Command,
    output: OutputFormat,
    settings: &UserSettings,
    controller: &mut SessionController<S>,
) -> Result<()> {
    match command {
        Command::Start {
            description,
            minutes,
            ..
        } => {
            if let Some(minutes) = minutes {
                let clamped = controller.set_duration_minutes(minutes)?;
                if clamped != minutes {
                    warn!("duration clamped to {clamped} minutes");
                }
            }
            surface::run_session(controller, &description).await?;
        }
        Command::History { tag } => {
            load(controller).await;
            let entries: Vec<&HistoryEntry> = match &tag {
                Some(tag) => filter_by_tag(controller.history(), tag),
                None => controller.history().iter().collect(),
            };
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Pretty => {
                    surface::print_history(&entries);
                    let tags = all_tags(controller.history());
                    if tag.is_none() && !tags.is_empty() {
                        println!("\nTags: #{}", tags.join(" #"));
                    }
                }
            }
        }
        Command::Today => {
            load(controller).await;
            let totals = daily_totals(
                controller.history(),
                Local::now().date_naive(),
                &Local,
                settings.exclude_break_from_totals,
            );
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&totals)?),
                OutputFormat::Pretty => surface::print_totals(&totals),
            }
        }
        Command::Delete { id } => {
            load(controller).await;
            if !controller.history().iter().any(|entry| entry.id == id) {
                bail!("no history entry with id {id}");
            }
            controller.delete_entry(&id).await?;
            println!("Deleted {id}.");
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("clearing history cannot be undone, pass --yes to confirm");
            }
            let removed = controller.clear_history().await?;
            println!("History cleared ({removed} cached entries removed).");
        }
        Command::Sync => {
            let submitted = controller.resync_pending().await?;
            if submitted == 0 {
                println!("Nothing to sync.");
                return Ok(());
            }
            let updates = controller.settle().await;
            let synced = updates
                .iter()
                .filter(|update| matches!(update, SessionUpdate::Synced { .. }))
                .count();
            println!("Synced {synced} of {submitted} entries.");
        }
        Command::Presets => match output {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "defaultMinutes": settings.default_minutes,
                    "presets": settings.presets,
                    "maxMinutes": settings.max_minutes,
                    "maxCustomMinutes": settings.max_custom_minutes,
                }))?
            ),
            OutputFormat::Pretty => {
                let presets: Vec<String> =
                    settings.presets.iter().map(|m| format!("{m}m")).collect();
                println!("Presets: {}", presets.join(", "));
                println!("Default: {} min", settings.default_minutes);
                println!(
                    "Custom durations up to {} min, runs up to {} min with extensions",
                    settings.max_custom_minutes, settings.max_minutes
                );
            }
        },
        Command::Volume { .. } => bail!("volume is applied before the timer starts"),
    }
    Ok(())
}

async fn load<S: HistoryStore>(controller: &mut SessionController<S>) {
    if controller.load_history().await == HistorySource::Cache {
        info!("showing cached history");
    }
}
