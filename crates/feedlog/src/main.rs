//! `feedlog` - CLI for the shared household feeding log
//!
//! This binary stands in for the app's screens: setup, the feed button, the
//! history list, clearing, sharing and a live-updating view.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use clap::Parser;

use feedlog::cli::{Cli, Command, ConfigCommand, WatchCommand};
use feedlog::gateway::ZoneProbe;
use feedlog::history::StepStatus;
use feedlog::{init_logging, App, Config, FeedingRecord, InitReport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        command => {
            let app = App::open(config).context("failed to open feedlog databases")?;
            run(&app, command).await
        }
    }
}

async fn run(app: &App, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Setup(setup) => {
            let prefs = app.preferences().complete_setup(&setup.name, &setup.pet)?;
            println!("Saved: {} feeds {}.", prefs.user_name, prefs.pet_name);
            Ok(())
        }
        Command::Feed(feed) => handle_feed(app, feed.json).await,
        Command::History(history) => handle_history(app, history.json).await,
        Command::Clear(clear) => handle_clear(app, clear.yes).await,
        Command::Share(share) => handle_share(app, share.json).await,
        Command::Watch(watch) => handle_watch(app, &watch).await,
        Command::Doctor(doctor) => handle_doctor(app, doctor.json).await,
        Command::Config(config_cmd) => handle_config(app.config(), config_cmd),
    }
}

/// Initialize the history manager and print a warning for each failed step.
async fn start(app: &App) -> InitReport {
    let report = app.history().initialize().await;
    if !report.account.is_available() {
        eprintln!(
            "warning: household account {}: {}",
            report.account,
            report.account.guidance()
        );
    }
    for (step, status) in [
        ("shared zone", &report.zone),
        ("share invitation", &report.invitation),
        ("history fetch", &report.initial_fetch),
    ] {
        if let StepStatus::Failed(reason) = status {
            eprintln!("warning: {step} failed: {reason}");
        }
    }
    report
}

fn print_records(records: &[FeedingRecord]) {
    if records.is_empty() {
        println!("No feedings recorded yet.");
        return;
    }
    for record in records {
        println!(
            "{}  {} fed {}",
            record.timestamp.with_timezone(&chrono::Local).format("%a %b %e %H:%M"),
            record.actor_name,
            record.subject_name
        );
    }
}

async fn handle_feed(app: &App, json: bool) -> anyhow::Result<()> {
    if app.preferences().needs_setup() {
        bail!("no name stored on this device; run `feedlog setup --name NAME --pet PET` first");
    }
    start(app).await;

    let record = app.feed().await.context("could not record the feeding")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Recorded: {} fed {}.", record.actor_name, record.subject_name);
        println!();
        print_records(&app.history().records());
    }
    Ok(())
}

async fn handle_history(app: &App, json: bool) -> anyhow::Result<()> {
    let report = start(app).await;
    if let StepStatus::Failed(reason) = &report.initial_fetch {
        bail!("could not fetch feeding history: {reason}");
    }

    let records = app.history().records();
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_records(&records);
    }
    Ok(())
}

async fn handle_clear(app: &App, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This deletes every feeding record for the whole household.");
        println!("Use --yes to confirm.");
        return Ok(());
    }
    start(app).await;

    let summary = app
        .history()
        .clear_all()
        .await
        .context("could not clear feeding history")?;
    println!(
        "Deleted {} of {} feeding records.",
        summary.deleted, summary.attempted
    );
    if summary.failed > 0 {
        eprintln!(
            "warning: {} records could not be deleted; run `feedlog clear --yes` again",
            summary.failed
        );
    }
    Ok(())
}

async fn handle_share(app: &App, json: bool) -> anyhow::Result<()> {
    let report = start(app).await;
    let Some(invitation) = app.history().share_invitation().await else {
        if let StepStatus::Failed(reason) = report.invitation {
            bail!("no share invitation available: {reason}");
        }
        bail!("no share invitation available");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&invitation)?);
    } else {
        println!("{}", invitation.title);
        println!("  Invite link: {}", invitation.url);
        println!("  Permission:  {}", invitation.permission);
    }
    Ok(())
}

async fn handle_watch(app: &App, cmd: &WatchCommand) -> anyhow::Result<()> {
    let interval = cmd
        .interval
        .map_or_else(|| app.config().refresh_interval(), std::time::Duration::from_secs);

    let mut view = app.history().subscribe();
    let refresher = app.history().spawn_auto_refresh(interval);
    let report = start(app).await;
    if report.is_degraded() {
        refresher.shutdown().await;
        bail!("cannot watch the feeding history without a working household account");
    }

    println!(
        "Watching feeding history (refresh every {}s, Ctrl-C to stop)",
        interval.as_secs()
    );
    print_records(&view.borrow_and_update());

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                println!();
                print_records(&view.borrow_and_update());
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    refresher.shutdown().await;
    Ok(())
}

async fn handle_doctor(app: &App, json: bool) -> anyhow::Result<()> {
    start(app).await;
    let diagnostics = app.history().gateway().diagnose().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        return Ok(());
    }

    println!("feedlog doctor");
    println!("--------------");
    println!("Container:     {}", diagnostics.container_id);
    println!("Account:       {}", diagnostics.account_status);
    if let Some(user) = &diagnostics.user_record_id {
        println!("User record:   {user}");
    }
    println!(
        "Shared zone:   {}",
        diagnostics.zone.as_deref().unwrap_or("not provisioned")
    );
    let probe = match &diagnostics.zone_probe {
        ZoneProbe::NotRun => "not run".to_string(),
        ZoneProbe::Reachable { records_found } => {
            format!("reachable ({records_found} record(s) sampled)")
        }
        ZoneProbe::Failed { reason } => format!("failed: {reason}"),
    };
    println!("Zone query:    {probe}");
    println!(
        "Invitation:    {}",
        if diagnostics.has_invitation { "ready" } else { "missing" }
    );
    if !diagnostics.account_status.is_available() {
        println!();
        println!("Hint: {}", diagnostics.account_status.guidance());
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Cloud]");
                println!("  Database path:    {}", config.cloud_database_path().display());
                println!("  Container:        {}", config.cloud.container_id);
                println!(
                    "  Account:          {}",
                    config.cloud.account_id.as_deref().unwrap_or("(signed out)")
                );
                println!();
                println!("[Preferences]");
                println!(
                    "  Database path:    {}",
                    config.preferences_database_path().display()
                );
                println!();
                println!("[Sync]");
                println!("  Refresh interval: {}s", config.sync.refresh_interval_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
