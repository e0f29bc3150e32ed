//! Retrace CLI
//!
//! Records desktop mouse and keyboard activity into scripts and plays them back.
//!
//! Usage:
//!   retrace record --title "login flow"   # Record until Esc or Ctrl+C
//!   retrace play --latest                 # Replay the newest script
//!   retrace play <id>                     # Replay a specific script
//!   retrace scripts                       # List saved scripts
//!   retrace scripts --export <id> out.json
//!   retrace scripts --import in.json --title "from file"
//!   retrace reports [<id>]                # List run reports or show one
//!   retrace images --purge                # Remove templates no script uses

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use retrace::store::{export_script, import_script, scripts_using, unreferenced};
use retrace::{
    DataDir, EngineConfig, ImageStore, InputHook, PlaybackController, PlaybackHotkeys,
    RdevDriver, ReportStore, ScriptStore, TesseractOcr, XcapScreen,
};
use retrace_recorder::{Recorder, RecorderConfig, RecorderEvent, RecorderState};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

mod logging;
mod summary;

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "🎬 Retrace - record and replay desktop UI interactions")]
struct Cli {
    /// Directory holding scripts, reports, templates and logs
    #[clap(long, global = true, env = "RETRACE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Engine configuration file (defaults to config.json in the data directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Title stored with the script
    #[clap(long, short = 't', default_value = "Untitled recording")]
    title: String,

    /// Tags stored with the script (repeatable)
    #[clap(long = "tag")]
    tags: Vec<String>,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    /// Script id to play
    #[clap(conflicts_with = "latest", required_unless_present = "latest")]
    id: Option<String>,

    /// Play the most recently recorded script
    #[clap(long)]
    latest: bool,

    /// Do not listen for the Esc (stop) and F8 (pause) hotkeys
    #[clap(long)]
    no_hotkeys: bool,
}

#[derive(Parser, Debug)]
struct ScriptsArgs {
    /// Print the listing as JSON
    #[clap(long, conflicts_with_all = ["export", "import"])]
    json: bool,

    /// Write the steps of script ID to FILE as a JSON array
    #[clap(long, num_args = 2, value_names = ["ID", "FILE"], conflicts_with = "import")]
    export: Option<Vec<String>>,

    /// Save the steps in FILE (a step array or a saved script) as a new script
    #[clap(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Title for the imported script (defaults to the file name)
    #[clap(long, short = 't', requires = "import")]
    title: Option<String>,

    /// Tags for the imported script (repeatable)
    #[clap(long = "tag", requires = "import")]
    tags: Vec<String>,
}

#[derive(Parser, Debug)]
struct ReportsArgs {
    /// Report id to show in full; lists all reports when omitted
    id: Option<String>,

    /// Print as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct ImagesArgs {
    /// Remove recorded templates no script refers to
    #[clap(long, conflicts_with = "usage")]
    purge: bool,

    /// Show which scripts use the template with this file name
    #[clap(long)]
    usage: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a new script from live input
    Record(RecordArgs),
    /// Play a saved script
    Play(PlayArgs),
    /// List, import or export saved scripts
    Scripts(ScriptsArgs),
    /// List run reports, newest first, or show one
    Reports(ReportsArgs),
    /// Inspect recorded template images
    Images(ImagesArgs),
    /// Print the effective engine configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let data = DataDir::new(cli.data_dir.unwrap_or_else(default_data_dir));
    let _guard = logging::init_logging(&data.logs_dir(), cli.verbose)?;

    let config_path = cli.config.unwrap_or_else(|| data.config_file());
    let config = EngineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    info!("Data directory: {}", data.root().display());

    match cli.command {
        Commands::Record(args) => record(&data, &config, args).await,
        Commands::Play(args) => play(&data, config, args).await,
        Commands::Scripts(args) => scripts(&data, args),
        Commands::Reports(args) => reports(&data, args),
        Commands::Images(args) => images(&data, args),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("retrace")
}

async fn record(data: &DataDir, config: &EngineConfig, args: RecordArgs) -> Result<()> {
    let hook = InputHook::new();
    hook.start().context("Failed to start the global input hook")?;

    let recorder = Recorder::new(
        hook,
        RecorderConfig::from(config),
        Arc::new(XcapScreen::new()),
        Arc::new(data.image_store()),
    );
    let events = recorder.subscribe();
    recorder.start()?;

    let mut progress = tokio::task::spawn_blocking(move || {
        for event in events.iter() {
            match event {
                RecorderEvent::Countdown(left) => println!("⏳ Recording starts in {left}..."),
                RecorderEvent::StateChanged(RecorderState::Recording) => {
                    println!("{}", "🔴 Recording. Press Esc to stop.".red().bold())
                }
                RecorderEvent::StepRecorded(count) => info!("{} step(s) recorded", count),
                RecorderEvent::Stopped { .. } => break,
                RecorderEvent::StateChanged(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut progress => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, stopping recorder");
        }
    }
    let steps = recorder.stop();
    if !progress.is_finished() {
        let _ = progress.await;
    }

    if steps.is_empty() {
        println!("{}", "No steps recorded, nothing saved.".yellow());
        return Ok(());
    }
    let id = data.script_store().save(&steps, &args.title, &args.tags)?;
    println!(
        "{} {} step(s) saved as {}",
        "✅".green(),
        steps.len(),
        id.bold()
    );
    Ok(())
}

async fn play(data: &DataDir, config: EngineConfig, args: PlayArgs) -> Result<()> {
    let store = data.script_store();
    let script = match &args.id {
        Some(id) => store.load(id)?,
        None => match store.load_latest()? {
            Some(script) => script,
            None => bail!("No recorded scripts in {}", store.dir().display()),
        },
    };
    if script.steps.is_empty() {
        bail!("Script {} has no steps", script.id);
    }
    println!(
        "▶️  Playing {} ({} step(s)): {}",
        script.id.bold(),
        script.steps.len(),
        script.title
    );

    let controller = PlaybackController::new(
        config,
        Arc::new(XcapScreen::new()),
        Arc::new(RdevDriver::new()),
    )
    .with_ocr(Arc::new(TesseractOcr::new()))
    .with_report_store(Arc::new(data.report_store()))
    .with_error_dir(data.errors_dir());
    let handle = controller.handle();

    let hotkeys = if args.no_hotkeys {
        None
    } else {
        let hook = InputHook::new();
        match hook.start() {
            Ok(()) => {
                println!("   Esc stops, F8 pauses/resumes.");
                Some(PlaybackHotkeys::attach(&hook, handle.clone()))
            }
            Err(e) => {
                warn!("Hotkeys unavailable: {}", e);
                None
            }
        }
    };

    let worker = controller
        .spawn(script.steps, Some(script.id))
        .context("Failed to start playback thread")?;
    let mut join = tokio::task::spawn_blocking(move || worker.join());
    let mut interrupted = false;

    let joined = loop {
        tokio::select! {
            joined = &mut join => break joined,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("Ctrl+C received, stopping playback");
                interrupted = true;
                handle.stop();
            }
        }
    };
    drop(hotkeys);

    let report = match joined? {
        Ok(report) => report,
        Err(_) => bail!("Playback thread panicked"),
    };
    summary::print_report(&report);

    if report.failed_count() > 0 {
        bail!("{} step(s) failed", report.failed_count());
    }
    Ok(())
}

fn scripts(data: &DataDir, args: ScriptsArgs) -> Result<()> {
    let store = data.script_store();

    if let Some(export) = args.export {
        let [id, file] = export.as_slice() else {
            bail!("--export takes a script id and a file");
        };
        let script = store.load(id)?;
        export_script(&script.steps, Path::new(file))?;
        println!("{} {} step(s) exported to {}", "✅".green(), script.steps.len(), file);
        return Ok(());
    }

    if let Some(path) = args.import {
        let script = import_script(&path)
            .with_context(|| format!("Failed to import {}", path.display()))?;
        if script.is_empty() {
            bail!("No steps found in {}", path.display());
        }
        let title = args.title.unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Imported script".to_string())
        });
        let id = store.save(&script.steps, &title, &args.tags)?;
        println!("{} {} step(s) imported as {}", "✅".green(), script.len(), id.bold());
        return Ok(());
    }

    let scripts = store.list()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&scripts)?);
    } else {
        summary::print_scripts(&scripts);
    }
    Ok(())
}

fn reports(data: &DataDir, args: ReportsArgs) -> Result<()> {
    let store = data.report_store();

    if let Some(id) = args.id {
        let stored = store.load(&id)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&stored)?);
        } else {
            println!("Report {} ({})", stored.id.bold(), stored.report.created_at.to_rfc3339());
            summary::print_report(&stored.report);
        }
        return Ok(());
    }

    let reports = store.list()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        summary::print_reports(&reports);
    }
    Ok(())
}

fn images(data: &DataDir, args: ImagesArgs) -> Result<()> {
    let scripts = data.script_store().load_all()?;

    if let Some(name) = args.usage {
        let users = scripts_using(&name, &scripts);
        if users.is_empty() {
            println!("No script uses {name}");
        }
        for script in users {
            println!("{}  {}", script.id, script.title);
        }
        return Ok(());
    }

    let store = data.image_store();
    let orphans = unreferenced(&store.list()?, &scripts);
    if orphans.is_empty() {
        println!("Every recorded image is in use.");
        return Ok(());
    }
    for path in &orphans {
        if args.purge {
            store.remove(path)?;
            println!("{} {}", "removed".red(), path.display());
        } else {
            println!("{}", path.display());
        }
    }
    if !args.purge {
        println!(
            "{} unreferenced image(s); rerun with --purge to remove them.",
            orphans.len()
        );
    }
    Ok(())
}
