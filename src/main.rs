mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use kf_core::config::Config;
use kf_core::naming::{display_key, signed_offset};
use kf_core::{TrackFlags, TrackId};
use kf_db::queries::{queue, track_files, tracks};
use kf_tools::ToolRegistry;
use uuid::Uuid;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "keyforge=trace,kf_worker=trace,kf_tools=debug,kf_db=debug,kf_core=debug".to_string()
        } else {
            "keyforge=info,kf_worker=info,kf_tools=info,kf_db=warn,kf_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Work { stages, instances } => {
            let config = Config::load_or_default(config_path);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(kf_worker::start(config, &stages, instances))?;
            Ok(())
        }
        Commands::Submit {
            url,
            skip_split,
            skip_rekey,
            private,
            restitch_video,
            rekey_common,
            novox_first,
            user,
        } => {
            let flags = TrackFlags {
                skip_split,
                skip_rekey,
                private,
                restitch_video,
                rekey_common,
                novox_first,
            };
            submit(config_path, &url, flags, user.as_deref())
        }
        Commands::Status { track } => show_status(config_path, &track),
        Commands::List { user, limit } => list_tracks(config_path, user.as_deref(), limit),
        Commands::Queues => show_queues(config_path),
        Commands::CheckTools => check_tools(config_path),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("keyforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn submit(config_path: Option<&Path>, url: &str, flags: TrackFlags, user: Option<&str>) -> Result<()> {
    let ctx = kf_worker::connect(Config::load_or_default(config_path))?;
    let track = kf_worker::intake::submit(&ctx, url, flags, user)?;
    println!("Submitted track {} ({})", track.id, track.uuid);
    println!("  URL: {}", track.url);
    println!("  Flags: {}", track.flags);
    println!("  Status: {}", track.status);
    Ok(())
}

fn show_status(config_path: Option<&Path>, reference: &str) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let pool = kf_worker::open_db(&config)?;
    let conn = kf_db::get_conn(&pool)?;

    let track = match reference.parse::<i64>() {
        Ok(id) => tracks::get_track(&conn, TrackId::from(id))?,
        Err(_) => {
            let uuid = Uuid::parse_str(reference)
                .with_context(|| format!("{reference} is neither a track id nor a uuid"))?;
            tracks::get_track_by_uuid(&conn, &uuid)?
        }
    }
    .with_context(|| format!("Track {reference} not found"))?;
    let files = track_files::list_for_track(&conn, track.id)?;

    println!("Track {} ({})", track.id, track.uuid);
    println!("  URL: {}", track.url);
    println!("  Title: {}", track.title.as_deref().unwrap_or("-"));
    if let Some(key) = track.key {
        println!("  Key: {}", display_key(key, track.quality_or_empty()));
    }
    println!("  Duration: {}", track.duration.as_deref().unwrap_or("-"));
    println!("  Flags: {}", track.flags);
    println!("  Status: {}", track.status);
    if let Some(ref message) = track.error_message {
        println!("  Message: {message}");
    }

    println!("\nFiles: {}", files.len());
    for file in &files {
        print!(
            "  [{}] {:>3} {} {}",
            file.id,
            signed_offset(file.key_offset),
            file.file_type,
            file.status
        );
        if let Some(ref url) = file.file_url {
            print!(" {url}");
        }
        if let Some(ref message) = file.error_message {
            print!(" ({message})");
        }
        println!();
    }

    Ok(())
}

fn list_tracks(config_path: Option<&Path>, user: Option<&str>, limit: i64) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let pool = kf_worker::open_db(&config)?;
    let conn = kf_db::get_conn(&pool)?;

    let tracks = tracks::list_tracks(&conn, user, limit)?;
    if tracks.is_empty() {
        println!("No tracks.");
        return Ok(());
    }
    for track in &tracks {
        println!(
            "{:>5}  {:<16} {}",
            track.id,
            track.status,
            track.title.as_deref().unwrap_or(&track.url)
        );
    }
    Ok(())
}

fn show_queues(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let pool = kf_worker::open_db(&config)?;
    let conn = kf_db::get_conn(&pool)?;

    let depths = queue::depths(&conn)?;
    if depths.is_empty() {
        println!("All queues are empty.");
    }
    for entry in &depths {
        println!("{:<12} {}", entry.channel, entry.depth);
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let registry = ToolRegistry::discover(&config.containers);
    let mut all_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!("\nStage images:");
    for (channel, stage) in config.containers.stages() {
        println!("  {:<12} {}", channel, stage.image);
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Workers cannot run without docker.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration has {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    println!("  Database: {}", config.database.path.display());
    println!("  Poll interval: {}ms", config.worker.poll_interval_ms);
    println!("  Instances per stage: {}", config.worker.instances);
    println!("  Bucket: {}", config.object_store.bucket);
    println!("  Max duration: {}s", config.policy.max_duration_secs);

    Ok(())
}
