use clap::Parser;
use pathwatch::{PathWatcher, Settings, WatchEvent, logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pathwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Watch files and directories for changes")]
struct Cli {
    /// Paths to watch
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Use stat polling instead of platform events
    #[arg(long)]
    polling: bool,

    /// Polling interval in milliseconds
    #[arg(long)]
    interval: Option<u64>,

    /// Suppress add/addDir events for entries present at startup
    #[arg(long)]
    no_initial: bool,

    /// Maximum recursion depth
    #[arg(long)]
    depth: Option<u32>,

    /// Glob pattern to ignore (repeatable)
    #[arg(long = "ignore")]
    ignored: Vec<String>,

    /// Watch symbolic links as leaves instead of following them
    #[arg(long)]
    no_follow: bool,

    /// Print raw platform notifications as well
    #[arg(long)]
    raw: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load configuration: {e}");
        Settings::default()
    });
    logging::init_with_config(&settings.logging);

    // CLI flags override the layered configuration.
    if cli.polling {
        settings.watch.use_polling = true;
    }
    if let Some(interval) = cli.interval {
        settings.watch.interval = interval;
    }
    if cli.no_initial {
        settings.watch.ignore_initial = true;
    }
    if cli.depth.is_some() {
        settings.watch.depth = cli.depth;
    }
    if cli.no_follow {
        settings.watch.follow_symlinks = false;
    }
    settings.watch.ignored.extend(cli.ignored);

    let watcher = match PathWatcher::builder()
        .config(settings.watch)
        .paths(cli.paths)
        .build()
    {
        Ok(watcher) => watcher,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut events = watcher.subscribe();
    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(WatchEvent::Raw { .. }) if !cli.raw => {}
                    Ok(event) => println!("{event}"),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        eprintln!("Warning: dropped {missed} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Err(e) = watcher.close().await {
        eprintln!("Error during shutdown: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
