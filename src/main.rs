// Slurm is Linux-only; the watcher has nothing to do elsewhere.
#[cfg(not(unix))]
fn main() {
    eprintln!("runwatch is only supported on Unix systems (Linux/macOS).");
    eprintln!("Slurm is not available on Windows.");
    std::process::exit(1);
}

#[cfg(unix)]
mod unix_main {
    use clap::{builder::styling, Parser};
    use env_logger::Builder;
    use log::{error, info, LevelFilter};
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;

    use runwatch::config::WatchConfig;
    use runwatch::hpc::SlurmInterface;
    use runwatch::supervisor::Supervisor;

    const STYLES: styling::Styles = styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default().bold())
        .usage(styling::AnsiColor::Green.on_default().bold())
        .literal(styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(styling::AnsiColor::Cyan.on_default());

    #[derive(Parser, Debug)]
    #[command(name = "runwatch")]
    #[command(
        about = "Hang detection and automatic resubmission for Slurm simulation runs",
        long_about = None
    )]
    #[command(styles = STYLES)]
    struct Args {
        /// TOML config file listing the cases to watch
        #[arg()]
        config: PathBuf,

        /// Override the configured log level (error, warn, info, debug, trace)
        #[arg(long)]
        log_level: Option<String>,
    }

    fn parse_log_level(level: &str) -> LevelFilter {
        match level.to_lowercase().as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            _ => {
                eprintln!("Invalid log level '{}', defaulting to 'info'", level);
                LevelFilter::Info
            }
        }
    }

    pub fn main() {
        let args = Args::parse();

        let config = match WatchConfig::load(&args.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {:#}", e);
                std::process::exit(1);
            }
        };

        let level = args.log_level.as_deref().unwrap_or(&config.log_level);
        let mut builder = Builder::from_default_env();
        builder.filter_level(parse_log_level(level)).init();

        if config.cases.is_empty() {
            error!("No cases configured in {}", args.config.display());
            std::process::exit(1);
        }

        let hostname = hostname::get()
            .expect("Failed to get hostname")
            .into_string()
            .expect("Hostname is not valid UTF-8");

        info!("Starting runwatch");
        info!("Hostname: {}", hostname);
        info!("Config file: {}", args.config.display());
        info!(
            "Intervals: queue_poll={}s startup_delay={}s poll_interval={}s",
            config.queue_poll_secs, config.startup_delay_secs, config.poll_interval_secs
        );
        info!("Watching {} case(s):", config.cases.len());
        for case in &config.cases {
            info!(
                "  {} (run_dir: {}, resubmit: {})",
                case.name,
                case.run_dir.display(),
                case.resubmit
            );
        }

        let scheduler = Arc::new(SlurmInterface::new());
        let supervisor = Supervisor::new(scheduler, config.intervals());

        // SIGTERM/SIGINT set the shared flag; every watcher's next ticker
        // check sees it and winds down.
        let shutdown = supervisor.shutdown_flag();
        let mut signals = match Signals::new([SIGTERM, SIGINT]) {
            Ok(signals) => signals,
            Err(e) => {
                error!("Failed to register signal handler: {}", e);
                std::process::exit(1);
            }
        };
        thread::spawn(move || {
            if let Some(sig) = signals.forever().next() {
                info!("Received signal {}; shutting down", sig);
                shutdown.store(true, Ordering::SeqCst);
            }
        });

        supervisor.run(config.cases.clone());
        info!("All watchers stopped");
    }
}

#[cfg(unix)]
fn main() {
    unix_main::main();
}
