use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use streamguard::{
    backend_from_config, detector_from_config, Annotator, DisplaySink, EventLog, FailAtReads,
    FrameProcessor, HeadlessDisplay, MainLoop, PreviewWriter, ReconnectManager, ReconnectPolicy,
    StreamSource, StreamguardConfig, TerminalDisplay, TerminalLogWriter,
};

#[derive(Parser, Debug)]
#[command(name = "streamguard")]
#[command(about = "Object detection on a video stream with automatic reconnection")]
#[command(version)]
#[command(long_about = "Reads a video file, image directory or network stream, runs object \
detection on every frame, shows the annotated result and appends detection and stream events \
to a log file. Lost streams are reopened with a bounded number of attempts.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "streamguard.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Override the configured video source
    #[arg(short, long, value_name = "URI", help = "Video file, image directory, stream URI or testsrc://")]
    source: Option<String>,

    /// Run without keyboard input
    #[arg(long, help = "Run without terminal keyboard input (stop with Ctrl+C)")]
    headless: bool,

    /// Inject a read failure at this frame number
    #[arg(long, value_name = "FRAME", help = "Simulate a frame read failure at the given frame")]
    simulate_failure_at: Option<u64>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the stream")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting streamguard v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match StreamguardConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    apply_overrides(&mut config, &args);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let log = Arc::new(EventLog::open(
        &config.event_log.path,
        config.event_log.timezone.as_deref(),
    )?);

    let mut source = StreamSource::new(backend_from_config(&config.source)?, config.source.uri.clone());
    if let Some(frame) = config.source.simulate_failure_at {
        info!("Failure simulation enabled at frame {}", frame);
        source = source.with_fault_point(Box::new(FailAtReads::new([frame])));
    }

    let detector = detector_from_config(&config.detector)?;
    let annotator = Annotator::load(&config.display.font_path, config.display.font_size);
    let processor = FrameProcessor::new(detector, annotator, config.display.window_title.clone());
    let reconnect = ReconnectManager::new(ReconnectPolicy::from(&config.reconnect));

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone());

    let mut main_loop = MainLoop::new(source, reconnect, processor, build_display(&config), log)
        .with_cancellation(cancel)
        .with_timing(config.display.reconnect_hold(), config.display.quit_poll());

    let outcome = main_loop.run().await;
    // Release the stream and restore the terminal before reporting
    drop(main_loop);

    let exit_code = match outcome {
        Ok(outcome) => {
            info!("Stream loop finished: {:?}", outcome);
            outcome.exit_code()
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            return Err(e.into());
        }
    };

    info!("streamguard exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn apply_overrides(config: &mut StreamguardConfig, args: &Args) {
    if let Some(source) = &args.source {
        config.source.uri = source.clone();
    }
    if args.headless {
        config.display.headless = true;
    }
    if args.simulate_failure_at.is_some() {
        config.source.simulate_failure_at = args.simulate_failure_at;
    }
}

fn build_display(config: &StreamguardConfig) -> Box<dyn DisplaySink> {
    let preview = config.display.preview_path.as_ref().map(PreviewWriter::new);

    if config.display.headless {
        return Box::new(HeadlessDisplay::new(preview));
    }

    match TerminalDisplay::new(preview.clone()) {
        Ok(display) => Box::new(display),
        Err(e) => {
            warn!("{}, continuing without keyboard input", e);
            Box::new(HeadlessDisplay::new(preview))
        }
    }
}

/// Cancel the loop on SIGINT/SIGTERM; honored after the frame in flight
fn setup_signal_handlers(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        let cancel_sigterm = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    if stream.recv().await.is_some() {
                        info!("Received SIGTERM signal");
                        cancel_sigterm.cancel();
                    }
                }
                Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
            }
        });
    }

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            cancel.cancel();
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("streamguard={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(|| TerminalLogWriter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(|| TerminalLogWriter)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(|| TerminalLogWriter)
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(|| TerminalLogWriter)
                .with_target(true)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Streamguard Configuration File");
    println!("# Environment overrides use the STREAMGUARD_ prefix, e.g. STREAMGUARD_SOURCE__URI");
    println!();
    println!("{}", toml::to_string_pretty(&StreamguardConfig::default())?);
    Ok(())
}
