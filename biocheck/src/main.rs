mod cli;
mod console;

use anyhow::{Context, Result};
use biocheck_flow::{
    encode_reply, exit_code, run_request, ErrorCode, FlowError, Outcome, Settings, StartRequest,
    StillImageSource, VideoSource,
};
use clap::Parser;
use cli::Cli;
use log::{error, info, LevelFilter};
use std::io::Read;
use std::process::ExitCode;

fn init_logging(to_syslog: bool) {
    if to_syslog {
        use syslog::{BasicLogger, Facility, Formatter3164};

        let formatter = Formatter3164 {
            facility: Facility::LOG_USER,
            hostname: None,
            process: "biocheck".into(),
            pid: std::process::id(),
        };

        if let Ok(logger) = syslog::unix(formatter) {
            if log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
                .map(|()| log::set_max_level(LevelFilter::Info))
                .is_ok()
            {
                return;
            }
        }
        eprintln!("biocheck: syslog unavailable, logging to stderr");
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();
}

fn read_request(cli: &Cli) -> Result<String> {
    if cli.request_from_stdin() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read start request from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(&cli.request)
            .with_context(|| format!("Failed to read start request {:?}", cli.request))
    }
}

fn open_source(cli: &Cli, settings: &Settings) -> Result<Box<dyn VideoSource>> {
    if let Some(path) = &cli.image {
        return Ok(Box::new(StillImageSource::new(path)));
    }

    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(biocheck_flow::v4l2::OpencvSource::new(settings.camera.clone())))
    }

    #[cfg(not(feature = "opencv"))]
    {
        let _ = settings;
        anyhow::bail!("No camera backend: pass --image or build with the opencv feature")
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::load_default(),
    };
    if let Some(index) = cli.device {
        settings.camera.device_index = Some(index);
    }

    let text = read_request(cli)?;
    let request: StartRequest = match serde_json::from_str(&text) {
        Ok(request) => request,
        Err(e) => {
            error!("Malformed start request: {}", e);
            return Ok(Outcome::Failure(FlowError::new(ErrorCode::ParseError, e.to_string())));
        }
    };

    let source = open_source(cli, &settings)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start async runtime")?;

    let (actions_tx, actions_rx) = async_channel::unbounded();
    let (views_tx, views_rx) = async_channel::unbounded();

    let auto = if cli.unattended() {
        Some(actions_tx)
    } else {
        console::spawn_stdin_reader(actions_tx);
        None
    };

    let outcome = runtime.block_on(async {
        let presenter = tokio::spawn(console::present(views_rx, auto));
        let outcome = run_request(&request, &settings, source, actions_rx, Some(views_tx)).await;
        let _ = presenter.await;
        outcome
    });

    // Abandon token or validation calls still blocked on the network.
    runtime.shutdown_background();

    Ok(outcome)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.syslog);
    info!("biocheck {} (flow {})", env!("CARGO_PKG_VERSION"), biocheck_flow::VERSION);

    match run(&cli) {
        Ok(outcome) => {
            println!("{}", encode_reply(&outcome));
            ExitCode::from(exit_code(&outcome))
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("biocheck: {:#}", e);
            ExitCode::from(1)
        }
    }
}
