//! busview - simulated in-vehicle network analyzer
//!
//! Synthesizes CAN, CAN-FD, LIN and FlexRay traffic from virtual ECUs and
//! lets you inject faults, inspect the traffic and export it as text logs.

mod cli;
mod console;
mod settings;
mod traffic_view;

use std::time::Duration;

use anyhow::{Context, Result};
use busview_protocol::Message;
use busview_sim::{spawn_session, SimulationConfig, Synthesizer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command, RunArgs};
use settings::Settings;
use traffic_view::TrafficView;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "busview=info,busview_protocol=info,busview_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { config, command } = Cli::parse();
    let mut settings = Settings::load(config.as_deref()).context("failed to load settings")?;

    match command {
        Command::Run(args) => run(args, settings).await,
        Command::Console(args) => {
            settings.apply_session_args(&args);
            info!("Starting busview console");

            let sim = Synthesizer::new(settings.simulation.clone());
            let (handle, _events, task) = spawn_session(sim);
            console::run(handle.clone(), &settings).await?;

            handle.shutdown().await?;
            task.await.context("session task failed")?;
            Ok(())
        }
        Command::Settings { init } => {
            if init {
                let path = settings.save(config.as_deref())?;
                println!("wrote {}", path.display());
            } else {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            Ok(())
        }
    }
}

/// Synthesize traffic without a console and write the export
async fn run(args: RunArgs, mut settings: Settings) -> Result<()> {
    settings.apply_session_args(&args.session);
    let format = args.format.unwrap_or(settings.export.format);

    let messages = match args.duration {
        Some(secs) => run_live(settings.simulation.clone(), Duration::from_secs(secs)).await?,
        None => run_ticks(
            settings.simulation.clone(),
            args.ticks.unwrap_or(settings.default_ticks),
        ),
    };

    let view = TrafficView::new(settings.export.clone());
    match args.output {
        Some(path) => {
            let path = view
                .save_export(&messages, format, Some(&path))
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), %format, "Export written");
        }
        None => print!("{}", view.format_export(&messages, format)),
    }
    Ok(())
}

/// Drive the synthesizer directly for a fixed number of ticks
fn run_ticks(config: SimulationConfig, ticks: usize) -> Vec<Message> {
    let mut sim = Synthesizer::new(config);
    sim.start();

    let (mut emitted, mut flagged) = (0usize, 0usize);
    for _ in 0..ticks {
        let report = sim.tick();
        emitted += report.emitted;
        flagged += report.flagged;
    }

    let gauges = sim.gauges();
    info!(
        ticks,
        emitted,
        flagged,
        bus_load = gauges.bus_load,
        error_rate = gauges.error_rate,
        "Run complete"
    );
    sim.stop();
    sim.messages().to_vec()
}

/// Run a timed session in real time
async fn run_live(config: SimulationConfig, duration: Duration) -> Result<Vec<Message>> {
    let (handle, _events, task) = spawn_session(Synthesizer::new(config));
    handle.start().await?;
    tokio::time::sleep(duration).await;
    handle.stop().await?;

    let snapshot = handle.snapshot().await?;
    info!(
        seconds = duration.as_secs(),
        emitted = snapshot.emitted_since_start,
        buffered = snapshot.messages.len(),
        "Run complete"
    );

    handle.shutdown().await?;
    task.await.context("session task failed")?;
    Ok(snapshot.messages)
}
