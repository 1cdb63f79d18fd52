use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use retinosync::core::SessionClock;
use retinosync::engine::{AcquisitionOrchestrator, SessionAnalyzer, SessionRequest, SessionStatus};
use retinosync::hal::mock::{RecordingDisplay, SimulatedCameraConfig, SimulatedCameraDriver};
use retinosync::hal::{CameraConfig, HardwareRegistry};
use retinosync::params::{AnalysisParams, InMemoryParameterStore, SessionParameters, StimulusParams};
use retinosync::stimulus::{generate_bar_sweep, BarSweep, InMemoryFrameLibrary};
use retinosync::OperationStatus;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const PARAMS_SNAPSHOT: &str = "session_params.json";

#[derive(Parser)]
#[command(name = "retinosync")]
#[command(about = "Timestamp-synchronised ISI acquisition and Fourier retinotopy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the cameras of every registered driver
    Discover,

    /// Run the acquisition protocol on simulated hardware
    Acquire {
        /// Parameter document (JSON object of groups)
        #[arg(long, value_name = "FILE")]
        params: PathBuf,

        /// Session directory for the recorded files
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// Keep camera and stimulus data and flush it to `out`
        #[arg(long)]
        record: bool,

        #[arg(long, default_value = "sim-cam-0")]
        camera: String,

        #[arg(long)]
        session_id: Option<String>,
    },

    /// Derive retinotopic maps from a recorded session
    Analyze {
        #[arg(long, value_name = "DIR")]
        session: PathBuf,

        #[arg(long, value_name = "FILE")]
        params: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse().command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            let status = OperationStatus::from(&e);
            match serde_json::to_string(&status) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", status.message),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Discover => discover().await,
        Commands::Acquire {
            params,
            out,
            record,
            camera,
            session_id,
        } => acquire(params, out, record, camera, session_id).await,
        Commands::Analyze { session, params } => analyze(session, params).await,
    }
}

async fn discover() -> Result<()> {
    let mut registry = HardwareRegistry::new();
    registry.register(SimulatedCameraDriver::new());

    let cameras = registry.discover_all().await?;
    println!("Found {} camera(s):", cameras.len());
    for info in cameras {
        println!(
            "  {} [{}] {}x{} via {} ({})",
            info.id,
            info.name,
            info.frame_shape.1,
            info.frame_shape.0,
            info.driver_id,
            if info.has_hardware_clock { "hardware clock" } else { "software timestamps only" }
        );
    }
    Ok(())
}

async fn acquire(
    params_path: PathBuf,
    out: PathBuf,
    record: bool,
    camera_id: String,
    session_id: Option<String>,
) -> Result<()> {
    let store = Arc::new(InMemoryParameterStore::new());
    store.load_json(&params_path).await?;
    let session = SessionParameters::from_store(store.as_ref())?;
    let stimulus = StimulusParams::from_store(store.as_ref())?;
    let clock = SessionClock::new();

    let library = Arc::new(InMemoryFrameLibrary::new());
    let (width, height) = stimulus.render_size(&session.monitor);
    let sweep = BarSweep {
        frames: stimulus.frames_per_sweep(&session.monitor),
        bar_width_deg: stimulus.bar_width_deg,
        width,
        height,
    };
    for &direction in &session.acquisition.directions {
        library.preload(direction, generate_bar_sweep(direction, &session.monitor, &sweep));
    }
    log::info!(
        "pre-generated {} frames per sweep at {}x{}",
        sweep.frames,
        width,
        height
    );

    let fps = session.camera.fps;
    let mut software = SimulatedCameraConfig::new("sim-cam-1", fps);
    software.hardware_clock = false;
    let mut registry = HardwareRegistry::new();
    registry.register(SimulatedCameraDriver::with_cameras(
        clock,
        vec![SimulatedCameraConfig::new("sim-cam-0", fps), software],
    ));
    let camera = registry.open_camera(SimulatedCameraDriver::DRIVER_ID, &camera_id, CameraConfig { fps })?;

    let session_id = session_id.unwrap_or_else(|| {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("session-{}", secs)
    });
    let request = if record {
        tokio::fs::create_dir_all(&out)
            .await
            .with_context(|| format!("Failed to create {}", out.display()))?;
        store.save_json(&out.join(PARAMS_SNAPSHOT)).await?;
        SessionRequest::record(session_id, &out)
    } else {
        SessionRequest::preview(session_id)
    };

    let display = Arc::new(RecordingDisplay::new());
    let mut orchestrator = AcquisitionOrchestrator::new(camera, library, display.clone(), store, clock);
    orchestrator.start(request)?;

    let abort = orchestrator.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort("interrupted by user");
        }
    });

    let (orchestrator, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = orchestrator.wait();
        (orchestrator, outcome)
    })
    .await?;
    let outcome = outcome?;

    match &outcome.status {
        SessionStatus::Completed => println!("Session {} complete", outcome.session_id),
        SessionStatus::Aborted { reason } => {
            println!("Session {} aborted: {}", outcome.session_id, reason)
        }
    }
    println!("Camera frames captured: {}", outcome.frames_captured);
    println!("Stimulus frames presented: {}", display.presented());
    for file in &outcome.files {
        println!("  wrote {}", file.display());
    }
    println!("\n{}", orchestrator.report());
    Ok(())
}

async fn analyze(session: PathBuf, params_path: PathBuf) -> Result<()> {
    let store = InMemoryParameterStore::new();
    store.load_json(&params_path).await?;
    let params = AnalysisParams::from_store(&store)?;

    let summary = tokio::task::spawn_blocking(move || SessionAnalyzer::new().analyze(&session, &params))
        .await?
        .context("Analysis failed")?;

    println!("Session {} analysed", summary.session_id);
    for (direction, frames) in &summary.frames_analyzed {
        println!("  {}: {} frames inside the stimulus span", direction, frames);
    }
    println!("Statistical VFS threshold: {:.4}", summary.statistical_threshold);
    println!("Results: {}", summary.results_path.display());
    Ok(())
}
