use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecam_core::loader::DirectorySource;
use facecam_core::ModelLoader;
use facecam_hw::{Camera, V4lSource};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod present;
mod watch;

use config::Config;
use engine::{spawn_engine, EngineHandle};

#[derive(Parser)]
#[command(name = "facecam", about = "Webcam face detection, recognition and attribute overlay")]
struct Cli {
    /// TOML config file (overrides $FACECAM_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the live camera feed until Ctrl-C
    Watch {
        /// Detection interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,
        /// Stop after this many detection cycles
        #[arg(long)]
        cycles: Option<u64>,
        /// Print one JSON object per cycle
        #[arg(long)]
        json: bool,
        /// Write the frame with the overlay to this PNG every cycle
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
    /// Analyze a single image file
    Analyze {
        image: PathBuf,
        #[arg(long)]
        json: bool,
        /// Write the image with the overlay to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write caption annotations as JSON to this path
        #[arg(long)]
        labels: Option<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices,
    /// Show configuration and model availability
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?.with_env(),
        None => Config::load()?,
    };

    match cli.command {
        Commands::Watch {
            interval,
            cycles,
            json,
            overlay,
        } => {
            let period = Duration::from_millis(interval.unwrap_or(config.detection_interval_ms).max(1));
            let handle = start_engine(&config).await?;
            run_watch(&handle, period, cycles, json, overlay.as_deref()).await?;
        }
        Commands::Analyze {
            image,
            json,
            output,
            labels,
        } => {
            let decoded = image::open(&image)
                .with_context(|| format!("failed to open image {}", image.display()))?
                .into_rgb8();
            let handle = start_engine(&config).await?;
            let snapshot = handle.analyze_image(decoded, output.is_some()).await?;
            present::print_snapshot(&snapshot, json)?;
            if let Some(path) = &output {
                present::write_overlay(&snapshot, path)?;
            }
            if let Some(path) = &labels {
                present::write_labels(&snapshot.labels, path)?;
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Status => status(&config),
    }

    Ok(())
}

/// Load the networks and known faces, then hand them to the engine thread.
async fn start_engine(config: &Config) -> Result<EngineHandle> {
    let loader = ModelLoader::new(config.model_files(), &config.known_dir, config.known_labels.clone())
        .with_threshold(config.match_threshold);
    let models = tokio::task::spawn_blocking(move || loader.load(present::loading))
        .await
        .context("model loader task failed")?
        .context("failed to load models")?;

    let pipeline = models.into_pipeline().with_slot_strategy(config.slot_strategy);
    let source = V4lSource::new(&config.camera_device, config.capture_width, config.capture_height);
    Ok(spawn_engine(pipeline, source)?)
}

/// Start the camera, run the detection loop until Ctrl-C or `max_cycles`,
/// then release the camera.
async fn run_watch(
    handle: &EngineHandle,
    period: Duration,
    max_cycles: Option<u64>,
    json: bool,
    overlay: Option<&Path>,
) -> Result<()> {
    handle.start_camera().await.context("error accessing the camera")?;
    let status = handle.status().await?;
    tracing::info!(
        source = %status.source,
        active = status.camera_active,
        known = ?status.known_labels,
        threshold = status.match_threshold,
        faces = status.faces,
        interval_ms = period.as_millis() as u64,
        "watching"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let result = watch::run_cycles(handle, period, max_cycles, overlay.is_some(), shutdown, |snapshot| {
        present::print_snapshot(snapshot, json)?;
        if let Some(path) = overlay {
            present::write_overlay(snapshot, path)?;
        }
        Ok(())
    })
    .await;

    handle.stop_camera().await?;
    tracing::info!("camera stopped");
    result.map(|_| ())
}

fn status(config: &Config) {
    println!("camera:    {}", config.camera_device);
    println!("capture:   {}x{}", config.capture_width, config.capture_height);
    println!("interval:  {} ms", config.detection_interval_ms);
    println!("threshold: {}", config.match_threshold);
    println!("slots:     {:?}", config.slot_strategy);
    println!("models:    {}", config.model_dir.display());
    for (name, path) in config.model_files().entries() {
        println!("  {:<24} {}", name, presence(path));
    }
    println!("known:     {}", config.known_dir.display());
    let known = DirectorySource::new(&config.known_dir);
    for label in &config.known_labels {
        println!("  {:<24} {}", label, presence(&known.path_for(label)));
    }
}

fn presence(path: &Path) -> &'static str {
    if path.exists() {
        "ok"
    } else {
        "missing"
    }
}
