//! # Video Compressor - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Lettura e validazione della configurazione
//! - Inizializzazione del motore, compressione e salvataggio del risultato
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (file, preset, output, ffmpeg, json, verbose)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, RUST_LOG ha la precedenza)
//! 3. Carica la configurazione e applica gli override della riga di comando
//! 4. Seleziona il file, inizializza il motore, avvia la sessione
//! 5. Salva `compressed_<nome>` e mostra il riepilogo
//!
//! ## Esempio di utilizzo:
//! ```bash
//! video-compressor holiday.mp4 --preset strong --output ./out
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use local_video_compressor::format::format_size;
use local_video_compressor::json_output::{self, JsonMessage};
use local_video_compressor::progress::ProgressManager;
use local_video_compressor::{
    CompressError, Config, EngineManager, FfmpegEngine, PrimaryAction, QualityPreset, SessionController, SourceAsset,
};

#[derive(Parser)]
#[command(name = "video-compressor")]
#[command(about = "Compress a video locally, nothing leaves this machine")]
struct Args {
    /// Video file to compress
    input: PathBuf,

    /// Compression level
    #[arg(short, long, value_enum)]
    preset: Option<QualityPreset>,

    /// Directory for the compressed file (default: next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Config file (default: <config dir>/video-compressor/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output progress and status as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args).await?;
    let preset = args.preset.unwrap_or(config.preset);

    if !args.input.is_file() {
        return Err(anyhow::anyhow!("Input file does not exist: {}", args.input.display()));
    }

    let engine = Arc::new(FfmpegEngine::new(config.ffmpeg_path.clone()));
    let manager = Arc::new(EngineManager::new(engine));
    let controller = SessionController::new(manager.clone());

    let asset = SourceAsset::from_path(&args.input).await?;
    info!("{} ({})", asset.name(), format_size(asset.len()));
    controller.select_source(asset);

    let (action, _) = controller.primary_action().await;
    if action == PrimaryAction::Initialize {
        initialize_engine(&manager, config.json_output).await?;
    }

    info!("🎯 Preset: {} - {}", preset, preset.description());

    let events = controller.subscribe();
    let display = if config.json_output {
        json_output::follow(events)
    } else {
        ProgressManager::new().follow(events)
    };

    let outcome = controller.compress_selected(preset).await;
    if matches!(outcome, Err(CompressError::InvalidInput(_))) {
        // Rejected before any state was published
        display.abort();
    } else if let Err(e) = display.await {
        warn!("Progress display stopped unexpectedly: {}", e);
    }

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            if config.json_output {
                JsonMessage::from_state(&controller.state()).emit();
            }
            return Err(anyhow::anyhow!("{} ({})", e.user_message(), e));
        }
    };

    let output_dir = config.output_dir_for(&args.input);
    let saved = controller.download(&output_dir).await?;

    if config.json_output {
        JsonMessage::from_state(&controller.state())
            .with_saved_path(saved)
            .emit();
    } else {
        info!("=== Compression Complete ===");
        info!("Original size: {}", format_size(result.original_size));
        info!("Compressed size: {}", format_size(result.compressed_size));
        info!("Space saved: {}", result.compression_ratio());
        info!("💾 Saved to: {}", saved.display());
    }

    Ok(())
}

/// Read the config file and apply command line overrides
async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::from_file(&path).await?,
        None => Config::default(),
    };

    if args.output.is_some() {
        config.output_dir = args.output.clone();
    }
    if args.ffmpeg.is_some() {
        config.ffmpeg_path = args.ffmpeg.clone();
    }
    config.json_output |= args.json;

    config.validate()?;
    Ok(config)
}

async fn initialize_engine(manager: &EngineManager, json_output: bool) -> Result<()> {
    if json_output {
        JsonMessage::engine("loading", None).emit();
        let outcome = manager.ensure_ready().await;
        match outcome {
            Ok(()) => JsonMessage::engine("ready", None).emit(),
            Err(ref e) => JsonMessage::engine("failed", Some(e.to_string())).emit(),
        }
        return outcome.map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e));
    }

    let spinner = ProgressManager::spinner("Loading FFmpeg...");
    match manager.ensure_ready().await {
        Ok(()) => {
            spinner.finish_with_message("FFmpeg loaded successfully!");
            Ok(())
        }
        Err(e) => {
            spinner.abandon_with_message(e.user_message());
            Err(anyhow::anyhow!("{} ({})", e.user_message(), e))
        }
    }
}
