//! traffic_map - count vehicles on traffic cameras and build the density map
//!
//! Stages, in the order `run` executes them:
//! 1. `refresh`: replace the stored camera list with the live feed
//! 2. `capture`: download every camera's current snapshot
//! 3. `detect`: count vehicles and write annotated thumbnails
//! 4. `render`: write the map page

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use image::RgbImage;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use traffic_density::config::PipelineConfig;
use traffic_density::{
    build_map, load_detector, ConfirmHook, FilesystemArtifactStore, ImageSource,
    LeafletRenderer, Pipeline, PopupComposer, RecordStore, SqliteRecordStore,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", global = true)]
    ui: String,
    #[command(subcommand)]
    command: Stage,
}

#[derive(Subcommand, Debug)]
enum Stage {
    /// Replace the stored camera list with the live feed.
    Refresh,
    /// Download the current snapshot of every stored camera.
    Capture,
    /// Count vehicles on every stored camera.
    Detect {
        /// Show each annotated frame and wait for Enter before saving it.
        #[arg(long)]
        confirm: bool,
    },
    /// Build the map page from the stored counts.
    Render {
        /// Inline thumbnails instead of linking the remote image host.
        #[arg(long)]
        embed: bool,
    },
    /// refresh, capture, detect and render in one go.
    Run {
        #[arg(long)]
        confirm: bool,
        #[arg(long)]
        embed: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty);
    let cfg = PipelineConfig::load()?;
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("failed to create data dir {}", cfg.data_dir.display()))?;
    log::info!("data dir {}", cfg.data_dir.display());

    match args.command {
        Stage::Refresh => refresh(&cfg, &ui),
        Stage::Capture => capture(&cfg, &ui),
        Stage::Detect { confirm } => detect(&cfg, &ui, confirm),
        Stage::Render { embed } => render(&cfg, &ui, embed),
        Stage::Run { confirm, embed } => {
            refresh(&cfg, &ui)?;
            capture(&cfg, &ui)?;
            detect(&cfg, &ui, confirm)?;
            render(&cfg, &ui, embed)
        }
    }
}

#[cfg(feature = "fetch")]
fn refresh(cfg: &PipelineConfig, ui: &ui::Ui) -> Result<()> {
    let mut stage = ui.stage("Refresh camera list", 0);
    let client = traffic_density::FeedClient::new(&cfg.feed_url)?;
    let cameras = client.fetch_cameras()?;
    let mut store = SqliteRecordStore::open(cfg.record_db())?;
    store.replace_all(&cameras)?;
    store.persist()?;
    stage.set_summary(format!("{} cameras", cameras.len()));
    Ok(())
}

#[cfg(feature = "fetch")]
fn capture(cfg: &PipelineConfig, ui: &ui::Ui) -> Result<()> {
    let mut store = SqliteRecordStore::open(cfg.record_db())?;
    let cameras = store.list()?;
    let mut stage = ui.stage("Save images", cameras.len());
    let client = traffic_density::FeedClient::new(&cfg.feed_url)?;
    let dir = traffic_density::CapturedImageDir::new(cfg.captured_dir());
    let stats = client.capture_all(&cameras, &dir);
    stage.progress(cameras.len());
    stage.set_summary(format!("{} saved, {} failed", stats.saved, stats.failed));
    Ok(())
}

#[cfg(not(feature = "fetch"))]
fn refresh(_cfg: &PipelineConfig, _ui: &ui::Ui) -> Result<()> {
    Err(anyhow!("refresh requires the fetch feature"))
}

#[cfg(not(feature = "fetch"))]
fn capture(_cfg: &PipelineConfig, _ui: &ui::Ui) -> Result<()> {
    Err(anyhow!("capture requires the fetch feature"))
}

fn detect(cfg: &PipelineConfig, ui: &ui::Ui, confirm: bool) -> Result<()> {
    let detector = {
        let _stage = ui.stage("Load cascade", 0);
        load_detector(cfg.detector_kind, &cfg.cascade_file(), cfg.detector)?
    };
    let pipeline = Pipeline::new(detector);
    let mut store = SqliteRecordStore::open(cfg.record_db())?;
    let frames = traffic_density::CapturedImageDir::new(cfg.captured_dir());
    let artifacts = FilesystemArtifactStore::new(cfg.bounded_dir())?;
    let terminal = TerminalConfirm {
        preview_path: cfg.data_dir.join("preview.jpg"),
    };
    let hook: Option<&dyn ConfirmHook> = if confirm { Some(&terminal) } else { None };

    let total = store.list()?.len();
    let mut stage = ui.stage("Update car count", total);
    let summary = pipeline.run_all(&mut store, &frames, &artifacts, hook, &mut |done: usize| {
        stage.progress(done)
    })?;
    stage.set_summary(format!(
        "{} vehicles on {} cameras, {} without data",
        summary.vehicles, summary.counted, summary.no_data
    ));
    Ok(())
}

fn render(cfg: &PipelineConfig, ui: &ui::Ui, embed: bool) -> Result<()> {
    let mut stage = ui.stage("Build map", 0);
    let mut store = SqliteRecordStore::open(cfg.record_db())?;
    let artifacts = FilesystemArtifactStore::new(cfg.bounded_dir())?;
    let source = if embed || cfg.map.embed_images {
        ImageSource::Embedded
    } else {
        ImageSource::Remote {
            base_url: cfg.map.image_base_url.clone(),
        }
    };
    let composer = PopupComposer::new(source);
    let drawn = build_map(
        &mut store,
        &artifacts,
        &composer,
        &LeafletRenderer::default(),
        &cfg.map_file(),
    )?;
    stage.set_summary(format!("{} cameras on {}", drawn, cfg.map_file().display()));
    Ok(())
}

/// Writes the annotated frame next to the data and blocks until Enter.
struct TerminalConfirm {
    preview_path: PathBuf,
}

impl ConfirmHook for TerminalConfirm {
    fn confirm(&self, camera_id: &str, annotated: &RgbImage) -> Result<()> {
        annotated
            .save(&self.preview_path)
            .with_context(|| format!("failed to write preview {}", self.preview_path.display()))?;
        eprint!(
            "camera {}: preview at {}; press Enter to keep it",
            camera_id,
            self.preview_path.display()
        );
        std::io::stderr().flush()?;
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(anyhow!("stdin closed while waiting for confirmation"));
        }
        Ok(())
    }
}
