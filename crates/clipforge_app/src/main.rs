// SPDX-License-Identifier: MIT OR Apache-2.0
//! `ClipForge` - headless timeline playback
//!
//! Runs a project through the playback engine without a render surface:
//! - Timeline loaded from RON or JSON, hot reloaded on change
//! - Media fetched from the project's media directory
//! - Simulated media elements standing in for native players
//! - Scripted play/pause/seek/rate commands
//!
//! Usage: `clipforge [project-dir]`. A missing project is created with a
//! demo timeline.

mod driver;
mod error;
mod fetcher;
mod file_watcher;
mod project;
mod sim;

use error::AppError;
use project::{demo_timeline, save_timeline, ProjectSettings};
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("clipforge_app=debug".parse().unwrap())
        .add_directive("clipforge_playback=debug".parse().unwrap())
        .add_directive("notify=warn".parse().unwrap());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ClipForge v{}", env!("CARGO_PKG_VERSION"));

    let project_dir = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("."), PathBuf::from);

    if let Err(e) = run(&project_dir) {
        tracing::error!("Playback failed: {e}");
        std::process::exit(1);
    }
}

fn run(project_dir: &Path) -> Result<(), AppError> {
    let settings = open_project(project_dir)?;
    tracing::info!("Opened project '{}'", settings.name);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::io(project_dir, e))?;
    let summary = runtime.block_on(driver::run(project_dir, &settings))?;

    tracing::info!(
        "Finished: {} ticks, {:?} at {:.0}ms, {} warnings, {} reloads, {} loops, {} elements, {} loads, {} seeks",
        summary.ticks,
        summary.final_state.status,
        summary.final_state.current_ms,
        summary.warnings,
        summary.reloads,
        summary.loops,
        summary.sim.elements_created,
        summary.sim.loads,
        summary.sim.seeks
    );
    Ok(())
}

fn open_project(project_dir: &Path) -> Result<ProjectSettings, AppError> {
    let path = ProjectSettings::project_file_path(project_dir);
    if path.exists() {
        return ProjectSettings::load(&path).map_err(|e| AppError::io(&path, e));
    }

    tracing::info!("No project at {:?}, creating a demo project", project_dir);
    let settings = ProjectSettings::new("Demo Project");
    std::fs::create_dir_all(settings.media_root(project_dir))
        .map_err(|e| AppError::io(project_dir, e))?;
    settings.save(&path).map_err(|e| AppError::io(&path, e))?;

    let timeline_path = settings.timeline_path(project_dir);
    if !timeline_path.exists() {
        let timeline = demo_timeline();
        save_timeline(&timeline_path, &timeline)?;

        // Placeholder sources so the demo buffers something
        let media_root = settings.media_root(project_dir);
        for track in timeline.tracks().filter(|t| t.kind.has_media_element()) {
            for clip in track.clips() {
                let media = media_root.join(&clip.source_url);
                if !media.exists() {
                    std::fs::write(&media, vec![0u8; 256 * 1024]).map_err(|e| AppError::io(&media, e))?;
                }
            }
        }
    }
    Ok(settings)
}
