// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless playback driver.
//!
//! Loads a project, builds an engine over the filesystem fetcher and
//! simulated media elements, and ticks it at a fixed rate until playback
//! ends, the run time elapses, or nothing is left to do.

use crate::error::AppError;
use crate::fetcher::FsFetcher;
use crate::file_watcher::{FileWatcher, FileWatcherConfig};
use crate::project::{load_timeline, ProjectSettings, ScheduledAction, ScriptAction};
use crate::sim::{SimStats, SimulatedBackend};
use clipforge_playback::{
    BufferEvent, MonotonicTimeSource, PlaybackEngine, PlaybackState, PlaybackStatus, TimeSource,
    TimelineFeed,
};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

/// What happened during a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Engine ticks performed
    pub ticks: u64,
    /// State after the last tick
    pub final_state: PlaybackState,
    /// Warnings reported by the engine
    pub warnings: usize,
    /// Timeline reloads published
    pub reloads: usize,
    /// Times playback wrapped around
    pub loops: usize,
    /// Simulated element counters
    pub sim: SimStats,
}

/// Run the project in `project_dir` to completion
pub async fn run(project_dir: &Path, settings: &ProjectSettings) -> Result<RunSummary, AppError> {
    let driver = &settings.driver;
    let timeline_path = settings.timeline_path(project_dir);
    let timeline = load_timeline(&timeline_path)?;
    tracing::info!(
        "Loaded timeline '{}' ({} tracks, {:.0}ms)",
        timeline.name,
        timeline.track_count(),
        timeline.duration_ms
    );

    let feed = TimelineFeed::new(&timeline)?;
    let fetcher = Arc::new(FsFetcher::new(settings.media_root(project_dir)));
    let backend = SimulatedBackend::new(driver.element_skew);
    let time = MonotonicTimeSource::new();

    let mut engine = PlaybackEngine::new(
        settings.engine.clone(),
        feed.subscribe(),
        fetcher,
        Box::new(backend.clone()),
        Handle::current(),
    )?;

    let sources: BTreeSet<String> = engine
        .timeline()
        .clips()
        .iter()
        .filter(|clip| clip.has_media_element())
        .map(|clip| clip.source_url.clone())
        .collect();
    for url in &sources {
        engine.subscribe_buffer_progress(url, log_buffer_event);
    }

    let watcher = match FileWatcher::new(&timeline_path, FileWatcherConfig::default()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!("Timeline hot reload disabled: {}", e);
            None
        }
    };

    let mut script: Vec<ScheduledAction> = driver.script.clone();
    script.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
    let mut script: VecDeque<ScheduledAction> = script.into();

    let tick_rate = if driver.tick_rate.is_finite() && driver.tick_rate > 0.0 {
        driver.tick_rate
    } else {
        tracing::warn!("Invalid tick rate {}, using 60", driver.tick_rate);
        60.0
    };
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / tick_rate));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if driver.autoplay {
        engine.play();
    }

    let started_ms = time.now_ms();
    let run_limit_ms = driver.run_seconds.map(|s| s * 1000.0);
    let mut last_status_ms = f64::NEG_INFINITY;
    let mut summary = RunSummary {
        ticks: 0,
        final_state: engine.playback_state(),
        warnings: 0,
        reloads: 0,
        loops: 0,
        sim: SimStats::default(),
    };

    loop {
        interval.tick().await;
        let now_ms = time.now_ms();
        let elapsed_ms = now_ms - started_ms;

        while script.front().is_some_and(|a| a.at_ms <= elapsed_ms) {
            if let Some(scheduled) = script.pop_front() {
                apply(&mut engine, scheduled.action);
            }
        }

        if watcher.as_ref().is_some_and(FileWatcher::poll_changed) {
            match load_timeline(&timeline_path).and_then(|t| feed.publish(&t).map_err(AppError::from)) {
                Ok(()) => {
                    summary.reloads += 1;
                    tracing::info!("Reloaded {:?}", timeline_path);
                }
                Err(e) => tracing::warn!("Keeping previous timeline: {}", e),
            }
        }

        let previous = summary.final_state;
        let state = engine.tick(now_ms);
        summary.final_state = state;
        summary.ticks += 1;

        for warning in engine.take_warnings() {
            tracing::warn!("{}", warning);
            summary.warnings += 1;
        }

        if now_ms - last_status_ms >= driver.status_interval_ms as f64 {
            last_status_ms = now_ms;
            log_status(&engine, &state);
        }

        let reached_end = previous.status == PlaybackStatus::Playing
            && state.status == PlaybackStatus::Idle
            && state.current_ms >= engine.timeline().duration_ms;
        if reached_end {
            if driver.loop_playback {
                summary.loops += 1;
                tracing::info!("Looping playback");
                engine.play();
                engine.seek(0.0);
                continue;
            }
            break;
        }

        if run_limit_ms.is_some_and(|limit| elapsed_ms >= limit) {
            tracing::info!("Run time elapsed");
            break;
        }

        let settled = matches!(state.status, PlaybackStatus::Idle | PlaybackStatus::Paused);
        if run_limit_ms.is_none() && settled && script.is_empty() {
            tracing::info!("Nothing left to play");
            break;
        }
    }

    engine.stop();
    if let Some(watcher) = watcher {
        watcher.stop();
    }
    summary.sim = backend.stats();
    Ok(summary)
}

fn apply(engine: &mut PlaybackEngine, action: ScriptAction) {
    tracing::debug!("Script: {:?}", action);
    match action {
        ScriptAction::Play => engine.play(),
        ScriptAction::Pause => engine.pause(),
        ScriptAction::Seek(time_ms) => {
            engine.seek(time_ms);
        }
        ScriptAction::SetRate(rate) => {
            if let Err(e) = engine.set_rate(rate) {
                tracing::warn!("Ignoring scripted rate change: {}", e);
            }
        }
        ScriptAction::Stop => engine.stop(),
    }
}

fn log_buffer_event(event: &BufferEvent) {
    match event {
        BufferEvent::Progress { url, percent } => tracing::trace!("Buffering {}: {:.0}%", url, percent),
        BufferEvent::Ready { url, size } => tracing::debug!("Buffered {} ({} bytes)", url, size),
        BufferEvent::Failed { url, reason } => tracing::warn!("Buffering {} failed: {}", url, reason),
    }
}

fn log_status(engine: &PlaybackEngine, state: &PlaybackState) {
    let frame = engine.frame_state(state.current_ms);
    let degraded = frame.active_clips.iter().filter(|c| c.degraded).count();
    let buffer = engine.buffer_stats();
    tracing::info!(
        "{:?} at {:.0}ms x{} | {} active clips ({} degraded) | buffer {} ready, {} loading, {} queued, {} failed, {} bytes, {:.0}%",
        state.status,
        state.current_ms,
        state.rate,
        frame.active_clips.len(),
        degraded,
        buffer.ready,
        buffer.loading,
        buffer.queued,
        buffer.failed,
        buffer.bytes,
        buffer.overall_progress
    );
}
