// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audio/video sync.
//!
//! The sync manager owns every media element and is the only code that
//! moves their native position. Each tick it reconciles the set of
//! elements with the clips around the playhead, then keeps each playing
//! element within the drift threshold of the clock.

use crate::cache::{BufferManager, BufferState};
use crate::config::EngineConfig;
use crate::error::PlaybackWarning;
use crate::media::{MediaBackend, MediaElement, MediaPosition};
use clipforge_timeline::{ClipId, CompiledClip, TimelineSnapshot};
use indexmap::IndexMap;

/// Read-only view of the engine handed to the sync manager each tick
pub struct SyncContext<'a> {
    /// Playhead for this tick
    pub time_ms: f64,
    /// Whether media should be running natively
    pub playing: bool,
    /// Clock playback rate
    pub rate: f64,
    /// Timestamp of this tick
    pub now_ms: f64,
    /// Timeline being played
    pub timeline: &'a TimelineSnapshot,
    /// Buffered media
    pub cache: &'a BufferManager,
    /// Engine tuning
    pub config: &'a EngineConfig,
}

/// Role of a managed element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Positioned at its clip's start, paused, waiting for the boundary
    Armed,
    /// Its clip covers the playhead
    Active,
}

struct Slot {
    clip_id: ClipId,
    url: String,
    element: Box<dyn MediaElement>,
    role: SlotRole,
    loaded: bool,
    unavailable: bool,
    warned: bool,
    waiting_since: Option<f64>,
    last_good_media_ms: f64,
    correcting: bool,
}

impl Slot {
    fn mark_unavailable(&mut self, reason: String, warnings: &mut Vec<PlaybackWarning>) {
        if self.unavailable {
            return;
        }
        self.unavailable = true;
        self.element.pause();
        self.element.set_muted(true);
        if !self.warned {
            self.warned = true;
            tracing::warn!("Clip {:?} unavailable ({}): {}", self.clip_id, self.url, reason);
            warnings.push(PlaybackWarning::MediaLoad {
                clip: self.clip_id,
                url: self.url.clone(),
                reason,
            });
        }
    }
}

/// Keeps media elements aligned with the playback clock
pub struct SyncManager {
    backend: Box<dyn MediaBackend>,
    slots: IndexMap<ClipId, Slot>,
    warnings: Vec<PlaybackWarning>,
    master: Option<ClipId>,
}

impl SyncManager {
    /// Create a new sync manager creating elements through `backend`
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self {
            backend,
            slots: IndexMap::new(),
            warnings: Vec::new(),
            master: None,
        }
    }

    /// Start a new play session: unavailable clips get another chance
    pub fn begin_session(&mut self) {
        for slot in self.slots.values_mut() {
            slot.unavailable = false;
            slot.warned = false;
            slot.waiting_since = None;
        }
    }

    /// Bring every element in line with the clock for this tick
    pub fn tick(&mut self, ctx: &SyncContext<'_>) {
        self.reconcile(ctx);
        self.feed(ctx);
        self.drive_active(ctx);
        self.hold_armed(ctx);
    }

    /// Position every required element for a new playhead and pause it
    pub fn seek(&mut self, ctx: &SyncContext<'_>) {
        self.reconcile(ctx);
        for (id, slot) in self.slots.iter_mut() {
            let Some(clip) = ctx.timeline.clip(*id) else {
                continue;
            };
            let target = match slot.role {
                SlotRole::Active => clip.media_time_ms(ctx.time_ms),
                SlotRole::Armed => clip.trim_in_ms,
            };
            slot.element.pause();
            if slot.element.current_time_ms() != target {
                slot.element.seek(target);
            }
            slot.element.set_rate(ctx.rate);
            slot.correcting = false;
            slot.waiting_since = None;
        }
        self.feed(ctx);
    }

    /// Whether every element needed at the playhead can play
    pub fn is_ready(&self) -> bool {
        self.slots
            .values()
            .filter(|s| s.role == SlotRole::Active)
            .all(|s| s.unavailable || s.element.is_ready())
    }

    /// Give up on active elements that are still not ready
    pub fn mark_unready_unavailable(&mut self, reason: &str) {
        let warnings = &mut self.warnings;
        for slot in self.slots.values_mut() {
            if slot.role == SlotRole::Active && !slot.unavailable && !slot.element.is_ready() {
                slot.mark_unavailable(reason.to_string(), warnings);
            }
        }
    }

    /// Pause every element
    pub fn pause_all(&mut self) {
        for slot in self.slots.values_mut() {
            if !slot.element.is_paused() {
                slot.element.pause();
            }
        }
    }

    /// Drop every element
    pub fn clear(&mut self) {
        self.pause_all();
        self.slots.clear();
        self.master = None;
    }

    /// Where a clip's media is
    pub fn media_position(&self, clip_id: ClipId) -> Option<MediaPosition> {
        let slot = self.slots.get(&clip_id)?;
        Some(if slot.unavailable {
            MediaPosition {
                time_ms: slot.last_good_media_ms,
                degraded: true,
            }
        } else {
            MediaPosition {
                time_ms: slot.element.current_time_ms(),
                degraded: false,
            }
        })
    }

    /// Role of a clip's element, if one exists
    pub fn role(&self, clip_id: ClipId) -> Option<SlotRole> {
        self.slots.get(&clip_id).map(|s| s.role)
    }

    /// Current rate master
    pub fn master(&self) -> Option<ClipId> {
        self.master
    }

    /// Number of managed elements
    pub fn element_count(&self) -> usize {
        self.slots.len()
    }

    /// Drain queued warnings
    pub fn take_warnings(&mut self) -> Vec<PlaybackWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Create elements for clips that need one and drop the rest
    fn reconcile(&mut self, ctx: &SyncContext<'_>) {
        let mut required: IndexMap<ClipId, SlotRole> = IndexMap::new();
        for clip in ctx
            .timeline
            .active_clips(ctx.time_ms)
            .filter(|c| c.has_media_element())
        {
            required.insert(clip.id, SlotRole::Active);
        }
        for clip in ctx
            .timeline
            .clips_starting_within(ctx.time_ms, ctx.config.pre_arm_ms)
            .filter(|c| c.has_media_element())
        {
            required.entry(clip.id).or_insert(SlotRole::Armed);
        }

        self.slots.retain(|id, slot| {
            let keep = required.contains_key(id)
                && ctx
                    .timeline
                    .clip(*id)
                    .is_some_and(|clip| clip.source_url == slot.url);
            if !keep {
                tracing::trace!("Retiring element for clip {:?}", id);
                slot.element.pause();
                slot.element.set_muted(true);
            }
            keep
        });

        for (id, role) in required {
            let Some(clip) = ctx.timeline.clip(id) else {
                continue;
            };
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.role = role;
                continue;
            }

            let position = match role {
                SlotRole::Armed => clip.trim_in_ms,
                SlotRole::Active => clip.media_time_ms(ctx.time_ms),
            };
            let mut element = self.backend.create_element(clip);
            element.pause();
            element.set_muted(true);
            element.set_rate(ctx.rate);
            element.seek(position);
            tracing::debug!("Created element for clip {:?} at {:.1}ms ({:?})", id, position, role);

            self.slots.insert(
                id,
                Slot {
                    clip_id: id,
                    url: clip.source_url.clone(),
                    element,
                    role,
                    loaded: false,
                    unavailable: false,
                    warned: false,
                    waiting_since: None,
                    last_good_media_ms: position,
                    correcting: false,
                },
            );
        }
    }

    /// Hand buffered bytes to elements and pick up load failures
    fn feed(&mut self, ctx: &SyncContext<'_>) {
        let warnings = &mut self.warnings;
        for slot in self.slots.values_mut() {
            if slot.unavailable {
                continue;
            }
            if !slot.loaded {
                match ctx.cache.state(&slot.url) {
                    Some(BufferState::Ready) => {
                        if let Some(data) = ctx.cache.data(&slot.url) {
                            slot.element.load(data);
                            slot.loaded = true;
                        }
                    }
                    Some(BufferState::Failed) => {
                        let reason = ctx
                            .cache
                            .entry(&slot.url)
                            .and_then(|e| e.error.clone())
                            .unwrap_or_else(|| "fetch failed".to_string());
                        slot.mark_unavailable(reason, warnings);
                        continue;
                    }
                    _ => {}
                }
            }
            if let Some(error) = slot.element.error() {
                slot.mark_unavailable(error, warnings);
                continue;
            }

            if slot.role != SlotRole::Active {
                continue;
            }
            if slot.element.is_ready() {
                slot.waiting_since = None;
                slot.last_good_media_ms = slot.element.current_time_ms();
            } else if ctx.playing {
                let since = *slot.waiting_since.get_or_insert(ctx.now_ms);
                let waited = ctx.now_ms - since;
                if waited > ctx.config.ready_timeout_ms {
                    slot.mark_unavailable(format!("not ready after {waited:.0}ms"), warnings);
                }
            }
        }
    }

    /// Earliest-starting active, audible, available clip
    fn elect_master(&self, ctx: &SyncContext<'_>) -> Option<ClipId> {
        self.slots
            .values()
            .filter(|s| s.role == SlotRole::Active && !s.unavailable)
            .filter_map(|s| ctx.timeline.clip(s.clip_id))
            .filter(|c| c.is_audible())
            .min_by(|a, b| a.start_ms.total_cmp(&b.start_ms))
            .map(|c| c.id)
    }

    fn drive_active(&mut self, ctx: &SyncContext<'_>) {
        let master = self.elect_master(ctx);
        if master != self.master {
            tracing::debug!("Rate master is now {:?}", master);
            self.master = master;
        }

        let mut slave_rate = ctx.rate;
        if let Some(id) = master {
            if let (Some(slot), Some(clip)) = (self.slots.get_mut(&id), ctx.timeline.clip(id)) {
                drive_slot(slot, clip, ctx, ctx.rate);
                slave_rate = slot.element.rate();
            }
        }

        for (id, slot) in self.slots.iter_mut() {
            if Some(*id) == master || slot.role != SlotRole::Active {
                continue;
            }
            let Some(clip) = ctx.timeline.clip(*id) else {
                continue;
            };
            let base_rate = if clip.is_audible() { slave_rate } else { ctx.rate };
            drive_slot(slot, clip, ctx, base_rate);
        }
    }

    fn hold_armed(&mut self, ctx: &SyncContext<'_>) {
        for (id, slot) in self.slots.iter_mut() {
            if slot.role != SlotRole::Armed {
                continue;
            }
            let Some(clip) = ctx.timeline.clip(*id) else {
                continue;
            };
            if !slot.element.is_paused() {
                slot.element.pause();
            }
            slot.element.set_muted(true);
            if (slot.element.current_time_ms() - clip.trim_in_ms).abs() > ctx.config.drift_threshold_ms {
                slot.element.seek(clip.trim_in_ms);
            }
        }
    }
}

/// Keep one active element within the drift threshold
fn drive_slot(slot: &mut Slot, clip: &CompiledClip, ctx: &SyncContext<'_>, base_rate: f64) {
    let config = ctx.config;
    let expected = clip.media_time_ms(ctx.time_ms);

    slot.element.set_muted(slot.unavailable || !clip.is_audible());
    slot.element.set_volume(clip.volume_at(ctx.time_ms));

    if slot.unavailable {
        if !slot.element.is_paused() {
            slot.element.pause();
        }
        return;
    }

    let drift = slot.element.current_time_ms() - expected;

    if !ctx.playing {
        if !slot.element.is_paused() {
            slot.element.pause();
        }
        if drift.abs() > config.drift_threshold_ms {
            slot.element.seek(expected);
        }
        slot.correcting = false;
        return;
    }

    // Starting playback or crossing into the clip
    if slot.element.is_paused() {
        if drift.abs() > config.drift_threshold_ms {
            slot.element.seek(expected);
        }
        slot.element.set_rate(base_rate);
        slot.correcting = false;
        slot.element.play();
        return;
    }

    if drift.abs() > config.hard_seek_threshold_ms {
        tracing::debug!("Clip {:?} drifted {:.1}ms, seeking", slot.clip_id, drift);
        slot.element.seek(expected);
        slot.element.set_rate(base_rate);
        slot.correcting = false;
    } else if drift.abs() > config.drift_threshold_ms {
        // Ahead slows down, behind speeds up
        let factor = if drift > 0.0 {
            1.0 - config.soft_rate_adjust
        } else {
            1.0 + config.soft_rate_adjust
        };
        slot.element.set_rate(base_rate * factor);
        slot.correcting = true;
    } else if slot.correcting {
        if drift.abs() <= config.drift_threshold_ms / 2.0 {
            slot.element.set_rate(base_rate);
            slot.correcting = false;
        }
    } else if slot.element.rate() != base_rate {
        slot.element.set_rate(base_rate);
    }
}
