//! Visual Feedback Controller
//!
//! Turns commit-level UI operations plus the current provenance chain
//! into on-screen feedback: a transient flash highlight naming the source
//! of an update, and a decaying heatmap showing where and how often
//! updates land.
//!
//! # Flash
//!
//! A flashed element gets the flash class and a source attribute carrying
//! the provenance label, removed after a fixed duration. Elements inside
//! a registered exclusion root (or inside the tracker's own dashboard,
//! marked by attribute or element-id convention) are never flashed, so
//! the dashboard cannot highlight itself.
//!
//! # Heatmap
//!
//! Hits are recorded per element in a non-owning side table (weak
//! references keyed by stable node identity) and rendered coalesced to at
//! most one pass per display-refresh frame. Intensity is the hit count
//! within a sliding window, normalized against a saturation threshold and
//! mapped to a three-band color ramp plus a proportional outline width.
//! Elements whose windowed count decays to zero are unstyled and evicted;
//! while any remain active, another frame is requested.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use indexmap::IndexMap;

use crate::dom::DomNode;
use crate::reactive::NodeId;

/// Class applied to flashed elements.
pub const FLASH_CLASS: &str = "__signalscope_flash";

/// Class applied to heatmapped elements.
pub const HEATMAP_CLASS: &str = "__signalscope_heatmap";

/// Attribute carrying the provenance label on a flashed element.
pub const SOURCE_ATTR: &str = "data-signalscope-source";

/// Attribute carrying the hit annotation on a heatmapped element.
pub const HEATMAP_LABEL_ATTR: &str = "data-heatmap-label";

/// Attribute marking the tracker's own dashboard subtree.
pub const MONITOR_ATTR: &str = "data-signalscope-monitor";

/// Element-id prefix marking dashboard elements.
const MONITOR_ID_PREFIX: &str = "monitor-";

/// How long a flash stays applied.
const FLASH_DURATION_MS: u64 = 1000;

/// Sliding window over which hits contribute to intensity.
const HEATMAP_WINDOW_MS: u64 = 5000;

/// Windowed hit count at which intensity saturates to 1.
const HEATMAP_SATURATION_HITS: f64 = 15.0;

/// Cap on retained hit timestamps per element.
const HEATMAP_HITS_MAX: usize = 256;

struct FlashEntry {
    node: Weak<DomNode>,
    expires_at: u64,
}

struct HeatmapEntry {
    node: Weak<DomNode>,
    hits: VecDeque<u64>,
    total_hits: u64,
    label: String,
}

/// Capability to unregister a flash exclusion root.
pub struct ExclusionGuard {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ExclusionGuard {
    /// Remove the exclusion root.
    pub fn unregister(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Flash and heatmap state. One per tracker context.
pub struct VisualFeedback {
    flash_enabled: AtomicBool,
    heatmap_enabled: AtomicBool,

    exclusion_roots: Arc<RwLock<Vec<(u64, Weak<DomNode>)>>>,

    flashes: Mutex<IndexMap<NodeId, FlashEntry>>,
    heatmap: Mutex<IndexMap<NodeId, HeatmapEntry>>,

    /// Set when a render pass is owed; cleared by the pass itself.
    frame_scheduled: AtomicBool,
}

impl VisualFeedback {
    pub fn new() -> Self {
        Self {
            flash_enabled: AtomicBool::new(true),
            heatmap_enabled: AtomicBool::new(false),
            exclusion_roots: Arc::new(RwLock::new(Vec::new())),
            flashes: Mutex::new(IndexMap::new()),
            heatmap: Mutex::new(IndexMap::new()),
            frame_scheduled: AtomicBool::new(false),
        }
    }

    pub fn set_flash_enabled(&self, enabled: bool) {
        self.flash_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn flash_enabled(&self) -> bool {
        self.flash_enabled.load(Ordering::SeqCst)
    }

    pub fn set_heatmap_enabled(&self, enabled: bool) {
        self.heatmap_enabled.store(enabled, Ordering::SeqCst);
        if !enabled {
            // One cleanup pass to unstyle whatever is currently lit.
            self.frame_scheduled.store(true, Ordering::SeqCst);
        }
    }

    pub fn heatmap_enabled(&self) -> bool {
        self.heatmap_enabled.load(Ordering::SeqCst)
    }

    /// Register a subtree that must never be flashed.
    pub fn register_exclusion_root(&self, root: &Arc<DomNode>) -> ExclusionGuard {
        static GUARD_COUNTER: AtomicU64 = AtomicU64::new(0);
        let guard_id = GUARD_COUNTER.fetch_add(1, Ordering::Relaxed);

        self.exclusion_roots
            .write()
            .expect("exclusion lock poisoned")
            .push((guard_id, Arc::downgrade(root)));

        let weak_roots = Arc::downgrade(&self.exclusion_roots);
        ExclusionGuard {
            cancel: Some(Box::new(move || {
                if let Some(roots) = weak_roots.upgrade() {
                    roots
                        .write()
                        .expect("exclusion lock poisoned")
                        .retain(|(id, _)| *id != guard_id);
                }
            })),
        }
    }

    /// Apply feedback for one commit: flash (when enabled and not
    /// excluded) and a heatmap hit (when enabled).
    pub fn apply_commit_feedback(&self, target: &Arc<DomNode>, label: &str, now: u64) {
        let Some(element) = target.nearest_element() else {
            return;
        };
        if self.flash_enabled() && !self.is_excluded(&element) {
            self.flash(&element, label, now);
        }
        if self.heatmap_enabled() {
            self.record_hit(&element, label, now);
        }
    }

    /// Whether a render/sweep pass is owed.
    pub fn needs_frame(&self) -> bool {
        self.frame_scheduled.load(Ordering::SeqCst)
            || !self.flashes.lock().expect("flash lock poisoned").is_empty()
    }

    /// One display-refresh pass: sweep expired flashes, render the
    /// heatmap, and request another frame while anything stays active.
    pub fn frame(&self, now: u64) {
        self.sweep_flashes(now);
        self.render_heatmap(now);
    }

    fn is_excluded(&self, element: &Arc<DomNode>) -> bool {
        {
            let roots = self.exclusion_roots.read().expect("exclusion lock poisoned");
            for (_, weak) in roots.iter() {
                if let Some(root) = weak.upgrade() {
                    if root.contains(element) {
                        return true;
                    }
                }
            }
        }
        if element.has_marked_ancestor(MONITOR_ATTR) {
            return true;
        }
        element
            .element_id()
            .is_some_and(|id| id.starts_with(MONITOR_ID_PREFIX))
    }

    fn flash(&self, element: &Arc<DomNode>, label: &str, now: u64) {
        element.set_attribute(SOURCE_ATTR, label);
        element.add_class(FLASH_CLASS);

        let mut flashes = self.flashes.lock().expect("flash lock poisoned");
        let entry = flashes.entry(element.id()).or_insert_with(|| FlashEntry {
            node: Arc::downgrade(element),
            expires_at: 0,
        });
        // A re-flash extends the highlight instead of stacking a second one.
        entry.expires_at = now + FLASH_DURATION_MS;
    }

    fn record_hit(&self, element: &Arc<DomNode>, label: &str, now: u64) {
        let mut heatmap = self.heatmap.lock().expect("heatmap lock poisoned");
        let entry = heatmap.entry(element.id()).or_insert_with(|| HeatmapEntry {
            node: Arc::downgrade(element),
            hits: VecDeque::new(),
            total_hits: 0,
            label: label.to_owned(),
        });
        entry.hits.push_back(now);
        while entry.hits.len() > HEATMAP_HITS_MAX {
            entry.hits.pop_front();
        }
        entry.total_hits += 1;
        entry.label = label.to_owned();
        drop(heatmap);

        self.frame_scheduled.store(true, Ordering::SeqCst);
    }

    fn sweep_flashes(&self, now: u64) {
        let mut flashes = self.flashes.lock().expect("flash lock poisoned");
        flashes.retain(|_, entry| {
            let Some(element) = entry.node.upgrade() else {
                return false;
            };
            if entry.expires_at <= now {
                element.remove_class(FLASH_CLASS);
                element.remove_attribute(SOURCE_ATTR);
                return false;
            }
            true
        });
    }

    fn render_heatmap(&self, now: u64) {
        let mut heatmap = self.heatmap.lock().expect("heatmap lock poisoned");

        if !self.heatmap_enabled() {
            // Unstyle everything but keep the per-element hit history, so
            // re-enabling picks up where it left off. Only dead elements
            // are dropped.
            heatmap.retain(|_, entry| {
                let Some(element) = entry.node.upgrade() else {
                    return false;
                };
                unstyle(&element);
                true
            });
            self.frame_scheduled.store(false, Ordering::SeqCst);
            return;
        }

        let cutoff = now.saturating_sub(HEATMAP_WINDOW_MS);
        heatmap.retain(|_, entry| {
            let Some(element) = entry.node.upgrade() else {
                return false;
            };
            while entry.hits.front().is_some_and(|&t| t <= cutoff) {
                entry.hits.pop_front();
            }
            let count = entry.hits.len();
            if count == 0 {
                unstyle(&element);
                return false;
            }

            let intensity = (count as f64 / HEATMAP_SATURATION_HITS).min(1.0);
            let color = heat_color(intensity);
            element.add_class(HEATMAP_CLASS);
            element.set_style("outline-color", &color);
            element.set_style(
                "outline-width",
                &format!("{}px", 1 + (intensity * 2.0).round() as u64),
            );
            element.set_style("--hm-color", &color);
            element.set_attribute(
                HEATMAP_LABEL_ATTR,
                &format!("{} ×{}", entry.label, count),
            );
            true
        });

        // Keep rendering while anything is still lit.
        self.frame_scheduled
            .store(!heatmap.is_empty(), Ordering::SeqCst);
    }
}

impl Default for VisualFeedback {
    fn default() -> Self {
        Self::new()
    }
}

fn unstyle(element: &Arc<DomNode>) {
    element.remove_class(HEATMAP_CLASS);
    element.remove_style("outline-color");
    element.remove_style("outline-width");
    element.remove_style("--hm-color");
    element.remove_attribute(HEATMAP_LABEL_ATTR);
}

/// Three-band color ramp: cool blue through warm orange to hot red.
fn heat_color(intensity: f64) -> String {
    let t = intensity.clamp(0.0, 1.0);
    if t < 0.33 {
        let p = t / 0.33;
        format!("rgba(59,130,246,{:.2})", 0.3 + p * 0.3)
    } else if t < 0.66 {
        let p = (t - 0.33) / 0.33;
        format!(
            "rgba({},{},{},{:.2})",
            59 + (192.0 * p).round() as i64,
            130 - (60.0 * p).round() as i64,
            246 - (176.0 * p).round() as i64,
            0.6 + p * 0.2
        )
    } else {
        let p = (t - 0.66) / 0.34;
        format!(
            "rgba(251,{},60,{:.2})",
            70 + (76.0 * (1.0 - p)).round() as i64,
            0.8 + p * 0.2
        )
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
