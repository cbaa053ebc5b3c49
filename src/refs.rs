//! Bindings between backend-declared refs and live UI handles.
//!
//! The UI layer owns the handles; the registry only observes them
//! through attach/detach. Liveness transitions are reported upstream
//! edge-triggered (once per transition), while geometry is reported
//! every cycle for bindings that track position, since it can change
//! without any attach/detach happening.

use crate::protocol::{RefPosition, RefUpdate};
use anyhow::Result;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Live UI element as seen by the registry. Implemented by the hosting
/// surface; `focus` may fail at the platform layer and the failure is
/// diagnosed locally, never propagated.
pub trait UiHandle {
    fn focus(&self) -> Result<()>;
    fn geometry(&self) -> RefPosition;
}

struct RefBinding {
    track_position: bool,
    handle: Option<Rc<dyn UiHandle>>,
    /// Liveness as last reported to the backend.
    reported_live: bool,
    /// Liveness changed since the last report.
    updated: bool,
}

impl RefBinding {
    fn has_live_handle(&self) -> bool {
        self.handle.is_some()
    }
}

#[derive(Default)]
pub struct RefRegistry {
    bindings: HashMap<String, RefBinding>,
}

impl RefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a binding, created on first reference from a tree node.
    /// Re-declaring updates the position-tracking flag only.
    pub fn declare(&mut self, ref_id: &str, track_position: bool) {
        self.bindings
            .entry(ref_id.to_string())
            .and_modify(|binding| binding.track_position = track_position)
            .or_insert(RefBinding {
                track_position,
                handle: None,
                reported_live: false,
                updated: false,
            });
    }

    /// Attach a live handle to a binding, declaring it if needed.
    pub fn attach(&mut self, ref_id: &str, handle: Rc<dyn UiHandle>) {
        self.declare(ref_id, self.tracks_position(ref_id));
        self.set_handle(ref_id, Some(handle));
    }

    /// Detach whatever handle a binding currently holds.
    pub fn detach(&mut self, ref_id: &str) {
        self.set_handle(ref_id, None);
    }

    /// Whether a binding currently holds a live handle.
    pub fn is_live(&self, ref_id: &str) -> bool {
        self.bindings
            .get(ref_id)
            .is_some_and(RefBinding::has_live_handle)
    }

    pub fn tracks_position(&self, ref_id: &str) -> bool {
        self.bindings
            .get(ref_id)
            .is_some_and(|binding| binding.track_position)
    }

    /// Everything to report this cycle: bindings with an unreported
    /// liveness transition, plus position data for every live
    /// position-tracked binding. Clears the dirty flag on transitions
    /// it reports.
    pub fn collect_outbound_updates(&mut self) -> Vec<RefUpdate> {
        let mut out = Vec::new();
        for (ref_id, binding) in &mut self.bindings {
            let live = binding.has_live_handle();
            let track = binding.track_position && live;
            if !binding.updated && !track {
                continue;
            }
            let position = if track {
                binding.handle.as_ref().map(|handle| handle.geometry())
            } else {
                None
            };
            out.push(RefUpdate {
                ref_id: ref_id.clone(),
                has_live_handle: live,
                position,
            });
            if binding.updated {
                binding.reported_live = live;
                binding.updated = false;
            }
        }
        out
    }

    /// Backend-requested focus. A dead or unknown ref is a diagnostic
    /// no-op; a platform failure is caught and diagnosed.
    pub fn focus(&self, ref_id: &str) {
        let handle = self
            .bindings
            .get(ref_id)
            .and_then(|binding| binding.handle.as_ref());
        match handle {
            Some(handle) => {
                if let Err(err) = handle.focus() {
                    warn!("focus on ref {ref_id:?} failed: {err:#}");
                }
            }
            None => debug!("focus requested for ref {ref_id:?} with no live handle"),
        }
    }

    /// Drop all bindings. Used on session reset.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    fn set_handle(&mut self, ref_id: &str, handle: Option<Rc<dyn UiHandle>>) {
        let Some(binding) = self.bindings.get_mut(ref_id) else {
            debug!("handle change for undeclared ref {ref_id:?}");
            return;
        };
        binding.handle = handle;
        // Edge-triggered: dirty only while liveness differs from what
        // was last reported, so attach+detach within one cycle cancels
        // out.
        binding.updated = binding.has_live_handle() != binding.reported_live;
    }
}
