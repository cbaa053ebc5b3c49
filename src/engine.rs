//! Session orchestration: one `SyncEngine` per hosting surface.
//!
//! The engine owns the mirrored tree, atom store, and ref registry,
//! batches user-originated events, and drives the request/response
//! cycle through the update scheduler. Everything runs on one event
//! loop: round trips are asynchronous, the engine suspends logically
//! between send and response handling, and the scheduler's
//! single-flight discipline keeps payload assembly and response
//! application atomic with respect to each other.
//!
//! All collaborators are injected (transport, clock), so multiple
//! independent sessions can run side by side in tests.

use crate::atoms::AtomStore;
use crate::node::ElementNode;
use crate::protocol::{
    BackendOpts, BackendUpdate, FrontendUpdate, KeyEventData, MessageKind, RefOp, RenderContext,
    UiEvent,
};
use crate::refs::{RefRegistry, UiHandle};
use crate::scheduler::{DispatchDecision, UpdateScheduler};
use crate::time::SharedTimeSource;
use crate::tree::VTree;
use crate::version::VersionTable;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Request/response channel to the backend. How bytes get there is the
/// surrounding application's concern.
#[async_trait(?Send)]
pub trait Transport {
    async fn round_trip(&mut self, update: FrontendUpdate) -> Result<BackendUpdate>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Disposing,
    Disposed,
}

struct EngineInner {
    route_id: String,
    /// Non-persistent sessions auto-dispose when the route goes away.
    persist: bool,
    state: SessionState,
    root_ref_id: String,
    tree: VTree,
    versions: VersionTable,
    atoms: AtomStore,
    refs: RefRegistry,
    pending_events: Vec<UiEvent>,
    scheduler: UpdateScheduler,
    focused: bool,
    width: u32,
    height: u32,
    /// Whether any cycle has been assembled for this session yet.
    initialized: bool,
    /// Bumped on reset; responses from an older generation are dropped.
    generation: u64,
    resync_needed: bool,
    dispose_pending: bool,
    dispose_sent: bool,
    opts: BackendOpts,
    time: SharedTimeSource,
}

impl EngineInner {
    fn accepts_signals(&self) -> bool {
        matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Active
        )
    }

    /// Flush everything accumulated since the last cycle into one
    /// outbound payload. The event queue is cleared here, at assembly:
    /// delivery is at-most-once, with no replay on failure.
    fn assemble_payload(&mut self) -> FrontendUpdate {
        let initialize = !self.initialized;
        self.initialized = true;
        if self.state == SessionState::Uninitialized {
            self.state = SessionState::Active;
        }
        let resync = initialize || std::mem::take(&mut self.resync_needed);
        let dispose = self.dispose_pending && !self.dispose_sent;
        if dispose {
            self.dispose_sent = true;
        }
        FrontendUpdate {
            ts: chrono::Utc::now().timestamp_millis(),
            session_id: self.route_id.clone(),
            initialize,
            resync,
            dispose,
            render_context: RenderContext {
                focused: self.focused,
                width: self.width,
                height: self.height,
                root_ref_id: self.root_ref_id.clone(),
            },
            events: std::mem::take(&mut self.pending_events),
            ref_updates: self.refs.collect_outbound_updates(),
        }
    }

    /// Apply a backend response: tree edits, then atom syncs, then ref
    /// operations, then diagnostics and runtime options.
    fn apply_backend_update(&mut self, update: BackendUpdate) {
        self.tree
            .apply_batch(&update.render_updates, &mut self.versions);

        for sync in update.state_sync {
            let dependents = self.atoms.write(&sync.atom_name, sync.value, true);
            for node_id in dependents {
                if let Some(idx) = self.tree.lookup(&node_id) {
                    self.versions.bump(idx);
                }
            }
        }

        for op in update.ref_operations {
            match op.op {
                RefOp::Focus => self.refs.focus(&op.ref_id),
                RefOp::Unknown => {
                    warn!("unrecognized ref operation for {:?}, skipping", op.ref_id)
                }
            }
        }

        for msg in update.messages {
            match msg.kind {
                MessageKind::Error => {
                    error!(stacktrace = ?msg.stacktrace, "backend: {}", msg.text)
                }
                MessageKind::Info | MessageKind::Unknown => info!("backend: {}", msg.text),
            }
        }

        if let Some(opts) = update.opts {
            debug!(?opts, "ingesting backend options");
            self.opts = opts;
        }
    }

    fn reset(&mut self) {
        self.tree.clear();
        self.versions.clear();
        self.atoms.clear();
        self.refs.clear();
        self.pending_events.clear();
        self.root_ref_id = uuid::Uuid::new_v4().to_string();
        self.state = SessionState::Uninitialized;
        self.initialized = false;
        self.generation += 1;
        self.resync_needed = true;
        self.dispose_pending = false;
        self.dispose_sent = false;
    }
}

/// Cheap-to-clone handle to one synchronization session. All clones
/// share the same session; the engine is single-threaded and must stay
/// on the event loop that created it.
pub struct SyncEngine<T: Transport> {
    inner: Rc<RefCell<EngineInner>>,
    transport: Rc<RefCell<T>>,
    notify: Arc<Notify>,
}

impl<T: Transport> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            transport: Rc::clone(&self.transport),
            notify: Arc::clone(&self.notify),
        }
    }
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(
        route_id: impl Into<String>,
        persist: bool,
        transport: T,
        time: SharedTimeSource,
    ) -> Self {
        let route_id = route_id.into();
        info!(%route_id, persist, "starting vdom session");
        Self {
            inner: Rc::new(RefCell::new(EngineInner {
                route_id,
                persist,
                state: SessionState::Uninitialized,
                root_ref_id: uuid::Uuid::new_v4().to_string(),
                tree: VTree::new(),
                versions: VersionTable::new(),
                atoms: AtomStore::new(),
                refs: RefRegistry::new(),
                pending_events: Vec::new(),
                scheduler: UpdateScheduler::new(time.clone()),
                focused: false,
                width: 0,
                height: 0,
                initialized: false,
                generation: 0,
                resync_needed: false,
                dispose_pending: false,
                dispose_sent: false,
                opts: BackendOpts::default(),
                time,
            })),
            transport: Rc::new(RefCell::new(transport)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.borrow().state
    }

    pub fn session_id(&self) -> String {
        self.inner.borrow().route_id.clone()
    }

    pub fn root_ref_id(&self) -> String {
        self.inner.borrow().root_ref_id.clone()
    }

    /// Whether the backend asked the surface to capture keyboard input
    /// globally.
    pub fn global_keyboard_capture(&self) -> bool {
        self.inner.borrow().opts.global_keyboard_capture
    }

    /// Record the viewport/focus context carried on every payload.
    pub fn set_render_context(&self, focused: bool, width: u32, height: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.focused = focused;
        inner.width = width;
        inner.height = height;
    }

    /// Queue a user-originated event for the next outbound payload and
    /// signal a normal update.
    pub fn queue_event(&self, target_id: Option<&str>, kind: &str, data: Value) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.accepts_signals() {
                debug!(kind, "dropping event for terminal session");
                return;
            }
            inner.pending_events.push(UiEvent {
                target_id: target_id.map(str::to_string),
                kind: kind.to_string(),
                data,
            });
            inner.scheduler.request(false, std::time::Duration::ZERO);
        }
        self.notify.notify_one();
    }

    /// Queue a keyboard event with the typed payload shape.
    pub fn queue_key_event(&self, target_id: Option<&str>, kind: &str, key: KeyEventData) {
        match serde_json::to_value(&key) {
            Ok(data) => self.queue_event(target_id, kind, data),
            Err(err) => warn!("could not serialize key event: {err}"),
        }
    }

    /// Ask for a round trip without queueing an event. Quick requests
    /// dispatch immediately; normal ones coalesce.
    pub fn request_update(&self, quick: bool) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.accepts_signals() {
                return;
            }
            inner.scheduler.request(quick, std::time::Duration::ZERO);
        }
        self.notify.notify_one();
    }

    /// Current value of a shared atom.
    pub fn read_atom(&self, name: &str) -> Value {
        self.inner.borrow_mut().atoms.read(name)
    }

    /// Optimistic local write: updates the store, invalidates
    /// dependents, and queues an event so the backend converges. The
    /// backend's next sync remains authoritative.
    pub fn write_atom_local(&self, name: &str, value: Value) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.accepts_signals() {
                return;
            }
            let dependents = inner.atoms.write(name, value.clone(), false);
            for node_id in dependents {
                if let Some(idx) = inner.tree.lookup(&node_id) {
                    inner.versions.bump(idx);
                }
            }
        }
        self.queue_event(
            None,
            "atom:update",
            serde_json::json!({ "name": name, "value": value }),
        );
    }

    pub fn bind_atom_dependency(&self, node_id: &str, names: &[String]) {
        self.inner.borrow_mut().atoms.bind_dependency(node_id, names);
    }

    pub fn unbind_atom_dependency(&self, node_id: &str, names: &[String]) {
        self.inner
            .borrow_mut()
            .atoms
            .unbind_dependency(node_id, names);
    }

    pub fn declare_ref(&self, ref_id: &str, track_position: bool) {
        self.inner.borrow_mut().refs.declare(ref_id, track_position);
    }

    pub fn attach_ref(&self, ref_id: &str, handle: Rc<dyn UiHandle>) {
        self.inner.borrow_mut().refs.attach(ref_id, handle);
    }

    pub fn detach_ref(&self, ref_id: &str) {
        self.inner.borrow_mut().refs.detach(ref_id);
    }

    pub fn ref_is_live(&self, ref_id: &str) -> bool {
        self.inner.borrow().refs.is_live(ref_id)
    }

    /// Redraw version of an addressable node, for UI invalidation.
    pub fn node_version(&self, id: &str) -> Option<u64> {
        let inner = self.inner.borrow();
        let idx = inner.tree.lookup(id)?;
        Some(inner.versions.get(idx))
    }

    /// Wire-form snapshot of the mirrored tree.
    pub fn tree_snapshot(&self) -> Option<ElementNode> {
        self.inner.borrow().tree.snapshot()
    }

    /// Read access to the mirrored tree without cloning it.
    pub fn with_tree<R>(&self, f: impl FnOnce(&VTree) -> R) -> R {
        f(&self.inner.borrow().tree)
    }

    /// Externally signaled desync: the next payload asks the backend
    /// for a full resync.
    pub fn mark_desynced(&self) {
        self.inner.borrow_mut().resync_needed = true;
        self.request_update(false);
    }

    /// Local interrupt gesture. Disposes the session only when the
    /// backend opted in via `closeOnInterrupt`.
    pub fn notify_interrupt(&self) {
        let close = self.inner.borrow().opts.close_on_interrupt;
        if close {
            self.shutdown();
        } else {
            debug!("interrupt ignored: backend did not request close-on-interrupt");
        }
    }

    /// The backend route became unreachable. Non-persistent sessions
    /// auto-dispose.
    pub fn route_unreachable(&self) {
        let persist = self.inner.borrow().persist;
        if persist {
            debug!("route unreachable; persistent session stays up");
        } else {
            self.shutdown();
        }
    }

    /// Begin cooperative disposal: the next payload carries the dispose
    /// flag, and once that cycle completes no further requests are ever
    /// sent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if matches!(
                inner.state,
                SessionState::Disposing | SessionState::Disposed
            ) {
                return;
            }
            info!(route_id = %inner.route_id, "disposing vdom session");
            inner.state = SessionState::Disposing;
            inner.dispose_pending = true;
            inner.scheduler.request(true, std::time::Duration::ZERO);
        }
        self.notify.notify_one();
    }

    /// External reset signal: drop all mirrored state and start a fresh
    /// session with a new root-ref identity. Ignored once disposal has
    /// begun. A response already in flight when the reset arrives is
    /// discarded when it lands.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.accepts_signals() {
                warn!("ignoring reset for terminal session");
                return;
            }
            inner.reset();
            inner.scheduler.request(false, std::time::Duration::ZERO);
        }
        self.notify.notify_one();
    }

    /// Deadline of the next scheduled dispatch, for hosts driving the
    /// engine themselves instead of through `run`.
    pub fn next_dispatch_at(&self) -> Option<Instant> {
        self.inner.borrow().scheduler.next_deadline()
    }

    /// Run one dispatch attempt: if a dispatch is due, assemble the
    /// payload, perform the round trip, and apply the response.
    /// Transport failures are logged and complete the scheduler
    /// bookkeeping; they are never propagated and never retried.
    pub async fn tick(&self) {
        let (payload, generation) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == SessionState::Disposed {
                inner.scheduler.cancel_all();
                return;
            }
            match inner.scheduler.begin_dispatch() {
                DispatchDecision::Send => (inner.assemble_payload(), inner.generation),
                DispatchDecision::Deferred | DispatchDecision::Idle => return,
            }
        };
        let dispose = payload.dispose;
        debug!(
            events = payload.events.len(),
            initialize = payload.initialize,
            dispose,
            "sending frontend update"
        );

        // Single-flight: only the tick that got `Send` reaches this
        // borrow; concurrent ticks bail out above as Deferred/Idle.
        let result = self.transport.borrow_mut().round_trip(payload).await;

        let mut inner = self.inner.borrow_mut();
        inner.scheduler.complete();
        if inner.generation != generation {
            // The session was reset while this round trip was in
            // flight; its outcome belongs to the old session.
            debug!("dropping round-trip outcome from before session reset");
        } else {
            match result {
                Ok(update) => inner.apply_backend_update(update),
                Err(err) => warn!("vdom round trip failed: {err:#}"),
            }
            if dispose {
                info!(route_id = %inner.route_id, "vdom session disposed");
                inner.state = SessionState::Disposed;
                inner.scheduler.cancel_all();
            }
        }
        drop(inner);
        // Wake the driver: completion may have scheduled a deferred
        // quick dispatch.
        self.notify.notify_one();
    }

    /// Drive the session until disposal. Hosts embedded in their own
    /// event loop may instead poll `next_dispatch_at` and call `tick`.
    ///
    /// Timed waits are armed on the tokio wall clock, so this loop
    /// assumes a `RealTimeSource`. On a logical test clock it makes
    /// progress only through signal wakeups; such hosts should drive
    /// `tick` themselves.
    pub async fn run(&self) {
        loop {
            let (state, deadline) = {
                let inner = self.inner.borrow();
                (inner.state, inner.scheduler.next_deadline())
            };
            if state == SessionState::Disposed {
                break;
            }
            match deadline {
                Some(deadline) => {
                    let now = self.inner.borrow().time.now();
                    if deadline <= now {
                        self.tick().await;
                        continue;
                    }
                    let wait = deadline - now;
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(wait) => self.tick().await,
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }
}
