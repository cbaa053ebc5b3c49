//! Shared fixtures for engine integration tests: scripted and gated
//! mock transports, a fake UI handle, and an engine builder wired to a
//! test clock.

use anyhow::Result;
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use termdom::engine::{SyncEngine, Transport};
use termdom::protocol::{BackendUpdate, BoundingRect, FrontendUpdate, RefPosition};
use termdom::refs::UiHandle;
use termdom::time::TestTimeSource;

/// Records every outbound request and replies from a pre-scripted
/// queue, falling back to an empty response once the script runs out.
pub struct ScriptedTransport {
    requests: Rc<RefCell<Vec<FrontendUpdate>>>,
    responses: VecDeque<Result<BackendUpdate>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<BackendUpdate>>) -> (Self, Rc<RefCell<Vec<FrontendUpdate>>>) {
        let requests = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                requests: requests.clone(),
                responses: responses.into_iter().collect(),
            },
            requests,
        )
    }
}

#[async_trait(?Send)]
impl Transport for ScriptedTransport {
    async fn round_trip(&mut self, update: FrontendUpdate) -> Result<BackendUpdate> {
        self.requests.borrow_mut().push(update);
        self.responses
            .pop_front()
            .unwrap_or_else(|| Ok(BackendUpdate::default()))
    }
}

/// Transport whose replies are released manually through oneshot
/// channels, for exercising in-flight interleavings.
pub struct GatedTransport {
    requests: Rc<RefCell<Vec<FrontendUpdate>>>,
    gates: VecDeque<tokio::sync::oneshot::Receiver<BackendUpdate>>,
}

impl GatedTransport {
    pub fn new(gate_count: usize) -> (
        Self,
        Rc<RefCell<Vec<FrontendUpdate>>>,
        Vec<tokio::sync::oneshot::Sender<BackendUpdate>>,
    ) {
        let requests = Rc::new(RefCell::new(Vec::new()));
        let mut senders = Vec::new();
        let mut gates = VecDeque::new();
        for _ in 0..gate_count {
            let (tx, rx) = tokio::sync::oneshot::channel();
            senders.push(tx);
            gates.push_back(rx);
        }
        (
            Self {
                requests: requests.clone(),
                gates,
            },
            requests,
            senders,
        )
    }
}

#[async_trait(?Send)]
impl Transport for GatedTransport {
    async fn round_trip(&mut self, update: FrontendUpdate) -> Result<BackendUpdate> {
        self.requests.borrow_mut().push(update);
        match self.gates.pop_front() {
            Some(rx) => Ok(rx.await?),
            None => Ok(BackendUpdate::default()),
        }
    }
}

/// UI handle with countable focus calls and fixed geometry.
pub struct FakeHandle {
    pub focus_count: Cell<u32>,
    pub height: i32,
}

impl FakeHandle {
    pub fn new(height: i32) -> Rc<Self> {
        Rc::new(Self {
            focus_count: Cell::new(0),
            height,
        })
    }
}

impl UiHandle for FakeHandle {
    fn focus(&self) -> Result<()> {
        self.focus_count.set(self.focus_count.get() + 1);
        Ok(())
    }

    fn geometry(&self) -> RefPosition {
        RefPosition {
            offset_height: self.height,
            offset_width: 120,
            scroll_height: self.height,
            scroll_width: 120,
            scroll_top: 0,
            bounding_rect: BoundingRect {
                top: 0.0,
                left: 0.0,
                width: 120.0,
                height: self.height as f64,
            },
        }
    }
}

pub struct EngineFixture {
    pub engine: SyncEngine<ScriptedTransport>,
    pub requests: Rc<RefCell<Vec<FrontendUpdate>>>,
    pub time: Arc<TestTimeSource>,
}

/// Engine on a test clock with scripted responses. Persistent route,
/// 80x24 focused surface.
pub fn scripted_engine(responses: Vec<Result<BackendUpdate>>) -> EngineFixture {
    super::tracing::init_tracing_from_env();
    let time = TestTimeSource::shared();
    let (transport, requests) = ScriptedTransport::new(responses);
    let engine = SyncEngine::new("route-1", true, transport, time.clone());
    engine.set_render_context(true, 80, 24);
    EngineFixture {
        engine,
        requests,
        time,
    }
}
