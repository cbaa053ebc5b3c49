// Remote virtual-tree synchronization engine: a backend process drives
// a UI surface embedded in the terminal view by streaming tree edits,
// atom syncs, and ref commands; the frontend batches input events back
// under a debounced, single-flight request/response discipline.

pub mod atoms;
pub mod engine;
pub mod node;
pub mod protocol;
pub mod refs;
pub mod scheduler;
pub mod time;
pub mod tree;
pub mod version;

pub use engine::{SessionState, SyncEngine, Transport};
pub use node::{ElementNode, NodeIdx, PropValue, VNode, TEXT_TAG};
pub use protocol::{BackendUpdate, FrontendUpdate, KeyEventData, RefPosition, UiEvent};
pub use refs::UiHandle;
pub use time::{RealTimeSource, SharedTimeSource, TestTimeSource, TimeSource};
