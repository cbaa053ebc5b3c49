//! Wire types for the backend round-trip protocol.
//!
//! One outbound `FrontendUpdate` is answered by one inbound
//! `BackendUpdate`. Field names are camelCase on the wire; unknown edit
//! and ref operation kinds deserialize to an `Unknown` variant so a
//! newer backend never aborts an older frontend (they are skipped with
//! a diagnostic instead).

use crate::node::ElementNode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound request: everything the frontend has accumulated since the
/// previous cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendUpdate {
    /// Wall-clock milliseconds, for backend-side logging only.
    pub ts: i64,
    pub session_id: String,
    /// True only on the first cycle of a session.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub initialize: bool,
    /// True on session start or after an externally signaled desync.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resync: bool,
    /// True exactly once, on the terminal cycle of a session.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dispose: bool,
    pub render_context: RenderContext,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<UiEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ref_updates: Vec<RefUpdate>,
}

/// Viewport and focus state of the hosting surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderContext {
    pub focused: bool,
    pub width: u32,
    pub height: u32,
    /// Identity of the surface root, regenerated on session reset.
    pub root_ref_id: String,
}

/// One batched user-originated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEvent {
    /// Target node id, or `None` for surface-global events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Typed payload for keyboard events, the most common batched kind.
/// Serializes into the generic `UiEvent::data` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEventData {
    pub key: String,
    pub code: String,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub control: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub meta: bool,
}

/// Liveness/geometry report for one ref binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdate {
    pub ref_id: String,
    pub has_live_handle: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<RefPosition>,
}

/// Geometry of a live UI handle, reported every cycle for bindings with
/// position tracking enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefPosition {
    pub offset_height: i32,
    pub offset_width: i32,
    pub scroll_height: i32,
    pub scroll_width: i32,
    pub scroll_top: i32,
    pub bounding_rect: BoundingRect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Inbound response: edits, state syncs, and commands to apply locally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub render_updates: Vec<RenderUpdate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_sync: Vec<AtomSync>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ref_operations: Vec<RefOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<BackendMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<BackendOpts>,
}

/// One incremental edit against the mirrored tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderUpdate {
    pub kind: UpdateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<ElementNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Root,
    Append,
    Replace,
    Insert,
    Remove,
    #[serde(other)]
    Unknown,
}

/// Authoritative value for one shared atom.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomSync {
    pub atom_name: String,
    pub value: Value,
}

/// Backend command targeting a ref binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefOperation {
    pub ref_id: String,
    pub op: RefOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefOp {
    Focus,
    #[serde(other)]
    Unknown,
}

/// Backend-surfaced diagnostic, logged locally and never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendMessage {
    pub kind: MessageKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Error,
    Info,
    #[serde(other)]
    Unknown,
}

/// Backend-supplied runtime options that alter future local behavior.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendOpts {
    /// Whether a local interrupt gesture should dispose the session.
    #[serde(default)]
    pub close_on_interrupt: bool,
    /// Whether the surface should capture keyboard input globally.
    #[serde(default)]
    pub global_keyboard_capture: bool,
}
