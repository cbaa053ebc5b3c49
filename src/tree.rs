//! Mirror of the backend-authored tree, plus incremental edit
//! application.
//!
//! Nodes live in an arena of reusable slots; children are slot indices
//! and removal tombstones slots for reuse. Edits address nodes through
//! an id index that is rebuilt from the live tree once per batch, so an
//! id introduced by an edit becomes addressable on the next batch, not
//! within the current one (a `root` edit rebuilds the index mid-batch,
//! since it replaces the whole tree).
//!
//! A malformed edit is recorded as a diagnostic and skipped; it never
//! aborts the rest of its batch or corrupts sibling edits.

use crate::node::{ElementNode, NodeIdx, VNode};
use crate::protocol::{RenderUpdate, UpdateKind};
use crate::version::VersionTable;
use std::collections::HashMap;
use tracing::warn;

fn required_node(update: &RenderUpdate) -> Result<&ElementNode, String> {
    update
        .node
        .as_ref()
        .ok_or_else(|| format!("{:?} update without node", update.kind))
}

fn required_index(update: &RenderUpdate, len: usize, allow_end: bool) -> Result<usize, String> {
    let index = update
        .index
        .ok_or_else(|| format!("{:?} update without index", update.kind))?;
    let bound = if allow_end { len + 1 } else { len };
    if index >= bound {
        return Err(format!("index {index} out of range for {len} children"));
    }
    Ok(index)
}

#[derive(Debug, Default)]
pub struct VTree {
    slots: Vec<Option<VNode>>,
    free: Vec<NodeIdx>,
    root: Option<NodeIdx>,
    index: HashMap<String, NodeIdx>,
}

impl VTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an ordered batch of edits. Every successful structural
    /// change bumps exactly one version counter: the direct parent's.
    pub fn apply_batch(&mut self, updates: &[RenderUpdate], versions: &mut VersionTable) {
        if updates.is_empty() {
            return;
        }
        self.rebuild_index();
        for update in updates {
            if let Err(diag) = self.apply_update(update, versions) {
                warn!(kind = ?update.kind, "skipping render update: {diag}");
            }
        }
        // Refresh for local readers; addressing within the batch used
        // the index built above.
        self.rebuild_index();
    }

    fn apply_update(
        &mut self,
        update: &RenderUpdate,
        versions: &mut VersionTable,
    ) -> Result<(), String> {
        match update.kind {
            UpdateKind::Root => {
                let node = required_node(update)?;
                if let Some(old) = self.root.take() {
                    self.free_subtree(old);
                }
                let idx = self.alloc(node);
                self.root = Some(idx);
                self.rebuild_index();
                Ok(())
            }
            UpdateKind::Append => {
                let target = self.resolve(update.target_id.as_deref())?;
                let child = self.alloc(required_node(update)?);
                self.parent_mut(target)?.children.push(child);
                versions.bump(target);
                Ok(())
            }
            UpdateKind::Replace => {
                let target = self.resolve(update.target_id.as_deref())?;
                let index = required_index(update, self.child_count(target)?, false)?;
                let incoming = self.alloc(required_node(update)?);
                let old =
                    std::mem::replace(&mut self.parent_mut(target)?.children[index], incoming);
                self.free_subtree(old);
                versions.bump(target);
                Ok(())
            }
            UpdateKind::Insert => {
                let target = self.resolve(update.target_id.as_deref())?;
                let index = required_index(update, self.child_count(target)?, true)?;
                let incoming = self.alloc(required_node(update)?);
                self.parent_mut(target)?.children.insert(index, incoming);
                versions.bump(target);
                Ok(())
            }
            UpdateKind::Remove => {
                let target = self.resolve(update.target_id.as_deref())?;
                let index = required_index(update, self.child_count(target)?, false)?;
                let old = self.parent_mut(target)?.children.remove(index);
                self.free_subtree(old);
                versions.bump(target);
                Ok(())
            }
            UpdateKind::Unknown => Err("unrecognized update kind".to_string()),
        }
    }

    /// Look up a node id against the live tree, rejecting ids whose
    /// slot has since been vacated.
    pub fn lookup(&self, id: &str) -> Option<NodeIdx> {
        let idx = *self.index.get(id)?;
        self.get(idx).map(|_| idx)
    }

    pub fn get(&self, idx: NodeIdx) -> Option<&VNode> {
        self.slots.get(idx as usize)?.as_ref()
    }

    pub fn root(&self) -> Option<NodeIdx> {
        self.root
    }

    /// Number of live nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Reconstruct the wire form of the subtree rooted at `idx`.
    pub fn to_element(&self, idx: NodeIdx) -> Option<ElementNode> {
        let node = self.get(idx)?;
        let mut children = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            children.push(self.to_element(child)?);
        }
        Some(ElementNode {
            id: node.id.clone(),
            tag: node.tag.clone(),
            props: node.props.clone(),
            children,
            text: node.text.clone(),
        })
    }

    /// Reconstruct the whole tree in wire form.
    pub fn snapshot(&self) -> Option<ElementNode> {
        self.to_element(self.root?)
    }

    /// Drop the whole tree. Used on session reset.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.root = None;
    }

    fn resolve(&self, target_id: Option<&str>) -> Result<NodeIdx, String> {
        let id = target_id.ok_or_else(|| "update without targetId".to_string())?;
        let idx = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| format!("unknown target id {id:?}"))?;
        if self.get(idx).is_none() {
            return Err(format!("target id {id:?} refers to a removed node"));
        }
        Ok(idx)
    }

    fn parent_mut(&mut self, idx: NodeIdx) -> Result<&mut VNode, String> {
        self.slots
            .get_mut(idx as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| format!("slot {idx} vacated mid-batch"))
    }

    fn child_count(&self, idx: NodeIdx) -> Result<usize, String> {
        self.get(idx)
            .map(|node| node.children.len())
            .ok_or_else(|| format!("slot {idx} vacated mid-batch"))
    }

    /// Intern a wire node (and its subtree) into the arena.
    fn alloc(&mut self, wire: &ElementNode) -> NodeIdx {
        let children: Vec<NodeIdx> = wire.children.iter().map(|c| self.alloc(c)).collect();
        let node = VNode {
            id: wire.id.clone(),
            tag: wire.tag.clone(),
            props: wire.props.clone(),
            children,
            text: wire.text.clone(),
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                (self.slots.len() - 1) as NodeIdx
            }
        }
    }

    /// Tombstone a subtree, returning its slots to the free list.
    /// Version counters are left in place so reused slots stay
    /// monotonic.
    fn free_subtree(&mut self, idx: NodeIdx) {
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            let Some(slot) = self.slots.get_mut(i as usize) else {
                continue;
            };
            let Some(node) = slot.take() else {
                continue;
            };
            stack.extend(node.children);
            if let Some(id) = node.id {
                if self.index.get(&id) == Some(&i) {
                    self.index.remove(&id);
                }
            }
            self.free.push(i);
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        let Some(root) = self.root else {
            return;
        };
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let Some(node) = self.get(idx) else {
                continue;
            };
            stack.extend(node.children.iter().copied());
            if let Some(id) = node.id.clone() {
                if let Some(&existing) = self.index.get(&id) {
                    if existing != idx {
                        warn!("duplicate node id {id:?} in tree; keeping first occurrence");
                    }
                } else {
                    self.index.insert(id, idx);
                }
            }
        }
    }
}
