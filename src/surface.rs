//! Compositor surfaces and their sub-surface hierarchy.
//!
//! Every [`SurfaceId`] names one compositor-visible drawable region. Surfaces
//! form their own tree, separate from the view tree: a child surface is a
//! sub-surface positioned and stacked relative to its parent, and either
//! synchronized with the parent's commits or committing on its own.
//!
//! Attaching a buffer or adding damage only records pending state. Nothing
//! becomes visible until [`SurfaceTree::commit`], which the scheduler runs
//! from the surface's commit task. A commit of a synchronized sub-surface
//! commits its ancestors first.
//!
//! Buffers are held by value: a [`Buffer`] is a descriptor into a pool owned
//! elsewhere, and the pool is consulted at commit time to reject stale ones.

use std::collections::HashMap;

use crate::compositor::{
    BufferAttachment, Compositor, OutputId, StackPosition, SurfaceHandle, SyncMode,
};
use crate::error::{Error, Result};
use crate::geometry::{Insets, Point, Rect};
use crate::pool::{Buffer, BufferPool, PoolId};
use crate::task::{Queue, TaskId, TaskKind, TaskQueue};
use crate::tree::ViewId;

/// Generational handle to a surface in a [`SurfaceTree`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SurfaceId {
    index: u32,
    generation: u32,
}

/// Pending attach request: a buffer and its offset, or a detach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingAttach {
    Buffer { buffer: Buffer, x: i32, y: i32 },
    Detach,
}

struct SurfaceNode {
    handle: SurfaceHandle,
    owner: Option<ViewId>,
    parent: Option<SurfaceId>,
    /// Stacking order, bottom first.
    children: Vec<SurfaceId>,
    mode: SyncMode,
    margin: Insets,
    position: Point,
    /// Content the compositor currently has (as of the last commit).
    attached: Option<Buffer>,
    pending_attach: Option<PendingAttach>,
    /// Union of damage since the last commit, buffer coordinates.
    pending_damage: Option<Rect>,
    /// Pool this surface's buffers are carved from, if it manages one.
    pool: Option<PoolId>,
    outputs: Vec<OutputId>,
    commit_task: TaskId,
    last_commit_serial: Option<u64>,
    /// A sync child committed since our last commit; its cached state is
    /// applied by our next commit.
    child_committed: bool,
}

impl SurfaceNode {
    fn has_pending_state(&self) -> bool {
        self.pending_attach.is_some() || self.pending_damage.is_some() || self.child_committed
    }
}

struct Slot {
    generation: u32,
    node: Option<SurfaceNode>,
}

pub struct SurfaceTree {
    slots: Vec<Slot>,
    free_indices: Vec<u32>,
    by_handle: HashMap<SurfaceHandle, SurfaceId>,
    /// Identifies the flush pass in progress; a surface commits at most once per pass.
    serial: u64,
}

impl SurfaceTree {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            by_handle: HashMap::new(),
            serial: 0,
        }
    }

    /// Register a compositor surface. The caller creates `handle` with the
    /// role it needs; the new surface starts unparented and in sync mode.
    pub fn create(
        &mut self,
        tasks: &mut TaskQueue,
        handle: SurfaceHandle,
        owner: Option<ViewId>,
    ) -> SurfaceId {
        let (index, generation) = match self.free_indices.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                (index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: None,
                });
                (self.slots.len() as u32 - 1, 0)
            }
        };
        let id = SurfaceId { index, generation };
        let commit_task = tasks.allocate(TaskKind::Commit(id));

        self.slots[index as usize].node = Some(SurfaceNode {
            handle,
            owner,
            parent: None,
            children: Vec::new(),
            mode: SyncMode::Sync,
            margin: Insets::default(),
            position: Point::zero(),
            attached: None,
            pending_attach: None,
            pending_damage: None,
            pool: None,
            outputs: Vec::new(),
            commit_task,
            last_commit_serial: None,
            child_committed: false,
        });
        self.by_handle.insert(handle, id);
        log::debug!("Surface {:?} created for handle {}", id, handle.raw());
        id
    }

    fn get(&self, id: SurfaceId) -> Option<&SurfaceNode> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn get_mut(&mut self, id: SurfaceId) -> Option<&mut SurfaceNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    fn require(&self, id: SurfaceId) -> Result<&SurfaceNode> {
        self.get(id).ok_or(Error::UnknownSurface)
    }

    fn require_mut(&mut self, id: SurfaceId) -> Result<&mut SurfaceNode> {
        self.get_mut(id).ok_or(Error::UnknownSurface)
    }

    pub fn contains(&self, id: SurfaceId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    pub fn find_by_handle(&self, handle: SurfaceHandle) -> Option<SurfaceId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn handle(&self, id: SurfaceId) -> Option<SurfaceHandle> {
        self.get(id).map(|n| n.handle)
    }

    pub fn owner(&self, id: SurfaceId) -> Option<ViewId> {
        self.get(id).and_then(|n| n.owner)
    }

    pub fn parent(&self, id: SurfaceId) -> Option<SurfaceId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Children in stacking order, bottom first.
    pub fn children(&self, id: SurfaceId) -> Vec<SurfaceId> {
        self.get(id).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn sync_mode(&self, id: SurfaceId) -> Option<SyncMode> {
        self.get(id).map(|n| n.mode)
    }

    pub fn margin(&self, id: SurfaceId) -> Insets {
        self.get(id).map(|n| n.margin).unwrap_or_default()
    }

    pub fn set_margin(&mut self, id: SurfaceId, margin: Insets) {
        if let Some(node) = self.get_mut(id) {
            node.margin = margin;
        }
    }

    pub fn position(&self, id: SurfaceId) -> Option<Point> {
        self.get(id).map(|n| n.position)
    }

    /// The buffer the surface will show after its next commit.
    pub fn buffer(&self, id: SurfaceId) -> Option<Buffer> {
        let node = self.get(id)?;
        match node.pending_attach {
            Some(PendingAttach::Buffer { buffer, .. }) => Some(buffer),
            Some(PendingAttach::Detach) => None,
            None => node.attached,
        }
    }

    /// The buffer the compositor currently has.
    pub fn committed_buffer(&self, id: SurfaceId) -> Option<Buffer> {
        self.get(id).and_then(|n| n.attached)
    }

    pub fn pool(&self, id: SurfaceId) -> Option<PoolId> {
        self.get(id).and_then(|n| n.pool)
    }

    pub fn set_pool(&mut self, id: SurfaceId, pool: Option<PoolId>) {
        if let Some(node) = self.get_mut(id) {
            node.pool = pool;
        }
    }

    pub fn commit_task(&self, id: SurfaceId) -> Option<TaskId> {
        self.get(id).map(|n| n.commit_task)
    }

    pub fn outputs(&self, id: SurfaceId) -> &[OutputId] {
        self.get(id).map(|n| n.outputs.as_slice()).unwrap_or(&[])
    }

    /// Returns whether the output was newly entered.
    pub fn enter_output(&mut self, id: SurfaceId, output: OutputId) -> bool {
        match self.get_mut(id) {
            Some(node) if !node.outputs.contains(&output) => {
                node.outputs.push(output);
                true
            }
            _ => false,
        }
    }

    /// Returns whether the surface was on the output.
    pub fn leave_output(&mut self, id: SurfaceId, output: OutputId) -> bool {
        match self.get_mut(id) {
            Some(node) => {
                let before = node.outputs.len();
                node.outputs.retain(|&o| o != output);
                node.outputs.len() != before
            }
            None => false,
        }
    }

    /// `id` and every surface below it, parents first.
    pub fn subtree(&self, id: SurfaceId) -> Vec<SurfaceId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(s) = stack.pop() {
            let Some(node) = self.get(s) else {
                continue;
            };
            out.push(s);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    fn is_ancestor(&self, ancestor: SurfaceId, mut of: SurfaceId) -> bool {
        while let Some(parent) = self.parent(of) {
            if parent == ancestor {
                return true;
            }
            of = parent;
        }
        false
    }

    /// Insert `child` into `parent`'s stacking order.
    ///
    /// Re-adding an existing child restacks it. Fails if `child` is `parent`,
    /// belongs to a different parent, or is an ancestor of `parent`.
    pub fn add_child(
        &mut self,
        compositor: &mut dyn Compositor,
        parent: SurfaceId,
        child: SurfaceId,
        position: StackPosition<SurfaceId>,
    ) -> Result<()> {
        if parent == child {
            return Err(Error::InvalidHierarchy("a surface cannot be its own child"));
        }
        let parent_handle = self.require(parent)?.handle;
        let child_node = self.require(child)?;
        let child_handle = child_node.handle;
        let restack = match child_node.parent {
            Some(p) if p != parent => {
                return Err(Error::InvalidHierarchy(
                    "surface already belongs to another parent",
                ))
            }
            Some(_) => true,
            None => false,
        };
        if self.is_ancestor(child, parent) {
            return Err(Error::InvalidHierarchy(
                "surface cannot be parented to its own descendant",
            ));
        }

        let anchor = match position {
            StackPosition::Above(s) | StackPosition::Below(s) => {
                if s == child || self.parent(s) != Some(parent) {
                    return Err(Error::InvalidHierarchy(
                        "stacking sibling is not a child of the parent",
                    ));
                }
                Some(s)
            }
            StackPosition::Top | StackPosition::Bottom => None,
        };

        let siblings = &mut self.require_mut(parent)?.children;
        siblings.retain(|&c| c != child);
        let (index, place) = match position {
            StackPosition::Top => (siblings.len(), siblings.last().map(|&s| (s, true))),
            StackPosition::Bottom => (0, siblings.first().map(|&s| (s, false))),
            StackPosition::Above(s) => {
                let at = siblings.iter().position(|&c| c == s).map_or(siblings.len(), |i| i + 1);
                (at, anchor.map(|a| (a, true)))
            }
            StackPosition::Below(s) => {
                let at = siblings.iter().position(|&c| c == s).unwrap_or(0);
                (at, anchor.map(|a| (a, false)))
            }
        };
        siblings.insert(index, child);

        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }

        // A fresh sub-surface already sits on top of its siblings.
        let fresh_on_top = !restack && position == StackPosition::Top;
        if !fresh_on_top {
            let (sibling, above) = match place {
                Some((s, above)) => (self.handle(s).unwrap_or(parent_handle), above),
                None => (parent_handle, true),
            };
            compositor.place(child_handle, sibling, above);
        }
        Ok(())
    }

    /// Detach `child` from `parent`. Returns `None` if it was not a child.
    pub fn remove_child(&mut self, parent: SurfaceId, child: SurfaceId) -> Option<SurfaceId> {
        if self.parent(child) != Some(parent) {
            return None;
        }
        let siblings = &mut self.get_mut(parent)?.children;
        siblings.retain(|&c| c != child);
        self.get_mut(child)?.parent = None;
        Some(child)
    }

    /// Record new content; `None` detaches. Takes effect at the next commit.
    pub fn attach_buffer(&mut self, id: SurfaceId, buffer: Option<Buffer>, x: i32, y: i32) {
        let Some(node) = self.get_mut(id) else {
            debug_assert!(false, "attach on destroyed surface {id:?}");
            return;
        };
        node.pending_attach = Some(match buffer {
            Some(buffer) => PendingAttach::Buffer { buffer, x, y },
            None => PendingAttach::Detach,
        });
    }

    /// Accumulate damage (buffer coordinates) for the next commit.
    pub fn damage(&mut self, id: SurfaceId, region: Rect) {
        if region.is_empty() {
            return;
        }
        if let Some(node) = self.get_mut(id) {
            node.pending_damage = Some(match node.pending_damage {
                Some(existing) => existing.union(&region),
                None => region,
            });
        }
    }

    pub fn set_sync_mode(&mut self, compositor: &mut dyn Compositor, id: SurfaceId, mode: SyncMode) {
        let Some(node) = self.get_mut(id) else {
            return;
        };
        if node.mode == mode {
            return;
        }
        node.mode = mode;
        if node.parent.is_some() {
            compositor.set_sync_mode(node.handle, mode);
        }
    }

    /// Move a sub-surface relative to its parent surface.
    pub fn set_position(&mut self, compositor: &mut dyn Compositor, id: SurfaceId, position: Point) {
        let Some(node) = self.get_mut(id) else {
            return;
        };
        if node.position == position {
            return;
        }
        node.position = position;
        if node.parent.is_some() {
            compositor.set_position(node.handle, position.x, position.y);
        }
    }

    /// Queue the surface's commit task. Repeated requests before the next
    /// flush collapse into the one queued task.
    pub fn request_commit(&self, tasks: &mut TaskQueue, id: SurfaceId) {
        let Some(node) = self.get(id) else {
            debug_assert!(false, "commit requested on destroyed surface {id:?}");
            return;
        };
        if !tasks.is_linked(node.commit_task) {
            tasks.push_back(Queue::Commit, node.commit_task);
        }
    }

    /// Start a new flush pass for commit deduplication.
    pub fn begin_pass(&mut self) {
        self.serial += 1;
    }

    /// Commit `id` now.
    ///
    /// A synchronized sub-surface commits its parent first, recursively, so
    /// an ancestor's commit always precedes its descendant's in one call
    /// chain. The compositor caches a sync child's state until the parent's
    /// next commit, so the parent's commit task is queued again afterwards.
    ///
    /// Within one flush pass an ancestor reached through such a chain
    /// commits at most once; the surface's own queued commit task is
    /// cancelled once it has been committed through this path.
    pub fn commit(
        &mut self,
        compositor: &mut dyn Compositor,
        pools: &HashMap<PoolId, BufferPool>,
        tasks: &mut TaskQueue,
        id: SurfaceId,
    ) -> Result<()> {
        self.commit_chain(compositor, pools, tasks, id, false)
    }

    fn commit_chain(
        &mut self,
        compositor: &mut dyn Compositor,
        pools: &HashMap<PoolId, BufferPool>,
        tasks: &mut TaskQueue,
        id: SurfaceId,
        as_parent: bool,
    ) -> Result<()> {
        let Some(node) = self.get(id) else {
            debug_assert!(false, "commit on destroyed surface {id:?}");
            return Err(Error::UnknownSurface);
        };

        let committed_this_pass = node.last_commit_serial == Some(self.serial);
        if committed_this_pass && (as_parent || !node.has_pending_state()) {
            if !as_parent {
                tasks.unlink(node.commit_task);
            }
            log::trace!("Surface {:?} already committed in this pass", id);
            return Ok(());
        }
        tasks.unlink(node.commit_task);

        let sync_parent = match (node.mode, node.parent) {
            (SyncMode::Sync, Some(parent)) => Some(parent),
            _ => None,
        };
        if let Some(parent) = sync_parent {
            self.commit_chain(compositor, pools, tasks, parent, true)?;
        }
        self.commit_local(compositor, pools, id)?;

        if let Some(parent) = sync_parent {
            if let Some(node) = self.get_mut(parent) {
                node.child_committed = true;
            }
            self.request_commit(tasks, parent);
        }
        Ok(())
    }

    fn commit_local(
        &mut self,
        compositor: &mut dyn Compositor,
        pools: &HashMap<PoolId, BufferPool>,
        id: SurfaceId,
    ) -> Result<()> {
        let serial = self.serial;
        let node = self.require_mut(id)?;
        let handle = node.handle;

        match node.pending_attach.take() {
            Some(PendingAttach::Buffer { buffer, x, y }) => {
                let pool = pools
                    .get(&buffer.pool())
                    .filter(|p| p.is_current(&buffer))
                    .ok_or(Error::StaleBuffer)?;
                compositor.attach_buffer(handle, Some(BufferAttachment { pool, buffer }), x, y);
                node.attached = Some(buffer);
                if node.pending_damage.is_none() {
                    node.pending_damage = Some(Rect::from_size(buffer.size()));
                }
            }
            Some(PendingAttach::Detach) => {
                compositor.attach_buffer(handle, None, 0, 0);
                node.attached = None;
                node.pending_damage = None;
            }
            None => {
                if let Some(buffer) = node.attached {
                    let current = pools.get(&buffer.pool()).is_some_and(|p| p.is_current(&buffer));
                    if !current {
                        return Err(Error::StaleBuffer);
                    }
                }
            }
        }

        if let Some(region) = node.pending_damage.take() {
            compositor.damage_region(handle, region);
        }
        compositor.commit(handle);
        node.last_commit_serial = Some(serial);
        node.child_committed = false;
        log::trace!("Committed surface {:?} (handle {})", id, handle.raw());
        Ok(())
    }

    /// Destroy `id` and every surface below it, children first.
    ///
    /// Returns the destroyed surfaces so the caller can drop what it keeps
    /// for them (pools, view links).
    pub fn destroy(
        &mut self,
        compositor: &mut dyn Compositor,
        tasks: &mut TaskQueue,
        id: SurfaceId,
    ) -> Vec<SurfaceId> {
        let mut destroyed = Vec::new();
        if let Some(parent) = self.parent(id) {
            self.remove_child(parent, id);
        }
        self.destroy_recursive(compositor, tasks, id, &mut destroyed);
        destroyed
    }

    fn destroy_recursive(
        &mut self,
        compositor: &mut dyn Compositor,
        tasks: &mut TaskQueue,
        id: SurfaceId,
        destroyed: &mut Vec<SurfaceId>,
    ) {
        let Some(node) = self.get(id) else {
            return;
        };
        // Topmost first, so the compositor never sees a child outlive its parent.
        for child in node.children.clone().into_iter().rev() {
            self.destroy_recursive(compositor, tasks, child, destroyed);
        }

        let slot = &mut self.slots[id.index as usize];
        let Some(node) = slot.node.take() else {
            return;
        };
        tasks.release(node.commit_task);
        self.by_handle.remove(&node.handle);
        self.free_indices.push(id.index);
        compositor.destroy_surface(node.handle);
        log::debug!("Surface {:?} destroyed", id);
        destroyed.push(id);
    }
}

impl Default for SurfaceTree {
    fn default() -> Self {
        Self::new()
    }
}
