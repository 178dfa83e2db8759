//! Arena-based view storage.
//!
//! The tree stores every view with its structural metadata in a slab of
//! generational slots, so a [`ViewId`] held after its view was destroyed is
//! detected instead of aliasing a new view.
//!
//! ## Structure
//!
//! Children are kept as an intrusive doubly-linked sibling list: each node has
//! `prev`/`next` sibling links plus `first_child`/`last_child` on the parent.
//! All links are ids, never ownership; the arena owns every node.
//!
//! ## Surfaces
//!
//! A view may own at most one surface. Its *effective* surface is its own,
//! or else the nearest ancestor's, found by walking parent links.
//!
//! ## Hooks
//!
//! The [`View`] implementation is taken out of its slot while a hook runs
//! (see [`ViewTree::with_view_mut`]), so the tree stays usable during the call.

use crate::error::{Error, Result};
use crate::geometry::{Point, Rect, Size};
use crate::surface::SurfaceId;
use crate::task::{TaskId, TaskKind, TaskQueue};
use crate::widgets::View;

/// Unique identifier for a view in the tree.
///
/// `index` is the slot, `generation` counts how often the slot was reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ViewId {
    index: u32,
    generation: u32,
}

impl ViewId {
    #[cfg(test)]
    pub(crate) fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Combine generation (high bits) and index (low bits), for logging.
    pub fn as_u64(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }
}

struct ViewNode {
    /// `None` only while a hook is running.
    view: Option<Box<dyn View>>,
    parent: Option<ViewId>,
    first_child: Option<ViewId>,
    last_child: Option<ViewId>,
    prev_sibling: Option<ViewId>,
    next_sibling: Option<ViewId>,
    child_count: usize,
    /// Parent-relative for child views; surface-relative for surface owners.
    geometry: Rect,
    visible: bool,
    surface: Option<SurfaceId>,
    redraw_task: TaskId,
    layout_task: TaskId,
}

struct Slot {
    generation: u32,
    node: Option<ViewNode>,
}

/// What is left of a view once it is taken out of the tree.
pub struct RemovedView {
    pub view: Option<Box<dyn View>>,
    pub surface: Option<SurfaceId>,
}

pub struct ViewTree {
    slots: Vec<Slot>,
    free_indices: Vec<u32>,
    len: usize,
}

impl ViewTree {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            len: 0,
        }
    }

    /// Store a view and allocate its layout and redraw tasks.
    pub fn insert(&mut self, tasks: &mut TaskQueue, view: Box<dyn View>) -> ViewId {
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
        let id = ViewId { index, generation };
        let redraw_task = tasks.allocate(TaskKind::Redraw(id));
        let layout_task = tasks.allocate(TaskKind::Layout(id));

        self.slots[index as usize].node = Some(ViewNode {
            view: Some(view),
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            child_count: 0,
            geometry: Rect::default(),
            visible: true,
            surface: None,
            redraw_task,
            layout_task,
        });
        self.len += 1;
        id
    }

    /// Remove a single view: detach it from its parent, orphan its children
    /// and release its tasks. The owned surface id is handed back for the
    /// caller to destroy.
    pub fn remove(&mut self, tasks: &mut TaskQueue, id: ViewId) -> Option<RemovedView> {
        self.get(id)?;
        self.detach(id);

        let mut child = self.first_child(id);
        while let Some(c) = child {
            child = self.next_sibling(c);
            if let Some(node) = self.get_mut(c) {
                node.parent = None;
                node.prev_sibling = None;
                node.next_sibling = None;
            }
        }

        let node = self.slots[id.index as usize].node.take()?;
        self.free_indices.push(id.index);
        self.len -= 1;
        tasks.release(node.redraw_task);
        tasks.release(node.layout_task);
        Some(RemovedView {
            view: node.view,
            surface: node.surface,
        })
    }

    fn get(&self, id: ViewId) -> Option<&ViewNode> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn get_mut(&mut self, id: ViewId) -> Option<&mut ViewNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Access a view via a closure.
    pub fn with_view<R>(&self, id: ViewId, f: impl FnOnce(&dyn View) -> R) -> Option<R> {
        self.get(id)
            .and_then(|n| n.view.as_deref())
            .map(f)
    }

    /// Mutate a view via a closure.
    ///
    /// The view is taken out of its slot for the duration of the call and put
    /// back afterwards, unless the slot was freed meanwhile. Returns `None`
    /// for unknown ids and for views whose hook is already running.
    pub fn with_view_mut<R>(
        &mut self,
        id: ViewId,
        f: impl FnOnce(&mut dyn View, &mut ViewTree) -> R,
    ) -> Option<R> {
        let mut view = self.get_mut(id)?.view.take()?;
        let result = f(&mut *view, self);
        if let Some(node) = self.get_mut(id) {
            node.view = Some(view);
        }
        Some(result)
    }

    pub fn parent(&self, id: ViewId) -> Option<ViewId> {
        self.get(id).and_then(|n| n.parent)
    }

    pub fn first_child(&self, id: ViewId) -> Option<ViewId> {
        self.get(id).and_then(|n| n.first_child)
    }

    pub fn last_child(&self, id: ViewId) -> Option<ViewId> {
        self.get(id).and_then(|n| n.last_child)
    }

    pub fn next_sibling(&self, id: ViewId) -> Option<ViewId> {
        self.get(id).and_then(|n| n.next_sibling)
    }

    pub fn prev_sibling(&self, id: ViewId) -> Option<ViewId> {
        self.get(id).and_then(|n| n.prev_sibling)
    }

    pub fn child_count(&self, id: ViewId) -> usize {
        self.get(id).map(|n| n.child_count).unwrap_or(0)
    }

    /// Children front to back (first child first).
    pub fn children(&self, id: ViewId) -> Vec<ViewId> {
        let mut out = Vec::with_capacity(self.child_count(id));
        let mut cursor = self.first_child(id);
        while let Some(c) = cursor {
            out.push(c);
            cursor = self.next_sibling(c);
        }
        out
    }

    /// `ancestor` is `of` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: ViewId, of: ViewId) -> bool {
        let mut cursor = Some(of);
        while let Some(v) = cursor {
            if v == ancestor {
                return true;
            }
            cursor = self.parent(v);
        }
        false
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: ViewId, child: ViewId) -> Result<()> {
        self.insert_child(parent, child, None)
    }

    /// Insert `child` under `parent`, before `before` or at the end.
    pub fn insert_child(
        &mut self,
        parent: ViewId,
        child: ViewId,
        before: Option<ViewId>,
    ) -> Result<()> {
        if !self.contains(parent) || !self.contains(child) {
            return Err(Error::UnknownView);
        }
        if self.parent(child).is_some() {
            return Err(Error::InvalidHierarchy("view already has a parent"));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(Error::InvalidHierarchy(
                "view cannot be added under itself or a descendant",
            ));
        }
        if let Some(b) = before {
            if self.parent(b) != Some(parent) {
                return Err(Error::InvalidHierarchy("insertion anchor is not a child of the parent"));
            }
        }

        let prev = match before {
            Some(b) => self.prev_sibling(b),
            None => self.last_child(parent),
        };

        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
            node.prev_sibling = prev;
            node.next_sibling = before;
        }
        match prev {
            Some(p) => {
                if let Some(n) = self.get_mut(p) {
                    n.next_sibling = Some(child);
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.first_child = Some(child);
                }
            }
        }
        match before {
            Some(b) => {
                if let Some(n) = self.get_mut(b) {
                    n.prev_sibling = Some(child);
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.last_child = Some(child);
                }
            }
        }
        if let Some(n) = self.get_mut(parent) {
            n.child_count += 1;
        }
        Ok(())
    }

    /// Unlink `id` from its parent's child list. No-op for root views.
    pub fn detach(&mut self, id: ViewId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let Some(parent) = node.parent else {
            return;
        };
        let (prev, next) = (node.prev_sibling, node.next_sibling);

        match prev {
            Some(p) => {
                if let Some(n) = self.get_mut(p) {
                    n.next_sibling = next;
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.first_child = next;
                }
            }
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.get_mut(nx) {
                    n.prev_sibling = prev;
                }
            }
            None => {
                if let Some(n) = self.get_mut(parent) {
                    n.last_child = prev;
                }
            }
        }
        if let Some(n) = self.get_mut(parent) {
            n.child_count -= 1;
        }
        if let Some(n) = self.get_mut(id) {
            n.parent = None;
            n.prev_sibling = None;
            n.next_sibling = None;
        }
    }

    /// `id` and all of its descendants, parents before children.
    pub fn subtree(&self, id: ViewId) -> Vec<ViewId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(v) = stack.pop() {
            out.push(v);
            let mut cursor = self.last_child(v);
            while let Some(c) = cursor {
                stack.push(c);
                cursor = self.prev_sibling(c);
            }
        }
        out
    }

    pub fn geometry(&self, id: ViewId) -> Option<Rect> {
        self.get(id).map(|n| n.geometry)
    }

    pub fn set_geometry(&mut self, id: ViewId, geometry: Rect) {
        if let Some(node) = self.get_mut(id) {
            node.geometry = geometry;
        }
    }

    pub fn size(&self, id: ViewId) -> Option<Size> {
        self.geometry(id).map(|g| g.size())
    }

    pub fn is_visible(&self, id: ViewId) -> bool {
        self.get(id).is_some_and(|n| n.visible)
    }

    /// Visible itself and through all ancestors.
    pub fn is_shown(&self, id: ViewId) -> bool {
        let mut cursor = Some(id);
        while let Some(v) = cursor {
            if !self.is_visible(v) {
                return false;
            }
            cursor = self.parent(v);
        }
        true
    }

    pub fn set_visible(&mut self, id: ViewId, visible: bool) {
        if let Some(node) = self.get_mut(id) {
            node.visible = visible;
        }
    }

    /// The surface this view owns, if any.
    pub fn own_surface(&self, id: ViewId) -> Option<SurfaceId> {
        self.get(id).and_then(|n| n.surface)
    }

    pub fn set_own_surface(&mut self, id: ViewId, surface: Option<SurfaceId>) {
        if let Some(node) = self.get_mut(id) {
            node.surface = surface;
        }
    }

    /// The nearest view at or above `id` that owns a surface.
    pub fn surface_owner(&self, id: ViewId) -> Option<ViewId> {
        let mut cursor = Some(id);
        while let Some(v) = cursor {
            let node = self.get(v)?;
            if node.surface.is_some() {
                return Some(v);
            }
            cursor = node.parent;
        }
        None
    }

    /// The surface this view draws into: its own, else the nearest ancestor's.
    pub fn effective_surface(&self, id: ViewId) -> Option<SurfaceId> {
        self.surface_owner(id).and_then(|owner| self.own_surface(owner))
    }

    /// Offset of the view's origin relative to the origin of the view owning
    /// its effective surface. Zero for the owner itself.
    pub fn offset_in_surface(&self, id: ViewId) -> Option<Point> {
        let owner = self.surface_owner(id)?;
        let mut offset = Point::zero();
        let mut cursor = id;
        while cursor != owner {
            let node = self.get(cursor)?;
            offset = offset.offset(node.geometry.x, node.geometry.y);
            cursor = node.parent?;
        }
        Some(offset)
    }

    pub fn redraw_task(&self, id: ViewId) -> Option<TaskId> {
        self.get(id).map(|n| n.redraw_task)
    }

    pub fn layout_task(&self, id: ViewId) -> Option<TaskId> {
        self.get(id).map(|n| n.layout_task)
    }
}

impl Default for ViewTree {
    fn default() -> Self {
        Self::new()
    }
}
