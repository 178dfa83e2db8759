//! Scheduler state for one compositor connection.
//!
//! [`Display`] owns everything the redraw pipeline touches: the view tree,
//! the surface tree, the shm pools backing surface buffers, the task queue
//! and the compositor service. Mutations only *request* work; the event loop
//! calls [`Display::flush_once`] once per iteration to run it.
//!
//! A flush has two phases. First the layout and redraw tasks that were
//! pending when the flush started run in queue order; tasks requested while
//! they run wait for the next flush. Then the commit tasks run, including
//! the ones the redraws just queued, until no commit is pending.

use std::collections::HashMap;

use crate::canvas::{CanvasService, DrawContext, PixelTarget, SoftwareCanvasService};
use crate::compositor::{
    Compositor, OutputId, StackPosition, SurfaceHandle, SyncMode, ToplevelConfig,
};
use crate::error::{Error, Result};
use crate::geometry::{Insets, Point, Rect, Size};
use crate::pool::{Buffer, BufferPool, PixelFormat, PoolId};
use crate::surface::{SurfaceId, SurfaceTree};
use crate::task::{Queue, TaskId, TaskKind, TaskQueue};
use crate::tree::{ViewId, ViewTree};
use crate::widgets::{
    ChangeFlags, ChildInfo, EventResponse, KeyEvent, LayoutContext, MouseEvent, View,
};

/// Work done by one [`Display::flush_once`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// Layout hooks run, including nested layouts run inline.
    pub layouts: usize,
    /// Redraw tasks that painted.
    pub redraws: usize,
    /// Commit tasks run.
    pub commits: usize,
    /// Tasks whose action failed. Failures are logged and do not stop the flush.
    pub failures: usize,
}

impl FlushStats {
    pub fn is_empty(&self) -> bool {
        *self == FlushStats::default()
    }
}

pub struct Display<C: Compositor> {
    compositor: C,
    canvas: Box<dyn CanvasService>,
    views: ViewTree,
    surfaces: SurfaceTree,
    pools: HashMap<PoolId, BufferPool>,
    tasks: TaskQueue,
    format: PixelFormat,
    hovered: Option<ViewId>,
    focused: Option<ViewId>,
    /// Redraws put off until the compositor releases a buffer.
    deferred: Vec<ViewId>,
}

impl<C: Compositor> Display<C> {
    pub fn new(compositor: C) -> Self {
        Self::with_canvas(compositor, Box::new(SoftwareCanvasService))
    }

    pub fn with_canvas(compositor: C, canvas: Box<dyn CanvasService>) -> Self {
        Self {
            compositor,
            canvas,
            views: ViewTree::new(),
            surfaces: SurfaceTree::new(),
            pools: HashMap::new(),
            tasks: TaskQueue::new(),
            format: PixelFormat::default(),
            hovered: None,
            focused: None,
            deferred: Vec::new(),
        }
    }

    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut C {
        &mut self.compositor
    }

    pub fn views(&self) -> &ViewTree {
        &self.views
    }

    pub fn surfaces(&self) -> &SurfaceTree {
        &self.surfaces
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub fn pool(&self, id: PoolId) -> Option<&BufferPool> {
        self.pools.get(&id)
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Format of buffers carved from now on.
    pub fn set_pixel_format(&mut self, format: PixelFormat) {
        self.format = format;
    }

    /// Whether a flush would do anything.
    pub fn has_pending_work(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn hovered(&self) -> Option<ViewId> {
        self.hovered
    }

    pub fn focused(&self) -> Option<ViewId> {
        self.focused
    }

    // ------------------------------------------------------------------
    // View tree
    // ------------------------------------------------------------------

    /// Store a new, detached view sized to its minimal size.
    pub fn create_view(&mut self, view: impl View + 'static) -> ViewId {
        let size = view.minimal_size();
        let id = self.views.insert(&mut self.tasks, Box::new(view));
        self.views.set_geometry(id, Rect::from_size(size));
        log::trace!("View {} created", id.as_u64());
        id
    }

    /// Append `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: ViewId, child: ViewId) -> Result<()> {
        self.insert_child(parent, child, None)
    }

    /// Insert `child` under `parent`, before `before` or last.
    ///
    /// A view that owns a sub-surface can only come back under a view drawing
    /// into that sub-surface's parent.
    pub fn insert_child(
        &mut self,
        parent: ViewId,
        child: ViewId,
        before: Option<ViewId>,
    ) -> Result<()> {
        self.check_surface_parents(parent, child)?;
        self.views.insert_child(parent, child, before)?;

        self.sync_surface_positions(child);
        self.show_subtree_surfaces(child);
        self.request_layout(parent);
        self.redraw_subtree(child);
        Ok(())
    }

    /// Every surface owned inside `child`'s subtree must already be a
    /// sub-surface of the surface it would composite into under `parent`.
    fn check_surface_parents(&self, parent: ViewId, child: ViewId) -> Result<()> {
        for view in self.views.subtree(child) {
            let Some(surface) = self.views.own_surface(view) else {
                continue;
            };
            let mut expected = None;
            let mut cursor = if view == child { None } else { self.views.parent(view) };
            while let Some(above) = cursor {
                if let Some(owned) = self.views.own_surface(above) {
                    expected = Some(owned);
                    break;
                }
                cursor = if above == child { None } else { self.views.parent(above) };
            }
            let expected = expected.or_else(|| self.views.effective_surface(parent));
            let actual = self.surfaces.parent(surface);
            if actual.is_none() || actual != expected {
                return Err(Error::InvalidHierarchy(
                    "view owns a surface that cannot be moved under this parent",
                ));
            }
        }
        Ok(())
    }

    /// Detach `child` from `parent`, keeping it alive. Returns `None` if it
    /// was not a child of `parent`.
    pub fn remove_child(&mut self, parent: ViewId, child: ViewId) -> Option<ViewId> {
        if self.views.parent(child) != Some(parent) {
            return None;
        }
        self.hide_subtree_surfaces(child);
        self.cancel_subtree_redraws(child);
        self.forget_input_targets(child);
        self.views.detach(child);

        self.request_layout(parent);
        self.request_redraw(parent);
        Some(child)
    }

    /// Destroy `id` and its whole subtree, children first.
    ///
    /// Pending tasks of the destroyed views and surfaces are cancelled, so
    /// the next flush never runs their hooks.
    pub fn destroy_view(&mut self, id: ViewId) -> Result<()> {
        if !self.views.contains(id) {
            return Err(Error::UnknownView);
        }
        let parent = self.views.parent(id);
        let subtree = self.views.subtree(id);
        self.forget_input_targets(id);
        self.views.detach(id);

        for &view in subtree.iter().rev() {
            if let Some(surface) = self.views.own_surface(view) {
                self.destroy_surface(surface);
            }
            self.views.remove(&mut self.tasks, view);
        }
        log::debug!("Destroyed view {} ({} views)", id.as_u64(), subtree.len());

        if let Some(parent) = parent {
            self.request_layout(parent);
            self.request_redraw(parent);
        }
        Ok(())
    }

    /// Resize a view. The size is clamped to the view's declared bounds.
    pub fn resize_view(&mut self, id: ViewId, width: u32, height: u32) -> Result<()> {
        let geometry = self.views.geometry(id).ok_or(Error::UnknownView)?;
        self.apply_geometry(id, Rect::new(geometry.x, geometry.y, width, height))
            .map(|_| ())
    }

    /// Move a view within its parent.
    pub fn move_view(&mut self, id: ViewId, x: i32, y: i32) -> Result<()> {
        let geometry = self.views.geometry(id).ok_or(Error::UnknownView)?;
        self.apply_geometry(id, Rect::new(x, y, geometry.width, geometry.height))
            .map(|_| ())
    }

    /// Show or hide a view. Hidden views are not drawn, hit or laid out, and
    /// surfaces they own lose their content at the next commit.
    pub fn set_visible(&mut self, id: ViewId, visible: bool) -> Result<()> {
        if !self.views.contains(id) {
            return Err(Error::UnknownView);
        }
        if self.views.is_visible(id) == visible {
            return Ok(());
        }
        self.views.set_visible(id, visible);

        if visible {
            self.show_subtree_surfaces(id);
            self.redraw_subtree(id);
        } else {
            self.hide_subtree_surfaces(id);
            self.cancel_subtree_redraws(id);
            self.forget_input_targets(id);
        }
        if let Some(parent) = self.views.parent(id) {
            self.request_layout(parent);
            if self.views.own_surface(id).is_none() {
                self.request_redraw(parent);
            }
        }
        Ok(())
    }

    /// Set the geometry, clamped; run `on_resize` and follow up on what it
    /// reports. Returns whether anything changed.
    ///
    /// Nothing is repainted here unless the hook asks for it; a layout that
    /// moves its children repaints itself in `run_layout`.
    fn apply_geometry(&mut self, id: ViewId, rect: Rect) -> Result<bool> {
        let old = self.views.geometry(id).ok_or(Error::UnknownView)?;
        let (min, max) = self
            .views
            .with_view(id, |v| (v.minimal_size(), v.maximal_size()))
            .unwrap_or((Size::zero(), Size::max()));
        let size = rect.size().clamp(min, max);
        let new = Rect::new(rect.x, rect.y, size.width, size.height);
        if new == old {
            return Ok(false);
        }
        self.views.set_geometry(id, new);

        if new.origin() != old.origin() {
            self.sync_surface_positions(id);
        }
        if new.size() != old.size() {
            log::trace!(
                "View {} resized {}x{} -> {}x{}",
                id.as_u64(),
                old.width,
                old.height,
                new.width,
                new.height
            );
            let flags = self
                .views
                .with_view_mut(id, |v, _| v.on_resize(old.size(), size))
                .unwrap_or_default();
            self.apply_changes(id, flags);

            if let Some(surface) = self.views.own_surface(id) {
                self.reconfigure_surface(surface);
                self.redraw_subtree(id);
            }
        }
        Ok(true)
    }

    fn apply_changes(&mut self, id: ViewId, flags: ChangeFlags) {
        if flags.contains(ChangeFlags::NEEDS_LAYOUT) {
            self.request_layout(id);
        }
        if flags.contains(ChangeFlags::NEEDS_PAINT) {
            self.request_redraw(id);
        }
    }

    /// The view's root owns a top-level surface.
    fn is_presented(&self, id: ViewId) -> bool {
        let mut root = id;
        while let Some(parent) = self.views.parent(root) {
            root = parent;
        }
        self.views
            .own_surface(root)
            .is_some_and(|s| self.surfaces.parent(s).is_none())
    }

    fn has_content(&self, id: ViewId) -> bool {
        self.views.with_view(id, |v| v.has_content()).unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    fn queued_redraw(&self, id: ViewId) -> Option<TaskId> {
        self.views
            .redraw_task(id)
            .filter(|&t| self.tasks.is_queued(t))
    }

    /// Queue a redraw of `id`.
    ///
    /// A no-op for views that are hidden or not part of a presented window,
    /// and for views whose redraw is already queued. The task goes before
    /// the next sibling's queued redraw, else after the previous sibling's,
    /// else after the parent's, else at the tail of the idle list.
    pub fn request_redraw(&mut self, id: ViewId) {
        let Some(task) = self.views.redraw_task(id) else {
            debug_assert!(false, "redraw requested for destroyed view {id:?}");
            return;
        };
        if self.tasks.is_linked(task) {
            return;
        }
        if !self.views.is_shown(id) || !self.is_presented(id) {
            log::trace!("View {} has no surface to draw into", id.as_u64());
            return;
        }

        let next = self.views.next_sibling(id).and_then(|s| self.queued_redraw(s));
        let prev = self.views.prev_sibling(id).and_then(|s| self.queued_redraw(s));
        let parent = self.views.parent(id).and_then(|p| self.queued_redraw(p));

        let placed = match (next, prev, parent) {
            (Some(next), _, _) => self.tasks.insert_before(task, next),
            (None, Some(prev), _) => self.tasks.insert_after(task, prev),
            (None, None, Some(parent)) => self.tasks.insert_after(task, parent),
            (None, None, None) => false,
        };
        if !placed {
            self.tasks.push_back(Queue::Idle, task);
        }
        log::trace!("Redraw queued for view {}", id.as_u64());
    }

    /// The compositor released a buffer; queue again the redraws that
    /// were waiting on one.
    pub fn resume_deferred_redraws(&mut self) {
        for id in std::mem::take(&mut self.deferred) {
            if self.views.contains(id) {
                self.request_redraw(id);
            }
        }
    }

    /// Queue a run of the view's layout hook.
    pub fn request_layout(&mut self, id: ViewId) {
        let Some(task) = self.views.layout_task(id) else {
            debug_assert!(false, "layout requested for destroyed view {id:?}");
            return;
        };
        if !self.tasks.is_linked(task) {
            self.tasks.push_back(Queue::Idle, task);
        }
    }

    /// Repaint `id` and everything below it.
    ///
    /// Walks children back to front, queueing a redraw for every visible
    /// view with content; where a descendant owns a surface, that surface's
    /// commit is queued before descending into it.
    pub fn redraw_subtree(&mut self, id: ViewId) {
        if !self.views.is_visible(id) {
            return;
        }
        if self.has_content(id) {
            self.request_redraw(id);
        }
        for child in self.views.children(id).into_iter().rev() {
            if !self.views.is_visible(child) {
                continue;
            }
            if let Some(surface) = self.views.own_surface(child) {
                self.surfaces.request_commit(&mut self.tasks, surface);
            }
            self.redraw_subtree(child);
        }
    }

    fn cancel_subtree_redraws(&mut self, id: ViewId) {
        for view in self.views.subtree(id) {
            if let Some(task) = self.views.redraw_task(view) {
                self.tasks.unlink(task);
            }
        }
    }

    /// Run the pending tasks once.
    pub fn flush_once(&mut self) -> FlushStats {
        let mut stats = FlushStats::default();

        self.tasks.begin_flush(Queue::Idle);
        while let Some((_, kind)) = self.tasks.pop_running() {
            self.run_task(kind, &mut stats);
        }

        // Commits only ever queue commits of sync parents, so this ends.
        self.surfaces.begin_pass();
        while self.tasks.len(Queue::Commit) > 0 {
            self.tasks.begin_flush(Queue::Commit);
            while let Some((_, kind)) = self.tasks.pop_running() {
                self.run_task(kind, &mut stats);
            }
        }

        if !stats.is_empty() {
            log::trace!(
                "Flush: {} layouts, {} redraws, {} commits, {} failures",
                stats.layouts,
                stats.redraws,
                stats.commits,
                stats.failures
            );
        }
        stats
    }

    fn run_task(&mut self, kind: TaskKind, stats: &mut FlushStats) {
        let result = match kind {
            TaskKind::Layout(view) => self.run_layout(view).map(|n| stats.layouts += n),
            TaskKind::Redraw(view) => self.run_redraw(view).map(|drawn| {
                if drawn {
                    stats.redraws += 1;
                }
            }),
            TaskKind::Commit(surface) => self
                .surfaces
                .commit(&mut self.compositor, &self.pools, &mut self.tasks, surface)
                .map(|()| stats.commits += 1),
        };
        if let Err(err) = result {
            stats.failures += 1;
            log::warn!("Task {:?} failed: {}", kind, err);
        }
    }

    /// Run `on_layout` for `id`, apply its placements, and lay out inline
    /// every placed child that asked for layout. Returns the hooks run.
    fn run_layout(&mut self, id: ViewId) -> Result<usize> {
        if !self.views.contains(id) || !self.views.is_visible(id) {
            return Ok(0);
        }
        let size = self.views.size(id).unwrap_or_default();
        let children = self
            .views
            .children(id)
            .into_iter()
            .map(|child| {
                let (min_size, max_size) = self
                    .views
                    .with_view(child, |v| (v.minimal_size(), v.maximal_size()))
                    .unwrap_or((Size::zero(), Size::max()));
                ChildInfo {
                    id: child,
                    geometry: self.views.geometry(child).unwrap_or_default(),
                    min_size,
                    max_size,
                    visible: self.views.is_visible(child),
                }
            })
            .collect();

        let mut ctx = LayoutContext::new(size, children);
        self.views.with_view_mut(id, |v, _| v.on_layout(&mut ctx));

        let mut count = 1;
        let mut moved = false;
        for (child, rect) in ctx.into_placements() {
            moved |= self.apply_geometry(child, rect)?;
            if let Some(task) = self.views.layout_task(child) {
                if self.tasks.is_queued(task) {
                    self.tasks.unlink(task);
                    count += self.run_layout(child)?;
                }
            }
        }
        if moved {
            self.request_redraw(id);
        }
        Ok(count)
    }

    /// Paint `id` and the visible descendants sharing its surface, then
    /// damage the painted area and queue the surface's commit.
    ///
    /// Returns whether anything was painted.
    fn run_redraw(&mut self, id: ViewId) -> Result<bool> {
        if !self.views.contains(id) || !self.views.is_shown(id) || !self.is_presented(id) {
            return Ok(false);
        }
        let Some(surface) = self.views.effective_surface(id) else {
            return Ok(false);
        };
        let Some(buffer) = self.surfaces.buffer(surface) else {
            log::debug!("Surface {:?} has no buffer, skipping redraw", surface);
            return Ok(false);
        };
        if self.compositor.is_busy(&buffer) {
            log::trace!("Buffer of surface {:?} is busy, deferring redraw", surface);
            if !self.deferred.contains(&id) {
                self.deferred.push(id);
            }
            return Ok(false);
        }

        let margin = self.surfaces.margin(surface);
        let origin = self
            .views
            .offset_in_surface(id)
            .unwrap_or_default()
            .offset(margin.left, margin.top);
        let mut batch = Vec::new();
        self.collect_paint_batch(id, origin, &mut batch);
        let Some(&(_, painted)) = batch.first() else {
            return Ok(false);
        };

        let pool = self
            .pools
            .get_mut(&buffer.pool())
            .ok_or(Error::StaleBuffer)?;
        let target = PixelTarget {
            data: pool.data_mut(&buffer)?,
            width: buffer.width(),
            height: buffer.height(),
            stride: buffer.stride(),
            format: buffer.format(),
        };
        let mut canvas = self.canvas.draw_into(target);
        for &(view, bounds) in &batch {
            self.views.with_view_mut(view, |v, _| {
                let mut ctx = DrawContext::new(&mut *canvas, bounds);
                v.on_draw(&mut ctx);
            });
        }
        drop(canvas);

        // Descendants painted with this batch need no redraw of their own.
        for &(view, _) in &batch[1..] {
            if let Some(task) = self.views.redraw_task(view) {
                self.tasks.unlink(task);
            }
        }

        if let Some(damage) = painted.intersection(&Rect::from_size(buffer.size())) {
            self.surfaces.damage(surface, damage);
        }
        self.surfaces.request_commit(&mut self.tasks, surface);
        Ok(true)
    }

    /// `id` and its visible descendants on the same surface, in paint order,
    /// with their bounds in buffer coordinates.
    fn collect_paint_batch(&self, id: ViewId, origin: Point, out: &mut Vec<(ViewId, Rect)>) {
        let size = self.views.size(id).unwrap_or_default();
        out.push((id, Rect::new(origin.x, origin.y, size.width, size.height)));
        for child in self.views.children(id) {
            if !self.views.is_visible(child) || self.views.own_surface(child).is_some() {
                continue;
            }
            let g = self.views.geometry(child).unwrap_or_default();
            self.collect_paint_batch(child, origin.offset(g.x, g.y), out);
        }
    }

    // ------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------

    /// Show a root view in a new top-level surface.
    pub fn present(&mut self, view: ViewId, config: &ToplevelConfig) -> Result<SurfaceId> {
        if !self.views.contains(view) {
            return Err(Error::UnknownView);
        }
        if self.views.parent(view).is_some() {
            return Err(Error::InvalidHierarchy("only root views can be presented"));
        }
        if let Some(surface) = self.views.own_surface(view) {
            return Ok(surface);
        }

        let handle = self.compositor.create_surface(config);
        let surface = self.surfaces.create(&mut self.tasks, handle, Some(view));
        self.views.set_own_surface(view, Some(surface));
        log::info!(
            "Presenting view {} in window '{}' (handle {})",
            view.as_u64(),
            config.title,
            handle.raw()
        );

        self.reconfigure_surface(surface);
        self.request_layout(view);
        self.redraw_subtree(view);
        Ok(surface)
    }

    /// Give `view` its own sub-surface, stacked on top of the surface it
    /// used to draw into.
    pub fn create_surface_for_view(&mut self, view: ViewId) -> Result<SurfaceId> {
        if let Some(surface) = self.views.own_surface(view) {
            return Ok(surface);
        }
        let parent_view = self.views.parent(view).ok_or(Error::NoSurface)?;
        let parent_surface = self
            .views
            .effective_surface(parent_view)
            .ok_or(Error::NoSurface)?;
        let parent_handle = self
            .surfaces
            .handle(parent_surface)
            .ok_or(Error::UnknownSurface)?;

        let handle = self.compositor.create_subsurface(parent_handle);
        let surface = self.surfaces.create(&mut self.tasks, handle, Some(view));
        self.surfaces
            .add_child(&mut self.compositor, parent_surface, surface, StackPosition::Top)?;
        self.views.set_own_surface(view, Some(surface));

        self.sync_surface_positions(view);
        self.reconfigure_surface(surface);
        self.redraw_subtree(view);
        // The parent's buffer still holds what the view painted there.
        self.request_redraw(parent_view);
        Ok(surface)
    }

    /// Make sure `surface` has a buffer of `width` x `height` attached before
    /// its next commit.
    ///
    /// The surface's pool is created on first use and regrown when too small;
    /// a regrowth invalidates every earlier buffer, so the fresh buffer is
    /// always carved after it. A zero size detaches the content and returns
    /// `None`.
    pub fn configure_surface_buffer(
        &mut self,
        surface: SurfaceId,
        width: u32,
        height: u32,
    ) -> Result<Option<Buffer>> {
        if !self.surfaces.contains(surface) {
            return Err(Error::UnknownSurface);
        }
        if width == 0 || height == 0 {
            self.surfaces.attach_buffer(surface, None, 0, 0);
            self.surfaces.request_commit(&mut self.tasks, surface);
            return Ok(None);
        }

        let too_large = || Error::TooLarge { width, height };
        let stride = self.format.min_stride(width).ok_or_else(too_large)?;
        // wl_shm pool sizes are signed 32-bit.
        let len = (stride as usize)
            .checked_mul(height as usize)
            .filter(|&len| i32::try_from(len).is_ok())
            .ok_or_else(too_large)?;

        let pool_id = match self.surfaces.pool(surface) {
            Some(id) => id,
            None => {
                let pool = BufferPool::new();
                let id = pool.id();
                self.pools.insert(id, pool);
                self.surfaces.set_pool(surface, Some(id));
                id
            }
        };
        let pool = self.pools.get_mut(&pool_id).ok_or(Error::UnknownSurface)?;

        if pool.reserve(len)? {
            log::debug!(
                "Pool {} regrown to {} bytes for {}x{}",
                pool_id.raw(),
                len,
                width,
                height
            );
        }
        let buffer = pool.carve(width, height, stride, self.format, 0)?;
        pool.data_mut(&buffer)?.fill(0);

        self.surfaces.attach_buffer(surface, Some(buffer), 0, 0);
        self.surfaces.request_commit(&mut self.tasks, surface);
        Ok(Some(buffer))
    }

    /// Size the surface's buffer to its owner plus margins. Allocation
    /// failures leave the surface without content until the next resize.
    fn reconfigure_surface(&mut self, surface: SurfaceId) {
        let Some(owner) = self.surfaces.owner(surface) else {
            return;
        };
        if !self.views.is_shown(owner) {
            return;
        }
        let size = self.views.size(owner).unwrap_or_default();
        let margin = self.surfaces.margin(surface);
        let width = grow(size.width, margin.horizontal());
        let height = grow(size.height, margin.vertical());

        if let Err(err) = self.configure_surface_buffer(surface, width, height) {
            log::error!(
                "Cannot allocate a {}x{} buffer for surface {:?}: {}",
                width,
                height,
                surface,
                err
            );
            self.surfaces.attach_buffer(surface, None, 0, 0);
            self.surfaces.request_commit(&mut self.tasks, surface);
        }
    }

    fn show_subtree_surfaces(&mut self, id: ViewId) {
        for view in self.views.subtree(id) {
            if let Some(surface) = self.views.own_surface(view) {
                self.reconfigure_surface(surface);
            }
        }
    }

    fn hide_subtree_surfaces(&mut self, id: ViewId) {
        for view in self.views.subtree(id) {
            if let Some(surface) = self.views.own_surface(view) {
                self.surfaces.attach_buffer(surface, None, 0, 0);
                self.surfaces.request_commit(&mut self.tasks, surface);
            }
        }
    }

    /// Recompute the position of every sub-surface owned in the subtree.
    /// Position changes take effect with the parent surface's next commit.
    fn sync_surface_positions(&mut self, id: ViewId) {
        for view in self.views.subtree(id) {
            let Some(surface) = self.views.own_surface(view) else {
                continue;
            };
            let Some(parent_surface) = self.surfaces.parent(surface) else {
                continue;
            };
            let Some(parent_view) = self.views.parent(view) else {
                continue;
            };
            let geometry = self.views.geometry(view).unwrap_or_default();
            let parent_margin = self.surfaces.margin(parent_surface);
            let margin = self.surfaces.margin(surface);
            let position = self
                .views
                .offset_in_surface(parent_view)
                .unwrap_or_default()
                .offset(
                    geometry.x + parent_margin.left - margin.left,
                    geometry.y + parent_margin.top - margin.top,
                );
            if self.surfaces.position(surface) != Some(position) {
                self.surfaces
                    .set_position(&mut self.compositor, surface, position);
                self.surfaces.request_commit(&mut self.tasks, parent_surface);
            }
        }
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        let doomed = self.surfaces.subtree(surface);
        let pools: Vec<_> = doomed.iter().filter_map(|&s| self.surfaces.pool(s)).collect();
        let owners: Vec<_> = doomed.iter().filter_map(|&s| self.surfaces.owner(s)).collect();

        self.surfaces
            .destroy(&mut self.compositor, &mut self.tasks, surface);
        for pool in pools {
            self.pools.remove(&pool);
        }
        for owner in owners {
            self.views.set_own_surface(owner, None);
        }
    }

    /// Record new content for `surface`; `None` detaches. Applied at the
    /// next commit.
    pub fn attach_buffer(&mut self, surface: SurfaceId, buffer: Option<Buffer>, x: i32, y: i32) {
        self.surfaces.attach_buffer(surface, buffer, x, y);
    }

    /// Add damage (buffer coordinates) to `surface`'s next commit.
    pub fn damage(&mut self, surface: SurfaceId, region: Rect) {
        self.surfaces.damage(surface, region);
    }

    pub fn set_sync_mode(&mut self, surface: SurfaceId, mode: SyncMode) {
        self.surfaces
            .set_sync_mode(&mut self.compositor, surface, mode);
    }

    /// Move a sub-surface within its parent's stacking order.
    pub fn restack(&mut self, surface: SurfaceId, position: StackPosition<SurfaceId>) -> Result<()> {
        let parent = self
            .surfaces
            .parent(surface)
            .ok_or(Error::InvalidHierarchy("only sub-surfaces can be restacked"))?;
        self.surfaces
            .add_child(&mut self.compositor, parent, surface, position)?;
        self.surfaces.request_commit(&mut self.tasks, parent);
        Ok(())
    }

    /// Set the margin around the owning view's content; the buffer grows
    /// by the margin and the content moves inward.
    pub fn set_margin(&mut self, surface: SurfaceId, margin: Insets) -> Result<()> {
        if !self.surfaces.contains(surface) {
            return Err(Error::UnknownSurface);
        }
        if self.surfaces.margin(surface) == margin {
            return Ok(());
        }
        self.surfaces.set_margin(surface, margin);
        if let Some(owner) = self.surfaces.owner(surface) {
            self.sync_surface_positions(owner);
            self.reconfigure_surface(surface);
            self.redraw_subtree(owner);
        }
        Ok(())
    }

    /// Queue a commit of `surface`.
    pub fn commit_surface(&mut self, surface: SurfaceId) {
        self.surfaces.request_commit(&mut self.tasks, surface);
    }

    /// Apply a size the compositor configured for a top-level surface.
    ///
    /// The surface is repainted even when the size is unchanged, since the
    /// configure has to be answered by a commit.
    pub fn resize_window(&mut self, handle: SurfaceHandle, width: u32, height: u32) -> Result<()> {
        let surface = self
            .surfaces
            .find_by_handle(handle)
            .ok_or(Error::UnknownSurface)?;
        let owner = self.surfaces.owner(surface).ok_or(Error::UnknownView)?;
        let geometry = self.views.geometry(owner).ok_or(Error::UnknownView)?;
        log::info!(
            "Window {} configured to {}x{}",
            handle.raw(),
            width,
            height
        );

        let changed = self.apply_geometry(owner, Rect::new(geometry.x, geometry.y, width, height))?;
        if !changed {
            self.reconfigure_surface(surface);
            self.redraw_subtree(owner);
        }
        Ok(())
    }

    /// The surface was shown on `output`. Its content is repainted.
    pub fn on_enter_output(&mut self, handle: SurfaceHandle, output: OutputId) {
        let Some(surface) = self.surfaces.find_by_handle(handle) else {
            return;
        };
        if self.surfaces.enter_output(surface, output) {
            log::debug!("Surface {:?} entered output {}", surface, output.0);
            if let Some(owner) = self.surfaces.owner(surface) {
                self.redraw_subtree(owner);
            }
        }
    }

    pub fn on_leave_output(&mut self, handle: SurfaceHandle, output: OutputId) {
        let Some(surface) = self.surfaces.find_by_handle(handle) else {
            return;
        };
        if self.surfaces.leave_output(surface, output) {
            log::debug!("Surface {:?} left output {}", surface, output.0);
            if let Some(owner) = self.surfaces.owner(surface) {
                self.redraw_subtree(owner);
            }
        }
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Deliver a pointer event addressed to the surface `handle`, with
    /// surface coordinates. Returns whether a view handled it.
    pub fn dispatch_pointer(&mut self, handle: SurfaceHandle, event: MouseEvent) -> bool {
        let Some(surface) = self.surfaces.find_by_handle(handle) else {
            log::trace!("Pointer event for unknown surface {}", handle.raw());
            return false;
        };
        let Some(owner) = self.surfaces.owner(surface) else {
            return false;
        };
        let Some((x, y)) = event.coords() else {
            self.set_hovered(None, 0.0, 0.0);
            return false;
        };
        let margin = self.surfaces.margin(surface);
        let (x, y) = (x - margin.left as f32, y - margin.top as f32);

        let target = self.hit_test(owner, x, y);
        self.set_hovered(target, x, y);
        if matches!(event, MouseEvent::Enter { .. }) {
            return target.is_some();
        }
        let Some(target) = target else {
            return false;
        };

        if matches!(event, MouseEvent::Down { .. }) {
            let focus = self.focus_candidate(target, owner);
            self.set_focus(focus);
        }

        let mut current = Some(target);
        while let Some(view) = current {
            let offset = self.views.offset_in_surface(view).unwrap_or_default();
            let local = event.with_coords(x - offset.x as f32, y - offset.y as f32);
            let response = self
                .views
                .with_view_mut(view, |v, _| v.on_mouse_event(&local))
                .unwrap_or(EventResponse::Ignored);
            self.apply_changes(view, response.changes());
            if response.is_handled() {
                return true;
            }
            if view == owner {
                break;
            }
            current = self.views.parent(view);
        }
        false
    }

    /// Deliver a key event to the focused view, bubbling to its ancestors.
    pub fn dispatch_key(&mut self, event: KeyEvent) -> bool {
        let mut current = self.focused;
        while let Some(view) = current {
            let response = self
                .views
                .with_view_mut(view, |v, _| v.on_key_event(&event))
                .unwrap_or(EventResponse::Ignored);
            self.apply_changes(view, response.changes());
            if response.is_handled() {
                return true;
            }
            current = self.views.parent(view);
        }
        false
    }

    /// Move keyboard focus, sending focus-out and focus-in.
    pub fn set_focus(&mut self, view: Option<ViewId>) {
        if self.focused == view {
            return;
        }
        if let Some(old) = self.focused.take() {
            self.send_key(old, KeyEvent::FocusOut);
        }
        if let Some(new) = view.filter(|&v| self.views.contains(v)) {
            self.focused = Some(new);
            self.send_key(new, KeyEvent::FocusIn);
        }
    }

    fn send_key(&mut self, view: ViewId, event: KeyEvent) {
        if let Some(response) = self.views.with_view_mut(view, |v, _| v.on_key_event(&event)) {
            self.apply_changes(view, response.changes());
        }
    }

    fn focus_candidate(&self, target: ViewId, owner: ViewId) -> Option<ViewId> {
        let mut current = Some(target);
        while let Some(view) = current {
            if self.views.with_view(view, |v| v.accepts_focus()) == Some(true) {
                return Some(view);
            }
            if view == owner {
                break;
            }
            current = self.views.parent(view);
        }
        None
    }

    /// Front-most visible view under `(x, y)`, in `owner`'s coordinates.
    /// Children owning their own surface are skipped; their surface gets
    /// its own pointer events.
    fn hit_test(&self, owner: ViewId, x: f32, y: f32) -> Option<ViewId> {
        let size = self.views.size(owner)?;
        if !self.views.is_visible(owner) || !contains(size, x, y) {
            return None;
        }
        Some(self.hit_descendant(owner, x, y))
    }

    fn hit_descendant(&self, view: ViewId, x: f32, y: f32) -> ViewId {
        for child in self.views.children(view).into_iter().rev() {
            if !self.views.is_visible(child) || self.views.own_surface(child).is_some() {
                continue;
            }
            let g = self.views.geometry(child).unwrap_or_default();
            let (cx, cy) = (x - g.x as f32, y - g.y as f32);
            if contains(g.size(), cx, cy) {
                return self.hit_descendant(child, cx, cy);
            }
        }
        view
    }

    fn set_hovered(&mut self, view: Option<ViewId>, x: f32, y: f32) {
        if self.hovered == view {
            return;
        }
        if let Some(old) = self.hovered.take() {
            if let Some(response) = self
                .views
                .with_view_mut(old, |v, _| v.on_mouse_event(&MouseEvent::Leave))
            {
                self.apply_changes(old, response.changes());
            }
        }
        if let Some(new) = view {
            let offset = self.views.offset_in_surface(new).unwrap_or_default();
            let enter = MouseEvent::Enter {
                x: x - offset.x as f32,
                y: y - offset.y as f32,
            };
            if let Some(response) = self.views.with_view_mut(new, |v, _| v.on_mouse_event(&enter)) {
                self.apply_changes(new, response.changes());
            }
            self.hovered = Some(new);
        }
    }

    /// Drop hover and focus that point into the subtree of `id`.
    fn forget_input_targets(&mut self, id: ViewId) {
        if self.hovered.is_some_and(|h| self.views.is_ancestor_or_self(id, h)) {
            self.hovered = None;
        }
        if self.focused.is_some_and(|f| self.views.is_ancestor_or_self(id, f)) {
            self.focused = None;
        }
    }
}

fn contains(size: Size, x: f32, y: f32) -> bool {
    x >= 0.0 && y >= 0.0 && x < size.width as f32 && y < size.height as f32
}

fn grow(length: u32, by: i32) -> u32 {
    if by >= 0 {
        length.saturating_add(by as u32)
    } else {
        length.saturating_sub(by.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{RecordingCompositor, Request};
    use crate::geometry::Color;
    use crate::widgets::{MouseButton, Panel};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records hook calls into a shared log.
    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        min: Size,
        focusable: bool,
        resized: ChangeFlags,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                min: Size::zero(),
                focusable: false,
                resized: ChangeFlags::NEEDS_PAINT,
            }
        }
    }

    impl View for Recorder {
        fn on_resize(&mut self, _old: Size, new: Size) -> ChangeFlags {
            self.log
                .borrow_mut()
                .push(format!("{}:resize {}x{}", self.name, new.width, new.height));
            self.resized
        }

        fn on_draw(&mut self, ctx: &mut DrawContext<'_>) {
            self.log.borrow_mut().push(format!("{}:draw", self.name));
            ctx.clear(Color::WHITE);
        }

        fn on_mouse_event(&mut self, event: &MouseEvent) -> EventResponse {
            let label = match event {
                MouseEvent::Enter { .. } => "enter".to_string(),
                MouseEvent::Leave => "leave".to_string(),
                MouseEvent::Down { x, y, .. } => format!("down {x},{y}"),
                _ => return EventResponse::Ignored,
            };
            self.log.borrow_mut().push(format!("{}:{}", self.name, label));
            EventResponse::Handled
        }

        fn on_key_event(&mut self, event: &KeyEvent) -> EventResponse {
            if let KeyEvent::FocusIn = event {
                self.log.borrow_mut().push(format!("{}:focus", self.name));
            }
            EventResponse::Ignored
        }

        fn minimal_size(&self) -> Size {
            self.min
        }

        fn accepts_focus(&self) -> bool {
            self.focusable
        }
    }

    fn presented_window() -> (Display<RecordingCompositor>, ViewId, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut display = Display::new(RecordingCompositor::new());
        let window = display.create_view(Recorder::new("window", &log));
        display.resize_view(window, 100, 80).unwrap();
        display.present(window, &ToplevelConfig::default()).unwrap();
        (display, window, log)
    }

    fn settle(display: &mut Display<RecordingCompositor>) {
        for _ in 0..8 {
            if !display.has_pending_work() {
                return;
            }
            display.flush_once();
        }
        panic!("display did not settle");
    }

    #[test]
    fn test_resize_clamps_to_declared_bounds() {
        let mut display = Display::new(RecordingCompositor::new());
        let panel = display.create_view(Panel::new(Color::BLACK).min_size(10, 10).max_size(50, 40));
        assert_eq!(display.views().size(panel), Some(Size::new(10, 10)));

        display.resize_view(panel, 5, 100).unwrap();
        assert_eq!(display.views().size(panel), Some(Size::new(10, 40)));
        display.resize_view(panel, 30, 30).unwrap();
        assert_eq!(display.views().size(panel), Some(Size::new(30, 30)));
    }

    #[test]
    fn test_unchanged_size_skips_hook() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut display = Display::new(RecordingCompositor::new());
        let view = display.create_view(Recorder::new("v", &log));
        display.resize_view(view, 10, 10).unwrap();
        display.resize_view(view, 10, 10).unwrap();
        assert_eq!(log.borrow().as_slice(), &["v:resize 10x10".to_string()]);
    }

    #[test]
    fn test_redraw_without_surface_is_noop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut display = Display::new(RecordingCompositor::new());
        let view = display.create_view(Recorder::new("v", &log));
        display.request_redraw(view);
        assert!(!display.has_pending_work());
    }

    #[test]
    fn test_request_redraw_coalesces() {
        let (mut display, window, _log) = presented_window();
        settle(&mut display);

        display.request_redraw(window);
        display.request_redraw(window);
        assert_eq!(
            display.tasks().pending(Queue::Idle),
            vec![TaskKind::Redraw(window)]
        );
    }

    #[test]
    fn test_redraw_keeps_sibling_order() {
        let (mut display, window, log) = presented_window();
        let a = display.create_view(Recorder::new("a", &log));
        let b = display.create_view(Recorder::new("b", &log));
        let c = display.create_view(Recorder::new("c", &log));
        for v in [a, b, c] {
            display.add_child(window, v).unwrap();
        }
        settle(&mut display);

        display.request_redraw(a);
        display.request_redraw(c);
        display.request_redraw(b);
        assert_eq!(
            display.tasks().pending(Queue::Idle),
            vec![TaskKind::Redraw(a), TaskKind::Redraw(b), TaskKind::Redraw(c)]
        );
    }

    #[test]
    fn test_child_redraw_follows_parent() {
        let (mut display, window, log) = presented_window();
        let a = display.create_view(Recorder::new("a", &log));
        let other = display.create_view(Recorder::new("other", &log));
        display.add_child(window, a).unwrap();
        display.add_child(window, other).unwrap();
        settle(&mut display);

        display.request_redraw(window);
        display.request_redraw(a);
        display.request_redraw(other);
        assert_eq!(
            display.tasks().pending(Queue::Idle),
            vec![
                TaskKind::Redraw(window),
                TaskKind::Redraw(a),
                TaskKind::Redraw(other)
            ]
        );
    }

    #[test]
    fn test_parent_redraw_paints_children_once() {
        let (mut display, window, log) = presented_window();
        let child = display.create_view(Recorder::new("child", &log));
        display.add_child(window, child).unwrap();
        display.resize_view(child, 10, 10).unwrap();
        settle(&mut display);
        log.borrow_mut().clear();

        display.request_redraw(window);
        display.request_redraw(child);
        let stats = display.flush_once();
        assert_eq!(stats.redraws, 1);
        assert_eq!(
            log.borrow().as_slice(),
            &["window:draw".to_string(), "child:draw".to_string()]
        );
    }

    #[test]
    fn test_flush_defers_work_requested_during_flush() {
        let (mut display, window, log) = presented_window();
        settle(&mut display);
        log.borrow_mut().clear();

        display.request_redraw(window);
        display.tasks.begin_flush(Queue::Idle);
        // A request made while the redraw is running is coalesced into it.
        display.request_redraw(window);
        assert_eq!(display.tasks.len(Queue::Idle), 0);
        while let Some((_, kind)) = display.tasks.pop_running() {
            let mut stats = FlushStats::default();
            display.run_task(kind, &mut stats);
        }
        display.request_redraw(window);
        assert_eq!(display.tasks.len(Queue::Idle), 1);
    }

    #[test]
    fn test_present_attaches_before_commit() {
        let (mut display, window, _log) = presented_window();
        let stats = display.flush_once();
        assert!(stats.commits >= 1);
        assert_eq!(stats.failures, 0);

        let surface = display.views().own_surface(window).unwrap();
        let handle = display.surfaces().handle(surface).unwrap();
        let requests = display.compositor().requests();
        let attach = requests
            .iter()
            .position(|r| matches!(r, Request::Attach { handle: h, buffer: Some(_), .. } if *h == handle))
            .unwrap();
        let commit = requests
            .iter()
            .position(|r| *r == Request::Commit(handle))
            .unwrap();
        assert!(attach < commit);
        assert_eq!(
            display.surfaces().committed_buffer(surface).map(|b| b.size()),
            Some(Size::new(100, 80))
        );
    }

    #[test]
    fn test_subsurface_position_follows_view() {
        let (mut display, window, log) = presented_window();
        let child = display.create_view(Recorder::new("child", &log));
        display.add_child(window, child).unwrap();
        display.move_view(child, 10, 20).unwrap();
        display.resize_view(child, 30, 30).unwrap();
        let surface = display.create_surface_for_view(child).unwrap();
        assert_eq!(display.surfaces().position(surface), Some(Point::new(10, 20)));

        display.move_view(child, 15, 20).unwrap();
        assert_eq!(display.surfaces().position(surface), Some(Point::new(15, 20)));

        let window_surface = display.views().own_surface(window).unwrap();
        display.set_margin(window_surface, Insets::all(4)).unwrap();
        assert_eq!(display.surfaces().position(surface), Some(Point::new(19, 24)));
        settle(&mut display);
        assert_eq!(
            display
                .surfaces()
                .committed_buffer(window_surface)
                .map(|b| b.size()),
            Some(Size::new(108, 88))
        );
    }

    #[test]
    fn test_hidden_view_is_not_drawn_and_surface_detached() {
        let (mut display, window, log) = presented_window();
        let child = display.create_view(Recorder::new("child", &log));
        display.add_child(window, child).unwrap();
        display.resize_view(child, 10, 10).unwrap();
        let surface = display.create_surface_for_view(child).unwrap();
        settle(&mut display);
        log.borrow_mut().clear();

        display.set_visible(child, false).unwrap();
        display.request_redraw(child);
        settle(&mut display);
        assert!(!log.borrow().iter().any(|l| l == "child:draw"));
        assert_eq!(display.surfaces().committed_buffer(surface), None);

        display.set_visible(child, true).unwrap();
        settle(&mut display);
        assert!(log.borrow().iter().any(|l| l == "child:draw"));
        assert!(display.surfaces().committed_buffer(surface).is_some());
    }

    #[test]
    fn test_pointer_hits_front_child_in_local_coords() {
        let (mut display, window, log) = presented_window();
        let back = display.create_view(Recorder::new("back", &log));
        let front = display.create_view(Recorder::new("front", &log));
        display.add_child(window, back).unwrap();
        display.add_child(window, front).unwrap();
        display.resize_view(back, 50, 50).unwrap();
        display.move_view(front, 20, 20).unwrap();
        display.resize_view(front, 50, 50).unwrap();
        settle(&mut display);
        log.borrow_mut().clear();

        let handle = display.compositor().requests().iter().find_map(|r| match r {
            Request::CreateSurface(h) => Some(*h),
            _ => None,
        });
        let handle = handle.unwrap();
        let handled = display.dispatch_pointer(
            handle,
            MouseEvent::Down {
                x: 30.0,
                y: 25.0,
                button: MouseButton::Left,
            },
        );
        assert!(handled);
        assert_eq!(
            log.borrow().as_slice(),
            &["front:enter".to_string(), "front:down 10,5".to_string()]
        );
        assert_eq!(display.hovered(), Some(front));

        display.dispatch_pointer(handle, MouseEvent::Leave);
        assert_eq!(display.hovered(), None);
        assert_eq!(log.borrow().last().map(String::as_str), Some("front:leave"));
    }

    #[test]
    fn test_press_moves_focus() {
        let (mut display, window, log) = presented_window();
        let mut field = Recorder::new("field", &log);
        field.focusable = true;
        field.min = Size::new(100, 80);
        let field = display.create_view(field);
        display.add_child(window, field).unwrap();
        settle(&mut display);

        let surface = display.views().own_surface(window).unwrap();
        let handle = display.surfaces().handle(surface).unwrap();
        display.dispatch_pointer(
            handle,
            MouseEvent::Down {
                x: 1.0,
                y: 1.0,
                button: MouseButton::Left,
            },
        );
        assert_eq!(display.focused(), Some(field));
        assert!(log.borrow().iter().any(|l| l == "field:focus"));
    }

    #[test]
    fn test_output_enter_repaints_subtree() {
        let (mut display, window, log) = presented_window();
        settle(&mut display);
        log.borrow_mut().clear();

        let surface = display.views().own_surface(window).unwrap();
        let handle = display.surfaces().handle(surface).unwrap();
        display.on_enter_output(handle, OutputId(7));
        display.on_enter_output(handle, OutputId(7));
        assert_eq!(display.surfaces().outputs(surface), &[OutputId(7)]);
        let stats = display.flush_once();
        assert_eq!(stats.redraws, 1);

        display.on_leave_output(handle, OutputId(7));
        assert!(display.surfaces().outputs(surface).is_empty());
    }

    #[test]
    fn test_destroy_unlinks_from_parent() {
        let (mut display, window, log) = presented_window();
        let child = display.create_view(Recorder::new("child", &log));
        display.add_child(window, child).unwrap();
        display.create_surface_for_view(child).unwrap();
        settle(&mut display);

        display.destroy_view(child).unwrap();
        assert!(display.views().children(window).is_empty());
        assert!(!display.views().contains(child));
        assert_eq!(display.surfaces().len(), 1);
        assert!(matches!(display.destroy_view(child), Err(Error::UnknownView)));
        settle(&mut display);
    }

    #[test]
    fn test_remove_child_keeps_view() {
        let (mut display, window, log) = presented_window();
        let child = display.create_view(Recorder::new("child", &log));
        display.add_child(window, child).unwrap();
        settle(&mut display);

        assert_eq!(display.remove_child(child, window), None);
        assert_eq!(display.remove_child(window, child), Some(child));
        assert!(display.views().contains(child));
        display.request_redraw(child);
        assert!(!display
            .tasks()
            .pending(Queue::Idle)
            .contains(&TaskKind::Redraw(child)));

        display.add_child(window, child).unwrap();
        assert_eq!(display.views().parent(child), Some(window));
    }

    #[test]
    fn test_quiet_resize_queues_no_redraw() {
        let (mut display, window, log) = presented_window();
        let mut quiet = Recorder::new("quiet", &log);
        quiet.resized = ChangeFlags::empty();
        let child = display.create_view(quiet);
        display.add_child(window, child).unwrap();
        settle(&mut display);

        display.resize_view(child, 20, 20).unwrap();
        display.move_view(child, 5, 5).unwrap();
        let pending = display.tasks().pending(Queue::Idle);
        assert!(!pending.contains(&TaskKind::Redraw(window)));
        assert!(!pending.contains(&TaskKind::Redraw(child)));
    }

    #[test]
    fn test_failed_redraw_keeps_descendant_redraws() {
        let (mut display, window, log) = presented_window();
        let child = display.create_view(Recorder::new("child", &log));
        display.add_child(window, child).unwrap();
        display.resize_view(child, 10, 10).unwrap();
        settle(&mut display);
        log.borrow_mut().clear();

        // A buffer from a pool the display does not own cannot be drawn into.
        let foreign = BufferPool::with_size(100 * 4 * 80).unwrap();
        let buffer = foreign.carve(100, 80, 400, PixelFormat::Argb8888, 0).unwrap();
        let surface = display.views().own_surface(window).unwrap();
        display.attach_buffer(surface, Some(buffer), 0, 0);

        display.request_redraw(window);
        display.request_redraw(child);
        let stats = display.flush_once();
        assert_eq!(stats.redraws, 0);
        assert_eq!(stats.failures, 2);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_busy_buffer_defers_redraw_until_release() {
        let (mut display, window, log) = presented_window();
        display.compositor_mut().hold_buffers(true);
        settle(&mut display);
        log.borrow_mut().clear();

        display.request_redraw(window);
        let stats = display.flush_once();
        assert_eq!(stats.redraws, 0);
        assert_eq!(stats.failures, 0);
        assert!(log.borrow().is_empty());
        assert!(!display.has_pending_work());

        display.resume_deferred_redraws();
        assert_eq!(display.flush_once().redraws, 0);

        assert_eq!(display.compositor_mut().release_buffers(), 1);
        display.resume_deferred_redraws();
        assert_eq!(
            display.tasks().pending(Queue::Idle),
            vec![TaskKind::Redraw(window)]
        );
        assert_eq!(display.flush_once().redraws, 1);
        assert_eq!(log.borrow().as_slice(), &["window:draw".to_string()]);
    }
}
