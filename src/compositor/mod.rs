//! The compositor service consumed by the surface tree.
//!
//! Everything the core needs from the display server goes through
//! [`Compositor`]: creating plain and sub-surfaces, attaching buffers,
//! damage, stacking, sync mode and commit. The Wayland implementation lives in
//! [`crate::platform`]; [`RecordingCompositor`] is a headless implementation
//! that logs every request.

pub mod recording;

pub use recording::{RecordingCompositor, Request};

use crate::geometry::Rect;
use crate::pool::{Buffer, BufferPool};

/// Opaque handle to a compositor-side surface object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u32);

impl SurfaceHandle {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Identifies an output (monitor) a surface can be shown on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u32);

/// Commit behaviour of a sub-surface relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Committed state is applied together with the parent's next commit.
    #[default]
    Sync,
    /// Commits apply immediately, independent of the parent.
    Desync,
}

/// Where a child surface goes in its parent's stacking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackPosition<T> {
    /// Above every sibling.
    #[default]
    Top,
    /// Below every sibling.
    Bottom,
    /// Directly above the given sibling.
    Above(T),
    /// Directly below the given sibling.
    Below(T),
}

/// Settings for a top-level surface.
#[derive(Debug, Clone, Default)]
pub struct ToplevelConfig {
    pub title: String,
    pub app_id: String,
    pub min_size: Option<(u32, u32)>,
    pub max_size: Option<(u32, u32)>,
}

/// A buffer together with the pool it was carved from.
#[derive(Clone, Copy)]
pub struct BufferAttachment<'a> {
    pub pool: &'a BufferPool,
    pub buffer: Buffer,
}

pub trait Compositor {
    /// Create a top-level, shell-managed surface.
    fn create_surface(&mut self, config: &ToplevelConfig) -> SurfaceHandle;

    /// Create a sub-surface of `parent`. New sub-surfaces start in sync mode.
    fn create_subsurface(&mut self, parent: SurfaceHandle) -> SurfaceHandle;

    fn destroy_surface(&mut self, handle: SurfaceHandle);

    /// Attach new content, or detach it with `None`. Applied on commit.
    fn attach_buffer(
        &mut self,
        handle: SurfaceHandle,
        buffer: Option<BufferAttachment<'_>>,
        x: i32,
        y: i32,
    );

    /// Mark a region (buffer coordinates) as needing recomposition.
    fn damage_region(&mut self, handle: SurfaceHandle, region: Rect);

    fn commit(&mut self, handle: SurfaceHandle);

    fn set_sync_mode(&mut self, handle: SurfaceHandle, mode: SyncMode);

    /// Position a sub-surface relative to its parent's origin.
    fn set_position(&mut self, handle: SurfaceHandle, x: i32, y: i32);

    /// Restack a sub-surface directly above or below a sibling (or the parent).
    fn place(&mut self, handle: SurfaceHandle, sibling: SurfaceHandle, above: bool);

    /// Whether the server still reads from `buffer`. Busy buffers must not
    /// be drawn into until released.
    fn is_busy(&self, _buffer: &Buffer) -> bool {
        false
    }
}
