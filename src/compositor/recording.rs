//! Headless compositor that records the request stream.

use std::collections::HashSet;

use super::{BufferAttachment, Compositor, SurfaceHandle, SyncMode, ToplevelConfig};
use crate::geometry::{Rect, Size};
use crate::pool::{Buffer, PoolId};

/// One request as seen by the compositor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateSurface(SurfaceHandle),
    CreateSubsurface {
        handle: SurfaceHandle,
        parent: SurfaceHandle,
    },
    Destroy(SurfaceHandle),
    Attach {
        handle: SurfaceHandle,
        /// Pool, offset and size of the attached buffer, `None` on detach.
        buffer: Option<(PoolId, usize, Size)>,
        x: i32,
        y: i32,
    },
    Damage {
        handle: SurfaceHandle,
        region: Rect,
    },
    Commit(SurfaceHandle),
    SetSyncMode {
        handle: SurfaceHandle,
        mode: SyncMode,
    },
    SetPosition {
        handle: SurfaceHandle,
        x: i32,
        y: i32,
    },
    Place {
        handle: SurfaceHandle,
        sibling: SurfaceHandle,
        above: bool,
    },
}

#[derive(Debug, Default)]
pub struct RecordingCompositor {
    next_handle: u32,
    requests: Vec<Request>,
    /// Attached buffers stay busy until `release_buffers` when set.
    hold: bool,
    held: HashSet<(PoolId, usize)>,
}

impl RecordingCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Drain recorded requests.
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    /// Handles committed, in order.
    pub fn commits(&self) -> Vec<SurfaceHandle> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::Commit(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    pub fn commit_count(&self, handle: SurfaceHandle) -> usize {
        self.commits().iter().filter(|&&h| h == handle).count()
    }

    /// Keep every buffer attached from now on busy, like a server that
    /// has not finished reading them.
    pub fn hold_buffers(&mut self, hold: bool) {
        self.hold = hold;
    }

    /// Release all held buffers. Returns how many there were.
    pub fn release_buffers(&mut self) -> usize {
        self.held.drain().count()
    }

    fn allocate_handle(&mut self) -> SurfaceHandle {
        self.next_handle += 1;
        SurfaceHandle::from_raw(self.next_handle)
    }
}

impl Compositor for RecordingCompositor {
    fn create_surface(&mut self, _config: &ToplevelConfig) -> SurfaceHandle {
        let handle = self.allocate_handle();
        self.requests.push(Request::CreateSurface(handle));
        handle
    }

    fn create_subsurface(&mut self, parent: SurfaceHandle) -> SurfaceHandle {
        let handle = self.allocate_handle();
        self.requests
            .push(Request::CreateSubsurface { handle, parent });
        handle
    }

    fn destroy_surface(&mut self, handle: SurfaceHandle) {
        self.requests.push(Request::Destroy(handle));
    }

    fn attach_buffer(
        &mut self,
        handle: SurfaceHandle,
        buffer: Option<BufferAttachment<'_>>,
        x: i32,
        y: i32,
    ) {
        let buffer = buffer.map(|a| (a.pool.id(), a.buffer.offset(), a.buffer.size()));
        if let (true, Some((pool, offset, _))) = (self.hold, buffer) {
            self.held.insert((pool, offset));
        }
        self.requests.push(Request::Attach { handle, buffer, x, y });
    }

    fn damage_region(&mut self, handle: SurfaceHandle, region: Rect) {
        self.requests.push(Request::Damage { handle, region });
    }

    fn commit(&mut self, handle: SurfaceHandle) {
        self.requests.push(Request::Commit(handle));
    }

    fn set_sync_mode(&mut self, handle: SurfaceHandle, mode: SyncMode) {
        self.requests.push(Request::SetSyncMode { handle, mode });
    }

    fn set_position(&mut self, handle: SurfaceHandle, x: i32, y: i32) {
        self.requests.push(Request::SetPosition { handle, x, y });
    }

    fn place(&mut self, handle: SurfaceHandle, sibling: SurfaceHandle, above: bool) {
        self.requests.push(Request::Place {
            handle,
            sibling,
            above,
        });
    }

    fn is_busy(&self, buffer: &Buffer) -> bool {
        self.held.contains(&(buffer.pool(), buffer.offset()))
    }
}
