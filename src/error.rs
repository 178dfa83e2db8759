//! Error taxonomy for the composition core.
//!
//! Resource failures (shared memory, buffer carving) are real errors and
//! propagate to the caller that set the resource up. Hierarchy violations are
//! programming errors: the structural operation reports them, and the
//! scheduler logs and skips them instead of tearing the client down.

use std::io;

use wayland_client::backend::WaylandError;
use wayland_client::globals::{BindError, GlobalError};
use wayland_client::ConnectError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Mapping anonymous shared memory failed.
    #[error("failed to map {size} bytes of shared memory: {source}")]
    Allocation {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// A buffer would extend past the end of its pool.
    #[error("buffer at offset {offset} with {len} bytes exceeds pool of {pool_size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        pool_size: usize,
    },

    /// Stride is too small to hold one row of pixels.
    #[error("stride {stride} is smaller than the minimum row size {min}")]
    InvalidStride { stride: u32, min: u32 },

    /// The buffer's byte size does not fit the shm protocol's 32-bit sizes.
    #[error("a {width}x{height} buffer is too large to share")]
    TooLarge { width: u32, height: u32 },

    /// Re-parenting would break the view or surface tree.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(&'static str),

    /// The buffer was carved from a mapping that has since been replaced.
    #[error("buffer refers to a pool mapping that has been reallocated")]
    StaleBuffer,

    #[error("view does not exist")]
    UnknownView,

    #[error("surface does not exist")]
    UnknownSurface,

    /// The view has no surface of its own or inherited from an ancestor.
    #[error("view is not presented on any surface")]
    NoSurface,

    #[error("failed to connect to the Wayland display: {0}")]
    Connect(#[from] ConnectError),

    #[error("failed to enumerate Wayland globals: {0}")]
    Global(#[from] GlobalError),

    #[error("required Wayland global unavailable: {0}")]
    Bind(#[from] BindError),

    #[error("Wayland connection error: {0}")]
    Backend(#[from] WaylandError),

    #[error("event loop error: {0}")]
    EventLoop(#[from] calloop::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error marks a misuse of the tree rather than a failed resource.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidHierarchy(_) | Error::UnknownView | Error::UnknownSurface
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
