pub mod wayland;

pub use wayland::{PlatformEvent, WaylandCompositor, WaylandState};
