pub mod event;
pub mod linear;
pub mod panel;
pub mod view;

pub use event::{
    ChangeFlags, EventResponse, Key, KeyEvent, Modifiers, MouseButton, MouseEvent, ScrollSource,
};
pub use linear::{Axis, CrossAxisAlignment, Linear};
pub use panel::Panel;
pub use view::{ChildInfo, LayoutContext, View};
