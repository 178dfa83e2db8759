use bitflags::bitflags;

bitflags! {
    /// What a hook changed, and so what the scheduler has to do next.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ChangeFlags: u8 {
        /// Children need to be placed again
        const NEEDS_LAYOUT = 0b01;
        /// Visual appearance changed
        const NEEDS_PAINT  = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Device a scroll came from. Wheel steps are already scaled to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollSource {
    Wheel,
    Finger,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub logo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
}

/// Pointer input. Coordinates are view-local when delivered to a view.
#[derive(Debug, Clone, PartialEq)]
pub enum MouseEvent {
    Move { x: f32, y: f32 },
    Down { x: f32, y: f32, button: MouseButton },
    Up { x: f32, y: f32, button: MouseButton },
    /// Pointer entered the view
    Enter { x: f32, y: f32 },
    /// Pointer left the view
    Leave,
    Scroll {
        x: f32,
        y: f32,
        /// Horizontal delta in pixels (positive = right)
        delta_x: f32,
        /// Vertical delta in pixels (positive = down)
        delta_y: f32,
        source: ScrollSource,
    },
}

impl MouseEvent {
    pub fn coords(&self) -> Option<(f32, f32)> {
        match self {
            MouseEvent::Move { x, y }
            | MouseEvent::Down { x, y, .. }
            | MouseEvent::Up { x, y, .. }
            | MouseEvent::Enter { x, y }
            | MouseEvent::Scroll { x, y, .. } => Some((*x, *y)),
            MouseEvent::Leave => None,
        }
    }

    /// Create a new event with transformed coordinates
    pub fn with_coords(&self, new_x: f32, new_y: f32) -> Self {
        match *self {
            MouseEvent::Move { .. } => MouseEvent::Move { x: new_x, y: new_y },
            MouseEvent::Down { button, .. } => MouseEvent::Down {
                x: new_x,
                y: new_y,
                button,
            },
            MouseEvent::Up { button, .. } => MouseEvent::Up {
                x: new_x,
                y: new_y,
                button,
            },
            MouseEvent::Enter { .. } => MouseEvent::Enter { x: new_x, y: new_y },
            MouseEvent::Scroll {
                delta_x,
                delta_y,
                source,
                ..
            } => MouseEvent::Scroll {
                x: new_x,
                y: new_y,
                delta_x,
                delta_y,
                source,
            },
            MouseEvent::Leave => MouseEvent::Leave,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyEvent {
    Down { key: Key, modifiers: Modifiers },
    Up { key: Key, modifiers: Modifiers },
    /// View gained keyboard focus
    FocusIn,
    /// View lost keyboard focus
    FocusOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    Ignored,
    Handled,
    /// Handled, and the view changed in the given ways.
    Changed(ChangeFlags),
}

impl EventResponse {
    pub fn is_handled(&self) -> bool {
        !matches!(self, EventResponse::Ignored)
    }

    pub fn changes(&self) -> ChangeFlags {
        match self {
            EventResponse::Changed(flags) => *flags,
            _ => ChangeFlags::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_coords_keeps_payload() {
        let event = MouseEvent::Scroll {
            x: 1.0,
            y: 2.0,
            delta_x: 0.0,
            delta_y: 15.0,
            source: ScrollSource::Wheel,
        };
        let moved = event.with_coords(10.0, 20.0);
        assert_eq!(moved.coords(), Some((10.0, 20.0)));
        assert!(matches!(
            moved,
            MouseEvent::Scroll {
                delta_y,
                source: ScrollSource::Wheel,
                ..
            } if delta_y == 15.0
        ));
        assert_eq!(MouseEvent::Leave.with_coords(1.0, 1.0), MouseEvent::Leave);
    }

    #[test]
    fn test_response_changes() {
        assert!(!EventResponse::Ignored.is_handled());
        assert!(EventResponse::Handled.changes().is_empty());
        assert_eq!(
            EventResponse::Changed(ChangeFlags::NEEDS_PAINT).changes(),
            ChangeFlags::NEEDS_PAINT
        );
    }
}
