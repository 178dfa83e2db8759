use crate::canvas::DrawContext;
use crate::geometry::{Color, Size};

use super::event::{ChangeFlags, EventResponse, MouseButton, MouseEvent};
use super::view::View;

/// A solid rectangle, optionally reacting to hover and presses.
pub struct Panel {
    background: Color,
    hover_background: Option<Color>,
    min_size: Size,
    max_size: Size,
    focusable: bool,
    hovered: bool,
    on_press: Option<Box<dyn FnMut()>>,
}

impl Panel {
    pub fn new(background: Color) -> Self {
        Self {
            background,
            hover_background: None,
            min_size: Size::zero(),
            max_size: Size::max(),
            focusable: false,
            hovered: false,
            on_press: None,
        }
    }

    pub fn hover_background(mut self, color: Color) -> Self {
        self.hover_background = Some(color);
        self
    }

    pub fn min_size(mut self, width: u32, height: u32) -> Self {
        self.min_size = Size::new(width, height);
        self
    }

    pub fn max_size(mut self, width: u32, height: u32) -> Self {
        self.max_size = Size::new(width, height);
        self
    }

    pub fn focusable(mut self, focusable: bool) -> Self {
        self.focusable = focusable;
        self
    }

    /// Called on a left button release over the panel.
    pub fn on_press(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_press = Some(Box::new(callback));
        self
    }

    pub fn is_hovered(&self) -> bool {
        self.hovered
    }

    fn current_background(&self) -> Color {
        match (self.hovered, self.hover_background) {
            (true, Some(color)) => color,
            _ => self.background,
        }
    }

    fn set_hovered(&mut self, hovered: bool) -> EventResponse {
        if self.hovered == hovered {
            return EventResponse::Handled;
        }
        self.hovered = hovered;
        if self.hover_background.is_some() {
            EventResponse::Changed(ChangeFlags::NEEDS_PAINT)
        } else {
            EventResponse::Handled
        }
    }
}

impl View for Panel {
    fn on_resize(&mut self, _old: Size, _new: Size) -> ChangeFlags {
        ChangeFlags::NEEDS_PAINT
    }

    fn on_draw(&mut self, ctx: &mut DrawContext<'_>) {
        ctx.clear(self.current_background());
    }

    fn on_mouse_event(&mut self, event: &MouseEvent) -> EventResponse {
        match event {
            MouseEvent::Enter { .. } => self.set_hovered(true),
            MouseEvent::Leave => self.set_hovered(false),
            MouseEvent::Up {
                button: MouseButton::Left,
                ..
            } => match self.on_press.as_mut() {
                Some(callback) => {
                    callback();
                    EventResponse::Handled
                }
                None => EventResponse::Ignored,
            },
            MouseEvent::Down {
                button: MouseButton::Left,
                ..
            } if self.on_press.is_some() => EventResponse::Handled,
            _ => EventResponse::Ignored,
        }
    }

    fn minimal_size(&self) -> Size {
        self.min_size
    }

    fn maximal_size(&self) -> Size {
        self.max_size
    }

    fn has_content(&self) -> bool {
        self.background.a > 0.0 || self.hover_background.is_some()
    }

    fn accepts_focus(&self) -> bool {
        self.focusable
    }
}
