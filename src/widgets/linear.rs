use crate::canvas::DrawContext;
use crate::geometry::{Color, Insets, Rect, Size};

use super::event::ChangeFlags;
use super::view::{LayoutContext, View};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossAxisAlignment {
    Start,
    Center,
    End,
    Stretch,
}

/// Places its visible children in a row or column, sharing the main axis
/// equally within each child's size bounds.
pub struct Linear {
    axis: Axis,
    spacing: u32,
    padding: Insets,
    cross_axis_alignment: CrossAxisAlignment,
    background: Option<Color>,
}

impl Linear {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            spacing: 0,
            padding: Insets::default(),
            cross_axis_alignment: CrossAxisAlignment::Stretch,
            background: None,
        }
    }

    pub fn row() -> Self {
        Self::new(Axis::Horizontal)
    }

    pub fn column() -> Self {
        Self::new(Axis::Vertical)
    }

    pub fn spacing(mut self, spacing: u32) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn padding(mut self, padding: Insets) -> Self {
        self.padding = padding;
        self
    }

    pub fn cross_axis_alignment(mut self, alignment: CrossAxisAlignment) -> Self {
        self.cross_axis_alignment = alignment;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = Some(color);
        self
    }

    fn main(&self, size: Size) -> u32 {
        match self.axis {
            Axis::Horizontal => size.width,
            Axis::Vertical => size.height,
        }
    }

    fn cross(&self, size: Size) -> u32 {
        match self.axis {
            Axis::Horizontal => size.height,
            Axis::Vertical => size.width,
        }
    }

    fn rect(&self, main_pos: i32, cross_pos: i32, main: u32, cross: u32) -> Rect {
        match self.axis {
            Axis::Horizontal => Rect::new(main_pos, cross_pos, main, cross),
            Axis::Vertical => Rect::new(cross_pos, main_pos, cross, main),
        }
    }
}

impl View for Linear {
    fn on_resize(&mut self, _old: Size, _new: Size) -> ChangeFlags {
        let mut flags = ChangeFlags::NEEDS_LAYOUT;
        if self.background.is_some() {
            flags |= ChangeFlags::NEEDS_PAINT;
        }
        flags
    }

    fn on_draw(&mut self, ctx: &mut DrawContext<'_>) {
        if let Some(color) = self.background {
            ctx.clear(color);
        }
    }

    fn on_layout(&mut self, ctx: &mut LayoutContext) {
        let visible: Vec<_> = ctx.children().iter().filter(|c| c.visible).copied().collect();
        if visible.is_empty() {
            return;
        }

        let size = ctx.size();
        let (pad_main_start, pad_main, pad_cross_start, pad_cross) = match self.axis {
            Axis::Horizontal => (
                self.padding.left,
                self.padding.horizontal(),
                self.padding.top,
                self.padding.vertical(),
            ),
            Axis::Vertical => (
                self.padding.top,
                self.padding.vertical(),
                self.padding.left,
                self.padding.horizontal(),
            ),
        };
        let gaps = self.spacing.saturating_mul(visible.len() as u32 - 1);
        let available_main = self
            .main(size)
            .saturating_sub(pad_main.max(0) as u32)
            .saturating_sub(gaps);
        let available_cross = self.cross(size).saturating_sub(pad_cross.max(0) as u32);
        let share = available_main / visible.len() as u32;

        let mut cursor = pad_main_start;
        for child in visible {
            let main = share.clamp(
                self.main(child.min_size),
                self.main(child.max_size).max(self.main(child.min_size)),
            );
            let min_cross = self.cross(child.min_size);
            let max_cross = self.cross(child.max_size).max(min_cross);
            let cross = match self.cross_axis_alignment {
                CrossAxisAlignment::Stretch => available_cross.clamp(min_cross, max_cross),
                _ => min_cross,
            };
            let slack = available_cross.saturating_sub(cross) as i32;
            let cross_pos = pad_cross_start
                + match self.cross_axis_alignment {
                    CrossAxisAlignment::Start | CrossAxisAlignment::Stretch => 0,
                    CrossAxisAlignment::Center => slack / 2,
                    CrossAxisAlignment::End => slack,
                };

            ctx.place(child.id, self.rect(cursor, cross_pos, main, cross));
            cursor += main as i32 + self.spacing as i32;
        }
    }

    fn has_content(&self) -> bool {
        self.background.is_some()
    }
}
