use crate::canvas::DrawContext;
use crate::geometry::{Rect, Size};
use crate::tree::ViewId;

use super::event::{ChangeFlags, EventResponse, KeyEvent, MouseEvent};

/// A child as seen by its parent's layout hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildInfo {
    pub id: ViewId,
    /// Current geometry, parent-relative.
    pub geometry: Rect,
    pub min_size: Size,
    pub max_size: Size,
    pub visible: bool,
}

/// Handed to [`View::on_layout`]: the view's own size, its children, and the
/// placements the view decides on. Placements are applied after the hook
/// returns, through the regular resize path.
pub struct LayoutContext {
    size: Size,
    children: Vec<ChildInfo>,
    placements: Vec<(ViewId, Rect)>,
}

impl LayoutContext {
    pub(crate) fn new(size: Size, children: Vec<ChildInfo>) -> Self {
        Self {
            size,
            children,
            placements: Vec::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Children in tree order, first child first.
    pub fn children(&self) -> &[ChildInfo] {
        &self.children
    }

    /// Place a child at `rect`. Later placements of the same child win.
    pub fn place(&mut self, child: ViewId, rect: Rect) {
        if !self.children.iter().any(|c| c.id == child) {
            log::warn!("Layout placed view {} which is not a child", child.as_u64());
            return;
        }
        self.placements.retain(|(id, _)| *id != child);
        self.placements.push((child, rect));
    }

    pub(crate) fn into_placements(self) -> Vec<(ViewId, Rect)> {
        self.placements
    }
}

/// Behaviour of one node in the view tree.
///
/// Only `on_draw` is required. Hooks never touch the tree directly; they
/// report what changed through [`ChangeFlags`] and the display schedules the
/// follow-up work.
pub trait View {
    /// The effective size changed from `old` to `new`.
    fn on_resize(&mut self, old: Size, new: Size) -> ChangeFlags {
        let _ = (old, new);
        ChangeFlags::NEEDS_LAYOUT | ChangeFlags::NEEDS_PAINT
    }

    /// Paint into the view's region of its surface. Coordinates are local.
    fn on_draw(&mut self, ctx: &mut DrawContext<'_>);

    fn on_layout(&mut self, ctx: &mut LayoutContext) {
        let _ = ctx;
    }

    fn on_mouse_event(&mut self, event: &MouseEvent) -> EventResponse {
        let _ = event;
        EventResponse::Ignored
    }

    fn on_key_event(&mut self, event: &KeyEvent) -> EventResponse {
        let _ = event;
        EventResponse::Ignored
    }

    fn minimal_size(&self) -> Size {
        Size::zero()
    }

    fn maximal_size(&self) -> Size {
        Size::max()
    }

    /// Views without content are skipped when a subtree is repainted.
    fn has_content(&self) -> bool {
        true
    }

    /// Whether a button press on this view moves keyboard focus to it.
    fn accepts_focus(&self) -> bool {
        false
    }
}
