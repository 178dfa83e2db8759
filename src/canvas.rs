//! The paint service consumed by redraw tasks.
//!
//! Rasterization itself lives outside this crate. A [`CanvasService`] turns
//! the pixel memory of an attached buffer into a [`Canvas`]; views only ever
//! see a [`DrawContext`], which translates and clips to their bounds.
//! [`SoftwareCanvas`] is a minimal fill-only rasterizer for shm buffers.

use crate::geometry::{Color, Point, Rect, Size};
use crate::pool::PixelFormat;

/// Pixel memory of one buffer, borrowed for the duration of a redraw.
pub struct PixelTarget<'a> {
    pub data: &'a mut [u8],
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
}

pub trait Canvas {
    fn size(&self) -> Size;

    /// Blend `color` over `rect` (buffer coordinates, already clipped).
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Overwrite `rect` with `color`, ignoring what was there.
    fn clear_rect(&mut self, rect: Rect, color: Color);
}

pub trait CanvasService {
    fn draw_into<'a>(&mut self, target: PixelTarget<'a>) -> Box<dyn Canvas + 'a>;
}

/// Passed to `View::on_draw`. Coordinates are local to the view.
pub struct DrawContext<'c> {
    canvas: &'c mut dyn Canvas,
    origin: Point,
    clip: Rect,
    size: Size,
}

impl<'c> DrawContext<'c> {
    /// `bounds` is the view rectangle in buffer coordinates.
    pub fn new(canvas: &'c mut dyn Canvas, bounds: Rect) -> Self {
        let surface = Rect::from_size(canvas.size());
        let clip = bounds.intersection(&surface).unwrap_or_default();
        Self {
            canvas,
            origin: bounds.origin(),
            clip,
            size: bounds.size(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.size)
    }

    fn to_buffer(&self, rect: Rect) -> Option<Rect> {
        rect.offset(self.origin.x, self.origin.y)
            .intersection(&self.clip)
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        if let Some(r) = self.to_buffer(rect) {
            self.canvas.fill_rect(r, color);
        }
    }

    /// Replace the whole view area with `color`.
    pub fn clear(&mut self, color: Color) {
        if let Some(r) = self.to_buffer(self.bounds()) {
            self.canvas.clear_rect(r, color);
        }
    }
}

#[derive(Default)]
pub struct SoftwareCanvasService;

impl CanvasService for SoftwareCanvasService {
    fn draw_into<'a>(&mut self, target: PixelTarget<'a>) -> Box<dyn Canvas + 'a> {
        Box::new(SoftwareCanvas { target })
    }
}

pub struct SoftwareCanvas<'a> {
    target: PixelTarget<'a>,
}

impl SoftwareCanvas<'_> {
    fn for_each_pixel(&mut self, rect: Rect, mut f: impl FnMut(u32) -> u32) {
        let bounds = Rect::from_size(self.size());
        let Some(rect) = rect.intersection(&bounds) else {
            return;
        };
        let bpp = self.target.format.bytes_per_pixel() as usize;
        let stride = self.target.stride as usize;
        for y in rect.y..rect.bottom() {
            let row = y as usize * stride;
            for x in rect.x..rect.right() {
                let at = row + x as usize * bpp;
                let Some(px) = self.target.data.get_mut(at..at + 4) else {
                    return;
                };
                let dst = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
                px.copy_from_slice(&f(dst).to_le_bytes());
            }
        }
    }
}

impl Canvas for SoftwareCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.target.width, self.target.height)
    }

    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let src = color.to_argb8888();
        let inv = 255 - (src >> 24);
        if inv == 0 {
            return self.clear_rect(rect, color);
        }
        self.for_each_pixel(rect, |dst| {
            let mut out = 0;
            for shift in [0, 8, 16, 24] {
                let s = (src >> shift) & 0xFF;
                let d = (dst >> shift) & 0xFF;
                out |= (s + (d * inv + 127) / 255).min(255) << shift;
            }
            out
        });
    }

    fn clear_rect(&mut self, rect: Rect, color: Color) {
        let src = color.to_argb8888();
        self.for_each_pixel(rect, |_| src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(data: &[u8], stride: usize, x: usize, y: usize) -> u32 {
        let at = y * stride + x * 4;
        u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    }

    #[test]
    fn test_draw_context_translates_and_clips() {
        let mut data = vec![0u8; 8 * 4 * 8];
        let mut service = SoftwareCanvasService;
        {
            let mut canvas = service.draw_into(PixelTarget {
                data: &mut data,
                width: 8,
                height: 8,
                stride: 32,
                format: PixelFormat::Argb8888,
            });
            let mut ctx = DrawContext::new(&mut *canvas, Rect::new(2, 2, 3, 3));
            ctx.fill_rect(Rect::new(-5, -5, 100, 100), Color::WHITE);
        }
        assert_eq!(pixel(&data, 32, 1, 1), 0);
        assert_eq!(pixel(&data, 32, 2, 2), 0xFFFF_FFFF);
        assert_eq!(pixel(&data, 32, 4, 4), 0xFFFF_FFFF);
        assert_eq!(pixel(&data, 32, 5, 5), 0);
    }

    #[test]
    fn test_fill_blends_translucent_color() {
        let mut data = vec![0u8; 4];
        let mut service = SoftwareCanvasService;
        {
            let mut canvas = service.draw_into(PixelTarget {
                data: &mut data,
                width: 1,
                height: 1,
                stride: 4,
                format: PixelFormat::Argb8888,
            });
            canvas.clear_rect(Rect::new(0, 0, 1, 1), Color::BLACK);
            canvas.fill_rect(Rect::new(0, 0, 1, 1), Color::rgba(1.0, 1.0, 1.0, 0.5));
        }
        let px = pixel(&data, 4, 0, 0);
        assert_eq!(px >> 24, 0xFF);
        assert_eq!(px & 0xFF, 128);
    }
}
