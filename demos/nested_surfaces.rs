//! A window with a row of panels, one of which lives in its own sub-surface.
//!
//! Clicking the left panel toggles the middle one. A background thread wakes
//! the loop every second to flip the sub-surface between sync and desync mode
//! and nudge it sideways.
//!
//! Run with `RUST_LOG=strata=debug cargo run --example nested_surfaces`.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

use strata::prelude::*;

fn main() -> strata::Result<()> {
    let (tx, rx) = mpsc::channel();
    let mut app = App::new()
        .title("Nested surfaces")
        .app_id("strata.nested_surfaces")
        .width(640)
        .height(360)
        .background_color(Color::from_hex(0x1e1e2e));
    let waker = app.waker()?;

    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_secs(1));
        if tx.send(()).is_err() {
            break;
        }
        waker.wake();
    });

    let toggled = Rc::new(Cell::new(false));
    let toggle = toggled.clone();
    let floating: Rc<Cell<Option<(ViewId, SurfaceId)>>> = Rc::new(Cell::new(None));
    let floating_setup = floating.clone();
    let middle: Rc<Cell<Option<ViewId>>> = Rc::new(Cell::new(None));
    let middle_setup = middle.clone();

    app.on_start(move |display, content| {
        let button = display.create_view(
            Panel::new(Color::from_hex(0x89b4fa))
                .hover_background(Color::from_hex(0xb4befe))
                .min_size(80, 80)
                .on_press(move || toggle.set(true)),
        );
        let middle_view = display.create_view(
            Panel::new(Color::from_hex(0xa6e3a1))
                .hover_background(Color::from_hex(0x94e2d5))
                .min_size(80, 80),
        );
        let overlay = display.create_view(Panel::new(Color::rgba(0.95, 0.55, 0.66, 0.8)).min_size(120, 120));

        for view in [button, middle_view, overlay] {
            display.add_child(content, view)?;
        }
        let surface = display.create_surface_for_view(overlay)?;
        display.set_margin(surface, Insets::all(8))?;

        floating_setup.set(Some((overlay, surface)));
        middle_setup.set(Some(middle_view));
        Ok(())
    })
    .on_update(move |display, _content| {
        if toggled.replace(false) {
            if let Some(view) = middle.get() {
                let visible = display.views().is_visible(view);
                if let Err(err) = display.set_visible(view, !visible) {
                    log::warn!("Cannot toggle view: {}", err);
                }
            }
        }

        let ticks = rx.try_iter().count();
        if ticks == 0 {
            return;
        }
        let Some((view, surface)) = floating.get() else {
            return;
        };
        let mode = match display.surfaces().sync_mode(surface) {
            Some(SyncMode::Sync) => SyncMode::Desync,
            _ => SyncMode::Sync,
        };
        display.set_sync_mode(surface, mode);

        if let Some(geometry) = display.views().geometry(view) {
            let x = (geometry.x + 20 * ticks as i32) % 400;
            if let Err(err) = display.move_view(view, x, geometry.y) {
                log::warn!("Cannot move view: {}", err);
            }
        }
    })
    .run(Linear::row().spacing(16).padding(Insets::all(16)))
}
