use std::cell::Cell;
use std::rc::Rc;

use strata::canvas::DrawContext;
use strata::compositor::{RecordingCompositor, SurfaceHandle, ToplevelConfig};
use strata::geometry::{Color, Size};
use strata::task::{Queue, TaskKind};
use strata::widgets::{Linear, View};
use strata::{Display, Error, FlushStats};

struct Counting {
    draws: Rc<Cell<usize>>,
}

impl View for Counting {
    fn on_draw(&mut self, ctx: &mut DrawContext<'_>) {
        self.draws.set(self.draws.get() + 1);
        ctx.clear(Color::WHITE);
    }
}

fn counting(display: &mut Display<RecordingCompositor>) -> (strata::tree::ViewId, Rc<Cell<usize>>) {
    let draws = Rc::new(Cell::new(0));
    let id = display.create_view(Counting {
        draws: draws.clone(),
    });
    (id, draws)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn window_handle(display: &Display<RecordingCompositor>, window: strata::tree::ViewId) -> SurfaceHandle {
    let surface = display.views().own_surface(window).unwrap();
    display.surfaces().handle(surface).unwrap()
}

fn settle(display: &mut Display<RecordingCompositor>) {
    for _ in 0..8 {
        if !display.has_pending_work() {
            return;
        }
        display.flush_once();
    }
    panic!("display did not settle");
}

struct Fixture {
    display: Display<RecordingCompositor>,
    window: strata::tree::ViewId,
    window_draws: Rc<Cell<usize>>,
    layout: strata::tree::ViewId,
    button: strata::tree::ViewId,
    button_draws: Rc<Cell<usize>>,
}

/// window -> column layout -> button, presented and flushed.
fn three_levels() -> Fixture {
    init_logger();
    let mut display = Display::new(RecordingCompositor::new());
    let (window, window_draws) = counting(&mut display);
    let layout = display.create_view(Linear::column());
    let (button, button_draws) = counting(&mut display);

    display.add_child(window, layout).unwrap();
    display.add_child(layout, button).unwrap();
    display.resize_view(window, 200, 100).unwrap();
    display.resize_view(layout, 200, 100).unwrap();
    display.present(window, &ToplevelConfig::default()).unwrap();
    settle(&mut display);

    assert_eq!(display.views().size(button), Some(Size::new(200, 100)));
    window_draws.set(0);
    button_draws.set(0);
    display.compositor_mut().take_requests();

    Fixture {
        display,
        window,
        window_draws,
        layout,
        button,
        button_draws,
    }
}

#[test]
fn test_button_redraw_commits_window_once() {
    let mut f = three_levels();

    f.display.request_redraw(f.button);
    let stats = f.display.flush_once();

    assert_eq!(
        stats,
        FlushStats {
            layouts: 0,
            redraws: 1,
            commits: 1,
            failures: 0
        }
    );
    assert_eq!(f.button_draws.get(), 1);
    assert_eq!(f.window_draws.get(), 0);
    let handle = window_handle(&f.display, f.window);
    assert_eq!(f.display.compositor().commit_count(handle), 1);
    assert!(!f.display.has_pending_work());
}

#[test]
fn test_destroyed_view_is_not_drawn() {
    let mut f = three_levels();

    f.display.request_redraw(f.button);
    f.display.destroy_view(f.button).unwrap();
    let stats = f.display.flush_once();

    assert_eq!(f.button_draws.get(), 0);
    assert_eq!(stats.failures, 0);
    assert!(!f.display.views().contains(f.button));
    assert!(f.display.views().children(f.layout).is_empty());
}

#[test]
fn test_repeated_requests_queue_once() {
    let mut f = three_levels();

    f.display.request_redraw(f.button);
    f.display.request_redraw(f.button);
    f.display.request_layout(f.layout);
    f.display.request_layout(f.layout);
    assert_eq!(
        f.display.tasks().pending(Queue::Idle),
        vec![TaskKind::Redraw(f.button), TaskKind::Layout(f.layout)]
    );

    let surface = f.display.views().own_surface(f.window).unwrap();
    f.display.commit_surface(surface);
    f.display.commit_surface(surface);
    assert_eq!(f.display.tasks().len(Queue::Commit), 1);

    let stats = f.display.flush_once();
    assert_eq!(stats.redraws, 1);
    assert_eq!(stats.commits, 1);
    assert_eq!(f.button_draws.get(), 1);
}

#[test]
fn test_parent_drawn_before_queued_child() {
    let mut f = three_levels();

    f.display.request_redraw(f.window);
    f.display.request_redraw(f.button);
    let stats = f.display.flush_once();

    // The window's redraw paints the whole surface, button included.
    assert_eq!(stats.redraws, 1);
    assert_eq!(f.window_draws.get(), 1);
    assert_eq!(f.button_draws.get(), 1);
}

#[test]
fn test_hierarchy_errors_leave_tree_intact() {
    let mut f = three_levels();

    assert!(matches!(
        f.display.add_child(f.window, f.button),
        Err(Error::InvalidHierarchy(_))
    ));
    assert!(matches!(
        f.display.add_child(f.button, f.window),
        Err(Error::InvalidHierarchy(_))
    ));
    assert_eq!(f.display.views().parent(f.button), Some(f.layout));
    assert_eq!(f.display.views().children(f.layout), vec![f.button]);
}

#[test]
fn test_detached_view_redraw_is_noop() {
    init_logger();
    let mut display = Display::new(RecordingCompositor::new());
    let (view, draws) = counting(&mut display);

    display.request_redraw(view);
    let stats = display.flush_once();

    assert!(stats.is_empty());
    assert_eq!(draws.get(), 0);
    assert!(display.compositor().requests().is_empty());
}
