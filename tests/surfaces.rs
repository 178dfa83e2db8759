use strata::compositor::{
    RecordingCompositor, Request, StackPosition, SurfaceHandle, SyncMode, ToplevelConfig,
};
use strata::geometry::{Color, Size};
use strata::surface::SurfaceId;
use strata::tree::ViewId;
use strata::widgets::Panel;
use strata::{Display, Error};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
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

fn handle(display: &Display<RecordingCompositor>, surface: SurfaceId) -> SurfaceHandle {
    display.surfaces().handle(surface).unwrap()
}

fn window(width: u32, height: u32) -> (Display<RecordingCompositor>, ViewId, SurfaceId) {
    init_logger();
    let mut display = Display::new(RecordingCompositor::new());
    let root = display.create_view(Panel::new(Color::BLACK));
    display.resize_view(root, width, height).unwrap();
    let surface = display.present(root, &ToplevelConfig::default()).unwrap();
    settle(&mut display);
    (display, root, surface)
}

/// A window with one child view drawing into its own sub-surface.
fn window_with_subsurface() -> (Display<RecordingCompositor>, SurfaceId, ViewId, SurfaceId) {
    let (mut display, root, surface) = window(300, 200);
    let child = display.create_view(Panel::new(Color::WHITE).min_size(50, 40));
    display.add_child(root, child).unwrap();
    display.move_view(child, 30, 20).unwrap();
    let child_surface = display.create_surface_for_view(child).unwrap();
    settle(&mut display);
    display.compositor_mut().take_requests();
    (display, surface, child, child_surface)
}

#[test]
fn test_window_resize_regrows_pool_before_carving() {
    let (mut display, _root, surface) = window(800, 600);
    let pool_id = display.surfaces().pool(surface).unwrap();
    let old_generation = {
        let pool = display.pool(pool_id).unwrap();
        assert_eq!(pool.size(), 800 * 4 * 600);
        pool.generation()
    };
    let old_buffer = display.surfaces().committed_buffer(surface).unwrap();

    display
        .resize_window(handle(&display, surface), 1920, 1080)
        .unwrap();

    let pool = display.pool(pool_id).unwrap();
    assert!(pool.size() >= 1920 * 4 * 1080);
    assert_ne!(pool.generation(), old_generation);
    assert!(!pool.is_current(&old_buffer));
    let pending = display.surfaces().buffer(surface).unwrap();
    assert!(pool.is_current(&pending));
    assert_eq!(pending.size(), Size::new(1920, 1080));

    let stats = display.flush_once();
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.redraws, 1);
    assert_eq!(
        display.surfaces().committed_buffer(surface).map(|b| b.size()),
        Some(Size::new(1920, 1080))
    );
}

#[test]
fn test_shrinking_window_reuses_pool() {
    let (mut display, _root, surface) = window(400, 300);
    let pool_id = display.surfaces().pool(surface).unwrap();
    let generation = display.pool(pool_id).unwrap().generation();

    display
        .resize_window(handle(&display, surface), 200, 100)
        .unwrap();
    settle(&mut display);

    assert_eq!(display.pool(pool_id).unwrap().generation(), generation);
    assert_eq!(
        display.surfaces().committed_buffer(surface).map(|b| b.size()),
        Some(Size::new(200, 100))
    );
}

#[test]
fn test_sync_child_commits_parent_first() {
    let (mut display, window_surface, child, child_surface) = window_with_subsurface();
    let window = handle(&display, window_surface);
    let sub = handle(&display, child_surface);

    display.request_redraw(child);
    let stats = display.flush_once();

    assert_eq!(stats.failures, 0);
    // The parent's second commit applies the child's cached state.
    assert_eq!(display.compositor().commits(), vec![window, sub, window]);
}

#[test]
fn test_desync_child_commits_alone() {
    let (mut display, _window_surface, child, child_surface) = window_with_subsurface();
    let sub = handle(&display, child_surface);
    display.set_sync_mode(child_surface, SyncMode::Desync);

    display.request_redraw(child);
    display.flush_once();

    assert_eq!(display.compositor().commits(), vec![sub]);
    assert!(display
        .compositor()
        .requests()
        .contains(&Request::SetSyncMode {
            handle: sub,
            mode: SyncMode::Desync
        }));
}

#[test]
fn test_subsurface_positioned_in_parent() {
    let (mut display, window_surface, child, child_surface) = window_with_subsurface();
    let sub = handle(&display, child_surface);
    assert_eq!(
        display.surfaces().position(child_surface),
        Some(strata::geometry::Point::new(30, 20))
    );

    display.move_view(child, 60, 20).unwrap();
    settle(&mut display);

    let requests = display.compositor().requests();
    let moved = requests
        .iter()
        .position(|r| *r == Request::SetPosition { handle: sub, x: 60, y: 20 })
        .unwrap();
    let parent_commit = requests
        .iter()
        .rposition(|r| *r == Request::Commit(handle(&display, window_surface)))
        .unwrap();
    assert!(moved < parent_commit);
}

#[test]
fn test_restack_requires_subsurface() {
    let (mut display, window_surface, _child, child_surface) = window_with_subsurface();
    let sub = handle(&display, child_surface);
    let window = handle(&display, window_surface);

    assert!(display
        .restack(window_surface, StackPosition::Top)
        .is_err());
    // The only sub-surface goes to the bottom by sitting right above its parent.
    display.restack(child_surface, StackPosition::Bottom).unwrap();
    assert!(display.compositor().requests().contains(&Request::Place {
        handle: sub,
        sibling: window,
        above: true
    }));
    assert!(display.has_pending_work());
}

#[test]
fn test_destroying_owner_destroys_subsurface() {
    let (mut display, _window_surface, child, child_surface) = window_with_subsurface();
    let sub = handle(&display, child_surface);
    let pool = display.surfaces().pool(child_surface).unwrap();

    display.destroy_view(child).unwrap();
    settle(&mut display);

    assert!(!display.surfaces().contains(child_surface));
    assert!(display.pool(pool).is_none());
    assert!(display
        .compositor()
        .requests()
        .contains(&Request::Destroy(sub)));
    assert!(!display.compositor().commits().contains(&sub));
}

#[test]
fn test_hidden_subsurface_detaches_content() {
    let (mut display, _window_surface, child, child_surface) = window_with_subsurface();
    let sub = handle(&display, child_surface);

    display.set_visible(child, false).unwrap();
    settle(&mut display);

    assert_eq!(display.surfaces().committed_buffer(child_surface), None);
    assert!(display.compositor().requests().contains(&Request::Attach {
        handle: sub,
        buffer: None,
        x: 0,
        y: 0
    }));
}

#[test]
fn test_nested_subsurface_cannot_move_to_other_window() {
    let (mut display, a, a_surface) = window(300, 200);
    let b = display.create_view(Panel::new(Color::BLACK));
    display.resize_view(b, 300, 200).unwrap();
    display.present(b, &ToplevelConfig::default()).unwrap();

    let group = display.create_view(Panel::new(Color::WHITE));
    let leaf = display.create_view(Panel::new(Color::WHITE).min_size(20, 20));
    display.add_child(a, group).unwrap();
    display.add_child(group, leaf).unwrap();
    let leaf_surface = display.create_surface_for_view(leaf).unwrap();
    settle(&mut display);

    assert_eq!(display.remove_child(a, group), Some(group));
    assert!(matches!(
        display.add_child(b, group),
        Err(Error::InvalidHierarchy(_))
    ));
    assert_eq!(display.views().parent(group), None);
    assert_eq!(display.surfaces().parent(leaf_surface), Some(a_surface));

    display.add_child(a, group).unwrap();
    assert_eq!(display.views().parent(group), Some(a));
    settle(&mut display);
}

#[test]
fn test_oversized_buffer_is_refused() {
    let (mut display, root, surface) = window(300, 200);

    display.resize_view(root, 0x4000_0000, 1).unwrap();
    assert_eq!(display.surfaces().buffer(surface), None);
    let stats = display.flush_once();
    assert_eq!(stats.failures, 0);
    settle(&mut display);

    display.resize_view(root, 300, 200).unwrap();
    assert_eq!(
        display.surfaces().buffer(surface).map(|b| b.size()),
        Some(Size::new(300, 200))
    );
    settle(&mut display);
    assert_eq!(
        display.surfaces().committed_buffer(surface).map(|b| b.size()),
        Some(Size::new(300, 200))
    );
}
