//! View/surface composition and redraw scheduling for Wayland clients.
//!
//! Views form a tree; some of them own a compositor surface, the rest draw
//! into their nearest ancestor's. Mutations queue layout, redraw and commit
//! tasks on the [`Display`], and the event loop runs them once per iteration
//! with [`Display::flush_once`].

pub mod canvas;
pub mod compositor;
pub mod display;
pub mod error;
pub mod geometry;
pub mod pool;
pub mod surface;
pub mod task;
pub mod tree;
pub mod widgets;

// These modules are public for advanced use cases
pub mod platform;

use std::time::Duration;

use calloop::ping::{make_ping, Ping};
use calloop::EventLoop;
use calloop_wayland_source::WaylandSource;
use wayland_client::{globals::registry_queue_init, Connection};

use compositor::ToplevelConfig;
use geometry::Color;
use platform::{WaylandCompositor, WaylandState};
use pool::PixelFormat;
use tree::ViewId;
use widgets::{CrossAxisAlignment, Linear, View};

pub use display::{Display, FlushStats};
pub use error::{Error, Result};

pub mod prelude {
    pub use crate::canvas::DrawContext;
    pub use crate::compositor::{StackPosition, SyncMode};
    pub use crate::display::{Display, FlushStats};
    pub use crate::geometry::{Color, Insets, Point, Rect, Size};
    pub use crate::platform::WaylandCompositor;
    pub use crate::surface::SurfaceId;
    pub use crate::tree::ViewId;
    pub use crate::widgets::{
        Axis, ChangeFlags, ChildInfo, CrossAxisAlignment, EventResponse, Key, KeyEvent,
        LayoutContext, Linear, MouseButton, MouseEvent, Panel, View,
    };
    pub use crate::{App, Waker, WindowConfig};
}

pub struct WindowConfig {
    pub title: String,
    pub app_id: String,
    pub width: u32,
    pub height: u32,
    pub min_size: Option<(u32, u32)>,
    pub max_size: Option<(u32, u32)>,
    pub background_color: Color,
    pub pixel_format: PixelFormat,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "strata".to_string(),
            app_id: "strata".to_string(),
            width: 800,
            height: 600,
            min_size: None,
            max_size: None,
            background_color: Color::rgb(0.1, 0.1, 0.15),
            pixel_format: PixelFormat::Argb8888,
        }
    }
}

impl WindowConfig {
    fn toplevel(&self) -> ToplevelConfig {
        ToplevelConfig {
            title: self.title.clone(),
            app_id: self.app_id.clone(),
            min_size: self.min_size,
            max_size: self.max_size,
        }
    }
}

/// Wakes the event loop from another thread.
///
/// Only wakes it: state changes still belong in the `on_update` callback,
/// which runs on the loop thread after every wakeup.
#[derive(Clone)]
pub struct Waker {
    ping: Ping,
}

impl Waker {
    pub fn wake(&self) {
        self.ping.ping();
    }
}

/// Called on the loop thread with the display and the content view, once
/// per loop iteration before the flush.
pub type UpdateCallback = Box<dyn FnMut(&mut Display<WaylandCompositor>, ViewId)>;

/// Called once after the window is presented, to build the initial tree.
pub type StartCallback = Box<dyn FnOnce(&mut Display<WaylandCompositor>, ViewId) -> Result<()>>;

pub struct App {
    config: WindowConfig,
    on_start: Option<StartCallback>,
    on_update: Option<UpdateCallback>,
    ping: Option<(Ping, calloop::ping::PingSource)>,
}

impl App {
    pub fn new() -> Self {
        Self::with_config(WindowConfig::default())
    }

    pub fn with_config(config: WindowConfig) -> Self {
        Self {
            config,
            on_start: None,
            on_update: None,
            ping: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.app_id = app_id.into();
        self
    }

    pub fn width(mut self, width: u32) -> Self {
        self.config.width = width;
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.config.height = height;
        self
    }

    pub fn min_size(mut self, width: u32, height: u32) -> Self {
        self.config.min_size = Some((width, height));
        self
    }

    pub fn max_size(mut self, width: u32, height: u32) -> Self {
        self.config.max_size = Some((width, height));
        self
    }

    pub fn background_color(mut self, color: Color) -> Self {
        self.config.background_color = color;
        self
    }

    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.config.pixel_format = format;
        self
    }

    /// Set a callback that runs once the window exists, with the content
    /// view passed to [`App::run`]. Use it to build child views and
    /// sub-surfaces.
    pub fn on_start<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&mut Display<WaylandCompositor>, ViewId) -> Result<()> + 'static,
    {
        self.on_start = Some(Box::new(callback));
        self
    }

    /// Set a callback that gets called each loop iteration before the flush.
    /// Use this to process external events (like channel messages from
    /// background threads) and mutate views.
    ///
    /// # Example
    /// ```ignore
    /// let (tx, rx) = std::sync::mpsc::channel();
    /// let mut app = App::new();
    /// let waker = app.waker()?;
    ///
    /// std::thread::spawn(move || loop {
    ///     std::thread::sleep(Duration::from_secs(1));
    ///     tx.send(()).ok();
    ///     waker.wake();
    /// });
    ///
    /// app.on_update(move |display, content| {
    ///     while rx.try_recv().is_ok() {
    ///         display.request_redraw(content);
    ///     }
    /// })
    /// .run(view)?;
    /// ```
    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut Display<WaylandCompositor>, ViewId) + 'static,
    {
        self.on_update = Some(Box::new(callback));
        self
    }

    /// A handle other threads can use to wake the loop.
    pub fn waker(&mut self) -> Result<Waker> {
        let (ping, source) = match self.ping.take() {
            Some(pair) => pair,
            None => make_ping()?,
        };
        self.ping = Some((ping.clone(), source));
        Ok(Waker { ping })
    }

    /// Open the window with `content` filling it and run until it is closed.
    pub fn run(mut self, content: impl View + 'static) -> Result<()> {
        env_logger::init();

        let connection = Connection::connect_to_env()?;
        let (globals, event_queue) = registry_queue_init::<WaylandState>(&connection)?;
        let qh = event_queue.handle();

        let mut event_loop: EventLoop<WaylandState> = EventLoop::try_new()?;
        WaylandSource::new(connection.clone(), event_queue)
            .insert(event_loop.handle())
            .map_err(|e| Error::EventLoop(e.error))?;

        if let Some((_, ping_source)) = self.ping.take() {
            event_loop
                .handle()
                .insert_source(ping_source, |_, _, _| {})
                .map_err(|e| Error::EventLoop(e.error))?;
        }

        let mut state = WaylandState::new(&globals, &qh)?;
        let display = &mut state.display;
        display.set_pixel_format(self.config.pixel_format);

        let root = display.create_view(
            Linear::column()
                .cross_axis_alignment(CrossAxisAlignment::Stretch)
                .background(self.config.background_color),
        );
        let content = display.create_view(content);
        display.add_child(root, content)?;
        display.resize_view(root, self.config.width, self.config.height)?;
        display.present(root, &self.config.toplevel())?;

        if let Some(on_start) = self.on_start.take() {
            on_start(display, content)?;
        }

        loop {
            let stats = state.display.flush_once();
            if stats.failures > 0 {
                log::warn!("{} tasks failed in the last flush", stats.failures);
            }
            connection.flush()?;

            // Block until the compositor or a waker has something for us,
            // unless work is already queued for the next flush.
            let timeout = state.display.has_pending_work().then_some(Duration::ZERO);
            event_loop.dispatch(timeout, &mut state)?;

            if let Some(ref mut callback) = self.on_update {
                callback(&mut state.display, content);
            }
            state.process_events();

            if state.exit {
                log::info!("Window closed, leaving event loop");
                break;
            }
        }
        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
