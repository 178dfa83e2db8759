//! Wayland implementation of the compositor service.
//!
//! [`WaylandCompositor`] maps [`SurfaceHandle`]s onto `wl_surface`s (with an
//! `xdg_toplevel` or `wl_subsurface` role) and keeps one `wl_shm_pool` per
//! [`BufferPool`]. [`WaylandState`] carries the smithay-client-toolkit
//! handlers; they translate protocol events into [`PlatformEvent`]s which
//! the event loop routes into the [`Display`].

use std::collections::HashMap;

use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_keyboard, delegate_output, delegate_pointer, delegate_registry,
    delegate_seat, delegate_shm, delegate_subcompositor, delegate_xdg_shell, delegate_xdg_window,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        keyboard::{KeyEvent as WlKeyEvent, KeyboardHandler, Keysym, Modifiers as WlModifiers, RawModifiers},
        pointer::{AxisScroll, PointerEvent, PointerEventKind, PointerHandler},
        Capability, SeatHandler, SeatState,
    },
    shell::{
        xdg::{
            window::{Window, WindowConfigure, WindowDecorations, WindowHandler},
            XdgShell,
        },
        WaylandSurface,
    },
    shm::{Shm, ShmHandler},
    subcompositor::SubcompositorState,
};
use wayland_client::{
    backend::ObjectId,
    delegate_noop,
    globals::GlobalList,
    protocol::{
        wl_buffer::{self, WlBuffer},
        wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm,
        wl_shm_pool::WlShmPool, wl_subsurface::WlSubsurface, wl_surface::WlSurface,
    },
    Connection, Dispatch, Proxy, QueueHandle,
};

use crate::compositor::{
    BufferAttachment, Compositor, OutputId, SurfaceHandle, SyncMode, ToplevelConfig,
};
use crate::display::Display;
use crate::error::Result;
use crate::geometry::Rect;
use crate::pool::{Buffer, BufferPool, PixelFormat, PoolId};
use crate::widgets::{Key, KeyEvent, Modifiers, MouseButton, MouseEvent, ScrollSource};

/// Pixels per line for discrete scroll (mouse wheel)
const SCROLL_PIXELS_PER_LINE: f32 = 40.0;

/// Protocol input translated for the display, addressed by surface handle.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// The compositor configured a toplevel. `None` leaves the size to us.
    Configure {
        surface: SurfaceHandle,
        width: Option<u32>,
        height: Option<u32>,
    },
    Close(SurfaceHandle),
    Pointer {
        surface: SurfaceHandle,
        event: MouseEvent,
    },
    Key(KeyEvent),
    EnterOutput {
        surface: SurfaceHandle,
        output: OutputId,
    },
    LeaveOutput {
        surface: SurfaceHandle,
        output: OutputId,
    },
    /// The server finished reading a buffer.
    BufferReleased,
}

struct SurfaceEntry {
    surface: WlSurface,
    subsurface: Option<WlSubsurface>,
    /// Owns the surface when set; dropping it destroys both.
    window: Option<Window>,
    /// Toplevels must not attach or commit content before their first configure.
    configured: bool,
}

type BufferKey = (usize, u32, u32, u32, PixelFormat);

/// User data of every `wl_buffer`, used to find it again on release.
#[derive(Debug, Clone, Copy)]
pub struct BufferData {
    pool: PoolId,
    generation: u32,
    key: BufferKey,
}

struct ShmBuffer {
    buffer: WlBuffer,
    /// Attached since the last release event.
    busy: bool,
}

struct ShmPoolEntry {
    pool: WlShmPool,
    size: usize,
    generation: u32,
    buffers: HashMap<BufferKey, ShmBuffer>,
}

impl ShmPoolEntry {
    fn release_buffers(&mut self) {
        for (_, entry) in self.buffers.drain() {
            entry.buffer.destroy();
        }
    }
}

fn buffer_key(buffer: &Buffer) -> BufferKey {
    (
        buffer.offset(),
        buffer.width(),
        buffer.height(),
        buffer.stride(),
        buffer.format(),
    )
}

pub struct WaylandCompositor {
    qh: QueueHandle<WaylandState>,
    compositor: CompositorState,
    subcompositor: SubcompositorState,
    xdg_shell: XdgShell,
    wl_shm: wl_shm::WlShm,
    next_handle: u32,
    surfaces: HashMap<SurfaceHandle, SurfaceEntry>,
    by_object: HashMap<ObjectId, SurfaceHandle>,
    pools: HashMap<PoolId, ShmPoolEntry>,
}

impl WaylandCompositor {
    /// The handle of a `wl_surface` created by this compositor.
    pub fn handle_for(&self, surface: &WlSurface) -> Option<SurfaceHandle> {
        self.by_object.get(&surface.id()).copied()
    }

    fn mark_configured(&mut self, surface: &WlSurface) -> Option<SurfaceHandle> {
        let handle = self.handle_for(surface)?;
        if let Some(entry) = self.surfaces.get_mut(&handle) {
            entry.configured = true;
        }
        Some(handle)
    }

    fn register(
        &mut self,
        surface: WlSurface,
        subsurface: Option<WlSubsurface>,
        window: Option<Window>,
    ) -> SurfaceHandle {
        self.next_handle += 1;
        let handle = SurfaceHandle::from_raw(self.next_handle);
        self.by_object.insert(surface.id(), handle);
        let configured = window.is_none();
        self.surfaces.insert(
            handle,
            SurfaceEntry {
                surface,
                subsurface,
                window,
                configured,
            },
        );
        handle
    }

    /// Surface ready to take content, or `None` before its first configure.
    fn ready(&self, handle: SurfaceHandle) -> Option<&WlSurface> {
        let entry = self.surfaces.get(&handle)?;
        if !entry.configured {
            log::trace!("Surface {} not configured yet", handle.raw());
            return None;
        }
        Some(&entry.surface)
    }

    fn subsurface(&self, handle: SurfaceHandle) -> Option<&WlSubsurface> {
        self.surfaces.get(&handle)?.subsurface.as_ref()
    }

    fn mark_released(&mut self, data: &BufferData) {
        let Some(entry) = self.pools.get_mut(&data.pool) else {
            return;
        };
        if entry.generation != data.generation {
            return;
        }
        if let Some(buffer) = entry.buffers.get_mut(&data.key) {
            buffer.busy = false;
        }
    }

    /// The `wl_buffer` for an attachment, creating or regrowing the
    /// compositor-side pool as needed.
    fn wl_buffer(&mut self, attachment: BufferAttachment<'_>) -> Option<WlBuffer> {
        let pool: &BufferPool = attachment.pool;
        let buffer = attachment.buffer;
        let fd = pool.fd()?;
        let size = i32::try_from(pool.size()).ok()?;

        let outdated = self
            .pools
            .get(&pool.id())
            .is_some_and(|e| e.generation != pool.generation());
        if outdated {
            if let Some(entry) = self.pools.get_mut(&pool.id()) {
                entry.release_buffers();
                if pool.size() >= entry.size {
                    // wl_shm_pool can only grow.
                    entry.pool.resize(size);
                    entry.size = pool.size();
                    entry.generation = pool.generation();
                } else {
                    entry.pool.destroy();
                    self.pools.remove(&pool.id());
                }
            }
        }

        let entry = self.pools.entry(pool.id()).or_insert_with(|| {
            log::debug!("Creating wl_shm_pool for pool {} ({} bytes)", pool.id().raw(), size);
            ShmPoolEntry {
                pool: self.wl_shm.create_pool(fd, size, &self.qh, ()),
                size: pool.size(),
                generation: pool.generation(),
                buffers: HashMap::new(),
            }
        });

        let ShmPoolEntry {
            pool: wl_pool,
            buffers,
            generation,
            ..
        } = entry;
        let key = buffer_key(&buffer);
        let data = BufferData {
            pool: pool.id(),
            generation: *generation,
            key,
        };
        let qh = &self.qh;
        let shm_buffer = buffers.entry(key).or_insert_with(|| ShmBuffer {
            buffer: wl_pool.create_buffer(
                buffer.offset() as i32,
                buffer.width() as i32,
                buffer.height() as i32,
                buffer.stride() as i32,
                shm_format(buffer.format()),
                qh,
                data,
            ),
            busy: false,
        });
        shm_buffer.busy = true;
        Some(shm_buffer.buffer.clone())
    }
}

fn shm_format(format: PixelFormat) -> wl_shm::Format {
    match format {
        PixelFormat::Argb8888 => wl_shm::Format::Argb8888,
        PixelFormat::Xrgb8888 => wl_shm::Format::Xrgb8888,
    }
}

impl Compositor for WaylandCompositor {
    fn create_surface(&mut self, config: &ToplevelConfig) -> SurfaceHandle {
        let surface = self.compositor.create_surface(&self.qh);
        let window =
            self.xdg_shell
                .create_window(surface.clone(), WindowDecorations::RequestServer, &self.qh);
        window.set_title(config.title.clone());
        window.set_app_id(config.app_id.clone());
        window.set_min_size(config.min_size);
        window.set_max_size(config.max_size);
        // The initial commit without a buffer asks for the first configure.
        window.commit();

        let handle = self.register(surface, None, Some(window));
        log::info!("Created toplevel surface {} '{}'", handle.raw(), config.title);
        handle
    }

    fn create_subsurface(&mut self, parent: SurfaceHandle) -> SurfaceHandle {
        let Some(parent_surface) = self.surfaces.get(&parent).map(|e| e.surface.clone()) else {
            log::error!("Sub-surface requested for unknown parent {}", parent.raw());
            let surface = self.compositor.create_surface(&self.qh);
            return self.register(surface, None, None);
        };
        let (subsurface, surface) = self
            .subcompositor
            .create_subsurface(parent_surface, &self.qh);
        let handle = self.register(surface, Some(subsurface), None);
        log::debug!("Created sub-surface {} of {}", handle.raw(), parent.raw());
        handle
    }

    fn destroy_surface(&mut self, handle: SurfaceHandle) {
        let Some(entry) = self.surfaces.remove(&handle) else {
            return;
        };
        self.by_object.remove(&entry.surface.id());
        if let Some(subsurface) = entry.subsurface {
            subsurface.destroy();
        }
        match entry.window {
            Some(window) => drop(window),
            None => entry.surface.destroy(),
        }
    }

    fn attach_buffer(
        &mut self,
        handle: SurfaceHandle,
        buffer: Option<BufferAttachment<'_>>,
        x: i32,
        y: i32,
    ) {
        let Some(surface) = self.ready(handle).cloned() else {
            return;
        };
        let Some(attachment) = buffer else {
            surface.attach(None, 0, 0);
            return;
        };
        let Some(wl_buffer) = self.wl_buffer(attachment) else {
            log::error!("Cannot share pool {} with the compositor", attachment.pool.id().raw());
            return;
        };
        if surface.version() >= 5 {
            surface.attach(Some(&wl_buffer), 0, 0);
            if x != 0 || y != 0 {
                surface.offset(x, y);
            }
        } else {
            surface.attach(Some(&wl_buffer), x, y);
        }
    }

    fn damage_region(&mut self, handle: SurfaceHandle, region: Rect) {
        let Some(surface) = self.ready(handle) else {
            return;
        };
        let (x, y, w, h) = (region.x, region.y, region.width as i32, region.height as i32);
        if surface.version() >= 4 {
            surface.damage_buffer(x, y, w, h);
        } else {
            surface.damage(x, y, w, h);
        }
    }

    fn commit(&mut self, handle: SurfaceHandle) {
        if let Some(surface) = self.ready(handle) {
            surface.commit();
        }
    }

    fn set_sync_mode(&mut self, handle: SurfaceHandle, mode: SyncMode) {
        if let Some(subsurface) = self.subsurface(handle) {
            match mode {
                SyncMode::Sync => subsurface.set_sync(),
                SyncMode::Desync => subsurface.set_desync(),
            }
        }
    }

    fn set_position(&mut self, handle: SurfaceHandle, x: i32, y: i32) {
        if let Some(subsurface) = self.subsurface(handle) {
            subsurface.set_position(x, y);
        }
    }

    fn is_busy(&self, buffer: &Buffer) -> bool {
        self.pools
            .get(&buffer.pool())
            .filter(|e| e.generation == buffer.generation())
            .and_then(|e| e.buffers.get(&buffer_key(buffer)))
            .is_some_and(|b| b.busy)
    }

    fn place(&mut self, handle: SurfaceHandle, sibling: SurfaceHandle, above: bool) {
        let (Some(subsurface), Some(sibling)) = (
            self.subsurface(handle),
            self.surfaces.get(&sibling).map(|e| &e.surface),
        ) else {
            return;
        };
        if above {
            subsurface.place_above(sibling);
        } else {
            subsurface.place_below(sibling);
        }
    }
}

pub struct WaylandState {
    registry_state: RegistryState,
    output_state: OutputState,
    seat_state: SeatState,
    shm: Shm,

    // Pointer state
    pointer: Option<wl_pointer::WlPointer>,

    // Keyboard state
    keyboard: Option<wl_keyboard::WlKeyboard>,
    modifiers: Modifiers,

    // Pending events to be processed by the main loop
    pending_events: Vec<PlatformEvent>,

    pub display: Display<WaylandCompositor>,
    pub exit: bool,
}

impl WaylandState {
    /// Bind the globals the toolkit needs. Fails if the compositor lacks
    /// `wl_compositor`, `wl_subcompositor`, `xdg_wm_base` or `wl_shm`.
    pub fn new(globals: &GlobalList, qh: &QueueHandle<Self>) -> Result<Self> {
        let compositor = CompositorState::bind(globals, qh)?;
        let subcompositor =
            SubcompositorState::bind(compositor.wl_compositor().clone(), globals, qh)?;
        let xdg_shell = XdgShell::bind(globals, qh)?;
        let shm = Shm::bind(globals, qh)?;

        let backend = WaylandCompositor {
            qh: qh.clone(),
            compositor,
            subcompositor,
            xdg_shell,
            wl_shm: shm.wl_shm().clone(),
            next_handle: 0,
            surfaces: HashMap::new(),
            by_object: HashMap::new(),
            pools: HashMap::new(),
        };

        Ok(Self {
            registry_state: RegistryState::new(globals),
            output_state: OutputState::new(globals, qh),
            seat_state: SeatState::new(globals, qh),
            shm,
            pointer: None,
            keyboard: None,
            modifiers: Modifiers::default(),
            pending_events: Vec::new(),
            display: Display::new(backend),
            exit: false,
        })
    }

    /// Take all pending events (drains the queue)
    pub fn take_events(&mut self) -> Vec<PlatformEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Route pending events into the display. A close request ends the loop.
    pub fn process_events(&mut self) {
        for event in self.take_events() {
            match event {
                PlatformEvent::Configure {
                    surface,
                    width,
                    height,
                } => {
                    let current = self
                        .display
                        .surfaces()
                        .find_by_handle(surface)
                        .and_then(|s| self.display.surfaces().owner(s))
                        .and_then(|v| self.display.views().size(v))
                        .unwrap_or_default();
                    let width = width.unwrap_or(current.width);
                    let height = height.unwrap_or(current.height);
                    if let Err(err) = self.display.resize_window(surface, width, height) {
                        log::warn!("Ignoring configure for surface {}: {}", surface.raw(), err);
                    }
                }
                PlatformEvent::Close(surface) => {
                    log::info!("Close requested for surface {}", surface.raw());
                    self.exit = true;
                }
                PlatformEvent::Pointer { surface, event } => {
                    self.display.dispatch_pointer(surface, event);
                }
                PlatformEvent::Key(KeyEvent::FocusIn) => {}
                PlatformEvent::Key(KeyEvent::FocusOut) => self.display.set_focus(None),
                PlatformEvent::Key(event) => {
                    self.display.dispatch_key(event);
                }
                PlatformEvent::EnterOutput { surface, output } => {
                    self.display.on_enter_output(surface, output);
                }
                PlatformEvent::LeaveOutput { surface, output } => {
                    self.display.on_leave_output(surface, output);
                }
                PlatformEvent::BufferReleased => self.display.resume_deferred_redraws(),
            }
        }
    }

    fn push_key(&mut self, event: &WlKeyEvent, down: bool) {
        let Some(key) = keysym_to_key(event.keysym, event.utf8.as_deref()) else {
            return;
        };
        let modifiers = self.modifiers;
        self.pending_events.push(PlatformEvent::Key(if down {
            KeyEvent::Down { key, modifiers }
        } else {
            KeyEvent::Up { key, modifiers }
        }));
    }

    fn output_event(&mut self, surface: &WlSurface, output: &wl_output::WlOutput, entered: bool) {
        let Some(surface) = self.display.compositor().handle_for(surface) else {
            return;
        };
        let output = OutputId(output.id().protocol_id());
        self.pending_events.push(if entered {
            PlatformEvent::EnterOutput { surface, output }
        } else {
            PlatformEvent::LeaveOutput { surface, output }
        });
    }
}

impl CompositorHandler for WaylandState {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        new_factor: i32,
    ) {
        log::debug!("Scale factor changed to: {}", new_factor);
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _surface: &WlSurface, _time: u32) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        surface: &WlSurface,
        output: &wl_output::WlOutput,
    ) {
        self.output_event(surface, output, true);
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        surface: &WlSurface,
        output: &wl_output::WlOutput,
    ) {
        self.output_event(surface, output, false);
    }
}

impl OutputHandler for WaylandState {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }
}

impl WindowHandler for WaylandState {
    fn request_close(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, window: &Window) {
        if let Some(surface) = self.display.compositor().handle_for(window.wl_surface()) {
            self.pending_events.push(PlatformEvent::Close(surface));
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        window: &Window,
        configure: WindowConfigure,
        _serial: u32,
    ) {
        let Some(surface) = self
            .display
            .compositor_mut()
            .mark_configured(window.wl_surface())
        else {
            return;
        };
        log::debug!(
            "Toplevel {} configure: requested size {:?}",
            surface.raw(),
            configure.new_size
        );
        self.pending_events.push(PlatformEvent::Configure {
            surface,
            width: configure.new_size.0.map(|w| w.get()),
            height: configure.new_size.1.map(|h| h.get()),
        });
    }
}

impl ShmHandler for WaylandState {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl SeatHandler for WaylandState {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        match capability {
            Capability::Pointer if self.pointer.is_none() => {
                match self.seat_state.get_pointer(qh, &seat) {
                    Ok(pointer) => {
                        log::debug!("Seat gained a pointer");
                        self.pointer = Some(pointer);
                    }
                    Err(err) => log::warn!("Cannot bind pointer: {}", err),
                }
            }
            Capability::Keyboard if self.keyboard.is_none() => {
                match self.seat_state.get_keyboard(qh, &seat, None) {
                    Ok(keyboard) => {
                        log::debug!("Seat gained a keyboard");
                        self.keyboard = Some(keyboard);
                    }
                    Err(err) => log::warn!("Cannot bind keyboard: {}", err),
                }
            }
            _ => {}
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        match capability {
            Capability::Pointer => {
                if let Some(pointer) = self.pointer.take() {
                    log::debug!("Seat lost its pointer");
                    pointer.release();
                }
            }
            Capability::Keyboard => {
                if let Some(keyboard) = self.keyboard.take() {
                    log::debug!("Seat lost its keyboard");
                    keyboard.release();
                }
                self.pending_events.push(PlatformEvent::Key(KeyEvent::FocusOut));
            }
            _ => {}
        }
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
    }
}

impl PointerHandler for WaylandState {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        for event in events {
            let Some(surface) = self.display.compositor().handle_for(&event.surface) else {
                continue;
            };
            let (x, y) = (event.position.0 as f32, event.position.1 as f32);

            let mouse_event = match event.kind {
                PointerEventKind::Enter { .. } => MouseEvent::Enter { x, y },
                PointerEventKind::Leave { .. } => MouseEvent::Leave,
                PointerEventKind::Motion { .. } => MouseEvent::Move { x, y },
                PointerEventKind::Press { button, .. } => {
                    let Some(button) = wayland_button_to_mouse_button(button) else {
                        continue;
                    };
                    MouseEvent::Down { x, y, button }
                }
                PointerEventKind::Release { button, .. } => {
                    let Some(button) = wayland_button_to_mouse_button(button) else {
                        continue;
                    };
                    MouseEvent::Up { x, y, button }
                }
                PointerEventKind::Axis {
                    ref horizontal,
                    ref vertical,
                    source,
                    ..
                } => {
                    let (delta_x, delta_y) = (axis_delta(horizontal), axis_delta(vertical));
                    if delta_x == 0.0 && delta_y == 0.0 {
                        continue;
                    }
                    MouseEvent::Scroll {
                        x,
                        y,
                        delta_x,
                        delta_y,
                        source: scroll_source(source),
                    }
                }
            };
            self.pending_events.push(PlatformEvent::Pointer {
                surface,
                event: mouse_event,
            });
        }
    }
}

/// Wheel steps become fixed pixel distances; touchpads report pixels.
fn axis_delta(axis: &AxisScroll) -> f32 {
    match axis.discrete {
        0 => axis.absolute as f32,
        steps => steps as f32 * SCROLL_PIXELS_PER_LINE,
    }
}

fn scroll_source(source: Option<wl_pointer::AxisSource>) -> ScrollSource {
    match source {
        Some(wl_pointer::AxisSource::Finger) => ScrollSource::Finger,
        Some(wl_pointer::AxisSource::Continuous) => ScrollSource::Continuous,
        _ => ScrollSource::Wheel,
    }
}

/// Linux evdev button codes.
fn wayland_button_to_mouse_button(button: u32) -> Option<MouseButton> {
    match button {
        0x110 => Some(MouseButton::Left),
        0x111 => Some(MouseButton::Right),
        0x112 => Some(MouseButton::Middle),
        _ => None,
    }
}

impl KeyboardHandler for WaylandState {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &WlSurface,
        _serial: u32,
        _raw: &[u32],
        _keysyms: &[Keysym],
    ) {
        self.pending_events.push(PlatformEvent::Key(KeyEvent::FocusIn));
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &WlSurface,
        _serial: u32,
    ) {
        self.pending_events.push(PlatformEvent::Key(KeyEvent::FocusOut));
    }

    fn press_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: WlKeyEvent,
    ) {
        self.push_key(&event, true);
    }

    fn release_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: WlKeyEvent,
    ) {
        self.push_key(&event, false);
    }

    fn update_modifiers(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        modifiers: WlModifiers,
        _raw_modifiers: RawModifiers,
        _layout: u32,
    ) {
        self.modifiers = Modifiers {
            ctrl: modifiers.ctrl,
            alt: modifiers.alt,
            shift: modifiers.shift,
            logo: modifiers.logo,
        };
    }

    fn repeat_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: WlKeyEvent,
    ) {
        self.push_key(&event, true);
    }
}

fn keysym_to_key(keysym: Keysym, utf8: Option<&str>) -> Option<Key> {
    let named = match keysym {
        Keysym::BackSpace => Key::Backspace,
        Keysym::Delete => Key::Delete,
        Keysym::Return | Keysym::KP_Enter => Key::Enter,
        Keysym::Tab | Keysym::ISO_Left_Tab => Key::Tab,
        Keysym::Escape => Key::Escape,
        Keysym::Left => Key::Left,
        Keysym::Right => Key::Right,
        Keysym::Up => Key::Up,
        Keysym::Down => Key::Down,
        Keysym::Home => Key::Home,
        Keysym::End => Key::End,
        _ => {
            let text = utf8
                .and_then(|t| t.chars().next())
                .filter(|c| !c.is_control());
            // With Ctrl held xkb yields a control character; fall back to the
            // letter the keysym names.
            let letter = || {
                char::from_u32(keysym.raw())
                    .filter(char::is_ascii_alphabetic)
                    .map(|c| c.to_ascii_lowercase())
            };
            return text.or_else(letter).map(Key::Char);
        }
    };
    Some(named)
}

impl ProvidesRegistryState for WaylandState {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

delegate_compositor!(WaylandState);
delegate_subcompositor!(WaylandState);
delegate_output!(WaylandState);
delegate_shm!(WaylandState);
delegate_seat!(WaylandState);
delegate_pointer!(WaylandState);
delegate_keyboard!(WaylandState);
delegate_xdg_shell!(WaylandState);
delegate_xdg_window!(WaylandState);
delegate_registry!(WaylandState);

delegate_noop!(WaylandState: WlShmPool);
impl Dispatch<WlBuffer, BufferData> for WaylandState {
    fn event(
        state: &mut Self,
        _proxy: &WlBuffer,
        event: wl_buffer::Event,
        data: &BufferData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            state.display.compositor_mut().mark_released(data);
            state.pending_events.push(PlatformEvent::BufferReleased);
        }
    }
}
