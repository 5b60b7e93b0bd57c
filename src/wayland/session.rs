//! The Wayland session: one owned context for the whole run.
//!
//! [`Session`] holds every bound global, the discovered outputs and seats,
//! the navigator and, once opened, the [`Overlay`].  The event queue hands
//! it to each [`Dispatch`](wayland_client::Dispatch) handler by `&mut`, so
//! there is exactly one place where state lives.

use super::overlay::{Overlay, OverlayError};
use crate::capability::{
    Binding, BindingContext, CapabilityBinder, CapabilityError, Descriptor, Grant, Lifecycle,
};
use crate::config::Config;
use crate::keys::{Bindings, Modifiers};
use crate::navigator::{Flow, Navigator};
use crate::selection::Extent;
use crate::traits::Presenter;
use log::{debug, info, warn};
use wayland_client::backend::WaylandError;
use wayland_client::protocol::{
    wl_compositor::WlCompositor, wl_keyboard::WlKeyboard, wl_output::WlOutput,
    wl_registry::WlRegistry, wl_seat::WlSeat, wl_shm::WlShm,
};
use wayland_client::{ConnectError, Connection, DispatchError, QueueHandle};
use wayland_protocols::xdg::xdg_output::zv1::client::{
    zxdg_output_manager_v1::ZxdgOutputManagerV1, zxdg_output_v1::ZxdgOutputV1,
};
use wayland_protocols_wlr::layer_shell::v1::client::zwlr_layer_shell_v1::ZwlrLayerShellV1;
use wayland_protocols_wlr::virtual_pointer::v1::client::zwlr_virtual_pointer_manager_v1::ZwlrVirtualPointerManagerV1;
use xkbcommon::xkb;

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect to the wayland compositor: {0}")]
    Connect(#[from] ConnectError),

    #[error("wayland dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("wayland connection failed: {0}")]
    Backend(#[from] WaylandError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The configured output name matched nothing.
    #[error("output {0} doesn't exist")]
    OutputNotFound(String),

    #[error("compositor advertised no outputs")]
    NoOutputs,

    #[error("failed to draw overlay: {0}")]
    Render(#[from] OverlayError),
}

/// Index into [`Session::outputs`], also the user data of output objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub usize);

/// Index into [`Session::seats`], also the user data of seat objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeatId(pub usize);

/// A display output and the metadata resolved for it.
#[derive(Debug)]
pub struct Output {
    pub wl_output: WlOutput,
    pub xdg_output: Option<ZxdgOutputV1>,
    pub name: Option<String>,
    pub scale: u32,
    pub logical_size: Option<Extent>,
}

impl Output {
    fn new(wl_output: WlOutput) -> Self {
        Self {
            wl_output,
            xdg_output: None,
            name: None,
            scale: 1,
            logical_size: None,
        }
    }
}

/// An input seat.  Only its keyboard is used.
pub struct Seat {
    pub wl_seat: WlSeat,
    pub keyboard: Option<WlKeyboard>,
    pub xkb_state: Option<xkb::State>,
    pub name: Option<String>,
}

/// Every global gridpoint binds, sorted by interface name.
pub static CAPABILITIES: &[Descriptor<Session>] = &[
    Descriptor {
        name: "wl_compositor",
        version: 4,
        binding: Binding::Singleton {
            required: true,
            is_bound: |s| s.compositor.is_some(),
            bind: |s, g| s.compositor = Some(s.registry.bind(g.id, g.version, &s.qh, ())),
        },
    },
    Descriptor {
        name: "wl_output",
        version: 3,
        binding: Binding::Multi(register_output),
    },
    Descriptor {
        name: "wl_seat",
        version: 7,
        binding: Binding::Multi(register_seat),
    },
    Descriptor {
        name: "wl_shm",
        version: 1,
        binding: Binding::Singleton {
            required: true,
            is_bound: |s| s.shm.is_some(),
            bind: |s, g| s.shm = Some(s.registry.bind(g.id, g.version, &s.qh, ())),
        },
    },
    Descriptor {
        name: "zwlr_layer_shell_v1",
        version: 2,
        binding: Binding::Singleton {
            required: true,
            is_bound: |s| s.layer_shell.is_some(),
            bind: |s, g| s.layer_shell = Some(s.registry.bind(g.id, g.version, &s.qh, ())),
        },
    },
    Descriptor {
        name: "zwlr_virtual_pointer_manager_v1",
        version: 2,
        binding: Binding::Singleton {
            required: true,
            is_bound: |s| s.pointer_manager.is_some(),
            bind: |s, g| s.pointer_manager = Some(s.registry.bind(g.id, g.version, &s.qh, ())),
        },
    },
    Descriptor {
        name: "zxdg_output_manager_v1",
        version: 3,
        binding: Binding::Singleton {
            required: true,
            is_bound: |s| s.output_manager.is_some(),
            bind: |s, g| s.output_manager = Some(s.registry.bind(g.id, g.version, &s.qh, ())),
        },
    },
];

fn register_output(s: &mut Session, g: Grant) {
    let id = OutputId(s.outputs.len());
    let wl_output: WlOutput = s.registry.bind(g.id, g.version, &s.qh, id);
    s.outputs.push(Output::new(wl_output));
    if s.lifecycle.attaches_immediately() {
        s.attach_output_metadata(id);
    }
}

fn register_seat(s: &mut Session, g: Grant) {
    let id = SeatId(s.seats.len());
    let wl_seat: WlSeat = s.registry.bind(g.id, g.version, &s.qh, id);
    s.seats.push(Seat {
        wl_seat,
        keyboard: None,
        xkb_state: None,
        name: None,
    });
}

/// All state shared by the event handlers.
pub struct Session {
    pub(super) qh: QueueHandle<Session>,
    pub(super) registry: WlRegistry,
    pub(super) binder: CapabilityBinder<Session>,
    pub(super) lifecycle: Lifecycle,

    pub(super) compositor: Option<WlCompositor>,
    pub(super) shm: Option<WlShm>,
    pub(super) layer_shell: Option<ZwlrLayerShellV1>,
    pub(super) pointer_manager: Option<ZwlrVirtualPointerManagerV1>,
    pub(super) output_manager: Option<ZxdgOutputManagerV1>,

    pub(super) outputs: Vec<Output>,
    pub(super) seats: Vec<Seat>,
    pub(super) xkb_context: xkb::Context,

    pub(super) navigator: Navigator,
    pub(super) bindings: Bindings,
    pub(super) target: Option<String>,
    pub(super) overlay: Option<Overlay>,

    pub(super) running: bool,
    failure: Option<SessionError>,
}

impl Session {
    fn new(
        qh: QueueHandle<Session>,
        registry: WlRegistry,
        binder: CapabilityBinder<Session>,
        config: Config,
    ) -> Self {
        Self {
            qh,
            registry,
            binder,
            lifecycle: Lifecycle::Init,
            compositor: None,
            shm: None,
            layer_shell: None,
            pointer_manager: None,
            output_manager: None,
            outputs: Vec::new(),
            seats: Vec::new(),
            xkb_context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            navigator: Navigator::from_config(&config),
            bindings: config.bindings,
            target: config.output,
            overlay: None,
            running: true,
            failure: None,
        }
    }

    /// Stop the loop and remember `err` for [`run`] to return.
    ///
    /// Only the first failure is kept.
    pub(super) fn fail(&mut self, err: SessionError) {
        warn!("stopping: {}", err);
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        self.running = false;
    }

    /// Look up `keysym` with `modifiers` in the bindings and run the
    /// commands it names.
    pub(super) fn handle_keysym(&mut self, modifiers: Modifiers, keysym: &str) {
        let Some(overlay) = self.overlay.as_mut() else {
            debug!("key {} before the overlay is open", keysym);
            return;
        };
        match apply_binding(&self.bindings, &mut self.navigator, modifiers, keysym, overlay) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => self.running = false,
            Err(e) => self.fail(e.into()),
        }
    }

    fn attach_output_metadata(&mut self, id: OutputId) {
        let Some(manager) = self.output_manager.as_ref() else {
            return;
        };
        let output = &mut self.outputs[id.0];
        if output.xdg_output.is_none() {
            output.xdg_output = Some(manager.get_xdg_output(&output.wl_output, &self.qh, id));
        }
    }

    fn select_output(&self) -> Result<OutputId, SessionError> {
        let names: Vec<Option<&str>> = self.outputs.iter().map(|o| o.name.as_deref()).collect();
        pick_output(&names, self.target.as_deref()).map(OutputId)
    }

    /// Create the layer surface and virtual pointer on `output`.
    ///
    /// The first frame is drawn once the compositor configures the surface.
    fn open_overlay(&mut self, id: OutputId) -> Result<(), SessionError> {
        let (Some(compositor), Some(shm), Some(layer_shell), Some(pointer_manager)) = (
            self.compositor.as_ref(),
            self.shm.as_ref(),
            self.layer_shell.as_ref(),
            self.pointer_manager.as_ref(),
        ) else {
            let missing = self.binder.missing(self).next().unwrap_or("wl_compositor");
            return Err(CapabilityError::Missing(missing).into());
        };
        let output = &self.outputs[id.0];
        info!(
            "opening overlay on {} (scale {})",
            output.name.as_deref().unwrap_or("unnamed output"),
            output.scale
        );
        let overlay = Overlay::open(
            id,
            output,
            compositor,
            shm,
            layer_shell,
            pointer_manager,
            &self.qh,
        );
        self.overlay = Some(overlay);
        Ok(())
    }
}

impl BindingContext for Session {
    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        debug!("lifecycle {} -> {}", self.lifecycle, lifecycle);
        self.lifecycle = lifecycle;
    }

    fn attach_pending_metadata(&mut self) {
        for index in 0..self.outputs.len() {
            self.attach_output_metadata(OutputId(index));
        }
    }
}

/// Choose the output to cover.
///
/// `wanted` must match a resolved name exactly; without it the first
/// discovered output is used.
pub fn pick_output(names: &[Option<&str>], wanted: Option<&str>) -> Result<usize, SessionError> {
    match wanted {
        Some(wanted) => names
            .iter()
            .position(|name| *name == Some(wanted))
            .ok_or_else(|| SessionError::OutputNotFound(wanted.to_string())),
        None if names.is_empty() => Err(SessionError::NoOutputs),
        None => Ok(0),
    }
}

/// Run the commands bound to `keysym` under `modifiers`, if any.
pub fn apply_binding<P: Presenter>(
    bindings: &Bindings,
    navigator: &mut Navigator,
    modifiers: Modifiers,
    keysym: &str,
    presenter: &mut P,
) -> Result<Flow, P::Error> {
    match bindings.lookup(modifiers, keysym) {
        Some(commands) => {
            debug!("{:?}+{} -> {:?}", modifiers, keysym, commands);
            navigator.apply_all(commands, presenter)
        }
        None => {
            debug!("{:?}+{} is not bound", modifiers, keysym);
            Ok(Flow::Continue)
        }
    }
}

/// Connect, bind, open the overlay and navigate until a click or quit.
pub fn run(config: Config) -> Result<(), SessionError> {
    let conn = Connection::connect_to_env()?;
    let mut queue = conn.new_event_queue::<Session>();
    let qh = queue.handle();

    let registry = conn.display().get_registry(&qh, ());
    let binder = CapabilityBinder::new(CAPABILITIES)?;
    let mut session = Session::new(qh, registry, binder, config);

    queue.roundtrip(&mut session)?;
    binder.complete_discovery(&mut session)?;
    queue.roundtrip(&mut session)?;
    binder.complete_metadata(&mut session)?;
    info!(
        "bound {} output(s) and {} seat(s)",
        session.outputs.len(),
        session.seats.len()
    );

    let output = session.select_output()?;
    session.open_overlay(output)?;

    while session.running {
        queue.blocking_dispatch(&mut session)?;
    }
    conn.flush()?;

    match session.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
