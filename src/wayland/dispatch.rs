//! Event handlers for every protocol object the session creates.

use super::session::{OutputId, SeatId, Session};
use crate::capability::Advertised;
use crate::keys::Modifiers;
use crate::pool::BufferId;
use crate::selection::Extent;
use log::{debug, trace, warn};
use memmap2::MmapOptions;
use std::os::fd::OwnedFd;
use wayland_client::protocol::{
    wl_buffer, wl_compositor, wl_keyboard, wl_output, wl_region, wl_registry, wl_seat, wl_shm,
    wl_shm_pool, wl_surface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, QueueHandle, WEnum};
use wayland_protocols::xdg::xdg_output::zv1::client::{zxdg_output_manager_v1, zxdg_output_v1};
use wayland_protocols_wlr::layer_shell::v1::client::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};
use wayland_protocols_wlr::virtual_pointer::v1::client::{
    zwlr_virtual_pointer_manager_v1, zwlr_virtual_pointer_v1,
};
use xkbcommon::xkb;

/// Evdev scancodes are offset by 8 from xkb keycodes.
const EVDEV_OFFSET: u32 = 8;

/// xkb modifier name for each binding modifier.
const XKB_MODIFIERS: [(&str, Modifiers); 8] = [
    (xkb::MOD_NAME_SHIFT, Modifiers::SHIFT),
    (xkb::MOD_NAME_CAPS, Modifiers::CAPS),
    (xkb::MOD_NAME_CTRL, Modifiers::CTRL),
    (xkb::MOD_NAME_ALT, Modifiers::ALT),
    (xkb::MOD_NAME_NUM, Modifiers::NUM),
    ("Mod3", Modifiers::MOD3),
    (xkb::MOD_NAME_LOGO, Modifiers::LOGO),
    ("Mod5", Modifiers::MOD5),
];

/// A keymap sent by the compositor could not be loaded.
#[derive(Debug, thiserror::Error)]
enum KeymapError {
    #[error("unsupported keymap format {0:?}")]
    Format(WEnum<wl_keyboard::KeymapFormat>),
    #[error("failed to map keymap: {0}")]
    Map(#[from] std::io::Error),
    #[error("keymap is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("xkbcommon rejected the keymap")]
    Compile,
}

fn load_keymap(
    context: &xkb::Context,
    format: WEnum<wl_keyboard::KeymapFormat>,
    fd: &OwnedFd,
    size: u32,
) -> Result<xkb::Keymap, KeymapError> {
    if format != WEnum::Value(wl_keyboard::KeymapFormat::XkbV1) {
        return Err(KeymapError::Format(format));
    }
    // SAFETY: the compositor hands over a sealed, read-only keymap file that
    // it does not modify while we hold the private mapping.
    let map = unsafe { MmapOptions::new().len(size as usize).map_copy_read_only(fd)? };
    let text = std::str::from_utf8(&map)?.trim_end_matches('\0');
    xkb::Keymap::new_from_string(
        context,
        text.to_string(),
        xkb::KEYMAP_FORMAT_TEXT_V1,
        xkb::KEYMAP_COMPILE_NO_FLAGS,
    )
    .ok_or(KeymapError::Compile)
}

/// Swap in the state for a newly announced keymap.
///
/// The old state is dropped first, so a keymap that fails to load leaves
/// the seat without one until the next valid keymap.
fn replace_keymap(
    slot: &mut Option<xkb::State>,
    context: &xkb::Context,
    format: WEnum<wl_keyboard::KeymapFormat>,
    fd: &OwnedFd,
    size: u32,
) -> Result<(), KeymapError> {
    *slot = None;
    let keymap = load_keymap(context, format, fd, size)?;
    *slot = Some(xkb::State::new(&keymap));
    Ok(())
}

/// The xkb keycode for an evdev scancode, `None` past the keycode range.
fn xkb_keycode(key: u32) -> Option<xkb::Keycode> {
    key.checked_add(EVDEV_OFFSET).map(Into::into)
}

/// Modifiers active for `keycode`, minus those xkb consumed to produce
/// its keysym.
fn active_modifiers(state: &xkb::State, keycode: xkb::Keycode) -> Modifiers {
    let keymap = state.get_keymap();
    let mut modifiers = Modifiers::empty();
    for (name, flag) in XKB_MODIFIERS {
        let index = keymap.mod_get_index(name);
        if index == xkb::MOD_INVALID {
            continue;
        }
        if state.mod_index_is_active(index, xkb::STATE_MODS_EFFECTIVE)
            && !state.mod_index_is_consumed(keycode, index)
        {
            modifiers |= flag;
        }
    }
    modifiers
}

//  Registry

impl Dispatch<wl_registry::WlRegistry, ()> for Session {
    fn event(
        state: &mut Self,
        _: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                let binder = state.binder;
                binder.bind(
                    state,
                    &Advertised {
                        id: name,
                        interface,
                        version,
                    },
                );
            }
            wl_registry::Event::GlobalRemove { name } => {
                debug!("global {} removed", name);
            }
            _ => {}
        }
    }
}

//  Outputs

impl Dispatch<wl_output::WlOutput, OutputId> for Session {
    fn event(
        state: &mut Self,
        _: &wl_output::WlOutput,
        event: wl_output::Event,
        id: &OutputId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_output::Event::Scale { factor } = event {
            let scale = u32::try_from(factor).unwrap_or(1).max(1);
            trace!("output {:?} scale {}", id, scale);
            state.outputs[id.0].scale = scale;
            if let Some(overlay) = state.overlay.as_mut().filter(|o| o.output() == *id) {
                overlay.set_scale(scale);
            }
        }
    }
}

impl Dispatch<zxdg_output_v1::ZxdgOutputV1, OutputId> for Session {
    fn event(
        state: &mut Self,
        _: &zxdg_output_v1::ZxdgOutputV1,
        event: zxdg_output_v1::Event,
        id: &OutputId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zxdg_output_v1::Event::Name { name } => {
                debug!("output {:?} is {}", id, name);
                state.outputs[id.0].name = Some(name);
            }
            zxdg_output_v1::Event::LogicalSize { width, height } => {
                let size = Extent::new(width.max(0) as u32, height.max(0) as u32);
                trace!("output {:?} logical size {}x{}", id, size.width, size.height);
                state.outputs[id.0].logical_size = Some(size);
                if let Some(overlay) = state.overlay.as_mut().filter(|o| o.output() == *id) {
                    overlay.set_logical_size(size);
                }
            }
            _ => {}
        }
    }
}

//  Seats and keyboards

impl Dispatch<wl_seat::WlSeat, SeatId> for Session {
    fn event(
        state: &mut Self,
        wl_seat: &wl_seat::WlSeat,
        event: wl_seat::Event,
        id: &SeatId,
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let seat = &mut state.seats[id.0];
        match event {
            wl_seat::Event::Capabilities {
                capabilities: WEnum::Value(caps),
            } => {
                if caps.contains(wl_seat::Capability::Keyboard) && seat.keyboard.is_none() {
                    debug!("seat {:?} has a keyboard", id);
                    seat.keyboard = Some(wl_seat.get_keyboard(qh, *id));
                }
            }
            wl_seat::Event::Name { name } => seat.name = Some(name),
            _ => {}
        }
    }
}

impl Dispatch<wl_keyboard::WlKeyboard, SeatId> for Session {
    fn event(
        state: &mut Self,
        _: &wl_keyboard::WlKeyboard,
        event: wl_keyboard::Event,
        id: &SeatId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                let seat = &mut state.seats[id.0];
                match replace_keymap(&mut seat.xkb_state, &state.xkb_context, format, &fd, size) {
                    Ok(()) => debug!("keymap loaded for seat {:?}", id),
                    Err(e) => warn!("ignoring keymap for seat {:?}: {}", id, e),
                }
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
                ..
            } => {
                if let Some(xkb_state) = state.seats[id.0].xkb_state.as_mut() {
                    xkb_state.update_mask(mods_depressed, mods_latched, mods_locked, 0, 0, group);
                }
            }
            wl_keyboard::Event::Key {
                key,
                state: WEnum::Value(wl_keyboard::KeyState::Pressed),
                ..
            } => {
                let Some(xkb_state) = state.seats[id.0].xkb_state.as_ref() else {
                    debug!("key {} before any keymap", key);
                    return;
                };
                let Some(keycode) = xkb_keycode(key) else {
                    debug!("key {} is outside the keycode range", key);
                    return;
                };
                let keysym = xkb_state.key_get_one_sym(keycode);
                let name = xkb::keysym_get_name(keysym);
                let modifiers = active_modifiers(xkb_state, keycode);
                state.handle_keysym(modifiers, &name);
            }
            _ => {}
        }
    }
}

//  Overlay

impl Dispatch<zwlr_layer_surface_v1::ZwlrLayerSurfaceV1, ()> for Session {
    fn event(
        state: &mut Self,
        layer_surface: &zwlr_layer_surface_v1::ZwlrLayerSurfaceV1,
        event: zwlr_layer_surface_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_layer_surface_v1::Event::Configure {
                serial,
                width,
                height,
            } => {
                layer_surface.ack_configure(serial);
                let Some(overlay) = state.overlay.as_mut() else {
                    return;
                };
                overlay.resize(Extent::new(width, height));
                if let Err(e) = state.navigator.refresh(overlay) {
                    state.fail(e.into());
                }
            }
            zwlr_layer_surface_v1::Event::Closed => {
                debug!("overlay closed by the compositor");
                state.running = false;
            }
            _ => {}
        }
    }
}

impl Dispatch<wl_buffer::WlBuffer, BufferId> for Session {
    fn event(
        state: &mut Self,
        _: &wl_buffer::WlBuffer,
        event: wl_buffer::Event,
        id: &BufferId,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            if let Some(overlay) = state.overlay.as_mut() {
                overlay.pool_mut().release(*id);
            }
        }
    }
}

delegate_noop!(Session: ignore wl_compositor::WlCompositor);
delegate_noop!(Session: ignore wl_region::WlRegion);
delegate_noop!(Session: ignore wl_shm::WlShm);
delegate_noop!(Session: ignore wl_shm_pool::WlShmPool);
delegate_noop!(Session: ignore wl_surface::WlSurface);
delegate_noop!(Session: ignore zxdg_output_manager_v1::ZxdgOutputManagerV1);
delegate_noop!(Session: ignore zwlr_layer_shell_v1::ZwlrLayerShellV1);
delegate_noop!(Session: ignore zwlr_virtual_pointer_manager_v1::ZwlrVirtualPointerManagerV1);
delegate_noop!(Session: ignore zwlr_virtual_pointer_v1::ZwlrVirtualPointerV1);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// A keymap with Return, `h`/`H` and a left shift, needing no include
    /// files.
    const KEYMAP: &str = r#"xkb_keymap {
    xkb_keycodes "test" {
        minimum = 8;
        maximum = 255;
        <RTRN> = 36;
        <AC06> = 43;
        <LFSH> = 50;
    };
    xkb_types "test" {
        type "ONE_LEVEL" {
            modifiers = none;
            level_name[Level1] = "Any";
        };
        type "ALPHABETIC" {
            modifiers = Shift+Lock;
            map[Shift] = Level2;
            map[Lock] = Level2;
            level_name[Level1] = "Base";
            level_name[Level2] = "Caps";
        };
    };
    xkb_compatibility "test" {
    };
    xkb_symbols "test" {
        key <RTRN> { type = "ONE_LEVEL", symbols[Group1] = [ Return ] };
        key <AC06> { type = "ALPHABETIC", symbols[Group1] = [ h, H ] };
        key <LFSH> { type = "ONE_LEVEL", symbols[Group1] = [ Shift_L ] };
        modifier_map Shift { <LFSH> };
    };
};
"#;

    const KEY_ENTER: u32 = 28;
    const KEY_H: u32 = 35;

    fn xkb_v1() -> WEnum<wl_keyboard::KeymapFormat> {
        WEnum::Value(wl_keyboard::KeymapFormat::XkbV1)
    }

    /// An fd holding `bytes`, as the compositor would send it.
    fn keymap_fd(bytes: &[u8]) -> OwnedFd {
        let memfd = memfd::MemfdOptions::new()
            .create("gridpoint-test-keymap")
            .unwrap();
        let mut file = memfd.into_file();
        file.write_all(bytes).unwrap();
        file.into()
    }

    fn load(bytes: &[u8]) -> Result<xkb::Keymap, KeymapError> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        load_keymap(&context, xkb_v1(), &keymap_fd(bytes), bytes.len() as u32)
    }

    fn state() -> xkb::State {
        xkb::State::new(&load(KEYMAP.as_bytes()).unwrap())
    }

    fn sym_name(state: &xkb::State, key: u32) -> String {
        xkb::keysym_get_name(state.key_get_one_sym(xkb_keycode(key).unwrap()))
    }

    fn hold(state: &mut xkb::State, names: &[&str]) {
        let keymap = state.get_keymap();
        let mask = names
            .iter()
            .map(|name| 1 << keymap.mod_get_index(*name))
            .fold(0, |acc, bit| acc | bit);
        state.update_mask(mask, 0, 0, 0, 0, 0);
    }

    #[test]
    fn valid_keymap_loads() {
        let state = state();
        assert_eq!(sym_name(&state, KEY_H), "h");
        assert_eq!(sym_name(&state, KEY_ENTER), "Return");
    }

    #[test]
    fn trailing_nul_is_trimmed() {
        let mut bytes = KEYMAP.as_bytes().to_vec();
        bytes.extend_from_slice(b"\0\0");
        let keymap = load(&bytes).unwrap();
        let state = xkb::State::new(&keymap);
        assert_eq!(sym_name(&state, KEY_H), "h");
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let fd = keymap_fd(KEYMAP.as_bytes());
        let format = WEnum::Value(wl_keyboard::KeymapFormat::NoKeymap);
        let err = load_keymap(&context, format, &fd, KEYMAP.len() as u32).err().unwrap();
        assert!(matches!(err, KeymapError::Format(_)), "{}", err);
    }

    #[test]
    fn garbage_keymap_fails_to_compile() {
        assert!(matches!(load(b"not a keymap\0"), Err(KeymapError::Compile)));
    }

    #[test]
    fn non_utf8_keymap_is_rejected() {
        assert!(matches!(load(&[0xff, 0xfe, 0x00]), Err(KeymapError::Utf8(_))));
    }

    #[test]
    fn rejected_keymap_drops_the_old_state() {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let mut slot = Some(state());

        let fd = keymap_fd(KEYMAP.as_bytes());
        let bad = WEnum::Value(wl_keyboard::KeymapFormat::NoKeymap);
        assert!(replace_keymap(&mut slot, &context, bad, &fd, KEYMAP.len() as u32).is_err());
        assert!(slot.is_none());

        let garbage = keymap_fd(b"xkb_keymap {");
        assert!(replace_keymap(&mut slot, &context, xkb_v1(), &garbage, 12).is_err());
        assert!(slot.is_none());

        replace_keymap(&mut slot, &context, xkb_v1(), &fd, KEYMAP.len() as u32).unwrap();
        let state = slot.as_ref().unwrap();
        assert_eq!(sym_name(state, KEY_H), "h");
    }

    #[test]
    fn keycode_offset_does_not_overflow() {
        assert_eq!(xkb_keycode(KEY_H), Some(xkb::Keycode::from(43u32)));
        assert_eq!(xkb_keycode(u32::MAX - EVDEV_OFFSET), Some(xkb::Keycode::from(u32::MAX)));
        assert_eq!(xkb_keycode(u32::MAX - EVDEV_OFFSET + 1), None);
        assert_eq!(xkb_keycode(u32::MAX), None);
    }

    #[test]
    fn no_modifiers_when_nothing_is_held() {
        let state = state();
        let keycode = xkb_keycode(KEY_H).unwrap();
        assert_eq!(active_modifiers(&state, keycode), Modifiers::empty());
    }

    #[test]
    fn shift_consumed_by_the_keysym_is_dropped() {
        let mut state = state();
        hold(&mut state, &[xkb::MOD_NAME_SHIFT]);
        assert_eq!(sym_name(&state, KEY_H), "H");
        let h = xkb_keycode(KEY_H).unwrap();
        assert_eq!(active_modifiers(&state, h), Modifiers::empty());

        let enter = xkb_keycode(KEY_ENTER).unwrap();
        assert_eq!(sym_name(&state, KEY_ENTER), "Return");
        assert_eq!(active_modifiers(&state, enter), Modifiers::SHIFT);
    }

    #[test]
    fn unconsumed_modifiers_are_reported() {
        let mut state = state();
        hold(&mut state, &[xkb::MOD_NAME_CTRL, xkb::MOD_NAME_ALT, xkb::MOD_NAME_LOGO]);
        let h = xkb_keycode(KEY_H).unwrap();
        assert_eq!(sym_name(&state, KEY_H), "h");
        assert_eq!(
            active_modifiers(&state, h),
            Modifiers::CTRL | Modifiers::ALT | Modifiers::LOGO
        );
    }
}
