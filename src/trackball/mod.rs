//! Main trackball logic
//!
//! Implementation of the trackball behavior based on the [`keyberon`] crate.
//! Button events go through chord recognition and the keymap layout; custom
//! actions resolved by the layout drive mouse emulation, tap dances, layer
//! toggling and firmware reboot.

/// Special key actions
pub mod actions;
/// Chorded key recognition
pub mod combos;
/// USB HID mouse class
pub mod hid;
/// Button scanner with debouncing
mod keys;
/// Mouse state and report generation
pub mod mouse;
/// Tap/hold/double-tap classification for a single key
pub mod tap_dance;

use heapless::Vec;
use keyberon::key_code::KbHidReport;
use keyberon::layout::{self, CustomEvent, Event};
use usb_device::device::UsbDeviceState;

use crate::bsp::usb::Usb;
use crate::bsp::NKEYS;
use actions::Action;
use combos::Combos;
use tap_dance::TapDance;

pub use keys::Keys;

/// Trackball configuration
pub struct TrackballConfig<const L: usize> {
    /// Keymap layers
    pub layers: &'static layout::Layers<NKEYS, 1, L, Action>,
    /// Configuration of mouse emulation
    pub mouse: &'static mouse::MouseConfig,
    /// Tap dance table referenced by [`Action::TapDance`]
    pub tap_dances: &'static [tap_dance::TapDanceConfig],
    /// Chord definitions
    pub combos: &'static [combos::ComboConfig],
    /// Ticks within which chord members must be pressed together
    pub combo_term: u16,
}

/// Deferred updates applied by the task that owns the hardware
#[derive(Default)]
pub struct TickUpdate {
    /// New sensor resolution to be applied
    pub cpi: Option<u16>,
    /// Reboot to bootloader was requested
    pub reboot: bool,
}

/// Trackball logic
pub struct Trackball<const L: usize> {
    keys: Keys,
    combos: Combos,
    layout: layout::Layout<NKEYS, 1, L, Action>,
    tap_dances: Vec<TapDance, { tap_dance::MAX_TAP_DANCES }>,
    mouse: mouse::Mouse,
    default_layer: usize,
    reboot_requested: bool,
}

impl<const L: usize> Trackball<L> {
    /// Create new trackball logic with given button scanner and configuration
    pub fn new(keys: Keys, config: &TrackballConfig<L>) -> Self {
        let mut tap_dances = Vec::new();
        for td in config.tap_dances {
            tap_dances.push(TapDance::new(td))
                .map_err(|_| ())
                .expect("Tap dance table too large");
        }
        Self {
            keys,
            combos: Combos::new(config.combos, config.combo_term),
            layout: layout::Layout::new(config.layers),
            tap_dances,
            mouse: mouse::Mouse::new(config.mouse),
            default_layer: 0,
            reboot_requested: false,
        }
    }

    /// Currently selected sensor resolution
    pub fn cpi(&self) -> u16 {
        self.mouse.cpi()
    }

    /// Set new motion deltas from the sensor
    pub fn update_motion(&mut self, xy: (i16, i16)) {
        self.mouse.update_motion(xy);
    }

    /// Periodic trackball events processing
    ///
    /// This should be called in a fixed period to scan the buttons, resolve
    /// key events depending on the keymap and push USB HID reports. Returns
    /// hardware updates to be applied by the caller.
    pub fn tick<LEDS: keyberon::keyboard::Leds>(&mut self, usb: &mut Usb<LEDS>) -> TickUpdate {
        let usb_state = usb.dev.state();

        // Scan buttons; chord recognition runs before the layout sees anything
        for event in self.keys.scan() {
            self.combos.process(event);
        }
        self.combos.tick();

        let mut routed: Vec<combos::Output, 16> = Vec::new();
        while let Some(output) = self.combos.pop() {
            // Capacity is enough for the worst case of all buttons changing
            // state at once plus a flushed chord buffer
            let _ = routed.push(output);
        }
        for output in routed {
            match output {
                combos::Output::Event(event) => self.handle_key_event(event),
                combos::Output::Action(action, pressed) => self.handle_action(action, pressed),
            }
        }

        // Advance tap dance timers
        let mut outputs: Vec<tap_dance::Output, { tap_dance::MAX_TAP_DANCES }> = Vec::new();
        for td in &mut self.tap_dances {
            if let Some(output) = td.tick() {
                let _ = outputs.push(output);
            }
        }
        for (action, pressed) in outputs {
            self.handle_action(action, pressed);
        }

        // Advance keyboard time
        let custom = self.layout.tick();
        if let Some((action, pressed)) = custom.transposed() {
            self.handle_action(action, pressed);
        }

        // Advance mouse emulation time
        self.mouse.tick();

        // Push USB reports
        if usb_state == UsbDeviceState::Configured {
            let report: KbHidReport = self.layout.keycodes().collect();
            if usb.keyboard.device_mut().set_keyboard_report(report.clone()) {
                while let Ok(0) = usb.keyboard.write(report.as_bytes()) {}
            }
            self.mouse.push_report(&mut usb.mouse);
        } else {
            // Motion accumulated with no host to send it to would burst out
            // on reconnection
            self.mouse.clear_motion();
        }

        TickUpdate {
            cpi: self.mouse.take_cpi_update(),
            reboot: core::mem::take(&mut self.reboot_requested),
        }
    }

    fn handle_key_event(&mut self, event: Event) {
        // A press of any other key interrupts ongoing tap dances
        if matches!(event, Event::Press(..)) {
            let coord = event.coord();
            let mut outputs: Vec<tap_dance::Output, { tap_dance::MAX_TAP_DANCES }> = Vec::new();
            for td in &mut self.tap_dances {
                if td.key() != coord {
                    if let Some(output) = td.on_interrupt() {
                        let _ = outputs.push(output);
                    }
                }
            }
            for (action, pressed) in outputs {
                self.handle_action(action, pressed);
            }
        }
        self.layout.event(event);
    }

    fn handle_action(&mut self, action: &'static Action, pressed: bool) {
        match action {
            Action::Mouse(mouse) => self.mouse.handle_action(mouse, pressed),
            Action::TapDance(index) => {
                let output = self.tap_dances
                    .get_mut(*index as usize)
                    .and_then(|td| if pressed { td.on_press() } else { td.on_release() });
                if let Some((action, pressed)) = output {
                    debug_assert!(
                        !matches!(action, Action::TapDance(_)),
                        "Tap dance must not dispatch another tap dance"
                    );
                    self.handle_action(action, pressed);
                }
            },
            Action::ToggleLayer(layer) => if pressed {
                self.toggle_default_layer(*layer as usize);
            },
            Action::Bootloader => if pressed {
                self.reboot_requested = true;
            },
        }
    }

    fn toggle_default_layer(&mut self, layer: usize) {
        debug_assert!(layer < L);
        self.default_layer = if self.default_layer == layer { 0 } else { layer };
        defmt::info!("Default layer {=usize}", self.default_layer);
        self.layout.set_default_layer(self.default_layer);
    }
}

/// Extension trait for [`CustomEvent`]
pub trait CustomEventExt<T: 'static> {
    /// Convert NoEvent into None, else return Some(T, pressed)
    fn transposed(self) -> Option<(&'static T, bool)>;
}

impl<T> CustomEventExt<T> for CustomEvent<T> {
    fn transposed(self) -> Option<(&'static T, bool)> {
        match self {
            CustomEvent::NoEvent => None,
            CustomEvent::Press(act) => Some((act, true)),
            CustomEvent::Release(act) => Some((act, false)),
        }
    }
}
