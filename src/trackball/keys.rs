use embedded_hal::digital::v2::InputPin;
use keyberon::{debounce, layout, matrix};

use crate::bsp::{ButtonPin, NKEYS};
use crate::utils::InfallibleResult;

/// Trackball button scanner
///
/// The buttons are direct-wired to GPIO (active low), modeled as a single
/// row so that keyberon debouncing and layout machinery apply unchanged.
pub struct Keys {
    buttons: [ButtonPin; NKEYS],
    debouncer: debounce::Debouncer<matrix::PressedKeys<NKEYS, 1>>,
}

impl Keys {
    /// Initialize button scanner with debouncing that requires `debounce_cnt` stable states
    pub fn new(buttons: [ButtonPin; NKEYS], debounce_cnt: u16) -> Self {
        let initial = matrix::PressedKeys::default;
        Self {
            buttons,
            debouncer: debounce::Debouncer::new(initial(), initial(), debounce_cnt),
        }
    }

    fn get(&self) -> matrix::PressedKeys<NKEYS, 1> {
        let mut pressed = matrix::PressedKeys::default();
        for (state, pin) in pressed.0[0].iter_mut().zip(self.buttons.iter()) {
            *state = pin.is_low().infallible();
        }
        pressed
    }

    /// Scan for key events; caller decides what to do with the events
    pub fn scan(&mut self) -> impl Iterator<Item = layout::Event> + '_ {
        let scan = self.get();
        self.debouncer.events(scan)
    }
}
