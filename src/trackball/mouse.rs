use bitfield::bitfield;
use usb_device::class_prelude::UsbBus;

use super::actions::{Inc, MouseAction, MouseButton};
use super::hid::{HidMouse, MouseReport};

/// Trackball mouse state
///
/// Combines the button states driven by key actions with the ball motion
/// reported by the optical sensor, and implements the modes layered on top:
/// drag scroll, rapid fire and DPI cycling.
pub struct Mouse {
    config: &'static MouseConfig,
    buttons: MouseButtons,
    xy: Plane,
    scroll: Plane,
    drag_scroll: bool,
    rapid_fire: RapidFire,
    dpi_index: usize,
    dpi_dirty: bool,
}

/// Mouse emulation configuration
pub struct MouseConfig {
    pub dpi: DpiConfig,
    pub drag_scroll: DragScrollConfig,
    pub rapid_fire: RapidFireConfig,
}

/// Run-time selectable sensor resolutions
pub struct DpiConfig {
    /// Resolutions the sensitivity key cycles through
    pub options: &'static [u16],
    /// Index into `options` used after power-up
    pub default_index: usize,
}

/// Configuration of the drag scroll mode
pub struct DragScrollConfig {
    /// Sensor counts per one scroll unit; stands in for a fixed low
    /// drag resolution without reprogramming the sensor
    pub divider: u16,
    /// Reverse the vertical scroll direction
    pub invert: bool,
    /// Active only while the key is held; otherwise the key toggles
    pub momentary: bool,
}

/// Configuration of the rapid fire mode
pub struct RapidFireConfig {
    /// Full click period in ticks; the button is down for the first half
    pub period: u16,
}

bitfield! {
    /// State of mouse buttons
    #[derive(Clone, Copy, PartialEq)]
    struct MouseButtons(u8);
    pub left, set_left: 0;
    pub right, set_right: 1;
    pub mid, set_mid: 2;
    pub back, set_back: 3;
    pub forward, set_forward: 4;
}

struct RapidFire {
    button: Option<MouseButton>,
    timer: u16,
    high: bool,
}

/// Motion accumulation on a 2D plane
struct Plane {
    x: DivAccumulator,
    y: DivAccumulator,
}

/// Accumulate values to read at lower resolution depending on divider.
struct DivAccumulator {
    value: i32,
    divider: u16,
}

impl Mouse {
    pub fn new(config: &'static MouseConfig) -> Self {
        Self {
            config,
            buttons: MouseButtons(0),
            xy: Plane::new(1),
            scroll: Plane::new(config.drag_scroll.divider),
            drag_scroll: false,
            rapid_fire: RapidFire { button: None, timer: 0, high: false },
            dpi_index: config.dpi.default_index,
            dpi_dirty: false,
        }
    }

    /// Handle mouse action key event
    pub fn handle_action(&mut self, action: &MouseAction, pressed: bool) {
        match action {
            MouseAction::Click(button) => self.buttons.set(*button, pressed),
            MouseAction::RapidFire(button) => {
                if pressed {
                    self.rapid_fire.start(*button);
                } else {
                    self.rapid_fire.stop();
                }
            },
            MouseAction::DragScroll => {
                let active = if self.config.drag_scroll.momentary {
                    pressed
                } else if pressed {
                    !self.drag_scroll
                } else {
                    return;
                };
                self.set_drag_scroll(active);
            },
            MouseAction::Sensitivity(inc) => if pressed {
                self.cycle_dpi(*inc);
            },
        }
    }

    /// Store latest motion deltas from the sensor
    pub fn update_motion(&mut self, (dx, dy): (i16, i16)) {
        if self.drag_scroll {
            let dy = if self.config.drag_scroll.invert { -dy } else { dy };
            self.scroll.accumulate(dx as i32, dy as i32);
        } else {
            self.xy.accumulate(dx as i32, dy as i32);
        }
    }

    /// Advance time by one tick
    pub fn tick(&mut self) {
        self.rapid_fire.tick(&self.config.rapid_fire);
    }

    /// Currently selected sensor resolution
    pub fn cpi(&self) -> u16 {
        self.config.dpi.options[self.dpi_index]
    }

    /// Take the resolution that should be applied to the sensor, if it changed
    pub fn take_cpi_update(&mut self) -> Option<u16> {
        self.dpi_dirty.then(|| {
            self.dpi_dirty = false;
            self.cpi()
        })
    }

    /// Discard motion accumulated while reports cannot be sent
    pub fn clear_motion(&mut self) {
        self.xy.clear();
        self.scroll.clear();
    }

    fn set_drag_scroll(&mut self, active: bool) {
        if self.drag_scroll != active {
            defmt::info!("Drag scroll {=bool}", active);
            self.drag_scroll = active;
            // Leftover fraction of a scroll unit must not leak into the next use
            self.scroll.clear();
        }
    }

    fn cycle_dpi(&mut self, inc: Inc) {
        self.dpi_index = inc.wrapping_step(self.dpi_index, self.config.dpi.options.len());
        self.dpi_dirty = true;
        defmt::info!("DPI {=u16}", self.cpi());
    }

    fn report(&self) -> MouseReport {
        let mut buttons = self.buttons;
        if self.rapid_fire.high {
            if let Some(button) = self.rapid_fire.button {
                buttons.set(button, true);
            }
        }
        let (x, y) = self.xy.get();
        let (pan, wheel) = self.scroll.get();
        MouseReport { buttons: buttons.0, x, y, wheel, pan }
    }

    /// Try to push mouse report to endpoint or keep current info for the next report.
    pub fn push_report<'a, B: UsbBus>(&mut self, hid: &mut HidMouse<'a, B>) -> bool {
        let report = self.report();
        match hid.class().push_input(&report) {
            Ok(_len) => {
                self.xy.consume();
                self.scroll.consume();
                true
            },
            Err(e) => match e {
                usb_device::UsbError::WouldBlock => false,
                _ => Err(e).unwrap(),
            },
        }
    }
}

impl MouseButtons {
    pub fn set(&mut self, button: MouseButton, state: bool) {
        match button {
            MouseButton::Left => self.set_left(state),
            MouseButton::Right => self.set_right(state),
            MouseButton::Mid => self.set_mid(state),
            MouseButton::Back => self.set_back(state),
            MouseButton::Forward => self.set_forward(state),
        }
    }
}

impl RapidFire {
    fn start(&mut self, button: MouseButton) {
        self.button = Some(button);
        self.timer = 0;
        self.high = true;
    }

    fn stop(&mut self) {
        self.button = None;
        self.high = false;
    }

    fn tick(&mut self, config: &RapidFireConfig) {
        if self.button.is_none() {
            return;
        }
        self.timer = self.timer.saturating_add(1);
        if self.timer >= (config.period / 2).max(1) {
            self.high = !self.high;
            self.timer = 0;
        }
    }
}

impl Plane {
    const fn new(divider: u16) -> Self {
        Self {
            x: DivAccumulator::new(divider),
            y: DivAccumulator::new(divider),
        }
    }

    fn accumulate(&mut self, dx: i32, dy: i32) {
        self.x.accumulate(dx);
        self.y.accumulate(dy);
    }

    fn get(&self) -> (i8, i8) {
        (self.x.get(), self.y.get())
    }

    fn consume(&mut self) {
        self.x.consume();
        self.y.consume();
    }

    fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
    }
}

impl DivAccumulator {
    pub const fn new(divider: u16) -> Self {
        Self { value: 0, divider }
    }

    pub fn accumulate(&mut self, value: i32) {
        self.value = self.value.saturating_add(value);
    }

    pub fn get(&self) -> i8 {
        (self.value / self.div())
            .clamp(i8::MIN as i32, i8::MAX as i32) as i8
    }

    pub fn consume(&mut self) {
        let rounded = self.get() as i32 * self.div();
        // Avoid loosing small accumulated values by only subtracting the consumed value
        if rounded.abs() > self.value.abs() {
            self.value = 0;
        } else {
            self.value -= rounded;
        }
    }

    pub fn clear(&mut self) {
        self.value = 0;
    }

    fn div(&self) -> i32 {
        // Avoid division by 0, while also avoiding (div + 1)
        self.divider.max(1) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CONFIG: MouseConfig = MouseConfig {
        dpi: DpiConfig {
            options: &[600, 800, 1200],
            default_index: 1,
        },
        drag_scroll: DragScrollConfig {
            divider: 8,
            invert: true,
            momentary: true,
        },
        rapid_fire: RapidFireConfig { period: 4 },
    };

    #[test]
    fn accumulator_carries_remainder() {
        let mut acc = DivAccumulator::new(8);
        acc.accumulate(5);
        assert_eq!(acc.get(), 0);
        acc.accumulate(5);
        assert_eq!(acc.get(), 1);
        acc.consume();
        acc.accumulate(6);
        assert_eq!(acc.get(), 1);
    }

    #[test]
    fn accumulator_negative_remainder() {
        let mut acc = DivAccumulator::new(8);
        acc.accumulate(-11);
        assert_eq!(acc.get(), -1);
        acc.consume();
        acc.accumulate(-5);
        assert_eq!(acc.get(), -1);
    }

    #[test]
    fn accumulator_clamps_to_i8() {
        let mut acc = DivAccumulator::new(1);
        acc.accumulate(300);
        assert_eq!(acc.get(), 127);
        acc.consume();
        // fast motion is spread over subsequent reports instead of being lost
        assert_eq!(acc.get(), 127);
        acc.consume();
        assert_eq!(acc.get(), 46);
        acc.consume();
        assert_eq!(acc.get(), 0);
    }

    #[test]
    fn motion_goes_to_cursor_by_default() {
        let mut mouse = Mouse::new(&CONFIG);
        mouse.update_motion((10, -3));
        let report = mouse.report();
        assert_eq!((report.x, report.y), (10, -3));
        assert_eq!((report.wheel, report.pan), (0, 0));
    }

    #[test]
    fn drag_scroll_diverts_and_inverts_motion() {
        let mut mouse = Mouse::new(&CONFIG);
        mouse.handle_action(&MouseAction::DragScroll, true);
        mouse.update_motion((0, 16));
        let report = mouse.report();
        assert_eq!((report.x, report.y), (0, 0));
        // invert: moving the ball down scrolls up
        assert_eq!(report.wheel, -2);
        mouse.handle_action(&MouseAction::DragScroll, false);
        mouse.update_motion((3, 4));
        let report = mouse.report();
        assert_eq!((report.x, report.y), (3, 4));
    }

    #[test]
    fn drag_scroll_momentary_follows_key_state() {
        let mut mouse = Mouse::new(&CONFIG);
        mouse.handle_action(&MouseAction::DragScroll, true);
        assert!(mouse.drag_scroll);
        mouse.handle_action(&MouseAction::DragScroll, false);
        assert!(!mouse.drag_scroll);
    }

    #[test]
    fn drag_scroll_end_clears_fraction() {
        let mut mouse = Mouse::new(&CONFIG);
        mouse.handle_action(&MouseAction::DragScroll, true);
        mouse.update_motion((0, 7));
        mouse.handle_action(&MouseAction::DragScroll, false);
        mouse.handle_action(&MouseAction::DragScroll, true);
        mouse.update_motion((0, 7));
        let report = mouse.report();
        assert_eq!(report.wheel, 0);
    }

    #[test]
    fn click_sets_and_clears_buttons() {
        let mut mouse = Mouse::new(&CONFIG);
        mouse.handle_action(&MouseAction::Click(MouseButton::Back), true);
        mouse.handle_action(&MouseAction::Click(MouseButton::Left), true);
        assert_eq!(mouse.report().buttons, 0b1001);
        mouse.handle_action(&MouseAction::Click(MouseButton::Left), false);
        assert_eq!(mouse.report().buttons, 0b1000);
    }

    #[test]
    fn rapid_fire_alternates_at_half_period() {
        let mut mouse = Mouse::new(&CONFIG);
        mouse.handle_action(&MouseAction::RapidFire(MouseButton::Left), true);
        // period 4: down for 2 ticks, up for 2 ticks
        let mut states = std::vec::Vec::new();
        for _ in 0..8 {
            states.push(mouse.report().buttons & 1);
            mouse.tick();
        }
        assert_eq!(states, [1, 1, 0, 0, 1, 1, 0, 0]);
        mouse.handle_action(&MouseAction::RapidFire(MouseButton::Left), false);
        assert_eq!(mouse.report().buttons, 0);
    }

    #[test]
    fn rapid_fire_does_not_mask_real_button() {
        let mut mouse = Mouse::new(&CONFIG);
        mouse.handle_action(&MouseAction::Click(MouseButton::Left), true);
        mouse.handle_action(&MouseAction::RapidFire(MouseButton::Left), true);
        for _ in 0..3 {
            mouse.tick();
        }
        // rapid fire pulse is low but the key is still physically held
        assert_eq!(mouse.report().buttons & 1, 1);
    }

    #[test]
    fn dpi_cycles_with_wraparound() {
        let mut mouse = Mouse::new(&CONFIG);
        assert_eq!(mouse.cpi(), 800);
        assert_eq!(mouse.take_cpi_update(), None);
        mouse.handle_action(&MouseAction::Sensitivity(Inc::Up), true);
        mouse.handle_action(&MouseAction::Sensitivity(Inc::Up), false);
        assert_eq!(mouse.take_cpi_update(), Some(1200));
        assert_eq!(mouse.take_cpi_update(), None);
        mouse.handle_action(&MouseAction::Sensitivity(Inc::Up), true);
        assert_eq!(mouse.take_cpi_update(), Some(600));
        mouse.handle_action(&MouseAction::Sensitivity(Inc::Up), true);
        assert_eq!(mouse.take_cpi_update(), Some(800));
    }
}
