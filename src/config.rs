//! Trackball configuration
//!
//! Keymap layers over the 5 buttons (left, middle, right, back, forward)
//! plus the parameters of mouse emulation, tap dances and chords.

use keyberon::{
    action::{self, k, l, Action::*, HoldTapConfig},
    key_code::KeyCode::*,
    layout::{self, layout},
};
use static_assertions as sa;

use crate::bsp::{sensor, NKEYS};
use crate::trackball::actions::{Action as CustomAction, Inc, MouseAction, MouseButton};
use crate::trackball::combos::ComboConfig;
use crate::trackball::mouse::{DpiConfig, DragScrollConfig, MouseConfig, RapidFireConfig};
use crate::trackball::tap_dance::TapDanceConfig;
use crate::trackball::TrackballConfig;

type Layers = layout::Layers<NKEYS, 1, N_LAYERS, CustomAction>;
type Action = action::Action<CustomAction>;

pub static CONFIG: TrackballConfig<N_LAYERS> = TrackballConfig {
    layers: &LAYERS,
    mouse: &MOUSE,
    tap_dances: &TAP_DANCES,
    combos: &COMBOS,
    combo_term: COMBO_TERM,
};

/// Sensor orientation and power-up resolution
pub const SENSOR: sensor::Config = sensor::Config {
    cpi: DPI_OPTIONS[DPI_DEFAULT],
    invert_x: false,
    invert_y: false,
    swap_xy: false,
};

/// Ticks within which a key press must end to count as a tap
const TAPPING_TERM: u16 = 175;
/// Ticks within which chord members must be pressed together
const COMBO_TERM: u16 = 50;

/// Sensor resolutions cycled by the DPI key
const DPI_OPTIONS: [u16; 3] = [600, 800, 1200];
/// Index of the power-up resolution
const DPI_DEFAULT: usize = 1;

sa::const_assert!(DPI_DEFAULT < DPI_OPTIONS.len());
sa::const_assert!(DPI_OPTIONS[0] % sensor::CPI_STEP == 0);
sa::const_assert!(DPI_OPTIONS[1] % sensor::CPI_STEP == 0);
sa::const_assert!(DPI_OPTIONS[2] % sensor::CPI_STEP == 0);
sa::const_assert!(DPI_OPTIONS[2] <= sensor::CPI_MAX);

const HTC: HoldTapConfig = HoldTapConfig::Default;

macro_rules! ht {
    ($hold:expr, $tap:expr, $tout:expr) => {
        HoldTap {
            timeout: $tout,
            hold: &$hold,
            tap: &$tap,
            tap_hold_interval: 0,
            config: HTC,
        }
    };
    ($hold:expr, $tap:expr) => {
        ht!($hold, $tap, TAPPING_TERM)
    };
}

const M_LEFT: Action = Custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Left)));
const M_RIGHT: Action = Custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Right)));
const M_MID: Action = Custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Mid)));
const M_BACK: Action = Custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Back)));
const M_FWD: Action = Custom(CustomAction::Mouse(MouseAction::Click(MouseButton::Forward)));

// The right button doubles as middle mouse when held
const TH_MID_BACK: Action = ht!(M_MID, M_BACK);
// Forward button selects the function layer when held
const L1_FWD: Action = ht!(l(1), M_FWD);
const L3_FWD: Action = ht!(l(3), M_FWD);

const TD_SCROLL: Action = Custom(CustomAction::TapDance(0));
const DRAG_SCROLL: Action = Custom(CustomAction::Mouse(MouseAction::DragScroll));
const RAPID_FIRE: Action = Custom(CustomAction::Mouse(MouseAction::RapidFire(MouseButton::Left)));
const DPI_CYCLE: Action = Custom(CustomAction::Mouse(MouseAction::Sensitivity(Inc::Up)));
const BOOT: Action = Custom(CustomAction::Bootloader);

const ALT_LEFT: Action = MultipleActions(&[k(LAlt), M_LEFT]);
const CTRL_LEFT: Action = MultipleActions(&[k(LCtrl), M_LEFT]);

pub const N_LAYERS: usize = 4;
static LAYERS: Layers = layout! {
    { // Base
        [ {M_LEFT} {M_MID} {TH_MID_BACK} {TD_SCROLL} {L1_FWD} ]
    }
    { // Function (hold forward)
        [ {ALT_LEFT} {BOOT} {RAPID_FIRE} {DPI_CYCLE} t ]
    }
    { // Scroll-centric base, toggled by the left+right chord
        [ {M_LEFT} {M_MID} {DRAG_SCROLL} {M_RIGHT} {L3_FWD} ]
    }
    { // Function for the scroll-centric base
        [ {CTRL_LEFT} {BOOT} {RAPID_FIRE} {DPI_CYCLE} t ]
    }
};

// Back button: tap for right click, hold for drag scroll
const TD_SCROLL_TAP: CustomAction = CustomAction::Mouse(MouseAction::Click(MouseButton::Right));
const TD_SCROLL_HOLD: CustomAction = CustomAction::Mouse(MouseAction::DragScroll);

static TAP_DANCES: [TapDanceConfig; 1] = [
    TapDanceConfig {
        key: (0, 3),
        tapping_term: TAPPING_TERM,
        tap: &TD_SCROLL_TAP,
        hold: &TD_SCROLL_HOLD,
        double_tap: None,
    },
];

// Left + right button together toggle the scroll-centric layer pair
const COMBO_TOGGLE: CustomAction = CustomAction::ToggleLayer(2);

static COMBOS: [ComboConfig; 1] = [
    ComboConfig {
        keys: &[(0, 0), (0, 2)],
        action: &COMBO_TOGGLE,
    },
];

static MOUSE: MouseConfig = MouseConfig {
    dpi: DpiConfig {
        options: &DPI_OPTIONS,
        default_index: DPI_DEFAULT,
    },
    drag_scroll: DragScrollConfig {
        // 800 CPI / 8 gives the feel of the fixed 100 CPI drag resolution
        divider: 8,
        invert: true,
        momentary: true,
    },
    rapid_fire: RapidFireConfig {
        // 20 clicks per second
        period: 50,
    },
};
