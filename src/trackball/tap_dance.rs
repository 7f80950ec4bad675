use super::actions::Action;

/// Maximum number of entries in the tap dance table
pub const MAX_TAP_DANCES: usize = 4;

/// Action output of a tap dance: `(action, pressed)`
pub type Output = (&'static Action, bool);

/// Classification of the recent press sequence of a tap dance key
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub enum DanceState {
    None,
    Unknown,
    SingleTap,
    SingleHold,
    DoubleSingleTap,
}

/// Static configuration of a single tap dance key
pub struct TapDanceConfig {
    /// Position of the dance key; its own presses never interrupt the dance
    pub key: (u8, u8),
    /// Ticks since the last press after which the dance resolves
    pub tapping_term: u16,
    /// Action dispatched on a single tap
    pub tap: &'static Action,
    /// Action held active for as long as a single-press hold lasts
    pub hold: &'static Action,
    /// Action dispatched on a double tap
    pub double_tap: Option<&'static Action>,
}

/// Runtime state of one tap dance key
///
/// The key's press/release events and periodic ticks are fed in; once the
/// press sequence can be classified (tapping term expired or another key
/// interrupted the dance) the mapped action is emitted as a press, with the
/// matching release following when the dance resets.
pub struct TapDance {
    config: &'static TapDanceConfig,
    count: u8,
    pressed: bool,
    interrupted: bool,
    timer: u16,
    resolved: Option<DanceState>,
    // Release edge delayed by one tick so the host sees both report edges
    pending_release: Option<&'static Action>,
}

impl TapDance {
    pub fn new(config: &'static TapDanceConfig) -> Self {
        Self {
            config,
            count: 0,
            pressed: false,
            interrupted: false,
            timer: 0,
            resolved: None,
            pending_release: None,
        }
    }

    /// Position of the dance key
    pub fn key(&self) -> (u8, u8) {
        self.config.key
    }

    /// Feed a press of the tap dance key
    pub fn on_press(&mut self) -> Option<Output> {
        debug_assert!(self.resolved.is_none(), "Press while previous dance not reset");
        self.count = self.count.saturating_add(1);
        self.pressed = true;
        self.timer = 0;
        None
    }

    /// Feed a release of the tap dance key
    pub fn on_release(&mut self) -> Option<Output> {
        self.pressed = false;
        if let Some(state) = self.resolved {
            // Dance already resolved (hold), release its action now
            let out = Self::action_for(self.config, state).map(|a| (a, false));
            self.reset();
            out
        } else {
            None
        }
    }

    /// A different key was pressed, ending an ongoing dance early
    pub fn on_interrupt(&mut self) -> Option<Output> {
        if self.count > 0 && self.resolved.is_none() {
            self.interrupted = true;
            self.resolve()
        } else {
            None
        }
    }

    /// Advance dance timing by one tick
    pub fn tick(&mut self) -> Option<Output> {
        if let Some(action) = self.pending_release.take() {
            return Some((action, false));
        }
        if self.count > 0 && self.resolved.is_none() {
            self.timer = self.timer.saturating_add(1);
            if self.timer >= self.config.tapping_term {
                return self.resolve();
            }
        }
        None
    }

    fn classify(&self) -> DanceState {
        match self.count {
            0 => DanceState::None,
            1 if self.interrupted || !self.pressed => DanceState::SingleTap,
            1 => DanceState::SingleHold,
            2 => DanceState::DoubleSingleTap,
            _ => DanceState::Unknown,
        }
    }

    fn action_for(config: &TapDanceConfig, state: DanceState) -> Option<&'static Action> {
        match state {
            DanceState::SingleTap => Some(config.tap),
            DanceState::SingleHold => Some(config.hold),
            DanceState::DoubleSingleTap => config.double_tap,
            DanceState::None | DanceState::Unknown => None,
        }
    }

    fn resolve(&mut self) -> Option<Output> {
        let state = self.classify();
        let action = Self::action_for(self.config, state);
        if self.pressed {
            // Release comes later, when the key goes up
            self.resolved = Some(state);
        } else {
            if let Some(action) = action {
                self.pending_release = Some(action);
            }
            self.reset();
        }
        action.map(|a| (a, true))
    }

    fn reset(&mut self) {
        self.count = 0;
        self.pressed = false;
        self.interrupted = false;
        self.timer = 0;
        self.resolved = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trackball::actions::{MouseAction, MouseButton};

    const TERM: u16 = 5;
    const TAP: Action = Action::Mouse(MouseAction::Click(MouseButton::Right));
    const HOLD: Action = Action::Mouse(MouseAction::DragScroll);
    const DOUBLE: Action = Action::Mouse(MouseAction::Click(MouseButton::Mid));

    static CONFIG: TapDanceConfig = TapDanceConfig {
        key: (0, 3),
        tapping_term: TERM,
        tap: &TAP,
        hold: &HOLD,
        double_tap: None,
    };

    static CONFIG_WITH_DOUBLE: TapDanceConfig = TapDanceConfig {
        key: (0, 3),
        tapping_term: TERM,
        tap: &TAP,
        hold: &HOLD,
        double_tap: Some(&DOUBLE),
    };

    enum Step {
        Press,
        Release,
        // Tick N times expecting no output
        Quiet(u16),
        // Tick once expecting given output
        Tick(&'static Action, bool),
    }

    fn scenario<const N: usize>(config: &'static TapDanceConfig, steps: [Step; N]) {
        let mut td = TapDance::new(config);
        for (i, step) in steps.into_iter().enumerate() {
            match step {
                Step::Press => assert_eq!(td.on_press(), None, "at step {}", i),
                Step::Release => assert_eq!(td.on_release(), None, "at step {}", i),
                Step::Quiet(n) => {
                    for t in 0..n {
                        assert_eq!(td.tick(), None, "at step {} tick {}", i, t);
                    }
                },
                Step::Tick(action, pressed) => {
                    assert_eq!(td.tick(), Some((action, pressed)), "at step {}", i);
                },
            }
        }
    }

    use Step::*;

    #[test]
    fn single_tap_resolves_at_term() {
        scenario(&CONFIG, [
            Press,
            Quiet(2),
            Release,
            Quiet(TERM - 3),
            Tick(&TAP, true),
            Tick(&TAP, false),
            Quiet(3 * TERM),
        ]);
    }

    #[test]
    fn single_hold_resolves_at_term_releases_with_key() {
        let mut td = TapDance::new(&CONFIG);
        td.on_press();
        for _ in 0..TERM - 1 {
            assert_eq!(td.tick(), None);
        }
        assert_eq!(td.tick(), Some((&HOLD, true)));
        // held: nothing more until release
        for _ in 0..10 {
            assert_eq!(td.tick(), None);
        }
        assert_eq!(td.on_release(), Some((&HOLD, false)));
    }

    #[test]
    fn interrupted_press_is_a_tap() {
        let mut td = TapDance::new(&CONFIG);
        td.on_press();
        td.tick();
        assert_eq!(td.on_interrupt(), Some((&TAP, true)));
        // still held, so the release is tied to the key release
        assert_eq!(td.tick(), None);
        assert_eq!(td.on_release(), Some((&TAP, false)));
    }

    #[test]
    fn double_tap_without_mapping_is_silent() {
        scenario(&CONFIG, [
            Press,
            Quiet(1),
            Release,
            Quiet(2),
            Press,
            Quiet(1),
            Release,
            Quiet(3 * TERM),
        ]);
    }

    #[test]
    fn double_tap_with_mapping_fires() {
        scenario(&CONFIG_WITH_DOUBLE, [
            Press,
            Quiet(1),
            Release,
            Quiet(2),
            Press,
            Quiet(1),
            Release,
            Quiet(TERM - 2),  // term counts from the second press
            Tick(&DOUBLE, true),
            Tick(&DOUBLE, false),
        ]);
    }

    #[test]
    fn second_press_within_term_extends_the_dance() {
        let mut td = TapDance::new(&CONFIG);
        td.on_press();
        for _ in 0..TERM - 1 {
            assert_eq!(td.tick(), None);
        }
        td.on_release();
        // new press just before the term restarts the timer
        td.on_press();
        for _ in 0..TERM - 1 {
            assert_eq!(td.tick(), None);
        }
        // count == 2 and no double-tap action configured
        assert_eq!(td.tick(), None);
    }

    #[test]
    fn triple_tap_is_unknown_and_silent() {
        scenario(&CONFIG_WITH_DOUBLE, [
            Press, Release, Quiet(1),
            Press, Release, Quiet(1),
            Press, Release,
            Quiet(3 * TERM),
        ]);
    }

    #[test]
    fn new_dance_can_start_while_release_is_pending() {
        let mut td = TapDance::new(&CONFIG);
        td.on_press();
        td.on_release();
        for _ in 0..TERM - 1 {
            assert_eq!(td.tick(), None);
        }
        assert_eq!(td.tick(), Some((&TAP, true)));
        // press again before the pending release has been emitted
        td.on_press();
        assert_eq!(td.tick(), Some((&TAP, false)));
        td.on_release();
        for _ in 0..TERM - 1 {
            assert_eq!(td.tick(), None);
        }
        assert_eq!(td.tick(), Some((&TAP, true)));
        assert_eq!(td.tick(), Some((&TAP, false)));
    }
}
