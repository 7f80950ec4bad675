use heapless::{Deque, Vec};
use keyberon::layout::Event;

use super::actions::Action;

const PENDING_CAPACITY: usize = 8;
const QUEUE_CAPACITY: usize = 8;

/// Static definition of a chord
///
/// Chords are matched on physical key positions, so they stay available on
/// every layer. Configured chords must not share keys.
pub struct ComboConfig {
    /// Key positions that must be pressed together
    pub keys: &'static [(u8, u8)],
    /// Action emitted when the chord completes
    pub action: &'static Action,
}

/// Result of feeding scanned key events through chord recognition
#[cfg_attr(test, derive(Debug, PartialEq))]
pub enum Output {
    /// Event to be forwarded to the layout
    Event(Event),
    /// A chord completed (`true`) or was fully released (`false`)
    Action(&'static Action, bool),
}

/// Chord recognizer
///
/// Press events of chord member keys are held back for up to the combo term.
/// If the whole chord arrives within the term it is swallowed and replaced
/// with the combo action; otherwise the events are flushed to the layout in
/// arrival order.
pub struct Combos {
    configs: &'static [ComboConfig],
    term: u16,
    timer: u16,
    pending: Vec<Event, PENDING_CAPACITY>,
    // (combo index, mask of members not yet released, release already emitted)
    active: Option<(usize, u32, bool)>,
    queue: Deque<Output, QUEUE_CAPACITY>,
}

impl Combos {
    pub fn new(configs: &'static [ComboConfig], term: u16) -> Self {
        Self {
            configs,
            term,
            timer: 0,
            pending: Vec::new(),
            active: None,
            queue: Deque::new(),
        }
    }

    /// Feed a scanned key event; results are collected with [`Self::pop`]
    pub fn process(&mut self, event: Event) {
        match event {
            Event::Press(..) => self.on_press(event),
            Event::Release(..) => self.on_release(event),
        }
    }

    /// Advance time by one tick, flushing chords that did not complete in time
    pub fn tick(&mut self) {
        if !self.pending.is_empty() {
            self.timer = self.timer.saturating_add(1);
            if self.timer >= self.term {
                self.flush();
            }
        }
    }

    /// Get next recognizer output
    pub fn pop(&mut self) -> Option<Output> {
        self.queue.pop_front()
    }

    fn on_press(&mut self, event: Event) {
        let coord = event.coord();
        let combo = self.configs.iter().position(|c| c.keys.contains(&coord));
        match combo {
            Some(index) if self.active.is_none() => {
                if self.pending.is_empty() {
                    self.timer = 0;
                }
                if self.pending.push(event).is_err() {
                    // No space to wait for the chord, give up on it
                    self.flush();
                    self.push_out(Output::Event(event));
                    return;
                }
                let config: &'static ComboConfig = &self.configs[index];
                let complete = config.keys.iter()
                    .all(|k| self.pending.iter().any(|e| e.coord() == *k));
                if complete {
                    defmt::info!("Combo {=usize} fired", index);
                    self.pending.retain(|e| !config.keys.contains(&e.coord()));
                    self.flush();
                    self.active = Some((index, (1 << config.keys.len()) - 1, false));
                    self.push_out(Output::Action(config.action, true));
                }
            },
            // Member of an already active chord pressed again: pass through
            _ => {
                self.flush();
                self.push_out(Output::Event(event));
            },
        }
    }

    fn on_release(&mut self, event: Event) {
        let coord = event.coord();

        if let Some((index, mut mask, mut released)) = self.active.take() {
            let config: &'static ComboConfig = &self.configs[index];
            let key = config.keys.iter().position(|k| *k == coord);
            match key {
                // Swallow only releases of members held since the chord fired;
                // a member re-pressed later behaves as a normal key
                Some(key) if mask & (1 << key) != 0 => {
                    // First member release ends the chord, the rest is swallowed
                    if !released {
                        released = true;
                        self.push_out(Output::Action(config.action, false));
                    }
                    mask &= !(1 << key);
                    if mask != 0 {
                        self.active = Some((index, mask, released));
                    }
                    return;
                },
                _ => self.active = Some((index, mask, released)),
            }
        }

        if self.pending.iter().any(|e| e.coord() == coord) {
            // Released before the chord completed
            self.flush();
            self.push_out(Output::Event(event));
        } else {
            self.push_out(Output::Event(event));
        }
    }

    fn flush(&mut self) {
        // Cannot overflow the queue: both buffers have the same capacity and
        // the queue is drained before each scan.
        for event in self.pending.iter() {
            let _ = self.queue.push_back(Output::Event(*event));
        }
        self.pending.clear();
        self.timer = 0;
    }

    fn push_out(&mut self, output: Output) {
        if self.queue.push_back(output).is_err() {
            defmt::error!("Combo output queue overflow");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trackball::actions::Action;

    const TERM: u16 = 5;
    const TOGGLE: Action = Action::ToggleLayer(2);

    static COMBOS: [ComboConfig; 1] = [ComboConfig {
        keys: &[(0, 0), (0, 2)],
        action: &TOGGLE,
    }];

    fn combos() -> Combos {
        Combos::new(&COMBOS, TERM)
    }

    fn drain(c: &mut Combos) -> std::vec::Vec<Output> {
        let mut out = std::vec::Vec::new();
        while let Some(o) = c.pop() {
            out.push(o);
        }
        out
    }

    #[test]
    fn chord_within_term_fires_action() {
        let mut c = combos();
        c.process(Event::Press(0, 0));
        c.tick();
        assert_eq!(drain(&mut c), []);
        c.process(Event::Press(0, 2));
        assert_eq!(drain(&mut c), [Output::Action(&TOGGLE, true)]);
        // member releases are swallowed, action released on the first one
        c.process(Event::Release(0, 2));
        assert_eq!(drain(&mut c), [Output::Action(&TOGGLE, false)]);
        c.process(Event::Release(0, 0));
        assert_eq!(drain(&mut c), []);
    }

    #[test]
    fn lone_member_flushes_after_term() {
        let mut c = combos();
        c.process(Event::Press(0, 0));
        for _ in 0..TERM - 1 {
            c.tick();
            assert_eq!(drain(&mut c), []);
        }
        c.tick();
        assert_eq!(drain(&mut c), [Output::Event(Event::Press(0, 0))]);
        // after the flush the key behaves normally
        c.process(Event::Release(0, 0));
        assert_eq!(drain(&mut c), [Output::Event(Event::Release(0, 0))]);
    }

    #[test]
    fn release_before_completion_flushes() {
        let mut c = combos();
        c.process(Event::Press(0, 0));
        c.tick();
        c.process(Event::Release(0, 0));
        assert_eq!(drain(&mut c), [
            Output::Event(Event::Press(0, 0)),
            Output::Event(Event::Release(0, 0)),
        ]);
    }

    #[test]
    fn non_member_press_flushes_pending() {
        let mut c = combos();
        c.process(Event::Press(0, 0));
        c.process(Event::Press(0, 4));
        assert_eq!(drain(&mut c), [
            Output::Event(Event::Press(0, 0)),
            Output::Event(Event::Press(0, 4)),
        ]);
    }

    #[test]
    fn non_member_events_pass_through() {
        let mut c = combos();
        c.process(Event::Press(0, 3));
        c.process(Event::Release(0, 3));
        assert_eq!(drain(&mut c), [
            Output::Event(Event::Press(0, 3)),
            Output::Event(Event::Release(0, 3)),
        ]);
    }

    #[test]
    fn chord_can_fire_again_after_full_release() {
        let mut c = combos();
        for _ in 0..2 {
            c.process(Event::Press(0, 0));
            c.process(Event::Press(0, 2));
            assert_eq!(drain(&mut c), [Output::Action(&TOGGLE, true)]);
            c.process(Event::Release(0, 0));
            c.process(Event::Release(0, 2));
            assert_eq!(drain(&mut c), [Output::Action(&TOGGLE, false)]);
        }
    }

    #[test]
    fn member_press_while_chord_active_passes_through() {
        let mut c = combos();
        c.process(Event::Press(0, 0));
        c.process(Event::Press(0, 2));
        drain(&mut c);
        // e.g. bouncing or re-press while still holding the other member
        c.process(Event::Release(0, 0));
        c.process(Event::Press(0, 0));
        assert_eq!(drain(&mut c), [
            Output::Action(&TOGGLE, false),
            Output::Event(Event::Press(0, 0)),
        ]);
        // the re-pressed key now releases normally instead of being swallowed
        c.process(Event::Release(0, 0));
        assert_eq!(drain(&mut c), [Output::Event(Event::Release(0, 0))]);
        // the chord itself ends once the remaining member goes up
        c.process(Event::Release(0, 2));
        assert_eq!(drain(&mut c), []);
    }
}
