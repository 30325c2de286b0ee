//! Fan-in of keyboard, gamepad and pointer sources into the two signals the
//! engines consume: a lateral axis and a fire edge.
//!
//! Raw events only update per-source state. Nothing is derived until
//! [`InputFusion::sample`] runs once per tick, so the order in which sources
//! report never changes the outcome of a tick.

/// Logical keyboard controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Left,
    Right,
    Fire,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum GamepadButton {
    South,
    East,
    West,
    North,
    LeftShoulder,
    RightShoulder,
    LeftTrigger,
    RightTrigger,
    Start,
    Select,
}

/// Any of these buttons counts as "fire".
pub const FIRE_BUTTONS: [GamepadButton; 6] = [
    GamepadButton::South,
    GamepadButton::East,
    GamepadButton::West,
    GamepadButton::North,
    GamepadButton::RightShoulder,
    GamepadButton::RightTrigger,
];

pub const DEFAULT_STICK_DEADZONE: f64 = 0.2;
/// Keyboard axis change per millisecond while a direction is held (full deflection in 125 ms).
pub const KEY_AXIS_RAMP_PER_MS: f64 = 0.008;
/// Without release reporting, a key counts as held this long after its last press or repeat.
/// Longer than typical auto-repeat delay so a held key does not flicker.
pub const UNRELEASED_KEY_TIMEOUT_MS: f64 = 550.0;
/// Fire is a tap, not a hold: expire it quickly so a second tap registers as a new edge.
pub const UNRELEASED_FIRE_TIMEOUT_MS: f64 = 100.0;

/// One polled gamepad state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GamepadSnapshot {
    /// Horizontal stick deflection in [-1, 1].
    pub axis_x: f64,
    pub pressed: Vec<GamepadButton>,
}

impl GamepadSnapshot {
    pub fn fire_held(&self) -> bool {
        self.pressed.iter().any(|b| FIRE_BUTTONS.contains(b))
    }
}

/// Polled once per tick. `None` means no pad is connected.
pub trait GamepadSource {
    fn poll(&mut self) -> Option<GamepadSnapshot>;
}

/// Source for environments without gamepad support.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGamepad;

impl GamepadSource for NoGamepad {
    fn poll(&mut self) -> Option<GamepadSnapshot> {
        None
    }
}

/// The fused per-tick input. Read-only for the engines.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputFrame {
    pub axis: f64,
    pub fire_held: bool,
    pub fire_pressed: bool,
    pub fire_released: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct HeldKey {
    held: bool,
    since_seen_ms: f64,
}

impl HeldKey {
    fn press(&mut self) {
        self.held = true;
        self.since_seen_ms = 0.0;
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn age(&mut self, dt_ms: f64, release_events: bool, timeout_ms: f64) {
        if !self.held {
            return;
        }
        self.since_seen_ms += dt_ms;
        if !release_events && self.since_seen_ms >= timeout_ms {
            self.held = false;
        }
    }
}

#[derive(Debug)]
pub struct InputFusion {
    left: HeldKey,
    right: HeldKey,
    fire_key: HeldKey,
    release_events: bool,
    keyboard_axis: f64,
    pointer_down: bool,
    gamepad: Option<GamepadSnapshot>,
    deadzone: f64,
    prev_fire_held: bool,
}

impl Default for InputFusion {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InputFusion {
    /// `release_events` tells whether the keyboard source reports key releases.
    pub fn new(release_events: bool) -> Self {
        Self {
            left: HeldKey::default(),
            right: HeldKey::default(),
            fire_key: HeldKey::default(),
            release_events,
            keyboard_axis: 0.0,
            pointer_down: false,
            gamepad: None,
            deadzone: DEFAULT_STICK_DEADZONE,
            prev_fire_held: false,
        }
    }

    pub fn with_deadzone(mut self, deadzone: f64) -> Self {
        self.deadzone = deadzone.clamp(0.0, 0.95);
        self
    }

    /// Key down, or an auto-repeat of a held key.
    pub fn press(&mut self, control: Control) {
        self.key_mut(control).press();
    }

    pub fn release(&mut self, control: Control) {
        self.key_mut(control).release();
    }

    pub fn pointer_down(&mut self) {
        self.pointer_down = true;
    }

    pub fn pointer_up(&mut self) {
        self.pointer_down = false;
    }

    pub fn poll_gamepad(&mut self, source: &mut dyn GamepadSource) {
        self.gamepad = source.poll();
    }

    /// Drop all held state, e.g. when the terminal loses focus.
    pub fn clear(&mut self) {
        self.left.release();
        self.right.release();
        self.fire_key.release();
        self.pointer_down = false;
        self.gamepad = None;
        self.keyboard_axis = 0.0;
    }

    fn key_mut(&mut self, control: Control) -> &mut HeldKey {
        match control {
            Control::Left => &mut self.left,
            Control::Right => &mut self.right,
            Control::Fire => &mut self.fire_key,
        }
    }

    /// Reduce every source into one frame. Call exactly once per tick.
    pub fn sample(&mut self, dt_ms: f64) -> InputFrame {
        let dt_ms = if dt_ms.is_finite() { dt_ms.max(0.0) } else { 0.0 };

        let target = match (self.left.held, self.right.held) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        };
        let step = KEY_AXIS_RAMP_PER_MS * dt_ms;
        self.keyboard_axis = if self.keyboard_axis < target {
            (self.keyboard_axis + step).min(target)
        } else {
            (self.keyboard_axis - step).max(target)
        };

        let axis = match self.gamepad_axis() {
            Some(stick) => stick,
            None => self.keyboard_axis,
        };

        let fire_held = self.fire_key.held
            || self.pointer_down
            || self.gamepad.as_ref().is_some_and(GamepadSnapshot::fire_held);
        let frame = InputFrame {
            axis: axis.clamp(-1.0, 1.0),
            fire_held,
            fire_pressed: fire_held && !self.prev_fire_held,
            fire_released: !fire_held && self.prev_fire_held,
        };
        self.prev_fire_held = fire_held;

        // Expire stale holds after this tick has seen them.
        self.left
            .age(dt_ms, self.release_events, UNRELEASED_KEY_TIMEOUT_MS);
        self.right
            .age(dt_ms, self.release_events, UNRELEASED_KEY_TIMEOUT_MS);
        self.fire_key
            .age(dt_ms, self.release_events, UNRELEASED_FIRE_TIMEOUT_MS);

        frame
    }

    /// Stick deflection rescaled past the deadzone, if the stick is engaged.
    fn gamepad_axis(&self) -> Option<f64> {
        let x = self.gamepad.as_ref()?.axis_x;
        if !x.is_finite() || x.abs() <= self.deadzone {
            return None;
        }
        let scaled = (x.abs() - self.deadzone) / (1.0 - self.deadzone);
        Some(scaled.min(1.0).copysign(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedPad(Vec<Option<GamepadSnapshot>>);

    impl GamepadSource for ScriptedPad {
        fn poll(&mut self) -> Option<GamepadSnapshot> {
            if self.0.is_empty() {
                None
            } else {
                self.0.remove(0)
            }
        }
    }

    fn pad(axis_x: f64, pressed: &[GamepadButton]) -> Option<GamepadSnapshot> {
        Some(GamepadSnapshot {
            axis_x,
            pressed: pressed.to_vec(),
        })
    }

    #[test]
    fn keyboard_axis_ramps_over_time() {
        let mut input = InputFusion::new(true);
        input.press(Control::Right);

        let first = input.sample(50.0);
        assert!((first.axis - 0.4).abs() < 1e-9);
        let second = input.sample(100.0);
        assert_eq!(second.axis, 1.0);

        input.release(Control::Right);
        let third = input.sample(50.0);
        assert!((third.axis - 0.6).abs() < 1e-9);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut input = InputFusion::new(true);
        input.press(Control::Left);
        input.press(Control::Right);
        assert_eq!(input.sample(500.0).axis, 0.0);
    }

    #[test]
    fn zero_dt_does_not_move_axis() {
        let mut input = InputFusion::new(true);
        input.press(Control::Left);
        assert_eq!(input.sample(0.0).axis, 0.0);
    }

    #[test]
    fn fire_edge_fires_once_per_press() {
        let mut input = InputFusion::new(true);
        input.press(Control::Fire);
        let f1 = input.sample(16.0);
        assert!(f1.fire_pressed && f1.fire_held);
        let f2 = input.sample(16.0);
        assert!(!f2.fire_pressed && f2.fire_held);
        input.release(Control::Fire);
        let f3 = input.sample(16.0);
        assert!(f3.fire_released && !f3.fire_held);
    }

    #[test]
    fn simultaneous_sources_do_not_double_fire() {
        let mut input = InputFusion::new(true);
        let mut source = ScriptedPad(vec![pad(0.0, &[GamepadButton::South])]);
        input.press(Control::Fire);
        input.pointer_down();
        input.poll_gamepad(&mut source);

        let frame = input.sample(16.0);
        assert!(frame.fire_pressed);

        // Keyboard lets go while pointer still holds: no new edge, no release.
        input.release(Control::Fire);
        let frame = input.sample(16.0);
        assert!(!frame.fire_pressed);
        assert!(!frame.fire_released);

        // A second source asserting while another is held is not an edge either.
        input.press(Control::Fire);
        assert!(!input.sample(16.0).fire_pressed);
    }

    #[test]
    fn press_and_release_between_ticks_is_missed_not_doubled() {
        let mut input = InputFusion::new(true);
        input.pointer_down();
        input.pointer_up();
        let frame = input.sample(16.0);
        assert!(!frame.fire_pressed);
        assert!(!frame.fire_held);
    }

    #[test]
    fn non_fire_gamepad_buttons_are_ignored() {
        let mut input = InputFusion::new(true);
        let mut source = ScriptedPad(vec![pad(0.0, &[GamepadButton::Start])]);
        input.poll_gamepad(&mut source);
        assert!(!input.sample(16.0).fire_held);
    }

    #[test]
    fn stick_inside_deadzone_defers_to_keyboard() {
        let mut input = InputFusion::new(true).with_deadzone(0.2);
        let mut source = ScriptedPad(vec![pad(0.1, &[]), pad(-0.6, &[])]);
        input.press(Control::Right);

        input.poll_gamepad(&mut source);
        let frame = input.sample(200.0);
        assert_eq!(frame.axis, 1.0);

        input.poll_gamepad(&mut source);
        let frame = input.sample(16.0);
        assert!((frame.axis - (-0.5)).abs() < 1e-9);
    }

    #[test]
    fn full_stick_maps_to_full_axis() {
        let mut input = InputFusion::new(true);
        let mut source = ScriptedPad(vec![pad(1.0, &[])]);
        input.poll_gamepad(&mut source);
        assert_eq!(input.sample(16.0).axis, 1.0);
    }

    #[test]
    fn disconnect_clears_gamepad_state() {
        let mut input = InputFusion::new(true);
        let mut source = ScriptedPad(vec![pad(0.0, &[GamepadButton::East]), None]);
        input.poll_gamepad(&mut source);
        assert!(input.sample(16.0).fire_held);
        input.poll_gamepad(&mut source);
        assert!(input.sample(16.0).fire_released);
    }

    #[test]
    fn unreleased_keys_expire_without_release_events() {
        let mut input = InputFusion::new(false);
        input.press(Control::Right);
        assert_eq!(input.sample(300.0).axis, 1.0);
        input.sample(300.0);
        for _ in 0..20 {
            input.sample(16.0);
        }
        assert_eq!(input.sample(16.0).axis, 0.0);
    }

    #[test]
    fn quick_second_tap_fires_again_without_release_events() {
        let mut input = InputFusion::new(false);
        input.press(Control::Fire);
        assert!(input.sample(16.0).fire_pressed);
        let mut released = false;
        for _ in 0..9 {
            released |= input.sample(16.0).fire_released;
        }
        assert!(released);
        // Second tap 160 ms after the first, well inside the steering timeout.
        input.press(Control::Fire);
        assert!(input.sample(16.0).fire_pressed);
    }

    #[test]
    fn repeats_keep_a_key_alive_without_release_events() {
        let mut input = InputFusion::new(false);
        input.press(Control::Left);
        for _ in 0..20 {
            input.sample(100.0);
            input.press(Control::Left);
        }
        assert_eq!(input.sample(100.0).axis, -1.0);
    }

    #[test]
    fn clear_drops_everything() {
        let mut input = InputFusion::new(true);
        input.press(Control::Left);
        input.pointer_down();
        input.sample(500.0);
        input.clear();
        let frame = input.sample(0.0);
        assert_eq!(frame.axis, 0.0);
        assert!(!frame.fire_held);
    }
}
