/* Canonical lighting state handed to the encoders: normalized colors and their per-tick deltas,
 * effect keyframes with wave parameters, and the per-key state with its mode reset contract. */
use serde::{Deserialize, Serialize};

/* Duration (in device ticks) a key falls back to when its mode is reset. */
pub const DEFAULT_DURATION_TICKS: u16 = 300;

/* Normalized RGB color. Components are nominally in [0, 1]; the byte
 * accessors clamp anything outside that range. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Color {
    pub const BLACK: Self = Self {
        red: 0.0,
        green: 0.0,
        blue: 0.0,
    };

    pub fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }

    /* Build a color from 0-255 channel values. */
    pub fn from_bytes(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: f64::from(red) / 255.0,
            green: f64::from(green) / 255.0,
            blue: f64::from(blue) / 255.0,
        }
    }

    pub fn red_byte(&self) -> u8 {
        channel_byte(self.red)
    }

    pub fn green_byte(&self) -> u8 {
        channel_byte(self.green)
    }

    pub fn blue_byte(&self) -> u8 {
        channel_byte(self.blue)
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.red_byte(), self.green_byte(), self.blue_byte()]
    }

    /// Per-tick step the firmware interpolator adds to move from `source` to
    /// `target` over `duration_ticks`.
    ///
    /// Each channel is `round((target - source) * 10 / duration_ticks)` in byte
    /// units, so the result is a signed step and not a color. The step is
    /// one signed byte on the wire, so steeper fades saturate at -128 / 127.
    /// A zero duration yields a zero step.
    pub fn delta(source: &Color, target: &Color, duration_ticks: u16) -> ColorDelta {
        if duration_ticks == 0 {
            return ColorDelta::default();
        }

        let step = |from: u8, to: u8| -> i8 {
            ((f64::from(to) - f64::from(from)) * 10.0 / f64::from(duration_ticks))
                .round()
                .clamp(f64::from(i8::MIN), f64::from(i8::MAX)) as i8
        };

        ColorDelta {
            red: step(source.red_byte(), target.red_byte()),
            green: step(source.green_byte(), target.green_byte()),
            blue: step(source.blue_byte(), target.blue_byte()),
        }
    }
}

fn channel_byte(component: f64) -> u8 {
    (component * 255.0).round().clamp(0.0, 255.0) as u8
}

/* Signed per-tick color step produced by `Color::delta`. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorDelta {
    pub red: i8,
    pub green: i8,
    pub blue: i8,
}

impl ColorDelta {
    /* Wire form: each channel step as a two's complement byte. */
    pub fn to_bytes(&self) -> [u8; 3] {
        [self.red as u8, self.green as u8, self.blue as u8]
    }
}

/// One keyframe of an effect: a normalized position in `[0, 1)` and the
/// color reached at that position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub position: f64,
    pub color: Color,
}

impl Transition {
    pub fn new(position: f64, color: Color) -> Self {
        Self { position, color }
    }
}

/* Wave origin in normalized keyboard coordinates. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveOrigin {
    pub x: f64,
    pub y: f64,
}

/* Axis a wave travels along. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveDirection {
    X,
    Y,
    #[default]
    XY,
}

/* Trailing control byte of an effect packet. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EffectControl {
    #[default]
    Loop = 0x00,
    Once = 0x01,
}

/// An animated color program the device runs for one or more keys.
///
/// `id` is zero until the scheduler assigns a device-side slot for the
/// current batch. Equality compares the animation data only: transitions,
/// duration, wave parameters and control. `id` and `start_color` are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    #[serde(default)]
    pub id: u8,
    pub transitions: Vec<Transition>,
    pub duration: u16,
    #[serde(default)]
    pub start_color: Color,
    #[serde(default)]
    pub wave_active: bool,
    #[serde(default)]
    pub origin: WaveOrigin,
    #[serde(default)]
    pub direction: WaveDirection,
    #[serde(default)]
    pub pulse: u16,
    #[serde(default)]
    pub control: EffectControl,
}

impl Effect {
    /* Build an unscheduled, non-wave effect starting at its first keyframe's color. */
    pub fn new(transitions: Vec<Transition>, duration: u16) -> Self {
        let start_color = transitions.first().map(|t| t.color).unwrap_or_default();
        Self {
            id: 0,
            transitions,
            duration,
            start_color,
            wave_active: false,
            origin: WaveOrigin::default(),
            direction: WaveDirection::default(),
            pulse: 0,
            control: EffectControl::default(),
        }
    }

    pub fn with_wave(mut self, origin: WaveOrigin, direction: WaveDirection, pulse: u16) -> Self {
        self.wave_active = true;
        self.origin = origin;
        self.direction = direction;
        self.pulse = pulse;
        self
    }

    pub fn with_control(mut self, control: EffectControl) -> Self {
        self.control = control;
        self
    }

    pub fn with_start_color(mut self, color: Color) -> Self {
        self.start_color = color;
        self
    }

    /* Transitions ordered by ascending position, as the device expects them. */
    pub fn sorted_transitions(&self) -> Vec<Transition> {
        let mut sorted = self.transitions.clone();
        sorted.sort_by(|a, b| a.position.total_cmp(&b.position));
        sorted
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        self.transitions == other.transitions
            && self.duration == other.duration
            && self.wave_active == other.wave_active
            && self.origin == other.origin
            && self.direction == other.direction
            && self.pulse == other.pulse
            && self.control == other.control
    }
}

/* Lighting mode of a single key. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyMode {
    #[default]
    Steady,
    ColorShift,
    Breathing,
    Reactive,
    Disabled,
    Mixed,
}

impl KeyMode {
    /* Mode byte of a per-key slot. Effect driven modes are all 0x00. */
    pub fn to_byte(self) -> u8 {
        match self {
            KeyMode::Steady => 0x01,
            KeyMode::Reactive => 0x08,
            KeyMode::Disabled => 0x03,
            KeyMode::ColorShift | KeyMode::Breathing | KeyMode::Mixed => 0x00,
        }
    }
}

fn default_duration() -> u16 {
    DEFAULT_DURATION_TICKS
}

/// Lighting state of one physical key, addressed by `(region, keycode)`.
///
/// The mode is authoritative: [`KeyState::set_mode`] wipes the colors,
/// duration and effect so no stale animation survives a mode change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyState {
    pub region: u8,
    pub keycode: u8,
    #[serde(default)]
    mode: KeyMode,
    #[serde(default)]
    pub main_color: Color,
    #[serde(default)]
    pub active_color: Color,
    #[serde(default = "default_duration")]
    pub duration_ticks: u16,
    #[serde(default)]
    effect: Option<Effect>,
}

impl KeyState {
    pub fn new(region: u8, keycode: u8, mode: KeyMode) -> Self {
        Self {
            region,
            keycode,
            mode,
            main_color: Color::BLACK,
            active_color: Color::BLACK,
            duration_ticks: DEFAULT_DURATION_TICKS,
            effect: None,
        }
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    /// Switch the key to `mode`.
    ///
    /// Side effects: the effect is dropped, `duration_ticks` returns to
    /// [`DEFAULT_DURATION_TICKS`] and both colors become black. Callers set
    /// colors and effect after the mode, never before.
    pub fn set_mode(&mut self, mode: KeyMode) {
        self.effect = None;
        self.duration_ticks = DEFAULT_DURATION_TICKS;
        self.main_color = Color::BLACK;
        self.active_color = Color::BLACK;
        self.mode = mode;
    }

    pub fn effect(&self) -> Option<&Effect> {
        self.effect.as_ref()
    }

    pub(crate) fn effect_mut(&mut self) -> Option<&mut Effect> {
        self.effect.as_mut()
    }

    /// Attach an animated effect. The static `main_color` follows the
    /// effect's first keyframe so both start from the same color.
    pub fn set_effect(&mut self, effect: Effect) {
        if let Some(first) = effect.transitions.first() {
            self.main_color = first.color;
        }
        self.effect = Some(effect);
    }

    pub fn clear_effect(&mut self) {
        self.effect = None;
    }

    /* Scheduled effect slot, 0 when the key has no effect. */
    pub fn effect_id(&self) -> u8 {
        self.effect.as_ref().map(|e| e.id).unwrap_or(0)
    }
}
