//! Light entities: the host-facing control surface for one fixture.
//!
//! A light owns the shared state that its fade controllers write, resolves
//! turn-on requests against its current state and defaults, and hands the
//! resulting fade back to the host loop to drive. Starting a fade always
//! supersedes the previous one.

use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use log::debug;

use crate::coder::ChannelCoders;
use crate::color::rgb_to_hsv;
use crate::fade::{FadeController, FadeSequence, FadeTiming};

/// The logical state of one light.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightState {
    /// Percent, 0 to 100.
    pub brightness: f64,
    /// Kelvin, within the fixture type's range.
    pub color_temp_kelvin: f64,
    /// Degrees, 0 up to but not including 360.
    pub hue: f64,
    /// Percent, 0 to 100.
    pub saturation: f64,
}

impl LightState {
    pub fn is_on(&self) -> bool {
        self.brightness > 0.
    }
}

/// A color command accompanying a turn-on request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorCommand {
    /// Plain white: saturation 0.
    White,
    /// Hue in degrees, saturation in percent.
    HueSat { hue: f64, saturation: f64 },
    /// 24-bit RGB, converted to hue and saturation.
    Rgb([u8; 3]),
    /// Color temperature in kelvin, clamped to the fixture type's range.
    ColorTemp(f64),
}

/// What a turn-on request asks for.
///
/// All fields are optional; the light fills the gaps from its current state
/// and its defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TurnOnAttributes {
    /// Target brightness in percent.
    pub brightness: Option<f64>,
    pub color: Option<ColorCommand>,
    /// Fade duration; the light's default transition when omitted.
    pub transition: Option<Duration>,
}

/// Host callback invoked with state snapshots as a fade progresses.
pub type NotifyFn = Box<dyn FnMut(&LightState)>;

/// One controllable light.
///
/// Holds the shared state handle, the fixture type's coder set, and the
/// defaults used to resolve turn-on requests.
pub struct Light {
    name: String,
    state: Rc<RefCell<LightState>>,
    sequence: FadeSequence,
    coders: Rc<ChannelCoders>,
    timing: FadeTiming,
    default_transition: Duration,
    default_color_temp: f64,
    /// State displayed before the last turn-off, for recall.
    previous_state: Option<LightState>,
}

impl Light {
    pub fn new(
        name: String,
        coders: Rc<ChannelCoders>,
        timing: FadeTiming,
        default_transition: Duration,
        default_color_temp: f64,
    ) -> Self {
        let (min_kelvin, _) = coders.color_temp_range();
        Self {
            name,
            state: Rc::new(RefCell::new(LightState {
                color_temp_kelvin: min_kelvin,
                ..LightState::default()
            })),
            sequence: FadeSequence::new(),
            coders,
            timing,
            default_transition,
            default_color_temp,
            previous_state: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A copy of the current state.
    pub fn state(&self) -> LightState {
        *self.state.borrow()
    }

    pub fn is_on(&self) -> bool {
        self.state().is_on()
    }

    /// Number of DMX channels this light's fixture occupies.
    pub fn channel_count(&self) -> usize {
        self.coders.channel_count()
    }

    /// Start a fade toward what the request asks for, superseding any
    /// running fade. The returned controller must be driven by the host's
    /// poll loop.
    pub fn turn_on(
        &mut self,
        attrs: TurnOnAttributes,
        notify: NotifyFn,
        now: Instant,
    ) -> FadeController {
        debug!("light \"{}\" turn_on {attrs:?}", self.name);
        let target = self.resolve_target(&attrs);
        self.start_fade(target, attrs.transition, notify, now)
    }

    /// Fade to black, remembering the current state for recall by a bare
    /// turn-on.
    pub fn turn_off(
        &mut self,
        transition: Option<Duration>,
        notify: NotifyFn,
        now: Instant,
    ) -> FadeController {
        debug!("light \"{}\" turn_off", self.name);
        let current = self.state();
        if current.is_on() {
            self.previous_state = Some(current);
        }
        let (min_kelvin, _) = self.coders.color_temp_range();
        let target = LightState {
            brightness: 0.,
            color_temp_kelvin: min_kelvin,
            hue: 0.,
            saturation: 0.,
        };
        self.start_fade(target, transition, notify, now)
    }

    fn resolve_target(&mut self, attrs: &TurnOnAttributes) -> LightState {
        let current = self.state();

        let mut target = current;
        match attrs.brightness {
            Some(brightness) => target.brightness = brightness,
            // Turning on an off light without a level means full on.
            None if !current.is_on() => target.brightness = 100.,
            None => {}
        }
        match attrs.color {
            Some(ColorCommand::White) => {
                target.hue = 0.;
                target.saturation = 0.;
            }
            Some(ColorCommand::HueSat { hue, saturation }) => {
                target.hue = hue;
                target.saturation = saturation;
            }
            Some(ColorCommand::Rgb(rgb)) => {
                let (hue, saturation, _) = rgb_to_hsv(rgb);
                target.hue = hue;
                target.saturation = saturation * 100.;
            }
            Some(ColorCommand::ColorTemp(kelvin)) => {
                let (min_kelvin, max_kelvin) = self.coders.color_temp_range();
                target.color_temp_kelvin = kelvin.clamp(min_kelvin, max_kelvin);
            }
            None => {}
        }
        if !current.is_on() && !matches!(attrs.color, Some(ColorCommand::ColorTemp(_))) {
            // Waking from off without an explicit color temperature gets the
            // default.
            target.color_temp_kelvin = self.default_color_temp;
        }

        // A bare turn-on recalls what was showing before the last turn-off,
        // including when that turn-off is still fading.
        if attrs.brightness.is_none()
            && attrs.color.is_none()
            && let Some(previous) = self.previous_state.take()
        {
            target = previous;
        }

        if target.saturation == 0. {
            // Some fixtures visibly swing through hues while desaturating if
            // the hue channel moves at the same time; hold the current hue
            // and let saturation do the work.
            target.hue = current.hue;
        }
        target
    }

    fn start_fade(
        &mut self,
        target: LightState,
        transition: Option<Duration>,
        notify: NotifyFn,
        now: Instant,
    ) -> FadeController {
        let duration = transition.unwrap_or(self.default_transition);
        FadeController::new(
            Rc::clone(&self.state),
            target,
            Rc::clone(&self.coders),
            self.timing,
            duration,
            self.sequence.begin_fade(),
            notify,
            now,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::FixtureTypeConfig;
    use approx::assert_relative_eq;

    const TEST_TYPE: &str = "
name: tester
min_color_temp_kelvin: 2000
max_color_temp_kelvin: 10000
channels:
  - type: brightness
  - type: color_temp_kelvin
  - type: hue
  - type: saturation
";

    /// A light whose default transition snaps, so state lands immediately.
    fn test_light() -> Light {
        let cfg: FixtureTypeConfig = serde_yaml::from_str(TEST_TYPE).unwrap();
        Light::new(
            "office".into(),
            Rc::new(ChannelCoders::new(&cfg).unwrap()),
            FadeTiming::default(),
            Duration::ZERO,
            4000.,
        )
    }

    fn no_notify() -> NotifyFn {
        Box::new(|_| {})
    }

    fn hue_sat(hue: f64, saturation: f64) -> Option<ColorCommand> {
        Some(ColorCommand::HueSat { hue, saturation })
    }

    #[test]
    fn test_bare_turn_on_defaults_to_full_white() {
        let mut light = test_light();
        let now = Instant::now();
        light.turn_on(TurnOnAttributes::default(), no_notify(), now);
        assert_eq!(
            light.state(),
            LightState {
                brightness: 100.,
                color_temp_kelvin: 4000.,
                hue: 0.,
                saturation: 0.,
            }
        );
    }

    #[test]
    fn test_brightness_only_keeps_color() {
        let mut light = test_light();
        let now = Instant::now();
        light.turn_on(
            TurnOnAttributes {
                brightness: Some(80.),
                color: hue_sat(200., 60.),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        light.turn_on(
            TurnOnAttributes {
                brightness: Some(30.),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        let state = light.state();
        assert_eq!(state.brightness, 30.);
        assert_eq!(state.hue, 200.);
        assert_eq!(state.saturation, 60.);
    }

    #[test]
    fn test_turn_off_then_bare_turn_on_recalls_previous_state() {
        let mut light = test_light();
        let now = Instant::now();
        light.turn_on(
            TurnOnAttributes {
                brightness: Some(80.),
                color: hue_sat(200., 60.),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        let shown = light.state();

        light.turn_off(None, no_notify(), now);
        assert!(!light.is_on());
        assert_eq!(light.state().color_temp_kelvin, 2000.);

        light.turn_on(TurnOnAttributes::default(), no_notify(), now);
        assert_eq!(light.state(), shown);
    }

    #[test]
    fn test_white_command_holds_current_hue() {
        let mut light = test_light();
        let now = Instant::now();
        light.turn_on(
            TurnOnAttributes {
                brightness: Some(80.),
                color: hue_sat(200., 60.),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        light.turn_on(
            TurnOnAttributes {
                color: Some(ColorCommand::White),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        let state = light.state();
        assert_eq!(state.saturation, 0.);
        // The hue channel must not move while the light desaturates.
        assert_eq!(state.hue, 200.);
        assert_eq!(state.brightness, 80.);
    }

    #[test]
    fn test_rgb_command() {
        let mut light = test_light();
        let now = Instant::now();
        light.turn_on(
            TurnOnAttributes {
                brightness: Some(50.),
                color: Some(ColorCommand::Rgb([255, 0, 0])),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        let state = light.state();
        assert_relative_eq!(state.hue, 0., epsilon = 1e-9);
        assert_relative_eq!(state.saturation, 100., epsilon = 1e-9);
        assert_eq!(state.brightness, 50.);
    }

    #[test]
    fn test_color_temp_command_clamps_to_type_range() {
        let mut light = test_light();
        let now = Instant::now();
        light.turn_on(
            TurnOnAttributes {
                color: Some(ColorCommand::ColorTemp(99999.)),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        assert_eq!(light.state().color_temp_kelvin, 10000.);
        assert_eq!(light.state().saturation, 0.);
    }

    #[test]
    fn test_color_temp_command_keeps_hue_sat() {
        let mut light = test_light();
        let now = Instant::now();
        light.turn_on(
            TurnOnAttributes {
                brightness: Some(80.),
                color: hue_sat(200., 60.),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        // Waking from off without a color temperature picks up the default.
        assert_eq!(light.state().color_temp_kelvin, 4000.);

        light.turn_on(
            TurnOnAttributes {
                color: Some(ColorCommand::ColorTemp(5000.)),
                ..Default::default()
            },
            no_notify(),
            now,
        );
        // Only the color temperature moves; the light stays saturated.
        assert_eq!(
            light.state(),
            LightState {
                brightness: 80.,
                color_temp_kelvin: 5000.,
                hue: 200.,
                saturation: 60.,
            }
        );
    }

    #[test]
    fn test_bare_turn_on_mid_off_fade_recalls() {
        let mut light = test_light();
        let t0 = Instant::now();
        light.turn_on(
            TurnOnAttributes {
                color: hue_sat(120., 50.),
                ..Default::default()
            },
            no_notify(),
            t0,
        );
        let shown = light.state();

        let mut off = light.turn_off(Some(Duration::from_secs(1)), no_notify(), t0);
        off.poll(t0 + Duration::from_millis(500));
        let mid = light.state();
        assert!(mid.is_on());
        assert!(mid.brightness < shown.brightness);

        // Recall restores the pre-off state even though the light is still
        // lit partway through the turn-off fade.
        light.turn_on(
            TurnOnAttributes::default(),
            no_notify(),
            t0 + Duration::from_millis(500),
        );
        assert_eq!(light.state(), shown);

        let (_, done) = off.poll(t0 + Duration::from_millis(520));
        assert!(done);
        assert!(off.is_superseded());
        assert_eq!(light.state(), shown);
    }

    #[test]
    fn test_second_fade_supersedes_first() {
        let mut light = test_light();
        let t0 = Instant::now();
        let transition = Some(Duration::from_secs(1));
        let mut first = light.turn_on(
            TurnOnAttributes {
                brightness: Some(100.),
                transition,
                ..Default::default()
            },
            no_notify(),
            t0,
        );
        first.begin_frame(t0 + Duration::from_millis(25));
        let mid = light.state();
        assert!(mid.brightness > 0.);

        let mut second = light.turn_on(
            TurnOnAttributes {
                brightness: Some(10.),
                transition,
                ..Default::default()
            },
            no_notify(),
            t0 + Duration::from_millis(30),
        );
        let (_, done) = first.poll(t0 + Duration::from_millis(50));
        assert!(done);
        assert!(first.is_superseded());
        assert_eq!(light.state(), mid);

        let (_, done) = second.poll(t0 + Duration::from_millis(1050));
        assert!(done);
        assert_relative_eq!(light.state().brightness, 10., epsilon = 1e-9);
    }
}
