//! Timed fades between light states.
//!
//! Each fade is classified by how it crosses the off and desaturated
//! boundaries, since crossing either calls for snapping color fields while
//! they are invisible rather than interpolating them. Fades between two
//! saturated colors interpolate through LCh(ab) so the sweep looks evenly
//! paced. The controller is a step machine driven by the host's poll loop
//! with an injected clock; it never reads the ambient time itself.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::{Duration, Instant},
};

use log::debug;
use strum_macros::Display;

use crate::coder::ChannelCoders;
use crate::color::{LchCoords, circular_lerp_degrees, hsv_to_lch, lch_to_hsv};
use crate::light::LightState;

/// How a fade crosses the off and desaturation boundaries.
///
/// Classification rules apply in order; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FadeType {
    OffToOn,
    OnToOff,
    UnsaturatedToSaturated,
    SaturatedToUnsaturated,
    HueFade,
    Other,
}

impl FadeType {
    /// Classify a fade from its endpoints.
    pub fn classify(start: &LightState, target: &LightState) -> Self {
        if start.brightness == 0. && target.brightness > 0. {
            Self::OffToOn
        } else if start.brightness > 0. && target.brightness == 0. {
            Self::OnToOff
        } else if start.saturation == 0. && target.saturation > 0. {
            Self::UnsaturatedToSaturated
        } else if start.saturation > 0. && target.saturation == 0. {
            Self::SaturatedToUnsaturated
        } else if start.hue != target.hue {
            Self::HueFade
        } else {
            Self::Other
        }
    }
}

/// Pacing parameters for fades.
#[derive(Debug, Clone, Copy)]
pub struct FadeTiming {
    /// How often the fade state recomputes.
    pub recompute_hz: f64,
    /// Minimum gap between host state notifications.
    pub notify_interval: Duration,
}

impl Default for FadeTiming {
    fn default() -> Self {
        Self {
            recompute_hz: 50.,
            notify_interval: Duration::from_secs(1),
        }
    }
}

/// Issues fade tickets and remembers which fade started most recently.
///
/// Starting a fade invalidates every ticket issued before it, so a stale
/// controller freezes instead of fighting the newer fade over the shared
/// state.
#[derive(Debug, Default, Clone)]
pub struct FadeSequence(Rc<Cell<u64>>);

impl FadeSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new fade, superseding any running one.
    pub fn begin_fade(&self) -> FadeTicket {
        let number = self.0.get() + 1;
        self.0.set(number);
        FadeTicket {
            counter: Rc::clone(&self.0),
            number,
        }
    }
}

/// Held by a fade controller to detect supersession.
#[derive(Debug, Clone)]
pub struct FadeTicket {
    counter: Rc<Cell<u64>>,
    number: u64,
}

impl FadeTicket {
    fn is_current(&self) -> bool {
        self.counter.get() == self.number
    }
}

/// LCh(ab) endpoints for a perceptual fade; the current point advances with
/// the fade.
struct LchPair {
    current: LchCoords,
    target: LchCoords,
}

/// Executes one fade, paced against a caller-provided clock.
///
/// The host drives it with `begin_frame(now)` once per output frame and reads
/// encoded bytes back with `value_for_channel`, or uses `poll` to do both.
/// The controller writes the shared light state as the fade progresses and
/// re-encodes it after every recompute, so reads between ticks always see the
/// bytes of the current state. When a stall puts the clock more than one
/// recompute interval ahead, the skipped intervals are dropped and the state
/// jumps to where the fade should be now.
pub struct FadeController {
    state: Rc<RefCell<LightState>>,
    target: LightState,
    fade_type: FadeType,
    lch: Option<LchPair>,
    coders: Rc<ChannelCoders>,
    values: Vec<u8>,

    start_time: Instant,
    end_time: Instant,
    last_change: Instant,
    recompute_interval: Duration,
    num_changes: u64,

    notify: Box<dyn FnMut(&LightState)>,
    notify_interval: Duration,
    last_notify: Instant,
    completion_notified: bool,

    ticket: FadeTicket,
    superseded: bool,
    done: bool,
}

impl FadeController {
    /// Start a fade from the state currently in `state` toward `target`.
    ///
    /// The starting state is encoded immediately, so polls before the first
    /// recompute tick return valid bytes. A zero duration snaps to the target
    /// here and the fade is born finished; its completion notification fires
    /// on the first frame.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Rc<RefCell<LightState>>,
        target: LightState,
        coders: Rc<ChannelCoders>,
        timing: FadeTiming,
        duration: Duration,
        ticket: FadeTicket,
        notify: Box<dyn FnMut(&LightState)>,
        now: Instant,
    ) -> Self {
        let done = duration.is_zero();
        let mut current = state.borrow_mut();
        let fade_type = FadeType::classify(&current, &target);
        debug!("starting {fade_type} fade to {target:?} over {duration:?}");
        let lch = (fade_type == FadeType::HueFade).then(|| LchPair {
            current: hsv_to_lch(
                current.hue,
                current.saturation / 100.,
                current.brightness / 100.,
            ),
            target: hsv_to_lch(
                target.hue,
                target.saturation / 100.,
                target.brightness / 100.,
            ),
        });
        if done {
            *current = target;
        }
        let mut values = vec![0; coders.channel_count()];
        coders.encode(&current, &mut values);
        drop(current);
        Self {
            state,
            target,
            fade_type,
            lch,
            coders,
            values,
            start_time: now,
            end_time: now + duration,
            last_change: now,
            recompute_interval: Duration::from_secs_f64(1. / timing.recompute_hz),
            num_changes: 0,
            notify,
            notify_interval: timing.notify_interval,
            last_notify: now,
            completion_notified: false,
            ticket,
            superseded: false,
            done,
        }
    }

    /// Advance the fade for this frame: at most one recompute and at most one
    /// host notification. Calling it again before the next recompute interval
    /// has elapsed does nothing.
    pub fn begin_frame(&mut self, now: Instant) {
        if !self.superseded && !self.ticket.is_current() {
            // A newer fade owns the state now; freeze and bow out silently.
            self.superseded = true;
            self.done = true;
            debug!("{} fade superseded after {} changes", self.fade_type, self.num_changes);
        }
        if self.superseded {
            return;
        }
        self.maybe_recompute(now);
        self.maybe_notify(now);
    }

    /// Byte `index` of the encoded channel span, as of the last recompute.
    pub fn value_for_channel(&self, index: usize) -> u8 {
        self.values[index]
    }

    /// Advance the fade and hand back the encoded channel span plus whether
    /// the fade has finished.
    pub fn poll(&mut self, now: Instant) -> (&[u8], bool) {
        self.begin_frame(now);
        (&self.values, self.done)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// True if a newer fade took over before this one finished.
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }

    pub fn fade_type(&self) -> FadeType {
        self.fade_type
    }

    fn maybe_recompute(&mut self, now: Instant) {
        if self.done || now - self.last_change < self.recompute_interval {
            return;
        }
        // The next change lands one interval after the previous one; if we
        // are running behind, drop whole intervals until we are within one
        // of now.
        let mut change_time = self.last_change + self.recompute_interval;
        while change_time + self.recompute_interval < now {
            change_time += self.recompute_interval;
        }
        let is_first = self.last_change == self.start_time;
        let is_last = change_time >= self.end_time;
        let travel = ((change_time - self.last_change).as_secs_f64()
            / (self.end_time - self.last_change).as_secs_f64())
        .min(1.);
        {
            let mut state = self.state.borrow_mut();
            match self.fade_type {
                FadeType::OffToOn => off_to_on(&mut state, &self.target, travel, is_first),
                FadeType::OnToOff => on_to_off(&mut state, &self.target, travel, is_last),
                FadeType::UnsaturatedToSaturated => {
                    unsaturated_to_saturated(&mut state, &self.target, travel, is_first)
                }
                FadeType::SaturatedToUnsaturated => {
                    saturated_to_unsaturated(&mut state, &self.target, travel, is_last)
                }
                FadeType::HueFade => {
                    if let Some(lch) = self.lch.as_mut() {
                        hue_fade(lch, &mut state, &self.target, travel);
                    }
                }
                FadeType::Other => simple_fade(&mut state, &self.target, travel),
            }
            self.coders.encode(&state, &mut self.values);
        }
        self.last_change = change_time;
        self.num_changes += 1;
        if is_last {
            self.done = true;
            let elapsed = (change_time - self.start_time).as_secs_f64();
            debug!(
                "fade complete after {} changes ({:.1} Hz actual, {:.1} Hz intended)",
                self.num_changes,
                self.num_changes as f64 / elapsed,
                1. / self.recompute_interval.as_secs_f64(),
            );
        }
    }

    fn maybe_notify(&mut self, now: Instant) {
        if self.completion_notified {
            return;
        }
        if !self.done && now - self.last_notify < self.notify_interval {
            return;
        }
        let state = *self.state.borrow();
        (self.notify)(&state);
        self.last_notify = now;
        if self.done {
            // The completion notification fires exactly once, however long
            // the host keeps polling.
            self.completion_notified = true;
        }
        debug!("notified host: {state:?}");
    }
}

/// Move a value toward a target by a fraction of the remaining distance.
fn fade_toward(current: &mut f64, target: f64, travel: f64) {
    if *current != target {
        *current += (target - *current) * travel;
    }
}

fn off_to_on(state: &mut LightState, target: &LightState, travel: f64, is_first: bool) {
    if is_first {
        // Still dark, so the color jump is invisible.
        state.color_temp_kelvin = target.color_temp_kelvin;
        state.hue = target.hue;
        state.saturation = target.saturation;
    }
    fade_toward(&mut state.brightness, target.brightness, travel);
}

fn on_to_off(state: &mut LightState, target: &LightState, travel: f64, is_last: bool) {
    fade_toward(&mut state.brightness, target.brightness, travel);
    if is_last {
        // Dark now, so the color jump is invisible.
        state.color_temp_kelvin = target.color_temp_kelvin;
        state.hue = target.hue;
        state.saturation = target.saturation;
    }
}

fn unsaturated_to_saturated(
    state: &mut LightState,
    target: &LightState,
    travel: f64,
    is_first: bool,
) {
    if is_first {
        // White has no visible hue; take the target hue before saturating.
        state.hue = target.hue;
    }
    fade_toward(&mut state.brightness, target.brightness, travel);
    fade_toward(&mut state.color_temp_kelvin, target.color_temp_kelvin, travel);
    fade_toward(&mut state.saturation, target.saturation, travel);
}

fn saturated_to_unsaturated(
    state: &mut LightState,
    target: &LightState,
    travel: f64,
    is_last: bool,
) {
    fade_toward(&mut state.brightness, target.brightness, travel);
    fade_toward(&mut state.color_temp_kelvin, target.color_temp_kelvin, travel);
    fade_toward(&mut state.saturation, target.saturation, travel);
    if is_last {
        state.hue = target.hue;
    }
}

fn hue_fade(lch: &mut LchPair, state: &mut LightState, target: &LightState, travel: f64) {
    lch.current.lightness += (lch.target.lightness - lch.current.lightness) * travel;
    lch.current.chroma += (lch.target.chroma - lch.current.chroma) * travel;
    lch.current.hue = circular_lerp_degrees(lch.current.hue, lch.target.hue, travel);
    let (hue, saturation, value) = lch_to_hsv(lch.current);
    state.hue = hue;
    state.saturation = saturation * 100.;
    state.brightness = value * 100.;
    fade_toward(&mut state.color_temp_kelvin, target.color_temp_kelvin, travel);
}

fn simple_fade(state: &mut LightState, target: &LightState, travel: f64) {
    debug_assert_eq!(
        state.hue, target.hue,
        "hue should not change in a plain fade"
    );
    fade_toward(&mut state.brightness, target.brightness, travel);
    fade_toward(&mut state.color_temp_kelvin, target.color_temp_kelvin, travel);
    fade_toward(&mut state.saturation, target.saturation, travel);
}
