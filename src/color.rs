//! Conversions between the HSV control space and CIE LCh(ab).
//!
//! Perceptual fades interpolate in LCh(ab) so that a color sweep looks evenly
//! paced to the eye; plain HSV interpolation drifts badly in apparent
//! brightness between hues. All conversions run with f64 components against
//! the sRGB encoding and the D65 white point.

use palette::{FromColor, Hsv, Lch, Srgb, encoding, white_point::D65};

type HsvF64 = Hsv<encoding::Srgb, f64>;
type LchF64 = Lch<D65, f64>;

/// A color in CIE LCh(ab) coordinates.
///
/// Lightness in `[0, 100]`, chroma from 0 upward, hue in degrees `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LchCoords {
    pub lightness: f64,
    pub chroma: f64,
    pub hue: f64,
}

/// Convert HSV to LCh(ab).
///
/// Hue in degrees; saturation and value unit-scaled.
pub fn hsv_to_lch(hue: f64, saturation: f64, value: f64) -> LchCoords {
    let hsv: HsvF64 = Hsv::new(hue, saturation, value);
    let lch = LchF64::from_color(hsv);
    LchCoords {
        lightness: lch.l,
        chroma: lch.chroma,
        hue: lch.hue.into_positive_degrees(),
    }
}

/// Convert LCh(ab) back to HSV.
///
/// Returns `(hue degrees, saturation, value)`, the latter two unit-scaled.
/// Coordinates outside the sRGB gamut are clamped componentwise into range.
pub fn lch_to_hsv(lch: LchCoords) -> (f64, f64, f64) {
    let lch = LchF64::new(lch.lightness, lch.chroma, lch.hue);
    let hsv = HsvF64::from_color(lch);
    (hsv.hue.into_positive_degrees(), hsv.saturation, hsv.value)
}

/// Convert a 24-bit RGB color to `(hue degrees, saturation, value)`.
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (f64, f64, f64) {
    let rgb: Srgb<f64> = Srgb::new(r as f64 / 255., g as f64 / 255., b as f64 / 255.);
    let hsv = HsvF64::from_color(rgb);
    (hsv.hue.into_positive_degrees(), hsv.saturation, hsv.value)
}

/// Interpolate between two hue angles along the shortest arc.
///
/// A fade from 350 to 10 degrees passes through 0, never through 180. The
/// result is wrapped back into `[0, 360)`.
pub fn circular_lerp_degrees(current: f64, target: f64, fraction: f64) -> f64 {
    let mut current = current;
    if target - current > 180. {
        current += 360.;
    } else if current - target > 180. {
        current -= 360.;
    }
    (current + (target - current) * fraction).rem_euclid(360.)
}
