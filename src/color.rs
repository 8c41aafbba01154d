//! Color math
//!
//! Hex parsing, RGB/HSL/Lab conversions and the distance metrics used by
//! the constraint validator and the substitution search. Accuracy stops at
//! simple RGB and CIE76 heuristics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlannerError;

/// Largest possible Euclidean distance between two RGB colors
const MAX_RGB_DISTANCE: f64 = 441.672_955_930_063_7; // sqrt(3 * 255^2)

/// Lab nonlinearity threshold (6/29)^3
const LAB_EPSILON: f64 = 0.008856;

/// D65 reference white
const WHITE_X: f64 = 0.950_47;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.088_83;

// =============================================================================
// RGB
// =============================================================================

/// 8-bit sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB`, `RRGGBB`, `#RGB` or `#RRGGBBAA` (alpha ignored)
    pub fn from_hex(hex: &str) -> Result<Self, PlannerError> {
        let digits = hex.trim().trim_start_matches('#');
        let invalid = || PlannerError::InvalidHexColor(hex.to_string());

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        match digits.len() {
            3 => {
                let expand = |i: usize| channel(&digits[i..=i].repeat(2));
                Ok(Self::new(expand(0)?, expand(1)?, expand(2)?))
            }
            6 | 8 => Ok(Self::new(
                channel(&digits[0..2])?,
                channel(&digits[2..4])?,
                channel(&digits[4..6])?,
            )),
            _ => Err(invalid()),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Raw Euclidean distance in RGB space (0..=441.67)
    pub fn euclidean_distance(&self, other: &Rgb) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Euclidean distance normalized to 0..=100
    pub fn normalized_distance(&self, other: &Rgb) -> f64 {
        self.euclidean_distance(other) / MAX_RGB_DISTANCE * 100.0
    }

    pub fn to_hsl(&self) -> Hsl {
        let r = f64::from(self.r) / 255.0;
        let g = f64::from(self.g) / 255.0;
        let b = f64::from(self.b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let lightness = (max + min) / 2.0;
        let delta = max - min;

        if delta == 0.0 {
            return Hsl { hue: 0.0, saturation: 0.0, lightness };
        }

        let saturation = if lightness > 0.5 {
            delta / (2.0 - max - min)
        } else {
            delta / (max + min)
        };

        let sector = if max == r {
            ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            (b - r) / delta + 2.0
        } else {
            (r - g) / delta + 4.0
        };

        Hsl { hue: sector * 60.0, saturation, lightness }
    }

    pub fn to_lab(&self) -> Lab {
        let linear = |c: u8| {
            let c = f64::from(c) / 255.0;
            if c > 0.04045 {
                ((c + 0.055) / 1.055).powf(2.4)
            } else {
                c / 12.92
            }
        };
        let (r, g, b) = (linear(self.r), linear(self.g), linear(self.b));

        let x = r * 0.412_456_4 + g * 0.357_576_1 + b * 0.180_437_5;
        let y = r * 0.212_672_9 + g * 0.715_152_2 + b * 0.072_175_0;
        let z = r * 0.019_333_9 + g * 0.119_192_0 + b * 0.950_304_1;

        let f = |t: f64| {
            if t > LAB_EPSILON {
                t.cbrt()
            } else {
                7.787 * t + 16.0 / 116.0
            }
        };
        let (fx, fy, fz) = (f(x / WHITE_X), f(y / WHITE_Y), f(z / WHITE_Z));

        Lab {
            l: 116.0 * fy - 16.0,
            a: 500.0 * (fx - fy),
            b: 200.0 * (fy - fz),
        }
    }
}

impl FromStr for Rgb {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// =============================================================================
// HSL / Lab
// =============================================================================

/// Hue in degrees, saturation and lightness in 0..=1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub hue: f64,
    pub saturation: f64,
    pub lightness: f64,
}

impl Hsl {
    /// Circular hue difference in degrees (0..=180)
    pub fn hue_difference(&self, other: &Hsl) -> f64 {
        let diff = (self.hue - other.hue).abs() % 360.0;
        diff.min(360.0 - diff)
    }
}

/// CIE L*a*b* under D65
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    /// CIE76 Delta-E
    pub fn delta_e(&self, other: &Lab) -> f64 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }
}

// =============================================================================
// Similarity
// =============================================================================

/// Perceived closeness of two colors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorDistance {
    /// Normalized RGB distance, 0..=100
    pub rgb_distance: f64,
    pub delta_e: f64,
    /// 0.6 × rgb + 0.4 × min(ΔE, 100)
    pub visual_distance: f64,
}

impl ColorDistance {
    pub fn between(a: &Rgb, b: &Rgb) -> Self {
        let rgb_distance = a.normalized_distance(b);
        let delta_e = a.to_lab().delta_e(&b.to_lab());
        Self {
            rgb_distance,
            delta_e,
            visual_distance: 0.6 * rgb_distance + 0.4 * delta_e.min(100.0),
        }
    }

    pub fn quality_impact(&self) -> VisualImpact {
        VisualImpact::from_visual_distance(self.visual_distance)
    }
}

/// How visible a color change would be in the finished print
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualImpact {
    Minimal,
    Low,
    Medium,
    High,
}

impl VisualImpact {
    pub fn from_visual_distance(distance: f64) -> Self {
        if distance <= 5.0 {
            Self::Minimal
        } else if distance <= 15.0 {
            Self::Low
        } else if distance <= 25.0 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl fmt::Display for VisualImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Whether two colors are close enough to be folded into one spool:
/// RGB distance under 150 with hue, saturation and lightness all close.
pub fn mergeable(a: &Rgb, b: &Rgb) -> bool {
    if a.euclidean_distance(b) >= 150.0 {
        return false;
    }
    let (ha, hb) = (a.to_hsl(), b.to_hsl());
    ha.hue_difference(&hb) < 30.0
        && (ha.saturation - hb.saturation).abs() < 0.3
        && (ha.lightness - hb.lightness).abs() < 0.3
}
