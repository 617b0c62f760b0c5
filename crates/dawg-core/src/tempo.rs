//! Musical note divisions for tempo sync.
//!
//! Divisions are written the way they appear in presets: `"1/4"` for a
//! quarter note, a trailing `d` for dotted (`"1/8d"`) and `t` for triplet
//! (`"1/8t"`).

use alloc::string::String;
use core::fmt;
use core::str::FromStr;

/// Musical note divisions for tempo sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum NoteDivision {
    /// Whole note (4 beats)
    Whole,
    /// Half note (2 beats)
    Half,
    /// Quarter note (1 beat)
    #[default]
    Quarter,
    /// Eighth note (1/2 beat)
    Eighth,
    /// Sixteenth note (1/4 beat)
    Sixteenth,
    /// Thirty-second note (1/8 beat)
    ThirtySecond,
    /// Dotted half note (3 beats)
    DottedHalf,
    /// Dotted quarter note (1.5 beats)
    DottedQuarter,
    /// Dotted eighth note (3/4 beat)
    DottedEighth,
    /// Triplet quarter note (2/3 beat)
    TripletQuarter,
    /// Triplet eighth note (1/3 beat)
    TripletEighth,
    /// Triplet sixteenth note (1/6 beat)
    TripletSixteenth,
}

impl NoteDivision {
    /// Every division, longest first.
    pub const ALL: [NoteDivision; 12] = [
        NoteDivision::Whole,
        NoteDivision::DottedHalf,
        NoteDivision::Half,
        NoteDivision::DottedQuarter,
        NoteDivision::Quarter,
        NoteDivision::TripletQuarter,
        NoteDivision::DottedEighth,
        NoteDivision::Eighth,
        NoteDivision::TripletEighth,
        NoteDivision::Sixteenth,
        NoteDivision::TripletSixteenth,
        NoteDivision::ThirtySecond,
    ];

    /// Convert note division to frequency in Hz at given BPM.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dawg_core::NoteDivision;
    ///
    /// // At 120 BPM, quarter note = 2 Hz
    /// let freq = NoteDivision::Quarter.to_hz(120.0);
    /// assert!((freq - 2.0).abs() < 0.001);
    /// ```
    pub fn to_hz(&self, bpm: f32) -> f32 {
        (bpm / 60.0) / self.beats()
    }

    /// Length of the division in seconds at given BPM.
    pub fn to_seconds(&self, bpm: f32) -> f32 {
        self.beats() * 60.0 / bpm
    }

    /// Get the number of beats this division represents.
    pub fn beats(&self) -> f32 {
        match self {
            NoteDivision::Whole => 4.0,
            NoteDivision::Half => 2.0,
            NoteDivision::Quarter => 1.0,
            NoteDivision::Eighth => 0.5,
            NoteDivision::Sixteenth => 0.25,
            NoteDivision::ThirtySecond => 0.125,
            NoteDivision::DottedHalf => 3.0,
            NoteDivision::DottedQuarter => 1.5,
            NoteDivision::DottedEighth => 0.75,
            NoteDivision::TripletQuarter => 2.0 / 3.0,
            NoteDivision::TripletEighth => 1.0 / 3.0,
            NoteDivision::TripletSixteenth => 1.0 / 6.0,
        }
    }

    /// Preset notation, e.g. `"1/8d"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteDivision::Whole => "1/1",
            NoteDivision::Half => "1/2",
            NoteDivision::Quarter => "1/4",
            NoteDivision::Eighth => "1/8",
            NoteDivision::Sixteenth => "1/16",
            NoteDivision::ThirtySecond => "1/32",
            NoteDivision::DottedHalf => "1/2d",
            NoteDivision::DottedQuarter => "1/4d",
            NoteDivision::DottedEighth => "1/8d",
            NoteDivision::TripletQuarter => "1/4t",
            NoteDivision::TripletEighth => "1/8t",
            NoteDivision::TripletSixteenth => "1/16t",
        }
    }
}

impl fmt::Display for NoteDivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A division string that is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDivisionError(pub String);

impl fmt::Display for ParseDivisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown note division '{}'", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseDivisionError {}

impl FromStr for NoteDivision {
    type Err = ParseDivisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let canonical = if trimmed == "1" { "1/1" } else { trimmed };
        NoteDivision::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(canonical))
            .ok_or_else(|| ParseDivisionError(String::from(s)))
    }
}

impl TryFrom<String> for NoteDivision {
    type Error = ParseDivisionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoteDivision> for String {
    fn from(value: NoteDivision) -> Self {
        String::from(value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_rates_at_120_bpm() {
        assert!((NoteDivision::Quarter.to_hz(120.0) - 2.0).abs() < 1e-6);
        assert!((NoteDivision::Eighth.to_hz(120.0) - 4.0).abs() < 1e-6);
        assert!((NoteDivision::DottedEighth.to_hz(120.0) - 8.0 / 3.0).abs() < 1e-5);
        assert!((NoteDivision::TripletEighth.to_hz(120.0) - 6.0).abs() < 1e-5);
        assert!((NoteDivision::Whole.to_seconds(120.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_and_display_agree() {
        for division in NoteDivision::ALL {
            let parsed: NoteDivision = division.as_str().parse().unwrap();
            assert_eq!(parsed, division);
        }
        assert_eq!("1/8T".parse::<NoteDivision>(), Ok(NoteDivision::TripletEighth));
        assert_eq!("1".parse::<NoteDivision>(), Ok(NoteDivision::Whole));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "3/7".parse::<NoteDivision>().unwrap_err();
        assert_eq!(err, ParseDivisionError("3/7".into()));
    }
}
