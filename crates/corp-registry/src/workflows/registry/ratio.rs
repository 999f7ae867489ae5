use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A share of a whole, held as integer basis points (100% == 10_000).
///
/// On the wire it is a percentage number (`60`, `33.33`), rounded to the
/// nearest basis point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ratio(u32);

impl Ratio {
    pub const ZERO: Ratio = Ratio(0);
    pub const WHOLE: Ratio = Ratio(10_000);

    pub const fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    pub fn from_percent(percent: f64) -> Result<Self, RatioError> {
        if !percent.is_finite() {
            return Err(RatioError::NotFinite);
        }
        if percent < 0.0 {
            return Err(RatioError::Negative(percent));
        }
        let bp = (percent * 100.0).round();
        if bp > Self::WHOLE.0 as f64 {
            return Err(RatioError::AboveWhole(percent));
        }
        Ok(Self(bp as u32))
    }

    pub fn as_percent(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, other: Ratio) -> Option<Ratio> {
        self.0.checked_sub(other.0).map(Ratio)
    }
}

impl Add for Ratio {
    type Output = Ratio;

    fn add(self, rhs: Ratio) -> Ratio {
        Ratio(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Ratio {
    type Output = Ratio;

    fn sub(self, rhs: Ratio) -> Ratio {
        Ratio(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Ratio {
    fn sum<I: Iterator<Item = Ratio>>(iter: I) -> Ratio {
        iter.fold(Ratio::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Ratio> for Ratio {
    fn sum<I: Iterator<Item = &'a Ratio>>(iter: I) -> Ratio {
        iter.copied().sum()
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_percent())
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let percent = f64::deserialize(deserializer)?;
        Ratio::from_percent(percent).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RatioError {
    #[error("ratio must be a finite number")]
    NotFinite,
    #[error("ratio {0} must not be negative")]
    Negative(f64),
    #[error("ratio {0} exceeds 100")]
    AboveWhole(f64),
}
