//! Traffic routing domain types

use serde::{Deserialize, Serialize};

/// One of the two backend slots behind a service's listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolColor {
    Blue,
    Green,
}

impl PoolColor {
    /// The opposite slot
    pub fn other(self) -> Self {
        match self {
            PoolColor::Blue => PoolColor::Green,
            PoolColor::Green => PoolColor::Blue,
        }
    }
}

impl std::fmt::Display for PoolColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolColor::Blue => write!(f, "blue"),
            PoolColor::Green => write!(f, "green"),
        }
    }
}

/// Handle to a provisioned backend pool
///
/// Opaque to the orchestrator apart from the optional endpoint used for
/// health probing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolHandle {
    pub id: String,
    /// Base URL the pool answers on, e.g. `http://10.0.1.12:80`
    pub endpoint: Option<String>,
}

impl PoolHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl std::fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Listener weights for both slots; always complementary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficWeights {
    pub blue: u8,
    pub green: u8,
}

impl TrafficWeights {
    /// All traffic on one slot
    pub fn all_on(color: PoolColor) -> Self {
        Self::with(color, 100)
    }

    /// `weight` percent on `color`, the remainder on the other slot
    ///
    /// Weights above 100 are clamped.
    pub fn with(color: PoolColor, weight: u8) -> Self {
        let weight = weight.min(100);
        match color {
            PoolColor::Blue => Self {
                blue: weight,
                green: 100 - weight,
            },
            PoolColor::Green => Self {
                blue: 100 - weight,
                green: weight,
            },
        }
    }

    pub fn weight_of(&self, color: PoolColor) -> u8 {
        match color {
            PoolColor::Blue => self.blue,
            PoolColor::Green => self.green,
        }
    }

    pub fn is_complementary(&self) -> bool {
        u16::from(self.blue) + u16::from(self.green) == 100
    }
}

impl Default for TrafficWeights {
    fn default() -> Self {
        Self::all_on(PoolColor::Blue)
    }
}

impl std::fmt::Display for TrafficWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blue={} green={}", self.blue, self.green)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_are_complementary() {
        for w in [0u8, 1, 37, 50, 99, 100, 200] {
            for color in [PoolColor::Blue, PoolColor::Green] {
                let weights = TrafficWeights::with(color, w);
                assert!(weights.is_complementary(), "{weights}");
                assert_eq!(weights.weight_of(color), w.min(100));
            }
        }
    }

    #[test]
    fn test_default_is_all_blue() {
        let weights = TrafficWeights::default();
        assert_eq!(weights.blue, 100);
        assert_eq!(weights.green, 0);
    }

    #[test]
    fn test_other_color() {
        assert_eq!(PoolColor::Blue.other(), PoolColor::Green);
        assert_eq!(PoolColor::Green.other(), PoolColor::Blue);
    }
}
