//! Electrical domain selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Representation used for every unknown of a topology.
///
/// The domain is fixed when a [`SystemTopology`](crate::SystemTopology) is
/// built; components read it from the stamp context and pick the matching
/// companion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Electromagnetic transients: instantaneous real values.
    #[default]
    Emt,
    /// Dynamic phasors: complex envelopes shifted by the system frequency.
    Dp,
}

impl Domain {
    /// Number of real matrix rows per unknown.
    pub fn width(self) -> usize {
        match self {
            Domain::Emt => 1,
            Domain::Dp => 2,
        }
    }

    /// Whether values carry an imaginary part.
    pub fn is_complex(self) -> bool {
        matches!(self, Domain::Dp)
    }

    /// Short name used in logs and config files.
    pub fn name(self) -> &'static str {
        match self {
            Domain::Emt => "emt",
            Domain::Dp => "dp",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_width() {
        assert_eq!(Domain::Emt.width(), 1);
        assert_eq!(Domain::Dp.width(), 2);
        assert!(Domain::Dp.is_complex());
        assert!(!Domain::Emt.is_complex());
    }

    #[test]
    fn test_domain_default_and_display() {
        assert_eq!(Domain::default(), Domain::Emt);
        assert_eq!(Domain::Dp.to_string(), "dp");
    }
}
