use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stimulus sweep direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Left to right
    LR,
    /// Right to left
    RL,
    /// Top to bottom
    TB,
    /// Bottom to top
    BT,
}

/// Visual-field axis swept by a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Azimuth,
    Elevation,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::LR, Direction::RL, Direction::TB, Direction::BT];

    pub fn label(&self) -> &'static str {
        match self {
            Self::LR => "LR",
            Self::RL => "RL",
            Self::TB => "TB",
            Self::BT => "BT",
        }
    }

    /// The sweep over the same axis in the other sense
    pub fn opposite(&self) -> Direction {
        match self {
            Self::LR => Self::RL,
            Self::RL => Self::LR,
            Self::TB => Self::BT,
            Self::BT => Self::TB,
        }
    }

    pub fn axis(&self) -> Axis {
        match self {
            Self::LR | Self::RL => Axis::Azimuth,
            Self::TB | Self::BT => Axis::Elevation,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LR" => Ok(Self::LR),
            "RL" => Ok(Self::RL),
            "TB" => Ok(Self::TB),
            "BT" => Ok(Self::BT),
            other => Err(format!("unknown sweep direction: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("lr".parse::<Direction>().unwrap(), Direction::LR);
        assert_eq!(" BT ".parse::<Direction>().unwrap(), Direction::BT);
        assert!("diagonal".parse::<Direction>().is_err());
    }

    #[test]
    fn test_opposite_shares_axis() {
        for direction in Direction::ALL {
            assert_eq!(direction.opposite().opposite(), direction);
            assert_eq!(direction.opposite().axis(), direction.axis());
        }
    }
}
