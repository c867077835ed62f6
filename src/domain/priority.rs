//! Priority levels for job scheduling

use serde::{Deserialize, Serialize};

/// Scheduling priority of a job
///
/// Any integer is valid. Higher values are dispatched first; jobs with equal
/// priority run in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const LOW: Priority = Priority(-10);
    pub const NORMAL: Priority = Priority(0);
    pub const HIGH: Priority = Priority(10);
    pub const CRITICAL: Priority = Priority(100);
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::LOW => write!(f, "low"),
            Self::NORMAL => write!(f, "normal"),
            Self::HIGH => write!(f, "high"),
            Self::CRITICAL => write!(f, "critical"),
            Self(n) => write!(f, "{}", n),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::LOW),
            "normal" => Ok(Self::NORMAL),
            "high" => Ok(Self::HIGH),
            "critical" => Ok(Self::CRITICAL),
            other => other
                .parse::<i32>()
                .map(Self)
                .map_err(|_| format!("Unknown priority: {}", s)),
        }
    }
}
