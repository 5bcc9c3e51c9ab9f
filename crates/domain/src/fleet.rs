//! Fleet vocabulary: component roles, model tiers, and component state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse model-cost bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    #[default]
    Standard,
    Heavy,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Fast => "fast",
            Tier::Standard => "standard",
            Tier::Heavy => "heavy",
        };
        f.write_str(s)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(Tier::Fast),
            "standard" => Ok(Tier::Standard),
            "heavy" => Ok(Tier::Heavy),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Role a component advertises in its `/status` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Director,
    Scheduler,
    Helper,
    View,
}

/// Coarse component lifecycle state, advertised in `/status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Starting,
    #[default]
    Idle,
    Working,
    Stopping,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentState::Starting => "starting",
            ComponentState::Idle => "idle",
            ComponentState::Working => "working",
            ComponentState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_roundtrip() {
        for tier in [Tier::Fast, Tier::Standard, Tier::Heavy] {
            let parsed: Tier = tier.to_string().parse().unwrap();
            assert_eq!(parsed, tier);
        }
        assert!("turbo".parse::<Tier>().is_err());
    }

    #[test]
    fn tier_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Heavy).unwrap(), "\"heavy\"");
        let t: Tier = serde_json::from_str("\"fast\"").unwrap();
        assert_eq!(t, Tier::Fast);
    }

    #[test]
    fn role_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"agent\"");
        let r: Role = serde_json::from_str("\"director\"").unwrap();
        assert_eq!(r, Role::Director);
    }

    #[test]
    fn state_defaults_to_idle() {
        assert_eq!(ComponentState::default(), ComponentState::Idle);
        assert_eq!(ComponentState::Working.to_string(), "working");
    }
}
