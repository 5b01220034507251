use core::{fmt::Display, str::FromStr};

use errors::ConfigError;
use serde::{Deserialize, Serialize};

use crate::geometry::{GeometryError, PartitionGeometry};

pub mod errors;

/// Prefix of the exchange group names when none is configured.
pub const DEFAULT_GROUP_PREFIX: &str = "fft2d";

/// How the global transpose moves data between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// One exchange group per node; node `i` scatters its blocks through group `i`.
    Scatter,
    /// A single exchange group; every node exchanges all of its blocks in one call.
    AllToAll,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Scatter => "scatter",
            Self::AllToAll => "all_to_all",
        })
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scatter" => Ok(Self::Scatter),
            "all_to_all" => Ok(Self::AllToAll),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Planning effort requested from the 1D transform backend.
///
/// Only the backend's internal tuning depends on it; results do not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanHint {
    /// Cheapest planning.
    #[default]
    Estimate,
    Measure,
    Patient,
    Exhaustive,
}

impl Display for PlanHint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Estimate => "estimate",
            Self::Measure => "measure",
            Self::Patient => "patient",
            Self::Exhaustive => "exhaustive",
        })
    }
}

impl FromStr for PlanHint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "estimate" => Ok(Self::Estimate),
            "measure" => Ok(Self::Measure),
            "patient" => Ok(Self::Patient),
            "exhaustive" => Ok(Self::Exhaustive),
            _ => Err(ConfigError::UnknownPlanHint(s.to_string())),
        }
    }
}

/// Configuration shared by every node of a run.
///
/// The strategy is kept as the raw tag so that every node validates it
/// independently when its session is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FftConfig {
    /// Global number of rows.
    pub dim_x: usize,
    /// Real samples per row.
    pub dim_y_real: usize,
    /// Communication strategy tag: `scatter` or `all_to_all`.
    pub strategy: String,
    /// Planning effort for the 1D transforms.
    pub plan: PlanHint,
    /// Prefix of the exchange group names.
    pub group_prefix: String,
}

impl FftConfig {
    #[must_use]
    pub fn new(dim_x: usize, dim_y_real: usize, strategy: impl Into<String>) -> Self {
        Self {
            dim_x,
            dim_y_real,
            strategy: strategy.into(),
            plan: PlanHint::default(),
            group_prefix: DEFAULT_GROUP_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_plan(mut self, plan: PlanHint) -> Self {
        self.plan = plan;
        self
    }

    #[must_use]
    pub fn with_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = prefix.into();
        self
    }

    /// Parses the strategy tag.
    pub fn strategy(&self) -> Result<Strategy, ConfigError> {
        self.strategy.parse()
    }

    /// Derives the partition geometry for `num_nodes` nodes.
    pub const fn geometry(&self, num_nodes: usize) -> Result<PartitionGeometry, GeometryError> {
        PartitionGeometry::new(self.dim_x, self.dim_y_real, num_nodes)
    }
}

impl Display for FftConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} x {} ({}, plan {})",
            self.dim_x, self.dim_y_real, self.strategy, self.plan
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trips_through_tags() {
        for strategy in [Strategy::Scatter, Strategy::AllToAll] {
            assert_eq!(strategy.to_string().parse::<Strategy>(), Ok(strategy));
        }
        assert_eq!(Strategy::from_str("all_to_all"), Ok(Strategy::AllToAll));
    }

    #[test]
    fn test_strategy_rejects_unknown_tags() {
        assert_eq!(
            Strategy::from_str("allgather"),
            Err(ConfigError::UnknownStrategy("allgather".into()))
        );
        // Tags are case sensitive
        assert!(Strategy::from_str("Scatter").is_err());
        assert!(Strategy::from_str("").is_err());
    }

    #[test]
    fn test_plan_hint_from_str() {
        assert_eq!(PlanHint::from_str("estimate"), Ok(PlanHint::Estimate));
        assert_eq!(PlanHint::from_str("measure"), Ok(PlanHint::Measure));
        assert_eq!(PlanHint::from_str("patient"), Ok(PlanHint::Patient));
        assert_eq!(PlanHint::from_str("exhaustive"), Ok(PlanHint::Exhaustive));
        assert!(PlanHint::from_str("wisdom").is_err());
        assert_eq!(PlanHint::default().to_string(), "estimate");
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = FftConfig::new(8, 14, "scatter");
        assert_eq!(config.plan, PlanHint::Estimate);
        assert_eq!(config.group_prefix, DEFAULT_GROUP_PREFIX);
        assert_eq!(config.strategy(), Ok(Strategy::Scatter));
        assert_eq!(config.to_string(), "8 x 14 (scatter, plan estimate)");

        let config = config.with_plan(PlanHint::Measure).with_group_prefix("run-7");
        assert_eq!(config.plan, PlanHint::Measure);
        assert_eq!(config.group_prefix, "run-7");
        assert_eq!(config.geometry(2).map(|g| g.n_x_local()), Ok(4));
    }
}
