//! Input generators for runs and benchmarks.

use core::{fmt::Display, str::FromStr};

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::{geometry::PartitionGeometry, parameters::errors::ConfigError};

/// Which values fill the real part of the input rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Input {
    /// Global row `r`, sample `c` holds `r * dim_y_real + c`.
    #[default]
    Ramp,
    /// Uniform samples in `[-1, 1)` from a seeded generator.
    Random,
}

impl Display for Input {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Ramp => "ramp",
            Self::Random => "random",
        })
    }
}

impl FromStr for Input {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ramp" => Ok(Self::Ramp),
            "random" => Ok(Self::Random),
            _ => Err(ConfigError::UnknownInput(s.to_string())),
        }
    }
}

/// Builds all `dim_x` global input rows, each `row_len()` slots long.
///
/// Only the first `dim_y_real` slots of a row carry samples; the rest is padding
/// for the in-place real-to-complex output and stays zero.
#[must_use]
pub fn global_rows(geometry: &PartitionGeometry, input: Input, seed: u64) -> Vec<Vec<f64>> {
    let dim_y_real = geometry.dim_y_real();
    let mut rng = SmallRng::seed_from_u64(seed);

    (0..geometry.dim_x())
        .map(|r| {
            let mut row = vec![0.0; geometry.row_len()];
            for (c, slot) in row[..dim_y_real].iter_mut().enumerate() {
                *slot = match input {
                    Input::Ramp => (r * dim_y_real + c) as f64,
                    Input::Random => rng.random_range(-1.0..1.0),
                };
            }
            row
        })
        .collect()
}

/// Splits global rows into the first-pass partitions, in node order.
#[must_use]
pub fn partition_rows(geometry: &PartitionGeometry, rows: Vec<Vec<f64>>) -> Vec<Vec<Vec<f64>>> {
    let mut rows = rows.into_iter();
    (0..geometry.num_nodes())
        .map(|_| rows.by_ref().take(geometry.n_x_local()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_rows() {
        let geometry = PartitionGeometry::new(8, 14, 2).unwrap();
        let rows = global_rows(&geometry, Input::Ramp, 0);

        assert_eq!(rows.len(), 8);
        assert!(rows.iter().all(|row| row.len() == 16));
        assert_eq!(rows[0][..3], [0.0, 1.0, 2.0]);
        assert_eq!(rows[2][13], 41.0);
        // Padding
        assert_eq!(rows[7][14..], [0.0, 0.0]);
    }

    #[test]
    fn test_random_rows_are_seeded() {
        let geometry = PartitionGeometry::new(4, 6, 1).unwrap();

        let a = global_rows(&geometry, Input::Random, 42);
        let b = global_rows(&geometry, Input::Random, 42);
        let c = global_rows(&geometry, Input::Random, 43);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().flat_map(|row| &row[..6]).all(|x| (-1.0..1.0).contains(x)));
        assert!(a.iter().all(|row| row[6..] == [0.0, 0.0]));
    }

    #[test]
    fn test_partition_rows_in_node_order() {
        let geometry = PartitionGeometry::new(6, 4, 3).unwrap();
        let rows = global_rows(&geometry, Input::Ramp, 0);

        let parts = partition_rows(&geometry, rows.clone());

        assert_eq!(parts.len(), 3);
        for (node, part) in parts.iter().enumerate() {
            assert_eq!(part.as_slice(), &rows[geometry.x_partition(node)]);
            assert!(geometry.check_rows(part).is_ok());
        }
    }

    #[test]
    fn test_input_tags() {
        assert_eq!("ramp".parse(), Ok(Input::Ramp));
        assert_eq!(Input::Random.to_string(), "random");
        assert_eq!(
            "zeros".parse::<Input>(),
            Err(ConfigError::UnknownInput("zeros".into()))
        );
    }
}
