//! Weekly carbon footprint estimate from fixed emission factors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// kg CO2 per unit of activity. Passed explicitly to [`calculate_footprint`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmissionFactors {
    /// kg CO2 per km
    pub car: f64,
    pub bus: f64,
    pub train: f64,
    pub plane: f64,
    /// kg CO2 per meal
    pub meat: f64,
    pub vegetarian: f64,
    pub vegan: f64,
}

pub const DEFAULT_FACTORS: EmissionFactors = EmissionFactors {
    car: 2.3,
    bus: 0.1,
    train: 0.04,
    plane: 0.25,
    meat: 6.0,
    vegetarian: 1.5,
    vegan: 1.0,
};

impl Default for EmissionFactors {
    fn default() -> Self {
        DEFAULT_FACTORS
    }
}

/// One week of travel and meals, as collected from the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityInputs {
    pub car_km: f64,
    pub bus_km: f64,
    pub train_km: f64,
    pub air_km: f64,
    pub meat_meals: f64,
    pub vegetarian_meals: f64,
    pub vegan_meals: f64,
}

impl ActivityInputs {
    fn fields(&self) -> [(&'static str, f64); 7] {
        [
            ("car_km", self.car_km),
            ("bus_km", self.bus_km),
            ("train_km", self.train_km),
            ("air_km", self.air_km),
            ("meat_meals", self.meat_meals),
            ("vegetarian_meals", self.vegetarian_meals),
            ("vegan_meals", self.vegan_meals),
        ]
    }
}

/// Everyday equivalents of a weekly total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootprintStats {
    /// Trees needed to absorb the total over a year (21 kg each).
    pub trees: i64,
    /// Short-haul flights (500 kg each).
    pub flights: i64,
    /// 100 km car trips (230 kg each).
    pub driving100km: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootprintResult {
    /// kg CO2, unrounded
    pub total_emissions: f64,
    pub stats: FootprintStats,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FootprintError {
    #[error("invalid value for {field}: {value} (must be a finite, non-negative number)")]
    InvalidInput { field: &'static str, value: f64 },
    #[error("inputs are too large: the weekly total is not a finite number")]
    TotalOverflow,
}

/// Computes the weekly total and its equivalents.
///
/// Negative and non-finite inputs are rejected, as are inputs whose total
/// overflows `f64`. Stats are rounded half away from zero (`f64::round`).
pub fn calculate_footprint(
    inputs: &ActivityInputs,
    factors: &EmissionFactors,
) -> Result<FootprintResult, FootprintError> {
    for (field, value) in inputs.fields() {
        if !value.is_finite() || value < 0.0 {
            return Err(FootprintError::InvalidInput { field, value });
        }
    }

    let total_emissions = inputs.car_km * factors.car
        + inputs.bus_km * factors.bus
        + inputs.train_km * factors.train
        + inputs.air_km * factors.plane
        + inputs.meat_meals * factors.meat
        + inputs.vegetarian_meals * factors.vegetarian
        + inputs.vegan_meals * factors.vegan;
    if !total_emissions.is_finite() {
        return Err(FootprintError::TotalOverflow);
    }

    let stats = FootprintStats {
        trees: (total_emissions / 21.0).round() as i64,
        flights: (total_emissions / 500.0).round() as i64,
        driving100km: (total_emissions / 230.0).round() as i64,
    };

    Ok(FootprintResult {
        total_emissions,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footprint(inputs: ActivityInputs) -> FootprintResult {
        calculate_footprint(&inputs, &DEFAULT_FACTORS).unwrap()
    }

    #[test]
    fn test_all_zero_inputs() {
        let result = footprint(ActivityInputs::default());
        assert_eq!(result.total_emissions, 0.0);
        assert_eq!(
            result.stats,
            FootprintStats {
                trees: 0,
                flights: 0,
                driving100km: 0
            }
        );
    }

    #[test]
    fn test_hundred_km_by_car() {
        let result = footprint(ActivityInputs {
            car_km: 100.0,
            ..Default::default()
        });
        assert!((result.total_emissions - 230.0).abs() < 1e-9);
        assert_eq!(result.stats.trees, 11);
        assert_eq!(result.stats.flights, 0);
        assert_eq!(result.stats.driving100km, 1);
    }

    #[test]
    fn test_linear_formula() {
        let inputs = ActivityInputs {
            car_km: 12.0,
            bus_km: 30.0,
            train_km: 45.0,
            air_km: 8.0,
            meat_meals: 5.0,
            vegetarian_meals: 3.0,
            vegan_meals: 2.0,
        };
        let expected =
            12.0 * 2.3 + 30.0 * 0.1 + 45.0 * 0.04 + 8.0 * 0.25 + 5.0 * 6.0 + 3.0 * 1.5 + 2.0;
        let result = footprint(inputs);
        assert!((result.total_emissions - expected).abs() < 1e-9);
        assert_eq!(result.stats.trees, (expected / 21.0).round() as i64);
        assert_eq!(result.stats.flights, (expected / 500.0).round() as i64);
        assert_eq!(result.stats.driving100km, (expected / 230.0).round() as i64);
    }

    #[test]
    fn test_stats_round_half_away_from_zero() {
        // 9 kg + 1.5 kg = 10.5 kg -> exactly half a tree
        let result = footprint(ActivityInputs {
            vegan_meals: 9.0,
            vegetarian_meals: 1.0,
            ..Default::default()
        });
        assert_eq!(result.total_emissions, 10.5);
        assert_eq!(result.stats.trees, 1);
    }

    #[test]
    fn test_large_inputs_are_accepted() {
        let result = footprint(ActivityInputs {
            air_km: 1_000_000.0,
            ..Default::default()
        });
        assert_eq!(result.total_emissions, 250_000.0);
        assert_eq!(result.stats.flights, 500);
    }

    #[test]
    fn test_overflowing_total_rejected() {
        let result = calculate_footprint(
            &ActivityInputs {
                car_km: 1e308,
                ..Default::default()
            },
            &DEFAULT_FACTORS,
        );
        assert_eq!(result, Err(FootprintError::TotalOverflow));

        // Each term is finite but the sum is not.
        let result = calculate_footprint(
            &ActivityInputs {
                meat_meals: f64::MAX / 6.0,
                vegan_meals: f64::MAX,
                ..Default::default()
            },
            &DEFAULT_FACTORS,
        );
        assert_eq!(result, Err(FootprintError::TotalOverflow));
    }

    #[test]
    fn test_negative_input_rejected() {
        let err = calculate_footprint(
            &ActivityInputs {
                bus_km: -1.0,
                ..Default::default()
            },
            &DEFAULT_FACTORS,
        )
        .unwrap_err();
        assert_eq!(
            err,
            FootprintError::InvalidInput {
                field: "bus_km",
                value: -1.0
            }
        );
    }

    #[test]
    fn test_nan_input_rejected() {
        let result = calculate_footprint(
            &ActivityInputs {
                meat_meals: f64::NAN,
                ..Default::default()
            },
            &DEFAULT_FACTORS,
        );
        assert!(matches!(
            result,
            Err(FootprintError::InvalidInput {
                field: "meat_meals",
                ..
            })
        ));
    }

    #[test]
    fn test_custom_factors_are_used() {
        let factors = EmissionFactors {
            car: 1.0,
            ..DEFAULT_FACTORS
        };
        let result = calculate_footprint(
            &ActivityInputs {
                car_km: 42.0,
                ..Default::default()
            },
            &factors,
        )
        .unwrap();
        assert_eq!(result.total_emissions, 42.0);
    }
}
