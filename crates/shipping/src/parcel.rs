//! Parcel dimensions and billable weight.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::ShippingError;

/// Divisor carriers use to turn cm³ into volumetric kilograms.
pub const VOLUMETRIC_DIVISOR: u32 = 5000;

/// A box to ship, in centimetres and kilograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    pub length_cm: Decimal,
    pub width_cm: Decimal,
    pub height_cm: Decimal,
    pub weight_kg: Decimal,
}

/// Store-wide packaging defaults, read from `PACKAGE_*` variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingDefaults {
    pub length_cm: Decimal,
    pub width_cm: Decimal,
    pub height_cm: Decimal,
    /// Weight of the empty box and filler.
    pub tare_kg: Decimal,
    /// Carriers reject lighter parcels.
    pub min_weight_kg: Decimal,
}

impl Default for PackagingDefaults {
    fn default() -> Self {
        Self {
            length_cm: Decimal::from(30),
            width_cm: Decimal::from(25),
            height_cm: Decimal::from(10),
            tare_kg: Decimal::new(2, 1),
            min_weight_kg: Decimal::ONE,
        }
    }
}

/// One product line going into a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDimensions {
    pub weight_kg: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub length_cm: Option<Decimal>,
    #[serde(default)]
    pub width_cm: Option<Decimal>,
    #[serde(default)]
    pub height_cm: Option<Decimal>,
}

impl Parcel {
    /// Build a parcel for a set of order items.
    ///
    /// Weight is the sum of item weights times quantity plus tare, never
    /// below the minimum. Each dimension is the larger of the default box and
    /// the largest item in that dimension.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::InvalidParcel` when there are no items, a
    /// quantity is not positive, or a weight or dimension is negative.
    pub fn from_items(
        items: &[ItemDimensions],
        defaults: &PackagingDefaults,
    ) -> Result<Self, ShippingError> {
        if items.is_empty() {
            return Err(ShippingError::InvalidParcel("no items".to_string()));
        }

        let mut weight = defaults.tare_kg;
        let mut length = defaults.length_cm;
        let mut width = defaults.width_cm;
        let mut height = defaults.height_cm;

        for item in items {
            if item.quantity <= 0 {
                return Err(ShippingError::InvalidParcel(
                    "quantity must be positive".to_string(),
                ));
            }
            if item.weight_kg < Decimal::ZERO {
                return Err(ShippingError::InvalidParcel(
                    "weight cannot be negative".to_string(),
                ));
            }
            weight += item.weight_kg * Decimal::from(item.quantity);

            for (dim, current) in [
                (item.length_cm, &mut length),
                (item.width_cm, &mut width),
                (item.height_cm, &mut height),
            ] {
                if let Some(value) = dim {
                    if value < Decimal::ZERO {
                        return Err(ShippingError::InvalidParcel(
                            "dimensions cannot be negative".to_string(),
                        ));
                    }
                    *current = (*current).max(value);
                }
            }
        }

        Ok(Self {
            length_cm: length,
            width_cm: width,
            height_cm: height,
            weight_kg: weight.max(defaults.min_weight_kg),
        })
    }

    /// Volumetric weight in kilograms.
    #[must_use]
    pub fn volumetric_weight(&self) -> Decimal {
        self.length_cm * self.width_cm * self.height_cm / Decimal::from(VOLUMETRIC_DIVISOR)
    }

    /// The weight carriers charge for, rounded up to 0.1 kg.
    #[must_use]
    pub fn billable_weight(&self) -> Decimal {
        self.weight_kg
            .max(self.volumetric_weight())
            .round_dp_with_strategy(1, RoundingStrategy::AwayFromZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().expect("decimal literal")
    }

    fn item(weight: &str, quantity: i32) -> ItemDimensions {
        ItemDimensions {
            weight_kg: d(weight),
            quantity,
            length_cm: None,
            width_cm: None,
            height_cm: None,
        }
    }

    #[test]
    fn test_weight_is_summed_with_tare() {
        let parcel =
            Parcel::from_items(&[item("0.4", 3), item("0.25", 2)], &PackagingDefaults::default())
                .expect("valid items");
        assert_eq!(parcel.weight_kg, d("1.9"));
        assert_eq!(parcel.length_cm, d("30"));
    }

    #[test]
    fn test_minimum_weight_enforced() {
        let parcel = Parcel::from_items(&[item("0.1", 1)], &PackagingDefaults::default())
            .expect("valid items");
        assert_eq!(parcel.weight_kg, d("1"));
    }

    #[test]
    fn test_largest_item_grows_the_box() {
        let mut big = item("1", 1);
        big.length_cm = Some(d("45"));
        big.height_cm = Some(d("5"));
        let parcel = Parcel::from_items(&[big], &PackagingDefaults::default()).expect("valid");
        assert_eq!(parcel.length_cm, d("45"));
        assert_eq!(parcel.height_cm, d("10"));
    }

    #[test]
    fn test_billable_weight_uses_volumetric_when_larger() {
        let parcel = Parcel {
            length_cm: d("40"),
            width_cm: d("30"),
            height_cm: d("21"),
            weight_kg: d("2"),
        };
        // 40 * 30 * 21 / 5000 = 5.04, rounded up to 5.1
        assert_eq!(parcel.billable_weight(), d("5.1"));
    }

    #[test]
    fn test_billable_weight_uses_actual_when_heavier() {
        let parcel = Parcel {
            length_cm: d("10"),
            width_cm: d("10"),
            height_cm: d("10"),
            weight_kg: d("3.21"),
        };
        assert_eq!(parcel.billable_weight(), d("3.3"));
    }

    #[test]
    fn test_rejects_invalid_items() {
        let defaults = PackagingDefaults::default();
        assert!(Parcel::from_items(&[], &defaults).is_err());
        assert!(Parcel::from_items(&[item("1", 0)], &defaults).is_err());
        assert!(Parcel::from_items(&[item("-1", 1)], &defaults).is_err());
    }
}
