use ordpay_common::div_round_half_away;

use crate::{
    db_types::{DeliveryZone, Money},
    pricing::PricingError,
};

/// The fee for delivering an order with the given item subtotal over `distance_m` metres within `zone`.
///
/// `base_fee + round(per_km_fee * distance_m / 1000)`, or nothing at all once the subtotal reaches the zone's
/// free-delivery threshold.
pub fn delivery_fee(zone: &DeliveryZone, distance_m: i64, subtotal: Money) -> Result<Money, PricingError> {
    if distance_m < 0 {
        return Err(PricingError::InvalidDistance(distance_m));
    }
    if zone.free_delivery_threshold.map(|t| subtotal >= t).unwrap_or(false) {
        return Ok(Money::ZERO);
    }
    let distance_fee = div_round_half_away(i128::from(zone.per_km_fee.value()) * i128::from(distance_m), 1000);
    let distance_fee = Money::try_from(distance_fee).map_err(|_| PricingError::OrderTooLarge)?;
    zone.base_fee.checked_add(distance_fee).ok_or(PricingError::OrderTooLarge)
}

#[cfg(test)]
mod test {
    use super::*;

    fn zone(threshold: Option<i64>) -> DeliveryZone {
        DeliveryZone {
            id: 1,
            name: "Lekki".into(),
            base_fee: Money::from(50_000),
            per_km_fee: Money::from(10_000),
            free_delivery_threshold: threshold.map(Money::from),
            is_active: true,
        }
    }

    #[test]
    fn fee_is_base_plus_rounded_distance_component() {
        // 3.25km * 100.00/km = 325.00
        assert_eq!(delivery_fee(&zone(None), 3_250, Money::from(1_000)), Ok(Money::from(82_500)));
        assert_eq!(delivery_fee(&zone(None), 0, Money::from(1_000)), Ok(Money::from(50_000)));
        assert_eq!(delivery_fee(&zone(None), 1_555, Money::from(1_000)), Ok(Money::from(65_550)));
    }

    #[test]
    fn fee_is_waived_at_the_threshold() {
        let z = zone(Some(2_000_000));
        assert_eq!(delivery_fee(&z, 5_000, Money::from(2_000_000)), Ok(Money::ZERO));
        assert_eq!(delivery_fee(&z, 5_000, Money::from(1_999_999)), Ok(Money::from(100_000)));
    }

    #[test]
    fn out_of_range_distances_are_errors_not_free_delivery() {
        assert_eq!(delivery_fee(&zone(None), -1, Money::from(1_000)), Err(PricingError::InvalidDistance(-1)));
        assert_eq!(delivery_fee(&zone(None), i64::MAX, Money::from(1_000)), Err(PricingError::OrderTooLarge));
    }
}
