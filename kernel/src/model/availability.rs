use std::collections::HashMap;

use crate::model::hotel::RoomType;
use crate::model::id::RoomTypeId;

/// Remaining inventory for one room type over a requested date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTypeAvailability {
    pub room_type_id: RoomTypeId,
    pub name: String,
    pub capacity: i32,
    pub nightly_rate_cents: i64,
    pub units_available: i64,
}

/// Availability by subtraction: configured units minus claims already
/// overlapping the requested range. `claimed` carries the count of
/// non-cancelled overlapping claims per room type; types with no claims
/// may simply be absent from the map.
///
/// The result is clamped at zero so a ledger that somehow exceeds the
/// configured count (e.g. the count was lowered after bookings existed)
/// reads as sold out rather than negative.
pub fn subtract_claims(
    room_types: &[RoomType],
    claimed: &HashMap<RoomTypeId, i64>,
) -> Vec<RoomTypeAvailability> {
    room_types
        .iter()
        .map(|rt| {
            let overlapping = claimed.get(&rt.room_type_id).copied().unwrap_or(0);
            RoomTypeAvailability {
                room_type_id: rt.room_type_id,
                name: rt.name.clone(),
                capacity: rt.capacity,
                nightly_rate_cents: rt.nightly_rate_cents,
                units_available: (i64::from(rt.total_units) - overlapping).max(0),
            }
        })
        .collect()
}

/// Total cost of a booking in minor units:
/// `sum(count * nightly rate) * nights`.
pub fn quote_total_cents(nights: i64, lines: impl IntoIterator<Item = (i64, u32)>) -> i64 {
    lines
        .into_iter()
        .map(|(rate_cents, count)| rate_cents * i64::from(count))
        .sum::<i64>()
        * nights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::id::HotelId;

    fn room_type(total_units: i32, rate: i64) -> RoomType {
        RoomType {
            room_type_id: RoomTypeId::new(),
            hotel_id: HotelId::new(),
            name: "Double Queen".into(),
            capacity: 2,
            beds: 2,
            nightly_rate_cents: rate,
            total_units,
        }
    }

    #[test]
    fn subtracts_overlapping_claims() {
        let rt = room_type(3, 10_000);
        let claimed = HashMap::from([(rt.room_type_id, 2)]);

        let got = subtract_claims(&[rt.clone()], &claimed);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].units_available, 1);
        assert_eq!(got[0].nightly_rate_cents, 10_000);
    }

    #[test]
    fn unclaimed_types_show_full_inventory() {
        let rt = room_type(5, 10_000);
        let got = subtract_claims(&[rt], &HashMap::new());
        assert_eq!(got[0].units_available, 5);
    }

    #[test]
    fn zero_unit_types_are_always_sold_out() {
        let rt = room_type(0, 10_000);
        let got = subtract_claims(&[rt], &HashMap::new());
        assert_eq!(got[0].units_available, 0);
    }

    #[test]
    fn availability_never_goes_negative() {
        let rt = room_type(1, 10_000);
        let claimed = HashMap::from([(rt.room_type_id, 4)]);
        let got = subtract_claims(&[rt], &claimed);
        assert_eq!(got[0].units_available, 0);
    }

    #[test]
    fn quote_multiplies_units_rate_and_nights() {
        // two 100.00/night rooms for two nights
        assert_eq!(quote_total_cents(2, [(10_000, 2)]), 40_000);
        // mixed bundle: 2 x 100.00 + 1 x 250.00, three nights
        assert_eq!(quote_total_cents(3, [(10_000, 2), (25_000, 1)]), 135_000);
        assert_eq!(quote_total_cents(1, []), 0);
    }
}
