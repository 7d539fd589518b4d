use chrono::{Local, NaiveDate};
use kernel::model::availability::RoomTypeAvailability;
use kernel::model::hotel::{Hotel, RoomType};
use kernel::model::id::{HotelId, RoomTypeId};
use kernel::model::range::DateRange;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl AvailabilityQuery {
    /// Date sanity lives with the caller: the engine itself assumes a
    /// well-formed, non-past range.
    pub fn into_range(self) -> AppResult<DateRange> {
        if self.start_date < Local::now().date_naive() {
            return Err(AppError::InvalidRequest(
                "invalid date range: make sure your reservation isn't in the past".into(),
            ));
        }
        DateRange::new(self.start_date, self.end_date).ok_or_else(|| {
            AppError::InvalidRequest("the checkout date must be after the check-in date".into())
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub items: Vec<RoomTypeAvailabilityResponse>,
}

impl From<Vec<RoomTypeAvailability>> for AvailabilityResponse {
    fn from(value: Vec<RoomTypeAvailability>) -> Self {
        Self {
            items: value
                .into_iter()
                .map(RoomTypeAvailabilityResponse::from)
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTypeAvailabilityResponse {
    pub room_type_id: RoomTypeId,
    pub name: String,
    pub capacity: i32,
    pub nightly_rate_cents: i64,
    pub units_available: i64,
}

impl From<RoomTypeAvailability> for RoomTypeAvailabilityResponse {
    fn from(value: RoomTypeAvailability) -> Self {
        let RoomTypeAvailability {
            room_type_id,
            name,
            capacity,
            nightly_rate_cents,
            units_available,
        } = value;
        Self {
            room_type_id,
            name,
            capacity,
            nightly_rate_cents,
            units_available,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelResponse {
    pub hotel_id: HotelId,
    pub title: String,
    pub room_types: Vec<RoomTypeResponse>,
}

impl HotelResponse {
    pub fn new(hotel: Hotel, room_types: Vec<RoomType>) -> Self {
        Self {
            hotel_id: hotel.hotel_id,
            title: hotel.title,
            room_types: room_types.into_iter().map(RoomTypeResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTypeResponse {
    pub room_type_id: RoomTypeId,
    pub name: String,
    pub capacity: i32,
    pub beds: i32,
    pub nightly_rate_cents: i64,
    pub total_units: i32,
}

impl From<RoomType> for RoomTypeResponse {
    fn from(value: RoomType) -> Self {
        let RoomType {
            room_type_id,
            hotel_id: _,
            name,
            capacity,
            beds,
            nightly_rate_cents,
            total_units,
        } = value;
        Self {
            room_type_id,
            name,
            capacity,
            beds,
            nightly_rate_cents,
            total_units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    #[test]
    fn past_check_in_dates_are_rejected() {
        let today = Local::now().date_naive();
        let query = AvailabilityQuery {
            start_date: today.checked_sub_days(Days::new(1)).unwrap(),
            end_date: today.checked_add_days(Days::new(1)).unwrap(),
        };
        assert!(matches!(
            query.into_range(),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let today = Local::now().date_naive();
        let query = AvailabilityQuery {
            start_date: today.checked_add_days(Days::new(5)).unwrap(),
            end_date: today.checked_add_days(Days::new(3)).unwrap(),
        };
        assert!(matches!(
            query.into_range(),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn a_future_stay_converts() {
        let today = Local::now().date_naive();
        let query = AvailabilityQuery {
            start_date: today.checked_add_days(Days::new(3)).unwrap(),
            end_date: today.checked_add_days(Days::new(5)).unwrap(),
        };
        let range = query.into_range().unwrap();
        assert_eq!(range.nights(), 2);
    }
}
