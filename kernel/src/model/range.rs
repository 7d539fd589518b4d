use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A stay period as a half-open calendar-date interval `[start, end)`.
/// The checkout date is exclusive, so back-to-back stays that touch at
/// an endpoint do not contend for the same room-night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// `start` must be strictly before `end`. Whether `start` lies in the
    /// past is a caller-side policy check, not enforced here.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        assert!(DateRange::new(date("2020-01-10"), date("2020-01-10")).is_none());
        assert!(DateRange::new(date("2020-01-12"), date("2020-01-10")).is_none());
    }

    #[test]
    fn counts_nights() {
        assert_eq!(range("2020-01-10", "2020-01-12").nights(), 2);
        assert_eq!(range("2020-01-10", "2020-01-11").nights(), 1);
    }

    #[test]
    fn overlap_is_half_open() {
        let jan_10_12 = range("2020-01-10", "2020-01-12");

        // touching endpoints share no night
        assert!(!jan_10_12.overlaps(&range("2020-01-12", "2020-01-14")));
        assert!(!jan_10_12.overlaps(&range("2020-01-08", "2020-01-10")));

        // a single shared night is enough
        assert!(jan_10_12.overlaps(&range("2020-01-11", "2020-01-13")));
        assert!(jan_10_12.overlaps(&range("2020-01-09", "2020-01-11")));

        // containment in either direction
        assert!(jan_10_12.overlaps(&range("2020-01-01", "2020-02-01")));
        assert!(range("2020-01-01", "2020-02-01").overlaps(&jan_10_12));
    }
}
