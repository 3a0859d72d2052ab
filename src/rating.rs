use serde::Serialize;

/// The derived rating fields stored on a place.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingAggregate {
    /// Mean rating rounded half-up to one decimal place, or 0 with no reviews.
    pub avg_rating: f64,

    /// Number of reviews.
    pub review_count: i32,
}

impl RatingAggregate {
    pub const EMPTY: RatingAggregate = RatingAggregate {
        avg_rating: 0.0,
        review_count: 0,
    };

    /// Computes the aggregate for the complete set of ratings of one place.
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = i16>,
    {
        let (sum, count) = ratings
            .into_iter()
            .fold((0i64, 0i64), |(sum, count), r| (sum + i64::from(r), count + 1));

        if count == 0 {
            return RatingAggregate::EMPTY;
        }

        let mean = sum as f64 / count as f64;

        RatingAggregate {
            avg_rating: round_to_tenth(mean),
            review_count: count as i32,
        }
    }
}

/// Rounds half-up to one decimal place.
fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}
