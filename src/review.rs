use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::normalization;
use crate::record::{Id, Times};

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;
pub const MAX_CONTENT_LENGTH: usize = 1000;

/// A review as returned to clients.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "reviewId")]
    pub id: Id,

    pub user_id: Id,

    pub user_nickname: String,

    pub place_id: Id,

    pub place_name: String,

    pub rating: i16,

    pub content: String,

    pub photos: Vec<String>,

    #[serde(flatten)]
    pub times: Times,
}

/// The body of review creation and edit requests.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub content: String,

    /// Wider than the stored type so out-of-range input is reported
    /// rather than failing to parse.
    pub rating: i64,

    #[serde(default)]
    pub photos: Vec<String>,
}

/// A review request that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidReview {
    pub content: String,
    pub rating: i16,
    pub photos: Vec<String>,
}

impl ReviewRequest {
    pub fn validate(self) -> Result<ValidReview, BackendError> {
        if self.rating < i64::from(MIN_RATING) || self.rating > i64::from(MAX_RATING) {
            return Err(BackendError::RatingOutOfRange(self.rating));
        }

        if self.content.is_empty() {
            return Err(BackendError::invalid("content", "must not be blank"));
        }

        if self.content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(BackendError::invalid(
                "content",
                format!("must be at most {} characters", MAX_CONTENT_LENGTH),
            ));
        }

        Ok(ValidReview {
            content: self.content,
            rating: self.rating as i16,
            photos: self.photos,
        })
    }
}
