use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An ID in the database.
pub type Id = i64;

/// The times a row was created and last updated.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Times {
    /// The date and time it was created.
    #[serde(with = "time::serde::timestamp")]
    pub(crate) created_at: OffsetDateTime,

    /// The date and time it was last modified.
    #[serde(with = "time::serde::timestamp")]
    pub(crate) updated_at: OffsetDateTime,
}

impl Times {
    pub fn new(created_at: OffsetDateTime, updated_at: OffsetDateTime) -> Self {
        Times {
            created_at,
            updated_at,
        }
    }

    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc();

        Times::new(now, now)
    }

    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}
