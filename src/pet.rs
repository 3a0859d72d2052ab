use serde::{Deserialize, Serialize};
use time::Date;

use crate::errors::BackendError;
use crate::normalization;
use crate::place::{string_enum, DogSize};
use crate::record::{Id, Times};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetGender {
    Male,
    Female,
    Unknown,
}

string_enum!(PetGender {
    Male => "MALE",
    Female => "FEMALE",
    Unknown => "UNKNOWN",
});

/// A pet profile.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    #[serde(rename = "petId")]
    pub id: Id,

    pub owner_id: Id,

    #[serde(flatten)]
    pub details: PetRequest,

    #[serde(flatten)]
    pub times: Times,
}

/// The body of pet creation and update requests.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetRequest {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,

    #[serde(default = "default_gender")]
    pub gender: PetGender,

    pub size: DogSize,

    /// Birth date in ISO 8601 (`YYYY-MM-DD`).
    #[serde(default, with = "iso_date")]
    pub birth_date: Option<Date>,

    #[serde(default)]
    pub age: i32,

    #[serde(default)]
    pub weight: Option<f64>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub special_notes: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub photo: Option<String>,
}

fn default_gender() -> PetGender {
    PetGender::Unknown
}

impl PetRequest {
    pub fn validate(self) -> Result<Self, BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::invalid("name", "must not be blank"));
        }

        if self.age < 0 {
            return Err(BackendError::invalid("age", "must not be negative"));
        }

        if let Some(weight) = self.weight {
            if !(weight > 0.0) {
                return Err(BackendError::invalid("weight", "must be positive"));
            }
        }

        Ok(self)
    }
}

mod iso_date {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::format_description::FormatItem;
    use time::macros::format_description;
    use time::Date;

    const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S>(date: &Option<Date>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => {
                let text = date.format(FORMAT).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text: Option<String> = Deserialize::deserialize(deserializer)?;

        match text.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => Date::parse(text, FORMAT)
                .map(Some)
                .map_err(de::Error::custom),
        }
    }
}
