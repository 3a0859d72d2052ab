use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::normalization;
use crate::record::{Id, Times};

/// What kind of business or venue a place is.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Cafe,
    Restaurant,
    Playground,
    Swimming,
    Accommodation,
    Park,
    Beauty,
}

/// Whether a place is inside, outside, or both.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationType {
    Indoor,
    Outdoor,
    Both,
}

/// The size class of a dog.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DogSize {
    Small,
    Medium,
    Large,
}

/// Implements `Display` and `FromStr` using the same spelling as the
/// JSON representation, which is also how the values are stored.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:expr),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::errors::BackendError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::errors::BackendError::invalid(stringify!($name), format!("unknown value {:?}", s))),
                }
            }
        }
    };
}

pub(crate) use string_enum;

string_enum!(Category {
    Cafe => "CAFE",
    Restaurant => "RESTAURANT",
    Playground => "PLAYGROUND",
    Swimming => "SWIMMING",
    Accommodation => "ACCOMMODATION",
    Park => "PARK",
    Beauty => "BEAUTY",
});

string_enum!(LocationType {
    Indoor => "INDOOR",
    Outdoor => "OUTDOOR",
    Both => "BOTH",
});

string_enum!(DogSize {
    Small => "SMALL",
    Medium => "MEDIUM",
    Large => "LARGE",
});

/// A single place in the catalogue, as stored and as returned publicly.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    /// The ID of the place.
    #[serde(rename = "placeId")]
    pub id: Id,

    #[serde(flatten)]
    pub details: PlaceDetails,

    /// Mean review rating, one decimal place.
    pub avg_rating: f64,

    /// Number of reviews.
    pub review_count: i32,

    #[serde(flatten)]
    pub times: Times,
}

impl Place {
    pub fn allows(&self, size: DogSize) -> bool {
        self.details.allowed_sizes.contains(&size)
    }

    pub fn category(&self) -> Category {
        self.details.category
    }

    pub fn location_type(&self) -> LocationType {
        self.details.location_type
    }

    /// The coordinates of the place, with missing values treated as 0.
    pub fn coordinates_or_origin(&self) -> (f64, f64) {
        (
            self.details.latitude.unwrap_or(0.0),
            self.details.longitude.unwrap_or(0.0),
        )
    }
}

/// The user-editable description of a place. Used both as the request
/// body for creation and replacement and as part of `Place`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceDetails {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub name: String,

    #[serde(deserialize_with = "normalization::deserialize")]
    pub address: String,

    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_option")]
    pub phone: Option<String>,

    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_option")]
    pub operation_hours: Option<String>,

    pub pet_policy: String,

    pub category: Category,

    pub location_type: LocationType,

    /// Sizes of dog admitted. Kept sorted and without duplicates.
    #[serde(default)]
    pub allowed_sizes: Vec<DogSize>,

    #[serde(default)]
    pub has_parking: bool,

    #[serde(default)]
    pub is_off_leash: bool,

    #[serde(default)]
    pub has_wifi: bool,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    /// Photo URLs, in display order.
    #[serde(default)]
    pub photos: Vec<String>,
}

impl PlaceDetails {
    /// Checks the fields and canonicalizes the size set.
    pub fn validate(mut self) -> Result<Self, BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::invalid("name", "must not be blank"));
        }

        if self.address.is_empty() {
            return Err(BackendError::invalid("address", "must not be blank"));
        }

        if let Some(latitude) = self.latitude {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(BackendError::invalid("latitude", "must be between -90 and 90"));
            }
        }

        if let Some(longitude) = self.longitude {
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(BackendError::invalid("longitude", "must be between -180 and 180"));
            }
        }

        self.allowed_sizes.sort();
        self.allowed_sizes.dedup();

        Ok(self)
    }
}

/// Optional criteria for `POST /places/filter`. A `None` field places no
/// restriction; every `Some` field must be satisfied.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceFilter {
    /// The place must be in one of these categories. Empty means any.
    #[serde(default)]
    pub categories: Option<Vec<Category>>,

    /// The place must admit at least one of these sizes. Empty means any.
    #[serde(default)]
    pub dog_sizes: Option<Vec<DogSize>>,

    #[serde(default)]
    pub has_parking: Option<bool>,

    /// `true` admits OUTDOOR and BOTH, `false` admits INDOOR.
    #[serde(default)]
    pub is_outdoor: Option<bool>,

    #[serde(default)]
    pub has_wifi: Option<bool>,
}

impl PlaceFilter {
    pub fn matches(&self, place: &Place) -> bool {
        let details = &place.details;

        if let Some(categories) = non_empty(&self.categories) {
            if !categories.contains(&details.category) {
                return false;
            }
        }

        if let Some(sizes) = non_empty(&self.dog_sizes) {
            if !sizes.iter().any(|size| place.allows(*size)) {
                return false;
            }
        }

        if let Some(has_parking) = self.has_parking {
            if details.has_parking != has_parking {
                return false;
            }
        }

        if let Some(has_wifi) = self.has_wifi {
            if details.has_wifi != has_wifi {
                return false;
            }
        }

        if let Some(is_outdoor) = self.is_outdoor {
            let outdoor = matches!(
                details.location_type,
                LocationType::Outdoor | LocationType::Both
            );

            if outdoor != is_outdoor {
                return false;
            }
        }

        true
    }

    /// Keeps the places that match, in their original order.
    pub fn apply(&self, places: Vec<Place>) -> Vec<Place> {
        places.into_iter().filter(|p| self.matches(p)).collect()
    }
}

fn non_empty<T>(list: &Option<Vec<T>>) -> Option<&[T]> {
    list.as_deref().filter(|l| !l.is_empty())
}

/// Query string for keyword search.
#[derive(Clone, Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub keyword: String,
}
