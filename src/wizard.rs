//! The questionnaire and the tag matcher behind `POST /recommend`.

use std::cmp::Ordering;
use std::collections::HashSet;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::geo::haversine_km;
use crate::place::{string_enum, Category, DogSize, LocationType, Place};
use crate::record::Id;

/// How many places a recommendation returns at most.
pub const RECOMMENDATION_LIMIT: usize = 3;

/// Distance used when the user has not shared a location. Sorts last.
pub const UNKNOWN_DISTANCE: f64 = f64::MAX;

/// A preference picked in the questionnaire.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardTag {
    Small,
    Medium,
    Large,
    EnergyHigh,
    EnergyLow,
    DistNear,
    DistMid,
    DistFar,
    TypeNature,
    TypeCity,
    TypePrivate,
}

string_enum!(WizardTag {
    Small => "SMALL",
    Medium => "MEDIUM",
    Large => "LARGE",
    EnergyHigh => "ENERGY_HIGH",
    EnergyLow => "ENERGY_LOW",
    DistNear => "DIST_NEAR",
    DistMid => "DIST_MID",
    DistFar => "DIST_FAR",
    TypeNature => "TYPE_NATURE",
    TypeCity => "TYPE_CITY",
    TypePrivate => "TYPE_PRIVATE",
});

impl WizardTag {
    /// Whether `place` satisfies the predicate attached to this tag.
    pub fn admits(self, place: &Place) -> bool {
        use Category::*;
        use WizardTag::*;

        let details = &place.details;
        let location = place.location_type();
        let category = place.category();

        match self {
            Small => place.allows(DogSize::Small),
            Medium => place.allows(DogSize::Medium),
            Large => place.allows(DogSize::Large),
            EnergyHigh => {
                details.is_off_leash
                    || location == LocationType::Outdoor
                    || matches!(category, Playground | Park | Swimming)
            }
            EnergyLow => {
                location == LocationType::Indoor
                    || matches!(category, Cafe | Restaurant | Accommodation)
            }
            TypeNature => {
                matches!(location, LocationType::Outdoor | LocationType::Both) || category == Park
            }
            TypeCity => {
                location == LocationType::Indoor
                    || matches!(category, Cafe | Restaurant | Beauty)
                    || details.has_wifi
            }
            TypePrivate => category == Accommodation || details.is_off_leash,
            // the distance answers only shape the questionnaire
            DistNear | DistMid | DistFar => true,
        }
    }
}

/// The order of the recommended places.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortKey {
    /// Nearest first.
    Distance,
    /// Highest average rating first.
    Rating,
    /// Most reviewed first.
    Popular,
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey::Distance
    }
}

impl SortKey {
    /// Parses the `sort` query parameter. Anything unrecognized means
    /// `distance`.
    pub fn from_query(sort: Option<&str>) -> Self {
        match sort.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("rating") => SortKey::Rating,
            Some("popular") => SortKey::Popular,
            _ => SortKey::Distance,
        }
    }
}

/// The query string of `POST /recommend`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecommendationQuery {
    pub sort: Option<String>,
}

/// The body of `POST /recommend`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub tags: Vec<WizardTag>,

    #[serde(default)]
    pub user_latitude: Option<f64>,

    #[serde(default)]
    pub user_longitude: Option<f64>,
}

impl RecommendationRequest {
    /// Rejects an empty tag list and out-of-range user coordinates.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.tags.is_empty() {
            return Err(BackendError::EmptyTags);
        }

        if let Some(latitude) = self.user_latitude {
            if !(-90.0..=90.0).contains(&latitude) {
                return Err(BackendError::invalid("userLatitude", "must be between -90 and 90"));
            }
        }

        if let Some(longitude) = self.user_longitude {
            if !(-180.0..=180.0).contains(&longitude) {
                return Err(BackendError::invalid("userLongitude", "must be between -180 and 180"));
            }
        }

        Ok(())
    }

    fn user_location(&self) -> Option<(f64, f64)> {
        self.user_latitude.zip(self.user_longitude)
    }

    fn distance_to(&self, place: &Place) -> f64 {
        match self.user_location() {
            Some((lat, lon)) => {
                let (place_lat, place_lon) = place.coordinates_or_origin();
                haversine_km(lat, lon, place_lat, place_lon)
            }
            None => UNKNOWN_DISTANCE,
        }
    }
}

/// Picks up to three places satisfying every selected tag, ordered by
/// `sort`. Places with equal keys keep their catalogue order.
pub fn recommend(
    places: Vec<Place>,
    request: &RecommendationRequest,
    sort: SortKey,
) -> Result<Vec<Place>, BackendError> {
    request.validate()?;

    let tags: HashSet<WizardTag> = request.tags.iter().copied().collect();

    let mut candidates: Vec<(Place, f64)> = places
        .into_iter()
        .filter(|place| tags.iter().all(|tag| tag.admits(place)))
        .map(|place| {
            let distance = request.distance_to(&place);
            (place, distance)
        })
        .collect();

    // `sort_by` is stable
    candidates.sort_by(|(a, a_distance), (b, b_distance)| compare(sort, a, *a_distance, b, *b_distance));

    Ok(candidates
        .into_iter()
        .take(RECOMMENDATION_LIMIT)
        .map(|(place, _)| place)
        .collect())
}

fn compare(sort: SortKey, a: &Place, a_distance: f64, b: &Place, b_distance: f64) -> Ordering {
    match sort {
        SortKey::Rating => b.avg_rating.total_cmp(&a.avg_rating),
        SortKey::Popular => b.review_count.cmp(&a.review_count),
        SortKey::Distance => a_distance.total_cmp(&b_distance),
    }
}

/// One step of the questionnaire.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardQuestion {
    pub question_id: Id,
    pub step: i32,
    pub question_text: String,
    pub answers: Vec<WizardAnswer>,
}

/// One selectable answer and the tag it contributes.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardAnswer {
    pub answer_id: Id,
    pub answer_text: String,
    pub matching_tag: WizardTag,
}

lazy_static! {
    /// The questionnaire the migrations seed, for stores without one.
    pub static ref DEFAULT_QUESTIONS: Vec<WizardQuestion> = {
        use WizardTag::*;

        let steps: [(&str, &[(&str, WizardTag)]); 3] = [
            (
                "How big is your dog?",
                &[("Small", Small), ("Medium", Medium), ("Large", Large)],
            ),
            (
                "How is your dog feeling today?",
                &[("Full of energy", EnergyHigh), ("Calm and relaxed", EnergyLow)],
            ),
            (
                "What kind of place do you prefer?",
                &[
                    ("Close to nature", TypeNature),
                    ("Somewhere in the city", TypeCity),
                    ("A private space", TypePrivate),
                ],
            ),
        ];

        let mut answer_id = 0;

        steps
            .iter()
            .enumerate()
            .map(|(i, (text, answers))| WizardQuestion {
                question_id: i as Id + 1,
                step: i as i32 + 1,
                question_text: (*text).to_owned(),
                answers: answers
                    .iter()
                    .map(|(answer_text, tag)| {
                        answer_id += 1;

                        WizardAnswer {
                            answer_id,
                            answer_text: (*answer_text).to_owned(),
                            matching_tag: *tag,
                        }
                    })
                    .collect(),
            })
            .collect()
    };
}
