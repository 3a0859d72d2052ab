use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{ready, BoxFuture, FutureExt};

use crate::errors::BackendError;
use crate::pet::{Pet, PetRequest};
use crate::place::{Place, PlaceDetails};
use crate::rating::RatingAggregate;
use crate::record::{Id, Times};
use crate::review::{Review, ValidReview};
use crate::user::{Availability, AvailabilityQuery, NewUser, Profile, Role, User};
use crate::wizard::{WizardQuestion, DEFAULT_QUESTIONS};

/// A `Db` kept entirely in memory. Every operation runs inside one
/// critical section, so review writes and their aggregate updates are
/// atomic with respect to each other.
#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<State>,
}

#[derive(Clone, Debug)]
struct StoredReview {
    id: Id,
    user_id: Id,
    place_id: Id,
    rating: i16,
    content: String,
    photos: Vec<String>,
    times: Times,
}

#[derive(Default)]
struct State {
    last_id: Id,
    places: BTreeMap<Id, Place>,
    reviews: BTreeMap<Id, StoredReview>,
    users: BTreeMap<Id, User>,
    pets: BTreeMap<Id, Pet>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> Result<T, BackendError>) -> BoxFuture<Result<T, BackendError>>
    where
        T: Send + 'static,
    {
        let mut state: MutexGuard<State> = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        ready(f(&mut state)).boxed()
    }
}

impl State {
    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }

    fn place(&self, id: Id) -> Result<&Place, BackendError> {
        self.places.get(&id).ok_or(BackendError::NonExistentPlace(id))
    }

    fn user(&self, id: Id) -> Result<&User, BackendError> {
        self.users.get(&id).ok_or(BackendError::NonExistentUser(id))
    }

    fn recompute_rating(&mut self, place_id: Id) {
        let aggregate = RatingAggregate::from_ratings(
            self.reviews
                .values()
                .filter(|r| r.place_id == place_id)
                .map(|r| r.rating),
        );

        if let Some(place) = self.places.get_mut(&place_id) {
            place.avg_rating = aggregate.avg_rating;
            place.review_count = aggregate.review_count;
        }
    }

    fn present(&self, review: &StoredReview) -> Review {
        Review {
            id: review.id,
            user_id: review.user_id,
            user_nickname: self
                .users
                .get(&review.user_id)
                .map(|u| u.profile.nickname.clone())
                .unwrap_or_default(),
            place_id: review.place_id,
            place_name: self
                .places
                .get(&review.place_id)
                .map(|p| p.details.name.clone())
                .unwrap_or_default(),
            rating: review.rating,
            content: review.content.clone(),
            photos: review.photos.clone(),
            times: review.times.clone(),
        }
    }

    fn reviews_where(&self, predicate: impl Fn(&StoredReview) -> bool) -> Vec<Review> {
        let mut reviews: Vec<&StoredReview> = self.reviews.values().filter(|r| predicate(r)).collect();

        reviews.sort_by(|a, b| {
            (b.times.created_at(), b.id).cmp(&(a.times.created_at(), a.id))
        });

        reviews.into_iter().map(|r| self.present(r)).collect()
    }

    fn authored_review(&mut self, user_id: Id, review_id: Id) -> Result<&mut StoredReview, BackendError> {
        let review = self
            .reviews
            .get_mut(&review_id)
            .ok_or(BackendError::NonExistentReview(review_id))?;

        if review.user_id != user_id {
            return Err(BackendError::NotOwner);
        }

        Ok(review)
    }

    fn check_unique(&self, except: Option<Id>, login_id: Option<&str>, profile: &Profile) -> Result<(), BackendError> {
        for user in self.users.values().filter(|u| Some(u.id) != except) {
            if Some(user.login_id.as_str()) == login_id {
                return Err(BackendError::LoginIdAlreadyExists);
            }

            if user.profile.email == profile.email {
                return Err(BackendError::EmailAlreadyExists);
            }

            if user.profile.nickname == profile.nickname {
                return Err(BackendError::NicknameAlreadyExists);
            }
        }

        Ok(())
    }

    fn owned_pet(&mut self, owner_id: Id, pet_id: Id) -> Result<&mut Pet, BackendError> {
        self.pets
            .get_mut(&pet_id)
            .filter(|p| p.owner_id == owner_id)
            .ok_or(BackendError::NonExistentPet(pet_id))
    }
}

fn contains_ignoring_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl super::Db for MemoryDb {
    fn list_places(&self) -> BoxFuture<Result<Vec<Place>, BackendError>> {
        self.with_state(|state| Ok(state.places.values().cloned().collect()))
    }

    fn retrieve_place(&self, id: Id) -> BoxFuture<Result<Option<Place>, BackendError>> {
        self.with_state(|state| Ok(state.places.get(&id).cloned()))
    }

    fn insert_place(&self, details: PlaceDetails) -> BoxFuture<Result<Place, BackendError>> {
        self.with_state(|state| {
            let id = state.next_id();

            let place = Place {
                id,
                details,
                avg_rating: RatingAggregate::EMPTY.avg_rating,
                review_count: RatingAggregate::EMPTY.review_count,
                times: Times::now(),
            };

            state.places.insert(id, place.clone());

            Ok(place)
        })
    }

    fn update_place(&self, id: Id, details: PlaceDetails) -> BoxFuture<Result<Place, BackendError>> {
        self.with_state(|state| {
            let place = state
                .places
                .get_mut(&id)
                .ok_or(BackendError::NonExistentPlace(id))?;

            place.details = details;
            place.times.touch();

            Ok(place.clone())
        })
    }

    fn delete_place(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(|state| {
            state
                .places
                .remove(&id)
                .ok_or(BackendError::NonExistentPlace(id))?;

            state.reviews.retain(|_, r| r.place_id != id);

            Ok(())
        })
    }

    fn search_places(&self, keyword: &str) -> BoxFuture<Result<Vec<Place>, BackendError>> {
        let keyword = keyword.to_lowercase();

        self.with_state(move |state| {
            let matching = |field: fn(&Place) -> &str| -> Vec<Place> {
                state
                    .places
                    .values()
                    .filter(|p| contains_ignoring_case(field(p), &keyword))
                    .cloned()
                    .collect()
            };

            let by_name = matching(|p| p.details.name.as_str());

            if by_name.is_empty() {
                Ok(matching(|p| p.details.address.as_str()))
            } else {
                Ok(by_name)
            }
        })
    }

    fn reviews_for_place(&self, place_id: Id) -> BoxFuture<Result<Vec<Review>, BackendError>> {
        self.with_state(|state| Ok(state.reviews_where(|r| r.place_id == place_id)))
    }

    fn reviews_for_user(&self, user_id: Id) -> BoxFuture<Result<Vec<Review>, BackendError>> {
        self.with_state(|state| Ok(state.reviews_where(|r| r.user_id == user_id)))
    }

    fn insert_review(
        &self,
        user_id: Id,
        place_id: Id,
        review: ValidReview,
    ) -> BoxFuture<Result<Review, BackendError>> {
        self.with_state(|state| {
            state.place(place_id)?;
            state.user(user_id)?;

            let id = state.next_id();
            let stored = StoredReview {
                id,
                user_id,
                place_id,
                rating: review.rating,
                content: review.content,
                photos: review.photos,
                times: Times::now(),
            };

            state.reviews.insert(id, stored.clone());
            state.recompute_rating(place_id);

            Ok(state.present(&stored))
        })
    }

    fn update_review(
        &self,
        user_id: Id,
        review_id: Id,
        review: ValidReview,
    ) -> BoxFuture<Result<Review, BackendError>> {
        self.with_state(|state| {
            let stored = state.authored_review(user_id, review_id)?;

            stored.rating = review.rating;
            stored.content = review.content;
            stored.photos = review.photos;
            stored.times.touch();

            let stored = stored.clone();
            state.recompute_rating(stored.place_id);

            Ok(state.present(&stored))
        })
    }

    fn delete_review(&self, user_id: Id, review_id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(|state| {
            let place_id = state.authored_review(user_id, review_id)?.place_id;

            state.reviews.remove(&review_id);
            state.recompute_rating(place_id);

            Ok(())
        })
    }

    fn insert_user(&self, user: NewUser) -> BoxFuture<Result<User, BackendError>> {
        self.with_state(|state| {
            state.check_unique(None, Some(user.login_id.as_str()), &user.profile)?;

            let id = state.next_id();
            let user = User {
                id,
                login_id: user.login_id,
                password_hash: user.password_hash,
                profile: user.profile,
                role: Role::User,
                active: true,
                times: Times::now(),
            };

            state.users.insert(id, user.clone());

            Ok(user)
        })
    }

    fn retrieve_user(&self, id: Id) -> BoxFuture<Result<Option<User>, BackendError>> {
        self.with_state(|state| Ok(state.users.get(&id).cloned()))
    }

    fn retrieve_user_by_login_id(&self, login_id: &str) -> BoxFuture<Result<Option<User>, BackendError>> {
        let login_id = login_id.to_owned();

        self.with_state(move |state| {
            Ok(state
                .users
                .values()
                .find(|u| u.login_id == login_id)
                .cloned())
        })
    }

    fn find_login_id(
        &self,
        name: &str,
        birthdate: &str,
        email: &str,
    ) -> BoxFuture<Result<Option<String>, BackendError>> {
        let (name, birthdate, email) = (name.to_owned(), birthdate.to_owned(), email.to_owned());

        self.with_state(move |state| {
            Ok(state
                .users
                .values()
                .filter(|u| u.active)
                .find(|u| {
                    u.profile.name.as_deref() == Some(name.as_str())
                        && u.profile.birthdate.as_deref() == Some(birthdate.as_str())
                        && u.profile.email == email
                })
                .map(|u| u.login_id.clone()))
        })
    }

    fn retrieve_user_by_login_id_and_email(
        &self,
        login_id: &str,
        email: &str,
    ) -> BoxFuture<Result<Option<User>, BackendError>> {
        let (login_id, email) = (login_id.to_owned(), email.to_owned());

        self.with_state(move |state| {
            Ok(state
                .users
                .values()
                .find(|u| u.active && u.login_id == login_id && u.profile.email == email)
                .cloned())
        })
    }

    fn update_password(&self, user_id: Id, password_hash: String) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(|state| {
            let user = state
                .users
                .get_mut(&user_id)
                .ok_or(BackendError::NonExistentUser(user_id))?;

            user.password_hash = password_hash;
            user.times.touch();

            Ok(())
        })
    }

    fn update_profile(&self, user_id: Id, profile: Profile) -> BoxFuture<Result<User, BackendError>> {
        self.with_state(|state| {
            state.user(user_id)?;
            state.check_unique(Some(user_id), None, &profile)?;

            let user = state
                .users
                .get_mut(&user_id)
                .ok_or(BackendError::NonExistentUser(user_id))?;

            user.profile = profile;
            user.times.touch();

            Ok(user.clone())
        })
    }

    fn deactivate_user(&self, user_id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(|state| {
            let user = state
                .users
                .get_mut(&user_id)
                .ok_or(BackendError::NonExistentUser(user_id))?;

            user.active = false;
            user.times.touch();

            Ok(())
        })
    }

    fn check_availability(&self, query: AvailabilityQuery) -> BoxFuture<Result<Availability, BackendError>> {
        self.with_state(move |state| {
            let free = |value: &Option<String>, field: fn(&User) -> &str| {
                value
                    .as_ref()
                    .map(|v| !state.users.values().any(|u| field(u) == v.as_str()))
            };

            Ok(Availability {
                login_id: free(&query.login_id, |u| u.login_id.as_str()),
                email: free(&query.email, |u| u.profile.email.as_str()),
                nickname: free(&query.nickname, |u| u.profile.nickname.as_str()),
            })
        })
    }

    fn pets_for_user(&self, owner_id: Id) -> BoxFuture<Result<Vec<Pet>, BackendError>> {
        self.with_state(|state| {
            Ok(state
                .pets
                .values()
                .filter(|p| p.owner_id == owner_id)
                .cloned()
                .collect())
        })
    }

    fn insert_pet(&self, owner_id: Id, pet: PetRequest) -> BoxFuture<Result<Pet, BackendError>> {
        self.with_state(|state| {
            state.user(owner_id)?;

            let id = state.next_id();
            let pet = Pet {
                id,
                owner_id,
                details: pet,
                times: Times::now(),
            };

            state.pets.insert(id, pet.clone());

            Ok(pet)
        })
    }

    fn update_pet(&self, owner_id: Id, pet_id: Id, pet: PetRequest) -> BoxFuture<Result<Pet, BackendError>> {
        self.with_state(|state| {
            let stored = state.owned_pet(owner_id, pet_id)?;

            stored.details = pet;
            stored.times.touch();

            Ok(stored.clone())
        })
    }

    fn delete_pet(&self, owner_id: Id, pet_id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(|state| {
            state.owned_pet(owner_id, pet_id)?;
            state.pets.remove(&pet_id);

            Ok(())
        })
    }

    fn retrieve_wizard_questions(&self) -> BoxFuture<Result<Vec<WizardQuestion>, BackendError>> {
        ready(Ok(DEFAULT_QUESTIONS.clone())).boxed()
    }
}
