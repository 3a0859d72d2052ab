use futures::future::BoxFuture;

use crate::errors::BackendError;
use crate::pet::{Pet, PetRequest};
use crate::place::{Place, PlaceDetails};
use crate::record::Id;
use crate::review::{Review, ValidReview};
use crate::user::{Availability, AvailabilityQuery, NewUser, Profile, User};
use crate::wizard::WizardQuestion;

mod memory;

pub use memory::MemoryDb;

/// Persistence for every record the service keeps. Review mutations
/// recompute the rating aggregate of the affected place before they
/// return, atomically with the mutation itself.
pub trait Db {
    fn list_places(&self) -> BoxFuture<Result<Vec<Place>, BackendError>>;

    fn retrieve_place(&self, id: Id) -> BoxFuture<Result<Option<Place>, BackendError>>;

    fn insert_place(&self, details: PlaceDetails) -> BoxFuture<Result<Place, BackendError>>;

    /// Replaces the descriptive fields of a place.
    fn update_place(
        &self,
        id: Id,
        details: PlaceDetails,
    ) -> BoxFuture<Result<Place, BackendError>>;

    /// Deletes a place along with its reviews.
    fn delete_place(&self, id: Id) -> BoxFuture<Result<(), BackendError>>;

    /// Case-insensitive substring search on names, falling back to
    /// addresses when no name matches.
    fn search_places(&self, keyword: &str) -> BoxFuture<Result<Vec<Place>, BackendError>>;

    /// Reviews of a place, newest first.
    fn reviews_for_place(&self, place_id: Id) -> BoxFuture<Result<Vec<Review>, BackendError>>;

    /// Reviews written by a user, newest first.
    fn reviews_for_user(&self, user_id: Id) -> BoxFuture<Result<Vec<Review>, BackendError>>;

    fn insert_review(
        &self,
        user_id: Id,
        place_id: Id,
        review: ValidReview,
    ) -> BoxFuture<Result<Review, BackendError>>;

    /// Edits a review. Fails with `NotOwner` unless `user_id` wrote it.
    fn update_review(
        &self,
        user_id: Id,
        review_id: Id,
        review: ValidReview,
    ) -> BoxFuture<Result<Review, BackendError>>;

    /// Deletes a review. Fails with `NotOwner` unless `user_id` wrote it.
    fn delete_review(&self, user_id: Id, review_id: Id) -> BoxFuture<Result<(), BackendError>>;

    fn insert_user(&self, user: NewUser) -> BoxFuture<Result<User, BackendError>>;

    fn retrieve_user(&self, id: Id) -> BoxFuture<Result<Option<User>, BackendError>>;

    fn retrieve_user_by_login_id(
        &self,
        login_id: &str,
    ) -> BoxFuture<Result<Option<User>, BackendError>>;

    /// Looks up the login ID of an active account by its personal details.
    fn find_login_id(
        &self,
        name: &str,
        birthdate: &str,
        email: &str,
    ) -> BoxFuture<Result<Option<String>, BackendError>>;

    fn retrieve_user_by_login_id_and_email(
        &self,
        login_id: &str,
        email: &str,
    ) -> BoxFuture<Result<Option<User>, BackendError>>;

    fn update_password(
        &self,
        user_id: Id,
        password_hash: String,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn update_profile(&self, user_id: Id, profile: Profile)
        -> BoxFuture<Result<User, BackendError>>;

    fn deactivate_user(&self, user_id: Id) -> BoxFuture<Result<(), BackendError>>;

    /// Reports, for each value present in `query`, whether no account
    /// uses it yet.
    fn check_availability(
        &self,
        query: AvailabilityQuery,
    ) -> BoxFuture<Result<Availability, BackendError>>;

    fn pets_for_user(&self, owner_id: Id) -> BoxFuture<Result<Vec<Pet>, BackendError>>;

    fn insert_pet(&self, owner_id: Id, pet: PetRequest) -> BoxFuture<Result<Pet, BackendError>>;

    /// Updates a pet. A pet owned by somebody else counts as nonexistent.
    fn update_pet(
        &self,
        owner_id: Id,
        pet_id: Id,
        pet: PetRequest,
    ) -> BoxFuture<Result<Pet, BackendError>>;

    fn delete_pet(&self, owner_id: Id, pet_id: Id) -> BoxFuture<Result<(), BackendError>>;

    /// The questionnaire, ordered by step.
    fn retrieve_wizard_questions(&self) -> BoxFuture<Result<Vec<WizardQuestion>, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgConnection, PgPool, PgRow},
    };
    use std::str::FromStr;
    use time::OffsetDateTime;

    use crate::errors::BackendError;
    use crate::pet::{Pet, PetRequest};
    use crate::place::{Place, PlaceDetails};
    use crate::rating::RatingAggregate;
    use crate::record::{Id, Times};
    use crate::review::{Review, ValidReview};
    use crate::user::{Availability, AvailabilityQuery, NewUser, Profile, User};
    use crate::wizard::{WizardAnswer, WizardQuestion};

    const USERS_LOGIN_ID_CONSTRAINT: &str = "users_login_id";
    const USERS_EMAIL_CONSTRAINT: &str = "users_email";
    const USERS_NICKNAME_CONSTRAINT: &str = "users_nickname";
    const REVIEWS_USER_CONSTRAINT: &str = "reviews_user";
    const PETS_OWNER_CONSTRAINT: &str = "pets_owner";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are usable
    // behind `dyn`
    impl super::Db for PgDb {
        fn list_places(&self) -> BoxFuture<Result<Vec<Place>, BackendError>> {
            async move {
                let places = sqlx::query(include_str!("queries/list_places.sql"))
                    .try_map(|row: PgRow| place_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(places)
            }
            .boxed()
        }

        fn retrieve_place(&self, id: Id) -> BoxFuture<Result<Option<Place>, BackendError>> {
            async move {
                let place = sqlx::query(include_str!("queries/retrieve_place.sql"))
                    .bind(id)
                    .try_map(|row: PgRow| place_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(place)
            }
            .boxed()
        }

        fn insert_place(&self, details: PlaceDetails) -> BoxFuture<Result<Place, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/insert_place.sql"));

                let place = bind_place_details(query, &details)
                    .try_map(|row: PgRow| place_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(place)
            }
            .boxed()
        }

        fn update_place(
            &self,
            id: Id,
            details: PlaceDetails,
        ) -> BoxFuture<Result<Place, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_place.sql"));

                let place = bind_place_details(query, &details)
                    .bind(id)
                    .try_map(|row: PgRow| place_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                place.ok_or(BackendError::NonExistentPlace(id))
            }
            .boxed()
        }

        fn delete_place(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                // reviews go with it through `ON DELETE CASCADE`
                let count = sqlx::query(include_str!("queries/delete_place.sql"))
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NonExistentPlace(id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn search_places(&self, keyword: &str) -> BoxFuture<Result<Vec<Place>, BackendError>> {
            let pattern = like_pattern(keyword);

            async move {
                let by_name = sqlx::query(include_str!("queries/search_places_by_name.sql"))
                    .bind(&pattern)
                    .try_map(|row: PgRow| place_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                if !by_name.is_empty() {
                    return Ok(by_name);
                }

                let by_address = sqlx::query(include_str!("queries/search_places_by_address.sql"))
                    .bind(&pattern)
                    .try_map(|row: PgRow| place_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(by_address)
            }
            .boxed()
        }

        fn reviews_for_place(&self, place_id: Id) -> BoxFuture<Result<Vec<Review>, BackendError>> {
            async move {
                let reviews = sqlx::query(include_str!("queries/reviews_for_place.sql"))
                    .bind(place_id)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reviews)
            }
            .boxed()
        }

        fn reviews_for_user(&self, user_id: Id) -> BoxFuture<Result<Vec<Review>, BackendError>> {
            async move {
                let reviews = sqlx::query(include_str!("queries/reviews_for_user.sql"))
                    .bind(user_id)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reviews)
            }
            .boxed()
        }

        fn insert_review(
            &self,
            user_id: Id,
            place_id: Id,
            review: ValidReview,
        ) -> BoxFuture<Result<Review, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                lock_place(&mut tx, place_id).await?;

                let (id,): (Id,) = sqlx::query_as(include_str!("queries/insert_review.sql"))
                    .bind(user_id)
                    .bind(place_id)
                    .bind(review.rating)
                    .bind(&review.content)
                    .bind(&review.photos)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_owner_error(user_id))?;

                recompute_rating(&mut tx, place_id).await?;
                let review = retrieve_review(&mut tx, id).await?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(review)
            }
            .boxed()
        }

        fn update_review(
            &self,
            user_id: Id,
            review_id: Id,
            review: ValidReview,
        ) -> BoxFuture<Result<Review, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let place_id = lock_authored_review(&mut tx, user_id, review_id).await?;

                sqlx::query(include_str!("queries/update_review.sql"))
                    .bind(review_id)
                    .bind(review.rating)
                    .bind(&review.content)
                    .bind(&review.photos)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

                recompute_rating(&mut tx, place_id).await?;
                let review = retrieve_review(&mut tx, review_id).await?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(review)
            }
            .boxed()
        }

        fn delete_review(&self, user_id: Id, review_id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let place_id = lock_authored_review(&mut tx, user_id, review_id).await?;

                sqlx::query(include_str!("queries/delete_review.sql"))
                    .bind(review_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

                recompute_rating(&mut tx, place_id).await?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn insert_user(&self, user: NewUser) -> BoxFuture<Result<User, BackendError>> {
            async move {
                let NewUser {
                    login_id,
                    password_hash,
                    profile,
                } = user;

                let query = sqlx::query(include_str!("queries/insert_user.sql"))
                    .bind(login_id)
                    .bind(password_hash);

                let user = bind_profile(query, &profile)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn retrieve_user(&self, id: Id) -> BoxFuture<Result<Option<User>, BackendError>> {
            async move {
                let user = sqlx::query(include_str!("queries/retrieve_user.sql"))
                    .bind(id)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn retrieve_user_by_login_id(
            &self,
            login_id: &str,
        ) -> BoxFuture<Result<Option<User>, BackendError>> {
            let login_id = login_id.to_owned();

            async move {
                let user = sqlx::query(include_str!("queries/retrieve_user_by_login_id.sql"))
                    .bind(login_id)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn find_login_id(
            &self,
            name: &str,
            birthdate: &str,
            email: &str,
        ) -> BoxFuture<Result<Option<String>, BackendError>> {
            let (name, birthdate, email) = (name.to_owned(), birthdate.to_owned(), email.to_owned());

            async move {
                let login_id: Option<(String,)> =
                    sqlx::query_as(include_str!("queries/find_login_id.sql"))
                        .bind(name)
                        .bind(birthdate)
                        .bind(email)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                Ok(login_id.map(|(login_id,)| login_id))
            }
            .boxed()
        }

        fn retrieve_user_by_login_id_and_email(
            &self,
            login_id: &str,
            email: &str,
        ) -> BoxFuture<Result<Option<User>, BackendError>> {
            let (login_id, email) = (login_id.to_owned(), email.to_owned());

            async move {
                let user = sqlx::query(include_str!(
                    "queries/retrieve_user_by_login_id_and_email.sql"
                ))
                .bind(login_id)
                .bind(email)
                .try_map(|row: PgRow| user_from_row(&row))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn update_password(
            &self,
            user_id: Id,
            password_hash: String,
        ) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let count = sqlx::query(include_str!("queries/update_password.sql"))
                    .bind(user_id)
                    .bind(password_hash)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NonExistentUser(user_id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn update_profile(
            &self,
            user_id: Id,
            profile: Profile,
        ) -> BoxFuture<Result<User, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_profile.sql")).bind(user_id);

                let user = bind_profile(query, &profile)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                user.ok_or(BackendError::NonExistentUser(user_id))
            }
            .boxed()
        }

        fn deactivate_user(&self, user_id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let count = sqlx::query(include_str!("queries/deactivate_user.sql"))
                    .bind(user_id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NonExistentUser(user_id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn check_availability(
            &self,
            query: AvailabilityQuery,
        ) -> BoxFuture<Result<Availability, BackendError>> {
            async move {
                let (login_id_taken, email_taken, nickname_taken): (bool, bool, bool) =
                    sqlx::query_as(include_str!("queries/check_availability.sql"))
                        .bind(&query.login_id)
                        .bind(&query.email)
                        .bind(&query.nickname)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(map_sqlx_error)?;

                Ok(Availability {
                    login_id: query.login_id.as_ref().map(|_| !login_id_taken),
                    email: query.email.as_ref().map(|_| !email_taken),
                    nickname: query.nickname.as_ref().map(|_| !nickname_taken),
                })
            }
            .boxed()
        }

        fn pets_for_user(&self, owner_id: Id) -> BoxFuture<Result<Vec<Pet>, BackendError>> {
            async move {
                let pets = sqlx::query(include_str!("queries/pets_for_user.sql"))
                    .bind(owner_id)
                    .try_map(|row: PgRow| pet_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(pets)
            }
            .boxed()
        }

        fn insert_pet(&self, owner_id: Id, pet: PetRequest) -> BoxFuture<Result<Pet, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/insert_pet.sql")).bind(owner_id);

                let pet = bind_pet(query, &pet)
                    .try_map(|row: PgRow| pet_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_owner_error(owner_id))?;

                Ok(pet)
            }
            .boxed()
        }

        fn update_pet(
            &self,
            owner_id: Id,
            pet_id: Id,
            pet: PetRequest,
        ) -> BoxFuture<Result<Pet, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_pet.sql"))
                    .bind(owner_id)
                    .bind(pet_id);

                let pet = bind_pet(query, &pet)
                    .try_map(|row: PgRow| pet_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                pet.ok_or(BackendError::NonExistentPet(pet_id))
            }
            .boxed()
        }

        fn delete_pet(&self, owner_id: Id, pet_id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let count = sqlx::query(include_str!("queries/delete_pet.sql"))
                    .bind(owner_id)
                    .bind(pet_id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                if count == 0 {
                    Err(BackendError::NonExistentPet(pet_id))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn retrieve_wizard_questions(&self) -> BoxFuture<Result<Vec<WizardQuestion>, BackendError>> {
            async move {
                let rows = sqlx::query(include_str!("queries/retrieve_wizard_questions.sql"))
                    .try_map(|row: PgRow| {
                        let question = WizardQuestion {
                            question_id: try_get(&row, "question_id")?,
                            step: try_get(&row, "step")?,
                            question_text: try_get(&row, "question_text")?,
                            answers: vec![],
                        };

                        let answer_id: Option<Id> = try_get(&row, "answer_id")?;

                        let answer = match answer_id {
                            Some(answer_id) => Some(WizardAnswer {
                                answer_id,
                                answer_text: try_get(&row, "answer_text")?,
                                matching_tag: try_parse(&row, "matching_tag")?,
                            }),
                            None => None,
                        };

                        Ok((question, answer))
                    })
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                let mut questions: Vec<WizardQuestion> = vec![];

                // rows arrive ordered by step, then answer
                for (question, answer) in rows {
                    let is_new = questions
                        .last()
                        .map_or(true, |q| q.question_id != question.question_id);

                    if is_new {
                        questions.push(question);
                    }

                    if let (Some(answer), Some(current)) = (answer, questions.last_mut()) {
                        current.answers.push(answer);
                    }
                }

                Ok(questions)
            }
            .boxed()
        }
    }

    type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

    fn bind_place_details<'q>(query: PgQuery<'q>, details: &PlaceDetails) -> PgQuery<'q> {
        let sizes: Vec<String> = details
            .allowed_sizes
            .iter()
            .map(|s| s.as_str().to_owned())
            .collect();

        query
            .bind(details.name.clone())
            .bind(details.address.clone())
            .bind(details.phone.clone())
            .bind(details.operation_hours.clone())
            .bind(details.pet_policy.clone())
            .bind(details.category.as_str())
            .bind(details.location_type.as_str())
            .bind(sizes)
            .bind(details.has_parking)
            .bind(details.is_off_leash)
            .bind(details.has_wifi)
            .bind(details.latitude)
            .bind(details.longitude)
            .bind(details.photos.clone())
    }

    fn bind_profile<'q>(query: PgQuery<'q>, profile: &Profile) -> PgQuery<'q> {
        query
            .bind(profile.email.clone())
            .bind(profile.nickname.clone())
            .bind(profile.profile_image.clone())
            .bind(profile.name.clone())
            .bind(profile.birthdate.clone())
            .bind(profile.phone.clone())
            .bind(profile.address.clone())
    }

    fn bind_pet<'q>(query: PgQuery<'q>, pet: &PetRequest) -> PgQuery<'q> {
        query
            .bind(pet.name.clone())
            .bind(pet.gender.as_str())
            .bind(pet.size.as_str())
            .bind(pet.birth_date)
            .bind(pet.age)
            .bind(pet.weight)
            .bind(pet.special_notes.clone())
            .bind(pet.photo.clone())
    }

    /// Takes the row lock that serializes review writes on one place.
    async fn lock_place(conn: &mut PgConnection, place_id: Id) -> Result<(), BackendError> {
        let locked: Option<(Id,)> = sqlx::query_as(include_str!("queries/lock_place.sql"))
            .bind(place_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        locked
            .map(|_| ())
            .ok_or(BackendError::NonExistentPlace(place_id))
    }

    /// Locks the place of a review after checking that `user_id` wrote it.
    /// Returns the place ID.
    async fn lock_authored_review(
        conn: &mut PgConnection,
        user_id: Id,
        review_id: Id,
    ) -> Result<Id, BackendError> {
        let review: Option<(Id, Id)> = sqlx::query_as(include_str!("queries/retrieve_review_owner.sql"))
            .bind(review_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let (author_id, place_id) = review.ok_or(BackendError::NonExistentReview(review_id))?;

        if author_id != user_id {
            return Err(BackendError::NotOwner);
        }

        lock_place(conn, place_id).await?;

        Ok(place_id)
    }

    async fn recompute_rating(
        conn: &mut PgConnection,
        place_id: Id,
    ) -> Result<RatingAggregate, BackendError> {
        let ratings: Vec<(i16,)> = sqlx::query_as(include_str!("queries/retrieve_ratings.sql"))
            .bind(place_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        let aggregate = RatingAggregate::from_ratings(ratings.into_iter().map(|(r,)| r));

        sqlx::query(include_str!("queries/update_rating.sql"))
            .bind(place_id)
            .bind(aggregate.avg_rating)
            .bind(aggregate.review_count)
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        Ok(aggregate)
    }

    async fn retrieve_review(conn: &mut PgConnection, review_id: Id) -> Result<Review, BackendError> {
        let review = sqlx::query(include_str!("queries/retrieve_review.sql"))
            .bind(review_id)
            .try_map(|row: PgRow| review_from_row(&row))
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;

        review.ok_or(BackendError::NonExistentReview(review_id))
    }

    fn times_from_row(row: &PgRow) -> Result<Times, sqlx::Error> {
        let created_at: OffsetDateTime = try_get(row, "created_at")?;
        let updated_at: OffsetDateTime = try_get(row, "updated_at")?;

        Ok(Times::new(created_at, updated_at))
    }

    fn place_from_row(row: &PgRow) -> Result<Place, sqlx::Error> {
        let sizes: Vec<String> = try_get(row, "allowed_sizes")?;
        let allowed_sizes = sizes
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<_>, BackendError>>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let details = PlaceDetails {
            name: try_get(row, "name")?,
            address: try_get(row, "address")?,
            phone: try_get(row, "phone")?,
            operation_hours: try_get(row, "operation_hours")?,
            pet_policy: try_get(row, "pet_policy")?,
            category: try_parse(row, "category")?,
            location_type: try_parse(row, "location_type")?,
            allowed_sizes,
            has_parking: try_get(row, "has_parking")?,
            is_off_leash: try_get(row, "is_off_leash")?,
            has_wifi: try_get(row, "has_wifi")?,
            latitude: try_get(row, "latitude")?,
            longitude: try_get(row, "longitude")?,
            photos: try_get(row, "photos")?,
        };

        Ok(Place {
            id: try_get(row, "id")?,
            details,
            avg_rating: try_get(row, "avg_rating")?,
            review_count: try_get(row, "review_count")?,
            times: times_from_row(row)?,
        })
    }

    fn review_from_row(row: &PgRow) -> Result<Review, sqlx::Error> {
        Ok(Review {
            id: try_get(row, "id")?,
            user_id: try_get(row, "user_id")?,
            user_nickname: try_get(row, "user_nickname")?,
            place_id: try_get(row, "place_id")?,
            place_name: try_get(row, "place_name")?,
            rating: try_get(row, "rating")?,
            content: try_get(row, "content")?,
            photos: try_get(row, "photos")?,
            times: times_from_row(row)?,
        })
    }

    fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
        let profile = Profile {
            email: try_get(row, "email")?,
            nickname: try_get(row, "nickname")?,
            profile_image: try_get(row, "profile_image")?,
            name: try_get(row, "name")?,
            birthdate: try_get(row, "birthdate")?,
            phone: try_get(row, "phone")?,
            address: try_get(row, "address")?,
        };

        Ok(User {
            id: try_get(row, "id")?,
            login_id: try_get(row, "login_id")?,
            password_hash: try_get(row, "password_hash")?,
            profile,
            role: try_parse(row, "role")?,
            active: try_get(row, "active")?,
            times: times_from_row(row)?,
        })
    }

    fn pet_from_row(row: &PgRow) -> Result<Pet, sqlx::Error> {
        let details = PetRequest {
            name: try_get(row, "name")?,
            gender: try_parse(row, "gender")?,
            size: try_parse(row, "size")?,
            birth_date: try_get(row, "birth_date")?,
            age: try_get(row, "age")?,
            weight: try_get(row, "weight")?,
            special_notes: try_get(row, "special_notes")?,
            photo: try_get(row, "photo")?,
        };

        Ok(Pet {
            id: try_get(row, "id")?,
            owner_id: try_get(row, "owner_id")?,
            details,
            times: times_from_row(row)?,
        })
    }

    /// Builds an `ILIKE` pattern matching `keyword` anywhere.
    fn like_pattern(keyword: &str) -> String {
        let mut pattern = String::with_capacity(keyword.len() + 2);
        pattern.push('%');

        for c in keyword.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }

        pattern.push('%');
        pattern
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    /// Reads a text column holding one of our enums.
    fn try_parse<T: FromStr<Err = BackendError>>(row: &PgRow, column: &str) -> Result<T, sqlx::Error> {
        let text: String = try_get(row, column)?;

        text.parse()
            .map_err(|e: BackendError| sqlx::Error::Decode(Box::new(e)))
    }

    fn map_owner_error(user_id: Id) -> impl Fn(sqlx::Error) -> BackendError {
        move |error| match error {
            sqlx::Error::Database(ref e)
                if matches!(
                    e.constraint(),
                    Some(REVIEWS_USER_CONSTRAINT) | Some(PETS_OWNER_CONSTRAINT)
                ) =>
            {
                BackendError::NonExistentUser(user_id)
            }
            _ => map_sqlx_error(error),
        }
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        use sqlx::Error;

        match error {
            Error::Database(ref e) if e.constraint() == Some(USERS_LOGIN_ID_CONSTRAINT) => {
                BackendError::LoginIdAlreadyExists
            }
            Error::Database(ref e) if e.constraint() == Some(USERS_EMAIL_CONSTRAINT) => {
                BackendError::EmailAlreadyExists
            }
            Error::Database(ref e) if e.constraint() == Some(USERS_NICKNAME_CONSTRAINT) => {
                BackendError::NicknameAlreadyExists
            }
            _ => BackendError::Sqlx { source: error },
        }
    }

    #[cfg(test)]
    mod tests {
        use super::like_pattern;

        #[test]
        fn like_patterns_escape_wildcards() {
            assert_eq!(like_pattern("cafe"), "%cafe%");
            assert_eq!(like_pattern("100%_dog"), "%100\\%\\_dog%");
        }
    }
}
