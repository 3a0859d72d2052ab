use std::time::{Duration, Instant};

use log::{debug, info, o};
use serde::Serialize;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::auth::{self, Claims};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::pet::PetRequest;
use crate::place::{PlaceDetails, PlaceFilter, SearchQuery};
use crate::record::Id;
use crate::review::ReviewRequest;
use crate::routes::{
    rejection::Context,
    response::{ApiResponse, SuccessResponse},
};
use crate::user::{
    AvailabilityQuery, ChangePasswordRequest, FindIdRequest, LoginRequest, LoginResponse, NewUser,
    Profile, ResetPasswordRequest, SignupRequest,
};
use crate::wizard::{self, RecommendationQuery, RecommendationRequest, SortKey};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($body:tt)+) => {
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = { $($body)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn recommend(
    environment: Environment,
    query: RecommendationQuery,
    request: RecommendationRequest,
) -> RouteResult {
    timed! {
        let error_handler = Context::Recommend { sort: query.sort.clone() }.handler();
        let sort = SortKey::from_query(query.sort.as_deref());

        debug!(environment.logger, "Recommending places..."; "tags" => ?request.tags, "sort" => ?sort);

        let places = environment.db.list_places().await.map_err(&error_handler)?;
        let recommended = wizard::recommend(places, &request, sort).map_err(&error_handler)?;

        json(&ApiResponse::ok(recommended))
    }
}

pub async fn wizard_questions(environment: Environment) -> RouteResult {
    timed! {
        let questions = environment
            .db
            .retrieve_wizard_questions()
            .await
            .map_err(Context::WizardQuestions.handler())?;

        json(&ApiResponse::ok(questions))
    }
}

pub async fn list_places(environment: Environment) -> RouteResult {
    timed! {
        let places = environment
            .db
            .list_places()
            .await
            .map_err(Context::ListPlaces.handler())?;

        json(&ApiResponse::ok(places))
    }
}

pub async fn create_place(environment: Environment, details: PlaceDetails) -> RouteResult {
    timed! {
        let error_handler = Context::CreatePlace.handler();

        let details = details.validate().map_err(&error_handler)?;
        let place = environment.db.insert_place(details).await.map_err(&error_handler)?;

        info!(environment.logger, "Created place"; "id" => place.id);

        created(environment.urls.place(place.id), &ApiResponse::ok(place))
    }
}

pub async fn retrieve_place(environment: Environment, id: Id) -> RouteResult {
    timed! {
        let error_handler = Context::RetrievePlace { id }.handler();

        let place = environment
            .db
            .retrieve_place(id)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentPlace(id)))?;

        json(&ApiResponse::ok(place))
    }
}

pub async fn update_place(environment: Environment, id: Id, details: PlaceDetails) -> RouteResult {
    timed! {
        let error_handler = Context::UpdatePlace { id }.handler();

        let details = details.validate().map_err(&error_handler)?;
        let place = environment.db.update_place(id, details).await.map_err(&error_handler)?;

        json(&ApiResponse::ok(place))
    }
}

pub async fn delete_place(environment: Environment, id: Id) -> RouteResult {
    timed! {
        environment
            .db
            .delete_place(id)
            .await
            .map_err(Context::DeletePlace { id }.handler())?;

        info!(environment.logger, "Deleted place"; "id" => id);

        json(&ApiResponse::message("place deleted"))
    }
}

pub async fn search_places(environment: Environment, query: SearchQuery) -> RouteResult {
    timed! {
        let SearchQuery { keyword } = query;
        let error_handler = Context::SearchPlaces { keyword: keyword.clone() }.handler();

        if keyword.is_empty() {
            return Err(error_handler(BackendError::invalid("keyword", "must not be blank")).into());
        };

        let places = environment.db.search_places(&keyword).await.map_err(&error_handler)?;

        json(&ApiResponse::ok(places))
    }
}

pub async fn filter_places(environment: Environment, filter: PlaceFilter) -> RouteResult {
    timed! {
        let places = environment
            .db
            .list_places()
            .await
            .map_err(Context::FilterPlaces.handler())?;

        json(&ApiResponse::ok(filter.apply(places)))
    }
}

pub async fn place_reviews(environment: Environment, id: Id) -> RouteResult {
    timed! {
        let error_handler = Context::PlaceReviews { id }.handler();

        environment
            .db
            .retrieve_place(id)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentPlace(id)))?;

        let reviews = environment.db.reviews_for_place(id).await.map_err(&error_handler)?;

        json(&ApiResponse::ok(reviews))
    }
}

pub async fn create_review(
    environment: Environment,
    place_id: Id,
    authorization: Option<String>,
    request: ReviewRequest,
) -> RouteResult {
    timed! {
        let error_handler = Context::CreateReview { place: place_id }.handler();

        let claims = authenticate(&environment, authorization).map_err(&error_handler)?;
        let review = request.validate().map_err(&error_handler)?;

        let logger = environment.logger.new(o!("user" => claims.sub, "place" => place_id));
        debug!(logger, "Creating review..."; "rating" => review.rating);

        let review = environment
            .db
            .insert_review(claims.sub, place_id, review)
            .await
            .map_err(&error_handler)?;

        created(environment.urls.review(review.id), &ApiResponse::ok(review))
    }
}

pub async fn update_review(
    environment: Environment,
    id: Id,
    authorization: Option<String>,
    request: ReviewRequest,
) -> RouteResult {
    timed! {
        let error_handler = Context::UpdateReview { id }.handler();

        let claims = authenticate(&environment, authorization).map_err(&error_handler)?;
        let review = request.validate().map_err(&error_handler)?;

        let review = environment
            .db
            .update_review(claims.sub, id, review)
            .await
            .map_err(&error_handler)?;

        json(&ApiResponse::ok(review))
    }
}

pub async fn delete_review(
    environment: Environment,
    id: Id,
    authorization: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler = Context::DeleteReview { id }.handler();

        let claims = authenticate(&environment, authorization).map_err(&error_handler)?;

        environment
            .db
            .delete_review(claims.sub, id)
            .await
            .map_err(&error_handler)?;

        json(&ApiResponse::message("review deleted"))
    }
}

pub async fn signup(environment: Environment, request: SignupRequest) -> RouteResult {
    timed! {
        let error_handler = Context::Signup { login_id: request.login_id.clone() }.handler();

        let SignupRequest { login_id, password, profile } = request.validate().map_err(&error_handler)?;
        let password_hash = auth::hash_password(&password).map_err(&error_handler)?;

        let user = environment
            .db
            .insert_user(NewUser { login_id, password_hash, profile })
            .await
            .map_err(&error_handler)?;

        info!(environment.logger, "Signed up"; "id" => user.id);

        created(environment.urls.user(user.id), &ApiResponse::ok(user))
    }
}

pub async fn login(environment: Environment, request: LoginRequest) -> RouteResult {
    timed! {
        let error_handler = Context::Login { login_id: request.login_id.clone() }.handler();

        let user = environment
            .db
            .retrieve_user_by_login_id(&request.login_id)
            .await
            .map_err(&error_handler)?
            .filter(|user| auth::verify_password(&request.password, &user.password_hash))
            .ok_or_else(|| error_handler(BackendError::InvalidCredentials))?;

        if !user.active {
            return Err(error_handler(BackendError::InactiveAccount).into());
        };

        let token = environment.tokens.issue(user.id, user.role).map_err(&error_handler)?;

        json(&ApiResponse::ok(LoginResponse {
            token,
            token_type: "Bearer",
            user,
        }))
    }
}

pub async fn find_id(environment: Environment, request: FindIdRequest) -> RouteResult {
    timed! {
        let error_handler = Context::FindId.handler();

        let login_id = environment
            .db
            .find_login_id(&request.name, &request.birthdate, &request.email)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| error_handler(BackendError::NoMatchingAccount))?;

        json(&ApiResponse::ok(SuccessResponse::LoginId { login_id }))
    }
}

pub async fn reset_password(environment: Environment, request: ResetPasswordRequest) -> RouteResult {
    timed! {
        let error_handler = Context::ResetPassword { login_id: request.login_id.clone() }.handler();

        let user = environment
            .db
            .retrieve_user_by_login_id_and_email(&request.login_id, &request.email)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| error_handler(BackendError::NoMatchingAccount))?;

        let temporary_password = auth::temporary_password();
        let password_hash = auth::hash_password(&temporary_password).map_err(&error_handler)?;

        environment
            .db
            .update_password(user.id, password_hash)
            .await
            .map_err(&error_handler)?;

        info!(environment.logger, "Reset password"; "id" => user.id);

        json(&ApiResponse::with_message(
            "temporary password issued",
            SuccessResponse::TemporaryPassword { temporary_password },
        ))
    }
}

pub async fn availability(environment: Environment, query: AvailabilityQuery) -> RouteResult {
    timed! {
        let error_handler = Context::Availability.handler();

        if query.is_empty() {
            return Err(error_handler(BackendError::MalformedRequest(
                "one of loginId, email or nickname is required".to_owned(),
            ))
            .into());
        };

        let availability = environment
            .db
            .check_availability(query)
            .await
            .map_err(&error_handler)?;

        json(&ApiResponse::ok(availability))
    }
}

pub async fn retrieve_user(environment: Environment, id: Id) -> RouteResult {
    timed! {
        let error_handler = Context::RetrieveUser { id }.handler();

        let user = environment
            .db
            .retrieve_user(id)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentUser(id)))?;

        json(&ApiResponse::ok(user))
    }
}

pub async fn update_profile(
    environment: Environment,
    id: Id,
    authorization: Option<String>,
    profile: Profile,
) -> RouteResult {
    timed! {
        let error_handler = Context::UpdateProfile { id }.handler();

        authorize_self(&environment, authorization, id).map_err(&error_handler)?;
        let profile = profile.validate().map_err(&error_handler)?;

        let user = environment
            .db
            .update_profile(id, profile)
            .await
            .map_err(&error_handler)?;

        json(&ApiResponse::ok(user))
    }
}

pub async fn change_password(
    environment: Environment,
    id: Id,
    authorization: Option<String>,
    request: ChangePasswordRequest,
) -> RouteResult {
    timed! {
        let error_handler = Context::ChangePassword { id }.handler();

        authorize_self(&environment, authorization, id).map_err(&error_handler)?;
        let request = request.validate().map_err(&error_handler)?;

        let user = environment
            .db
            .retrieve_user(id)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentUser(id)))?;

        if !auth::verify_password(&request.current_password, &user.password_hash) {
            return Err(error_handler(BackendError::WrongPassword).into());
        };

        let password_hash = auth::hash_password(&request.new_password).map_err(&error_handler)?;

        environment
            .db
            .update_password(id, password_hash)
            .await
            .map_err(&error_handler)?;

        json(&ApiResponse::message("password changed"))
    }
}

pub async fn delete_user(
    environment: Environment,
    id: Id,
    authorization: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler = Context::DeleteUser { id }.handler();

        authorize_self(&environment, authorization, id).map_err(&error_handler)?;

        environment.db.deactivate_user(id).await.map_err(&error_handler)?;

        info!(environment.logger, "Deactivated account"; "id" => id);

        json(&ApiResponse::message("account deactivated"))
    }
}

pub async fn user_reviews(environment: Environment, id: Id) -> RouteResult {
    timed! {
        let error_handler = Context::UserReviews { id }.handler();

        environment
            .db
            .retrieve_user(id)
            .await
            .map_err(&error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentUser(id)))?;

        let reviews = environment.db.reviews_for_user(id).await.map_err(&error_handler)?;

        json(&ApiResponse::ok(reviews))
    }
}

pub async fn list_pets(
    environment: Environment,
    user: Id,
    authorization: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler = Context::ListPets { user }.handler();

        authorize_self(&environment, authorization, user).map_err(&error_handler)?;

        let pets = environment.db.pets_for_user(user).await.map_err(&error_handler)?;

        json(&ApiResponse::ok(pets))
    }
}

pub async fn create_pet(
    environment: Environment,
    user: Id,
    authorization: Option<String>,
    request: PetRequest,
) -> RouteResult {
    timed! {
        let error_handler = Context::CreatePet { user }.handler();

        authorize_self(&environment, authorization, user).map_err(&error_handler)?;
        let request = request.validate().map_err(&error_handler)?;

        let pet = environment.db.insert_pet(user, request).await.map_err(&error_handler)?;

        created(environment.urls.pet(user, pet.id), &ApiResponse::ok(pet))
    }
}

pub async fn update_pet(
    environment: Environment,
    user: Id,
    id: Id,
    authorization: Option<String>,
    request: PetRequest,
) -> RouteResult {
    timed! {
        let error_handler = Context::UpdatePet { user, id }.handler();

        authorize_self(&environment, authorization, user).map_err(&error_handler)?;
        let request = request.validate().map_err(&error_handler)?;

        let pet = environment.db.update_pet(user, id, request).await.map_err(&error_handler)?;

        json(&ApiResponse::ok(pet))
    }
}

pub async fn delete_pet(
    environment: Environment,
    user: Id,
    id: Id,
    authorization: Option<String>,
) -> RouteResult {
    timed! {
        let error_handler = Context::DeletePet { user, id }.handler();

        authorize_self(&environment, authorization, user).map_err(&error_handler)?;

        environment.db.delete_pet(user, id).await.map_err(&error_handler)?;

        json(&ApiResponse::message("pet deleted"))
    }
}

fn authenticate(environment: &Environment, authorization: Option<String>) -> Result<Claims, BackendError> {
    environment.tokens.authenticate(authorization.as_deref())
}

/// Verifies the bearer token and that it belongs to `user_id`.
fn authorize_self(
    environment: &Environment,
    authorization: Option<String>,
    user_id: Id,
) -> Result<Claims, BackendError> {
    let claims = authenticate(environment, authorization)?;

    if claims.sub != user_id {
        return Err(BackendError::NotOwner);
    }

    Ok(claims)
}

fn created<T: Serialize>(location: String, body: &T) -> impl Reply {
    with_header(with_status(json(body), StatusCode::CREATED), "location", location)
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
