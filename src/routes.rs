use std::sync::Arc;

use log::{debug, error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};

use crate::errors::BackendError;
use rejection::{Context, FlattenedRejection};

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

/// The largest JSON body accepted.
const MAX_CONTENT_LENGTH: u64 = 1024 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            debug!(logger, "Request refused"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status));
    }

    let (status, message) = if let Some(e) = rej.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rej.find::<reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rej.find::<reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
    } else if let Some(e) = rej.find::<reject::UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
    } else if let Some(e) = rej.find::<reject::MethodNotAllowed>() {
        (StatusCode::METHOD_NOT_ALLOWED, e.to_string())
    } else if rej.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_owned())
    } else {
        return Err(rej);
    };

    debug!(logger, "Malformed request"; "status" => %status, "message" => &message);

    let flattened = FlattenedRejection {
        success: false,
        context: Context::Request,
        message,
    };

    Ok(with_status(json(&flattened), status))
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        MalformedRequest(..) | InvalidField { .. } | EmptyTags | RatingOutOfRange(..) => {
            StatusCode::BAD_REQUEST
        }
        MissingToken | InvalidToken | InvalidCredentials | WrongPassword => {
            StatusCode::UNAUTHORIZED
        }
        NotOwner | InactiveAccount => StatusCode::FORBIDDEN,
        NonExistentPlace(..)
        | NonExistentReview(..)
        | NonExistentUser(..)
        | NonExistentPet(..)
        | NoMatchingAccount => StatusCode::NOT_FOUND,
        LoginIdAlreadyExists | EmailAlreadyExists | NicknameAlreadyExists => StatusCode::CONFLICT,
        Sqlx { .. } | SigningFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use serde::de::DeserializeOwned;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::reject::Rejection;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, path as p, path::param as par, post, put, query};

    use super::{format_rejection, handlers, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;
    use crate::place::SearchQuery;
    use crate::record::Id;
    use crate::user::AvailabilityQuery;
    use crate::wizard::RecommendationQuery;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    fn body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
        warp::body::content_length_limit(MAX_CONTENT_LENGTH).and(warp::body::json())
    }

    fn auth() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
        warp::header::optional::<String>("authorization")
    }

    /// Matches the API path, which may span several segments.
    fn prefix(api_path: &str) -> BoxedFilter<()> {
        api_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(warp::any().boxed(), |filter, segment| {
                filter.and(p(segment.to_owned())).boxed()
            })
    }

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name(environment: Environment) -> Route {
                let prefix = prefix(&environment.urls.api_path);

                let $route_variable = prefix.and(warp::any().map(move || environment.clone()));

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    route!(make_recommend_route => recommend, rt; p("recommend"), end(), post(), query::<RecommendationQuery>(), body());
    route!(make_wizard_questions_route => wizard_questions, rt; p("wizard"), p("questions"), end(), g());

    route!(make_list_places_route => list_places, rt; p("places"), end(), g());
    route!(make_create_place_route => create_place, rt; p("places"), end(), post(), body());
    route!(make_search_places_route => search_places, rt; p("places"), p("search"), end(), g(), query::<SearchQuery>());
    route!(make_filter_places_route => filter_places, rt; p("places"), p("filter"), end(), post(), body());
    route!(make_retrieve_place_route => retrieve_place, rt; p("places"), par::<Id>(), end(), g());
    route!(make_update_place_route => update_place, rt; p("places"), par::<Id>(), end(), put(), body());
    route!(make_delete_place_route => delete_place, rt; p("places"), par::<Id>(), end(), delete());

    route!(make_place_reviews_route => place_reviews, rt; p("places"), par::<Id>(), p("reviews"), end(), g());
    route!(make_create_review_route => create_review, rt; p("places"), par::<Id>(), p("reviews"), end(), post(), auth(), body());
    route!(make_update_review_route => update_review, rt; p("reviews"), par::<Id>(), end(), put(), auth(), body());
    route!(make_delete_review_route => delete_review, rt; p("reviews"), par::<Id>(), end(), delete(), auth());

    route!(make_signup_route => signup, rt; p("users"), p("signup"), end(), post(), body());
    route!(make_login_route => login, rt; p("users"), p("login"), end(), post(), body());
    route!(make_find_id_route => find_id, rt; p("users"), p("find-id"), end(), post(), body());
    route!(make_reset_password_route => reset_password, rt; p("users"), p("reset-password"), end(), post(), body());
    route!(make_availability_route => availability, rt; p("users"), p("available"), end(), g(), query::<AvailabilityQuery>());
    route!(make_retrieve_user_route => retrieve_user, rt; p("users"), par::<Id>(), end(), g());
    route!(make_update_profile_route => update_profile, rt; p("users"), par::<Id>(), end(), put(), auth(), body());
    route!(make_change_password_route => change_password, rt; p("users"), par::<Id>(), p("password"), end(), put(), auth(), body());
    route!(make_delete_user_route => delete_user, rt; p("users"), par::<Id>(), end(), delete(), auth());
    route!(make_user_reviews_route => user_reviews, rt; p("users"), par::<Id>(), p("reviews"), end(), g());

    route!(make_list_pets_route => list_pets, rt; p("users"), par::<Id>(), p("pets"), end(), g(), auth());
    route!(make_create_pet_route => create_pet, rt; p("users"), par::<Id>(), p("pets"), end(), post(), auth(), body());
    route!(make_update_pet_route => update_pet, rt; p("users"), par::<Id>(), p("pets"), par::<Id>(), end(), put(), auth(), body());
    route!(make_delete_pet_route => delete_pet, rt; p("users"), par::<Id>(), p("pets"), par::<Id>(), end(), delete(), auth());

    /// Every API route, without rejection handling.
    pub fn make_api_routes(environment: Environment) -> Route {
        let makers: &[fn(Environment) -> Route] = &[
            make_wizard_questions_route,
            make_list_places_route,
            make_create_place_route,
            make_search_places_route,
            make_filter_places_route,
            make_retrieve_place_route,
            make_update_place_route,
            make_delete_place_route,
            make_place_reviews_route,
            make_create_review_route,
            make_update_review_route,
            make_delete_review_route,
            make_signup_route,
            make_login_route,
            make_find_id_route,
            make_reset_password_route,
            make_availability_route,
            make_retrieve_user_route,
            make_update_profile_route,
            make_change_password_route,
            make_delete_user_route,
            make_user_reviews_route,
            make_list_pets_route,
            make_create_pet_route,
            make_update_pet_route,
            make_delete_pet_route,
        ];

        makers.iter().fold(
            make_recommend_route(environment.clone()),
            |routes, make_route| routes.or(make_route(environment.clone())).unify().boxed(),
        )
    }

    /// Every API route, with errors rendered as JSON.
    pub fn make_api_filter(environment: Environment) -> BoxedFilter<(impl Reply,)> {
        let logger = environment.logger.clone();

        make_api_routes(environment)
            .recover(move |r| format_rejection(logger.clone(), r))
            .boxed()
    }
}
