use std::env;
use std::sync::{Arc, Once};

use futures::future::join_all;
use log::{o, Logger};
use movine::Movine;
use once_cell::sync::OnceCell;
use postgres::{Client, NoTls};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sqlx::postgres::PgPoolOptions;
use tokio::task;
use serde_json::{json, Value};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::test::RequestBuilder;
use warp::{Filter, Reply};

use petspot::auth::TokenSigner;
use petspot::db::{MemoryDb, PgDb};
use petspot::environment::{Environment, SafeDb};
use petspot::routes;
use petspot::urls::Urls;

static SLOG_SCOPE_GUARD: OnceCell<slog_scope::GlobalLoggerGuard> = OnceCell::new();
static INITIALIZED_DB: Once = Once::new();

#[tokio::test]
async fn reviews_keep_the_rating_aggregate_current() {
    let filter = make_api_filter("reviews_keep_the_rating_aggregate_current");

    let (alice_id, alice) = sign_up_and_log_in(&filter, "alice01", "alice@example.com", "alice").await;
    let (_, bob) = sign_up_and_log_in(&filter, "bob0001", "bob@example.com", "bobby").await;

    let place_id = create_place(&filter, sunny_park()).await;

    let (status, body) = call(
        &filter,
        request("POST", &format!("/api/places/{}/reviews", place_id))
            .header("authorization", bearer(&alice))
            .json(&json!({"content": "Plenty of shade", "rating": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let alice_review = body["data"]["reviewId"].as_i64().expect("get review ID");
    assert_eq!(body["data"]["userId"], alice_id);
    assert_eq!(body["data"]["placeName"], "Sunny Park");

    let (status, body) = call(
        &filter,
        request("POST", &format!("/api/places/{}/reviews", place_id))
            .header("authorization", bearer(&bob))
            .json(&json!({"content": "Too crowded", "rating": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let bob_review = body["data"]["reviewId"].as_i64().expect("get review ID");

    assert_aggregate(&filter, place_id, 4.5, 2).await;

    {
        let (status, body) = call(
            &filter,
            request("PUT", &format!("/api/reviews/{}", alice_review))
                .header("authorization", bearer(&bob))
                .json(&json!({"content": "Mine now", "rating": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(body["action"], "update_review");
    }

    {
        let (status, _) = call(
            &filter,
            request("POST", &format!("/api/places/{}/reviews", place_id))
                .json(&json!({"content": "Anonymous", "rating": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    {
        let (status, _) = call(
            &filter,
            request("POST", &format!("/api/places/{}/reviews", place_id))
                .header("authorization", bearer(&alice))
                .json(&json!({"content": "Off the scale", "rating": 6})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    {
        let (status, body) = call(
            &filter,
            request("POST", "/api/places/9999/reviews")
                .header("authorization", bearer(&alice))
                .json(&json!({"content": "Nowhere", "rating": 3})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["place"], 9999);
    }

    {
        let (status, body) = call(
            &filter,
            request("PUT", &format!("/api/reviews/{}", alice_review))
                .header("authorization", bearer(&alice))
                .json(&json!({"content": "Less shade than I thought", "rating": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["rating"], 2);
    }

    assert_aggregate(&filter, place_id, 3.5, 2).await;

    {
        let (status, _) = call(
            &filter,
            request("DELETE", &format!("/api/reviews/{}", bob_review)).header("authorization", bearer(&bob)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_aggregate(&filter, place_id, 2.0, 1).await;

    let (status, body) = call(&filter, request("GET", &format!("/api/places/{}/reviews", place_id))).await;
    assert_eq!(status, StatusCode::OK);
    let reviews = body["data"].as_array().expect("get reviews");
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["reviewId"], alice_review);

    let (status, body) = call(&filter, request("GET", &format!("/api/users/{}/reviews", alice_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn recommendations_match_every_tag() {
    let filter = make_api_filter("recommendations_match_every_tag");

    let park = create_place(&filter, sunny_park()).await;
    let cafe = create_place(&filter, corner_cafe()).await;

    let recommend = |tags: Value, sort: &str| {
        request("POST", &format!("/api/recommend?sort={}", sort)).json(&json!({ "tags": tags }))
    };

    let (status, body) = call(&filter, recommend(json!(["SMALL", "ENERGY_HIGH"]), "distance")).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(place_ids(&body), vec![park]);

    let (_, body) = call(&filter, recommend(json!(["SMALL"]), "distance")).await;
    assert_eq!(place_ids(&body), vec![park, cafe]);

    let (_, body) = call(&filter, recommend(json!(["MEDIUM", "DIST_FAR"]), "popular")).await;
    assert_eq!(place_ids(&body), vec![cafe]);

    let (_, body) = call(&filter, recommend(json!(["LARGE"]), "rating")).await;
    assert!(place_ids(&body).is_empty());

    let (status, body) = call(&filter, recommend(json!([]), "distance")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["action"], "recommend");

    let (status, _) = call(&filter, recommend(json!(["ENERGY_MAXIMUM"]), "distance")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    {
        let (status, body) = call(
            &filter,
            request("POST", "/api/recommend").json(&json!({
                "tags": ["SMALL"],
                "userLatitude": 120.0,
                "userLongitude": 126.9770,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["action"], "recommend");
    }

    {
        let (status, body) = call(
            &filter,
            request("POST", "/api/recommend").json(&json!({
                "tags": ["SMALL"],
                "userLatitude": 37.5796,
                "userLongitude": 126.9770,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(place_ids(&body), vec![cafe, park], "the cafe is in Seoul");
    }

    let (status, body) = call(&filter, request("GET", "/api/wizard/questions")).await;
    assert_eq!(status, StatusCode::OK);
    let questions = body["data"].as_array().expect("get questions");
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[0]["step"], 1);
}

#[tokio::test]
async fn browsing_places() {
    let filter = make_api_filter("browsing_places");

    let park = create_place(&filter, sunny_park()).await;
    let cafe = create_place(&filter, corner_cafe()).await;

    let (status, body) = call(&filter, request("GET", "/api/places")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(place_ids(&body), vec![park, cafe]);

    {
        let (status, body) = call(
            &filter,
            request("POST", "/api/places/filter").json(&json!({
                "categories": null,
                "dogSizes": null,
                "hasParking": null,
                "isOutdoor": null,
                "hasWifi": null,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(place_ids(&body), vec![park, cafe]);
    }

    {
        let (_, body) = call(
            &filter,
            request("POST", "/api/places/filter").json(&json!({"categories": ["CAFE"], "dogSizes": []})),
        )
        .await;
        assert_eq!(place_ids(&body), vec![cafe]);

        let (_, body) = call(&filter, request("POST", "/api/places/filter").json(&json!({"isOutdoor": true}))).await;
        assert_eq!(place_ids(&body), vec![park]);
    }

    {
        let (status, body) = call(&filter, request("GET", "/api/places/search?keyword=sunny")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(place_ids(&body), vec![park]);

        // no name matches, so the address is searched
        let (_, body) = call(&filter, request("GET", "/api/places/search?keyword=jongno")).await;
        assert_eq!(place_ids(&body), vec![cafe]);

        let (status, _) = call(&filter, request("GET", "/api/places/search?keyword=%20")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    {
        let mut renamed = corner_cafe();
        renamed["name"] = json!("Corner Cafe & Bakery");

        let (status, body) = call(&filter, request("PUT", &format!("/api/places/{}", cafe)).json(&renamed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Corner Cafe & Bakery");
    }

    {
        let (status, _) = call(&filter, request("DELETE", &format!("/api/places/{}", park))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&filter, request("GET", &format!("/api/places/{}", park))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["action"], "retrieve_place");
        assert_eq!(body["id"], park);
    }

    {
        let mut invalid = sunny_park();
        invalid["latitude"] = json!(120.0);

        let (status, _) = call(&filter, request("POST", "/api/places").json(&invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn managing_an_account() {
    let filter = make_api_filter("managing_an_account");

    let (status, body) = call(&filter, request("GET", "/api/users/available?loginId=carol01&nickname=caro")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"loginId": true, "nickname": true}));

    let (carol_id, carol) = sign_up_and_log_in(&filter, "carol01", "carol@example.com", "caro").await;

    let (_, body) = call(&filter, request("GET", "/api/users/available?loginId=carol01&email=new@example.com")).await;
    assert_eq!(body["data"], json!({"loginId": false, "email": true}));

    let (status, _) = call(&filter, request("GET", "/api/users/available")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    {
        let (status, body) = call(&filter, request("POST", "/api/users/signup").json(&signup("carol01", "other@example.com", "other"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["action"], "signup");

        let (status, _) = call(&filter, request("POST", "/api/users/signup").json(&signup("carol02", "carol@example.com", "other"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    {
        let (status, body) = call(&filter, request("GET", &format!("/api/users/{}", carol_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["loginId"], "carol01");
        assert!(body["data"].get("passwordHash").is_none());
    }

    {
        let (status, body) = call(
            &filter,
            request("POST", "/api/users/find-id").json(&json!({
                "name": "Carol",
                "birthdate": "1990-01-01",
                "email": "carol@example.com",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["loginId"], "carol01");
    }

    {
        let (status, _) = call(
            &filter,
            request("PUT", &format!("/api/users/{}/password", carol_id))
                .header("authorization", bearer(&carol))
                .json(&json!({"currentPassword": "not-my-password", "newPassword": "new-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(
            &filter,
            request("PUT", &format!("/api/users/{}/password", carol_id))
                .header("authorization", bearer(&carol))
                .json(&json!({"currentPassword": "password1", "newPassword": "new-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = log_in(&filter, "carol01", "password1").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let temporary = {
        let (status, body) = call(
            &filter,
            request("POST", "/api/users/reset-password").json(&json!({"loginId": "carol01", "email": "carol@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let temporary = body["data"]["temporaryPassword"].as_str().expect("get temporary password").to_owned();

        let (status, _) = log_in(&filter, "carol01", &temporary).await;
        assert_eq!(status, StatusCode::OK);

        temporary
    };

    {
        let (status, body) = call(
            &filter,
            request("PUT", &format!("/api/users/{}", carol_id))
                .header("authorization", bearer(&carol))
                .json(&json!({"email": "carol@example.org", "nickname": "carol"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["nickname"], "carol");
    }

    {
        let (status, _) = call(
            &filter,
            request("DELETE", &format!("/api/users/{}", carol_id)).header("authorization", bearer(&carol)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = log_in(&filter, "carol01", &temporary).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["action"], "login");

        let (status, _) = call(&filter, request("POST", "/api/users/reset-password").json(&json!({"loginId": "carol01", "email": "carol@example.org"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn pets_belong_to_their_owner() {
    let filter = make_api_filter("pets_belong_to_their_owner");

    let (dana_id, dana) = sign_up_and_log_in(&filter, "dana01", "dana@example.com", "dana").await;
    let (_, erin) = sign_up_and_log_in(&filter, "erin01", "erin@example.com", "erin").await;

    let pets = format!("/api/users/{}/pets", dana_id);
    let pet = json!({"name": "Mochi", "gender": "FEMALE", "size": "SMALL", "birthDate": "2020-05-01", "weight": 4.2});

    let (status, _) = call(&filter, request("POST", &pets).json(&pet)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&filter, request("POST", &pets).header("authorization", bearer(&erin)).json(&pet)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&filter, request("POST", &pets).header("authorization", "Bearer not-a-token").json(&pet)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&filter, request("POST", &pets).header("authorization", bearer(&dana)).json(&pet)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let pet_id = body["data"]["petId"].as_i64().expect("get pet ID");
    assert_eq!(body["data"]["birthDate"], "2020-05-01");

    let (status, body) = call(&filter, request("GET", &pets).header("authorization", bearer(&dana))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let pet_path = format!("{}/{}", pets, pet_id);

    let (status, body) = call(
        &filter,
        request("PUT", &pet_path)
            .header("authorization", bearer(&dana))
            .json(&json!({"name": "Mochi", "size": "MEDIUM", "age": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["size"], "MEDIUM");
    assert_eq!(body["data"]["gender"], "UNKNOWN");

    let (status, _) = call(&filter, request("DELETE", &pet_path).header("authorization", bearer(&dana))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&filter, request("DELETE", &pet_path).header("authorization", bearer(&dana))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_requests_are_rejected_as_json() {
    let filter = make_api_filter("malformed_requests_are_rejected_as_json");

    let (status, body) = call(&filter, request("GET", "/api/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, body) = call(
        &filter,
        request("POST", "/api/places")
            .header("content-type", "application/json")
            .body("{\"name\": "),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["action"], "request");

    let (status, _) = call(&filter, request("GET", "/api/places/not-a-number")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_check_reports_the_version() {
    let environment = make_environment("health_check_reports_the_version");
    let filter = routes::admin::make_healthz_route(environment);

    let response = warp::test::request().path("/healthz").method("GET").reply(&filter).await;

    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(response.body()).expect("parse health check");
    assert_eq!(body["version"], info::VERSION);
}

#[tokio::test]
async fn postgres_reviews_keep_the_rating_aggregate_current() {
    let filter = match make_postgres_filter("postgres_reviews_keep_the_rating_aggregate_current").await {
        Some(filter) => filter,
        None => return,
    };

    let run = unique_suffix();
    let (_, alice) = sign_up_unique(&filter, "a", &run).await;
    let (_, bob) = sign_up_unique(&filter, "b", &run).await;

    let place_id = create_place(&filter, sunny_park()).await;
    assert_aggregate(&filter, place_id, 0.0, 0).await;

    let (status, body) = call(
        &filter,
        request("POST", &format!("/api/places/{}/reviews", place_id))
            .header("authorization", bearer(&alice))
            .json(&json!({"content": "Plenty of shade", "rating": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let alice_review = body["data"]["reviewId"].as_i64().expect("get review ID");

    assert_aggregate(&filter, place_id, 4.0, 1).await;

    let (status, body) = call(
        &filter,
        request("POST", &format!("/api/places/{}/reviews", place_id))
            .header("authorization", bearer(&bob))
            .json(&json!({"content": "Best lawn in town", "rating": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let bob_review = body["data"]["reviewId"].as_i64().expect("get review ID");

    assert_aggregate(&filter, place_id, 4.5, 2).await;

    {
        let (status, _) = call(
            &filter,
            request("DELETE", &format!("/api/reviews/{}", alice_review)).header("authorization", bearer(&bob)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    {
        let (status, _) = call(
            &filter,
            request("DELETE", &format!("/api/reviews/{}", bob_review)).header("authorization", bearer(&bob)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_aggregate(&filter, place_id, 4.0, 1).await;

    {
        let (status, body) = call(
            &filter,
            request("PUT", &format!("/api/reviews/{}", alice_review))
                .header("authorization", bearer(&alice))
                .json(&json!({"content": "Less shade than I thought", "rating": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    assert_aggregate(&filter, place_id, 2.0, 1).await;

    {
        let (status, _) = call(
            &filter,
            request("DELETE", &format!("/api/reviews/{}", alice_review)).header("authorization", bearer(&alice)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_aggregate(&filter, place_id, 0.0, 0).await;
}

#[tokio::test]
async fn postgres_concurrent_reviews_are_all_counted() {
    let filter = match make_postgres_filter("postgres_concurrent_reviews_are_all_counted").await {
        Some(filter) => filter,
        None => return,
    };

    let run = unique_suffix();
    let place_id = create_place(&filter, corner_cafe()).await;

    let ratings = [1, 2, 3, 4, 5, 5, 4, 3];
    let mut tokens = vec![];

    for i in 0..ratings.len() {
        let (_, token) = sign_up_unique(&filter, &format!("c{}", i), &run).await;
        tokens.push(token);
    }

    let responses = join_all(tokens.iter().zip(ratings.iter()).map(|(token, rating)| {
        call(
            &filter,
            request("POST", &format!("/api/places/{}/reviews", place_id))
                .header("authorization", bearer(token))
                .json(&json!({"content": "Busy afternoon", "rating": rating})),
        )
    }))
    .await;

    for (status, body) in responses {
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    // 27 / 8 = 3.375
    assert_aggregate(&filter, place_id, 3.4, 8).await;
}

#[tokio::test]
async fn postgres_duplicate_signups_conflict() {
    let filter = match make_postgres_filter("postgres_duplicate_signups_conflict").await {
        Some(filter) => filter,
        None => return,
    };

    let run = unique_suffix();
    let login_id = format!("d{}", run);
    let email = format!("d{}@example.com", run);
    let nickname = format!("d{}", run);

    let (status, body) = call(&filter, request("POST", "/api/users/signup").json(&signup(&login_id, &email, &nickname))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let duplicates = [
        (signup(&login_id, &format!("e{}@example.com", run), &format!("e{}", run)), "loginId"),
        (signup(&format!("f{}", run), &email, &format!("f{}", run)), "email"),
        (signup(&format!("g{}", run), &format!("g{}@example.com", run), &nickname), "nickname"),
    ];

    for (duplicate, field) in duplicates.iter() {
        let (status, body) = call(&filter, request("POST", "/api/users/signup").json(duplicate)).await;
        assert_eq!(status, StatusCode::CONFLICT, "{}: {}", field, body);
        assert_eq!(body["action"], "signup");
    }

    let (status, body) = call(
        &filter,
        request("GET", &format!("/api/users/available?loginId={}&nickname=h{}", login_id, run)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({"loginId": false, "nickname": true}));
}

#[tokio::test]
async fn postgres_wizard_questions_are_seeded() {
    let filter = match make_postgres_filter("postgres_wizard_questions_are_seeded").await {
        Some(filter) => filter,
        None => return,
    };

    let (status, body) = call(&filter, request("GET", "/api/wizard/questions")).await;
    assert_eq!(status, StatusCode::OK);

    let questions = body["data"].as_array().expect("get questions");
    assert_eq!(questions.len(), 3);

    let steps: Vec<_> = questions.iter().map(|q| q["step"].as_i64()).collect();
    assert_eq!(steps, vec![Some(1), Some(2), Some(3)]);

    let answers: Vec<_> = questions
        .iter()
        .map(|q| q["answers"].as_array().map(Vec::len))
        .collect();
    assert_eq!(answers, vec![Some(3), Some(2), Some(3)]);

    assert_eq!(questions[0]["answers"][0]["matchingTag"], "SMALL");
    assert_eq!(questions[2]["answers"][2]["matchingTag"], "TYPE_PRIVATE");
}

fn sunny_park() -> Value {
    json!({
        "name": "Sunny Park",
        "address": "1 Riverside Road, Busan",
        "petPolicy": "Leashed dogs welcome",
        "category": "PARK",
        "locationType": "OUTDOOR",
        "allowedSizes": ["SMALL"],
        "latitude": 35.1796,
        "longitude": 129.0756,
    })
}

fn corner_cafe() -> Value {
    json!({
        "name": "Corner Cafe",
        "address": "12 Jongno, Seoul",
        "petPolicy": "Dogs on laps",
        "category": "CAFE",
        "locationType": "INDOOR",
        "allowedSizes": ["MEDIUM", "SMALL"],
        "hasWifi": true,
        "latitude": 37.5704,
        "longitude": 126.9920,
    })
}

fn signup(login_id: &str, email: &str, nickname: &str) -> Value {
    json!({
        "loginId": login_id,
        "password": "password1",
        "email": email,
        "nickname": nickname,
        "name": "Carol",
        "birthdate": "1990-01-01",
    })
}

async fn create_place<F>(filter: &F, place: Value) -> i64
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let response = request("POST", "/api/places").json(&place).reply(filter).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = serde_json::from_slice(response.body()).expect("parse created place");
    let id = body["data"]["placeId"].as_i64().expect("get place ID");

    let location = response
        .headers()
        .get("location")
        .expect("get location header")
        .to_str()
        .expect("convert location header to string");
    assert_eq!(location, format!("https://www.example.com/api/places/{}", id));

    id
}

/// Signs up an account whose identifiers cannot collide with earlier runs.
async fn sign_up_unique<F>(filter: &F, prefix: &str, run: &str) -> (i64, String)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let name = format!("{}{}", prefix, run);

    sign_up_and_log_in(filter, &name, &format!("{}@example.com", name), &name).await
}

fn unique_suffix() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

async fn sign_up_and_log_in<F>(filter: &F, login_id: &str, email: &str, nickname: &str) -> (i64, String)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let (status, body) = call(filter, request("POST", "/api/users/signup").json(&signup(login_id, email, nickname))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let id = body["data"]["userId"].as_i64().expect("get user ID");

    let (status, body) = log_in(filter, login_id, "password1").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["tokenType"], "Bearer");

    let token = body["data"]["token"].as_str().expect("get token").to_owned();

    (id, token)
}

async fn log_in<F>(filter: &F, login_id: &str, password: &str) -> (StatusCode, Value)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    call(
        filter,
        request("POST", "/api/users/login").json(&json!({"loginId": login_id, "password": password})),
    )
    .await
}

async fn assert_aggregate<F>(filter: &F, place_id: i64, average: f64, count: i64)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let (status, body) = call(filter, request("GET", &format!("/api/places/{}", place_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["avgRating"].as_f64(), Some(average));
    assert_eq!(body["data"]["reviewCount"].as_i64(), Some(count));
}

fn place_ids(body: &Value) -> Vec<i64> {
    body["data"]
        .as_array()
        .expect("get places")
        .iter()
        .map(|p| p["placeId"].as_i64().expect("get place ID"))
        .collect()
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

fn request(method: &str, path: &str) -> RequestBuilder {
    warp::test::request().method(method).path(path)
}

async fn call<F>(filter: &F, request: RequestBuilder) -> (StatusCode, Value)
where
    F: Filter + 'static,
    F::Extract: Reply + Send,
{
    let response = request.reply(filter).await;
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);

    (response.status(), body)
}

fn make_api_filter(test_name: &str) -> BoxedFilter<(impl Reply,)> {
    routes::make_api_filter(make_environment(test_name))
}

fn make_environment(test_name: &str) -> Environment {
    make_environment_with_db(test_name, Arc::new(MemoryDb::new()))
}

fn make_environment_with_db(test_name: &str, db: Arc<SafeDb>) -> Environment {
    initialize_global_logger();

    let logger: Logger = slog_scope::logger().new(o!("test" => test_name.to_owned()));

    Environment::new(
        Arc::new(logger),
        db,
        Arc::new(TokenSigner::new("test secret", time::Duration::hours(1))),
        Arc::new(Urls::new("https://www.example.com/", "/api/").expect("build URLs")),
    )
}

fn initialize_global_logger() {
    SLOG_SCOPE_GUARD.get_or_init(|| slog_envlogger::init().expect("initialize slog-envlogger"));
}

/// Builds the API over Postgres when `BACKEND_DB_CONNECTION_STRING` is set.
async fn make_postgres_filter(test_name: &str) -> Option<BoxedFilter<(impl Reply,)>> {
    let connection_string = match env::var("BACKEND_DB_CONNECTION_STRING") {
        Ok(s) => s,
        Err(_) => {
            eprintln!("BACKEND_DB_CONNECTION_STRING is not set, skipping {}", test_name);
            return None;
        }
    };

    {
        let connection_string = connection_string.clone();

        task::spawn_blocking(move || {
            INITIALIZED_DB.call_once(|| {
                if env::var("BACKEND_TEST_INITIALIZE_DB").unwrap_or_else(|_| "0".to_owned()) == "1" {
                    initialize_db_for_test(&connection_string);
                }
            });
        })
        .await
        .expect("must spawn blocking task");
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .expect("connect to database");

    let environment = make_environment_with_db(test_name, Arc::new(PgDb::new(pool)));

    Some(routes::make_api_filter(environment))
}

fn initialize_db_for_test(connection_string: &str) {
    let mut client = Client::connect(connection_string, NoTls).expect("connect to database for migrations");
    let mut movine = Movine::new(&mut client);
    movine.set_migration_dir("./migrations");

    if movine.status().is_err() {
        movine.initialize().expect("initialize movine");
    }

    movine.up().expect("run movine migrations");
}
