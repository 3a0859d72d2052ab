use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use warp::Filter;

use log::{info, initialize_logger, warn};
use petspot::auth::TokenSigner;
use petspot::config::{get_flag, get_variable, get_variable_or, split_list};
use petspot::db::{MemoryDb, PgDb};
use petspot::environment::{Environment, SafeDb};
use petspot::routes;
use petspot::urls::Urls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    #[cfg(feature = "env_logging")]
    let _guard = log::initialize_env_logger();

    let logger = initialize_logger();

    let main_port: u16 = get_variable_or("BACKEND_PORT", 8080);
    let admin_port: u16 = get_variable_or("BACKEND_ADMIN_PORT", 8081);

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    let db: Arc<SafeDb> = if get_flag("BACKEND_IN_MEMORY_DB") {
        warn!(logger, "Using the in-memory database; nothing will be persisted");
        Arc::new(MemoryDb::new())
    } else {
        info!(logger, "Creating database pool...");
        let connection_string = get_variable("BACKEND_DB_CONNECTION_STRING");
        let pool = PgPoolOptions::new()
            .max_connections(get_variable_or("BACKEND_DB_MAX_CONNECTIONS", 5))
            .connect(&connection_string)
            .await?;
        Arc::new(PgDb::new(pool))
    };

    let tokens = Arc::new(TokenSigner::new(
        get_variable("BACKEND_TOKEN_SECRET"),
        time::Duration::seconds(get_variable_or("BACKEND_TOKEN_LIFETIME_SECONDS", 86_400)),
    ));

    let urls = Arc::new(Urls::new(
        get_variable("BACKEND_BASE_URL"),
        get_variable_or("BACKEND_API_PATH", "api".to_owned()),
    )?);

    let environment = Environment::new(logger.clone(), db, tokens, urls);

    let origins = split_list(&get_variable_or("BACKEND_ALLOWED_ORIGINS", String::new()));
    let cors = if origins.is_empty() {
        warp::cors().allow_any_origin()
    } else {
        warp::cors().allow_origins(origins.iter().map(String::as_str))
    }
    .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
    .allow_headers(vec!["authorization", "content-type"]);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // the receiver only goes away once shutdown has begun
            termination_sender.send(()).await.ok();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::make_api_filter(environment.clone()).with(cors);

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
