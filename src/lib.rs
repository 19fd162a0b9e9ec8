use crate::capabilities::SchemaCapabilities;
use crate::cli::Args;
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use axum_keycloak_auth::PassthroughMode;
use axum_keycloak_auth::instance::{KeycloakAuthInstance, KeycloakConfig};
use axum_keycloak_auth::layer::KeycloakAuthLayer;
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use tracing::log::info;

pub mod capabilities;
pub mod cli;
pub mod leaderboard;
pub mod model;
pub mod payloads;
pub mod response;
pub mod schema;
pub mod session;

mod api;
mod errors;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub capabilities: SchemaCapabilities,
}

pub async fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.database_url, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Probing schema capabilities...");
    let capabilities = SchemaCapabilities::probe(&pool)
        .await
        .context("Failed to probe schema capabilities")?;
    info!("Schema capabilities: {:?}", capabilities);

    info!("Initializing Keycloak authentication layer...");
    let keycloak_layer =
        init_protection_layer(args).context("Failed to initialize Keycloak layer")?;

    info!("Initializing router...");
    Ok(init_router_internal(
        AppState { pool, capabilities },
        keycloak_layer,
    ))
}

pub fn init_test_router(pool: Pool) -> Router {
    init_test_router_with_capabilities(pool, SchemaCapabilities::assume_current())
}

pub fn init_test_router_with_capabilities(
    pool: Pool,
    capabilities: SchemaCapabilities,
) -> Router {
    let learner_api = learner_routes();
    let admin_api = admin_routes();

    Router::new()
        .nest("/api", learner_api)
        .nest("/api/admin", admin_api)
        .with_state(AppState { pool, capabilities })
}

fn init_router_internal(state: AppState, keycloak_layer: KeycloakAuthLayer<String>) -> Router {
    let learner_api = learner_routes().layer(keycloak_layer.clone());
    let admin_api = admin_routes().layer(keycloak_layer.clone());

    Router::new()
        .nest("/api", learner_api)
        .nest("/api/admin", admin_api)
        .with_state(state)
}

fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_protection_layer(args: &Args) -> anyhow::Result<KeycloakAuthLayer<String>> {
    let config = KeycloakConfig::builder()
        .server(args.keycloak_server_url.clone())
        .realm(args.keycloak_realm.clone())
        .build();

    let instance = KeycloakAuthInstance::new(config);

    let layer = KeycloakAuthLayer::builder()
        .instance(instance)
        .passthrough_mode(PassthroughMode::Block)
        .persist_raw_claims(false)
        .expected_audiences(vec![args.keycloak_audiences.clone()])
        .build();

    Ok(layer)
}

fn learner_routes() -> Router<AppState> {
    Router::new()
        .route("/leaderboard", get(api::learner::get_leaderboard))
        .route("/lessons", get(api::learner::get_lessons))
        .route("/lesson_data", get(api::learner::get_lesson_data))
        .route("/save_progress", post(api::learner::save_progress))
        .route("/session", get(api::learner::resolve_session))
        .route(
            "/claim_group_invite",
            post(api::learner::claim_group_invite),
        )
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/get_users", get(api::admin::get_users))
        .route("/create_user", post(api::admin::create_user))
        .route("/modify_user", post(api::admin::modify_user))
        .route("/set_user_group", post(api::admin::set_user_group))
        .route("/delete_user", post(api::admin::delete_user))
        .route("/get_peer_groups", get(api::admin::get_peer_groups))
        .route("/create_peer_group", post(api::admin::create_peer_group))
        .route("/rename_peer_group", post(api::admin::rename_peer_group))
        .route("/delete_peer_group", post(api::admin::delete_peer_group))
        .route(
            "/generate_group_invite",
            post(api::admin::generate_group_invite),
        )
        .route("/get_modules", get(api::admin::get_modules))
        .route("/create_module", post(api::admin::create_module))
        .route("/modify_module", post(api::admin::modify_module))
        .route("/delete_module", post(api::admin::delete_module))
        .route("/get_lessons", get(api::admin::get_lessons))
        .route("/create_lesson", post(api::admin::create_lesson))
        .route("/modify_lesson", post(api::admin::modify_lesson))
        .route("/delete_lesson", post(api::admin::delete_lesson))
        .route("/get_presenters", get(api::admin::get_presenters))
        .route("/create_presenter", post(api::admin::create_presenter))
        .route("/modify_presenter", post(api::admin::modify_presenter))
        .route("/delete_presenter", post(api::admin::delete_presenter))
        .route("/assign_presenter", post(api::admin::assign_presenter))
        .route("/unassign_presenter", post(api::admin::unassign_presenter))
        .route("/get_tags", get(api::admin::get_tags))
        .route("/create_tag", post(api::admin::create_tag))
        .route("/delete_tag", post(api::admin::delete_tag))
        .route("/tag_lesson", post(api::admin::tag_lesson))
        .route("/untag_lesson", post(api::admin::untag_lesson))
        .route("/add_resource", post(api::admin::add_resource))
        .route("/remove_resource", post(api::admin::remove_resource))
}
