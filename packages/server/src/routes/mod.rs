use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn api_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .nest("/files", file_routes(config))
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
}

fn user_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::user::me, handlers::user::delete_account))
        .routes(routes!(handlers::user::update_preferences))
        .routes(routes!(handlers::user::list_devices))
}

fn file_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let read = OpenApiRouter::new()
        .routes(routes!(handlers::file::list_files))
        .routes(routes!(handlers::file::find_by_hash))
        .routes(routes!(
            handlers::file::get_file,
            handlers::file::delete_file
        ))
        .routes(routes!(handlers::file::download_file))
        .routes(routes!(handlers::file::rename_file))
        .routes(routes!(handlers::file::restore_version));

    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::file::upload_file))
        .routes(routes!(
            handlers::file::list_versions,
            handlers::file::add_version
        ))
        .layer(handlers::file::upload_body_limit(
            config.storage.max_upload_bytes,
        ));

    read.merge(upload)
}
