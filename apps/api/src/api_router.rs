use axum::Router;
use axum::routing::{delete, get, post, put};
use formwork_core::AppError;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

mod cors;

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let form_routes = Router::new()
        .route(
            "/api/forms/{collection}/sessions",
            post(handlers::forms::open_form_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}",
            get(handlers::forms::get_form_handler).delete(handlers::forms::close_form_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/values",
            put(handlers::forms::set_value_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/composites",
            post(handlers::forms::select_discriminant_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/items",
            post(handlers::forms::insert_item_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/items/removal",
            post(handlers::forms::request_removal_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/items/removal/confirm",
            post(handlers::forms::confirm_removal_handler)
                .delete(handlers::forms::cancel_removal_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/items/expanded",
            post(handlers::forms::toggle_expanded_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/options/search",
            post(handlers::forms::search_options_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/import",
            post(handlers::forms::import_text_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/files",
            post(handlers::forms::upload_files_handler)
                .delete(handlers::forms::delete_file_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/uploads",
            get(handlers::forms::upload_progress_handler),
        )
        .route(
            "/api/forms/sessions/{session_id}/submit",
            post(handlers::forms::submit_form_handler),
        );

    let record_routes = Router::new()
        .route(
            "/api/records/{collection}",
            get(handlers::records::list_records_handler),
        )
        .route(
            "/api/records/{collection}/search",
            post(handlers::records::apply_search_handler)
                .delete(handlers::records::clear_search_handler),
        )
        .route(
            "/api/records/{collection}/{record_id}",
            delete(handlers::records::delete_record_handler),
        );

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(form_routes)
        .merge(record_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors::build_cors_layer(frontend_url)?)
        .with_state(app_state))
}
