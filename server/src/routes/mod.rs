use axum::http::HeaderName;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    accounts, analytics, appointments, business, health_check, notifications, payments, queues,
    tickets,
};
use crate::realtime::ws;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn create_routes(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let cors = create_cors_layer(state.config.cors_allowed_origins.as_deref());
    let security = create_security_headers_layer(state.config.production);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/accounts", account_routes())
        .nest("/api/business", business_routes())
        .nest("/api/queues", queue_routes())
        .nest("/api/tickets", ticket_routes())
        .nest("/api/appointments", appointment_routes())
        .nest("/api/notifications", notification_routes())
        .nest("/api/payments", payment_routes())
        .nest("/api/analytics", analytics_routes())
        .route("/ws/notifications", get(ws::notifications_socket))
        .route("/ws/queues/:id", get(ws::queue_socket))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(security)
        .layer(cors)
        .with_state(state)
}

fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/token/refresh", post(accounts::refresh))
        .route("/logout", post(accounts::logout))
        .route(
            "/profile",
            get(accounts::profile)
                .patch(accounts::update_profile)
                .put(accounts::update_profile)
                .delete(accounts::delete_profile),
        )
        .route("/change-password", post(accounts::change_password))
        .route("/status", get(accounts::status))
        .route("/users", get(accounts::list_users).post(accounts::create_user))
        .route(
            "/users/:id",
            get(accounts::get_user).delete(accounts::deactivate_user),
        )
        .route("/users/:id/reactivate", post(accounts::reactivate_user))
}

fn business_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/organizations",
            get(business::list_organizations).post(business::create_organization),
        )
        .route("/organizations/nearby", get(business::nearby_organizations))
        .route(
            "/organizations/:id",
            get(business::get_organization)
                .put(business::update_organization)
                .patch(business::update_organization)
                .delete(business::delete_organization),
        )
        .route(
            "/organizations/:id/reactivate",
            post(business::reactivate_organization),
        )
        .route("/organizations/:id/stats", get(business::organization_stats))
        .route(
            "/categories",
            get(business::list_categories).post(business::create_category),
        )
        .route(
            "/categories/:id",
            get(business::get_category)
                .put(business::update_category)
                .patch(business::update_category)
                .delete(business::delete_category),
        )
        .route("/categories/:id/reactivate", post(business::reactivate_category))
        .route(
            "/services",
            get(business::list_services).post(business::create_service),
        )
        .route(
            "/services/:id",
            get(business::get_service)
                .put(business::update_service)
                .patch(business::update_service)
                .delete(business::delete_service),
        )
        .route("/services/:id/reactivate", post(business::reactivate_service))
}

fn queue_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(queues::list_queues).post(queues::create_queue))
        .route("/stats", get(queues::global_stats))
        .route(
            "/:id",
            get(queues::get_queue)
                .put(queues::update_queue)
                .patch(queues::update_queue)
                .delete(queues::delete_queue),
        )
        .route("/:id/reactivate", post(queues::reactivate_queue))
        .route("/:id/status", post(queues::change_status))
        .route("/:id/tickets", get(queues::queue_tickets))
        .route("/:id/dashboard", get(queues::dashboard))
        .route("/:id/take-ticket", post(queues::take_ticket))
        .route("/:id/call-next", post(queues::call_next))
}

fn ticket_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(tickets::list_tickets))
        .route("/mine/active", get(tickets::mine_active))
        .route("/expire-overdue", post(tickets::expire_overdue))
        .route("/:id", get(tickets::get_ticket))
        .route("/:id/recall", post(tickets::recall))
        .route("/:id/start", post(tickets::start))
        .route("/:id/complete", post(tickets::complete))
        .route("/:id/no-show", post(tickets::no_show))
        .route("/:id/cancel", post(tickets::cancel))
        .route("/:id/transfer", post(tickets::transfer))
}

fn appointment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(appointments::list_appointments).post(appointments::book),
        )
        .route("/today", get(appointments::today))
        .route(
            "/slots",
            get(appointments::list_slots).post(appointments::create_slot),
        )
        .route(
            "/slots/:id",
            get(appointments::get_slot)
                .put(appointments::update_slot)
                .patch(appointments::update_slot)
                .delete(appointments::delete_slot),
        )
        .route("/slots/:id/reactivate", post(appointments::reactivate_slot))
        .route("/slots/:id/available", get(appointments::available_times))
        .route(
            "/services/:service_id/availability",
            get(appointments::service_availability),
        )
        .route("/:id", get(appointments::get_appointment))
        .route("/:id/confirm", post(appointments::confirm))
        .route("/:id/cancel", post(appointments::cancel))
        .route("/:id/check-in", post(appointments::check_in))
        .route("/:id/start", post(appointments::start))
        .route("/:id/complete", post(appointments::complete))
        .route("/:id/no-show", post(appointments::no_show))
        .route("/:id/reschedule", post(appointments::reschedule))
}

fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/mark-all-read", post(notifications::mark_all_read))
        .route("/unread-count", get(notifications::unread_count))
        .route("/send", post(notifications::send))
        .route("/bulk", post(notifications::bulk))
        .route(
            "/preferences",
            get(notifications::preferences)
                .patch(notifications::update_preferences)
                .put(notifications::update_preferences),
        )
        .route(
            "/templates",
            get(notifications::list_templates).post(notifications::create_template),
        )
        .route(
            "/templates/:id",
            get(notifications::get_template)
                .put(notifications::update_template)
                .patch(notifications::update_template)
                .delete(notifications::delete_template),
        )
        .route("/:id", get(notifications::get_notification))
        .route("/:id/mark-read", post(notifications::mark_read))
        .route("/:id/retry", post(notifications::retry))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(payments::list_payments))
        .route("/initiate", post(payments::initiate))
        .route("/stats", get(payments::stats))
        .route(
            "/providers",
            get(payments::list_providers).post(payments::create_provider),
        )
        .route(
            "/providers/:id",
            get(payments::get_provider)
                .put(payments::update_provider)
                .patch(payments::update_provider)
                .delete(payments::delete_provider),
        )
        .route("/providers/:id/reactivate", post(payments::reactivate_provider))
        .route("/callback/:provider", post(payments::callback))
        .route("/:id", get(payments::get_payment))
        .route("/:id/status", get(payments::status))
        .route("/:id/cancel", post(payments::cancel))
        .route("/:id/refund", post(payments::refund))
        .route("/:id/simulate-success", post(payments::simulate_success))
        .route("/:id/simulate-failure", post(payments::simulate_failure))
}

fn analytics_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/satisfaction",
            get(analytics::list_ratings).post(analytics::rate),
        )
        .route("/satisfaction/stats", get(analytics::rating_stats))
        .route("/dashboard", get(analytics::dashboard))
        .route("/realtime", get(analytics::realtime))
        .route("/queues/:id", get(analytics::queue_analytics))
}
