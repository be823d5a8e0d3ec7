//! HTTP handlers. Each one extracts the request, calls into
//! [`crate::domain`] and shapes the response envelope.

use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::store::Listing;
use crate::utils::pagination::{Page, PageRequest};
use crate::utils::response::success;

pub mod accounts;
pub mod analytics;
pub mod appointments;
pub mod business;
pub mod notifications;
pub mod payments;
pub mod queues;
pub mod tickets;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "smartqueue-api",
    };

    success(payload, "Health check successful").into_response()
}

/// `include_inactive=true` on list endpoints; only honoured for staff.
#[derive(Debug, Default, Deserialize)]
pub struct InactiveParam {
    #[serde(default)]
    pub include_inactive: bool,
}

fn paged<T: Serialize>(listing: Listing<T>, request: PageRequest, uri: &Uri) -> Response {
    let (items, total) = listing.into_parts();
    Page::new(items, total, request, uri).into_response()
}
