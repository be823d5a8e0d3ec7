mod common;

use axum::http::StatusCode;
use chrono::{Datelike, Duration, Utc};
use serde_json::json;
use smartqueue_server::models::UserRole;

use common::TestApp;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let reply = app.get("/health", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["data"]["status"], "ok");
    assert_eq!(reply.body["data"]["service"], "smartqueue-api");
    assert!(reply.headers.contains_key("x-request-id"));
    assert_eq!(reply.headers["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = TestApp::new();
    let registered = app
        .post(
            "/api/accounts/register",
            None,
            json!({
                "email": "Moussa@Example.sn",
                "password": "teranga2024",
                "password_confirm": "teranga2024",
                "first_name": "Moussa",
                "last_name": "Ndiaye",
                "terms_accepted": true
            }),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert_eq!(registered.body["data"]["user"]["role"], "customer");
    assert!(registered.body["data"]["user"].get("password_hash").is_none());

    let login = app
        .post(
            "/api/accounts/login",
            None,
            json!({"email": "moussa@example.sn", "password": "teranga2024"}),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    let access = login.body["data"]["tokens"]["access"].as_str().unwrap().to_string();

    let profile = app.get("/api/accounts/profile", Some(&access)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["data"]["first_name"], "Moussa");

    let status = app.get("/api/accounts/status", Some(&access)).await;
    assert_eq!(status.body["data"]["authenticated"], true);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = TestApp::new();
    let reply = app
        .post(
            "/api/accounts/login",
            None,
            json!({"email": "nobody@example.sn", "password": "whatever1"}),
        )
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_missing_token_gets_error_envelope() {
    let app = TestApp::new();
    let reply = app.get("/api/accounts/profile", None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"]["code"], "AUTH_ERROR");

    let status = app.get("/api/accounts/status", None).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["data"]["authenticated"], false);
}

#[tokio::test]
async fn test_category_listing_is_paginated() {
    let app = TestApp::new();
    let (_, root) = app.user("root@smartqueue.sn", UserRole::SuperAdmin, None).await;
    for name in ["Banques", "Santé", "Administration"] {
        let reply = app
            .post("/api/business/categories", Some(&root), json!({"name": name}))
            .await;
        assert_eq!(reply.status, StatusCode::CREATED);
    }

    let page = app.get("/api/business/categories?page_size=2", None).await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["count"], 3);
    assert_eq!(page.body["results"].as_array().unwrap().len(), 2);
    assert!(page.body["next"].as_str().unwrap().contains("page=2"));
    assert!(page.body["previous"].is_null());
}

#[tokio::test]
async fn test_customer_cannot_create_category() {
    let app = TestApp::new();
    let (_, token) = app.user("awa@example.sn", UserRole::Customer, None).await;
    let reply = app
        .post("/api/business/categories", Some(&token), json!({"name": "Banques"}))
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_ticket_flow_over_http() {
    let app = TestApp::new();
    let (organization, _, queue) = app.open_queue().await;
    let (_, customer) = app.user("awa@example.sn", UserRole::Customer, None).await;
    let (_, agent) = app.user("agent@bank.sn", UserRole::Staff, Some(organization)).await;

    let taken = app
        .post(&format!("/api/queues/{}/take-ticket", queue.id), Some(&customer), json!({}))
        .await;
    assert_eq!(taken.status, StatusCode::CREATED);
    assert_eq!(taken.body["data"]["ticket_number"], "R001");
    assert_eq!(taken.body["data"]["position"], 1);
    let ticket_id = taken.body["data"]["id"].as_str().unwrap().to_string();

    let again = app
        .post(&format!("/api/queues/{}/take-ticket", queue.id), Some(&customer), json!({}))
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);

    let mine = app.get("/api/tickets/mine/active", Some(&customer)).await;
    assert_eq!(mine.body["data"].as_array().unwrap().len(), 1);

    let refused = app
        .post(&format!("/api/queues/{}/call-next", queue.id), Some(&customer), json!({}))
        .await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);

    let called = app
        .post(&format!("/api/queues/{}/call-next", queue.id), Some(&agent), json!({}))
        .await;
    assert_eq!(called.status, StatusCode::OK);
    assert_eq!(called.body["data"]["id"], ticket_id.as_str());
    assert_eq!(called.body["data"]["status"], "called");

    let empty = app
        .post(&format!("/api/queues/{}/call-next", queue.id), Some(&agent), json!({}))
        .await;
    assert_eq!(empty.status, StatusCode::OK);
    assert!(empty.body["data"].is_null());

    let detail = app.get(&format!("/api/tickets/{ticket_id}"), Some(&customer)).await;
    assert_eq!(detail.body["data"]["status"], "called");
    assert!(detail.body["data"]["position"].is_null());
}

#[tokio::test]
async fn test_unknown_queue_is_not_found() {
    let app = TestApp::new();
    let reply = app
        .get("/api/queues/9b2f1c1e-52a4-4f1e-9a53-0d1f2a3b4c5d", None)
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_notification_socket_requires_token() {
    let app = TestApp::new();
    let reply = app.get("/ws/notifications", None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = app.get("/ws/notifications?token=not-a-jwt", None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_welcome_notification_lands_in_inbox() {
    let app = TestApp::new();
    let registered = app
        .post(
            "/api/accounts/register",
            None,
            json!({
                "email": "binta@example.sn",
                "password": "dakar-2024",
                "password_confirm": "dakar-2024",
                "first_name": "Binta",
                "last_name": "Fall",
                "terms_accepted": true
            }),
        )
        .await;
    let access = registered.body["data"]["tokens"]["access"].as_str().unwrap().to_string();

    let unread = app.get("/api/notifications/unread-count", Some(&access)).await;
    assert_eq!(unread.status, StatusCode::OK);
    assert_eq!(unread.body["data"]["unread"], 1);

    let marked = app
        .post("/api/notifications/mark-all-read", Some(&access), json!({}))
        .await;
    assert_eq!(marked.body["data"]["marked"], 1);

    let unread = app.get("/api/notifications/unread-count", Some(&access)).await;
    assert_eq!(unread.body["data"]["unread"], 0);
}

#[tokio::test]
async fn test_appointment_booking_flow() {
    let app = TestApp::new();
    let (organization, service, _) = app.open_queue().await;
    let (_, staff) = app.user("agent@clinic.sn", UserRole::Staff, Some(organization)).await;
    let (_, customer) = app.user("patient@example.sn", UserRole::Customer, None).await;
    let (_, neighbour) = app.user("voisin@example.sn", UserRole::Customer, None).await;

    let date = Utc::now().date_naive() + Duration::days(3);
    let slot = app
        .post(
            "/api/appointments/slots",
            Some(&staff),
            json!({
                "service_id": service.id,
                "day_of_week": date.weekday().num_days_from_monday(),
                "start_time": "09:00:00",
                "end_time": "11:00:00",
                "slot_duration": 30,
                "max_appointments": 1
            }),
        )
        .await;
    assert_eq!(slot.status, StatusCode::CREATED);
    let slot_id = slot.body["data"]["id"].as_str().unwrap().to_string();

    let available = app
        .get(
            &format!("/api/appointments/slots/{slot_id}/available?date={date}"),
            Some(&customer),
        )
        .await;
    assert_eq!(available.status, StatusCode::OK);
    assert_eq!(available.body["data"]["times"].as_array().unwrap().len(), 4);

    let booking = json!({
        "slot_id": slot_id,
        "scheduled_date": date,
        "scheduled_time": "09:30:00"
    });
    let booked = app.post("/api/appointments", Some(&customer), booking.clone()).await;
    assert_eq!(booked.status, StatusCode::CREATED);
    assert_eq!(booked.body["data"]["status"], "pending");
    assert!(booked.body["data"]["appointment_number"]
        .as_str()
        .unwrap()
        .starts_with("RDV"));
    let id = booked.body["data"]["id"].as_str().unwrap().to_string();

    let full = app.post("/api/appointments", Some(&neighbour), booking).await;
    assert_eq!(full.status, StatusCode::CONFLICT);
    assert_eq!(full.body["error"]["code"], "CONFLICT");

    let confirmed = app
        .post(&format!("/api/appointments/{id}/confirm"), Some(&staff), json!({}))
        .await;
    assert_eq!(confirmed.status, StatusCode::OK);
    assert_eq!(confirmed.body["data"]["status"], "confirmed");

    let detail = app.get(&format!("/api/appointments/{id}"), Some(&customer)).await;
    assert_eq!(detail.body["data"]["status"], "confirmed");
    assert_eq!(detail.body["data"]["history"].as_array().unwrap().len(), 2);

    let hidden = app.get(&format!("/api/appointments/{id}"), Some(&neighbour)).await;
    assert_eq!(hidden.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_payment_initiate_and_callback() {
    let app = TestApp::new();
    let (_, root) = app.user("root@smartqueue.sn", UserRole::SuperAdmin, None).await;
    let (_, customer) = app.user("client@example.sn", UserRole::Customer, None).await;

    let provider = app
        .post(
            "/api/payments/providers",
            Some(&root),
            json!({
                "name": "Wave",
                "provider_type": "wave",
                "transaction_fee_fixed": "50",
                "transaction_fee_percent": "1"
            }),
        )
        .await;
    assert_eq!(provider.status, StatusCode::CREATED);
    let organization = app
        .post(
            "/api/business/organizations",
            Some(&root),
            json!({
                "name": "Senelec",
                "org_type": "government",
                "region": "dakar",
                "city": "Dakar",
                "phone_number": "+221338000000"
            }),
        )
        .await;
    assert_eq!(organization.status, StatusCode::CREATED);

    let initiated = app
        .post(
            "/api/payments/initiate",
            Some(&customer),
            json!({
                "provider_id": provider.body["data"]["id"],
                "organization_id": organization.body["data"]["id"],
                "amount": "1000",
                "payment_type": "service_fee",
                "payer_phone": "+221771234567",
                "payer_name": "Ibrahima Fall"
            }),
        )
        .await;
    assert_eq!(initiated.status, StatusCode::CREATED);
    assert_eq!(initiated.body["data"]["status"], "processing");
    let id = initiated.body["data"]["id"].as_str().unwrap().to_string();
    let number = initiated.body["data"]["payment_number"].as_str().unwrap().to_string();

    let wrong_provider = app
        .post(
            "/api/payments/callback/orange_money",
            None,
            json!({"reference": number, "status": "success"}),
        )
        .await;
    assert_eq!(wrong_provider.status, StatusCode::BAD_REQUEST);

    let callback = app
        .post(
            "/api/payments/callback/wave",
            None,
            json!({"reference": number, "status": "success"}),
        )
        .await;
    assert_eq!(callback.status, StatusCode::OK);
    assert_eq!(callback.body["data"]["status"], "completed");

    let status = app
        .get(&format!("/api/payments/{id}/status"), Some(&customer))
        .await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["data"]["status"], "completed");
}
