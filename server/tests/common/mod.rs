#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use smartqueue_server::config::Config;
use smartqueue_server::models::{Queue, QueueStatus, Service, User, UserRole};
use smartqueue_server::routes::create_routes;
use smartqueue_server::state::AppState;
use smartqueue_server::store::Store;

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::new(Config::for_tests(), Store::in_memory());
        let router = create_routes(state.clone());
        Self { state, router }
    }

    /// Inserts an active user straight into the store and returns an access token.
    pub async fn user(&self, email: &str, role: UserRole, organization: Option<Uuid>) -> (User, String) {
        let mut user = User::new(
            email.into(),
            String::new(),
            "Fatou".into(),
            "Sarr".into(),
            role,
            Utc::now(),
        );
        user.organization_id = organization;
        self.state.store.users.insert(&user).await.unwrap();
        let token = self.state.tokens.issue_pair(&user, Utc::now()).unwrap().access;
        (user, token)
    }

    /// An open queue on a public service of a fresh organization.
    pub async fn open_queue(&self) -> (Uuid, Service, Queue) {
        let now = Utc::now();
        let organization = Uuid::new_v4();
        let service = Service::new(organization, "Retrait".into(), "R".into(), now);
        self.state.store.services.insert(&service).await.unwrap();
        let mut queue = Queue::new(service.id, organization, "Guichet 1".into(), now);
        queue.current_status = QueueStatus::Active;
        self.state.store.queues.insert(&queue).await.unwrap();
        (organization, service, queue)
    }

    pub async fn request(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.request("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Reply {
        self.request("POST", uri, token, Some(body)).await
    }
}
