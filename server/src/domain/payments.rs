//! Mobile money providers and payments. The external side is behind
//! [`PaymentGateway`]; only a simulated gateway ships.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{can_manage_organization, ensure_manages, require_admin, require_super_admin, staff_scope};
use crate::domain::context;
use crate::models::payment::{expiry_for, generate_payment_number, DEFAULT_CURRENCY};
use crate::models::{
    NotificationCategory, Payment, PaymentProvider, PaymentStatus, PaymentType, ProviderType,
    RelatedKind, SoftDelete, User, UserRole,
};
use crate::state::AppState;
use crate::store::{Listing, PaymentFilter};
use crate::utils::error::{AppError, AppResult};
use crate::utils::pagination::PageRequest;
use crate::utils::validation;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

/// The provider-facing half of a payment.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts the payment with the provider and returns its reference.
    async fn initiate(&self, payment: &Payment, provider: &PaymentProvider) -> Result<String, GatewayError>;
}

/// Accepts everything. Completion arrives through the simulate endpoints
/// or the callback.
pub struct SimulatedGateway;

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn initiate(&self, payment: &Payment, provider: &PaymentProvider) -> Result<String, GatewayError> {
        let reference = format!("SIM-{}", Uuid::new_v4());
        info!(
            payment_number = %payment.payment_number,
            provider = %provider.provider_type,
            %reference,
            "Payment initiated (simulated)"
        );
        Ok(reference)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderPayload {
    pub name: Option<String>,
    pub provider_type: Option<ProviderType>,
    pub supported_currency: Option<String>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub transaction_fee_fixed: Option<Decimal>,
    pub transaction_fee_percent: Option<Decimal>,
    pub is_default: Option<bool>,
    pub priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub provider_id: Uuid,
    pub organization_id: Uuid,
    pub amount: Option<Decimal>,
    pub payment_type: PaymentType,
    pub ticket_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub payer_phone: String,
    pub payer_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentQuery {
    pub status: Option<PaymentStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub reference: String,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub completed_amount: Decimal,
    pub fees_amount: Decimal,
}

fn apply_provider(provider: &mut PaymentProvider, payload: ProviderPayload) -> AppResult<()> {
    if let Some(name) = payload.name {
        provider.name = name.trim().to_string();
    }
    if let Some(kind) = payload.provider_type {
        provider.provider_type = kind;
    }
    if let Some(currency) = payload.supported_currency {
        provider.supported_currency = currency.trim().to_uppercase();
    }
    if let Some(amount) = payload.min_amount {
        provider.min_amount = amount;
    }
    if let Some(amount) = payload.max_amount {
        provider.max_amount = amount;
    }
    if let Some(fee) = payload.transaction_fee_fixed {
        provider.transaction_fee_fixed = fee;
    }
    if let Some(percent) = payload.transaction_fee_percent {
        provider.transaction_fee_percent = percent;
    }
    if let Some(flag) = payload.is_default {
        provider.is_default = flag;
    }
    if let Some(priority) = payload.priority {
        provider.priority = priority;
    }

    validation::not_blank("name", &provider.name)?;
    validation::max_len("name", &provider.name, 100)?;
    if provider.supported_currency.len() != 3 {
        return Err(AppError::validation("supported_currency must be a 3 letter code"));
    }
    if provider.min_amount.is_sign_negative() || provider.max_amount < provider.min_amount {
        return Err(AppError::validation(
            "Amount limits must satisfy 0 <= min_amount <= max_amount",
        ));
    }
    if provider.transaction_fee_fixed.is_sign_negative() {
        return Err(AppError::validation("transaction_fee_fixed cannot be negative"));
    }
    if provider.transaction_fee_percent.is_sign_negative()
        || provider.transaction_fee_percent > Decimal::ONE_HUNDRED
    {
        return Err(AppError::validation(
            "transaction_fee_percent must be between 0 and 100",
        ));
    }
    Ok(())
}

pub async fn get_provider(state: &AppState, id: Uuid) -> AppResult<PaymentProvider> {
    state
        .store
        .payments
        .get_provider(id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment provider", id))
}

/// Active providers for everyone; super admins may also see retired ones.
pub async fn list_providers(
    state: &AppState,
    actor: Option<&User>,
    include_inactive: bool,
) -> AppResult<Vec<PaymentProvider>> {
    let include_inactive =
        include_inactive && actor.is_some_and(|user| user.role == UserRole::SuperAdmin);
    Ok(state.store.payments.list_providers(include_inactive).await?)
}

pub async fn create_provider(
    state: &AppState,
    actor: &User,
    payload: ProviderPayload,
    now: DateTime<Utc>,
) -> AppResult<PaymentProvider> {
    require_super_admin(actor)?;
    let kind = payload
        .provider_type
        .ok_or_else(|| AppError::validation("provider_type is required"))?;
    let mut provider = PaymentProvider::new(String::new(), kind, now);
    apply_provider(&mut provider, payload)?;
    state.store.payments.insert_provider(&provider).await?;
    info!(provider_id = %provider.id, name = %provider.name, "Payment provider created");
    Ok(provider)
}

pub async fn update_provider(
    state: &AppState,
    actor: &User,
    id: Uuid,
    payload: ProviderPayload,
    now: DateTime<Utc>,
) -> AppResult<PaymentProvider> {
    require_super_admin(actor)?;
    let mut provider = get_provider(state, id).await?;
    apply_provider(&mut provider, payload)?;
    provider.updated_at = now;
    state.store.payments.update_provider(&provider).await?;
    Ok(provider)
}

pub async fn set_provider_active(
    state: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
    now: DateTime<Utc>,
) -> AppResult<PaymentProvider> {
    require_super_admin(actor)?;
    let mut provider = get_provider(state, id).await?;
    if active {
        provider.reactivate(now);
    } else {
        provider.deactivate(now);
    }
    state.store.payments.update_provider(&provider).await?;
    Ok(provider)
}

/// The service price behind a linked ticket or appointment, checking that
/// the caller owns it.
async fn linked_price(
    state: &AppState,
    actor: &User,
    request: &InitiateRequest,
) -> AppResult<Option<Decimal>> {
    let mut service_id = None;
    if let Some(ticket_id) = request.ticket_id {
        let ticket = state
            .store
            .tickets
            .get(ticket_id)
            .await?
            .ok_or_else(|| AppError::not_found("Ticket", ticket_id))?;
        if ticket.customer_id != actor.id {
            return Err(AppError::forbidden("This ticket belongs to another customer"));
        }
        if ticket.organization_id != request.organization_id {
            return Err(AppError::validation("The ticket belongs to another organization"));
        }
        service_id = Some(ticket.service_id);
    }
    if let Some(appointment_id) = request.appointment_id {
        let appointment = state
            .store
            .appointments
            .get(appointment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Appointment", appointment_id))?;
        if appointment.customer_id != actor.id {
            return Err(AppError::forbidden(
                "This appointment belongs to another customer",
            ));
        }
        if appointment.organization_id != request.organization_id {
            return Err(AppError::validation(
                "The appointment belongs to another organization",
            ));
        }
        service_id = service_id.or(Some(appointment.service_id));
    }

    let Some(service_id) = service_id else {
        return Ok(None);
    };
    Ok(state
        .store
        .services
        .get(service_id)
        .await?
        .and_then(|service| service.cost))
}

pub async fn initiate(
    state: &AppState,
    actor: &User,
    request: InitiateRequest,
    now: DateTime<Utc>,
) -> AppResult<Payment> {
    let provider = get_provider(state, request.provider_id).await?;
    if !provider.is_active {
        return Err(AppError::validation("This payment provider is not available"));
    }
    state
        .store
        .organizations
        .get(request.organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("Organization", request.organization_id))?;

    let linked = linked_price(state, actor, &request).await?;
    let amount = request
        .amount
        .or(linked)
        .ok_or_else(|| AppError::validation("amount is required"))?;
    if amount <= Decimal::ZERO {
        return Err(AppError::validation("amount must be positive"));
    }
    if !provider.accepts(amount) {
        return Err(AppError::validation(format!(
            "{} accepts amounts between {} and {} {}",
            provider.name, provider.min_amount, provider.max_amount, provider.supported_currency
        )));
    }
    let payer_phone = request.payer_phone.trim().to_string();
    validation::phone(&payer_phone)?;
    let payer_name = request.payer_name.trim().to_string();
    validation::not_blank("payer_name", &payer_name)?;
    validation::max_len("payer_name", &payer_name, 200)?;

    let fees = provider.fees(amount);
    let mut payment = Payment {
        id: Uuid::new_v4(),
        payment_number: generate_payment_number(now),
        external_reference: None,
        customer_id: actor.id,
        provider_id: provider.id,
        organization_id: request.organization_id,
        ticket_id: request.ticket_id,
        appointment_id: request.appointment_id,
        payment_type: request.payment_type,
        amount,
        fees,
        total_amount: amount + fees,
        currency: DEFAULT_CURRENCY.to_string(),
        payer_phone,
        payer_name,
        description: request.description.unwrap_or_default(),
        status: PaymentStatus::Pending,
        error_code: None,
        error_message: None,
        expires_at: expiry_for(now),
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    state.store.payments.insert(&payment).await?;

    match state.gateway.initiate(&payment, &provider).await {
        Ok(reference) => {
            payment.external_reference = Some(reference);
            payment.status = PaymentStatus::Processing;
            payment.updated_at = now;
            state
                .store
                .payments
                .update(&payment, &[PaymentStatus::Pending])
                .await?;
            info!(payment_id = %payment.id, number = %payment.payment_number, total = %payment.total_amount, "Payment initiated");
            Ok(payment)
        }
        Err(e) => {
            warn!(payment_id = %payment.id, error = %e, "Payment gateway rejected the payment");
            let failed = fail(state, payment, Some("GATEWAY_ERROR".into()), e.to_string(), now).await?;
            Err(AppError::ExternalServiceError(format!(
                "Payment {} could not be started: {}",
                failed.payment_number, e
            )))
        }
    }
}

pub async fn get_payment(state: &AppState, id: Uuid) -> AppResult<Payment> {
    state
        .store
        .payments
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment", id))
}

fn is_staff_for(actor: &User, payment: &Payment) -> bool {
    actor.role.is_staff() && can_manage_organization(actor, payment.organization_id)
}

async fn visible(state: &AppState, actor: &User, id: Uuid) -> AppResult<Payment> {
    let payment = get_payment(state, id).await?;
    if payment.customer_id == actor.id || is_staff_for(actor, &payment) {
        Ok(payment)
    } else {
        Err(AppError::forbidden("You cannot access this payment"))
    }
}

pub async fn get(state: &AppState, actor: &User, id: Uuid) -> AppResult<Payment> {
    visible(state, actor, id).await
}

pub async fn list(
    state: &AppState,
    actor: &User,
    query: PaymentQuery,
    page: PageRequest,
) -> AppResult<Listing<Payment>> {
    let mut filter = PaymentFilter {
        status: query.status,
        ..Default::default()
    };
    if actor.role == UserRole::Customer {
        filter.customer_id = Some(actor.id);
    } else {
        filter.organization_id = staff_scope(actor)?;
    }
    Ok(state.store.payments.list(&filter, page).await?)
}

/// Writes `payment` if it is still open; a concurrent change wins.
async fn settle(state: &AppState, payment: &Payment) -> AppResult<()> {
    if state
        .store
        .payments
        .update(payment, &PaymentStatus::OPEN)
        .await?
    {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Payment {} was changed by another request",
            payment.payment_number
        )))
    }
}

fn ensure_open(payment: &Payment, next: PaymentStatus) -> AppResult<()> {
    if payment.status.is_open() {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Cannot change payment status from '{}' to '{next}'",
            payment.status
        )))
    }
}

async fn expire(state: &AppState, payment: &mut Payment, now: DateTime<Utc>) -> AppResult<()> {
    payment.status = PaymentStatus::Expired;
    payment.updated_at = now;
    settle(state, payment).await?;
    info!(payment_id = %payment.id, "Payment expired");
    Ok(())
}

/// Current status, expiring an open payment that ran past its deadline.
pub async fn status(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Payment> {
    let mut payment = visible(state, actor, id).await?;
    if payment.is_expired(now) {
        expire(state, &mut payment, now).await?;
    }
    Ok(payment)
}

pub async fn cancel(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Payment> {
    let mut payment = get_payment(state, id).await?;
    if payment.customer_id != actor.id {
        return Err(AppError::forbidden("Only the payer can cancel a payment"));
    }
    ensure_open(&payment, PaymentStatus::Cancelled)?;
    payment.status = PaymentStatus::Cancelled;
    payment.updated_at = now;
    settle(state, &payment).await?;
    Ok(payment)
}

pub async fn refund(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Payment> {
    require_admin(actor)?;
    let mut payment = get_payment(state, id).await?;
    ensure_manages(actor, payment.organization_id)?;
    if payment.status != PaymentStatus::Completed {
        return Err(AppError::validation("Only completed payments can be refunded"));
    }
    payment.status = PaymentStatus::Refunded;
    payment.updated_at = now;
    if !state
        .store
        .payments
        .update(&payment, &[PaymentStatus::Completed])
        .await?
    {
        return Err(AppError::Conflict("Payment was changed by another request".into()));
    }
    info!(payment_id = %payment.id, by = %actor.id, "Payment refunded");
    Ok(payment)
}

async fn complete(state: &AppState, mut payment: Payment, now: DateTime<Utc>) -> AppResult<Payment> {
    ensure_open(&payment, PaymentStatus::Completed)?;
    payment.status = PaymentStatus::Completed;
    payment.completed_at = Some(now);
    payment.error_code = None;
    payment.error_message = None;
    payment.updated_at = now;
    settle(state, &payment).await?;
    info!(payment_id = %payment.id, number = %payment.payment_number, "Payment completed");

    let ctx = context([
        ("payment_number", payment.payment_number.clone()),
        ("amount", payment.total_amount.to_string()),
    ]);
    state
        .notifier
        .notify_user(
            payment.customer_id,
            NotificationCategory::PaymentCompleted,
            &ctx,
            Some((RelatedKind::Payment, payment.id)),
            now,
        )
        .await;
    Ok(payment)
}

async fn fail(
    state: &AppState,
    mut payment: Payment,
    error_code: Option<String>,
    reason: String,
    now: DateTime<Utc>,
) -> AppResult<Payment> {
    ensure_open(&payment, PaymentStatus::Failed)?;
    payment.status = PaymentStatus::Failed;
    payment.error_code = error_code;
    payment.error_message = Some(reason.clone());
    payment.updated_at = now;
    settle(state, &payment).await?;
    info!(payment_id = %payment.id, %reason, "Payment failed");

    let ctx = context([
        ("payment_number", payment.payment_number.clone()),
        ("reason", reason),
    ]);
    state
        .notifier
        .notify_user(
            payment.customer_id,
            NotificationCategory::PaymentFailed,
            &ctx,
            Some((RelatedKind::Payment, payment.id)),
            now,
        )
        .await;
    Ok(payment)
}

async fn simulated(state: &AppState, actor: &User, id: Uuid) -> AppResult<Payment> {
    if !state.config.payment_simulation_enabled {
        return Err(AppError::forbidden("Payment simulation is disabled"));
    }
    visible(state, actor, id).await
}

pub async fn simulate_success(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Payment> {
    let payment = simulated(state, actor, id).await?;
    complete(state, payment, now).await
}

pub async fn simulate_failure(state: &AppState, actor: &User, id: Uuid, now: DateTime<Utc>) -> AppResult<Payment> {
    let payment = simulated(state, actor, id).await?;
    fail(
        state,
        payment,
        Some("SIMULATED_FAILURE".into()),
        "Simulated failure".into(),
        now,
    )
    .await
}

/// Provider notification. A payment that is already completed is
/// acknowledged as is, so providers may repeat a callback. An open payment
/// past its deadline is expired instead of settled.
pub async fn callback(
    state: &AppState,
    provider_type: ProviderType,
    request: CallbackRequest,
    now: DateTime<Utc>,
) -> AppResult<Payment> {
    let mut payment = state
        .store
        .payments
        .find_by_number(request.reference.trim())
        .await?
        .ok_or_else(|| AppError::not_found("Payment", &request.reference))?;
    let provider = get_provider(state, payment.provider_id).await?;
    if provider.provider_type != provider_type {
        warn!(payment_id = %payment.id, expected = %provider.provider_type, got = %provider_type, "Callback from the wrong provider");
        return Err(AppError::validation("Callback provider does not match the payment"));
    }
    if payment.status == PaymentStatus::Completed {
        return Ok(payment);
    }
    if payment.is_expired(now) {
        expire(state, &mut payment, now).await?;
        warn!(payment_id = %payment.id, status = %request.status, "Callback after the payment expired");
        return Err(AppError::validation(format!(
            "Payment {} has expired",
            payment.payment_number
        )));
    }

    if request.status.eq_ignore_ascii_case("success") {
        complete(state, payment, now).await
    } else {
        let reason = request
            .error_message
            .unwrap_or_else(|| format!("Provider reported '{}'", request.status));
        fail(state, payment, request.error_code, reason, now).await
    }
}

pub async fn stats(state: &AppState, actor: &User) -> AppResult<PaymentStats> {
    let filter = PaymentFilter {
        organization_id: staff_scope(actor)?,
        ..Default::default()
    };
    let payments = state
        .store
        .payments
        .list(&filter, PageRequest::everything())
        .await?;

    let mut by_status: BTreeMap<String, i64> =
        PaymentStatus::iter().map(|status| (status.to_string(), 0)).collect();
    let mut completed_amount = Decimal::ZERO;
    let mut fees_amount = Decimal::ZERO;
    for payment in &payments.items {
        *by_status.entry(payment.status.to_string()).or_default() += 1;
        if payment.status == PaymentStatus::Completed {
            completed_amount += payment.amount;
            fees_amount += payment.fees;
        }
    }
    Ok(PaymentStats {
        total: payments.total,
        by_status,
        completed_amount,
        fees_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{OrganizationType, Region};
    use crate::store::Store;
    use chrono::Duration;

    struct Fixture {
        state: AppState,
        customer: User,
        provider: PaymentProvider,
        organization_id: Uuid,
    }

    async fn fixture(config: Config) -> Fixture {
        let state = AppState::new(config, Store::in_memory());
        let now = Utc::now();
        let root = User::new(
            "root@example.sn".into(),
            String::new(),
            "Root".into(),
            "Admin".into(),
            UserRole::SuperAdmin,
            now,
        );
        let provider = create_provider(
            &state,
            &root,
            ProviderPayload {
                name: Some("Wave".into()),
                provider_type: Some(ProviderType::Wave),
                transaction_fee_fixed: Some(Decimal::from(50)),
                transaction_fee_percent: Some(Decimal::ONE),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();

        let organization = crate::domain::organizations::create(
            &state,
            &root,
            crate::domain::organizations::OrganizationPayload {
                name: Some("Senelec".into()),
                org_type: Some(OrganizationType::Government),
                region: Some(Region::Dakar),
                city: Some("Dakar".into()),
                phone_number: Some("+221338000000".into()),
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();

        let customer = User::new(
            "client@example.sn".into(),
            String::new(),
            "Ibrahima".into(),
            "Fall".into(),
            UserRole::Customer,
            now,
        );
        state.store.users.insert(&customer).await.unwrap();
        Fixture {
            state,
            customer,
            provider,
            organization_id: organization.id,
        }
    }

    fn request(f: &Fixture, amount: Option<i64>) -> InitiateRequest {
        InitiateRequest {
            provider_id: f.provider.id,
            organization_id: f.organization_id,
            amount: amount.map(Decimal::from),
            payment_type: PaymentType::ServiceFee,
            ticket_id: None,
            appointment_id: None,
            payer_phone: "+221771234567".into(),
            payer_name: "Ibrahima Fall".into(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_initiate_moves_to_processing() {
        let f = fixture(Config::for_tests()).await;
        let payment = initiate(&f.state, &f.customer, request(&f, Some(1000)), Utc::now())
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);
        assert_eq!(payment.fees, Decimal::from(60));
        assert_eq!(payment.total_amount, Decimal::from(1060));
        assert!(payment
            .external_reference
            .as_deref()
            .is_some_and(|r| r.starts_with("SIM-")));
    }

    #[tokio::test]
    async fn test_initiate_rejects_bad_amounts() {
        let f = fixture(Config::for_tests()).await;
        let missing = initiate(&f.state, &f.customer, request(&f, None), Utc::now()).await;
        assert!(matches!(missing, Err(AppError::ValidationError(msg)) if msg.contains("amount")));
        let too_small = initiate(&f.state, &f.customer, request(&f, Some(50)), Utc::now()).await;
        assert!(too_small.is_err());
    }

    #[tokio::test]
    async fn test_callback_is_idempotent() {
        let f = fixture(Config::for_tests()).await;
        let payment = initiate(&f.state, &f.customer, request(&f, Some(500)), Utc::now())
            .await
            .unwrap();
        let success = || CallbackRequest {
            reference: payment.payment_number.clone(),
            status: "success".into(),
            error_code: None,
            error_message: None,
        };

        let wrong = callback(&f.state, ProviderType::OrangeMoney, success(), Utc::now()).await;
        assert!(wrong.is_err());

        let done = callback(&f.state, ProviderType::Wave, success(), Utc::now())
            .await
            .unwrap();
        assert_eq!(done.status, PaymentStatus::Completed);
        let again = callback(&f.state, ProviderType::Wave, success(), Utc::now())
            .await
            .unwrap();
        assert_eq!(again.completed_at, done.completed_at);
    }

    #[tokio::test]
    async fn test_late_callback_expires_payment() {
        let f = fixture(Config::for_tests()).await;
        let now = Utc::now();
        let payment = initiate(&f.state, &f.customer, request(&f, Some(500)), now)
            .await
            .unwrap();
        let late = CallbackRequest {
            reference: payment.payment_number.clone(),
            status: "success".into(),
            error_code: None,
            error_message: None,
        };
        let err = callback(&f.state, ProviderType::Wave, late, now + Duration::hours(25))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(ref msg) if msg.contains("expired")));

        let stored = get_payment(&f.state, payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Expired);
        assert!(stored.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_simulation_can_be_disabled() {
        let mut config = Config::for_tests();
        config.payment_simulation_enabled = false;
        let f = fixture(config).await;
        let payment = initiate(&f.state, &f.customer, request(&f, Some(500)), Utc::now())
            .await
            .unwrap();
        assert!(matches!(
            simulate_success(&f.state, &f.customer, payment.id, Utc::now()).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_status_expires_stale_payment() {
        let f = fixture(Config::for_tests()).await;
        let now = Utc::now();
        let payment = initiate(&f.state, &f.customer, request(&f, Some(500)), now)
            .await
            .unwrap();
        let later = now + Duration::hours(25);
        let expired = status(&f.state, &f.customer, payment.id, later).await.unwrap();
        assert_eq!(expired.status, PaymentStatus::Expired);
        assert!(cancel(&f.state, &f.customer, payment.id, later).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_then_stats() {
        let f = fixture(Config::for_tests()).await;
        let now = Utc::now();
        let first = initiate(&f.state, &f.customer, request(&f, Some(1000)), now)
            .await
            .unwrap();
        let second = initiate(&f.state, &f.customer, request(&f, Some(2000)), now)
            .await
            .unwrap();
        simulate_success(&f.state, &f.customer, first.id, now).await.unwrap();
        let failed = simulate_failure(&f.state, &f.customer, second.id, now)
            .await
            .unwrap();
        assert_eq!(failed.error_code.as_deref(), Some("SIMULATED_FAILURE"));

        let mut staff = f.customer.clone();
        staff.id = Uuid::new_v4();
        staff.role = UserRole::Staff;
        staff.organization_id = Some(f.organization_id);
        let stats = stats(&f.state, &staff).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status["completed"], 1);
        assert_eq!(stats.by_status["failed"], 1);
        assert_eq!(stats.completed_amount, Decimal::from(1000));
        assert_eq!(stats.fees_amount, Decimal::from(60));
    }
}
