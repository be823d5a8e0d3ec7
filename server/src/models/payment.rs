use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "XOF";
pub const PAYMENT_VALIDITY_HOURS: i64 = 24;

db_enum! {
    pub enum ProviderType as "provider_type" {
        Wave,
        OrangeMoney,
        FreeMoney,
        Wizall,
        Wari,
        Postefinance,
        BankTransfer,
        Cash,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum PaymentStatus as "payment_status" {
        #[default]
        Pending,
        Processing,
        Completed,
        Failed,
        Cancelled,
        Refunded,
        Expired,
    }
}

impl PaymentStatus {
    pub const OPEN: [PaymentStatus; 2] = [PaymentStatus::Pending, PaymentStatus::Processing];

    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }
}

db_enum! {
    pub enum PaymentType as "payment_type" {
        TicketFee,
        AppointmentFee,
        ServiceFee,
        PenaltyFee,
        SubscriptionFee,
        Other,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentProvider {
    pub id: Uuid,
    pub name: String,
    pub provider_type: ProviderType,
    pub supported_currency: String,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub transaction_fee_fixed: Decimal,
    pub transaction_fee_percent: Decimal,
    pub is_default: bool,
    pub priority: i32,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentProvider {
    pub fn new(name: String, provider_type: ProviderType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            provider_type,
            supported_currency: DEFAULT_CURRENCY.to_string(),
            min_amount: Decimal::from(100),
            max_amount: Decimal::from(1_000_000),
            transaction_fee_fixed: Decimal::ZERO,
            transaction_fee_percent: Decimal::ZERO,
            is_default: false,
            priority: 0,
            is_active: true,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn fees(&self, amount: Decimal) -> Decimal {
        (self.transaction_fee_fixed + amount * self.transaction_fee_percent / Decimal::ONE_HUNDRED)
            .round_dp(2)
    }

    pub fn accepts(&self, amount: Decimal) -> bool {
        self.min_amount <= amount && amount <= self.max_amount
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub payment_number: String,
    pub external_reference: Option<String>,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub organization_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub fees: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub payer_phone: String,
    pub payer_name: String,
    pub description: String,
    pub status: PaymentStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.expires_at < now
    }
}

pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(PAYMENT_VALIDITY_HOURS)
}

/// `PAY` + `YYYYMMDDHHMMSS` + four random digits.
pub fn generate_payment_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("PAY{}{suffix:04}", now.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_fees_round_to_two_decimals() {
        let mut provider = PaymentProvider::new("Wave".into(), ProviderType::Wave, Utc::now());
        provider.transaction_fee_fixed = Decimal::from(50);
        provider.transaction_fee_percent = Decimal::from_str("1.5").unwrap();
        assert_eq!(
            provider.fees(Decimal::from_str("1333").unwrap()),
            Decimal::from_str("69.995").unwrap().round_dp(2)
        );
        assert_eq!(provider.fees(Decimal::from(1000)), Decimal::from(65));
    }

    #[test]
    fn test_amount_limits() {
        let provider = PaymentProvider::new("Cash".into(), ProviderType::Cash, Utc::now());
        assert!(!provider.accepts(Decimal::from(99)));
        assert!(provider.accepts(Decimal::from(100)));
        assert!(provider.accepts(Decimal::from(1_000_000)));
        assert!(!provider.accepts(Decimal::from(1_000_001)));
    }

    #[test]
    fn test_payment_number_shape() {
        let number = generate_payment_number(Utc::now());
        assert!(number.starts_with("PAY"));
        assert_eq!(number.len(), 3 + 14 + 4);
        assert!(number[3..].chars().all(|c| c.is_ascii_digit()));
    }
}
