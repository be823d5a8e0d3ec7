use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

db_enum! {
    #[derive(Default)]
    pub enum UserRole as "user_role" {
        #[default]
        Customer,
        Staff,
        Admin,
        SuperAdmin,
    }
}

impl UserRole {
    /// Counter agents and everyone above them.
    pub fn is_staff(self) -> bool {
        matches!(self, UserRole::Staff | UserRole::Admin | UserRole::SuperAdmin)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

db_enum! {
    #[derive(Default)]
    pub enum Language as "user_language" {
        #[default]
        Fr,
        Wo,
        En,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub preferred_language: Language,
    pub role: UserRole,
    pub organization_id: Option<Uuid>,
    pub is_email_verified: bool,
    pub push_notifications_enabled: bool,
    pub email_notifications_enabled: bool,
    pub sms_notifications_enabled: bool,
    pub terms_accepted_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: String,
        password_hash: String,
        first_name: String,
        last_name: String,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            first_name,
            last_name,
            phone_number: None,
            preferred_language: Language::default(),
            role,
            organization_id: None,
            is_email_verified: false,
            push_notifications_enabled: true,
            email_notifications_enabled: true,
            sms_notifications_enabled: false,
            terms_accepted_at: None,
            last_login_at: None,
            is_active: true,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
