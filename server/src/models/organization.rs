use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::Language;

const EARTH_RADIUS_KM: f64 = 6371.0;

db_enum! {
    pub enum OrganizationType as "organization_type" {
        Bank,
        Hospital,
        Government,
        Telecom,
        Insurance,
        Business,
        Education,
        Retail,
        Other,
    }
}

db_enum! {
    pub enum Region as "region" {
        Dakar,
        Thies,
        #[serde(rename = "saint-louis")]
        #[sqlx(rename = "saint-louis")]
        #[strum(to_string = "saint-louis")]
        SaintLouis,
        Diourbel,
        Louga,
        Fatick,
        Kaolack,
        Kaffrine,
        Tambacounda,
        Kedougou,
        Kolda,
        Sedhiou,
        Ziguinchor,
        Matam,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum SubscriptionPlan as "subscription_plan" {
        #[default]
        Starter,
        Business,
        Enterprise,
        Custom,
    }
}

db_enum! {
    #[derive(Default)]
    pub enum OrganizationStatus as "organization_status" {
        Active,
        Inactive,
        Suspended,
        #[default]
        Trial,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub trade_name: String,
    pub org_type: OrganizationType,
    pub description: String,
    pub registration_number: String,
    pub phone_number: String,
    pub email: String,
    pub website: String,
    pub address: String,
    pub city: String,
    pub region: Region,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub subscription_plan: SubscriptionPlan,
    pub status: OrganizationStatus,
    pub max_counters: i32,
    pub max_staff_users: i32,
    pub timezone: String,
    pub default_language: Language,
    pub opening_hours: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Great-circle distance in kilometres, when coordinates are known.
    pub fn distance_to(&self, latitude: f64, longitude: f64) -> Option<f64> {
        self.coordinates()
            .map(|(lat, lon)| haversine_km(lat, lon, latitude, longitude))
    }

    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.name, &self.trade_name, &self.city]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_KM
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_dakar_to_thies() {
        // Dakar Plateau to Thies centre is roughly 57 km as the crow flies.
        let d = haversine_km(14.6697, -17.4381, 14.7910, -16.9359);
        assert!((d - 56.0).abs() < 3.0, "got {d}");
    }

    #[test]
    fn test_haversine_same_point_is_zero() {
        assert!(haversine_km(14.7, -17.4, 14.7, -17.4).abs() < 1e-9);
    }
}
