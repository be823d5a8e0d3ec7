use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CustomerSatisfaction {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub organization_id: Uuid,
    pub service_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    /// 1 to 5.
    pub rating: i16,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SatisfactionStats {
    pub average: Option<f64>,
    pub count: usize,
    /// Ratings 1 to 5, index 0 holds the number of 1-star ratings.
    pub distribution: [usize; 5],
}

impl SatisfactionStats {
    pub fn from_ratings<'a>(ratings: impl IntoIterator<Item = &'a CustomerSatisfaction>) -> Self {
        let mut distribution = [0usize; 5];
        let mut sum = 0i64;
        let mut count = 0usize;
        for rating in ratings {
            if let Some(slot) = usize::try_from(rating.rating - 1)
                .ok()
                .and_then(|i| distribution.get_mut(i))
            {
                *slot += 1;
            }
            sum += i64::from(rating.rating);
            count += 1;
        }
        let average = (count > 0).then(|| ((sum as f64 / count as f64) * 10.0).round() / 10.0);
        Self {
            average,
            count,
            distribution,
        }
    }
}
