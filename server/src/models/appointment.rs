use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

db_enum! {
    #[derive(Default)]
    pub enum AppointmentStatus as "appointment_status" {
        #[default]
        Pending,
        Confirmed,
        Cancelled,
        Rescheduled,
        CheckedIn,
        InProgress,
        Completed,
        NoShow,
    }
}

impl AppointmentStatus {
    /// Statuses that occupy a place on the slot.
    pub const BOOKED: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::CheckedIn,
        AppointmentStatus::InProgress,
    ];

    pub fn holds_capacity(self) -> bool {
        Self::BOOKED.contains(&self)
    }

    /// Cancel and reschedule are only possible before the customer shows up.
    pub fn is_changeable(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

db_enum! {
    #[derive(Default)]
    pub enum AppointmentPriority as "appointment_priority" {
        Low,
        #[default]
        Medium,
        High,
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentSlot {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub service_id: Uuid,
    /// 0 is Monday, 6 is Sunday.
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Minutes between two bookable times.
    pub slot_duration: i32,
    pub max_appointments: i32,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AvailableTime {
    pub time: NaiveTime,
    pub available_spots: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    pub slot_id: Uuid,
    pub service_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub times: Vec<AvailableTime>,
}

impl AppointmentSlot {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        i16::try_from(date.weekday().num_days_from_monday()).ok() == Some(self.day_of_week)
    }

    /// Every bookable start time: start, start + d, ... while before the end.
    pub fn times(&self) -> Vec<NaiveTime> {
        let step = Duration::minutes(i64::from(self.slot_duration.max(1)));
        let mut times = Vec::new();
        let mut current = self.start_time;
        while current < self.end_time {
            times.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            current = next;
        }
        times
    }

    pub fn is_on_grid(&self, time: NaiveTime) -> bool {
        self.times().contains(&time)
    }

    /// Remaining capacity per time on `date`; full times are left out and a
    /// date on another weekday yields nothing.
    pub fn availability(
        &self,
        date: NaiveDate,
        booked_at: impl Fn(NaiveTime) -> i64,
    ) -> SlotAvailability {
        let times = if self.runs_on(date) {
            self.times()
                .into_iter()
                .filter_map(|time| {
                    let left = i64::from(self.max_appointments) - booked_at(time);
                    (left > 0).then(|| AvailableTime {
                        time,
                        available_spots: i32::try_from(left).unwrap_or(i32::MAX),
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        SlotAvailability {
            slot_id: self.id,
            service_id: self.service_id,
            date,
            start_time: self.start_time,
            end_time: self.end_time,
            times,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub appointment_number: String,
    pub customer_id: Uuid,
    pub slot_id: Uuid,
    pub organization_id: Uuid,
    pub service_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub status: AppointmentStatus,
    pub priority: AppointmentPriority,
    pub customer_notes: String,
    pub customer_phone: Option<String>,
    pub assigned_staff_id: Option<Uuid>,
    pub staff_notes: String,
    pub rescheduled_from: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        scheduled_instant(self.scheduled_date, self.scheduled_time)
    }

    pub fn append_staff_note(&mut self, note: &str) {
        if note.trim().is_empty() {
            return;
        }
        if !self.staff_notes.is_empty() {
            self.staff_notes.push('\n');
        }
        self.staff_notes.push_str(note.trim());
    }
}

pub fn scheduled_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(time))
}

/// `RDV` + month and day + the three digit sequence of that day.
pub fn format_appointment_number(date: NaiveDate, sequence: i32) -> String {
    format!("RDV{}{sequence:03}", date.format("%m%d"))
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentHistory {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub action: String,
    pub old_status: Option<AppointmentStatus>,
    pub new_status: AppointmentStatus,
    pub performed_by: Option<Uuid>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(start: (u32, u32), end: (u32, u32), duration: i32) -> AppointmentSlot {
        let now = Utc::now();
        AppointmentSlot {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            day_of_week: 0,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            slot_duration: duration,
            max_appointments: 2,
            is_active: true,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_grid_stops_before_end() {
        let s = slot((9, 0), (10, 15), 30);
        assert_eq!(s.times(), vec![hm(9, 0), hm(9, 30), hm(10, 0)]);
        assert!(s.is_on_grid(hm(9, 30)));
        assert!(!s.is_on_grid(hm(9, 15)));
    }

    #[test]
    fn test_grid_near_midnight_does_not_wrap() {
        let s = slot((23, 0), (23, 59), 45);
        assert_eq!(s.times(), vec![hm(23, 0), hm(23, 45)]);
    }

    #[test]
    fn test_availability_drops_full_times() {
        let s = slot((9, 0), (10, 0), 30);
        // 2024-01-01 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let avail = s.availability(monday, |t| if t == hm(9, 0) { 2 } else { 1 });
        assert_eq!(
            avail.times,
            vec![AvailableTime {
                time: hm(9, 30),
                available_spots: 1
            }]
        );

        let tuesday = monday.succ_opt().unwrap();
        assert!(s.availability(tuesday, |_| 0).times.is_empty());
    }

    #[test]
    fn test_appointment_number() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(format_appointment_number(date, 4), "RDV0307004");
    }

    #[test]
    fn test_capacity_statuses() {
        assert!(AppointmentStatus::CheckedIn.holds_capacity());
        assert!(!AppointmentStatus::Cancelled.holds_capacity());
        assert!(!AppointmentStatus::Completed.holds_capacity());
        assert!(AppointmentStatus::Confirmed.is_changeable());
        assert!(!AppointmentStatus::CheckedIn.is_changeable());
    }
}
