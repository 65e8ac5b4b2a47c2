use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AppointmentAction, AppointmentId, AppointmentStatus, Availability, BarberId, GeoPoint,
    ReviewId, ServiceOffering, UserId, UserSummary, UserType,
};

/// Wall-clock times travel as `H:MM`; `HH:MM:SS` is accepted on input.
pub mod wall_clock {
    use chrono::NaiveTime;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%-H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid time '{raw}'")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_password: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub user_type: UserType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceOffering>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_type: UserType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: UserSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barber_id: Option<BarberId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarberProfile {
    pub barber_id: BarberId,
    pub user: UserSummary,
    pub shop_name: String,
    pub address: String,
    pub services: Vec<ServiceOffering>,
    pub availability: Availability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub avg_rating: f64,
    pub review_count: i64,
}

impl BarberProfile {
    pub fn service(&self, name: &str) -> Option<&ServiceOffering> {
        self.services
            .iter()
            .find(|service| service.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarberQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

impl BarberQuery {
    pub fn near(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BarberStats {
    pub total_appointments: i64,
    pub upcoming_appointments: i64,
    pub earnings: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub barber: BarberId,
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub time: NaiveTime,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentActionRequest {
    pub action: AppointmentAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentStatusResponse {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentBarber {
    pub barber_id: BarberId,
    pub user_id: UserId,
    pub shop_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: AppointmentId,
    pub customer: UserSummary,
    pub barber: AppointmentBarber,
    pub date: NaiveDate,
    #[serde(with = "wall_clock")]
    pub time: NaiveTime,
    pub service: String,
    pub price: i64,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReviewRequest {
    pub barber: BarberId,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub review_id: ReviewId,
    pub barber_id: BarberId,
    pub customer: UserSummary,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barber: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        appointment_id: AppointmentId,
        barber_user_id: UserId,
        customer_id: UserId,
        status: AppointmentStatus,
    },
    ReviewPosted {
        barber_user_id: UserId,
        review: Review,
    },
}

impl ServerEvent {
    /// Whether the event concerns `user_id` as customer or barber.
    pub fn concerns(&self, user_id: UserId) -> bool {
        match self {
            ServerEvent::AppointmentBooked { appointment } => {
                appointment.customer.user_id == user_id || appointment.barber.user_id == user_id
            }
            ServerEvent::AppointmentStatusChanged {
                barber_user_id,
                customer_id,
                ..
            } => *barber_user_id == user_id || *customer_id == user_id,
            ServerEvent::ReviewPosted { barber_user_id, .. } => *barber_user_id == user_id,
        }
    }
}
