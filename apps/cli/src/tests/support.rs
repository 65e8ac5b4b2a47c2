use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use client_core::{BookingApi, ClientError, Session};
use shared::{
    domain::{
        AppointmentAction, AppointmentId, AppointmentStatus, Availability, BarberId, ReviewId,
        ServiceOffering, UserId, UserSummary, UserType,
    },
    error::ApiError,
    protocol::{
        Appointment, AppointmentBarber, BarberProfile, BarberQuery, BarberStats,
        CreateAppointmentRequest, CreateReviewRequest, RegisterRequest, Review, ServerEvent,
        UserProfile,
    },
};
use tokio::sync::broadcast;

pub(crate) fn customer(user_id: i64) -> UserSummary {
    UserSummary {
        user_id: UserId(user_id),
        email: "sara@example.com".into(),
        first_name: "Sara".into(),
        last_name: "Ahmed".into(),
        phone: String::new(),
        user_type: UserType::Customer,
    }
}

pub(crate) fn sample_barber() -> BarberProfile {
    BarberProfile {
        barber_id: BarberId(1),
        user: UserSummary {
            user_id: UserId(10),
            email: "fade@example.com".into(),
            first_name: "Bilal".into(),
            last_name: "Khan".into(),
            phone: String::new(),
            user_type: UserType::Barber,
        },
        shop_name: "Fade Factory".into(),
        address: "MM Alam Road".into(),
        services: vec![ServiceOffering {
            name: "Haircut".into(),
            price: 800,
        }],
        availability: Availability::default(),
        location: None,
        image: None,
        avg_rating: 4.5,
        review_count: 2,
    }
}

pub(crate) fn sample_appointment(id: i64, status: AppointmentStatus) -> Appointment {
    Appointment {
        appointment_id: AppointmentId(id),
        customer: customer(3),
        barber: AppointmentBarber {
            barber_id: BarberId(1),
            user_id: UserId(10),
            shop_name: "Fade Factory".into(),
        },
        date: NaiveDate::from_ymd_opt(2030, 6, 1).expect("date"),
        time: NaiveTime::from_hms_opt(10, 30, 0).expect("time"),
        service: "Haircut".into(),
        price: 800,
        status,
        created_at: Utc::now(),
    }
}

pub(crate) fn session(user_type: UserType) -> Session {
    Session {
        token: "tok".into(),
        user_type,
    }
}

/// In-memory stand-in for the REST client.
pub(crate) struct FakeApi {
    pub(crate) session: Mutex<Option<Session>>,
    pub(crate) barbers: Vec<BarberProfile>,
    pub(crate) appointments: Vec<Appointment>,
    pub(crate) reviews: Vec<Review>,
    pub(crate) stats: BarberStats,
    pub(crate) booked: Mutex<Vec<CreateAppointmentRequest>>,
    pub(crate) actions: Mutex<Vec<(AppointmentId, AppointmentAction)>>,
    pub(crate) reject_bookings_with: Option<ApiError>,
}

impl FakeApi {
    pub(crate) fn new(session: Option<Session>) -> Self {
        Self {
            session: Mutex::new(session),
            barbers: vec![sample_barber()],
            appointments: Vec::new(),
            reviews: Vec::new(),
            stats: BarberStats::default(),
            booked: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            reject_bookings_with: None,
        }
    }

    fn record(&self, appointment_id: AppointmentId, action: AppointmentAction) {
        self.actions
            .lock()
            .expect("lock")
            .push((appointment_id, action));
    }
}

#[async_trait]
impl BookingApi for FakeApi {
    fn session(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.session.lock().expect("lock").clone())
    }

    fn remembered_email(&self) -> Result<Option<String>, ClientError> {
        Ok(Some("sara@example.com".into()))
    }

    fn logout(&self) -> Result<(), ClientError> {
        *self.session.lock().expect("lock") = None;
        Ok(())
    }

    async fn register(&self, request: &RegisterRequest) -> Result<Session, ClientError> {
        let session = session(request.user_type);
        *self.session.lock().expect("lock") = Some(session.clone());
        Ok(session)
    }

    async fn login(
        &self,
        _email: &str,
        password: &str,
        _remember_me: bool,
    ) -> Result<Session, ClientError> {
        if password != "pass1234" {
            return Err(ClientError::Api(ApiError::unauthorized(
                "invalid email or password",
            )));
        }
        let session = session(UserType::Customer);
        *self.session.lock().expect("lock") = Some(session.clone());
        Ok(session)
    }

    async fn profile(&self) -> Result<UserProfile, ClientError> {
        Ok(UserProfile {
            user: customer(3),
            barber_id: None,
        })
    }

    async fn list_barbers(&self, query: &BarberQuery) -> Result<Vec<BarberProfile>, ClientError> {
        let term = query.search.as_deref().unwrap_or_default().to_lowercase();
        Ok(self
            .barbers
            .iter()
            .filter(|b| term.is_empty() || b.shop_name.to_lowercase().contains(&term))
            .cloned()
            .collect())
    }

    async fn get_barber(&self, barber_id: BarberId) -> Result<BarberProfile, ClientError> {
        self.barbers
            .iter()
            .find(|b| b.barber_id == barber_id)
            .cloned()
            .ok_or_else(|| ClientError::Api(ApiError::not_found("barber not found")))
    }

    async fn barber_stats(&self) -> Result<BarberStats, ClientError> {
        Ok(self.stats)
    }

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, ClientError> {
        if let Some(err) = &self.reject_bookings_with {
            return Err(ClientError::Api(err.clone()));
        }
        self.booked.lock().expect("lock").push(request.clone());
        let mut appointment = sample_appointment(42, AppointmentStatus::Pending);
        appointment.date = request.date;
        appointment.time = request.time;
        Ok(appointment)
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, ClientError> {
        Ok(self.appointments.clone())
    }

    async fn barber_appointments(&self) -> Result<Vec<Appointment>, ClientError> {
        Ok(self.appointments.clone())
    }

    async fn customer_appointments(&self) -> Result<Vec<Appointment>, ClientError> {
        Ok(self.appointments.clone())
    }

    async fn act_on_appointment(
        &self,
        appointment_id: AppointmentId,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, ClientError> {
        self.record(appointment_id, action);
        AppointmentStatus::Confirmed
            .apply(action)
            .ok_or_else(|| ClientError::Api(ApiError::validation("Invalid action")))
    }

    async fn accept_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentStatus, ClientError> {
        self.record(appointment_id, AppointmentAction::Accept);
        Ok(AppointmentStatus::Confirmed)
    }

    async fn reject_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentStatus, ClientError> {
        self.record(appointment_id, AppointmentAction::Reject);
        Ok(AppointmentStatus::Rejected)
    }

    async fn cancel_appointment(&self, appointment_id: AppointmentId) -> Result<(), ClientError> {
        self.record(appointment_id, AppointmentAction::Cancel);
        Ok(())
    }

    async fn create_review(&self, request: &CreateReviewRequest) -> Result<Review, ClientError> {
        Ok(Review {
            review_id: ReviewId(1),
            barber_id: request.barber,
            customer: customer(3),
            rating: request.rating,
            comment: request.comment.clone(),
            created_at: Utc::now(),
        })
    }

    async fn list_reviews(&self, _barber: Option<BarberId>) -> Result<Vec<Review>, ClientError> {
        Ok(self.reviews.clone())
    }

    async fn barber_reviews(&self, _barber_id: BarberId) -> Result<Vec<Review>, ClientError> {
        Ok(self.reviews.clone())
    }

    async fn subscribe_notifications(
        &self,
    ) -> Result<broadcast::Receiver<ServerEvent>, ClientError> {
        let (events, receiver) = broadcast::channel(8);
        let _ = events.send(ServerEvent::AppointmentStatusChanged {
            appointment_id: AppointmentId(42),
            barber_user_id: UserId(10),
            customer_id: UserId(3),
            status: AppointmentStatus::Confirmed,
        });
        Ok(receiver)
    }
}
