use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{AppointmentAction, AppointmentId, AppointmentStatus, BarberId},
    error::ApiError,
    protocol::{
        Appointment, AppointmentActionRequest, AppointmentStatusResponse, AuthResponse,
        BarberProfile, BarberQuery, BarberStats, CreateAppointmentRequest, CreateReviewRequest,
        LoginRequest, RegisterRequest, Review, ReviewQuery, ServerEvent, UserProfile,
    },
};
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

pub mod error;
pub mod routes;
pub mod session;
pub mod slots;

pub use error::ClientError;
pub use routes::{dashboard_for, guard, AppRoute, RouteDecision};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};
pub use slots::{default_time_slots, generate_time_slots, TimeSlot};

use error::code_for_status;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const API_URL_ENV: &str = "BARBERCONNECT_API_URL";

/// API base URL from `BARBERCONNECT_API_URL`, or the local development default.
pub fn api_url_from_env() -> String {
    std::env::var(API_URL_ENV)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

#[async_trait]
pub trait BookingApi: Send + Sync {
    fn session(&self) -> Result<Option<Session>, ClientError>;
    fn remembered_email(&self) -> Result<Option<String>, ClientError>;
    fn logout(&self) -> Result<(), ClientError>;

    async fn register(&self, request: &RegisterRequest) -> Result<Session, ClientError>;
    async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, ClientError>;
    async fn profile(&self) -> Result<UserProfile, ClientError>;

    async fn list_barbers(&self, query: &BarberQuery) -> Result<Vec<BarberProfile>, ClientError>;
    async fn get_barber(&self, barber_id: BarberId) -> Result<BarberProfile, ClientError>;
    async fn barber_stats(&self) -> Result<BarberStats, ClientError>;

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, ClientError>;
    async fn list_appointments(&self) -> Result<Vec<Appointment>, ClientError>;
    async fn barber_appointments(&self) -> Result<Vec<Appointment>, ClientError>;
    async fn customer_appointments(&self) -> Result<Vec<Appointment>, ClientError>;
    async fn act_on_appointment(
        &self,
        appointment_id: AppointmentId,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, ClientError>;
    async fn accept_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentStatus, ClientError>;
    async fn reject_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentStatus, ClientError>;
    async fn cancel_appointment(&self, appointment_id: AppointmentId) -> Result<(), ClientError>;

    async fn create_review(&self, request: &CreateReviewRequest) -> Result<Review, ClientError>;
    async fn list_reviews(&self, barber: Option<BarberId>) -> Result<Vec<Review>, ClientError>;
    async fn barber_reviews(&self, barber_id: BarberId) -> Result<Vec<Review>, ClientError>;

    async fn subscribe_notifications(
        &self,
    ) -> Result<broadcast::Receiver<ServerEvent>, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    /// Never attach a token (login, registration).
    Skip,
    /// Attach the stored token when there is one.
    Optional,
    /// Fail with `NotLoggedIn` before sending when there is no session.
    Required,
}

pub struct BookingClient {
    http: Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
}

impl BookingClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn from_env(store: Arc<dyn SessionStore>) -> Self {
        Self::new(api_url_from_env(), store)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn require_session(&self) -> Result<Session, ClientError> {
        self.store.load()?.ok_or(ClientError::NotLoggedIn)
    }

    async fn execute(&self, request: RequestBuilder, auth: Auth) -> Result<Response, ClientError> {
        let session = match auth {
            Auth::Skip => None,
            Auth::Optional => self.store.load()?,
            Auth::Required => Some(self.require_session()?),
        };
        let request = match &session {
            Some(session) => request.bearer_auth(&session.token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED && session.is_some() {
            warn!("server rejected the stored token; clearing session");
            self.store.clear()?;
            return Err(ClientError::SessionExpired);
        }

        let body = response.text().await.unwrap_or_default();
        let err = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            };
            ApiError::new(code_for_status(status.as_u16()), message)
        });
        debug!(status = status.as_u16(), code = err.code.as_str(), "request failed");
        Err(ClientError::Api(err))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        auth: Auth,
    ) -> Result<T, ClientError> {
        Ok(self.execute(request, auth).await?.json().await?)
    }

    fn store_session(&self, auth: AuthResponse) -> Result<Session, ClientError> {
        let session = Session {
            token: auth.token,
            user_type: auth.user_type,
        };
        self.store.save(&session)?;
        info!(user_type = %session.user_type, "session stored");
        Ok(session)
    }

    async fn patch_status(&self, path: String) -> Result<AppointmentStatus, ClientError> {
        let response: AppointmentStatusResponse = self
            .send_json(self.http.patch(self.url(&path)), Auth::Required)
            .await?;
        Ok(response.status)
    }
}

#[async_trait]
impl BookingApi for BookingClient {
    fn session(&self) -> Result<Option<Session>, ClientError> {
        self.store.load()
    }

    fn remembered_email(&self) -> Result<Option<String>, ClientError> {
        self.store.remembered_email()
    }

    fn logout(&self) -> Result<(), ClientError> {
        self.store.clear()
    }

    async fn register(&self, request: &RegisterRequest) -> Result<Session, ClientError> {
        let auth: AuthResponse = self
            .send_json(
                self.http.post(self.url("/auth/register/")).json(request),
                Auth::Skip,
            )
            .await?;
        self.store_session(auth)
    }

    async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Session, ClientError> {
        let auth: AuthResponse = self
            .send_json(
                self.http
                    .post(self.url("/auth/login/"))
                    .json(&LoginRequest {
                        email: email.to_string(),
                        password: password.to_string(),
                    }),
                Auth::Skip,
            )
            .await?;
        if remember_me {
            self.store.remember_email(email)?;
        }
        self.store_session(auth)
    }

    async fn profile(&self) -> Result<UserProfile, ClientError> {
        self.send_json(self.http.get(self.url("/auth/profile/")), Auth::Required)
            .await
    }

    async fn list_barbers(&self, query: &BarberQuery) -> Result<Vec<BarberProfile>, ClientError> {
        self.send_json(
            self.http.get(self.url("/barbers/")).query(query),
            Auth::Optional,
        )
        .await
    }

    async fn get_barber(&self, barber_id: BarberId) -> Result<BarberProfile, ClientError> {
        self.send_json(
            self.http.get(self.url(&format!("/barbers/{}/", barber_id.0))),
            Auth::Optional,
        )
        .await
    }

    async fn barber_stats(&self) -> Result<BarberStats, ClientError> {
        self.send_json(self.http.get(self.url("/barbers/stats/")), Auth::Required)
            .await
    }

    async fn create_appointment(
        &self,
        request: &CreateAppointmentRequest,
    ) -> Result<Appointment, ClientError> {
        self.send_json(
            self.http.post(self.url("/appointments/")).json(request),
            Auth::Required,
        )
        .await
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, ClientError> {
        self.send_json(self.http.get(self.url("/appointments/")), Auth::Required)
            .await
    }

    async fn barber_appointments(&self) -> Result<Vec<Appointment>, ClientError> {
        self.send_json(
            self.http.get(self.url("/appointments/barber/")),
            Auth::Required,
        )
        .await
    }

    async fn customer_appointments(&self) -> Result<Vec<Appointment>, ClientError> {
        self.send_json(
            self.http.get(self.url("/appointments/customer/")),
            Auth::Required,
        )
        .await
    }

    async fn act_on_appointment(
        &self,
        appointment_id: AppointmentId,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, ClientError> {
        let response: AppointmentStatusResponse = self
            .send_json(
                self.http
                    .patch(self.url(&format!("/appointments/{}/", appointment_id.0)))
                    .json(&AppointmentActionRequest { action }),
                Auth::Required,
            )
            .await?;
        Ok(response.status)
    }

    async fn accept_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentStatus, ClientError> {
        self.patch_status(format!("/appointments/{}/accept/", appointment_id.0))
            .await
    }

    async fn reject_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<AppointmentStatus, ClientError> {
        self.patch_status(format!("/appointments/{}/reject/", appointment_id.0))
            .await
    }

    async fn cancel_appointment(&self, appointment_id: AppointmentId) -> Result<(), ClientError> {
        self.execute(
            self.http
                .delete(self.url(&format!("/appointments/{}/", appointment_id.0))),
            Auth::Required,
        )
        .await?;
        Ok(())
    }

    async fn create_review(&self, request: &CreateReviewRequest) -> Result<Review, ClientError> {
        self.send_json(
            self.http.post(self.url("/reviews/")).json(request),
            Auth::Required,
        )
        .await
    }

    async fn list_reviews(&self, barber: Option<BarberId>) -> Result<Vec<Review>, ClientError> {
        let query = ReviewQuery {
            barber: barber.map(|id| id.0),
        };
        self.send_json(
            self.http.get(self.url("/reviews/")).query(&query),
            Auth::Required,
        )
        .await
    }

    async fn barber_reviews(&self, barber_id: BarberId) -> Result<Vec<Review>, ClientError> {
        let query = ReviewQuery {
            barber: Some(barber_id.0),
        };
        self.send_json(
            self.http
                .get(self.url("/reviews/barber_reviews/"))
                .query(&query),
            Auth::Required,
        )
        .await
    }

    async fn subscribe_notifications(
        &self,
    ) -> Result<broadcast::Receiver<ServerEvent>, ClientError> {
        let session = self.require_session()?;
        let ws_url = notification_url(&self.base_url, &session.token)?;
        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (_, mut ws_reader) = ws_stream.split();
        let (events, receiver) = broadcast::channel(64);

        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(%err, "ignoring malformed notification"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "notification feed dropped");
                        break;
                    }
                }
            }
        });

        Ok(receiver)
    }
}

/// `ws(s)://host[:port]/ws?token=...` derived from the REST base URL.
pub(crate) fn notification_url(base_url: &str, token: &str) -> Result<Url, ClientError> {
    let mut url =
        Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;
    let root = url
        .path()
        .trim_end_matches('/')
        .trim_end_matches("/api")
        .to_string();
    url.set_path(&format!("{root}/ws"));
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
