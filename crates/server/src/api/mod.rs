use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, StatusCode,
    },
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use shared::{
    domain::{AppointmentAction, AppointmentId, BarberId},
    error::ApiError,
    protocol::{
        Appointment, AppointmentActionRequest, AppointmentStatusResponse, AuthResponse,
        BarberProfile, BarberQuery, BarberStats, CreateAppointmentRequest, CreateReviewRequest,
        LoginRequest, RegisterRequest, Review, ReviewQuery, ServerEvent, UserProfile,
    },
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};
use tracing::error;

use crate::app_state::AppState;

mod extract;
mod ws;

pub(crate) use extract::Caller;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub(crate) type HttpError = (StatusCode, Json<ApiError>);

pub(crate) fn http_error(err: ApiError) -> HttpError {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(err))
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/auth/register/", post(register))
        .route("/auth/login/", post(login))
        .route("/auth/profile/", get(profile))
        .route("/barbers/", get(list_barbers))
        .route("/barbers/stats/", get(barber_stats))
        .route("/barbers/:barber_id/", get(get_barber))
        .route(
            "/appointments/",
            get(list_appointments).post(create_appointment),
        )
        .route("/appointments/barber/", get(barber_appointments))
        .route("/appointments/customer/", get(customer_appointments))
        .route(
            "/appointments/:appointment_id/",
            patch(update_appointment).delete(cancel_appointment),
        )
        .route(
            "/appointments/:appointment_id/accept/",
            patch(accept_appointment),
        )
        .route(
            "/appointments/:appointment_id/reject/",
            patch(reject_appointment),
        )
        .route("/reviews/", get(list_reviews).post(create_review))
        .route("/reviews/barber_reviews/", get(barber_reviews));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), HttpError> {
    let response = server_api::register(&state.api, req)
        .await
        .map_err(http_error)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, HttpError> {
    server_api::login(&state.api, req)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn profile(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<UserProfile>, HttpError> {
    server_api::profile(&state.api, &caller)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn list_barbers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BarberQuery>,
) -> Result<Json<Vec<BarberProfile>>, HttpError> {
    server_api::list_barbers(&state.api, &query)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn get_barber(
    State(state): State<Arc<AppState>>,
    Path(barber_id): Path<i64>,
) -> Result<Json<BarberProfile>, HttpError> {
    server_api::get_barber(&state.api, BarberId(barber_id))
        .await
        .map(Json)
        .map_err(http_error)
}

async fn barber_stats(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<BarberStats>, HttpError> {
    server_api::barber_stats(&state.api, &caller, today())
        .await
        .map(Json)
        .map_err(http_error)
}

async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(req): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), HttpError> {
    let appointment = server_api::create_appointment(&state.api, &caller, req, today())
        .await
        .map_err(http_error)?;
    state.publish(ServerEvent::AppointmentBooked {
        appointment: appointment.clone(),
    });
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Appointment>>, HttpError> {
    server_api::list_appointments(&state.api, &caller)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn barber_appointments(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Appointment>>, HttpError> {
    server_api::list_barber_appointments(&state.api, &caller)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn customer_appointments(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<Appointment>>, HttpError> {
    server_api::list_customer_appointments(&state.api, &caller)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(appointment_id): Path<i64>,
    Json(req): Json<AppointmentActionRequest>,
) -> Result<Json<AppointmentStatusResponse>, HttpError> {
    apply_action(&state, caller, appointment_id, req.action).await
}

async fn accept_appointment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(appointment_id): Path<i64>,
) -> Result<Json<AppointmentStatusResponse>, HttpError> {
    apply_action(&state, caller, appointment_id, AppointmentAction::Accept).await
}

async fn reject_appointment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(appointment_id): Path<i64>,
) -> Result<Json<AppointmentStatusResponse>, HttpError> {
    apply_action(&state, caller, appointment_id, AppointmentAction::Reject).await
}

async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(appointment_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    apply_action(&state, caller, appointment_id, AppointmentAction::Cancel).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_action(
    state: &AppState,
    caller: server_api::auth::AuthenticatedUser,
    appointment_id: i64,
    action: AppointmentAction,
) -> Result<Json<AppointmentStatusResponse>, HttpError> {
    let appointment = server_api::act_on_appointment(
        &state.api,
        &caller,
        AppointmentId(appointment_id),
        action,
    )
    .await
    .map_err(http_error)?;
    state.publish(ServerEvent::AppointmentStatusChanged {
        appointment_id: appointment.appointment_id,
        barber_user_id: appointment.barber.user_id,
        customer_id: appointment.customer.user_id,
        status: appointment.status,
    });
    Ok(Json(AppointmentStatusResponse {
        status: appointment.status,
    }))
}

async fn create_review(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), HttpError> {
    let review = server_api::create_review(&state.api, &caller, req)
        .await
        .map_err(http_error)?;
    if let Ok(barber) = server_api::get_barber(&state.api, review.barber_id).await {
        state.publish(ServerEvent::ReviewPosted {
            barber_user_id: barber.user.user_id,
            review: review.clone(),
        });
    }
    Ok((StatusCode::CREATED, Json(review)))
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Caller(_caller): Caller,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<Vec<Review>>, HttpError> {
    server_api::list_reviews(&state.api, query.barber)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn barber_reviews(
    State(state): State<Arc<AppState>>,
    Caller(_caller): Caller,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<Vec<Review>>, HttpError> {
    server_api::barber_reviews(&state.api, query.barber)
        .await
        .map(Json)
        .map_err(http_error)
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
