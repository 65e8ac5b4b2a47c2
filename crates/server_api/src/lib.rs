use chrono::{NaiveDate, NaiveTime, Timelike};
use shared::{
    domain::{AppointmentAction, AppointmentId, BarberId, UserType},
    error::{ApiError, ErrorCode},
    protocol::{
        Appointment, AuthResponse, BarberProfile, BarberQuery, BarberStats,
        CreateAppointmentRequest, CreateReviewRequest, LoginRequest, RegisterRequest, Review,
        UserProfile,
    },
};
use storage::{NewAppointment, NewBarber, NewUser, Storage};
use tracing::{info, warn};

pub mod auth;

use auth::{hash_password, mint_token, verify_password, AuthConfig, AuthenticatedUser};

/// Radius used by the "near me" barber filter.
pub const NEARBY_RADIUS_KM: f64 = 10.0;
const MAX_REVIEW_COMMENT_CHARS: usize = 2000;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
}

pub async fn register(ctx: &ApiContext, req: RegisterRequest) -> Result<AuthResponse, ApiError> {
    let email = req.email.trim();
    if !email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    if req.password.is_empty() {
        return Err(ApiError::validation("password is required"));
    }
    if let Some(confirm) = req.confirm_password.as_deref() {
        if confirm != req.password {
            return Err(ApiError::validation("passwords do not match"));
        }
    }
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(ApiError::validation("first and last name are required"));
    }

    let barber_fields = match req.user_type {
        UserType::Barber => {
            let shop_name = required(req.shop_name.as_deref(), "shop name")?;
            let address = required(req.address.as_deref(), "address")?;
            if req.services.iter().any(|s| s.name.trim().is_empty() || s.price < 0) {
                return Err(ApiError::validation(
                    "services need a name and a non-negative price",
                ));
            }
            let availability = req.availability.unwrap_or_default();
            if availability.open_hour >= availability.close_hour || availability.close_hour > 24 {
                return Err(ApiError::validation("invalid availability hours"));
            }
            Some((shop_name, address, availability))
        }
        UserType::Customer => None,
    };

    if ctx.storage.email_exists(email).await.map_err(internal)? {
        return Err(ApiError::validation("a user with that email already exists"));
    }

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("failed to hash password: {e}")))?;
    let new_user = NewUser {
        email,
        password_hash: &password_hash,
        first_name: req.first_name.trim(),
        last_name: req.last_name.trim(),
        phone: req.phone.trim(),
        user_type: req.user_type,
    };
    let new_barber = barber_fields.map(|(shop_name, address, availability)| NewBarber {
        shop_name,
        address,
        services: &req.services,
        availability,
        location: req.location,
        image: None,
    });

    let (user_id, barber_id) = ctx
        .storage
        .create_user(&new_user, new_barber.as_ref())
        .await
        .map_err(|err| {
            if storage::is_unique_violation(&err) {
                ApiError::validation("a user with that email already exists")
            } else {
                internal(err)
            }
        })?;
    info!(user_id = user_id.0, ?barber_id, user_type = %req.user_type, "registered user");

    let token = mint_token(&ctx.auth, user_id, req.user_type).map_err(token_error)?;
    Ok(AuthResponse {
        token,
        user_type: req.user_type,
    })
}

pub async fn login(ctx: &ApiContext, req: LoginRequest) -> Result<AuthResponse, ApiError> {
    let user = ctx
        .storage
        .user_by_email(&req.email)
        .await
        .map_err(internal)?;
    let Some(user) = user else {
        return Err(ApiError::unauthorized("invalid email or password"));
    };
    if !verify_password(&req.password, &user.password_hash) {
        warn!(user_id = user.user_id.0, "rejected login with wrong password");
        return Err(ApiError::unauthorized("invalid email or password"));
    }

    let token = mint_token(&ctx.auth, user.user_id, user.user_type).map_err(token_error)?;
    Ok(AuthResponse {
        token,
        user_type: user.user_type,
    })
}

pub async fn profile(ctx: &ApiContext, caller: &AuthenticatedUser) -> Result<UserProfile, ApiError> {
    let user = ctx
        .storage
        .user_by_id(caller.user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::unauthorized("user no longer exists"))?;
    let barber_id = match user.user_type {
        UserType::Barber => ctx
            .storage
            .barber_id_for_user(user.user_id)
            .await
            .map_err(internal)?,
        UserType::Customer => None,
    };
    Ok(UserProfile {
        user: user.summary(),
        barber_id,
    })
}

pub async fn list_barbers(
    ctx: &ApiContext,
    query: &BarberQuery,
) -> Result<Vec<BarberProfile>, ApiError> {
    let barbers = ctx
        .storage
        .search_barbers(query.search.as_deref())
        .await
        .map_err(internal)?;
    let Some(origin) = query.near() else {
        return Ok(barbers);
    };
    Ok(barbers
        .into_iter()
        .filter(|barber| {
            barber
                .location
                .is_some_and(|location| origin.distance_km(&location) <= NEARBY_RADIUS_KM)
        })
        .collect())
}

pub async fn get_barber(ctx: &ApiContext, barber_id: BarberId) -> Result<BarberProfile, ApiError> {
    ctx.storage
        .load_barber(barber_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("barber not found"))
}

pub async fn barber_stats(
    ctx: &ApiContext,
    caller: &AuthenticatedUser,
    today: NaiveDate,
) -> Result<BarberStats, ApiError> {
    let barber_id = ensure_barber(ctx, caller).await?;
    ctx.storage
        .barber_stats(barber_id, today)
        .await
        .map_err(internal)
}

pub async fn create_appointment(
    ctx: &ApiContext,
    caller: &AuthenticatedUser,
    req: CreateAppointmentRequest,
    today: NaiveDate,
) -> Result<Appointment, ApiError> {
    if caller.user_type != UserType::Customer {
        return Err(ApiError::forbidden("only customers can book appointments"));
    }
    if req.date < today {
        return Err(ApiError::validation("appointment date is in the past"));
    }

    let barber = get_barber(ctx, req.barber).await?;
    let service = barber.service(&req.service).ok_or_else(|| {
        ApiError::validation(format!("'{}' is not offered by this barber", req.service))
    })?;
    if !within_opening_hours(req.time, barber.availability.open_hour, barber.availability.close_hour) {
        return Err(ApiError::validation("requested time is outside opening hours"));
    }

    let appointment_id = ctx
        .storage
        .insert_appointment(&NewAppointment {
            customer_id: caller.user_id,
            barber_id: barber.barber_id,
            date: req.date,
            time: req.time,
            service: &service.name,
            price: service.price,
        })
        .await
        .map_err(internal)?;
    info!(
        appointment_id = appointment_id.0,
        barber_id = barber.barber_id.0,
        customer_id = caller.user_id.0,
        "appointment booked"
    );
    load_appointment(ctx, appointment_id).await
}

/// Appointments of the caller in its own role.
pub async fn list_appointments(
    ctx: &ApiContext,
    caller: &AuthenticatedUser,
) -> Result<Vec<Appointment>, ApiError> {
    match caller.user_type {
        UserType::Barber => list_barber_appointments(ctx, caller).await,
        UserType::Customer => list_customer_appointments(ctx, caller).await,
    }
}

pub async fn list_barber_appointments(
    ctx: &ApiContext,
    caller: &AuthenticatedUser,
) -> Result<Vec<Appointment>, ApiError> {
    let barber_id = ensure_barber(ctx, caller).await?;
    ctx.storage
        .list_appointments_for_barber(barber_id)
        .await
        .map_err(internal)
}

pub async fn list_customer_appointments(
    ctx: &ApiContext,
    caller: &AuthenticatedUser,
) -> Result<Vec<Appointment>, ApiError> {
    if caller.user_type != UserType::Customer {
        return Err(ApiError::forbidden("customer account required"));
    }
    ctx.storage
        .list_appointments_for_customer(caller.user_id)
        .await
        .map_err(internal)
}

/// Applies a status transition. Barbers may accept, reject or complete their
/// own bookings; customers may only cancel theirs.
pub async fn act_on_appointment(
    ctx: &ApiContext,
    caller: &AuthenticatedUser,
    appointment_id: AppointmentId,
    action: AppointmentAction,
) -> Result<Appointment, ApiError> {
    let appointment = load_appointment(ctx, appointment_id).await?;
    let owns = match action {
        AppointmentAction::Cancel => {
            caller.user_type == UserType::Customer && appointment.customer.user_id == caller.user_id
        }
        _ => caller.user_type == UserType::Barber && appointment.barber.user_id == caller.user_id,
    };
    if !owns {
        return Err(ApiError::forbidden("not your appointment"));
    }

    let next = appointment
        .status
        .apply(action)
        .ok_or_else(|| ApiError::validation("Invalid action"))?;
    let moved = ctx
        .storage
        .transition_appointment_status(appointment_id, appointment.status, next)
        .await
        .map_err(internal)?;
    if !moved {
        warn!(appointment_id = appointment_id.0, ?action, "appointment changed underneath the action");
        return Err(ApiError::validation("Invalid action"));
    }
    info!(appointment_id = appointment_id.0, ?action, status = %next, "appointment updated");

    Ok(Appointment {
        status: next,
        ..appointment
    })
}

pub async fn create_review(
    ctx: &ApiContext,
    caller: &AuthenticatedUser,
    req: CreateReviewRequest,
) -> Result<Review, ApiError> {
    if caller.user_type != UserType::Customer {
        return Err(ApiError::forbidden("only customers can leave reviews"));
    }
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::validation("rating must be between 1 and 5"));
    }
    if req.comment.chars().count() > MAX_REVIEW_COMMENT_CHARS {
        return Err(ApiError::validation("review comment is too long"));
    }
    let barber = get_barber(ctx, req.barber).await?;

    let review_id = ctx
        .storage
        .insert_review(barber.barber_id, caller.user_id, req.rating, req.comment.trim())
        .await
        .map_err(internal)?;
    ctx.storage
        .load_review(review_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Internal, "review vanished after insert"))
}

pub async fn list_reviews(ctx: &ApiContext, barber: Option<i64>) -> Result<Vec<Review>, ApiError> {
    ctx.storage
        .list_reviews(barber.map(BarberId))
        .await
        .map_err(internal)
}

pub async fn barber_reviews(ctx: &ApiContext, barber: Option<i64>) -> Result<Vec<Review>, ApiError> {
    let Some(barber) = barber else {
        return Err(ApiError::validation("Barber ID required"));
    };
    list_reviews(ctx, Some(barber)).await
}

async fn load_appointment(
    ctx: &ApiContext,
    appointment_id: AppointmentId,
) -> Result<Appointment, ApiError> {
    ctx.storage
        .load_appointment(appointment_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("appointment not found"))
}

async fn ensure_barber(ctx: &ApiContext, caller: &AuthenticatedUser) -> Result<BarberId, ApiError> {
    if caller.user_type != UserType::Barber {
        return Err(ApiError::forbidden("Unauthorized"));
    }
    ctx.storage
        .barber_id_for_user(caller.user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::forbidden("Unauthorized"))
}

fn within_opening_hours(time: NaiveTime, open_hour: u32, close_hour: u32) -> bool {
    time.hour() >= open_hour && time.hour() < close_hour
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(format!("{field} is required for barbers")))
}

fn token_error(err: jsonwebtoken::errors::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("token mint failed: {err}"))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
