use std::io::Write;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use client_core::{
    dashboard_for, default_time_slots, AppRoute, BookingApi, ClientError, RouteDecision, Session,
    TimeSlot,
};
use shared::{
    domain::{AppointmentAction, AppointmentId, BarberId, UserType},
    protocol::{
        Appointment, BarberProfile, BarberQuery, CreateAppointmentRequest, CreateReviewRequest,
        RegisterRequest, Review, ServerEvent,
    },
};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub fn format_price(price: i64) -> String {
    format!("PKR {price}")
}

fn rating_line(barber: &BarberProfile) -> String {
    format!("{:.1}/5 ({})", barber.avg_rating, barber.review_count)
}

/// Finds the offered slot matching `label` (`H:MM`).
pub fn pick_slot(label: &str) -> Option<TimeSlot> {
    let label = label.trim().trim_start_matches('0');
    default_time_slots()
        .into_iter()
        .find(|slot| slot.to_string() == label)
}

pub async fn signup(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    request: &RegisterRequest,
) -> Result<()> {
    let session = api
        .register(request)
        .await
        .context("Registration failed")?;
    writeln!(
        out,
        "Account created for {} ({}).",
        request.email, session.user_type
    )?;
    writeln!(out, "Next: {}", dashboard_for(session.user_type))?;
    Ok(())
}

pub async fn login(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    email: &str,
    password: &str,
    remember_me: bool,
) -> Result<()> {
    let session = api
        .login(email, password, remember_me)
        .await
        .context("Login failed")?;
    writeln!(out, "Logged in as {} ({}).", email, session.user_type)?;
    writeln!(out, "Next: {}", dashboard_for(session.user_type))?;
    Ok(())
}

pub fn logout(api: &dyn BookingApi, out: &mut dyn Write) -> Result<()> {
    api.logout()?;
    writeln!(out, "Logged out. Next: {}", AppRoute::Login)?;
    Ok(())
}

pub async fn profile(api: &dyn BookingApi, out: &mut dyn Write) -> Result<()> {
    let profile = api.profile().await?;
    let user = &profile.user;
    writeln!(out, "{} <{}>", user.full_name(), user.email)?;
    writeln!(out, "Role: {}", user.user_type)?;
    if !user.phone.is_empty() {
        writeln!(out, "Phone: {}", user.phone)?;
    }
    if let Some(barber_id) = profile.barber_id {
        writeln!(out, "Barber profile: {}", AppRoute::BarberDetail(barber_id))?;
    }
    Ok(())
}

pub async fn barbers(api: &dyn BookingApi, out: &mut dyn Write, query: &BarberQuery) -> Result<()> {
    let barbers = api.list_barbers(query).await?;
    if barbers.is_empty() {
        writeln!(out, "No barbers found.")?;
        return Ok(());
    }
    for barber in &barbers {
        let services: Vec<&str> = barber.services.iter().map(|s| s.name.as_str()).collect();
        writeln!(
            out,
            "#{:<4} {:<24} {:<10} {}",
            barber.barber_id.0,
            barber.shop_name,
            rating_line(barber),
            barber.address
        )?;
        if !services.is_empty() {
            writeln!(out, "      services: {}", services.join(", "))?;
        }
    }
    Ok(())
}

pub async fn barber_detail(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    barber_id: BarberId,
    date: NaiveDate,
    show_reviews: bool,
) -> Result<()> {
    let barber = match api.get_barber(barber_id).await {
        Ok(barber) => barber,
        Err(ClientError::Api(err)) if err.code == shared::error::ErrorCode::NotFound => {
            writeln!(out, "Barber not found")?;
            return Ok(());
        }
        Err(err) => return Err(err).context("Failed to load barber details"),
    };

    writeln!(out, "{}", barber.shop_name)?;
    writeln!(out, "{}", barber.user.full_name())?;
    writeln!(out, "Rating: {}", rating_line(&barber))?;
    writeln!(out, "Address: {}", barber.address)?;
    writeln!(
        out,
        "Hours: {}:00-{}:00",
        barber.availability.open_hour, barber.availability.close_hour
    )?;

    writeln!(out, "\nServices")?;
    for service in &barber.services {
        writeln!(out, "  {:<20} {}", service.name, format_price(service.price))?;
    }

    writeln!(out, "\nAvailable slots on {date}")?;
    let slots: Vec<String> = default_time_slots().iter().map(ToString::to_string).collect();
    writeln!(out, "  {}", slots.join("  "))?;

    if show_reviews {
        writeln!(out, "\nReviews")?;
        if api.session()?.is_none() {
            writeln!(out, "  Log in to read reviews ({}).", AppRoute::Login)?;
            return Ok(());
        }
        let reviews = api.barber_reviews(barber_id).await?;
        if reviews.is_empty() {
            writeln!(out, "  No reviews yet.")?;
        }
        for review in &reviews {
            writeln!(out, "  {}", review_line(review))?;
        }
    }
    Ok(())
}

fn review_line(review: &Review) -> String {
    let stars = "*".repeat(usize::from(review.rating));
    if review.comment.is_empty() {
        format!("{stars:<5} {}", review.customer.full_name())
    } else {
        format!(
            "{stars:<5} {}: {}",
            review.customer.full_name(),
            review.comment
        )
    }
}

/// Books a slot and prints the transient notification shown after booking.
pub async fn book(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    barber: BarberId,
    date: NaiveDate,
    slot_label: &str,
    service: &str,
) -> Result<()> {
    let slot = pick_slot(slot_label).ok_or_else(|| {
        anyhow!("'{slot_label}' is not an offered time slot; pick one listed by `barber`")
    })?;
    let time = slot
        .to_naive_time()
        .ok_or_else(|| anyhow!("invalid slot {slot}"))?;
    let request = CreateAppointmentRequest {
        barber,
        date,
        time,
        service: service.to_string(),
    };
    let appointment = api
        .create_appointment(&request)
        .await
        .context("Failed to book appointment")?;
    writeln!(out, "Appointment booked successfully!")?;
    writeln!(out, "{}", appointment_line(&appointment))?;
    writeln!(out, "Next: {}", AppRoute::CustomerAppointments)?;
    Ok(())
}

pub fn appointment_line(appointment: &Appointment) -> String {
    format!(
        "#{:<4} {:<20} {} {:>5}  {:<12} {:<10} [{}]",
        appointment.appointment_id.0,
        appointment.barber.shop_name,
        appointment.date,
        appointment.time.format("%-H:%M"),
        appointment.service,
        format_price(appointment.price),
        appointment.status.label()
    )
}

pub async fn customer_appointments(api: &dyn BookingApi, out: &mut dyn Write) -> Result<()> {
    let appointments = api.customer_appointments().await?;
    if appointments.is_empty() {
        writeln!(out, "No appointments yet")?;
        writeln!(out, "Find a Barber: {}", AppRoute::BarberSearch)?;
        return Ok(());
    }
    for appointment in &appointments {
        writeln!(out, "{}", appointment_line(appointment))?;
        if appointment.status.is_active() {
            writeln!(
                out,
                "      cancel: barberconnect cancel {}",
                appointment.appointment_id.0
            )?;
        } else {
            writeln!(
                out,
                "      book again: barberconnect barber {}",
                appointment.barber.barber_id.0
            )?;
        }
    }
    Ok(())
}

pub async fn cancel(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    appointment_id: AppointmentId,
) -> Result<()> {
    api.cancel_appointment(appointment_id)
        .await
        .context("Failed to cancel appointment")?;
    writeln!(out, "Appointment #{} cancelled.", appointment_id.0)?;
    Ok(())
}

pub async fn review(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    request: &CreateReviewRequest,
) -> Result<()> {
    let review = api
        .create_review(request)
        .await
        .context("Failed to post review")?;
    writeln!(out, "Thanks for your review!")?;
    writeln!(out, "  {}", review_line(&review))?;
    Ok(())
}

pub async fn dashboard(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    user_type: UserType,
) -> Result<()> {
    match user_type {
        UserType::Customer => {
            writeln!(out, "My Dashboard")?;
            customer_appointments(api, out).await
        }
        UserType::Barber => barber_dashboard(api, out).await,
    }
}

pub async fn barber_dashboard(api: &dyn BookingApi, out: &mut dyn Write) -> Result<()> {
    let stats = api.barber_stats().await?;
    writeln!(out, "Barber Dashboard")?;
    writeln!(out, "Total appointments:    {}", stats.total_appointments)?;
    writeln!(out, "Upcoming appointments: {}", stats.upcoming_appointments)?;
    writeln!(out, "Earnings:              {}", format_price(stats.earnings))?;

    let appointments = api.barber_appointments().await?;
    writeln!(out, "\nAppointments")?;
    if appointments.is_empty() {
        writeln!(out, "  No appointments yet")?;
    }
    for appointment in &appointments {
        writeln!(
            out,
            "{}  {}",
            appointment_line(appointment),
            appointment.customer.full_name()
        )?;
        let id = appointment.appointment_id.0;
        match appointment.status {
            shared::domain::AppointmentStatus::Pending => writeln!(
                out,
                "      accept: barberconnect accept {id} | reject: barberconnect reject {id}"
            )?,
            shared::domain::AppointmentStatus::Confirmed => {
                writeln!(out, "      complete: barberconnect complete {id}")?
            }
            _ => {}
        }
    }
    Ok(())
}

pub async fn act(
    api: &dyn BookingApi,
    out: &mut dyn Write,
    appointment_id: AppointmentId,
    action: AppointmentAction,
) -> Result<()> {
    let status = match action {
        AppointmentAction::Accept => api.accept_appointment(appointment_id).await,
        AppointmentAction::Reject => api.reject_appointment(appointment_id).await,
        other => api.act_on_appointment(appointment_id, other).await,
    }
    .context("Failed to update appointment")?;
    writeln!(
        out,
        "Appointment #{} is now {}.",
        appointment_id.0,
        status.label()
    )?;
    Ok(())
}

pub fn describe_event(event: &ServerEvent) -> String {
    match event {
        ServerEvent::AppointmentBooked { appointment } => format!(
            "New booking #{}: {} at {} on {} {} ({})",
            appointment.appointment_id.0,
            appointment.customer.full_name(),
            appointment.barber.shop_name,
            appointment.date,
            appointment.time.format("%-H:%M"),
            appointment.service
        ),
        ServerEvent::AppointmentStatusChanged {
            appointment_id,
            status,
            ..
        } => format!("Appointment #{} is now {}", appointment_id.0, status.label()),
        ServerEvent::ReviewPosted { review, .. } => format!(
            "New {}-star review from {}",
            review.rating,
            review.customer.full_name()
        ),
    }
}

pub async fn watch(api: &dyn BookingApi, out: &mut dyn Write) -> Result<()> {
    let mut events = api.subscribe_notifications().await?;
    writeln!(out, "Listening for notifications (Ctrl-C to stop)...")?;
    out.flush()?;
    loop {
        match events.recv().await {
            Ok(event) => {
                writeln!(out, "{}", describe_event(&event))?;
                out.flush()?;
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed notifications"),
            Err(RecvError::Closed) => break,
        }
    }
    writeln!(out, "Notification feed closed.")?;
    Ok(())
}

/// Describes how the client would handle navigating to `path`.
pub fn open(out: &mut dyn Write, path: &str, session: Option<&Session>) -> Result<()> {
    let route = AppRoute::parse(path);
    match route.decide(session) {
        RouteDecision::Render => writeln!(out, "{route}: render")?,
        RouteDecision::RedirectToLogin => {
            writeln!(out, "{route}: redirect to {}", AppRoute::Login)?
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/views_tests.rs"]
mod tests;
