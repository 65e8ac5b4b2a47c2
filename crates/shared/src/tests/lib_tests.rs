use chrono::NaiveTime;

use crate::{
    domain::{AppointmentAction, AppointmentId, AppointmentStatus, GeoPoint, UserId, UserType},
    protocol::{wall_clock, CreateAppointmentRequest, ServerEvent},
};

#[test]
fn barber_actions_only_apply_to_pending_or_confirmed() {
    assert_eq!(
        AppointmentStatus::Pending.apply(AppointmentAction::Accept),
        Some(AppointmentStatus::Confirmed)
    );
    assert_eq!(
        AppointmentStatus::Pending.apply(AppointmentAction::Reject),
        Some(AppointmentStatus::Rejected)
    );
    assert_eq!(
        AppointmentStatus::Confirmed.apply(AppointmentAction::Complete),
        Some(AppointmentStatus::Completed)
    );
    assert_eq!(
        AppointmentStatus::Confirmed.apply(AppointmentAction::Accept),
        None
    );
    assert_eq!(AppointmentStatus::Pending.apply(AppointmentAction::Complete), None);
    assert_eq!(AppointmentStatus::Rejected.apply(AppointmentAction::Reject), None);
}

#[test]
fn cancel_is_limited_to_active_appointments() {
    assert_eq!(
        AppointmentStatus::Confirmed.apply(AppointmentAction::Cancel),
        Some(AppointmentStatus::Cancelled)
    );
    assert_eq!(AppointmentStatus::Completed.apply(AppointmentAction::Cancel), None);
    assert_eq!(AppointmentStatus::Cancelled.apply(AppointmentAction::Cancel), None);
}

#[test]
fn user_type_parses_case_insensitively() {
    assert_eq!("Barber".parse::<UserType>(), Ok(UserType::Barber));
    assert_eq!(" customer ".parse::<UserType>(), Ok(UserType::Customer));
    assert!("admin".parse::<UserType>().is_err());
}

#[test]
fn status_serializes_as_snake_case() {
    let json = serde_json::to_string(&AppointmentStatus::Cancelled).expect("json");
    assert_eq!(json, "\"cancelled\"");
    assert_eq!(AppointmentStatus::Cancelled.label(), "Cancelled");
}

#[test]
fn wall_clock_accepts_short_and_long_forms() {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).expect("time");
    assert_eq!(wall_clock::parse("9:00"), Some(nine));
    assert_eq!(wall_clock::parse("09:00:00"), Some(nine));
    assert_eq!(wall_clock::parse("nine"), None);

    let request: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
        "barber": 3,
        "date": "2030-01-02",
        "time": "15:30",
        "service": "Haircut",
    }))
    .expect("request");
    assert_eq!(request.time, NaiveTime::from_hms_opt(15, 30, 0).expect("time"));

    let encoded = serde_json::to_value(&request).expect("json");
    assert_eq!(encoded["time"], "15:30");
}

#[test]
fn distance_between_nearby_points_is_small() {
    let lahore = GeoPoint {
        lat: 31.5204,
        lng: 74.3587,
    };
    let nearby = GeoPoint {
        lat: 31.5497,
        lng: 74.3436,
    };
    let karachi = GeoPoint {
        lat: 24.8607,
        lng: 67.0011,
    };
    assert!(lahore.distance_km(&nearby) < 10.0);
    assert!(lahore.distance_km(&karachi) > 900.0);
}

#[test]
fn events_reach_only_their_participants() {
    let event = ServerEvent::AppointmentStatusChanged {
        appointment_id: AppointmentId(9),
        barber_user_id: UserId(1),
        customer_id: UserId(3),
        status: AppointmentStatus::Confirmed,
    };
    assert!(event.concerns(UserId(1)));
    assert!(event.concerns(UserId(3)));
    assert!(!event.concerns(UserId(2)));

    let json = serde_json::to_value(&event).expect("json");
    assert_eq!(json["type"], "appointment_status_changed");

    let broadcast_error = serde_json::from_value::<ServerEvent>(serde_json::json!({
        "type": "error",
        "payload": { "code": "internal", "message": "boom" },
    }));
    assert!(broadcast_error.is_err());
}
