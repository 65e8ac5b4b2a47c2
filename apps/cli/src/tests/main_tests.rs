use super::*;
use crate::test_support::{session, FakeApi};

fn exit_code(code: ExitCode) -> String {
    format!("{code:?}")
}

#[test]
fn cli_definition_is_consistent() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

#[test]
fn service_flags_parse_name_and_price() {
    let service = parse_service("Beard Trim = 300").expect("service");
    assert_eq!(service.name, "Beard Trim");
    assert_eq!(service.price, 300);
    assert!(parse_service("Haircut").is_err());
    assert!(parse_service("Haircut=cheap").is_err());
}

#[test]
fn barber_signup_requires_shop_details() {
    let missing = Cli::try_parse_from([
        "barberconnect",
        "signup",
        "--barber",
        "--email",
        "fade@example.com",
        "--password",
        "pass1234",
        "--first-name",
        "Bilal",
        "--last-name",
        "Khan",
    ]);
    assert!(missing.is_err());

    let cli = Cli::try_parse_from([
        "barberconnect",
        "signup",
        "--barber",
        "--email",
        "fade@example.com",
        "--password",
        "pass1234",
        "--first-name",
        "Bilal",
        "--last-name",
        "Khan",
        "--shop-name",
        "Fade Factory",
        "--address",
        "MM Alam Road",
        "--service",
        "Haircut=800",
        "--open-hour",
        "10",
    ])
    .expect("parse");
    let Command::Signup(args) = cli.command else {
        panic!("expected signup");
    };
    let request = args.into_request();
    assert_eq!(request.user_type, UserType::Barber);
    assert_eq!(request.services.len(), 1);
    let availability = request.availability.expect("availability");
    assert_eq!(availability.open_hour, 10);
    assert_eq!(availability.close_hour, 17);
}

#[test]
fn commands_map_to_guarded_routes() {
    let (route, allowed) = Command::Accept { id: 1 }.route();
    assert_eq!(route, AppRoute::BarberDashboard);
    assert_eq!(allowed, Some(&[UserType::Barber][..]));

    let (route, allowed) = Command::Barber {
        id: 4,
        date: None,
        reviews: false,
    }
    .route();
    assert_eq!(route, AppRoute::BarberDetail(BarberId(4)));
    assert_eq!(allowed, None);

    let (_, allowed) = Command::Appointments.route();
    assert_eq!(allowed, Some(&[UserType::Customer][..]));
}

#[tokio::test]
async fn wrong_role_is_redirected_before_any_request() {
    let api = FakeApi::new(Some(session(UserType::Customer)));
    let mut out = Vec::new();
    let code = run(&api, &mut out, Command::Accept { id: 3 })
        .await
        .expect("run");
    assert_eq!(exit_code(code), exit_code(ExitCode::from(2)));
    assert!(api.actions.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn anonymous_user_cannot_book() {
    let api = FakeApi::new(None);
    let mut out = Vec::new();
    let code = run(
        &api,
        &mut out,
        Command::Book {
            barber: 1,
            date: NaiveDate::from_ymd_opt(2030, 6, 1).expect("date"),
            time: "10:00".into(),
            service: "Haircut".into(),
        },
    )
    .await
    .expect("run");
    assert_eq!(exit_code(code), exit_code(ExitCode::from(2)));
    assert!(api.booked.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn login_falls_back_to_remembered_email() {
    let api = FakeApi::new(None);
    let mut out = Vec::new();
    let code = run(
        &api,
        &mut out,
        Command::Login {
            email: None,
            password: "pass1234".into(),
            remember_me: false,
        },
    )
    .await
    .expect("run");
    assert_eq!(exit_code(code), exit_code(ExitCode::SUCCESS));
    let text = String::from_utf8(out).expect("utf8");
    assert!(text.contains("Logged in as sara@example.com"));
    assert!(text.contains("/customer/dashboard"));
}

#[test]
fn session_errors_are_detected_through_context() {
    let err = anyhow::Error::new(ClientError::SessionExpired).context("Failed to load");
    assert!(is_session_expired(&err));
    let other = anyhow::anyhow!("boom");
    assert!(!is_session_expired(&other));
}
