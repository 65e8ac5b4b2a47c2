use super::*;

fn session(user_type: UserType) -> Session {
    Session {
        token: "tok".into(),
        user_type,
    }
}

#[test]
fn paths_parse_back_to_routes() {
    let routes = [
        AppRoute::Landing,
        AppRoute::Login,
        AppRoute::SignupCustomer,
        AppRoute::SignupBarber,
        AppRoute::BarberSearch,
        AppRoute::BarberDetail(BarberId(7)),
        AppRoute::CustomerDashboard,
        AppRoute::CustomerAppointments,
        AppRoute::BarberDashboard,
    ];
    for route in routes {
        assert_eq!(AppRoute::parse(&route.path()), route);
    }
}

#[test]
fn unknown_paths_fall_back_to_landing() {
    assert_eq!(AppRoute::parse("/nowhere"), AppRoute::Landing);
    assert_eq!(AppRoute::parse("/barber/abc"), AppRoute::Landing);
    assert_eq!(AppRoute::parse(""), AppRoute::Landing);
    assert_eq!(AppRoute::parse("/login/"), AppRoute::Login);
}

#[test]
fn guard_redirects_without_token_or_with_wrong_role() {
    assert_eq!(
        guard(None, &[UserType::Customer]),
        RouteDecision::RedirectToLogin
    );
    let blank = Session {
        token: "  ".into(),
        user_type: UserType::Customer,
    };
    assert_eq!(
        guard(Some(&blank), &[UserType::Customer]),
        RouteDecision::RedirectToLogin
    );
    assert_eq!(
        guard(Some(&session(UserType::Barber)), &[UserType::Customer]),
        RouteDecision::RedirectToLogin
    );
    assert_eq!(
        guard(Some(&session(UserType::Customer)), &[UserType::Customer]),
        RouteDecision::Render
    );
}

#[test]
fn public_routes_render_for_anyone() {
    assert_eq!(AppRoute::BarberSearch.decide(None), RouteDecision::Render);
    assert_eq!(
        AppRoute::BarberDetail(BarberId(1)).decide(Some(&session(UserType::Barber))),
        RouteDecision::Render
    );
    assert_eq!(
        AppRoute::BarberDashboard.decide(Some(&session(UserType::Customer))),
        RouteDecision::RedirectToLogin
    );
}

#[test]
fn login_lands_on_role_dashboard() {
    assert_eq!(dashboard_for(UserType::Customer), AppRoute::CustomerDashboard);
    assert_eq!(dashboard_for(UserType::Barber), AppRoute::BarberDashboard);
}
