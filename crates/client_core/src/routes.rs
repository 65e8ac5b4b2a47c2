use std::fmt;

use shared::domain::{BarberId, UserType};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRoute {
    Landing,
    Login,
    SignupCustomer,
    SignupBarber,
    BarberSearch,
    BarberDetail(BarberId),
    CustomerDashboard,
    CustomerAppointments,
    BarberDashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    RedirectToLogin,
}

const CUSTOMER_ONLY: &[UserType] = &[UserType::Customer];
const BARBER_ONLY: &[UserType] = &[UserType::Barber];

impl AppRoute {
    /// Resolves a client path; anything unrecognised lands on `Landing`.
    pub fn parse(path: &str) -> Self {
        let trimmed = path.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        match segments.as_slice() {
            ["login"] => AppRoute::Login,
            ["signup", "customer"] => AppRoute::SignupCustomer,
            ["signup", "barber"] => AppRoute::SignupBarber,
            ["barbers"] => AppRoute::BarberSearch,
            ["barber", "dashboard"] => AppRoute::BarberDashboard,
            ["barber", id] => id
                .parse::<i64>()
                .map(|id| AppRoute::BarberDetail(BarberId(id)))
                .unwrap_or(AppRoute::Landing),
            ["customer", "dashboard"] => AppRoute::CustomerDashboard,
            ["customer", "appointments"] => AppRoute::CustomerAppointments,
            _ => AppRoute::Landing,
        }
    }

    pub fn path(&self) -> String {
        match self {
            AppRoute::Landing => "/".into(),
            AppRoute::Login => "/login".into(),
            AppRoute::SignupCustomer => "/signup/customer".into(),
            AppRoute::SignupBarber => "/signup/barber".into(),
            AppRoute::BarberSearch => "/barbers".into(),
            AppRoute::BarberDetail(id) => format!("/barber/{}", id.0),
            AppRoute::CustomerDashboard => "/customer/dashboard".into(),
            AppRoute::CustomerAppointments => "/customer/appointments".into(),
            AppRoute::BarberDashboard => "/barber/dashboard".into(),
        }
    }

    /// Roles allowed to open the route; `None` means public.
    pub fn allowed_roles(&self) -> Option<&'static [UserType]> {
        match self {
            AppRoute::CustomerDashboard | AppRoute::CustomerAppointments => Some(CUSTOMER_ONLY),
            AppRoute::BarberDashboard => Some(BARBER_ONLY),
            _ => None,
        }
    }

    pub fn decide(&self, session: Option<&Session>) -> RouteDecision {
        match self.allowed_roles() {
            Some(allowed) => guard(session, allowed),
            None => RouteDecision::Render,
        }
    }
}

impl fmt::Display for AppRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

pub fn guard(session: Option<&Session>, allowed: &[UserType]) -> RouteDecision {
    let Some(session) = session.filter(|s| !s.token.trim().is_empty()) else {
        return RouteDecision::RedirectToLogin;
    };
    if allowed.contains(&session.user_type) {
        RouteDecision::Render
    } else {
        RouteDecision::RedirectToLogin
    }
}

/// Where the client lands right after login or registration.
pub fn dashboard_for(user_type: UserType) -> AppRoute {
    match user_type {
        UserType::Customer => AppRoute::CustomerDashboard,
        UserType::Barber => AppRoute::BarberDashboard,
    }
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
