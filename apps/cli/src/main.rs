use std::{io::Write, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use client_core::{
    api_url_from_env, guard, AppRoute, BookingApi, BookingClient, ClientError, FileSessionStore,
    RouteDecision,
};
use shared::{
    domain::{
        AppointmentAction, AppointmentId, Availability, BarberId, GeoPoint, ServiceOffering,
        UserType,
    },
    protocol::{BarberQuery, CreateReviewRequest, RegisterRequest},
};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod views;

#[derive(Parser, Debug)]
#[command(name = "barberconnect", about = "Book and manage barber appointments")]
struct Cli {
    /// REST base URL; defaults to $BARBERCONNECT_API_URL or http://localhost:8000/api.
    #[arg(long)]
    api_url: Option<String>,
    /// Where the session token is kept between runs.
    #[arg(long)]
    session_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a customer or barber account.
    Signup(SignupArgs),
    Login {
        /// Defaults to the remembered email.
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: String,
        #[arg(long)]
        remember_me: bool,
    },
    Logout,
    Profile,
    /// Search barbers by shop or service name, optionally near a location.
    Barbers {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, requires = "lat")]
        lng: Option<f64>,
    },
    /// Barber details, services and bookable slots.
    Barber {
        id: i64,
        /// Day to show slots for (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        reviews: bool,
    },
    Book {
        barber: i64,
        #[arg(long)]
        date: NaiveDate,
        /// One of the listed slots, e.g. 14:30.
        #[arg(long)]
        time: String,
        #[arg(long, default_value = "Haircut")]
        service: String,
    },
    /// The customer's appointments.
    Appointments,
    Cancel {
        id: i64,
    },
    Review {
        barber: i64,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Dashboard for the logged-in role.
    Dashboard,
    Accept {
        id: i64,
    },
    Reject {
        id: i64,
    },
    Complete {
        id: i64,
    },
    /// Stream booking notifications.
    Watch,
    /// Show how a client path resolves for the current session.
    Open {
        path: String,
    },
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    barber: bool,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    confirm_password: Option<String>,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name: String,
    #[arg(long, default_value = "")]
    phone: String,
    #[arg(long, required_if_eq("barber", "true"))]
    shop_name: Option<String>,
    #[arg(long, required_if_eq("barber", "true"))]
    address: Option<String>,
    /// Offered service as NAME=PRICE; repeatable.
    #[arg(long = "service", value_parser = parse_service)]
    services: Vec<ServiceOffering>,
    #[arg(long)]
    open_hour: Option<u32>,
    #[arg(long)]
    close_hour: Option<u32>,
    #[arg(long, requires = "lng")]
    lat: Option<f64>,
    #[arg(long, requires = "lat")]
    lng: Option<f64>,
}

impl SignupArgs {
    fn into_request(self) -> RegisterRequest {
        let user_type = if self.barber {
            UserType::Barber
        } else {
            UserType::Customer
        };
        let availability = match (self.open_hour, self.close_hour) {
            (None, None) => None,
            (open, close) => {
                let default = Availability::default();
                Some(Availability {
                    open_hour: open.unwrap_or(default.open_hour),
                    close_hour: close.unwrap_or(default.close_hour),
                })
            }
        };
        let location = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };
        RegisterRequest {
            email: self.email,
            password: self.password,
            confirm_password: self.confirm_password,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            user_type,
            shop_name: self.shop_name,
            address: self.address,
            services: self.services,
            availability,
            location,
        }
    }
}

fn parse_service(raw: &str) -> Result<ServiceOffering, String> {
    let (name, price) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PRICE, got '{raw}'"))?;
    let price = price
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("invalid price in '{raw}'"))?;
    Ok(ServiceOffering {
        name: name.trim().to_string(),
        price,
    })
}

impl Command {
    /// The view a command opens, with the roles it is restricted to.
    fn route(&self) -> (AppRoute, Option<&'static [UserType]>) {
        const CUSTOMER: &[UserType] = &[UserType::Customer];
        const BARBER: &[UserType] = &[UserType::Barber];
        const ANY: &[UserType] = &[UserType::Customer, UserType::Barber];
        match self {
            Command::Signup(args) if args.barber => (AppRoute::SignupBarber, None),
            Command::Signup(_) => (AppRoute::SignupCustomer, None),
            Command::Login { .. } | Command::Logout | Command::Open { .. } => {
                (AppRoute::Login, None)
            }
            Command::Profile | Command::Watch | Command::Dashboard => (AppRoute::Landing, Some(ANY)),
            Command::Barbers { .. } => (AppRoute::BarberSearch, None),
            Command::Barber { id, .. } => (AppRoute::BarberDetail(BarberId(*id)), None),
            Command::Book { barber, .. } | Command::Review { barber, .. } => {
                (AppRoute::BarberDetail(BarberId(*barber)), Some(CUSTOMER))
            }
            Command::Appointments | Command::Cancel { .. } => {
                let route = AppRoute::CustomerAppointments;
                (route, route.allowed_roles())
            }
            Command::Accept { .. } | Command::Reject { .. } | Command::Complete { .. } => {
                (AppRoute::BarberDashboard, Some(BARBER))
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = Arc::new(FileSessionStore::new(
        cli.session_file
            .clone()
            .unwrap_or_else(FileSessionStore::default_location),
    ));
    let client = BookingClient::new(cli.api_url.clone().unwrap_or_else(api_url_from_env), store);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run(&client, &mut out, cli.command).await {
        Ok(code) => Ok(code),
        Err(err) if is_session_expired(&err) => {
            eprintln!("Your session has expired. Please log in again ({}).", AppRoute::Login);
            Ok(ExitCode::from(2))
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            eprintln!("{err:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn is_session_expired(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<ClientError>(),
        Some(ClientError::SessionExpired | ClientError::NotLoggedIn)
    )
}

async fn run(api: &dyn BookingApi, out: &mut dyn Write, command: Command) -> Result<ExitCode> {
    let session = api.session()?;
    let (route, allowed) = command.route();
    if let Some(allowed) = allowed {
        if guard(session.as_ref(), allowed) == RouteDecision::RedirectToLogin {
            eprintln!(
                "{route} requires a {} session. Log in first: barberconnect login ({}).",
                allowed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" or "),
                AppRoute::Login
            );
            return Ok(ExitCode::from(2));
        }
    }

    let today = Local::now().date_naive();
    match command {
        Command::Signup(args) => views::signup(api, out, &args.into_request()).await?,
        Command::Login {
            email,
            password,
            remember_me,
        } => {
            let email = match email {
                Some(email) => email,
                None => api
                    .remembered_email()?
                    .ok_or_else(|| anyhow!("no remembered email; pass --email"))?,
            };
            views::login(api, out, &email, &password, remember_me).await?
        }
        Command::Logout => views::logout(api, out)?,
        Command::Profile => views::profile(api, out).await?,
        Command::Barbers { search, lat, lng } => {
            views::barbers(api, out, &BarberQuery { search, lat, lng }).await?
        }
        Command::Barber { id, date, reviews } => {
            views::barber_detail(api, out, BarberId(id), date.unwrap_or(today), reviews).await?
        }
        Command::Book {
            barber,
            date,
            time,
            service,
        } => views::book(api, out, BarberId(barber), date, &time, &service).await?,
        Command::Appointments => views::customer_appointments(api, out).await?,
        Command::Cancel { id } => views::cancel(api, out, AppointmentId(id)).await?,
        Command::Review {
            barber,
            rating,
            comment,
        } => {
            let request = CreateReviewRequest {
                barber: BarberId(barber),
                rating,
                comment,
            };
            views::review(api, out, &request).await?
        }
        Command::Dashboard => {
            let user_type = session
                .map(|s| s.user_type)
                .ok_or(ClientError::NotLoggedIn)?;
            views::dashboard(api, out, user_type).await?
        }
        Command::Accept { id } => {
            views::act(api, out, AppointmentId(id), AppointmentAction::Accept).await?
        }
        Command::Reject { id } => {
            views::act(api, out, AppointmentId(id), AppointmentAction::Reject).await?
        }
        Command::Complete { id } => {
            views::act(api, out, AppointmentId(id), AppointmentAction::Complete).await?
        }
        Command::Watch => views::watch(api, out).await?,
        Command::Open { path } => views::open(out, &path, session.as_ref())?,
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
