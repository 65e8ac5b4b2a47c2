use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use shared::domain::{AppointmentId, AppointmentStatus, BarberId, GeoPoint};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/barberconnect.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    ListBarbers {
        #[arg(long)]
        search: Option<String>,
    },
    /// Pins a barber shop on the map so it shows up in nearby searches.
    SetLocation {
        barber_id: i64,
        lat: f64,
        lng: f64,
    },
    SetStatus {
        appointment_id: i64,
        /// pending, confirmed, completed, rejected or cancelled
        status: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::ListBarbers { search } => {
            for barber in storage.search_barbers(search.as_deref()).await? {
                println!(
                    "barber_id={} user_id={} shop={:?} rating={:.1} reviews={}",
                    barber.barber_id.0,
                    barber.user.user_id.0,
                    barber.shop_name,
                    barber.avg_rating,
                    barber.review_count
                );
            }
        }
        Command::SetLocation {
            barber_id,
            lat,
            lng,
        } => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                bail!("coordinates out of range: {lat},{lng}");
            }
            let updated = storage
                .set_barber_location(BarberId(barber_id), GeoPoint { lat, lng })
                .await?;
            if !updated {
                bail!("no barber with id {barber_id}");
            }
            info!(barber_id, lat, lng, "barber location updated");
        }
        Command::SetStatus {
            appointment_id,
            status,
        } => {
            let status: AppointmentStatus = status.parse().map_err(|err: String| anyhow!(err))?;
            let updated = storage
                .update_appointment_status(AppointmentId(appointment_id), status)
                .await?;
            if !updated {
                bail!("no appointment with id {appointment_id}");
            }
            info!(appointment_id, %status, "appointment status updated");
        }
    }

    Ok(())
}
