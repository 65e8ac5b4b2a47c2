use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{
        AppointmentId, AppointmentStatus, Availability, BarberId, GeoPoint, ReviewId,
        ServiceOffering, UserId, UserSummary, UserType,
    },
    protocol::{Appointment, AppointmentBarber, BarberProfile, BarberStats, Review},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// A user row including the credential columns the API never exposes.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            user_type: self.user_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: &'a str,
    pub user_type: UserType,
}

#[derive(Debug, Clone)]
pub struct NewBarber<'a> {
    pub shop_name: &'a str,
    pub address: &'a str,
    pub services: &'a [ServiceOffering],
    pub availability: Availability,
    pub location: Option<GeoPoint>,
    pub image: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct NewAppointment<'a> {
    pub customer_id: UserId,
    pub barber_id: BarberId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub service: &'a str,
    pub price: i64,
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, user_type, created_at";

const BARBER_SELECT: &str = "SELECT b.id AS barber_id, b.shop_name, b.address, b.services, b.open_hour, b.close_hour,
            b.lat, b.lng, b.image,
            u.id AS user_id, u.email, u.first_name, u.last_name, u.phone, u.user_type,
            COALESCE(AVG(r.rating), 0.0) AS avg_rating, COUNT(r.id) AS review_count
     FROM barbers b
     INNER JOIN users u ON u.id = b.user_id
     LEFT JOIN reviews r ON r.barber_id = b.id";

const APPOINTMENT_SELECT: &str = "SELECT a.id AS appointment_id, a.date, a.time, a.service, a.price, a.status, a.created_at,
            c.id AS user_id, c.email, c.first_name, c.last_name, c.phone, c.user_type,
            b.id AS barber_id, b.user_id AS barber_user_id, b.shop_name
     FROM appointments a
     INNER JOIN users c ON c.id = a.customer_id
     INNER JOIN barbers b ON b.id = a.barber_id";

const REVIEW_SELECT: &str = "SELECT r.id AS review_id, r.barber_id, r.rating, r.comment, r.created_at,
            c.id AS user_id, c.email, c.first_name, c.last_name, c.phone, c.user_type
     FROM reviews r
     INNER JOIN users c ON c.id = r.customer_id";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every connection to `:memory:` opens its own database.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Inserts the user and, for barbers, the shop profile in one transaction.
    pub async fn create_user(
        &self,
        user: &NewUser<'_>,
        barber: Option<&NewBarber<'_>>,
    ) -> Result<(UserId, Option<BarberId>)> {
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO users (email, password_hash, first_name, last_name, phone, user_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(user.email.trim())
        .bind(user.password_hash)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.phone)
        .bind(user.user_type.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert user '{}'", user.email))?;
        let user_id = UserId(rec.get::<i64, _>(0));

        let barber_id = match barber {
            Some(barber) => {
                let services = serde_json::to_string(barber.services)?;
                let rec = sqlx::query(
                    "INSERT INTO barbers (user_id, shop_name, address, services, open_hour, close_hour, lat, lng, image)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                     RETURNING id",
                )
                .bind(user_id.0)
                .bind(barber.shop_name)
                .bind(barber.address)
                .bind(services)
                .bind(barber.availability.open_hour)
                .bind(barber.availability.close_hour)
                .bind(barber.location.map(|p| p.lat))
                .bind(barber.location.map(|p| p.lng))
                .bind(barber.image)
                .fetch_one(&mut *tx)
                .await
                .context("failed to insert barber profile")?;
                Some(BarberId(rec.get::<i64, _>(0)))
            }
            None => None,
        };

        tx.commit().await?;
        Ok((user_id, barber_id))
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| stored_user_from_row(&r)))
    }

    pub async fn user_by_id(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| stored_user_from_row(&r)))
    }

    pub async fn barber_id_for_user(&self, user_id: UserId) -> Result<Option<BarberId>> {
        let row = sqlx::query("SELECT id FROM barbers WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| BarberId(r.get::<i64, _>(0))))
    }

    pub async fn load_barber(&self, barber_id: BarberId) -> Result<Option<BarberProfile>> {
        let row = sqlx::query(&format!("{BARBER_SELECT} WHERE b.id = ? GROUP BY b.id"))
            .bind(barber_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| barber_from_row(&r)).transpose()
    }

    /// Lists barbers whose shop name contains `search` or who offer a service
    /// named exactly `search`, both case-insensitively.
    pub async fn search_barbers(&self, search: Option<&str>) -> Result<Vec<BarberProfile>> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let rows = match search {
            Some(term) => {
                sqlx::query(&format!(
                    "{BARBER_SELECT}
                     WHERE instr(lower(b.shop_name), lower(?1)) > 0
                        OR EXISTS (
                            SELECT 1 FROM json_each(b.services) s
                            WHERE lower(json_extract(s.value, '$.name')) = lower(?1)
                        )
                     GROUP BY b.id
                     ORDER BY b.id ASC"
                ))
                .bind(term)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{BARBER_SELECT} GROUP BY b.id ORDER BY b.id ASC"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(barber_from_row).collect()
    }

    pub async fn set_barber_location(&self, barber_id: BarberId, location: GeoPoint) -> Result<bool> {
        let result = sqlx::query("UPDATE barbers SET lat = ?, lng = ? WHERE id = ?")
            .bind(location.lat)
            .bind(location.lng)
            .bind(barber_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_appointment(&self, appointment: &NewAppointment<'_>) -> Result<AppointmentId> {
        let rec = sqlx::query(
            "INSERT INTO appointments (customer_id, barber_id, date, time, service, price, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(appointment.customer_id.0)
        .bind(appointment.barber_id.0)
        .bind(appointment.date)
        .bind(appointment.time)
        .bind(appointment.service)
        .bind(appointment.price)
        .bind(AppointmentStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(AppointmentId(rec.get::<i64, _>(0)))
    }

    pub async fn load_appointment(&self, appointment_id: AppointmentId) -> Result<Option<Appointment>> {
        let row = sqlx::query(&format!("{APPOINTMENT_SELECT} WHERE a.id = ?"))
            .bind(appointment_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| appointment_from_row(&r)))
    }

    pub async fn list_appointments_for_barber(&self, barber_id: BarberId) -> Result<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "{APPOINTMENT_SELECT} WHERE a.barber_id = ? ORDER BY a.date ASC, a.time ASC, a.id ASC"
        ))
        .bind(barber_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(appointment_from_row).collect())
    }

    pub async fn list_appointments_for_customer(&self, customer_id: UserId) -> Result<Vec<Appointment>> {
        let rows = sqlx::query(&format!(
            "{APPOINTMENT_SELECT} WHERE a.customer_id = ? ORDER BY a.date ASC, a.time ASC, a.id ASC"
        ))
        .bind(customer_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(appointment_from_row).collect())
    }

    pub async fn update_appointment_status(
        &self,
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(appointment_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Moves an appointment to `to` only while its stored status is still
    /// `from`. Returns `false` when another writer got there first.
    pub async fn transition_appointment_status(
        &self,
        appointment_id: AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE appointments SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(to.as_str())
            .bind(appointment_id.0)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update appointment {}", appointment_id.0))?;
        Ok(result.rows_affected() > 0)
    }

    /// Totals for the barber dashboard. Upcoming counts active bookings on or
    /// after `today`; earnings sum completed bookings.
    pub async fn barber_stats(&self, barber_id: BarberId, today: NaiveDate) -> Result<BarberStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total_appointments,
                COALESCE(SUM(CASE WHEN status IN ('pending', 'confirmed') AND date >= ? THEN 1 ELSE 0 END), 0) AS upcoming_appointments,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN price ELSE 0 END), 0) AS earnings
             FROM appointments
             WHERE barber_id = ?",
        )
        .bind(today)
        .bind(barber_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(BarberStats {
            total_appointments: row.get::<i64, _>("total_appointments"),
            upcoming_appointments: row.get::<i64, _>("upcoming_appointments"),
            earnings: row.get::<i64, _>("earnings"),
        })
    }

    pub async fn insert_review(
        &self,
        barber_id: BarberId,
        customer_id: UserId,
        rating: u8,
        comment: &str,
    ) -> Result<ReviewId> {
        let rec = sqlx::query(
            "INSERT INTO reviews (barber_id, customer_id, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(barber_id.0)
        .bind(customer_id.0)
        .bind(i64::from(rating))
        .bind(comment)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(ReviewId(rec.get::<i64, _>(0)))
    }

    pub async fn load_review(&self, review_id: ReviewId) -> Result<Option<Review>> {
        let row = sqlx::query(&format!("{REVIEW_SELECT} WHERE r.id = ?"))
            .bind(review_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| review_from_row(&r)))
    }

    pub async fn list_reviews(&self, barber_id: Option<BarberId>) -> Result<Vec<Review>> {
        let rows = match barber_id {
            Some(barber_id) => {
                sqlx::query(&format!(
                    "{REVIEW_SELECT} WHERE r.barber_id = ? ORDER BY r.created_at DESC, r.id DESC"
                ))
                .bind(barber_id.0)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{REVIEW_SELECT} ORDER BY r.created_at DESC, r.id DESC"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.iter().map(review_from_row).collect())
    }
}

fn parse_user_type(raw: &str) -> UserType {
    match raw {
        "barber" => UserType::Barber,
        _ => UserType::Customer,
    }
}

fn parse_status(raw: &str) -> AppointmentStatus {
    raw.parse().unwrap_or(AppointmentStatus::Pending)
}

fn stored_user_from_row(r: &SqliteRow) -> StoredUser {
    StoredUser {
        user_id: UserId(r.get::<i64, _>("id")),
        email: r.get::<String, _>("email"),
        password_hash: r.get::<String, _>("password_hash"),
        first_name: r.get::<String, _>("first_name"),
        last_name: r.get::<String, _>("last_name"),
        phone: r.get::<String, _>("phone"),
        user_type: parse_user_type(&r.get::<String, _>("user_type")),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn user_summary_from_row(r: &SqliteRow) -> UserSummary {
    UserSummary {
        user_id: UserId(r.get::<i64, _>("user_id")),
        email: r.get::<String, _>("email"),
        first_name: r.get::<String, _>("first_name"),
        last_name: r.get::<String, _>("last_name"),
        phone: r.get::<String, _>("phone"),
        user_type: parse_user_type(&r.get::<String, _>("user_type")),
    }
}

fn barber_from_row(r: &SqliteRow) -> Result<BarberProfile> {
    let barber_id = BarberId(r.get::<i64, _>("barber_id"));
    let services: Vec<ServiceOffering> = serde_json::from_str(&r.get::<String, _>("services"))
        .with_context(|| format!("corrupt services column for barber {barber_id}"))?;
    let location = match (r.get::<Option<f64>, _>("lat"), r.get::<Option<f64>, _>("lng")) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    };
    Ok(BarberProfile {
        barber_id,
        user: user_summary_from_row(r),
        shop_name: r.get::<String, _>("shop_name"),
        address: r.get::<String, _>("address"),
        services,
        availability: Availability {
            open_hour: r.get::<u32, _>("open_hour"),
            close_hour: r.get::<u32, _>("close_hour"),
        },
        location,
        image: r.get::<Option<String>, _>("image"),
        avg_rating: r.get::<f64, _>("avg_rating"),
        review_count: r.get::<i64, _>("review_count"),
    })
}

fn appointment_from_row(r: &SqliteRow) -> Appointment {
    Appointment {
        appointment_id: AppointmentId(r.get::<i64, _>("appointment_id")),
        customer: user_summary_from_row(r),
        barber: AppointmentBarber {
            barber_id: BarberId(r.get::<i64, _>("barber_id")),
            user_id: UserId(r.get::<i64, _>("barber_user_id")),
            shop_name: r.get::<String, _>("shop_name"),
        },
        date: r.get::<NaiveDate, _>("date"),
        time: r.get::<NaiveTime, _>("time"),
        service: r.get::<String, _>("service"),
        price: r.get::<i64, _>("price"),
        status: parse_status(&r.get::<String, _>("status")),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn review_from_row(r: &SqliteRow) -> Review {
    Review {
        review_id: ReviewId(r.get::<i64, _>("review_id")),
        barber_id: BarberId(r.get::<i64, _>("barber_id")),
        customer: user_summary_from_row(r),
        rating: u8::try_from(r.get::<i64, _>("rating")).unwrap_or_default(),
        comment: r.get::<String, _>("comment"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}

/// True when `err` wraps a UNIQUE constraint failure, such as a duplicate email.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
