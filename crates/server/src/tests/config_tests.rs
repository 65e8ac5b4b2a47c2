use super::{apply_file_settings, normalize_database_url, prepare_database_url, Settings};

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite://./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\sara\\booking.db"),
        "sqlite:C:/Users/sara/booking.db"
    );
    assert_eq!(
        normalize_database_url("C:\\Users\\sara\\booking.db"),
        "sqlite:C:/Users/sara/booking.db"
    );
    assert_eq!(
        normalize_database_url("sqlite://C:/Users/sara/booking.db"),
        "sqlite:C:/Users/sara/booking.db"
    );
}

#[test]
fn file_settings_override_defaults() {
    let mut settings = Settings::default();
    apply_file_settings(
        &mut settings,
        r#"
bind_addr = "0.0.0.0:9000"
jwt_secret = "from-file"
token_ttl_seconds = 120
"#,
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.jwt_secret, "from-file");
    assert_eq!(settings.token_ttl_seconds, 120);
    assert_eq!(settings.database_url, Settings::default().database_url);
}

#[test]
fn malformed_file_settings_are_ignored() {
    let mut settings = Settings::default();
    apply_file_settings(&mut settings, "bind_addr = [");
    assert_eq!(settings.server_bind, Settings::default().server_bind);
}

#[test]
fn creates_parent_dir_for_sqlite_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.path().join("data").exists());
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("barberconnect.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );
}
