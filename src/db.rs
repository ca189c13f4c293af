use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open a writable pool on `path`, creating the file if missing.
///
/// Single connection: merged databases have exactly one writer.
pub async fn open_rw(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// Open a read-only pool on an existing database file.
pub async fn open_ro(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options =
        SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?.read_only(true);

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
}
