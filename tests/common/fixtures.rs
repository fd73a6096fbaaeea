//! Test database fixtures

use super::constants::*;
use promemoria_server::user::{SqliteUserStore, UserManager};
use std::path::PathBuf;
use tempfile::TempDir;

/// Creates a temporary user database seeded with the two test users.
pub fn create_test_user_db() -> anyhow::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("user.db");

    let store = SqliteUserStore::new(&db_path)?;
    let manager = UserManager::new(Box::new(store));

    manager.add_user(TEST_USER)?;
    manager.create_password_credentials(TEST_USER, TEST_PASS.to_string())?;

    manager.add_user(OTHER_USER)?;
    manager.create_password_credentials(OTHER_USER, OTHER_PASS.to_string())?;

    Ok((dir, db_path))
}
