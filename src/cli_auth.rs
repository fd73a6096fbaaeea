//! User provisioning tool for the promemoria server.
//!
//! There is no self-service signup; users and their password credentials
//! are created out of band with this binary, against the same user db the
//! server runs on.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod sqlite_persistence;
mod user;

use user::{SqliteUserStore, UserManager};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite user database file.
    #[clap(value_parser = parse_path)]
    pub user_db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a user with the given handle.
    AddUser { user_handle: String },

    /// Creates a password authentication for the given user.
    /// Fails if the user already has a password set.
    AddLogin {
        user_handle: String,
        password: String,
    },

    /// Change the password of a user.
    UpdateLogin {
        user_handle: String,
        password: String,
    },

    /// Verifies the password of a given user. It doesn't make any
    /// persistent change, nor does it create any token, it just
    /// compares the password hash.
    CheckPassword {
        user_handle: String,
        password: String,
    },

    /// Shows all user handles.
    UserHandles,
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let store = SqliteUserStore::new(&cli_args.user_db)
        .with_context(|| format!("Failed to open user db at {:?}", cli_args.user_db))?;
    let manager = UserManager::new(Box::new(store));

    match cli_args.command {
        Command::AddUser { user_handle } => {
            let user_id = manager.add_user(&user_handle)?;
            println!("Created user {} with id {}", user_handle, user_id);
        }
        Command::AddLogin {
            user_handle,
            password,
        } => {
            manager.create_password_credentials(&user_handle, password)?;
            println!("Password set for {}", user_handle);
        }
        Command::UpdateLogin {
            user_handle,
            password,
        } => {
            manager.update_password_credentials(&user_handle, password)?;
            println!("Password updated for {}", user_handle);
        }
        Command::CheckPassword {
            user_handle,
            password,
        } => {
            let credentials = manager
                .get_user_credentials(&user_handle)?
                .with_context(|| format!("User {} not found", user_handle))?;
            let pw = credentials
                .username_password
                .with_context(|| format!("User {} has no password set", user_handle))?;
            if pw
                .hasher
                .verify(password.as_str(), pw.hash.as_str(), pw.salt.as_str())?
            {
                println!("Password OK");
            } else {
                println!("Password mismatch");
            }
        }
        Command::UserHandles => {
            for handle in manager.get_all_user_handles()? {
                println!("{}", handle);
            }
        }
    }

    Ok(())
}
