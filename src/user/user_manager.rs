use super::{
    auth::PromemoriaHasher, AuthToken, AuthTokenValue, UserAuthCredentials, UserStore,
    UsernamePasswordCredentials,
};
use anyhow::{bail, Context, Result};
use std::time::SystemTime;

/// High-level user operations on top of a [`UserStore`].
pub struct UserManager {
    user_store: Box<dyn UserStore>,
}

impl UserManager {
    pub fn new(user_store: Box<dyn UserStore>) -> Self {
        Self { user_store }
    }

    pub fn add_user<T: AsRef<str>>(&self, user_handle: T) -> Result<usize> {
        let user_handle = user_handle.as_ref();
        if user_handle.is_empty() {
            bail!("The user handle cannot be empty.");
        }
        if self.user_store.get_user_id(user_handle)?.is_some() {
            bail!("User handle already exists.");
        }

        self.user_store.create_user(user_handle)
    }

    pub fn get_all_user_handles(&self) -> Result<Vec<String>> {
        self.user_store.get_all_user_handles()
    }

    pub fn get_user_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>> {
        self.user_store.get_user_auth_credentials(user_handle)
    }

    pub fn get_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        self.user_store.get_user_auth_token(value)
    }

    pub fn update_auth_token_last_used(&self, value: &AuthTokenValue) -> Result<()> {
        self.user_store
            .update_user_auth_token_last_used_timestamp(value)
    }

    pub fn generate_auth_token(&self, credentials: &UserAuthCredentials) -> Result<AuthToken> {
        let token = AuthToken {
            user_id: credentials.user_id,
            value: AuthTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.add_user_auth_token(token.clone())?;
        Ok(token)
    }

    pub fn delete_auth_token(&self, user_id: &usize, value: &AuthTokenValue) -> Result<()> {
        match self.user_store.get_user_auth_token(value)? {
            Some(token) if token.user_id == *user_id => {
                self.user_store.delete_user_auth_token(value)?;
                Ok(())
            }
            _ => bail!("Token not found"),
        }
    }

    fn create_hashed_password(
        user_id: usize,
        password: String,
    ) -> Result<UsernamePasswordCredentials> {
        let hasher = PromemoriaHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password.as_bytes(), &salt)?;
        Ok(UsernamePasswordCredentials {
            user_id,
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
            last_tried: None,
            last_used: None,
        })
    }

    pub fn create_password_credentials(&self, user_handle: &str, password: String) -> Result<()> {
        let existing = self.user_store.get_user_auth_credentials(user_handle)?;
        if existing
            .as_ref()
            .map(|c| c.username_password.is_some())
            .unwrap_or(false)
        {
            bail!(
                "User with handle {} already has password credentials. Maybe you want to modify it?",
                user_handle
            );
        }

        let user_id = self
            .user_store
            .get_user_id(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;

        let credentials = UserAuthCredentials {
            user_id,
            username_password: Some(Self::create_hashed_password(user_id, password)?),
        };
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn update_password_credentials(&self, user_handle: &str, password: String) -> Result<()> {
        let user_id = self
            .user_store
            .get_user_id(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;

        let credentials = UserAuthCredentials {
            user_id,
            username_password: Some(Self::create_hashed_password(user_id, password)?),
        };
        self.user_store.update_user_auth_credentials(credentials)
    }
}
