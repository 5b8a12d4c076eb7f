//! Driver accounts: registration, credential checks and the one-time vehicle capture.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use thiserror::Error;
use uuid::Uuid;

use crate::db::Account;
use crate::DbPool;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Username already exists")]
    UsernameTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Vehicle number is already registered for this account")]
    VehicleAlreadySet,

    #[error("Account not found")]
    NotFound,

    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

lazy_static! {
    /// Verified against when the username is unknown, so both failures cost one Argon2 run.
    static ref UNKNOWN_USER_HASH: String =
        hash_password("parkslot-unknown-user").unwrap_or_default();
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())?;
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Canonical form of a vehicle registration: trimmed, upper-case.
pub fn normalize_vehicle_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Clone)]
pub struct AccountStore {
    db: DbPool,
}

impl AccountStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Create an account. The username is stored trimmed.
    pub async fn register(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        let username = username.trim();
        let id = Uuid::new_v4().to_string();
        let password_hash =
            hash_password(password).map_err(|e| AccountError::Hash(e.to_string()))?;

        sqlx::query("INSERT INTO accounts (id, username, password_hash) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(username)
            .bind(&password_hash)
            .execute(&self.db)
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint failed") {
                    AccountError::UsernameTaken
                } else {
                    AccountError::Database(e)
                }
            })?;

        tracing::info!(account = %id, username = %username, "Account registered");

        self.find_by_id(&id).await
    }

    /// Check a username/password pair. Unknown users and wrong passwords look the same.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        let Some(account) = self.find_by_username(username.trim()).await? else {
            verify_password(password, &UNKNOWN_USER_HASH);
            tracing::debug!(username = %username.trim(), "Unknown username");
            return Err(AccountError::InvalidCredentials);
        };

        if !verify_password(password, &account.password_hash) {
            tracing::debug!(username = %account.username, "Password mismatch");
            return Err(AccountError::InvalidCredentials);
        }

        Ok(account)
    }

    /// Record the account's vehicle. Only the first call takes effect.
    pub async fn set_vehicle_once(&self, account_id: &str, vehicle: &str) -> Result<Account, AccountError> {
        let vehicle = normalize_vehicle_number(vehicle);

        let result = sqlx::query(
            "UPDATE accounts SET vehicle_number = ? WHERE id = ? AND vehicle_number IS NULL",
        )
        .bind(&vehicle)
        .bind(account_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            // Either the account is missing or the vehicle was already captured
            let account = self.find_by_id(account_id).await?;
            tracing::debug!(account = %account.id, "Vehicle number already set");
            return Err(AccountError::VehicleAlreadySet);
        }

        tracing::info!(account = %account_id, vehicle = %vehicle, "Vehicle number registered");

        self.find_by_id(account_id).await
    }

    pub async fn find_by_id(&self, account_id: &str) -> Result<Account, AccountError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AccountError::NotFound)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AccountError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }
}
