use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    dao::handle_database_error,
    model::{
        apperror::{ApplicationError, ErrorType},
        db::{UserCredentialsDbResp, UserDbResp},
        models::UserDetailType,
    },
};

const ADD_USER: &str = "INSERT INTO users (name, email, password, created_at, updated_at) VALUES ($1, $2, $3, now(), now())
                        RETURNING id, name, email, created_at, updated_at";

const QUERY_USER: &str = "SELECT id, name, email, created_at, updated_at FROM users WHERE id = $1";

const QUERY_USER_CREDENTIALS: &str = "SELECT id, name, email, password, created_at, updated_at FROM users WHERE email = $1";

const QUERY_EMAIL_TAKEN: &str = "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)";

const ADD_ACCESS_TOKEN: &str = "INSERT INTO access_tokens (user_id, token_id, name, expires_at, created_at) VALUES ($1, $2, $3, $4, now())";

/**
 * Marks the token as used and returns its owner. No row is returned for revoked or expired tokens.
 */
const TOUCH_ACCESS_TOKEN: &str = "UPDATE access_tokens SET last_used_at = now() WHERE token_id = $1 AND expires_at > now() RETURNING user_id";

const DELETE_ACCESS_TOKEN: &str = "DELETE FROM access_tokens WHERE token_id = $1";

/**
 * DAO for users and their access tokens.
 */
#[derive(Clone, Default)]
pub struct UserDao {}

impl UserDao {
    pub fn new() -> Self {
        UserDao {}
    }

    /**
     * Adds a new user.
     *
     * # Arguments
     * `transaction`: The database transaction.
     * `name`: Display name.
     * `email`: Normalized email address.
     * `password_hash`: PHC formatted password hash.
     *
     * # Returns
     * The stored user.
     */
    #[instrument(skip(self, transaction, password_hash), fields(result))]
    pub async fn add_user(&self, transaction: &mut PgConnection, name: &str, email: &str, password_hash: &str) -> Result<UserDetailType, ApplicationError> {
        let span = tracing::Span::current();
        let row: UserDbResp = sqlx::query_as(ADD_USER)
            .bind(name)
            .bind(email)
            .bind(password_hash)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(UserDetailType::from(row))
    }

    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_user(&self, connection: &mut PgConnection, user_id: i64) -> Result<Option<UserDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let row: Option<UserDbResp> = sqlx::query_as(QUERY_USER)
            .bind(user_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get user: {err}")))?;
        Ok(row.map(UserDetailType::from))
    }

    /**
     * Retrieves a user and the stored password hash by email.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_user_credentials(&self, connection: &mut PgConnection, email: &str) -> Result<Option<(UserDetailType, String)>, ApplicationError> {
        let span = tracing::Span::current();
        let row: Option<UserCredentialsDbResp> = sqlx::query_as(QUERY_USER_CREDENTIALS)
            .bind(email)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get user credentials: {err}")))?;
        Ok(row.map(|(id, name, email, password, created_at, updated_at)| (UserDetailType { id, name, email, created_at, updated_at }, password)))
    }

    #[instrument(skip(self, connection), fields(result))]
    pub async fn is_email_taken(&self, connection: &mut PgConnection, email: &str) -> Result<bool, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(QUERY_EMAIL_TAKEN)
            .bind(email)
            .fetch_one(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to check email: {err}")))
    }

    /**
     * Records an issued access token so it can be revoked later.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_access_token(&self, transaction: &mut PgConnection, user_id: i64, token_id: &str, name: &str, expires_at: DateTime<Utc>) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(ADD_ACCESS_TOKEN)
            .bind(user_id)
            .bind(token_id)
            .bind(name)
            .bind(expires_at)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(())
    }

    /**
     * Marks a live token as used.
     *
     * # Returns
     * The owning user id, or None if the token was revoked or has expired.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn touch_access_token(&self, connection: &mut PgConnection, token_id: &str) -> Result<Option<i64>, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(TOUCH_ACCESS_TOKEN)
            .bind(token_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to verify access token: {err}")))
    }

    /**
     * Revokes a token.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_access_token(&self, transaction: &mut PgConnection, token_id: &str) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_ACCESS_TOKEN)
            .bind(token_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete access token: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Access token {} already revoked", token_id);
        }
        Ok(())
    }
}
