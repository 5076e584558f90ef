use std::borrow::Cow;

use crate::model::apperror::{ApplicationError, ErrorType};

pub mod geography;
pub mod users;

/**
 * Handles database errors and maps them to application errors.
 *
 * # Arguments
 * `error`: The database error to handle.
 *
 * # Returns
 * An `ApplicationError` corresponding to the database error.
 */
pub fn handle_database_error(error: Option<&dyn sqlx::error::DatabaseError>) -> ApplicationError {
    if let Some(db_error) = error {
        tracing::debug!("Database error: {}", db_error);
        tracing::info!("Add/Update error: {:?}", db_error.code());
        if db_error.code() == Some(Cow::Borrowed("23505")) {
            // Unique violation
            return ApplicationError::new(ErrorType::ConstraintViolation, "Already exists".to_string());
        } else if db_error.code() == Some(Cow::Borrowed("23503")) {
            // Foreign key violation
            return ApplicationError::new(ErrorType::ConstraintViolation, "Missing parent value".to_string());
        } else if db_error.code() == Some(Cow::Borrowed("22001")) {
            // Value too long
            return ApplicationError::new(ErrorType::Validation, "Value too long".to_string());
        }
        tracing::error!("Unhandled database error: {}", db_error);
        return ApplicationError::new(ErrorType::DatabaseError, "Unhandled database error".to_string());
    }
    ApplicationError::new(ErrorType::DatabaseError, "Failed to execute database operation".to_string())
}

/**
 * Escapes LIKE wildcards so the value matches literally inside a pattern.
 */
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}


#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use sqlx::PgPool;

    use super::*;

    async fn connect() -> PgPool {
        dotenv::from_filename("./sqlx-postgresql-migration/.env-test").ok();
        let pool = PgPool::connect(dotenv::var("DATABASE_URL").unwrap().as_str()).await.unwrap();
        sqlx::migrate!("./sqlx-postgresql-migration/migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_sqlstate_mapping() {
        let pool = connect().await;
        let mut transaction = pool.begin().await.unwrap();
        sqlx::query("INSERT INTO counties (name) VALUES ('Zala')").execute(&mut *transaction).await.unwrap();
        let err = sqlx::query("INSERT INTO counties (name) VALUES ('Zala')").execute(&mut *transaction).await.unwrap_err();
        assert_eq!(handle_database_error(err.as_database_error()).error_type, ErrorType::ConstraintViolation);
        transaction.rollback().await.unwrap();

        let mut transaction = pool.begin().await.unwrap();
        let err = sqlx::query("INSERT INTO cities (name, county_id) VALUES ('Aba', -1)").execute(&mut *transaction).await.unwrap_err();
        let error = handle_database_error(err.as_database_error());
        assert_eq!(error.message, "Missing parent value");
        transaction.rollback().await.unwrap();

        let mut transaction = pool.begin().await.unwrap();
        let err = sqlx::query("INSERT INTO postal_codes (code, city_id) VALUES ('123456', 1)").execute(&mut *transaction).await.unwrap_err();
        assert_eq!(handle_database_error(err.as_database_error()).error_type, ErrorType::Validation);
        transaction.rollback().await.unwrap();
    }
}
