use std::collections::HashMap;

use sqlx::{Pool, Postgres, Transaction};

use crate::{
    dao::geography::GeographyDao,
    model::apperror::{ApplicationError, ErrorType},
};

/**
 * Storage operations the importer needs, scoped to one open transaction.
 */
pub trait ImportStore {
    /**
     * Every county name with its id.
     */
    async fn county_ids(&mut self) -> Result<HashMap<String, i64>, ApplicationError>;

    /**
     * Returns the county id and whether it was inserted.
     */
    async fn first_or_create_county(&mut self, name: &str) -> Result<(i64, bool), ApplicationError>;

    /**
     * Returns the city id and whether it was inserted.
     */
    async fn first_or_create_city(&mut self, name: &str, county_id: i64) -> Result<(i64, bool), ApplicationError>;

    /**
     * Inserts the postal code unless the code exists. Returns true if inserted.
     */
    async fn add_postal_code_if_absent(&mut self, code: &str, city_id: i64) -> Result<bool, ApplicationError>;

    async fn commit(self) -> Result<(), ApplicationError>;

    async fn rollback(self) -> Result<(), ApplicationError>;
}

/**
 * Opens transactions for the importer.
 */
pub trait ImportBackend {
    type Store: ImportStore;

    async fn begin(&self) -> Result<Self::Store, ApplicationError>;
}

/**
 * PostgreSQL backend for the importer.
 */
pub struct PgImportBackend {
    connection_pool: Pool<Postgres>,
    geography_dao: GeographyDao,
}

impl PgImportBackend {
    pub fn new(connection_pool: Pool<Postgres>, geography_dao: GeographyDao) -> Self {
        PgImportBackend { connection_pool, geography_dao }
    }
}

impl ImportBackend for PgImportBackend {
    type Store = PgImportStore;

    async fn begin(&self) -> Result<PgImportStore, ApplicationError> {
        let transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        Ok(PgImportStore { transaction, geography_dao: self.geography_dao.clone() })
    }
}

/**
 * A single import transaction.
 */
pub struct PgImportStore {
    transaction: Transaction<'static, Postgres>,
    geography_dao: GeographyDao,
}

impl ImportStore for PgImportStore {
    async fn county_ids(&mut self) -> Result<HashMap<String, i64>, ApplicationError> {
        self.geography_dao.get_county_ids(&mut self.transaction).await
    }

    async fn first_or_create_county(&mut self, name: &str) -> Result<(i64, bool), ApplicationError> {
        self.geography_dao.first_or_create_county(&mut self.transaction, name).await
    }

    async fn first_or_create_city(&mut self, name: &str, county_id: i64) -> Result<(i64, bool), ApplicationError> {
        self.geography_dao.first_or_create_city(&mut self.transaction, name, county_id).await
    }

    async fn add_postal_code_if_absent(&mut self, code: &str, city_id: i64) -> Result<bool, ApplicationError> {
        self.geography_dao.add_postal_code_if_absent(&mut self.transaction, code, city_id).await
    }

    async fn commit(self) -> Result<(), ApplicationError> {
        self.transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))
    }

    async fn rollback(self) -> Result<(), ApplicationError> {
        self.transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))
    }
}

/**
 * In-memory backend with snapshot transactions for importer tests.
 */
