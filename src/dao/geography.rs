use std::collections::HashMap;

use futures_util::TryStreamExt;
use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    dao::{escape_like, handle_database_error},
    model::{
        apperror::{ApplicationError, ErrorType},
        db::{CityDbResp, CountyDbResp, PostalCodeDbResp},
        models::{
            CityAddUpdateInputType, CityDetailType, CityFilterInput, CountyDetailType, CountyFilterInput, ListOutputType, PaginationInput, PaginationOutput, PostalCodeDetailType,
            PostalCodeFilterInput,
        },
    },
};

/***************** Counties *********************/

const QUERY_COUNTY_LIST: &str = "SELECT id, name, created_at, updated_at FROM counties
                                 WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
                                 ORDER BY id LIMIT $2 OFFSET $3";

const COUNT_COUNTY_LIST: &str = "SELECT COUNT(*) FROM counties WHERE ($1::text IS NULL OR name ILIKE '%' || $1 || '%')";

const QUERY_COUNTY: &str = "SELECT id, name, created_at, updated_at FROM counties WHERE id = $1";

const QUERY_COUNTY_ID_BY_NAME: &str = "SELECT id FROM counties WHERE name = $1";

/**
 * Every county name with its id. Used to seed the import lookup cache.
 */
const QUERY_COUNTY_IDS: &str = "SELECT name, id FROM counties";

const ADD_COUNTY: &str = "INSERT INTO counties (name, created_at, updated_at) VALUES ($1, now(), now()) RETURNING id";

const UPDATE_COUNTY: &str = "UPDATE counties SET name = $1, updated_at = now() WHERE id = $2";

const DELETE_COUNTY: &str = "DELETE FROM counties WHERE id = $1";

/**
 * Returns the id of the county with the given name, inserting it first when missing.
 * The second column tells whether the row was inserted by this statement. Returns no row
 * when a concurrent transaction committed the same name after the statement snapshot.
 */
const FIRST_OR_CREATE_COUNTY: &str = "WITH existing AS (SELECT id FROM counties WHERE name = $1),
                                      inserted AS (
                                          INSERT INTO counties (name, created_at, updated_at)
                                          SELECT $1, now(), now() WHERE NOT EXISTS (SELECT 1 FROM existing)
                                          ON CONFLICT (name) DO NOTHING RETURNING id
                                      )
                                      SELECT id, true FROM inserted UNION ALL SELECT id, false FROM existing";

/***************** Cities *********************/

const CITY_COLUMNS: &str = "SELECT c.id, c.name, c.created_at, c.updated_at, k.id, k.name, k.created_at, k.updated_at
                            FROM cities c JOIN counties k ON k.id = c.county_id";

const CITY_FILTER: &str = "WHERE ($1::text IS NULL OR c.name ILIKE '%' || $1 || '%')
                           AND ($2::text IS NULL OR k.name ILIKE '%' || $2 || '%')";

const QUERY_CITY_ID_BY_NAME: &str = "SELECT id FROM cities WHERE name = $1 AND county_id = $2";

const ADD_CITY: &str = "INSERT INTO cities (name, county_id, created_at, updated_at) VALUES ($1, $2, now(), now()) RETURNING id";

const UPDATE_CITY: &str = "UPDATE cities SET name = $1, county_id = $2, updated_at = now() WHERE id = $3";

const DELETE_CITY: &str = "DELETE FROM cities WHERE id = $1";

const FIRST_OR_CREATE_CITY: &str = "WITH existing AS (SELECT id FROM cities WHERE name = $1 AND county_id = $2),
                                    inserted AS (
                                        INSERT INTO cities (name, county_id, created_at, updated_at)
                                        SELECT $1, $2, now(), now() WHERE NOT EXISTS (SELECT 1 FROM existing)
                                        ON CONFLICT (county_id, name) DO NOTHING RETURNING id
                                    )
                                    SELECT id, true FROM inserted UNION ALL SELECT id, false FROM existing";

/***************** Postal codes *********************/

const POSTAL_CODE_COLUMNS: &str = "SELECT p.id, p.code, p.created_at, p.updated_at, c.id, c.name, c.created_at, c.updated_at, k.id, k.name, k.created_at, k.updated_at
                                   FROM postal_codes p JOIN cities c ON c.id = p.city_id JOIN counties k ON k.id = c.county_id";

const POSTAL_CODE_FILTER: &str = "WHERE ($1::text IS NULL OR p.code LIKE $1 || '%')
                                  AND ($2::text IS NULL OR c.name ILIKE '%' || $2 || '%')
                                  AND ($3::text IS NULL OR k.name ILIKE '%' || $3 || '%')";

const QUERY_POSTAL_CODE_ID_BY_CODE: &str = "SELECT id FROM postal_codes WHERE code = $1";

const ADD_POSTAL_CODE: &str = "INSERT INTO postal_codes (code, city_id, created_at, updated_at) VALUES ($1, $2, now(), now()) RETURNING id";

/**
 * Inserts a postal code unless the code is already taken. Returns no row for an existing code.
 */
const ADD_POSTAL_CODE_IF_ABSENT: &str = "INSERT INTO postal_codes (code, city_id, created_at, updated_at) VALUES ($1, $2, now(), now())
                                         ON CONFLICT (code) DO NOTHING RETURNING id";

const UPDATE_POSTAL_CODE: &str = "UPDATE postal_codes SET code = $1, city_id = $2, updated_at = now() WHERE id = $3";

const DELETE_POSTAL_CODE: &str = "DELETE FROM postal_codes WHERE id = $1";

/**
 * DAO for counties, cities and postal codes.
 */
#[derive(Clone, Default)]
pub struct GeographyDao {}

impl GeographyDao {
    /**
     * Creates a new instance of `GeographyDao`.
     *
     * # Returns
     * A new instance of `GeographyDao`.
     */
    pub fn new() -> Self {
        GeographyDao {}
    }

    /**
     * Retrieves a page of counties matching the filter.
     *
     * # Arguments
     * `connection`: The database connection.
     * `pagination_input`: `PaginationInput` containing pagination information.
     * `filter`: Optional name substring.
     *
     * # Returns
     * A Result containing the page of counties or an `ApplicationError`.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_county_list(&self, connection: &mut PgConnection, pagination_input: PaginationInput, filter: CountyFilterInput) -> Result<ListOutputType<CountyDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let needle = filter.needle.as_deref().map(escape_like);
        let total: i64 = sqlx::query_scalar(COUNT_COUNTY_LIST)
            .bind(needle.clone())
            .fetch_one(&mut *connection)
            .instrument(span.clone())
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to count counties: {err}")))?;
        let results: Vec<CountyDbResp> = sqlx::query_as(QUERY_COUNTY_LIST)
            .bind(needle)
            .bind(pagination_input.per_page)
            .bind(pagination_input.offset())
            .fetch_all(&mut *connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get county list: {err}")))?;
        let elements = results.into_iter().map(CountyDetailType::from).collect();
        Ok(ListOutputType::new(elements, PaginationOutput::new(&pagination_input, total)))
    }

    /**
     * Retrieves a county by id.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_county(&self, connection: &mut PgConnection, county_id: i64) -> Result<Option<CountyDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<CountyDbResp> = sqlx::query_as(QUERY_COUNTY)
            .bind(county_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get county: {err}")))?;
        Ok(result.map(CountyDetailType::from))
    }

    /**
     * Retrieves the id of the county with exactly this name.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn find_county_id(&self, connection: &mut PgConnection, name: &str) -> Result<Option<i64>, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(QUERY_COUNTY_ID_BY_NAME)
            .bind(name)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to find county: {err}")))
    }

    /**
     * Loads every county as a name to id map.
     */
    #[instrument(skip(self, connection))]
    pub async fn get_county_ids(&self, connection: &mut PgConnection) -> Result<HashMap<String, i64>, ApplicationError> {
        let mut rows = sqlx::query_as::<_, (String, i64)>(QUERY_COUNTY_IDS).fetch(connection);
        let mut counties = HashMap::new();
        while let Some((name, id)) = rows.try_next().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to load counties: {err}")))? {
            counties.insert(name, id);
        }
        tracing::debug!("Loaded {} counties", counties.len());
        Ok(counties)
    }

    /**
     * Adds a new county to the database.
     *
     * # Returns
     * The id of the new county.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_county(&self, transaction: &mut PgConnection, name: &str) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(ADD_COUNTY)
            .bind(name)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))
    }

    /**
     * Renames a county.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn update_county(&self, transaction: &mut PgConnection, county_id: i64, name: &str) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_COUNTY)
            .bind(name)
            .bind(county_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Self::check_single_row(result.rows_affected(), "County", county_id)
    }

    /**
     * Deletes a county. Its cities and their postal codes are removed by cascade.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_county(&self, transaction: &mut PgConnection, county_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_COUNTY)
            .bind(county_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete county: {err}")))?;
        Self::check_single_row(result.rows_affected(), "County", county_id)
    }

    /**
     * Returns the county id for the name, inserting the county when missing.
     *
     * # Returns
     * The id and whether the county was inserted.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn first_or_create_county(&self, transaction: &mut PgConnection, name: &str) -> Result<(i64, bool), ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<(i64, bool)> = sqlx::query_as(FIRST_OR_CREATE_COUNTY)
            .bind(name)
            .fetch_optional(&mut *transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        if let Some(result) = result {
            return Ok(result);
        }
        let county_id = self.find_county_id(transaction, name).await?.ok_or_else(|| ApplicationError::new(ErrorType::Application, format!("County {name} could not be resolved")))?;
        Ok((county_id, false))
    }

    /**
     * Retrieves a page of cities with their county.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_city_list(&self, connection: &mut PgConnection, pagination_input: PaginationInput, filter: CityFilterInput) -> Result<ListOutputType<CityDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let needle = filter.needle.as_deref().map(escape_like);
        let county = filter.county.as_deref().map(escape_like);
        let count_query = format!("SELECT COUNT(*) FROM cities c JOIN counties k ON k.id = c.county_id {CITY_FILTER}");
        let total: i64 = sqlx::query_scalar(&count_query)
            .bind(needle.clone())
            .bind(county.clone())
            .fetch_one(&mut *connection)
            .instrument(span.clone())
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to count cities: {err}")))?;
        let list_query = format!("{CITY_COLUMNS} {CITY_FILTER} ORDER BY c.id LIMIT $3 OFFSET $4");
        let results: Vec<CityDbResp> = sqlx::query_as(&list_query)
            .bind(needle)
            .bind(county)
            .bind(pagination_input.per_page)
            .bind(pagination_input.offset())
            .fetch_all(&mut *connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get city list: {err}")))?;
        let elements = results.into_iter().map(CityDetailType::from).collect();
        Ok(ListOutputType::new(elements, PaginationOutput::new(&pagination_input, total)))
    }

    /**
     * Retrieves a city with its county.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_city(&self, connection: &mut PgConnection, city_id: i64) -> Result<Option<CityDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("{CITY_COLUMNS} WHERE c.id = $1");
        let result: Option<CityDbResp> = sqlx::query_as(&query)
            .bind(city_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get city: {err}")))?;
        Ok(result.map(CityDetailType::from))
    }

    /**
     * Retrieves the id of the city with this name in the county.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn find_city_id(&self, connection: &mut PgConnection, name: &str, county_id: i64) -> Result<Option<i64>, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(QUERY_CITY_ID_BY_NAME)
            .bind(name)
            .bind(county_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to find city: {err}")))
    }

    /**
     * Adds a new city.
     *
     * # Returns
     * The id of the new city.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_city(&self, transaction: &mut PgConnection, city_add_input: CityAddUpdateInputType) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(ADD_CITY)
            .bind(city_add_input.name)
            .bind(city_add_input.county_id)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))
    }

    #[instrument(skip(self, transaction), fields(result))]
    pub async fn update_city(&self, transaction: &mut PgConnection, city_id: i64, city_update_input: CityAddUpdateInputType) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_CITY)
            .bind(city_update_input.name)
            .bind(city_update_input.county_id)
            .bind(city_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Self::check_single_row(result.rows_affected(), "City", city_id)
    }

    /**
     * Deletes a city. Its postal codes are removed by cascade.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_city(&self, transaction: &mut PgConnection, city_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_CITY)
            .bind(city_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete city: {err}")))?;
        Self::check_single_row(result.rows_affected(), "City", city_id)
    }

    /**
     * Returns the city id for the name within the county, inserting the city when missing.
     *
     * # Returns
     * The id and whether the city was inserted.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn first_or_create_city(&self, transaction: &mut PgConnection, name: &str, county_id: i64) -> Result<(i64, bool), ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<(i64, bool)> = sqlx::query_as(FIRST_OR_CREATE_CITY)
            .bind(name)
            .bind(county_id)
            .fetch_optional(&mut *transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        if let Some(result) = result {
            return Ok(result);
        }
        let city_id = self.find_city_id(transaction, name, county_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::Application, format!("City {name} could not be resolved")))?;
        Ok((city_id, false))
    }

    /**
     * Retrieves a page of postal codes with their city and county.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_postal_code_list(
        &self,
        connection: &mut PgConnection,
        pagination_input: PaginationInput,
        filter: PostalCodeFilterInput,
    ) -> Result<ListOutputType<PostalCodeDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let code = filter.code.as_deref().map(escape_like);
        let city = filter.city.as_deref().map(escape_like);
        let county = filter.county.as_deref().map(escape_like);
        let count_query = format!("SELECT COUNT(*) FROM postal_codes p JOIN cities c ON c.id = p.city_id JOIN counties k ON k.id = c.county_id {POSTAL_CODE_FILTER}");
        let total: i64 = sqlx::query_scalar(&count_query)
            .bind(code.clone())
            .bind(city.clone())
            .bind(county.clone())
            .fetch_one(&mut *connection)
            .instrument(span.clone())
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to count postal codes: {err}")))?;
        let list_query = format!("{POSTAL_CODE_COLUMNS} {POSTAL_CODE_FILTER} ORDER BY p.code LIMIT $4 OFFSET $5");
        let results: Vec<PostalCodeDbResp> = sqlx::query_as(&list_query)
            .bind(code)
            .bind(city)
            .bind(county)
            .bind(pagination_input.per_page)
            .bind(pagination_input.offset())
            .fetch_all(&mut *connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get postal code list: {err}")))?;
        let elements = results.into_iter().map(PostalCodeDetailType::from).collect();
        Ok(ListOutputType::new(elements, PaginationOutput::new(&pagination_input, total)))
    }

    /**
     * Retrieves a postal code by id.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_postal_code(&self, connection: &mut PgConnection, postal_code_id: i64) -> Result<Option<PostalCodeDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("{POSTAL_CODE_COLUMNS} WHERE p.id = $1");
        let result: Option<PostalCodeDbResp> = sqlx::query_as(&query)
            .bind(postal_code_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get postal code: {err}")))?;
        Ok(result.map(PostalCodeDetailType::from))
    }

    /**
     * Retrieves a postal code by its exact code.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_postal_code_by_code(&self, connection: &mut PgConnection, code: &str) -> Result<Option<PostalCodeDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let query = format!("{POSTAL_CODE_COLUMNS} WHERE p.code = $1");
        let result: Option<PostalCodeDbResp> = sqlx::query_as(&query)
            .bind(code)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to search postal code: {err}")))?;
        Ok(result.map(PostalCodeDetailType::from))
    }

    /**
     * Retrieves the id of the postal code row holding this code.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn find_postal_code_id(&self, connection: &mut PgConnection, code: &str) -> Result<Option<i64>, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(QUERY_POSTAL_CODE_ID_BY_CODE)
            .bind(code)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to find postal code: {err}")))
    }

    /**
     * Adds a new postal code. Fails with a constraint violation when the code exists.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_postal_code(&self, transaction: &mut PgConnection, code: &str, city_id: i64) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query_scalar(ADD_POSTAL_CODE)
            .bind(code)
            .bind(city_id)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))
    }

    /**
     * Adds a postal code unless one with the same code exists. An existing row is left untouched.
     *
     * # Returns
     * true if the postal code was inserted.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_postal_code_if_absent(&self, transaction: &mut PgConnection, code: &str, city_id: i64) -> Result<bool, ApplicationError> {
        let span = tracing::Span::current();
        let inserted: Option<i64> = sqlx::query_scalar(ADD_POSTAL_CODE_IF_ABSENT)
            .bind(code)
            .bind(city_id)
            .fetch_optional(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(inserted.is_some())
    }

    #[instrument(skip(self, transaction), fields(result))]
    pub async fn update_postal_code(&self, transaction: &mut PgConnection, postal_code_id: i64, code: &str, city_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_POSTAL_CODE)
            .bind(code)
            .bind(city_id)
            .bind(postal_code_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Self::check_single_row(result.rows_affected(), "Postal code", postal_code_id)
    }

    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_postal_code(&self, transaction: &mut PgConnection, postal_code_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_POSTAL_CODE)
            .bind(postal_code_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete postal code: {err}")))?;
        Self::check_single_row(result.rows_affected(), "Postal code", postal_code_id)
    }

    /**
     * Checks that an update or delete touched exactly one row.
     *
     * # Arguments
     * `rows_affected`: Rows reported by the database.
     * `entity`: Entity name used in messages.
     * `id`: Id of the targeted row.
     */
    fn check_single_row(rows_affected: u64, entity: &str, id: i64) -> Result<(), ApplicationError> {
        if rows_affected == 0 {
            tracing::debug!("{} with ID {} not found", entity, id);
            return Err(ApplicationError::new(ErrorType::NotFound, format!("{entity} not found")));
        }
        if rows_affected > 1 {
            tracing::warn!("Multiple rows of {} attempted changed. Rolled back", entity);
            return Err(ApplicationError::new(ErrorType::Application, format!("Multiple rows of {entity} attempted changed. Rolled back")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_check_single_row_not_found() {
        let error = GeographyDao::check_single_row(0, "County", 1).unwrap_err();
        assert_eq!(error.error_type, ErrorType::NotFound);
        assert_eq!(error.message, "County not found");
    }

    #[test]
    fn test_check_single_row_multiple() {
        let error = GeographyDao::check_single_row(2, "City", 1).unwrap_err();
        assert_eq!(error.error_type, ErrorType::Application);
    }

    #[test]
    fn test_check_single_row_ok() {
        assert!(GeographyDao::check_single_row(1, "Postal code", 1).is_ok());
    }
}

#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_county_needle_is_case_insensitive_substring(pool: PgPool) {
        let dao = GeographyDao::new();
        let mut transaction = pool.begin().await.unwrap();
        dao.add_county(&mut transaction, "Baranya").await.unwrap();
        dao.add_county(&mut transaction, "Bács-Kiskun").await.unwrap();
        let result = dao.get_county_list(&mut transaction, PaginationInput::new(None, None), CountyFilterInput::new(Some("bar".to_string()))).await.unwrap();
        let names: Vec<String> = result.elements.into_iter().map(|county| county.name).collect();
        assert_eq!(names, vec!["Baranya".to_string()]);
        assert_eq!(result.pagination.total, 1);
        transaction.rollback().await.unwrap();
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_first_or_create_county_returns_existing(pool: PgPool) {
        let dao = GeographyDao::new();
        let mut transaction = pool.begin().await.unwrap();
        let (first_id, first_inserted) = dao.first_or_create_county(&mut transaction, "Zala").await.unwrap();
        let (second_id, second_inserted) = dao.first_or_create_county(&mut transaction, "Zala").await.unwrap();
        assert_eq!(first_id, second_id);
        assert!(first_inserted);
        assert!(!second_inserted);
        transaction.rollback().await.unwrap();
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_postal_code_if_absent_keeps_first_writer(pool: PgPool) {
        let dao = GeographyDao::new();
        let mut transaction = pool.begin().await.unwrap();
        let (county_id, _) = dao.first_or_create_county(&mut transaction, "Fejér").await.unwrap();
        let (aba_id, _) = dao.first_or_create_city(&mut transaction, "Aba", county_id).await.unwrap();
        let (other_id, _) = dao.first_or_create_city(&mut transaction, "Sárkeresztúr", county_id).await.unwrap();
        assert!(dao.add_postal_code_if_absent(&mut transaction, "8127", aba_id).await.unwrap());
        assert!(!dao.add_postal_code_if_absent(&mut transaction, "8127", other_id).await.unwrap());
        let postal_code = dao.get_postal_code_by_code(&mut transaction, "8127").await.unwrap().unwrap();
        assert_eq!(postal_code.city.id, aba_id);
        transaction.rollback().await.unwrap();
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_delete_county_cascades(pool: PgPool) {
        let dao = GeographyDao::new();
        let mut transaction = pool.begin().await.unwrap();
        let (county_id, _) = dao.first_or_create_county(&mut transaction, "Baranya").await.unwrap();
        let (city_id, _) = dao.first_or_create_city(&mut transaction, "Pécs", county_id).await.unwrap();
        let postal_code_id = dao.add_postal_code(&mut transaction, "7621", city_id).await.unwrap();
        dao.delete_county(&mut transaction, county_id).await.unwrap();
        assert!(dao.get_city(&mut transaction, city_id).await.unwrap().is_none());
        assert!(dao.get_postal_code(&mut transaction, postal_code_id).await.unwrap().is_none());
        transaction.rollback().await.unwrap();
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_delete_city_cascades(pool: PgPool) {
        let dao = GeographyDao::new();
        let mut transaction = pool.begin().await.unwrap();
        let (county_id, _) = dao.first_or_create_county(&mut transaction, "Baranya").await.unwrap();
        let (city_id, _) = dao.first_or_create_city(&mut transaction, "Pécs", county_id).await.unwrap();
        let postal_code_id = dao.add_postal_code(&mut transaction, "7622", city_id).await.unwrap();
        dao.delete_city(&mut transaction, city_id).await.unwrap();
        assert!(dao.get_postal_code(&mut transaction, postal_code_id).await.unwrap().is_none());
        assert!(dao.get_county(&mut transaction, county_id).await.unwrap().is_some());
        transaction.rollback().await.unwrap();
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_postal_code_list_filters_by_county_name(pool: PgPool) {
        let dao = GeographyDao::new();
        let mut transaction = pool.begin().await.unwrap();
        let (baranya_id, _) = dao.first_or_create_county(&mut transaction, "Baranya").await.unwrap();
        let (pest_id, _) = dao.first_or_create_county(&mut transaction, "Pest").await.unwrap();
        let (pecs_id, _) = dao.first_or_create_city(&mut transaction, "Pécs", baranya_id).await.unwrap();
        let (vac_id, _) = dao.first_or_create_city(&mut transaction, "Vác", pest_id).await.unwrap();
        dao.add_postal_code(&mut transaction, "7621", pecs_id).await.unwrap();
        dao.add_postal_code(&mut transaction, "2600", vac_id).await.unwrap();
        let filter = PostalCodeFilterInput::new(None, None, Some("BARANYA".to_string()));
        let result = dao.get_postal_code_list(&mut transaction, PaginationInput::new(None, None), filter).await.unwrap();
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].code, "7621");
        transaction.rollback().await.unwrap();
    }
}
