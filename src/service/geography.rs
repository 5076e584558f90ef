use sqlx::{PgConnection, Pool, Postgres};
use tracing::instrument;

use crate::{
    dao::geography::GeographyDao,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{
            CityAddUpdateInputType, CityDetailType, CityFilterInput, CountyAddUpdateInputType, CountyDetailType, CountyFilterInput, ListOutputType, PaginationInput, PostalCodeAddInputType,
            PostalCodeDetailType, PostalCodeFilterInput, PostalCodeUpdateInputType,
        },
    },
    service::{acquire, begin, finish},
};

const NAME_TAKEN: &str = "The name has already been taken.";
const CODE_TAKEN: &str = "The code has already been taken.";
const COUNTY_ID_INVALID: &str = "The selected county id is invalid.";

/**
 * Represents the service for managing counties, cities and postal codes.
 */
pub struct GeographyService {
    /**
     * The DAO for geography operations.
     */
    geography_dao: GeographyDao,
    /**
     * Optional connection pool for database operations. Optional for test purposes until we have a better way to mock the database.
     */
    connection_pool: Option<Pool<Postgres>>,
}

impl GeographyService {
    /**
     * Creates a new instance of `GeographyService`.
     *
     * # Arguments
     * `geography_dao`: The DAO for geography operations.
     * `connection_pool`: Optional connection pool for database operations.
     *
     * # Returns
     * A new instance of `GeographyService`.
     */
    pub fn new(geography_dao: GeographyDao, connection_pool: Option<Pool<Postgres>>) -> Self {
        GeographyService { geography_dao, connection_pool }
    }

    /***************** Counties *********************/

    /**
     * Retrieves a page of counties.
     *
     * # Arguments
     * `pagination_input`: `PaginationInput` containing pagination information.
     * `filter`: Name filter.
     *
     * # Returns
     * A Result containing the page of counties or an `ApplicationError`.
     */
    pub async fn get_county_list(&self, pagination_input: PaginationInput, filter: CountyFilterInput) -> Result<ListOutputType<CountyDetailType>, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.geography_dao.get_county_list(&mut connection, pagination_input, filter).await
    }

    pub async fn get_county(&self, county_id: i64) -> Result<CountyDetailType, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.load_county(&mut connection, county_id).await
    }

    /**
     * Adds a county. The name must not be taken.
     *
     * # Returns
     * The stored county.
     */
    #[instrument(skip(self))]
    pub async fn add_county(&self, county_input: CountyAddUpdateInputType) -> Result<CountyDetailType, ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            if self.geography_dao.find_county_id(&mut transaction, &county_input.name).await?.is_some() {
                return Err(ApplicationError::validation("name", NAME_TAKEN));
            }
            let county_id = self.geography_dao.add_county(&mut transaction, &county_input.name).await?;
            self.load_county(&mut transaction, county_id).await
        }
        .await;
        finish(transaction, result).await
    }

    /**
     * Renames a county. The new name must not belong to another county.
     *
     * # Returns
     * The updated county.
     */
    #[instrument(skip(self))]
    pub async fn update_county(&self, county_id: i64, county_input: CountyAddUpdateInputType) -> Result<CountyDetailType, ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            if let Some(existing_id) = self.geography_dao.find_county_id(&mut transaction, &county_input.name).await?
                && existing_id != county_id
            {
                return Err(ApplicationError::validation("name", NAME_TAKEN));
            }
            self.geography_dao.update_county(&mut transaction, county_id, &county_input.name).await?;
            self.load_county(&mut transaction, county_id).await
        }
        .await;
        finish(transaction, result).await
    }

    /**
     * Deletes a county together with its cities and their postal codes.
     */
    #[instrument(skip(self))]
    pub async fn delete_county(&self, county_id: i64) -> Result<(), ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = self.geography_dao.delete_county(&mut transaction, county_id).await;
        finish(transaction, result).await
    }

    async fn load_county(&self, connection: &mut PgConnection, county_id: i64) -> Result<CountyDetailType, ApplicationError> {
        self.geography_dao
            .get_county(connection, county_id)
            .await?
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "County not found".to_string()))
    }

    /***************** Cities *********************/

    pub async fn get_city_list(&self, pagination_input: PaginationInput, filter: CityFilterInput) -> Result<ListOutputType<CityDetailType>, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.geography_dao.get_city_list(&mut connection, pagination_input, filter).await
    }

    pub async fn get_city(&self, city_id: i64) -> Result<CityDetailType, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.load_city(&mut connection, city_id).await
    }

    /**
     * Adds a city to an existing county. A county cannot hold two cities with the same name.
     *
     * # Returns
     * The stored city with its county.
     */
    #[instrument(skip(self))]
    pub async fn add_city(&self, city_input: CityAddUpdateInputType) -> Result<CityDetailType, ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            self.check_city(&mut transaction, None, &city_input).await?;
            let city_id = self.geography_dao.add_city(&mut transaction, city_input).await?;
            self.load_city(&mut transaction, city_id).await
        }
        .await;
        finish(transaction, result).await
    }

    #[instrument(skip(self))]
    pub async fn update_city(&self, city_id: i64, city_input: CityAddUpdateInputType) -> Result<CityDetailType, ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            self.check_city(&mut transaction, Some(city_id), &city_input).await?;
            self.geography_dao.update_city(&mut transaction, city_id, city_input).await?;
            self.load_city(&mut transaction, city_id).await
        }
        .await;
        finish(transaction, result).await
    }

    /**
     * Deletes a city together with its postal codes.
     */
    #[instrument(skip(self))]
    pub async fn delete_city(&self, city_id: i64) -> Result<(), ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = self.geography_dao.delete_city(&mut transaction, city_id).await;
        finish(transaction, result).await
    }

    /**
     * Checks that the county exists and that no other city in it has the same name.
     *
     * # Arguments
     * `city_id`: The city being updated, or None for a new city.
     * `city_input`: The requested name and county.
     */
    async fn check_city(&self, connection: &mut PgConnection, city_id: Option<i64>, city_input: &CityAddUpdateInputType) -> Result<(), ApplicationError> {
        if self.geography_dao.get_county(connection, city_input.county_id).await?.is_none() {
            return Err(ApplicationError::validation("countyId", COUNTY_ID_INVALID));
        }
        match self.geography_dao.find_city_id(connection, &city_input.name, city_input.county_id).await? {
            Some(existing_id) if Some(existing_id) != city_id => Err(ApplicationError::validation("name", NAME_TAKEN)),
            _ => Ok(()),
        }
    }

    async fn load_city(&self, connection: &mut PgConnection, city_id: i64) -> Result<CityDetailType, ApplicationError> {
        self.geography_dao
            .get_city(connection, city_id)
            .await?
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "City not found".to_string()))
    }

    /***************** Postal codes *********************/

    pub async fn get_postal_code_list(&self, pagination_input: PaginationInput, filter: PostalCodeFilterInput) -> Result<ListOutputType<PostalCodeDetailType>, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.geography_dao.get_postal_code_list(&mut connection, pagination_input, filter).await
    }

    pub async fn get_postal_code(&self, postal_code_id: i64) -> Result<PostalCodeDetailType, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.load_postal_code(&mut connection, postal_code_id).await
    }

    /**
     * Finds a postal code by its exact code.
     *
     * # Returns
     * The postal code with its city and county, or a not found error.
     */
    pub async fn search_postal_code(&self, code: &str) -> Result<PostalCodeDetailType, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.geography_dao
            .get_postal_code_by_code(&mut connection, code.trim())
            .await?
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Postal code not found".to_string()))
    }

    /**
     * Adds a postal code. The county and city are looked up by name and created when missing.
     * A code that already exists is a validation error.
     *
     * # Returns
     * The stored postal code with its city and county.
     */
    #[instrument(skip(self))]
    pub async fn add_postal_code(&self, postal_code_input: PostalCodeAddInputType) -> Result<PostalCodeDetailType, ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            if self.geography_dao.find_postal_code_id(&mut transaction, &postal_code_input.code).await?.is_some() {
                return Err(ApplicationError::validation("code", CODE_TAKEN));
            }
            let city_id = self.resolve_city(&mut transaction, &postal_code_input.city_name, &postal_code_input.county_name).await?;
            let postal_code_id = self.geography_dao.add_postal_code(&mut transaction, &postal_code_input.code, city_id).await?;
            self.load_postal_code(&mut transaction, postal_code_id).await
        }
        .await;
        finish(transaction, result).await
    }

    /**
     * Updates a postal code. Absent fields keep their value. Giving a city or county name
     * moves the postal code to that city, creating the city and county when missing.
     *
     * # Returns
     * The updated postal code with its city and county.
     */
    #[instrument(skip(self))]
    pub async fn update_postal_code(&self, postal_code_id: i64, postal_code_input: PostalCodeUpdateInputType) -> Result<PostalCodeDetailType, ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            let current = self.load_postal_code(&mut transaction, postal_code_id).await?;
            let code = postal_code_input.code.clone().unwrap_or_else(|| current.code.clone());
            if code != current.code
                && let Some(existing_id) = self.geography_dao.find_postal_code_id(&mut transaction, &code).await?
                && existing_id != postal_code_id
            {
                return Err(ApplicationError::validation("code", CODE_TAKEN));
            }
            let city_id = if postal_code_input.changes_city() {
                let city_name = postal_code_input.city_name.as_deref().unwrap_or(&current.city.name);
                let county_name = postal_code_input.county_name.as_deref().unwrap_or(&current.city.county.name);
                self.resolve_city(&mut transaction, city_name, county_name).await?
            } else {
                current.city.id
            };
            self.geography_dao.update_postal_code(&mut transaction, postal_code_id, &code, city_id).await?;
            self.load_postal_code(&mut transaction, postal_code_id).await
        }
        .await;
        finish(transaction, result).await
    }

    #[instrument(skip(self))]
    pub async fn delete_postal_code(&self, postal_code_id: i64) -> Result<(), ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = self.geography_dao.delete_postal_code(&mut transaction, postal_code_id).await;
        finish(transaction, result).await
    }

    /**
     * First-or-create of the county and then the city by name.
     *
     * # Returns
     * The id of the city.
     */
    async fn resolve_city(&self, connection: &mut PgConnection, city_name: &str, county_name: &str) -> Result<i64, ApplicationError> {
        let (county_id, county_created) = self.geography_dao.first_or_create_county(connection, county_name).await?;
        if county_created {
            tracing::info!("New county created: {}", county_name);
        }
        let (city_id, city_created) = self.geography_dao.first_or_create_city(connection, city_name, county_id).await?;
        if city_created {
            tracing::info!("New city created: {} ({})", city_name, county_name);
        }
        Ok(city_id)
    }

    async fn load_postal_code(&self, connection: &mut PgConnection, postal_code_id: i64) -> Result<PostalCodeDetailType, ApplicationError> {
        self.geography_dao
            .get_postal_code(connection, postal_code_id)
            .await?
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Postal code not found".to_string()))
    }
}


#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use super::*;
    use sqlx::PgPool;

    fn service(pool: PgPool) -> GeographyService {
        GeographyService::new(GeographyDao::new(), Some(pool))
    }

    fn postal_code_input(code: &str, city_name: &str, county_name: &str) -> PostalCodeAddInputType {
        PostalCodeAddInputType::new(Some(code.to_string()), Some(city_name.to_string()), Some(county_name.to_string()))
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_add_postal_code_creates_parents(pool: PgPool) {
        let service = service(pool);
        let postal_code = service.add_postal_code(postal_code_input("8127", "Aba", "Fejér")).await.unwrap();
        assert_eq!(postal_code.code, "8127");
        assert_eq!(postal_code.city.name, "Aba");
        assert_eq!(postal_code.city.county.name, "Fejér");
        let second = service.add_postal_code(postal_code_input("8128", "Aba", "Fejér")).await.unwrap();
        assert_eq!(second.city.id, postal_code.city.id);
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_add_duplicate_postal_code_is_validation_error(pool: PgPool) {
        let service = service(pool);
        service.add_postal_code(postal_code_input("8127", "Aba", "Fejér")).await.unwrap();
        let error = service.add_postal_code(postal_code_input("8127", "Pécs", "Baranya")).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
        assert_eq!(error.field_errors[0].field, "code");
        let counties = service.get_county_list(PaginationInput::new(None, None), CountyFilterInput::default()).await.unwrap();
        assert_eq!(counties.pagination.total, 1);
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_update_postal_code_moves_to_new_city(pool: PgPool) {
        let service = service(pool);
        let postal_code = service.add_postal_code(postal_code_input("2600", "Vác", "Pest")).await.unwrap();
        let update = PostalCodeUpdateInputType::new(None, Some("Sződ".to_string()), None);
        let updated = service.update_postal_code(postal_code.id, update).await.unwrap();
        assert_eq!(updated.code, "2600");
        assert_eq!(updated.city.name, "Sződ");
        assert_eq!(updated.city.county.id, postal_code.city.county.id);
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_update_postal_code_to_taken_code(pool: PgPool) {
        let service = service(pool);
        service.add_postal_code(postal_code_input("2600", "Vác", "Pest")).await.unwrap();
        let other = service.add_postal_code(postal_code_input("2133", "Sződliget", "Pest")).await.unwrap();
        let update = PostalCodeUpdateInputType::new(Some("2600".to_string()), None, None);
        let error = service.update_postal_code(other.id, update).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_add_county_with_taken_name(pool: PgPool) {
        let service = service(pool);
        service.add_county(CountyAddUpdateInputType::new(Some("Zala".to_string()))).await.unwrap();
        let error = service.add_county(CountyAddUpdateInputType::new(Some("Zala".to_string()))).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_update_county_keeps_own_name(pool: PgPool) {
        let service = service(pool);
        let county = service.add_county(CountyAddUpdateInputType::new(Some("Zala".to_string()))).await.unwrap();
        let updated = service.update_county(county.id, CountyAddUpdateInputType::new(Some("Zala".to_string()))).await.unwrap();
        assert_eq!(updated.id, county.id);
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_add_city_to_unknown_county(pool: PgPool) {
        let service = service(pool);
        let error = service.add_city(CityAddUpdateInputType::validate(Some("Aba".to_string()), Some(999)).unwrap()).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
        assert_eq!(error.field_errors[0].field, "countyId");
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_search_postal_code(pool: PgPool) {
        let service = service(pool);
        service.add_postal_code(postal_code_input("7621", "Pécs", "Baranya")).await.unwrap();
        assert_eq!(service.search_postal_code("7621").await.unwrap().city.name, "Pécs");
        assert_eq!(service.search_postal_code("7699").await.unwrap_err().error_type, ErrorType::NotFound);
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_delete_missing_city(pool: PgPool) {
        let service = service(pool);
        assert_eq!(service.delete_city(12345).await.unwrap_err().error_type, ErrorType::NotFound);
    }
}
