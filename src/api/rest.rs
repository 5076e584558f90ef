use std::collections::BTreeMap;

use actix_web::{HttpRequest, HttpResponse, ResponseError, error, http::StatusCode, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{
        CityDetailType, CityFilterInput, CountyAddUpdateInputType, CountyDetailType, CountyFilterInput, IssuedTokenOutputType, ListOutputType, PaginationInput, PostalCodeAddInputType,
        PostalCodeDetailType, PostalCodeFilterInput, PostalCodeUpdateInputType, UserDetailType,
    },
};

/***************** Common models *********************/

/**
 * Pagination query parameters for API requests.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationQuery {
    /**
     * The page to return, starting from 1.
     */
    pub page: Option<i64>,
    /**
     * The size of the page to return.
     */
    pub per_page: Option<i64>,
}

impl From<web::Query<PaginationQuery>> for PaginationInput {
    fn from(query: web::Query<PaginationQuery>) -> Self {
        let query = query.into_inner();
        PaginationInput::new(query.page, query.per_page)
    }
}

/**
 * A page of elements with the page envelope.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T: Serialize> {
    pub data: Vec<T>,
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
}

impl<S, T: Serialize + From<S>> From<ListOutputType<S>> for ListResponse<T> {
    fn from(output: ListOutputType<S>) -> Self {
        ListResponse {
            data: output.elements.into_iter().map(T::from).collect(),
            current_page: output.pagination.current_page,
            per_page: output.pagination.per_page,
            total: output.pagination.total,
            last_page: output.pagination.last_page,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/***************** Counties *********************/

#[derive(Debug, Deserialize)]
pub struct CountyListQuery {
    pub needle: Option<String>,
}

impl From<web::Query<CountyListQuery>> for CountyFilterInput {
    fn from(query: web::Query<CountyListQuery>) -> Self {
        CountyFilterInput::new(query.into_inner().needle)
    }
}

#[derive(Debug, Deserialize)]
pub struct CountyAddUpdateRequest {
    pub name: Option<String>,
}

impl From<web::Json<CountyAddUpdateRequest>> for CountyAddUpdateInputType {
    fn from(request: web::Json<CountyAddUpdateRequest>) -> Self {
        CountyAddUpdateInputType::new(request.into_inner().name)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyResponse {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CountyDetailType> for CountyResponse {
    fn from(county: CountyDetailType) -> Self {
        CountyResponse { id: county.id, name: county.name, created_at: county.created_at, updated_at: county.updated_at }
    }
}

/***************** Cities *********************/

#[derive(Debug, Deserialize)]
pub struct CityListQuery {
    /**
     * Substring of the city name.
     */
    pub needle: Option<String>,
    /**
     * Substring of the county name.
     */
    pub county: Option<String>,
}

impl From<web::Query<CityListQuery>> for CityFilterInput {
    fn from(query: web::Query<CityListQuery>) -> Self {
        let query = query.into_inner();
        CityFilterInput::new(query.needle, query.county)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityAddUpdateRequest {
    pub name: Option<String>,
    pub county_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CityResponse {
    pub id: i64,
    pub name: String,
    pub county_id: i64,
    pub county: CountyResponse,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CityDetailType> for CityResponse {
    fn from(city: CityDetailType) -> Self {
        CityResponse { id: city.id, name: city.name, county_id: city.county.id, county: CountyResponse::from(city.county), created_at: city.created_at, updated_at: city.updated_at }
    }
}

/***************** Postal codes *********************/

#[derive(Debug, Deserialize)]
pub struct PostalCodeListQuery {
    /**
     * Prefix of the postal code.
     */
    pub code: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
}

impl From<web::Query<PostalCodeListQuery>> for PostalCodeFilterInput {
    fn from(query: web::Query<PostalCodeListQuery>) -> Self {
        let query = query.into_inner();
        PostalCodeFilterInput::new(query.code, query.city, query.county)
    }
}

/**
 * Body of postal code create and update requests. Every field is optional on update.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalCodeAddUpdateRequest {
    pub code: Option<String>,
    pub city_name: Option<String>,
    pub county_name: Option<String>,
}

impl From<web::Json<PostalCodeAddUpdateRequest>> for PostalCodeAddInputType {
    fn from(request: web::Json<PostalCodeAddUpdateRequest>) -> Self {
        let request = request.into_inner();
        PostalCodeAddInputType::new(request.code, request.city_name, request.county_name)
    }
}

impl From<web::Json<PostalCodeAddUpdateRequest>> for PostalCodeUpdateInputType {
    fn from(request: web::Json<PostalCodeAddUpdateRequest>) -> Self {
        let request = request.into_inner();
        PostalCodeUpdateInputType::new(request.code, request.city_name, request.county_name)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalCodeResponse {
    pub id: i64,
    pub code: String,
    pub city_id: i64,
    pub city: CityResponse,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PostalCodeDetailType> for PostalCodeResponse {
    fn from(postal_code: PostalCodeDetailType) -> Self {
        PostalCodeResponse {
            id: postal_code.id,
            code: postal_code.code,
            city_id: postal_code.city.id,
            city: CityResponse::from(postal_code.city),
            created_at: postal_code.created_at,
            updated_at: postal_code.updated_at,
        }
    }
}

/***************** Users *********************/

/**
 * Registration body. Field names are snake case.
 */
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDetailType> for UserResponse {
    fn from(user: UserDetailType) -> Self {
        UserResponse { id: user.id, name: user.name, email: user.email, created_at: user.created_at, updated_at: user.updated_at }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub user: UserResponse,
    pub token: String,
}

impl From<IssuedTokenOutputType> for TokenResponse {
    fn from(output: IssuedTokenOutputType) -> Self {
        TokenResponse { user: UserResponse::from(output.user), token: output.token }
    }
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub message: String,
    /**
     * Messages per request field. Only present for validation errors.
     */
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ResponseError for ApplicationError {
    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }

    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let errors = (!self.field_errors.is_empty()).then(|| {
            let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for field_error in &self.field_errors {
                errors.entry(field_error.field.clone()).or_default().push(field_error.message.clone());
            }
            errors
        });
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), message: self.message.clone(), errors };
        HttpResponse::build(get_statuscode(&self.error_type)).json(&error_response)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `application_error`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::JwtAuthorization => StatusCode::UNAUTHORIZED,
        ErrorType::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::ConstraintViolation => StatusCode::CONFLICT,
        ErrorType::Initialization | ErrorType::DatabaseError | ErrorType::Application | ErrorType::Import => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::JwtAuthorization => 1000,
        ErrorType::Initialization => 1001,
        ErrorType::Application => 1002,
        ErrorType::DatabaseError => 1003,
        ErrorType::Validation => 1004,
        ErrorType::NotFound => 1005,
        ErrorType::ConstraintViolation => 1006,
        ErrorType::Import => 1007,
    }
}

/**
 * Turns unreadable JSON bodies into validation errors.
 */
pub fn json_error_handler(err: error::JsonPayloadError, _http_request: &HttpRequest) -> error::Error {
    tracing::debug!("Rejected JSON payload: {err}");
    ApplicationError::new(ErrorType::Validation, "The given data was invalid.".to_string()).into()
}

/**
 * Turns unparsable query strings into validation errors.
 */
pub fn query_error_handler(err: error::QueryPayloadError, _http_request: &HttpRequest) -> error::Error {
    tracing::debug!("Rejected query string: {err}");
    ApplicationError::new(ErrorType::Validation, "The given data was invalid.".to_string()).into()
}

#[cfg(test)]
mod test {
    use actix_web::body::to_bytes;

    use super::*;
    use crate::model::models::PaginationOutput;

    fn county(id: i64, name: &str) -> CountyDetailType {
        CountyDetailType { id, name: name.to_string(), created_at: Utc::now(), updated_at: Utc::now() }
    }

    #[actix_web::test]
    async fn test_validation_error_response_groups_field_messages() {
        let error = ApplicationError::from_field_errors(vec![
            crate::model::apperror::FieldError { field: "code".to_string(), message: "The code field is required.".to_string() },
            crate::model::apperror::FieldError { field: "cityName".to_string(), message: "The city name field is required.".to_string() },
        ]);
        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = serde_json::from_slice(&to_bytes(response.into_body()).await.unwrap()).unwrap();
        assert_eq!(body["code"], 1004);
        assert_eq!(body["message"], "The code field is required.");
        assert_eq!(body["errors"]["cityName"][0], "The city name field is required.");
    }

    #[actix_web::test]
    async fn test_not_found_error_response_has_no_field_errors() {
        let response = ApplicationError::new(ErrorType::NotFound, "County not found".to_string()).error_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&to_bytes(response.into_body()).await.unwrap()).unwrap();
        assert_eq!(body["code"], 1005);
        assert!(body.get("errors").is_none());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(get_statuscode(&ErrorType::JwtAuthorization), StatusCode::UNAUTHORIZED);
        assert_eq!(get_statuscode(&ErrorType::ConstraintViolation), StatusCode::CONFLICT);
        assert_eq!(get_statuscode(&ErrorType::DatabaseError), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_list_response_envelope() {
        let pagination_input = PaginationInput::new(Some(2), Some(1));
        let output = ListOutputType::new(vec![county(2, "Baranya")], PaginationOutput::new(&pagination_input, 3));
        let response: ListResponse<CountyResponse> = ListResponse::from(output);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["currentPage"], 2);
        assert_eq!(json["perPage"], 1);
        assert_eq!(json["total"], 3);
        assert_eq!(json["lastPage"], 3);
        assert_eq!(json["data"][0]["name"], "Baranya");
    }

    #[test]
    fn test_postal_code_response_nests_parents() {
        let city = CityDetailType { id: 7, name: "Pécs".to_string(), county: county(3, "Baranya"), created_at: Utc::now(), updated_at: Utc::now() };
        let postal_code = PostalCodeDetailType { id: 11, code: "7621".to_string(), city, created_at: Utc::now(), updated_at: Utc::now() };
        let json = serde_json::to_value(PostalCodeResponse::from(postal_code)).unwrap();
        assert_eq!(json["cityId"], 7);
        assert_eq!(json["city"]["countyId"], 3);
        assert_eq!(json["city"]["county"]["name"], "Baranya");
    }
}
