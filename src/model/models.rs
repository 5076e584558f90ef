use chrono::{DateTime, Utc};

use crate::model::apperror::{ApplicationError, FieldErrors};

/**
 * Number of digits in a Hungarian postal code.
 */
pub const POSTAL_CODE_LENGTH: usize = 4;

/**
 * Maximum length of names and emails, matching the database columns.
 */
pub const MAX_NAME_LENGTH: usize = 255;

/**
 * Page size used when the request does not specify one.
 */
pub const DEFAULT_PAGE_SIZE: i64 = 15;

/**
 * Largest page size a caller may request.
 */
pub const MAX_PAGE_SIZE: i64 = 100;

/**
 * Minimum password length for registration.
 */
pub const MIN_PASSWORD_LENGTH: usize = 8;

/***************** Pagination *********************/

/**
 * Validated pagination parameters. Pages are numbered from 1.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationInput {
    pub page: i64,
    pub per_page: i64,
}

impl PaginationInput {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        PaginationInput { page: page.unwrap_or(1), per_page: per_page.unwrap_or(DEFAULT_PAGE_SIZE) }
    }

    /**
     * Validates the pagination input.
     *
     * # Returns
     * The validated input or a validation error naming the offending parameter.
     */
    pub fn validate(self) -> Result<Self, ApplicationError> {
        let mut errors = FieldErrors::new();
        if self.page < 1 {
            errors.add("page", "The page must be at least 1.");
        }
        if self.per_page < 1 || self.per_page > MAX_PAGE_SIZE {
            errors.add("perPage", format!("The per page must be between 1 and {MAX_PAGE_SIZE}."));
        }
        errors.into_result()?;
        Ok(self)
    }

    /**
     * Number of rows to skip for the requested page.
     */
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/**
 * Page envelope returned with every list.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationOutput {
    pub current_page: i64,
    pub per_page: i64,
    pub total: i64,
    pub last_page: i64,
}

impl PaginationOutput {
    pub fn new(pagination_input: &PaginationInput, total: i64) -> Self {
        let last_page = if total == 0 { 1 } else { (total + pagination_input.per_page - 1) / pagination_input.per_page };
        PaginationOutput { current_page: pagination_input.page, per_page: pagination_input.per_page, total, last_page }
    }
}

/**
 * A page of elements.
 */
#[derive(Debug, Clone)]
pub struct ListOutputType<T> {
    pub elements: Vec<T>,
    pub pagination: PaginationOutput,
}

impl<T> ListOutputType<T> {
    pub fn new(elements: Vec<T>, pagination: PaginationOutput) -> Self {
        ListOutputType { elements, pagination }
    }
}

/***************** Geography entities *********************/

#[derive(Debug, Clone, PartialEq)]
pub struct CountyDetailType {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/**
 * A city with its county attached.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct CityDetailType {
    pub id: i64,
    pub name: String,
    pub county: CountyDetailType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/**
 * A postal code with its city and the city's county attached.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PostalCodeDetailType {
    pub id: i64,
    pub code: String,
    pub city: CityDetailType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/***************** Filters *********************/

/**
 * Trims a filter value and drops it when nothing is left.
 */
fn normalize_filter(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountyFilterInput {
    /**
     * Case-insensitive substring of the county name.
     */
    pub needle: Option<String>,
}

impl CountyFilterInput {
    pub fn new(needle: Option<String>) -> Self {
        CountyFilterInput { needle: normalize_filter(needle) }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CityFilterInput {
    /**
     * Case-insensitive substring of the city name.
     */
    pub needle: Option<String>,
    /**
     * Case-insensitive substring of the county name.
     */
    pub county: Option<String>,
}

impl CityFilterInput {
    pub fn new(needle: Option<String>, county: Option<String>) -> Self {
        CityFilterInput { needle: normalize_filter(needle), county: normalize_filter(county) }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostalCodeFilterInput {
    /**
     * Prefix of the postal code.
     */
    pub code: Option<String>,
    /**
     * Case-insensitive substring of the city name.
     */
    pub city: Option<String>,
    /**
     * Case-insensitive substring of the county name.
     */
    pub county: Option<String>,
}

impl PostalCodeFilterInput {
    pub fn new(code: Option<String>, city: Option<String>, county: Option<String>) -> Self {
        PostalCodeFilterInput { code: normalize_filter(code), city: normalize_filter(city), county: normalize_filter(county) }
    }
}

/***************** Add/update inputs *********************/

fn check_name(errors: &mut FieldErrors, field: &str, label: &str, value: &str) {
    if value.is_empty() {
        errors.add(field, format!("The {label} field is required."));
    } else if value.chars().count() > MAX_NAME_LENGTH {
        errors.add(field, format!("The {label} may not be greater than {MAX_NAME_LENGTH} characters."));
    }
}

/**
 * Checks that a postal code is exactly four ASCII digits.
 */
pub fn is_valid_postal_code(code: &str) -> bool {
    code.len() == POSTAL_CODE_LENGTH && code.bytes().all(|byte| byte.is_ascii_digit())
}

fn check_postal_code(errors: &mut FieldErrors, code: &str) {
    if code.is_empty() {
        errors.add("code", "The code field is required.");
    } else if !is_valid_postal_code(code) {
        errors.add("code", format!("The code must be {POSTAL_CODE_LENGTH} digits."));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountyAddUpdateInputType {
    pub name: String,
}

impl CountyAddUpdateInputType {
    pub fn new(name: Option<String>) -> Self {
        CountyAddUpdateInputType { name: name.unwrap_or_default().trim().to_string() }
    }

    pub fn validate(self) -> Result<Self, ApplicationError> {
        let mut errors = FieldErrors::new();
        check_name(&mut errors, "name", "name", &self.name);
        errors.into_result()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CityAddUpdateInputType {
    pub name: String,
    pub county_id: i64,
}

impl CityAddUpdateInputType {
    /**
     * Builds and validates a city input. The county id is required.
     */
    pub fn validate(name: Option<String>, county_id: Option<i64>) -> Result<Self, ApplicationError> {
        let name = name.unwrap_or_default().trim().to_string();
        let mut errors = FieldErrors::new();
        check_name(&mut errors, "name", "name", &name);
        if county_id.is_none() {
            errors.add("countyId", "The county id field is required.");
        }
        errors.into_result()?;
        let Some(county_id) = county_id else {
            return Err(ApplicationError::validation("countyId", "The county id field is required."));
        };
        Ok(CityAddUpdateInputType { name, county_id })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostalCodeAddInputType {
    pub code: String,
    pub city_name: String,
    pub county_name: String,
}

impl PostalCodeAddInputType {
    pub fn new(code: Option<String>, city_name: Option<String>, county_name: Option<String>) -> Self {
        PostalCodeAddInputType {
            code: code.unwrap_or_default().trim().to_string(),
            city_name: city_name.unwrap_or_default().trim().to_string(),
            county_name: county_name.unwrap_or_default().trim().to_string(),
        }
    }

    pub fn validate(self) -> Result<Self, ApplicationError> {
        let mut errors = FieldErrors::new();
        check_postal_code(&mut errors, &self.code);
        check_name(&mut errors, "cityName", "city name", &self.city_name);
        check_name(&mut errors, "countyName", "county name", &self.county_name);
        errors.into_result()?;
        Ok(self)
    }
}

/**
 * Partial update of a postal code. Absent fields keep their current value.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PostalCodeUpdateInputType {
    pub code: Option<String>,
    pub city_name: Option<String>,
    pub county_name: Option<String>,
}

impl PostalCodeUpdateInputType {
    pub fn new(code: Option<String>, city_name: Option<String>, county_name: Option<String>) -> Self {
        let trim = |value: Option<String>| value.map(|value| value.trim().to_string());
        PostalCodeUpdateInputType { code: trim(code), city_name: trim(city_name), county_name: trim(county_name) }
    }

    pub fn validate(self) -> Result<Self, ApplicationError> {
        let mut errors = FieldErrors::new();
        if let Some(code) = &self.code {
            check_postal_code(&mut errors, code);
        }
        if let Some(city_name) = &self.city_name {
            check_name(&mut errors, "cityName", "city name", city_name);
        }
        if let Some(county_name) = &self.county_name {
            check_name(&mut errors, "countyName", "county name", county_name);
        }
        errors.into_result()?;
        Ok(self)
    }

    /**
     * Whether the update moves the postal code to another city.
     */
    pub fn changes_city(&self) -> bool {
        self.city_name.is_some() || self.county_name.is_some()
    }
}

/***************** Users *********************/

#[derive(Debug, Clone, PartialEq)]
pub struct UserDetailType {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/**
 * A user together with a freshly issued access token.
 */
#[derive(Debug, Clone)]
pub struct IssuedTokenOutputType {
    pub user: UserDetailType,
    pub token: String,
}

/**
 * The caller behind a verified, non-revoked access token.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    pub token_id: String,
}

#[derive(Debug, Clone)]
pub struct RegisterInputType {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterInputType {
    /**
     * Builds and validates a registration. The password must be confirmed.
     */
    pub fn validate(name: Option<String>, email: Option<String>, password: Option<String>, password_confirmation: Option<String>) -> Result<Self, ApplicationError> {
        let name = name.unwrap_or_default().trim().to_string();
        let email = email.unwrap_or_default().trim().to_lowercase();
        let password = password.unwrap_or_default();
        let mut errors = FieldErrors::new();
        check_name(&mut errors, "name", "name", &name);
        check_email(&mut errors, &email);
        if password.is_empty() {
            errors.add("password", "The password field is required.");
        } else if password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add("password", format!("The password must be at least {MIN_PASSWORD_LENGTH} characters."));
        } else if password_confirmation.as_deref() != Some(password.as_str()) {
            errors.add("password", "The password confirmation does not match.");
        }
        errors.into_result()?;
        Ok(RegisterInputType { name, email, password })
    }
}

#[derive(Debug, Clone)]
pub struct LoginInputType {
    pub email: String,
    pub password: String,
}

impl LoginInputType {
    pub fn validate(email: Option<String>, password: Option<String>) -> Result<Self, ApplicationError> {
        let email = email.unwrap_or_default().trim().to_lowercase();
        let password = password.unwrap_or_default();
        let mut errors = FieldErrors::new();
        check_email(&mut errors, &email);
        if password.is_empty() {
            errors.add("password", "The password field is required.");
        }
        errors.into_result()?;
        Ok(LoginInputType { email, password })
    }
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    if email.is_empty() {
        errors.add("email", "The email field is required.");
        return;
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') && !domain.contains('@'),
        None => false,
    };
    if !valid {
        errors.add("email", "The email must be a valid email address.");
    } else if email.chars().count() > MAX_NAME_LENGTH {
        errors.add("email", format!("The email may not be greater than {MAX_NAME_LENGTH} characters."));
    }
}
