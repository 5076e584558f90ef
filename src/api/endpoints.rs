use actix_web::{
    HttpRequest, HttpResponse, delete, get, post, put, routes,
    web::{self, Path},
};
use tracing::{Instrument, instrument};

use crate::{
    api::{
        rest::{
            CityAddUpdateRequest, CityListQuery, CityResponse, CountyAddUpdateRequest, CountyListQuery, CountyResponse, ListResponse, LoginRequest, MessageResponse, PaginationQuery,
            PostalCodeAddUpdateRequest, PostalCodeListQuery, PostalCodeResponse, RegisterRequest, TokenResponse, UserResponse, json_error_handler, query_error_handler,
        },
        state::AppState,
    },
    model::{
        apperror::ApplicationError,
        models::{
            CityAddUpdateInputType, CityFilterInput, CountyAddUpdateInputType, CountyFilterInput, LoginInputType, PaginationInput, PostalCodeAddInputType, PostalCodeFilterInput,
            PostalCodeUpdateInputType, RegisterInputType,
        },
    },
};

/**
 * Registers every endpoint together with the JSON and query error handlers.
 */
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(register)
        .service(login)
        .service(logout)
        .service(current_user)
        .service(county_list)
        .service(county_get)
        .service(county_add)
        .service(county_update)
        .service(county_delete)
        .service(city_list)
        .service(city_get)
        .service(city_add)
        .service(city_update)
        .service(city_delete)
        .service(postal_code_search)
        .service(postal_code_list)
        .service(postal_code_get)
        .service(postal_code_add)
        .service(postal_code_update)
        .service(postal_code_delete);
}

/***************** Authentication *********************/

/**
 * Registers a user and returns the first token.
 */
#[instrument(level = "info", skip(http_request, request_body, app_state), fields(service = "register", trace_id = get_trace_id(&http_request), result))]
#[post("/register")]
pub async fn register(http_request: HttpRequest, request_body: web::Json<RegisterRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let request = request_body.into_inner();
    let register_input = RegisterInputType::validate(request.name, request.email, request.password, request.password_confirmation)?;
    let output = app_state.auth_service.register(register_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(TokenResponse::from(output)))
}

#[instrument(level = "info", skip(http_request, request_body, app_state), fields(service = "login", trace_id = get_trace_id(&http_request), result))]
#[post("/login")]
pub async fn login(http_request: HttpRequest, request_body: web::Json<LoginRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let request = request_body.into_inner();
    let login_input = LoginInputType::validate(request.email, request.password)?;
    let output = app_state.auth_service.login(login_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(TokenResponse::from(output)))
}

/**
 * Revokes the presented token.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "logout", trace_id = get_trace_id(&http_request), result))]
#[post("/logout")]
pub async fn logout(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let authenticated_user = app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    app_state.auth_service.logout(&authenticated_user).instrument(span).await?;
    Ok(HttpResponse::Ok().json(MessageResponse { message: "Logged out".to_string() }))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "currentUser", trace_id = get_trace_id(&http_request), result))]
#[get("/user")]
pub async fn current_user(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let authenticated_user = app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    let user = app_state.auth_service.get_user(&authenticated_user).instrument(span).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/***************** Counties *********************/

/**
 * Endpoint to retrieve a page of counties, optionally filtered by name.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listCounties", trace_id = get_trace_id(&http_request), result))]
#[get("/counties")]
pub async fn county_list(http_request: HttpRequest, pagination: web::Query<PaginationQuery>, filter: web::Query<CountyListQuery>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let pagination_input = PaginationInput::from(pagination).validate()?;
    let output = app_state.geography_service.get_county_list(pagination_input, CountyFilterInput::from(filter)).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ListResponse::<CountyResponse>::from(output)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "getCounty", trace_id = get_trace_id(&http_request), result))]
#[get("/counties/{countyId}")]
pub async fn county_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let county = app_state.geography_service.get_county(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CountyResponse::from(county)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "addCounty", trace_id = get_trace_id(&http_request), result))]
#[post("/counties")]
pub async fn county_add(http_request: HttpRequest, request_body: web::Json<CountyAddUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    let county_input = CountyAddUpdateInputType::from(request_body).validate()?;
    let county = app_state.geography_service.add_county(county_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(CountyResponse::from(county)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "updateCounty", trace_id = get_trace_id(&http_request), result))]
#[put("/counties/{countyId}")]
pub async fn county_update(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<CountyAddUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    let county_input = CountyAddUpdateInputType::from(request_body).validate()?;
    let county = app_state.geography_service.update_county(path.into_inner(), county_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CountyResponse::from(county)))
}

/**
 * Deletes a county with its cities and postal codes.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "deleteCounty", trace_id = get_trace_id(&http_request), result))]
#[delete("/counties/{countyId}")]
pub async fn county_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    app_state.geography_service.delete_county(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/***************** Cities *********************/

/**
 * Endpoint to retrieve a page of cities with their counties. Served under `/cities` and `/settlements`.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listCities", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[get("/cities")]
#[get("/settlements")]
pub async fn city_list(http_request: HttpRequest, pagination: web::Query<PaginationQuery>, filter: web::Query<CityListQuery>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let pagination_input = PaginationInput::from(pagination).validate()?;
    let output = app_state.geography_service.get_city_list(pagination_input, CityFilterInput::from(filter)).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ListResponse::<CityResponse>::from(output)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "getCity", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[get("/cities/{cityId}")]
#[get("/settlements/{cityId}")]
pub async fn city_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let city = app_state.geography_service.get_city(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CityResponse::from(city)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "addCity", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[post("/cities")]
#[post("/settlements")]
pub async fn city_add(http_request: HttpRequest, request_body: web::Json<CityAddUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    let request = request_body.into_inner();
    let city_input = CityAddUpdateInputType::validate(request.name, request.county_id)?;
    let city = app_state.geography_service.add_city(city_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(CityResponse::from(city)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "updateCity", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[put("/cities/{cityId}")]
#[put("/settlements/{cityId}")]
pub async fn city_update(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<CityAddUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    let request = request_body.into_inner();
    let city_input = CityAddUpdateInputType::validate(request.name, request.county_id)?;
    let city = app_state.geography_service.update_city(path.into_inner(), city_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CityResponse::from(city)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "deleteCity", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[delete("/cities/{cityId}")]
#[delete("/settlements/{cityId}")]
pub async fn city_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    app_state.geography_service.delete_city(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/***************** Postal codes *********************/

/**
 * Looks up a postal code by its exact code.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "searchPostalCode", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[get("/postal-codes/search/{code}")]
#[get("/zip-codes/search/{code}")]
pub async fn postal_code_search(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let postal_code = app_state.geography_service.search_postal_code(&path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(PostalCodeResponse::from(postal_code)))
}

/**
 * Endpoint to retrieve a page of postal codes with their city and county.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "listPostalCodes", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[get("/postal-codes")]
#[get("/zip-codes")]
pub async fn postal_code_list(
    http_request: HttpRequest,
    pagination: web::Query<PaginationQuery>,
    filter: web::Query<PostalCodeListQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let pagination_input = PaginationInput::from(pagination).validate()?;
    let output = app_state.geography_service.get_postal_code_list(pagination_input, PostalCodeFilterInput::from(filter)).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ListResponse::<PostalCodeResponse>::from(output)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "getPostalCode", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[get("/postal-codes/{postalCodeId}")]
#[get("/zip-codes/{postalCodeId}")]
pub async fn postal_code_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let postal_code = app_state.geography_service.get_postal_code(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(PostalCodeResponse::from(postal_code)))
}

/**
 * Adds a postal code, creating its city and county by name when missing.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "addPostalCode", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[post("/postal-codes")]
#[post("/zip-codes")]
pub async fn postal_code_add(http_request: HttpRequest, request_body: web::Json<PostalCodeAddUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    let postal_code_input = PostalCodeAddInputType::from(request_body).validate()?;
    let postal_code = app_state.geography_service.add_postal_code(postal_code_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(PostalCodeResponse::from(postal_code)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "updatePostalCode", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[put("/postal-codes/{postalCodeId}")]
#[put("/zip-codes/{postalCodeId}")]
pub async fn postal_code_update(
    path: Path<i64>,
    http_request: HttpRequest,
    request_body: web::Json<PostalCodeAddUpdateRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    let postal_code_input = PostalCodeUpdateInputType::from(request_body).validate()?;
    let postal_code = app_state.geography_service.update_postal_code(path.into_inner(), postal_code_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(PostalCodeResponse::from(postal_code)))
}

#[instrument(level = "info", skip(http_request, app_state), fields(service = "deletePostalCode", trace_id = get_trace_id(&http_request), result))]
#[routes]
#[delete("/postal-codes/{postalCodeId}")]
#[delete("/zip-codes/{postalCodeId}")]
pub async fn postal_code_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    app_state.auth_service.authenticate(&http_request).instrument(span.clone()).await?;
    app_state.geography_service.delete_postal_code(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request
        .headers()
        .get("X-Trace-ID")
        .and_then(|v| v.to_str().ok().map(std::string::ToString::to_string))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod test {
    use actix_web::{App, body::to_bytes, http::StatusCode, test, test::TestRequest};

    use super::*;
    use crate::{
        api::security::JwtSecurityService,
        dao::{geography::GeographyDao, users::UserDao},
        service::{auth::AuthService, geography::GeographyService},
    };

    fn app_state() -> web::Data<AppState> {
        let jwt_service = JwtSecurityService::new("a-test-secret", "HS256", 3600).unwrap();
        web::Data::new(AppState::new(AuthService::new(UserDao::new(), jwt_service, None), GeographyService::new(GeographyDao::new(), None)))
    }

    async fn body_json(response: actix_web::dev::ServiceResponse) -> serde_json::Value {
        serde_json::from_slice(&to_bytes(response.into_body()).await.unwrap()).unwrap()
    }

    #[actix_web::test]
    async fn test_get_trace_id_exists() {
        let request = TestRequest::default().insert_header(("X-Trace-ID", "test")).to_http_request();
        let trace_id = get_trace_id(&request);
        assert_eq!(trace_id, "test");
    }

    #[actix_web::test]
    async fn test_get_trace_id_not_exists() {
        let request = TestRequest::default().to_http_request();
        let trace_id = get_trace_id(&request);
        assert!(!trace_id.is_empty());
    }

    #[actix_web::test]
    async fn test_writes_require_token() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let requests = vec![
            TestRequest::post().uri("/counties").set_json(serde_json::json!({"name": "Zala"})),
            TestRequest::put().uri("/settlements/1").set_json(serde_json::json!({"name": "Aba", "countyId": 1})),
            TestRequest::post().uri("/zip-codes").set_json(serde_json::json!({"code": "8127", "cityName": "Aba", "countyName": "Fejér"})),
            TestRequest::delete().uri("/postal-codes/1"),
            TestRequest::get().uri("/user"),
            TestRequest::post().uri("/logout"),
        ];
        for request in requests {
            let response = test::call_service(&app, request.to_request()).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(body_json(response).await["code"], 1000);
        }
    }

    #[actix_web::test]
    async fn test_invalid_pagination_is_validation_error() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let response = test::call_service(&app, TestRequest::get().uri("/counties?perPage=500").to_request()).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["code"], 1004);
        assert!(body["errors"]["perPage"].is_array());

        let response = test::call_service(&app, TestRequest::get().uri("/settlements?page=abc").to_request()).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_register_validates_before_storage() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let request = TestRequest::post().uri("/register").set_json(serde_json::json!({"name": "Test", "email": "not-an-email", "password": "short"}));
        let response = test::call_service(&app, request.to_request()).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert!(body["errors"]["email"].is_array());
        assert!(body["errors"]["password"].is_array());
    }

    #[actix_web::test]
    async fn test_malformed_json_is_validation_error() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let request = TestRequest::post().uri("/login").insert_header(("Content-Type", "application/json")).set_payload("{not json");
        let response = test::call_service(&app, request.to_request()).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn test_reads_without_database() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let response = test::call_service(&app, TestRequest::get().uri("/postal-codes/search/7621").to_request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], 1003);
    }
}
