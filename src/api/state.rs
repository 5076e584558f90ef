use crate::service::{auth::AuthService, geography::GeographyService};

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * Registration, login and bearer token checks.
     */
    pub auth_service: AuthService,
    /**
     * Counties, cities and postal codes.
     */
    pub geography_service: GeographyService,
}

impl AppState {
    /**
     * Creates a new instance of `AppState`.
     *
     * # Arguments
     * `auth_service`: The service for users and access tokens.
     * `geography_service`: The service for counties, cities and postal codes.
     */
    pub fn new(auth_service: AuthService, geography_service: GeographyService) -> Self {
        AppState { auth_service, geography_service }
    }
}
