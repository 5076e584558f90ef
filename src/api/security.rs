use std::str::FromStr;

use actix_web::{FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::UserDetailType,
};

/**
 * Claims carried by an access token. `jti` identifies the stored token row.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub sub: String,
    pub name: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claim {
    /**
     * The user id in the subject claim.
     */
    pub fn user_id(&self) -> Result<i64, ApplicationError> {
        self.sub.parse::<i64>().map_err(|_| ApplicationError::new(ErrorType::JwtAuthorization, "Unauthenticated.".to_string()))
    }
}

/**
 * A freshly signed token and the values to record for it.
 */
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

/**
 * JWT Security Service for issuing and verifying HMAC signed access tokens.
 */
#[derive(Clone)]
pub struct JwtSecurityService {
    /**
     * The key used to sign new tokens.
     */
    encoding_key: EncodingKey,
    /**
     * The key used to verify tokens.
     */
    decoding_key: DecodingKey,
    /**
     * The validation rules for JWT tokens.
     */
    validation: Validation,
    algorithm: Algorithm,
    /**
     * Lifetime of issued tokens.
     */
    token_ttl: Duration,
}

impl JwtSecurityService {
    /**
     * Creates a new instance of JwtSecurityService.
     *
     * # Arguments
     * `secret`: The shared secret used to sign and verify tokens.
     * `algorithm`: One of HS256, HS384 or HS512.
     * `token_ttl_secs`: Lifetime of issued tokens in seconds.
     *
     * # Returns
     * A Result containing the JwtSecurityService or an ApplicationError if initialization fails.
     */
    pub fn new(secret: &str, algorithm: &str, token_ttl_secs: i64) -> Result<Self, ApplicationError> {
        let algorithm = Algorithm::from_str(algorithm).map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Invalid algorithm: {err}")))?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ApplicationError::new(ErrorType::Initialization, "Unsupported algorithm".to_string()));
        }
        if secret.is_empty() {
            return Err(ApplicationError::new(ErrorType::Initialization, "JWT secret must not be empty".to_string()));
        }
        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Ok(JwtSecurityService {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            algorithm,
            token_ttl: Duration::seconds(token_ttl_secs),
        })
    }

    /**
     * Signs a new token for the user.
     *
     * # Arguments
     * `user`: The token owner.
     *
     * # Returns
     * The signed token with its id and expiry.
     */
    pub fn issue(&self, user: &UserDetailType) -> Result<IssuedToken, ApplicationError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + self.token_ttl;
        let claim = Claim {
            sub: user.id.to_string(),
            name: user.name.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(self.algorithm), &claim, &self.encoding_key).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Failed to sign token: {err}")))?;
        Ok(IssuedToken { token, token_id: claim.jti, expires_at })
    }

    /**
     * Validates the JWT token from the HTTP request.
     *
     * # Arguments
     * `http_request`: The HTTP request containing the JWT token in the Authorization header.
     *
     * # Returns
     * The verified claims or an ApplicationError if validation fails.
     */
    pub fn validate(&self, http_request: &HttpRequest) -> Result<Claim, ApplicationError> {
        let credentials = BearerAuth::from_request(http_request, &mut actix_web::dev::Payload::None).into_inner().ok();
        let Some(credentials) = credentials else {
            return Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthenticated.".to_string()));
        };
        match jsonwebtoken::decode::<Claim>(credentials.token(), &self.decoding_key, &self.validation) {
            Ok(token_data) => Ok(token_data.claims),
            Err(err) => {
                tracing::debug!("JWT validation error: {err}");
                Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthenticated.".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    const SECRET: &str = "a-test-secret-that-is-long-enough";

    fn user() -> UserDetailType {
        UserDetailType { id: 42, name: "Test User".to_string(), email: "test@example.com".to_string(), created_at: Utc::now(), updated_at: Utc::now() }
    }

    fn request_with_token(token: &str) -> HttpRequest {
        TestRequest::with_uri("/user").insert_header(("Authorization", format!("Bearer {token}"))).to_http_request()
    }

    #[test]
    fn test_jwt_security_service_initialization_success() {
        assert!(JwtSecurityService::new(SECRET, "HS256", 3600).is_ok());
        assert!(JwtSecurityService::new(SECRET, "HS512", 3600).is_ok());
    }

    #[test]
    fn test_jwt_security_service_initialization_invalid_algorithm() {
        let error = JwtSecurityService::new(SECRET, "XX256", 3600).err().unwrap();
        assert_eq!(error.error_type, ErrorType::Initialization);
    }

    #[test]
    fn test_jwt_security_service_initialization_asymmetric_algorithm() {
        assert!(JwtSecurityService::new(SECRET, "RS256", 3600).is_err());
    }

    #[test]
    fn test_jwt_security_service_initialization_empty_secret() {
        assert!(JwtSecurityService::new("", "HS256", 3600).is_err());
    }

    #[test]
    fn test_issued_token_validates() {
        let jwt_service = JwtSecurityService::new(SECRET, "HS256", 3600).unwrap();
        let issued = jwt_service.issue(&user()).unwrap();
        let claim = jwt_service.validate(&request_with_token(&issued.token)).unwrap();
        assert_eq!(claim.user_id().unwrap(), 42);
        assert_eq!(claim.name, "Test User");
        assert_eq!(claim.jti, issued.token_id);
        assert_eq!(claim.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_token_ids_are_unique() {
        let jwt_service = JwtSecurityService::new(SECRET, "HS256", 3600).unwrap();
        let first = jwt_service.issue(&user()).unwrap();
        let second = jwt_service.issue(&user()).unwrap();
        assert_ne!(first.token_id, second.token_id);
    }

    #[test]
    fn test_token_signed_with_other_secret_fails() {
        let issuer = JwtSecurityService::new("another-secret-entirely", "HS256", 3600).unwrap();
        let jwt_service = JwtSecurityService::new(SECRET, "HS256", 3600).unwrap();
        let issued = issuer.issue(&user()).unwrap();
        assert!(jwt_service.validate(&request_with_token(&issued.token)).is_err());
    }

    #[test]
    fn test_expired_token_fails() {
        let jwt_service = JwtSecurityService::new(SECRET, "HS256", -3600).unwrap();
        let issued = jwt_service.issue(&user()).unwrap();
        let error = jwt_service.validate(&request_with_token(&issued.token)).unwrap_err();
        assert_eq!(error.error_type, ErrorType::JwtAuthorization);
    }

    #[test]
    fn test_jwt_security_service_validator_failure() {
        let jwt_service = JwtSecurityService::new(SECRET, "HS256", 3600).unwrap();
        let req = TestRequest::with_uri("/user").to_http_request();
        assert!(jwt_service.validate(&req).is_err());
        assert!(jwt_service.validate(&request_with_token("not-a-token")).is_err());
    }
}
