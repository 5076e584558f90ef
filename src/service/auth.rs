use actix_web::HttpRequest;
use argon2::{
    Argon2,
    password_hash::{Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::{PgConnection, Pool, Postgres};
use tracing::instrument;

use crate::{
    api::security::JwtSecurityService,
    dao::users::UserDao,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{AuthenticatedUser, IssuedTokenOutputType, LoginInputType, RegisterInputType, UserDetailType},
    },
    service::{acquire, begin, finish},
};

/**
 * Name recorded for tokens issued at registration and login.
 */
const TOKEN_NAME: &str = "auth_token";

const EMAIL_TAKEN: &str = "The email has already been taken.";
const BAD_CREDENTIALS: &str = "The provided credentials are incorrect.";

/**
 * Registration, login and bearer token verification.
 */
pub struct AuthService {
    user_dao: UserDao,
    jwt_service: JwtSecurityService,
    connection_pool: Option<Pool<Postgres>>,
}

impl AuthService {
    /**
     * Creates a new instance of `AuthService`.
     *
     * # Arguments
     * `user_dao`: The DAO for users and access tokens.
     * `jwt_service`: Signs and verifies tokens.
     * `connection_pool`: Optional connection pool for database operations.
     */
    pub fn new(user_dao: UserDao, jwt_service: JwtSecurityService, connection_pool: Option<Pool<Postgres>>) -> Self {
        AuthService { user_dao, jwt_service, connection_pool }
    }

    /**
     * Registers a user and issues the first token.
     *
     * # Returns
     * The new user and a bearer token, or a validation error if the email is taken.
     */
    #[instrument(skip(self, register_input), fields(email = %register_input.email))]
    pub async fn register(&self, register_input: RegisterInputType) -> Result<IssuedTokenOutputType, ApplicationError> {
        let password_hash = hash_password(&register_input.password)?;
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            if self.user_dao.is_email_taken(&mut transaction, &register_input.email).await? {
                return Err(ApplicationError::validation("email", EMAIL_TAKEN));
            }
            let user = self.user_dao.add_user(&mut transaction, &register_input.name, &register_input.email, &password_hash).await?;
            self.issue_token(&mut transaction, user).await
        }
        .await;
        finish(transaction, result).await
    }

    /**
     * Verifies the credentials and issues a new token.
     *
     * # Returns
     * The user and a bearer token. Unknown emails and wrong passwords give the same validation error.
     */
    #[instrument(skip(self, login_input), fields(email = %login_input.email))]
    pub async fn login(&self, login_input: LoginInputType) -> Result<IssuedTokenOutputType, ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = async {
            let Some((user, password_hash)) = self.user_dao.get_user_credentials(&mut transaction, &login_input.email).await? else {
                return Err(ApplicationError::validation("email", BAD_CREDENTIALS));
            };
            if !verify_password(&password_hash, &login_input.password)? {
                return Err(ApplicationError::validation("email", BAD_CREDENTIALS));
            }
            self.issue_token(&mut transaction, user).await
        }
        .await;
        finish(transaction, result).await
    }

    /**
     * Verifies the bearer token of the request and checks that it has not been revoked.
     *
     * # Arguments
     * `http_request`: The HTTP request containing the token in the Authorization header.
     *
     * # Returns
     * The caller, or a JWT authorization error.
     */
    pub async fn authenticate(&self, http_request: &HttpRequest) -> Result<AuthenticatedUser, ApplicationError> {
        let claim = self.jwt_service.validate(http_request)?;
        let user_id = claim.user_id()?;
        let mut connection = acquire(&self.connection_pool).await?;
        match self.user_dao.touch_access_token(&mut connection, &claim.jti).await? {
            Some(owner_id) if owner_id == user_id => Ok(AuthenticatedUser { user_id, token_id: claim.jti }),
            _ => {
                tracing::debug!("Access token {} is revoked or expired", claim.jti);
                Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthenticated.".to_string()))
            }
        }
    }

    /**
     * Revokes the token the caller authenticated with.
     */
    #[instrument(skip(self))]
    pub async fn logout(&self, authenticated_user: &AuthenticatedUser) -> Result<(), ApplicationError> {
        let mut transaction = begin(&self.connection_pool).await?;
        let result = self.user_dao.delete_access_token(&mut transaction, &authenticated_user.token_id).await;
        finish(transaction, result).await
    }

    pub async fn get_user(&self, authenticated_user: &AuthenticatedUser) -> Result<UserDetailType, ApplicationError> {
        let mut connection = acquire(&self.connection_pool).await?;
        self.user_dao
            .get_user(&mut connection, authenticated_user.user_id)
            .await?
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "User not found".to_string()))
    }

    async fn issue_token(&self, transaction: &mut PgConnection, user: UserDetailType) -> Result<IssuedTokenOutputType, ApplicationError> {
        let issued = self.jwt_service.issue(&user)?;
        self.user_dao.add_access_token(transaction, user.id, &issued.token_id, TOKEN_NAME, issued.expires_at).await?;
        Ok(IssuedTokenOutputType { user, token: issued.token })
    }
}

/**
 * Hashes a password into a PHC string with a random salt.
 */
fn hash_password(password: &str) -> Result<String, ApplicationError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ApplicationError::new(ErrorType::Application, format!("Failed to hash password: {err}")))
}

/**
 * Checks a password against a stored PHC string.
 *
 * # Returns
 * false for a wrong password, an error for an unreadable hash.
 */
fn verify_password(password_hash: &str, password: &str) -> Result<bool, ApplicationError> {
    let parsed = PasswordHash::new(password_hash).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Invalid stored password hash: {err}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(err) => Err(ApplicationError::new(ErrorType::Application, format!("Failed to verify password: {err}"))),
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    fn service() -> AuthService {
        AuthService::new(UserDao::new(), JwtSecurityService::new("a-test-secret", "HS256", 3600).unwrap(), None)
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("secret-password").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "secret-password").unwrap());
        assert!(!verify_password(&hash, "wrong-password").unwrap());
    }

    #[test]
    fn test_password_hashes_are_salted() {
        assert_ne!(hash_password("secret-password").unwrap(), hash_password("secret-password").unwrap());
    }

    #[test]
    fn test_verify_against_garbage_hash() {
        assert!(verify_password("not-a-hash", "secret-password").is_err());
    }

    #[actix_web::test]
    async fn test_authenticate_without_token() {
        let request = TestRequest::default().to_http_request();
        let error = service().authenticate(&request).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::JwtAuthorization);
    }
}

#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use actix_web::test::TestRequest;
    use sqlx::PgPool;

    use super::*;

    fn service(pool: PgPool) -> AuthService {
        AuthService::new(UserDao::new(), JwtSecurityService::new("a-test-secret", "HS256", 3600).unwrap(), Some(pool))
    }

    fn register_input(email: &str) -> RegisterInputType {
        RegisterInputType::validate(Some("Test User".to_string()), Some(email.to_string()), Some("password123".to_string()), Some("password123".to_string())).unwrap()
    }

    fn bearer(token: &str) -> HttpRequest {
        TestRequest::default().insert_header(("Authorization", format!("Bearer {token}"))).to_http_request()
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_register_login_logout(pool: PgPool) {
        let service = service(pool);
        let registered = service.register(register_input("test@example.com")).await.unwrap();
        let caller = service.authenticate(&bearer(&registered.token)).await.unwrap();
        assert_eq!(caller.user_id, registered.user.id);

        let login = LoginInputType::validate(Some("TEST@example.com".to_string()), Some("password123".to_string())).unwrap();
        let logged_in = service.login(login).await.unwrap();
        assert_ne!(logged_in.token, registered.token);

        service.logout(&caller).await.unwrap();
        assert!(service.authenticate(&bearer(&registered.token)).await.is_err());
        assert!(service.authenticate(&bearer(&logged_in.token)).await.is_ok());
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_register_taken_email(pool: PgPool) {
        let service = service(pool);
        service.register(register_input("test@example.com")).await.unwrap();
        let error = service.register(register_input("test@example.com")).await.unwrap_err();
        assert_eq!(error.error_type, ErrorType::Validation);
        assert_eq!(error.field_errors[0].field, "email");
    }

    #[sqlx::test(migrations = "./sqlx-postgresql-migration/migrations")]
    async fn test_login_with_wrong_password(pool: PgPool) {
        let service = service(pool);
        service.register(register_input("test@example.com")).await.unwrap();
        let login = LoginInputType::validate(Some("test@example.com".to_string()), Some("wrong-password".to_string())).unwrap();
        let error = service.login(login).await.unwrap_err();
        assert_eq!(error.message, BAD_CREDENTIALS);
        let unknown = LoginInputType::validate(Some("nobody@example.com".to_string()), Some("password123".to_string())).unwrap();
        assert_eq!(service.login(unknown).await.unwrap_err().message, BAD_CREDENTIALS);
    }
}
