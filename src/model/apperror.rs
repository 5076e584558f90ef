use std::fmt;

/**
 * Represents the type of error that can occur within the application.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    Initialization,
    JwtAuthorization,
    DatabaseError,
    Validation,
    NotFound,
    ConstraintViolation,
    Application,
    Import,
}

/**
 * A validation message bound to a single request field.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/**
 * Represents an error that occurs within the application.
 */
#[derive(Debug, Clone)]
pub struct ApplicationError {
    /**
     * Error type.
     */
    pub error_type: ErrorType,
    /**
     * Error message describing problem.
     */
    pub message: String,
    /**
     * Field level messages. Only populated for validation errors.
     */
    pub field_errors: Vec<FieldError>,
}

impl ApplicationError {
    /**
     * Creates a new ApplicationError.
     *
     * #Arguments
     * `error_type`: The type of error.
     * `message`: A description of the error.
     */
    pub fn new(error_type: ErrorType, message: String) -> Self {
        ApplicationError { error_type, message, field_errors: Vec::new() }
    }

    /**
     * Creates a validation error for a single field.
     *
     * #Arguments
     * `field`: Name of the offending request field.
     * `message`: A description of the problem with the field.
     */
    pub fn validation(field: &str, message: &str) -> Self {
        Self::from_field_errors(vec![FieldError { field: field.to_string(), message: message.to_string() }])
    }

    /**
     * Creates a validation error from a list of field errors. The first message becomes the error message.
     */
    pub fn from_field_errors(field_errors: Vec<FieldError>) -> Self {
        let message = field_errors.first().map_or_else(|| "The given data was invalid.".to_string(), |field_error| field_error.message.clone());
        ApplicationError { error_type: ErrorType::Validation, message, field_errors }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApplicationError {}

/**
 * Collects field errors while validating a request.
 */
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        FieldErrors::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError { field: field.to_string(), message: message.into() });
    }

    /**
     * Returns Ok if nothing was collected, otherwise a validation error holding every message.
     */
    pub fn into_result(self) -> Result<(), ApplicationError> {
        if self.errors.is_empty() { Ok(()) } else { Err(ApplicationError::from_field_errors(self.errors)) }
    }
}
