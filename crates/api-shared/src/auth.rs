/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Header naming the caller; stamped onto every record the request writes.
pub const CALLER_ID_HEADER: &str = "x-caller-id";
/// Optional header propagating a request id (UUID) for log correlation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiKeyError {
    #[error("API key missing")]
    Missing,
    #[error("invalid API key")]
    Invalid,
}

/// Validates a provided API key against the key the server was started with.
///
/// Returns `Ok(())` when no key is configured, or when the provided key matches.
pub fn validate_api_key(provided: Option<&str>, expected: Option<&str>) -> Result<(), ApiKeyError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match provided {
        None => Err(ApiKeyError::Missing),
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiKeyError::Invalid),
    }
}
