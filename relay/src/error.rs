//! Registry errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use decentri_types::DeviceId;
use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("license not found: {0}")]
    LicenseNotFound(String),

    #[error("device {device} does not hold the license (current holder: {holder})")]
    NotHolder { device: DeviceId, holder: DeviceId },

    #[error("target device not registered: {0}")]
    UnknownDevice(DeviceId),

    #[error("target device not recently active: {0}")]
    InactiveDevice(DeviceId),

    #[error("token validation failed: {0}")]
    TokenMismatch(String),
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::LicenseNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotHolder { .. }
            | Self::UnknownDevice(_)
            | Self::InactiveDevice(_)
            | Self::TokenMismatch(_) => StatusCode::CONFLICT,
        };
        (status, self.to_string()).into_response()
    }
}
