//! Rust toolkit for e-invoice onboarding and signing: CSR and key generation, XAdES signing,
//! QR payloads and the certificate authority API.
//!
//! # Examples
//! ```rust
//! use fotara_core::config::{Config, EnvironmentType};
//!
//! let config = Config::new(EnvironmentType::Simulation);
//! # let _ = config;
//! ```
pub mod api;
pub mod certificate;
pub mod config;
pub mod csr;
pub mod invoice;
pub mod keys;
pub mod onboarding;
pub mod storage;

use thiserror::Error;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Key(#[from] keys::KeyError),
    #[error(transparent)]
    Csr(#[from] csr::CsrError),
    #[error(transparent)]
    Certificate(#[from] certificate::CertificateError),
    #[error(transparent)]
    Signing(#[from] invoice::SigningError),
    #[error(transparent)]
    Qr(#[from] invoice::QrCodeError),
    #[error(transparent)]
    Timestamp(#[from] invoice::TimestampError),
    #[error(transparent)]
    Api(#[from] api::ClientError),
    #[error(transparent)]
    Storage(#[from] storage::StorageError),
    #[error(transparent)]
    Onboarding(#[from] onboarding::OnboardingError),
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::{
        api::ClientError,
        config::ConfigError,
        csr::CsrError,
        invoice::{QrCodeError, SigningError, TimestampError},
        keys::KeyError,
        onboarding::{OnboardingError, OnboardingFailure, OnboardingState},
        storage::StorageError,
    };

    #[test]
    fn error_conversions_cover_variants() {
        let err: Error = ConfigError::MissingStorageKey.into();
        assert!(matches!(err, Error::Config(_)));

        let err: Error = KeyError::BlankPassword.into();
        assert!(matches!(err, Error::Key(_)));

        let err: Error = CsrError::Validation {
            messages: vec!["Common Name is required".into()],
        }
        .into();
        assert!(matches!(err, Error::Csr(_)));

        let err: Error = SigningError::MissingUuid.into();
        assert!(matches!(err, Error::Signing(_)));

        let err: Error = QrCodeError::MissingSellerName.into();
        assert!(matches!(err, Error::Qr(_)));

        let err: Error = TimestampError::OutOfRange {
            value: "9999-12-31T23:00:00Z".into(),
        }
        .into();
        assert!(matches!(err, Error::Timestamp(_)));

        let err: Error = ClientError::ClientState("state".into()).into();
        assert!(matches!(err, Error::Api(_)));

        let err: Error = StorageError::Decryption.into();
        assert!(matches!(err, Error::Storage(_)));

        let err: Error = OnboardingError {
            state: OnboardingState::RequestComplianceCertificate,
            failure: OnboardingFailure::MissingRequestId,
        }
        .into();
        assert!(matches!(err, Error::Onboarding(_)));
        assert!(err.to_string().contains("request compliance certificate"));
    }
}
