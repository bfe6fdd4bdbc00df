use std::{error::Error, fmt::Debug};

use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use keyrotate_core::keys::{RemoteError, RemoteErrorKind};

const AUTHORIZATION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidAccessKeyId",
    "InvalidClientTokenId",
    "MissingAuthenticationToken",
    "SignatureDoesNotMatch",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
];

const TRANSIENT_CODES: &[&str] = &[
    "InternalFailure",
    "RequestLimitExceeded",
    "RequestTimeout",
    "RequestTimeoutException",
    "ServiceFailure",
    "ServiceUnavailable",
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
];

/// Map an AWS error code onto the retry-relevant error kind.
pub fn classify_code(code: Option<&str>) -> RemoteErrorKind {
    match code {
        Some(code) if AUTHORIZATION_CODES.contains(&code) => RemoteErrorKind::Authorization,
        Some(code) if TRANSIENT_CODES.contains(&code) => RemoteErrorKind::Transient,
        _ => RemoteErrorKind::Service,
    }
}

/// Convert an SDK error from `operation` into a [`RemoteError`].
pub(crate) fn remote_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + Error + 'static,
    R: Debug,
{
    let kind = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            RemoteErrorKind::Transient
        }
        SdkError::ServiceError(service) => classify_code(service.err().code()),
        _ => RemoteErrorKind::Service,
    };
    RemoteError::new(operation, kind, DisplayErrorContext(&err).to_string())
}
