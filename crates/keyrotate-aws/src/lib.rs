//! AWS-backed key service: STS for caller identity, IAM for access keys.

pub mod errors;
pub mod iam;

pub use iam::AwsKeyService;
