//! The AWS shared credentials file: locating a profile section and rewriting
//! its key lines atomically, without disturbing anything else in the file.

pub mod credentials_file;
pub mod locator;
pub mod writer;

pub use credentials_file::CredentialsFile;
pub use locator::{ProfileLocator, ProfileSection};
pub use writer::CredentialFileWriter;

pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
