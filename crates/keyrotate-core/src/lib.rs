//! Core abstractions for keyrotate: key material, the remote key service and
//! profile store contracts, and the rotation sequence that ties them together.
//! This crate stays free of AWS and filesystem dependencies.

pub mod keys;
pub mod profile;
pub mod rotation;
