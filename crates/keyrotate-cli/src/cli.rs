use std::path::PathBuf;

use clap::Parser;

/// CLI surface. Unset flags fall back to the config file, then to built-in defaults.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "keyrotate",
    about = "Rotate the IAM access key stored in an AWS credentials profile",
    version
)]
pub struct Cli {
    /// Name of the AWS profile whose credentials should be rotated [default: default].
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,

    /// AWS region used for the API calls [default: eu-central-1].
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Path to the AWS credentials file [default: ~/.aws/credentials].
    #[arg(long = "credential-file", value_name = "PATH")]
    pub credential_file: Option<PathBuf>,

    /// Alternate config file instead of the platform default.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
