use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::{eyre::WrapErr, Result};
use dirs::{config_dir, home_dir};
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

pub const DEFAULT_PROFILE: &str = "default";
pub const DEFAULT_REGION: &str = "eu-central-1";

/// User-level configuration loaded from `~/.config/keyrotate/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Profile to rotate when `--profile` is absent.
    pub profile: Option<String>,
    /// Region for API calls when `--region` is absent.
    pub region: Option<String>,
    /// Credentials file when `--credential-file` is absent. A leading `~/` is expanded.
    pub credential_file: Option<PathBuf>,
}

/// Fully resolved settings for one rotation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub profile: String,
    pub region: String,
    pub credential_file: PathBuf,
}

const CONFIG_FILE: &str = "config.toml";

/// Load the file named by `--config`, or the per-user default.
///
/// A file named on the command line must exist. The per-user file is optional:
/// when it, or the platform config dir, is absent the built-in defaults apply.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return read_config(path);
    }
    match user_config_path() {
        Some(path) if path.is_file() => read_config(&path),
        _ => Ok(Config::default()),
    }
}

/// `<config_dir>/keyrotate/config.toml`, when the platform has a config dir.
fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("keyrotate").join(CONFIG_FILE))
}

fn read_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    toml::from_str(&contents).wrap_err_with(|| format!("parsing config {}", path.display()))
}

/// `~/.aws/credentials` for the current user.
pub fn default_credentials_path() -> Result<PathBuf> {
    let home = home_dir().ok_or_else(|| color_eyre::eyre::eyre!("no home dir available"))?;
    Ok(home.join(".aws").join("credentials"))
}

/// Merge CLI flags over config values over built-in defaults.
pub fn resolve(cli: &Cli, config: &Config) -> Result<Settings> {
    let profile = cli
        .profile
        .clone()
        .or_else(|| config.profile.clone())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
    let region = cli
        .region
        .clone()
        .or_else(|| config.region.clone())
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    let credential_file = match cli.credential_file.as_ref().or(config.credential_file.as_ref()) {
        Some(path) => expand_home(path)?,
        None => default_credentials_path()?,
    };
    Ok(Settings {
        profile,
        region,
        credential_file,
    })
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home =
                home_dir().ok_or_else(|| color_eyre::eyre::eyre!("no home dir available"))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> Cli {
        Cli {
            profile: None,
            region: None,
            credential_file: None,
            config: None,
        }
    }

    #[test]
    fn named_config_must_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.toml");
        let err = load(Some(&path)).expect_err("missing named config");
        assert!(format!("{err:#}").contains("missing.toml"));
    }

    #[test]
    fn empty_config_means_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "\n").expect("write temp config");
        assert_eq!(load(Some(&path)).expect("load"), Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            profile = "ops"
            region = "us-west-2"
            credential_file = "/srv/aws/credentials"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, contents).expect("write temp config");

        let cfg = load(Some(&path)).expect("load");
        assert_eq!(
            cfg,
            Config {
                profile: Some("ops".into()),
                region: Some("us-west-2".into()),
                credential_file: Some(PathBuf::from("/srv/aws/credentials")),
            }
        );
    }

    #[test]
    fn malformed_config_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "profile = [").expect("write temp config");
        let err = load(Some(&path)).expect_err("malformed");
        assert!(format!("{err:#}").contains("parsing config"));
    }

    #[test]
    fn built_in_defaults_apply() {
        let settings = resolve(&cli(), &Config::default()).expect("resolve");
        assert_eq!(settings.profile, DEFAULT_PROFILE);
        assert_eq!(settings.region, DEFAULT_REGION);
        assert!(settings.credential_file.ends_with(".aws/credentials"));
    }

    #[test]
    fn flags_override_config() {
        let config = Config {
            profile: Some("from-config".into()),
            region: Some("ap-south-1".into()),
            credential_file: Some(PathBuf::from("/config/credentials")),
        };
        let settings = resolve(&cli(), &config).expect("resolve");
        assert_eq!(settings.profile, "from-config");
        assert_eq!(settings.region, "ap-south-1");
        assert_eq!(settings.credential_file, PathBuf::from("/config/credentials"));

        let flags = Cli {
            profile: Some("from-flag".into()),
            region: Some("us-east-1".into()),
            credential_file: Some(PathBuf::from("/flag/credentials")),
            config: None,
        };
        let settings = resolve(&flags, &config).expect("resolve");
        assert_eq!(
            settings,
            Settings {
                profile: "from-flag".into(),
                region: "us-east-1".into(),
                credential_file: PathBuf::from("/flag/credentials"),
            }
        );
    }

    #[test]
    fn tilde_expands_to_home() {
        let flags = Cli {
            credential_file: Some(PathBuf::from("~/work/credentials")),
            ..cli()
        };
        let settings = resolve(&flags, &Config::default()).expect("resolve");
        assert!(settings.credential_file.is_absolute());
        assert!(settings.credential_file.ends_with("work/credentials"));
    }
}
