use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// CLI surface definition. Without a subcommand the key of `--profile` is rotated.
#[derive(Parser, Debug)]
#[command(
    name = "awsrotkey",
    about = "Rotate the AWS access key of a named profile",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub rotate: RotateArgs,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RotateArgs {
    /// The profile to use.
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Dry mode: preview only.
    #[arg(long)]
    pub dry: bool,

    /// Credentials file to update (defaults to ~/.aws/credentials).
    #[arg(long, env = "AWS_SHARED_CREDENTIALS_FILE", value_name = "PATH")]
    pub credentials_file: Option<PathBuf>,

    /// Region used to sign requests (IAM is global; defaults to the profile's region).
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Stop waiting on remote calls after this many seconds (never once a new key exists).
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rotation_flags() {
        let cli = Cli::try_parse_from([
            "awsrotkey",
            "--profile",
            "work",
            "--dry",
            "--credentials-file",
            "/tmp/creds",
            "--region",
            "eu-west-1",
            "--timeout",
            "30",
        ])
        .expect("parse should succeed");

        assert_eq!(cli.command, None);
        assert_eq!(cli.rotate.profile.as_deref(), Some("work"));
        assert!(cli.rotate.dry);
        assert_eq!(cli.rotate.credentials_file, Some(PathBuf::from("/tmp/creds")));
        assert_eq!(cli.rotate.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.rotate.timeout, Some(30));
    }

    #[test]
    fn dry_defaults_to_off() {
        let cli =
            Cli::try_parse_from(["awsrotkey", "--profile", "work"]).expect("parse should succeed");
        assert!(!cli.rotate.dry);
    }

    #[test]
    fn parses_version_subcommand() {
        let cli = Cli::try_parse_from(["awsrotkey", "version"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Version));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["awsrotkey", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let err = Cli::try_parse_from(["awsrotkey", "--timeout", "soon"])
            .expect_err("timeout must be numeric");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
