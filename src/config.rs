//! Configuration related structures
use clap::{Parser, Subcommand, ValueEnum};
use getset::{CopyGetters, Getters};
use std::path::PathBuf;
use strum::{AsRefStr, Display, EnumString};

macro_rules! prefix {
    () => {
        "FD_HANDOFF_"
    };
}

#[derive(CopyGetters, Debug, Eq, Getters, Parser, PartialEq)]
#[command(
    after_help("Descriptors are passed as SCM_RIGHTS ancillary data."),
    version
)]
/// Hand open file descriptors to another process over a Unix domain socket.
pub struct Config {
    #[get = "pub"]
    #[command(subcommand)]
    /// Possible subcommands.
    command: Commands,

    #[get_copy = "pub"]
    #[arg(
        default_value_t,
        env(concat!(prefix!(), "LOG_LEVEL")),
        global(true),
        long("log-level"),
        short('l'),
        value_enum,
        value_name("LEVEL")
    )]
    /// The logging level, written to stderr.
    log_level: LogLevel,
}

#[derive(Clone, Debug, Eq, PartialEq, Subcommand)]
/// Possible subcommands.
pub enum Commands {
    /// Listen on a socket and hand the given files to the first process connecting to it.
    ///
    /// The receiver is told how many descriptors follow and how they are named, then the
    /// descriptors are sent and the command waits for the receiver to acknowledge them.
    Send {
        #[arg(
            env(concat!(prefix!(), "SOCKET")),
            long("socket"),
            short('s'),
            value_name("PATH")
        )]
        /// Path of the Unix domain socket to listen on.
        socket: PathBuf,

        #[arg(long("name"), short('n'), value_name("NAME"))]
        /// Names for the files, in order. Missing names default to the file path.
        names: Vec<String>,

        #[arg(required(true), value_name("FILE"))]
        /// Files to open and hand over.
        files: Vec<PathBuf>,
    },

    /// Connect to a socket and receive the announced file descriptors.
    ///
    /// A JSON summary of every received descriptor is printed to stdout.
    Recv {
        #[arg(
            env(concat!(prefix!(), "SOCKET")),
            long("socket"),
            short('s'),
            value_name("PATH")
        )]
        /// Path of the Unix domain socket to connect to.
        socket: PathBuf,
    },
}

#[derive(
    AsRefStr, Clone, Copy, Debug, Default, Display, EnumString, Eq, Hash, PartialEq, ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
/// Available log levels.
pub enum LogLevel {
    /// Trace level, the most verbose one.
    Trace,

    /// Debug level, less verbose than trace.
    Debug,

    /// Info level, less verbose than debug.
    #[default]
    Info,

    /// Warn level, less verbose than info.
    Warn,

    /// Error level, showing only errors.
    Error,

    /// Disable logging.
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use clap::CommandFactory;
    use std::str::FromStr;

    #[test]
    fn verify_cli() {
        <Config as CommandFactory>::command().debug_assert();
    }

    #[test]
    fn parse_send() -> Result<()> {
        let config = Config::try_parse_from([
            "fd-handoff",
            "-l",
            "debug",
            "send",
            "--socket",
            "/tmp/handoff.sock",
            "-n",
            "first",
            "/etc/hostname",
            "/etc/hosts",
        ])?;

        assert_eq!(config.log_level(), LogLevel::Debug);
        assert_eq!(
            config.command(),
            &Commands::Send {
                socket: "/tmp/handoff.sock".into(),
                names: vec!["first".into()],
                files: vec!["/etc/hostname".into(), "/etc/hosts".into()],
            }
        );
        Ok(())
    }

    #[test]
    fn send_requires_files() {
        let res = Config::try_parse_from(["fd-handoff", "send", "-s", "/tmp/handoff.sock"]);
        assert!(res.is_err());
    }

    #[test]
    fn log_level_strings() -> Result<()> {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_ref(), "warn");
        assert_eq!(<LogLevel as FromStr>::from_str("off")?, LogLevel::Off);
        Ok(())
    }
}
