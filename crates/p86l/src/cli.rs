use clap::{Parser, Subcommand};

/// Install, update and launch Project 86.
#[derive(Debug, Parser)]
#[command(name = "p86l")]
#[command(version, about)]
pub struct Cli {
    /// Write debug-level logs for this run
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Subcommand)]
pub enum Command {
    /// Check for a newer release and show what the launcher would do
    #[default]
    Status,
    /// Download and install the latest release, or update the current one
    Install,
    /// Launch the installed game
    Play,
    /// Delete cached releases and all installed game files
    Reset {
        /// Confirm deletion of the installed game
        #[arg(long, short)]
        yes: bool,
    },
    /// Forget cached release information without touching the install
    ClearCache,
    /// Show the notes of the latest release
    Changelog,
    /// Open the install folder in the file manager
    OpenFolder,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};

    #[test]
    fn cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn status_is_the_default_command() {
        let cli = Cli::parse_from(["p86l"]);
        assert_eq!(cli.command.unwrap_or_default(), Command::Status);
        assert!(!cli.debug);
    }

    #[test]
    fn global_debug_flag_and_subcommands() {
        let cli = Cli::parse_from(["p86l", "install", "--debug"]);
        assert!(cli.debug);
        assert_eq!(cli.command, Some(Command::Install));

        let cli = Cli::parse_from(["p86l", "clear-cache"]);
        assert_eq!(cli.command, Some(Command::ClearCache));

        let cli = Cli::parse_from(["p86l", "reset", "--yes"]);
        assert_eq!(cli.command, Some(Command::Reset { yes: true }));

        let cli = Cli::parse_from(["p86l", "open-folder"]);
        assert_eq!(cli.command, Some(Command::OpenFolder));
    }
}
