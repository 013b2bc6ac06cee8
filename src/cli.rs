//! Command-line options for the interactive client

use clap::Parser;
use std::path::PathBuf;

use crate::listing::ListingFormat;

#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "Interactive FTP navigator with local filesystem commands alongside"
)]
pub struct Opts {
    /// Connect to this URL at startup (ftp://host[:port][/path])
    #[arg(long)]
    pub url: Option<String>,

    /// Credential as user:password for --url or the configured default URL
    #[arg(long)]
    pub user: Option<String>,

    /// Configuration file (default: ~/.config/ftpnav/ftpnav.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Append session events to this text log
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON line per download/upload to this file
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Listing format requested from the server
    #[arg(long, value_enum)]
    pub format: Option<ListingFormat>,

    /// Do not show a spinner during transfers
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Plain output without ANSI colors
    #[arg(long = "no-color")]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let o = Opts::parse_from([
            "ftpnav",
            "--url",
            "ftp://h",
            "--user",
            "demo:demo",
            "--format",
            "mlsd",
            "--no-progress",
        ]);
        assert_eq!(o.url.as_deref(), Some("ftp://h"));
        assert_eq!(o.user.as_deref(), Some("demo:demo"));
        assert_eq!(o.format, Some(ListingFormat::Mlsd));
        assert!(o.no_progress);
        assert!(!o.no_color);
    }

    #[test]
    fn user_alone_is_accepted_for_the_default_url() {
        let o = Opts::try_parse_from(["ftpnav", "--user", "a:b"]).unwrap();
        assert_eq!(o.user.as_deref(), Some("a:b"));
        assert!(o.url.is_none());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Opts::command().debug_assert();
    }
}
