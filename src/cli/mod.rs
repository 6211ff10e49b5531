use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "audio-relay",
    about = "Audio Relay - Download the audio track of a YouTube video as MP3 over HTTP",
    version,
    long_about = "A small HTTP service that accepts a YouTube link on /download, extracts the audio with yt-dlp and streams the MP3 back. Temporary files are removed after every response and swept periodically."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Port to listen on
    #[arg(short, long, global = true, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, global = true, env = "HOST")]
    pub host: Option<String>,

    /// Directory holding temporary audio files
    #[arg(long, global = true, env = "DOWNLOADS_DIR", value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Directory with the static front-end
    #[arg(long, global = true, env = "PUBLIC_DIR", value_name = "DIR")]
    pub public_dir: Option<PathBuf>,

    /// Enable debug logging and verbose yt-dlp output
    #[arg(long, global = true, env = "DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Deployment environment; "production" disables opening a browser
    #[arg(long = "env", global = true, env = "APP_ENV", value_name = "ENV")]
    pub environment: Option<String>,

    /// Path to a YAML configuration file
    #[arg(short, long, global = true, env = "AUDIO_RELAY_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// yt-dlp executable to invoke
    #[arg(long = "yt-dlp", global = true, env = "YT_DLP_PATH", value_name = "PATH")]
    pub yt_dlp: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Create the working directories and check external tools
    Setup,
}

impl Cli {
    /// The subcommand to run, defaulting to `serve`
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::try_parse_from(["audio-relay"]).unwrap();
        assert_eq!(cli.command(), Commands::Serve);
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "audio-relay",
            "setup",
            "--downloads-dir",
            "/tmp/audio",
            "--port",
            "8080",
        ])
        .unwrap();
        assert_eq!(cli.command(), Commands::Setup);
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.downloads_dir, Some(PathBuf::from("/tmp/audio")));
    }

    #[test]
    fn test_debug_flag() {
        let cli = Cli::try_parse_from(["audio-relay", "--debug"]).unwrap();
        assert!(cli.debug);
    }
}
