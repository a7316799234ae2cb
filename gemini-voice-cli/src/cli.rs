//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "gemini-voice",
    author,
    version,
    about = "Real-time voice conversation with Gemini over the Live API",
    after_help = "Example:\n  gemini-voice --api-key YOUR_KEY --dummy-audio --enable-search"
)]
pub struct Args {
    /// API key for the Live API.
    #[arg(short = 'k', long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// JSON config file. Missing file means defaults.
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Run without audio devices: send silence, discard received audio.
    #[arg(long)]
    pub dummy_audio: bool,

    /// Declare the search tool in the session setup.
    #[arg(long)]
    pub enable_search: bool,

    /// Input device name (defaults to the system microphone).
    #[arg(long, value_name = "NAME")]
    pub input_device: Option<String>,

    /// Output device name (defaults to the system speaker).
    #[arg(long, value_name = "NAME")]
    pub output_device: Option<String>,

    /// Print the available audio devices and exit.
    #[arg(long)]
    pub list_devices: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn short_flags_and_defaults() {
        let args = Args::try_parse_from(["gemini-voice", "-k", "abc", "--dummy-audio"]).unwrap();
        assert_eq!(args.api_key.as_deref(), Some("abc"));
        assert!(args.dummy_audio);
        assert!(!args.enable_search);
        assert_eq!(args.config, PathBuf::from("config.json"));
    }

    #[test]
    fn config_path_override() {
        let args =
            Args::try_parse_from(["gemini-voice", "-k", "abc", "-c", "/tmp/live.json"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/tmp/live.json"));
    }
}
