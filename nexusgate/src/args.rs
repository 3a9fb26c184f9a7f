use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// `NexusGate` LLM gateway
#[derive(Debug, Parser)]
#[command(name = "nexusgate", about = "Send one completion request through the gateway")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "nexusgate.toml", env = "NEXUSGATE_CONFIG")]
    pub config: PathBuf,

    /// Wire format of the request and of the printed reply
    #[arg(short, long, value_enum, default_value_t = Format::OpenaiChat)]
    pub format: Format,

    /// Pin the request to one provider, by id or name
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Request id attached to the completion record
    #[arg(long)]
    pub request_id: Option<String>,

    /// JSON request body, `-` for stdin
    #[arg(default_value = "-")]
    pub request: String,
}

/// Client wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    OpenaiChat,
    OpenaiResponses,
    Anthropic,
}

impl Format {
    /// Registry key of the format
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenaiChat => "openai-chat",
            Self::OpenaiResponses => "openai-responses",
            Self::Anthropic => "anthropic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["nexusgate"]).unwrap();
        assert_eq!(args.format, Format::OpenaiChat);
        assert_eq!(args.request, "-");
        assert!(args.provider.is_none());
    }

    #[test]
    fn format_names_match_registry_keys() {
        let args = Args::try_parse_from(["nexusgate", "--format", "openai-responses", "req.json"]).unwrap();
        assert_eq!(args.format.as_str(), "openai-responses");
        assert_eq!(args.request, "req.json");
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Args::try_parse_from(["nexusgate", "--format", "gemini"]).is_err());
    }
}
