//! Runtime configuration from flags and environment.

use crate::models::EngineMode;
use clap::Parser;

pub const DEFAULT_PORT: u16 = 3100;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Economy control-loop engine.
///
/// Flags override environment variables; environment variables override the
/// built-in defaults.
#[derive(Debug, Clone, Parser)]
#[command(name = "agente", about = "Economy control-loop engine")]
pub struct Config {
    /// Port the HTTP/WebSocket server binds.
    #[arg(long, env = "AGENTE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface the server binds.
    #[arg(long, env = "AGENTE_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Engine mode: autonomous applies adjustments, advisor only plans.
    #[arg(long, env = "AGENTE_MODE", default_value = "autonomous")]
    pub mode: EngineMode,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// clap needs a string parser for the mode flag; FromStr lives on the model.
impl clap::builder::ValueParserFactory for EngineMode {
    type Parser = clap::builder::ValueParser;

    fn value_parser() -> Self::Parser {
        clap::builder::ValueParser::new(|s: &str| s.parse::<EngineMode>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::parse_from(["agente"]);
        assert_eq!(config.port, 3100);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.mode, EngineMode::Autonomous);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_from(["agente", "--port", "9000", "--mode", "advisor"]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.mode, EngineMode::Advisor);
    }
}
