use serde::{Deserialize, Serialize};

pub const PIPELINING_ENV: &str = "AOS_COMMS_PIPELINING";

/// How promises and resolvers are named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeliningScheme {
    /// `your-question`/`your-answer`, with a kernel relay pair per promise.
    #[default]
    Chained,
    /// `your-promise`/`your-resolver` without relay pairs. Deprecated; kept
    /// for peers that predate question/answer chaining.
    Simplified,
}

impl PipeliningScheme {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chained" | "question-answer" => Some(PipeliningScheme::Chained),
            "simplified" | "promise-resolver" => Some(PipeliningScheme::Simplified),
            _ => None,
        }
    }

    pub fn creates_relays(self) -> bool {
        self == PipeliningScheme::Chained
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommsConfig {
    pub pipelining: PipeliningScheme,
    /// Run the `connect` verifying-key hook. The hook is a stub that accepts
    /// every key.
    pub verify_connect: bool,
    /// Accept messages in the legacy `{index, methodName, ...}` format.
    pub legacy_send_in: bool,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            pipelining: PipeliningScheme::Chained,
            verify_connect: true,
            legacy_send_in: true,
        }
    }
}

impl CommsConfig {
    /// Defaults, with the pipelining scheme overridable through the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(PIPELINING_ENV) {
            match PipeliningScheme::parse(&value) {
                Some(scheme) => config.pipelining = scheme,
                None => log::warn!("ignoring unknown {PIPELINING_ENV} value '{value}'"),
            }
        }
        config
    }
}
