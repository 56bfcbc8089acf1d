use std::env;
use std::fmt::{self, Display};

use tutor_relay_core::SessionBuilder;
use tutor_relay_http::{
    AnthropicConfig, AnthropicConfigBuilder, AnthropicProvider, RelayConfig,
    RelayConfigBuilder, RelayProvider,
};

/// The chat provider selected by the environment.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderSettings {
    /// Talk to the course relay endpoint.
    Relay(RelayConfig),
    /// Talk to the Anthropic Messages API directly.
    Anthropic(AnthropicConfig),
}

impl ProviderSettings {
    /// Reads the settings from environment variables.
    ///
    /// `TUTOR_RELAY_ENDPOINT` selects the relay. Otherwise
    /// `ANTHROPIC_API_KEY` selects Anthropic, optionally customized by
    /// `ANTHROPIC_MODEL` and `ANTHROPIC_BASE_URL`.
    #[inline]
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the settings through `lookup`. Empty values count as unset.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(endpoint) = var("TUTOR_RELAY_ENDPOINT") {
            debug!("using relay at {endpoint}");
            let config = RelayConfigBuilder::with_endpoint(endpoint).build();
            return Ok(Self::Relay(config));
        }

        let Some(api_key) = var("ANTHROPIC_API_KEY") else {
            return Err(SettingsError);
        };
        let mut builder = AnthropicConfigBuilder::with_api_key(api_key);
        if let Some(model) = var("ANTHROPIC_MODEL") {
            builder = builder.with_model(model);
        }
        if let Some(base_url) = var("ANTHROPIC_BASE_URL") {
            builder = builder.with_base_url(base_url);
        }
        let config = builder.build();
        debug!("using anthropic: {config:?}");
        Ok(Self::Anthropic(config))
    }

    /// Creates a session builder backed by the selected provider.
    pub fn session_builder(
        self,
    ) -> Result<SessionBuilder, tutor_relay_http::Error> {
        Ok(match self {
            Self::Relay(config) => {
                SessionBuilder::with_provider(RelayProvider::new(config)?)
            }
            Self::Anthropic(config) => {
                SessionBuilder::with_provider(AnthropicProvider::new(config)?)
            }
        })
    }
}

/// No chat provider is configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettingsError;

impl Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no chat provider configured, set TUTOR_RELAY_ENDPOINT or \
             ANTHROPIC_API_KEY"
        )
    }
}

impl std::error::Error for SettingsError {}
