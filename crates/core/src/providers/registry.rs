use super::frankfurter::FrankfurterProvider;
use super::traits::{FxRateProvider, QuoteProvider};
use super::yahoo::YahooProvider;

/// Registry of quote and FX providers.
///
/// Providers are tried in registration order: the first registered is the
/// primary, later ones are fallbacks. New providers can be added without
/// touching the services that consume the registry.
pub struct ProviderRegistry {
    quote_providers: Vec<Box<dyn QuoteProvider>>,
    fx_providers: Vec<Box<dyn FxRateProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            quote_providers: Vec::new(),
            fx_providers: Vec::new(),
        }
    }

    /// Create a registry with the default providers pre-configured:
    /// Yahoo Finance for quotes, Frankfurter for FX rates.
    #[must_use]
    pub fn new_with_defaults(timeout_secs: u64) -> Self {
        let mut registry = Self::new();
        registry.register_quote(Box::new(YahooProvider::new(timeout_secs)));
        registry.register_fx(Box::new(FrankfurterProvider::new(timeout_secs)));
        registry
    }

    pub fn register_quote(&mut self, provider: Box<dyn QuoteProvider>) {
        self.quote_providers.push(provider);
    }

    pub fn register_fx(&mut self, provider: Box<dyn FxRateProvider>) {
        self.fx_providers.push(provider);
    }

    /// Quote providers in fallback order.
    #[must_use]
    pub fn quote_providers(&self) -> Vec<&dyn QuoteProvider> {
        self.quote_providers.iter().map(|p| p.as_ref()).collect()
    }

    /// FX providers in fallback order.
    #[must_use]
    pub fn fx_providers(&self) -> Vec<&dyn FxRateProvider> {
        self.fx_providers.iter().map(|p| p.as_ref()).collect()
    }

    #[must_use]
    pub fn has_quote_provider(&self) -> bool {
        !self.quote_providers.is_empty()
    }

    #[must_use]
    pub fn has_fx_provider(&self) -> bool {
        !self.fx_providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
