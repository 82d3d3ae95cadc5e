//! Application state management

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{JwtIssuer, PasswordHasher};
use crate::config::{Config, Environment};
use crate::entities;
use crate::error::Result;
use crate::model::Database;
use crate::services::{LogMailer, Mailer, PaymentGateway, StripeGateway};
use crate::store::{DocumentStore, MemoryStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    db: Arc<Database>,
    jwt: JwtIssuer,
    hasher: PasswordHasher,
    mailer: Arc<dyn Mailer>,
    payments: Option<Arc<dyn PaymentGateway>>,
}

impl AppState {
    /// Start building state
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Entity registry
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Session token issuer
    pub fn jwt(&self) -> &JwtIssuer {
        &self.jwt
    }

    /// Password hasher
    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Email delivery
    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    /// Payment provider, when configured
    pub fn payments(&self) -> Option<&dyn PaymentGateway> {
        self.payments.as_deref()
    }
}

impl FromRef<AppState> for Environment {
    fn from_ref(state: &AppState) -> Self {
        state.config.service.environment
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.config.service.name)
            .field("db", &self.db)
            .field("payments", &self.payments.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`AppState`]
///
/// Missing collaborators fall back to defaults: the default config, an
/// in-memory store, a logging mailer, and a Stripe gateway when
/// `payments` is configured.
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn DocumentStore>>,
    mailer: Option<Arc<dyn Mailer>>,
    payments: Option<Arc<dyn PaymentGateway>>,
}

impl AppStateBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document store
    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the mailer
    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Set the payment gateway
    pub fn payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(payments);
        self
    }

    /// Build the state, registering entities over the store
    pub async fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();
        let hasher = PasswordHasher::new(&config.password)?;
        let jwt = JwtIssuer::new(&config.jwt)?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>);
        let db = entities::open(store, hasher.clone()).await?;

        let payments = match (self.payments, &config.payments) {
            (Some(gateway), _) => Some(gateway),
            (None, Some(payments)) => {
                Some(Arc::new(StripeGateway::new(payments)?) as Arc<dyn PaymentGateway>)
            }
            (None, None) => None,
        };
        if payments.is_none() {
            tracing::warn!("Payments not configured; checkout sessions are unavailable");
        }

        Ok(AppState {
            config: Arc::new(config),
            db: Arc::new(db),
            jwt,
            hasher,
            mailer: self.mailer.unwrap_or_else(|| Arc::new(LogMailer)),
            payments,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::PasswordConfig;

    /// Default config with cheap password hashing
    pub(crate) fn config() -> Config {
        Config {
            password: PasswordConfig {
                memory_cost_kib: 1024,
                time_cost: 1,
                ..PasswordConfig::default()
            },
            ..Config::default()
        }
    }

    pub(crate) async fn state() -> AppState {
        AppState::builder().config(config()).build().await.unwrap()
    }

    pub(crate) async fn state_with(
        mailer: Arc<dyn Mailer>,
        payments: Option<Arc<dyn PaymentGateway>>,
    ) -> AppState {
        let mut builder = AppState::builder().config(config()).mailer(mailer);
        if let Some(payments) = payments {
            builder = builder.payments(payments);
        }
        builder.build().await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_defaults() {
        let state = AppState::builder().build().await.unwrap();
        assert_eq!(state.config().service.port, 3000);
        assert!(state.payments().is_none());
        assert!(state.db().model(entities::TOUR).is_ok());
        assert_eq!(Environment::from_ref(&state), Environment::Development);
    }

    #[tokio::test]
    async fn test_payments_from_config() {
        let mut config = Config::default();
        config.payments = Some(Default::default());
        let state = AppState::builder().config(config).build().await.unwrap();
        assert!(state.payments().is_some());
    }
}
