//! Credential supply for API requests.
//!
//! The player core never reads tokens from ambient storage; whoever
//! constructs the client decides where credentials come from and passes a
//! [`TokenProvider`] in explicitly. This keeps the core testable without an
//! environment.

use std::sync::RwLock;

/// Trait for supplying the bearer credential attached to API requests.
///
/// This trait allows swapping implementations (config-backed vs fixed).
pub trait TokenProvider: Send + Sync {
    /// Return the current bearer token, if one is available.
    ///
    /// Synchronous by contract: requests must be able to decide
    /// authentication eligibility without suspending.
    fn token(&self) -> Option<String>;
}

/// Token provider backed by a fixed string.
///
/// Used for `--token` CLI overrides and in tests.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    /// Create a provider that always returns the given token.
    pub fn new(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }

    /// Create a provider that has no credential.
    pub fn absent() -> Self {
        Self { token: None }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Token provider that can be updated after construction.
///
/// The interactive flow prompts for a token on `AuthRequired` and stores it
/// here so subsequent requests pick it up without rebuilding the client.
#[derive(Debug, Default)]
pub struct SharedTokenProvider {
    token: RwLock<Option<String>>,
}

impl SharedTokenProvider {
    /// Create a provider seeded with an optional initial token.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replace the stored token.
    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }
}

impl TokenProvider for SharedTokenProvider {
    fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }
}
