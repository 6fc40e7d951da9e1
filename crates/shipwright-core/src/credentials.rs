//! Publish credentials.
//!
//! A single username/token pair is injected at run start, exported only
//! into the publish job's environment, and dropped when the run ends.

use std::fmt;

/// Opaque credential token. The value never appears in Debug output.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Username/token pair for the destination package index.
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    token: Token,
}

impl RegistryCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: Token::new(token),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Environment variables exported to credential-scoped steps.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            ("PUBLISH_USERNAME".to_string(), self.username.clone()),
            ("PUBLISH_TOKEN".to_string(), self.token.expose().to_string()),
        ]
    }
}
