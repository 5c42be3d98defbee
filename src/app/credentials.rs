use std::fmt;

use crate::utils::ChatError;

/// Opaque bearer credential for the assistant service
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Result<Self, ChatError> {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            return Err(ChatError::Config("access credential is empty".into()));
        }
        Ok(Self(token.to_string()))
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Source of the access credential.
///
/// Called per request, so resolvers that rotate tokens take effect without
/// rebuilding the transport.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self) -> Result<Credential, ChatError>;
}

/// Reads the credential from an environment variable
#[derive(Debug, Clone)]
pub struct EnvCredentialResolver {
    var: String,
}

impl EnvCredentialResolver {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self) -> Result<Credential, ChatError> {
        let token = std::env::var(&self.var)
            .map_err(|_| ChatError::Config(format!("{} is not set", self.var)))?;
        Credential::new(token)
            .map_err(|_| ChatError::Config(format!("{} is set but empty", self.var)))
    }
}

/// A credential fixed at construction time
#[derive(Debug, Clone)]
pub struct StaticCredentialResolver(Credential);

impl StaticCredentialResolver {
    pub fn new(credential: Credential) -> Self {
        Self(credential)
    }
}

impl CredentialResolver for StaticCredentialResolver {
    fn resolve(&self) -> Result<Credential, ChatError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_credential_rejected() {
        assert!(matches!(Credential::new("   "), Err(ChatError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("sk-secret").unwrap();
        assert!(!format!("{:?}", credential).contains("sk-secret"));
        assert_eq!(credential.bearer(), "Bearer sk-secret");
    }

    #[test]
    fn test_missing_env_var_is_config_error() {
        let resolver = EnvCredentialResolver::new("THREADLINE_TEST_UNSET_CREDENTIAL_VAR");
        match resolver.resolve() {
            Err(ChatError::Config(msg)) => assert!(msg.contains("not set")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }
}
