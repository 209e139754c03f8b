//! Connection-string resolution.
//!
//! Servers name an environment variable instead of carrying a secret. The
//! variable is read on every call so rotated credentials apply to the next
//! run without a restart.

use std::env::{self, VarError};

use dataspy_core::{ErrorKind, Server};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("server {server} has no connection string variable configured")]
    NoVariable { server: String },

    #[error("environment variable {var} is not set")]
    Unset { var: String },

    #[error("environment variable {var} is empty")]
    Empty { var: String },

    #[error("environment variable {var} is not valid unicode")]
    NotUnicode { var: String },
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Read the connection string for `server` from its environment variable.
pub fn resolve_connection_string(server: &Server) -> Result<String, ResolveError> {
    let var = server.conn_string_var.trim();
    if var.is_empty() {
        return Err(ResolveError::NoVariable {
            server: server.name.clone(),
        });
    }

    match env::var(var) {
        Ok(value) if value.trim().is_empty() => Err(ResolveError::Empty {
            var: var.to_string(),
        }),
        Ok(value) => Ok(value),
        Err(VarError::NotPresent) => Err(ResolveError::Unset {
            var: var.to_string(),
        }),
        Err(VarError::NotUnicode(_)) => Err(ResolveError::NotUnicode {
            var: var.to_string(),
        }),
    }
}
