use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Rejected before any mutation; the caller can correct the input
    /// and retry.
    #[error("validation: {0}")]
    Validation(String),

    /// Expected outcome of a lookup, not an infrastructure failure.
    #[error("not found: {0}")]
    NotFound(String),

    /// Undecodable staged value. Fatal for the current import run: the
    /// staging store no longer round-trips what the merge engine wrote.
    #[error("staging corruption at {namespace}/{key}: {reason}")]
    Corruption {
        namespace: &'static str,
        key: String,
        reason: String,
    },

    /// Database-level failure (pool exhaustion, connection loss, query
    /// error). Carries the operation and target so the orchestrating
    /// layer can decide whether to retry.
    #[error("database error during {operation} on {target}")]
    Connectivity {
        operation: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Maps the taxonomy onto HTTP status codes for the serving layer,
    /// so "not found" and "service unavailable" stay distinguishable.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Connectivity { .. } => 503,
            Self::Corruption { .. } | Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_per_variant() {
        assert_eq!(RegistryError::Validation("x".into()).http_status(), 400);
        assert_eq!(RegistryError::NotFound("x".into()).http_status(), 404);
        let conn = RegistryError::Connectivity {
            operation: "search",
            target: "public.cnpj".into(),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(conn.http_status(), 503);
        let corrupt = RegistryError::Corruption {
            namespace: "partners",
            key: "12345678".into(),
            reason: "bad json".into(),
        };
        assert_eq!(corrupt.http_status(), 500);
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(RegistryError::NotFound("cnpj 123".into()).is_not_found());
        assert!(!RegistryError::Validation("x".into()).is_not_found());
    }
}
