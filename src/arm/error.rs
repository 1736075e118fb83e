//! Typed failures the resolver needs to tell apart.
//!
//! Everything else travels as a plain `anyhow::Error`; these variants are
//! wrapped into it and recovered with `downcast_ref` where a stage has to
//! decide between aborting and degrading.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArmError {
    /// Backend answered with anything other than 200
    #[error("API request failed: {status} {code}: {message}")]
    Request {
        status: u16,
        code: String,
        message: String,
    },

    /// A 200 whose body is not JSON
    #[error("unsupported response content type '{content_type}' for {path}")]
    UnsupportedContentType { path: String, content_type: String },

    /// `update` was pointed at a collection instead of a single resource
    #[error("'{id}' resolves to {count} resources, update needs exactly one")]
    MultipleResources { id: String, count: usize },

    #[error("children by type are not supported for '{child_type}'")]
    UnsupportedChildType { child_type: String },

    #[error("ancestor cycle detected at '{id}'")]
    AncestorCycle { id: String },

    #[error("ancestor chain of '{id}' exceeds the maximum depth of {max_depth}")]
    AncestorDepthExceeded { id: String, max_depth: usize },
}

impl ArmError {
    /// HTTP status of a failed request, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            ArmError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Errors that must reach the caller even where a stage would otherwise
    /// degrade to an empty value.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArmError::MultipleResources { .. }
                | ArmError::UnsupportedChildType { .. }
                | ArmError::UnsupportedContentType { .. }
                | ArmError::AncestorCycle { .. }
                | ArmError::AncestorDepthExceeded { .. }
        )
    }
}

/// True when `error` wraps an [`ArmError`] that must not be swallowed
pub fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ArmError>()
        .map(ArmError::is_fatal)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_is_not_fatal() {
        let err = ArmError::Request {
            status: 403,
            code: "AuthorizationFailed".to_string(),
            message: "no access".to_string(),
        };
        assert_eq!(err.status(), Some(403));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("AuthorizationFailed"));
    }

    #[test]
    fn test_fatal_survives_anyhow_wrapping() {
        let err: anyhow::Error = ArmError::AncestorCycle {
            id: "/providers/Microsoft.Management/managementGroups/a".to_string(),
        }
        .into();
        let err = err.context("Failed to resolve parent");
        assert!(is_fatal(&err));
    }
}
