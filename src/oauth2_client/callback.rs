// ABOUTME: Validation of the identity server's redirect back to the client
// ABOUTME: Classifies callbacks as valid, duplicate, or one of the flow error variants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use crate::errors::OAuthFlowError;
use crate::logging::redact;
use crate::models::{PendingFlow, ProcessedFlow, TokenSet};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{error, info};

/// Query parameters of the callback request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code (success)
    pub code: Option<String>,
    /// Echoed state
    pub state: Option<String>,
    /// Error code (failure)
    pub error: Option<String>,
    /// Human-readable error detail
    pub error_description: Option<String>,
}

/// A callback that passed validation and may be exchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCallback {
    /// Authorization code
    pub code: String,
    /// State of the matching pending flow
    pub state: String,
    /// Verifier to send with the code, present iff PKCE is enabled
    pub code_verifier: Option<String>,
}

/// Outcome of [`validate_callback`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Fresh callback for the pending flow
    Valid(ValidatedCallback),
    /// Replay of a callback that already completed; carries its tokens
    Duplicate(TokenSet),
}

/// Validate a callback against the session's pending flow and processed cache
///
/// `processed` must be the non-expired record for the query's state, if any.
/// Checks run in a fixed order and the first failure wins:
///
/// 1. `error` present
/// 2. `code` missing or empty
/// 3. a processed record exists (duplicate, answered from cache)
/// 4. no pending flow at all
/// 5. state mismatch
/// 6. verifier presence disagrees with `use_pkce`
///
/// # Errors
///
/// Returns the [`OAuthFlowError`] for the first failed check
pub fn validate_callback(
    query: &CallbackQuery,
    pending: Option<&PendingFlow>,
    processed: Option<&ProcessedFlow>,
    use_pkce: bool,
) -> Result<CallbackOutcome, OAuthFlowError> {
    if let Some(error) = query.error.as_deref() {
        return Err(OAuthFlowError::AuthorizationDenied {
            error: error.to_owned(),
            description: query.error_description.clone(),
        });
    }

    let code = match query.code.as_deref() {
        Some(code) if !code.is_empty() => code,
        _ => return Err(OAuthFlowError::MissingCode),
    };

    let state = query.state.as_deref().filter(|s| !s.is_empty());

    if let (Some(state), Some(record)) = (state, processed) {
        if states_match(&record.state, state) {
            info!(state = %redact(state), "Duplicate callback answered from processed-flow cache");
            return Ok(CallbackOutcome::Duplicate(record.result.clone()));
        }
    }

    let Some(pending) = pending else {
        return Err(if let Some(state) = state {
            info!(
                state = %redact(state),
                "Callback without pending flow, likely a duplicate request"
            );
            OAuthFlowError::LikelyDuplicateCallback
        } else {
            error!("Callback without state and without pending flow");
            OAuthFlowError::StateMismatch
        });
    };

    let Some(state) = state.filter(|s| states_match(&pending.state, s)) else {
        let received = state.map(redact).unwrap_or_default();
        error!(
            expected = %redact(&pending.state),
            received = %received,
            "OAuth state mismatch"
        );
        return Err(OAuthFlowError::StateMismatch);
    };

    match (use_pkce, &pending.code_verifier) {
        (true, None) => {
            error!(state = %redact(state), "PKCE enabled but no code verifier stored");
            Err(OAuthFlowError::MissingCodeVerifier)
        }
        (false, Some(_)) => {
            error!(
                state = %redact(state),
                "Code verifier stored but PKCE is disabled"
            );
            Err(OAuthFlowError::StateMismatch)
        }
        (_, verifier) => Ok(CallbackOutcome::Valid(ValidatedCallback {
            code: code.to_owned(),
            state: state.to_owned(),
            code_verifier: verifier.clone(),
        })),
    }
}

fn states_match(expected: &str, received: &str) -> bool {
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pending(state: &str, verifier: Option<&str>) -> PendingFlow {
        PendingFlow {
            state: state.to_owned(),
            code_verifier: verifier.map(str::to_owned),
            created_at: Utc::now(),
        }
    }

    fn processed(state: &str) -> ProcessedFlow {
        ProcessedFlow {
            state: state.to_owned(),
            result: TokenSet::from_response("cached".into(), None, None, None, Utc::now()),
            processed_at: Utc::now(),
        }
    }

    fn query(code: Option<&str>, state: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            code: code.map(str::to_owned),
            state: state.map(str::to_owned),
            ..CallbackQuery::default()
        }
    }

    #[test]
    fn test_error_wins_over_everything() {
        let q = CallbackQuery {
            error: Some("access_denied".into()),
            error_description: Some("user said no".into()),
            ..query(Some("code"), Some("s"))
        };
        let err = validate_callback(&q, Some(&pending("s", Some("v"))), None, true).unwrap_err();
        assert!(matches!(
            err,
            OAuthFlowError::AuthorizationDenied { ref error, .. } if error == "access_denied"
        ));
    }

    #[test]
    fn test_missing_or_empty_code() {
        let p = pending("s", Some("v"));
        assert!(matches!(
            validate_callback(&query(None, Some("s")), Some(&p), None, true),
            Err(OAuthFlowError::MissingCode)
        ));
        assert!(matches!(
            validate_callback(&query(Some(""), Some("s")), Some(&p), None, true),
            Err(OAuthFlowError::MissingCode)
        ));
    }

    #[test]
    fn test_processed_record_short_circuits() {
        let record = processed("s");
        let outcome = validate_callback(&query(Some("code"), Some("s")), None, Some(&record), true)
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Duplicate(record.result));
    }

    #[test]
    fn test_no_pending_flow() {
        assert!(matches!(
            validate_callback(&query(Some("code"), Some("s")), None, None, true),
            Err(OAuthFlowError::LikelyDuplicateCallback)
        ));
        assert!(matches!(
            validate_callback(&query(Some("code"), None), None, None, true),
            Err(OAuthFlowError::StateMismatch)
        ));
    }

    #[test]
    fn test_state_mismatch() {
        let p = pending("expected", Some("v"));
        assert!(matches!(
            validate_callback(&query(Some("code"), Some("other")), Some(&p), None, true),
            Err(OAuthFlowError::StateMismatch)
        ));
        assert!(matches!(
            validate_callback(&query(Some("code"), None), Some(&p), None, true),
            Err(OAuthFlowError::StateMismatch)
        ));
    }

    #[test]
    fn test_pkce_flag_is_authoritative() {
        let without_verifier = pending("s", None);
        assert!(matches!(
            validate_callback(&query(Some("code"), Some("s")), Some(&without_verifier), None, true),
            Err(OAuthFlowError::MissingCodeVerifier)
        ));

        let with_verifier = pending("s", Some("v"));
        assert!(matches!(
            validate_callback(&query(Some("code"), Some("s")), Some(&with_verifier), None, false),
            Err(OAuthFlowError::StateMismatch)
        ));
    }

    #[test]
    fn test_valid_callbacks() {
        let outcome = validate_callback(
            &query(Some("code"), Some("s")),
            Some(&pending("s", Some("v"))),
            None,
            true,
        )
        .unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Valid(ValidatedCallback {
                code: "code".into(),
                state: "s".into(),
                code_verifier: Some("v".into()),
            })
        );

        let traditional = validate_callback(
            &query(Some("code"), Some("s")),
            Some(&pending("s", None)),
            None,
            false,
        )
        .unwrap();
        assert!(matches!(
            traditional,
            CallbackOutcome::Valid(ValidatedCallback { code_verifier: None, .. })
        ));
    }
}
