//! Error classification
//!
//! Maps a raw error message plus optional structured context to a
//! `(category, severity, retryable)` triple. The function is pure so the
//! resilience layer and tests can call it without any setup.

use serde::{Deserialize, Serialize};

/// Error taxonomy used across the sync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    Authentication,
    ApiResponse,
    Database,
    DataValidation,
    Timeout,
    RateLimit,
}

impl ErrorCategory {
    /// Canonical string representation, matching the error_log table values.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Authentication => "AUTHENTICATION",
            ErrorCategory::ApiResponse => "API_RESPONSE",
            ErrorCategory::Database => "DATABASE",
            ErrorCategory::DataValidation => "DATA_VALIDATION",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::RateLimit => "RATE_LIMIT",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity levels attached to classified errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured context accompanying a failure.
///
/// Each variant carries the fields relevant to its source so context-based
/// overrides in [`classify`] are exhaustively checked at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorContext {
    Network {
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Auth {
        #[serde(skip_serializing_if = "Option::is_none")]
        scheme: Option<String>,
    },
    Api {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_type: Option<String>,
    },
    Database {
        #[serde(skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },
}

/// Result of classifying one failure occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub retryable: bool,
}

const NETWORK_KEYWORDS: &[&str] = &[
    "timeout",
    "etimedout",
    "econnrefused",
    "econnreset",
    "enotfound",
    "socket hang up",
    "network",
    "dns",
    "connection refused",
    "connection reset",
];

const AUTH_KEYWORDS: &[&str] = &[
    "unauthorized",
    "401",
    "403",
    "forbidden",
    "invalid credentials",
    "authentication",
    "token expired",
    "access denied",
];

const API_KEYWORDS: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "bad gateway",
    "service unavailable",
    "internal server error",
    "malformed",
    "unexpected response",
];

const DATABASE_KEYWORDS: &[&str] = &[
    "database",
    "sql",
    "constraint",
    "duplicate key",
    "deadlock",
    "relation",
    "column",
    "postgres",
];

const VALIDATION_KEYWORDS: &[&str] = &[
    "validation",
    "invalid format",
    "missing required",
    "parse error",
    "invalid date",
    "out of range",
];

const TIMEOUT_KEYWORDS: &[&str] = &["deadline exceeded", "timed out", "took too long"];

const RATE_LIMIT_KEYWORDS: &[&str] = &["rate limit", "too many requests", "429", "quota exceeded"];

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}

/// Classify an error message with optional structured context.
///
/// Keyword matching runs case-insensitively in fixed priority order; a typed
/// context can override ambiguous matches (an HTTP status `>= 500` is always
/// retryable, a `4xx` never is, except `429` which is a retryable rate
/// limit). `AUTHENTICATION` is always high severity and non-retryable;
/// `DATA_VALIDATION` is never retried because the same input would fail
/// again.
pub fn classify(message: &str, context: Option<&ErrorContext>) -> Classification {
    let lower = message.to_lowercase();

    // Context outranks keywords for the unambiguous cases.
    if let Some(ctx) = context {
        match ctx {
            ErrorContext::Auth { .. } => {
                return Classification {
                    category: ErrorCategory::Authentication,
                    severity: Severity::High,
                    retryable: false,
                };
            }
            ErrorContext::Api {
                status: Some(status),
                ..
            } => {
                if *status == 429 {
                    return Classification {
                        category: ErrorCategory::RateLimit,
                        severity: Severity::Medium,
                        retryable: true,
                    };
                }
                if (401..=403).contains(status) {
                    return Classification {
                        category: ErrorCategory::Authentication,
                        severity: Severity::High,
                        retryable: false,
                    };
                }
                if *status >= 500 {
                    return Classification {
                        category: ErrorCategory::ApiResponse,
                        severity: Severity::High,
                        retryable: true,
                    };
                }
                if (400..500).contains(status) {
                    return Classification {
                        category: ErrorCategory::ApiResponse,
                        severity: Severity::Medium,
                        retryable: false,
                    };
                }
            }
            _ => {}
        }
    }

    let category = if contains_any(&lower, NETWORK_KEYWORDS) {
        ErrorCategory::Network
    } else if contains_any(&lower, AUTH_KEYWORDS) {
        ErrorCategory::Authentication
    } else if contains_any(&lower, API_KEYWORDS) {
        ErrorCategory::ApiResponse
    } else if contains_any(&lower, DATABASE_KEYWORDS) {
        ErrorCategory::Database
    } else if contains_any(&lower, VALIDATION_KEYWORDS) {
        ErrorCategory::DataValidation
    } else if contains_any(&lower, TIMEOUT_KEYWORDS) {
        ErrorCategory::Timeout
    } else if contains_any(&lower, RATE_LIMIT_KEYWORDS) {
        ErrorCategory::RateLimit
    } else {
        ErrorCategory::ApiResponse
    };

    let (severity, retryable) = match category {
        ErrorCategory::Network => (Severity::Medium, true),
        ErrorCategory::Authentication => (Severity::High, false),
        ErrorCategory::ApiResponse => {
            // A Database context under an API-looking message means the
            // failure happened while persisting; treat it as retryable.
            match context {
                Some(ErrorContext::Database { .. }) => (Severity::High, true),
                _ => (Severity::Medium, true),
            }
        }
        ErrorCategory::Database => (Severity::High, true),
        ErrorCategory::DataValidation => (Severity::Low, false),
        ErrorCategory::Timeout => (Severity::Medium, true),
        ErrorCategory::RateLimit => (Severity::Medium, true),
    };

    Classification {
        category,
        severity,
        retryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_messages_classify_as_network_retryable() {
        for msg in [
            "connect ETIMEDOUT 203.0.113.4:443",
            "request timeout after 30s",
            "Timeout while waiting for response",
        ] {
            let c = classify(msg, None);
            assert_eq!(c.category, ErrorCategory::Network, "message: {msg}");
            assert!(c.retryable, "message: {msg}");
        }
    }

    #[test]
    fn auth_messages_are_high_severity_and_final() {
        let c = classify("401 Unauthorized: invalid credentials", None);
        assert_eq!(c.category, ErrorCategory::Authentication);
        assert_eq!(c.severity, Severity::High);
        assert!(!c.retryable);
    }

    #[test]
    fn auth_context_overrides_ambiguous_message() {
        let ctx = ErrorContext::Auth {
            scheme: Some("bearer".to_string()),
        };
        let c = classify("request rejected", Some(&ctx));
        assert_eq!(c.category, ErrorCategory::Authentication);
        assert_eq!(c.severity, Severity::High);
        assert!(!c.retryable);
    }

    #[test]
    fn api_context_5xx_forces_retryable() {
        for status in [500u16, 502, 503, 504, 599] {
            let ctx = ErrorContext::Api {
                status: Some(status),
                request_type: Some("GetBeachTournamentList".to_string()),
            };
            let c = classify("upstream failed", Some(&ctx));
            assert_eq!(c.category, ErrorCategory::ApiResponse);
            assert!(c.retryable, "status: {status}");
        }
    }

    #[test]
    fn api_context_4xx_is_not_retryable_except_429() {
        for status in [400u16, 404, 410, 422] {
            let ctx = ErrorContext::Api {
                status: Some(status),
                request_type: None,
            };
            let c = classify("upstream rejected request", Some(&ctx));
            assert!(!c.retryable, "status: {status}");
        }

        let ctx = ErrorContext::Api {
            status: Some(429),
            request_type: None,
        };
        let c = classify("upstream rejected request", Some(&ctx));
        assert_eq!(c.category, ErrorCategory::RateLimit);
        assert!(c.retryable);
    }

    #[test]
    fn validation_errors_are_low_severity_and_final() {
        let c = classify("validation failed: missing required field No", None);
        assert_eq!(c.category, ErrorCategory::DataValidation);
        assert!(c.severity <= Severity::Medium);
        assert!(!c.retryable);
    }

    #[test]
    fn database_errors_are_retryable_high_severity() {
        let c = classify("deadlock detected while updating tournaments", None);
        assert_eq!(c.category, ErrorCategory::Database);
        assert_eq!(c.severity, Severity::High);
        assert!(c.retryable);
    }

    #[test]
    fn rate_limit_keywords_match() {
        let c = classify("Too many requests, slow down", None);
        assert_eq!(c.category, ErrorCategory::RateLimit);
        assert!(c.retryable);
    }

    #[test]
    fn unknown_message_defaults_to_api_response() {
        let c = classify("something odd happened", None);
        assert_eq!(c.category, ErrorCategory::ApiResponse);
        assert!(c.retryable);
    }

    #[test]
    fn network_outranks_api_keywords() {
        // "503" and "connection reset" both present; NETWORK wins by priority.
        let c = classify("connection reset by peer while reading 503 body", None);
        assert_eq!(c.category, ErrorCategory::Network);
    }

    #[test]
    fn classification_is_deterministic() {
        let a = classify("ECONNRESET", None);
        let b = classify("ECONNRESET", None);
        assert_eq!(a, b);
    }

    #[test]
    fn context_round_trips_through_json() {
        let ctx = ErrorContext::Api {
            status: Some(503),
            request_type: Some("GetBeachMatchList".to_string()),
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["kind"], "api");
        let back: ErrorContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
    }
}
