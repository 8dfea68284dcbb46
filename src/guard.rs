//! Access guard for the admin dashboard and its API.
//!
//! Every request passes through [`access_guard`] before any handler runs. The decision is
//! computed fresh per request from the session token and a user-store lookup; nothing is
//! cached, so a store outage denies every protected request instead of failing open.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::{
    auth::{SessionToken, USER_ID_HEADER, USER_ROLE_HEADER, extract_token},
    config::GuardConfig,
    models::Role,
    repository::RepositoryState,
};

/// PathClass
///
/// Derived from the request path alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Public,
    /// Under the admin dashboard prefix.
    Admin,
    /// Any other non-public path, including the API.
    Protected,
}

/// Identity attached to an authorized API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

/// Denial
///
/// Why a request was refused. Every kind produces the same redirect so a client cannot
/// tell which check failed; the kind is only visible in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("no session token presented")]
    MissingToken,
    #[error("session token could not be decoded")]
    MalformedToken,
    #[error("session token expired")]
    ExpiredToken,
    #[error("session token issued in the future")]
    FutureToken,
    #[error("session user not found")]
    UnknownUser,
    #[error("session user lacks an admin role")]
    InsufficientRole,
    #[error("user store unavailable")]
    StoreUnavailable,
}

/// Decision
///
/// Outcome of [`AccessGuard::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request unchanged.
    Allow,
    /// Forward the request with identity headers added.
    AllowEnriched(Identity),
    /// Redirect to the login location.
    Deny(Denial),
}

/// AccessGuard
///
/// Holds only immutable configuration and a handle to the user store, so clones are cheap
/// and any number of requests can be evaluated concurrently.
#[derive(Clone)]
pub struct AccessGuard {
    config: Arc<GuardConfig>,
    users: RepositoryState,
}

impl AccessGuard {
    pub fn new(config: GuardConfig, users: RepositoryState) -> Self {
        Self {
            config: Arc::new(config),
            users,
        }
    }

    /// classify
    ///
    /// Public if any allow-list rule matches; the rules form a union so their order does
    /// not matter.
    pub fn classify(&self, path: &str) -> PathClass {
        if self.config.public_paths.iter().any(|rule| rule.matches(path)) {
            PathClass::Public
        } else if path.starts_with(self.config.admin_prefix.as_str()) {
            PathClass::Admin
        } else {
            PathClass::Protected
        }
    }

    /// decide
    ///
    /// Runs the per-request state machine: classify, then token, then decode, then expiry,
    /// then user lookup and role. The first failing step short-circuits to a denial.
    /// `now` is a parameter so the expiry boundary can be tested exactly.
    pub async fn decide(&self, path: &str, token: Option<&str>, now: DateTime<Utc>) -> Decision {
        // 1. Classification
        if self.classify(path) == PathClass::Public {
            return Decision::Allow;
        }

        // 2. Token presence
        let Some(raw) = token else {
            return Decision::Deny(Denial::MissingToken);
        };

        // 3. Decode
        let session = match SessionToken::decode(raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!(error = %e, "session token decode failed");
                return Decision::Deny(Denial::MalformedToken);
            }
        };

        // 4. Expiry. An age equal to the window is still accepted.
        let age = session.age_ms(now);
        if age > duration_ms(self.config.expiry_window) {
            return Decision::Deny(Denial::ExpiredToken);
        }
        if age < -duration_ms(self.config.max_clock_skew) {
            return Decision::Deny(Denial::FutureToken);
        }

        // 5. User lookup, bounded so a slow store cannot stall the request.
        let lookup = tokio::time::timeout(
            self.config.lookup_timeout,
            self.users.find_user_by_id(&session.user_id),
        )
        .await;

        let user = match lookup {
            Ok(Ok(Some(user))) => user,
            Ok(Ok(None)) => return Decision::Deny(Denial::UnknownUser),
            Ok(Err(e)) => {
                tracing::error!(error = %e, user_id = %session.user_id, "user lookup failed");
                return Decision::Deny(Denial::StoreUnavailable);
            }
            Err(_) => {
                tracing::error!(
                    user_id = %session.user_id,
                    timeout_ms = duration_ms(self.config.lookup_timeout),
                    "user lookup timed out"
                );
                return Decision::Deny(Denial::StoreUnavailable);
            }
        };

        // 6. Role
        if !user.role.is_elevated() {
            return Decision::Deny(Denial::InsufficientRole);
        }

        // 7. Enrichment for API paths only
        if path.starts_with(self.config.api_prefix.as_str()) {
            Decision::AllowEnriched(Identity {
                user_id: user.id,
                role: user.role,
            })
        } else {
            Decision::Allow
        }
    }

    /// deny_response
    ///
    /// `302 Found` to the login location with an empty body.
    pub fn deny_response(&self) -> Response {
        (
            StatusCode::FOUND,
            [(header::LOCATION, self.config.login_redirect.clone())],
        )
            .into_response()
    }
}

fn duration_ms(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// access_guard
///
/// The middleware wrapping the whole router.
///
/// *Mechanism*: client-supplied identity headers are removed first, so only the guard can
/// set them. The token is read from the `session` cookie or the bearer header, the decision
/// is computed, and the request is either forwarded (possibly enriched) or answered with
/// the login redirect before any handler executes.
pub async fn access_guard(
    State(guard): State<AccessGuard>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers_mut();
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_ROLE_HEADER);

    let path = request.uri().path().to_string();
    let token = extract_token(&jar, request.headers());

    match guard.decide(&path, token.as_deref(), Utc::now()).await {
        Decision::Allow => next.run(request).await,
        Decision::AllowEnriched(identity) => {
            // Raw bytes so UTF-8 ids travel as obs-text; only control characters fail here.
            let Ok(user_id) = HeaderValue::from_bytes(identity.user_id.as_bytes()) else {
                tracing::warn!(path = %path, "user id is not a valid header value");
                return guard.deny_response();
            };
            let headers = request.headers_mut();
            headers.insert(HeaderName::from_static(USER_ID_HEADER), user_id);
            headers.insert(
                HeaderName::from_static(USER_ROLE_HEADER),
                HeaderValue::from_static(identity.role.as_str()),
            );
            tracing::debug!(path = %path, user_id = %identity.user_id, "request authorized");
            next.run(request).await
        }
        Decision::Deny(denial) => {
            tracing::warn!(
                path = %path,
                class = ?guard.classify(&path),
                reason = ?denial,
                "access denied: {}",
                denial
            );
            guard.deny_response()
        }
    }
}
