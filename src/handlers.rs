use crate::{
    AppState,
    auth::{AuthUser, SESSION_COOKIE, UNKNOWN_USER_HASH, issue_token, verify_password},
    config::Env,
    error::ApiError,
    models::{
        LoginRequest, LoginResponse, SessionIdentity, SettingsByCategory, SystemSetting,
        UpdateSettingRequest, UserProfile,
    },
    settings::default_settings,
};
use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use time::Duration as TimeDuration;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

// --- Auth ---

/// login
///
/// [Public Route] Exchanges email and password for a session token.
///
/// The token is returned in the body and set as the `session` cookie, which the access
/// guard reads on every later request. Unknown email, wrong password and a non-admin
/// account all produce the same 401 so the response does not reveal which check failed.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let Some(user) = state.repo.find_user_by_email(payload.email.trim()).await? else {
        // Same argon2 cost as a wrong password, so timing does not reveal unknown emails.
        verify_password(UNKNOWN_USER_HASH, &payload.password);
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };

    if !verify_password(&user.password_hash, &payload.password) {
        tracing::info!(user_id = %user.id, "login rejected: wrong password");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }
    if !user.role.is_elevated() {
        tracing::info!(user_id = %user.id, role = %user.role, "login rejected: role");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let token = issue_token(&user.id, Utc::now());
    let max_age = TimeDuration::seconds(
        i64::try_from(state.config.session_ttl.as_secs()).unwrap_or(i64::MAX),
    );
    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(state.config.env == Env::Production)
        .same_site(SameSite::Lax)
        .max_age(max_age);

    tracing::info!(user_id = %user.id, "login succeeded");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            session_token: token,
            user: UserProfile::from(user),
        }),
    ))
}

/// logout
///
/// [Public Route] Expires the `session` cookie. The token itself stays decodable until
/// its window passes; there is no server-side session to revoke.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    let expired = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(TimeDuration::ZERO);
    (jar.add(expired), StatusCode::NO_CONTENT)
}

/// get_me
///
/// [Guarded Route] Echoes the identity the access guard attached to this request.
#[utoipa::path(
    get,
    path = "/api/me",
    responses((status = 200, description = "Current identity", body = SessionIdentity))
)]
pub async fn get_me(AuthUser { id, role }: AuthUser) -> Json<SessionIdentity> {
    Json(SessionIdentity { id, role })
}

// --- Settings ---

/// get_settings
///
/// [Guarded Route] Lists every setting grouped by category.
#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "Settings by category"))
)]
pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<SettingsByCategory>, ApiError> {
    Ok(Json(state.repo.get_settings().await?))
}

/// update_setting
///
/// [Guarded Route] Replaces the value of one existing setting.
///
/// *Validation*: the new value must match the setting's declared type; unknown keys are
/// 404 since the catalog is fixed.
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = UpdateSettingRequest,
    responses(
        (status = 200, description = "Updated", body = SystemSetting),
        (status = 400, description = "Value does not match the setting type"),
        (status = 404, description = "Unknown setting")
    )
)]
pub async fn update_setting(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateSettingRequest>,
) -> Result<Json<SystemSetting>, ApiError> {
    let current = state
        .repo
        .find_setting(&payload.key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown setting {}", payload.key)))?;

    if !current.setting_type.accepts(&payload.value) {
        return Err(ApiError::BadRequest(format!(
            "setting {} expects a {} value",
            payload.key,
            current.setting_type.as_str()
        )));
    }

    if !state.repo.put_setting(&payload.key, payload.value).await? {
        return Err(ApiError::NotFound(format!("unknown setting {}", payload.key)));
    }

    tracing::info!(user_id = %user.id, key = %payload.key, "setting updated");

    let updated = state
        .repo
        .find_setting(&payload.key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown setting {}", payload.key)))?;
    Ok(Json(updated))
}

/// reset_settings
///
/// [Guarded Route] Writes every factory value back and returns the resulting settings.
/// Keys missing from the store are skipped rather than created.
#[utoipa::path(
    post,
    path = "/api/settings/reset",
    responses((status = 200, description = "Settings after reset"))
)]
pub async fn reset_settings(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SettingsByCategory>, ApiError> {
    for entry in default_settings() {
        if !state.repo.put_setting(entry.key, entry.value).await? {
            tracing::warn!(key = entry.key, "reset skipped a setting missing from the store");
        }
    }

    tracing::info!(user_id = %user.id, "settings reset to defaults");

    Ok(Json(state.repo.get_settings().await?))
}
