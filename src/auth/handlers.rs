use actix_web::{web, HttpResponse, HttpRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::AppState;
use crate::auth::gate::{removal_cookie, session_cookie, ApiSession, SESSION_COOKIE};
use crate::error::AppError;
use tracing::{info, error};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub subject: String,
    pub expires_at: DateTime<Utc>,
    pub refreshed: bool,
}

fn existing_token(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE).map(|c| c.value().to_owned())
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request");

    let user = match state.auth_service.register(
        &req.email,
        &req.password,
        req.display_name.as_deref(),
    ).await {
        Ok(user) => user,
        Err(e) => {
            error!("Registration failed: {}", e);
            return Err(e);
        }
    };

    let issued = state.tokens.issue(&user.email)?;
    let cookie = session_cookie(&issued, state.config.auth.cookie_secure)?;

    Ok(HttpResponse::Created().cookie(cookie).json(AuthResponse {
        email: user.email,
        expires_at: issued.expires_at,
    }))
}

/// Verifies the password, then keeps the browser's current token when it
/// already belongs to this user and is not about to expire.
pub async fn login(
    http: HttpRequest,
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = state.auth_service.authenticate(&req.email, &req.password).await?;

    let decision = state.tokens.decide_refresh(existing_token(&http).as_deref());
    let same_subject = decision.subject.as_deref() == Some(user.email.as_str());

    if let (false, true, Some(expires_at)) = (decision.should_issue_new, same_subject, decision.current_expiry) {
        info!("Login for user {} kept the current session", user.id);
        return Ok(HttpResponse::Ok().json(AuthResponse { email: user.email, expires_at }));
    }

    let issued = state.tokens.issue(&user.email)?;
    let cookie = session_cookie(&issued, state.config.auth.cookie_secure)?;
    info!("Issued new session for user {}", user.id);

    Ok(HttpResponse::Ok().cookie(cookie).json(AuthResponse {
        email: user.email,
        expires_at: issued.expires_at,
    }))
}

/// Drops the cookie. The token itself stays valid until it expires.
pub async fn logout() -> HttpResponse {
    HttpResponse::Ok().cookie(removal_cookie()).json(serde_json::json!({
        "message": "Successfully logged out"
    }))
}

pub async fn refresh(
    http: HttpRequest,
    session: ApiSession,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let ApiSession(claims) = session;
    let decision = state.tokens.decide_refresh(existing_token(&http).as_deref());

    // A kept token always reports its expiry; anything else gets reissued.
    if let (false, Some(expires_at)) = (decision.should_issue_new, decision.current_expiry) {
        return Ok(HttpResponse::Ok().json(SessionResponse {
            subject: claims.sub,
            expires_at,
            refreshed: false,
        }));
    }

    let issued = state.tokens.issue(&claims.sub)?;
    let cookie = session_cookie(&issued, state.config.auth.cookie_secure)?;
    info!("Refreshed session nearing expiry");

    Ok(HttpResponse::Ok().cookie(cookie).json(SessionResponse {
        subject: claims.sub,
        expires_at: issued.expires_at,
        refreshed: true,
    }))
}

pub async fn current_session(session: ApiSession) -> HttpResponse {
    let ApiSession(claims) = session;
    HttpResponse::Ok().json(SessionResponse {
        expires_at: claims.expires_at(),
        subject: claims.sub,
        refreshed: false,
    })
}
