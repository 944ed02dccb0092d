//! Request authentication gate.
//!
//! Both extractors share [`read_session`] and differ only in how a failure is
//! rendered: [`PageSession`] redirects browsers to the entry page,
//! [`ApiSession`] answers with a JSON error. Handlers that take either one as
//! an argument only run for a valid, unexpired session.

use crate::auth::token::{Claims, IssuedToken, TokenRejection, TokenService, TokenStatus};
use crate::error::{AppError, AuthError};
use actix_web::cookie::time::OffsetDateTime;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::{header, StatusCode};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures::future::{ready, Ready};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const SESSION_COOKIE: &str = "token";
pub const ENTRY_ROUTE: &str = "/";

/// The request's cookie header could not be parsed at all.
#[derive(Debug, Error)]
#[error("cookie header unreadable: {0}")]
pub struct CookieReadError(String);

/// Pulls the `token` cookie and validates it. A missing cookie is
/// `TokenStatus::Absent`, not an error.
pub fn read_session(req: &HttpRequest, tokens: &TokenService) -> Result<TokenStatus, CookieReadError> {
    let cookies = req.cookies().map_err(|e| CookieReadError(e.to_string()))?;
    let token = cookies
        .iter()
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value().to_owned());

    Ok(tokens.validate(token.as_deref()))
}

fn token_service(req: &HttpRequest) -> Option<&web::Data<TokenService>> {
    let tokens = req.app_data::<web::Data<TokenService>>();
    if tokens.is_none() {
        error!("TokenService is not registered as app data; every gated request will fail");
    }
    tokens
}

/// Builds the `token` cookie for a freshly issued session.
pub fn session_cookie(issued: &IssuedToken, secure: bool) -> Result<Cookie<'static>, AppError> {
    let expires = OffsetDateTime::from_unix_timestamp(issued.expires_at.timestamp())
        .map_err(|e| AppError::InternalError(format!("cookie expiry out of range: {}", e)))?;

    Ok(Cookie::build(SESSION_COOKIE, issued.token.clone())
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .expires(expires)
        .finish())
}

/// Cookie that tells the browser to drop its session token.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

/// Redirect to the entry page; the page collaborator renders whatever
/// comes next.
#[derive(Debug, Error)]
#[error("not authenticated")]
pub struct LoginRedirect;

impl ResponseError for LoginRedirect {
    fn status_code(&self) -> StatusCode {
        StatusCode::SEE_OTHER
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::SeeOther()
            .insert_header((header::LOCATION, ENTRY_ROUTE))
            .finish()
    }
}

/// Gate for page routes. Every failure, including a broken cookie header,
/// becomes the same redirect.
#[derive(Debug, Clone)]
pub struct PageSession(pub Claims);

impl FromRequest for PageSession {
    type Error = LoginRedirect;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(tokens) = token_service(req) else {
            return ready(Err(LoginRedirect));
        };

        let result = match read_session(req, tokens) {
            Ok(TokenStatus::Valid(claims)) => Ok(PageSession(claims)),
            Ok(status) => {
                debug!("Page request to {} without a valid session: {:?}", req.path(), status);
                Err(LoginRedirect)
            }
            Err(e) => {
                warn!("Page request to {}: {}", req.path(), e);
                Err(LoginRedirect)
            }
        };
        ready(result)
    }
}

/// Gate for data routes. Failures become `{"error": ...}` bodies:
/// no cookie or an unusable one is 401 "session expired", a signature
/// mismatch is 401 "invalid signature", an unreadable cookie header is 500.
#[derive(Debug, Clone)]
pub struct ApiSession(pub Claims);

impl FromRequest for ApiSession {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(tokens) = token_service(req) else {
            return ready(Err(AppError::InternalError("token service missing".into())));
        };

        let result = match read_session(req, tokens) {
            Ok(TokenStatus::Valid(claims)) => Ok(ApiSession(claims)),
            Ok(TokenStatus::Invalid(TokenRejection::SignatureMismatch)) => {
                warn!("Rejected token with invalid signature on {}", req.path());
                Err(AuthError::InvalidSignature.into())
            }
            Ok(status) => {
                debug!("Data request to {} without a valid session: {:?}", req.path(), status);
                Err(AuthError::SessionExpired.into())
            }
            Err(e) => Err(AppError::InternalError(e.to_string())),
        };
        ready(result)
    }
}
