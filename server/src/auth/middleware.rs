//! Identity extraction.
//!
//! The identity gateway authenticates the user and forwards `X-User-Id`, plus
//! `X-Device-Id` when the client sent one. If `AUTH_SECRET` is configured the
//! gateway must also present it as a bearer token.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use torque_engine::{DeviceSeen, Identity, Timestamp};

use crate::error::AppError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const DEVICE_ID_HEADER: &str = "x-device-id";
const PLATFORM_HEADER: &str = "x-platform";
const APP_VERSION_HEADER: &str = "x-app-version";

/// Authenticated caller extracted from request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: Identity,
    pub platform: Option<String>,
    pub app_version: Option<String>,
}

impl Caller {
    /// Device registry entry for this request.
    pub fn seen_at(&self, now: Timestamp) -> DeviceSeen {
        DeviceSeen {
            identity: self.identity.clone(),
            platform: self.platform.clone(),
            app_version: self.app_version.clone(),
            seen_at: now,
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(ref secret) = state.config.auth_secret {
            match header(&parts.headers, AUTHORIZATION.as_str()) {
                Some(value) if value.starts_with("Bearer ") => {
                    if value.trim_start_matches("Bearer ").trim() != secret {
                        return Err(AppError::Unauthorized("invalid bearer token"));
                    }
                }
                Some(_) => {
                    return Err(AppError::Unauthorized(
                        "invalid authorization header format",
                    ))
                }
                None => return Err(AppError::Unauthorized("missing authorization header")),
            }
        }

        let user_id = header(&parts.headers, USER_ID_HEADER)
            .ok_or(AppError::Unauthorized("missing user identity"))?;
        let identity = Identity::new(user_id, header(&parts.headers, DEVICE_ID_HEADER));

        if identity.is_unknown_device() {
            tracing::debug!(user_id = %identity.user_id, "request without device id");
        }

        Ok(Caller {
            identity,
            platform: header(&parts.headers, PLATFORM_HEADER).map(str::to_string),
            app_version: header(&parts.headers, APP_VERSION_HEADER).map(str::to_string),
        })
    }
}
