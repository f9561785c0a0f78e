use crate::domain::Viewer;
use crate::error::ForumError;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use std::net::IpAddr;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const ROLE_HEADER: &str = "X-User-Role";
const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

const MODERATOR_ROLES: [&str; 2] = ["moderator", "admin"];

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// First hop of `X-Forwarded-For`, else the socket peer
fn client_ip(req: &HttpRequest) -> Option<IpAddr> {
    header(req, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| req.peer_addr().map(|addr| addr.ip()))
}

fn viewer_from_request(req: &HttpRequest) -> Result<Viewer, ForumError> {
    let user_id = header(req, USER_ID_HEADER)
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| ForumError::Validation(format!("invalid {} header", USER_ID_HEADER)))
        })
        .transpose()?;

    let is_moderator = user_id.is_some()
        && header(req, ROLE_HEADER)
            .map(|role| {
                role.split(',')
                    .any(|r| MODERATOR_ROLES.contains(&r.trim().to_ascii_lowercase().as_str()))
            })
            .unwrap_or(false);

    Ok(Viewer {
        user_id,
        is_moderator,
        ip: client_ip(req),
    })
}

impl FromRequest for Viewer {
    type Error = ForumError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(viewer_from_request(req))
    }
}
