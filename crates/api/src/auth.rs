//! Caller identity forwarded by the upstream gateway.
//!
//! The gateway authenticates the request and passes the result along as
//! `x-user-id` (a UUID) and `x-user-role` (`user` or `admin`, default
//! `user`). This service trusts those headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::{Actor, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Unauthorized(format!("{name} is not valid text")))
        })
        .transpose()
}

fn actor_from_parts(parts: &Parts) -> Result<Actor, ApiError> {
    let user_id: UserId = header(parts, USER_ID_HEADER)?
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?
        .parse()
        .map_err(|_| ApiError::Unauthorized(format!("{USER_ID_HEADER} must be a UUID")))?;

    let role = match header(parts, USER_ROLE_HEADER)? {
        Some(value) => value
            .parse::<Role>()
            .map_err(|err| ApiError::Unauthorized(err.to_string()))?,
        None => Role::Customer,
    };

    Ok(Actor { user_id, role })
}

/// Any authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_parts(parts).map(AuthUser)
    }
}

/// An authenticated caller with the admin role; anyone else gets 403.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_parts(parts)?;
        actor.require_admin().map_err(ApiError::from)?;
        Ok(AdminUser(actor))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_missing_user_is_unauthorized() {
        assert!(matches!(
            actor_from_parts(&parts(&[])),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_malformed_user_is_unauthorized() {
        assert!(matches!(
            actor_from_parts(&parts(&[(USER_ID_HEADER, "42")])),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_role_defaults_to_customer() {
        let id = UserId::new();
        let raw = id.to_string();
        let actor = actor_from_parts(&parts(&[(USER_ID_HEADER, raw.as_str())])).unwrap();
        assert_eq!(actor.user_id, id);
        assert!(!actor.is_admin());
    }

    #[test]
    fn test_admin_role() {
        let id = UserId::new().to_string();
        let headers = [(USER_ID_HEADER, id.as_str()), (USER_ROLE_HEADER, "admin")];
        let actor = actor_from_parts(&parts(&headers)).unwrap();
        assert!(actor.is_admin());
    }

    #[test]
    fn test_unknown_role_is_unauthorized() {
        let id = UserId::new().to_string();
        let headers = [(USER_ID_HEADER, id.as_str()), (USER_ROLE_HEADER, "root")];
        let result = actor_from_parts(&parts(&headers));
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }
}
