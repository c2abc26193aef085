//! Caller identity extraction
//!
//! Authentication happens at the gateway in front of this service, which
//! forwards the verified identity as `X-User-Id` and `X-User-Role` headers.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    Farmer,
    WarehouseManager,
    Admin,
}

impl CallerRole {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "farmer" => Some(CallerRole::Farmer),
            "warehouse_manager" | "manager" => Some(CallerRole::WarehouseManager),
            "admin" => Some(CallerRole::Admin),
            _ => None,
        }
    }

    /// Warehouse managers and admins issue receipts and underwrite loans
    pub fn is_staff(&self) -> bool {
        matches!(self, CallerRole::WarehouseManager | CallerRole::Admin)
    }
}

/// Caller identified by the gateway headers
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(caller: Caller) -> impl IntoResponse {
///     format!("Hello, {}", caller.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: CallerRole,
}

impl Caller {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("X-User-Id header required".to_string()))?;

        let role = match headers.get(USER_ROLE_HEADER) {
            None => CallerRole::Farmer,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(CallerRole::from_str)
                .ok_or_else(|| ApiError::Unauthorized("Invalid X-User-Role header".to_string()))?,
        };

        Ok(Caller {
            user_id: user_id.to_string(),
            role,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers)
    }
}

/// Caller with the warehouse manager or admin role
#[derive(Debug, Clone)]
pub struct StaffUser(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;

        if !caller.role.is_staff() {
            return Err(ApiError::Forbidden(
                "Warehouse manager or admin role required".to_string(),
            ));
        }

        Ok(StaffUser(caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            Caller::from_headers(&headers),
            Err(ApiError::Unauthorized(_))
        ));

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("FRM001"));
        let caller = Caller::from_headers(&headers).unwrap();
        assert_eq!(caller.user_id, "FRM001");
        assert_eq!(caller.role, CallerRole::Farmer);

        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("warehouse_manager"));
        assert!(Caller::from_headers(&headers).unwrap().role.is_staff());

        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("root"));
        assert!(Caller::from_headers(&headers).is_err());
    }
}
