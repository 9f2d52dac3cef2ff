//! Authentication and authorization middleware.
//!
//! The three stages run in a fixed order on every protected route:
//!
//! 1. `require_auth` verifies the bearer token and attaches an `AuthUser`.
//! 2. `require_role` checks the caller's role against the route's allow-list.
//! 3. `require_ownership` checks that a path-addressed resource belongs to the caller.
//!
//! Each stage returns `Err(ApiError)` to halt the chain; nothing after it, handler
//! included, runs. The decision logic lives in plain functions so it can be exercised
//! without a router.

use std::sync::Arc;

use axum::{
    extract::{RawPathParams, Request, State, rejection::RawPathParamsRejection},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use crate::{
    auth::{AuthUser, Role, TokenVerifier, UserId},
    errors::ApiError,
};

// --- Authentication ---

/// bearer_token
///
/// Pulls the token out of `Authorization: Bearer <token>`. The prefix is matched
/// case-sensitively and stripped once.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::MissingCredentials)?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::InvalidToken)
}

pub fn authenticate(headers: &HeaderMap, verifier: &TokenVerifier) -> Result<AuthUser, ApiError> {
    let token = bearer_token(headers)?;
    Ok(verifier.verify(token)?)
}

/// require_auth
///
/// First stage of every protected route. On success the verified identity is stored in
/// the request extensions; on failure the request ends with 401.
pub async fn require_auth(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticate(request.headers(), &verifier).inspect_err(|e| {
        tracing::warn!(uri = %request.uri(), reason = %e, "authentication rejected");
    })?;

    tracing::debug!(user_id = %user.id, role = ?user.role, "request authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// --- Roles ---

/// RoleGuard
///
/// The set of roles a route group admits.
#[derive(Debug, Clone, Copy)]
pub struct RoleGuard {
    allowed: &'static [Role],
}

impl RoleGuard {
    pub const fn any_of(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    /// check
    ///
    /// A missing identity or a token without a role is an authentication problem (401);
    /// a role outside the allow-list is an authorization problem (403).
    pub fn check(&self, user: Option<&AuthUser>) -> Result<Role, ApiError> {
        let user = user.ok_or(ApiError::MissingCredentials)?;
        let role = user.role.ok_or(ApiError::MissingRoleClaim)?;

        if self.allowed.contains(&role) {
            Ok(role)
        } else {
            Err(ApiError::InsufficientRole)
        }
    }
}

pub const TEACHERS_ONLY: RoleGuard = RoleGuard::any_of(&[Role::Teacher]);
pub const STUDENTS_AND_TEACHERS: RoleGuard = RoleGuard::any_of(&[Role::Student, Role::Teacher]);

pub async fn require_role(
    State(guard): State<RoleGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request.extensions().get::<AuthUser>();
    guard.check(user).inspect_err(|e| {
        tracing::warn!(
            user_id = ?user.map(|u| u.id),
            uri = %request.uri(),
            reason = %e,
            "role check rejected"
        );
    })?;

    Ok(next.run(request).await)
}

// --- Ownership ---

/// ResourceId
///
/// What the router could tell the ownership stage about the guarded path parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceId<'a> {
    /// The route does not declare the parameter.
    Absent,
    /// The path parameters could not be decoded, so the owner is unknown.
    Unreadable,
    Value(&'a str),
}

/// OwnershipGuard
///
/// Names the path parameter that carries the owner's id. Routes that do not declare the
/// parameter pass through untouched.
#[derive(Debug, Clone, Copy)]
pub struct OwnershipGuard {
    param: &'static str,
}

impl OwnershipGuard {
    pub const fn path_param(param: &'static str) -> Self {
        Self { param }
    }

    pub fn param(&self) -> &'static str {
        self.param
    }

    /// resource_id
    ///
    /// Looks the guarded parameter up in the decoded path parameters.
    pub fn resource_id<'a>(
        &self,
        params: &'a Result<RawPathParams, RawPathParamsRejection>,
    ) -> ResourceId<'a> {
        match params {
            Ok(params) => params
                .iter()
                .find(|(key, _)| *key == self.param)
                .map_or(ResourceId::Absent, |(_, value)| ResourceId::Value(value)),
            Err(_) => ResourceId::Unreadable,
        }
    }

    /// check
    ///
    /// Teachers may reach any resource. Everyone else must own it. A resource id that
    /// is unreadable or not a valid user id never matches.
    pub fn check(&self, user: Option<&AuthUser>, resource_id: ResourceId<'_>) -> Result<(), ApiError> {
        let user = user.ok_or(ApiError::MissingCredentials)?;

        let owned = match resource_id {
            ResourceId::Absent => return Ok(()),
            ResourceId::Unreadable => false,
            ResourceId::Value(value) => value.parse::<UserId>().is_ok_and(|id| id == user.id),
        };

        if owned || user.is_teacher() {
            Ok(())
        } else {
            Err(ApiError::OwnershipViolation)
        }
    }
}

pub async fn require_ownership(
    State(guard): State<OwnershipGuard>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let resource_id = guard.resource_id(&params);

    let user = request.extensions().get::<AuthUser>();
    guard.check(user, resource_id).inspect_err(|e| {
        tracing::warn!(
            user_id = ?user.map(|u| u.id),
            resource_id = ?resource_id,
            reason = %e,
            "ownership check rejected"
        );
    })?;

    Ok(next.run(request).await)
}
