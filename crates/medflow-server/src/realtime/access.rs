//! The single capability check consulted by every intent and staff route.

use medflow_core::{Role, TenantId};

use super::error::IntentError;
use crate::session::Session;

/// What an operation needs from the caller.
#[derive(Debug, Clone, Copy)]
pub enum Requirement<'a> {
    /// Any authenticated staff member.
    Staff,
    /// Staff of the given hospital.
    Tenant(&'a TenantId),
    /// Staff holding one of the roles. Admins always pass.
    AnyRole(&'a [Role]),
}

pub fn authorize<'s>(
    session: Option<&'s Session>,
    requirement: Requirement<'_>,
) -> Result<&'s Session, IntentError> {
    let session = session.ok_or(IntentError::Unauthorized)?;
    match requirement {
        Requirement::Staff => Ok(session),
        // Cross-tenant access looks exactly like a missing record.
        Requirement::Tenant(tenant) if &session.tenant_id == tenant => Ok(session),
        Requirement::Tenant(_) => Err(IntentError::NotFound),
        Requirement::AnyRole(roles) if session.role == Role::Admin || roles.contains(&session.role) => {
            Ok(session)
        }
        Requirement::AnyRole(_) => Err(IntentError::Forbidden),
    }
}
