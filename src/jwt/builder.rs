use crate::jwt::claims::RoleAssignment;

/// An identity assertion already verified by the identity-provider
/// client.
///
/// Issuance and audience checks happen before this type is constructed;
/// the engine trusts it as input to session creation.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    /// Opaque subject identifier from the provider
    pub subject: String,
    /// Email address
    pub email: String,
    /// Whether the provider verified the email
    pub email_verified: bool,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub picture: Option<String>,
}

/// Everything a session needs except what signing itself assigns
/// (`jti`, `sid`, `iat`, `exp`, tier).
#[derive(Debug, Clone)]
pub struct SessionDescriptor {
    /// Verified identity
    pub identity: ExternalIdentity,
    /// Role assignments resolved for the subject
    pub roles: Vec<RoleAssignment>,
    /// Reuse an existing session id instead of generating one; only the
    /// refresh path sets this to carry claims forward under a new `sid`
    pub session_id: Option<String>,
}

/// Builds a [`SessionDescriptor`] from a verified external identity.
pub struct ClaimsBuilder {
    identity: ExternalIdentity,
    roles: Vec<RoleAssignment>,
    session_id: Option<String>,
}

impl ClaimsBuilder {
    /// Starts a builder for the given identity.
    pub fn new(identity: ExternalIdentity) -> Self {
        ClaimsBuilder {
            identity,
            roles: Vec::new(),
            session_id: None,
        }
    }

    /// Sets the subject's role assignments.
    pub fn roles(mut self, roles: Vec<RoleAssignment>) -> Self {
        self.roles = roles;
        self
    }

    /// Adds a single role assignment.
    pub fn role(mut self, role: RoleAssignment) -> Self {
        self.roles.push(role);
        self
    }

    /// Pins the session id (refresh path only).
    pub fn session_id(mut self, sid: impl Into<String>) -> Self {
        self.session_id = Some(sid.into());
        self
    }

    /// Builds the descriptor.
    ///
    /// # Errors
    ///
    /// Fails when the subject id is empty or any role assignment is
    /// malformed.
    pub fn build(self) -> Result<SessionDescriptor, &'static str> {
        if self.identity.subject.is_empty() {
            return Err("Subject is required");
        }
        if self.roles.iter().any(|r| !r.is_well_formed()) {
            return Err("Malformed role assignment");
        }

        Ok(SessionDescriptor {
            identity: self.identity,
            roles: self.roles,
            session_id: self.session_id,
        })
    }
}
