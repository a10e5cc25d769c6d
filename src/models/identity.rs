use serde::Serialize;

/// Identity claims decoded from a verified bearer token.
///
/// All three fields are mandatory; a token whose payload lacks any of them is
/// rejected before a `Claims` value can exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: String,
    pub email: String,
    pub role: String,
}

/// The authenticated principal attached to a request.
///
/// Inserted into request extensions by the authentication gate and read by
/// the identity rate limit gate and downstream handlers. Fields are private so
/// an attached identity cannot be altered further down the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    subject_id: String,
    email: String,
    role: String,
}

impl Identity {
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// Stable key used for per-identity quota tracking.
    ///
    /// Always the subject id, so quota follows the user even if their email
    /// changes between tokens.
    pub fn rate_limit_key(&self) -> &str {
        &self.subject_id
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.subject_id,
            email: claims.email,
            role: claims.role,
        }
    }
}
