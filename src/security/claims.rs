use serde::{Deserialize, Serialize};

/// JWT claims carried by a client token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserClaims {
    pub sub: String, // User ID (Subject)
    pub exp: usize,  // Expiration time (UNIX timestamp)
}

/// Authenticated identity attached to the request.
#[derive(Clone, Debug)]
pub struct UserContext {
    pub user_id: String,
    pub claims: UserClaims,
}

/// Request extension carrying the authenticated identity, if any.
///
/// `None` only when `security.jwt_required` is off and the request was
/// anonymous; handlers then skip the user-id match.
#[derive(Clone, Debug)]
pub struct MaybeUser(pub Option<UserContext>);
