use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use super::claims::{MaybeUser, UserClaims, UserContext};

/// Validate the bearer token and inject a [`MaybeUser`] extension.
///
/// When `security.jwt_required` is off, anonymous requests pass through
/// with an empty identity; handlers then skip the user-id match.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header_val) if header_val.starts_with("Bearer ") => {
            &header_val[7..] // Strip "Bearer "
        }
        _ => {
            if !state.config.security.jwt_required {
                request.extensions_mut().insert(MaybeUser(None));
                return Ok(next.run(request).await);
            }
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let secret = &state.config.security.jwt_secret;
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    match decode::<UserClaims>(token, &key, &validation) {
        Ok(token_data) => {
            let claims = token_data.claims;
            let context = UserContext {
                user_id: claims.sub.clone(),
                claims,
            };
            request.extensions_mut().insert(MaybeUser(Some(context)));
            Ok(next.run(request).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}
