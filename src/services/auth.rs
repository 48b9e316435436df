use crate::config::Config;
use crate::error::{AppError, Result};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session claims issued by the login flow.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
}

pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self::from_secret(config.jwt_secret.clone())
    }

    pub fn from_secret(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized)?;

        Ok(token_data.claims)
    }
}
