use jwt_simple::prelude::*;

use crate::errors::{SnowflakeError, SnowflakeResult};

/// Mints the RS256 tokens Snowflake expects for `KEYPAIR_JWT` authentication.
///
/// The issuer ties the token to a registered public key via its fingerprint:
/// `iss = "<ORG>-<ACCOUNT>.<user>.<fingerprint>"` with organization and
/// account uppercased, `sub` the same string without the fingerprint.
#[derive(Debug)]
pub(crate) struct JwtMinter {
    key_pair: RS256KeyPair,
    issuer: String,
    subject: String,
}

impl JwtMinter {
    pub fn new(
        private_key_pem: &str,
        organization: &str,
        account: &str,
        user: &str,
    ) -> SnowflakeResult<JwtMinter> {
        let key_pair = RS256KeyPair::from_pem(private_key_pem)
            .map_err(|e| SnowflakeError::Config(format!("unparseable private key: {e}")))?;
        let fingerprint = fingerprint(&key_pair);
        log::debug!("Public key fingerprint: {fingerprint}");
        let subject = format!(
            "{}-{}.{}",
            organization.to_ascii_uppercase(),
            account.to_ascii_uppercase(),
            user,
        );
        let issuer = format!("{subject}.{fingerprint}");
        Ok(JwtMinter {
            key_pair,
            issuer,
            subject,
        })
    }

    /// Sign a token valid from now until now plus `ttl_secs`.
    pub fn mint(&self, ttl_secs: u64) -> SnowflakeResult<String> {
        let claims = Claims::create(Duration::from_secs(ttl_secs))
            .with_issuer(&self.issuer)
            .with_subject(&self.subject);
        self.key_pair
            .sign(claims)
            .map_err(|e| SnowflakeError::Request(format!("could not sign JWT: {e}")))
    }
}

/// `SHA256:` followed by the standard-alphabet base64 of the SHA-256 hash of
/// the DER-encoded public key. This matches what Snowflake stores when the
/// key is registered, so it is stable for a given key.
pub(crate) fn fingerprint(key_pair: &RS256KeyPair) -> String {
    // sha256_thumbprint is URL-safe base64 without padding
    let mut b64 = key_pair
        .public_key()
        .sha256_thumbprint()
        .replace('-', "+")
        .replace('_', "/");
    while b64.len() % 4 != 0 {
        b64.push('=');
    }
    format!("SHA256:{b64}")
}
