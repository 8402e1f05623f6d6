use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::HashConfig;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// Salted Argon2id hashing for stored credentials.
#[derive(Debug, Clone)]
pub struct Hasher {
    params: Params,
    #[cfg(test)]
    broken: bool,
}

impl Hasher {
    pub fn new(cfg: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| anyhow::anyhow!("invalid argon2 parameters: {e}"))?;
        if cfg.memory_kib < Params::DEFAULT_M_COST || cfg.iterations < Params::DEFAULT_T_COST {
            warn!(
                memory_kib = cfg.memory_kib,
                iterations = cfg.iterations,
                "password hashing cost is below the recommended minimum"
            );
        }
        Ok(Self {
            params,
            #[cfg(test)]
            broken: false,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `plain` with a fresh salt into a PHC string.
    pub fn hash(&self, plain: &str) -> Result<String, HashError> {
        #[cfg(test)]
        if self.broken {
            return Err(HashError("entropy source unavailable".into()));
        }
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                HashError(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Check `plain` against a stored hash, using the parameters embedded in
    /// the hash. A malformed hash is logged and treated as a mismatch.
    pub fn verify(&self, hashed: &str, plain: &str) -> bool {
        let parsed = match PasswordHash::new(hashed) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored password hash is malformed");
                return false;
            }
        };
        match self.argon2().verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(e) => {
                warn!(error = %e, "password verification error");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> Hasher {
    // cheap parameters; production uses the crate defaults
    Hasher::new(&HashConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("valid test params")
}

/// Hasher whose `hash` always fails; `verify` still works.
#[cfg(test)]
pub(crate) fn failing_hasher() -> Hasher {
    Hasher {
        broken: true,
        ..test_hasher()
    }
}
