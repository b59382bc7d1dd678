//! Password Hashing
//! Mission: One-way bcrypt hashing; plaintext is never stored or compared

use anyhow::{Context, Result};
use bcrypt::{hash, verify};

/// Hashes new passwords and verifies submitted ones
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    // Verified against when the account does not exist, so a miss costs the
    // same bcrypt work as a wrong password.
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self> {
        let dummy_hash =
            hash("not-a-real-password", cost).context("Failed to hash dummy password")?;
        Ok(Self { cost, dummy_hash })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        hash(password, self.cost).context("Failed to hash password")
    }

    /// Compare a plaintext password with a stored hash
    pub fn verify(&self, password: &str, password_hash: &str) -> Result<bool> {
        verify(password, password_hash).context("Failed to verify password")
    }

    /// Burn one verification worth of time and report failure
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = verify(password, &self.dummy_hash);
        false
    }
}
