//! Authentication Provider
//! Mission: Turn an email + password into a principal, or refuse uniformly

use crate::auth::{error::AuthError, models::Principal, password::PasswordHasher};
use crate::store::{RoleStore, UserStore};
use std::sync::Arc;
use tracing::{debug, error};

/// Validates submitted credentials against the credential store
#[derive(Debug, Clone)]
pub struct AuthenticationProvider {
    users: Arc<UserStore>,
    roles: Arc<RoleStore>,
    passwords: Arc<PasswordHasher>,
}

impl AuthenticationProvider {
    pub fn new(
        users: Arc<UserStore>,
        roles: Arc<RoleStore>,
        passwords: Arc<PasswordHasher>,
    ) -> Self {
        Self {
            users,
            roles,
            passwords,
        }
    }

    /// Authenticate a user by email and plaintext password.
    ///
    /// Blocking: performs store reads and a bcrypt comparison. Call from
    /// `spawn_blocking` inside async handlers.
    pub fn authenticate(&self, identifier: &str, password: &str) -> Result<Principal, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(AuthError::EmptyUsername);
        }

        let user = self.users.find_by_email(identifier)?;

        let verified = match (&user, password.is_empty()) {
            (Some(user), false) => self
                .passwords
                .verify(password, &user.password_hash)
                .unwrap_or_else(|e| {
                    // A corrupt stored hash reads as a mismatch
                    error!("Password verification failed for {}: {:#}", user.id, e);
                    false
                }),
            _ => self.passwords.verify_dummy(password),
        };

        let user = match user {
            Some(user) if verified => user,
            _ => {
                debug!("Credential check failed");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let authorities = match self.roles.role_of(&user.id)? {
            Some(role) => self.roles.authorities_of(&role.id)?,
            None => Default::default(),
        };

        if authorities.is_empty() {
            return Err(AuthError::EmptyAuthorities);
        }

        Ok(Principal {
            id: user.id,
            username: user.username,
            authorities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_database;
    use crate::store::users::NewUser;
    use std::collections::BTreeSet;
    use tempfile::NamedTempFile;
    use uuid::Uuid;

    struct Fixture {
        provider: AuthenticationProvider,
        users: Arc<UserStore>,
        roles: Arc<RoleStore>,
        passwords: Arc<PasswordHasher>,
        _temp: NamedTempFile,
    }

    fn fixture() -> Fixture {
        let (db, temp) = temp_database();
        let users = Arc::new(UserStore::new(db.clone()));
        let roles = Arc::new(RoleStore::new(db));
        roles.seed_defaults().unwrap();
        let passwords = Arc::new(PasswordHasher::new(4).unwrap());
        let provider =
            AuthenticationProvider::new(users.clone(), roles.clone(), passwords.clone());
        Fixture {
            provider,
            users,
            roles,
            passwords,
            _temp: temp,
        }
    }

    fn add_user(f: &Fixture, email: &str, username: &str, password: &str, role: &str) -> Uuid {
        let role = f.roles.find_role_by_name(role).unwrap().unwrap();
        f.users
            .create(NewUser {
                email: email.to_string(),
                username: username.to_string(),
                password_hash: f.passwords.hash(password).unwrap(),
                role_id: role.id,
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_valid_credentials_yield_role_authorities() {
        let f = fixture();
        let id = add_user(&f, "alice@example.com", "alice", "P@ssw0rd", "editor");

        let principal = f.provider.authenticate("alice@example.com", "P@ssw0rd").unwrap();
        assert_eq!(principal.id, id);
        assert_eq!(principal.username, "alice");
        assert_eq!(
            principal.authorities,
            BTreeSet::from(["READ".to_string(), "WRITE".to_string()])
        );
    }

    #[test]
    fn test_email_lookup_ignores_case() {
        let f = fixture();
        add_user(&f, "alice@example.com", "alice", "P@ssw0rd", "basic");

        assert!(f.provider.authenticate("ALICE@Example.com", "P@ssw0rd").is_ok());
    }

    #[test]
    fn test_unknown_user_and_wrong_password_are_indistinguishable() {
        let f = fixture();
        add_user(&f, "alice@example.com", "alice", "P@ssw0rd", "basic");

        let wrong_password = f
            .provider
            .authenticate("alice@example.com", "wrong")
            .unwrap_err();
        let unknown_user = f
            .provider
            .authenticate("nobody@example.com", "P@ssw0rd")
            .unwrap_err();
        let empty_password = f
            .provider
            .authenticate("alice@example.com", "")
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert!(matches!(empty_password, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.message(), unknown_user.message());
        assert_eq!(wrong_password.status(), unknown_user.status());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let f = fixture();
        let err = f.provider.authenticate("   ", "P@ssw0rd").unwrap_err();
        assert!(matches!(err, AuthError::EmptyUsername));
    }

    #[test]
    fn test_role_without_authorities_cannot_authenticate() {
        let f = fixture();
        f.roles.create_role("hollow", &[]).unwrap();
        add_user(&f, "hollow@example.com", "hollow", "P@ssw0rd", "hollow");

        let err = f
            .provider
            .authenticate("hollow@example.com", "P@ssw0rd")
            .unwrap_err();
        assert!(matches!(err, AuthError::EmptyAuthorities));
    }

    #[test]
    fn test_wrong_password_checked_before_authorities() {
        let f = fixture();
        f.roles.create_role("hollow", &[]).unwrap();
        add_user(&f, "hollow@example.com", "hollow", "P@ssw0rd", "hollow");

        // No hint that the account exists but lacks a role
        let err = f
            .provider
            .authenticate("hollow@example.com", "nope")
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
