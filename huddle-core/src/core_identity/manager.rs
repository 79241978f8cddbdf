//! Registration, login, sessions and password resets

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::password::PasswordHashing;
use super::token::TokenSigner;
use super::user::User;
use super::validation::{require, validate_email, validate_name, validate_password};
use super::{IdentityError, IdentityResult};
use crate::config::AuthConfig;
use crate::core_mail::{reset_mail, MailDispatcher};
use crate::core_space::storage::{SqlStore, StoreError, StoreTx};
use crate::core_space::types::{Timestamp, UserId};
use crate::metrics;

/// Optional profile changes. Empty strings are treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<String>,
}

/// Account operations. Every successful credential change returns a
/// fresh session token.
pub trait IdentityManager {
    fn register(&self, name: &str, email: &str, password: &str) -> IdentityResult<String>;

    fn login(&self, email: &str, password: &str) -> IdentityResult<String>;

    /// Resolve a session token to the user it was issued for
    fn authenticate(&self, token: &str) -> IdentityResult<UserId>;

    fn current_user(&self, id: &UserId) -> IdentityResult<User>;

    fn update_profile(&self, id: &UserId, update: ProfileUpdate) -> IdentityResult<String>;

    /// Build a reset link, mail it to the user and return it
    fn request_password_reset(&self, id: &UserId) -> IdentityResult<String>;

    fn reset_password(&self, token: &str, new_password: &str) -> IdentityResult<String>;
}

#[derive(Serialize, Deserialize)]
struct SessionClaims {
    sub: UserId,
}

pub struct IdentityService {
    store: SqlStore,
    sessions: TokenSigner,
    resets: TokenSigner,
    hashing: PasswordHashing,
    mail: MailDispatcher,
    public_base_url: String,
    session_ttl: Duration,
    reset_ttl: Duration,
}

impl IdentityService {
    pub fn new(
        store: SqlStore,
        auth: &AuthConfig,
        public_base_url: impl Into<String>,
        mail: MailDispatcher,
    ) -> IdentityResult<Self> {
        Ok(IdentityService {
            store,
            sessions: TokenSigner::new(&auth.user_secret),
            resets: TokenSigner::new(&auth.reset_secret),
            hashing: PasswordHashing::new(auth.hash_memory_kib, auth.hash_iterations)?,
            mail,
            public_base_url: public_base_url.into(),
            session_ttl: auth.session_ttl,
            reset_ttl: auth.reset_ttl,
        })
    }

    fn issue_session(&self, user: &UserId) -> IdentityResult<String> {
        Ok(self.sessions.sign(&SessionClaims { sub: *user }, self.session_ttl)?)
    }

    fn load_user(tx: &StoreTx<'_>, id: &UserId) -> IdentityResult<User> {
        tx.get_user(id)?.ok_or(IdentityError::NotFound)
    }
}

impl IdentityManager for IdentityService {
    #[instrument(skip_all, fields(email = %email))]
    fn register(&self, name: &str, email: &str, password: &str) -> IdentityResult<String> {
        let result = (|| -> IdentityResult<String> {
            let name = validate_name("Name", name)?;
            let email = validate_email(email)?;
            validate_password(password)?;

            let user = User::new(name, email, self.hashing.hash(password)?);
            self.store.transaction(|tx| -> IdentityResult<()> {
                if tx.find_user_by_email(&user.email)?.is_some() {
                    return Err(IdentityError::EmailTaken);
                }
                match tx.insert_user(&user) {
                    // lost a race with a concurrent registration
                    Err(StoreError::Constraint(_)) => Err(IdentityError::EmailTaken),
                    other => Ok(other?),
                }
            })?;

            info!(user_id = %user.id, "user registered");
            self.issue_session(&user.id)
        })();
        metrics::observe("register", result)
    }

    #[instrument(skip_all, fields(email = %email))]
    fn login(&self, email: &str, password: &str) -> IdentityResult<String> {
        let result = (|| -> IdentityResult<String> {
            let email = validate_email(email)?;
            require("Password", password)?;

            let user = self
                .store
                .snapshot(|tx| -> IdentityResult<_> { Ok(tx.find_user_by_email(&email)?) })?;
            let user = match user {
                Some(user) if self.hashing.verify(password, &user.password_hash) => user,
                _ => {
                    debug!("login rejected");
                    return Err(IdentityError::InvalidCredentials);
                }
            };
            self.issue_session(&user.id)
        })();
        metrics::observe("login", result)
    }

    fn authenticate(&self, token: &str) -> IdentityResult<UserId> {
        let claims: SessionClaims = self.sessions.verify(token)?;
        Ok(claims.sub)
    }

    fn current_user(&self, id: &UserId) -> IdentityResult<User> {
        self.store.snapshot(|tx| Self::load_user(tx, id))
    }

    #[instrument(skip_all, fields(user_id = %id))]
    fn update_profile(&self, id: &UserId, update: ProfileUpdate) -> IdentityResult<String> {
        let result = (|| -> IdentityResult<String> {
            let name = match update.name.as_deref().filter(|n| !n.trim().is_empty()) {
                Some(name) => Some(validate_name("Name", name)?),
                None => None,
            };
            let password_hash = match update.password.as_deref().filter(|p| !p.is_empty()) {
                Some(password) => {
                    validate_password(password)?;
                    Some(self.hashing.hash(password)?)
                }
                None => None,
            };
            let avatar = match update.avatar.as_deref().filter(|a| !a.trim().is_empty()) {
                Some(avatar) => Some(validate_name("Avatar", avatar)?),
                None => None,
            };

            self.store.transaction(|tx| -> IdentityResult<()> {
                let mut user = Self::load_user(tx, id)?;
                if let Some(name) = name {
                    user.name = name;
                }
                if let Some(hash) = password_hash {
                    user.password_hash = hash;
                }
                if avatar.is_some() {
                    user.avatar = avatar;
                }
                user.updated_at = Timestamp::now();
                tx.save_user(&user)?;
                Ok(())
            })?;

            self.issue_session(id)
        })();
        metrics::observe("update_profile", result)
    }

    #[instrument(skip_all, fields(user_id = %id))]
    fn request_password_reset(&self, id: &UserId) -> IdentityResult<String> {
        let result = (|| -> IdentityResult<String> {
            let user = self.current_user(id)?;
            let token = self.resets.sign(&SessionClaims { sub: user.id }, self.reset_ttl)?;
            let link = format!(
                "{}/api/users/reset-password/{}",
                self.public_base_url.trim_end_matches('/'),
                token
            );

            self.mail.dispatch(reset_mail(&user.email, &user.name, &link));
            Ok(link)
        })();
        metrics::observe("request_password_reset", result)
    }

    #[instrument(skip_all)]
    fn reset_password(&self, token: &str, new_password: &str) -> IdentityResult<String> {
        let result = (|| -> IdentityResult<String> {
            let claims: SessionClaims = self.resets.verify(token)?;
            validate_password(new_password)?;
            let hash = self.hashing.hash(new_password)?;

            self.store.transaction(|tx| -> IdentityResult<()> {
                let mut user = Self::load_user(tx, &claims.sub)?;
                user.password_hash = hash;
                user.updated_at = Timestamp::now();
                tx.save_user(&user)?;
                Ok(())
            })?;

            info!(user_id = %claims.sub, "password reset");
            self.issue_session(&claims.sub)
        })();
        metrics::observe("reset_password", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            user_secret: SecretString::new("user-secret".to_string()),
            reset_secret: SecretString::new("reset-secret".to_string()),
            invite_secret: SecretString::new("invite-secret".to_string()),
            hash_memory_kib: 1024,
            hash_iterations: 1,
            ..AuthConfig::default()
        }
    }

    fn service() -> IdentityService {
        IdentityService::new(
            SqlStore::memory().unwrap(),
            &auth_config(),
            "http://localhost:5000",
            MailDispatcher::disabled(),
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_authenticate() {
        let identity = service();
        let token = identity.register("Alice", "Alice@Example.com", "hunter22").unwrap();
        let id = identity.authenticate(&token).unwrap();

        let user = identity.current_user(&id).unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.workspaces.is_empty());
    }

    #[test]
    fn test_duplicate_email() {
        let identity = service();
        identity.register("Alice", "alice@example.com", "hunter22").unwrap();
        assert!(matches!(
            identity.register("Other", "ALICE@example.com", "hunter22"),
            Err(IdentityError::EmailTaken)
        ));
    }

    #[test]
    fn test_register_validation() {
        let identity = service();
        assert!(matches!(identity.register("", "a@b.io", "hunter22"), Err(IdentityError::Invalid(_))));
        assert!(matches!(identity.register("A", "nope", "hunter22"), Err(IdentityError::Invalid(_))));
        assert!(matches!(identity.register("A", "a@b.io", "short"), Err(IdentityError::Invalid(_))));
        assert!(matches!(
            identity.register("A", "a@b.io", "waytoolongpassword123"),
            Err(IdentityError::Invalid(_))
        ));
    }

    #[test]
    fn test_login_does_not_reveal_which_part_failed() {
        let identity = service();
        identity.register("Alice", "alice@example.com", "hunter22").unwrap();

        assert!(identity.login("alice@example.com", "hunter22").is_ok());
        assert!(matches!(
            identity.login("alice@example.com", "wrong-pass"),
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.login("bob@example.com", "hunter22"),
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_tokens_are_not_interchangeable() {
        let identity = service();
        let session = identity.register("Alice", "alice@example.com", "hunter22").unwrap();
        let id = identity.authenticate(&session).unwrap();

        assert!(matches!(identity.reset_password(&session, "newpass1"), Err(IdentityError::InvalidToken)));
        assert!(matches!(identity.authenticate("garbage"), Err(IdentityError::InvalidToken)));

        let link = identity.request_password_reset(&id).unwrap();
        let reset_token = link.rsplit('/').next().unwrap();
        assert!(matches!(identity.authenticate(reset_token), Err(IdentityError::InvalidToken)));
    }

    #[test]
    fn test_password_reset_flow() {
        let identity = service();
        let session = identity.register("Alice", "alice@example.com", "hunter22").unwrap();
        let id = identity.authenticate(&session).unwrap();

        let link = identity.request_password_reset(&id).unwrap();
        assert!(link.starts_with("http://localhost:5000/api/users/reset-password/"));

        let token = link.rsplit('/').next().unwrap();
        let new_session = identity.reset_password(token, "brandnew1").unwrap();
        assert_eq!(identity.authenticate(&new_session).unwrap(), id);

        assert!(identity.login("alice@example.com", "brandnew1").is_ok());
        assert!(identity.login("alice@example.com", "hunter22").is_err());
    }

    #[test]
    fn test_update_profile_ignores_empty_fields() {
        let identity = service();
        let session = identity.register("Alice", "alice@example.com", "hunter22").unwrap();
        let id = identity.authenticate(&session).unwrap();

        identity
            .update_profile(
                &id,
                ProfileUpdate {
                    name: Some("Alice Liddell".into()),
                    password: Some(String::new()),
                    avatar: Some("alice.png".into()),
                },
            )
            .unwrap();

        let user = identity.current_user(&id).unwrap();
        assert_eq!(user.name, "Alice Liddell");
        assert_eq!(user.avatar.as_deref(), Some("alice.png"));
        assert!(identity.login("alice@example.com", "hunter22").is_ok());
    }

    #[test]
    fn test_unknown_user() {
        let identity = service();
        let ghost = UserId::generate();
        assert!(matches!(identity.current_user(&ghost), Err(IdentityError::NotFound)));
        assert!(matches!(
            identity.update_profile(&ghost, ProfileUpdate::default()),
            Err(IdentityError::NotFound)
        ));
    }
}
