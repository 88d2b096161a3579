use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use super::{
    confirmation::{generate_confirmation_code, ConfirmationDispatcher, CODE_LEN},
    dto::UpdateProfileRequest,
    repo::UserRepository,
    repo_types::{LookupField, NewUser, Profile},
    validators::parse_birth_date,
};
use crate::{
    auth::{
        jwt::TokenService,
        password::{CredentialHasher, SALT_LEN},
    },
    cache::profile::ProfileCache,
    error::AccountError,
};

/// Account lifecycle: creation, login, confirmation and self-service
/// profile management.
///
/// Accounts start pending (`enabled = false`) and become active once the
/// confirmation code mailed at creation is presented. An authenticated
/// identity may only read, update or delete its own record.
pub struct AccountService {
    repo: Arc<dyn UserRepository>,
    hasher: Arc<CredentialHasher>,
    tokens: TokenService,
    profiles: ProfileCache,
    dispatcher: ConfirmationDispatcher,
    deadline: Duration,
}

impl AccountService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        hasher: Arc<CredentialHasher>,
        tokens: TokenService,
        profiles: ProfileCache,
        dispatcher: ConfirmationDispatcher,
        deadline: Duration,
    ) -> Self {
        Self {
            repo,
            hasher,
            tokens,
            profiles,
            dispatcher,
            deadline,
        }
    }

    async fn within<T, E, F>(&self, what: &'static str, fut: F) -> Result<T, AccountError>
    where
        F: Future<Output = Result<T, E>>,
        AccountError: From<E>,
    {
        match timeout(self.deadline, fut).await {
            Ok(res) => res.map_err(AccountError::from),
            Err(_) => Err(AccountError::Internal(anyhow::anyhow!("{what} timed out"))),
        }
    }

    // scrypt is CPU-bound; run it on the blocking pool
    async fn hash_password(
        &self,
        password: &str,
        salt: [u8; SALT_LEN],
    ) -> Result<Vec<u8>, AccountError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let verifier = tokio::task::spawn_blocking(move || hasher.hash(&password, &salt))
            .await
            .context("hashing task failed")??;
        Ok(verifier)
    }

    async fn verify_password(
        &self,
        password: &str,
        verifier: Vec<u8>,
        salt: Vec<u8>,
    ) -> Result<bool, AccountError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&password, &verifier, &salt))
            .await
            .context("verification task failed")?;
        Ok(ok)
    }

    /// Runs once a write has been attempted, whatever its outcome: a write
    /// that timed out may still have committed. Failure leaves a stale entry
    /// until its TTL expires but does not undo the write.
    async fn invalidate_after_write(&self, user_id: i64) {
        if let Err(e) = self.profiles.invalidate(user_id).await {
            error!(user_id, error = %e, "profile cache invalidation failed after write");
        }
    }

    #[instrument(skip(self, password))]
    pub async fn create(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<String, AccountError> {
        let taken = self
            .within(
                "email lookup",
                self.repo.exists_by_field(LookupField::Email, email),
            )
            .await?;
        if taken {
            warn!("email already registered");
            return Err(AccountError::UserExists);
        }

        let salt = self.hasher.generate_salt()?;
        let verifier = self.hash_password(password, salt).await?;
        let confirmation_code = generate_confirmation_code()?;

        let new_user = NewUser {
            name: name.to_owned(),
            email: email.to_owned(),
            password_verifier: verifier,
            salt: salt.to_vec(),
            confirmation_code,
        };
        let user = self
            .within("insert user", self.repo.create(new_user))
            .await
            .inspect_err(|e| {
                if matches!(e, AccountError::UserExists) {
                    warn!("concurrent registration lost the unique constraint race");
                }
            })?;

        let token = self.tokens.issue(user.id)?;

        if let Err(e) = self
            .dispatcher
            .publish(&user.name, &user.email, &user.confirmation_code)
            .await
        {
            error!(user_id = user.id, error = %e, "user persisted but confirmation dispatch failed");
            return Err(AccountError::Dispatch(e));
        }

        info!(user_id = user.id, "user created");
        Ok(token)
    }

    #[instrument(skip(self, password))]
    pub async fn authorize(&self, email: &str, password: &str) -> Result<String, AccountError> {
        let user = self
            .within(
                "find user by email",
                self.repo.find_by_field(LookupField::Email, email),
            )
            .await
            .inspect_err(|_| warn!("login for unknown email"))?;

        let ok = self
            .verify_password(password, user.password_verifier.clone(), user.salt.clone())
            .await?;
        if !ok {
            warn!(user_id = user.id, "login invalid password");
            return Err(AccountError::InvalidPassword);
        }

        let token = self.tokens.issue(user.id)?;
        info!(user_id = user.id, "user logged in");
        Ok(token)
    }

    #[instrument(skip(self, info))]
    pub async fn update_profile(
        &self,
        target_id: i64,
        auth_id: i64,
        info: UpdateProfileRequest,
    ) -> Result<(), AccountError> {
        if target_id != auth_id {
            warn!("update of another user's profile refused");
            return Err(AccountError::Forbidden);
        }

        let mut user = self
            .within("find user by id", self.repo.find_by_id(target_id))
            .await?;

        let birth_date = info
            .birth_date
            .as_deref()
            .map(parse_birth_date)
            .transpose()?;

        user.name = info.name;
        user.bio = info.bio;
        user.avatar = info.avatar;
        user.birth_date = birth_date;

        let saved = self.within("save user", self.repo.save(&user)).await;
        self.invalidate_after_write(user.id).await;
        saved?;

        info!(user_id = user.id, "profile updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, target_id: i64, auth_id: i64) -> Result<Profile, AccountError> {
        if target_id != auth_id {
            warn!("read of another user's profile refused");
            return Err(AccountError::Forbidden);
        }

        self.profiles
            .get_profile(target_id, || async {
                self.within("find user by id", self.repo.find_by_id(target_id))
                    .await
                    .map(|user| user.profile())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_account(&self, target_id: i64, auth_id: i64) -> Result<(), AccountError> {
        if target_id != auth_id {
            warn!("deletion of another user refused");
            return Err(AccountError::Forbidden);
        }

        let user = self
            .within("find user by id", self.repo.find_by_id(target_id))
            .await?;
        let deleted = self.within("delete user", self.repo.delete(&user)).await;
        self.invalidate_after_write(user.id).await;
        deleted?;

        info!(user_id = user.id, "user deleted");
        Ok(())
    }

    /// Exchanges a confirmation code for an enabled account and a session.
    /// Repeating it with the same code is a no-op that still issues a token.
    #[instrument(skip_all)]
    pub async fn enable(&self, code: &str) -> Result<String, AccountError> {
        if code.chars().count() != CODE_LEN {
            return Err(AccountError::Unprocessable(
                "confirmation code has wrong length".into(),
            ));
        }

        let mut user = self
            .within(
                "find user by code",
                self.repo.find_by_field(LookupField::ConfirmationCode, code),
            )
            .await?;

        if !user.enabled {
            user.enabled = true;
            let saved = self.within("save user", self.repo.save(&user)).await;
            self.invalidate_after_write(user.id).await;
            saved?;
            info!(user_id = user.id, "user enabled");
        }

        let token = self.tokens.issue(user.id)?;
        Ok(token)
    }
}
