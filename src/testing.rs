//! In-memory stand-ins for the repository, cache and broker.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    accounts::{
        confirmation::ConfirmationDispatcher,
        repo::{RepoError, UserRepository},
        repo_types::{LookupField, NewUser, User},
        services::AccountService,
    },
    auth::{jwt::TokenService, password::CredentialHasher},
    broker::MessagePublisher,
    cache::{profile::ProfileCache, CacheClient},
    config::{JwtConfig, MailerConfig},
};

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<i64, User>>,
    next_id: AtomicUsize,
    hide_existing: AtomicBool,
    find_by_id_calls: AtomicUsize,
    save_calls: AtomicUsize,
    stall_after_write: Mutex<Option<Duration>>,
}

impl MemoryUserRepository {
    pub fn all(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.lock().unwrap().values().cloned().collect();
        users.sort_by_key(|u| u.id);
        users
    }

    /// Makes `exists_by_field` answer `false`, as a racing writer would see it.
    pub fn hide_existing(&self, on: bool) {
        self.hide_existing.store(on, Ordering::SeqCst);
    }

    pub fn find_by_id_calls(&self) -> usize {
        self.find_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Makes `save` and `delete` apply their change and then hang for `delay`,
    /// like a commit whose acknowledgement is lost.
    pub fn stall_after_write(&self, delay: Duration) {
        *self.stall_after_write.lock().unwrap() = Some(delay);
    }

    async fn stall(&self) {
        let delay = *self.stall_after_write.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn field_of(user: &User, field: LookupField) -> &str {
    match field {
        LookupField::Email => &user.email,
        LookupField::ConfirmationCode => &user.confirmation_code,
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_field(&self, field: LookupField, value: &str) -> Result<User, RepoError> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| field_of(u, field) == value)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> Result<User, RepoError> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn create(&self, new: NewUser) -> Result<User, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.email == new.email || u.confirmation_code == new.confirmation_code)
        {
            return Err(RepoError::Conflict);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        let user = User {
            id,
            name: new.name,
            email: new.email,
            password_verifier: new.password_verifier,
            salt: new.salt,
            bio: None,
            avatar: None,
            birth_date: None,
            enabled: false,
            confirmation_code: new.confirmation_code,
        };
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<(), RepoError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let res = match self.users.lock().unwrap().get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound),
        };
        self.stall().await;
        res
    }

    async fn delete(&self, user: &User) -> Result<(), RepoError> {
        let res = self
            .users
            .lock()
            .unwrap()
            .remove(&user.id)
            .map(|_| ())
            .ok_or(RepoError::NotFound);
        self.stall().await;
        res
    }

    async fn exists_by_field(&self, field: LookupField, value: &str) -> Result<bool, RepoError> {
        if self.hide_existing.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .any(|u| field_of(u, field) == value))
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Vec<u8>, Duration)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn insert_raw(&self, key: &str, value: Vec<u8>) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (value, Duration::from_secs(60)));
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Fails both `set` and `delete`.
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("cache unavailable");
        }
        Ok(self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("cache unavailable");
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), (value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("cache unavailable");
        }
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<Published>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<Published> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, on: bool) {
        self.fail.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("broker unreachable");
        }
        self.sent.lock().unwrap().push(Published {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            content_type: content_type.to_owned(),
            body,
        });
        Ok(())
    }
}

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
    }
}

pub fn test_mailer_config() -> MailerConfig {
    MailerConfig {
        exchange: "mailer_ex".into(),
        routing_key: "mailer".into(),
    }
}

/// An `AccountService` wired to in-memory collaborators, with handles kept
/// for assertions.
pub struct Harness {
    pub service: Arc<AccountService>,
    pub tokens: TokenService,
    pub repo: Arc<MemoryUserRepository>,
    pub cache: Arc<MemoryCache>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_deadline(Duration::from_secs(5))
    }

    pub fn with_deadline(deadline: Duration) -> Self {
        let repo = Arc::new(MemoryUserRepository::default());
        let cache = Arc::new(MemoryCache::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let tokens = TokenService::new(&test_jwt_config());

        let service = AccountService::new(
            repo.clone(),
            Arc::new(CredentialHasher::new("test-pepper")),
            tokens.clone(),
            ProfileCache::new(cache.clone(), deadline),
            ConfirmationDispatcher::new(publisher.clone(), &test_mailer_config(), deadline),
            deadline,
        );

        Self {
            service: Arc::new(service),
            tokens,
            repo,
            cache,
            publisher,
        }
    }
}
