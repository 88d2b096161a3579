use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use super::repo_types::{LookupField, NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated")]
    Conflict,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Source of truth for user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_field(&self, field: LookupField, value: &str) -> Result<User, RepoError>;
    async fn find_by_id(&self, id: i64) -> Result<User, RepoError>;
    async fn create(&self, user: NewUser) -> Result<User, RepoError>;
    async fn save(&self, user: &User) -> Result<(), RepoError>;
    async fn delete(&self, user: &User) -> Result<(), RepoError>;
    async fn exists_by_field(&self, field: LookupField, value: &str) -> Result<bool, RepoError>;
}

const USER_COLUMNS: &str = "id, name, email, password_verifier, salt, bio, avatar, birth_date, \
                            enabled, confirmation_code";

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn classify(e: sqlx::Error, what: &'static str) -> RepoError {
    match e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
        other => RepoError::Backend(anyhow::Error::new(other).context(what)),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_field(&self, field: LookupField, value: &str) -> Result<User, RepoError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1",
            field.column()
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| classify(e, "find user by field"))?
            .ok_or(RepoError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> Result<User, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| classify(e, "find user by id"))?
            .ok_or(RepoError::NotFound)
    }

    async fn create(&self, user: NewUser) -> Result<User, RepoError> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_verifier, salt, confirmation_code)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_verifier)
            .bind(&user.salt)
            .bind(&user.confirmation_code)
            .fetch_one(&self.db)
            .await
            .map_err(|e| classify(e, "insert user"))
    }

    async fn save(&self, user: &User) -> Result<(), RepoError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET name = $2, bio = $3, avatar = $4, birth_date = $5, enabled = $6
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.bio)
        .bind(&user.avatar)
        .bind(user.birth_date)
        .bind(user.enabled)
        .execute(&self.db)
        .await
        .map_err(|e| classify(e, "update user"))?;

        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, user: &User) -> Result<(), RepoError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await
            .map_err(|e| classify(e, "delete user"))?;

        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn exists_by_field(&self, field: LookupField, value: &str) -> Result<bool, RepoError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM users WHERE {} = $1)",
            field.column()
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(value)
            .fetch_one(&self.db)
            .await
            .context("check user existence")?;
        Ok(exists)
    }
}
