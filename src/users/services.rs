use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::users::{
    password::hash_password,
    repo::{StoreError, UserStore},
    repo_types::User,
};

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Validated input for a new user. `password` is plaintext until hashed.
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Incoming update fields. An empty string means "keep the stored value".
#[derive(Default)]
pub struct UserChanges {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Business rules for the user lifecycle: id minting, password hashing,
/// timestamps and the update merge.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all)]
    pub async fn create_user(&self, new_user: NewUser) -> Result<User, UserError> {
        let password_hash = hash_in_background(new_user.password).await?;
        let now = now_utc();
        let user = User {
            id: Uuid::new_v4(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email,
            password_hash,
            created_at: now,
            updated_at: now,
        };

        self.store.create(&user).await?;
        debug!(user_id = %user.id, "user persisted");
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        Ok(self.store.get_by_id(id).await?)
    }

    /// Overlay non-empty `changes` onto `user`. A supplied password is hashed
    /// before it replaces the stored hash.
    pub async fn merge_changes(&self, mut user: User, changes: UserChanges) -> Result<User, UserError> {
        if !changes.first_name.is_empty() {
            user.first_name = changes.first_name;
        }
        if !changes.last_name.is_empty() {
            user.last_name = changes.last_name;
        }
        if !changes.email.is_empty() {
            user.email = changes.email;
        }
        if !changes.password.is_empty() {
            user.password_hash = hash_in_background(changes.password).await?;
        }
        Ok(user)
    }

    /// Persist an already merged record, refreshing `updated_at`.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn update_user(&self, mut user: User) -> Result<User, UserError> {
        user.updated_at = next_updated_at(user.updated_at);
        self.store.update(&user).await?;
        debug!("user updated");
        Ok(user)
    }
}

async fn hash_in_background(plain: String) -> Result<String, UserError> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| UserError::Hashing(e.to_string()))?
        .map_err(|e| UserError::Hashing(e.to_string()))
}

// Postgres keeps microseconds; anything finer would not survive a round trip.
fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

fn next_updated_at(previous: OffsetDateTime) -> OffsetDateTime {
    let now = now_utc();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{password::verify_password, repo::memory::MemoryUserStore};

    fn service() -> (UserService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (UserService::new(store.clone()), store)
    }

    fn ivan() -> NewUser {
        NewUser {
            first_name: "Ivan".into(),
            last_name: "Ivanov".into(),
            email: "ivan@example.com".into(),
            password: "password123".into(),
        }
    }

    fn john() -> User {
        let now = now_utc();
        User {
            id: Uuid::new_v4(),
            first_name: "John".into(),
            last_name: "Doe".into(),
            email: "johndoe@example.com".into(),
            password_hash: hash_password("hashedPassword123").expect("hash"),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_user_mints_id_hashes_password_and_stamps_times() {
        let (svc, store) = service();
        let user = svc.create_user(ivan()).await.expect("create");

        assert_eq!(user.first_name, "Ivan");
        assert_eq!(user.last_name, "Ivanov");
        assert_eq!(user.email, "ivan@example.com");
        assert_eq!(user.id.to_string().len(), 36);
        assert_eq!(user.id.get_version_num(), 4);
        assert_ne!(user.password_hash, "password123");
        assert!(verify_password("password123", &user.password_hash).expect("verify"));
        assert_eq!(user.created_at, user.updated_at);
        assert!(OffsetDateTime::now_utc() - user.created_at < Duration::minutes(1));

        assert_eq!(store.row(user.id), Some(user));
    }

    #[tokio::test]
    async fn create_user_never_reuses_an_id() {
        let (svc, _) = service();
        let a = svc.create_user(ivan()).await.expect("first");
        let b = svc.create_user(ivan()).await.expect("second");
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn create_user_propagates_storage_failure() {
        let store = Arc::new(MemoryUserStore::failing());
        let svc = UserService::new(store.clone());
        let err = svc.create_user(ivan()).await.unwrap_err();
        assert!(matches!(err, UserError::Storage(StoreError::Insert(_))));
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn get_user_by_id_passes_through_found_absent_and_error() {
        let (svc, store) = service();
        let user = john();
        store.insert(user.clone());

        let found = svc.get_user_by_id(user.id).await.expect("lookup");
        assert_eq!(found, Some(user.clone()));

        let absent = svc.get_user_by_id(Uuid::new_v4()).await.expect("lookup");
        assert!(absent.is_none());

        store.set_failing(true);
        let err = svc.get_user_by_id(user.id).await.unwrap_err();
        assert!(matches!(err, UserError::Storage(StoreError::Select(_))));
    }

    #[tokio::test]
    async fn merge_keeps_empty_fields_and_overwrites_the_rest() {
        let (svc, _) = service();
        let user = john();
        let changes = UserChanges {
            first_name: "Jonathan".into(),
            ..Default::default()
        };

        let merged = svc.merge_changes(user.clone(), changes).await.expect("merge");
        assert_eq!(merged.first_name, "Jonathan");
        assert_eq!(merged.last_name, user.last_name);
        assert_eq!(merged.email, user.email);
        assert_eq!(merged.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn merge_hashes_a_new_password() {
        let (svc, _) = service();
        let user = john();
        let changes = UserChanges {
            password: "new-password-456".into(),
            ..Default::default()
        };

        let merged = svc.merge_changes(user.clone(), changes).await.expect("merge");
        assert_ne!(merged.password_hash, user.password_hash);
        assert_ne!(merged.password_hash, "new-password-456");
        assert!(verify_password("new-password-456", &merged.password_hash).expect("verify"));
    }

    #[tokio::test]
    async fn update_user_refreshes_updated_at_only() {
        let (svc, store) = service();
        let user = john();
        store.insert(user.clone());

        let mut changed = user.clone();
        changed.first_name = "Jonathan".into();
        let updated = svc.update_user(changed).await.expect("update");

        assert_eq!(updated.first_name, "Jonathan");
        assert_eq!(updated.created_at, user.created_at);
        assert!(updated.updated_at > user.updated_at);
        assert_eq!(store.row(user.id), Some(updated));
    }

    #[tokio::test]
    async fn updated_at_moves_forward_even_when_the_clock_lags() {
        let (svc, store) = service();
        let mut user = john();
        user.updated_at = now_utc() + Duration::hours(1);
        store.insert(user.clone());

        let updated = svc.update_user(user.clone()).await.expect("update");
        assert_eq!(updated.updated_at, user.updated_at + Duration::microseconds(1));
    }

    #[tokio::test]
    async fn update_user_propagates_storage_failure() {
        let store = Arc::new(MemoryUserStore::failing());
        let svc = UserService::new(store);
        let err = svc.update_user(john()).await.unwrap_err();
        assert!(matches!(err, UserError::Storage(StoreError::Update(_))));
    }

    #[test]
    fn timestamps_carry_whole_microseconds() {
        assert_eq!(now_utc().nanosecond() % 1_000, 0);
    }
}
