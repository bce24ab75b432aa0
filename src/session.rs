use crate::{auth::AuthUser, models::Profile, queries, DbPool};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>>;
}

#[async_trait]
impl ProfileSource for DbPool {
    async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        let conn = &mut self.get().await?;
        Ok(queries::profiles::find(conn, user_id).await?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Loading,
    Unauthenticated,
    Authenticated(Profile),
}

/// The signed-in user's profile for one client session.
///
/// Transitions are serialized: a notification arriving while a profile is
/// being fetched waits for that fetch to settle.
pub struct AuthStore {
    source: Arc<dyn ProfileSource>,
    state: Mutex<AuthState>,
}

impl AuthStore {
    pub fn new(source: Arc<dyn ProfileSource>) -> AuthStore {
        AuthStore {
            source,
            state: Mutex::new(AuthState::Loading),
        }
    }

    pub async fn state(&self) -> AuthState {
        self.state.lock().await.clone()
    }

    pub async fn user(&self) -> Option<Profile> {
        match &*self.state.lock().await {
            AuthState::Authenticated(profile) => Some(profile.clone()),
            _ => None,
        }
    }

    /// Handles an auth-state-change notification. Returns whether a profile
    /// fetch was issued; the same user signing in again (token refresh) is a
    /// no-op.
    pub async fn set_auth_user(&self, auth_user: Option<&AuthUser>) -> bool {
        let mut state = self.state.lock().await;
        match auth_user {
            Some(user) => {
                if let AuthState::Authenticated(profile) = &*state {
                    if profile.id == user.id {
                        return false;
                    }
                }
                *state = self.load(user.id).await;
                true
            }
            None => {
                *state = AuthState::Unauthenticated;
                false
            }
        }
    }

    /// Re-fetches the profile even if it is already cached, e.g. after the
    /// user edited it.
    pub async fn refresh_profile(&self, auth_user: Option<&AuthUser>) {
        let mut state = self.state.lock().await;
        *state = match auth_user {
            Some(user) => self.load(user.id).await,
            None => AuthState::Unauthenticated,
        };
    }

    pub async fn sign_out(&self) {
        *self.state.lock().await = AuthState::Unauthenticated;
    }

    async fn load(&self, user_id: Uuid) -> AuthState {
        match self.source.profile(user_id).await {
            Ok(Some(profile)) => AuthState::Authenticated(profile),
            Ok(None) => {
                tracing::warn!(%user_id, "no profile for authenticated user");
                AuthState::Unauthenticated
            }
            Err(e) => {
                tracing::error!(%user_id, "failed to fetch profile: {e:#}");
                AuthState::Unauthenticated
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Default)]
    struct FakeProfiles {
        profiles: HashMap<Uuid, Profile>,
        failing: bool,
        fetch_calls: AtomicUsize,
    }

    #[async_trait]
    impl ProfileSource for FakeProfiles {
        async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                anyhow::bail!("connection reset");
            }
            Ok(self.profiles.get(&user_id).cloned())
        }
    }

    fn profile(id: Uuid, name: &str) -> Profile {
        Profile {
            id,
            full_name: Some(name.to_string()),
            bio: None,
            avatar_url: None,
            date_of_birth: None,
            phone: None,
            is_admin: false,
            created_at: chrono::Utc::now(),
        }
    }

    fn user(id: Uuid) -> AuthUser {
        AuthUser { id, email: None }
    }

    fn store_with(profiles: Vec<Profile>) -> (AuthStore, Arc<FakeProfiles>) {
        let source = Arc::new(FakeProfiles {
            profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
            ..Default::default()
        });
        (AuthStore::new(source.clone()), source)
    }

    #[tokio::test]
    async fn starts_loading_then_settles() {
        let (store, _) = store_with(vec![]);
        assert_eq!(store.state().await, AuthState::Loading);
        store.set_auth_user(None).await;
        assert_eq!(store.state().await, AuthState::Unauthenticated);

        let id = Uuid::new_v4();
        let (store, _) = store_with(vec![profile(id, "Grace")]);
        assert!(store.set_auth_user(Some(&user(id))).await);
        assert_eq!(store.user().await.unwrap().id, id);
    }

    #[tokio::test]
    async fn same_user_does_not_refetch() {
        let id = Uuid::new_v4();
        let (store, source) = store_with(vec![profile(id, "Grace")]);

        assert!(store.set_auth_user(Some(&user(id))).await);
        assert!(!store.set_auth_user(Some(&user(id))).await);
        assert!(!store.set_auth_user(Some(&user(id))).await);
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn switching_users_and_signing_out() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (store, source) = store_with(vec![profile(a, "Ada"), profile(b, "Bob")]);

        store.set_auth_user(Some(&user(a))).await;
        store.set_auth_user(Some(&user(b))).await;
        assert_eq!(store.user().await.unwrap().full_name.as_deref(), Some("Bob"));
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 2);

        store.sign_out().await;
        assert_eq!(store.state().await, AuthState::Unauthenticated);

        store.set_auth_user(Some(&user(a))).await;
        assert_eq!(store.user().await.unwrap().id, a);
    }

    #[tokio::test]
    async fn failed_or_missing_profile_looks_signed_out() {
        let source = Arc::new(FakeProfiles {
            failing: true,
            ..Default::default()
        });
        let store = AuthStore::new(source);
        assert!(store.set_auth_user(Some(&user(Uuid::new_v4()))).await);
        assert_eq!(store.state().await, AuthState::Unauthenticated);

        let (store, _) = store_with(vec![]);
        store.set_auth_user(Some(&user(Uuid::new_v4()))).await;
        assert!(store.user().await.is_none());
    }

    #[tokio::test]
    async fn refresh_always_refetches() {
        let id = Uuid::new_v4();
        let (store, source) = store_with(vec![profile(id, "Grace")]);
        store.set_auth_user(Some(&user(id))).await;
        store.refresh_profile(Some(&user(id))).await;
        assert_eq!(source.fetch_calls.load(Ordering::SeqCst), 2);
        assert!(store.user().await.is_some());
    }
}
