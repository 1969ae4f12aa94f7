use chrono::Utc;
use serde::Serialize;

use crate::accounts::domain::{
    AccountError, ActivationKey, Profile, ProfileEdit, Registration, User, UserId,
};
use crate::accounts::repository::DynAccountRepository;
use crate::auth::password::{hash_password, verify_password};
use crate::config::AuthConfig;
use crate::gallery::Gallery;

/// What a completed registration produced.
#[derive(Debug)]
pub struct Registered {
    pub user: User,
    /// `None` when provisioning failed; the user exists regardless.
    pub profile: Option<Profile>,
    pub activation_key: ActivationKey,
}

#[derive(Debug, Serialize)]
pub struct Account {
    pub user: User,
    pub profile: Profile,
}

/// Account lifecycle: registration, activation, login, deletion, and the
/// profile that rides along with each user.
#[derive(Clone)]
pub struct Accounts {
    repo: DynAccountRepository,
    gallery: Gallery,
    settings: AuthConfig,
}

impl Accounts {
    pub fn new(repo: DynAccountRepository, gallery: Gallery, settings: AuthConfig) -> Self {
        Self {
            repo,
            gallery,
            settings,
        }
    }

    pub async fn register(&self, registration: Registration) -> Result<Registered, AccountError> {
        let new = registration.validate()?;
        if self.repo.user_by_username(&new.username).await?.is_some() {
            return Err(AccountError::Conflict(format!(
                "a user with username '{}' already exists",
                new.username
            )));
        }

        let expires_at = self.settings.activation_expiry().ok_or_else(|| {
            AccountError::Misconfigured(format!(
                "activation lifetime of {} days is out of range",
                self.settings.activation_days
            ))
        })?;
        let hash = hash_password(&new.password, self.settings.bcrypt_cost)?;
        let user = self.repo.create_user(&new, &hash).await?;
        let profile = self.provision_profile(user.id).await;

        let activation_key = ActivationKey::generate();
        self.repo
            .store_activation_key(user.id, &activation_key, expires_at)
            .await?;

        // No mail transport; the link goes to the log.
        tracing::info!(
            user = %user.id,
            email = %user.email,
            "Activation link: /accounts/activate/{}",
            activation_key.as_str()
        );

        Ok(Registered {
            user,
            profile,
            activation_key,
        })
    }

    pub async fn activate(&self, key: &str) -> Result<User, AccountError> {
        let id = self
            .repo
            .consume_activation_key(key, Utc::now())
            .await?
            .ok_or(AccountError::NotFound("activation key"))?;
        self.repo.set_active(id, true).await?;
        let user = self
            .repo
            .user(id)
            .await?
            .ok_or(AccountError::NotFound("user"))?;
        tracing::info!(user = %user.id, "Account activated");
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, AccountError> {
        let user = self
            .repo
            .user_by_username(username.trim())
            .await?
            .ok_or(AccountError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            return Err(AccountError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AccountError::Inactive);
        }
        Ok(user)
    }

    /// Deactivate, drop the profile, then delete the user. Photos, albums and
    /// sessions go with the user row.
    pub async fn delete_account(&self, id: UserId) -> Result<(), AccountError> {
        if !self.repo.set_active(id, false).await? {
            return Err(AccountError::NotFound("user"));
        }
        if let Err(e) = self.repo.remove_profile(id).await {
            tracing::warn!(user = %id, "Failed to remove profile: {}", e);
        }
        self.repo.delete_user(id).await?;
        tracing::info!(user = %id, "Account deleted");
        Ok(())
    }

    pub async fn account(&self, id: UserId) -> Result<Account, AccountError> {
        let user = self
            .repo
            .user(id)
            .await?
            .ok_or(AccountError::NotFound("user"))?;
        let profile = self.profile(id).await?;
        Ok(Account { user, profile })
    }

    pub async fn profile(&self, id: UserId) -> Result<Profile, AccountError> {
        self.repo
            .profile(id)
            .await?
            .ok_or(AccountError::NotFound("profile"))
    }

    pub async fn edit_profile(&self, id: UserId, edit: ProfileEdit) -> Result<Account, AccountError> {
        let Account {
            mut user,
            mut profile,
        } = self.account(id).await?;

        edit.apply_to_user(&mut user)?;
        edit.apply_to_profile(&mut profile);
        if let Some(photo) = edit.fav_photo {
            self.gallery.visible_to(id, photo).await?;
            profile.fav_photo_id = Some(photo);
        }

        self.repo.save_user(&user).await?;
        self.repo.save_profile(&profile).await?;
        Ok(Account { user, profile })
    }

    pub async fn add_friend(&self, id: UserId, other: UserId) -> Result<Vec<Profile>, AccountError> {
        if self.repo.add_friend(id, other).await? {
            tracing::info!(user = %id, friend = %other, "Friendship added");
        }
        self.repo.friends(id).await
    }

    pub async fn friends(&self, id: UserId) -> Result<Vec<Profile>, AccountError> {
        self.profile(id).await?;
        self.repo.friends(id).await
    }

    pub async fn active_profiles(&self) -> Result<Vec<Profile>, AccountError> {
        self.repo.active_profiles().await
    }

    pub async fn active_profile_count(&self) -> Result<i64, AccountError> {
        self.repo.active_profile_count().await
    }

    async fn provision_profile(&self, id: UserId) -> Option<Profile> {
        match self.repo.ensure_profile(id).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::error!(user = %id, "Failed to provision profile: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::domain::NewUser;
    use crate::accounts::repository::{AccountRepository, SqliteAccountRepository};
    use crate::db;
    use crate::gallery::domain::Fields;
    use crate::gallery::service::NewPhoto;
    use crate::gallery::{SqliteGalleryRepository, Viewer, Visibility};
    use crate::state::DbPool;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Arc;

    fn settings() -> AuthConfig {
        AuthConfig {
            bcrypt_cost: 4,
            ..Default::default()
        }
    }

    fn setup_with(repo: DynAccountRepository, pool: DbPool) -> (Accounts, Gallery) {
        let gallery = Gallery::new(Arc::new(SqliteGalleryRepository::new(pool)));
        (Accounts::new(repo, gallery.clone(), settings()), gallery)
    }

    fn setup() -> (Accounts, Gallery) {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        setup_with(Arc::new(SqliteAccountRepository::new(pool.clone())), pool)
    }

    fn registration(username: &str) -> Registration {
        Registration {
            username: username.into(),
            email: format!("{username}@example.com"),
            password1: "correct horse".into(),
            password2: "correct horse".into(),
        }
    }

    async fn active_user(accounts: &Accounts, username: &str) -> User {
        let registered = accounts.register(registration(username)).await.unwrap();
        accounts
            .activate(registered.activation_key.as_str())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn registration_creates_inactive_user_with_profile() {
        let (accounts, _) = setup();
        let registered = accounts.register(registration("alice")).await.unwrap();
        assert!(!registered.user.is_active);
        let profile = registered.profile.unwrap();
        assert_eq!(profile.user_id, registered.user.id);
        assert_eq!(accounts.active_profile_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn activation_counts_the_profile_and_enables_login() {
        let (accounts, _) = setup();
        let registered = accounts.register(registration("alice")).await.unwrap();

        let err = accounts.login("alice", "correct horse").await.unwrap_err();
        assert!(matches!(err, AccountError::Inactive));

        let user = accounts
            .activate(registered.activation_key.as_str())
            .await
            .unwrap();
        assert!(user.is_active);
        assert_eq!(accounts.active_profile_count().await.unwrap(), 1);
        let active = accounts.active_profiles().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].username, "alice");
        assert!(accounts.login("alice", "correct horse").await.is_ok());

        let err = accounts
            .activate(registered.activation_key.as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound(_)));
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let (accounts, _) = setup();
        active_user(&accounts, "alice").await;
        for (user, pass) in [("alice", "wrong password"), ("nobody", "correct horse")] {
            let err = accounts.login(user, pass).await.unwrap_err();
            assert!(matches!(err, AccountError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn unrepresentable_activation_lifetime_fails_cleanly() {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let repo: DynAccountRepository = Arc::new(SqliteAccountRepository::new(pool.clone()));
        let gallery = Gallery::new(Arc::new(SqliteGalleryRepository::new(pool)));
        let accounts = Accounts::new(
            repo.clone(),
            gallery,
            AuthConfig {
                activation_days: u64::MAX,
                ..settings()
            },
        );

        let err = accounts.register(registration("alice")).await.unwrap_err();
        assert!(matches!(err, AccountError::Misconfigured(_)));
        assert!(repo.user_by_username("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (accounts, _) = setup();
        accounts.register(registration("alice")).await.unwrap();
        let err = accounts.register(registration("alice")).await.unwrap_err();
        assert!(matches!(err, AccountError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_account_removes_profile_from_active_count() {
        let (accounts, _) = setup();
        let alice = active_user(&accounts, "alice").await;
        active_user(&accounts, "bob").await;
        assert_eq!(accounts.active_profile_count().await.unwrap(), 2);

        accounts.delete_account(alice.id).await.unwrap();
        assert_eq!(accounts.active_profile_count().await.unwrap(), 1);
        assert!(matches!(
            accounts.profile(alice.id).await,
            Err(AccountError::NotFound(_))
        ));
        assert!(matches!(
            accounts.delete_account(alice.id).await,
            Err(AccountError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn friends_are_symmetric() {
        let (accounts, _) = setup();
        let alice = active_user(&accounts, "alice").await;
        let bob = active_user(&accounts, "bob").await;

        let friends = accounts.add_friend(alice.id, bob.id).await.unwrap();
        assert_eq!(friends.len(), 1);
        let of_bob = accounts.friends(bob.id).await.unwrap();
        assert_eq!(of_bob[0].user_id, alice.id);
    }

    #[tokio::test]
    async fn favorite_photo_must_be_visible_to_the_owner() {
        let (accounts, gallery) = setup();
        let alice = active_user(&accounts, "alice").await;
        let bob = active_user(&accounts, "bob").await;
        let upload = |title: &str, visibility| NewPhoto {
            fields: Fields {
                title: title.into(),
                description: String::new(),
                visibility,
            },
            image_path: format!("{title}.jpg"),
            albums: vec![],
        };
        let private = gallery
            .upload_photo(&Viewer::User(bob.id), upload("mine", Visibility::Private))
            .await
            .unwrap();
        let public = gallery
            .upload_photo(&Viewer::User(bob.id), upload("ours", Visibility::Public))
            .await
            .unwrap();

        let err = accounts
            .edit_profile(
                alice.id,
                ProfileEdit {
                    fav_photo: Some(private.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Gallery(_)));

        let account = accounts
            .edit_profile(
                alice.id,
                ProfileEdit {
                    fav_photo: Some(public.id),
                    location: Some("Porto".into()),
                    last_name: Some("Liddell".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(account.profile.fav_photo_id, Some(public.id));
        assert_eq!(account.profile.location.as_deref(), Some("Porto"));
        assert_eq!(account.user.last_name, "Liddell");
    }

    /// Delegates to SQLite but refuses to create profiles.
    struct NoProfiles(SqliteAccountRepository);

    #[async_trait]
    impl AccountRepository for NoProfiles {
        async fn create_user(
            &self,
            user: &NewUser,
            password_hash: &str,
        ) -> Result<User, AccountError> {
            self.0.create_user(user, password_hash).await
        }
        async fn user(&self, id: UserId) -> Result<Option<User>, AccountError> {
            self.0.user(id).await
        }
        async fn user_by_username(&self, username: &str) -> Result<Option<User>, AccountError> {
            self.0.user_by_username(username).await
        }
        async fn set_active(&self, id: UserId, active: bool) -> Result<bool, AccountError> {
            self.0.set_active(id, active).await
        }
        async fn save_user(&self, user: &User) -> Result<(), AccountError> {
            self.0.save_user(user).await
        }
        async fn delete_user(&self, id: UserId) -> Result<bool, AccountError> {
            self.0.delete_user(id).await
        }
        async fn ensure_profile(&self, _user: UserId) -> Result<Profile, AccountError> {
            Err(AccountError::Validation("profiles are disabled".into()))
        }
        async fn remove_profile(&self, user: UserId) -> Result<bool, AccountError> {
            self.0.remove_profile(user).await
        }
        async fn profile(&self, user: UserId) -> Result<Option<Profile>, AccountError> {
            self.0.profile(user).await
        }
        async fn save_profile(&self, profile: &Profile) -> Result<(), AccountError> {
            self.0.save_profile(profile).await
        }
        async fn add_friend(&self, user: UserId, other: UserId) -> Result<bool, AccountError> {
            self.0.add_friend(user, other).await
        }
        async fn friends(&self, user: UserId) -> Result<Vec<Profile>, AccountError> {
            self.0.friends(user).await
        }
        async fn active_profiles(&self) -> Result<Vec<Profile>, AccountError> {
            self.0.active_profiles().await
        }
        async fn active_profile_count(&self) -> Result<i64, AccountError> {
            self.0.active_profile_count().await
        }
        async fn store_activation_key(
            &self,
            user: UserId,
            key: &ActivationKey,
            expires_at: DateTime<Utc>,
        ) -> Result<(), AccountError> {
            self.0.store_activation_key(user, key, expires_at).await
        }
        async fn consume_activation_key(
            &self,
            key: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<UserId>, AccountError> {
            self.0.consume_activation_key(key, now).await
        }
    }

    #[tokio::test]
    async fn failed_profile_provisioning_still_registers() {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let repo = Arc::new(NoProfiles(SqliteAccountRepository::new(pool.clone())));
        let (accounts, _) = setup_with(repo, pool);

        let registered = accounts.register(registration("alice")).await.unwrap();
        assert!(registered.profile.is_none());

        let user = accounts
            .activate(registered.activation_key.as_str())
            .await
            .unwrap();
        assert!(user.is_active);
        assert_eq!(accounts.active_profile_count().await.unwrap(), 0);
    }
}
