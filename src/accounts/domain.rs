// Account domain - registration rules, profiles, the friend relation
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::db::models::{PhotoId, User, UserId};
use crate::gallery::GalleryError;

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_USERNAME_LEN: usize = 150;

/// Sign-up form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

/// A registration that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn validate(self) -> Result<NewUser, AccountError> {
        let username = validate_username(&self.username)?;
        let email = validate_email(&self.email)?;
        if self.password1 != self.password2 {
            return Err(AccountError::Validation(
                "the two password fields didn't match".into(),
            ));
        }
        if self.password1.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(NewUser {
            username,
            email,
            password: self.password1,
        })
    }
}

pub fn validate_username(username: &str) -> Result<String, AccountError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AccountError::Validation("username is required".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AccountError::Validation(format!(
            "username must be {MAX_USERNAME_LEN} characters or fewer"
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "@.+-_".contains(c);
    if !username.chars().all(allowed) {
        return Err(AccountError::Validation(
            "username may contain only letters, digits and @/./+/-/_".into(),
        ));
    }
    Ok(username.to_string())
}

pub fn validate_email(email: &str) -> Result<String, AccountError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(email.to_string())
    } else {
        Err(AccountError::Validation("enter a valid email address".into()))
    }
}

/// Trimmed text, or `None` when blank.
pub fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub username: String,
    pub location: Option<String>,
    pub camera: Option<String>,
    pub fav_photo_id: Option<PhotoId>,
    /// Mirrors the owning user's active flag; never stored on the profile
    pub is_active: bool,
}

/// Profile page edit. `None` leaves a field alone; blank text clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileEdit {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub camera: Option<String>,
    pub fav_photo: Option<PhotoId>,
    pub clear_fav_photo: bool,
}

impl ProfileEdit {
    /// Apply the user-level fields, validating the email if it changes.
    pub fn apply_to_user(&self, user: &mut User) -> Result<(), AccountError> {
        if let Some(first) = &self.first_name {
            user.first_name = first.trim().to_string();
        }
        if let Some(last) = &self.last_name {
            user.last_name = last.trim().to_string();
        }
        if let Some(email) = &self.email {
            user.email = validate_email(email)?;
        }
        Ok(())
    }

    /// Apply the text fields of the profile. The favorite photo needs a
    /// visibility check and is handled by the caller.
    pub fn apply_to_profile(&self, profile: &mut Profile) {
        if let Some(location) = &self.location {
            profile.location = optional_text(location);
        }
        if let Some(camera) = &self.camera {
            profile.camera = optional_text(camera);
        }
        if self.clear_fav_photo {
            profile.fav_photo_id = None;
        }
    }
}

/// Storage key for the friendship between `a` and `b`: smaller id first, so
/// one row serves both directions.
pub fn friendship_pair(a: UserId, b: UserId) -> Result<(UserId, UserId), AccountError> {
    if a == b {
        return Err(AccountError::Validation(
            "a profile cannot befriend itself".into(),
        ));
    }
    Ok(if a < b { (a, b) } else { (b, a) })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationKey(pub String);

impl ActivationKey {
    pub fn generate() -> Self {
        let bytes: [u8; 20] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is not active")]
    Inactive,

    #[error("misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Gallery(#[from] GalleryError),

    #[error("Password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registration() -> Registration {
        Registration {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password1: "correct horse".into(),
            password2: "correct horse".into(),
        }
    }

    #[test]
    fn valid_registration_passes() {
        let user = registration().validate().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.password, "correct horse");
    }

    #[test]
    fn mismatched_passwords_are_rejected() {
        let reg = Registration {
            password2: "something else".into(),
            ..registration()
        };
        let err = reg.validate().unwrap_err();
        assert!(err.to_string().contains("didn't match"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        let reg = Registration {
            password1: "short".into(),
            password2: "short".into(),
            ..registration()
        };
        assert!(matches!(reg.validate(), Err(AccountError::Validation(_))));
    }

    #[test]
    fn bad_emails_are_rejected() {
        for email in ["", "alice", "alice@", "@example.com", "a@b@c.com", "a@localhost", "a@.com"] {
            assert!(validate_email(email).is_err(), "accepted {email:?}");
        }
        assert!(validate_email(" alice@example.com ").is_ok());
    }

    #[test]
    fn usernames_follow_the_allowed_charset() {
        assert!(validate_username("alice.b+c@d-e_f").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
    }

    #[test]
    fn friendship_pair_is_ordered_and_symmetric() {
        let (a, b) = (UserId(3), UserId(9));
        assert_eq!(friendship_pair(a, b).unwrap(), (a, b));
        assert_eq!(friendship_pair(b, a).unwrap(), (a, b));
        assert!(friendship_pair(a, a).is_err());
    }

    #[test]
    fn activation_keys_are_random_hex() {
        let k1 = ActivationKey::generate();
        let k2 = ActivationKey::generate();
        assert_eq!(k1.as_str().len(), 40);
        assert!(k1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(k1, k2);
    }

    #[test]
    fn profile_edit_blank_text_clears_fields() {
        let mut profile = Profile {
            user_id: UserId(1),
            username: "alice".into(),
            location: Some("Seattle".into()),
            camera: Some("Leica".into()),
            fav_photo_id: Some(PhotoId(4)),
            is_active: true,
        };
        let edit = ProfileEdit {
            location: Some("   ".into()),
            clear_fav_photo: true,
            ..Default::default()
        };
        edit.apply_to_profile(&mut profile);
        assert_eq!(profile.location, None);
        assert_eq!(profile.camera.as_deref(), Some("Leica"));
        assert_eq!(profile.fav_photo_id, None);
    }

    #[test]
    fn profile_edit_validates_new_email() {
        let mut user = User {
            id: UserId(1),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            date_joined: Utc::now(),
        };
        let edit = ProfileEdit {
            first_name: Some(" Alice ".into()),
            email: Some("nope".into()),
            ..Default::default()
        };
        assert!(edit.apply_to_user(&mut user).is_err());

        let edit = ProfileEdit {
            first_name: Some(" Alice ".into()),
            ..Default::default()
        };
        edit.apply_to_user(&mut user).unwrap();
        assert_eq!(user.first_name, "Alice");
    }
}
