use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::accounts::{Account, Profile, ProfileEdit};
use crate::db::models::UserId;
use crate::error::AppResult;
use crate::extractors::{CurrentUser, JsonBody, PathParam};
use crate::gallery::Visibility;
use crate::routes::accounts::clear_session_cookie;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(show).delete(delete_account))
        .route("/profile/edit", post(edit))
        .route("/profile/friends", get(friends))
        .route("/profile/friends/{user_id}", post(add_friend))
        .route("/profiles/active", get(active))
}

/// Per-visibility tally of the owner's photos or albums.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct Counts {
    pub private: usize,
    pub shared: usize,
    pub public: usize,
}

impl Counts {
    fn tally(visibilities: impl Iterator<Item = Visibility>) -> Self {
        visibilities.fold(Counts::default(), |mut counts, visibility| {
            match visibility {
                Visibility::Private => counts.private += 1,
                Visibility::Shared => counts.shared += 1,
                Visibility::Public => counts.public += 1,
            }
            counts
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ActiveProfiles {
    pub count: i64,
    pub profiles: Vec<Profile>,
}

#[derive(Debug, Serialize)]
pub struct ProfilePage {
    #[serde(flatten)]
    pub account: Account,
    pub photos: Counts,
    pub albums: Counts,
}

/// GET /profile - own user, profile and library counts
pub async fn show(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<ProfilePage>> {
    let account = state.accounts.account(user.id).await?;
    let library = state.gallery.library(&user.viewer()).await?;
    Ok(Json(ProfilePage {
        account,
        photos: Counts::tally(library.photos.iter().map(|p| p.visibility)),
        albums: Counts::tally(library.albums.iter().map(|a| a.visibility)),
    }))
}

/// POST /profile/edit
pub async fn edit(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(edit): JsonBody<ProfileEdit>,
) -> AppResult<Json<Account>> {
    let account = state.accounts.edit_profile(user.id, edit).await?;
    Ok(Json(account))
}

/// DELETE /profile - delete the account along with its photos and albums
pub async fn delete_account(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Response> {
    let library = state.gallery.library(&user.viewer()).await?;
    state.accounts.delete_account(user.id).await?;
    for photo in &library.photos {
        state.media.remove(&photo.image_path).await;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(&state.config.auth))],
    )
        .into_response())
}

/// GET /profile/friends
pub async fn friends(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.accounts.friends(user.id).await?))
}

/// POST /profile/friends/{user_id} - returns the updated friend list
pub async fn add_friend(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParam(other): PathParam<UserId>,
) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.accounts.add_friend(user.id, other).await?))
}

/// GET /profiles/active - profiles whose user is active, with their count
pub async fn active(State(state): State<AppState>) -> AppResult<Json<ActiveProfiles>> {
    let count = state.accounts.active_profile_count().await?;
    let profiles = state.accounts.active_profiles().await?;
    Ok(Json(ActiveProfiles { count, profiles }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_tally_by_visibility() {
        let counts = Counts::tally(
            [
                Visibility::Public,
                Visibility::Private,
                Visibility::Public,
                Visibility::Shared,
            ]
            .into_iter(),
        );
        assert_eq!(
            counts,
            Counts {
                private: 1,
                shared: 1,
                public: 2
            }
        );
    }
}
