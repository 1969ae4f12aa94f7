use crate::gallery::domain::{GalleryError, Owned, UserId, Visibility};

/// Whoever a request runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(UserId),
}

impl Viewer {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(*id),
        }
    }

    pub fn is_owner(&self, owner: UserId) -> bool {
        self.user_id() == Some(owner)
    }
}

impl From<Option<UserId>> for Viewer {
    fn from(id: Option<UserId>) -> Self {
        id.map_or(Viewer::Anonymous, Viewer::User)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Create,
    Edit,
    Delete,
}

/// SQL predicate equivalent to `permits(viewer, owner_id, visibility, Read)`.
/// Bind the viewer's id (or NULL for anonymous) as `?1`.
pub const READ_FILTER: &str = "(visibility = 'public' OR owner_id = ?1)";

pub fn permits(
    viewer: &Viewer,
    owner: UserId,
    visibility: Visibility,
    capability: Capability,
) -> bool {
    if viewer.is_owner(owner) {
        return true;
    }
    match capability {
        Capability::Read => match visibility {
            Visibility::Public => true,
            // Declared but grants nothing to non-owners yet, not even friends.
            Visibility::Shared => false,
            Visibility::Private => false,
        },
        Capability::Create | Capability::Edit | Capability::Delete => false,
    }
}

pub fn authorize<R: Owned>(
    viewer: &Viewer,
    resource: &R,
    capability: Capability,
) -> Result<(), GalleryError> {
    if permits(viewer, resource.owner_id(), resource.visibility(), capability) {
        Ok(())
    } else {
        Err(GalleryError::Authorization(R::KIND))
    }
}

/// New resources are always owned by their creator, so creating only needs
/// someone to own them.
pub fn creator(viewer: &Viewer) -> Result<UserId, GalleryError> {
    viewer.user_id().ok_or(GalleryError::Authorization("account"))
}
