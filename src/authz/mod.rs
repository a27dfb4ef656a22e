//! Pure permission resolution.
//!
//! Everything here is deterministic over its inputs; the caller fetches the
//! page, its permission rows, and the user's group memberships from the
//! store and hands them in. No caching, no I/O.

use std::collections::HashSet;

use crate::types::{Page, PagePermission, Subject};

/// Effective rights of one user on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    pub view: bool,
    pub edit: bool,
    pub share: bool,
}

impl Access {
    pub const NONE: Access = Access {
        view: false,
        edit: false,
        share: false,
    };

    /// Owners hold every right, including the only path to `share`.
    pub const OWNER: Access = Access {
        view: true,
        edit: true,
        share: true,
    };
}

/// Resolves the effective access of `user_id` on `page`.
///
/// Owner short-circuits to full access. Otherwise the matching grant rows
/// (direct user grants plus grants to any of the user's groups) are
/// unioned flag-by-flag. A row granting `can_edit` without `can_view`
/// still yields view: edit implies view.
pub fn resolve(
    user_id: &str,
    page: &Page,
    grants: &[PagePermission],
    groups: &HashSet<String>,
) -> Access {
    if page.owner_id == user_id {
        return Access::OWNER;
    }

    let mut view = false;
    let mut edit = false;

    for grant in grants.iter().filter(|g| g.page_id == page.id) {
        let applies = match &grant.subject {
            Subject::User(id) => id == user_id,
            Subject::Group(id) => groups.contains(id),
        };
        if applies {
            view |= grant.can_view;
            edit |= grant.can_edit;
        }
    }

    Access {
        view: view || edit,
        edit,
        share: false,
    }
}
