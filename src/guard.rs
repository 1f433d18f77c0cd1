//! Route guard: maps a [`SessionView`] to where the client should be.
//!
//! Evaluation is pure, so it is re-run on every view change. A mounted
//! guard moves from onboarding to the dashboard as soon as the profile
//! reports `onboarded`, without a reload.

use serde::Serialize;

use crate::profile::Role;
use crate::session::SessionView;

/// Where a session belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "role", rename_all = "snake_case")]
pub enum Destination {
    /// Render a loading state; do not redirect.
    Loading,
    SignIn,
    Onboarding,
    Dashboard(Role),
}

impl Destination {
    /// Client path for this destination. `Loading` has none.
    pub fn path(&self) -> Option<&'static str> {
        match self {
            Self::Loading => None,
            Self::SignIn => Some(SIGN_IN_PATH),
            Self::Onboarding => Some(ONBOARDING_PATH),
            Self::Dashboard(Role::User) => Some(DASHBOARD_PATH),
            Self::Dashboard(Role::Admin) => Some(ADMIN_PATH),
        }
    }
}

pub const SIGN_IN_PATH: &str = "/login";
pub const ONBOARDING_PATH: &str = "/onboarding";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const ADMIN_PATH: &str = "/admin";

/// Apply the policy table.
///
/// An unset role lands on the user dashboard. Stale role or onboarding
/// fields never matter once the identity is gone.
pub fn resolve(view: &SessionView) -> Destination {
    if view.loading {
        return Destination::Loading;
    }
    if view.identity.is_none() {
        return Destination::SignIn;
    }
    match view.onboarding_complete {
        Some(true) => Destination::Dashboard(view.role.unwrap_or(Role::User)),
        _ => Destination::Onboarding,
    }
}

/// Outcome of checking one concrete route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Redirect(Destination),
    /// Session not settled yet.
    Wait,
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Decide whether `path` may be shown for `view`.
///
/// Only the onboarding, dashboard and admin trees are gated; every other
/// path is public.
pub fn authorize(view: &SessionView, path: &str) -> Access {
    let gated = under(path, ONBOARDING_PATH) || under(path, DASHBOARD_PATH) || under(path, ADMIN_PATH);
    if !gated {
        return Access::Allow;
    }

    let destination = resolve(view);
    let allowed = match destination {
        Destination::Loading => return Access::Wait,
        Destination::SignIn => false,
        Destination::Onboarding => under(path, ONBOARDING_PATH),
        // Admin screens need an explicit admin role, not the defaulted one.
        Destination::Dashboard(_) if under(path, ADMIN_PATH) => view.role == Some(Role::Admin),
        Destination::Dashboard(_) => under(path, DASHBOARD_PATH),
    };

    if allowed {
        Access::Allow
    } else {
        Access::Redirect(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, SubjectId};

    fn signed_in(role: Option<Role>, onboarded: bool) -> SessionView {
        SessionView {
            identity: Some(Identity::new(SubjectId::new("uid-1").unwrap())),
            role,
            onboarding_complete: Some(onboarded),
            selected_modules: Default::default(),
            loading: false,
        }
    }

    #[test]
    fn loading_never_redirects() {
        let mut view = signed_in(Some(Role::Admin), true);
        view.loading = true;
        view.onboarding_complete = None;
        assert_eq!(resolve(&view), Destination::Loading);
        assert_eq!(resolve(&SessionView::loading()), Destination::Loading);
        assert_eq!(authorize(&view, "/dashboard"), Access::Wait);
    }

    #[test]
    fn absent_identity_goes_to_sign_in_despite_stale_fields() {
        let view = SessionView {
            identity: None,
            role: Some(Role::Admin),
            onboarding_complete: Some(true),
            selected_modules: ["devotions".to_string()].into(),
            loading: false,
        };
        assert_eq!(resolve(&view), Destination::SignIn);
        assert_eq!(resolve(&SessionView::signed_out()), Destination::SignIn);
    }

    #[test]
    fn not_onboarded_goes_to_onboarding_for_any_role() {
        for role in [None, Some(Role::User), Some(Role::Admin)] {
            assert_eq!(resolve(&signed_in(role, false)), Destination::Onboarding);
        }
    }

    #[test]
    fn onboarded_goes_to_role_dashboard() {
        assert_eq!(resolve(&signed_in(None, true)), Destination::Dashboard(Role::User));
        assert_eq!(
            resolve(&signed_in(Some(Role::User), true)),
            Destination::Dashboard(Role::User)
        );
        assert_eq!(
            resolve(&signed_in(Some(Role::Admin), true)),
            Destination::Dashboard(Role::Admin)
        );
    }

    #[test]
    fn destinations_map_to_paths() {
        assert_eq!(Destination::Loading.path(), None);
        assert_eq!(Destination::SignIn.path(), Some("/login"));
        assert_eq!(Destination::Onboarding.path(), Some("/onboarding"));
        assert_eq!(Destination::Dashboard(Role::User).path(), Some("/dashboard"));
        assert_eq!(Destination::Dashboard(Role::Admin).path(), Some("/admin"));
    }

    #[test]
    fn rerun_after_onboarding_moves_to_dashboard() {
        let mut view = signed_in(Some(Role::User), false);
        assert_eq!(resolve(&view), Destination::Onboarding);
        assert_eq!(resolve(&view), Destination::Onboarding);
        view.onboarding_complete = Some(true);
        assert_eq!(resolve(&view), Destination::Dashboard(Role::User));
    }

    #[test]
    fn public_paths_are_always_allowed() {
        for path in ["/", "/login", "/about", "/dashboards-info"] {
            assert_eq!(authorize(&SessionView::loading(), path), Access::Allow);
            assert_eq!(authorize(&SessionView::signed_out(), path), Access::Allow);
        }
    }

    #[test]
    fn gated_paths_redirect_signed_out_users() {
        let view = SessionView::signed_out();
        for path in ["/onboarding", "/dashboard/devotions", "/admin"] {
            assert_eq!(authorize(&view, path), Access::Redirect(Destination::SignIn));
        }
    }

    #[test]
    fn onboarding_only_before_completion() {
        assert_eq!(authorize(&signed_in(None, false), "/onboarding"), Access::Allow);
        assert_eq!(
            authorize(&signed_in(None, false), "/dashboard"),
            Access::Redirect(Destination::Onboarding)
        );
        assert_eq!(
            authorize(&signed_in(None, true), "/onboarding"),
            Access::Redirect(Destination::Dashboard(Role::User))
        );
    }

    #[test]
    fn admin_tree_requires_explicit_admin_role() {
        assert_eq!(authorize(&signed_in(Some(Role::Admin), true), "/admin/users"), Access::Allow);
        assert_eq!(
            authorize(&signed_in(None, true), "/admin"),
            Access::Redirect(Destination::Dashboard(Role::User))
        );
        assert_eq!(
            authorize(&signed_in(Some(Role::User), true), "/admin"),
            Access::Redirect(Destination::Dashboard(Role::User))
        );
        assert_eq!(authorize(&signed_in(Some(Role::Admin), true), "/dashboard"), Access::Allow);
    }
}
