//! Filters narrow down which events a matcher accepts.
//!
//! A [`Filter`] is a cheaply cloneable boolean check over the [`Context`].
//! Matchers evaluate their filters in order after the rule passed and stop at
//! the first one that rejects.
//!
//! ```rust,ignore
//! use xbot_framework::filter::{self, Filter};
//!
//! let admins_in_groups = filter::only_group().and(filter::has_permission());
//! let matcher = on_command("kick").filter(admins_in_groups.or(filter::only_super_users()));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use xbot_core::Role;

use crate::context::Context;

/// A boolean check over the dispatch context.
#[derive(Clone)]
pub struct Filter(Arc<dyn Fn(&Context) -> bool + Send + Sync>);

impl Filter {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn check(&self, ctx: &Context) -> bool {
        (self.0)(ctx)
    }

    /// Passes when both filters pass. `other` is skipped if `self` rejects.
    pub fn and(self, other: Filter) -> Filter {
        all([self, other])
    }

    /// Passes when either filter passes. `other` is skipped if `self` accepts.
    pub fn or(self, other: Filter) -> Filter {
        any([self, other])
    }

    pub fn negate(self) -> Filter {
        not(self)
    }
}

impl<F> From<F> for Filter
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Filter::new(f)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter")
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Passes when every filter passes, evaluated in order with short-circuit.
pub fn all(filters: impl IntoIterator<Item = Filter>) -> Filter {
    let filters: Vec<Filter> = filters.into_iter().collect();
    Filter::new(move |ctx| filters.iter().all(|f| f.check(ctx)))
}

/// Passes when any filter passes, evaluated in order with short-circuit.
pub fn any(filters: impl IntoIterator<Item = Filter>) -> Filter {
    let filters: Vec<Filter> = filters.into_iter().collect();
    Filter::new(move |ctx| filters.iter().any(|f| f.check(ctx)))
}

pub fn not(filter: Filter) -> Filter {
    Filter::new(move |ctx| !filter.check(ctx))
}

// ============================================================================
// Built-in filters
// ============================================================================

pub fn only_private() -> Filter {
    Filter::new(Context::is_private_message)
}

pub fn only_group() -> Filter {
    Filter::new(Context::is_group_message)
}

pub fn only_users(users: impl IntoIterator<Item = i64>) -> Filter {
    let users: HashSet<i64> = users.into_iter().collect();
    Filter::new(move |ctx| ctx.user_id().is_some_and(|id| users.contains(&id)))
}

pub fn only_groups(groups: impl IntoIterator<Item = i64>) -> Filter {
    let groups: HashSet<i64> = groups.into_iter().collect();
    Filter::new(move |ctx| ctx.group_id().is_some_and(|id| groups.contains(&id)))
}

pub fn only_super_users() -> Filter {
    Filter::new(Context::is_super_user)
}

/// Passes when the message mentions the bot or contains one of its nicknames.
pub fn only_to_me() -> Filter {
    Filter::new(|ctx| {
        let Some(message) = ctx.message() else {
            return false;
        };
        let self_id = ctx.event().self_id();
        if message.at_targets().contains(&self_id) {
            return true;
        }
        // unmasked text, a replacer may have rewritten `ctx.plain_text()`
        ctx.settings().mentions_nickname(&message.plain_text())
    })
}

/// Passes for group messages sent by the group owner or an admin.
pub fn has_permission() -> Filter {
    Filter::new(|ctx| {
        ctx.is_group_message()
            && matches!(ctx.event().sender_role(), Some(Role::Owner | Role::Admin))
    })
}
