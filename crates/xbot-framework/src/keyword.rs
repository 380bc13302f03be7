//! Keyword providers chosen per event.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use xbot_keyword::KeywordProvider;

use crate::context::Context;

/// Picks the keyword provider that applies to an event.
///
/// Returning `None` means no keywords apply and the rule does not match.
/// Every distinct provider returned gets its own automaton cache, so the
/// same provider instance should be returned for the same scope.
pub trait ContextKeywordProvider: Send + Sync + 'static {
    fn provider(&self, ctx: &Context) -> Option<Arc<dyn KeywordProvider>>;
}

impl<F> ContextKeywordProvider for F
where
    F: Fn(&Context) -> Option<Arc<dyn KeywordProvider>> + Send + Sync + 'static,
{
    fn provider(&self, ctx: &Context) -> Option<Arc<dyn KeywordProvider>> {
        self(ctx)
    }
}

/// Per-group keyword providers with an optional fallback for private chats
/// and groups without their own list.
#[derive(Default)]
pub struct GroupKeywords {
    groups: RwLock<HashMap<i64, Arc<dyn KeywordProvider>>>,
    fallback: Option<Arc<dyn KeywordProvider>>,
}

impl GroupKeywords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: Arc<dyn KeywordProvider>) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            fallback: Some(fallback),
        }
    }

    /// Installs the provider for `group_id`, returning the previous one.
    pub fn insert(
        &self,
        group_id: i64,
        provider: Arc<dyn KeywordProvider>,
    ) -> Option<Arc<dyn KeywordProvider>> {
        self.groups.write().insert(group_id, provider)
    }

    pub fn remove(&self, group_id: i64) -> Option<Arc<dyn KeywordProvider>> {
        self.groups.write().remove(&group_id)
    }

    pub fn get(&self, group_id: i64) -> Option<Arc<dyn KeywordProvider>> {
        self.groups.read().get(&group_id).cloned()
    }
}

impl ContextKeywordProvider for GroupKeywords {
    fn provider(&self, ctx: &Context) -> Option<Arc<dyn KeywordProvider>> {
        ctx.group_id()
            .and_then(|id| self.get(id))
            .or_else(|| self.fallback.clone())
    }
}

impl std::fmt::Debug for GroupKeywords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupKeywords")
            .field("groups", &self.groups.read().len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
