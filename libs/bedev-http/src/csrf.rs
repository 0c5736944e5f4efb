use crate::config::DEFAULT_ACCOUNT_TOKEN;
use crate::page::PageDocument;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Page meta element carrying the bootstrap token
const CSRF_META_NAME: &str = "csrf-token";
const CSRF_META_ATTRIBUTE: &str = "data-token";

#[derive(Debug, Default)]
struct Slots {
    by_account: HashMap<String, String>,
    anonymous: Option<String>,
}

/// Per-client CSRF token cache
///
/// One slot per account-token identifier plus an anonymous slot. Every write
/// is mirrored into the anonymous slot, which therefore always holds the last
/// token the server handed out. Entries are overwritten, never evicted.
pub struct CsrfTokenStore {
    slots: RwLock<Slots>,
    /// Consulted on a miss for the default account; only set for website clients
    page: Option<Arc<dyn PageDocument>>,
}

impl std::fmt::Debug for CsrfTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("CsrfTokenStore")
            .field("accounts", &slots.by_account.len())
            .field("anonymous", &slots.anonymous.is_some())
            .field("page_fallback", &self.page.is_some())
            .finish()
    }
}

impl CsrfTokenStore {
    /// Store without a page fallback
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            page: None,
        }
    }

    /// Store that falls back to the page's `csrf-token` meta element
    #[must_use]
    pub fn with_page_fallback(page: Arc<dyn PageDocument>) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            page: Some(page),
        }
    }

    /// Current token for an authorized (`true`) or anonymous request.
    ///
    /// `account_token` defaults to [`DEFAULT_ACCOUNT_TOKEN`].
    #[must_use]
    pub fn get(&self, authorized: bool, account_token: Option<&str>) -> Option<String> {
        let account = account_token.unwrap_or(DEFAULT_ACCOUNT_TOKEN);

        let cached = {
            let slots = self.slots.read();
            if authorized {
                slots.by_account.get(account).cloned()
            } else {
                slots.anonymous.clone()
            }
        };
        if cached.is_some() {
            return cached;
        }

        if authorized
            && account == DEFAULT_ACCOUNT_TOKEN
            && let Some(page) = &self.page
        {
            let token = page.meta_attribute(CSRF_META_NAME, CSRF_META_ATTRIBUTE);
            tracing::trace!(found = token.is_some(), "csrf token read from page");
            return token;
        }

        None
    }

    /// Record a token handed out by the server. Last write wins.
    pub fn set(&self, token: impl Into<String>, authorized: bool, account_token: Option<&str>) {
        let token = token.into();
        let mut slots = self.slots.write();
        if authorized {
            let account = account_token.unwrap_or(DEFAULT_ACCOUNT_TOKEN);
            slots.by_account.insert(account.to_owned(), token.clone());
        }
        slots.anonymous = Some(token);
    }
}

impl Default for CsrfTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::page::HtmlPage;

    fn page() -> Arc<dyn PageDocument> {
        Arc::new(HtmlPage::new(
            r#"<html><head><meta name="csrf-token" data-token="from-page"></head></html>"#,
        ))
    }

    #[test]
    fn test_set_mirrors_into_anonymous_slot() {
        let store = CsrfTokenStore::new();
        store.set("token", true, Some("acct1"));

        assert_eq!(store.get(true, Some("acct1")).as_deref(), Some("token"));
        assert_eq!(store.get(false, None).as_deref(), Some("token"));
        assert_eq!(store.get(true, Some("acct2")), None);
    }

    #[test]
    fn test_anonymous_set_leaves_accounts_alone() {
        let store = CsrfTokenStore::new();
        store.set("acct", true, None);
        store.set("anon", false, None);

        assert_eq!(store.get(true, None).as_deref(), Some("acct"));
        assert_eq!(store.get(false, Some("ignored")).as_deref(), Some("anon"));
    }

    #[test]
    fn test_last_write_wins() {
        let store = CsrfTokenStore::new();
        store.set("one", true, Some("a"));
        store.set("two", true, Some("a"));
        assert_eq!(store.get(true, Some("a")).as_deref(), Some("two"));
    }

    #[test]
    fn test_page_fallback_only_for_default_account() {
        let store = CsrfTokenStore::with_page_fallback(page());

        assert_eq!(store.get(true, None).as_deref(), Some("from-page"));
        assert_eq!(
            store.get(true, Some(DEFAULT_ACCOUNT_TOKEN)).as_deref(),
            Some("from-page")
        );
        assert_eq!(store.get(true, Some("alt")), None);
        assert_eq!(store.get(false, None), None);
    }

    #[test]
    fn test_cached_token_beats_page() {
        let store = CsrfTokenStore::with_page_fallback(page());
        store.set("rotated", true, None);
        assert_eq!(store.get(true, None).as_deref(), Some("rotated"));
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(CsrfTokenStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.set(format!("t{i}"), true, Some("shared")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let token = store.get(true, Some("shared")).unwrap();
        assert!(token.starts_with('t'));
        assert_eq!(store.get(false, None).map(|t| t.starts_with('t')), Some(true));
    }
}
