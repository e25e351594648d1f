use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use garagebot_core::GarageError;

use crate::client::{DirectoryPage, SlackApi};

enum Kind {
    User,
    Channel,
}

impl Kind {
    fn sigil(&self) -> char {
        match self {
            Self::User => '@',
            Self::Channel => '#',
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Channel => "channel",
        }
    }
}

/// Resolves human-facing names (user display names, channel names) to
/// provider IDs by walking the paginated directory listings.
///
/// Every entry seen on the way is merged into the cache, not just the target
/// — warming the cache on one lookup makes later lookups free. Entries never
/// expire; renamed accounts are an accepted staleness window. Concurrent
/// misses for the same name may fetch redundantly, which is harmless because
/// a name always maps to the same ID.
pub struct DirectoryResolver {
    api: Arc<dyn SlackApi>,
    page_size: u32,
    users: Mutex<HashMap<String, String>>,
    channels: Mutex<HashMap<String, String>>,
}

impl DirectoryResolver {
    pub fn new(api: Arc<dyn SlackApi>, page_size: u32) -> Self {
        Self {
            api,
            page_size,
            users: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves a display name (optionally `@`-prefixed) to a user ID.
    pub async fn resolve_user(&self, name: &str) -> Result<String, GarageError> {
        self.resolve(Kind::User, name).await
    }

    /// Resolves a channel name (optionally `#`-prefixed) to a channel ID.
    pub async fn resolve_channel(&self, name: &str) -> Result<String, GarageError> {
        self.resolve(Kind::Channel, name).await
    }

    /// Drops every cached entry. There is no automatic eviction; call this
    /// if a deployment needs to pick up Slack renames without a restart.
    pub async fn invalidate(&self) {
        self.users.lock().await.clear();
        self.channels.lock().await.clear();
    }

    async fn resolve(&self, kind: Kind, raw_name: &str) -> Result<String, GarageError> {
        let name = raw_name.strip_prefix(kind.sigil()).unwrap_or(raw_name);
        if name.trim().is_empty() {
            return Err(GarageError::invalid_argument(format!(
                "{} name must be non-empty",
                kind.label()
            )));
        }

        let cache = match kind {
            Kind::User => &self.users,
            Kind::Channel => &self.channels,
        };

        if let Some(id) = cache.lock().await.get(name) {
            return Ok(id.clone());
        }

        let mut cursor: Option<String> = None;
        loop {
            let page = self.fetch_page(&kind, cursor.as_deref()).await?;
            debug!(
                kind = kind.label(),
                entries = page.entries.len(),
                has_more = page.next_cursor.is_some(),
                "merged directory page"
            );

            {
                let mut guard = cache.lock().await;
                for entry in &page.entries {
                    guard.insert(entry.name.clone(), entry.id.clone());
                }
                if let Some(id) = guard.get(name) {
                    return Ok(id.clone());
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    return Err(GarageError::not_found(format!(
                        "no {} found with name \"{name}\"",
                        kind.label()
                    )))
                }
            }
        }
    }

    async fn fetch_page(
        &self,
        kind: &Kind,
        cursor: Option<&str>,
    ) -> Result<DirectoryPage, GarageError> {
        let page = match kind {
            Kind::User => self.api.users_page(self.page_size, cursor).await?,
            Kind::Channel => self.api.channels_page(self.page_size, cursor).await?,
        };
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::DirectoryResolver;
    use crate::client::{ApiError, DirectoryEntry, DirectoryPage, SlackApi};
    use garagebot_core::GarageError;

    fn entry(name: &str, id: &str) -> DirectoryEntry {
        DirectoryEntry { id: id.to_owned(), name: name.to_owned() }
    }

    #[derive(Default)]
    struct ScriptedDirectory {
        user_pages: Mutex<VecDeque<DirectoryPage>>,
        channel_pages: Mutex<VecDeque<DirectoryPage>>,
        user_fetches: Mutex<usize>,
        channel_fetches: Mutex<usize>,
    }

    impl ScriptedDirectory {
        fn with_user_pages(pages: Vec<DirectoryPage>) -> Arc<Self> {
            Arc::new(Self { user_pages: Mutex::new(pages.into()), ..Self::default() })
        }

        fn with_channel_pages(pages: Vec<DirectoryPage>) -> Arc<Self> {
            Arc::new(Self { channel_pages: Mutex::new(pages.into()), ..Self::default() })
        }

        async fn user_fetches(&self) -> usize {
            *self.user_fetches.lock().await
        }
    }

    #[async_trait]
    impl SlackApi for ScriptedDirectory {
        async fn users_page(
            &self,
            _limit: u32,
            _cursor: Option<&str>,
        ) -> Result<DirectoryPage, ApiError> {
            *self.user_fetches.lock().await += 1;
            Ok(self.user_pages.lock().await.pop_front().unwrap_or_default())
        }

        async fn channels_page(
            &self,
            _limit: u32,
            _cursor: Option<&str>,
        ) -> Result<DirectoryPage, ApiError> {
            *self.channel_fetches.lock().await += 1;
            Ok(self.channel_pages.lock().await.pop_front().unwrap_or_default())
        }

        async fn open_conversation(&self, _user_ids: &[String]) -> Result<String, ApiError> {
            Ok("D-unused".to_owned())
        }

        async fn post_message(
            &self,
            _channel_id: &str,
            _thread_ts: Option<&str>,
            _text: &str,
        ) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn two_page_users() -> Vec<DirectoryPage> {
        vec![
            DirectoryPage {
                entries: vec![entry("Dave", "U100"), entry("Carol", "U101")],
                next_cursor: Some("page-2".to_owned()),
            },
            DirectoryPage { entries: vec![entry("Thor", "U200")], next_cursor: None },
        ]
    }

    #[tokio::test]
    async fn resolves_across_pages_then_serves_from_cache() {
        let api = ScriptedDirectory::with_user_pages(two_page_users());
        let resolver = DirectoryResolver::new(api.clone(), 50);

        let id = resolver.resolve_user("Thor").await.expect("resolve");
        assert_eq!(id, "U200");
        assert_eq!(api.user_fetches().await, 2);

        let id = resolver.resolve_user("Thor").await.expect("cached resolve");
        assert_eq!(id, "U200");
        assert_eq!(api.user_fetches().await, 2, "cache hit must not refetch");
    }

    #[tokio::test]
    async fn warms_cache_with_entries_it_was_not_looking_for() {
        let api = ScriptedDirectory::with_user_pages(two_page_users());
        let resolver = DirectoryResolver::new(api.clone(), 50);

        resolver.resolve_user("Thor").await.expect("resolve");
        resolver.resolve_user("Carol").await.expect("warmed resolve");
        // Carol was cached by the Thor walk; no further pages fetched.
        assert_eq!(api.user_fetches().await, 2);
    }

    #[tokio::test]
    async fn strips_the_user_sigil() {
        let api = ScriptedDirectory::with_user_pages(two_page_users());
        let resolver = DirectoryResolver::new(api, 50);

        assert_eq!(resolver.resolve_user("@Dave").await.expect("resolve"), "U100");
    }

    #[tokio::test]
    async fn exhausted_directory_is_not_found() {
        let api = ScriptedDirectory::with_user_pages(two_page_users());
        let resolver = DirectoryResolver::new(api, 50);

        let error = resolver.resolve_user("nobody").await.err().expect("miss");
        assert!(matches!(error, GarageError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_name_is_invalid_even_with_sigil() {
        let api = ScriptedDirectory::with_user_pages(vec![]);
        let resolver = DirectoryResolver::new(api, 50);

        for name in ["", "@", "  "] {
            let error = resolver.resolve_user(name).await.err().expect("invalid");
            assert!(matches!(error, GarageError::InvalidArgument(_)), "name {name:?}");
        }
    }

    #[tokio::test]
    async fn channel_cache_is_separate_from_user_cache() {
        let api = ScriptedDirectory::with_channel_pages(vec![DirectoryPage {
            entries: vec![entry("garagebot-logs", "C900")],
            next_cursor: None,
        }]);
        let resolver = DirectoryResolver::new(api.clone(), 50);

        let id = resolver.resolve_channel("#garagebot-logs").await.expect("resolve");
        assert_eq!(id, "C900");

        // The channel walk must not have touched the user listing, and the
        // channel name is not visible as a user.
        assert_eq!(api.user_fetches().await, 0);
        let error = resolver.resolve_user("garagebot-logs").await.err().expect("miss");
        assert!(matches!(error, GarageError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let mut pages = two_page_users();
        pages.extend(two_page_users());
        let api = ScriptedDirectory::with_user_pages(pages);
        let resolver = DirectoryResolver::new(api.clone(), 50);

        resolver.resolve_user("Thor").await.expect("resolve");
        resolver.invalidate().await;
        resolver.resolve_user("Thor").await.expect("resolve after invalidate");

        assert_eq!(api.user_fetches().await, 4);
    }
}
