use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::message::Message;
use crate::nuid::Nuid;

pub const DEFAULT_INBOX_PREFIX: &str = "_INBOX";

/// Shared inbox state for the request/reply pattern: one lazily-created
/// subscription subject tree (`<prefix>.<root>.>`), with each in-flight
/// request owning a unique leaf under it. A single mutex at the call site
/// (the connection actor's serialized command loop) already guarantees
/// only one `request` races the inbox's creation at a time; this type
/// just tracks the per-leaf waiters once the subscription exists.
pub struct RequestMultiplexer {
    inbox_prefix: String,
    prefix_customized: bool,
    root: Option<String>,
    waiters: HashMap<String, oneshot::Sender<Message>>,
}

impl RequestMultiplexer {
    pub fn new() -> Self {
        RequestMultiplexer {
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_owned(),
            prefix_customized: false,
            root: None,
            waiters: HashMap::new(),
        }
    }

    /// Change the inbox prefix. Only valid before the inbox subscription
    /// has been created (mirrors the "before first use" rule — this type
    /// only tracks "has the root been minted", not whether a request is
    /// currently in flight under the old prefix).
    pub fn set_inbox_prefix(&mut self, prefix: impl Into<String>) -> bool {
        if self.root.is_some() {
            return false;
        }
        self.inbox_prefix = prefix.into();
        self.prefix_customized = true;
        true
    }

    pub fn has_inbox(&self) -> bool {
        self.root.is_some()
    }

    /// Mint the inbox root and return the wildcard subject to subscribe
    /// to. If the prefix is still the default, a fresh NUID is appended
    /// so that two clients sharing the default prefix don't collide; a
    /// caller-chosen prefix is trusted verbatim.
    pub fn ensure_inbox(&mut self, nuid: &mut Nuid) -> &str {
        if self.root.is_none() {
            let root = if self.prefix_customized {
                self.inbox_prefix.clone()
            } else {
                format!("{}.{}", self.inbox_prefix, nuid.next())
            };
            self.root = Some(root);
        }
        self.root.as_deref().expect("just set")
    }

    pub fn inbox_wildcard(&self) -> Option<String> {
        self.root.as_ref().map(|r| format!("{r}.>"))
    }

    /// Allocate a fresh leaf subject under the inbox root and register a
    /// waiter for it.
    pub fn new_request(&mut self, nuid: &mut Nuid) -> (String, oneshot::Receiver<Message>) {
        let root = self.root.as_deref().expect("ensure_inbox called first");
        let leaf = format!("{root}.{}", nuid.next());
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(leaf.clone(), tx);
        (leaf, rx)
    }

    /// Route an inbox delivery to its matching leaf waiter, if any.
    /// Messages for a leaf with no (or an already-resolved) waiter belong
    /// to a stale or already-timed-out request and are dropped.
    pub fn route(&mut self, subject: &str, message: Message) {
        if let Some(waiter) = self.waiters.remove(subject) {
            let _ = waiter.send(message);
        }
    }

    /// Drop every outstanding waiter, e.g. on transport loss; their
    /// receivers observe a disconnection error rather than hanging until
    /// their individual timeouts fire.
    pub fn fail_all(&mut self) {
        self.waiters.clear();
    }

    /// Drop a waiter without it ever being satisfied (timeout, or the
    /// client closing mid-request).
    pub fn cancel(&mut self, leaf: &str) {
        self.waiters.remove(leaf);
    }
}

impl Default for RequestMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn msg(subject: &str) -> Message {
        Message::new(subject.to_owned(), 1, None, Bytes::new(), None, None)
    }

    #[test]
    fn default_prefix_gets_nuid_appended_for_isolation() {
        let mut mux = RequestMultiplexer::new();
        let mut nuid = Nuid::new();
        let root = mux.ensure_inbox(&mut nuid).to_owned();
        assert!(root.starts_with("_INBOX."));
        assert!(root.len() > "_INBOX.".len());
    }

    #[test]
    fn custom_prefix_is_trusted_verbatim() {
        let mut mux = RequestMultiplexer::new();
        mux.set_inbox_prefix("my.inbox");
        let mut nuid = Nuid::new();
        assert_eq!(mux.ensure_inbox(&mut nuid), "my.inbox");
    }

    #[test]
    fn prefix_cannot_change_after_inbox_created() {
        let mut mux = RequestMultiplexer::new();
        let mut nuid = Nuid::new();
        mux.ensure_inbox(&mut nuid);
        assert!(!mux.set_inbox_prefix("too.late"));
    }

    #[tokio::test]
    async fn route_delivers_to_matching_leaf_only() {
        let mut mux = RequestMultiplexer::new();
        let mut nuid = Nuid::new();
        mux.ensure_inbox(&mut nuid);
        let (leaf, rx) = mux.new_request(&mut nuid);
        mux.route("some.other.leaf", msg("some.other.leaf"));
        mux.route(&leaf, msg(&leaf));
        let got = rx.await.unwrap();
        assert_eq!(got.subject, leaf);
    }
}
