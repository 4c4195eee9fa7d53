//! Store path model and namespace layout.

use estuary_types::keys;

use crate::driver::StoreError;

/// True if a path segment contains only letters, digits and underscores.
pub fn segment_valid(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A slash-separated location in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    components: Vec<String>,
}

impl Path {
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a slash-separated path, skipping empty segments.
    pub fn parse(path: &str) -> Self {
        Self::new(path.split('/').filter(|s| !s.is_empty()))
    }

    /// Returns a new path with one more trailing segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut components = self.components.clone();
        components.push(segment.into());
        Self { components }
    }

    pub fn first(&self) -> Option<&str> {
        self.components.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Splits into the parent path and the final segment. Used by
    /// drivers that address a scalar as an entry of its parent
    /// collection.
    pub fn split_last(&self) -> Option<(Path, &str)> {
        let (last, parent) = self.components.split_last()?;
        Some((
            Path {
                components: parent.to_vec(),
            },
            last.as_str(),
        ))
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.components.join("/"))
    }
}

/// Builds every store location the SDK reads or writes, rooted at a
/// validated `{root}/{sandbox}` prefix.
///
/// Layout:
///
/// ```text
/// {root}/{sandbox}/users/{uid}/messages   one user's 1-to-1 inbox
/// {root}/{sandbox}/users/{uid}/contacts
/// {root}/{sandbox}/users/{uid}/blocked
/// {root}/{sandbox}/users/{uid}/muted
/// {root}/{sandbox}/users/{uid}/chats      chats the user has joined
/// {root}/{sandbox}/chats/{chatId}/meta    chat metadata scalar
/// {root}/{sandbox}/chats/{chatId}/users   chat roster
/// {root}/{sandbox}/chats/{chatId}/messages
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    base: Path,
}

impl Paths {
    /// Creates the namespace. Both segments must be non-empty and
    /// contain only letters, digits and underscores; violations fail
    /// synchronously before any I/O.
    pub fn new(root: &str, sandbox: &str) -> Result<Self, StoreError> {
        for segment in [root, sandbox] {
            if !segment_valid(segment) {
                return Err(StoreError::InvalidPathSegment(segment.to_string()));
            }
        }
        Ok(Self {
            base: Path::new([root, sandbox]),
        })
    }

    pub fn user(&self, uid: &str) -> Path {
        self.base.child(keys::USERS).child(uid)
    }

    /// A user's 1-to-1 inbox collection.
    pub fn messages(&self, uid: &str) -> Path {
        self.user(uid).child(keys::MESSAGES)
    }

    pub fn message(&self, uid: &str, message_id: &str) -> Path {
        self.messages(uid).child(message_id)
    }

    pub fn contacts(&self, uid: &str) -> Path {
        self.user(uid).child(keys::CONTACTS)
    }

    pub fn blocked(&self, uid: &str) -> Path {
        self.user(uid).child(keys::BLOCKED)
    }

    pub fn muted(&self, uid: &str) -> Path {
        self.user(uid).child(keys::MUTED)
    }

    /// The collection of chats a user has joined.
    pub fn user_chats(&self, uid: &str) -> Path {
        self.user(uid).child(keys::CHATS)
    }

    pub fn chats(&self) -> Path {
        self.base.child(keys::CHATS)
    }

    pub fn chat(&self, chat_id: &str) -> Path {
        self.chats().child(chat_id)
    }

    pub fn chat_meta(&self, chat_id: &str) -> Path {
        self.chat(chat_id).child(keys::META)
    }

    pub fn chat_users(&self, chat_id: &str) -> Path {
        self.chat(chat_id).child(keys::USERS)
    }

    pub fn chat_messages(&self, chat_id: &str) -> Path {
        self.chat(chat_id).child(keys::MESSAGES)
    }
}
