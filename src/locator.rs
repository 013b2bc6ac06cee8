//! Remote locator tracking
//!
//! The server is addressed by full URLs on every round trip, so "current
//! directory" lives here as an absolute, slash-terminated locator string.

use std::borrow::Cow;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Token that moves one level up.
pub const PARENT: &str = "..";

/// Escaped inside a single path step: controls, `%`, `\`, `?`, `#` and the
/// other characters a URL path never carries raw.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

fn encode_segment(step: &str) -> String {
    utf8_percent_encode(step, SEGMENT).to_string()
}

/// Absolute `scheme://host/path/` string; always ends in `/`. Path steps
/// added through `resolve` or `join` are percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocator(String);

impl RemoteLocator {
    /// Normalize a user-supplied URL so it carries exactly one trailing slash.
    /// The URL is taken as already encoded.
    pub fn new(url: &str) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        Self(format!("{}/", trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Byte index of the slash that starts the path, i.e. the server root.
    fn root_index(&self) -> usize {
        let after_scheme = self.0.find("://").map(|i| i + 3).unwrap_or(0);
        self.0[after_scheme..]
            .find('/')
            .map(|i| after_scheme + i)
            .unwrap_or(self.0.len() - 1)
    }

    /// Locator of the server root (`scheme://host/`).
    pub fn root(&self) -> RemoteLocator {
        RemoteLocator(self.0[..=self.root_index()].to_string())
    }

    pub fn is_root(&self) -> bool {
        self.root_index() + 1 == self.0.len()
    }

    /// Path part after the server root, without leading or trailing slash.
    pub fn path(&self) -> &str {
        self.0[self.root_index() + 1..].trim_end_matches('/')
    }

    /// Decoded last path segment, or the host part at the root. Used for prompts.
    pub fn last_segment(&self) -> Cow<'_, str> {
        let path = self.path();
        if path.is_empty() {
            let start = self.0.find("://").map(|i| i + 3).unwrap_or(0);
            return Cow::Borrowed(&self.0[start..self.root_index()]);
        }
        let last = path.rsplit('/').next().unwrap_or(path);
        percent_decode_str(last).decode_utf8_lossy()
    }

    fn parent(&self) -> RemoteLocator {
        if self.is_root() {
            return self.clone();
        }
        let without_slash = &self.0[..self.0.len() - 1];
        match without_slash.rfind('/') {
            Some(i) if i >= self.root_index() => RemoteLocator(self.0[..=i].to_string()),
            _ => self.root(),
        }
    }

    fn child(&self, step: &str) -> RemoteLocator {
        RemoteLocator(format!("{}{}/", self.0, encode_segment(step)))
    }

    /// Apply `/`-separated steps in order. `..` climbs and stops at the
    /// server root; empty steps and `.` are skipped.
    fn walk(&self, path: &str) -> RemoteLocator {
        path.split('/')
            .filter(|step| !step.is_empty() && *step != ".")
            .fold(self.clone(), |at, step| {
                if step == PARENT {
                    at.parent()
                } else {
                    at.child(step)
                }
            })
    }

    /// Split a name into the directory it lives in and its final step. A
    /// leading `/` starts from the server root.
    fn locate<'n>(&self, name: &'n str) -> (RemoteLocator, &'n str) {
        let (base, rel) = match name.strip_prefix('/') {
            Some(rel) => (self.root(), rel),
            None => (self.clone(), name),
        };
        let rel = rel.trim_end_matches('/');
        match rel.rsplit_once('/') {
            Some((dir, leaf)) => (base.walk(dir), leaf),
            None => (base, rel),
        }
    }

    /// Next locator for a change-directory request.
    ///
    /// `..` climbs one level and stops at the server root; `.` and empty
    /// targets stay put; a leading `/` starts from the root; other steps
    /// descend one level each.
    pub fn resolve(&self, target: &str) -> RemoteLocator {
        let target = target.trim();
        match target.strip_prefix('/') {
            Some(rel) => self.root().walk(rel),
            None => self.walk(target),
        }
    }

    /// Locator of the entry `name` (no trailing slash), resolved like
    /// `resolve` does for its directory part.
    ///
    /// `None` when the name does not end in an entry: empty, `/`, `.` or `..`.
    pub fn join(&self, name: &str) -> Option<String> {
        let (dir, leaf) = self.locate(name);
        if leaf.is_empty() || leaf == "." || leaf == PARENT {
            return None;
        }
        Some(format!("{}{}", dir.0, encode_segment(leaf)))
    }
}

impl fmt::Display for RemoteLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemoteLocator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `user:password` pair supplied at connect time.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl Credential {
    /// Parse `user:password`; an empty string means no credential.
    /// A missing `:` yields a user with an empty password.
    pub fn parse(userpass: &str) -> Option<Self> {
        let userpass = userpass.trim();
        if userpass.is_empty() {
            return None;
        }
        let (user, password) = userpass.split_once(':').unwrap_or((userpass, ""));
        Some(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

// Keep passwords out of logs and panics.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}
