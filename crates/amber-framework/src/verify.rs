//! Verification results.

/// The outcome of [`Handler::verify`](crate::handler::Handler::verify).
///
/// `priority` lets a caller choose between several matching handlers. When a
/// rule does not state one it is `1` for a match and `0` otherwise.
/// `captures` is reserved for extracted fragments and is empty unless a
/// custom predicate fills it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verify {
    pub matched: bool,
    pub priority: i64,
    pub captures: Vec<String>,
}

impl Verify {
    /// Creates a result with the default priority for `matched`.
    pub fn new(matched: bool) -> Self {
        Self {
            matched,
            priority: i64::from(matched),
            captures: Vec::new(),
        }
    }

    /// The non-matching result `(false, 0, [])`.
    pub fn miss() -> Self {
        Self::new(false)
    }

    /// Overrides the priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the captured fragments.
    pub fn with_captures<I, S>(mut self, captures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.captures = captures.into_iter().map(Into::into).collect();
        self
    }
}

impl From<bool> for Verify {
    fn from(matched: bool) -> Self {
        Self::new(matched)
    }
}

impl From<(bool, i64)> for Verify {
    fn from((matched, priority): (bool, i64)) -> Self {
        Self::new(matched).with_priority(priority)
    }
}

impl From<(bool, i64, Vec<String>)> for Verify {
    fn from((matched, priority, captures): (bool, i64, Vec<String>)) -> Self {
        Self {
            matched,
            priority,
            captures,
        }
    }
}
