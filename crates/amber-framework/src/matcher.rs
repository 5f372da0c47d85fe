//! Keyword matchers.
//!
//! A [`Matcher`] is the keyword rule attached to a
//! [`Handler`](crate::handler::Handler). It is a closed set of variants:
//!
//! - [`Matcher::Literal`]: passes when the text *contains* the string
//! - [`Matcher::Equal`]: passes when the text *is* the string
//! - [`Matcher::Pattern`]: passes when the regular expression finds a match
//! - [`Matcher::List`]: passes when any child passes, checked left to right
//!
//! Plain strings convert into literals, so the exact-equality variant is
//! always spelled out with [`equal`]:
//!
//! ```rust,ignore
//! use amber_framework::matcher::{Matcher, equal};
//!
//! let keywords = Matcher::from(vec![equal("hi"), "hello".into()]);
//! assert!(keywords.check("hi"));
//! assert!(keywords.check("well hello there"));
//! assert!(!keywords.check("hiya"));
//! ```

use std::fmt;

use regex::Regex;

/// A keyword rule tested against message text.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Substring match.
    Literal(String),
    /// Whole-text equality.
    Equal(String),
    /// Regular expression search.
    Pattern(Regex),
    /// First passing child wins.
    List(Vec<Matcher>),
}

/// Creates an exact-equality matcher.
pub fn equal(text: impl Into<String>) -> Matcher {
    Matcher::Equal(text.into())
}

impl Matcher {
    /// Creates a substring matcher.
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Compiles `pattern` into a regular expression matcher.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Pattern)
    }

    /// Tests `text` against this matcher.
    pub fn check(&self, text: &str) -> bool {
        match self {
            Self::Literal(word) => text.contains(word.as_str()),
            Self::Equal(word) => text == word,
            Self::Pattern(re) => re.is_match(text),
            Self::List(items) => items.iter().any(|item| item.check(text)),
        }
    }

    /// Returns `true` if this matcher is a bare exact-equality entry.
    pub fn is_equal(&self) -> bool {
        matches!(self, Self::Equal(_))
    }

    /// Returns the exact-equality entries at the top level of a list.
    ///
    /// Nested lists are not searched. Returns `None` for non-list matchers
    /// and for lists without any exact-equality entry.
    pub fn equal_entries(&self) -> Option<Self> {
        let Self::List(items) = self else {
            return None;
        };

        let equals: Vec<Self> = items.iter().filter(|m| m.is_equal()).cloned().collect();
        if equals.is_empty() {
            None
        } else {
            Some(Self::List(equals))
        }
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Equal(a), Self::Equal(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            (Self::List(a), Self::List(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(word) => write!(f, "{word:?}"),
            Self::Equal(word) => write!(f, "equal({word:?})"),
            Self::Pattern(re) => write!(f, "re({:?})", re.as_str()),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Matcher {
    fn from(word: &str) -> Self {
        Self::Literal(word.to_string())
    }
}

impl From<String> for Matcher {
    fn from(word: String) -> Self {
        Self::Literal(word)
    }
}

impl From<Regex> for Matcher {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

impl From<Vec<Matcher>> for Matcher {
    fn from(items: Vec<Matcher>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<&str>> for Matcher {
    fn from(words: Vec<&str>) -> Self {
        Self::List(words.into_iter().map(Self::from).collect())
    }
}
