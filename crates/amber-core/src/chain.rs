//! Outbound reply chains.
//!
//! A [`Chain`] is an ordered list of [`Segment`]s. Handlers build one and
//! return it; delivering it is the job of the external send channel.
//!
//! ```rust,ignore
//! use amber_core::Chain;
//!
//! let reply = Chain::new()
//!     .at(10001)
//!     .text(" hello")
//!     .face(178);
//! assert_eq!(reply.plain_text(), " hello");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single unit of reply content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text.
    Text { text: String },
    /// Image by url or local path.
    Image { file: String },
    /// Platform face (emoji) id.
    Face { id: i64 },
    /// Mention a user.
    At { user_id: i64 },
}

impl Segment {
    /// Returns the segment type name.
    pub fn segment_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Face { .. } => "face",
            Self::At { .. } => "at",
        }
    }

    /// Returns the text content if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => f.write_str(text),
            Self::Image { file } => write!(f, "[image:{file}]"),
            Self::Face { id } => write!(f, "[face:{id}]"),
            Self::At { user_id } => write!(f, "[at:{user_id}]"),
        }
    }
}

/// An ordered sequence of reply segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain {
    segments: Vec<Segment>,
}

impl Chain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Appends a text segment.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.push(Segment::Text { text: text.into() });
        self
    }

    /// Appends an image segment.
    pub fn image(mut self, file: impl Into<String>) -> Self {
        self.push(Segment::Image { file: file.into() });
        self
    }

    /// Appends a face segment.
    pub fn face(mut self, id: i64) -> Self {
        self.push(Segment::Face { id });
        self
    }

    /// Appends a mention segment.
    pub fn at(mut self, user_id: i64) -> Self {
        self.push(Segment::At { user_id });
        self
    }

    /// Returns the segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if the chain has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Concatenates the text segments, ignoring everything else.
    pub fn plain_text(&self) -> String {
        self.segments.iter().filter_map(Segment::as_text).collect()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<String> for Chain {
    fn from(text: String) -> Self {
        Self::new().text(text)
    }
}

impl From<&str> for Chain {
    fn from(text: &str) -> Self {
        Self::new().text(text)
    }
}

impl FromIterator<Segment> for Chain {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}
