//! Registry of response content types that are base64-encoded in the envelope.

use std::collections::HashSet;

/// Set of MIME types (without parameters) treated as binary. Matching is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryMimeRegistry {
    types: HashSet<String>,
}

impl BinaryMimeRegistry {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        types.into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if the `Content-Type` header value names a registered type.
    /// Parameters after the first `;` are ignored.
    pub fn is_binary(&self, content_type: &str) -> bool {
        let mime = content_type.split(';').next().unwrap_or("");
        self.types.contains(&normalize(mime))
    }
}

impl<S: AsRef<str>> FromIterator<S> for BinaryMimeRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            types: iter
                .into_iter()
                .map(|s| normalize(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

fn normalize(mime: &str) -> String {
    mime.trim().to_ascii_lowercase()
}
