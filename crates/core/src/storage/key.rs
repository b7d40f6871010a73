//! Object key generation.
//!
//! Keys have the shape `[owner/]segment/slug.ext`: a random alphanumeric
//! segment keeps keys unique, the slug keeps them URL-safe, and the
//! extension is carried over verbatim.

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;

use super::error::StorageError;

/// Length of the random key segment. 62^12 is roughly 3.2e21 keys.
pub const RANDOM_SEGMENT_LEN: usize = 12;

/// Slug used when nothing URL-safe survives from the filename.
const FALLBACK_SLUG: &str = "file";

/// Key of an object in the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Accept a caller-supplied key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the key is blank or starts with `/`.
    pub fn parse(key: impl Into<String>) -> Result<Self, StorageError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(StorageError::invalid_key("key is empty"));
        }
        if key.starts_with('/') {
            return Err(StorageError::invalid_key(format!(
                "key must be relative to the bucket: {key}"
            )));
        }
        Ok(Self(key))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable prefix scoping keys to one owner.
///
/// Namespacing only: authorization happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create an owner scope.
    ///
    /// Only ASCII letters, digits, `_` and `-` are kept, so the scope is a
    /// single URL-safe path segment.
    #[must_use]
    pub fn new(id: impl fmt::Display) -> Self {
        Self(
            id.to_string()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
                .collect(),
        )
    }

    /// The scope as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self::new(id)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a unique key for `filename`, optionally under an owner scope.
#[must_use]
pub fn make_key(filename: &str, owner: Option<&OwnerId>) -> ObjectKey {
    let (stem, ext) = split_filename(filename);
    let key = format!("{}/{}{}", random_segment(), slugify(stem), ext);

    match owner.filter(|owner| !owner.as_str().is_empty()) {
        Some(owner) => ObjectKey(format!("{owner}/{key}")),
        None => ObjectKey(key),
    }
}

/// Split a filename into stem and extension (with its dot).
///
/// Directory components are dropped, and both `/` and `\` count as
/// separators so Windows paths reported by browsers lose their folders too. A
/// leading dot belongs to the stem, so `.env` has no extension and
/// `archive.tar.gz` has `.gz`. A trailing dot is not an extension: `trailing.`
/// keeps the dot in the stem, where slugify drops it.
pub fn split_filename(filename: &str) -> (&str, &str) {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    match base.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < base.len() => base.split_at(idx),
        _ => (base, ""),
    }
}

fn random_segment() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SEGMENT_LEN)
        .map(char::from)
        .collect()
}

/// Reduce a string to lowercase ASCII words joined by `-`.
///
/// `camelCase` boundaries become separators and common Latin letters are
/// transliterated (`ü` to `ue`, `é` to `e`). Everything else collapses into a
/// single `-`.
#[must_use]
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    let mut prev: Option<char> = None;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            let camel_boundary = c.is_ascii_uppercase()
                && prev.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit());
            if camel_boundary {
                pending_dash = true;
            }
            push_word_char(&mut slug, c.to_ascii_lowercase(), &mut pending_dash);
        } else if let Some(replacement) = transliterate(c) {
            for r in replacement.chars() {
                push_word_char(&mut slug, r, &mut pending_dash);
            }
        } else {
            pending_dash = true;
        }
        prev = Some(c);
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

fn push_word_char(slug: &mut String, c: char, pending_dash: &mut bool) {
    if *pending_dash && !slug.is_empty() {
        slug.push('-');
    }
    *pending_dash = false;
    slug.push(c);
}

fn transliterate(c: char) -> Option<&'static str> {
    let replacement = match c {
        'ä' | 'Ä' | 'æ' | 'Æ' => "ae",
        'ö' | 'Ö' | 'ø' | 'Ø' | 'œ' | 'Œ' => "oe",
        'ü' | 'Ü' => "ue",
        'ß' => "ss",
        'à' | 'á' | 'â' | 'ã' | 'å' | 'ā' | 'À' | 'Á' | 'Â' | 'Ã' | 'Å' | 'Ā' => "a",
        'ç' | 'ć' | 'č' | 'Ç' | 'Ć' | 'Č' => "c",
        'ð' | 'đ' | 'Ð' | 'Đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' | 'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ę' | 'Ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' => "i",
        'ł' | 'Ł' => "l",
        'ñ' | 'ń' | 'ň' | 'Ñ' | 'Ń' | 'Ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ō' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ō' => "o",
        'ř' | 'Ř' => "r",
        'ś' | 'š' | 'Ś' | 'Š' => "s",
        'ť' | 'Ť' => "t",
        'ù' | 'ú' | 'û' | 'ū' | 'ů' | 'Ù' | 'Ú' | 'Û' | 'Ū' | 'Ů' => "u",
        'ý' | 'ÿ' | 'Ý' => "y",
        'ź' | 'ż' | 'ž' | 'Ź' | 'Ż' | 'Ž' => "z",
        'þ' | 'Þ' => "th",
        _ => return None,
    };
    Some(replacement)
}
