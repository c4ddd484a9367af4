//! Cheap identity of a node's current content.
//!
//! Replies may arrive long after the request that produced them, on another
//! cluster member, after the source changed again. The fingerprint is how the
//! engine tells whether a result still belongs to the source's current
//! content. It is recomputed at every decision point and never cached.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::content::ContentData;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Deterministic, collision-tolerant hash of content locator and media type.
///
/// Two values are reserved: [`ContentFingerprint::NO_CONTENT`] and
/// [`ContentFingerprint::RENDITION_ABSENT`]. Hashing never yields either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentFingerprint(i32);

impl ContentFingerprint {
    /// The source has no content.
    pub const NO_CONTENT: Self = Self(-1);
    /// The rendition does not exist or was not produced by this engine.
    pub const RENDITION_ABSENT: Self = Self(-2);

    /// Fingerprint of optional content; absent or locator-less content is `NO_CONTENT`.
    pub fn of(content: Option<&ContentData>) -> Self {
        match content {
            Some(content) if content.has_locator() => {
                Self::of_parts(&content.locator, &content.media_type)
            }
            _ => Self::NO_CONTENT,
        }
    }

    pub fn of_parts(locator: &str, media_type: &str) -> Self {
        let mut hash = Fnv1a32::new();
        hash.write(locator.as_bytes());
        hash.write(media_type.as_bytes());
        let value = hash.finish() as i32;
        if value == Self::NO_CONTENT.0 || value == Self::RENDITION_ABSENT.0 {
            Self(value ^ 0x4000_0000)
        } else {
            Self(value)
        }
    }

    pub const fn from_raw(value: i32) -> Self {
        Self(value)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn has_content(self) -> bool {
        self != Self::NO_CONTENT
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_CONTENT => f.write_str("no-content"),
            Self::RENDITION_ABSENT => f.write_str("rendition-absent"),
            Self(value) => write!(f, "{value}"),
        }
    }
}

struct Fnv1a32 {
    state: u32,
}

impl Fnv1a32 {
    fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u32::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u32 {
        self.state
    }
}
