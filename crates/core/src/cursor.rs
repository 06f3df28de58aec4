//! Opaque pagination cursors.
//!
//! A cursor is the index position of the last item of a page, bound to the
//! (scope, sort key, direction, tag filter) tuple of the listing that produced
//! it. Wire form is URL-safe base64 over a fixed 51 byte layout:
//!
//! | bytes  | field                                |
//! |--------|--------------------------------------|
//! | 0      | format version                       |
//! | 1      | sort key tag                         |
//! | 2      | direction tag                        |
//! | 3..19  | scope id                             |
//! | 19..27 | tag filter fingerprint               |
//! | 27..43 | content id                           |
//! | 43..51 | sort value, big endian two's compl.  |

use std::collections::BTreeSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{ContentId, Direction, IndexKey, ScopeId, SortKey, TagId};

const CURSOR_VERSION: u8 = 1;
const CURSOR_LEN: usize = 51;
const FINGERPRINT_LEN: usize = 8;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding,
    #[error("cursor has wrong length {0}")]
    Length(usize),
    #[error("unsupported cursor version {0}")]
    Version(u8),
    #[error("cursor was issued for a different listing")]
    ContextMismatch,
}

/// The listing a cursor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorContext {
    pub scope_id: ScopeId,
    pub sort: SortKey,
    pub direction: Direction,
    filter: [u8; FINGERPRINT_LEN],
}

impl CursorContext {
    #[must_use]
    pub fn new(
        scope_id: ScopeId,
        sort: SortKey,
        direction: Direction,
        tags: &BTreeSet<TagId>,
    ) -> Self {
        Self {
            scope_id,
            sort,
            direction,
            filter: filter_fingerprint(tags),
        }
    }
}

fn filter_fingerprint(tags: &BTreeSet<TagId>) -> [u8; FINGERPRINT_LEN] {
    let mut hasher = Sha256::new();
    for tag in tags {
        hasher.update(tag.as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub context: CursorContext,
    pub position: IndexKey,
}

impl Cursor {
    #[must_use]
    pub fn new(context: CursorContext, content_id: ContentId, sort_value: i64) -> Self {
        Self {
            context,
            position: IndexKey {
                sort_value,
                content_id,
            },
        }
    }

    #[must_use]
    pub fn content_id(&self) -> ContentId {
        self.position.content_id
    }

    #[must_use]
    pub fn sort_value(&self) -> i64 {
        self.position.sort_value
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(CURSOR_LEN);
        bytes.push(CURSOR_VERSION);
        bytes.push(self.context.sort.tag());
        bytes.push(self.context.direction.tag());
        bytes.extend_from_slice(self.context.scope_id.as_bytes());
        bytes.extend_from_slice(&self.context.filter);
        bytes.extend_from_slice(self.position.content_id.as_bytes());
        bytes.extend_from_slice(&self.position.sort_value.to_be_bytes());
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Decodes a cursor and checks it was issued for `expected`.
    pub fn decode(encoded: &str, expected: &CursorContext) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CursorError::Encoding)?;
        if bytes.len() != CURSOR_LEN {
            return Err(CursorError::Length(bytes.len()));
        }
        if bytes[0] != CURSOR_VERSION {
            return Err(CursorError::Version(bytes[0]));
        }
        if bytes[1] != expected.sort.tag()
            || bytes[2] != expected.direction.tag()
            || bytes[3..19] != expected.scope_id.as_bytes()[..]
            || bytes[19..27] != expected.filter[..]
        {
            return Err(CursorError::ContextMismatch);
        }

        let content_id = Uuid::from_slice(&bytes[27..43]).map_err(|_| CursorError::Encoding)?;
        let mut sort_value = [0u8; 8];
        sort_value.copy_from_slice(&bytes[43..51]);

        Ok(Self::new(
            *expected,
            ContentId(content_id),
            i64::from_be_bytes(sort_value),
        ))
    }
}
