//! Relay events and the signing seam.
//!
//! Publishing an event means turning an [`UnsignedEvent`] into a
//! [`SignedEvent`]. The signature algorithm lives behind the [`Signer`]
//! trait; this module only fixes the data shapes and the canonical
//! commitment a signer hashes into the event id.
//!
//! # Example
//!
//! ```
//! use relay_link::UnsignedEvent;
//!
//! let event = UnsignedEvent::new(1, "hello").with_tag(["t", "greeting"]);
//! let commitment = event.commitment("ab12", 1_700_000_000)?;
//!
//! assert_eq!(
//!     commitment,
//!     r#"[0,"ab12",1700000000,1,[["t","greeting"]],"hello"]"#
//! );
//! # Ok::<(), relay_link::Error>(())
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};

// ============================================================================
// UnsignedEvent
// ============================================================================

/// Event content before signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEvent {
    /// Event kind.
    pub kind: u32,
    /// Tag lists, e.g. `["attachment", hash, size, mime]`.
    pub tags: Vec<Vec<String>>,
    /// Free-form content.
    pub content: String,
}

impl UnsignedEvent {
    /// Creates an event without tags.
    #[must_use]
    pub fn new(kind: u32, content: impl Into<String>) -> Self {
        Self {
            kind,
            tags: Vec::new(),
            content: content.into(),
        }
    }

    /// Appends a tag.
    #[must_use]
    pub fn with_tag<I, S>(mut self, tag: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(tag.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the canonical serialization a signer hashes into the id.
    ///
    /// The layout is `[0, pubkey, created_at, kind, tags, content]` as
    /// compact JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn commitment(&self, pubkey: &str, created_at: u64) -> Result<String> {
        let array = json!([0, pubkey, created_at, self.kind, self.tags, self.content]);
        Ok(serde_json::to_string(&array)?)
    }

    /// Attaches the signer's output.
    #[must_use]
    pub fn into_signed(
        self,
        id: impl Into<String>,
        pubkey: impl Into<String>,
        created_at: u64,
        sig: impl Into<String>,
    ) -> SignedEvent {
        SignedEvent {
            id: id.into(),
            pubkey: pubkey.into(),
            created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: sig.into(),
        }
    }
}

// ============================================================================
// SignedEvent
// ============================================================================

/// Event ready to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Hex digest of the commitment.
    pub id: String,
    /// Hex public key of the author.
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: u64,
    /// Event kind.
    pub kind: u32,
    /// Tag lists.
    pub tags: Vec<Vec<String>>,
    /// Free-form content.
    pub content: String,
    /// Hex signature over `id`.
    pub sig: String,
}

impl SignedEvent {
    /// Recomputes the commitment from this event's fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn commitment(&self) -> Result<String> {
        let array = json!([0, self.pubkey, self.created_at, self.kind, self.tags, self.content]);
        Ok(serde_json::to_string(&array)?)
    }

    /// Returns the values of every tag named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().is_some_and(|n| n == name))
            .map(|tag| &tag[1..])
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Produces signed events.
///
/// Implementations own the key material. They are expected to take
/// `created_at` from [`unix_now`], hash
/// [`commitment`](UnsignedEvent::commitment) into the id and sign the id.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs `event`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Signing`] if the key material cannot sign.
    async fn sign(&self, event: UnsignedEvent) -> Result<SignedEvent>;

    /// Returns the hex public key events are signed with.
    fn public_key(&self) -> String;
}

/// Returns the current Unix time in seconds.
///
/// # Errors
///
/// Returns [`Error::Signing`] if the system clock is before the epoch.
pub fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .map_err(|e| Error::signing(format!("system clock before epoch: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
