//! Protected identifiers.
//!
//! Every entity is referenced by an opaque string. Wrapping the string in
//! [`ProtectedId<T>`] with a zero-sized tag makes a `PartId` and a
//! `SegmentId` different types, so passing one where the other is expected
//! fails to compile. Equality, ordering and hashing are plain string
//! semantics; serialisation is the bare string.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::hashing::get_hash;

/// An immutable, type-tagged string identifier.
pub struct ProtectedId<T> {
    value: String,
    _tag: PhantomData<fn() -> T>,
}

impl<T> ProtectedId<T> {
    /// Wrap an existing string. Use this when the id comes from storage or
    /// from another system; new ids should come from [`random`](Self::random)
    /// or [`from_hash`](Self::from_hash).
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _tag: PhantomData,
        }
    }

    /// A fresh random id.
    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    /// A deterministic id derived from its components, so re-running the
    /// same derivation (e.g. re-ingesting the same NRCS object) yields the
    /// same id.
    pub fn from_hash(components: &[&str]) -> Self {
        Self::new(get_hash(&components.join("_")))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl<T> Clone for ProtectedId<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for ProtectedId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for ProtectedId<T> {}

impl<T> PartialOrd for ProtectedId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ProtectedId<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for ProtectedId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> Borrow<str> for ProtectedId<T> {
    fn borrow(&self) -> &str {
        &self.value
    }
}

impl<T> AsRef<str> for ProtectedId<T> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl<T> fmt::Debug for ProtectedId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.value, f)
    }
}

impl<T> fmt::Display for ProtectedId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> From<&str> for ProtectedId<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T> From<String> for ProtectedId<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T> Serialize for ProtectedId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T> Deserialize<'de> for ProtectedId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

macro_rules! protected_ids {
    ($($(#[$meta:meta])* $alias:ident => $tag:ident),* $(,)?) => {
        $(
            #[doc(hidden)]
            #[derive(Debug)]
            pub enum $tag {}

            $(#[$meta])*
            pub type $alias = ProtectedId<$tag>;
        )*
    };
}

protected_ids! {
    /// A studio: one physical installation with its devices and mappings.
    StudioId => StudioTag,
    ShowStyleBaseId => ShowStyleBaseTag,
    ShowStyleVariantId => ShowStyleVariantTag,
    RundownId => RundownTag,
    /// The activation unit grouping one or more rundowns.
    RundownPlaylistId => RundownPlaylistTag,
    SegmentId => SegmentTag,
    PartId => PartTag,
    PieceId => PieceTag,
    PartInstanceId => PartInstanceTag,
    PieceInstanceId => PieceInstanceTag,
    /// Shared by every continuation of one infinite piece.
    PieceInstanceInfiniteId => PieceInstanceInfiniteTag,
    RouteSetId => RouteSetTag,
    /// Changes every time a playlist is (re-)activated.
    ActivationId => ActivationTag,
}
