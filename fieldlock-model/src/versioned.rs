use serde::{Deserialize, Serialize};

/// A field value together with its sync state.
///
/// The `{value, version, dirty}` triple always travels as one unit — a value
/// is never overwritten without its dirty flag moving, and a version never
/// advances without server confirmation. The methods below are the only
/// mutation paths, so every caller gets the same rules:
///
/// - `set` marks the field dirty and leaves the version alone (the version
///   is what the server last confirmed, not what we hope it will be),
/// - `confirm_push` adopts a server-assigned version and clears dirty,
/// - `apply_pull` only applies strictly newer versions and wins over any
///   unconfirmed local edit ("last pull wins", not a merge),
/// - `reset_version` is the key-rotation escape hatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    value: T,
    version: u64,
    dirty: bool,
}

impl<T> Versioned<T> {
    /// A brand-new local value the server has never seen: version 0, dirty.
    pub fn local(value: T) -> Self {
        Self {
            value,
            version: 0,
            dirty: true,
        }
    }

    /// A value at a server-confirmed version: clean.
    pub fn synced(value: T, version: u64) -> Self {
        Self {
            value,
            version,
            dirty: false,
        }
    }

    /// Rebuilds a triple from persisted state.
    pub fn from_parts(value: T, version: u64, dirty: bool) -> Self {
        Self {
            value,
            version,
            dirty,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Overwrites the value with a local edit. The version stays at the last
    /// server-confirmed value until a push succeeds.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }

    /// Records a server-confirmed push of this field.
    pub fn confirm_push(&mut self, new_version: u64) {
        self.version = new_version;
        self.dirty = false;
    }

    /// Applies a pulled value if it is strictly newer than what we hold.
    ///
    /// Returns whether the pull applied. An incoming version at or below
    /// ours is a no-op, which makes repeated pulls idempotent. When it does
    /// apply, any unconfirmed local edit is discarded and dirty cleared —
    /// pull is authoritative.
    pub fn apply_pull(&mut self, value: T, version: u64) -> bool {
        if version <= self.version {
            return false;
        }
        self.value = value;
        self.version = version;
        self.dirty = false;
        true
    }

    /// Forces the version back to 0 and marks the field dirty, so the next
    /// push submits it as a fresh write. Used only by key rotation.
    pub fn reset_version(&mut self) {
        self.version = 0;
        self.dirty = true;
    }
}
