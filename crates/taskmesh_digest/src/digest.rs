//! Entity digest computation.

use crate::canonical::canonical_bytes;
use crate::error::{DigestError, DigestResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use taskmesh_model::Entity;

/// SHA-256 fingerprint of an entity's canonical content.
///
/// Travels on the wire as a 64-character lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityDigest([u8; 32]);

impl EntityDigest {
    /// Creates a digest from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Renders the digest as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl fmt::Debug for EntityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityDigest({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for EntityDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for EntityDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(DigestError::MalformedDigest(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_nibble(chunk[0])?;
            let lo = hex_nibble(chunk[1])?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_nibble(c: u8) -> DigestResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(DigestError::MalformedDigest(format!(
            "invalid hex character {:?}",
            c as char
        ))),
    }
}

impl Serialize for EntityDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EntityDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Computes the canonical digest of an entity.
///
/// Deterministic and side-effect free: repeated calls on unchanged
/// content return the same digest, and any difference in a non-excluded
/// field produces a different digest.
pub fn digest_entity(entity: &Entity) -> DigestResult<EntityDigest> {
    let bytes = canonical_bytes(entity)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(EntityDigest(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use taskmesh_model::{EntityId, Task, Timestamp, User};

    fn sample_task() -> Entity {
        let mut task = Task::new(EntityId::new(9), "take out trash", Timestamp::from_millis(77));
        task.notes = Some("tuesday night".into());
        task.assignee_ids = vec![EntityId::new(2)];
        Entity::from(task)
    }

    #[test]
    fn digest_is_deterministic() {
        let entity = sample_task();
        assert_eq!(
            digest_entity(&entity).unwrap(),
            digest_entity(&entity).unwrap()
        );
    }

    #[test]
    fn digest_changes_with_content() {
        let entity = sample_task();
        let mut changed = sample_task();
        if let Entity::Task(task) = &mut changed {
            task.completed = true;
        }
        assert_ne!(
            digest_entity(&entity).unwrap(),
            digest_entity(&changed).unwrap()
        );
    }

    #[test]
    fn tombstone_changes_digest() {
        let entity = sample_task();
        let mut deleted = sample_task();
        deleted.mark_deleted();
        assert_ne!(
            digest_entity(&entity).unwrap(),
            digest_entity(&deleted).unwrap()
        );
    }

    #[test]
    fn hex_roundtrip() {
        let digest = digest_entity(&sample_task()).unwrap();
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<EntityDigest>().unwrap(), digest);
    }

    #[test]
    fn malformed_hex_rejected() {
        assert!("abc".parse::<EntityDigest>().is_err());
        assert!("zz".repeat(32).parse::<EntityDigest>().is_err());
    }

    #[test]
    fn serde_as_hex_string() {
        let digest = digest_entity(&sample_task()).unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));

        let back: EntityDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }

    proptest! {
        #[test]
        fn name_sensitivity(name_a in "[a-z]{1,12}", name_b in "[a-z]{1,12}") {
            let a = Entity::from(User::new(EntityId::new(1), name_a.clone(), Timestamp::EPOCH));
            let b = Entity::from(User::new(EntityId::new(1), name_b.clone(), Timestamp::EPOCH));

            let da = digest_entity(&a).unwrap();
            let db = digest_entity(&b).unwrap();
            prop_assert_eq!(da == db, name_a == name_b);
        }

        #[test]
        fn timestamp_insensitivity(millis in 0i64..1_000_000_000) {
            let base = Entity::from(User::new(EntityId::new(1), "p", Timestamp::EPOCH));
            let moved = Entity::from(User::new(
                EntityId::new(1),
                "p",
                Timestamp::from_millis(millis),
            ));
            prop_assert_eq!(digest_entity(&base).unwrap(), digest_entity(&moved).unwrap());
        }
    }
}
