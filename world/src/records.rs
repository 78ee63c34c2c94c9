//! Codecs for the records kept in the durable store.

use std::collections::BTreeMap;

use geocoin_core::{CacheSnapshot, CellAddress, RecordKind, SnapshotError};
use serde::{de::DeserializeOwned, Serialize};

/// Serializes a record value to its stored JSON form.
pub(crate) fn encode<T: Serialize>(record: RecordKind, value: &T) -> Result<String, SnapshotError> {
    serde_json::to_string(value).map_err(|error| SnapshotError::malformed(format!("{record}: {error}")))
}

/// Parses a stored record.
pub(crate) fn decode<T: DeserializeOwned>(record: RecordKind, raw: &str) -> Result<T, SnapshotError> {
    serde_json::from_str(raw).map_err(|error| SnapshotError::malformed(format!("{record}: {error}")))
}

/// Stores snapshots as a list of individually encoded snapshot strings.
pub(crate) fn encode_snapshots(
    snapshots: &BTreeMap<CellAddress, CacheSnapshot>,
) -> Result<String, SnapshotError> {
    let encoded: Vec<String> = snapshots.values().map(CacheSnapshot::encode).collect();
    encode(RecordKind::CacheSnapshots, &encoded)
}

/// Parses the snapshot list. Entries that fail to decode are returned
/// separately so the remaining snapshots still load.
pub(crate) fn decode_snapshots(
    raw: &str,
) -> Result<(Vec<CacheSnapshot>, Vec<SnapshotError>), SnapshotError> {
    let entries: Vec<String> = decode(RecordKind::CacheSnapshots, raw)?;
    let mut snapshots = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();
    for entry in entries {
        match CacheSnapshot::decode(&entry) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(error) => rejected.push(error),
        }
    }
    Ok((snapshots, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocoin_core::Position;

    #[test]
    fn snapshot_list_isolates_bad_entries() {
        let raw = r#"["{\"i\":1,\"j\":2,\"numCoins\":3}","garbage","{\"i\":4,\"j\":5,\"numCoins\":\"6\"}"]"#;
        let (snapshots, rejected) = decode_snapshots(raw).expect("outer list parses");
        assert_eq!(
            snapshots,
            vec![
                CacheSnapshot::new(CellAddress::new(1, 2), 3),
                CacheSnapshot::new(CellAddress::new(4, 5), 6),
            ]
        );
        assert_eq!(rejected.len(), 1);
    }

    #[test]
    fn snapshot_list_round_trips() {
        let mut snapshots = BTreeMap::new();
        for (i, j, coins) in [(0, 0, 1), (-3, 8, 0)] {
            let cell = CellAddress::new(i, j);
            let _ = snapshots.insert(cell, CacheSnapshot::new(cell, coins));
        }

        let raw = encode_snapshots(&snapshots).expect("encodes");
        let (decoded, rejected) = decode_snapshots(&raw).expect("decodes");

        assert!(rejected.is_empty());
        assert_eq!(decoded, snapshots.values().copied().collect::<Vec<_>>());
    }

    #[test]
    fn decode_names_the_failing_record() {
        let error = decode::<Position>(RecordKind::PlayerPosition, "[1, 2")
            .expect_err("truncated json");
        let SnapshotError::Malformed { reason } = error;
        assert!(reason.starts_with("player_position:"), "unexpected reason: {reason}");
    }
}
