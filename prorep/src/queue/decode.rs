//! Decoding of queue entry names and payloads.
//!
//! Entry names follow `<marker>__<table>__e__<epoch>__<operation>.json`, where the marker is
//! `t` or `1` and the operation is one of `insert`, `update`, `write` or `delete`.

use crate::error::{ErrorKind, ProrepError, ProrepResult};
use crate::prorep_error;
use crate::types::{EntryMetadata, Epoch, Operation, Payload};

/// Extension every queue entry name ends with.
pub const ENTRY_EXTENSION: &str = ".json";

const FIELD_SEPARATOR: &str = "__";
const EPOCH_SEPARATOR: &str = "__e__";
const MARKERS: [&str; 2] = ["t", "1"];

/// Decodes the metadata embedded in a queue entry file name.
pub fn decode_entry_name(file_name: &str) -> ProrepResult<EntryMetadata> {
    let malformed = || {
        prorep_error!(
            ErrorKind::MalformedEntry,
            "Queue entry name does not match the naming pattern",
            file_name
        )
    };

    let stem = file_name
        .strip_suffix(ENTRY_EXTENSION)
        .ok_or_else(malformed)?;
    let (rest, operation) = stem.rsplit_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
    let operation: Operation = operation.parse().map_err(|_| malformed())?;

    let (marker, rest) = rest.split_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
    if !MARKERS.contains(&marker) {
        return Err(malformed());
    }

    // The table needs at least one character, so the separator search starts after it.
    let first_len = rest.chars().next().map(char::len_utf8).ok_or_else(malformed)?;
    let separator_at = rest[first_len..]
        .find(EPOCH_SEPARATOR)
        .map(|index| index + first_len)
        .ok_or_else(malformed)?;
    let table = &rest[..separator_at];
    let epoch = &rest[separator_at + EPOCH_SEPARATOR.len()..];

    let epoch = epoch.parse::<i64>().map_err(|err| {
        prorep_error!(
            ErrorKind::MalformedEntry,
            "Queue entry epoch is not an integer",
            file_name,
            source: err
        )
    })?;

    Ok(EntryMetadata {
        marker: marker.to_string(),
        table: table.to_string(),
        epoch: Epoch(epoch),
        operation,
    })
}

/// Parses a queue entry payload.
pub fn decode_payload(bytes: &[u8]) -> ProrepResult<Payload> {
    serde_json::from_slice(bytes).map_err(|err: serde_json::Error| -> ProrepError {
        prorep_error!(
            ErrorKind::UnreadablePayload,
            "Queue entry payload could not be parsed",
            err.to_string(),
            source: err
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_well_formed_names() {
        let metadata = decode_entry_name("t__customer__e__1700000000000__insert.json").unwrap();

        assert_eq!(
            metadata,
            EntryMetadata {
                marker: "t".to_string(),
                table: "customer".to_string(),
                epoch: Epoch(1700000000000),
                operation: Operation::Insert,
            }
        );
    }

    #[test]
    fn tables_may_contain_separators() {
        let metadata = decode_entry_name("1__order__line__e__42__delete.json").unwrap();

        assert_eq!(metadata.marker, "1");
        assert_eq!(metadata.table, "order__line");
        assert_eq!(metadata.operation, Operation::Delete);
    }

    #[test]
    fn rejects_malformed_names() {
        let names = [
            "notes.txt",
            "customer.json",
            "x__customer__e__1__insert.json",
            "t__customer__e__1__merge.json",
            "t__customer__1__insert.json",
            "t____e__1__insert.json",
            "t__customer__e__soon__write.json",
            "t__customer__e__1__insert.json_partial",
        ];

        for name in names {
            let err = decode_entry_name(name).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedEntry, "{name}");
        }
    }

    #[test]
    fn payload_errors_are_unreadable() {
        let err = decode_payload(b"{\"tt\": [").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadablePayload);

        let err = decode_payload(b"{\"rows\": []}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnreadablePayload);

        let payload = decode_payload(br#"{"tt": [{"rec_id": 1, "epoch_time": 2}]}"#).unwrap();
        assert_eq!(payload.tt.len(), 1);
    }
}
