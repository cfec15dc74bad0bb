/*!
Path helpers for the `version-hint.text` pointer and the metadata/manifest
files it names (spec §3, §6 storage layout).
*/

use uuid::Uuid;

/// `<location>/metadata/version-hint.text`.
pub fn version_hint_path(location: &str) -> String {
    format!("{location}/metadata/version-hint.text")
}

/// `<location>/metadata/<n>-<uuid>.metadata.json`, immutable once written.
pub fn metadata_path(location: &str, n: u64, uuid: Uuid) -> String {
    format!("{location}/metadata/{n}-{uuid}.metadata.json")
}

/// `<location>/metadata/manifest-<snapshot_id>.json`.
pub fn manifest_path(location: &str, snapshot_id: i64) -> String {
    format!("{location}/metadata/manifest-{snapshot_id}.json")
}

/// `<location>/data/<uuid>.parquet`.
pub fn data_file_path(location: &str, uuid: Uuid) -> String {
    format!("{location}/data/{uuid}.parquet")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_at_location() {
        assert_eq!(version_hint_path("wh/db/users"), "wh/db/users/metadata/version-hint.text");
        let uuid = Uuid::nil();
        assert_eq!(
            metadata_path("wh/db/users", 3, uuid),
            format!("wh/db/users/metadata/3-{uuid}.metadata.json")
        );
    }
}
