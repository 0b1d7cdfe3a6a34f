use chrono::Utc;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};

use crate::store::{keys, KvStore};

/// Unambiguous alphabet for share codes (no 0/O/1/l/I lookalikes).
const CODE_ALPHABET: &[u8] = b"abcdefghijkmnopqrstuvwxyz23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const CODE_LEN: usize = 8;
const CODE_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Animation,
    Audio,
    Voice,
}

/// One stored media reference. The file id is an opaque handle minted by the
/// messaging API; no bytes are stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub file_id: String,
    #[serde(default)]
    pub caption: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntry {
    pub code: String,
    #[serde(flatten)]
    pub item: MediaItem,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub code: String,
    #[serde(default)]
    pub items: Vec<MediaItem>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug)]
pub enum Resolved {
    Media(MediaEntry),
    Bundle(Bundle),
    None,
}

/// Summary of a code for the admin info flow and the share page.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub kind: &'static str,
    pub disabled: bool,
    pub created_at: i64,
    pub media_kind: Option<MediaKind>,
    pub item_count: usize,
}

pub fn generate_code() -> String {
    let mut rng = thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Persists a single-media entry under a fresh code. Collisions against
/// existing media keys are retried a bounded number of times; the residual
/// collision probability over a 58^8 space is accepted.
pub fn create_media(store: &dyn KvStore, item: MediaItem) -> Result<String, crate::store::StoreError> {
    let mut code = generate_code();
    for _ in 0..CODE_RETRIES {
        match store.get(&keys::media_key(&code)) {
            Ok(None) => break,
            Ok(Some(_)) => code = generate_code(),
            Err(e) => return Err(e),
        }
    }

    let entry = MediaEntry {
        code: code.clone(),
        item,
        disabled: false,
        created_at: Utc::now().timestamp_millis(),
    };
    save_media(store, &entry)?;
    Ok(code)
}

/// Creates an empty bundle and returns its code. Items are appended one per
/// received media message while the admin's upload session is open.
pub fn open_bundle(store: &dyn KvStore) -> Result<String, crate::store::StoreError> {
    let code = generate_code();
    let bundle = Bundle {
        code: code.clone(),
        items: Vec::new(),
        disabled: false,
        created_at: Utc::now().timestamp_millis(),
    };
    save_bundle(store, &bundle)?;
    Ok(code)
}

/// Appends an item to an open bundle and returns the new item count.
/// Load-append-save is not atomic; concurrent appends to the same code can
/// lose an update. Returns 0 when the store is unavailable.
pub fn append_to_bundle(store: &dyn KvStore, code: &str, item: MediaItem) -> usize {
    let mut bundle = match get_bundle(store, code) {
        Some(b) => b,
        None => Bundle {
            code: code.to_string(),
            items: Vec::new(),
            disabled: false,
            created_at: Utc::now().timestamp_millis(),
        },
    };
    bundle.items.push(item);
    let count = bundle.items.len();
    match save_bundle(store, &bundle) {
        Ok(()) => count,
        Err(e) => {
            tracing::warn!("Failed to append to bundle {}: {}", code, e);
            0
        }
    }
}

pub fn get_media(store: &dyn KvStore, code: &str) -> Option<MediaEntry> {
    let raw = store.get(&keys::media_key(code)).ok().flatten()?;
    serde_json::from_str(&raw).ok()
}

pub fn get_bundle(store: &dyn KvStore, code: &str) -> Option<Bundle> {
    let raw = store.get(&keys::bundle_key(code)).ok().flatten()?;
    serde_json::from_str(&raw).ok()
}

/// Probes both key namespaces. A media entry wins over a bundle with the
/// same code, which should not occur under normal operation.
pub fn resolve(store: &dyn KvStore, code: &str) -> Resolved {
    if let Some(media) = get_media(store, code) {
        return Resolved::Media(media);
    }
    if let Some(bundle) = get_bundle(store, code) {
        return Resolved::Bundle(bundle);
    }
    Resolved::None
}

/// Flips the disabled flag on either kind of entry. Returns false when the
/// code resolves to nothing or the store write fails.
pub fn set_disabled(store: &dyn KvStore, code: &str, disabled: bool) -> bool {
    match resolve(store, code) {
        Resolved::Media(mut entry) => {
            entry.disabled = disabled;
            save_media(store, &entry).is_ok()
        }
        Resolved::Bundle(mut bundle) => {
            bundle.disabled = disabled;
            save_bundle(store, &bundle).is_ok()
        }
        Resolved::None => false,
    }
}

/// Removes a code from both namespaces. Returns false only when the code
/// did not exist or the store failed.
pub fn delete_code(store: &dyn KvStore, code: &str) -> bool {
    if matches!(resolve(store, code), Resolved::None) {
        return false;
    }
    let media = store.delete(&keys::media_key(code));
    let bundle = store.delete(&keys::bundle_key(code));
    if let Err(e) = &media {
        tracing::warn!("Failed to delete media {}: {}", code, e);
    }
    if let Err(e) = &bundle {
        tracing::warn!("Failed to delete bundle {}: {}", code, e);
    }
    media.is_ok() && bundle.is_ok()
}

pub fn link_info(store: &dyn KvStore, code: &str) -> Option<LinkInfo> {
    match resolve(store, code) {
        Resolved::Media(entry) => Some(LinkInfo {
            kind: "media",
            disabled: entry.disabled,
            created_at: entry.created_at,
            media_kind: Some(entry.item.kind),
            item_count: 1,
        }),
        Resolved::Bundle(bundle) => Some(LinkInfo {
            kind: "bundle",
            disabled: bundle.disabled,
            created_at: bundle.created_at,
            media_kind: None,
            item_count: bundle.items.len(),
        }),
        Resolved::None => None,
    }
}

fn save_media(store: &dyn KvStore, entry: &MediaEntry) -> Result<(), crate::store::StoreError> {
    let json = serde_json::to_string(entry).unwrap_or_default();
    store.put(&keys::media_key(&entry.code), &json)
}

fn save_bundle(store: &dyn KvStore, bundle: &Bundle) -> Result<(), crate::store::StoreError> {
    let json = serde_json::to_string(bundle).unwrap_or_default();
    store.put(&keys::bundle_key(&bundle.code), &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::BrokenStore;
    use crate::store::MemoryStore;

    fn photo(file_id: &str) -> MediaItem {
        MediaItem {
            kind: MediaKind::Photo,
            file_id: file_id.to_string(),
            caption: String::new(),
        }
    }

    #[test]
    fn generated_codes_use_the_unambiguous_alphabet() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 8);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn create_then_resolve_roundtrips_the_item() {
        let store = MemoryStore::new();
        let item = MediaItem {
            kind: MediaKind::Video,
            file_id: "vid123".to_string(),
            caption: "a caption".to_string(),
        };
        let code = create_media(&store, item.clone()).unwrap();

        match resolve(&store, &code) {
            Resolved::Media(entry) => {
                assert_eq!(entry.item, item);
                assert!(!entry.disabled);
                assert!(entry.created_at > 0);
            }
            other => panic!("expected media, got {:?}", other),
        }
    }

    #[test]
    fn bundle_preserves_insertion_order() {
        let store = MemoryStore::new();
        let code = open_bundle(&store).unwrap();
        assert_eq!(append_to_bundle(&store, &code, photo("a")), 1);
        assert_eq!(append_to_bundle(&store, &code, photo("b")), 2);
        assert_eq!(append_to_bundle(&store, &code, photo("c")), 3);

        match resolve(&store, &code) {
            Resolved::Bundle(bundle) => {
                let ids: Vec<&str> = bundle.items.iter().map(|i| i.file_id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b", "c"]);
            }
            other => panic!("expected bundle, got {:?}", other),
        }
    }

    #[test]
    fn append_returns_zero_when_store_is_unavailable() {
        assert_eq!(append_to_bundle(&BrokenStore, "abc", photo("a")), 0);
    }

    #[test]
    fn disable_enable_toggles_without_touching_payload() {
        let store = MemoryStore::new();
        let code = create_media(&store, photo("p")).unwrap();

        assert!(set_disabled(&store, &code, true));
        match resolve(&store, &code) {
            Resolved::Media(entry) => {
                assert!(entry.disabled);
                assert_eq!(entry.item.file_id, "p");
            }
            other => panic!("expected media, got {:?}", other),
        }

        assert!(set_disabled(&store, &code, false));
        match resolve(&store, &code) {
            Resolved::Media(entry) => assert!(!entry.disabled),
            other => panic!("expected media, got {:?}", other),
        }
    }

    #[test]
    fn set_disabled_reports_unknown_codes() {
        let store = MemoryStore::new();
        assert!(!set_disabled(&store, "nope", true));
    }

    #[test]
    fn delete_clears_both_namespaces() {
        let store = MemoryStore::new();
        let media_code = create_media(&store, photo("p")).unwrap();
        let bundle_code = open_bundle(&store).unwrap();

        assert!(delete_code(&store, &media_code));
        assert!(delete_code(&store, &bundle_code));
        assert!(matches!(resolve(&store, &media_code), Resolved::None));
        assert!(matches!(resolve(&store, &bundle_code), Resolved::None));
        assert!(!delete_code(&store, &media_code));
    }

    #[test]
    fn media_wins_over_bundle_on_the_same_code() {
        let store = MemoryStore::new();
        let entry = MediaEntry {
            code: "shared".to_string(),
            item: photo("p"),
            disabled: false,
            created_at: 1,
        };
        save_media(&store, &entry).unwrap();
        let bundle = Bundle {
            code: "shared".to_string(),
            items: vec![photo("q")],
            disabled: false,
            created_at: 1,
        };
        save_bundle(&store, &bundle).unwrap();

        assert!(matches!(resolve(&store, "shared"), Resolved::Media(_)));
    }

    #[test]
    fn link_info_summarizes_both_kinds() {
        let store = MemoryStore::new();
        let media_code = create_media(&store, photo("p")).unwrap();
        let bundle_code = open_bundle(&store).unwrap();
        append_to_bundle(&store, &bundle_code, photo("a"));
        append_to_bundle(&store, &bundle_code, photo("b"));

        let info = link_info(&store, &media_code).unwrap();
        assert_eq!(info.kind, "media");
        assert_eq!(info.media_kind, Some(MediaKind::Photo));

        let info = link_info(&store, &bundle_code).unwrap();
        assert_eq!(info.kind, "bundle");
        assert_eq!(info.item_count, 2);

        assert!(link_info(&store, "missing").is_none());
    }

    #[test]
    fn entry_json_uses_the_wire_field_names() {
        let entry = MediaEntry {
            code: "c".to_string(),
            item: photo("f"),
            disabled: false,
            created_at: 7,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"type\":\"photo\""));
        assert!(json.contains("\"file_id\":\"f\""));
    }
}
