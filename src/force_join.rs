use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::store::{keys, KvStore};

/// One gating condition. Public channels are addressed by username, private
/// ones by numeric chat id plus the invite link users need to get in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ForceJoinRule {
    Username { username: String },
    Private { chat_id: i64, invite: String },
}

impl ForceJoinRule {
    pub fn username(raw: &str) -> Self {
        ForceJoinRule::Username {
            username: raw.trim().trim_start_matches('@').to_string(),
        }
    }

    /// Structural key used for dedup and for the multi-select removal flow.
    pub fn key(&self) -> String {
        match self {
            ForceJoinRule::Username { username } => format!("u:{}", username),
            ForceJoinRule::Private { chat_id, invite } => format!("p:{}:{}", chat_id, invite),
        }
    }

    pub fn label(&self) -> String {
        match self {
            ForceJoinRule::Username { username } => format!("@{}", username),
            ForceJoinRule::Private { chat_id, .. } => format!("private {}", chat_id),
        }
    }

    /// URL put on the "join" button for this rule.
    pub fn join_url(&self) -> String {
        match self {
            ForceJoinRule::Username { username } => format!("https://t.me/{}", username),
            ForceJoinRule::Private { invite, .. } => invite.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinCheck {
    pub required: bool,
    pub satisfied: bool,
}

/// Membership lookup against the messaging API. The real implementation
/// queries `getChatMember`; tests substitute a table of memberships.
pub trait MembershipProbe {
    fn is_member(
        &self,
        rule: &ForceJoinRule,
        user_id: u64,
    ) -> impl std::future::Future<Output = anyhow::Result<bool>> + Send;
}

/// Conjunction over all configured rules: every channel must report the user
/// as a current member. The first non-member or lookup failure short-circuits
/// to unsatisfied. An empty rule list gates nothing.
pub async fn evaluate<P: MembershipProbe + Sync>(
    rules: &[ForceJoinRule],
    user_id: u64,
    probe: &P,
) -> JoinCheck {
    if rules.is_empty() {
        return JoinCheck {
            required: false,
            satisfied: true,
        };
    }
    for rule in rules {
        match probe.is_member(rule, user_id).await {
            Ok(true) => {}
            Ok(false) => {
                return JoinCheck {
                    required: true,
                    satisfied: false,
                }
            }
            Err(e) => {
                tracing::warn!("Membership lookup failed for {}: {}", rule.key(), e);
                return JoinCheck {
                    required: true,
                    satisfied: false,
                };
            }
        }
    }
    JoinCheck {
        required: true,
        satisfied: true,
    }
}

/// Loads the rule list, tolerating the three historical storage shapes:
/// a JSON array, a single JSON rule object, or a bare username string.
pub fn load_rules(store: &dyn KvStore) -> Vec<ForceJoinRule> {
    let raw = match store.get(keys::CONFIG_FORCE_JOIN) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!("Failed to load force-join rules: {}", e);
            return Vec::new();
        }
    };
    decode_rules(&raw)
}

fn decode_rules(raw: &str) -> Vec<ForceJoinRule> {
    if let Ok(rules) = serde_json::from_str::<Vec<ForceJoinRule>>(raw) {
        return rules;
    }
    if let Ok(rule) = serde_json::from_str::<ForceJoinRule>(raw) {
        return vec![rule];
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![ForceJoinRule::username(trimmed)]
    }
}

pub fn save_rules(store: &dyn KvStore, rules: &[ForceJoinRule]) {
    let json = serde_json::to_string(rules).unwrap_or_else(|_| "[]".to_string());
    if let Err(e) = store.put(keys::CONFIG_FORCE_JOIN, &json) {
        tracing::warn!("Failed to save force-join rules: {}", e);
    }
}

/// Appends a rule unless its structural key is already present; insertion
/// order is preserved for display. Returns the resulting list.
pub fn add_rule(store: &dyn KvStore, rule: ForceJoinRule) -> Vec<ForceJoinRule> {
    let mut rules = load_rules(store);
    let existing: BTreeSet<String> = rules.iter().map(|r| r.key()).collect();
    if !existing.contains(&rule.key()) {
        rules.push(rule);
        save_rules(store, &rules);
    }
    rules
}

/// Drops every rule whose structural key is in `to_remove` and returns the
/// removed count.
pub fn remove_rules(store: &dyn KvStore, to_remove: &BTreeSet<String>) -> usize {
    let rules = load_rules(store);
    let before = rules.len();
    let remaining: Vec<ForceJoinRule> = rules
        .into_iter()
        .filter(|r| !to_remove.contains(&r.key()))
        .collect();
    let removed = before - remaining.len();
    if removed > 0 {
        save_rules(store, &remaining);
    }
    removed
}

/// Rule keys an admin has staged for deletion in the interactive removal
/// flow; transient, cleared on confirm or cancel.
pub fn get_remove_selection(store: &dyn KvStore, user_id: u64) -> BTreeSet<String> {
    let raw = match store.get(&keys::rmjoin_key(user_id)) {
        Ok(Some(raw)) => raw,
        _ => return BTreeSet::new(),
    };
    serde_json::from_str::<Vec<String>>(&raw)
        .map(|v| v.into_iter().collect())
        .unwrap_or_default()
}

pub fn set_remove_selection(store: &dyn KvStore, user_id: u64, selection: &BTreeSet<String>) {
    let list: Vec<&String> = selection.iter().collect();
    let json = serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string());
    if let Err(e) = store.put(&keys::rmjoin_key(user_id), &json) {
        tracing::warn!("Failed to save removal selection for {}: {}", user_id, e);
    }
}

pub fn clear_remove_selection(store: &dyn KvStore, user_id: u64) {
    if let Err(e) = store.delete(&keys::rmjoin_key(user_id)) {
        tracing::warn!("Failed to clear removal selection for {}: {}", user_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    /// Probe backed by a set of (rule key, user id) memberships.
    struct TableProbe {
        members: HashSet<(String, u64)>,
        fail_on: Option<String>,
    }

    impl TableProbe {
        fn new(members: &[(&ForceJoinRule, u64)]) -> Self {
            TableProbe {
                members: members
                    .iter()
                    .map(|(rule, id)| (rule.key(), *id))
                    .collect(),
                fail_on: None,
            }
        }
    }

    impl MembershipProbe for TableProbe {
        async fn is_member(&self, rule: &ForceJoinRule, user_id: u64) -> anyhow::Result<bool> {
            if self.fail_on.as_deref() == Some(rule.key().as_str()) {
                anyhow::bail!("lookup failed");
            }
            Ok(self.members.contains(&(rule.key(), user_id)))
        }
    }

    fn public(name: &str) -> ForceJoinRule {
        ForceJoinRule::username(name)
    }

    fn private(chat_id: i64, invite: &str) -> ForceJoinRule {
        ForceJoinRule::Private {
            chat_id,
            invite: invite.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_rule_list_gates_nothing() {
        let probe = TableProbe::new(&[]);
        let check = evaluate(&[], 1, &probe).await;
        assert!(!check.required);
        assert!(check.satisfied);
    }

    #[tokio::test]
    async fn all_rules_must_pass() {
        let a = public("chA");
        let b = private(555, "https://t.me/+xyz");
        let rules = vec![a.clone(), b.clone()];

        // Member of chA only.
        let probe = TableProbe::new(&[(&a, 7)]);
        let check = evaluate(&rules, 7, &probe).await;
        assert!(check.required);
        assert!(!check.satisfied);

        // Member of both.
        let probe = TableProbe::new(&[(&a, 7), (&b, 7)]);
        let check = evaluate(&rules, 7, &probe).await;
        assert!(check.required);
        assert!(check.satisfied);
    }

    #[tokio::test]
    async fn lookup_failure_counts_as_unsatisfied() {
        let a = public("chA");
        let mut probe = TableProbe::new(&[(&a, 7)]);
        probe.fail_on = Some(a.key());
        let check = evaluate(&[a], 7, &probe).await;
        assert!(check.required);
        assert!(!check.satisfied);
    }

    #[test]
    fn add_rule_is_idempotent_under_structural_key() {
        let store = MemoryStore::new();
        add_rule(&store, public("chA"));
        add_rule(&store, public("@chA"));
        let rules = add_rule(&store, private(555, "https://t.me/+xyz"));
        assert_eq!(rules.len(), 2);
        assert_eq!(load_rules(&store).len(), 2);
    }

    #[test]
    fn rules_keep_insertion_order() {
        let store = MemoryStore::new();
        add_rule(&store, public("b"));
        add_rule(&store, public("a"));
        add_rule(&store, private(-100, "https://t.me/+k"));
        let keys: Vec<String> = load_rules(&store).iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["u:b", "u:a", "p:-100:https://t.me/+k"]);
    }

    #[test]
    fn remove_all_keys_empties_the_list() {
        let store = MemoryStore::new();
        add_rule(&store, public("a"));
        add_rule(&store, private(1, "https://t.me/+x"));

        let all: BTreeSet<String> = load_rules(&store).iter().map(|r| r.key()).collect();
        assert_eq!(remove_rules(&store, &all), 2);
        assert!(load_rules(&store).is_empty());
    }

    #[test]
    fn remove_with_empty_selection_is_a_noop() {
        let store = MemoryStore::new();
        add_rule(&store, public("a"));
        assert_eq!(remove_rules(&store, &BTreeSet::new()), 0);
        assert_eq!(load_rules(&store).len(), 1);
    }

    #[test]
    fn decodes_all_historical_storage_shapes() {
        let array = r#"[{"type":"username","username":"chA"}]"#;
        assert_eq!(decode_rules(array), vec![public("chA")]);

        let single = r#"{"type":"private","chat_id":-100123,"invite":"https://t.me/+abc"}"#;
        assert_eq!(
            decode_rules(single),
            vec![private(-100123, "https://t.me/+abc")]
        );

        assert_eq!(decode_rules("@legacy"), vec![public("legacy")]);
        assert!(decode_rules("").is_empty());
    }

    #[test]
    fn removal_selection_roundtrips_and_clears() {
        let store = MemoryStore::new();
        let mut selection = BTreeSet::new();
        selection.insert("u:a".to_string());
        selection.insert("p:1:https://t.me/+x".to_string());

        set_remove_selection(&store, 9, &selection);
        assert_eq!(get_remove_selection(&store, 9), selection);

        clear_remove_selection(&store, 9);
        assert!(get_remove_selection(&store, 9).is_empty());
    }
}
