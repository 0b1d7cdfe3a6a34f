use std::collections::BTreeSet;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

use crate::force_join::ForceJoinRule;

pub fn build_admin_menu_keyboard(is_owner: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![InlineKeyboardButton::callback(
        "📦 Bundle upload",
        "admin:upload",
    )]];

    if is_owner {
        rows.push(vec![
            InlineKeyboardButton::callback("📊 Stats", "admin:stats"),
            InlineKeyboardButton::callback("📣 Broadcast", "admin:broadcast"),
        ]);
        rows.push(vec![
            InlineKeyboardButton::callback("🔗 Set join channel", "admin:setjoin"),
            InlineKeyboardButton::callback("❌ Remove join channel", "admin:removejoin"),
        ]);
    } else {
        rows.push(vec![InlineKeyboardButton::callback(
            "📊 Stats",
            "admin:stats",
        )]);
    }

    rows.push(vec![InlineKeyboardButton::callback(
        "📁 Manage links",
        "admin:files",
    )]);
    if is_owner {
        rows.push(vec![InlineKeyboardButton::callback(
            "🛡️ Manage admins",
            "admin:admins",
        )]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🔄 Refresh menu",
        "admin:menu",
    )]);

    InlineKeyboardMarkup::new(rows)
}

pub fn build_cancel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Cancel",
        "admin:cancel",
    )]])
}

pub fn build_upload_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Finish upload ✅",
            "admin:finish",
        )],
        vec![InlineKeyboardButton::callback("Cancel", "admin:cancel")],
    ])
}

pub fn build_files_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "🚫 Disable link",
            "admin:disable",
        )],
        vec![InlineKeyboardButton::callback(
            "✅ Enable link",
            "admin:enable",
        )],
        vec![InlineKeyboardButton::callback(
            "🗑️ Delete link",
            "admin:delete",
        )],
        vec![InlineKeyboardButton::callback("ℹ️ Link info", "admin:info")],
        vec![InlineKeyboardButton::callback("Back", "admin:menu")],
    ])
}

pub fn build_admins_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Add admin ➕",
            "admin:addadmin",
        )],
        vec![InlineKeyboardButton::callback(
            "List admins 📋",
            "admin:listadmins",
        )],
        vec![InlineKeyboardButton::callback("Back", "admin:menu")],
    ])
}

/// One join button per configured rule plus a re-check button carrying the
/// code, so the user can retry after joining.
pub fn build_join_prompt_keyboard(rules: &[ForceJoinRule], code: &str) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for rule in rules {
        if let Ok(url) = Url::parse(&rule.join_url()) {
            rows.push(vec![InlineKeyboardButton::url("Join channel", url)]);
        }
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "Check membership ✅",
        format!("check:{}", code),
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Multi-select removal keyboard; selected rules carry a check mark.
pub fn build_remove_join_keyboard(
    rules: &[ForceJoinRule],
    selected: &BTreeSet<String>,
) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    for rule in rules {
        let key = rule.key();
        let text = if selected.contains(&key) {
            format!("✅ {}", rule.label())
        } else {
            rule.label()
        };
        rows.push(vec![InlineKeyboardButton::callback(
            text,
            format!("rmjoin:toggle:{}", key),
        )]);
    }
    rows.push(vec![
        InlineKeyboardButton::callback("Select all", "rmjoin:all"),
        InlineKeyboardButton::callback("None", "rmjoin:none"),
    ]);
    rows.push(vec![InlineKeyboardButton::callback(
        "Delete selected 🗑️",
        "rmjoin:confirm",
    )]);
    rows.push(vec![InlineKeyboardButton::callback("Back", "admin:menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn build_help_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("Help", "help")]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<ForceJoinRule> {
        vec![
            ForceJoinRule::username("chA"),
            ForceJoinRule::Private {
                chat_id: 555,
                invite: "https://t.me/+xyz".to_string(),
            },
        ]
    }

    #[test]
    fn join_prompt_has_one_button_per_rule_plus_recheck() {
        let kb = build_join_prompt_keyboard(&rules(), "ab12cd34");
        assert_eq!(kb.inline_keyboard.len(), 3);
        let last = &kb.inline_keyboard[2][0];
        assert_eq!(last.text, "Check membership ✅");
    }

    #[test]
    fn remove_keyboard_marks_selected_rules() {
        let mut selected = BTreeSet::new();
        selected.insert("u:chA".to_string());
        let kb = build_remove_join_keyboard(&rules(), &selected);
        // two rule rows + all/none row + confirm row + back row
        assert_eq!(kb.inline_keyboard.len(), 5);
        assert!(kb.inline_keyboard[0][0].text.starts_with("✅ "));
        assert!(!kb.inline_keyboard[1][0].text.starts_with("✅ "));
    }

    #[test]
    fn owner_menu_has_policy_rows_admin_menu_does_not() {
        let owner = build_admin_menu_keyboard(true);
        let admin = build_admin_menu_keyboard(false);
        assert!(owner.inline_keyboard.len() > admin.inline_keyboard.len());
    }
}
