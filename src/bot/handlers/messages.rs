use lazy_static::lazy_static;
use regex::Regex;
use teloxide::prelude::*;

use crate::access;
use crate::bot::broadcast::spawn_broadcast;
use crate::bot::context::RequestContext;
use crate::bot::keyboards::{build_cancel_keyboard, build_help_keyboard, build_upload_keyboard};
use crate::bot::state::{clear_state, get_state, set_state, AdminState};
use crate::bot::utils::{bot_username, deep_link, ensure_user, extract_media};
use crate::config::AppConfig;
use crate::force_join::{self, ForceJoinRule};
use crate::registry::{self, MediaKind};
use crate::store::Store;

use super::send_admin_menu;

lazy_static! {
    static ref INVITE_LINK_RE: Regex =
        Regex::new(r"^https?://t\.me/\+[A-Za-z0-9_-]+$").unwrap();
}

fn is_invite_link(raw: &str) -> bool {
    INVITE_LINK_RE.is_match(raw)
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    store: Store,
    config: AppConfig,
) -> ResponseResult<()> {
    let user = match msg.from() {
        Some(u) => u,
        None => return Ok(()),
    };
    let user_id = user.id.0;
    let chat_id = msg.chat.id;

    ensure_user(store.as_ref(), user_id);
    let ctx = RequestContext::load(store.as_ref(), &config);

    if ctx.is_admin(user_id) {
        if let Some(state) = get_state(store.as_ref(), user_id) {
            if handle_state_input(&bot, &store, &ctx, &msg, user_id, state).await? {
                return Ok(());
            }
        }

        // Media outside an upload session mints a single-item link.
        if let Some(item) = extract_media(&msg) {
            match registry::create_media(store.as_ref(), item) {
                Ok(code) => {
                    let username = bot_username(&bot, store.as_ref()).await;
                    bot.send_message(
                        chat_id,
                        format!(
                            "Media saved.\nShare link: {}\nCode: {}",
                            deep_link(&username, &code),
                            code
                        ),
                    )
                    .disable_web_page_preview(true)
                    .await?;
                }
                Err(e) => {
                    tracing::warn!("Failed to save media for {}: {}", user_id, e);
                    bot.send_message(chat_id, "Failed to save the media.").await?;
                }
            }
            return Ok(());
        }

        if msg.text().is_some() {
            send_admin_menu(&bot, chat_id, ctx.is_owner(user_id)).await?;
        }
        return Ok(());
    }

    if msg.text().is_some() {
        bot.send_message(chat_id, "Use a share link to receive content.")
            .reply_markup(build_help_keyboard())
            .await?;
    }
    Ok(())
}

/// Consumes the admin's pending state against this message. Returns false
/// when the message does not fit the state, letting it fall through to the
/// regular admin paths with the state untouched.
async fn handle_state_input(
    bot: &Bot,
    store: &Store,
    ctx: &RequestContext,
    msg: &Message,
    user_id: u64,
    state: AdminState,
) -> ResponseResult<bool> {
    let chat_id = msg.chat.id;

    if reclaim_owner_state(store.as_ref(), user_id, &state, ctx.is_owner(user_id)) {
        bot.send_message(chat_id, "This section is for the bot owner only.")
            .await?;
        return Ok(true);
    }

    match state {
        AdminState::AwaitAddAdmin => {
            let text = match msg.text() {
                Some(t) => t.trim(),
                None => return Ok(false),
            };
            clear_state(store.as_ref(), user_id);
            match access::add_admin(store.as_ref(), text) {
                Ok(id) => {
                    bot.send_message(chat_id, format!("New admin added: {}", id))
                        .await?;
                }
                Err(e) => {
                    tracing::info!("Rejected admin input from {}: {}", user_id, e);
                    bot.send_message(chat_id, "Invalid input. Send a numeric user id only.")
                        .await?;
                }
            }
            Ok(true)
        }
        AdminState::AwaitBroadcastText => {
            let text = match msg.text() {
                Some(t) => t.to_string(),
                None => return Ok(false),
            };
            clear_state(store.as_ref(), user_id);
            spawn_broadcast(bot.clone(), store.clone(), text, chat_id.0);
            bot.send_message(chat_id, "Broadcast started…").await?;
            Ok(true)
        }
        AdminState::AwaitJoinChannel => {
            // A forwarded channel message records the private channel id;
            // the invite link is collected next.
            if let Some(chat) = msg.forward_from_chat() {
                if chat.is_channel() {
                    set_state(
                        store.as_ref(),
                        user_id,
                        &AdminState::AwaitJoinPrivateWaitLink { chat_id: chat.id.0 },
                    );
                    bot.send_message(
                        chat_id,
                        "Now send the private invite link (t.me/+...) to finish.",
                    )
                    .reply_markup(build_cancel_keyboard())
                    .await?;
                    return Ok(true);
                }
            }
            let raw = match msg.text() {
                Some(t) => t.trim(),
                None => return Ok(false),
            };
            if raw.eq_ignore_ascii_case("off") {
                clear_state(store.as_ref(), user_id);
                force_join::save_rules(store.as_ref(), &[]);
                bot.send_message(chat_id, "All join channels removed.").await?;
                send_admin_menu(bot, chat_id, ctx.is_owner(user_id)).await?;
                return Ok(true);
            }
            if is_invite_link(raw) {
                set_state(
                    store.as_ref(),
                    user_id,
                    &AdminState::AwaitJoinPrivate {
                        invite: raw.to_string(),
                    },
                );
                bot.send_message(
                    chat_id,
                    "Now forward a message from that private channel so its id can be recorded.",
                )
                .reply_markup(build_cancel_keyboard())
                .await?;
                return Ok(true);
            }
            let rule = ForceJoinRule::username(raw);
            let label = rule.label();
            clear_state(store.as_ref(), user_id);
            force_join::add_rule(store.as_ref(), rule);
            bot.send_message(chat_id, format!("Required channel added: {}", label))
                .await?;
            send_admin_menu(bot, chat_id, ctx.is_owner(user_id)).await?;
            Ok(true)
        }
        AdminState::AwaitJoinPrivate { invite } => {
            let channel = match msg.forward_from_chat().filter(|c| c.is_channel()) {
                Some(c) => c,
                None => return Ok(false),
            };
            clear_state(store.as_ref(), user_id);
            force_join::add_rule(
                store.as_ref(),
                ForceJoinRule::Private {
                    chat_id: channel.id.0,
                    invite,
                },
            );
            bot.send_message(chat_id, "Private channel added to the join policy.")
                .await?;
            send_admin_menu(bot, chat_id, ctx.is_owner(user_id)).await?;
            Ok(true)
        }
        AdminState::AwaitJoinPrivateWaitLink { chat_id: channel_id } => {
            let raw = match msg.text() {
                Some(t) => t.trim(),
                None => return Ok(false),
            };
            if !is_invite_link(raw) {
                // Re-prompt; the state stays so the admin can try again.
                bot.send_message(
                    chat_id,
                    "That invite link is not valid. Example: https://t.me/+XXXXXXXX",
                )
                .await?;
                return Ok(true);
            }
            clear_state(store.as_ref(), user_id);
            force_join::add_rule(
                store.as_ref(),
                ForceJoinRule::Private {
                    chat_id: channel_id,
                    invite: raw.to_string(),
                },
            );
            bot.send_message(chat_id, "Private channel added to the join policy.")
                .await?;
            send_admin_menu(bot, chat_id, ctx.is_owner(user_id)).await?;
            Ok(true)
        }
        AdminState::AwaitDisableCode => {
            handle_code_state(bot, store, msg, user_id, |s, code| {
                if registry::set_disabled(s, code, true) {
                    format!("Link {} disabled.", code)
                } else {
                    "Code not found.".to_string()
                }
            })
            .await
        }
        AdminState::AwaitEnableCode => {
            handle_code_state(bot, store, msg, user_id, |s, code| {
                if registry::set_disabled(s, code, false) {
                    format!("Link {} enabled.", code)
                } else {
                    "Code not found.".to_string()
                }
            })
            .await
        }
        AdminState::AwaitDeleteCode => {
            handle_code_state(bot, store, msg, user_id, |s, code| {
                if registry::delete_code(s, code) {
                    format!("Link {} deleted.", code)
                } else {
                    "Code not found.".to_string()
                }
            })
            .await
        }
        AdminState::AwaitInfoCode => {
            let code = match msg.text() {
                Some(t) => t.trim().to_string(),
                None => return Ok(false),
            };
            clear_state(store.as_ref(), user_id);
            let info = match registry::link_info(store.as_ref(), &code) {
                Some(info) => info,
                None => {
                    bot.send_message(chat_id, "Code not found.").await?;
                    return Ok(true);
                }
            };
            let username = bot_username(bot, store.as_ref()).await;
            let detail = match info.media_kind {
                Some(kind) => format!("Media: {}", media_kind_label(kind)),
                None => format!("Items: {}", info.item_count),
            };
            let created = chrono::DateTime::from_timestamp_millis(info.created_at)
                .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "-".to_string());
            bot.send_message(
                chat_id,
                format!(
                    "Code: {}\nKind: {}\nStatus: {}\n{}\nCreated: {}\nLink: {}",
                    code,
                    info.kind,
                    if info.disabled { "disabled" } else { "active" },
                    detail,
                    created,
                    deep_link(&username, &code)
                ),
            )
            .disable_web_page_preview(true)
            .await?;
            Ok(true)
        }
        AdminState::Upload { code } => {
            // Only media messages feed the open bundle; anything else falls
            // through without ending the session.
            let item = match extract_media(msg) {
                Some(i) => i,
                None => return Ok(false),
            };
            let count = registry::append_to_bundle(store.as_ref(), &code, item);
            bot.send_message(chat_id, format!("Added. Item count: {}", count))
                .reply_markup(build_upload_keyboard())
                .await?;
            Ok(true)
        }
    }
}

/// Shared shape of the disable/enable/delete flows: take a code, clear the
/// state, apply, report.
async fn handle_code_state<F>(
    bot: &Bot,
    store: &Store,
    msg: &Message,
    user_id: u64,
    apply: F,
) -> ResponseResult<bool>
where
    F: FnOnce(&dyn crate::store::KvStore, &str) -> String,
{
    let code = match msg.text() {
        Some(t) => t.trim().to_string(),
        None => return Ok(false),
    };
    clear_state(store.as_ref(), user_id);
    let reply = apply(store.as_ref(), &code);
    bot.send_message(msg.chat.id, reply).await?;
    Ok(true)
}

/// Privilege is re-checked when a state is consumed, not just when it was
/// set; a demoted admin's stale owner-only state is discarded here. Returns
/// true when the state was reclaimed.
fn reclaim_owner_state(
    store: &dyn crate::store::KvStore,
    user_id: u64,
    state: &AdminState,
    is_owner: bool,
) -> bool {
    if state.owner_only() && !is_owner {
        clear_state(store, user_id);
        return true;
    }
    false
}

fn media_kind_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Photo => "photo",
        MediaKind::Video => "video",
        MediaKind::Document => "document",
        MediaKind::Animation => "animation",
        MediaKind::Audio => "audio",
        MediaKind::Voice => "voice",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::state::{get_state, set_state};
    use crate::store::MemoryStore;

    #[test]
    fn invite_link_pattern() {
        assert!(is_invite_link("https://t.me/+AbC_d-123"));
        assert!(is_invite_link("http://t.me/+x"));
        assert!(!is_invite_link("https://t.me/somechannel"));
        assert!(!is_invite_link("https://t.me/+"));
        assert!(!is_invite_link("t.me/+AbC"));
        assert!(!is_invite_link("https://t.me/+AbC extra"));
    }

    #[test]
    fn non_owner_loses_owner_only_state_without_side_effects() {
        let store = MemoryStore::new();
        set_state(&store, 5, &AdminState::AwaitBroadcastText);

        assert!(reclaim_owner_state(&store, 5, &AdminState::AwaitBroadcastText, false));
        assert_eq!(get_state(&store, 5), None);
        assert_eq!(
            crate::store::count_prefix(&store, crate::store::keys::USER_PREFIX),
            0
        );
    }

    #[test]
    fn owner_keeps_owner_only_state() {
        let store = MemoryStore::new();
        set_state(&store, 5, &AdminState::AwaitJoinChannel);

        assert!(!reclaim_owner_state(&store, 5, &AdminState::AwaitJoinChannel, true));
        assert_eq!(get_state(&store, 5), Some(AdminState::AwaitJoinChannel));
    }

    #[test]
    fn code_states_are_not_owner_gated() {
        let store = MemoryStore::new();
        set_state(&store, 5, &AdminState::AwaitDisableCode);

        assert!(!reclaim_owner_state(&store, 5, &AdminState::AwaitDisableCode, false));
        assert_eq!(get_state(&store, 5), Some(AdminState::AwaitDisableCode));
    }
}
