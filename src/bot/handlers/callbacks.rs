use teloxide::prelude::*;
use teloxide::types::CallbackQuery;

use crate::bot::context::RequestContext;
use crate::bot::keyboards::{
    build_admins_menu_keyboard, build_cancel_keyboard, build_files_menu_keyboard,
    build_remove_join_keyboard,
};
use crate::bot::redemption;
use crate::bot::state::{clear_state, get_state, set_state, AdminState};
use crate::bot::utils::{bot_username, deep_link, ensure_user, BotProbe};
use crate::config::AppConfig;
use crate::force_join;
use crate::registry;
use crate::store::{count_prefix, keys, Store};

use super::send_admin_menu;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    store: Store,
    config: AppConfig,
) -> ResponseResult<()> {
    let data = match &q.data {
        Some(d) => d.clone(),
        None => return Ok(()),
    };
    let user_id = q.from.id.0;
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat.id)
        .unwrap_or(ChatId(user_id as i64));

    let ctx = RequestContext::load(store.as_ref(), &config);

    if let Some(code) = data.strip_prefix("check:") {
        handle_membership_check(&bot, &q, &store, &ctx, chat_id, user_id, code).await?;
        return Ok(());
    }
    if data == "help" {
        bot.answer_callback_query(&q.id).text("Help").await?;
        bot.send_message(chat_id, "Use a share link to receive content.")
            .await?;
        return Ok(());
    }

    if ctx.is_admin(user_id) {
        if data == "admin:menu" {
            bot.answer_callback_query(&q.id).text("Menu").await?;
            send_admin_menu(&bot, chat_id, ctx.is_owner(user_id)).await?;
        } else if data == "admin:upload" {
            handle_upload_start(&bot, &q, &store, chat_id, user_id).await?;
        } else if data == "admin:finish" {
            handle_upload_finish(&bot, &q, &store, chat_id, user_id).await?;
        } else if data == "admin:cancel" {
            bot.answer_callback_query(&q.id).text("Cancelled").await?;
            force_join::clear_remove_selection(store.as_ref(), user_id);
            clear_state(store.as_ref(), user_id);
            send_admin_menu(&bot, chat_id, ctx.is_owner(user_id)).await?;
        } else if data == "admin:stats" {
            bot.answer_callback_query(&q.id).text("Stats").await?;
            let users = count_prefix(store.as_ref(), keys::USER_PREFIX);
            let media = count_prefix(store.as_ref(), keys::MEDIA_PREFIX);
            bot.send_message(
                chat_id,
                format!("Bot stats:\nUsers: {}\nMedia links: {}", users, media),
            )
            .await?;
        } else if data == "admin:files" {
            bot.answer_callback_query(&q.id).text("Links").await?;
            bot.send_message(chat_id, "Link management")
                .reply_markup(build_files_menu_keyboard())
                .await?;
        } else if let Some(state) = code_prompt_state(&data) {
            set_state(store.as_ref(), user_id, &state);
            bot.send_message(chat_id, code_prompt_text(&state))
                .reply_markup(build_cancel_keyboard())
                .await?;
            bot.answer_callback_query(&q.id).await?;
        } else if data == "admin:broadcast" {
            if require_owner(&bot, &q, &ctx, chat_id, user_id).await? {
                set_state(store.as_ref(), user_id, &AdminState::AwaitBroadcastText);
                bot.send_message(chat_id, "Send the broadcast text.")
                    .reply_markup(build_cancel_keyboard())
                    .await?;
                bot.answer_callback_query(&q.id).text("Broadcast").await?;
            }
        } else if data == "admin:setjoin" {
            if require_owner(&bot, &q, &ctx, chat_id, user_id).await? {
                set_state(store.as_ref(), user_id, &AdminState::AwaitJoinChannel);
                bot.send_message(
                    chat_id,
                    "Send a channel username (without @) or a private invite link t.me/+...\n\
                     Send off to remove every rule.\n\
                     You can also forward a message from the channel to record its id.",
                )
                .reply_markup(build_cancel_keyboard())
                .await?;
                bot.answer_callback_query(&q.id).text("Set channel").await?;
            }
        } else if data == "admin:removejoin" {
            if require_owner(&bot, &q, &ctx, chat_id, user_id).await? {
                if ctx.rules.is_empty() {
                    bot.answer_callback_query(&q.id).text("Nothing to remove").await?;
                    bot.send_message(chat_id, "There are no join channels to remove.")
                        .await?;
                } else {
                    let selected = force_join::get_remove_selection(store.as_ref(), user_id);
                    bot.send_message(chat_id, "Select the join channels to remove:")
                        .reply_markup(build_remove_join_keyboard(&ctx.rules, &selected))
                        .await?;
                    bot.answer_callback_query(&q.id).text("Channel list").await?;
                }
            }
        } else if data.starts_with("rmjoin:") {
            handle_remove_join_action(&bot, &q, &store, &ctx, chat_id, user_id, &data).await?;
        } else if data == "admin:admins" {
            if require_owner(&bot, &q, &ctx, chat_id, user_id).await? {
                bot.answer_callback_query(&q.id).text("Admins").await?;
                bot.send_message(chat_id, "Admin management")
                    .reply_markup(build_admins_menu_keyboard())
                    .await?;
            }
        } else if data == "admin:addadmin" {
            if require_owner(&bot, &q, &ctx, chat_id, user_id).await? {
                set_state(store.as_ref(), user_id, &AdminState::AwaitAddAdmin);
                bot.send_message(chat_id, "Send the numeric user id.")
                    .reply_markup(build_cancel_keyboard())
                    .await?;
                bot.answer_callback_query(&q.id).await?;
            }
        } else if data == "admin:listadmins" {
            if require_owner(&bot, &q, &ctx, chat_id, user_id).await? {
                let all = ctx.admins.all();
                let text = if all.is_empty() {
                    "No admins registered.".to_string()
                } else {
                    let lines: Vec<String> = all.iter().map(|id| id.to_string()).collect();
                    format!("Admins:\n{}", lines.join("\n"))
                };
                bot.send_message(chat_id, text).await?;
                bot.answer_callback_query(&q.id).text("Admin list").await?;
            }
        } else {
            bot.answer_callback_query(&q.id).text("Unknown action.").await?;
        }
        return Ok(());
    }

    bot.answer_callback_query(&q.id).text("Unknown action.").await?;
    Ok(())
}

async fn handle_membership_check(
    bot: &Bot,
    q: &CallbackQuery,
    store: &Store,
    ctx: &RequestContext,
    chat_id: ChatId,
    user_id: u64,
    code: &str,
) -> ResponseResult<()> {
    ensure_user(store.as_ref(), user_id);
    let probe = BotProbe { bot };
    let check = force_join::evaluate(&ctx.rules, user_id, &probe).await;
    if check.required && !check.satisfied {
        bot.answer_callback_query(&q.id)
            .text("You have not joined yet.")
            .await?;
        redemption::send_join_prompt(bot, &ctx.rules, chat_id, code).await?;
        return Ok(());
    }
    bot.answer_callback_query(&q.id)
        .text("Membership confirmed.")
        .await?;
    redemption::deliver(bot, store.as_ref(), chat_id, code).await
}

async fn handle_upload_start(
    bot: &Bot,
    q: &CallbackQuery,
    store: &Store,
    chat_id: ChatId,
    user_id: u64,
) -> ResponseResult<()> {
    bot.answer_callback_query(&q.id).text("Upload").await?;
    let code = match registry::open_bundle(store.as_ref()) {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!("Failed to open bundle for {}: {}", user_id, e);
            bot.send_message(chat_id, "Could not start the upload session.")
                .await?;
            return Ok(());
        }
    };
    set_state(store.as_ref(), user_id, &AdminState::Upload { code: code.clone() });
    let username = bot_username(bot, store.as_ref()).await;
    bot.send_message(
        chat_id,
        format!(
            "Upload mode is on. Send your media.\nCode: {}\nLink: {}",
            code,
            deep_link(&username, &code)
        ),
    )
    .reply_markup(crate::bot::keyboards::build_upload_keyboard())
    .await?;
    Ok(())
}

async fn handle_upload_finish(
    bot: &Bot,
    q: &CallbackQuery,
    store: &Store,
    chat_id: ChatId,
    user_id: u64,
) -> ResponseResult<()> {
    let code = match get_state(store.as_ref(), user_id) {
        Some(AdminState::Upload { code }) => code,
        _ => {
            bot.answer_callback_query(&q.id)
                .text("No upload session is active.")
                .await?;
            return Ok(());
        }
    };
    let count = registry::get_bundle(store.as_ref(), &code)
        .map(|b| b.items.len())
        .unwrap_or(0);
    clear_state(store.as_ref(), user_id);
    let username = bot_username(bot, store.as_ref()).await;
    bot.answer_callback_query(&q.id).text("Done").await?;
    bot.send_message(
        chat_id,
        format!(
            "Upload finished. Items: {}\nShare link: {}",
            count,
            deep_link(&username, &code)
        ),
    )
    .disable_web_page_preview(true)
    .await?;
    Ok(())
}

/// Toggle/all/none mutate the staged selection and redraw the keyboard in
/// place; confirm applies it and reports the removed count.
async fn handle_remove_join_action(
    bot: &Bot,
    q: &CallbackQuery,
    store: &Store,
    ctx: &RequestContext,
    chat_id: ChatId,
    user_id: u64,
    data: &str,
) -> ResponseResult<()> {
    if !ctx.is_owner(user_id) {
        bot.answer_callback_query(&q.id).text("Not allowed").await?;
        return Ok(());
    }
    let rules = force_join::load_rules(store.as_ref());
    let mut selected = force_join::get_remove_selection(store.as_ref(), user_id);

    if let Some(key) = data.strip_prefix("rmjoin:toggle:") {
        if rules.iter().any(|r| r.key() == key) {
            if !selected.remove(key) {
                selected.insert(key.to_string());
            }
            force_join::set_remove_selection(store.as_ref(), user_id, &selected);
        }
    } else if data == "rmjoin:all" {
        selected = rules.iter().map(|r| r.key()).collect();
        force_join::set_remove_selection(store.as_ref(), user_id, &selected);
    } else if data == "rmjoin:none" {
        selected.clear();
        force_join::set_remove_selection(store.as_ref(), user_id, &selected);
    } else if data == "rmjoin:confirm" {
        let removed = force_join::remove_rules(store.as_ref(), &selected);
        force_join::clear_remove_selection(store.as_ref(), user_id);
        let text = if removed > 0 {
            format!("{} rule(s) removed.", removed)
        } else {
            "Nothing was selected.".to_string()
        };
        bot.send_message(chat_id, text).await?;
        bot.answer_callback_query(&q.id).text("Done").await?;
        return Ok(());
    } else {
        bot.answer_callback_query(&q.id).text("Unknown action.").await?;
        return Ok(());
    }

    if let Some(message) = q.message.as_ref() {
        let rules = force_join::load_rules(store.as_ref());
        let selected = force_join::get_remove_selection(store.as_ref(), user_id);
        bot.edit_message_reply_markup(chat_id, message.id)
            .reply_markup(build_remove_join_keyboard(&rules, &selected))
            .await?;
    }
    bot.answer_callback_query(&q.id).text("Updated").await?;
    Ok(())
}

async fn require_owner(
    bot: &Bot,
    q: &CallbackQuery,
    ctx: &RequestContext,
    chat_id: ChatId,
    user_id: u64,
) -> ResponseResult<bool> {
    if ctx.is_owner(user_id) {
        return Ok(true);
    }
    bot.answer_callback_query(&q.id).text("Not allowed").await?;
    bot.send_message(chat_id, "This section is for the bot owner only.")
        .await?;
    Ok(false)
}

fn code_prompt_state(data: &str) -> Option<AdminState> {
    match data {
        "admin:disable" => Some(AdminState::AwaitDisableCode),
        "admin:enable" => Some(AdminState::AwaitEnableCode),
        "admin:delete" => Some(AdminState::AwaitDeleteCode),
        "admin:info" => Some(AdminState::AwaitInfoCode),
        _ => None,
    }
}

fn code_prompt_text(state: &AdminState) -> &'static str {
    match state {
        AdminState::AwaitDisableCode => "Send the link code to disable it.",
        AdminState::AwaitEnableCode => "Send the link code to enable it.",
        AdminState::AwaitDeleteCode => "Send the link code to delete it.",
        _ => "Send the link code to show its info.",
    }
}
