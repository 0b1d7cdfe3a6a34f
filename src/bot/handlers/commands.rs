use teloxide::macros::BotCommands;
use teloxide::prelude::*;
use teloxide::utils::command::ParseError;

use crate::bot::context::RequestContext;
use crate::bot::keyboards::{build_cancel_keyboard, build_help_keyboard};
use crate::bot::redemption;
use crate::bot::state::{set_state, AdminState};
use crate::bot::utils::ensure_user;
use crate::config::AppConfig;
use crate::store::{count_prefix, keys, Store};

use super::send_admin_menu;

/// `/start` carries an optional share code; the stock parser would reject a
/// bare `/start`, so the argument is taken verbatim and trimmed.
fn parse_start_arg(input: String) -> Result<(String,), ParseError> {
    Ok((input.trim().to_string(),))
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(
        description = "Redeem a share code or open the menu",
        parse_with = parse_start_arg
    )]
    Start(String),
    #[command(description = "Show bot statistics")]
    Stats,
    #[command(description = "Send a message to every known user (owner only)")]
    Broadcast,
    #[command(description = "Configure the force-join policy (owner only)")]
    Setjoin,
}

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    command: Command,
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

    match command {
        Command::Start(code) => handle_start(&bot, &store, &ctx, chat_id, user_id, &code).await?,
        Command::Stats => handle_stats(&bot, &store, &ctx, chat_id, user_id).await?,
        Command::Broadcast => handle_broadcast(&bot, &store, &ctx, chat_id, user_id).await?,
        Command::Setjoin => handle_setjoin(&bot, &store, &ctx, chat_id, user_id).await?,
    }

    Ok(())
}

async fn handle_start(
    bot: &Bot,
    store: &Store,
    ctx: &RequestContext,
    chat_id: ChatId,
    user_id: u64,
    code: &str,
) -> ResponseResult<()> {
    if !code.is_empty() {
        return redemption::redeem(bot, store.as_ref(), &ctx.rules, chat_id, user_id, code).await;
    }

    if ctx.is_admin(user_id) {
        send_admin_menu(bot, chat_id, ctx.is_owner(user_id)).await
    } else {
        bot.send_message(chat_id, "Welcome! Open a share link to receive content.")
            .reply_markup(build_help_keyboard())
            .await?;
        Ok(())
    }
}

async fn handle_stats(
    bot: &Bot,
    store: &Store,
    ctx: &RequestContext,
    chat_id: ChatId,
    user_id: u64,
) -> ResponseResult<()> {
    if !ctx.is_admin(user_id) {
        return send_non_admin_hint(bot, chat_id).await;
    }
    let users = count_prefix(store.as_ref(), keys::USER_PREFIX);
    let media = count_prefix(store.as_ref(), keys::MEDIA_PREFIX);
    bot.send_message(
        chat_id,
        format!("Bot stats:\nUsers: {}\nMedia links: {}", users, media),
    )
    .await?;
    Ok(())
}

async fn handle_broadcast(
    bot: &Bot,
    store: &Store,
    ctx: &RequestContext,
    chat_id: ChatId,
    user_id: u64,
) -> ResponseResult<()> {
    if !ctx.is_admin(user_id) {
        return send_non_admin_hint(bot, chat_id).await;
    }
    if !ctx.is_owner(user_id) {
        bot.send_message(chat_id, "This command is for the bot owner only.")
            .await?;
        return Ok(());
    }
    set_state(store.as_ref(), user_id, &AdminState::AwaitBroadcastText);
    bot.send_message(chat_id, "Send the broadcast text.")
        .reply_markup(build_cancel_keyboard())
        .await?;
    Ok(())
}

async fn handle_setjoin(
    bot: &Bot,
    store: &Store,
    ctx: &RequestContext,
    chat_id: ChatId,
    user_id: u64,
) -> ResponseResult<()> {
    if !ctx.is_admin(user_id) {
        return send_non_admin_hint(bot, chat_id).await;
    }
    if !ctx.is_owner(user_id) {
        bot.send_message(chat_id, "This command is for the bot owner only.")
            .await?;
        return Ok(());
    }
    set_state(store.as_ref(), user_id, &AdminState::AwaitJoinChannel);
    let current = if ctx.rules.is_empty() {
        "disabled".to_string()
    } else {
        ctx.rules
            .iter()
            .map(|r| r.label())
            .collect::<Vec<_>>()
            .join(", ")
    };
    bot.send_message(
        chat_id,
        format!(
            "Current policy: {}\n\
             Send a channel username (without @) or a private invite link t.me/+...\n\
             Send off to remove every rule.\n\
             You can also forward a message from the channel to record its id.",
            current
        ),
    )
    .reply_markup(build_cancel_keyboard())
    .await?;
    Ok(())
}

async fn send_non_admin_hint(bot: &Bot, chat_id: ChatId) -> ResponseResult<()> {
    bot.send_message(chat_id, "Use a share link to receive content.")
        .reply_markup(build_help_keyboard())
        .await?;
    Ok(())
}
