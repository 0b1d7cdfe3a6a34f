use teloxide::prelude::*;

use crate::force_join::{self, ForceJoinRule};
use crate::registry::{self, Resolved};
use crate::store::KvStore;

use super::keyboards::build_join_prompt_keyboard;
use super::utils::{send_media_item, BotProbe};

/// Redeems a share code for a user: force-join policy first, then content
/// resolution and delivery. Content is never revealed while the policy is
/// unsatisfied.
pub async fn redeem(
    bot: &Bot,
    store: &dyn KvStore,
    rules: &[ForceJoinRule],
    chat_id: ChatId,
    user_id: u64,
    code: &str,
) -> ResponseResult<()> {
    let probe = BotProbe { bot };
    let check = force_join::evaluate(rules, user_id, &probe).await;
    if check.required && !check.satisfied {
        send_join_prompt(bot, rules, chat_id, code).await?;
        return Ok(());
    }
    deliver(bot, store, chat_id, code).await
}

pub async fn send_join_prompt(
    bot: &Bot,
    rules: &[ForceJoinRule],
    chat_id: ChatId,
    code: &str,
) -> ResponseResult<()> {
    bot.send_message(
        chat_id,
        "Please join the channel first, then press the membership check button.",
    )
    .reply_markup(build_join_prompt_keyboard(rules, code))
    .await?;
    Ok(())
}

pub async fn deliver(bot: &Bot, store: &dyn KvStore, chat_id: ChatId, code: &str) -> ResponseResult<()> {
    match registry::resolve(store, code) {
        Resolved::Media(entry) => {
            if entry.disabled {
                bot.send_message(chat_id, "This link has been disabled.")
                    .await?;
                return Ok(());
            }
            send_media_item(bot, chat_id, &entry.item).await?;
        }
        Resolved::Bundle(bundle) => {
            // An empty bundle is indistinguishable from an invalid code for
            // the end user.
            if bundle.items.is_empty() {
                bot.send_message(chat_id, "Invalid share code.").await?;
                return Ok(());
            }
            if bundle.disabled {
                bot.send_message(chat_id, "This link has been disabled.")
                    .await?;
                return Ok(());
            }
            // Sequential delivery in insertion order; a failed item is
            // logged and the rest of the bundle still goes out.
            for item in &bundle.items {
                if let Err(e) = send_media_item(bot, chat_id, item).await {
                    tracing::warn!("Bundle item delivery failed for {}: {}", code, e);
                }
            }
        }
        Resolved::None => {
            bot.send_message(chat_id, "Invalid share code.").await?;
        }
    }
    Ok(())
}
