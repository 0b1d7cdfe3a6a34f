use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, InputFile, ParseMode, Recipient};

use crate::force_join::{ForceJoinRule, MembershipProbe};
use crate::registry::{MediaItem, MediaKind};
use crate::store::{keys, KvStore};

/// Records a user id on first contact; idempotent, degrades on store errors.
pub fn ensure_user(store: &dyn KvStore, user_id: u64) {
    let key = keys::user_key(user_id);
    match store.get(&key) {
        Ok(None) => {
            if let Err(e) = store.put(&key, "1") {
                tracing::warn!("Failed to record user {}: {}", user_id, e);
            }
        }
        Ok(Some(_)) => {}
        Err(e) => tracing::warn!("Failed to check user {}: {}", user_id, e),
    }
}

/// Resolves the bot's username, preferring the store-cached value over a
/// `getMe` round trip. Returns an empty string when both fail.
pub async fn bot_username(bot: &Bot, store: &dyn KvStore) -> String {
    if let Ok(Some(cached)) = store.get(keys::CONFIG_BOT_USERNAME) {
        return cached;
    }
    match bot.get_me().await {
        Ok(me) => {
            let username = me.user.username.clone().unwrap_or_default();
            if !username.is_empty() {
                if let Err(e) = store.put(keys::CONFIG_BOT_USERNAME, &username) {
                    tracing::warn!("Failed to cache bot username: {}", e);
                }
            }
            username
        }
        Err(e) => {
            tracing::warn!("getMe failed: {}", e);
            String::new()
        }
    }
}

pub fn deep_link(username: &str, code: &str) -> String {
    let username = username.trim_start_matches('@');
    if username.is_empty() {
        format!("tg://resolve?domain=&start={}", code)
    } else {
        format!("https://t.me/{}?start={}", username, code)
    }
}

/// Sends one stored media item with the send method matching its type.
pub async fn send_media_item(bot: &Bot, chat_id: ChatId, item: &MediaItem) -> ResponseResult<()> {
    let file = InputFile::file_id(item.file_id.clone());
    let caption = (!item.caption.is_empty()).then(|| item.caption.clone());

    macro_rules! send {
        ($method:ident) => {{
            let mut request = bot.$method(chat_id, file).parse_mode(ParseMode::Html);
            if let Some(caption) = caption {
                request = request.caption(caption);
            }
            request.await?;
        }};
    }

    match item.kind {
        MediaKind::Photo => send!(send_photo),
        MediaKind::Video => send!(send_video),
        MediaKind::Document => send!(send_document),
        MediaKind::Animation => send!(send_animation),
        MediaKind::Audio => send!(send_audio),
        MediaKind::Voice => send!(send_voice),
    }
    Ok(())
}

/// Pulls the media payload out of an incoming message, if any. For photos
/// the largest size is kept.
pub fn extract_media(msg: &Message) -> Option<MediaItem> {
    let caption = msg.caption().unwrap_or_default().to_string();
    let (kind, file_id) = if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        (MediaKind::Photo, photo.file.id.clone())
    } else if let Some(video) = msg.video() {
        (MediaKind::Video, video.file.id.clone())
    } else if let Some(document) = msg.document() {
        (MediaKind::Document, document.file.id.clone())
    } else if let Some(animation) = msg.animation() {
        (MediaKind::Animation, animation.file.id.clone())
    } else if let Some(audio) = msg.audio() {
        (MediaKind::Audio, audio.file.id.clone())
    } else if let Some(voice) = msg.voice() {
        (MediaKind::Voice, voice.file.id.clone())
    } else {
        return None;
    };
    Some(MediaItem {
        kind,
        file_id,
        caption,
    })
}

/// Membership lookup through the live bot API. A user counts as joined
/// unless the API reports them as left or kicked.
pub struct BotProbe<'a> {
    pub bot: &'a Bot,
}

impl MembershipProbe for BotProbe<'_> {
    async fn is_member(&self, rule: &ForceJoinRule, user_id: u64) -> anyhow::Result<bool> {
        let chat: Recipient = match rule {
            ForceJoinRule::Username { username } => {
                Recipient::ChannelUsername(format!("@{}", username))
            }
            ForceJoinRule::Private { chat_id, .. } => Recipient::Id(ChatId(*chat_id)),
        };
        let member = self.bot.get_chat_member(chat, UserId(user_id)).await?;
        Ok(!matches!(
            member.kind,
            ChatMemberKind::Left | ChatMemberKind::Banned(_)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn ensure_user_is_idempotent() {
        let store = MemoryStore::new();
        ensure_user(&store, 42);
        ensure_user(&store, 42);
        assert_eq!(crate::store::count_prefix(&store, keys::USER_PREFIX), 1);
    }

    #[test]
    fn deep_link_falls_back_without_a_username() {
        assert_eq!(
            deep_link("mybot", "ab12"),
            "https://t.me/mybot?start=ab12"
        );
        assert_eq!(
            deep_link("@mybot", "ab12"),
            "https://t.me/mybot?start=ab12"
        );
        assert_eq!(deep_link("", "ab12"), "tg://resolve?domain=&start=ab12");
    }
}
