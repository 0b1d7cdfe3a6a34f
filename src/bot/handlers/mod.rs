use teloxide::prelude::*;

mod callbacks;
mod commands;
mod messages;

pub use callbacks::callback_handler;
pub use commands::{command_handler, Command};
pub use messages::message_handler;

use super::keyboards::build_admin_menu_keyboard;

pub(crate) async fn send_admin_menu(bot: &Bot, chat_id: ChatId, is_owner: bool) -> ResponseResult<()> {
    bot.send_message(chat_id, "Admin menu:")
        .reply_markup(build_admin_menu_keyboard(is_owner))
        .await?;
    Ok(())
}
