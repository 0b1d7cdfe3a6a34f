use teloxide::dispatching::{Dispatcher, UpdateFilterExt};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;

use crate::config::AppConfig;
use crate::store::Store;

pub mod broadcast;
pub mod context;
pub mod handlers;
pub mod keyboards;
pub mod redemption;
pub mod state;
pub mod utils;

use handlers::{callback_handler, command_handler, message_handler, Command};

pub async fn run_bot(store: Store, config: AppConfig) {
    tracing::info!("Starting filegate bot...");

    let bot = Bot::new(config.bot_token.clone());

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint({
                    let store = store.clone();
                    let config = config.clone();
                    move |bot: Bot, msg: Message, cmd: Command| {
                        let store = store.clone();
                        let config = config.clone();
                        async move { command_handler(bot, msg, cmd, store, config).await }
                    }
                }),
        )
        .branch(Update::filter_message().endpoint({
            let store = store.clone();
            let config = config.clone();
            move |bot: Bot, msg: Message| {
                let store = store.clone();
                let config = config.clone();
                async move { message_handler(bot, msg, store, config).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let store = store.clone();
            let config = config.clone();
            move |bot: Bot, q: CallbackQuery| {
                let store = store.clone();
                let config = config.clone();
                async move { callback_handler(bot, q, store, config).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
