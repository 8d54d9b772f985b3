mod auth;
mod command;
mod config;
mod error;
mod messages;
mod moderation;
mod platform;
mod reply_queue;
mod store;
mod warnings;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use command::Command;
use config::Config;
use dptree::deps;
use moderation::{Invocation, Moderation, RepliedMessage, Reply};
use platform::{Person, Platform, TelegramPlatform};
use reply_queue::ReplyQueue;
use store::Store;
use teloxide::prelude::*;
use teloxide::types::MessageEntityKind;

/// Users tagged through text mention entities, with the text each one
/// occupies in the message.
fn text_mentions(msg: &Message) -> Vec<(Person, String)> {
    msg.parse_entities()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entity| match entity.kind() {
            MessageEntityKind::TextMention { user } => {
                Some((Person::from(user), entity.text().to_owned()))
            }
            _ => None,
        })
        .collect()
}

fn invocation(msg: &Message, cmd: &Command) -> Option<Invocation> {
    let actor = Person::from(msg.from.as_ref()?);
    let reply_to = msg.reply_to_message().map(|replied| RepliedMessage {
        id: replied.id,
        author: replied.from.as_ref().map(Person::from),
    });

    let mut rest = cmd.text().to_owned();
    let mut mentions = Vec::new();
    for (person, text) in text_mentions(msg) {
        rest = rest.replacen(&text, " ", 1);
        mentions.push(person);
    }

    Some(Invocation {
        chat: msg.chat.id,
        chat_title: msg.chat.title().map(ToOwned::to_owned),
        private: msg.chat.is_private(),
        message: msg.id,
        actor,
        reply_to,
        mentions,
        args: rest.split_whitespace().map(String::from).collect(),
    })
}

async fn answer(
    bot: Bot,
    msg: Message,
    cmd: Command,
    moderation: Arc<Moderation>,
) -> ResponseResult<()> {
    let Some(inv) = invocation(&msg, &cmd) else {
        log::debug!("Ignoring {cmd:?} without sender in {}", msg.chat.id);
        return Ok(());
    };

    if let Reply::Text(reply) = moderation.execute(cmd, &inv).await {
        ReplyQueue::send(&bot, msg.chat.id, reply, Some(msg.id)).await;
    }
    Ok(())
}

async fn greet(msg: Message, moderation: Arc<Moderation>, queue: ReplyQueue) -> ResponseResult<()> {
    let joined: Vec<Person> = msg
        .new_chat_members()
        .unwrap_or_default()
        .iter()
        .map(Person::from)
        .collect();
    let title = msg.chat.title().unwrap_or_default();

    for greeting in moderation.members_joined(msg.chat.id, title, &joined).await {
        queue.queue(msg.chat.id, greeting, Some(msg.id));
    }
    Ok(())
}

async fn scan(
    msg: Message,
    text: String,
    moderation: Arc<Moderation>,
    queue: ReplyQueue,
) -> ResponseResult<()> {
    if let Some(reply) = moderation.scan_text(msg.chat.id, &text).await {
        queue.queue(msg.chat.id, reply, Some(msg.id));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();
    log::info!("Starting bot...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {e}");
            return;
        }
    };

    let bot = Bot::from_env();
    let store = match Store::open(&config.data_dir).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            log::error!("Couldn't open state in {}: {e}", config.data_dir.display());
            return;
        }
    };
    let platform: Arc<dyn Platform> =
        match TelegramPlatform::new(bot.clone(), config.platform_timeout).await {
            Ok(platform) => Arc::new(platform),
            Err(e) => {
                log::error!("Couldn't reach Telegram: {e}");
                return;
            }
        };

    let moderation = Arc::new(Moderation::new(
        store.clone(),
        platform,
        config.reverify_delay,
    ));
    let queue = ReplyQueue::new(bot.clone());

    let handler = Update::filter_message()
        .branch(dptree::entry().filter_command::<Command>().endpoint(answer))
        .branch(dptree::filter(|msg: Message| msg.new_chat_members().is_some()).endpoint(greet))
        .branch(
            dptree::filter_map(|msg: Message| msg.text().map(ToOwned::to_owned)).endpoint(scan),
        );

    Dispatcher::builder(bot, handler)
        .dependencies(deps![moderation, queue])
        // every update is handled in its own task, there is no per-chat order
        .distribution_function(|_| None::<std::convert::Infallible>)
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    if let Err(e) = store.flush().await {
        log::error!("Flushing state on shutdown failed: {e}");
    }
    log::info!("Stopped");
}
