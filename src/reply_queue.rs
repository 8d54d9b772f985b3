use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ReplyParameters};
use tokio::sync::mpsc;

/// Most messages sent per tick of the queue.
const BATCH: usize = 20;

type Outgoing = (ChatId, String, Option<MessageId>);

/// Sends MarkdownV2 messages from a background task, at most `BATCH` per
/// second. Used for traffic the bot starts on its own (greetings, summons)
/// so that a wave of joins can't run into the platform's flood limits.
#[derive(Clone)]
pub struct ReplyQueue(mpsc::UnboundedSender<Outgoing>);

impl ReplyQueue {
    pub async fn send(bot: &Bot, chat_id: ChatId, msg: String, reply_to: Option<MessageId>) {
        let mut request = bot.send_message(chat_id, msg).parse_mode(ParseMode::MarkdownV2);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }

        if let Err(e) = request.await {
            log::warn!("Couldn't send message to {chat_id}: {e}")
        }
    }

    pub fn new(bot: Bot) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

        tokio::task::spawn(async move {
            let mut buffer = Vec::with_capacity(BATCH);
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            while rx.recv_many(&mut buffer, BATCH).await > 0 {
                for (chat_id, msg, reply_to) in buffer.drain(..) {
                    Self::send(&bot, chat_id, msg, reply_to).await;
                }
                interval.tick().await;
            }
            log::debug!("Reply queue closed");
        });

        Self(tx)
    }

    pub fn queue(&self, chat_id: ChatId, msg: String, reply_to: Option<MessageId>) {
        if self.0.send((chat_id, msg, reply_to)).is_err() {
            log::error!("Queuing message for {chat_id} failed!")
        }
    }
}
