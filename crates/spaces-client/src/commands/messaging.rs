use tracing::{debug, info};

use spaces_net::GatewayError;
use spaces_shared::types::MessageId;
use spaces_shared::{Attachment, ChatId, Message, ValidationError};

use crate::error::{Result, SyncError};
use crate::events::{SyncEvent, Topic};
use crate::state::lock;
use crate::sync::merge::{merge_chat_frame, replace_message};
use crate::sync::tasks::thread_forbidden;
use crate::sync::SyncEngine;

impl SyncEngine {
    /// Post a message to `chat` and append it locally once accepted.
    pub async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message> {
        let ctx = self.context();
        let me = ctx.me()?;
        let text = text.trim();
        if text.is_empty() && attachments.is_empty() {
            return Err(ValidationError::Empty("message").into());
        }

        let message = Message::new(me, text, attachments);
        match ctx.backend.post_message(chat, &message).await {
            Ok(()) => {}
            Err(GatewayError::Forbidden) => {
                thread_forbidden(ctx, chat);
                return Err(GatewayError::Forbidden.into());
            }
            Err(e) => return Err(ctx.check(e)),
        }

        if merge_chat_frame(&mut lock(&ctx.state), chat, message.clone()) {
            ctx.emit(SyncEvent::StateChanged(Topic::Thread(chat)));
        }
        info!(%chat, id = %message.id, attachments = message.attachments.len(), "message sent");
        Ok(message)
    }

    /// Flip the caller's `emoji` reaction on a cached message.
    ///
    /// Read-modify-write: the whole message goes back to the backend and
    /// whatever it acknowledges replaces the cached copy by id.  Two users
    /// toggling the same message concurrently can overwrite each other.
    pub async fn toggle_reaction(
        &self,
        chat: ChatId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<Message> {
        let ctx = self.context();
        let me = ctx.me()?;
        let cached = lock(&ctx.state)
            .thread(chat)
            .and_then(|thread| thread.iter().find(|m| &m.id == message_id).cloned());
        let mut updated = cached.ok_or(SyncError::NotFound("message"))?;
        let added = updated.toggle_reaction(emoji, me);

        let ack = ctx
            .backend
            .patch_message(chat, &updated)
            .await
            .map_err(|e| ctx.check(e))?;
        let stored = ack.unwrap_or(updated);

        if replace_message(&mut lock(&ctx.state), chat, stored.clone()) {
            ctx.emit(SyncEvent::StateChanged(Topic::Thread(chat)));
        }
        debug!(%chat, id = %message_id, emoji, added, "reaction toggled");
        Ok(stored)
    }
}
