//! Outbound message flow for the active conversation.

use crate::client::{ClientError, Result};
use crate::conversation::{ConversationView, SelectedChat};
use crate::types::chat::{Message, MessageDraft};
use log::{debug, warn};

impl ConversationView {
    /// Sends the composer draft, with an optional image payload (data URL).
    ///
    /// The gateway write is authoritative: nothing is shown or broadcast
    /// until the record is stored. On success the confirmed record goes out
    /// over the channel, lands in the local list and the composer resets.
    /// Gateway failures surface as a notice as well as in the return value.
    pub async fn send(&self, image: Option<String>) -> Result<Message> {
        let selected = self.selected.read().await.clone();
        let Some(selected) = selected else {
            return Err(ClientError::NoSelection);
        };
        let text = self.state.read().await.draft.clone();

        let draft = MessageDraft {
            chat: selected.chat.clone(),
            sender: self.client.user().clone(),
            text,
            image,
        };
        match self.deliver(&selected, draft).await {
            Ok(message) => Ok(message),
            Err(e) => {
                self.client
                    .notify_error(format!("Failed to send message: {e}"));
                Err(e)
            }
        }
    }

    async fn deliver(&self, selected: &SelectedChat, draft: MessageDraft) -> Result<Message> {
        let id = self.client.gateway().send_message(&draft).await?;
        let message = Message::from_draft(draft, id);
        debug!(target: "Client/Send", "--> Stored message {} in chat {}", message.id, message.chat);

        // Best-effort fan-out; the stored record reaches the peer on their
        // next history load even if this frame is lost.
        if let Err(e) = self
            .client
            .channel()
            .emit_message(&message, &selected.members)
            .await
        {
            warn!(target: "Client/Send", "Broadcast of message {} failed: {e}", message.id);
        }

        {
            let mut state = self.state.write().await;
            state.messages.push(message.clone());
            state.draft.clear();
            state.emoji_picker_open = false;
        }
        self.typing_gate.lock().await.reset();

        Ok(message)
    }
}
