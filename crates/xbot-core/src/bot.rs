//! Outbound bot API.
//!
//! The framework never talks to the gateway itself. Handlers reach it through
//! a [`Bot`] implementation injected by whoever drives the engine; everything
//! funnels into [`Bot::call_api`], and the typed helpers are defaulted on top
//! of it.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::ApiResult;
use crate::message::Message;

/// The message id in a send response, `0` when the gateway omits it.
fn message_id_of(response: &Value) -> i64 {
    response
        .get("message_id")
        .and_then(Value::as_i64)
        .unwrap_or_default()
}

#[async_trait]
pub trait Bot: Send + Sync {
    /// Account id of this bot.
    fn self_id(&self) -> i64;

    /// Calls a raw API action with JSON parameters and returns the `data`
    /// part of the response.
    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value>;

    /// Returns the id of the sent message.
    async fn send_private_msg(&self, user_id: i64, message: Message) -> ApiResult<i64> {
        let response = self
            .call_api(
                "send_private_msg",
                json!({ "user_id": user_id, "message": message }),
            )
            .await?;
        Ok(message_id_of(&response))
    }

    /// Returns the id of the sent message.
    async fn send_group_msg(&self, group_id: i64, message: Message) -> ApiResult<i64> {
        let response = self
            .call_api(
                "send_group_msg",
                json!({ "group_id": group_id, "message": message }),
            )
            .await?;
        Ok(message_id_of(&response))
    }

    /// Recalls a message.
    async fn delete_msg(&self, message_id: i64) -> ApiResult<()> {
        self.call_api("delete_msg", json!({ "message_id": message_id }))
            .await?;
        Ok(())
    }

    async fn set_group_kick(
        &self,
        group_id: i64,
        user_id: i64,
        reject_add_request: bool,
    ) -> ApiResult<()> {
        self.call_api(
            "set_group_kick",
            json!({
                "group_id": group_id,
                "user_id": user_id,
                "reject_add_request": reject_add_request,
            }),
        )
        .await?;
        Ok(())
    }

    /// Mutes a member for `duration_secs`; `0` lifts the mute.
    async fn set_group_ban(&self, group_id: i64, user_id: i64, duration_secs: u64) -> ApiResult<()> {
        self.call_api(
            "set_group_ban",
            json!({
                "group_id": group_id,
                "user_id": user_id,
                "duration": duration_secs,
            }),
        )
        .await?;
        Ok(())
    }

    /// Returns self as an `Arc<dyn Any>` for downcasting.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;

/// Attempts to downcast a [`BoxedBot`] to a concrete type.
pub fn downcast_bot<T: Bot + 'static>(bot: BoxedBot) -> Option<Arc<T>> {
    Arc::downcast::<T>(bot.as_any()).ok()
}
