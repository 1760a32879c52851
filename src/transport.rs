use std::future::Future;

use serde::Serialize;

use crate::types::{ChatId, MessageId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    pub label: String,
    pub action: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub buttons: Vec<Button>,
}

impl Controls {
    pub fn single(label: &str, action: String) -> Self {
        Self {
            buttons: vec![Button {
                label: label.to_string(),
                action,
            }],
        }
    }

    pub fn pair(first: (&str, String), second: (&str, String)) -> Self {
        Self {
            buttons: vec![
                Button {
                    label: first.0.to_string(),
                    action: first.1,
                },
                Button {
                    label: second.0.to_string(),
                    action: second.1,
                },
            ],
        }
    }
}

/// Chat platform primitives. Delivery failures are the callee's problem:
/// implementations log and swallow them, callers carry on either way.
pub trait ChatTransport: Send + Sync + 'static {
    fn post_message(
        &self,
        chat_id: ChatId,
        text: &str,
        controls: Option<Controls>,
    ) -> impl Future<Output = Option<MessageId>> + Send;

    fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        controls: Option<Controls>,
    ) -> impl Future<Output = bool> + Send;

    fn answer_interaction(
        &self,
        interaction_id: &str,
        alert: Option<&str>,
    ) -> impl Future<Output = ()> + Send;
}
