//! Chat room types: list entries, details, and the creation request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::ids::{ChatId, UserId};
use crate::message::Message;
use crate::user::User;

/// Kind of conversation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChatType {
    OneOnOne,
    Group,
    Bot,
}

/// A user's membership in a chat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    #[serde(default, with = "crate::timestamp::option")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<User>,
}

/// A chat as returned by `GET /chats/` and `GET /chats/{id}`.
///
/// The list endpoint omits `messages`; the detail endpoint includes the most
/// recent history page. `last_message` is only present where the server
/// populates a preview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", alias = "chat_type")]
    pub chat_type: ChatType,
    #[serde(default)]
    pub creator_id: Option<UserId>,
    #[serde(default, with = "crate::timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::timestamp::option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub last_message: Option<Message>,
}

impl Chat {
    pub fn participant_ids(&self) -> impl Iterator<Item = UserId> + '_ {
        self.participants.iter().map(|p| p.user_id)
    }

    pub fn has_participant(&self, user: UserId) -> bool {
        self.participant_ids().any(|id| id == user)
    }

    /// Title for headers and list rows.
    ///
    /// Named chats use their name. Unnamed ones list the other participants,
    /// falling back to the chat kind.
    pub fn title(&self, me: Option<UserId>) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        let others: Vec<&str> = self
            .participants
            .iter()
            .filter(|p| Some(p.user_id) != me)
            .filter_map(|p| p.user.as_ref().map(User::display_name))
            .collect();
        if others.is_empty() {
            match self.chat_type {
                ChatType::Bot => "Bot chat".to_string(),
                ChatType::Group => "Group chat".to_string(),
                ChatType::OneOnOne => format!("Chat {}", self.id),
            }
        } else {
            others.join(", ")
        }
    }

    /// Most recent message known for this chat, from history or preview.
    pub fn latest_message(&self) -> Option<&Message> {
        self.messages.last().or(self.last_message.as_ref())
    }
}

/// Body of `POST /chats/`. The creator is implicit (taken from the token).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub participant_ids: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: &str) -> User {
        User {
            id: UserId::new(id),
            email: format!("{name}@example.com"),
            full_name: Some(name.to_string()),
            is_bot: false,
        }
    }

    #[test]
    fn test_chat_type_strings() {
        assert_eq!(ChatType::OneOnOne.as_ref(), "one_on_one");
        assert_eq!("bot".parse::<ChatType>().unwrap(), ChatType::Bot);
        assert_eq!(serde_json::to_string(&ChatType::Group).unwrap(), r#""group""#);
    }

    #[test]
    fn test_decode_chat_detail() {
        let chat: Chat = serde_json::from_str(
            r#"{"name":null,"type":"one_on_one","id":4,"creator_id":1,
                "created_at":"2024-05-01T10:00:00","updated_at":"2024-05-01T10:00:00",
                "creator":{"email":"a@b.com","full_name":"Amy","id":1},
                "participants":[
                    {"user_id":1,"joined_at":"2024-05-01T10:00:00","user":{"email":"a@b.com","full_name":"Amy","id":1}},
                    {"user_id":2,"joined_at":"2024-05-01T10:00:00","user":{"email":"j@d.com","full_name":"Jane","id":2}}
                ]}"#,
        )
        .unwrap();
        assert_eq!(chat.id, ChatId::new(4));
        assert!(chat.has_participant(UserId::new(2)));
        assert_eq!(chat.title(Some(UserId::new(1))), "Jane");
        assert!(chat.messages.is_empty());
    }

    #[test]
    fn test_title_prefers_name() {
        let chat = Chat {
            id: ChatId::new(1),
            name: Some("Design Team".into()),
            chat_type: ChatType::Group,
            creator_id: None,
            created_at: None,
            updated_at: None,
            participants: vec![Participant { user_id: UserId::new(2), joined_at: None, user: Some(user(2, "jane")) }],
            messages: vec![],
            last_message: None,
        };
        assert_eq!(chat.title(None), "Design Team");
    }

    #[test]
    fn test_new_chat_omits_missing_name() {
        let body = NewChat {
            name: None,
            chat_type: ChatType::OneOnOne,
            participant_ids: vec![UserId::new(2)],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"type":"one_on_one","participant_ids":[2]}"#
        );
    }
}
