//! Wire messages for the community and user services.

pub mod community {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Chat {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(bool, tag = "3")]
        pub is_group: bool,
        #[prost(string, tag = "4")]
        pub created_by: String,
        #[prost(message, optional, tag = "5")]
        pub created_at: Option<::prost_types::Timestamp>,
        #[prost(string, repeated, tag = "6")]
        pub participant_ids: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Message {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub chat_id: String,
        #[prost(string, tag = "3")]
        pub sender_id: String,
        #[prost(string, tag = "4")]
        pub content: String,
        #[prost(message, optional, tag = "5")]
        pub sent_at: Option<::prost_types::Timestamp>,
        #[prost(bool, tag = "6")]
        pub unsent: bool,
        #[prost(bool, tag = "7")]
        pub deleted_for_all: bool,
        #[prost(bool, tag = "8")]
        pub deleted_for_sender: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChatParticipant {
        #[prost(string, tag = "1")]
        pub chat_id: String,
        #[prost(string, tag = "2")]
        pub user_id: String,
        #[prost(bool, tag = "3")]
        pub is_admin: bool,
        #[prost(message, optional, tag = "4")]
        pub joined_at: Option<::prost_types::Timestamp>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CreateChatRequest {
        #[prost(bool, tag = "1")]
        pub is_group: bool,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(string, repeated, tag = "3")]
        pub participant_ids: Vec<String>,
        #[prost(string, tag = "4")]
        pub created_by: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChatResponse {
        #[prost(message, optional, tag = "1")]
        pub chat: Option<Chat>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SendMessageRequest {
        #[prost(string, tag = "1")]
        pub chat_id: String,
        #[prost(string, tag = "2")]
        pub sender_id: String,
        #[prost(string, tag = "3")]
        pub content: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MessageResponse {
        #[prost(message, optional, tag = "1")]
        pub message: Option<Message>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MarkMessageAsReadRequest {
        #[prost(string, tag = "1")]
        pub chat_id: String,
        #[prost(string, tag = "2")]
        pub message_id: String,
        #[prost(string, tag = "3")]
        pub user_id: String,
    }

    /// Shared by delete and unsend.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MessageActionRequest {
        #[prost(string, tag = "1")]
        pub message_id: String,
        #[prost(string, tag = "2")]
        pub chat_id: String,
        #[prost(string, tag = "3")]
        pub user_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListMessagesRequest {
        #[prost(string, tag = "1")]
        pub chat_id: String,
        #[prost(int32, tag = "2")]
        pub limit: i32,
        #[prost(int32, tag = "3")]
        pub offset: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListMessagesResponse {
        #[prost(message, repeated, tag = "1")]
        pub messages: Vec<Message>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListChatParticipantsRequest {
        #[prost(string, tag = "1")]
        pub chat_id: String,
        #[prost(int32, tag = "2")]
        pub limit: i32,
        #[prost(int32, tag = "3")]
        pub offset: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListChatParticipantsResponse {
        #[prost(message, repeated, tag = "1")]
        pub participants: Vec<ChatParticipant>,
    }

    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Empty {}
}

pub mod user {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct User {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub username: String,
        #[prost(string, tag = "3")]
        pub name: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetUserRequest {
        #[prost(string, tag = "1")]
        pub user_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetUserResponse {
        #[prost(message, optional, tag = "1")]
        pub user: Option<User>,
    }
}
