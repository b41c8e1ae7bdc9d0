//! `ChatBackend` over the community and user gRPC services.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tonic::transport::Channel;
use tonic::{Code, Status};

use crate::config::Settings;
use crate::domain::{BackendError, Chat, ChatBackend, ChatMessage, ErrorKind, NewChat};
use crate::infrastructure::metrics;
use crate::infrastructure::rpc::proto::{community, user};
use crate::infrastructure::rpc::{
    CommunityClient, ConnectionPool, GrpcConnector, PoolConfig, PoolStats, UserClient,
};

/// Page size used when resolving participants.
const PARTICIPANT_PAGE: i32 = 500;

/// Map a gRPC status onto the facade's error taxonomy.
pub fn translate_status(status: &Status) -> BackendError {
    let message = status.message().to_string();
    let kind = match status.code() {
        Code::NotFound => ErrorKind::NotFound,
        Code::PermissionDenied | Code::Unauthenticated => ErrorKind::PermissionDenied,
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange | Code::AlreadyExists => {
            ErrorKind::InvalidInput
        }
        Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Cancelled => {
            ErrorKind::Unavailable
        }
        Code::Unknown if message.to_lowercase().contains("not found") => ErrorKind::NotFound,
        _ => ErrorKind::Internal,
    };
    BackendError::new(kind, message)
}

fn to_datetime(ts: Option<prost_types::Timestamp>) -> DateTime<Utc> {
    ts.and_then(|ts| DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32))
        .unwrap_or_else(Utc::now)
}

impl From<community::Message> for ChatMessage {
    fn from(m: community::Message) -> Self {
        Self {
            id: m.id,
            chat_id: m.chat_id,
            sender_id: m.sender_id,
            content: m.content,
            sent_at: to_datetime(m.sent_at),
            unsent: m.unsent,
            deleted_for_all: m.deleted_for_all,
            deleted_for_sender: m.deleted_for_sender,
        }
    }
}

impl From<community::Chat> for Chat {
    fn from(c: community::Chat) -> Self {
        Self {
            id: c.id,
            name: c.name,
            is_group: c.is_group,
            created_by: c.created_by,
            participant_ids: c.participant_ids,
            created_at: to_datetime(c.created_at),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), BackendError> {
    if value.trim().is_empty() {
        return Err(BackendError::invalid_input(format!("{} is required", field)));
    }
    Ok(())
}

/// A missing user is an answer, not a failure.
fn user_exists(result: Result<user::GetUserResponse, BackendError>) -> Result<bool, BackendError> {
    match result {
        Ok(response) => Ok(response.user.is_some()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Production backend: one channel pool per service.
pub struct GrpcChatBackend {
    community: ConnectionPool<GrpcConnector>,
    users: ConnectionPool<GrpcConnector>,
    call_timeout: Duration,
    list_timeout: Duration,
}

impl GrpcChatBackend {
    pub fn new(
        community: ConnectionPool<GrpcConnector>,
        users: ConnectionPool<GrpcConnector>,
        call_timeout: Duration,
        list_timeout: Duration,
    ) -> Self {
        Self {
            community,
            users,
            call_timeout,
            list_timeout,
        }
    }

    /// Build both pools from settings. Nothing is dialed until first use.
    pub fn from_settings(settings: &Settings) -> Self {
        let config = PoolConfig::from(&settings.pool);
        let connector = GrpcConnector::new(settings.pool.dial_timeout());
        Self::new(
            ConnectionPool::new(
                "community",
                settings.services.community.clone(),
                connector.clone(),
                config,
            ),
            ConnectionPool::new("user", settings.services.user.clone(), connector, config),
            settings.rpc.call_timeout(),
            settings.rpc.list_timeout(),
        )
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        vec![self.community.stats(), self.users.stats()]
    }

    /// Close both pools.
    pub fn close(&self) {
        self.community.close();
        self.users.close();
    }

    /// Borrow a channel, run one call under `timeout`, and return or discard
    /// the channel depending on the outcome.
    async fn call<T, F, Fut>(
        &self,
        pool: &ConnectionPool<GrpcConnector>,
        operation: &'static str,
        timeout: Duration,
        f: F,
    ) -> Result<T, BackendError>
    where
        F: FnOnce(Channel) -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let started = Instant::now();
        let result = match pool.get().await {
            Ok(conn) => {
                let outcome = match tokio::time::timeout(timeout, f((*conn).clone())).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(status)) => Err(translate_status(&status)),
                    Err(_) => Err(BackendError::unavailable(format!(
                        "{} timed out after {:?}",
                        operation, timeout
                    ))),
                };
                match &outcome {
                    Err(e) if e.is_retryable() => conn.discard(),
                    _ => drop(conn),
                }
                outcome
            }
            Err(e) => Err(BackendError::from(e)),
        };

        metrics::record_backend_call(operation, &result, started.elapsed());
        if let Err(e) = &result {
            tracing::warn!(
                operation,
                service = pool.service(),
                kind = %e.kind(),
                error = %e.message(),
                "Backend call failed"
            );
        }
        result
    }
}

#[async_trait]
impl ChatBackend for GrpcChatBackend {
    async fn send_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<String, BackendError> {
        require("chat_id", chat_id)?;
        require("content", content)?;
        if !self.validate_user(sender_id).await? {
            return Err(BackendError::not_found(format!("user {} not found", sender_id)));
        }

        let request = community::SendMessageRequest {
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
        };
        let timeout = self.call_timeout;
        let response = self
            .call(&self.community, "send_message", timeout, |channel| async move {
                CommunityClient::new(channel).send_message(request, timeout).await
            })
            .await?;

        response
            .message
            .map(|m| m.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BackendError::internal("send_message response carried no message id"))
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, BackendError> {
        require("chat_id", chat_id)?;
        let request = community::ListMessagesRequest {
            chat_id: chat_id.to_string(),
            limit: i32::try_from(limit).unwrap_or(i32::MAX),
            offset: i32::try_from(offset).unwrap_or(i32::MAX),
        };
        let timeout = self.list_timeout;
        let response = self
            .call(&self.community, "list_messages", timeout, |channel| async move {
                CommunityClient::new(channel).list_messages(request, timeout).await
            })
            .await?;

        Ok(response.messages.into_iter().map(ChatMessage::from).collect())
    }

    async fn mark_read(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError> {
        require("message_id", message_id)?;
        let request = community::MarkMessageAsReadRequest {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            user_id: user_id.to_string(),
        };
        let timeout = self.call_timeout;
        self.call(&self.community, "mark_read", timeout, |channel| async move {
            CommunityClient::new(channel)
                .mark_message_as_read(request, timeout)
                .await
        })
        .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError> {
        require("message_id", message_id)?;
        let request = community::MessageActionRequest {
            message_id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        };
        let timeout = self.call_timeout;
        self.call(&self.community, "delete_message", timeout, |channel| async move {
            CommunityClient::new(channel)
                .delete_message(request, timeout)
                .await
        })
        .await?;
        Ok(())
    }

    async fn unsend_message(
        &self,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> Result<(), BackendError> {
        require("message_id", message_id)?;
        let request = community::MessageActionRequest {
            message_id: message_id.to_string(),
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        };
        let timeout = self.call_timeout;
        self.call(&self.community, "unsend_message", timeout, |channel| async move {
            CommunityClient::new(channel)
                .unsend_message(request, timeout)
                .await
        })
        .await?;
        Ok(())
    }

    async fn create_chat(&self, chat: NewChat) -> Result<Chat, BackendError> {
        require("created_by", &chat.created_by)?;
        if chat.is_group && chat.name.trim().is_empty() {
            return Err(BackendError::invalid_input("group chats require a name"));
        }
        let participant_ids = chat.participants_with_creator();
        if participant_ids.len() < 2 {
            return Err(BackendError::invalid_input(
                "a chat needs at least one participant besides its creator",
            ));
        }

        let request = community::CreateChatRequest {
            is_group: chat.is_group,
            name: chat.name,
            participant_ids,
            created_by: chat.created_by,
        };
        let timeout = self.call_timeout;
        let response = self
            .call(&self.community, "create_chat", timeout, |channel| async move {
                CommunityClient::new(channel).create_chat(request, timeout).await
            })
            .await?;

        response
            .chat
            .map(Chat::from)
            .ok_or_else(|| BackendError::internal("create_chat response carried no chat"))
    }

    async fn validate_user(&self, user_id: &str) -> Result<bool, BackendError> {
        if user_id.trim().is_empty() {
            return Ok(false);
        }
        let request = user::GetUserRequest {
            user_id: user_id.to_string(),
        };
        let timeout = self.call_timeout;
        let result = self
            .call(&self.users, "validate_user", timeout, |channel| async move {
                UserClient::new(channel).get_user(request, timeout).await
            })
            .await;

        user_exists(result)
    }

    async fn list_participants(&self, chat_id: &str) -> Result<Vec<String>, BackendError> {
        require("chat_id", chat_id)?;
        let timeout = self.list_timeout;
        let mut ids = Vec::new();
        let mut offset = 0;
        loop {
            let request = community::ListChatParticipantsRequest {
                chat_id: chat_id.to_string(),
                limit: PARTICIPANT_PAGE,
                offset,
            };
            let page = self
                .call(&self.community, "list_participants", timeout, |channel| async move {
                    CommunityClient::new(channel)
                        .list_chat_participants(request, timeout)
                        .await
                })
                .await?;

            let fetched = page.participants.len();
            ids.extend(page.participants.into_iter().map(|p| p.user_id));
            if fetched < PARTICIPANT_PAGE as usize {
                break;
            }
            offset += PARTICIPANT_PAGE;
        }
        Ok(ids)
    }
}
