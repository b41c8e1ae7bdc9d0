//! Unary gRPC clients over pooled channels.

use std::time::Duration;

use async_trait::async_trait;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use super::pool::{Connector, PoolError};
use super::proto::{community, user};

/// Dials plaintext HTTP/2 channels.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

/// Accept both `host:port` and full URIs.
fn endpoint_uri(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    type Connection = Channel;

    async fn connect(&self, address: &str) -> Result<Channel, PoolError> {
        let endpoint = Endpoint::from_shared(endpoint_uri(address))
            .map_err(|e| PoolError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(true);

        endpoint.connect().await.map_err(|e| PoolError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })
    }
}

async fn unary<Req, Resp>(
    grpc: &mut Grpc<Channel>,
    path: &'static str,
    message: Req,
    timeout: Duration,
) -> Result<Resp, Status>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("service was not ready: {}", e)))?;

    let mut request = Request::new(message);
    request.set_timeout(timeout);

    let codec: ProstCodec<Req, Resp> = ProstCodec::default();
    grpc.unary(request, PathAndQuery::from_static(path), codec)
        .await
        .map(tonic::Response::into_inner)
}

/// `community.CommunityService`
#[derive(Debug, Clone)]
pub struct CommunityClient {
    inner: Grpc<Channel>,
}

impl CommunityClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    pub async fn create_chat(
        &mut self,
        request: community::CreateChatRequest,
        timeout: Duration,
    ) -> Result<community::ChatResponse, Status> {
        unary(
            &mut self.inner,
            "/community.CommunityService/CreateChat",
            request,
            timeout,
        )
        .await
    }

    pub async fn send_message(
        &mut self,
        request: community::SendMessageRequest,
        timeout: Duration,
    ) -> Result<community::MessageResponse, Status> {
        unary(
            &mut self.inner,
            "/community.CommunityService/SendMessage",
            request,
            timeout,
        )
        .await
    }

    pub async fn mark_message_as_read(
        &mut self,
        request: community::MarkMessageAsReadRequest,
        timeout: Duration,
    ) -> Result<community::Empty, Status> {
        unary(
            &mut self.inner,
            "/community.CommunityService/MarkMessageAsRead",
            request,
            timeout,
        )
        .await
    }

    pub async fn delete_message(
        &mut self,
        request: community::MessageActionRequest,
        timeout: Duration,
    ) -> Result<community::Empty, Status> {
        unary(
            &mut self.inner,
            "/community.CommunityService/DeleteMessage",
            request,
            timeout,
        )
        .await
    }

    pub async fn unsend_message(
        &mut self,
        request: community::MessageActionRequest,
        timeout: Duration,
    ) -> Result<community::Empty, Status> {
        unary(
            &mut self.inner,
            "/community.CommunityService/UnsendMessage",
            request,
            timeout,
        )
        .await
    }

    pub async fn list_messages(
        &mut self,
        request: community::ListMessagesRequest,
        timeout: Duration,
    ) -> Result<community::ListMessagesResponse, Status> {
        unary(
            &mut self.inner,
            "/community.CommunityService/ListMessages",
            request,
            timeout,
        )
        .await
    }

    pub async fn list_chat_participants(
        &mut self,
        request: community::ListChatParticipantsRequest,
        timeout: Duration,
    ) -> Result<community::ListChatParticipantsResponse, Status> {
        unary(
            &mut self.inner,
            "/community.CommunityService/ListChatParticipants",
            request,
            timeout,
        )
        .await
    }
}

/// `user.UserService`
#[derive(Debug, Clone)]
pub struct UserClient {
    inner: Grpc<Channel>,
}

impl UserClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    pub async fn get_user(
        &mut self,
        request: user::GetUserRequest,
        timeout: Duration,
    ) -> Result<user::GetUserResponse, Status> {
        unary(&mut self.inner, "/user.UserService/GetUser", request, timeout).await
    }
}
