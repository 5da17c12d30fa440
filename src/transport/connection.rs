// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-connection loop.
//!
//! Each accepted socket gets one task: detect the wire profile from the
//! first frame, complete the v2 handshake when applicable, then read,
//! dispatch, and reply strictly in wire order. A protocol error closes this
//! connection only. Connection teardown implicitly cancels every context
//! the connection still holds.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capability::InspectionCapability;
use crate::config::AgentConfig;
use crate::constants::protocol::{ENCODING_JSON, VERSION_V2};
use crate::context::RequestStore;
use crate::dispatch::EventDispatcher;
use crate::error::ProtocolError;
use crate::protocol::profile::{ActiveProfile, ProfileKind, WireSession};
use crate::protocol::{v2, InboundEvent};
use crate::runtime::ServerShared;
use crate::transport::codec::{Frame, FrameCodec};

/// Drive one accepted connection to completion.
pub async fn serve_connection<C, S>(
    io: S,
    peer: String,
    config: AgentConfig,
    capability: Arc<C>,
    shared: Arc<ServerShared>,
    token: CancellationToken,
) where
    C: InspectionCapability,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let connection_id = Uuid::new_v4().to_string();
    let store = Arc::new(RequestStore::new());
    shared.register_store(&connection_id, store.clone());

    let dispatcher = EventDispatcher::new(
        capability.clone(),
        store.clone(),
        shared.metrics.clone(),
        shared.audit.clone(),
        shared.draining.clone(),
        config.request_timeout,
        connection_id.clone(),
    );

    debug!(connection = %connection_id, peer = %peer, "Connection accepted");

    let mut framed = Framed::new(
        io,
        FrameCodec::new(ActiveProfile::initial_max_payload(config.transport)),
    );
    let result = drive(&mut framed, &config, &capability, &dispatcher, &token).await;

    // teardown implicitly cancels whatever the peer left in flight
    let dropped = store.clear_all();
    shared.metrics.requests_finished(dropped as u64);
    shared.unregister_store(&connection_id);

    match &result {
        Ok(()) => {
            debug!(connection = %connection_id, "Connection closed cleanly");
            capability.on_stream_closed(None).await;
        }
        Err(e) => {
            error!(connection = %connection_id, "Connection failed: {}", e);
            let wrapped = anyhow::Error::msg(e.to_string());
            capability.on_stream_closed(Some(&wrapped)).await;
        }
    }
}

async fn drive<C, S>(
    framed: &mut Framed<S, FrameCodec>,
    config: &AgentConfig,
    capability: &Arc<C>,
    dispatcher: &EventDispatcher<C>,
    token: &CancellationToken,
) -> Result<(), ProtocolError>
where
    C: InspectionCapability,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // the first frame both selects the profile and, for v2, carries the
    // handshake request; it must arrive within the handshake window
    let first = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        read = tokio::time::timeout(config.handshake_timeout, framed.next()) => read,
    };
    let first_payload = match first {
        Err(_) => return Err(ProtocolError::HandshakeTimeout),
        Ok(None) => return Ok(()),
        Ok(Some(Err(e))) => return Err(e),
        Ok(Some(Ok(payload))) => payload,
    };

    let kind = ActiveProfile::detect(&first_payload)?;
    let profile = ActiveProfile::new(kind);
    framed
        .codec_mut()
        .set_max_payload(ActiveProfile::max_payload(kind, config.transport));

    match kind {
        ProfileKind::V2 => {
            let handshake = v2::decode_handshake(&first_payload)?;
            if handshake.protocol_version != VERSION_V2 {
                // deliberate forward-compatibility: note it, keep going
                warn!(
                    "Peer '{}' declared protocol version {}, continuing with {}",
                    handshake.client_name, handshake.protocol_version, VERSION_V2
                );
            }
            info!(
                client = %handshake.client_name,
                features = ?handshake.supported_features,
                "Handshake received"
            );

            let mut capabilities = capability.capabilities();
            if config.enable_keep_alive
                && !capabilities.supported_features.iter().any(|f| f == "keep_alive")
            {
                capabilities.supported_features.push("keep_alive".to_string());
            }
            let response = v2::HandshakeResponse {
                protocol_version: VERSION_V2,
                agent_name: config
                    .agent_name_override
                    .clone()
                    .unwrap_or_else(|| capability.name().to_string()),
                capabilities,
                encoding: ENCODING_JSON.to_string(),
            };
            framed
                .send(Frame::v2(
                    v2::tags::HANDSHAKE_RESP,
                    serde_json::to_vec(&response)?,
                ))
                .await?;
        }
        ProfileKind::V1 => {
            // no handshake in v1; the first frame is already an event
            handle_payload(framed, &profile, dispatcher, &first_payload).await?;
        }
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            read = framed.next() => match read {
                None => return Ok(()),
                Some(Err(e)) => return Err(e),
                Some(Ok(payload)) => handle_payload(framed, &profile, dispatcher, &payload).await?,
            },
        }
    }
}

async fn handle_payload<C, S>(
    framed: &mut Framed<S, FrameCodec>,
    profile: &ActiveProfile,
    dispatcher: &EventDispatcher<C>,
    payload: &[u8],
) -> Result<(), ProtocolError>
where
    C: InspectionCapability,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    match profile.decode_event(payload)? {
        InboundEvent::Ping => {
            if let Some(pong) = profile.encode_pong() {
                framed.send(pong).await?;
            }
        }
        InboundEvent::Pong => {}
        InboundEvent::Unknown { tag } => {
            warn!("Unknown message tag {:#04x}, skipping", tag);
        }
        event => {
            if let Some(outbound) = dispatcher.dispatch(event).await {
                let frame = profile.encode_reply(&outbound.key, &outbound.payload)?;
                framed.send(frame).await?;
            }
        }
    }
    Ok(())
}
