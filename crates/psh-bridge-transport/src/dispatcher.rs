//! Request dispatch for one client connection.

use std::sync::Arc;

use psh_bridge_core::{
    BridgeConfig, BridgeError, Channel, ChannelError, ChannelFlags, ChannelId, CommandInvoker,
    Scheduler, Status,
};
use psh_bridge_session::InteractiveShell;
use tokio::sync::mpsc;

use crate::{
    channel::ChannelPool,
    protocol::{ClientMessage, ServerMessage},
};

/// Collaborators shared by every connection.
#[derive(Clone)]
pub struct BridgeState {
    /// Runs commands for shells and one-shot execution.
    pub invoker: Arc<dyn CommandInvoker>,
    /// Drives interactive output delivery.
    pub scheduler: Arc<dyn Scheduler>,
    /// Prompt marker appended after each shell result.
    pub prompt: String,
    /// Type tag given to shell channels.
    pub channel_type: String,
}

impl BridgeState {
    /// Build state from the shared configuration.
    #[must_use]
    pub fn new(
        invoker: Arc<dyn CommandInvoker>,
        scheduler: Arc<dyn Scheduler>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            invoker,
            scheduler,
            prompt: config.prompt.clone(),
            channel_type: config.channel_type.clone(),
        }
    }
}

/// Maps client requests onto the host, shells and channel pool.
///
/// All handlers are synchronous and may block on the invocation lock; the
/// transport calls [`Dispatcher::handle`] from the blocking pool.
pub struct Dispatcher {
    state: BridgeState,
    pool: ChannelPool,
}

impl Dispatcher {
    /// Create a dispatcher whose channel output goes to `outbound`.
    #[must_use]
    pub fn new(state: BridgeState, outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            state,
            pool: ChannelPool::new(outbound),
        }
    }

    /// Channels opened on this connection.
    #[must_use]
    pub const fn pool(&self) -> &ChannelPool {
        &self.pool
    }

    /// Handle one client message and produce its reply.
    pub fn handle(&self, msg: ClientMessage) -> ServerMessage {
        match msg {
            ClientMessage::Ping => ServerMessage::Pong,
            ClientMessage::ShellStart { request_id } => {
                respond(request_id, self.shell_start(), |id| ServerMessage::Response {
                    request_id,
                    status: Status::SUCCESS,
                    result: None,
                    channel_id: Some(id),
                    error: None,
                })
            }
            ClientMessage::Execute { request_id, code } => {
                respond(request_id, self.execute(code.as_deref()), |result| {
                    ServerMessage::Response {
                        request_id,
                        status: Status::SUCCESS,
                        result: Some(result),
                        channel_id: None,
                        error: None,
                    }
                })
            }
            ClientMessage::ChannelWrite {
                request_id,
                channel_id,
                ref data,
            } => {
                let outcome = msg
                    .decode_data()
                    .ok_or_else(|| {
                        BridgeError::from(ChannelError::InvalidData(format!(
                            "{} bytes of invalid base64",
                            data.len()
                        )))
                    })
                    .and_then(|bytes| self.pool.write(channel_id, &bytes));
                respond(request_id, outcome, |_| ServerMessage::ok(request_id))
            }
            ClientMessage::ChannelInteract {
                request_id,
                channel_id,
                interact,
            } => respond(request_id, self.pool.interact(channel_id, interact), |()| {
                ServerMessage::ok(request_id)
            }),
            ClientMessage::ChannelClose {
                request_id,
                channel_id,
            } => respond(request_id, self.pool.close(channel_id), |()| {
                ServerMessage::ok(request_id)
            }),
        }
    }

    fn shell_start(&self) -> Result<ChannelId, BridgeError> {
        let shell = InteractiveShell::new(
            Arc::clone(&self.state.invoker),
            Arc::clone(&self.state.scheduler),
            self.state.prompt.clone(),
        );
        let channel = self
            .pool
            .create(ChannelFlags::SYNCHRONOUS, Arc::new(shell))?;
        channel.set_type(&self.state.channel_type);
        tracing::debug!("Started shell on channel {}", channel.id());
        Ok(channel.id())
    }

    fn execute(&self, code: Option<&str>) -> Result<String, BridgeError> {
        let code = code.ok_or(ChannelError::MissingParameter("code"))?;
        tracing::debug!("Executing one-shot command");
        Ok(self.state.invoker.invoke(code)?)
    }

    /// Close every channel opened on this connection.
    pub fn disconnect(&self) {
        tracing::debug!("Connection closed with {} open channels", self.pool.len());
        self.pool.close_all();
    }
}

fn respond<T>(
    request_id: u64,
    outcome: Result<T, BridgeError>,
    success: impl FnOnce(T) -> ServerMessage,
) -> ServerMessage {
    match outcome {
        Ok(value) => success(value),
        Err(e) => {
            tracing::warn!("Request {request_id} failed: {e}");
            ServerMessage::failure(request_id, &e)
        }
    }
}
