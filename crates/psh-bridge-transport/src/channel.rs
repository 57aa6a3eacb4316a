//! Per-connection channel pool.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use psh_bridge_core::{BridgeError, Channel, ChannelError, ChannelFlags, ChannelId, ChannelOps};
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// A channel owned by a [`ChannelPool`].
pub struct PoolChannel {
    id: ChannelId,
    flags: ChannelFlags,
    tag: Mutex<Option<String>>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    ops: Arc<dyn ChannelOps>,
}

impl fmt::Debug for PoolChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolChannel")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("tag", &self.channel_type())
            .finish_non_exhaustive()
    }
}

impl PoolChannel {
    /// Creation flags.
    #[must_use]
    pub const fn flags(&self) -> ChannelFlags {
        self.flags
    }
}

impl Channel for PoolChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn write(&self, data: &[u8]) -> Result<(), ChannelError> {
        self.outbound
            .send(ServerMessage::channel_data(self.id, data))
            .map_err(|_| ChannelError::Disconnected)
    }

    fn set_type(&self, tag: &str) {
        *self.tag.lock().unwrap_or_else(PoisonError::into_inner) = Some(tag.to_string());
    }

    fn channel_type(&self) -> Option<String> {
        self.tag
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Channels opened on one connection.
///
/// Routes client writes, interact toggles and closes to each channel's ops.
/// Output written by the ops goes out on the connection's outbound queue.
pub struct ChannelPool {
    next_id: AtomicU32,
    channels: Mutex<HashMap<ChannelId, Arc<PoolChannel>>>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl ChannelPool {
    /// Create an empty pool writing to `outbound`.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            next_id: AtomicU32::new(1),
            channels: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelId, Arc<PoolChannel>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a channel served by `ops`.
    ///
    /// # Errors
    /// Returns error if the id space is exhausted.
    pub fn create(
        &self,
        flags: ChannelFlags,
        ops: Arc<dyn ChannelOps>,
    ) -> Result<Arc<PoolChannel>, ChannelError> {
        let id = self
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| id.checked_add(1))
            .map_err(|_| ChannelError::AllocationFailed)?;

        let channel = Arc::new(PoolChannel {
            id,
            flags,
            tag: Mutex::new(None),
            outbound: self.outbound.clone(),
            ops,
        });
        self.lock().insert(id, Arc::clone(&channel));
        tracing::debug!("Opened channel {id}");
        Ok(channel)
    }

    /// Look up an open channel.
    ///
    /// # Errors
    /// Returns error if no channel has this id.
    pub fn get(&self, id: ChannelId) -> Result<Arc<PoolChannel>, ChannelError> {
        self.lock()
            .get(&id)
            .cloned()
            .ok_or(ChannelError::NotFound(id))
    }

    /// Number of open channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no channel is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forward client data to the channel's ops.
    ///
    /// # Errors
    /// Returns error if the channel is unknown or its ops reject the data.
    pub fn write(&self, id: ChannelId, data: &[u8]) -> Result<usize, BridgeError> {
        let channel = self.get(id)?;
        channel.ops.write(&*channel, data)
    }

    /// Start or pause interactive delivery.
    ///
    /// # Errors
    /// Returns error if the channel is unknown or its ops reject the change.
    pub fn interact(&self, id: ChannelId, start: bool) -> Result<(), BridgeError> {
        let channel = self.get(id)?;
        let ops = Arc::clone(&channel.ops);
        ops.interact(channel, start)
    }

    /// Close a channel and drop it from the pool.
    ///
    /// # Errors
    /// Returns error if the channel is unknown or its ops fail to close.
    pub fn close(&self, id: ChannelId) -> Result<(), BridgeError> {
        let channel = self
            .lock()
            .remove(&id)
            .ok_or(ChannelError::NotFound(id))?;
        tracing::debug!("Closing channel {id}");
        channel.ops.close(&*channel)
    }

    /// Close every channel; used when the connection goes away.
    pub fn close_all(&self) {
        let channels: Vec<_> = self.lock().drain().map(|(_, c)| c).collect();
        for channel in channels {
            if let Err(e) = channel.ops.close(&*channel) {
                tracing::warn!("Failed to close channel {}: {e}", channel.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio_test::assert_err;

    use super::*;

    #[derive(Default)]
    struct CountingOps {
        writes: AtomicUsize,
        closes: AtomicUsize,
    }

    impl ChannelOps for CountingOps {
        fn write(&self, channel: &dyn Channel, buffer: &[u8]) -> Result<usize, BridgeError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            channel.write(buffer)?;
            Ok(buffer.len())
        }

        fn interact(&self, _channel: Arc<dyn Channel>, start: bool) -> Result<(), BridgeError> {
            if start {
                Ok(())
            } else {
                Err(ChannelError::NotInteracting.into())
            }
        }

        fn close(&self, _channel: &dyn Channel) -> Result<(), BridgeError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pool() -> (ChannelPool, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelPool::new(tx), rx)
    }

    #[test]
    fn test_ids_start_at_one() {
        let (pool, _rx) = pool();
        let ops = Arc::new(CountingOps::default());
        let first = pool.create(ChannelFlags::SYNCHRONOUS, ops.clone()).unwrap();
        let second = pool.create(ChannelFlags::default(), ops).unwrap();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert!(first.flags().synchronous);
        assert!(!second.flags().synchronous);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_write_routes_to_ops_and_outbound() {
        let (pool, mut rx) = pool();
        let ops = Arc::new(CountingOps::default());
        let channel = pool.create(ChannelFlags::SYNCHRONOUS, ops.clone()).unwrap();

        assert_eq!(pool.write(channel.id(), b"abc").unwrap(), 3);
        assert_eq!(ops.writes.load(Ordering::SeqCst), 1);
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.decode_data().unwrap(), b"abc");
    }

    #[test]
    fn test_type_tag() {
        let (pool, _rx) = pool();
        let channel = pool
            .create(ChannelFlags::SYNCHRONOUS, Arc::new(CountingOps::default()))
            .unwrap();
        assert_eq!(channel.channel_type(), None);
        channel.set_type("psh");
        assert_eq!(channel.channel_type().as_deref(), Some("psh"));
    }

    #[test]
    fn test_unknown_channel() {
        let (pool, _rx) = pool();
        let err = assert_err!(pool.write(42, b"x"));
        assert!(matches!(err, BridgeError::Channel(ChannelError::NotFound(42))));
        assert!(pool.close(42).is_err());
    }

    #[test]
    fn test_close_removes_channel() {
        let (pool, _rx) = pool();
        let ops = Arc::new(CountingOps::default());
        let channel = pool.create(ChannelFlags::SYNCHRONOUS, ops.clone()).unwrap();
        pool.close(channel.id()).unwrap();
        assert!(pool.is_empty());
        assert_eq!(ops.closes.load(Ordering::SeqCst), 1);
        assert!(pool.interact(channel.id(), true).is_err());
    }

    #[test]
    fn test_close_all() {
        let (pool, _rx) = pool();
        let ops = Arc::new(CountingOps::default());
        for _ in 0..3 {
            pool.create(ChannelFlags::SYNCHRONOUS, ops.clone()).unwrap();
        }
        pool.close_all();
        assert!(pool.is_empty());
        assert_eq!(ops.closes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_write_after_receiver_dropped() {
        let (pool, rx) = pool();
        let channel = pool
            .create(ChannelFlags::SYNCHRONOUS, Arc::new(CountingOps::default()))
            .unwrap();
        drop(rx);
        let err = channel.write(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::Disconnected));
    }
}
