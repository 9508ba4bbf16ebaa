// Observer transport port.
// An accepted connection arrives already split: the hub's event loop owns
// the sink, the per-connection read loop owns the stream. Nothing else
// ever touches either half.

use async_trait::async_trait;

#[async_trait]
pub trait ConnectionSink: Send {
    async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()>;
    async fn close(&mut self);
}

#[async_trait]
pub trait ConnectionStream: Send {
    /// Blocks until the peer sends a frame or the connection dies.
    /// Any error, including a clean close, means the connection is gone.
    async fn receive(&mut self) -> anyhow::Result<Vec<u8>>;
}
