//! Typed request/response over tokio channels: every request carries a
//! one-shot reply slot, so a response always reaches the caller that asked.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("receiver is gone")]
    Closed,

    #[error("request was dropped without a response")]
    Dropped,

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// A request and the slot its response goes into
#[derive(Debug)]
pub struct Envelope<Req, Resp> {
    pub request: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> Envelope<Req, Resp> {
    /// Answer the request. A caller that stopped waiting is not an error.
    pub fn respond(self, response: Resp) {
        let _ = self.reply.send(response);
    }

    pub fn into_parts(self) -> (Req, Responder<Resp>) {
        (self.request, Responder { reply: self.reply })
    }
}

/// Reply slot split off an [`Envelope`]
#[derive(Debug)]
pub struct Responder<Resp> {
    reply: oneshot::Sender<Resp>,
}

impl<Resp> Responder<Resp> {
    pub fn respond(self, response: Resp) {
        let _ = self.reply.send(response);
    }
}

pub type Inbox<Req, Resp> = mpsc::Receiver<Envelope<Req, Resp>>;

/// Sending half of a request channel
#[derive(Debug)]
pub struct RpcClient<Req, Resp> {
    tx: mpsc::Sender<Envelope<Req, Resp>>,
}

impl<Req, Resp> Clone for RpcClient<Req, Resp> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<Req, Resp> RpcClient<Req, Resp> {
    pub fn channel(buffer: usize) -> (Self, Inbox<Req, Resp>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub async fn call(&self, request: Req) -> Result<Resp, RpcError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| RpcError::Closed)?;
        response.await.map_err(|_| RpcError::Dropped)
    }

    /// [`RpcClient::call`] bounded by `limit`, queueing time included
    pub async fn call_timeout(&self, request: Req, limit: Duration) -> Result<Resp, RpcError> {
        tokio::time::timeout(limit, self.call(request))
            .await
            .map_err(|_| RpcError::Timeout(limit))?
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_responses_reach_their_caller() {
        let (client, mut inbox) = RpcClient::<u32, u32>::channel(8);
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let n = envelope.request;
                envelope.respond(n * 10);
            }
        });

        let (a, b) = tokio::join!(client.call(1), client.call(2));
        assert_eq!(a, Ok(10));
        assert_eq!(b, Ok(20));
    }

    #[tokio::test]
    async fn test_dropped_closed_and_timeout() {
        let (client, mut inbox) = RpcClient::<(), ()>::channel(8);
        let server = tokio::spawn(async move {
            // drop the first request unanswered, hold on to the second
            let first = inbox.recv().await;
            drop(first);
            let _second = inbox.recv().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        assert_eq!(client.call(()).await, Err(RpcError::Dropped));
        assert_eq!(
            client.call_timeout((), Duration::from_millis(20)).await,
            Err(RpcError::Timeout(Duration::from_millis(20)))
        );
        server.await.unwrap();
        assert_eq!(client.call(()).await, Err(RpcError::Closed));
    }

    #[test]
    fn test_closed_inbox_fails_fast() {
        let (client, inbox) = RpcClient::<u8, u8>::channel(1);
        drop(inbox);
        assert!(client.is_closed());
        let result = tokio_test::block_on(client.call_timeout(7, Duration::from_secs(5)));
        tokio_test::assert_err!(result.clone());
        assert_eq!(result, Err(RpcError::Closed));
    }
}
