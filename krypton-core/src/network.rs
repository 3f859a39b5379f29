use serde::{Deserialize, Serialize};
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Read, Write};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::mempool::ReturnCode;
use crate::primitives::{Address, Hash};
use crate::subscription::Subscription;
use crate::transactions::Transaction;
use crate::MAX_MESSAGE_SIZE;

/// Requests and answers exchanged with a node. Frames are an 8-byte
/// big-endian length followed by the JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum Message {
    SubmitTransaction(Transaction),
    TransactionResult { hash: Hash, code: ReturnCode },
    FetchTransaction(Hash),
    Transaction(Option<Transaction>),
    /// Highest priority pool transactions fitting into `max_size` bytes.
    FetchMempool { max_size: usize },
    FetchPendingTransactions(Address),
    FetchTransactionsByAddresses { addresses: Vec<Address>, max: usize },
    Transactions(Vec<Transaction>),
    FetchHead,
    Head { height: u32, hash: Hash },
    /// Replaces the subscription the connection is served with.
    Subscribe(Subscription),
    Subscribed,
    Error(String),
    Ping,
    Pong,
}

fn invalid_data(message: String) -> IoError {
    IoError::new(IoErrorKind::InvalidData, message)
}

fn checked_frame_len(len_bytes: [u8; 8]) -> Result<usize, IoError> {
    let len = u64::from_be_bytes(len_bytes);
    match usize::try_from(len) {
        Ok(len) if len <= MAX_MESSAGE_SIZE => Ok(len),
        _ => Err(invalid_data(format!(
            "Received message too large: {} bytes, max is {} bytes",
            len, MAX_MESSAGE_SIZE
        ))),
    }
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, IoError> {
        serde_json::to_vec(self).map_err(|e| invalid_data(format!("Failed to encode message: {}", e)))
    }

    pub fn decode(data: &[u8]) -> Result<Self, IoError> {
        serde_json::from_slice(data)
            .map_err(|e| invalid_data(format!("Failed to decode message: {}", e)))
    }

    fn frame(&self) -> Result<Vec<u8>, IoError> {
        let body = self.encode()?;
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(invalid_data(format!(
                "Message too large to send: {} bytes",
                body.len()
            )));
        }
        let mut frame = Vec::with_capacity(8 + body.len());
        frame.extend_from_slice(&(body.len() as u64).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    pub fn send(&self, stream: &mut impl Write) -> Result<(), IoError> {
        stream.write_all(&self.frame()?)
    }

    pub fn receive(stream: &mut impl Read) -> Result<Self, IoError> {
        let mut len_bytes = [0u8; 8];
        stream.read_exact(&mut len_bytes)?;
        let mut data = vec![0u8; checked_frame_len(len_bytes)?];
        stream.read_exact(&mut data)?;
        Self::decode(&data)
    }

    pub async fn send_async(&self, stream: &mut (impl AsyncWrite + Unpin)) -> Result<(), IoError> {
        stream.write_all(&self.frame()?).await?;
        stream.flush().await
    }

    pub async fn receive_async(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self, IoError> {
        let mut len_bytes = [0u8; 8];
        stream.read_exact(&mut len_bytes).await?;
        let mut data = vec![0u8; checked_frame_len(len_bytes)?];
        stream.read_exact(&mut data).await?;
        Self::decode(&data)
    }
}
