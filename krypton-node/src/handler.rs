use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

use krypton_core::accounts::AccountStore;
use krypton_core::blockchain::{Blockchain, Chain};
use krypton_core::mempool::Mempool;
use krypton_core::network::Message;
use krypton_core::subscription::Subscription;

/// Shared state every connection works against.
#[derive(Clone)]
pub struct Node {
    pub chain: Arc<Chain>,
    pub mempool: Mempool<Chain, AccountStore>,
}

/// Serves one peer until it disconnects. Mempool answers are filtered by
/// the connection's subscription, which starts out as `Any`.
pub async fn handle_connection<S>(mut socket: S, node: Node) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut subscription = Subscription::Any;
    loop {
        let message = match Message::receive_async(&mut socket).await {
            Ok(message) => message,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("Peer disconnected");
                return Ok(());
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Error receiving message")),
        };

        let reply = match message {
            Message::SubmitTransaction(transaction) => {
                let hash = transaction.hash();
                let code = node.mempool.push_transaction(transaction).await?;
                info!("Submitted transaction {}: {}", hash, code);
                Message::TransactionResult { hash, code }
            }
            Message::FetchTransaction(hash) => {
                Message::Transaction(node.mempool.get_transaction(&hash).await)
            }
            Message::FetchMempool { max_size } => Message::Transactions(
                node.mempool
                    .get_transactions(max_size)
                    .await
                    .into_iter()
                    .filter(|tx| subscription.matches_transaction(tx))
                    .collect(),
            ),
            Message::FetchPendingTransactions(address) => {
                Message::Transactions(node.mempool.get_pending_transactions(&address).await)
            }
            Message::FetchTransactionsByAddresses { addresses, max } => Message::Transactions(
                node.mempool
                    .get_transactions_by_addresses(&addresses, max)
                    .await,
            ),
            Message::FetchHead => {
                let head = node.chain.head().await;
                Message::Head {
                    height: head.height(),
                    hash: head.hash(),
                }
            }
            Message::Subscribe(requested) => {
                debug!("Connection subscribed with {}", requested);
                subscription = requested;
                Message::Subscribed
            }
            Message::Ping => Message::Pong,
            unexpected => {
                warn!("Received unexpected message {:?}", unexpected);
                Message::Error("unexpected message".to_string())
            }
        };

        reply
            .send_async(&mut socket)
            .await
            .context("Failed to send reply")?;
    }
}
