//! Transactional retry-or-dead-letter resubmission of a consumed message.
//!
//! Expressed as begin → (ack) → (republish or DLQ) → commit, with any
//! failure aborting the transaction before the error is returned.

use stomp_protocol::Frame;

use crate::connection::Connection;
use crate::error::ConnectionError;

/// Options governing one [`unreceive`] call.
#[derive(Debug, Clone)]
pub struct UnreceiveOptions {
    pub dead_letter_queue: String,
    pub max_redeliveries: u32,
    /// Force an ACK of the original message even if its `ack` header is
    /// absent (i.e. the subscription used auto-ack).
    pub force_client_ack: bool,
}

impl Default for UnreceiveOptions {
    fn default() -> Self {
        UnreceiveOptions {
            dead_letter_queue: "/queue/DLQ".to_owned(),
            max_redeliveries: 6,
            force_client_ack: false,
        }
    }
}

/// Retry or dead-letter a consumed `MESSAGE` frame.
///
/// Increments `retry_count`, opens a transaction named
/// `transaction-<message-id>-<old-retry-count>`, optionally ACKs the
/// original message within it, republishes to the original destination (if
/// under the redelivery limit) or to the dead-letter queue (if not), and
/// commits. On any step's failure the transaction is aborted and the error
/// re-raised.
pub async fn unreceive(
    conn: &Connection,
    message: &Frame,
    options: &UnreceiveOptions,
) -> Result<(), ConnectionError> {
    let message_id = message
        .header("message-id")
        .ok_or(ConnectionError::MessageIdRequired)?
        .to_owned();
    let destination = message.header("destination").unwrap_or_default().to_owned();
    let old_retry_count: u32 = message
        .header("retry_count")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let new_retry_count = old_retry_count + 1;
    let transaction = format!("transaction-{message_id}-{old_retry_count}");

    conn.begin(&transaction).await?;
    match redeliver(conn, message, options, &transaction, &message_id, &destination, new_retry_count).await {
        Ok(()) => conn.commit(&transaction).await,
        Err(e) => {
            let _ = conn.abort(&transaction).await;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn redeliver(
    conn: &Connection,
    message: &Frame,
    options: &UnreceiveOptions,
    transaction: &str,
    message_id: &str,
    destination: &str,
    new_retry_count: u32,
) -> Result<(), ConnectionError> {
    let should_ack = options.force_client_ack || message.header("ack").is_some();
    if should_ack {
        let ack_id = message.header("ack").unwrap_or(message_id);
        conn.ack(ack_id, &[("transaction".to_owned(), transaction.to_owned())])
            .await?;
    }

    if new_retry_count <= options.max_redeliveries {
        conn.send_message(
            destination,
            message.body.clone(),
            &[
                ("retry_count".to_owned(), new_retry_count.to_string()),
                ("transaction".to_owned(), transaction.to_owned()),
            ],
            false,
        )
        .await
    } else {
        conn.send_message(
            &options.dead_letter_queue,
            message.body.clone(),
            &[
                ("original_destination".to_owned(), destination.to_owned()),
                ("persistent".to_owned(), "true".to_owned()),
                ("transaction".to_owned(), transaction.to_owned()),
            ],
            false,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_name_uses_old_retry_count() {
        let message_id = "m-9";
        let old_retry_count = 6u32;
        let transaction = format!("transaction-{message_id}-{old_retry_count}");
        assert_eq!(transaction, "transaction-m-9-6");
    }

    #[test]
    fn default_options_match_scenario_6() {
        let options = UnreceiveOptions::default();
        assert_eq!(options.dead_letter_queue, "/queue/DLQ");
        assert_eq!(options.max_redeliveries, 6);
        assert!(!options.force_client_ack);
    }
}
