//! Subscription channels for committed chain events.

use crate::AppExecResult;
use neonova_contract::NotificationEvent;
use neonova_core::{Block, Transaction};
use parking_lot::Mutex;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

/// Bound of each subscriber channel. A slow subscriber back-pressures the
/// applicator rather than losing events.
const CHANNEL_BOUND: usize = 64;

/// Fan-out registry for the four event kinds, delivered in commit order.
#[derive(Default)]
pub struct Subscriptions {
    blocks: Mutex<Vec<SyncSender<Block>>>,
    transactions: Mutex<Vec<SyncSender<Transaction>>>,
    notifications: Mutex<Vec<SyncSender<NotificationEvent>>>,
    executions: Mutex<Vec<SyncSender<AppExecResult>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_blocks(&self) -> Receiver<Block> {
        let (sender, receiver) = sync_channel(CHANNEL_BOUND);
        self.blocks.lock().push(sender);
        receiver
    }

    pub fn subscribe_transactions(&self) -> Receiver<Transaction> {
        let (sender, receiver) = sync_channel(CHANNEL_BOUND);
        self.transactions.lock().push(sender);
        receiver
    }

    pub fn subscribe_notifications(&self) -> Receiver<NotificationEvent> {
        let (sender, receiver) = sync_channel(CHANNEL_BOUND);
        self.notifications.lock().push(sender);
        receiver
    }

    pub fn subscribe_executions(&self) -> Receiver<AppExecResult> {
        let (sender, receiver) = sync_channel(CHANNEL_BOUND);
        self.executions.lock().push(sender);
        receiver
    }

    /// Blocking send to every subscriber; subscribers that hung up are
    /// dropped from the list.
    fn fan_out<T: Clone>(senders: &Mutex<Vec<SyncSender<T>>>, event: &T) {
        senders.lock().retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn publish_block(&self, block: &Block) {
        Self::fan_out(&self.blocks, block);
    }

    pub fn publish_transaction(&self, tx: &Transaction) {
        Self::fan_out(&self.transactions, tx);
    }

    pub fn publish_notification(&self, event: &NotificationEvent) {
        Self::fan_out(&self.notifications, event);
    }

    pub fn publish_execution(&self, result: &AppExecResult) {
        Self::fan_out(&self.executions, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neonova_core::{Header, UInt160, UInt256, Witness};

    fn block(index: u32) -> Block {
        Block {
            header: Header {
                version: 0,
                prev_hash: UInt256::zero(),
                merkle_root: UInt256::zero(),
                timestamp: 0,
                nonce: 0,
                index,
                primary_index: 0,
                next_consensus: UInt160::zero(),
                witness: Witness::default(),
                prev_state_root: None,
            },
            transactions: vec![],
        }
    }

    #[test]
    fn delivers_in_order() {
        let subs = Subscriptions::new();
        let receiver = subs.subscribe_blocks();
        subs.publish_block(&block(1));
        subs.publish_block(&block(2));
        assert_eq!(receiver.recv().unwrap().index(), 1);
        assert_eq!(receiver.recv().unwrap().index(), 2);
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let subs = Subscriptions::new();
        drop(subs.subscribe_blocks());
        subs.publish_block(&block(1));
        assert!(subs.blocks.lock().is_empty());
    }
}
