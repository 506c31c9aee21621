//! The L1 user-tx queue machinery.
//!
//! The contract keeps an append-only sequence of bounded queues. New user
//! txs land in the queue `open_to_forge` points at; each L1 batch consumes
//! the queue at `next_to_forge` and advances it. A queue that reaches
//! `max_l1_user_txs` entries stops accepting txs and a fresh one opens.

use serde::{Deserialize, Serialize};

use crate::tx::L1Tx;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Queue {
    txs: Vec<L1Tx>,
    forged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L1UserTxQueues {
    queues: Vec<Queue>,
    next_to_forge: u64,
    open_to_forge: u64,
    max_l1_user_txs: usize,
}

impl L1UserTxQueues {
    pub fn new(max_l1_user_txs: usize) -> Self {
        L1UserTxQueues {
            queues: vec![Queue::default()],
            next_to_forge: 0,
            open_to_forge: 0,
            max_l1_user_txs,
        }
    }

    /// Queue number new user txs currently land in.
    pub fn open_to_forge(&self) -> u64 {
        self.open_to_forge
    }

    /// Queue number the next L1 batch will consume.
    pub fn next_to_forge(&self) -> u64 {
        self.next_to_forge
    }

    /// Appends a user tx, assigning its queue number and position; opens a
    /// new queue on overflow.
    pub fn add(&mut self, mut tx: L1Tx) -> &L1Tx {
        let queue_num = self.open_to_forge;
        let open = &mut self.queues[queue_num as usize];
        tx.to_forge_l1_txs_num = Some(queue_num);
        tx.position = open.txs.len();
        tx.user_origin = true;
        open.txs.push(tx);
        if self.queues[queue_num as usize].txs.len() == self.max_l1_user_txs {
            self.queues.push(Queue::default());
            self.open_to_forge += 1;
        }
        self.queues[queue_num as usize].txs.last().unwrap()
    }

    /// Consumes the `next_to_forge` queue for an L1 batch and returns its
    /// txs; the open queue freezes when the consumed queue catches up with
    /// it.
    pub fn forge(&mut self) -> Vec<L1Tx> {
        let consumed = self.next_to_forge as usize;
        self.queues[consumed].forged = true;
        let txs = self.queues[consumed].txs.clone();
        self.next_to_forge += 1;
        if self.next_to_forge > self.open_to_forge {
            self.queues.push(Queue::default());
            self.open_to_forge = self.next_to_forge;
        }
        txs
    }

    /// Unforged txs of the given queue, if it exists.
    pub fn queue(&self, to_forge_num: u64) -> Option<&[L1Tx]> {
        self.queues.get(to_forge_num as usize).map(|q| q.txs.as_slice())
    }
}
