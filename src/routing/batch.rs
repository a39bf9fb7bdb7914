//! Batch planning for pending transfers

use crate::types::Amount;

use ethers::types::{H256, U512};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use uuid::Uuid;

/// A pending transfer with its estimated execution cost
#[derive(Debug, Clone)]
pub struct TransferCandidate {
    pub hash: H256,
    pub symbol: String,
    pub route: String,
    pub amount: Amount,
    pub gas_cost: Amount,
    pub bridge_fee: Amount,
}

impl TransferCandidate {
    fn cost(&self) -> Amount {
        self.gas_cost.saturating_add(self.bridge_fee)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub id: Uuid,
    pub symbol: String,
    pub route: String,
    pub transactions: Vec<H256>,
}

/// Group by (token, route), order each group by `amount / (gas + fee)`
/// descending and split into chunks of at most `batch_size`.
///
/// Groups appear in the order their first member was seen; members with
/// equal priority keep their input order.
pub fn plan_batches(candidates: Vec<TransferCandidate>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<TransferCandidate>> = HashMap::new();

    for candidate in candidates {
        let key = (candidate.symbol.clone(), candidate.route.clone());
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(candidate);
    }

    let mut batches = Vec::new();
    for key in order {
        let Some(mut group) = groups.remove(&key) else {
            continue;
        };
        group.sort_by(|a, b| compare_priority(b, a));

        for chunk in group.chunks(batch_size) {
            batches.push(Batch {
                id: Uuid::new_v4(),
                symbol: key.0.clone(),
                route: key.1.clone(),
                transactions: chunk.iter().map(|c| c.hash).collect(),
            });
        }
    }
    batches
}

/// Compare `a.amount / a.cost` with `b.amount / b.cost` exactly.
/// A zero cost ranks above any non-zero cost.
fn compare_priority(a: &TransferCandidate, b: &TransferCandidate) -> Ordering {
    match (a.cost().is_zero(), b.cost().is_zero()) {
        (true, true) => a.amount.cmp(&b.amount),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let lhs: U512 = a.amount.full_mul(b.cost());
            let rhs: U512 = b.amount.full_mul(a.cost());
            lhs.cmp(&rhs)
        }
    }
}
