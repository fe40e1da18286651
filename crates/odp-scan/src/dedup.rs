use std::cmp::Ordering;
use std::collections::HashMap;

use odp_core::Opportunity;

/// Collapse records sharing a dedup key, keeping first-occurrence order.
///
/// The higher-scored record survives (ties keep the earlier one) and takes
/// over any optional fields only the dropped duplicate had.
pub fn dedup(records: Vec<Opportunity>) -> Vec<Opportunity> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Opportunity> = Vec::with_capacity(records.len());
    for record in records {
        let key = record.dedup_key();
        match index.get(&key) {
            Some(&pos) => {
                let kept = &mut out[pos];
                if record.priority_score > kept.priority_score {
                    let mut winner = record;
                    winner.absorb_missing(kept);
                    *kept = winner;
                } else {
                    kept.absorb_missing(&record);
                }
            }
            None => {
                index.insert(key, out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Highest score first; equal scores by title so output is reproducible.
pub fn sort_by_priority(records: &mut [Opportunity]) {
    records.sort_by(|a, b| match b.priority_score.cmp(&a.priority_score) {
        Ordering::Equal => a.title.cmp(&b.title),
        other => other,
    });
}
