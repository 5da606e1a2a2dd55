//! Merging of chronological and semantic retrieval results.

use std::collections::HashSet;

use recall_types::chat::ChatMessage;
use uuid::Uuid;

/// Union of `recent` and `semantic`, de-duplicated by message id.
///
/// Recent messages come first, oldest to newest; semantic matches follow in
/// their similarity order, skipping anything already included.
pub fn merge_hybrid(recent: Vec<ChatMessage>, semantic: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut seen: HashSet<Uuid> = HashSet::with_capacity(recent.len() + semantic.len());
    let mut merged = Vec::with_capacity(recent.len() + semantic.len());

    for message in recent.into_iter().chain(semantic) {
        if seen.insert(message.id) {
            merged.push(message);
        }
    }

    merged
}
