use crate::models::{Citation, Match};

/// An order-preserving slice of the retrieved matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Batch<'a> {
    /// Position of this batch in the partition, starting at 0.
    pub index: usize,
    /// Offset of the first match of this batch in the full match list.
    pub offset: usize,
    pub matches: &'a [Match],
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// One citation per match that carries metadata, whether or not it has text.
    pub fn citations(&self) -> Vec<Citation> {
        self.matches
            .iter()
            .filter_map(|m| m.metadata.as_ref())
            .map(Citation::from_metadata)
            .collect()
    }
}

/// Splits `matches` into consecutive batches of `batch_size` (the last may be shorter).
///
/// The result covers every match exactly once, in order. A `batch_size` of 0 is
/// treated as 1; configuration loading rejects it before it gets here.
pub fn partition(matches: &[Match], batch_size: usize) -> Vec<Batch<'_>> {
    let batch_size = batch_size.max(1);
    matches
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            offset: index * batch_size,
            matches: chunk,
        })
        .collect()
}

/// Returns the prefix of `text` holding at most `max_chars` characters.
///
/// Counts Unicode scalar values, so the cut never lands inside a code point.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
