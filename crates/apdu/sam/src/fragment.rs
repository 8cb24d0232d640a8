//! Splitting of operation input into frame-sized chunks

use bytes::Bytes;

/// One chunk of an operation's input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Chunk payload
    pub data: Bytes,
    /// Whether this is the terminal chunk
    pub last: bool,
}

/// Split `data` into chunks of at most `ceiling` bytes
///
/// Every chunk but the last is exactly `ceiling` bytes long. Empty input
/// yields a single empty terminal chunk, so the result is never empty.
pub fn fragment(data: &[u8], ceiling: usize) -> Vec<Fragment> {
    let ceiling = ceiling.max(1);
    let data = Bytes::copy_from_slice(data);
    let count = data.len().div_ceil(ceiling).max(1);

    (0..count)
        .map(|i| {
            let start = i * ceiling;
            let end = (start + ceiling).min(data.len());
            Fragment {
                data: data.slice(start..end),
                last: i + 1 == count,
            }
        })
        .collect()
}
