//! Shared helpers for the multi-rank test suites.

use std::sync::Arc;

use distmap::comm::ThreadComm;

/// Run `f` once per rank, each on its own thread over a size-`n` thread
/// group, and return the per-rank results in rank order.
#[allow(dead_code)]
pub fn spawn_ranks<R, F>(n: usize, f: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(ThreadComm) -> R + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = (0..n)
        .map(|rank| {
            let f = Arc::clone(&f);
            std::thread::spawn(move || f(ThreadComm::new(rank, n)))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

/// Row decomposition of the 4x4 domain used by the end-to-end scenarios:
/// ranks 0,1 own the left/right column pairs, ranks 2,3 own nothing.
#[allow(dead_code)]
pub fn row_to_block_src(rank: usize) -> Vec<i64> {
    match rank {
        0 => vec![0, 1, 4, 5, 8, 9, 12, 13],
        1 => vec![2, 3, 6, 7, 10, 11, 14, 15],
        _ => Vec::new(),
    }
}

/// Destination side of the row-to-block scenario: rank 2 wants the first
/// nine cells, rank 3 the last seven.
#[allow(dead_code)]
pub fn row_to_block_dst(rank: usize) -> Vec<i64> {
    match rank {
        2 => (0..=8).collect(),
        3 => (9..=15).collect(),
        _ => Vec::new(),
    }
}

/// Interleaved sources: rank 0 owns the even cells, rank 1 the odd ones.
#[allow(dead_code)]
pub fn interleaved_src(rank: usize) -> Vec<i64> {
    match rank {
        0 | 1 => (0..16).filter(|i| (i % 2) as usize == rank).collect(),
        _ => Vec::new(),
    }
}

/// Destination side of the interleaved scenario: ranks 2,3 want the
/// top/bottom half rows.
#[allow(dead_code)]
pub fn interleaved_dst(rank: usize) -> Vec<i64> {
    match rank {
        2 => (0..8).collect(),
        3 => (8..16).collect(),
        _ => Vec::new(),
    }
}
