//! End-to-end exchanges over the threaded transport.

mod util;

use std::sync::Arc;

use distmap::comm::{CommTag, Communicator, ThreadComm};
use distmap::exchange::Exchanger;
use distmap::idxlist::IndexList;
use distmap::map::{Map, MapConfig};
use util::*;

fn build_map(comm: &Arc<ThreadComm>, src: &[i64], dst: &[i64], base: u16) -> Arc<Map<ThreadComm>> {
    let config = MapConfig {
        base_tag: CommTag::new(base),
        ..MapConfig::default()
    };
    Arc::new(
        Map::new_with(
            &IndexList::new(src),
            &IndexList::new(dst),
            -1,
            Arc::clone(comm),
            &config,
        )
        .unwrap(),
    )
}

#[test]
fn row_to_block_moves_values() {
    let results = spawn_ranks(4, |comm| {
        let rank = comm.rank();
        let comm = Arc::new(comm);
        let src = row_to_block_src(rank);
        let dst = row_to_block_dst(rank);
        let map = build_map(&comm, &src, &dst, 0x3000);
        let mut ex = Exchanger::<i64, _>::new(map)
            .unwrap()
            .with_tag(CommTag::new(0x30f0));

        // each source slot carries its own global index as payload
        let payload = src.clone();
        let mut out = vec![-1i64; dst.len()];
        ex.go(&payload, &mut out).unwrap();
        out
    });

    assert!(results[0].is_empty());
    assert!(results[1].is_empty());
    // destination slot j must end up holding exactly the index it asked for
    assert_eq!(results[2], (0..=8).collect::<Vec<i64>>());
    assert_eq!(results[3], (9..=15).collect::<Vec<i64>>());
}

#[test]
fn round_trip_restores_payload() {
    let results = spawn_ranks(4, |comm| {
        let rank = comm.rank();
        let comm = Arc::new(comm);
        let a = row_to_block_src(rank);
        let b = row_to_block_dst(rank);
        let m_ab = build_map(&comm, &a, &b, 0x3100);
        let m_ba = build_map(&comm, &b, &a, 0x3200);
        let mut forward = Exchanger::<f64, _>::new(m_ab)
            .unwrap()
            .with_tag(CommTag::new(0x32f0));
        let mut backward = Exchanger::<f64, _>::new(m_ba)
            .unwrap()
            .with_tag(CommTag::new(0x32f1));

        let x: Vec<f64> = (0..a.len()).map(|i| (1000 + i + rank) as f64).collect();
        let mut y = vec![0.0f64; b.len()];
        forward.go(&x, &mut y).unwrap();
        let mut z = vec![0.0f64; a.len()];
        backward.go(&y, &mut z).unwrap();
        (x, z)
    });

    for (rank, (x, z)) in results.iter().enumerate() {
        assert_eq!(x, z, "rank {rank} round trip");
    }
}

#[test]
fn in_place_matches_out_of_place() {
    // every rank owns a row and wants a column of the 4x4 domain
    let results = spawn_ranks(4, |comm| {
        let rank = comm.rank();
        let comm = Arc::new(comm);
        let src: Vec<i64> = (0..4).map(|j| (rank * 4 + j) as i64).collect();
        let dst: Vec<i64> = (0..4).map(|i| (i * 4 + rank) as i64).collect();
        let map = build_map(&comm, &src, &dst, 0x3300);

        let payload: Vec<u32> = (0..4).map(|j| (rank * 4 + j) as u32).collect();

        let mut ex_a = Exchanger::<u32, _>::new(Arc::clone(&map))
            .unwrap()
            .with_tag(CommTag::new(0x33f0));
        let mut separate = vec![0u32; 4];
        ex_a.go(&payload, &mut separate).unwrap();

        let mut ex_b = Exchanger::<u32, _>::new(map)
            .unwrap()
            .with_tag(CommTag::new(0x33f1));
        let mut aliased = payload.clone();
        ex_b.go_in_place(&mut aliased).unwrap();

        (separate, aliased)
    });

    for (rank, (separate, aliased)) in results.iter().enumerate() {
        assert_eq!(separate, aliased, "rank {rank} aliasing");
        // the transpose delivers column `rank`: values i*4 + rank
        let want: Vec<u32> = (0..4).map(|i| (i * 4 + rank) as u32).collect();
        assert_eq!(separate, &want, "rank {rank} transpose");
    }
}

#[test]
fn exchanger_is_reusable() {
    let results = spawn_ranks(2, |comm| {
        let rank = comm.rank();
        let comm = Arc::new(comm);
        // swap two cells between the ranks
        let src = vec![rank as i64];
        let dst = vec![1 - rank as i64];
        let map = build_map(&comm, &src, &dst, 0x3400);
        let mut ex = Exchanger::<u64, _>::new(map)
            .unwrap()
            .with_tag(CommTag::new(0x34f0));

        let mut out = [0u64; 1];
        let mut seen = Vec::new();
        for round in 0..3u64 {
            ex.go(&[rank as u64 * 10 + round], &mut out).unwrap();
            seen.push(out[0]);
        }
        seen
    });

    assert_eq!(results[0], vec![10, 11, 12]);
    assert_eq!(results[1], vec![0, 1, 2]);
}

#[test]
fn empty_role_ranks_exchange_nothing() {
    let results = spawn_ranks(4, |comm| {
        let rank = comm.rank();
        let comm = Arc::new(comm);
        let src = interleaved_src(rank);
        let dst = interleaved_dst(rank);
        let map = build_map(&comm, &src, &dst, 0x3500);
        let mut ex = Exchanger::<i16, _>::new(map)
            .unwrap()
            .with_tag(CommTag::new(0x35f0));
        let payload: Vec<i16> = src.iter().map(|&g| g as i16).collect();
        let mut out = vec![0i16; dst.len()];
        ex.go(&payload, &mut out).unwrap();
        out
    });

    assert!(results[0].is_empty());
    assert!(results[1].is_empty());
    assert_eq!(results[2], (0..8).collect::<Vec<i16>>());
    assert_eq!(results[3], (8..16).collect::<Vec<i16>>());
}
