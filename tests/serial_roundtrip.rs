//! Serial (size-1 group) behavior and property-based round trips.

use std::sync::Arc;

use proptest::prelude::*;

use distmap::comm::NoComm;
use distmap::exchange::Exchanger;
use distmap::idxlist::IndexList;
use distmap::map::Map;

fn serial_map(src: &[i64], dst: &[i64]) -> Map<NoComm> {
    Map::new(
        &IndexList::new(src),
        &IndexList::new(dst),
        -1,
        Arc::new(NoComm),
    )
    .unwrap()
}

#[test]
fn identity_map_copies() {
    let idx: Vec<i64> = (0..10).collect();
    let map = Arc::new(serial_map(&idx, &idx));
    let mut ex = Exchanger::<u64, _>::new(map).unwrap();
    let src: Vec<u64> = (100..110).collect();
    let mut dst = vec![0u64; 10];
    ex.go(&src, &mut dst).unwrap();
    assert_eq!(dst, src);
}

#[test]
fn stride_hint_does_not_change_schedules() {
    let src = [3i64, 0, 2, 1];
    let dst = [1i64, 3];
    let plain = serial_map(&src, &dst);
    let hinted = Map::new(
        &IndexList::new(&src),
        &IndexList::new(&dst),
        4,
        Arc::new(NoComm),
    )
    .unwrap();
    assert_eq!(plain.send_schedule(), hinted.send_schedule());
    assert_eq!(plain.recv_schedule(), hinted.recv_schedule());
    assert_eq!(hinted.stride_hint(), 4);
}

proptest! {
    /// Exchanging through a serial map is exactly the slot lookup
    /// `out[j] = payload[position of dst[j] in src]`.
    #[test]
    fn exchange_matches_direct_lookup(
        src in Just((0..24i64).collect::<Vec<_>>()).prop_shuffle(),
        dst in Just((0..24i64).collect::<Vec<_>>()).prop_shuffle(),
        take in 0usize..=24,
    ) {
        let dst = &dst[..take];
        let map = Arc::new(serial_map(&src, dst));
        let mut ex = Exchanger::<i64, _>::new(map).unwrap();

        let payload: Vec<i64> = src.iter().map(|&g| 7000 + g).collect();
        let mut out = vec![0i64; dst.len()];
        ex.go(&payload, &mut out).unwrap();

        for (j, &g) in dst.iter().enumerate() {
            let pos = src.iter().position(|&s| s == g).unwrap();
            prop_assert_eq!(out[j], payload[pos]);
        }
    }

    /// Forward then backward exchange restores the original payload
    /// bit-exactly (both lists are permutations, so the round trip is
    /// the identity).
    #[test]
    fn round_trip_is_identity(
        a in Just((0..16i64).collect::<Vec<_>>()).prop_shuffle(),
        b in Just((0..16i64).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let forward = Arc::new(serial_map(&a, &b));
        let backward = Arc::new(serial_map(&b, &a));
        let mut ex_f = Exchanger::<f64, _>::new(forward).unwrap();
        let mut ex_b = Exchanger::<f64, _>::new(backward).unwrap();

        let x: Vec<f64> = a.iter().map(|&g| g as f64 + 0.5).collect();
        let mut y = vec![0.0f64; b.len()];
        ex_f.go(&x, &mut y).unwrap();
        let mut z = vec![0.0f64; a.len()];
        ex_b.go(&y, &mut z).unwrap();
        prop_assert_eq!(z, x);
    }
}
