use crate::Bitmap;
use test_log::test;

fn lcg_rand_step(state: &mut u32) {
    *state = (*state as u64 * 279470273u64 % 0xfffffffb) as u32;
}

#[test]
fn test_rank() {
    let mut bm = Bitmap::with_len(256, false);
    for i in 0..=255 {
        bm.set(i, true);
        assert_eq!(bm.rank(i), i + 1);
    }
    assert_eq!(bm.rank(255), 256);
    for i in 0..=127 {
        assert_eq!(bm.rank(255), 256 - i);
        bm.set(i * 2, false);
    }
}

#[test]
fn test_push_and_count_range() {
    let mut bm = Bitmap::new();
    for i in 0..300 {
        bm.push(i % 3 != 0);
    }
    assert_eq!(bm.len(), 300);
    assert_eq!(bm.count(), 200);
    assert_eq!(bm.count_range(0..3), 2);
    assert_eq!(bm.count_range(60..130), (60..130).filter(|i| i % 3 != 0).count());
    assert_eq!(bm.count_range(299..1000), 1);
    assert_eq!(bm.count_range(5..5), 0);
    assert!(!bm.get(300));
}

#[test]
fn test_select_inverts_rank() {
    let mut bm = Bitmap::new();
    let mut state = 1234;
    for _ in 0..500 {
        lcg_rand_step(&mut state);
        bm.push(state & 1 == 1);
    }
    for k in 0..bm.count() {
        let pos = bm.select(k).unwrap();
        assert!(bm.get(pos));
        assert_eq!(bm.rank(pos), k + 1);
    }
    assert_eq!(bm.select(bm.count()), None);
}

#[test]
fn test_bytes_roundtrip() {
    let mut bm = Bitmap::new();
    let mut state = 99;
    for _ in 0..77 {
        lcg_rand_step(&mut state);
        bm.push(state % 5 != 0);
    }
    let bytes = bm.to_bytes();
    assert_eq!(bytes.len(), 10);
    assert_eq!(Bitmap::from_bytes(&bytes, 77), Some(bm));
    assert_eq!(Bitmap::from_bytes(&bytes[..3], 77), None);
}

#[test]
fn test_set_ops() {
    let mut a = Bitmap::with_len(10, true);
    let mut b = Bitmap::with_len(10, false);
    b.set(3, true);
    b.set(12, true);
    a.subtract(&b);
    assert_eq!(a.count(), 9);
    assert!(!a.get(3));
    a.union(&b);
    assert_eq!(a.len(), 13);
    assert_eq!(a.count(), 11);
    a.intersect(&b);
    assert_eq!(a.iter_ones().collect::<Vec<_>>(), vec![3, 12]);
}
