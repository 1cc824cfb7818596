//! Integration tests exercising the ring primitives through the public API.

use fixed_ring::{Error, RingBuffer, RingIndex};

#[test]
fn index_fill_overflow_drain_underflow_cycle() {
    for capacity in [1_usize, 2, 4, 8, 16, 64, 256] {
        let mut index = RingIndex::new(capacity).unwrap();

        // C puts succeed...
        for _ in 0..capacity {
            index.put().unwrap();
        }

        // ...the (C+1)-th fails with Full...
        assert_eq!(index.put(), Err(Error::Full));

        // ...C gets drain it...
        for _ in 0..capacity {
            index.get().unwrap();
        }

        // ...and the next get fails with Empty.
        assert_eq!(index.get(), Err(Error::Empty));
    }
}

#[test]
fn index_put_peek_get_return_the_same_slot() {
    let mut index = RingIndex::new(8).unwrap();

    for _ in 0..20 {
        let put_slot = index.put().unwrap();
        let peek_slot = index.peek().unwrap();
        let get_slot = index.get().unwrap();

        assert_eq!(put_slot, peek_slot);
        assert_eq!(peek_slot, get_slot);
    }
}

#[test]
fn index_reports_capacity_and_occupancy() {
    let mut index = RingIndex::new(16).unwrap();
    assert_eq!(index.capacity(), 16);

    for occupied in 1..=16 {
        index.put().unwrap();
        assert_eq!(index.available(), occupied);
    }

    assert!(index.is_full());
}

#[test]
fn buffer_interleaved_producer_consumer() {
    let mut storage = [0_u32; 8];
    let mut ring = RingBuffer::new(&mut storage).unwrap();

    let mut produced = 0_u32;
    let mut consumed = 0_u32;

    // Alternate bursts of production and consumption so the cursors lap the
    // physical storage many times.
    for burst in 1..50_u32 {
        let burst_len = burst % 8;

        for _ in 0..burst_len {
            if ring.put(produced).is_ok() {
                produced += 1;
            }
        }

        for _ in 0..burst_len {
            if let Ok(value) = ring.get() {
                assert_eq!(value, consumed);
                consumed += 1;
            }
        }
    }

    // Drain whatever remains; ordering must still hold.
    while let Ok(value) = ring.get() {
        assert_eq!(value, consumed);
        consumed += 1;
    }

    assert_eq!(produced, consumed);
}

#[test]
fn buffer_capacity_comes_from_storage_length() {
    let mut storage = [0_u8; 32];
    let ring = RingBuffer::new(&mut storage).unwrap();

    assert_eq!(ring.capacity(), 32);
    assert_eq!(ring.available(), 0);
    assert!(ring.is_empty());
    assert!(!ring.is_full());
}
