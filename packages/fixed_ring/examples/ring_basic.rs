//! Basic usage of the `fixed_ring` crate:
//!
//! * Creating a ring buffer over caller-owned storage.
//! * Producing and consuming elements.
//! * Observing occupancy.

use fixed_ring::RingBuffer;

fn main() {
    let mut storage = [0_u32; 8];
    let mut ring = RingBuffer::new(&mut storage).expect("length 8 is a power of two");

    for sample in [3, 1, 4, 1, 5] {
        ring.put(sample).expect("five puts fit in eight slots");
    }

    println!(
        "Ring holds {} of {} elements; oldest is {}",
        ring.available(),
        ring.capacity(),
        ring.peek().expect("ring is not empty")
    );

    while let Ok(sample) = ring.get() {
        println!("Consumed {sample}");
    }

    println!("Ring drained; is_empty = {}", ring.is_empty());
}
