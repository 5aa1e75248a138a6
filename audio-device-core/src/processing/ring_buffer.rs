use std::fmt;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Fixed-capacity circular buffer of fixed-size frames.
///
/// A frame-aligned view over a `ringbuf` byte ring. Single producer, single
/// consumer: once split into a [`RingProducer`] and a [`RingConsumer`] each
/// half can live on its own thread without a lock.
///
/// Capacity is rounded up to a power of two. Writes never block: a write
/// larger than the free space stores the whole frames that fit and reports
/// the count, and the caller accounts the rest as overflow.
pub struct RingBuffer {
    ring: HeapRb<u8>,
    layout: FrameLayout,
}

/// Writing half of a split [`RingBuffer`].
pub struct RingProducer {
    producer: HeapProd<u8>,
    layout: FrameLayout,
}

/// Reading half of a split [`RingBuffer`].
pub struct RingConsumer {
    consumer: HeapCons<u8>,
    layout: FrameLayout,
}

#[derive(Debug, Clone, Copy)]
struct FrameLayout {
    frame_size: usize,
    capacity: usize,
}

impl FrameLayout {
    fn frames(&self, bytes: usize) -> usize {
        bytes / self.frame_size
    }

    /// Whole frames to move: bounded by the request, the free/used space
    /// and the caller's slice.
    fn count(&self, requested: usize, space_bytes: usize, slice_bytes: usize) -> usize {
        requested
            .min(self.frames(space_bytes))
            .min(self.frames(slice_bytes))
    }
}

fn push_frames(
    producer: &mut impl Producer<Item = u8>,
    layout: FrameLayout,
    data: &[u8],
    frames: usize,
) -> usize {
    let count = layout.count(frames, producer.vacant_len(), data.len());
    if count == 0 {
        return 0;
    }
    producer.push_slice(&data[..count * layout.frame_size]) / layout.frame_size
}

fn pop_frames(
    consumer: &mut impl Consumer<Item = u8>,
    layout: FrameLayout,
    buf: &mut [u8],
    frames: usize,
) -> usize {
    let count = layout.count(frames, consumer.occupied_len(), buf.len());
    if count == 0 {
        return 0;
    }
    consumer.pop_slice(&mut buf[..count * layout.frame_size]) / layout.frame_size
}

impl RingBuffer {
    /// Buffer holding at least `frames` frames of `frame_size` bytes.
    pub fn new(frames: usize, frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        let capacity = frames.max(1).next_power_of_two();
        Self {
            ring: HeapRb::new(capacity * frame_size),
            layout: FrameLayout {
                frame_size,
                capacity,
            },
        }
    }

    /// Copy up to `frames` frames from `data`; returns frames written.
    pub fn write(&mut self, data: &[u8], frames: usize) -> usize {
        push_frames(&mut self.ring, self.layout, data, frames)
    }

    /// Copy up to `frames` frames into `buf`; returns frames read.
    pub fn read(&mut self, buf: &mut [u8], frames: usize) -> usize {
        pop_frames(&mut self.ring, self.layout, buf, frames)
    }

    pub fn read_space(&self) -> usize {
        self.layout.frames(self.ring.occupied_len())
    }

    pub fn write_space(&self) -> usize {
        self.layout.frames(self.ring.vacant_len())
    }

    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    pub fn frame_size(&self) -> usize {
        self.layout.frame_size
    }

    /// Separate the writer and reader so they can move to different threads.
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let (producer, consumer) = self.ring.split();
        (
            RingProducer {
                producer,
                layout: self.layout,
            },
            RingConsumer {
                consumer,
                layout: self.layout,
            },
        )
    }
}

impl RingProducer {
    pub fn write(&mut self, data: &[u8], frames: usize) -> usize {
        push_frames(&mut self.producer, self.layout, data, frames)
    }

    pub fn write_space(&self) -> usize {
        self.layout.frames(self.producer.vacant_len())
    }

    pub fn frame_size(&self) -> usize {
        self.layout.frame_size
    }
}

impl RingConsumer {
    pub fn read(&mut self, buf: &mut [u8], frames: usize) -> usize {
        pop_frames(&mut self.consumer, self.layout, buf, frames)
    }

    pub fn read_space(&self) -> usize {
        self.layout.frames(self.consumer.occupied_len())
    }

    /// Drop everything currently readable; returns frames dropped.
    pub fn discard(&mut self) -> usize {
        self.layout.frames(self.consumer.clear())
    }

    pub fn capacity(&self) -> usize {
        self.layout.capacity
    }

    pub fn frame_size(&self) -> usize {
        self.layout.frame_size
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("frame_size", &self.frame_size())
            .field("read_space", &self.read_space())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frames(values: &[u8]) -> Vec<u8> {
        // two-byte frames: [v, v]
        values.iter().flat_map(|&v| [v, v]).collect()
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        assert_eq!(RingBuffer::new(100, 4).capacity(), 128);
        assert_eq!(RingBuffer::new(64, 4).capacity(), 64);
        assert_eq!(RingBuffer::new(0, 4).capacity(), 1);
    }

    #[test]
    fn basic_write_read() {
        let mut ring = RingBuffer::new(8, 2);
        assert_eq!(ring.write(&frames(&[1, 2, 3]), 3), 3);
        assert_eq!(ring.read_space(), 3);

        let mut out = vec![0u8; 6];
        assert_eq!(ring.read(&mut out, 3), 3);
        assert_eq!(out, frames(&[1, 2, 3]));
        assert_eq!(ring.read_space(), 0);
    }

    #[test]
    fn spaces_always_sum_to_capacity() {
        let mut ring = RingBuffer::new(8, 2);
        let mut out = vec![0u8; 16];
        for step in 0..20u8 {
            ring.write(&frames(&[step; 3]), 3);
            assert_eq!(ring.read_space() + ring.write_space(), ring.capacity());
            ring.read(&mut out, 2);
            assert_eq!(ring.read_space() + ring.write_space(), ring.capacity());
        }
    }

    #[test]
    fn full_buffer_reports_partial_write() {
        let mut ring = RingBuffer::new(4, 2);
        assert_eq!(ring.write(&frames(&[1, 2, 3]), 3), 3);
        assert_eq!(ring.write(&frames(&[4, 5, 6]), 3), 1);
        assert_eq!(ring.write_space(), 0);

        let mut out = vec![0u8; 8];
        assert_eq!(ring.read(&mut out, 4), 4);
        assert_eq!(out, frames(&[1, 2, 3, 4]));
    }

    #[test]
    fn read_partial_when_short() {
        let mut ring = RingBuffer::new(8, 2);
        ring.write(&frames(&[7, 8]), 2);

        let mut out = vec![0u8; 8];
        assert_eq!(ring.read(&mut out, 4), 2);
        assert_eq!(&out[..4], frames(&[7, 8]).as_slice());
        assert_eq!(ring.read(&mut out, 4), 0);
    }

    #[test]
    fn wraparound_preserves_order() {
        let mut ring = RingBuffer::new(4, 2);
        let mut out = vec![0u8; 8];

        ring.write(&frames(&[1, 2, 3]), 3);
        ring.read(&mut out, 2);
        ring.write(&frames(&[4, 5, 6]), 3);

        assert_eq!(ring.read_space(), 4);
        assert_eq!(ring.read(&mut out, 4), 4);
        assert_eq!(out, frames(&[3, 4, 5, 6]));
    }

    #[test]
    fn write_limited_by_source_length() {
        let mut ring = RingBuffer::new(8, 2);
        // only two whole frames in the slice
        assert_eq!(ring.write(&[1, 1, 2, 2, 3], 5), 2);
    }

    #[test]
    fn odd_frame_sizes_move_whole_frames_only() {
        let (mut producer, mut consumer) = RingBuffer::new(4, 3).split();
        let data: Vec<u8> = (0..15).collect();
        assert_eq!(producer.write(&data, 5), 4);
        assert_eq!(producer.write_space(), 0);
        assert_eq!(consumer.read_space(), 4);

        // room for one and a half frames in the output slice
        let mut out = [0u8; 5];
        assert_eq!(consumer.read(&mut out, 4), 1);
        assert_eq!(&out[..3], &[0, 1, 2]);
        assert_eq!(consumer.read_space(), 3);
        assert_eq!(producer.write_space(), 1);
    }

    #[test]
    fn discard_empties_consumer_side() {
        let (mut producer, mut consumer) = RingBuffer::new(8, 1).split();
        producer.write(&[1, 2, 3], 3);
        assert_eq!(consumer.discard(), 3);
        assert_eq!(consumer.read_space(), 0);
        assert_eq!(producer.write_space(), 8);
    }

    #[test]
    fn split_halves_stream_fifo_across_threads() {
        const TOTAL: usize = 10_000;
        let (mut producer, mut consumer) = RingBuffer::new(64, 4).split();

        let writer = thread::spawn(move || {
            let mut next = 0u32;
            while (next as usize) < TOTAL {
                let bytes = next.to_le_bytes();
                if producer.write(&bytes, 1) == 1 {
                    next += 1;
                } else {
                    thread::yield_now();
                }
            }
        });

        let mut expected = 0u32;
        let mut buf = [0u8; 4 * 16];
        while (expected as usize) < TOTAL {
            let n = consumer.read(&mut buf, 16);
            for frame in buf[..n * 4].chunks_exact(4) {
                let value = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
                assert_eq!(value, expected);
                expected += 1;
            }
            if n == 0 {
                thread::yield_now();
            }
        }

        writer.join().unwrap();
    }
}
