//! Fixed-capacity buffer pool shared by a stage's loop iterations

/// Hands out buffers of one fixed length and takes them back for reuse
#[derive(Debug)]
pub struct BufferPool<T> {
    capacity: usize,
    idle: Vec<Vec<T>>,
    allocated: usize,
}

impl<T: Copy + Default> BufferPool<T> {
    /// Pool of buffers holding `capacity` elements
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            idle: Vec::new(),
            allocated: 0,
        }
    }

    /// Number of buffers created over the pool's lifetime
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Take a buffer of exactly `capacity` elements
    pub fn acquire(&mut self) -> Vec<T> {
        match self.idle.pop() {
            Some(buffer) => buffer,
            None => {
                self.allocated += 1;
                vec![T::default(); self.capacity]
            }
        }
    }

    /// Return a buffer; one too small to restore to `capacity` is dropped
    pub fn release(&mut self, mut buffer: Vec<T>) {
        if buffer.len() != self.capacity {
            if buffer.capacity() < self.capacity {
                return;
            }
            buffer.resize(self.capacity, T::default());
        }
        self.idle.push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_buffer_is_reused() {
        let mut pool: BufferPool<u8> = BufferPool::new(16);
        let first = pool.acquire();
        assert_eq!(first.len(), 16);
        pool.release(first);
        let second = pool.acquire();
        assert_eq!(second.len(), 16);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_truncated_buffer_is_restored_to_capacity() {
        let mut pool: BufferPool<i16> = BufferPool::new(8);
        let mut buffer = pool.acquire();
        buffer.truncate(3);
        pool.release(buffer);
        assert_eq!(pool.acquire().len(), 8);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_buffers_in_use_are_allocated_separately() {
        let mut pool: BufferPool<u8> = BufferPool::new(4);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        pool.acquire();
        pool.acquire();
        assert_eq!(pool.allocated(), 2);
    }
}
