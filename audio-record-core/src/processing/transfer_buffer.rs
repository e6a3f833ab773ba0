/// Fixed-capacity byte buffer holding one callback interval of PCM.
///
/// Owned by a single capture worker; the capacity is set at construction and
/// never changes.
#[derive(Debug)]
pub struct TransferBuffer {
    data: Box<[u8]>,
}

impl TransferBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_fixed_and_zeroed() {
        let mut buf = TransferBuffer::new(320);
        assert_eq!(buf.capacity(), 320);
        assert!(buf.as_slice().iter().all(|&b| b == 0));

        buf.as_mut_slice().fill(7);
        assert_eq!(buf.capacity(), 320);
        assert!(buf.as_slice().iter().all(|&b| b == 7));
    }
}
