//! Sequential reader over ordered partitions

use std::fs::File;
use std::io::{self, Read};

use crate::partition::PartitionHandle;

/// Reads a list of partition files back to back, as one stream
///
/// Each file is opened only when the previous one is exhausted, so at most
/// one partition handle is open at a time.
pub struct PartitionReader {
    partitions: std::vec::IntoIter<PartitionHandle>,
    current: Option<File>,
}

impl PartitionReader {
    pub fn new(partitions: Vec<PartitionHandle>) -> Self {
        Self {
            partitions: partitions.into_iter(),
            current: None,
        }
    }
}

impl Read for PartitionReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(file) = self.current.as_mut() {
                let n = file.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                self.current = None;
            }

            match self.partitions.next() {
                Some(partition) => self.current = Some(File::open(&partition.path)?),
                None => return Ok(0),
            }
        }
    }
}
