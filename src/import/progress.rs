use std::io::{self, Read};

/// Reader wrapper that logs how much of a known-size input has been consumed
pub struct ProgressReader<R> {
    inner: R,
    read: u64,
    total: u64,
    percent: u64,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total: u64) -> Self {
        ProgressReader {
            inner,
            read: 0,
            total,
            percent: 0,
        }
    }

    /// Last whole percentage reported
    pub fn percent(&self) -> u64 {
        self.percent
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;

        if self.total > 0 {
            let percent = (self.read * 100 / self.total).min(100);
            if percent != self.percent {
                self.percent = percent;
                tracing::info!(percent, "import progress");
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reaches_full() {
        let data = vec![b' '; 200];
        let mut reader = ProgressReader::new(&data[..], data.len() as u64);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(sink.len(), 200);
        assert_eq!(reader.percent(), 100);
    }

    #[test]
    fn test_unknown_size_never_reports() {
        let data = b"{}";
        let mut reader = ProgressReader::new(&data[..], 0);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(reader.percent(), 0);
    }
}
