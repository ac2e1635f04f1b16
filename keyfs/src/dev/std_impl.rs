#![cfg(any(test, feature = "std"))]

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use super::*;

pub struct StdTimeProvider;

impl TimeProvider for StdTimeProvider {
    fn now_ms(&self) -> i64 {
        let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
        duration.as_millis() as i64
    }
}

impl<W: io::Write> Sink for W {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        io::Write::write_all(self, buf)?;
        Ok(())
    }
}

impl<R: io::Read> Source for R {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        io::Read::read_exact(self, buf)?;
        Ok(())
    }
}

impl From<io::Error> for DevError {
    fn from(_: io::Error) -> Self {
        DevError
    }
}
