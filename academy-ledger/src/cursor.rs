//! Sequential account-data cursor.
//!
//! On-ledger account layouts here mix length-prefixed strings with
//! fixed-width tails, so field offsets are computed, not declared. The
//! cursor advances through a byte slice and fails loudly the moment fewer
//! bytes remain than a read requires.

use crate::error::{LedgerError, Result};
use crate::pubkey::Pubkey;

/// A read position over raw account bytes.
pub struct AccountCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> AccountCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .ok_or_else(|| LedgerError::MalformedAccount("offset overflow".into()))?;
        if end > self.data.len() {
            return Err(LedgerError::MalformedAccount(format!(
                "need {} bytes at offset {}, account holds {}",
                len,
                self.offset,
                self.data.len()
            )));
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_fixed_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn read_pubkey(&mut self) -> Result<Pubkey> {
        let bytes = self.take(32)?;
        let mut buf = [0u8; 32];
        buf.copy_from_slice(bytes);
        Ok(Pubkey::new(buf))
    }

    /// Read a 4-byte little-endian length prefix, then that many bytes as
    /// UTF-8.
    pub fn read_length_prefixed_string(&mut self) -> Result<String> {
        let len = self.read_u32_le()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| LedgerError::MalformedAccount("string field is not valid UTF-8".into()))
    }

    /// Skip a 4-byte little-endian length prefix and its payload.
    pub fn skip_length_prefixed(&mut self) -> Result<()> {
        let len = self.read_u32_le()? as usize;
        self.skip(len)
    }
}
