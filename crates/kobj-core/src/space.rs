use zerocopy::{FromBytes, IntoBytes};

use crate::{KobjError, Pa, Va};

/// A byte-addressable view of a memory image.
///
/// The address space is the only collaborator the overlay engine reads
/// from. Page translation, backing files and live memory all live behind
/// this trait.
pub trait AddressSpace: Sized {
    /// Reads `buffer.len()` bytes starting at `va`.
    ///
    /// Fails with [`KobjError::PageFault`] if any byte of the range is not
    /// readable.
    fn read(&self, va: Va, buffer: &mut [u8]) -> Result<(), KobjError>;

    /// Checks whether a single address is readable.
    fn is_valid_address(&self, va: Va) -> bool;

    /// Derives an address space that translates through a different
    /// page-table root (e.g., the directory table base of a process).
    fn derive(&self, root: Pa) -> Result<Self, KobjError>;

    /// A human-readable name, used in log messages.
    fn name(&self) -> String {
        String::from("memory")
    }

    /// Checks whether the whole range `[va, va + len)` is readable.
    ///
    /// Every page touched by the range is probed once.
    fn is_valid_range(&self, va: Va, len: u64) -> bool {
        const PAGE_SIZE: u64 = 0x1000;

        if len == 0 {
            return self.is_valid_address(va);
        }

        let end = match va.0.checked_add(len - 1) {
            Some(end) => end,
            None => return false,
        };

        let mut current = va.0;
        loop {
            if !self.is_valid_address(Va(current)) {
                return false;
            }

            let next_page = (current & !(PAGE_SIZE - 1)).checked_add(PAGE_SIZE);
            match next_page {
                Some(next) if next <= end => current = next,
                _ => break,
            }
        }

        self.is_valid_address(Va(end))
    }

    /// Reads `len` bytes into a new buffer.
    fn read_bytes(&self, va: Va, len: usize) -> Result<Vec<u8>, KobjError> {
        let mut buffer = vec![0u8; len];
        self.read(va, &mut buffer)?;
        Ok(buffer)
    }

    /// Reads a single byte.
    fn read_u8(&self, va: Va) -> Result<u8, KobjError> {
        let mut buffer = [0u8; 1];
        self.read(va, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Reads a 16-bit little-endian unsigned integer.
    fn read_u16(&self, va: Va) -> Result<u16, KobjError> {
        let mut buffer = [0u8; 2];
        self.read(va, &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    /// Reads a 32-bit little-endian unsigned integer.
    fn read_u32(&self, va: Va) -> Result<u32, KobjError> {
        let mut buffer = [0u8; 4];
        self.read(va, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit little-endian unsigned integer.
    fn read_u64(&self, va: Va) -> Result<u64, KobjError> {
        let mut buffer = [0u8; 8];
        self.read(va, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads an unsigned integer of `size` bytes (1, 2, 4 or 8).
    fn read_uint(&self, va: Va, size: usize) -> Result<u64, KobjError> {
        match size {
            1 => self.read_u8(va).map(u64::from),
            2 => self.read_u16(va).map(u64::from),
            4 => self.read_u32(va).map(u64::from),
            8 => self.read_u64(va),
            _ => Err(KobjError::OutOfBounds),
        }
    }

    /// Reads a pointer of the given width.
    fn read_address(&self, va: Va, address_width: usize) -> Result<Va, KobjError> {
        match address_width {
            4 => self.read_u32(va).map(|value| Va(value as u64)),
            8 => self.read_u64(va).map(Va),
            _ => Err(KobjError::OutOfBounds),
        }
    }

    /// Reads a plain-old-data structure.
    fn read_struct<T>(&self, va: Va) -> Result<T, KobjError>
    where
        T: FromBytes + IntoBytes,
    {
        let mut result = T::new_zeroed();
        self.read(va, result.as_mut_bytes())?;
        Ok(result)
    }
}
