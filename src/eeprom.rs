//! EEPROM image writer and download-packet builder.
//!
//! Program tokens are appended bit-by-bit into a reverse-addressed image:
//! bit index `i` lives in `image[2047 - i/8]`, packed MSB-first within the
//! byte, so the program grows downward from the top of the part while DATA
//! fills bytes upward from address 0. Every write updates a parallel usage
//! flag per byte; program bits landing on a byte that already carries data
//! is the collision the compiler reports as error 124.

use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::types::{eeprom_usage, EEPROM_SIZE, PACKET_BUFFER_SIZE, PACKET_SIZE};

/// One pending forward-reference fill: the element that referred ahead and
/// the EEPROM bit address of its empty 14-bit address field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    /// Index into the element list of the referring label element.
    pub element_idx: usize,
    /// Bit address of the 14-bit field awaiting the label address.
    pub field_addr: u16,
}

/// The in-flight EEPROM image.
#[derive(Debug, Clone)]
pub struct Eeprom {
    image: [u8; EEPROM_SIZE],
    flags: [u8; EEPROM_SIZE],
    /// Source range that introduced each data byte, for collision reports.
    pointers: Vec<Span>,
    bit_idx: u16,
}

impl Default for Eeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl Eeprom {
    /// Blank image.
    pub fn new() -> Self {
        Self {
            image: [0; EEPROM_SIZE],
            flags: [0; EEPROM_SIZE],
            pointers: vec![Span::default(); EEPROM_SIZE],
            bit_idx: 0,
        }
    }

    /// Current program write position, in bits.
    pub fn bit_index(&self) -> u16 {
        self.bit_idx
    }

    /// Move the program write position (used once, past the gosub table).
    pub fn set_bit_index(&mut self, bit_idx: u16) {
        self.bit_idx = bit_idx;
    }

    /// Image byte at an address.
    pub fn byte(&self, addr: usize) -> u8 {
        self.image[addr]
    }

    /// Usage flags byte at an address.
    pub fn flag(&self, addr: usize) -> u8 {
        self.flags[addr]
    }

    /// Copy out the image and flag planes.
    pub fn planes(&self) -> (&[u8; EEPROM_SIZE], &[u8; EEPROM_SIZE]) {
        (&self.image, &self.flags)
    }

    fn byte_for_bit(bit: u16) -> usize {
        EEPROM_SIZE - 1 - usize::from(bit / 8)
    }

    /// Read `count` bits starting at a bit address.
    pub fn read_bits(&self, mut bit_addr: u16, count: u8) -> u16 {
        let mut value = 0u16;
        for _ in 0..count {
            let byte = Self::byte_for_bit(bit_addr);
            let bit = (self.image[byte] >> (7 - bit_addr % 8)) & 1;
            value = (value << 1) | u16::from(bit);
            bit_addr += 1;
        }
        value
    }

    /// Write `count` bits (1..=16) of `data` at an arbitrary bit address,
    /// MSB first, splitting byte-straddling writes into installments.
    ///
    /// `span` is charged for the collision if a touched byte already holds
    /// data; the recorded data span is what the diagnostic points at.
    pub fn write_bits_at(&mut self, bit_addr: u16, count: u8, data: u16, span: Span) -> Result<u16> {
        debug_assert!((1..=16).contains(&count));
        if usize::from(bit_addr) + usize::from(count) > EEPROM_SIZE * 8 {
            return Err(CompileError::new(ErrorCode::EepromAddressOutOfRange, span));
        }
        let mut remaining = count;
        let mut cursor = bit_addr;
        while remaining > 0 {
            let byte = Self::byte_for_bit(cursor);
            let offset = cursor % 8;
            let take = remaining.min(8 - offset as u8);

            let usage = self.flags[byte] & 0x07;
            if usage == eeprom_usage::UNDEF_DATA || usage == eeprom_usage::DEF_DATA {
                return Err(CompileError::new(
                    ErrorCode::DataProgramCollision,
                    self.pointers[byte],
                ));
            }
            self.flags[byte] = (self.flags[byte] & !0x07) | eeprom_usage::PROGRAM;

            // Slice the highest `take` bits still unwritten.
            let shift = remaining - take;
            let chunk = ((data >> shift) & ((1u16 << take) - 1)) as u8;
            let dest_shift = 8 - offset as u8 - take;
            let mask = (((1u16 << take) - 1) as u8) << dest_shift;
            self.image[byte] = (self.image[byte] & !mask) | (chunk << dest_shift);

            cursor += u16::from(take);
            remaining -= take;
        }
        Ok(bit_addr)
    }

    /// Append `count` bits at the program cursor. Returns the bit address
    /// the field was written at.
    pub fn enter_bits(&mut self, count: u8, data: u16, span: Span) -> Result<u16> {
        let at = self.write_bits_at(self.bit_idx, count, data, span)?;
        self.bit_idx += u16::from(count);
        Ok(at)
    }

    /// Fill a previously written 14-bit address field.
    pub fn patch_address(&mut self, field_addr: u16, address: u16) -> Result<()> {
        self.write_bits_at(field_addr, 14, address & 0x3FFF, Span::default())
            .map(|_| ())
    }

    /// Write one DATA byte. Undefined entries only reserve the location.
    pub fn write_data_byte(
        &mut self,
        addr: u16,
        value: u8,
        defined: bool,
        span: Span,
    ) -> Result<()> {
        let addr = usize::from(addr);
        if addr >= EEPROM_SIZE {
            return Err(CompileError::new(ErrorCode::EepromAddressOutOfRange, span));
        }
        if self.flags[addr] & 0x07 == eeprom_usage::PROGRAM {
            return Err(CompileError::new(ErrorCode::DataProgramCollision, span));
        }
        if defined {
            self.image[addr] = value;
            self.flags[addr] = (self.flags[addr] & !0x07) | eeprom_usage::DEF_DATA;
            self.pointers[addr] = span;
        } else if self.flags[addr] & 0x07 == eeprom_usage::EMPTY {
            self.flags[addr] = (self.flags[addr] & !0x07) | eeprom_usage::UNDEF_DATA;
            self.pointers[addr] = span;
        }
        Ok(())
    }

    /// Assemble download packets for every 16-byte block holding defined
    /// data or program bits. Returns the packet count.
    ///
    /// Packet shape: `block | 0x80`, 16 data bytes, and a checksum chosen so
    /// the sum of all 18 bytes is 0 modulo 256. Included bytes get their
    /// `downloaded` flag set.
    pub fn prepare_packets(&mut self, buffer: &mut [u8; PACKET_BUFFER_SIZE]) -> u8 {
        let mut count = 0usize;
        for block in 0..EEPROM_SIZE / 16 {
            let range = block * 16..block * 16 + 16;
            let wanted = range.clone().any(|i| {
                matches!(
                    self.flags[i] & 0x07,
                    eeprom_usage::DEF_DATA | eeprom_usage::PROGRAM
                )
            });
            if !wanted {
                continue;
            }
            let packet = &mut buffer[count * PACKET_SIZE..(count + 1) * PACKET_SIZE];
            packet[0] = block as u8 | 0x80;
            let mut sum = packet[0] as u32;
            for (slot, i) in range.enumerate() {
                packet[1 + slot] = self.image[i];
                sum += self.image[i] as u32;
                self.flags[i] |= eeprom_usage::DOWNLOADED;
            }
            packet[17] = (sum as u8).wrapping_neg();
            count += 1;
        }
        count as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_bit_addressing() {
        let mut eeprom = Eeprom::new();
        // Bits 0..8 land in the last image byte, MSB first.
        eeprom.enter_bits(8, 0xA5, Span::default()).unwrap();
        assert_eq!(eeprom.byte(EEPROM_SIZE - 1), 0xA5);
        assert_eq!(eeprom.flag(EEPROM_SIZE - 1) & 0x07, eeprom_usage::PROGRAM);
    }

    #[test]
    fn test_straddling_write() {
        let mut eeprom = Eeprom::new();
        eeprom.enter_bits(3, 0b101, Span::default()).unwrap();
        eeprom.enter_bits(14, 0b10_1010_1010_1010, Span::default()).unwrap();
        assert_eq!(eeprom.read_bits(0, 3), 0b101);
        assert_eq!(eeprom.read_bits(3, 14), 0b10_1010_1010_1010);
        // 17 bits touch three image bytes from the top down.
        assert_eq!(eeprom.flag(EEPROM_SIZE - 3) & 0x07, eeprom_usage::PROGRAM);
    }

    #[test]
    fn test_patch_address_round_trip() {
        let mut eeprom = Eeprom::new();
        let field = eeprom.enter_bits(14, 0, Span::default()).unwrap();
        eeprom.enter_bits(7, 0x09, Span::default()).unwrap();
        eeprom.patch_address(field, 0x1234).unwrap();
        assert_eq!(eeprom.read_bits(field, 14), 0x1234);
        // Neighboring bits survive the patch.
        assert_eq!(eeprom.read_bits(14, 7), 0x09);
    }

    #[test]
    fn test_program_over_data_collides() {
        let mut eeprom = Eeprom::new();
        let data_span = Span::new(42, 3);
        eeprom
            .write_data_byte((EEPROM_SIZE - 1) as u16, 0xAA, true, data_span)
            .unwrap();
        let err = eeprom.enter_bits(8, 0xFF, Span::new(0, 1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::DataProgramCollision);
        assert_eq!(err.span, data_span);
    }

    #[test]
    fn test_data_over_program_collides() {
        let mut eeprom = Eeprom::new();
        eeprom.enter_bits(8, 0xFF, Span::default()).unwrap();
        let err = eeprom
            .write_data_byte((EEPROM_SIZE - 1) as u16, 1, true, Span::new(7, 2))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DataProgramCollision);
    }

    #[test]
    fn test_undefined_data_reserves_without_writing() {
        let mut eeprom = Eeprom::new();
        eeprom.write_data_byte(4, 0, false, Span::default()).unwrap();
        assert_eq!(eeprom.flag(4) & 0x07, eeprom_usage::UNDEF_DATA);
        assert_eq!(eeprom.byte(4), 0);
        // A later defined write upgrades the location.
        eeprom.write_data_byte(4, 9, true, Span::default()).unwrap();
        assert_eq!(eeprom.flag(4) & 0x07, eeprom_usage::DEF_DATA);
        assert_eq!(eeprom.byte(4), 9);
    }

    #[test]
    fn test_packet_checksum_property() {
        let mut eeprom = Eeprom::new();
        eeprom.write_data_byte(0, 0x11, true, Span::default()).unwrap();
        eeprom.write_data_byte(17, 0x22, true, Span::default()).unwrap();
        eeprom.enter_bits(16, 0xBEEF, Span::default()).unwrap();

        let mut buffer = [0u8; PACKET_BUFFER_SIZE];
        let count = eeprom.prepare_packets(&mut buffer);
        assert_eq!(count, 3);
        for packet in buffer[..count as usize * PACKET_SIZE].chunks_exact(PACKET_SIZE) {
            let sum: u32 = packet.iter().map(|b| u32::from(*b)).sum();
            assert_eq!(sum % 256, 0);
            assert!(packet[0] & 0x80 != 0);
        }
        // Undefined-only blocks are not transmitted.
        assert_eq!(eeprom.flag(0) & eeprom_usage::DOWNLOADED, eeprom_usage::DOWNLOADED);
    }
}
