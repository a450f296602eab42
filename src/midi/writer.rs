//! Growable binary buffer with backpatchable length fields
//!
//! The only component that emits raw bytes. Byte order is chosen per
//! field by the caller: SMF chunks are big-endian, RIFF/WAVE fields are
//! little-endian with big-endian FourCC magics.

/// Byte stream writer backed by a growable buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity) }
    }

    /// Current write offset, usable later with [`ByteWriter::patch_u32_be`].
    pub fn position(&self) -> usize {
        self.data.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn write_u16_be(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u24_be(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes()[1..]);
    }

    pub fn write_u32_be(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16_le(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write the low 7 bits of a MIDI data byte.
    pub fn write_midi_7_bits(&mut self, value: u8) {
        self.data.push(value & 0x7F);
    }

    /// Write an ASCII string as a MIDI meta payload: variable-length byte
    /// count followed by the text.
    pub fn write_midi_ascii(&mut self, text: &str) {
        self.write_variable_length(text.len() as u64);
        for c in text.chars() {
            debug_assert!(c.is_ascii(), "non-ascii character in midi text");
            self.data.push(c as u8);
        }
    }

    /// Write a MIDI variable-length quantity: 7 bits per byte, high bit
    /// set on every byte except the last, most significant group first.
    pub fn write_variable_length(&mut self, mut value: u64) {
        let mut groups = [0u8; 10];
        let mut count = 0;
        loop {
            groups[count] = (value & 0x7F) as u8;
            count += 1;
            value >>= 7;
            if value == 0 {
                break;
            }
        }
        for i in (1..count).rev() {
            self.data.push(groups[i] | 0x80);
        }
        self.data.push(groups[0]);
    }

    /// Overwrite a previously written 4-byte big-endian field. Used to
    /// backpatch chunk lengths once a chunk's final size is known.
    pub fn patch_u32_be(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_byte_order() {
        let mut w = ByteWriter::new();
        w.write_u16_be(0x1234);
        w.write_u16_le(0x1234);
        w.write_u24_be(0x123456);
        w.write_u32_le(0x12345678);
        assert_eq!(
            w.as_bytes(),
            &[0x12, 0x34, 0x34, 0x12, 0x12, 0x34, 0x56, 0x78, 0x56, 0x34, 0x12]
        );
    }

    #[test]
    fn test_variable_length_one_byte() {
        let mut w = ByteWriter::new();
        w.write_variable_length(0);
        w.write_variable_length(0x7F);
        assert_eq!(w.as_bytes(), &[0x00, 0x7F]);
    }

    #[test]
    fn test_variable_length_multi_byte() {
        let mut w = ByteWriter::new();
        w.write_variable_length(0x80);
        assert_eq!(w.as_bytes(), &[0x81, 0x00]);

        let mut w = ByteWriter::new();
        w.write_variable_length(0x0FFF_FFFF);
        assert_eq!(w.as_bytes(), &[0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_patch_u32() {
        let mut w = ByteWriter::new();
        w.write_u32_be(0x4D54726B);
        let patch_at = w.position();
        w.write_u32_be(0);
        w.write_u8(0xAB);
        w.patch_u32_be(patch_at, 1);
        assert_eq!(w.as_bytes(), &[0x4D, 0x54, 0x72, 0x6B, 0x00, 0x00, 0x00, 0x01, 0xAB]);
    }

    #[test]
    fn test_midi_ascii_is_length_prefixed() {
        let mut w = ByteWriter::new();
        w.write_midi_ascii("Loop Start");
        assert_eq!(w.as_bytes()[0], 10);
        assert_eq!(&w.as_bytes()[1..], b"Loop Start");
    }
}
