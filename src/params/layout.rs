//! Packed little-endian cursors
//!
//! Both the wire layouts and the internal snapshots are packed structures
//! with no padding. These cursors walk such buffers field by field. They
//! never panic: reads past the end yield zeros and writes past the end are
//! dropped, which matches the truncating copy policy of the converters.

/// Width of a native boolean in an internal snapshot
pub const BOOL_WIDTH: usize = std::mem::size_of::<bool>();

/// Sequential reader over a packed buffer
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn skip(&mut self, n: usize) -> &mut Self {
        self.pos = self.pos.saturating_add(n);
        self
    }

    /// Up to `n` bytes; shorter if the buffer ends first
    pub fn bytes(&mut self, n: usize) -> &'a [u8] {
        let start = self.pos.min(self.buf.len());
        let end = self.pos.saturating_add(n).min(self.buf.len());
        self.pos = self.pos.saturating_add(n);
        &self.buf[start..end]
    }

    pub fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let src = self.bytes(N);
        out[..src.len()].copy_from_slice(src);
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.array::<1>()[0]
    }

    /// Native-width boolean; any non-zero byte is true
    pub fn flag(&mut self) -> bool {
        self.bytes(BOOL_WIDTH).iter().any(|&b| b != 0)
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    pub fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.array())
    }

    pub fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.array())
    }
}

/// Sequential writer over a packed buffer
#[derive(Debug)]
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Leave the next `n` bytes as they are
    pub fn skip(&mut self, n: usize) -> &mut Self {
        self.pos = self.pos.saturating_add(n);
        self
    }

    /// Copy `src`, truncated at the end of the buffer
    pub fn put(&mut self, src: &[u8]) -> &mut Self {
        if self.pos < self.buf.len() {
            let n = src.len().min(self.buf.len() - self.pos);
            self.buf[self.pos..self.pos + n].copy_from_slice(&src[..n]);
        }
        self.pos = self.pos.saturating_add(src.len());
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.put(&[v])
    }

    /// Native-width boolean
    pub fn flag(&mut self, v: bool) -> &mut Self {
        let mut raw = [0u8; BOOL_WIDTH];
        raw[0] = u8::from(v);
        self.put(&raw)
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.put(&v.to_le_bytes())
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.put(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.put(&v.to_le_bytes())
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.put(&v.to_le_bytes())
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        self.put(&v.to_le_bytes())
    }
}
