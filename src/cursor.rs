/// Bounds-checked reader over a byte slice.
///
/// Every read returns `None` instead of indexing past the end, so parsers
/// built on it can be fed arbitrary radio bytes.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Cursor positioned at `pos`. Fails if `pos` is past the end.
    pub fn at(buf: &'a [u8], pos: usize) -> Option<Self> {
        (pos <= buf.len()).then_some(Self { buf, pos })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }

    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    pub fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N)?.try_into().ok()
    }

    pub fn u8(&mut self) -> Option<u8> {
        let [b] = self.array::<1>()?;
        Some(b)
    }

    pub fn u16_le(&mut self) -> Option<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u16_be(&mut self) -> Option<u16> {
        self.array().map(u16::from_be_bytes)
    }

    /// Rest of the buffer, consuming it.
    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }
}

/// One tagged element (`id`, `len`, `body`) from a tagged-parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub id: u8,
    pub body: &'a [u8],
}

/// Iterator over tagged elements. Stops at the first truncated element.
pub struct Elements<'a> {
    cur: Cursor<'a>,
}

impl<'a> Elements<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { cur: Cursor::new(buf) }
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Element<'a>> {
        let id = self.cur.u8()?;
        let len = self.cur.u8()? as usize;
        let body = self.cur.take(len)?;
        Some(Element { id, body })
    }
}
