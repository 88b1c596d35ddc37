//! Per-method debug records.
//!
//! Every method compiled with debugging information carries a table of
//! statement records (code offset, source file, line, lexical frame) and a
//! list of lexical frames naming the locals visible in each scope. Offsets
//! are relative to the method's entry point.

use std::sync::Arc;

/// How a local symbol is stored in its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalKind {
    /// A local variable slot.
    Local { var: u16 },
    /// A parameter slot.
    Param { var: u16 },
    /// An element of a shared context array held in local `var`.
    ContextLocal { var: u16, arr_idx: u16 },
    /// A symbol the debugger cannot address.
    Unknown,
}

/// A named local in a lexical frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSymbol {
    pub name: String,
    pub kind: LocalKind,
}

/// A lexical scope. Frame ids are 1-based; 0 means "no frame".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugFrame {
    /// Id of the lexically enclosing frame, or 0
    pub enclosing: u16,
    pub symbols: Vec<DebugSymbol>,
}

/// A statement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugLine {
    /// Offset of the statement's first instruction from the method entry
    pub offset: u32,
    /// Index into the source file table
    pub source_id: u16,
    pub line: u32,
    /// Innermost lexical frame of the statement
    pub frame_id: u16,
}

/// Bounds of the statement containing an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementBounds {
    /// Start offset, inclusive
    pub start: u32,
    /// End offset, exclusive
    pub end: u32,
    pub line: DebugLine,
}

/// Debug records of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugTable {
    code_len: u32,
    exc_ofs: Option<u32>,
    lines: Vec<DebugLine>,
    frames: Vec<DebugFrame>,
}

impl DebugTable {
    /// Creates an empty table for a method whose code (including the
    /// header) is `code_len` bytes long.
    pub fn new(code_len: u32) -> Self {
        Self {
            code_len,
            ..Default::default()
        }
    }

    /// Sets the offset of the method's exception table.
    pub fn with_exception_table(mut self, exc_ofs: u32) -> Self {
        self.exc_ofs = Some(exc_ofs);
        self
    }

    /// Appends a statement record. Records must be added in ascending
    /// offset order.
    pub fn add_line(&mut self, offset: u32, source_id: u16, line: u32, frame_id: u16) -> &mut Self {
        self.lines.push(DebugLine {
            offset,
            source_id,
            line,
            frame_id,
        });
        self
    }

    /// Appends a lexical frame and returns its id.
    pub fn add_frame(&mut self, enclosing: u16) -> u16 {
        self.frames.push(DebugFrame {
            enclosing,
            symbols: Vec::new(),
        });
        self.frames.len() as u16
    }

    /// Adds a symbol to a frame. Unknown frame ids are ignored.
    pub fn add_symbol<S: Into<String>>(&mut self, frame_id: u16, name: S, kind: LocalKind) -> &mut Self {
        if let Some(frame) = self.frame_mut(frame_id) {
            frame.symbols.push(DebugSymbol {
                name: name.into(),
                kind,
            });
        }
        self
    }

    pub fn code_len(&self) -> u32 {
        self.code_len
    }

    pub fn exception_table_offset(&self) -> Option<u32> {
        self.exc_ofs
    }

    /// Length of the executable part of the method: everything before the
    /// exception table, or the whole code when there is none.
    pub fn executable_len(&self) -> u32 {
        self.exc_ofs.unwrap_or(self.code_len)
    }

    pub fn lines(&self) -> &[DebugLine] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Gets a frame by 1-based id.
    pub fn frame(&self, frame_id: u16) -> Option<&DebugFrame> {
        (frame_id as usize)
            .checked_sub(1)
            .and_then(|idx| self.frames.get(idx))
    }

    fn frame_mut(&mut self, frame_id: u16) -> Option<&mut DebugFrame> {
        (frame_id as usize)
            .checked_sub(1)
            .and_then(move |idx| self.frames.get_mut(idx))
    }

    /// Iterates from `frame_id` outward through the enclosing frames.
    pub fn frame_chain(&self, frame_id: u16) -> FrameChain<'_> {
        FrameChain {
            table: self,
            next: frame_id,
            remaining: self.frames.len(),
        }
    }

    /// Finds the statement containing `offset`.
    pub fn statement_at(&self, offset: u32) -> Option<StatementBounds> {
        let count = self.lines.len();
        if count == 0 {
            return None;
        }

        let mut lo = 0usize;
        let mut hi = count - 1;
        while lo <= hi {
            let cur = lo + (hi - lo) / 2;
            let rec = self.lines[cur];
            let end = self
                .lines
                .get(cur + 1)
                .map(|next| next.offset)
                .unwrap_or(self.code_len);

            if offset >= end {
                lo = if cur == lo { cur + 1 } else { cur };
            } else if offset < rec.offset {
                hi = if cur == hi {
                    match hi.checked_sub(1) {
                        Some(h) => h,
                        None => break,
                    }
                } else {
                    cur
                };
            } else {
                return Some(StatementBounds {
                    start: rec.offset,
                    end,
                    line: rec,
                });
            }
        }

        None
    }

    /// Wraps the table for sharing between the controller and stack levels.
    pub fn into_shared(self) -> Arc<DebugTable> {
        Arc::new(self)
    }
}

/// Iterator over a frame and its enclosing frames.
pub struct FrameChain<'a> {
    table: &'a DebugTable,
    next: u16,
    /// Guards against a malformed table whose frames enclose each other
    remaining: usize,
}

impl<'a> Iterator for FrameChain<'a> {
    type Item = &'a DebugFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let frame = self.table.frame(self.next)?;
        self.remaining -= 1;
        self.next = frame.enclosing;
        Some(frame)
    }
}
