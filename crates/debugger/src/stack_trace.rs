//! Call stack listing and local enumeration.

use crate::debug_table::DebugTable;
use crate::formatter::ValueFormatter;
use crate::host::{NativeCaller, ObjectKind, StackFrame, VmHost};
use crate::symbols::SymbolTable;
use crate::value::{ObjId, Value};
use std::fmt::Write;

/// A source position.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// Longest symbol copied into a listing line.
const MAX_NAME: usize = 255;

/// One listing line with a fixed byte budget.
struct LineBuffer {
    text: String,
    limit: usize,
    exhausted: bool,
}

impl LineBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::with_capacity(limit),
            limit,
            exhausted: false,
        }
    }

    /// Bytes left, keeping one for the line terminator.
    fn rem(&self) -> usize {
        if self.exhausted {
            0
        } else {
            self.limit.saturating_sub(self.text.len() + 1)
        }
    }

    fn push_str(&mut self, s: &str) {
        self.text.push_str(s);
    }

    /// Appends `s` if it fits, otherwise marks the cut with `...` and stops
    /// taking text.
    fn append(&mut self, s: &str) {
        let rem = self.rem();
        if s.len() < rem {
            self.text.push_str(s);
        } else {
            if rem > 3 {
                self.text.push_str("...");
            }
            self.exhausted = true;
        }
    }
}

/// Cuts a symbol to the listing's name limit.
fn clip(name: &str) -> &str {
    if name.len() <= MAX_NAME {
        return name;
    }
    let mut end = MAX_NAME;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Builds call stack listings.
pub struct StackLister<'a> {
    host: &'a dyn VmHost,
    symbols: &'a SymbolTable,
    formatter: ValueFormatter<'a>,
    line_limit: usize,
}

impl<'a> StackLister<'a> {
    pub fn new(
        host: &'a dyn VmHost,
        symbols: &'a SymbolTable,
        formatter: ValueFormatter<'a>,
        line_limit: usize,
    ) -> Self {
        Self {
            host,
            symbols,
            formatter,
            line_limit,
        }
    }

    /// Calls `cb` with one line per stack level, innermost first.
    ///
    /// When `source` is given it is asked for the position of each byte
    /// code level, and the position is appended as `[file line N]` if the
    /// line has room for it.
    pub fn list<F>(&self, mut source: Option<&mut dyn FnMut(usize) -> Option<SourceLocation>>, mut cb: F)
    where
        F: FnMut(&str),
    {
        for level in 0..self.host.frame_depth() {
            let Some(frame) = self.host.stack_frame(level) else {
                break;
            };
            let loc = match (&mut source, frame.is_native()) {
                (Some(source), false) => source(level),
                _ => None,
            };
            cb(&self.frame_line(&frame, loc));
        }
    }

    /// Formats one stack level.
    pub fn frame_line(&self, frame: &StackFrame, loc: Option<SourceLocation>) -> String {
        let mut buf = LineBuffer::new(self.line_limit);

        let args: &[Value] = if frame.is_native() {
            self.native_caller(frame.native.as_ref(), &mut buf)
        } else {
            self.bytecode_caller(frame, &mut buf);
            &frame.args
        };

        let open = buf.text.len();
        buf.push_str("(");
        for (i, arg) in args.iter().enumerate() {
            if buf.rem() <= 10 {
                buf.push_str(" ...");
                break;
            }
            let limit = buf.rem() - 10;
            buf.push_str(&self.formatter.format_truncated(arg, limit));
            if i + 1 < args.len() {
                buf.push_str(", ");
            }
        }

        let mut count = args.len();
        for (name, value) in &frame.named_args {
            if count > 0 {
                buf.append(", ");
            }
            count += 1;
            buf.append(name);
            buf.append(":");
            let rem = buf.rem();
            if rem > 0 {
                buf.push_str(&self.formatter.format_truncated(value, rem));
            }
        }

        let close = buf.text.len();
        buf.push_str(")");

        if !frame.is_native() && frame.entry != 0 && buf.rem() > 12 {
            let _ = write!(buf.text, " + 0x{:X}", frame.pc.wrapping_sub(frame.entry));
        }

        if let Some(loc) = loc {
            self.append_location(&mut buf, &loc, open, close);
        }
        buf.text
    }

    /// Describes a native caller and returns the arguments it passed.
    fn native_caller<'f>(&self, native: Option<&'f NativeCaller>, buf: &mut LineBuffer) -> &'f [Value] {
        match native {
            None | Some(NativeCaller::System) => {
                buf.push_str("<System>");
                &[]
            }
            Some(NativeCaller::Builtin { bif, args }) => {
                match self.symbols.bif_to_sym(*bif) {
                    Some(name) => buf.push_str(clip(name)),
                    None => {
                        let _ = write!(buf.text, "intrinsicFunction#{}.{}", bif.set, bif.index);
                    }
                }
                args
            }
            Some(NativeCaller::IntrinsicMethod {
                class_obj,
                self_value,
                prop,
                args,
            }) => {
                match class_obj {
                    Some(cls) => match self.symbols.objid_to_sym(*cls) {
                        Some(name) => {
                            let _ = write!(buf.text, "{} [", clip(name));
                        }
                        None => {
                            let _ = write!(buf.text, "IntrinsicClass#{cls:x} [");
                        }
                    },
                    None => buf.push_str("IntrinsicClass ["),
                }

                let limit = buf.rem().saturating_sub(10);
                buf.push_str(&self.formatter.format_truncated(self_value, limit));
                if buf.rem() > 10 {
                    buf.push_str("].");
                }
                if buf.rem() > 15 {
                    match prop {
                        Some(prop) => match self.symbols.propid_to_sym(*prop) {
                            Some(name) => {
                                let name = clip(name);
                                let cut = name.len().min(buf.rem() - 1);
                                buf.push_str(name.get(..cut).unwrap_or(name));
                            }
                            None => {
                                let _ = write!(buf.text, "prop#{prop:x}");
                            }
                        },
                        None => buf.push_str("prop#?"),
                    }
                }
                args
            }
        }
    }

    /// Names a byte code frame: `obj.prop` for a method, the function name
    /// otherwise.
    fn bytecode_caller(&self, frame: &StackFrame, buf: &mut LineBuffer) {
        let Some(def_obj) = frame.defining_obj else {
            let entry = frame.entry;
            let name = match self.host.dynamic_code_object(entry) {
                Some(obj) => self.symbols.function_entry_symbol(entry, Some(obj)),
                None => self.symbols.funcaddr_to_sym(entry).map(str::to_string),
            };
            match name {
                Some(name) => buf.push_str(clip(&name)),
                None => {
                    let _ = write!(buf.text, "bytecode#{entry:08x}");
                }
            }
            return;
        };

        let self_obj = frame.self_obj.unwrap_or(ObjId(0));
        if matches!(self.host.objects().object_kind(def_obj), ObjectKind::AnonFn) {
            let _ = write!(buf.text, "{{anonfn:{def_obj:x}}}");
            return;
        }

        let def_sym = self
            .symbols
            .objid_to_sym(def_obj)
            .map(|name| self.symbols.modifying_symbol(name));
        match (frame.self_obj.and_then(|o| self.symbols.objid_to_sym(o)), def_sym) {
            (Some(self_sym), _) => buf.push_str(clip(self_sym)),
            (None, Some(def_sym)) => {
                let _ = write!(buf.text, "{} [{self_obj:x}]", clip(def_sym));
            }
            (None, None) => {
                let _ = write!(buf.text, "[{self_obj:x}]");
            }
        }

        match frame.target_prop {
            Some(prop) => match self.symbols.propid_to_sym(prop) {
                Some(name) => {
                    let _ = write!(buf.text, ".{}", clip(name));
                }
                None => {
                    let _ = write!(buf.text, ".prop#{prop:x}");
                }
            },
            None => buf.push_str(".prop#0"),
        }
    }

    /// Appends ` [file line N]`, shortening the file to its root name and
    /// then eliding part of the argument list when the line is too full.
    fn append_location(&self, buf: &mut LineBuffer, loc: &SourceLocation, open: usize, close: usize) {
        let num = format!(" line {}]", loc.line);
        let mut fname = loc.file.as_str();
        let needed = |fname: &str| fname.len() + num.len() + 2;

        if needed(fname) >= buf.rem() {
            fname = crate::source_file::root_name(fname);
        }

        let inner = (close - open).saturating_sub(4);
        if needed(fname) >= buf.rem() && needed(fname) < buf.rem() + inner {
            let adjust = needed(fname) - buf.rem() + 1 + 3;
            let mut cut = close - adjust;
            while cut > open && !buf.text.is_char_boundary(cut) {
                cut -= 1;
            }
            buf.text.replace_range(cut..close, "...");
        }

        if needed(fname) < buf.rem() {
            let _ = write!(buf.text, " [{fname}{num}");
        }
    }
}

/// Calls `cb` with the names visible at a statement: `self` when the level
/// has one, then the symbols of each lexical frame, innermost first.
pub fn enum_locals<F: FnMut(&str)>(table: &DebugTable, frame_id: u16, has_self: bool, mut cb: F) {
    if has_self {
        cb("self");
    }
    for frame in table.frame_chain(frame_id) {
        for sym in &frame.symbols {
            cb(&sym.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_table::LocalKind;

    #[test]
    fn test_line_buffer_append_marks_cut() {
        let mut buf = LineBuffer::new(10);
        buf.append("abc");
        assert_eq!(buf.rem(), 6);
        buf.append("defghij");
        assert_eq!(buf.text, "abc...");
        assert_eq!(buf.rem(), 0);
        buf.append("x");
        assert_eq!(buf.text, "abc...");
    }

    #[test]
    fn test_enum_locals_order() {
        let mut table = DebugTable::new(0x40);
        let outer = table.add_frame(0);
        let inner = table.add_frame(outer);
        table.add_symbol(outer, "a", LocalKind::Param { var: 0 });
        table.add_symbol(inner, "i", LocalKind::Local { var: 0 });
        table.add_symbol(inner, "j", LocalKind::Local { var: 1 });

        let mut names = Vec::new();
        enum_locals(&table, inner, true, |n| names.push(n.to_string()));
        assert_eq!(names, vec!["self", "i", "j", "a"]);

        names.clear();
        enum_locals(&table, outer, false, |n| names.push(n.to_string()));
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_clip_respects_char_boundaries() {
        let long = "é".repeat(200);
        let clipped = clip(&long);
        assert!(clipped.len() <= MAX_NAME);
        assert!(long.starts_with(clipped));
    }
}
