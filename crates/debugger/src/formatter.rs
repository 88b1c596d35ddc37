//! Value formatting.
//!
//! Renders runtime values the way the debugger shows them to the user:
//! symbolic names where the symbol tables know them, numeric placeholders
//! (`obj#1a`, `prop#3`) where they don't, quoted and escaped strings and
//! bracketed lists. Container objects get an inline listing of their
//! contents after their id.
//!
//! [`ValueFormatter::format_special`] produces a second notation built from
//! the `#__` forms the expression compiler accepts, so any value can be
//! written back into an expression.

use crate::host::{ObjectInspector, ObjectKind};
use crate::symbols::SymbolTable;
use crate::value::{ObjId, Value};
use std::fmt::{self, Write};
use vmdbg_config::Charset;

/// Named escape for a character inside a quoted string.
const fn escape(ch: char) -> Option<&'static str> {
    match ch {
        '\t' => Some("\\t"),
        '\n' => Some("\\n"),
        '\r' => Some("\\r"),
        '\u{0f}' => Some("\\^"),
        '\u{0e}' => Some("\\v"),
        '\u{0b}' => Some("\\b"),
        '\u{15}' => Some("\\ "),
        '\\' => Some("\\\\"),
        '\'' => Some("\\'"),
        _ => None,
    }
}

/// Key buffer size for lookup table fragments.
const KEY_TEXT_LIMIT: usize = 253;

/// Longest rendering produced for any value.
pub const FORMAT_CEILING: usize = 64 * 1024;

/// Text appended to a truncated rendering.
const ELLIPSIS: &str = "...";

/// Output buffer that stops accepting text at a byte budget.
///
/// `open` holds the containers being rendered, innermost last, so a
/// container reached again through its own contents is written as its id.
struct Sink {
    out: String,
    budget: usize,
    full: bool,
    open: Vec<ObjId>,
}

impl Sink {
    fn new(budget: usize) -> Self {
        Self {
            out: String::new(),
            budget,
            full: false,
            open: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.full
    }

    fn push(&mut self, ch: char) {
        let mut buf = [0u8; 4];
        self.push_str(ch.encode_utf8(&mut buf));
    }

    fn push_str(&mut self, text: &str) {
        if self.full {
            return;
        }
        let room = self.budget - self.out.len();
        if text.len() <= room {
            self.out.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.out.push_str(&text[..cut]);
        self.full = true;
    }

    /// The text written, cut to `limit` and marked with `...` if the
    /// budget ran out.
    fn finish(self, limit: usize) -> String {
        if self.full {
            cut_with_ellipsis(self.out, limit)
        } else {
            truncate(self.out, limit)
        }
    }
}

impl Write for Sink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

/// Formats values for display.
pub struct ValueFormatter<'a> {
    symbols: &'a SymbolTable,
    objects: &'a dyn ObjectInspector,
    charset: Charset,
}

impl<'a> ValueFormatter<'a> {
    pub fn new(symbols: &'a SymbolTable, objects: &'a dyn ObjectInspector, charset: Charset) -> Self {
        Self {
            symbols,
            objects,
            charset,
        }
    }

    /// Formats a value in full, up to [`FORMAT_CEILING`] bytes.
    pub fn format_value(&self, value: &Value) -> String {
        self.format_truncated(value, FORMAT_CEILING)
    }

    /// Formats a value into `out`, writing at most `limit` bytes, and
    /// returns the length the full rendering needs.
    ///
    /// A `limit` of zero only measures, so callers can size a buffer and
    /// then format into it.
    pub fn format_to(&self, value: &Value, out: &mut String, limit: usize) -> usize {
        let full = self.format_value(value);
        let required = full.len();
        if limit > 0 {
            out.push_str(&truncate(full, limit));
        }
        required
    }

    /// Formats a value into at most `limit` bytes, ending in `...` when the
    /// rendering had to be cut.
    pub fn format_truncated(&self, value: &Value, limit: usize) -> String {
        // one byte past the limit tells a cut from an exact fit
        let mut sink = Sink::new(limit.saturating_add(1));
        self.write_value(value, &mut sink);
        sink.finish(limit)
    }

    fn write_value(&self, value: &Value, out: &mut Sink) {
        if out.is_full() {
            return;
        }
        match value {
            Value::Nil => out.push_str("nil"),
            Value::True => out.push_str("true"),
            Value::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Obj(obj) => self.write_object(*obj, out),
            Value::Prop(prop) => {
                let _ = match self.symbols.propid_to_sym(*prop) {
                    Some(name) => write!(out, "&{name}"),
                    None => write!(out, "prop#{prop:x}"),
                };
            }
            Value::Enum(val) => {
                let _ = match self.symbols.enum_to_sym(*val) {
                    Some(name) => write!(out, "{name}"),
                    None => write!(out, "enum#{val:x}"),
                };
            }
            Value::BifPtr(bif) => {
                let _ = match self.symbols.bif_to_sym(*bif) {
                    Some(name) => write!(out, "&{name}"),
                    None => write!(out, "&intrinsic_function#{}:{}", bif.set, bif.index),
                };
            }
            Value::FuncPtr(addr) => {
                let _ = match self.symbols.funcaddr_to_sym(*addr) {
                    Some(name) => write!(out, "{name}"),
                    None => write!(out, "function#{addr:08x}"),
                };
            }
            Value::Str(s) => self.write_string(s, out),
            Value::List(items) => self.write_list(items, out),
            Value::Empty | Value::CodeOfs(_) => out.push('?'),
        }
    }

    fn write_list(&self, items: &[Value], out: &mut Sink) {
        out.push('[');
        for (i, item) in items.iter().enumerate() {
            if out.is_full() {
                return;
            }
            if i > 0 {
                out.push(',');
            }
            self.write_value(item, out);
        }
        out.push(']');
    }

    fn write_string(&self, text: &str, out: &mut Sink) {
        out.push('\'');
        for ch in text.chars() {
            if out.is_full() {
                return;
            }
            if let Some(esc) = escape(ch) {
                out.push_str(esc);
            } else if (ch as u32) < 32 {
                let _ = write!(out, "\\x{:02X}", ch as u32);
            } else if !self.charset.is_mappable(ch) {
                let _ = write!(out, "\\u{:04X}", ch as u32);
            } else {
                out.push(ch);
            }
        }
        out.push('\'');
    }

    /// `obj#hex`, annotated with the superclass name when it has one.
    fn write_object_id(&self, obj: ObjId, out: &mut Sink) {
        let _ = write!(out, "obj#{obj:x}");
        let super_sym = self
            .objects
            .superclass(obj)
            .and_then(|sc| self.symbols.objid_to_sym(sc));
        if let Some(name) = super_sym {
            let _ = write!(out, " ({name})");
        }
    }

    fn write_object(&self, obj: ObjId, out: &mut Sink) {
        if let Some(name) = self.symbols.objid_to_sym(obj) {
            out.push_str(name);
            return;
        }

        let kind = self.objects.object_kind(obj);
        let is_container = matches!(
            kind,
            ObjectKind::List(_) | ObjectKind::Vector(_) | ObjectKind::LookupTable { .. }
        );
        if is_container {
            if out.open.contains(&obj) {
                self.write_object_id(obj, out);
                return;
            }
            out.open.push(obj);
        }

        match kind {
            ObjectKind::String(s) => self.write_string(&s, out),
            ObjectKind::List(items) => self.write_list(&items, out),
            ObjectKind::BigNumber(Some(text)) => out.push_str(&text),
            ObjectKind::BigNumber(None) => {
                let _ = write!(out, "obj#{obj:x} (BigNumber)");
            }
            ObjectKind::Date(text) => {
                let _ = write!(out, "Date({text})");
            }
            ObjectKind::TimeZone(name) => {
                let _ = write!(out, "TimeZone({name})");
            }
            ObjectKind::FileName(path) => {
                let _ = write!(out, "FileName({path})");
            }
            ObjectKind::StringBuffer(s) => {
                self.write_object_id(obj, out);
                out.push(' ');
                self.write_string(&s, out);
            }
            ObjectKind::Vector(items) => {
                self.write_object_id(obj, out);
                out.push(' ');
                self.write_list(&items, out);
            }
            ObjectKind::LookupTable { entries, default } => {
                self.write_object_id(obj, out);
                out.push_str(" [");
                for (i, (key, val)) in entries.iter().enumerate() {
                    if out.is_full() {
                        break;
                    }
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_value(key, out);
                    out.push_str("->");
                    self.write_value(val, out);
                }
                if !default.is_nil() {
                    if !entries.is_empty() {
                        out.push(',');
                    }
                    out.push_str("*->");
                    self.write_value(&default, out);
                }
                out.push(']');
            }
            ObjectKind::Pattern(source) => {
                self.write_object_id(obj, out);
                if let Some(src) = source {
                    out.push(' ');
                    self.write_string(&src, out);
                }
            }
            ObjectKind::Plain | ObjectKind::AnonFn => self.write_object_id(obj, out),
        }

        if is_container {
            out.open.pop();
        }
    }

    /// Formats a value in the `#__` notation the expression compiler reads
    /// back.
    pub fn format_special(&self, value: &Value) -> String {
        let mut out = Sink::new(FORMAT_CEILING.saturating_add(1));
        self.write_special(value, &mut out);
        out.finish(FORMAT_CEILING)
    }

    fn write_special(&self, value: &Value, out: &mut Sink) {
        if out.is_full() {
            return;
        }
        let _ = match value {
            Value::Nil => write!(out, "nil"),
            Value::True => write!(out, "true"),
            Value::Int(i) => write!(out, "{i}"),
            Value::Obj(obj) => write!(out, "#__obj {}", obj.0),
            Value::Prop(prop) => write!(out, "#__prop {}", prop.0),
            Value::FuncPtr(addr) => write!(out, "#__func {addr}"),
            Value::Enum(val) => write!(out, "#__enum {val}"),
            Value::BifPtr(bif) => write!(out, "#__bifptr {} {}", bif.set, bif.index),
            Value::Str(s) => {
                self.write_string(s, out);
                Ok(())
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.write_special(item, out);
                }
                out.push(']');
                Ok(())
            }
            Value::Empty | Value::CodeOfs(_) => write!(out, "#__invalid"),
        };
    }

    /// Returns true if the value has children a UI can expand.
    pub fn is_openable(&self, value: &Value) -> bool {
        match value {
            Value::List(_) => true,
            Value::Obj(obj) => match self.objects.object_kind(*obj) {
                ObjectKind::List(_) | ObjectKind::Vector(_) | ObjectKind::LookupTable { .. } => true,
                _ => self.objects.provides_props(*obj),
            },
            _ => false,
        }
    }

    /// Reports the children of a container value.
    ///
    /// `cb` receives the text of each child and its relation to the parent
    /// expression: `""` to append the text directly, `"."` to join it as a
    /// property, or a whole child expression starting with `!`.
    pub fn enum_aggregate<F: FnMut(&str, &str)>(&self, value: &Value, mut cb: F) {
        let count = match value {
            Value::List(items) => Some(items.len()),
            Value::Obj(obj) => match self.objects.object_kind(*obj) {
                ObjectKind::List(items) | ObjectKind::Vector(items) => Some(items.len()),
                ObjectKind::LookupTable { entries, default } => {
                    for (key, _) in &entries {
                        let text = format!("[{}]", self.format_truncated(key, KEY_TEXT_LIMIT));
                        let relation = format!("![{}]", self.format_special(key));
                        cb(&text, &relation);
                    }
                    if !default.is_nil() {
                        cb("*", "!.getDefaultValue()");
                    }
                    None
                }
                _ => {
                    if self.objects.provides_props(*obj) {
                        self.enum_object_props(*obj, &mut cb);
                    }
                    None
                }
            },
            _ => None,
        };

        if let Some(count) = count {
            for i in 1..=count {
                cb(&format!("[{i}]"), "");
            }
        }
    }

    /// Reports the named, non-overridden data properties of an object.
    fn enum_object_props<F: FnMut(&str, &str)>(&self, obj: ObjId, cb: &mut F) {
        for entry in self.objects.enum_props(obj) {
            // an inherited copy the object overrides is not visible on it
            if let Some(src) = self.objects.prop_source(obj, entry.prop) {
                if src != entry.defined_in {
                    continue;
                }
            }
            let Some(name) = self.symbols.propid_to_sym(entry.prop) else {
                continue;
            };
            let shown = matches!(
                entry.value,
                Value::Nil
                    | Value::True
                    | Value::Obj(_)
                    | Value::Prop(_)
                    | Value::Int(_)
                    | Value::Enum(_)
                    | Value::Str(_)
                    | Value::List(_)
                    | Value::FuncPtr(_)
                    | Value::BifPtr(_)
            );
            if shown {
                cb(name, ".");
            }
        }
    }
}

/// Cuts `text` to at most `limit` bytes, marking the cut with `...`.
pub(crate) fn truncate(text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    cut_with_ellipsis(text, limit)
}

fn cut_with_ellipsis(mut text: String, limit: usize) -> String {
    let mut cut = limit.saturating_sub(ELLIPSIS.len()).min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(&ELLIPSIS[..limit.min(ELLIPSIS.len())]);
    text
}
