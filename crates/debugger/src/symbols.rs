//! Symbol tables.
//!
//! The global table maps source-level names to program entities and back.
//! Reverse lookups are keyed by the numeric identity of the entity (object
//! id, property id, function address, enumerator, built-in slot), never by a
//! derived string. [`LocalScope`] resolves names against the lexical frames
//! of a suspended method.

use crate::debug_table::{DebugFrame, DebugTable, LocalKind};
use crate::value::{BifId, CodeAddr, ObjId, PropId};
use hashbrown::HashMap;

/// A global program symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalSymbol {
    Object(ObjId),
    Property(PropId),
    Function(CodeAddr),
    Enum(u32),
    Builtin(BifId),
}

/// Global symbols and their reverse maps.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    globals: HashMap<String, GlobalSymbol>,
    objects: HashMap<ObjId, String>,
    properties: HashMap<PropId, String>,
    functions: HashMap<CodeAddr, String>,
    enums: HashMap<u32, String>,
    builtins: HashMap<u32, String>,
    /// Object symbol name -> the object that modifies it
    modified_by: HashMap<String, ObjId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global symbol and its reverse mapping.
    pub fn add<S: Into<String>>(&mut self, name: S, sym: GlobalSymbol) {
        let name = name.into();
        match sym {
            GlobalSymbol::Object(id) => {
                self.objects.insert(id, name.clone());
            }
            GlobalSymbol::Property(id) => {
                self.properties.insert(id, name.clone());
            }
            GlobalSymbol::Function(addr) => {
                self.functions.insert(addr, name.clone());
            }
            GlobalSymbol::Enum(val) => {
                self.enums.insert(val, name.clone());
            }
            GlobalSymbol::Builtin(bif) => {
                self.builtins.insert(bif.key(), name.clone());
            }
        }
        self.globals.insert(name, sym);
    }

    pub fn add_object<S: Into<String>>(&mut self, name: S, id: ObjId) {
        self.add(name, GlobalSymbol::Object(id));
    }

    pub fn add_property<S: Into<String>>(&mut self, name: S, id: PropId) {
        self.add(name, GlobalSymbol::Property(id));
    }

    pub fn add_function<S: Into<String>>(&mut self, name: S, entry: CodeAddr) {
        self.add(name, GlobalSymbol::Function(entry));
    }

    pub fn add_enum<S: Into<String>>(&mut self, name: S, value: u32) {
        self.add(name, GlobalSymbol::Enum(value));
    }

    pub fn add_builtin<S: Into<String>>(&mut self, name: S, bif: BifId) {
        self.add(name, GlobalSymbol::Builtin(bif));
    }

    /// Records that object symbol `name` was replaced by `modifier` through
    /// a `modify` statement.
    pub fn set_modifying_object<S: Into<String>>(&mut self, name: S, modifier: ObjId) {
        self.modified_by.insert(name.into(), modifier);
    }

    /// Returns true if any global symbols are loaded.
    pub fn has_symbols(&self) -> bool {
        !self.globals.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn lookup(&self, name: &str) -> Option<GlobalSymbol> {
        self.globals.get(name).copied()
    }

    pub fn objid_to_sym(&self, id: ObjId) -> Option<&str> {
        self.objects.get(&id).map(String::as_str)
    }

    pub fn propid_to_sym(&self, id: PropId) -> Option<&str> {
        self.properties.get(&id).map(String::as_str)
    }

    pub fn funcaddr_to_sym(&self, addr: CodeAddr) -> Option<&str> {
        self.functions.get(&addr).map(String::as_str)
    }

    pub fn enum_to_sym(&self, value: u32) -> Option<&str> {
        self.enums.get(&value).map(String::as_str)
    }

    pub fn bif_to_sym(&self, bif: BifId) -> Option<&str> {
        self.builtins.get(&bif.key()).map(String::as_str)
    }

    /// Follows the chain of modifying objects from `name` to the name used
    /// in the source code. Stops at the last name that resolves.
    pub fn modifying_symbol<'a>(&'a self, name: &'a str) -> &'a str {
        let mut cur = name;
        // a chain can't be longer than the number of modified symbols
        for _ in 0..=self.modified_by.len() {
            let is_object = matches!(self.lookup(cur), Some(GlobalSymbol::Object(_)));
            let next = match self.modified_by.get(cur) {
                Some(modifier) if is_object => self.objid_to_sym(*modifier),
                _ => None,
            };
            match next {
                Some(next) => cur = next,
                None => break,
            }
        }
        cur
    }

    /// Names the function whose code starts at `entry`. Dynamic code objects
    /// are named by their object symbol.
    pub fn function_entry_symbol(&self, entry: CodeAddr, code_obj: Option<ObjId>) -> Option<String> {
        if entry == 0 {
            return None;
        }
        let name = match code_obj {
            Some(obj) => self
                .objid_to_sym(obj)
                .map(str::to_string)
                .unwrap_or_else(|| format!("DynamicFunc#{obj:x}")),
            None => self
                .funcaddr_to_sym(entry)
                .map(str::to_string)
                .unwrap_or_else(|| format!("func#{entry:x}")),
        };
        Some(name)
    }
}

/// A resolved local symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSymbol {
    pub kind: LocalKind,
    /// Stack level the generated code must address
    pub level: usize,
}

/// The lexical scope of a method suspended at some stack level.
#[derive(Debug, Clone, Copy)]
pub struct LocalScope<'a> {
    pub table: &'a DebugTable,
    /// Innermost frame; 0 means no local scope
    pub frame_id: u16,
    pub stack_level: usize,
}

impl<'a> LocalScope<'a> {
    pub fn new(table: &'a DebugTable, frame_id: u16, stack_level: usize) -> Self {
        Self {
            table,
            frame_id,
            stack_level,
        }
    }

    /// Finds `name`, searching from the innermost frame outward.
    pub fn find_symbol(&self, name: &str) -> Option<LocalSymbol> {
        self.frames()
            .flat_map(|frame| frame.symbols.iter())
            .find(|sym| sym.name == name)
            .map(|sym| LocalSymbol {
                kind: sym.kind,
                level: self.stack_level,
            })
    }

    /// Iterates the visible frames, innermost first.
    pub fn frames(&self) -> impl Iterator<Item = &'a DebugFrame> {
        self.table.frame_chain(self.frame_id)
    }
}
