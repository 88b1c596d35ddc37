//! Contracts between the debugger and its collaborators.
//!
//! The debugger does not own the interpreter, the object system or the user
//! interface. It reaches them through the traits in this module:
//!
//! - [`VmHost`]: the suspended virtual machine (frames, code, calls, registers).
//! - [`ObjectInspector`]: read-only questions about objects, for formatting.
//! - [`DebugUi`]: the command loop that runs while execution is suspended.

use crate::debugger::DebugSession;
use crate::error::{ErrorCode, RuntimeError};
use crate::value::{BifId, CodeAddr, ObjId, PropId, Value};

/// Describes a native caller that re-entered the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCaller {
    /// A caller the VM cannot describe.
    System,

    /// A built-in function.
    Builtin { bif: BifId, args: Vec<Value> },

    /// A method of an intrinsic class. `class_obj` is the class object when
    /// the metaclass is registered; `prop` is the property the method is
    /// exposed as.
    IntrinsicMethod {
        class_obj: Option<ObjId>,
        self_value: Value,
        prop: Option<PropId>,
        args: Vec<Value>,
    },
}

/// One entry of the call stack, as seen from the debugger.
///
/// A bytecode frame has a non-zero `entry` and `pc`. An entry with `pc == 0`
/// stands for native code that called back into the interpreter; `native`
/// then tells who that caller was.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackFrame {
    /// Entry point of the frame's method
    pub entry: CodeAddr,

    /// Address of the next instruction to run in this frame: the current
    /// instruction at level 0, the return address at deeper levels
    pub pc: CodeAddr,

    pub self_obj: Option<ObjId>,
    pub defining_obj: Option<ObjId>,
    pub target_prop: Option<PropId>,
    pub orig_target_obj: Option<ObjId>,

    /// Positional arguments, first argument first
    pub args: Vec<Value>,

    /// Named arguments in source order
    pub named_args: Vec<(String, Value)>,

    pub native: Option<NativeCaller>,
}

impl StackFrame {
    /// Returns true for a native caller entry.
    pub fn is_native(&self) -> bool {
        self.pc == 0
    }
}

/// The implicit context a compiled unit runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallContext {
    pub self_obj: Option<ObjId>,
    pub target_prop: Option<PropId>,
    pub orig_target_obj: Option<ObjId>,
    pub defining_obj: Option<ObjId>,
}

/// A snapshot of the interpreter's call and value stacks, taken before a
/// nested evaluation and restored after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunContext {
    pub frame_depth: usize,
    pub stack_depth: usize,
}

/// A property of an object, as reported by [`ObjectInspector::enum_props`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropEntry {
    pub prop: PropId,
    pub value: Value,
    /// The object in the inheritance tree that defines this copy
    pub defined_in: ObjId,
}

/// What the formatter needs to know about an object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectKind {
    /// An ordinary object.
    Plain,
    /// An anonymous function object.
    AnonFn,
    /// A string object.
    String(String),
    /// A list object.
    List(Vec<Value>),
    /// A vector.
    Vector(Vec<Value>),
    /// A lookup table; `default` is nil when the table has none.
    LookupTable {
        entries: Vec<(Value, Value)>,
        default: Value,
    },
    /// A string buffer.
    StringBuffer(String),
    /// A BigNumber, with its text if it can be rendered.
    BigNumber(Option<String>),
    /// A regular expression pattern, with its source text if known.
    Pattern(Option<String>),
    /// A date, already formatted.
    Date(String),
    /// A time zone name.
    TimeZone(String),
    /// A file name path.
    FileName(String),
}

/// Read-only object queries.
pub trait ObjectInspector {
    /// Classifies an object.
    fn object_kind(&self, obj: ObjId) -> ObjectKind;

    /// Gets the first superclass of an object.
    fn superclass(&self, obj: ObjId) -> Option<ObjId>;

    /// Lists every property throughout the object's inheritance tree.
    fn enum_props(&self, obj: ObjId) -> Vec<PropEntry>;

    /// Finds the object that supplies `prop` when looked up on `obj`.
    fn prop_source(&self, obj: ObjId, prop: PropId) -> Option<ObjId>;

    /// Returns true if the object exposes properties worth browsing.
    fn provides_props(&self, obj: ObjId) -> bool {
        matches!(self.object_kind(obj), ObjectKind::Plain)
    }

    /// The runtime's value equality.
    fn values_equal(&self, a: &Value, b: &Value) -> bool {
        a == b
    }
}

/// Byte access to the code pool, used to patch breakpoint traps.
pub trait CodeMemory {
    /// Reads a byte of code. `None` if the address is not mapped.
    fn read_code_byte(&self, addr: CodeAddr) -> Option<u8>;

    /// Writes a byte of code. Returns false if the address is not mapped.
    fn write_code_byte(&mut self, addr: CodeAddr, byte: u8) -> bool;
}

/// The suspended virtual machine.
///
/// Stack levels count from the frame the debugger stopped in (level 0)
/// outward. Compiled units address frames by these levels, so a host must
/// not shift them while a unit runs.
pub trait VmHost: CodeMemory {
    /// Number of entries on the call stack.
    fn frame_depth(&self) -> usize;

    /// Describes the frame at `level`.
    fn stack_frame(&self, level: usize) -> Option<StackFrame>;

    fn self_at_level(&self, level: usize) -> Option<ObjId> {
        self.stack_frame(level).and_then(|f| f.self_obj)
    }

    fn target_prop_at_level(&self, level: usize) -> Option<PropId> {
        self.stack_frame(level).and_then(|f| f.target_prop)
    }

    fn orig_target_obj_at_level(&self, level: usize) -> Option<ObjId> {
        self.stack_frame(level).and_then(|f| f.orig_target_obj)
    }

    fn defining_obj_at_level(&self, level: usize) -> Option<ObjId> {
        self.stack_frame(level).and_then(|f| f.defining_obj)
    }

    fn argc_at_level(&self, level: usize) -> usize {
        self.stack_frame(level).map(|f| f.args.len()).unwrap_or(0)
    }

    fn param_at_level(&self, level: usize, idx: u16) -> Option<Value> {
        self.stack_frame(level)
            .and_then(|f| f.args.get(idx as usize).cloned())
    }

    fn local_at_level(&self, level: usize, idx: u16) -> Option<Value>;

    fn set_local_at_level(&mut self, level: usize, idx: u16, value: Value) -> Result<(), RuntimeError>;

    fn set_param_at_level(&mut self, level: usize, idx: u16, value: Value) -> Result<(), RuntimeError>;

    fn context_local_at_level(&self, level: usize, var: u16, arr_idx: u16) -> Option<Value>;

    fn set_context_local_at_level(
        &mut self,
        level: usize,
        var: u16,
        arr_idx: u16,
        value: Value,
    ) -> Result<(), RuntimeError>;

    /// Copies a compiled unit into dynamic code and returns its address.
    fn alloc_dynamic_code(&mut self, code: &[u8]) -> Option<CodeAddr>;

    /// Releases a unit allocated with [`VmHost::alloc_dynamic_code`].
    fn free_dynamic_code(&mut self, addr: CodeAddr);

    /// The code object owning a dynamically compiled function, if `entry`
    /// belongs to one.
    fn dynamic_code_object(&self, _entry: CodeAddr) -> Option<ObjId> {
        None
    }

    /// Runs code at `addr` through the interpreter's normal call path.
    fn call_code(&mut self, addr: CodeAddr, ctx: &CallContext) -> Result<Value, RuntimeError>;

    /// Evaluates `target.prop(args)`. With `data_only` the lookup must fail
    /// with [`ErrorCode::BAD_SPEC_EVAL`] rather than run a method.
    fn get_prop(
        &mut self,
        target: &Value,
        prop: PropId,
        args: &[Value],
        data_only: bool,
    ) -> Result<Value, RuntimeError>;

    fn set_prop(&mut self, obj: ObjId, prop: PropId, value: Value) -> Result<(), RuntimeError>;

    fn call_function(&mut self, entry: CodeAddr, args: &[Value]) -> Result<Value, RuntimeError>;

    fn call_builtin(&mut self, bif: BifId, args: &[Value]) -> Result<Value, RuntimeError>;

    /// Indexes a value the expression engine can't index itself.
    fn index_value(&mut self, container: &Value, _index: &Value) -> Result<Value, RuntimeError> {
        Err(RuntimeError::vm(
            ErrorCode::CANNOT_INDEX_TYPE,
            format!("cannot index a value of type {:?}", container.value_type()),
        ))
    }

    /// Stores through an index; returns the updated container.
    fn set_index_value(
        &mut self,
        container: &Value,
        _index: &Value,
        _value: Value,
    ) -> Result<Value, RuntimeError> {
        Err(RuntimeError::vm(
            ErrorCode::CANNOT_INDEX_TYPE,
            format!("cannot index a value of type {:?}", container.value_type()),
        ))
    }

    /// The result register.
    fn r0(&self) -> Value;

    fn set_r0(&mut self, value: Value);

    fn save_context(&self) -> RunContext;

    fn restore_context(&mut self, ctx: RunContext);

    /// Hands the reserved stack margin to the debugger after a stack
    /// overflow. Returns true if a reserve was released.
    fn release_stack_reserve(&mut self) -> bool {
        false
    }

    /// Takes back the stack margin released by
    /// [`VmHost::release_stack_reserve`].
    fn recover_stack_reserve(&mut self) {}

    fn objects(&self) -> &dyn ObjectInspector;
}

/// The user interface that runs while execution is suspended.
pub trait DebugUi {
    /// Runs the command loop. Blocks until the user resumes execution.
    ///
    /// `bp_number` is the 1-based number of the breakpoint that caused the
    /// stop, or 0. The UI may move the resume point by writing `pc`.
    fn cmd_loop(
        &mut self,
        session: &mut DebugSession<'_>,
        bp_number: usize,
        error: Option<ErrorCode>,
        pc: &mut CodeAddr,
    );
}
