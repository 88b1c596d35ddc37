//! Shared fixtures: a scripted VM, a recording UI and a small program with
//! two methods and debug records.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use vmdbg_debugger::{
    BifId, CallContext, CodeAddr, CodeMemory, DebugSession, DebugTable, DebugUi, Debugger, DebuggerSettings,
    ErrorCode, ExpressionEngine, LocalKind, ObjId, ObjectInspector, ObjectKind, OpCode, PropEntry, PropId,
    RunContext, RuntimeError, StackFrame, Value, VmHost,
};

/// Byte the program code is filled with. Never the trap opcode.
pub const FILLER: u8 = 0x5A;

pub const CODE_SIZE: usize = 0x1000;
pub const DYNAMIC_BASE: CodeAddr = 0x0010_0000;

pub const MAIN: CodeAddr = 0x100;
pub const HELPER: CodeAddr = 0x200;

pub const OBJ: ObjId = ObjId(10);
pub const COUNT: PropId = PropId(3);
pub const RUN: PropId = PropId(4);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A frame and its local slots.
#[derive(Debug, Clone)]
pub struct MockFrame {
    pub frame: StackFrame,
    pub locals: Vec<Value>,
}

/// A VM whose state the tests script directly.
pub struct MockVm {
    pub code: Vec<u8>,
    /// Index is the stack level; 0 is the innermost frame
    pub frames: Vec<MockFrame>,
    pub units: BTreeMap<CodeAddr, Vec<u8>>,
    next_unit: CodeAddr,
    pub max_units: usize,
    pub r0: Value,
    pub context: RunContext,
    pub props: HashMap<(ObjId, PropId), Value>,
    pub methods: HashSet<(ObjId, PropId)>,
    pub kinds: HashMap<ObjId, ObjectKind>,
    pub code_calls: usize,
    pub reserve_released: bool,
    engine: ExpressionEngine,
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVm {
    pub fn new() -> Self {
        Self {
            code: vec![FILLER; CODE_SIZE],
            frames: Vec::new(),
            units: BTreeMap::new(),
            next_unit: DYNAMIC_BASE,
            max_units: 64,
            r0: Value::Int(42),
            context: RunContext {
                frame_depth: 1,
                stack_depth: 4,
            },
            props: HashMap::new(),
            methods: HashSet::new(),
            kinds: HashMap::new(),
            code_calls: 0,
            reserve_released: false,
            engine: ExpressionEngine::default(),
        }
    }

    /// Pushes a bytecode frame as the new innermost level.
    pub fn enter(&mut self, entry: CodeAddr, args: Vec<Value>, locals: Vec<Value>) {
        let frame = StackFrame {
            entry,
            pc: entry,
            args,
            ..StackFrame::default()
        };
        self.frames.insert(0, MockFrame { frame, locals });
    }

    /// Pushes a method frame of `self_obj.prop`.
    pub fn enter_method(&mut self, entry: CodeAddr, self_obj: ObjId, prop: PropId, args: Vec<Value>, locals: Vec<Value>) {
        self.enter(entry, args, locals);
        let frame = &mut self.frames[0].frame;
        frame.self_obj = Some(self_obj);
        frame.defining_obj = Some(self_obj);
        frame.orig_target_obj = Some(self_obj);
        frame.target_prop = Some(prop);
    }

    pub fn leave(&mut self) {
        if !self.frames.is_empty() {
            self.frames.remove(0);
        }
    }

    pub fn set_pc(&mut self, pc: CodeAddr) {
        if let Some(top) = self.frames.first_mut() {
            top.frame.pc = pc;
        }
    }

    pub fn entry(&self) -> CodeAddr {
        self.frames.first().map(|f| f.frame.entry).unwrap_or(0)
    }

    pub fn set_local(&mut self, level: usize, idx: usize, value: Value) {
        self.frames[level].locals[idx] = value;
    }

    pub fn code_at(&self, addr: CodeAddr) -> u8 {
        self.code[addr as usize]
    }

    fn unit_containing(&self, addr: CodeAddr) -> Option<(CodeAddr, &Vec<u8>)> {
        let (base, code) = self.units.range(..=addr).next_back()?;
        ((addr - base) < code.len() as u32).then_some((*base, code))
    }

    fn no_local() -> RuntimeError {
        RuntimeError::vm(ErrorCode::INDEX_OUT_OF_RANGE, "no such variable")
    }
}

impl CodeMemory for MockVm {
    fn read_code_byte(&self, addr: CodeAddr) -> Option<u8> {
        if (addr as usize) < self.code.len() {
            return Some(self.code[addr as usize]);
        }
        let (base, code) = self.unit_containing(addr)?;
        code.get((addr - base) as usize).copied()
    }

    fn write_code_byte(&mut self, addr: CodeAddr, byte: u8) -> bool {
        match self.code.get_mut(addr as usize) {
            Some(slot) => {
                *slot = byte;
                true
            }
            None => false,
        }
    }
}

impl ObjectInspector for MockVm {
    fn object_kind(&self, obj: ObjId) -> ObjectKind {
        self.kinds.get(&obj).cloned().unwrap_or(ObjectKind::Plain)
    }

    fn superclass(&self, _obj: ObjId) -> Option<ObjId> {
        None
    }

    fn enum_props(&self, obj: ObjId) -> Vec<PropEntry> {
        let mut props: Vec<PropEntry> = self
            .props
            .iter()
            .filter(|((o, _), _)| *o == obj)
            .map(|((o, p), v)| PropEntry {
                prop: *p,
                value: v.clone(),
                defined_in: *o,
            })
            .collect();
        props.sort_by_key(|e| e.prop);
        props
    }

    fn prop_source(&self, obj: ObjId, prop: PropId) -> Option<ObjId> {
        self.props.contains_key(&(obj, prop)).then_some(obj)
    }
}

impl VmHost for MockVm {
    fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    fn stack_frame(&self, level: usize) -> Option<StackFrame> {
        self.frames.get(level).map(|f| f.frame.clone())
    }

    fn local_at_level(&self, level: usize, idx: u16) -> Option<Value> {
        self.frames.get(level)?.locals.get(idx as usize).cloned()
    }

    fn set_local_at_level(&mut self, level: usize, idx: u16, value: Value) -> Result<(), RuntimeError> {
        let slot = self
            .frames
            .get_mut(level)
            .and_then(|f| f.locals.get_mut(idx as usize))
            .ok_or_else(Self::no_local)?;
        *slot = value;
        Ok(())
    }

    fn set_param_at_level(&mut self, level: usize, idx: u16, value: Value) -> Result<(), RuntimeError> {
        let slot = self
            .frames
            .get_mut(level)
            .and_then(|f| f.frame.args.get_mut(idx as usize))
            .ok_or_else(Self::no_local)?;
        *slot = value;
        Ok(())
    }

    fn context_local_at_level(&self, _level: usize, _var: u16, _arr_idx: u16) -> Option<Value> {
        None
    }

    fn set_context_local_at_level(
        &mut self,
        _level: usize,
        _var: u16,
        _arr_idx: u16,
        _value: Value,
    ) -> Result<(), RuntimeError> {
        Err(Self::no_local())
    }

    fn alloc_dynamic_code(&mut self, code: &[u8]) -> Option<CodeAddr> {
        if self.units.len() >= self.max_units {
            return None;
        }
        let addr = self.next_unit;
        self.next_unit += (code.len() as u32 + 0xFF) & !0xFF;
        self.units.insert(addr, code.to_vec());
        Some(addr)
    }

    fn free_dynamic_code(&mut self, addr: CodeAddr) {
        self.units.remove(&addr);
    }

    fn call_code(&mut self, addr: CodeAddr, ctx: &CallContext) -> Result<Value, RuntimeError> {
        self.code_calls += 1;
        let code = self
            .units
            .get(&addr)
            .cloned()
            .ok_or_else(|| RuntimeError::vm(ErrorCode::INVALID_OPCODE, "no code at address"))?;

        // the interpreter pushes a frame and clobbers R0 on the way
        self.context.frame_depth += 1;
        self.context.stack_depth += 3;
        self.r0 = Value::Nil;

        let engine = self.engine.clone();
        let result = engine.execute(self, &code, ctx);
        if let Ok(value) = &result {
            // an error leaves the frame for restore_context to unwind
            self.context.frame_depth -= 1;
            self.context.stack_depth -= 3;
            self.r0 = value.clone();
        }
        result
    }

    fn get_prop(&mut self, target: &Value, prop: PropId, _args: &[Value], data_only: bool) -> Result<Value, RuntimeError> {
        let obj = target
            .as_obj()
            .ok_or_else(|| RuntimeError::vm(ErrorCode::OBJ_VAL_REQD, "object value required"))?;
        if data_only && self.methods.contains(&(obj, prop)) {
            return Err(RuntimeError::bad_speculation());
        }
        Ok(self.props.get(&(obj, prop)).cloned().unwrap_or(Value::Nil))
    }

    fn set_prop(&mut self, obj: ObjId, prop: PropId, value: Value) -> Result<(), RuntimeError> {
        self.props.insert((obj, prop), value);
        Ok(())
    }

    fn call_function(&mut self, _entry: CodeAddr, args: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::Int(args.len() as i32))
    }

    fn call_builtin(&mut self, _bif: BifId, _args: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::Nil)
    }

    fn r0(&self) -> Value {
        self.r0.clone()
    }

    fn set_r0(&mut self, value: Value) {
        self.r0 = value;
    }

    fn save_context(&self) -> RunContext {
        self.context
    }

    fn restore_context(&mut self, ctx: RunContext) {
        self.context = ctx;
    }

    fn release_stack_reserve(&mut self) -> bool {
        self.reserve_released = true;
        true
    }

    fn recover_stack_reserve(&mut self) {
        self.reserve_released = false;
    }

    fn objects(&self) -> &dyn ObjectInspector {
        self
    }
}

/// What the UI saw at one stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub pc: CodeAddr,
    pub bp: usize,
    pub error: Option<ErrorCode>,
    /// The code byte at `pc` while the session was open
    pub code_at_pc: Option<u8>,
}

type StopAction = Box<dyn FnMut(&mut DebugSession<'_>, &mut CodeAddr)>;

/// A UI that records each stop and optionally runs a scripted action.
#[derive(Default)]
pub struct RecordingUi {
    pub stops: Vec<Stop>,
    pub action: Option<StopAction>,
}

impl RecordingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action<F>(action: F) -> Self
    where
        F: FnMut(&mut DebugSession<'_>, &mut CodeAddr) + 'static,
    {
        Self {
            stops: Vec::new(),
            action: Some(Box::new(action)),
        }
    }

    pub fn stop_pcs(&self) -> Vec<CodeAddr> {
        self.stops.iter().map(|s| s.pc).collect()
    }
}

impl DebugUi for RecordingUi {
    fn cmd_loop(&mut self, session: &mut DebugSession<'_>, bp_number: usize, error: Option<ErrorCode>, pc: &mut CodeAddr) {
        self.stops.push(Stop {
            pc: *pc,
            bp: bp_number,
            error,
            code_at_pc: session.host().read_code_byte(*pc),
        });
        if let Some(action) = self.action.as_mut() {
            action(session, pc);
        }
    }
}

/// Runs the single-step hook the way the interpreter would before the
/// instruction at `pc` of the innermost frame. Returns the resume address.
pub fn step_at(debugger: &mut Debugger, vm: &mut MockVm, ui: &mut RecordingUi, pc: CodeAddr) -> CodeAddr {
    step_with_error(debugger, vm, ui, pc, None)
}

pub fn step_with_error(
    debugger: &mut Debugger,
    vm: &mut MockVm,
    ui: &mut RecordingUi,
    pc: CodeAddr,
    error: Option<ErrorCode>,
) -> CodeAddr {
    vm.set_pc(pc);
    let entry = vm.entry();
    let hit_bp = vm.read_code_byte(pc) == Some(OpCode::BP as u8);
    let mut pc = pc;
    debugger.step(vm, ui, &mut pc, entry, hit_bp, error);
    pc
}

/// Builds a program with two methods:
///
/// - `main` at 0x100, run as `obj.run(a)`: lines 10, 11, 12 (two
///   statements at 0x108 and 0x10C), 13 and 14, with param `a` and locals
///   `x` and `y`
/// - `helper` at 0x200: lines 20 and 21, with param `n`
///
/// The VM starts inside `main` with `a = 7`, `x = 1` and `y = 2`.
pub fn program() -> (Debugger, MockVm) {
    program_with(DebuggerSettings::default())
}

pub fn program_with(settings: DebuggerSettings) -> (Debugger, MockVm) {
    init_logging();
    let mut debugger = Debugger::new(settings);

    let symbols = debugger.symbols_mut();
    symbols.add_object("obj", OBJ);
    symbols.add_property("count", COUNT);
    symbols.add_property("run", RUN);
    symbols.add_function("main", MAIN);
    symbols.add_function("helper", HELPER);

    let mut main = DebugTable::new(0x30);
    let frame = main.add_frame(0);
    main.add_symbol(frame, "a", LocalKind::Param { var: 0 })
        .add_symbol(frame, "x", LocalKind::Local { var: 0 })
        .add_symbol(frame, "y", LocalKind::Local { var: 1 });
    main.add_line(0x00, 0, 10, frame)
        .add_line(0x04, 0, 11, frame)
        .add_line(0x08, 0, 12, frame)
        .add_line(0x0C, 0, 12, frame)
        .add_line(0x10, 0, 13, frame)
        .add_line(0x20, 0, 14, frame);
    debugger.add_debug_table(MAIN, main);

    let mut helper = DebugTable::new(0x20);
    let frame = helper.add_frame(0);
    helper.add_symbol(frame, "n", LocalKind::Param { var: 0 });
    helper.add_line(0x00, 0, 20, frame).add_line(0x08, 0, 21, frame);
    debugger.add_debug_table(HELPER, helper);

    debugger.methods_mut().load([MAIN, HELPER]);

    let file = debugger.sources_mut().add_entry("src/main.t", 0, true);
    for (line, addr) in [(10, 0x100), (11, 0x104), (12, 0x108), (13, 0x110), (14, 0x120), (20, 0x200), (21, 0x208)] {
        file.add_line(line, addr);
    }

    let mut vm = MockVm::new();
    vm.enter_method(MAIN, OBJ, RUN, vec![Value::Int(7)], vec![Value::Int(1), Value::Int(2)]);
    vm.props.insert((OBJ, COUNT), Value::Int(0));

    (debugger, vm)
}
