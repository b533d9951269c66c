//! Bytecode operation codes.
//!
//! This module defines the instruction set emitted by the compiler and
//! consumed by the VM. The machine is register-based: every instruction
//! names its operand registers explicitly. Each opcode is a single byte;
//! operands follow inline. Register operands are one byte, constant-pool
//! indices, global indices, spill indices in wide forms, and jump offsets
//! are 16-bit big-endian.

use num_enum::TryFromPrimitive;

/// Bytecode operation codes.
///
/// Register bytes refer to the current frame's register file (0-254).
/// Jump offsets are signed 16-bit, relative to the end of the offset
/// operand itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Constants & Register Moves
    // =========================================================================
    /// r[dst] = constants[idx]. Operands: dst, u16 idx.
    LoadConst = 0,
    /// r[dst] = true. Operand: dst.
    LoadTrue,
    /// r[dst] = false. Operand: dst.
    LoadFalse,
    /// r[dst] = null. Operand: dst.
    LoadNull,
    /// r[dst] = undefined. Operand: dst.
    LoadUndefined,
    /// r[dst] = the Uninitialized marker (TDZ pre-initialization).
    /// Operand: dst.
    LoadUninitialized,
    /// r[dst] = r[src]. Operands: dst, src.
    Move,

    // =========================================================================
    // Arithmetic & Bitwise
    // =========================================================================
    /// r[dst] = r[a] + r[b] (numeric add or string concat).
    Add,
    /// r[dst] = r[a] - r[b].
    Sub,
    /// r[dst] = r[a] * r[b].
    Mul,
    /// r[dst] = r[a] / r[b].
    Div,
    /// r[dst] = r[a] % r[b].
    Mod,
    /// r[dst] = r[a] ** r[b].
    Exp,
    /// r[dst] = r[a] & r[b].
    BitAnd,
    /// r[dst] = r[a] | r[b].
    BitOr,
    /// r[dst] = r[a] ^ r[b].
    BitXor,
    /// r[dst] = r[a] << r[b].
    Shl,
    /// r[dst] = r[a] >> r[b] (sign-propagating).
    Shr,
    /// r[dst] = r[a] >>> r[b] (zero-fill).
    Ushr,
    /// r[dst] = -r[src]. Operands: dst, src.
    Negate,
    /// r[dst] = ~r[src]. Operands: dst, src.
    BitNot,

    // =========================================================================
    // Comparisons & Tests
    // =========================================================================
    /// r[dst] = r[a] == r[b] (loose).
    Eq,
    /// r[dst] = r[a] != r[b] (loose).
    NotEq,
    /// r[dst] = r[a] === r[b].
    StrictEq,
    /// r[dst] = r[a] !== r[b].
    StrictNotEq,
    /// r[dst] = r[a] < r[b].
    Less,
    /// r[dst] = r[a] <= r[b].
    LessEq,
    /// r[dst] = r[a] > r[b].
    Greater,
    /// r[dst] = r[a] >= r[b].
    GreaterEq,
    /// r[dst] = r[a] in r[b].
    In,
    /// r[dst] = r[a] instanceof r[b].
    InstanceOf,
    /// r[dst] = !truthy(r[src]). Operands: dst, src.
    Not,
    /// r[dst] = r[src] is null or undefined. Operands: dst, src.
    IsNullish,
    /// r[dst] = typeof r[src] as a string. Operands: dst, src.
    TypeOf,

    // =========================================================================
    // Property & Index Access
    // =========================================================================
    /// r[dst] = r[obj][r[idx]]. Operands: dst, obj, idx.
    GetIndex,
    /// r[obj][r[idx]] = r[val]. Operands: obj, idx, val.
    SetIndex,
    /// r[dst] = r[obj].name. Operands: dst, obj, u16 name constant.
    GetProp,
    /// r[obj].name = r[val]. Operands: obj, u16 name constant, val.
    SetProp,
    /// r[dst] = r[obj].#name. Operands: dst, obj, u16 name constant.
    GetPrivateField,
    /// r[obj].#name = r[val]. Operands: obj, u16 name constant, val.
    SetPrivateField,
    /// r[dst] = delete r[obj][r[key]]. Operands: dst, obj, key.
    DeleteIndex,
    /// r[dst] = array of r[obj]'s enumerable own keys. Operands: dst, obj.
    GetPropKeys,

    // =========================================================================
    // Globals, Upvalues & Spill Slots
    // =========================================================================
    /// r[dst] = globals[idx]. Operands: dst, u16 global index.
    GetGlobal,
    /// globals[idx] = r[src]. Operands: u16 global index, src.
    SetGlobal,
    /// r[dst] = upvalues[idx]. Operands: dst, u8 upvalue index.
    LoadFree,
    /// upvalues[idx] = r[src]. Operands: u8 upvalue index, src.
    SetUpvalue,
    /// r[dst] = spill[idx]. Operands: dst, u8 spill index.
    LoadSpill,
    /// spill[idx] = r[src]. Operands: u8 spill index, src.
    StoreSpill,
    /// r[dst] = spill[idx]. Operands: dst, u16 spill index.
    LoadSpillWide,
    /// spill[idx] = r[src]. Operands: u16 spill index, src.
    StoreSpillWide,

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// pc += offset. Operand: i16 offset.
    Jump,
    /// pc += offset if r[cond] is falsey. Operands: cond, i16 offset.
    JumpIfFalse,
    /// pc += offset if r[cond] is null. Operands: cond, i16 offset.
    JumpIfNull,
    /// pc += offset if r[cond] is undefined. Operands: cond, i16 offset.
    JumpIfUndefined,
    /// pc += offset if r[cond] is null or undefined.
    /// Operands: cond, i16 offset.
    JumpIfNullish,
    /// Throw a ReferenceError if r[reg] is the Uninitialized marker.
    /// Operands: reg, u16 name constant (for the error message).
    CheckUninitialized,

    // =========================================================================
    // Closures & Calls
    // =========================================================================
    /// r[dst] = closure over constants[idx], capturing `count` upvalues.
    /// Operands: dst, u16 function constant, u8 count, then `count`
    /// capture descriptors (see [`CaptureTag`]).
    Closure,
    /// Wide form for more than 255 upvalues: count is u16.
    ClosureWide,
    /// r[callee] = r[callee](r[callee+1] .. r[callee+argc]).
    /// Operands: callee, u8 argc.
    Call,
    /// Method call: receiver in r[callee+1], args from r[callee+2].
    /// r[callee] = result. Operands: callee, u8 argc.
    CallMethod,
    /// Spread call: r[callee] = r[callee](...r[args_array]).
    /// Operands: callee, args-array register.
    CallSpread,
    /// Spread method call: receiver in r[callee+1], arguments spread from
    /// the args array. Operands: callee, args-array register.
    CallMethodSpread,
    /// Construct: r[callee] = new r[callee](r[callee+1] .. r[callee+argc]).
    /// Operands: callee, u8 argc.
    New,
    /// Construct with spread args collected into an array.
    /// Operands: callee, args-array register.
    NewSpread,
    /// Return r[src]. Operand: src.
    Return,
    /// Return undefined.
    ReturnUndefined,
    /// Throw r[src]. Operand: src.
    Throw,

    // =========================================================================
    // Objects & Arrays
    // =========================================================================
    /// r[dst] = {}. Operand: dst.
    NewObject,
    /// r[dst] = []. Operand: dst.
    NewArray,
    /// r[arr].push(r[val]). Operands: arr, val.
    ArrayAppend,
    /// r[arr].push(...r[src]) - spread an iterable into an array.
    /// Operands: arr, src.
    ArrayExtend,
    /// r[dst] = r[src].slice(start) - the tail of an array (rest element).
    /// Operands: dst, src, u8 start.
    ArrayRest,
    /// r[dst] = copy of r[src] without keys listed in r[exclude].
    /// Operands: dst, src, exclude (array of key strings).
    ObjectRest,
    /// Copy r[src]'s enumerable own properties onto r[dst] (object
    /// spread). Operands: dst, src.
    CopyProps,
    /// r[obj].[[Prototype]] = r[proto]. Operands: obj, proto.
    SetProto,
    /// r[dst] = r[obj].[[Prototype]]. Operands: dst, obj.
    GetProto,

    // =========================================================================
    // Modules
    // =========================================================================
    /// Ensure the module named by the path constant has been evaluated.
    /// Operand: u16 path constant.
    EvalModule,
    /// r[dst] = export `name` of module `path`.
    /// Operands: dst, u16 path constant, u16 name constant.
    GetModuleExport,
    /// r[dst] = namespace object for module `path`.
    /// Operands: dst, u16 path constant.
    CreateNamespace,
    /// r[dst] = parsed JSON module value. Operands: dst, u16 path constant.
    LoadJsonModule,
    /// r[dst] = promise for dynamic import of r[spec].
    /// Operands: dst, spec.
    DynamicImport,

    // =========================================================================
    // Frame Introspection
    // =========================================================================
    /// r[dst] = the arguments object. Operand: dst.
    GetArguments,
    /// r[dst] = this. Operand: dst.
    LoadThis,
    /// r[dst] = new.target. Operand: dst.
    LoadNewTarget,
    /// r[dst] = import.meta. Operand: dst.
    LoadImportMeta,

    // =========================================================================
    // Iteration Guards & Suspension
    // =========================================================================
    /// Throw a TypeError if r[reg] is not iterable. Operand: reg.
    TypeGuardIterable,
    /// Throw a TypeError if r[reg] (an iterator `return()` result) is not
    /// an object. Operand: reg.
    TypeGuardIteratorReturn,
    /// Suspend: yield r[val]; resume value lands in r[dst].
    /// Operands: dst, val.
    Yield,
    /// Suspend: await r[val]; resolved value lands in r[dst].
    /// Operands: dst, val.
    Await,

    // =========================================================================
    // With & Debugging
    // =========================================================================
    /// Push r[obj] onto the with-object stack. Operand: obj.
    PushWith,
    /// Pop the with-object stack.
    PopWith,
    /// r[dst] = property `name` resolved against the with stack, falling
    /// back to the global. Operands: dst, u16 name constant.
    GetWithProp,
    /// Store r[src] to `name` via the with stack.
    /// Operands: u16 name constant, src.
    SetWithProp,
    /// Debugger breakpoint marker.
    Debugger,
}

/// Capture descriptor tags that follow a [`OpCode::Closure`] instruction.
///
/// Each descriptor is the tag byte followed by a 1-byte index, or a 2-byte
/// big-endian index for the `*16` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum CaptureTag {
    /// Capture the enclosing frame's register `index`.
    FromRegister = 0,
    /// Capture the enclosing closure's upvalue `index`.
    FromUpvalue,
    /// Capture the enclosing frame's spill slot `index`.
    FromSpill,
    /// Wide spill-slot capture (u16 index).
    FromSpill16,
    /// Wide upvalue capture (u16 index).
    FromUpvalue16,
}

impl CaptureTag {
    /// Total descriptor size in bytes, including the tag byte.
    pub fn descriptor_size(self) -> usize {
        match self {
            CaptureTag::FromRegister | CaptureTag::FromUpvalue | CaptureTag::FromSpill => 2,
            CaptureTag::FromSpill16 | CaptureTag::FromUpvalue16 => 3,
        }
    }
}

impl OpCode {
    /// Convert a raw byte to an opcode.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        OpCode::try_from(byte).ok()
    }

    /// Fixed operand size in bytes.
    ///
    /// [`OpCode::Closure`] and [`OpCode::ClosureWide`] report only their
    /// fixed prefix (the capture descriptors are variable-length); chunk
    /// walkers handle the descriptor tail separately.
    pub fn operand_size(self) -> usize {
        use OpCode::*;
        match self {
            ReturnUndefined | PopWith | Debugger => 0,

            LoadTrue | LoadFalse | LoadNull | LoadUndefined | LoadUninitialized | Return
            | Throw | NewObject | NewArray | GetArguments | LoadThis | LoadNewTarget
            | LoadImportMeta | TypeGuardIterable | TypeGuardIteratorReturn | PushWith => 1,

            Move | Negate | BitNot | Not | IsNullish | TypeOf | LoadFree | SetUpvalue
            | LoadSpill | StoreSpill | Jump | Call | CallMethod | CallSpread | New | NewSpread
            | CallMethodSpread | ArrayAppend | ArrayExtend | CopyProps | SetProto | GetProto
            | GetPropKeys | DynamicImport | Yield | Await | EvalModule => 2,

            LoadConst | Add | Sub | Mul | Div | Mod | Exp | BitAnd | BitOr | BitXor | Shl
            | Shr | Ushr | Eq | NotEq | StrictEq | StrictNotEq | Less | LessEq | Greater
            | GreaterEq | In | InstanceOf | GetIndex | SetIndex | DeleteIndex | GetGlobal
            | SetGlobal | LoadSpillWide | StoreSpillWide | JumpIfFalse | JumpIfNull
            | JumpIfUndefined | JumpIfNullish | CheckUninitialized | CreateNamespace
            | LoadJsonModule | GetWithProp | SetWithProp | ArrayRest | ObjectRest => 3,

            GetProp | SetProp | GetPrivateField | SetPrivateField | Closure => 4,

            GetModuleExport | ClosureWide => 5,
        }
    }

    /// Whether this opcode's final two operand bytes are a patchable jump
    /// offset.
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::JumpIfNull
                | OpCode::JumpIfUndefined
                | OpCode::JumpIfNullish
        )
    }

    /// Human-readable mnemonic.
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            LoadConst => "LOAD_CONST",
            LoadTrue => "LOAD_TRUE",
            LoadFalse => "LOAD_FALSE",
            LoadNull => "LOAD_NULL",
            LoadUndefined => "LOAD_UNDEFINED",
            LoadUninitialized => "LOAD_UNINITIALIZED",
            Move => "MOVE",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            Exp => "EXP",
            BitAnd => "BIT_AND",
            BitOr => "BIT_OR",
            BitXor => "BIT_XOR",
            Shl => "SHL",
            Shr => "SHR",
            Ushr => "USHR",
            Negate => "NEGATE",
            BitNot => "BIT_NOT",
            Eq => "EQ",
            NotEq => "NOT_EQ",
            StrictEq => "STRICT_EQ",
            StrictNotEq => "STRICT_NOT_EQ",
            Less => "LESS",
            LessEq => "LESS_EQ",
            Greater => "GREATER",
            GreaterEq => "GREATER_EQ",
            In => "IN",
            InstanceOf => "INSTANCE_OF",
            Not => "NOT",
            IsNullish => "IS_NULLISH",
            TypeOf => "TYPE_OF",
            GetIndex => "GET_INDEX",
            SetIndex => "SET_INDEX",
            GetProp => "GET_PROP",
            SetProp => "SET_PROP",
            GetPrivateField => "GET_PRIVATE_FIELD",
            SetPrivateField => "SET_PRIVATE_FIELD",
            DeleteIndex => "DELETE_INDEX",
            GetPropKeys => "GET_PROP_KEYS",
            GetGlobal => "GET_GLOBAL",
            SetGlobal => "SET_GLOBAL",
            LoadFree => "LOAD_FREE",
            SetUpvalue => "SET_UPVALUE",
            LoadSpill => "LOAD_SPILL",
            StoreSpill => "STORE_SPILL",
            LoadSpillWide => "LOAD_SPILL_WIDE",
            StoreSpillWide => "STORE_SPILL_WIDE",
            Jump => "JUMP",
            JumpIfFalse => "JUMP_IF_FALSE",
            JumpIfNull => "JUMP_IF_NULL",
            JumpIfUndefined => "JUMP_IF_UNDEFINED",
            JumpIfNullish => "JUMP_IF_NULLISH",
            CheckUninitialized => "CHECK_UNINITIALIZED",
            Closure => "CLOSURE",
            ClosureWide => "CLOSURE_WIDE",
            Call => "CALL",
            CallMethod => "CALL_METHOD",
            CallSpread => "CALL_SPREAD",
            CallMethodSpread => "CALL_METHOD_SPREAD",
            New => "NEW",
            NewSpread => "NEW_SPREAD",
            Return => "RETURN",
            ReturnUndefined => "RETURN_UNDEFINED",
            Throw => "THROW",
            NewObject => "NEW_OBJECT",
            NewArray => "NEW_ARRAY",
            ArrayAppend => "ARRAY_APPEND",
            ArrayExtend => "ARRAY_EXTEND",
            ArrayRest => "ARRAY_REST",
            ObjectRest => "OBJECT_REST",
            CopyProps => "COPY_PROPS",
            SetProto => "SET_PROTO",
            GetProto => "GET_PROTO",
            EvalModule => "EVAL_MODULE",
            GetModuleExport => "GET_MODULE_EXPORT",
            CreateNamespace => "CREATE_NAMESPACE",
            LoadJsonModule => "LOAD_JSON_MODULE",
            DynamicImport => "DYNAMIC_IMPORT",
            GetArguments => "GET_ARGUMENTS",
            LoadThis => "LOAD_THIS",
            LoadNewTarget => "LOAD_NEW_TARGET",
            LoadImportMeta => "LOAD_IMPORT_META",
            TypeGuardIterable => "TYPE_GUARD_ITERABLE",
            TypeGuardIteratorReturn => "TYPE_GUARD_ITERATOR_RETURN",
            Yield => "YIELD",
            Await => "AWAIT",
            PushWith => "PUSH_WITH",
            PopWith => "POP_WITH",
            GetWithProp => "GET_WITH_PROP",
            SetWithProp => "SET_WITH_PROP",
            Debugger => "DEBUGGER",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_repr() {
        assert_eq!(OpCode::LoadConst as u8, 0);
        assert_eq!(OpCode::LoadTrue as u8, 1);
    }

    #[test]
    fn opcode_from_u8() {
        assert_eq!(OpCode::from_u8(0), Some(OpCode::LoadConst));
        assert_eq!(OpCode::from_u8(OpCode::Debugger as u8), Some(OpCode::Debugger));
        assert_eq!(OpCode::from_u8(250), None);
    }

    #[test]
    fn opcode_name() {
        assert_eq!(OpCode::LoadConst.name(), "LOAD_CONST");
        assert_eq!(OpCode::JumpIfFalse.name(), "JUMP_IF_FALSE");
        assert_eq!(OpCode::CheckUninitialized.name(), "CHECK_UNINITIALIZED");
    }

    #[test]
    fn operand_sizes() {
        assert_eq!(OpCode::ReturnUndefined.operand_size(), 0);
        assert_eq!(OpCode::Return.operand_size(), 1);
        assert_eq!(OpCode::Move.operand_size(), 2);
        assert_eq!(OpCode::Add.operand_size(), 3);
        assert_eq!(OpCode::GetProp.operand_size(), 4);
        assert_eq!(OpCode::GetModuleExport.operand_size(), 5);
        // Closure reports its fixed prefix only.
        assert_eq!(OpCode::Closure.operand_size(), 4);
        assert_eq!(OpCode::ClosureWide.operand_size(), 5);
    }

    #[test]
    fn jump_classification() {
        assert!(OpCode::Jump.is_jump());
        assert!(OpCode::JumpIfNullish.is_jump());
        assert!(!OpCode::CheckUninitialized.is_jump());
        assert!(!OpCode::Call.is_jump());
    }

    #[test]
    fn capture_tag_sizes() {
        assert_eq!(CaptureTag::FromRegister.descriptor_size(), 2);
        assert_eq!(CaptureTag::FromSpill16.descriptor_size(), 3);
        assert_eq!(CaptureTag::try_from(0u8), Ok(CaptureTag::FromRegister));
        assert!(CaptureTag::try_from(9u8).is_err());
    }
}
