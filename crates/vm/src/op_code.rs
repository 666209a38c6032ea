//! The instruction set.

/// Every opcode of the bytecode format, one byte each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(non_camel_case_types)]
pub enum OpCode {
    // Constants
    PUSHINT8 = 0x00,
    PUSHINT16 = 0x01,
    PUSHINT32 = 0x02,
    PUSHINT64 = 0x03,
    PUSHINT128 = 0x04,
    PUSHINT256 = 0x05,
    PUSHT = 0x08,
    PUSHF = 0x09,
    PUSHA = 0x0a,
    PUSHNULL = 0x0b,
    PUSHDATA1 = 0x0c,
    PUSHDATA2 = 0x0d,
    PUSHDATA4 = 0x0e,
    PUSHM1 = 0x0f,
    PUSH0 = 0x10,
    PUSH1 = 0x11,
    PUSH2 = 0x12,
    PUSH3 = 0x13,
    PUSH4 = 0x14,
    PUSH5 = 0x15,
    PUSH6 = 0x16,
    PUSH7 = 0x17,
    PUSH8 = 0x18,
    PUSH9 = 0x19,
    PUSH10 = 0x1a,
    PUSH11 = 0x1b,
    PUSH12 = 0x1c,
    PUSH13 = 0x1d,
    PUSH14 = 0x1e,
    PUSH15 = 0x1f,
    PUSH16 = 0x20,

    // Flow control
    NOP = 0x21,
    JMP = 0x22,
    JMP_L = 0x23,
    JMPIF = 0x24,
    JMPIF_L = 0x25,
    JMPIFNOT = 0x26,
    JMPIFNOT_L = 0x27,
    JMPEQ = 0x28,
    JMPEQ_L = 0x29,
    JMPNE = 0x2a,
    JMPNE_L = 0x2b,
    JMPGT = 0x2c,
    JMPGT_L = 0x2d,
    JMPGE = 0x2e,
    JMPGE_L = 0x2f,
    JMPLT = 0x30,
    JMPLT_L = 0x31,
    JMPLE = 0x32,
    JMPLE_L = 0x33,
    CALL = 0x34,
    CALL_L = 0x35,
    CALLA = 0x36,
    CALLT = 0x37,
    ABORT = 0x38,
    ASSERT = 0x39,
    THROW = 0x3a,
    TRY = 0x3b,
    TRY_L = 0x3c,
    ENDTRY = 0x3d,
    ENDTRY_L = 0x3e,
    ENDFINALLY = 0x3f,
    RET = 0x40,
    SYSCALL = 0x41,

    // Stack
    DEPTH = 0x43,
    DROP = 0x45,
    NIP = 0x46,
    XDROP = 0x48,
    CLEAR = 0x49,
    DUP = 0x4a,
    OVER = 0x4b,
    PICK = 0x4d,
    TUCK = 0x4e,
    SWAP = 0x50,
    ROT = 0x51,
    ROLL = 0x52,
    REVERSE3 = 0x53,
    REVERSE4 = 0x54,
    REVERSEN = 0x55,

    // Slots
    INITSSLOT = 0x56,
    INITSLOT = 0x57,
    LDSFLD0 = 0x58,
    LDSFLD1 = 0x59,
    LDSFLD2 = 0x5a,
    LDSFLD3 = 0x5b,
    LDSFLD4 = 0x5c,
    LDSFLD5 = 0x5d,
    LDSFLD6 = 0x5e,
    LDSFLD = 0x5f,
    STSFLD0 = 0x60,
    STSFLD1 = 0x61,
    STSFLD2 = 0x62,
    STSFLD3 = 0x63,
    STSFLD4 = 0x64,
    STSFLD5 = 0x65,
    STSFLD6 = 0x66,
    STSFLD = 0x67,
    LDLOC0 = 0x68,
    LDLOC1 = 0x69,
    LDLOC2 = 0x6a,
    LDLOC3 = 0x6b,
    LDLOC4 = 0x6c,
    LDLOC5 = 0x6d,
    LDLOC6 = 0x6e,
    LDLOC = 0x6f,
    STLOC0 = 0x70,
    STLOC1 = 0x71,
    STLOC2 = 0x72,
    STLOC3 = 0x73,
    STLOC4 = 0x74,
    STLOC5 = 0x75,
    STLOC6 = 0x76,
    STLOC = 0x77,
    LDARG0 = 0x78,
    LDARG1 = 0x79,
    LDARG2 = 0x7a,
    LDARG3 = 0x7b,
    LDARG4 = 0x7c,
    LDARG5 = 0x7d,
    LDARG6 = 0x7e,
    LDARG = 0x7f,
    STARG0 = 0x80,
    STARG1 = 0x81,
    STARG2 = 0x82,
    STARG3 = 0x83,
    STARG4 = 0x84,
    STARG5 = 0x85,
    STARG6 = 0x86,
    STARG = 0x87,

    // Splice
    NEWBUFFER = 0x88,
    MEMCPY = 0x89,
    CAT = 0x8b,
    SUBSTR = 0x8c,
    LEFT = 0x8d,
    RIGHT = 0x8e,

    // Bitwise logic
    INVERT = 0x90,
    AND = 0x91,
    OR = 0x92,
    XOR = 0x93,
    EQUAL = 0x97,
    NOTEQUAL = 0x98,

    // Arithmetic
    SIGN = 0x99,
    ABS = 0x9a,
    NEGATE = 0x9b,
    INC = 0x9c,
    DEC = 0x9d,
    ADD = 0x9e,
    SUB = 0x9f,
    MUL = 0xa0,
    DIV = 0xa1,
    MOD = 0xa2,
    POW = 0xa3,
    SQRT = 0xa4,
    MODMUL = 0xa5,
    MODPOW = 0xa6,
    SHL = 0xa8,
    SHR = 0xa9,
    NOT = 0xaa,
    BOOLAND = 0xab,
    BOOLOR = 0xac,
    NZ = 0xb1,
    NUMEQUAL = 0xb3,
    NUMNOTEQUAL = 0xb4,
    LT = 0xb5,
    LE = 0xb6,
    GT = 0xb7,
    GE = 0xb8,
    MIN = 0xb9,
    MAX = 0xba,
    WITHIN = 0xbb,

    // Compound types
    PACKMAP = 0xbe,
    PACKSTRUCT = 0xbf,
    PACK = 0xc0,
    UNPACK = 0xc1,
    NEWARRAY0 = 0xc2,
    NEWARRAY = 0xc3,
    NEWARRAY_T = 0xc4,
    NEWSTRUCT0 = 0xc5,
    NEWSTRUCT = 0xc6,
    NEWMAP = 0xc8,
    SIZE = 0xca,
    HASKEY = 0xcb,
    KEYS = 0xcc,
    VALUES = 0xcd,
    PICKITEM = 0xce,
    APPEND = 0xcf,
    SETITEM = 0xd0,
    REVERSEITEMS = 0xd1,
    REMOVE = 0xd2,
    CLEARITEMS = 0xd3,
    POPITEM = 0xd4,

    // Types
    ISNULL = 0xd8,
    ISTYPE = 0xd9,
    CONVERT = 0xdb,

    // Extensions
    ABORTMSG = 0xe0,
    ASSERTMSG = 0xe1,
}

/// Shape of an opcode's immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandSize {
    /// No immediate.
    None,
    /// A fixed number of bytes.
    Fixed(usize),
    /// A length prefix of the given width followed by that many bytes.
    Prefix(usize),
}

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        FROM_BYTE[byte as usize]
    }

    /// Immediate operand shape.
    pub fn operand_size(self) -> OperandSize {
        use OpCode::*;
        match self {
            PUSHINT8 | JMP | JMPIF | JMPIFNOT | JMPEQ | JMPNE | JMPGT | JMPGE | JMPLT | JMPLE
            | CALL | ENDTRY | INITSSLOT | LDSFLD | STSFLD | LDLOC | STLOC | LDARG | STARG
            | NEWARRAY_T | ISTYPE | CONVERT => OperandSize::Fixed(1),
            PUSHINT16 | CALLT | TRY | INITSLOT => OperandSize::Fixed(2),
            PUSHINT32 | PUSHA | JMP_L | JMPIF_L | JMPIFNOT_L | JMPEQ_L | JMPNE_L | JMPGT_L
            | JMPGE_L | JMPLT_L | JMPLE_L | CALL_L | ENDTRY_L | SYSCALL => OperandSize::Fixed(4),
            PUSHINT64 | TRY_L => OperandSize::Fixed(8),
            PUSHINT128 => OperandSize::Fixed(16),
            PUSHINT256 => OperandSize::Fixed(32),
            PUSHDATA1 => OperandSize::Prefix(1),
            PUSHDATA2 => OperandSize::Prefix(2),
            PUSHDATA4 => OperandSize::Prefix(4),
            _ => OperandSize::None,
        }
    }

    /// Base gas price, multiplied by the execution fee factor when charged.
    pub fn price(self) -> i64 {
        use OpCode::*;
        match self {
            RET | SYSCALL | ABORT | ABORTMSG => 0,
            PUSHINT8 | PUSHINT16 | PUSHINT32 | PUSHINT64 | PUSHT | PUSHF | PUSHNULL | PUSHM1
            | PUSH0 | PUSH1 | PUSH2 | PUSH3 | PUSH4 | PUSH5 | PUSH6 | PUSH7 | PUSH8 | PUSH9
            | PUSH10 | PUSH11 | PUSH12 | PUSH13 | PUSH14 | PUSH15 | PUSH16 | NOP | ASSERT => 1,
            PUSHINT128 | PUSHINT256 | PUSHA | TRY | TRY_L | ENDTRY | ENDTRY_L | ENDFINALLY
            | INVERT | SIGN | ABS | NEGATE | INC | DEC | NOT | NZ | SIZE | ISNULL | ISTYPE
            | ASSERTMSG => 1 << 2,
            PUSHDATA1 | AND | OR | XOR | ADD | SUB | MUL | DIV | MOD | SHL | SHR | BOOLAND
            | BOOLOR | NUMEQUAL | NUMNOTEQUAL | LT | LE | GT | GE | MIN | MAX | WITHIN
            | NEWMAP => 1 << 3,
            XDROP | CLEAR | ROLL | REVERSEN | INITSSLOT | NEWARRAY0 | NEWSTRUCT0 | KEYS
            | REMOVE | CLEARITEMS | POPITEM | MODMUL => 1 << 4,
            EQUAL | NOTEQUAL | MODPOW => 1 << 5,
            INITSLOT | POW | SQRT | HASKEY | PICKITEM => 1 << 6,
            NEWBUFFER => 1 << 8,
            PUSHDATA2 | CALL | CALL_L | CALLA | THROW | NEWARRAY | NEWARRAY_T | NEWSTRUCT => {
                1 << 9
            }
            MEMCPY | CAT | SUBSTR | LEFT | RIGHT | PACKMAP | PACKSTRUCT | PACK | UNPACK => 1 << 11,
            PUSHDATA4 => 1 << 12,
            VALUES | APPEND | SETITEM | REVERSEITEMS | CONVERT => 1 << 13,
            CALLT => 1 << 15,
            DEPTH | DROP | NIP | DUP | OVER | PICK | TUCK | SWAP | ROT | REVERSE3 | REVERSE4
            | JMP | JMP_L | JMPIF | JMPIF_L | JMPIFNOT | JMPIFNOT_L | JMPEQ | JMPEQ_L | JMPNE
            | JMPNE_L | JMPGT | JMPGT_L | JMPGE | JMPGE_L | JMPLT | JMPLT_L | JMPLE | JMPLE_L
            | LDSFLD0 | LDSFLD1 | LDSFLD2 | LDSFLD3 | LDSFLD4 | LDSFLD5 | LDSFLD6 | LDSFLD
            | STSFLD0 | STSFLD1 | STSFLD2 | STSFLD3 | STSFLD4 | STSFLD5 | STSFLD6 | STSFLD
            | LDLOC0 | LDLOC1 | LDLOC2 | LDLOC3 | LDLOC4 | LDLOC5 | LDLOC6 | LDLOC | STLOC0
            | STLOC1 | STLOC2 | STLOC3 | STLOC4 | STLOC5 | STLOC6 | STLOC | LDARG0 | LDARG1
            | LDARG2 | LDARG3 | LDARG4 | LDARG5 | LDARG6 | LDARG | STARG0 | STARG1 | STARG2
            | STARG3 | STARG4 | STARG5 | STARG6 | STARG => 1 << 1,
        }
    }
}

/// Dense decode table; `None` marks unassigned byte values.
static FROM_BYTE: [Option<OpCode>; 256] = build_decode_table();

const fn build_decode_table() -> [Option<OpCode>; 256] {
    use OpCode::*;
    let mut table: [Option<OpCode>; 256] = [None; 256];
    macro_rules! set {
        ($($op:ident),+ $(,)?) => {
            $(table[$op as usize] = Some($op);)+
        };
    }
    set!(
        PUSHINT8, PUSHINT16, PUSHINT32, PUSHINT64, PUSHINT128, PUSHINT256, PUSHT, PUSHF, PUSHA,
        PUSHNULL, PUSHDATA1, PUSHDATA2, PUSHDATA4, PUSHM1, PUSH0, PUSH1, PUSH2, PUSH3, PUSH4,
        PUSH5, PUSH6, PUSH7, PUSH8, PUSH9, PUSH10, PUSH11, PUSH12, PUSH13, PUSH14, PUSH15,
        PUSH16, NOP, JMP, JMP_L, JMPIF, JMPIF_L, JMPIFNOT, JMPIFNOT_L, JMPEQ, JMPEQ_L, JMPNE,
        JMPNE_L, JMPGT, JMPGT_L, JMPGE, JMPGE_L, JMPLT, JMPLT_L, JMPLE, JMPLE_L, CALL, CALL_L,
        CALLA, CALLT, ABORT, ASSERT, THROW, TRY, TRY_L, ENDTRY, ENDTRY_L, ENDFINALLY, RET,
        SYSCALL, DEPTH, DROP, NIP, XDROP, CLEAR, DUP, OVER, PICK, TUCK, SWAP, ROT, ROLL,
        REVERSE3, REVERSE4, REVERSEN, INITSSLOT, INITSLOT, LDSFLD0, LDSFLD1, LDSFLD2, LDSFLD3,
        LDSFLD4, LDSFLD5, LDSFLD6, LDSFLD, STSFLD0, STSFLD1, STSFLD2, STSFLD3, STSFLD4, STSFLD5,
        STSFLD6, STSFLD, LDLOC0, LDLOC1, LDLOC2, LDLOC3, LDLOC4, LDLOC5, LDLOC6, LDLOC, STLOC0,
        STLOC1, STLOC2, STLOC3, STLOC4, STLOC5, STLOC6, STLOC, LDARG0, LDARG1, LDARG2, LDARG3,
        LDARG4, LDARG5, LDARG6, LDARG, STARG0, STARG1, STARG2, STARG3, STARG4, STARG5, STARG6,
        STARG, NEWBUFFER, MEMCPY, CAT, SUBSTR, LEFT, RIGHT, INVERT, AND, OR, XOR, EQUAL,
        NOTEQUAL, SIGN, ABS, NEGATE, INC, DEC, ADD, SUB, MUL, DIV, MOD, POW, SQRT, MODMUL,
        MODPOW, SHL, SHR, NOT, BOOLAND, BOOLOR, NZ, NUMEQUAL, NUMNOTEQUAL, LT, LE, GT, GE, MIN,
        MAX, WITHIN, PACKMAP, PACKSTRUCT, PACK, UNPACK, NEWARRAY0, NEWARRAY, NEWARRAY_T,
        NEWSTRUCT0, NEWSTRUCT, NEWMAP, SIZE, HASKEY, KEYS, VALUES, PICKITEM, APPEND, SETITEM,
        REVERSEITEMS, REMOVE, CLEARITEMS, POPITEM, ISNULL, ISTYPE, CONVERT, ABORTMSG, ASSERTMSG,
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_round_trip() {
        for byte in 0u16..=255 {
            if let Some(op) = OpCode::from_byte(byte as u8) {
                assert_eq!(op as u8, byte as u8);
            }
        }
        assert_eq!(OpCode::from_byte(0x11), Some(OpCode::PUSH1));
        assert_eq!(OpCode::from_byte(0x42), None);
    }

    #[test]
    fn operand_shapes() {
        assert_eq!(OpCode::PUSHINT256.operand_size(), OperandSize::Fixed(32));
        assert_eq!(OpCode::PUSHDATA2.operand_size(), OperandSize::Prefix(2));
        assert_eq!(OpCode::SYSCALL.operand_size(), OperandSize::Fixed(4));
        assert_eq!(OpCode::ADD.operand_size(), OperandSize::None);
        assert_eq!(OpCode::TRY.operand_size(), OperandSize::Fixed(2));
        assert_eq!(OpCode::TRY_L.operand_size(), OperandSize::Fixed(8));
    }

    #[test]
    fn prices_are_positive_except_terminators() {
        assert_eq!(OpCode::RET.price(), 0);
        assert_eq!(OpCode::SYSCALL.price(), 0);
        assert!(OpCode::ADD.price() > 0);
        assert!(OpCode::CALLT.price() > OpCode::CALL.price());
    }
}
