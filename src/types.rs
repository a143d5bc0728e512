//! Core types for the PBASIC tokenizer.
//!
//! This module defines the data model shared by every compile pass:
//! target modules, lexical elements, the result record handed back to the
//! caller, and the fixed capacities of the in-flight tables.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CompileError, Span};

/// Tokenizer version, `x.yy` encoded as `xyy`.
pub const TOKENIZER_VERSION: u16 = 130;

/// Maximum size of a symbol name, in characters.
pub const SYMBOL_SIZE: usize = 32;
/// Capacity of each symbol table. Must stay a power of two for the hash.
pub const SYMBOL_TABLE_SIZE: usize = 1024;
/// Maximum source file size the element stream can address.
pub const MAX_SOURCE_SIZE: usize = 0x10000;
/// EEPROM image size in bytes (16 kbit part).
pub const EEPROM_SIZE: usize = 0x800;
/// Capacity of the element list.
pub const ELEMENT_LIST_SIZE: usize = 10240;
/// Capacity of the forward-reference patch list, in pairs.
pub const PATCH_LIST_SIZE: usize = 1024;
/// Nested FOR..NEXT limit (fixed by the firmware).
pub const FOR_NEXT_STACK_SIZE: usize = 16;
/// Nested IF..THEN limit.
pub const IF_THEN_STACK_SIZE: usize = 16;
/// Nested DO..LOOP limit.
pub const DO_LOOP_STACK_SIZE: usize = 16;
/// Nested SELECT CASE limit.
pub const SELECT_STACK_SIZE: usize = 16;
/// Total nesting stack capacity across all block families.
pub const NESTING_STACK_SIZE: usize =
    FOR_NEXT_STACK_SIZE + IF_THEN_STACK_SIZE + DO_LOOP_STACK_SIZE + SELECT_STACK_SIZE;
/// Maximum EXITs (or CASE exit labels) per open block.
pub const MAX_EXITS: usize = 16;
/// Size of one expression slot, in bits.
pub const EXPRESSION_SIZE: usize = 0x200;
/// End-of-text sentinel; terminates every source line after normalization.
pub const ETX: u8 = 3;
/// Download packet size: block index byte + 16 data bytes + checksum.
pub const PACKET_SIZE: usize = 18;
/// Packet staging buffer, sized for a fully used image.
pub const PACKET_BUFFER_SIZE: usize = EEPROM_SIZE / 16 * PACKET_SIZE;
/// Maximum entries in the source-to-token cross reference.
pub const SRC_TOK_REF_SIZE: usize = (EEPROM_SIZE * 8 - 14) / 7;

/// Per-byte EEPROM usage flags.
pub mod eeprom_usage {
    /// Mask selecting the usage code in bits 0..=6.
    pub const USAGE_MASK: u8 = 0x7F;
    /// Location untouched.
    pub const EMPTY: u8 = 0;
    /// Reserved by a DATA declaration without a value.
    pub const UNDEF_DATA: u8 = 1;
    /// Written by a DATA declaration with a value.
    pub const DEF_DATA: u8 = 2;
    /// Holds program bits.
    pub const PROGRAM: u8 = 3;
    /// Bit 7: byte is part of an emitted download packet.
    pub const DOWNLOADED: u8 = 0x80;
}

/// BASIC Stamp module variants this tokenizer can target.
///
/// The module selects the instruction-code table and which built-in
/// symbols are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetModule {
    /// BASIC Stamp 2.
    Bs2,
    /// BASIC Stamp 2e.
    Bs2e,
    /// BASIC Stamp 2sx.
    Bs2sx,
    /// BASIC Stamp 2p.
    Bs2p,
    /// BASIC Stamp 2pe.
    Bs2pe,
}

impl TargetModule {
    /// All supported modules, in opcode-table column order.
    pub const ALL: [TargetModule; 5] = [
        TargetModule::Bs2,
        TargetModule::Bs2e,
        TargetModule::Bs2sx,
        TargetModule::Bs2p,
        TargetModule::Bs2pe,
    ];

    /// Canonical module name as written in a `$STAMP` directive.
    pub fn name(&self) -> &'static str {
        match self {
            TargetModule::Bs2 => "BS2",
            TargetModule::Bs2e => "BS2E",
            TargetModule::Bs2sx => "BS2SX",
            TargetModule::Bs2p => "BS2P",
            TargetModule::Bs2pe => "BS2PE",
        }
    }

    /// Column index into the per-module instruction-code table.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Whether `$STAMP` may list project files for this module.
    pub fn multi_file_capable(&self) -> bool {
        !matches!(self, TargetModule::Bs2)
    }

    /// Default source file extension for project members.
    pub fn extension(&self) -> &'static str {
        match self {
            TargetModule::Bs2 => "bs2",
            TargetModule::Bs2e => "bse",
            TargetModule::Bs2sx => "bsx",
            TargetModule::Bs2p => "bsp",
            TargetModule::Bs2pe => "bpe",
        }
    }
}

impl fmt::Display for TargetModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// PBASIC 2.0, as stored in the result record.
pub const VERSION_2_0: u16 = 200;
/// PBASIC 2.5.
pub const VERSION_2_5: u16 = 250;

/// Variable sizes, ordered smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum VarSize {
    /// 1 bit.
    Bit = 0,
    /// 4 bits.
    Nib = 1,
    /// 8 bits.
    Byte = 2,
    /// 16 bits.
    Word = 3,
}

impl VarSize {
    /// Decode a 2-bit size code.
    pub fn from_code(code: u16) -> VarSize {
        match code & 3 {
            0 => VarSize::Bit,
            1 => VarSize::Nib,
            2 => VarSize::Byte,
            _ => VarSize::Word,
        }
    }

    /// Width in bits.
    pub fn bits(&self) -> u16 {
        match self {
            VarSize::Bit => 1,
            VarSize::Nib => 4,
            VarSize::Byte => 8,
            VarSize::Word => 16,
        }
    }

    /// How many units of `self` fit in one unit of `larger`.
    pub fn units_in(&self, larger: VarSize) -> u16 {
        larger.bits() / self.bits()
    }
}

/// Element kinds produced by the lexer.
///
/// Grouped by function; the reserved-word enumeration collapses related
/// kinds through [`ElementKind::collapsed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ElementKind {
    /// `$STAMP`, `$PORT`, `$PBASIC`.
    Directive,
    /// `BS2`, `BS2E`, etc.
    TargetModule,
    /// `#DEFINE`, `#IF`, `#SELECT`, etc.
    CcDirective,
    /// `OUTPUT`, `HIGH`, `LOW`, etc.
    Instruction,
    /// `CON`.
    Con,
    /// `INS`, `OUTS`, `DIRS` and friends, plus user variables.
    Variable,
    /// `WORD`, `BYTE`, `NIB`, `BIT`.
    VariableAuto,
    /// `HIGHBYTE`, `LOWNIB`, `BIT15`, etc.
    VariableMod,
    /// `NUM`, `SNUM`.
    AnyNumberIo,
    /// `<`, `<=`, `=>`, `>`, `=`, `<>`.
    Cond1Op,
    /// `HYP`, `ATN`, `&`, etc.
    BinaryOp,
    /// `SQR`, `ABS`, `~`, etc.
    UnaryOp,
    /// `99`, `$FF`, `%11`.
    Constant,
    /// `.`
    Period,
    /// `,`
    Comma,
    /// `?`
    Question,
    /// `\`
    Backslash,
    /// `@`
    At,
    /// `(`
    Left,
    /// `[`
    LeftBracket,
    /// `}`
    RightCurlyBrace,
    /// `#THEN`.
    CcThen,
    /// `DATA`.
    Data,
    /// `STEP`.
    Step,
    /// `TO`.
    To,
    /// `THEN`.
    Then,
    /// `WHILE`.
    While,
    /// `UNTIL`.
    Until,
    /// `PIN`.
    Pin,
    /// `VAR`.
    Var,
    /// `ASC` (must be followed by `?`).
    AsciiIo,
    /// `DEC`/`HEX`/`BIN` with `I`/`S` prefixes and widths 1-16.
    NumberIo,
    /// `REP`.
    RepeatIo,
    /// `SKIP`.
    SkipIo,
    /// `SPSTR` (BS2p and BS2pe).
    SpStringIo,
    /// `STR`.
    StringIo,
    /// `WAIT`.
    WaitIo,
    /// `WAITSTR`.
    WaitStringIo,
    /// `AND`, `OR`, `XOR` as condition joiners.
    Cond2Op,
    /// `NOT`.
    Cond3Op,
    /// `)`
    Right,
    /// `]`
    RightBracket,
    /// Pin symbol declared with `PIN`; constant or I/O bit by context.
    PinNumber,
    /// Defined address label.
    Address,
    /// Compile-time constant from `#DEFINE`.
    CcConstant,
    /// Project member file name inside `$STAMP`.
    FileName,
    /// Unknown symbol, resolved lazily.
    Undefined,
    /// End of statement; value 0 for end-of-line, 1 for `:`.
    End,
    /// Canceled element record (tombstone).
    Cancel,
}

impl ElementKind {
    /// Collapse related kinds for the reserved-word enumeration.
    pub fn collapsed(&self) -> ElementKind {
        use ElementKind::*;
        match self {
            CcThen => CcDirective,
            Data | Step | To | Then | While | Until => Instruction,
            Pin | Var => Con,
            AsciiIo | NumberIo | RepeatIo | SkipIo | SpStringIo | StringIo | WaitIo
            | WaitStringIo => AnyNumberIo,
            Cond2Op | Cond3Op => Cond1Op,
            Right => Left,
            RightBracket => LeftBracket,
            other => *other,
        }
    }
}

/// A lexical token: kind, attached value and source range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    /// What the token is.
    pub kind: ElementKind,
    /// Kind-specific payload (constant value, opcode, size/address pack, ...).
    pub value: u16,
    /// Byte offset of the first source character.
    pub start: u16,
    /// Number of source characters.
    pub length: u8,
}

impl Element {
    /// Source range covered by this element.
    pub fn span(&self) -> Span {
        Span::new(self.start as usize, self.length as usize)
    }

    /// Pack a variable element value from size and address.
    pub fn variable_value(size: VarSize, address: u16) -> u16 {
        ((size as u16) << 8) | (address & 0xFF)
    }

    /// Size half of a variable element value.
    pub fn variable_size(value: u16) -> VarSize {
        VarSize::from_code(value >> 8)
    }

    /// Address half of a variable element value.
    pub fn variable_address(value: u16) -> u16 {
        value & 0xFF
    }
}

/// Editor directive selector, stored in a `Directive` element's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DirectiveKind {
    /// `$STAMP`.
    Stamp = 0,
    /// `$PORT`.
    Port = 1,
    /// `$PBASIC`.
    PBasic = 2,
}

/// Conditional-compile directive selector, stored in a `CcDirective` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CcKind {
    /// `#DEFINE`.
    Define = 0,
    /// `#IF`.
    If = 1,
    /// `#ELSE`.
    Else = 2,
    /// `#ENDIF`.
    EndIf = 3,
    /// `#SELECT`.
    Select = 4,
    /// `#CASE`.
    Case = 5,
    /// `#ENDSELECT`.
    EndSelect = 6,
    /// `#ERROR`.
    Error = 7,
}

impl CcKind {
    /// Decode an element value.
    pub fn from_value(value: u16) -> Option<CcKind> {
        use CcKind::*;
        [If, Else, EndIf, Select, Case, EndSelect, Error, Define]
            .into_iter()
            .find(|k| *k as u16 == value)
    }
}

/// PBASIC instructions, stored in an `Instruction` element's value.
///
/// Alphabetical for clarity; the order does not affect code generation,
/// which goes through the per-module opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum InstructionType {
    Auxio,
    Branch,
    Button,
    Case,
    Count,
    Debug,
    DebugIn,
    Do,
    Dtmfout,
    Else,
    ElseIf,
    End,
    EndIf,
    EndSelect,
    Exit,
    For,
    Freqout,
    Get,
    Gosub,
    Goto,
    High,
    I2cin,
    I2cout,
    If,
    Input,
    Ioterm,
    Lcdcmd,
    Lcdin,
    Lcdout,
    Lookdown,
    Lookup,
    Loop,
    Low,
    Mainio,
    Nap,
    Next,
    On,
    Output,
    Owin,
    Owout,
    Pause,
    Pollin,
    Pollmode,
    Pollout,
    Pollrun,
    Pollwait,
    Pulsin,
    Pulsout,
    Put,
    Pwm,
    Random,
    Rctime,
    Read,
    Return,
    Reverse,
    Run,
    Select,
    Serin,
    Serout,
    Shiftin,
    Shiftout,
    Sleep,
    Stop,
    Store,
    Toggle,
    Write,
    Xout,
}

impl InstructionType {
    /// All instructions, indexed by discriminant.
    pub const ALL: [InstructionType; 67] = [
        InstructionType::Auxio,
        InstructionType::Branch,
        InstructionType::Button,
        InstructionType::Case,
        InstructionType::Count,
        InstructionType::Debug,
        InstructionType::DebugIn,
        InstructionType::Do,
        InstructionType::Dtmfout,
        InstructionType::Else,
        InstructionType::ElseIf,
        InstructionType::End,
        InstructionType::EndIf,
        InstructionType::EndSelect,
        InstructionType::Exit,
        InstructionType::For,
        InstructionType::Freqout,
        InstructionType::Get,
        InstructionType::Gosub,
        InstructionType::Goto,
        InstructionType::High,
        InstructionType::I2cin,
        InstructionType::I2cout,
        InstructionType::If,
        InstructionType::Input,
        InstructionType::Ioterm,
        InstructionType::Lcdcmd,
        InstructionType::Lcdin,
        InstructionType::Lcdout,
        InstructionType::Lookdown,
        InstructionType::Lookup,
        InstructionType::Loop,
        InstructionType::Low,
        InstructionType::Mainio,
        InstructionType::Nap,
        InstructionType::Next,
        InstructionType::On,
        InstructionType::Output,
        InstructionType::Owin,
        InstructionType::Owout,
        InstructionType::Pause,
        InstructionType::Pollin,
        InstructionType::Pollmode,
        InstructionType::Pollout,
        InstructionType::Pollrun,
        InstructionType::Pollwait,
        InstructionType::Pulsin,
        InstructionType::Pulsout,
        InstructionType::Put,
        InstructionType::Pwm,
        InstructionType::Random,
        InstructionType::Rctime,
        InstructionType::Read,
        InstructionType::Return,
        InstructionType::Reverse,
        InstructionType::Run,
        InstructionType::Select,
        InstructionType::Serin,
        InstructionType::Serout,
        InstructionType::Shiftin,
        InstructionType::Shiftout,
        InstructionType::Sleep,
        InstructionType::Stop,
        InstructionType::Store,
        InstructionType::Toggle,
        InstructionType::Write,
        InstructionType::Xout,
    ];

    /// Decode an element value.
    pub fn from_value(value: u16) -> Option<InstructionType> {
        Self::ALL.get(value as usize).copied()
    }
}

/// Compile entry options.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Stop after editor-directive resolution.
    pub directives_only: bool,
    /// When false, `$STAMP` is accepted syntactically but not interpreted.
    pub parse_stamp_directive: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            directives_only: false,
            parse_stamp_directive: true,
        }
    }
}

/// One source-to-token cross-reference entry, written at the start of each
/// compiled run-time statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    /// Byte offset of the statement in the source.
    pub src_start: u16,
    /// EEPROM bit index where the statement's tokens begin.
    pub tok_start: u16,
}

/// A reserved word with its collapsed category, for editor integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedWord {
    /// Uppercase name.
    pub name: String,
    /// Collapsed element kind identifying the category.
    pub category: ElementKind,
}

/// The compile result record.
///
/// Callers may allocate one and hand it to [`crate::compile_into`], or let
/// [`crate::compile`] build and return it. Every compile resets all fields.
#[derive(Debug, Clone)]
pub struct ModuleRec {
    /// Whether the compile succeeded.
    pub succeeded: bool,
    /// Diagnostic text (`NNN-<message>`) when it did not.
    pub error: Option<String>,
    /// Set when the program produces DEBUG output.
    pub debug_flag: bool,
    /// Module selected by `$STAMP`.
    pub target_module: Option<TargetModule>,
    /// Offset of the `$STAMP` target name in the source.
    pub target_start: Option<usize>,
    /// Project file names from `$STAMP`, with their source offsets.
    pub project_files: Vec<(String, usize)>,
    /// COM port from `$PORT`.
    pub port: Option<String>,
    /// Offset of the port name in the source.
    pub port_start: Option<usize>,
    /// PBASIC language version, 200 or 250.
    pub language_version: u16,
    /// Offset of the version literal in the source.
    pub language_start: Option<usize>,
    /// Length of the source text compiled.
    pub source_size: usize,
    /// Start of the error range in the source.
    pub error_start: usize,
    /// Length of the error range.
    pub error_length: usize,
    /// Tokenized image.
    pub eeprom: [u8; EEPROM_SIZE],
    /// Per-byte usage flags; see [`eeprom_usage`].
    pub eeprom_flags: [u8; EEPROM_SIZE],
    /// Allocated variable counts: bits, nibbles, bytes, words.
    pub var_counts: [u8; 4],
    /// Number of download packets staged in `packet_buffer`.
    pub packet_count: u8,
    /// Consecutive 18-byte download packets.
    pub packet_buffer: [u8; PACKET_BUFFER_SIZE],
}

impl Default for ModuleRec {
    fn default() -> Self {
        Self {
            succeeded: false,
            error: None,
            debug_flag: false,
            target_module: None,
            target_start: None,
            project_files: Vec::new(),
            port: None,
            port_start: None,
            language_version: VERSION_2_0,
            language_start: None,
            source_size: 0,
            error_start: 0,
            error_length: 0,
            eeprom: [0; EEPROM_SIZE],
            eeprom_flags: [0; EEPROM_SIZE],
            var_counts: [0; 4],
            packet_count: 0,
            packet_buffer: [0; PACKET_BUFFER_SIZE],
        }
    }
}

impl ModuleRec {
    /// Fresh record with every field reset.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when compiling for PBASIC 2.5.
    pub fn lang_250(&self) -> bool {
        self.language_version == VERSION_2_5
    }

    /// Record a failure and its source range.
    pub fn set_error(&mut self, err: &CompileError) {
        self.succeeded = false;
        self.error = Some(err.code.diagnostic());
        self.error_start = err.span.start;
        self.error_length = err.span.length;
    }

    /// The staged download packets.
    pub fn packets(&self) -> impl Iterator<Item = &[u8]> {
        self.packet_buffer[..self.packet_count as usize * PACKET_SIZE].chunks_exact(PACKET_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_names_round_trip() {
        for module in TargetModule::ALL {
            assert_eq!(module.name().to_uppercase(), module.name());
        }
        assert!(!TargetModule::Bs2.multi_file_capable());
        assert!(TargetModule::Bs2pe.multi_file_capable());
    }

    #[test]
    fn test_var_size_packing() {
        let value = Element::variable_value(VarSize::Byte, 6);
        assert_eq!(Element::variable_size(value), VarSize::Byte);
        assert_eq!(Element::variable_address(value), 6);
        assert_eq!(VarSize::Bit.units_in(VarSize::Word), 16);
        assert_eq!(VarSize::Nib.units_in(VarSize::Byte), 2);
    }

    #[test]
    fn test_collapsed_kinds() {
        assert_eq!(
            ElementKind::WaitStringIo.collapsed(),
            ElementKind::AnyNumberIo
        );
        assert_eq!(ElementKind::Cond3Op.collapsed(), ElementKind::Cond1Op);
        assert_eq!(ElementKind::Pin.collapsed(), ElementKind::Con);
        assert_eq!(ElementKind::Instruction.collapsed(), ElementKind::Instruction);
    }

    #[test]
    fn test_instruction_from_value() {
        assert_eq!(
            InstructionType::from_value(InstructionType::Xout as u16),
            Some(InstructionType::Xout)
        );
        assert_eq!(InstructionType::from_value(9999), None);
    }

    #[test]
    fn test_record_reset_shape() {
        let rec = ModuleRec::new();
        assert!(!rec.succeeded);
        assert_eq!(rec.packet_count, 0);
        assert_eq!(rec.eeprom.len(), EEPROM_SIZE);
        assert_eq!(rec.packets().count(), 0);
    }
}
