//! Symbol tables for the PBASIC tokenizer.
//!
//! Two hashed, chained tables share one shape: the defined-symbol table and
//! the undefined-symbol table. The hash is the sum of the (uppercase ASCII)
//! name bytes modulo the table size; collisions chain through a next-record
//! index. Built-in symbols come in two waves: a common set loaded before the
//! first lexer pass, and a custom set admitted after the editor directives
//! have settled the target module and language version.

use bitflags::bitflags;

use crate::error::ErrorCode;
use crate::expr::Op;
use crate::types::{
    DirectiveKind, Element, ElementKind, InstructionType, TargetModule, VarSize, CcKind,
    SYMBOL_TABLE_SIZE, VERSION_2_5,
};

bitflags! {
    /// Admission mask for custom built-in symbols: which modules and which
    /// language versions carry the symbol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Targets: u8 {
        /// BASIC Stamp 2.
        const BS2 = 1 << 1;
        /// BASIC Stamp 2e.
        const BS2E = 1 << 2;
        /// BASIC Stamp 2sx.
        const BS2SX = 1 << 3;
        /// BASIC Stamp 2p.
        const BS2P = 1 << 4;
        /// BASIC Stamp 2pe.
        const BS2PE = 1 << 5;
        /// PBASIC 2.0.
        const V20 = 1 << 6;
        /// PBASIC 2.5.
        const V25 = 1 << 7;
    }
}

impl Targets {
    /// Every module.
    pub const ALL_MODULES: Targets = Targets::BS2
        .union(Targets::BS2E)
        .union(Targets::BS2SX)
        .union(Targets::BS2P)
        .union(Targets::BS2PE);
    /// Modules with scratchpad RAM and program slots (everything past BS2).
    pub const SCRATCHPAD: Targets = Targets::BS2E
        .union(Targets::BS2SX)
        .union(Targets::BS2P)
        .union(Targets::BS2PE);
    /// The BS2p-family parts.
    pub const P_FAMILY: Targets = Targets::BS2P.union(Targets::BS2PE);
    /// Both language versions.
    pub const ANY_VERSION: Targets = Targets::V20.union(Targets::V25);

    /// Mask bit for a target module.
    pub fn module_bit(module: TargetModule) -> Targets {
        match module {
            TargetModule::Bs2 => Targets::BS2,
            TargetModule::Bs2e => Targets::BS2E,
            TargetModule::Bs2sx => Targets::BS2SX,
            TargetModule::Bs2p => Targets::BS2P,
            TargetModule::Bs2pe => Targets::BS2PE,
        }
    }

    /// Mask bit for a language version.
    pub fn version_bit(version: u16) -> Targets {
        if version == VERSION_2_5 {
            Targets::V25
        } else {
            Targets::V20
        }
    }
}

/// A defined symbol: name, element kind and kind-specific value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Uppercase ASCII name, at most 32 characters.
    pub name: String,
    /// Element kind attached when the lexer matches this name.
    pub kind: ElementKind,
    /// Kind-specific value.
    pub value: u16,
}

impl Symbol {
    /// Build a symbol. The name must already be uppercase.
    pub fn new(name: impl Into<String>, kind: ElementKind, value: u16) -> Self {
        let name = name.into();
        debug_assert!(!name.bytes().any(|b| b.is_ascii_lowercase()));
        Self { name, kind, value }
    }
}

/// Additive hash over the name bytes, modulo the table size.
pub fn symbol_hash(name: &str) -> usize {
    name.bytes().map(usize::from).sum::<usize>() % SYMBOL_TABLE_SIZE
}

#[derive(Debug, Clone)]
struct Record {
    symbol: Symbol,
    next: i32,
}

/// Hashed, chained table of defined symbols. Fixed capacity; insertion
/// order is preserved for the reserved-word enumeration.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    records: Vec<Record>,
    vectors: Vec<i32>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Empty table.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            vectors: vec![-1; SYMBOL_TABLE_SIZE],
        }
    }

    /// Number of symbols entered.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Enter a symbol. Duplicates are not detected here; the declaration
    /// compilers police those.
    pub fn enter(&mut self, symbol: Symbol) -> Result<(), ErrorCode> {
        if self.records.len() >= SYMBOL_TABLE_SIZE {
            return Err(ErrorCode::SymbolTableFull);
        }
        let hash = symbol_hash(&symbol.name);
        let idx = self.records.len() as i32;
        let mut vector = self.vectors[hash];
        if vector < 0 {
            self.vectors[hash] = idx;
        } else {
            // Walk the chain to its tail.
            while self.records[vector as usize].next >= 0 {
                vector = self.records[vector as usize].next;
            }
            self.records[vector as usize].next = idx;
        }
        self.records.push(Record { symbol, next: -1 });
        Ok(())
    }

    /// Look a name up. The name must already be uppercase.
    pub fn find(&self, name: &str) -> Option<&Symbol> {
        let mut vector = self.vectors[symbol_hash(name)];
        while vector >= 0 {
            let record = &self.records[vector as usize];
            if record.symbol.name == name {
                return Some(&record.symbol);
            }
            vector = record.next;
        }
        None
    }

    /// Rewrite the value of an existing symbol. Returns false on miss.
    pub fn modify_value(&mut self, name: &str, value: u16) -> bool {
        let mut vector = self.vectors[symbol_hash(name)];
        while vector >= 0 {
            let record = &mut self.records[vector as usize];
            if record.symbol.name == name {
                record.symbol.value = value;
                return true;
            }
            vector = record.next;
        }
        false
    }

    /// Symbols in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.records.iter().map(|r| &r.symbol)
    }
}

/// Names of user identifiers referenced as DATA/VAR/CON/PIN targets but not
/// resolved yet. Distinguishes them from `#DEFINE`d symbols in
/// conditional-compile expressions.
#[derive(Debug, Clone, Default)]
pub struct UndefSymbolTable {
    table: SymbolTable,
}

impl UndefSymbolTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a name. Re-entering a known name is a no-op.
    pub fn enter(&mut self, name: &str) -> Result<(), ErrorCode> {
        if self.table.find(name).is_none() {
            self.table
                .enter(Symbol::new(name.to_string(), ElementKind::Undefined, 0))?;
        }
        Ok(())
    }

    /// Whether the name has been recorded.
    pub fn contains(&self, name: &str) -> bool {
        self.table.find(name).is_some()
    }
}

/// Pack a number-formatter value: digit count, base, signed and indicated
/// flags. Digits 0 means free-form width.
pub fn number_io_value(base: IoBase, digits: u16, signed: bool, indicated: bool) -> u16 {
    (digits & 0x1F)
        | ((base as u16) << 5)
        | (u16::from(signed) << 7)
        | (u16::from(indicated) << 8)
}

/// Numeric base of an IO formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IoBase {
    /// Decimal.
    Dec = 0,
    /// Hexadecimal.
    Hex = 1,
    /// Binary.
    Bin = 2,
}

impl IoBase {
    /// Decode from a formatter value.
    pub fn from_io_value(value: u16) -> IoBase {
        match (value >> 5) & 3 {
            0 => IoBase::Dec,
            1 => IoBase::Hex,
            _ => IoBase::Bin,
        }
    }
}

/// Digit count of an IO formatter value (0 = free-form).
pub fn io_digits(value: u16) -> u16 {
    value & 0x1F
}

/// Signed flag of an IO formatter value.
pub fn io_signed(value: u16) -> bool {
    value & (1 << 7) != 0
}

/// Indicated flag of an IO formatter value (`$`/`%` prefix on output).
pub fn io_indicated(value: u16) -> bool {
    value & (1 << 8) != 0
}

/// DEBUG control-character constants, position-coded 0..=15.
const CONTROL_CHARS: [&str; 16] = [
    "CLS", "HOME", "CRSRXY", "CRSRLF", "CRSRRT", "CRSRUP", "CRSRDN", "BELL", "BKSP", "TAB", "LF",
    "CLREOL", "CLRDN", "CR", "CRSRX", "CRSRY",
];

/// Common instructions available on every module in both dialects.
const COMMON_INSTRUCTIONS: [(&str, InstructionType); 37] = [
    ("BRANCH", InstructionType::Branch),
    ("BUTTON", InstructionType::Button),
    ("COUNT", InstructionType::Count),
    ("DEBUG", InstructionType::Debug),
    ("DTMFOUT", InstructionType::Dtmfout),
    ("END", InstructionType::End),
    ("FOR", InstructionType::For),
    ("FREQOUT", InstructionType::Freqout),
    ("GOSUB", InstructionType::Gosub),
    ("GOTO", InstructionType::Goto),
    ("HIGH", InstructionType::High),
    ("IF", InstructionType::If),
    ("INPUT", InstructionType::Input),
    ("LOOKDOWN", InstructionType::Lookdown),
    ("LOOKUP", InstructionType::Lookup),
    ("LOW", InstructionType::Low),
    ("NAP", InstructionType::Nap),
    ("NEXT", InstructionType::Next),
    ("OUTPUT", InstructionType::Output),
    ("PAUSE", InstructionType::Pause),
    ("PULSIN", InstructionType::Pulsin),
    ("PULSOUT", InstructionType::Pulsout),
    ("PWM", InstructionType::Pwm),
    ("RANDOM", InstructionType::Random),
    ("RCTIME", InstructionType::Rctime),
    ("READ", InstructionType::Read),
    ("RETURN", InstructionType::Return),
    ("REVERSE", InstructionType::Reverse),
    ("SERIN", InstructionType::Serin),
    ("SEROUT", InstructionType::Serout),
    ("SHIFTIN", InstructionType::Shiftin),
    ("SHIFTOUT", InstructionType::Shiftout),
    ("SLEEP", InstructionType::Sleep),
    ("STOP", InstructionType::Stop),
    ("TOGGLE", InstructionType::Toggle),
    ("WRITE", InstructionType::Write),
    ("XOUT", InstructionType::Xout),
];

/// Custom instructions: not on every module, or not in every dialect.
const CUSTOM_INSTRUCTIONS: [(&str, InstructionType, Targets); 27] = [
    ("GET", InstructionType::Get, Targets::SCRATCHPAD.union(Targets::ANY_VERSION)),
    ("PUT", InstructionType::Put, Targets::SCRATCHPAD.union(Targets::ANY_VERSION)),
    ("RUN", InstructionType::Run, Targets::SCRATCHPAD.union(Targets::ANY_VERSION)),
    ("MAINIO", InstructionType::Mainio, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("AUXIO", InstructionType::Auxio, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("IOTERM", InstructionType::Ioterm, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("LCDCMD", InstructionType::Lcdcmd, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("LCDIN", InstructionType::Lcdin, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("LCDOUT", InstructionType::Lcdout, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("I2CIN", InstructionType::I2cin, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("I2COUT", InstructionType::I2cout, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("OWIN", InstructionType::Owin, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("OWOUT", InstructionType::Owout, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("POLLIN", InstructionType::Pollin, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("POLLMODE", InstructionType::Pollmode, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("POLLOUT", InstructionType::Pollout, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("POLLRUN", InstructionType::Pollrun, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("POLLWAIT", InstructionType::Pollwait, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("STORE", InstructionType::Store, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("DEBUGIN", InstructionType::DebugIn, Targets::ALL_MODULES.union(Targets::V25)),
    ("DO", InstructionType::Do, Targets::ALL_MODULES.union(Targets::V25)),
    ("LOOP", InstructionType::Loop, Targets::ALL_MODULES.union(Targets::V25)),
    ("EXIT", InstructionType::Exit, Targets::ALL_MODULES.union(Targets::V25)),
    ("ON", InstructionType::On, Targets::ALL_MODULES.union(Targets::V25)),
    ("SELECT", InstructionType::Select, Targets::ALL_MODULES.union(Targets::V25)),
    ("CASE", InstructionType::Case, Targets::ALL_MODULES.union(Targets::V25)),
    ("ENDSELECT", InstructionType::EndSelect, Targets::ALL_MODULES.union(Targets::V25)),
];

/// Remaining 2.5-only keywords that are not plain instructions.
const CUSTOM_KEYWORDS: [(&str, ElementKind, u16, Targets); 17] = [
    ("ELSE", ElementKind::Instruction, InstructionType::Else as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("ELSEIF", ElementKind::Instruction, InstructionType::ElseIf as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("ENDIF", ElementKind::Instruction, InstructionType::EndIf as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("WHILE", ElementKind::While, 0, Targets::ALL_MODULES.union(Targets::V25)),
    ("UNTIL", ElementKind::Until, 0, Targets::ALL_MODULES.union(Targets::V25)),
    ("PIN", ElementKind::Pin, 0, Targets::ALL_MODULES.union(Targets::V25)),
    ("#DEFINE", ElementKind::CcDirective, CcKind::Define as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("#IF", ElementKind::CcDirective, CcKind::If as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("#THEN", ElementKind::CcThen, 0, Targets::ALL_MODULES.union(Targets::V25)),
    ("#ELSE", ElementKind::CcDirective, CcKind::Else as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("#ENDIF", ElementKind::CcDirective, CcKind::EndIf as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("#SELECT", ElementKind::CcDirective, CcKind::Select as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("#CASE", ElementKind::CcDirective, CcKind::Case as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("#ENDSELECT", ElementKind::CcDirective, CcKind::EndSelect as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("#ERROR", ElementKind::CcDirective, CcKind::Error as u16, Targets::ALL_MODULES.union(Targets::V25)),
    ("SPSTR", ElementKind::SpStringIo, 0, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
    ("NUM", ElementKind::AnyNumberIo, 0, Targets::P_FAMILY.union(Targets::ANY_VERSION)),
];

/// `SNUM` rides the same admission mask as `NUM`.
const CUSTOM_SNUM: (&str, ElementKind, u16, Targets) = (
    "SNUM",
    ElementKind::AnyNumberIo,
    1,
    Targets::P_FAMILY.union(Targets::ANY_VERSION),
);

/// Word-symbol operators.
const OPERATOR_SYMBOLS: [(&str, ElementKind, Op); 16] = [
    ("SQR", ElementKind::UnaryOp, Op::Sqr),
    ("ABS", ElementKind::UnaryOp, Op::Abs),
    ("DCD", ElementKind::UnaryOp, Op::Dcd),
    ("NCD", ElementKind::UnaryOp, Op::Ncd),
    ("COS", ElementKind::UnaryOp, Op::Cos),
    ("SIN", ElementKind::UnaryOp, Op::Sin),
    ("HYP", ElementKind::BinaryOp, Op::Hyp),
    ("ATN", ElementKind::BinaryOp, Op::Atn),
    ("MIN", ElementKind::BinaryOp, Op::Min),
    ("MAX", ElementKind::BinaryOp, Op::Max),
    ("DIG", ElementKind::BinaryOp, Op::Dig),
    ("REV", ElementKind::BinaryOp, Op::Rev),
    ("AND", ElementKind::Cond2Op, Op::And),
    ("OR", ElementKind::Cond2Op, Op::Or),
    ("XOR", ElementKind::Cond2Op, Op::Xor),
    ("NOT", ElementKind::Cond3Op, Op::Not),
];

/// Load the common symbol set used by every module and dialect.
pub fn enter_common_symbols(table: &mut SymbolTable) -> Result<(), ErrorCode> {
    use ElementKind as EK;

    // Editor directives and target module names.
    for (name, kind) in [
        ("STAMP", DirectiveKind::Stamp),
        ("PORT", DirectiveKind::Port),
        ("PBASIC", DirectiveKind::PBasic),
    ] {
        table.enter(Symbol::new(name, EK::Directive, kind as u16))?;
    }
    for module in TargetModule::ALL {
        table.enter(Symbol::new(module.name(), EK::TargetModule, module.index() as u16))?;
    }

    // Register aliases: words, bytes, nibbles, bits.
    for (i, name) in ["INS", "OUTS", "DIRS"].into_iter().enumerate() {
        table.enter(Symbol::new(
            name,
            EK::Variable,
            Element::variable_value(VarSize::Word, i as u16),
        ))?;
    }
    for (i, name) in ["INL", "INH", "OUTL", "OUTH", "DIRL", "DIRH"].into_iter().enumerate() {
        table.enter(Symbol::new(
            name,
            EK::Variable,
            Element::variable_value(VarSize::Byte, i as u16),
        ))?;
    }
    for (group, base) in [("IN", 0u16), ("OUT", 4), ("DIR", 8)] {
        for (i, letter) in ["A", "B", "C", "D"].into_iter().enumerate() {
            table.enter(Symbol::new(
                format!("{group}{letter}"),
                EK::Variable,
                Element::variable_value(VarSize::Nib, base + i as u16),
            ))?;
        }
    }
    for (group, base) in [("IN", 0u16), ("OUT", 16), ("DIR", 32)] {
        for bit in 0..16u16 {
            table.enter(Symbol::new(
                format!("{group}{bit}"),
                EK::Variable,
                Element::variable_value(VarSize::Bit, base + bit),
            ))?;
        }
    }

    // Declaration keywords and reserved words.
    table.enter(Symbol::new("CON", EK::Con, 0))?;
    table.enter(Symbol::new("DATA", EK::Data, 0))?;
    table.enter(Symbol::new("VAR", EK::Var, 0))?;
    table.enter(Symbol::new("TO", EK::To, 0))?;
    table.enter(Symbol::new("STEP", EK::Step, 0))?;
    table.enter(Symbol::new("THEN", EK::Then, 0))?;

    // Instructions.
    for (name, inst) in COMMON_INSTRUCTIONS {
        table.enter(Symbol::new(name, EK::Instruction, inst as u16))?;
    }

    // Operators spelled as words.
    for (name, kind, op) in OPERATOR_SYMBOLS {
        table.enter(Symbol::new(name, kind, op as u16))?;
    }

    // Variable size keywords and modifiers.
    for (name, size) in [
        ("BIT", VarSize::Bit),
        ("NIB", VarSize::Nib),
        ("BYTE", VarSize::Byte),
        ("WORD", VarSize::Word),
    ] {
        table.enter(Symbol::new(name, EK::VariableAuto, size as u16))?;
    }
    for (name, size, offset) in [
        ("LOWBYTE", VarSize::Byte, 0u16),
        ("HIGHBYTE", VarSize::Byte, MOD_HIGH),
        ("LOWNIB", VarSize::Nib, 0),
        ("HIGHNIB", VarSize::Nib, MOD_HIGH),
        ("LOWBIT", VarSize::Bit, 0),
        ("HIGHBIT", VarSize::Bit, MOD_HIGH),
    ] {
        table.enter(Symbol::new(name, EK::VariableMod, modifier_value(size, offset)))?;
    }
    for i in 0..2u16 {
        table.enter(Symbol::new(format!("BYTE{i}"), EK::VariableMod, modifier_value(VarSize::Byte, i)))?;
    }
    for i in 0..4u16 {
        table.enter(Symbol::new(format!("NIB{i}"), EK::VariableMod, modifier_value(VarSize::Nib, i)))?;
    }
    for i in 0..16u16 {
        table.enter(Symbol::new(format!("BIT{i}"), EK::VariableMod, modifier_value(VarSize::Bit, i)))?;
    }

    // IO formatters.
    table.enter(Symbol::new("ASC", EK::AsciiIo, 0))?;
    table.enter(Symbol::new("STR", EK::StringIo, 0))?;
    table.enter(Symbol::new("WAITSTR", EK::WaitStringIo, 0))?;
    table.enter(Symbol::new("WAIT", EK::WaitIo, 0))?;
    table.enter(Symbol::new("SKIP", EK::SkipIo, 0))?;
    table.enter(Symbol::new("REP", EK::RepeatIo, 0))?;
    for (stem, base, max_digits) in [
        ("DEC", IoBase::Dec, 5u16),
        ("HEX", IoBase::Hex, 4),
        ("BIN", IoBase::Bin, 16),
    ] {
        let indicated_forms: &[(&str, bool, bool)] = if base == IoBase::Dec {
            // Decimal has no radix indicator.
            &[("", false, false), ("S", true, false)]
        } else {
            &[
                ("", false, false),
                ("S", true, false),
                ("I", false, true),
                ("IS", false, true), // IS implies signed below
            ]
        };
        for &(prefix, signed, indicated) in indicated_forms {
            let signed = signed || prefix == "IS";
            table.enter(Symbol::new(
                format!("{prefix}{stem}"),
                EK::NumberIo,
                number_io_value(base, 0, signed, indicated),
            ))?;
            for digits in 1..=max_digits {
                table.enter(Symbol::new(
                    format!("{prefix}{stem}{digits}"),
                    EK::NumberIo,
                    number_io_value(base, digits, signed, indicated),
                ))?;
            }
        }
    }

    // Character constants.
    for (value, name) in CONTROL_CHARS.into_iter().enumerate() {
        table.enter(Symbol::new(name, EK::Constant, value as u16))?;
    }

    Ok(())
}

/// Admit the custom symbols for the selected module and dialect, and refresh
/// the directive symbols' values with what the directives resolved.
pub fn adjust_symbols(
    table: &mut SymbolTable,
    module: TargetModule,
    version: u16,
    port_present: bool,
) -> Result<(), ErrorCode> {
    let need = Targets::module_bit(module) | Targets::version_bit(version);

    for (name, inst, mask) in CUSTOM_INSTRUCTIONS {
        if mask & need == need {
            table.enter(Symbol::new(name, ElementKind::Instruction, inst as u16))?;
        }
    }
    for (name, kind, value, mask) in CUSTOM_KEYWORDS.into_iter().chain([CUSTOM_SNUM]) {
        if mask & need == need {
            table.enter(Symbol::new(name, kind, value))?;
        }
    }

    table.modify_value("STAMP", module.index() as u16);
    table.modify_value("PBASIC", version);
    table.modify_value("PORT", u16::from(port_present));
    Ok(())
}

/// Sentinel offset meaning "highest unit of the base size".
pub const MOD_HIGH: u16 = 0xFF;

/// Pack a variable-modifier value from its size and unit offset.
pub fn modifier_value(size: VarSize, offset: u16) -> u16 {
    ((size as u16) << 8) | (offset & 0xFF)
}

/// Size half of a modifier value.
pub fn modifier_size(value: u16) -> VarSize {
    VarSize::from_code(value >> 8)
}

/// Offset half of a modifier value.
pub fn modifier_offset(value: u16) -> u16 {
    value & 0xFF
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::types::VERSION_2_0;

    #[test]
    fn test_hash_is_byte_sum_mod_table_size() {
        assert_eq!(symbol_hash("A"), 65);
        assert_eq!(symbol_hash("AB"), 65 + 66);
        let big = "Z".repeat(32);
        assert_eq!(symbol_hash(&big), (90 * 32) % SYMBOL_TABLE_SIZE);
    }

    #[test]
    fn test_collision_chaining() {
        let mut table = SymbolTable::new();
        // "AB" and "BA" collide by construction.
        table.enter(Symbol::new("AB", ElementKind::Constant, 1)).unwrap();
        table.enter(Symbol::new("BA", ElementKind::Constant, 2)).unwrap();
        assert_eq!(table.find("AB").unwrap().value, 1);
        assert_eq!(table.find("BA").unwrap().value, 2);
        assert!(table.find("CC").is_none());
    }

    #[test]
    fn test_modify_value() {
        let mut table = SymbolTable::new();
        table.enter(Symbol::new("STAMP", ElementKind::Directive, 0)).unwrap();
        assert!(table.modify_value("STAMP", 4));
        assert_eq!(table.find("STAMP").unwrap().value, 4);
        assert!(!table.modify_value("MISSING", 1));
    }

    #[test]
    fn test_common_symbols_register_map() {
        let mut table = SymbolTable::new();
        enter_common_symbols(&mut table).unwrap();

        let ins = table.find("INS").unwrap();
        assert_eq!(Element::variable_size(ins.value), VarSize::Word);
        assert_eq!(Element::variable_address(ins.value), 0);

        let dir15 = table.find("DIR15").unwrap();
        assert_eq!(Element::variable_size(dir15.value), VarSize::Bit);
        assert_eq!(Element::variable_address(dir15.value), 47);

        let outh = table.find("OUTH").unwrap();
        assert_eq!(Element::variable_address(outh.value), 3);

        assert_eq!(table.find("CR").unwrap().value, 13);
        assert_eq!(table.find("DEBUG").unwrap().kind, ElementKind::Instruction);
    }

    #[test]
    fn test_custom_admission_by_module_and_version() {
        let mut bs2_20 = SymbolTable::new();
        enter_common_symbols(&mut bs2_20).unwrap();
        adjust_symbols(&mut bs2_20, TargetModule::Bs2, VERSION_2_0, false).unwrap();
        assert!(bs2_20.find("DO").is_none());
        assert!(bs2_20.find("GET").is_none());
        assert!(bs2_20.find("LCDOUT").is_none());

        let mut bs2_25 = SymbolTable::new();
        enter_common_symbols(&mut bs2_25).unwrap();
        adjust_symbols(&mut bs2_25, TargetModule::Bs2, VERSION_2_5, false).unwrap();
        assert!(bs2_25.find("DO").is_some());
        assert!(bs2_25.find("#IF").is_some());
        assert!(bs2_25.find("GET").is_none());

        let mut bs2p_25 = SymbolTable::new();
        enter_common_symbols(&mut bs2p_25).unwrap();
        adjust_symbols(&mut bs2p_25, TargetModule::Bs2p, VERSION_2_5, false).unwrap();
        assert!(bs2p_25.find("LCDOUT").is_some());
        assert!(bs2p_25.find("SPSTR").is_some());
        assert_eq!(bs2p_25.find("STAMP").unwrap().value, TargetModule::Bs2p.index() as u16);
    }

    #[test]
    fn test_undef_table_dedup() {
        let mut undef = UndefSymbolTable::new();
        undef.enter("LEDPIN").unwrap();
        undef.enter("LEDPIN").unwrap();
        assert!(undef.contains("LEDPIN"));
        assert!(!undef.contains("OTHER"));
    }

    #[test]
    fn test_formatter_value_packing() {
        let v = number_io_value(IoBase::Hex, 4, false, true);
        assert_eq!(io_digits(v), 4);
        assert_eq!(IoBase::from_io_value(v), IoBase::Hex);
        assert!(io_indicated(v));
        assert!(!io_signed(v));
    }
}
