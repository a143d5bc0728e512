//! Expression engine.
//!
//! Builds the bit-packed expression streams the firmware's stack evaluator
//! consumes, and evaluates the same stream host-side for conditional-compile
//! expressions. The packed format, per atom:
//!
//! - operators: 6-bit code `0x00..=0x1F`;
//! - variables: 6-bit code `0x20 | write<<3 | indexed<<2 | size`, then an
//!   8-bit address (indexed references are preceded by the packed index
//!   expression);
//! - constants: 6-bit code `0x30 | (bits-1)`, then a 1-bit flag selecting a
//!   4-bit power-of-two exponent or `bits` raw payload bits.
//!
//! Inside a slot the first atom carries no marker; every following atom is
//! preceded by a single `1` bit. Entering a slot into EEPROM prefixes the
//! leading `1` so statements decode as `1 => expression atom, 0 =>
//! instruction`.

use crate::compiler::Compiler;
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::types::{ElementKind, VarSize, EXPRESSION_SIZE};

/// Firmware operator codes. The order is fixed by the evaluator; the
/// conditional tiers live in the same 5-bit space as the value operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Op {
    Sqr = 0,
    Abs,
    Not,
    Neg,
    Dcd,
    Ncd,
    Cos,
    Sin,
    Hyp,
    Atn,
    And,
    Or,
    Xor,
    Min,
    Max,
    Add,
    Sub,
    /// `*/` - multiply, middle 16 bits of the 32-bit product.
    Mum,
    Mul,
    /// `**` - multiply, high 16 bits.
    Muh,
    /// `//` - remainder.
    Mod,
    Div,
    Dig,
    Shl,
    Shr,
    Rev,
    /// `=>` / `>=`
    Ae,
    /// `<=` / `=<`
    Be,
    /// `=`
    E,
    /// `<>`
    Ne,
    /// `>`
    A,
    /// `<`
    B,
}

impl Op {
    /// Decode a 5-bit operator code.
    pub fn from_code(code: u8) -> Option<Op> {
        use Op::*;
        const ALL: [Op; 32] = [
            Sqr, Abs, Not, Neg, Dcd, Ncd, Cos, Sin, Hyp, Atn, And, Or, Xor, Min, Max, Add, Sub,
            Mum, Mul, Muh, Mod, Div, Dig, Shl, Shr, Rev, Ae, Be, E, Ne, A, B,
        ];
        ALL.get(code as usize).copied()
    }

    /// Single-operand operators.
    pub fn is_unary(&self) -> bool {
        (*self as u8) <= Op::Sin as u8
    }

    /// Comparison operators (conditional tier 1).
    pub fn is_cond1(&self) -> bool {
        (*self as u8) >= Op::Ae as u8
    }

    /// Operators with no compile-time form.
    pub fn illegal_in_cc(&self) -> bool {
        matches!(
            self,
            Op::Hyp | Op::Atn | Op::Min | Op::Max | Op::Mum | Op::Muh | Op::Mod | Op::Dig | Op::Rev
        )
    }

    /// Operators accepted in constant declarations.
    pub fn allowed_in_const_decl(&self) -> bool {
        matches!(
            self,
            Op::Shl | Op::Shr | Op::And | Op::Or | Op::Xor | Op::Add | Op::Sub | Op::Mul | Op::Div
        )
    }
}

const VAR_BASE: u8 = 0x20;
const CONST_BASE: u8 = 0x30;

/// One bit-packed expression stream: a bit length plus up to 512 payload
/// bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionSlot {
    len: u16,
    bits: [u8; EXPRESSION_SIZE / 8],
}

impl Default for ExpressionSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionSlot {
    /// Empty stream.
    pub fn new() -> Self {
        Self {
            len: 0,
            bits: [0; EXPRESSION_SIZE / 8],
        }
    }

    /// Drop all bits.
    pub fn clear(&mut self) {
        self.len = 0;
        self.bits = [0; EXPRESSION_SIZE / 8];
    }

    /// Length in bits.
    pub fn len(&self) -> u16 {
        self.len
    }

    /// Whether no bits have been pushed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bit at an index, 0 or 1.
    pub fn bit(&self, idx: u16) -> u8 {
        (self.bits[(idx / 8) as usize] >> (7 - idx % 8)) & 1
    }

    /// Append `count` bits of `data`, most significant first.
    pub fn push_bits(&mut self, count: u8, data: u16) -> std::result::Result<(), ErrorCode> {
        if usize::from(self.len) + usize::from(count) > EXPRESSION_SIZE {
            return Err(ErrorCode::ExpressionTooComplex);
        }
        for shift in (0..count).rev() {
            let bit = (data >> shift) & 1;
            let idx = self.len;
            self.bits[(idx / 8) as usize] |= (bit as u8) << (7 - idx % 8);
            self.len += 1;
        }
        Ok(())
    }

    /// Append another stream, inserting the continue marker in front of it.
    pub fn append_stream(&mut self, other: &ExpressionSlot) -> std::result::Result<(), ErrorCode> {
        if other.is_empty() {
            return Ok(());
        }
        self.push_marker()?;
        for idx in 0..other.len {
            self.push_bits(1, u16::from(other.bit(idx)))?;
        }
        Ok(())
    }

    fn push_marker(&mut self) -> std::result::Result<(), ErrorCode> {
        if self.is_empty() {
            Ok(())
        } else {
            self.push_bits(1, 1)
        }
    }

    /// Append an operator atom.
    pub fn push_operator(&mut self, op: Op) -> std::result::Result<(), ErrorCode> {
        self.push_marker()?;
        self.push_bits(6, u16::from(op as u8))
    }

    /// Append a constant atom. Powers of two wider than the exponent field
    /// pays for are encoded as an exponent.
    pub fn push_constant(&mut self, value: u16) -> std::result::Result<(), ErrorCode> {
        self.push_marker()?;
        let bits = (16 - value.leading_zeros()).max(1) as u16;
        self.push_bits(6, u16::from(CONST_BASE) | (bits - 1))?;
        let power_of_two = value != 0 && value & (value - 1) == 0;
        if power_of_two && bits > 5 {
            self.push_bits(1, 1)?;
            self.push_bits(4, value.trailing_zeros() as u16)
        } else {
            self.push_bits(1, 0)?;
            self.push_bits(bits as u8, value)
        }
    }

    /// Append a variable-reference atom. Any index expression must already
    /// be in the stream, directly before this atom.
    pub fn push_variable(
        &mut self,
        write: bool,
        indexed: bool,
        size: VarSize,
        address: u16,
    ) -> std::result::Result<(), ErrorCode> {
        self.push_marker()?;
        let code = u16::from(VAR_BASE)
            | (u16::from(write) << 3)
            | (u16::from(indexed) << 2)
            | size as u16;
        self.push_bits(6, code)?;
        self.push_bits(8, address)
    }

    /// Reader over the packed bits.
    pub fn reader(&self) -> BitReader<'_> {
        BitReader { slot: self, pos: 0 }
    }
}

/// Sequential reader over an expression stream.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    slot: &'a ExpressionSlot,
    pos: u16,
}

impl<'a> BitReader<'a> {
    /// Bits left to read.
    pub fn remaining(&self) -> u16 {
        self.slot.len() - self.pos
    }

    /// Read `count` bits, most significant first.
    pub fn read(&mut self, count: u8) -> Option<u16> {
        if u16::from(count) > self.remaining() {
            return None;
        }
        let mut value = 0u16;
        for _ in 0..count {
            value = (value << 1) | u16::from(self.slot.bit(self.pos));
            self.pos += 1;
        }
        Some(value)
    }
}

/// Apply a unary operator host-side. Operators with no compile-time form
/// report [`ErrorCode::IllegalCcOperator`].
pub fn host_unary(op: Op, a: u16) -> std::result::Result<u16, ErrorCode> {
    Ok(match op {
        Op::Sqr => {
            let mut root = 0u16;
            while (root + 1).checked_mul(root + 1).map_or(false, |sq| sq <= a) {
                root += 1;
            }
            root
        }
        Op::Abs => {
            if a & 0x8000 != 0 {
                a.wrapping_neg()
            } else {
                a
            }
        }
        Op::Not => !a,
        Op::Neg => a.wrapping_neg(),
        Op::Dcd => 1u16 << (a & 15),
        Op::Ncd => {
            if a == 0 {
                0
            } else {
                16 - a.leading_zeros() as u16
            }
        }
        Op::Cos => brad_cos(a),
        Op::Sin => brad_sin(a),
        _ => return Err(ErrorCode::IllegalCcOperator),
    })
}

/// Apply a binary or conditional operator host-side.
pub fn host_binary(op: Op, a: u16, b: u16) -> std::result::Result<u16, ErrorCode> {
    let truth = |cond: bool| if cond { 0xFFFF } else { 0 };
    Ok(match op {
        Op::And => a & b,
        Op::Or => a | b,
        Op::Xor => a ^ b,
        Op::Add => a.wrapping_add(b),
        Op::Sub => a.wrapping_sub(b),
        Op::Mul => a.wrapping_mul(b),
        Op::Div => {
            if b == 0 {
                return Err(ErrorCode::DivideByZero);
            }
            a / b
        }
        Op::Shl => {
            if b > 15 {
                0
            } else {
                a << b
            }
        }
        Op::Shr => {
            if b > 15 {
                0
            } else {
                a >> b
            }
        }
        Op::Ae => truth(a >= b),
        Op::Be => truth(a <= b),
        Op::E => truth(a == b),
        Op::Ne => truth(a != b),
        Op::A => truth(a > b),
        Op::B => truth(a < b),
        _ => return Err(ErrorCode::IllegalCcOperator),
    })
}

/// 8-bit binary-radian sine, amplitude 127, two's complement result.
fn brad_sin(a: u16) -> u16 {
    let angle = f64::from(a & 0xFF) * std::f64::consts::PI / 128.0;
    ((angle.sin() * 127.0).round() as i16) as u16
}

/// 8-bit binary-radian cosine.
fn brad_cos(a: u16) -> u16 {
    brad_sin(a.wrapping_add(64))
}

/// Evaluate a packed expression stream host-side.
///
/// Used for conditional-compile expressions, where variable references
/// cannot occur; hitting one is an error.
pub fn evaluate(slot: &ExpressionSlot) -> std::result::Result<u16, ErrorCode> {
    let mut reader = slot.reader();
    let mut stack: Vec<u16> = Vec::new();
    let mut first = true;

    while reader.remaining() > 0 {
        if !first {
            reader.read(1).ok_or(ErrorCode::ExpressionTooComplex)?;
        }
        first = false;
        let code = reader.read(6).ok_or(ErrorCode::ExpressionTooComplex)? as u8;
        if code >= CONST_BASE {
            let bits = (code & 0x0F) + 1;
            let flag = reader.read(1).ok_or(ErrorCode::ExpressionTooComplex)?;
            let value = if flag == 1 {
                1u16 << reader.read(4).ok_or(ErrorCode::ExpressionTooComplex)?
            } else {
                reader.read(bits).ok_or(ErrorCode::ExpressionTooComplex)?
            };
            stack.push(value);
        } else if code >= VAR_BASE {
            return Err(ErrorCode::ExpectedDefinedSymbol);
        } else {
            let op = Op::from_code(code).ok_or(ErrorCode::ExpressionTooComplex)?;
            if op.is_unary() {
                let a = stack.pop().ok_or(ErrorCode::ExpressionTooComplex)?;
                stack.push(host_unary(op, a)?);
            } else {
                let b = stack.pop().ok_or(ErrorCode::ExpressionTooComplex)?;
                let a = stack.pop().ok_or(ErrorCode::ExpressionTooComplex)?;
                stack.push(host_binary(op, a, b)?);
            }
        }
    }
    stack.pop().ok_or(ErrorCode::ExpectedValue)
}

/// Marker byte for an open layer on the operator stack.
const LEFT: u8 = 0xFF;

/// Variable reference details returned by the read/write parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef {
    /// Size after modifiers.
    pub size: VarSize,
    /// Address after modifiers, in units of `size`.
    pub address: u16,
    /// Whether an index expression was attached.
    pub indexed: bool,
}

impl<'a> Compiler<'a> {
    fn push_op_byte(&mut self, byte: u8, span: Span) -> Result<()> {
        if self.op_stack.len() >= 256 {
            return Err(CompileError::new(ErrorCode::ExpressionTooComplex, span));
        }
        self.op_stack.push(byte);
        Ok(())
    }

    /// Emit an operator into the slot, maintaining the run-time stack-depth
    /// guard.
    fn emit_operator(&mut self, slot: &mut ExpressionSlot, code: u8, cc: bool, span: Span) -> Result<()> {
        let op = Op::from_code(code)
            .ok_or_else(|| CompileError::new(ErrorCode::ExpectedValue, span))?;
        if cc && op.illegal_in_cc() {
            return Err(CompileError::new(ErrorCode::IllegalCcOperator, span));
        }
        if op.is_unary() {
            // SQR and ATN hold an intermediate on the evaluator stack.
            if matches!(op, Op::Sqr) && self.stack_idx >= 8 {
                return Err(CompileError::new(ErrorCode::ExpressionTooComplex, span));
            }
        } else {
            if matches!(op, Op::Atn) && self.stack_idx >= 8 {
                return Err(CompileError::new(ErrorCode::ExpressionTooComplex, span));
            }
            self.stack_idx = self.stack_idx.saturating_sub(1);
        }
        slot.push_operator(op)
            .map_err(|code| CompileError::new(code, span))
    }

    fn emit_constant(&mut self, slot: &mut ExpressionSlot, value: u16, span: Span) -> Result<()> {
        self.stack_idx += 1;
        if self.stack_idx > 8 {
            return Err(CompileError::new(ErrorCode::ExpressionTooComplex, span));
        }
        slot.push_constant(value)
            .map_err(|code| CompileError::new(code, span))
    }

    fn emit_variable(
        &mut self,
        slot: &mut ExpressionSlot,
        write: bool,
        var: VarRef,
        span: Span,
    ) -> Result<()> {
        if write {
            self.stack_idx = self.stack_idx.saturating_sub(1);
        } else {
            self.stack_idx += 1;
            if self.stack_idx > 8 {
                return Err(CompileError::new(ErrorCode::ExpressionTooComplex, span));
            }
        }
        slot.push_variable(write, var.indexed, var.size, var.address)
            .map_err(|code| CompileError::new(code, span))
    }

    /// Pop operators into the slot until a layer marker. The marker stays.
    fn pop_to_left(&mut self, slot: &mut ExpressionSlot, base: usize, cc: bool, span: Span) -> Result<()> {
        while self.op_stack.len() > base {
            let top = *self.op_stack.last().unwrap();
            if top == LEFT {
                return Ok(());
            }
            self.op_stack.pop();
            self.emit_operator(slot, top, cc, span)?;
        }
        Ok(())
    }

    /// Parse a variable reference, including index and modifier chain, and
    /// emit it into the slot.
    pub(crate) fn get_read_write(
        &mut self,
        slot: &mut ExpressionSlot,
        write: bool,
    ) -> Result<VarRef> {
        let (_, el) = self.get_element()?;
        let (mut size, mut address) = match el.kind {
            ElementKind::Variable => (
                crate::types::Element::variable_size(el.value),
                crate::types::Element::variable_address(el.value),
            ),
            ElementKind::PinNumber => {
                // Pins read as IN bits and write as OUT bits.
                let base = if write { 16 } else { 0 };
                (VarSize::Bit, base + (el.value & 15))
            }
            _ => {
                return Err(CompileError::new(ErrorCode::ExpectedVariable, el.span()));
            }
        };

        // Optional index expression.
        let mut indexed = false;
        if let Some((_, next)) = self.try_peek() {
            if next.kind == ElementKind::Left {
                self.get_element()?;
                indexed = true;
                let mut index = ExpressionSlot::new();
                self.get_expression(&mut index, false, true, None, None, false)?;
                self.expect_kind(ElementKind::Right, ErrorCode::ExpectedRightParen)?;
                slot.append_stream(&index)
                    .map_err(|code| CompileError::new(code, el.span()))?;
            }
        }

        // Modifier chain, e.g. `.LOWBYTE.BIT3`.
        while let Some((_, next)) = self.try_peek() {
            if next.kind != ElementKind::Period {
                break;
            }
            self.get_element()?;
            let (_, modifier) = self.get_element()?;
            if modifier.kind != ElementKind::VariableMod {
                return Err(CompileError::new(
                    ErrorCode::ExpectedModifier,
                    modifier.span(),
                ));
            }
            let (new_size, new_address) =
                crate::decls::apply_modifier(size, address, modifier.value)
                    .map_err(|code| CompileError::new(code, modifier.span()))?;
            size = new_size;
            address = new_address;
        }

        let var = VarRef {
            size,
            address,
            indexed,
        };
        self.emit_variable(slot, write, var, el.span())?;
        Ok(var)
    }

    /// Parse a value or conditional expression into `slot`.
    ///
    /// `split` drives SELECT/CASE re-parsing: when the first half ends, the
    /// cursor jumps to the given element index, and `auto_op` supplies the
    /// comparison to synthesize when the user-written condition begins with
    /// a bare value. `cc` selects conditional-compile rules.
    pub(crate) fn get_expression(
        &mut self,
        slot: &mut ExpressionSlot,
        conditional: bool,
        pin_is_constant: bool,
        split: Option<usize>,
        auto_op: Option<Op>,
        cc: bool,
    ) -> Result<()> {
        let base = self.op_stack.len();
        let mut paren_count = 0u16;
        let mut expect_value = true;
        let mut jumped = split.is_none();
        let span = self
            .try_peek()
            .map(|(_, el)| el.span())
            .unwrap_or_default();

        if conditional {
            self.push_op_byte(LEFT, span)?;
            self.push_op_byte(LEFT, span)?;
        }

        loop {
            let Some((_, el)) = self.try_peek_resolved() else {
                break;
            };
            let span = el.span();

            if expect_value {
                match el.kind {
                    ElementKind::UnaryOp => {
                        self.get_element()?;
                        self.push_op_byte(el.value as u8, span)?;
                    }
                    ElementKind::BinaryOp if el.value == Op::Sub as u16 => {
                        self.get_element()?;
                        self.push_op_byte(Op::Neg as u8, span)?;
                    }
                    ElementKind::Cond3Op if conditional => {
                        // NOT binds looser than AND/OR/XOR: it sits between
                        // the two synthetic layers.
                        self.get_element()?;
                        match self.op_stack.last() {
                            Some(&top) if top == LEFT => {}
                            _ => return Err(CompileError::new(ErrorCode::ExpectedValue, span)),
                        }
                        self.op_stack.pop();
                        self.push_op_byte(Op::Not as u8, span)?;
                        self.push_op_byte(LEFT, span)?;
                    }
                    ElementKind::Left => {
                        self.get_element()?;
                        paren_count += 1;
                        self.push_op_byte(LEFT, span)?;
                    }
                    ElementKind::Constant | ElementKind::CcConstant => {
                        self.get_element()?;
                        self.emit_constant(slot, el.value, span)?;
                        expect_value = false;
                    }
                    ElementKind::PinNumber if pin_is_constant => {
                        self.get_element()?;
                        self.emit_constant(slot, el.value, span)?;
                        expect_value = false;
                    }
                    ElementKind::PinNumber | ElementKind::Variable => {
                        if cc {
                            return Err(CompileError::new(
                                ErrorCode::ExpectedDefinedSymbol,
                                span,
                            ));
                        }
                        self.get_read_write(slot, false)?;
                        expect_value = false;
                    }
                    ElementKind::Undefined => {
                        let name = self.symbol_name(span);
                        if cc && !self.undef.contains(&name) {
                            // An unknown name in a conditional-compile
                            // expression is an undefined #DEFINE: false.
                            self.get_element()?;
                            self.emit_constant(slot, 0, span)?;
                            expect_value = false;
                        } else if cc {
                            return Err(CompileError::new(
                                ErrorCode::ExpectedDefinedSymbol,
                                span,
                            ));
                        } else {
                            return Err(CompileError::new(ErrorCode::UndefinedSymbol, span));
                        }
                    }
                    _ => return Err(CompileError::new(ErrorCode::ExpectedValue, span)),
                }
                continue;
            }

            // Operator position.
            match el.kind {
                ElementKind::BinaryOp => {
                    self.get_element()?;
                    self.pop_to_left(slot, base, cc, span)?;
                    self.push_op_byte(el.value as u8, span)?;
                    expect_value = true;
                }
                ElementKind::Cond1Op if conditional => {
                    self.get_element()?;
                    self.pop_to_left(slot, base, cc, span)?;
                    self.push_op_byte(el.value as u8, span)?;
                    expect_value = true;
                }
                ElementKind::Cond2Op if conditional => {
                    self.get_element()?;
                    self.pop_to_left(slot, base, cc, span)?;
                    // Close the comparison layer and chain with any pending
                    // joiner of the same tier.
                    self.op_stack.pop();
                    while let Some(&top) = self.op_stack.last() {
                        if top == LEFT || top == Op::Not as u8 || self.op_stack.len() <= base {
                            break;
                        }
                        self.op_stack.pop();
                        self.emit_operator(slot, top, cc, span)?;
                    }
                    self.push_op_byte(el.value as u8, span)?;
                    self.push_op_byte(LEFT, span)?;
                    expect_value = true;
                }
                ElementKind::Right if paren_count > 0 => {
                    self.get_element()?;
                    self.pop_to_left(slot, base, cc, span)?;
                    self.op_stack.pop();
                    paren_count -= 1;
                }
                _ => {
                    // End of this half. In split mode, jump to the second
                    // half and synthesize the automatic comparison if the
                    // condition starts with a bare value.
                    if !jumped {
                        jumped = true;
                        let target = split.unwrap();
                        self.elements.set_cursor(target);
                        let next = self.try_peek_resolved();
                        let starts_with_cond = matches!(
                            next,
                            Some((_, e)) if e.kind == ElementKind::Cond1Op
                        );
                        if !starts_with_cond {
                            self.pop_to_left(slot, base, cc, span)?;
                            let op = auto_op.unwrap_or(Op::E);
                            self.push_op_byte(op as u8, span)?;
                            expect_value = true;
                        }
                        continue;
                    }
                    break;
                }
            }
        }

        if paren_count > 0 {
            return Err(CompileError::new(ErrorCode::ExpectedRightParen, span));
        }

        // Drain the stack: close the comparison layer, then the outer layer
        // with its NOTs and joiners.
        let end_span = self.last_span;
        self.pop_to_left(slot, base, cc, end_span)?;
        if conditional {
            self.op_stack.pop();
            while self.op_stack.len() > base {
                let top = self.op_stack.pop().unwrap();
                if top == LEFT {
                    break;
                }
                self.emit_operator(slot, top, cc, end_span)?;
            }
        }
        while self.op_stack.len() > base {
            let top = self.op_stack.pop().unwrap();
            if top != LEFT {
                self.emit_operator(slot, top, cc, end_span)?;
            }
        }

        if slot.is_empty() {
            return Err(CompileError::new(ErrorCode::ExpectedValue, end_span));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_packing_round_trip() {
        let mut slot = ExpressionSlot::new();
        slot.push_bits(6, 0b101101).unwrap();
        slot.push_bits(3, 0b010).unwrap();
        let mut reader = slot.reader();
        assert_eq!(reader.read(6), Some(0b101101));
        assert_eq!(reader.read(3), Some(0b010));
        assert_eq!(reader.read(1), None);
    }

    #[test]
    fn test_constant_encoding_minimal_bits() {
        let mut slot = ExpressionSlot::new();
        slot.push_constant(5).unwrap();
        // 6-bit header + flag + 3 payload bits
        assert_eq!(slot.len(), 10);

        let mut pow2 = ExpressionSlot::new();
        pow2.push_constant(0x4000).unwrap();
        // 6-bit header + flag + 4-bit exponent
        assert_eq!(pow2.len(), 11);
    }

    #[test]
    fn test_evaluate_simple() {
        // 7 + 3 * 2, strictly left to right: (7+3)*2 = 20
        let mut s = ExpressionSlot::new();
        s.push_constant(7).unwrap();
        s.push_constant(3).unwrap();
        s.push_operator(Op::Add).unwrap();
        s.push_constant(2).unwrap();
        s.push_operator(Op::Mul).unwrap();
        assert_eq!(evaluate(&s).unwrap(), 20);
    }

    #[test]
    fn test_evaluate_unary_and_conditionals() {
        let mut s = ExpressionSlot::new();
        s.push_constant(16).unwrap();
        s.push_operator(Op::Sqr).unwrap();
        s.push_constant(4).unwrap();
        s.push_operator(Op::E).unwrap();
        assert_eq!(evaluate(&s).unwrap(), 0xFFFF);
    }

    #[test]
    fn test_evaluate_divide_by_zero() {
        let mut s = ExpressionSlot::new();
        s.push_constant(1).unwrap();
        s.push_constant(0).unwrap();
        s.push_operator(Op::Div).unwrap();
        assert_eq!(evaluate(&s), Err(ErrorCode::DivideByZero));
    }

    #[test]
    fn test_encoding_idempotence() {
        // Emitting the same tree twice yields identical bits and values.
        let build = || {
            let mut s = ExpressionSlot::new();
            s.push_constant(1024).unwrap();
            s.push_constant(3).unwrap();
            s.push_operator(Op::Shr).unwrap();
            s.push_operator(Op::Ncd).unwrap();
            s
        };
        let a = build();
        let b = build();
        assert_eq!(a, b);
        assert_eq!(evaluate(&a).unwrap(), evaluate(&b).unwrap());
        assert_eq!(evaluate(&a).unwrap(), 8);
    }

    #[test]
    fn test_host_semantics() {
        assert_eq!(host_unary(Op::Dcd, 3).unwrap(), 8);
        assert_eq!(host_unary(Op::Ncd, 0).unwrap(), 0);
        assert_eq!(host_unary(Op::Abs, 0xFFFF).unwrap(), 1);
        assert_eq!(host_unary(Op::Sin, 64).unwrap(), 127);
        assert_eq!(host_binary(Op::Shl, 1, 20).unwrap(), 0);
        assert_eq!(host_binary(Op::B, 2, 3).unwrap(), 0xFFFF);
        assert_eq!(host_unary(Op::Hyp, 1), Err(ErrorCode::IllegalCcOperator));
    }

    #[test]
    fn test_variable_atom_rejected_by_cc_evaluator() {
        let mut s = ExpressionSlot::new();
        s.push_variable(false, false, VarSize::Word, 3).unwrap();
        assert_eq!(evaluate(&s), Err(ErrorCode::ExpectedDefinedSymbol));
    }

    #[test]
    fn test_append_stream_inserts_marker() {
        let mut a = ExpressionSlot::new();
        a.push_constant(1).unwrap();
        let mut b = ExpressionSlot::new();
        b.push_constant(2).unwrap();
        let before = a.len();
        a.append_stream(&b).unwrap();
        assert_eq!(a.len(), before + 1 + b.len());
    }
}
