//! Declaration resolution: PIN, CON, DATA, VAR and the gosub census.
//!
//! Declarations tolerate forward references, so each resolver runs in a
//! try-then-commit pattern: a pass that accepts "not resolvable yet" and a
//! mandatory pass that reports what never resolved. Successfully resolved
//! declarations cancel their elements so the statement compiler never sees
//! them.

use crate::compiler::Compiler;
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::expr::Op;
use crate::symbols::Symbol;
use crate::types::{Element, ElementKind, InstructionType, VarSize};

/// Totals gathered by the VAR counting pass, in declaration units.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VarTotals {
    pub counts: [u16; 4],
}

impl<'a> Compiler<'a> {
    /// Consume elements up to the statement end; the End itself stays.
    pub(crate) fn skip_statement(&mut self) -> Result<()> {
        while let Some((_, el)) = self.try_peek() {
            if el.kind == ElementKind::End {
                break;
            }
            self.get_element()?;
        }
        Ok(())
    }

    /// Evaluate a declaration-time constant expression: a left-to-right
    /// chain over `<< >> & | ^ + - * /` with optional unary minus.
    ///
    /// Returns `Ok(None)` when an operand is still undefined and
    /// `last_pass` is clear; the whole expression is consumed either way.
    pub(crate) fn resolve_constant_expr(&mut self, last_pass: bool) -> Result<Option<u16>> {
        let mut resolved = true;
        let mut acc: u16 = 0;
        let mut pending: Option<Op> = None;

        loop {
            // Operand, with optional unary minus.
            let (_, el) = self.get_element()?;
            let (value, ok) = if el.kind == ElementKind::BinaryOp && el.value == Op::Sub as u16 {
                let (_, operand) = self.get_element()?;
                let (v, ok) = self.constant_operand(operand, last_pass)?;
                (v.wrapping_neg(), ok)
            } else {
                self.constant_operand(el, last_pass)?
            };
            resolved &= ok;

            acc = match pending.take() {
                None => value,
                Some(op) if resolved => crate::expr::host_binary(op, acc, value)
                    .map_err(|code| CompileError::new(code, self.last_span))?,
                Some(_) => 0,
            };

            match self.try_peek_resolved() {
                Some((_, next))
                    if next.kind == ElementKind::BinaryOp
                        && Op::from_code(next.value as u8)
                            .is_some_and(|op| op.allowed_in_const_decl()) =>
                {
                    self.get_element()?;
                    pending = Some(Op::from_code(next.value as u8).unwrap());
                }
                _ => break,
            }
        }

        Ok(if resolved { Some(acc) } else { None })
    }

    /// One constant operand; `(value, resolved)`.
    fn constant_operand(&mut self, el: Element, last_pass: bool) -> Result<(u16, bool)> {
        match el.kind {
            ElementKind::Constant | ElementKind::CcConstant | ElementKind::PinNumber => {
                Ok((el.value, true))
            }
            ElementKind::Undefined if !last_pass => Ok((0, false)),
            ElementKind::Undefined => {
                Err(CompileError::new(ErrorCode::UndefinedSymbol, el.span()))
            }
            _ => Err(CompileError::new(ErrorCode::ExpectedConstant, el.span())),
        }
    }

    /// `name PIN constant` declarations (PBASIC 2.5).
    pub(crate) fn compile_pins(&mut self, last_pass: bool) -> Result<()> {
        self.elements.set_cursor(0);
        loop {
            let Some((idx, el)) = self.try_peek_resolved() else { break };
            if el.kind == ElementKind::End {
                self.get_element()?;
                continue;
            }
            let declares = matches!(self.peek_two(), Some((_, second)) if second.kind == ElementKind::Pin);
            if !declares {
                self.skip_statement()?;
                continue;
            }

            let (_, name_el) = self.get_element()?;
            if name_el.kind != ElementKind::Undefined {
                return Err(CompileError::new(
                    ErrorCode::SymbolAlreadyDefined,
                    name_el.span(),
                ));
            }
            self.get_element()?; // PIN keyword

            match self.resolve_constant_expr(last_pass)? {
                Some(value) => {
                    if value > 15 {
                        return Err(CompileError::new(
                            ErrorCode::PinOutOfRange,
                            self.last_span,
                        ));
                    }
                    let name = self.symbol_name(name_el.span());
                    self.symbols
                        .enter(Symbol::new(name, ElementKind::PinNumber, value))
                        .map_err(|code| CompileError::new(code, name_el.span()))?;
                    self.elements
                        .cancel(idx, self.elements.cursor().saturating_sub(1));
                }
                None => {
                    // Leave the declaration for the mandatory pass.
                }
            }
        }
        Ok(())
    }

    /// `name CON constant-expression`. Returns how many declarations this
    /// pass resolved, to drive the try-pass iteration.
    pub(crate) fn compile_constants(&mut self, last_pass: bool) -> Result<usize> {
        self.elements.set_cursor(0);
        let mut progress = 0usize;
        loop {
            let Some((idx, el)) = self.try_peek_resolved() else { break };
            if el.kind == ElementKind::End {
                self.get_element()?;
                continue;
            }
            let declares = matches!(self.peek_two(), Some((_, second)) if second.kind == ElementKind::Con);
            if !declares {
                self.skip_statement()?;
                continue;
            }

            let (_, name_el) = self.get_element()?;
            if name_el.kind != ElementKind::Undefined {
                return Err(CompileError::new(
                    ErrorCode::SymbolAlreadyDefined,
                    name_el.span(),
                ));
            }
            self.get_element()?; // CON keyword

            match self.resolve_constant_expr(last_pass)? {
                Some(value) => {
                    let name = self.symbol_name(name_el.span());
                    self.symbols
                        .enter(Symbol::new(name, ElementKind::Constant, value))
                        .map_err(|code| CompileError::new(code, name_el.span()))?;
                    self.elements
                        .cancel(idx, self.elements.cursor().saturating_sub(1));
                    progress += 1;
                }
                None => {}
            }
        }
        Ok(progress)
    }

    /// `[name] DATA [@addr,] [WORD] item[(count)] {, ...}`.
    ///
    /// The first pass walks allocation and defines labels; the commit pass
    /// evaluates values, writes the image and cancels the elements.
    pub(crate) fn compile_data(&mut self, last_pass: bool) -> Result<()> {
        self.elements.set_cursor(0);
        self.data_pointer = 0;
        loop {
            let Some((idx, el)) = self.try_peek_resolved() else { break };
            if el.kind == ElementKind::End {
                self.get_element()?;
                continue;
            }
            let (first, second) = match self.peek_two() {
                Some(pair) => pair,
                None => (el, el),
            };
            let unnamed = first.kind == ElementKind::Data;
            let named = !unnamed && second.kind == ElementKind::Data;
            if !(named || unnamed) {
                self.skip_statement()?;
                continue;
            }

            if named {
                let (_, name_el) = self.get_element()?;
                let defines = name_el.kind == ElementKind::Undefined;
                if !defines && !(last_pass && name_el.kind == ElementKind::Constant) {
                    return Err(CompileError::new(
                        ErrorCode::SymbolAlreadyDefined,
                        name_el.span(),
                    ));
                }
                self.get_element()?; // DATA keyword
                self.compile_data_block(Some(name_el), idx, last_pass)?;
            } else {
                self.get_element()?; // DATA keyword
                self.compile_data_block(None, idx, last_pass)?;
            }
        }
        Ok(())
    }

    fn compile_data_block(
        &mut self,
        name_el: Option<Element>,
        start_idx: usize,
        last_pass: bool,
    ) -> Result<()> {
        // Optional absolute placement.
        if self.check_kind(ElementKind::At)? {
            let at_span = self.last_span;
            // A hard evaluation always yields a value.
            let addr = self.resolve_constant_expr(true)?.unwrap_or(0);
            if usize::from(addr) >= crate::types::EEPROM_SIZE {
                return Err(CompileError::new(ErrorCode::EepromAddressOutOfRange, at_span));
            }
            self.data_pointer = addr;
            self.expect_comma()?;
        }

        if let Some(name_el) = name_el {
            if name_el.kind == ElementKind::Undefined {
                let name = self.symbol_name(name_el.span());
                let pointer = self.data_pointer;
                self.symbols
                    .enter(Symbol::new(name, ElementKind::Constant, pointer))
                    .map_err(|code| CompileError::new(code, name_el.span()))?;
            }
        }

        loop {
            let word_item = matches!(
                self.try_peek_resolved(),
                Some((_, el)) if el.kind == ElementKind::VariableAuto && el.value == VarSize::Word as u16
            );
            if word_item {
                self.get_element()?;
            }

            // Bare `(count)` reserves without writing.
            if self.check_kind(ElementKind::Left)? {
                let count = self.data_repeat_count()?;
                self.reserve_data(count, word_item, last_pass, self.last_span)?;
            } else {
                let item_start = match self.try_peek_resolved() {
                    Some((_, el)) => el.span().start,
                    None => self.last_span.start,
                };
                let value = self.resolve_constant_expr(last_pass)?;
                let item_end = self.last_span.start + self.last_span.length;
                let span = Span::new(item_start, item_end.saturating_sub(item_start));

                let count = if self.check_kind(ElementKind::Left)? {
                    self.data_repeat_count()?
                } else {
                    1
                };
                self.write_data(value, count, word_item, last_pass, span)?;
            }

            if !self.check_kind(ElementKind::Comma)? {
                break;
            }
        }

        if last_pass {
            self.elements
                .cancel(start_idx, self.elements.cursor().saturating_sub(1));
        } else {
            // Let the commit pass see the block again.
            self.skip_statement()?;
        }
        Ok(())
    }

    /// `(count)` with the opening paren already consumed.
    fn data_repeat_count(&mut self) -> Result<u16> {
        let span = self.last_span;
        let count = self.resolve_constant_expr(true)?.unwrap_or(0);
        self.expect_kind(ElementKind::Right, ErrorCode::ExpectedRightParen)?;
        if count == 0 || count > 255 {
            return Err(CompileError::new(ErrorCode::InvalidArraySize, span));
        }
        Ok(count)
    }

    fn reserve_data(
        &mut self,
        count: u16,
        word_item: bool,
        last_pass: bool,
        span: Span,
    ) -> Result<()> {
        let bytes = count * if word_item { 2 } else { 1 };
        for _ in 0..bytes {
            if last_pass {
                self.eeprom
                    .write_data_byte(self.data_pointer, 0, false, span)?;
            }
            self.data_pointer = self.advance_data_pointer(span)?;
        }
        Ok(())
    }

    fn write_data(
        &mut self,
        value: Option<u16>,
        count: u16,
        word_item: bool,
        last_pass: bool,
        span: Span,
    ) -> Result<()> {
        for _ in 0..count {
            if last_pass {
                let value = value.ok_or_else(|| {
                    CompileError::new(ErrorCode::UndefinedSymbol, span)
                })?;
                self.eeprom
                    .write_data_byte(self.data_pointer, value as u8, true, span)?;
                if word_item {
                    let pointer = self.advance_data_pointer(span)?;
                    self.data_pointer = pointer;
                    self.eeprom
                        .write_data_byte(self.data_pointer, (value >> 8) as u8, true, span)?;
                }
            } else if word_item {
                self.data_pointer = self.advance_data_pointer(span)?;
            }
            self.data_pointer = self.advance_data_pointer(span)?;
        }
        Ok(())
    }

    fn advance_data_pointer(&mut self, span: Span) -> Result<u16> {
        if usize::from(self.data_pointer) + 1 > crate::types::EEPROM_SIZE {
            return Err(CompileError::new(ErrorCode::EepromAddressOutOfRange, span));
        }
        Ok(self.data_pointer + 1)
    }

    /// `name VAR BIT|NIB|BYTE|WORD[(size)]` and `alias VAR base.modifier`.
    pub(crate) fn compile_var(&mut self, last_pass: bool) -> Result<()> {
        self.elements.set_cursor(0);

        if last_pass {
            // Pools pack from largest to smallest above the register words.
            let totals = self.var_totals;
            let word_base = 3u16;
            let byte_base = (word_base + totals.counts[VarSize::Word as usize]) * 2;
            let nib_base = (byte_base + totals.counts[VarSize::Byte as usize]) * 2;
            let bit_base = (nib_base + totals.counts[VarSize::Nib as usize]) * 4;
            if bit_base + totals.counts[VarSize::Bit as usize] > 256 {
                return Err(CompileError::new(
                    ErrorCode::OutOfVariableSpace,
                    Span::new(0, 0),
                ));
            }
            self.var_bases = [bit_base, nib_base, byte_base, word_base];
            self.var_used = [0; 4];
            for (slot, total) in self.rec.var_counts.iter_mut().zip(totals.counts) {
                *slot = total.min(255) as u8;
            }
        } else {
            self.var_totals = VarTotals::default();
        }

        loop {
            let Some((idx, el)) = self.try_peek_resolved() else { break };
            if el.kind == ElementKind::End {
                self.get_element()?;
                continue;
            }
            let declares = matches!(self.peek_two(), Some((_, second)) if second.kind == ElementKind::Var);
            if !declares {
                self.skip_statement()?;
                continue;
            }

            let (_, name_el) = self.get_element()?;
            if name_el.kind != ElementKind::Undefined {
                return Err(CompileError::new(
                    ErrorCode::SymbolAlreadyDefined,
                    name_el.span(),
                ));
            }
            self.get_element()?; // VAR keyword

            let (_, type_el) = self.get_element()?;
            match type_el.kind {
                ElementKind::VariableAuto => {
                    let size = VarSize::from_code(type_el.value);
                    let count = if self.check_kind(ElementKind::Left)? {
                        self.data_repeat_count()?
                    } else {
                        1
                    };
                    if !last_pass {
                        let total = &mut self.var_totals.counts[size as usize];
                        *total += count;
                        if *total > 255 {
                            return Err(CompileError::new(
                                ErrorCode::OutOfVariableSpace,
                                name_el.span(),
                            ));
                        }
                    } else {
                        let address =
                            self.var_bases[size as usize] + self.var_used[size as usize];
                        self.var_used[size as usize] += count;
                        let name = self.symbol_name(name_el.span());
                        self.symbols
                            .enter(Symbol::new(
                                name,
                                ElementKind::Variable,
                                Element::variable_value(size, address),
                            ))
                            .map_err(|code| CompileError::new(code, name_el.span()))?;
                        self.elements
                            .cancel(idx, self.elements.cursor().saturating_sub(1));
                    }
                }
                ElementKind::Variable if last_pass => {
                    // Alias with an optional modifier chain.
                    let mut size = Element::variable_size(type_el.value);
                    let mut address = Element::variable_address(type_el.value);
                    while self.check_kind(ElementKind::Period)? {
                        let (_, modifier) = self.get_element()?;
                        if modifier.kind != ElementKind::VariableMod {
                            return Err(CompileError::new(
                                ErrorCode::ExpectedModifier,
                                modifier.span(),
                            ));
                        }
                        let (new_size, new_address) =
                            apply_modifier(size, address, modifier.value)
                                .map_err(|code| CompileError::new(code, modifier.span()))?;
                        size = new_size;
                        address = new_address;
                    }
                    let name = self.symbol_name(name_el.span());
                    self.symbols
                        .enter(Symbol::new(
                            name,
                            ElementKind::Variable,
                            Element::variable_value(size, address),
                        ))
                        .map_err(|code| CompileError::new(code, name_el.span()))?;
                    self.elements
                        .cancel(idx, self.elements.cursor().saturating_sub(1));
                }
                ElementKind::Variable | ElementKind::Undefined if !last_pass => {
                    // Alias bases resolve on the commit pass.
                    self.skip_statement()?;
                }
                ElementKind::Undefined => {
                    return Err(CompileError::new(
                        ErrorCode::UndefinedSymbol,
                        type_el.span(),
                    ));
                }
                _ => {
                    return Err(CompileError::new(
                        ErrorCode::ExpectedVarType,
                        type_el.span(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Count GOSUBs (including ON...GOSUB stubs) to size the return-slot
    /// table at the base of the image.
    pub(crate) fn count_gosubs(&mut self) -> Result<()> {
        self.gosub_count = 0;
        self.next_gosub = 0;
        let mut i = 0usize;
        let mut last_span = Span::default();
        let mut in_on = false;

        while i < self.elements.len() {
            let el = self.elements.get(i);
            i += 1;
            match el.kind {
                ElementKind::Cancel => continue,
                ElementKind::End => {
                    in_on = false;
                }
                ElementKind::Instruction
                    if el.value == InstructionType::On as u16 =>
                {
                    in_on = true;
                }
                ElementKind::Instruction
                    if el.value == InstructionType::Gosub as u16 =>
                {
                    last_span = el.span();
                    if in_on {
                        // One stub per target: labels are comma separated.
                        let mut targets = 1u16;
                        let mut j = i;
                        while j < self.elements.len() {
                            let next = self.elements.get(j);
                            j += 1;
                            match next.kind {
                                ElementKind::Cancel => continue,
                                ElementKind::Comma => targets += 1,
                                ElementKind::End => break,
                                _ => {}
                            }
                        }
                        self.gosub_count += targets;
                        i = j;
                        in_on = false;
                    } else {
                        self.gosub_count += 1;
                    }
                }
                _ => {}
            }
            if self.gosub_count > 255 {
                return Err(CompileError::new(ErrorCode::TooManyGosubs, last_span));
            }
        }
        Ok(())
    }
}

/// Apply one variable modifier to a (size, address) pair.
pub(crate) fn apply_modifier(
    size: VarSize,
    address: u16,
    modifier: u16,
) -> std::result::Result<(VarSize, u16), ErrorCode> {
    let mod_size = crate::symbols::modifier_size(modifier);
    let mut offset = crate::symbols::modifier_offset(modifier);
    if mod_size > size {
        return Err(ErrorCode::ModifierTooLarge);
    }
    let units = mod_size.units_in(size);
    if offset == crate::symbols::MOD_HIGH {
        offset = units - 1;
    }
    if offset >= units {
        return Err(ErrorCode::ModifierOutOfRange);
    }
    Ok((mod_size, address * units + offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_modifier_shapes() {
        // w.LOWBYTE of word 3 is byte 6.
        let low = crate::symbols::modifier_value(VarSize::Byte, 0);
        assert_eq!(apply_modifier(VarSize::Word, 3, low), Ok((VarSize::Byte, 6)));
        // w.HIGHNIB of word 3 is nib 15.
        let high_nib = crate::symbols::modifier_value(VarSize::Nib, crate::symbols::MOD_HIGH);
        assert_eq!(
            apply_modifier(VarSize::Word, 3, high_nib),
            Ok((VarSize::Nib, 15))
        );
        // BIT15 of a byte is out of range.
        let bit15 = crate::symbols::modifier_value(VarSize::Bit, 15);
        assert_eq!(
            apply_modifier(VarSize::Byte, 0, bit15),
            Err(ErrorCode::ModifierOutOfRange)
        );
        // A WORD modifier cannot grow a byte.
        let word_mod = crate::symbols::modifier_value(VarSize::Word, 0);
        assert_eq!(
            apply_modifier(VarSize::Byte, 4, word_mod),
            Err(ErrorCode::ModifierTooLarge)
        );
    }
}
