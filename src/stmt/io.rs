//! Serial, LCD, I2C and 1-Wire statement compilers.
//!
//! Bracketed IO sequences flatten into one firmware command per item: the
//! shared pin/baud expressions are re-emitted, then a format constant, the
//! item's own expressions, and the instruction opcode. DEBUG is SEROUT to
//! pin 16 at the module's console baudmode.

use super::Ic;
use crate::compiler::Compiler;
use crate::error::{CompileError, ErrorCode, Result};
use crate::expr::ExpressionSlot;
use crate::types::{Element, ElementKind};

/// Item class stored in bits 12..=15 of the format constant; the low bits
/// carry the number-formatter detail.
pub mod item_class {
    /// Raw byte.
    pub const RAW: u16 = 0;
    /// Formatted number (DEC/HEX/BIN family detail in the low bits).
    pub const NUMBER: u16 = 1;
    /// Byte string from/to a variable.
    pub const STR: u16 = 2;
    /// Repeated byte.
    pub const REP: u16 = 3;
    /// Discard incoming bytes.
    pub const SKIP: u16 = 4;
    /// Hold until a byte matches.
    pub const WAIT: u16 = 5;
    /// Hold until a variable's string matches.
    pub const WAITSTR: u16 = 6;
    /// Scratchpad string (BS2p family).
    pub const SPSTR: u16 = 7;
}

/// Console baudmode per module for DEBUG/DEBUGIN.
const DEBUG_BAUD: [u16; 5] = [84, 84, 240, 240, 84];

/// Pin 16 addresses the programming port.
const DEBUG_PIN: u16 = 16;

fn format_value(class: u16, detail: u16) -> u16 {
    (class << 12) | (detail & 0x0FFF)
}

impl<'a> Compiler<'a> {
    fn const_slot(&mut self, value: u16) -> Result<ExpressionSlot> {
        let mut slot = ExpressionSlot::new();
        slot.push_constant(value)
            .map_err(|code| CompileError::new(code, self.last_span))?;
        Ok(slot)
    }

    fn get_read_slot(&mut self) -> Result<ExpressionSlot> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.get_read_write(&mut slot, false)?;
        Ok(slot)
    }

    fn get_write_slot(&mut self) -> Result<ExpressionSlot> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.get_read_write(&mut slot, true)?;
        Ok(slot)
    }

    /// Emit one sequence command: prefixes, format, item expressions,
    /// opcode, then any trailing label fields.
    fn emit_io_item(
        &mut self,
        prefixes: &[ExpressionSlot],
        fmt: u16,
        args: &[&ExpressionSlot],
        ic: Ic,
        tail: &[(usize, Element)],
    ) -> Result<()> {
        for prefix in prefixes {
            self.enter_expression(prefix)?;
        }
        self.enter_constant(fmt)?;
        for arg in args {
            self.enter_expression(arg)?;
        }
        self.enter0(ic)?;
        for (idx, el) in tail {
            self.enter_label_address(*idx, *el)?;
        }
        Ok(())
    }

    /// `? expr` debug shorthand: echo the expression's source text, then
    /// its value, then a carriage return.
    fn emit_query_item(
        &mut self,
        prefixes: &[ExpressionSlot],
        ic: Ic,
        tail: &[(usize, Element)],
        as_char: bool,
    ) -> Result<()> {
        let start = match self.try_peek_resolved() {
            Some((_, el)) => el.span().start,
            None => self.last_span.start,
        };
        let value = self.get_value(false)?;
        let end = self.last_span.start + self.last_span.length;
        let text: Vec<u8> = self.src[start..end.min(self.src_len)].to_vec();

        for c in text.into_iter().chain(*b" = ") {
            let slot = self.const_slot(u16::from(c))?;
            self.emit_io_item(prefixes, format_value(item_class::RAW, 0), &[&slot], ic, tail)?;
        }
        let fmt = if as_char {
            format_value(item_class::RAW, 0)
        } else {
            format_value(item_class::NUMBER, 0)
        };
        self.emit_io_item(prefixes, fmt, &[&value], ic, tail)?;
        let cr = self.const_slot(13)?;
        self.emit_io_item(prefixes, format_value(item_class::RAW, 0), &[&cr], ic, tail)
    }

    /// Output item list. `bracketed` sequences end at `]`, bare ones
    /// (DEBUG) at end-of-line.
    fn compile_output_items(
        &mut self,
        prefixes: &[ExpressionSlot],
        ic: Ic,
        tail: &[(usize, Element)],
        bracketed: bool,
    ) -> Result<()> {
        loop {
            let Some((_, el)) = self.try_peek_resolved() else { break };
            if el.kind == ElementKind::End {
                if bracketed {
                    return Err(CompileError::new(
                        ErrorCode::ExpectedCommaOrBracket,
                        el.span(),
                    ));
                }
                break;
            }
            match el.kind {
                ElementKind::Question => {
                    self.get_element()?;
                    self.emit_query_item(prefixes, ic, tail, false)?;
                }
                ElementKind::AsciiIo => {
                    self.get_element()?;
                    self.expect_kind(ElementKind::Question, ErrorCode::ExpectedQuestion)?;
                    self.emit_query_item(prefixes, ic, tail, true)?;
                }
                ElementKind::NumberIo | ElementKind::AnyNumberIo => {
                    self.get_element()?;
                    let value = self.get_value(false)?;
                    let fmt = format_value(item_class::NUMBER, el.value);
                    self.emit_io_item(prefixes, fmt, &[&value], ic, tail)?;
                }
                ElementKind::StringIo => {
                    self.get_element()?;
                    let var = self.get_read_slot()?;
                    let count = if self.check_kind(ElementKind::Backslash)? {
                        self.get_value(false)?
                    } else {
                        self.const_slot(0)?
                    };
                    let fmt = format_value(item_class::STR, 0);
                    self.emit_io_item(prefixes, fmt, &[&var, &count], ic, tail)?;
                }
                ElementKind::RepeatIo => {
                    self.get_element()?;
                    let value = self.get_value(false)?;
                    self.expect_kind(ElementKind::Backslash, ErrorCode::ExpectedBackslash)?;
                    let count = self.get_value(false)?;
                    let fmt = format_value(item_class::REP, 0);
                    self.emit_io_item(prefixes, fmt, &[&value, &count], ic, tail)?;
                }
                ElementKind::SpStringIo => {
                    self.get_element()?;
                    let count = self.get_value(false)?;
                    let fmt = format_value(item_class::SPSTR, 0);
                    self.emit_io_item(prefixes, fmt, &[&count], ic, tail)?;
                }
                _ => {
                    let value = self.get_value(false)?;
                    self.emit_io_item(
                        prefixes,
                        format_value(item_class::RAW, 0),
                        &[&value],
                        ic,
                        tail,
                    )?;
                }
            }

            if self.check_kind(ElementKind::Comma)? {
                continue;
            }
            if bracketed {
                self.expect_kind(ElementKind::RightBracket, ErrorCode::ExpectedCommaOrBracket)?;
            } else {
                self.check_statement_end()?;
            }
            break;
        }
        Ok(())
    }

    /// Input item list; same framing rules as output.
    fn compile_input_items(
        &mut self,
        prefixes: &[ExpressionSlot],
        ic: Ic,
        tail: &[(usize, Element)],
        bracketed: bool,
    ) -> Result<()> {
        loop {
            let Some((_, el)) = self.try_peek_resolved() else { break };
            if el.kind == ElementKind::End {
                if bracketed {
                    return Err(CompileError::new(
                        ErrorCode::ExpectedCommaOrBracket,
                        el.span(),
                    ));
                }
                break;
            }
            match el.kind {
                ElementKind::NumberIo | ElementKind::AnyNumberIo => {
                    self.get_element()?;
                    let var = self.get_write_slot()?;
                    let fmt = format_value(item_class::NUMBER, el.value);
                    self.emit_io_item(prefixes, fmt, &[&var], ic, tail)?;
                }
                ElementKind::StringIo | ElementKind::WaitStringIo => {
                    self.get_element()?;
                    let var = self.get_write_slot()?;
                    let count = if self.check_kind(ElementKind::Backslash)? {
                        self.get_value(false)?
                    } else {
                        self.const_slot(0)?
                    };
                    let class = if el.kind == ElementKind::StringIo {
                        item_class::STR
                    } else {
                        item_class::WAITSTR
                    };
                    self.emit_io_item(
                        prefixes,
                        format_value(class, 0),
                        &[&var, &count],
                        ic,
                        tail,
                    )?;
                }
                ElementKind::WaitIo => {
                    self.get_element()?;
                    self.expect_kind(ElementKind::Left, ErrorCode::ExpectedLeftParen)?;
                    loop {
                        let value = self.get_value(false)?;
                        self.emit_io_item(
                            prefixes,
                            format_value(item_class::WAIT, 0),
                            &[&value],
                            ic,
                            tail,
                        )?;
                        if !self.check_kind(ElementKind::Comma)? {
                            break;
                        }
                    }
                    self.expect_kind(ElementKind::Right, ErrorCode::ExpectedRightParen)?;
                }
                ElementKind::SkipIo => {
                    self.get_element()?;
                    let count = self.get_value(false)?;
                    self.emit_io_item(
                        prefixes,
                        format_value(item_class::SKIP, 0),
                        &[&count],
                        ic,
                        tail,
                    )?;
                }
                ElementKind::SpStringIo => {
                    self.get_element()?;
                    let count = self.get_value(false)?;
                    self.emit_io_item(
                        prefixes,
                        format_value(item_class::SPSTR, 0),
                        &[&count],
                        ic,
                        tail,
                    )?;
                }
                _ => {
                    let var = self.get_write_slot()?;
                    self.emit_io_item(
                        prefixes,
                        format_value(item_class::RAW, 0),
                        &[&var],
                        ic,
                        tail,
                    )?;
                }
            }

            if self.check_kind(ElementKind::Comma)? {
                continue;
            }
            if bracketed {
                self.expect_kind(ElementKind::RightBracket, ErrorCode::ExpectedCommaOrBracket)?;
            } else {
                self.check_statement_end()?;
            }
            break;
        }
        Ok(())
    }

    // --- SEROUT / SERIN / DEBUG ---

    /// `SEROUT tpin{\fpin}, baudmode, {pace,} [items]`.
    pub(crate) fn compile_serout(&mut self) -> Result<()> {
        let pin = self.get_value(true)?;
        let mut prefixes = vec![pin];
        let flow = self.check_kind(ElementKind::Backslash)?;
        if flow {
            let fpin = self.get_value(true)?;
            prefixes.push(fpin);
        }
        self.expect_comma()?;
        let baud = self.get_value(false)?;
        prefixes.push(baud);

        self.expect_comma()?;
        if !flow {
            // Optional pace; constant zero when absent.
            let pace = if !matches!(
                self.try_peek_resolved(),
                Some((_, el)) if el.kind == ElementKind::LeftBracket
            ) {
                let pace = self.get_value(false)?;
                self.expect_comma()?;
                pace
            } else {
                self.const_slot(0)?
            };
            prefixes.push(pace);
        }

        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        let ic = if flow { Ic::SeroutFlow } else { Ic::SeroutNoFlow };
        self.compile_output_items(&prefixes, ic, &[], true)?;
        self.check_statement_end()
    }

    /// `SERIN rpin{\fpin}, baudmode, {plabel,} {timeout, tlabel,} [items]`.
    pub(crate) fn compile_serin(&mut self) -> Result<()> {
        let pin = self.get_value(true)?;
        let mut prefixes = vec![pin];
        let flow = self.check_kind(ElementKind::Backslash)?;
        if flow {
            let fpin = self.get_value(true)?;
            prefixes.push(fpin);
        }
        self.expect_comma()?;
        let baud = self.get_value(false)?;
        prefixes.push(baud);
        self.expect_comma()?;

        let mut tail: Vec<(usize, Element)> = Vec::new();
        // Optional parity-error label.
        if let Some((idx, el)) = self.try_peek_resolved() {
            if matches!(el.kind, ElementKind::Address | ElementKind::Undefined) {
                self.get_element()?;
                self.expect_comma()?;
                tail.push((idx, el));
            }
        }
        // Optional timeout and its label.
        if !matches!(
            self.try_peek_resolved(),
            Some((_, el)) if el.kind == ElementKind::LeftBracket
        ) {
            let timeout = self.get_value(false)?;
            prefixes.push(timeout);
            self.expect_comma()?;
            let (idx, el) = self.get_element()?;
            if !matches!(el.kind, ElementKind::Address | ElementKind::Undefined) {
                return Err(CompileError::new(ErrorCode::ExpectedLabel, el.span()));
            }
            tail.push((idx, el));
            self.expect_comma()?;
        }

        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        let ic = if flow { Ic::SerinFlow } else { Ic::SerinNoFlow };
        self.compile_input_items(&prefixes, ic, &tail, true)?;
        self.check_statement_end()
    }

    /// `DEBUG item {, item}`: console SEROUT.
    pub(crate) fn compile_debug(&mut self) -> Result<()> {
        self.rec.debug_flag = true;
        let baud = DEBUG_BAUD[self.module.index()];
        let prefixes = vec![
            self.const_slot(DEBUG_PIN)?,
            self.const_slot(baud)?,
            self.const_slot(0)?,
        ];
        self.compile_output_items(&prefixes, Ic::SeroutNoFlow, &[], false)?;
        self.check_statement_end()
    }

    /// `DEBUGIN item {, item}`: console SERIN.
    pub(crate) fn compile_debugin(&mut self) -> Result<()> {
        self.rec.debug_flag = true;
        let baud = DEBUG_BAUD[self.module.index()];
        let prefixes = vec![self.const_slot(DEBUG_PIN)?, self.const_slot(baud)?];
        self.compile_input_items(&prefixes, Ic::SerinNoFlow, &[], false)?;
        self.check_statement_end()
    }

    // --- Tone and powerline output ---

    /// `DTMFOUT pin, {ontime, offtime,} [tone {, tone}]`.
    pub(crate) fn compile_dtmfout(&mut self) -> Result<()> {
        let pin = self.get_value(true)?;
        self.expect_comma()?;
        let (on_time, off_time) = if !matches!(
            self.try_peek_resolved(),
            Some((_, el)) if el.kind == ElementKind::LeftBracket
        ) {
            let on = self.get_value(false)?;
            self.expect_comma()?;
            let off = self.get_value(false)?;
            self.expect_comma()?;
            (on, off)
        } else {
            (self.const_slot(200)?, self.const_slot(50)?)
        };

        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        loop {
            let tone = self.get_value(false)?;
            self.enter_expression(&pin)?;
            self.enter_expression(&on_time)?;
            self.enter_expression(&off_time)?;
            self.enter_expression(&tone)?;
            self.enter0(Ic::Dtmfout)?;
            if !self.check_kind(ElementKind::Comma)? {
                break;
            }
        }
        self.expect_kind(ElementKind::RightBracket, ErrorCode::ExpectedCommaOrBracket)?;
        self.check_statement_end()
    }

    /// `XOUT mpin, zpin, [house\key{\cycles} {, ...}]`.
    pub(crate) fn compile_xout(&mut self) -> Result<()> {
        let mpin = self.get_value(true)?;
        self.expect_comma()?;
        let zpin = self.get_value(true)?;
        self.expect_comma()?;
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        loop {
            let house = self.get_value(false)?;
            self.expect_kind(ElementKind::Backslash, ErrorCode::ExpectedBackslash)?;
            let key = self.get_value(false)?;
            let cycles = if self.check_kind(ElementKind::Backslash)? {
                self.get_value(false)?
            } else {
                self.const_slot(2)?
            };
            self.enter_expression(&mpin)?;
            self.enter_expression(&zpin)?;
            self.enter_expression(&house)?;
            self.enter_expression(&key)?;
            self.enter_expression(&cycles)?;
            self.enter0(Ic::Xout)?;
            if !self.check_kind(ElementKind::Comma)? {
                break;
            }
        }
        self.expect_kind(ElementKind::RightBracket, ErrorCode::ExpectedCommaOrBracket)?;
        self.check_statement_end()
    }

    // --- Synchronous shift ---

    /// `SHIFTIN dpin, cpin, mode, [var{\bits} {, ...}]`.
    pub(crate) fn compile_shiftin(&mut self) -> Result<()> {
        let dpin = self.get_value(true)?;
        self.expect_comma()?;
        let cpin = self.get_value(true)?;
        self.expect_comma()?;
        let mode = self.get_value(false)?;
        self.expect_comma()?;
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        loop {
            let var = self.get_write_slot()?;
            let bits = if self.check_kind(ElementKind::Backslash)? {
                self.get_value(false)?
            } else {
                self.const_slot(8)?
            };
            self.enter_expression(&dpin)?;
            self.enter_expression(&cpin)?;
            self.enter_expression(&mode)?;
            self.enter_expression(&bits)?;
            self.enter_expression(&var)?;
            self.enter0(Ic::Shiftin)?;
            if !self.check_kind(ElementKind::Comma)? {
                break;
            }
        }
        self.expect_kind(ElementKind::RightBracket, ErrorCode::ExpectedCommaOrBracket)?;
        self.check_statement_end()
    }

    /// `SHIFTOUT dpin, cpin, mode, [value{\bits} {, ...}]`.
    pub(crate) fn compile_shiftout(&mut self) -> Result<()> {
        let dpin = self.get_value(true)?;
        self.expect_comma()?;
        let cpin = self.get_value(true)?;
        self.expect_comma()?;
        let mode = self.get_value(false)?;
        self.expect_comma()?;
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        loop {
            let value = self.get_value(false)?;
            let bits = if self.check_kind(ElementKind::Backslash)? {
                self.get_value(false)?
            } else {
                self.const_slot(8)?
            };
            self.enter_expression(&dpin)?;
            self.enter_expression(&cpin)?;
            self.enter_expression(&mode)?;
            self.enter_expression(&bits)?;
            self.enter_expression(&value)?;
            self.enter0(Ic::Shiftout)?;
            if !self.check_kind(ElementKind::Comma)? {
                break;
            }
        }
        self.expect_kind(ElementKind::RightBracket, ErrorCode::ExpectedCommaOrBracket)?;
        self.check_statement_end()
    }

    // --- LCD (BS2p family) ---

    /// `LCDCMD pin, command`.
    pub(crate) fn compile_lcdcmd(&mut self) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.enter0(Ic::Lcdcmd)?;
        self.check_statement_end()
    }

    /// `LCDOUT pin, command, [items]`.
    pub(crate) fn compile_lcdout(&mut self) -> Result<()> {
        let pin = self.get_value(true)?;
        self.expect_comma()?;
        let command = self.get_value(false)?;
        self.expect_comma()?;
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        self.compile_output_items(&[pin, command], Ic::Lcdout, &[], true)?;
        self.check_statement_end()
    }

    /// `LCDIN pin, command, [items]`.
    pub(crate) fn compile_lcdin(&mut self) -> Result<()> {
        let pin = self.get_value(true)?;
        self.expect_comma()?;
        let command = self.get_value(false)?;
        self.expect_comma()?;
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        self.compile_input_items(&[pin, command], Ic::Lcdin, &[], true)?;
        self.check_statement_end()
    }

    // --- I2C (BS2p family) ---

    fn get_i2c_head(&mut self) -> Result<(Vec<ExpressionSlot>, bool)> {
        let pin = self.get_value(true)?;
        self.expect_comma()?;
        let slave = self.get_value(false)?;
        self.expect_comma()?;
        let mut prefixes = vec![pin, slave];
        let mut extended = false;
        if !matches!(
            self.try_peek_resolved(),
            Some((_, el)) if el.kind == ElementKind::LeftBracket
        ) {
            extended = true;
            let address = self.get_value(false)?;
            prefixes.push(address);
            if self.check_kind(ElementKind::Backslash)? {
                let low_address = self.get_value(false)?;
                prefixes.push(low_address);
            }
            self.expect_comma()?;
        }
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        Ok((prefixes, extended))
    }

    /// `I2CIN pin, slave, {address{\lowaddress},} [items]`.
    pub(crate) fn compile_i2cin(&mut self) -> Result<()> {
        let (prefixes, extended) = self.get_i2c_head()?;
        let ic = if extended { Ic::I2cinEx } else { Ic::I2cinNoex };
        self.compile_input_items(&prefixes, ic, &[], true)?;
        self.check_statement_end()
    }

    /// `I2COUT pin, slave, {address{\lowaddress},} [items]`.
    pub(crate) fn compile_i2cout(&mut self) -> Result<()> {
        let (prefixes, extended) = self.get_i2c_head()?;
        let ic = if extended { Ic::I2coutEx } else { Ic::I2coutNoex };
        self.compile_output_items(&prefixes, ic, &[], true)?;
        self.check_statement_end()
    }

    // --- 1-Wire (BS2p family) ---

    /// `OWIN pin, mode, [items]`.
    pub(crate) fn compile_owin(&mut self) -> Result<()> {
        let pin = self.get_value(true)?;
        self.expect_comma()?;
        let mode = self.get_value(false)?;
        self.expect_comma()?;
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        self.compile_input_items(&[pin, mode], Ic::Owin, &[], true)?;
        self.check_statement_end()
    }

    /// `OWOUT pin, mode, [items]`.
    pub(crate) fn compile_owout(&mut self) -> Result<()> {
        let pin = self.get_value(true)?;
        self.expect_comma()?;
        let mode = self.get_value(false)?;
        self.expect_comma()?;
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        self.compile_output_items(&[pin, mode], Ic::Owout, &[], true)?;
        self.check_statement_end()
    }
}
