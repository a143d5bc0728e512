//! Pin, timing, memory and table instruction compilers.

use super::Ic;
use crate::compiler::Compiler;
use crate::error::Result;
use crate::expr::ExpressionSlot;
use crate::types::ElementKind;

impl<'a> Compiler<'a> {
    /// `OP pin` where the operand is a pin number.
    pub(crate) fn compile_pin_op(&mut self, ic: Ic) -> Result<()> {
        self.get_value_enter(true)?;
        self.enter0(ic)?;
        self.check_statement_end()
    }

    /// `OP pin, state`.
    pub(crate) fn compile_pin_state(&mut self, ic: Ic) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.enter0(ic)?;
        self.check_statement_end()
    }

    /// `OP pin, state, resultvar`.
    pub(crate) fn compile_pin_state_var(&mut self, ic: Ic) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_write_enter()?;
        self.enter0(ic)?;
        self.check_statement_end()
    }

    /// `PULSOUT pin, duration`.
    pub(crate) fn compile_pulsout(&mut self) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.enter0(Ic::Pulsout)?;
        self.check_statement_end()
    }

    /// `COUNT pin, duration, resultvar`.
    pub(crate) fn compile_count(&mut self) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_write_enter()?;
        self.enter0(Ic::Count)?;
        self.check_statement_end()
    }

    /// `PWM pin, duty, cycles`.
    pub(crate) fn compile_pwm(&mut self) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.enter0(Ic::Pwm)?;
        self.check_statement_end()
    }

    /// `RANDOM wordvar`.
    pub(crate) fn compile_random(&mut self) -> Result<()> {
        self.get_write_enter()?;
        self.enter0(Ic::Random)?;
        self.check_statement_end()
    }

    /// `READ location, resultvar`.
    pub(crate) fn compile_read(&mut self) -> Result<()> {
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_write_enter()?;
        self.enter0(Ic::Read)?;
        self.check_statement_end()
    }

    /// `WRITE location, value`.
    pub(crate) fn compile_write(&mut self) -> Result<()> {
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.enter0(Ic::Write)?;
        self.check_statement_end()
    }

    /// `GET location, resultvar` (scratchpad parts).
    pub(crate) fn compile_get(&mut self) -> Result<()> {
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_write_enter()?;
        self.enter0(Ic::Get)?;
        self.check_statement_end()
    }

    /// `PUT location, value`.
    pub(crate) fn compile_put(&mut self) -> Result<()> {
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.enter0(Ic::Put)?;
        self.check_statement_end()
    }

    /// `BUTTON pin, downstate, delay, rate, workvar, targetstate, label`.
    pub(crate) fn compile_button(&mut self) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_byte_write_enter()?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.enter0(Ic::Button)?;
        self.get_address_enter()?;
        self.check_statement_end()
    }

    /// `FREQOUT pin, duration, freq1 {, freq2}`.
    pub(crate) fn compile_freqout(&mut self) -> Result<()> {
        self.get_value_enter(true)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        self.expect_comma()?;
        self.get_value_enter(false)?;
        if self.check_kind(ElementKind::Comma)? {
            self.get_value_enter(false)?;
            self.enter0(Ic::Freqout2)?;
        } else {
            self.enter0(Ic::Freqout1)?;
        }
        self.check_statement_end()
    }

    /// Parse the bracketed value list shared by LOOKUP and LOOKDOWN.
    fn get_value_list(&mut self) -> Result<Vec<ExpressionSlot>> {
        self.expect_kind(ElementKind::LeftBracket, crate::error::ErrorCode::ExpectedLeftBracket)?;
        let mut values = Vec::new();
        loop {
            values.push(self.get_value(false)?);
            if self.check_kind(ElementKind::Comma)? {
                continue;
            }
            self.expect_kind(
                ElementKind::RightBracket,
                crate::error::ErrorCode::ExpectedCommaOrBracket,
            )?;
            break;
        }
        Ok(values)
    }

    /// `LOOKUP index, [value, ...], resultvar`: one firmware command per
    /// table entry, carrying the entry's position.
    pub(crate) fn compile_lookup(&mut self) -> Result<()> {
        let index = self.get_value(false)?;
        self.expect_comma()?;
        let values = self.get_value_list()?;
        self.expect_comma()?;
        self.stack_idx = 0;
        let mut target = ExpressionSlot::new();
        self.get_read_write(&mut target, true)?;

        for (position, value) in values.iter().enumerate() {
            self.enter_expression(&index)?;
            self.enter_constant(position as u16)?;
            self.enter_expression(value)?;
            self.enter_expression(&target)?;
            self.enter0(Ic::Lookup)?;
        }
        self.check_statement_end()
    }

    /// `LOOKDOWN target, {op,} [value, ...], resultvar`: one comparison
    /// command per table entry.
    pub(crate) fn compile_lookdown(&mut self) -> Result<()> {
        let target = self.get_value(false)?;
        self.expect_comma()?;

        // Optional comparison operator, equality by default.
        let mut op = crate::expr::Op::E;
        if let Some((_, el)) = self.try_peek_resolved() {
            if el.kind == ElementKind::Cond1Op {
                self.get_element()?;
                op = crate::expr::Op::from_code(el.value as u8).unwrap_or(crate::expr::Op::E);
                self.expect_comma()?;
            }
        }

        let values = self.get_value_list()?;
        self.expect_comma()?;
        self.stack_idx = 0;
        let mut result = ExpressionSlot::new();
        self.get_read_write(&mut result, true)?;

        for (position, value) in values.iter().enumerate() {
            let mut comparison = target.clone();
            comparison
                .append_stream(value)
                .and_then(|_| comparison.push_operator(op))
                .map_err(|code| crate::error::CompileError::new(code, self.last_span))?;
            self.enter_expression(&comparison)?;
            self.enter_constant(position as u16)?;
            self.enter_expression(&result)?;
            self.enter0(Ic::Lookdown)?;
        }
        self.check_statement_end()
    }
}
