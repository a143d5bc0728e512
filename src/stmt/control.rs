//! Control-flow statement compilers.
//!
//! The firmware knows only IF/GOTO/BRANCH/GOSUB, so every block construct
//! lowers to conditional jumps over placeholder address fields that the
//! closers patch. `DO WHILE cond ... LOOP` becomes
//! `Jump: IF cond THEN Main; GOTO Skip; Main: ... GOTO Jump; Skip:`, and
//! the other lowerings follow the same scheme.

use super::{Family, Frame, FrameKind, Ic};
use crate::compiler::Compiler;
use crate::error::{CompileError, ErrorCode, Result};
use crate::expr::{ExpressionSlot, Op};
use crate::types::{Element, ElementKind, InstructionType};

impl<'a> Compiler<'a> {
    /// No-operand instruction.
    pub(crate) fn compile_plain(&mut self, ic: Ic) -> Result<()> {
        self.enter0(ic)?;
        self.check_statement_end()
    }

    /// Single value operand.
    pub(crate) fn compile_one_value(&mut self, ic: Ic) -> Result<()> {
        self.get_value_enter(true)?;
        self.enter0(ic)?;
        self.check_statement_end()
    }

    // --- IF / ELSEIF / ELSE / ENDIF ---

    pub(crate) fn compile_if(&mut self, idx: usize, _el: Element) -> Result<()> {
        let condition = self.get_conditional()?;
        self.expect_kind(ElementKind::Then, ErrorCode::ExpectedThen)?;

        // `IF cond THEN` at end of line opens a multi-line block.
        if matches!(self.try_peek_resolved(), Some((_, n)) if n.kind == ElementKind::End) {
            if !self.rec.lang_250() {
                return Err(CompileError::new(ErrorCode::ExpectedLabel, self.last_span));
            }
            let if_field = self.enter_if_jump(&condition)?;
            let skip = self.enter_goto_placeholder()?;
            self.patch_here(if_field)?;
            let mut frame = Frame::new(FrameKind::IfMulti, idx);
            frame.skip_label = Some(skip);
            return self.push_frame(frame, Family::If);
        }

        // `IF cond THEN label {ELSE label}` jumps directly.
        let jump_form = match self.peek_two() {
            Some((first, second)) => {
                let label_like =
                    matches!(first.kind, ElementKind::Address | ElementKind::Undefined);
                let boundary = matches!(second.kind, ElementKind::End)
                    || (second.kind == ElementKind::Instruction
                        && second.value == InstructionType::Else as u16);
                label_like && boundary
            }
            None => false,
        };
        if jump_form {
            self.enter_expression(&condition)?;
            self.enter0(Ic::If)?;
            self.get_address_enter()?;
            if self.check_instruction(InstructionType::Else)? {
                self.enter0(Ic::Goto)?;
                self.get_address_enter()?;
            }
            return self.check_statement_end();
        }

        // Single-line statement form is a 2.5 construct.
        if !self.rec.lang_250() {
            return Err(CompileError::new(ErrorCode::ExpectedLabel, self.last_span));
        }
        let if_field = self.enter_if_jump(&condition)?;
        let skip = self.enter_goto_placeholder()?;
        self.patch_here(if_field)?;
        let mut frame = Frame::new(FrameKind::IfSingle, idx);
        frame.skip_label = Some(skip);
        self.push_frame(frame, Family::If)
    }

    pub(crate) fn compile_elseif(&mut self, el: Element) -> Result<()> {
        match self.nesting.last() {
            Some(frame) if frame.kind == FrameKind::IfMulti => {}
            _ => return Err(CompileError::new(ErrorCode::ElseifWithoutIf, el.span())),
        }
        if self.nesting.last().unwrap().else_seen {
            return Err(CompileError::new(ErrorCode::ElseAlreadySeen, el.span()));
        }

        // Jump the successful previous branch past every alternative.
        let exit = self.enter_goto_placeholder()?;
        let frame = self.nesting.last_mut().unwrap();
        frame
            .push_exit(exit)
            .map_err(|code| CompileError::new(code, el.span()))?;
        let pending = frame.skip_label.take();
        if let Some(field) = pending {
            self.patch_here(field)?;
        }

        let condition = self.get_conditional()?;
        self.expect_kind(ElementKind::Then, ErrorCode::ExpectedThen)?;
        let if_field = self.enter_if_jump(&condition)?;
        let skip = self.enter_goto_placeholder()?;
        self.patch_here(if_field)?;
        self.nesting.last_mut().unwrap().skip_label = Some(skip);
        self.check_statement_end()
    }

    pub(crate) fn compile_else(&mut self, el: Element) -> Result<()> {
        let kind = self.nesting.last().map(|f| f.kind);
        match kind {
            Some(FrameKind::IfMulti) | Some(FrameKind::IfSingle) => {}
            _ => return Err(CompileError::new(ErrorCode::ElseWithoutIf, el.span())),
        }
        if self.nesting.last().unwrap().else_seen {
            return Err(CompileError::new(ErrorCode::ElseAlreadySeen, el.span()));
        }
        let exit = self.enter_goto_placeholder()?;
        let frame = self.nesting.last_mut().unwrap();
        frame
            .push_exit(exit)
            .map_err(|code| CompileError::new(code, el.span()))?;
        frame.else_seen = true;
        let pending = frame.skip_label.take();
        if let Some(field) = pending {
            self.patch_here(field)?;
        }
        Ok(())
    }

    pub(crate) fn compile_endif(&mut self, el: Element) -> Result<()> {
        match self.nesting.last() {
            Some(frame) if frame.kind == FrameKind::IfMulti => {}
            _ => return Err(CompileError::new(ErrorCode::EndifWithoutIf, el.span())),
        }
        let frame = self.pop_frame(Family::If);
        self.patch_skip_and_exits(&frame, true)?;
        self.check_statement_end()
    }

    /// A hard end-of-line closes any open single-line IFs.
    pub(crate) fn close_single_line_ifs(&mut self) -> Result<()> {
        while matches!(self.nesting.last(), Some(f) if f.kind == FrameKind::IfSingle) {
            let frame = self.pop_frame(Family::If);
            self.patch_skip_and_exits(&frame, true)?;
        }
        Ok(())
    }

    // --- DO / LOOP ---

    pub(crate) fn compile_do(&mut self, idx: usize, _el: Element) -> Result<()> {
        let mut frame = Frame::new(FrameKind::Do, idx);
        frame.jump_label = self.eeprom.bit_index();

        if self.check_kind(ElementKind::While)? {
            let condition = self.get_conditional()?;
            let if_field = self.enter_if_jump(&condition)?;
            let skip = self.enter_goto_placeholder()?;
            self.patch_here(if_field)?;
            frame.skip_label = Some(skip);
            frame.head_condition = true;
        } else if self.check_kind(ElementKind::Until)? {
            // Leave when the condition comes true.
            let condition = self.get_conditional()?;
            let exit_field = self.enter_if_jump(&condition)?;
            frame.skip_label = Some(exit_field);
            frame.head_condition = true;
        }

        self.push_frame(frame, Family::Do)?;
        self.check_statement_end()
    }

    pub(crate) fn compile_loop(&mut self, el: Element) -> Result<()> {
        match self.nesting.last() {
            Some(frame) if frame.kind == FrameKind::Do => {}
            _ => return Err(CompileError::new(ErrorCode::LoopWithoutDo, el.span())),
        }
        let frame = self.pop_frame(Family::Do);

        let tail_while = self.check_kind(ElementKind::While)?;
        let tail_until = !tail_while && self.check_kind(ElementKind::Until)?;
        if frame.head_condition && (tail_while || tail_until) {
            return Err(CompileError::new(
                ErrorCode::ConditionAtBothEnds,
                self.last_span,
            ));
        }

        if tail_while {
            let condition = self.get_conditional()?;
            self.enter_expression(&condition)?;
            self.enter0(Ic::If)?;
            self.eeprom.enter_bits(14, frame.jump_label, self.last_span)?;
        } else if tail_until {
            let condition = self.get_conditional()?;
            let out_field = self.enter_if_jump(&condition)?;
            self.enter0(Ic::Goto)?;
            self.eeprom.enter_bits(14, frame.jump_label, self.last_span)?;
            self.patch_here(out_field)?;
        } else {
            self.enter0(Ic::Goto)?;
            self.eeprom.enter_bits(14, frame.jump_label, self.last_span)?;
        }

        self.patch_skip_and_exits(&frame, true)?;
        self.check_statement_end()
    }

    // --- FOR / NEXT ---

    pub(crate) fn compile_for(&mut self, idx: usize, _el: Element) -> Result<()> {
        let mut frame = Frame::new(FrameKind::For, idx);
        frame.exp_idx = self.elements.cursor();

        // Initial assignment `var = start`.
        self.stack_idx = 0;
        let mut target = ExpressionSlot::new();
        self.get_read_write(&mut target, true)?;
        self.get_equal()?;
        let start = self.get_value(false)?;
        self.enter_expression(&start)?;
        self.enter_expression(&target)?;

        // Validate the bounds now; NEXT re-parses and emits them.
        self.expect_kind(ElementKind::To, ErrorCode::ExpectedTo)?;
        let _limit = self.get_value(false)?;
        if self.check_kind(ElementKind::Step)? {
            let _step = self.get_value(false)?;
        }

        frame.jump_label = self.eeprom.bit_index();
        self.push_frame(frame, Family::For)?;
        self.check_statement_end()
    }

    pub(crate) fn compile_next(&mut self, el: Element) -> Result<()> {
        match self.nesting.last() {
            Some(frame) if frame.kind == FrameKind::For => {}
            _ => return Err(CompileError::new(ErrorCode::NextWithoutFor, el.span())),
        }
        let frame = self.pop_frame(Family::For);
        let resume = self.elements.cursor();

        // Bounds are live expressions: re-parse them from the FOR header.
        self.elements.set_cursor(frame.exp_idx);
        self.stack_idx = 0;
        let mut var = ExpressionSlot::new();
        self.get_read_write(&mut var, true)?;
        self.get_equal()?;
        let _start = self.get_value(false)?;
        self.expect_kind(ElementKind::To, ErrorCode::ExpectedTo)?;
        let limit = self.get_value(false)?;
        self.enter_expression(&limit)?;
        if self.check_kind(ElementKind::Step)? {
            let step = self.get_value(false)?;
            self.enter_expression(&step)?;
        } else {
            self.enter_constant(1)?;
        }
        self.enter_expression(&var)?;
        self.enter0(Ic::Next)?;
        self.eeprom.enter_bits(14, frame.jump_label, self.last_span)?;

        self.elements.set_cursor(resume);
        self.patch_skip_and_exits(&frame, true)?;
        self.check_statement_end()
    }

    // --- SELECT / CASE / ENDSELECT ---

    pub(crate) fn compile_select(&mut self, idx: usize, _el: Element) -> Result<()> {
        let mut frame = Frame::new(FrameKind::Select, idx);
        frame.exp_idx = self.elements.cursor();
        // Parse once for validation; every CASE re-parses from exp_idx.
        let _selector = self.get_value(false)?;
        self.push_frame(frame, Family::Select)?;
        self.check_statement_end()
    }

    /// Parse one CASE condition in split-expression mode, handling ranges.
    fn case_condition(&mut self, exp_idx: usize) -> Result<ExpressionSlot> {
        let cond_idx = match self.try_peek() {
            Some((idx, _)) => idx,
            None => self.elements.len(),
        };
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.elements.set_cursor(exp_idx);
        self.get_expression(&mut slot, true, false, Some(cond_idx), Some(Op::E), false)?;

        if matches!(self.try_peek_resolved(), Some((_, n)) if n.kind == ElementKind::To) {
            self.get_element()?;
            let upper_idx = match self.try_peek() {
                Some((idx, _)) => idx,
                None => self.elements.len(),
            };
            // `a TO b` tests (sel >= a) AND (sel <= b).
            let mut lower = ExpressionSlot::new();
            self.stack_idx = 0;
            self.elements.set_cursor(exp_idx);
            self.get_expression(&mut lower, true, false, Some(cond_idx), Some(Op::Ae), false)?;
            let mut upper = ExpressionSlot::new();
            self.stack_idx = 0;
            self.elements.set_cursor(exp_idx);
            self.get_expression(&mut upper, true, false, Some(upper_idx), Some(Op::Be), false)?;
            lower
                .append_stream(&upper)
                .and_then(|_| lower.push_operator(Op::And))
                .map_err(|code| CompileError::new(code, self.last_span))?;
            return Ok(lower);
        }
        Ok(slot)
    }

    pub(crate) fn compile_case(&mut self, el: Element) -> Result<()> {
        match self.nesting.last() {
            Some(frame) if frame.kind == FrameKind::Select => {}
            _ => return Err(CompileError::new(ErrorCode::CaseWithoutSelect, el.span())),
        }
        if self.nesting.last().unwrap().else_seen {
            return Err(CompileError::new(ErrorCode::CaseElseNotLast, el.span()));
        }

        // A matched previous CASE jumps past the remaining alternatives.
        if self.nesting.last().unwrap().case_seen {
            let exit = self.enter_goto_placeholder()?;
            let frame = self.nesting.last_mut().unwrap();
            frame
                .push_exit(exit)
                .map_err(|code| CompileError::new(code, el.span()))?;
            let pending = frame.skip_label.take();
            if let Some(field) = pending {
                self.patch_here(field)?;
            }
        }

        if self.check_instruction(InstructionType::Else)? {
            let frame = self.nesting.last_mut().unwrap();
            frame.else_seen = true;
            frame.case_seen = true;
            return self.check_statement_end();
        }

        let exp_idx = self.nesting.last().unwrap().exp_idx;
        let mut combined: Option<ExpressionSlot> = None;
        loop {
            let condition = self.case_condition(exp_idx)?;
            combined = Some(match combined {
                None => condition,
                Some(mut acc) => {
                    acc.append_stream(&condition)
                        .and_then(|_| acc.push_operator(Op::Or))
                        .map_err(|code| CompileError::new(code, self.last_span))?;
                    acc
                }
            });
            if !self.check_kind(ElementKind::Comma)? {
                break;
            }
        }

        let combined = combined.unwrap();
        let if_field = self.enter_if_jump(&combined)?;
        let skip = self.enter_goto_placeholder()?;
        self.patch_here(if_field)?;
        let frame = self.nesting.last_mut().unwrap();
        frame.skip_label = Some(skip);
        frame.case_seen = true;
        self.check_statement_end()
    }

    pub(crate) fn compile_endselect(&mut self, el: Element) -> Result<()> {
        match self.nesting.last() {
            Some(frame) if frame.kind == FrameKind::Select => {}
            _ => {
                return Err(CompileError::new(
                    ErrorCode::EndselectWithoutSelect,
                    el.span(),
                ))
            }
        }
        let frame = self.pop_frame(Family::Select);
        self.patch_skip_and_exits(&frame, true)?;
        self.check_statement_end()
    }

    // --- EXIT ---

    pub(crate) fn compile_exit(&mut self, el: Element) -> Result<()> {
        let position = self
            .nesting
            .iter()
            .rposition(|f| matches!(f.kind, FrameKind::For | FrameKind::Do));
        let Some(position) = position else {
            return Err(CompileError::new(ErrorCode::ExitOutsideLoop, el.span()));
        };
        let field = self.enter_goto_placeholder()?;
        self.nesting[position]
            .push_exit(field)
            .map_err(|code| CompileError::new(code, el.span()))?;
        self.check_statement_end()
    }

    // --- GOTO / GOSUB / ON / BRANCH ---

    pub(crate) fn compile_goto(&mut self) -> Result<()> {
        self.enter0(Ic::Goto)?;
        self.get_address_enter()?;
        self.check_statement_end()
    }

    pub(crate) fn compile_gosub(&mut self) -> Result<()> {
        self.enter0(Ic::Gosub)?;
        self.get_address_enter()?;
        self.write_gosub_return()?;
        self.check_statement_end()
    }

    /// Fill this GOSUB's return slot in the EEPROM header with the address
    /// just past its jump.
    pub(crate) fn write_gosub_return(&mut self) -> Result<()> {
        let slot = self.next_gosub + 1;
        self.next_gosub += 1;
        let here = self.eeprom.bit_index();
        self.eeprom.patch_address(slot * 14, here)
    }

    /// Parse `[label {, label}]`, returning the raw elements.
    fn get_label_list(&mut self) -> Result<Vec<(usize, Element)>> {
        self.expect_kind(ElementKind::LeftBracket, ErrorCode::ExpectedLeftBracket)?;
        let mut labels = Vec::new();
        loop {
            let (idx, el) = self.get_element()?;
            if !matches!(el.kind, ElementKind::Address | ElementKind::Undefined) {
                return Err(CompileError::new(ErrorCode::ExpectedLabel, el.span()));
            }
            labels.push((idx, el));
            let (_, delim) = self.get_element()?;
            match delim.kind {
                ElementKind::Comma => continue,
                ElementKind::RightBracket => break,
                _ => {
                    return Err(CompileError::new(
                        ErrorCode::ExpectedCommaOrBracket,
                        delim.span(),
                    ))
                }
            }
        }
        Ok(labels)
    }

    pub(crate) fn compile_branch(&mut self) -> Result<()> {
        let index = self.get_value(false)?;
        self.expect_comma()?;
        let labels = self.get_label_list()?;
        self.enter_expression(&index)?;
        self.enter0(Ic::Branch)?;
        self.eeprom
            .enter_bits(8, labels.len() as u16, self.last_span)?;
        for (idx, el) in labels {
            self.enter_label_address(idx, el)?;
        }
        self.check_statement_end()
    }

    /// `ON idx GOTO ...` is BRANCH; `ON idx GOSUB ...` lowers to a branch
    /// over per-target `GOSUB target / GOTO done` stubs.
    pub(crate) fn compile_on(&mut self) -> Result<()> {
        let index = self.get_value(false)?;
        let (_, keyword) = self.get_element()?;
        let gosub = match (keyword.kind, InstructionType::from_value(keyword.value)) {
            (ElementKind::Instruction, Some(InstructionType::Goto)) => false,
            (ElementKind::Instruction, Some(InstructionType::Gosub)) => true,
            _ => {
                return Err(CompileError::new(
                    ErrorCode::ExpectedGotoOrGosub,
                    keyword.span(),
                ))
            }
        };

        // Targets arrive bare, not bracketed.
        let mut labels = Vec::new();
        loop {
            let (idx, target) = self.get_element()?;
            if !matches!(target.kind, ElementKind::Address | ElementKind::Undefined) {
                return Err(CompileError::new(ErrorCode::ExpectedLabel, target.span()));
            }
            labels.push((idx, target));
            if !self.check_kind(ElementKind::Comma)? {
                break;
            }
        }

        self.enter_expression(&index)?;
        self.enter0(Ic::Branch)?;
        self.eeprom
            .enter_bits(8, labels.len() as u16, self.last_span)?;

        if !gosub {
            for (idx, target) in labels {
                self.enter_label_address(idx, target)?;
            }
            return self.check_statement_end();
        }

        let mut stub_fields = Vec::with_capacity(labels.len());
        for _ in &labels {
            stub_fields.push(self.eeprom.enter_bits(14, 0, self.last_span)?);
        }
        // Out-of-range index falls through the branch to the done label.
        let fall_through = self.enter_goto_placeholder()?;

        let mut done_fields = vec![fall_through];
        for ((idx, target), stub) in labels.into_iter().zip(stub_fields) {
            self.patch_here(stub)?;
            self.enter0(Ic::Gosub)?;
            self.enter_label_address(idx, target)?;
            self.write_gosub_return()?;
            done_fields.push(self.enter_goto_placeholder()?);
        }
        for field in done_fields {
            self.patch_here(field)?;
        }
        self.check_statement_end()
    }
}
