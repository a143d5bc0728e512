//! Editor directives and conditional compilation.
//!
//! `$STAMP`, `$PORT` and `$PBASIC` are resolved from the directives-only
//! element stream. The `#IF`/`#SELECT` layer folds the full element stream
//! by evaluating compile-time expressions and cancelling the elements of
//! losing branches in place; indices never shift, so element references
//! recorded before folding stay valid.

use crate::compiler::Compiler;
use crate::error::{CompileError, ErrorCode, Result};
use crate::expr::{self, ExpressionSlot, Op};
use crate::stmt::{Frame, FrameKind};
use crate::symbols::Symbol;
use crate::types::{
    CcKind, DirectiveKind, ElementKind, TargetModule, VERSION_2_0, VERSION_2_5,
};

impl<'a> Compiler<'a> {
    /// Resolve `$STAMP`, `$PORT` and `$PBASIC` from the directives-only
    /// element stream into the result record.
    pub(crate) fn compile_editor_directives(&mut self) -> Result<()> {
        self.elements.set_cursor(0);
        let mut seen = [false; 3];

        while let Some((_, el)) = self.try_peek() {
            self.get_element()?;
            if el.kind != ElementKind::Directive {
                continue;
            }
            let which = el.value as usize;
            if seen[which] {
                return Err(CompileError::new(ErrorCode::DuplicateDirective, el.span()));
            }
            seen[which] = true;

            match el.value {
                v if v == DirectiveKind::Stamp as u16 => self.compile_stamp_directive()?,
                v if v == DirectiveKind::Port as u16 => self.compile_port_directive()?,
                _ => self.compile_pbasic_directive()?,
            }
        }
        Ok(())
    }

    fn compile_stamp_directive(&mut self) -> Result<()> {
        let module_el =
            self.expect_kind(ElementKind::TargetModule, ErrorCode::ExpectedTargetModule)?;
        let module = TargetModule::ALL[module_el.value as usize];
        let interpret = self.options.parse_stamp_directive;
        if interpret {
            self.rec.target_module = Some(module);
            self.rec.target_start = Some(module_el.start as usize);
        }

        while let Some((_, next)) = self.try_peek() {
            if next.kind != ElementKind::FileName {
                break;
            }
            self.get_element()?;
            if !interpret {
                continue;
            }
            if !module.multi_file_capable() {
                return Err(CompileError::new(
                    ErrorCode::NotMultiFileCapable,
                    next.span(),
                ));
            }
            let (name, start) = self.filenames[next.value as usize].clone();
            self.rec.project_files.push((name, start));
        }
        Ok(())
    }

    fn compile_port_directive(&mut self) -> Result<()> {
        let port_el = self.expect_kind(ElementKind::FileName, ErrorCode::ExpectedFilename)?;
        let (name, start) = self.filenames[port_el.value as usize].clone();
        self.rec.port = Some(name);
        self.rec.port_start = Some(start);
        Ok(())
    }

    fn compile_pbasic_directive(&mut self) -> Result<()> {
        let version_el = self.expect_kind(ElementKind::Constant, ErrorCode::InvalidVersion)?;
        if version_el.value != VERSION_2_0 && version_el.value != VERSION_2_5 {
            return Err(CompileError::new(
                ErrorCode::InvalidVersion,
                version_el.span(),
            ));
        }
        self.rec.language_version = version_el.value;
        self.rec.language_start = Some(version_el.start as usize);
        Ok(())
    }

    // --- Conditional compilation ---

    /// Whether every open conditional-compile frame is on a live branch.
    fn cc_active(&self) -> bool {
        self.nesting.iter().all(|f| f.active)
    }

    /// Consume elements up to (not including) the next End; returns the
    /// index of the last consumed element, or the directive's own index
    /// when the line is bare.
    fn cc_skip_to_end(&mut self, from: usize) -> Result<usize> {
        let mut last = from;
        while let Some((idx, el)) = self.try_peek() {
            if el.kind == ElementKind::End {
                break;
            }
            self.get_element()?;
            last = idx;
        }
        Ok(last)
    }

    /// Parse and evaluate a conditional-compile expression ending at
    /// `#THEN`, which is consumed.
    fn cc_if_condition(&mut self) -> Result<bool> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.get_expression(&mut slot, true, true, None, None, true)?;
        self.expect_kind(ElementKind::CcThen, ErrorCode::ExpectedCcThen)?;
        let value = expr::evaluate(&slot)
            .map_err(|code| CompileError::new(code, self.last_span))?;
        Ok(value != 0)
    }

    /// Evaluate one `#CASE` condition against the selector at `exp_idx`.
    /// On return the cursor rests on the delimiter after the condition.
    fn cc_case_condition(&mut self, exp_idx: usize, cond_idx: usize) -> Result<bool> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.elements.set_cursor(exp_idx);
        self.get_expression(&mut slot, true, true, Some(cond_idx), Some(Op::E), true)?;

        if let Some((_, next)) = self.try_peek() {
            if next.kind == ElementKind::To {
                // Range: (sel >= a) AND (sel <= b).
                self.get_element()?;
                let upper_idx = match self.try_peek() {
                    Some((idx, _)) => idx,
                    None => self.elements.len(),
                };
                let mut lower = ExpressionSlot::new();
                self.stack_idx = 0;
                self.elements.set_cursor(exp_idx);
                self.get_expression(&mut lower, true, true, Some(cond_idx), Some(Op::Ae), true)?;
                // Re-parse the lower bound with >=; it ended at TO.
                let mut upper = ExpressionSlot::new();
                self.stack_idx = 0;
                self.elements.set_cursor(exp_idx);
                self.get_expression(&mut upper, true, true, Some(upper_idx), Some(Op::Be), true)?;
                lower
                    .append_stream(&upper)
                    .and_then(|_| lower.push_operator(Op::And))
                    .map_err(|code| CompileError::new(code, self.last_span))?;
                slot = lower;
            }
        }

        let value = expr::evaluate(&slot)
            .map_err(|code| CompileError::new(code, self.last_span))?;
        Ok(value != 0)
    }

    /// Fold `#DEFINE`, `#IF`, `#SELECT` and `#ERROR` over the element
    /// stream, cancelling directives and dead branches.
    pub(crate) fn compile_cc_directives(&mut self) -> Result<()> {
        self.elements.set_cursor(0);

        loop {
            let Some((idx, el)) = self.try_peek() else { break };
            let active = self.cc_active();

            if el.kind != ElementKind::CcDirective {
                self.get_element()?;
                if !active && el.kind != ElementKind::End {
                    self.elements.cancel(idx, idx);
                }
                // A #SELECT body admits only #CASE blocks.
                if active && el.kind != ElementKind::End {
                    if let Some(frame) = self.nesting.last() {
                        if frame.kind == FrameKind::CcSelect && !frame.case_seen {
                            return Err(CompileError::new(ErrorCode::ExpectedCcCase, el.span()));
                        }
                    }
                }
                continue;
            }

            self.get_element()?;
            match CcKind::from_value(el.value) {
                Some(CcKind::Define) => {
                    let end = self.compile_cc_define(active, idx)?;
                    self.elements.cancel(idx, end);
                }
                Some(CcKind::If) => {
                    if self.counts.cc_if as usize >= crate::types::IF_THEN_STACK_SIZE
                        || self.nesting.len() >= crate::types::NESTING_STACK_SIZE
                    {
                        return Err(CompileError::new(ErrorCode::NestingTooDeep, el.span()));
                    }
                    let mut frame = Frame::new(FrameKind::CcIf, idx);
                    if active {
                        let cond = self.cc_if_condition()?;
                        frame.active = cond;
                        frame.taken = cond;
                    } else {
                        // Dead branch: skip the condition unevaluated.
                        loop {
                            let (skip_idx, skipped) = self.get_element()?;
                            if skipped.kind == ElementKind::CcThen {
                                break;
                            }
                            if skipped.kind == ElementKind::End || skip_idx >= self.elements.len()
                            {
                                return Err(CompileError::new(
                                    ErrorCode::ExpectedCcThen,
                                    skipped.span(),
                                ));
                            }
                        }
                        frame.active = false;
                        frame.taken = true;
                    }
                    self.counts.cc_if += 1;
                    self.nesting.push(frame);
                    self.elements.cancel(idx, self.elements.cursor().saturating_sub(1));
                }
                Some(CcKind::Else) => {
                    let Some(frame) = self.nesting.last_mut() else {
                        return Err(CompileError::new(ErrorCode::CcElseWithoutIf, el.span()));
                    };
                    if frame.kind != FrameKind::CcIf {
                        return Err(CompileError::new(ErrorCode::CcElseWithoutIf, el.span()));
                    }
                    if frame.else_seen {
                        return Err(CompileError::new(ErrorCode::CcElseAlreadySeen, el.span()));
                    }
                    frame.else_seen = true;
                    frame.active = !frame.taken;
                    frame.taken = true;
                    self.elements.cancel(idx, idx);
                }
                Some(CcKind::EndIf) => {
                    match self.nesting.last() {
                        Some(frame) if frame.kind == FrameKind::CcIf => {}
                        _ => {
                            return Err(CompileError::new(ErrorCode::CcEndifWithoutIf, el.span()));
                        }
                    }
                    self.nesting.pop();
                    self.counts.cc_if -= 1;
                    self.elements.cancel(idx, idx);
                }
                Some(CcKind::Select) => {
                    if self.counts.cc_select as usize >= crate::types::SELECT_STACK_SIZE
                        || self.nesting.len() >= crate::types::NESTING_STACK_SIZE
                    {
                        return Err(CompileError::new(ErrorCode::NestingTooDeep, el.span()));
                    }
                    let mut frame = Frame::new(FrameKind::CcSelect, idx);
                    frame.exp_idx = self.elements.cursor();
                    frame.active = false;
                    frame.taken = !active;
                    // Leave the selector in place; every #CASE re-parses it.
                    self.cc_skip_to_end(idx)?;
                    self.counts.cc_select += 1;
                    self.nesting.push(frame);
                    self.elements.cancel(idx, idx);
                }
                Some(CcKind::Case) => {
                    self.compile_cc_case(idx)?;
                }
                Some(CcKind::EndSelect) => {
                    let frame = match self.nesting.last() {
                        Some(frame) if frame.kind == FrameKind::CcSelect => *frame,
                        _ => {
                            return Err(CompileError::new(
                                ErrorCode::CcEndselectWithoutSelect,
                                el.span(),
                            ));
                        }
                    };
                    // Retire the selector expression elements now that the
                    // last #CASE has re-parsed them.
                    let mut end = frame.exp_idx;
                    while end < self.elements.len()
                        && self.elements.get(end).kind != ElementKind::End
                    {
                        end += 1;
                    }
                    self.elements.cancel(frame.exp_idx, end.saturating_sub(1));
                    self.nesting.pop();
                    self.counts.cc_select -= 1;
                    self.elements.cancel(idx, idx);
                }
                Some(CcKind::Error) => {
                    if active {
                        let mut message = String::new();
                        while let Some((_, item)) = self.try_peek() {
                            if item.kind == ElementKind::End {
                                break;
                            }
                            self.get_element()?;
                            if item.kind == ElementKind::Constant {
                                message.push((item.value as u8) as char);
                            }
                        }
                        return Err(CompileError::new(
                            ErrorCode::UserError(message),
                            el.span(),
                        ));
                    }
                    let end = self.cc_skip_to_end(idx)?;
                    self.elements.cancel(idx, end);
                }
                None => {
                    return Err(CompileError::new(ErrorCode::UnknownCcDirective, el.span()));
                }
            }
        }

        // Anything still open is missing its closer.
        if let Some(frame) = self.nesting.last() {
            let opener = self.elements.get(frame.element_idx);
            let code = if frame.kind == FrameKind::CcIf {
                ErrorCode::CcIfWithoutEndif
            } else {
                ErrorCode::CcSelectWithoutEndselect
            };
            return Err(CompileError::new(code, opener.span()));
        }
        Ok(())
    }

    /// `#DEFINE name {= expr}`. Returns the last element index of the
    /// definition for cancellation.
    fn compile_cc_define(&mut self, active: bool, idx: usize) -> Result<usize> {
        if !active {
            return self.cc_skip_to_end(idx);
        }
        let (name_idx, name_el) = self.get_element()?;
        if name_el.kind != ElementKind::Undefined {
            let code = if name_el.kind == ElementKind::CcConstant {
                ErrorCode::SymbolAlreadyDefined
            } else {
                ErrorCode::ExpectedDefinedSymbol
            };
            return Err(CompileError::new(code, name_el.span()));
        }
        let name = self.symbol_name(name_el.span());

        let mut value = 0xFFFF;
        let mut last = name_idx;
        if let Some((_, next)) = self.try_peek() {
            if next.kind == ElementKind::Cond1Op && next.value == Op::E as u16 {
                self.get_element()?;
                self.stack_idx = 0;
                let mut slot = ExpressionSlot::new();
                self.get_expression(&mut slot, false, true, None, None, true)?;
                value = expr::evaluate(&slot)
                    .map_err(|code| CompileError::new(code, self.last_span))?;
                last = self.elements.cursor().saturating_sub(1);
            }
        }

        self.symbols
            .enter(Symbol::new(name, ElementKind::CcConstant, value))
            .map_err(|code| CompileError::new(code, name_el.span()))?;
        Ok(last)
    }

    /// `#CASE cond {, cond}` or `#CASE #ELSE`.
    fn compile_cc_case(&mut self, idx: usize) -> Result<()> {
        let el = self.elements.get(idx);
        let parent_active = self
            .nesting
            .iter()
            .rev()
            .skip(1)
            .all(|f| f.active);
        let frame = match self.nesting.last() {
            Some(frame) if frame.kind == FrameKind::CcSelect => *frame,
            _ => {
                return Err(CompileError::new(ErrorCode::CcCaseWithoutSelect, el.span()));
            }
        };
        if frame.else_seen {
            return Err(CompileError::new(ErrorCode::CcCaseElseNotLast, el.span()));
        }

        // #CASE #ELSE takes the branch when nothing has matched yet.
        let mut else_seen = false;
        let mut matched = false;
        if let Some((_, next)) = self.try_peek() {
            if next.kind == ElementKind::CcDirective && next.value == CcKind::Else as u16 {
                self.get_element()?;
                else_seen = true;
                matched = true;
            }
        }

        if !else_seen {
            if frame.taken || !parent_active {
                self.cc_skip_to_end(idx)?;
            } else {
                loop {
                    let cond_idx = match self.try_peek() {
                        Some((i, _)) => i,
                        None => break,
                    };
                    let hit = self.cc_case_condition(frame.exp_idx, cond_idx)?;
                    matched = matched || hit;
                    match self.try_peek() {
                        Some((_, d)) if d.kind == ElementKind::Comma => {
                            self.get_element()?;
                        }
                        _ => break,
                    }
                }
            }
        }

        let last = self.elements.cursor().saturating_sub(1);
        let frame = self.nesting.last_mut().unwrap();
        frame.case_seen = true;
        frame.else_seen = else_seen;
        frame.active = parent_active && !frame.taken && matched;
        if frame.active || matched {
            frame.taken = true;
        }
        self.elements.cancel(idx, last);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, Compiler};
    use crate::types::CompileOptions;

    fn directives_of(source: &str) -> crate::types::ModuleRec {
        let mut src = source.as_bytes().to_vec();
        compile(
            &mut src,
            CompileOptions {
                directives_only: true,
                parse_stamp_directive: true,
            },
        )
    }

    #[test]
    fn test_stamp_port_pbasic() {
        let rec = directives_of("' {$STAMP BS2sx}\n' {$PORT COM2}\n' {$PBASIC 2.5}\nHIGH 0\n");
        assert!(rec.succeeded, "{:?}", rec.error);
        assert_eq!(rec.target_module, Some(TargetModule::Bs2sx));
        assert_eq!(rec.port.as_deref(), Some("COM2"));
        assert_eq!(rec.language_version, VERSION_2_5);
        assert!(rec.target_start.is_some());
    }

    #[test]
    fn test_project_files() {
        let rec = directives_of("' {$STAMP BS2p, slot1.bsp, slot2.bsp}\n");
        assert!(rec.succeeded);
        assert_eq!(rec.project_files.len(), 2);
        assert_eq!(rec.project_files[0].0, "slot1.bsp");
    }

    #[test]
    fn test_project_files_require_capable_module() {
        let rec = directives_of("' {$STAMP BS2, slot1.bs2}\n");
        assert!(!rec.succeeded);
        assert_eq!(rec.error.as_deref().map(|e| &e[..3]), Some("136"));
    }

    #[test]
    fn test_duplicate_directive() {
        let rec = directives_of("' {$PBASIC 2.5}\n' {$PBASIC 2.5}\n");
        assert!(!rec.succeeded);
        assert_eq!(rec.error.as_deref().map(|e| &e[..3]), Some("131"));
    }

    #[test]
    fn test_bad_version() {
        let rec = directives_of("' {$PBASIC 3.0}\n");
        assert!(!rec.succeeded);
        assert_eq!(rec.error.as_deref().map(|e| &e[..3]), Some("134"));
    }

    #[test]
    fn test_stamp_directive_not_interpreted() {
        let mut src = b"' {$STAMP BS2p}\n".to_vec();
        let rec = compile(
            &mut src,
            CompileOptions {
                directives_only: true,
                parse_stamp_directive: false,
            },
        );
        assert!(rec.succeeded);
        assert_eq!(rec.target_module, None);
    }

    fn fold(source: &str) -> Compiler<'static> {
        let src: &'static mut Vec<u8> = Box::leak(Box::new(source.as_bytes().to_vec()));
        let mut compiler = Compiler::new(src, CompileOptions::default());
        compiler.rec.language_version = VERSION_2_5;
        compiler.init_symbols().unwrap();
        compiler
            .adjust_symbols()
            .unwrap();
        compiler.normalize_source().unwrap();
        compiler.elementize(true).unwrap();
        compiler.compile_cc_directives().unwrap();
        compiler
    }

    fn surviving_instructions(compiler: &mut Compiler<'static>) -> Vec<u16> {
        compiler.elements.set_cursor(0);
        let mut out = Vec::new();
        while let Some((_, el)) = compiler.elements.next() {
            if el.kind == ElementKind::Instruction {
                out.push(el.value);
            }
        }
        out
    }

    #[test]
    fn test_cc_if_folds_false_branch() {
        let mut c = fold("#DEFINE FOO = 7\n#IF FOO = 7 #THEN\nHIGH 0\n#ELSE\nLOW 0\n#ENDIF\n");
        let instructions = surviving_instructions(&mut c);
        assert_eq!(
            instructions,
            vec![crate::types::InstructionType::High as u16]
        );
    }

    #[test]
    fn test_cc_undefined_symbol_is_false() {
        let mut c = fold("#IF NEVER_DEFINED #THEN\nHIGH 0\n#ELSE\nLOW 0\n#ENDIF\n");
        let instructions = surviving_instructions(&mut c);
        assert_eq!(instructions, vec![crate::types::InstructionType::Low as u16]);
    }

    #[test]
    fn test_cc_select_picks_matching_case() {
        let mut c = fold(
            "#DEFINE MODE = 2\n#SELECT MODE\n#CASE 1\nHIGH 0\n#CASE 2, 3\nTOGGLE 0\n#CASE #ELSE\nLOW 0\n#ENDSELECT\n",
        );
        let instructions = surviving_instructions(&mut c);
        assert_eq!(
            instructions,
            vec![crate::types::InstructionType::Toggle as u16]
        );
    }

    #[test]
    fn test_cc_select_range() {
        let mut c = fold(
            "#DEFINE MODE = 5\n#SELECT MODE\n#CASE 1 TO 6\nHIGH 0\n#CASE #ELSE\nLOW 0\n#ENDSELECT\n",
        );
        let instructions = surviving_instructions(&mut c);
        assert_eq!(instructions, vec![crate::types::InstructionType::High as u16]);
    }

    #[test]
    fn test_cc_error_directive() {
        let src: &'static mut Vec<u8> = Box::leak(Box::new(
            b"#ERROR \"wrong board\"\n".to_vec(),
        ));
        let mut compiler = Compiler::new(src, CompileOptions::default());
        compiler.rec.language_version = VERSION_2_5;
        compiler.init_symbols().unwrap();
        compiler.adjust_symbols().unwrap();
        compiler.normalize_source().unwrap();
        compiler.elementize(true).unwrap();
        let err = compiler.compile_cc_directives().unwrap_err();
        assert_eq!(err.code, ErrorCode::UserError("wrong board".into()));
        assert_eq!(err.code.diagnostic(), "199-wrong board");
    }

    #[test]
    fn test_cc_if_without_endif() {
        let src: &'static mut Vec<u8> =
            Box::leak(Box::new(b"#IF 1 #THEN\nHIGH 0\n".to_vec()));
        let mut compiler = Compiler::new(src, CompileOptions::default());
        compiler.rec.language_version = VERSION_2_5;
        compiler.init_symbols().unwrap();
        compiler.adjust_symbols().unwrap();
        compiler.normalize_source().unwrap();
        compiler.elementize(true).unwrap();
        let err = compiler.compile_cc_directives().unwrap_err();
        assert_eq!(err.code, ErrorCode::CcIfWithoutEndif);
    }
}
