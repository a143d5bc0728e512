//! Statement compilers.
//!
//! One compiler per instruction, sharing a toolkit of expression/emission
//! helpers, plus the nested-block state machine that lowers multi-line
//! IF/ELSEIF/ELSE/ENDIF, DO/LOOP, FOR/NEXT and SELECT/CASE into the
//! firmware's IF/GOTO/BRANCH/GOSUB primitives with back-patched jump
//! targets.

pub mod basic;
pub mod control;
pub mod io;

use crate::compiler::Compiler;
use crate::eeprom::Patch;
use crate::error::{CompileError, ErrorCode, Result};
use crate::expr::{ExpressionSlot, Op};
use crate::symbols::Symbol;
use crate::types::{
    Element, ElementKind, InstructionType, DO_LOOP_STACK_SIZE, FOR_NEXT_STACK_SIZE,
    IF_THEN_STACK_SIZE, NESTING_STACK_SIZE, PATCH_LIST_SIZE, SELECT_STACK_SIZE,
};

/// Kinds of open code blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Single-line `IF ... THEN statements {ELSE statements}`.
    IfSingle,
    /// Multi-line `IF ... THEN` closed by `ENDIF`.
    IfMulti,
    /// `FOR ... NEXT`.
    For,
    /// `DO ... LOOP`.
    Do,
    /// `SELECT ... ENDSELECT`.
    Select,
    /// `#IF ... #ENDIF` (preprocessor).
    CcIf,
    /// `#SELECT ... #ENDSELECT` (preprocessor).
    CcSelect,
}

/// One open code block.
///
/// `skip_label` holds the bit address of the pending false-branch GOTO
/// field; `exits` accumulates EXIT and ELSEIF/CASE exit-chain fields, all
/// patched when the closer arrives. For SELECT, `exp_idx` remembers where
/// the selector expression starts so every CASE can re-parse it.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// Block kind.
    pub kind: FrameKind,
    /// Element index of the opener, for diagnostics.
    pub element_idx: usize,
    /// Element index of the selector (SELECT) or loop variable (FOR).
    pub exp_idx: usize,
    /// Loop-head bit address for NEXT/LOOP to jump back to.
    pub jump_label: u16,
    /// Pending false-branch address field.
    pub skip_label: Option<u16>,
    /// Pending exit-label address fields.
    pub exits: [u16; crate::types::MAX_EXITS],
    /// Number of live entries in `exits`.
    pub exit_count: u8,
    /// ELSE (or `#ELSE`) already seen.
    pub else_seen: bool,
    /// At least one CASE seen.
    pub case_seen: bool,
    /// DO carried a head condition.
    pub head_condition: bool,
    /// Preprocessor: some branch of this block already matched.
    pub taken: bool,
    /// Preprocessor: the current branch is live.
    pub active: bool,
}

impl Frame {
    /// Fresh frame for an opener element.
    pub fn new(kind: FrameKind, element_idx: usize) -> Self {
        Self {
            kind,
            element_idx,
            exp_idx: 0,
            jump_label: 0,
            skip_label: None,
            exits: [0; crate::types::MAX_EXITS],
            exit_count: 0,
            else_seen: false,
            case_seen: false,
            head_condition: false,
            taken: false,
            active: true,
        }
    }

    /// Record an exit-label field to patch at the closer.
    pub fn push_exit(&mut self, field: u16) -> std::result::Result<(), ErrorCode> {
        if usize::from(self.exit_count) >= crate::types::MAX_EXITS {
            return Err(ErrorCode::TooManyExits);
        }
        self.exits[usize::from(self.exit_count)] = field;
        self.exit_count += 1;
        Ok(())
    }
}

/// Logical instruction codes: row indices into [`INST_CODE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
#[allow(missing_docs)]
pub enum Ic {
    End = 0,
    Sleep,
    Nap,
    Stop,
    Output,
    High,
    Toggle,
    Low,
    Reverse,
    Goto,
    Gosub,
    Return,
    Input,
    If,
    Next,
    Branch,
    Lookup,
    Lookdown,
    Random,
    Read,
    Write,
    Pause,
    Freqout1,
    Freqout2,
    Dtmfout,
    Xout,
    Done,
    Get,
    Put,
    Run,
    Mainio,
    Auxio,
    SeroutNoFlow,
    SeroutFlow,
    SerinNoFlow,
    SerinFlow,
    Pulsout,
    Pulsin,
    Count,
    Shiftin,
    Shiftout,
    Rctime,
    Button,
    Pwm,
    Lcdin,
    Lcdout,
    Lcdcmd,
    I2cinEx,
    I2cinNoex,
    I2coutEx,
    I2coutNoex,
    Pollrun,
    Pollmode,
    Pollin,
    Pollout,
    Pollwait,
    Owout,
    Owin,
    Ioterm,
    Store,
}

/// 6-bit instruction codes per target module, columns BS2, BS2e, BS2sx,
/// BS2p, BS2pe. Most rows are uniform; `Done` and the scratchpad/slot
/// instructions shuffle between parts, which is why this stays a table
/// rather than an offset rule.
pub const INST_CODE: [[u8; 5]; 60] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // End
    [0x01, 0x01, 0x01, 0x01, 0x01], // Sleep
    [0x02, 0x02, 0x02, 0x02, 0x02], // Nap
    [0x03, 0x03, 0x03, 0x03, 0x03], // Stop
    [0x04, 0x04, 0x04, 0x04, 0x04], // Output
    [0x05, 0x05, 0x05, 0x05, 0x05], // High
    [0x06, 0x06, 0x06, 0x06, 0x06], // Toggle
    [0x07, 0x07, 0x07, 0x07, 0x07], // Low
    [0x08, 0x08, 0x08, 0x08, 0x08], // Reverse
    [0x09, 0x09, 0x09, 0x09, 0x09], // Goto
    [0x0A, 0x0A, 0x0A, 0x0A, 0x0A], // Gosub
    [0x0B, 0x0B, 0x0B, 0x0B, 0x0B], // Return
    [0x0C, 0x0C, 0x0C, 0x0C, 0x0C], // Input
    [0x0D, 0x0D, 0x0D, 0x0D, 0x0D], // If
    [0x0E, 0x0E, 0x0E, 0x0E, 0x0E], // Next
    [0x0F, 0x0F, 0x0F, 0x0F, 0x0F], // Branch
    [0x10, 0x10, 0x10, 0x10, 0x10], // Lookup
    [0x11, 0x11, 0x11, 0x11, 0x11], // Lookdown
    [0x12, 0x12, 0x12, 0x12, 0x12], // Random
    [0x13, 0x13, 0x13, 0x13, 0x13], // Read
    [0x14, 0x14, 0x14, 0x14, 0x14], // Write
    [0x15, 0x15, 0x15, 0x15, 0x15], // Pause
    [0x16, 0x16, 0x16, 0x16, 0x16], // Freqout1
    [0x17, 0x17, 0x17, 0x17, 0x17], // Freqout2
    [0x18, 0x18, 0x18, 0x18, 0x18], // Dtmfout
    [0x19, 0x19, 0x19, 0x19, 0x19], // Xout
    [0x1A, 0x1D, 0x1D, 0x1F, 0x1F], // Done
    [0x1B, 0x1A, 0x1A, 0x1A, 0x1A], // Get
    [0x1C, 0x1B, 0x1B, 0x1B, 0x1B], // Put
    [0x1D, 0x1C, 0x1C, 0x1C, 0x1C], // Run
    [0x1E, 0x1E, 0x1E, 0x1D, 0x1D], // Mainio
    [0x1F, 0x1F, 0x1F, 0x1E, 0x1E], // Auxio
    [0x20, 0x20, 0x20, 0x20, 0x20], // SeroutNoFlow
    [0x21, 0x21, 0x21, 0x21, 0x21], // SeroutFlow
    [0x22, 0x22, 0x22, 0x22, 0x22], // SerinNoFlow
    [0x23, 0x23, 0x23, 0x23, 0x23], // SerinFlow
    [0x24, 0x24, 0x24, 0x24, 0x24], // Pulsout
    [0x25, 0x25, 0x25, 0x25, 0x25], // Pulsin
    [0x26, 0x26, 0x26, 0x26, 0x26], // Count
    [0x27, 0x27, 0x27, 0x27, 0x27], // Shiftin
    [0x28, 0x28, 0x28, 0x28, 0x28], // Shiftout
    [0x29, 0x29, 0x29, 0x29, 0x29], // Rctime
    [0x2A, 0x2A, 0x2A, 0x2A, 0x2A], // Button
    [0x2B, 0x2B, 0x2B, 0x2B, 0x2B], // Pwm
    [0x2C, 0x2C, 0x2C, 0x2C, 0x2C], // Lcdin
    [0x2D, 0x2D, 0x2D, 0x2D, 0x2D], // Lcdout
    [0x2E, 0x2E, 0x2E, 0x2E, 0x2E], // Lcdcmd
    [0x2F, 0x2F, 0x2F, 0x2F, 0x2F], // I2cinEx
    [0x30, 0x30, 0x30, 0x30, 0x30], // I2cinNoex
    [0x31, 0x31, 0x31, 0x31, 0x31], // I2coutEx
    [0x32, 0x32, 0x32, 0x32, 0x32], // I2coutNoex
    [0x33, 0x33, 0x33, 0x33, 0x33], // Pollrun
    [0x34, 0x34, 0x34, 0x34, 0x34], // Pollmode
    [0x35, 0x35, 0x35, 0x35, 0x35], // Pollin
    [0x36, 0x36, 0x36, 0x36, 0x36], // Pollout
    [0x37, 0x37, 0x37, 0x37, 0x37], // Pollwait
    [0x38, 0x38, 0x38, 0x38, 0x38], // Owout
    [0x39, 0x39, 0x39, 0x39, 0x39], // Owin
    [0x3A, 0x3A, 0x3A, 0x3A, 0x3A], // Ioterm
    [0x3B, 0x3B, 0x3B, 0x3B, 0x3B], // Store
];

/// Block families with individually capped depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    For,
    If,
    Do,
    Select,
}

impl<'a> Compiler<'a> {
    // --- Emission toolkit ---

    /// Emit a 7-bit instruction prefix: a `0` marker plus the module's
    /// 6-bit code.
    pub(crate) fn enter0(&mut self, ic: Ic) -> Result<()> {
        let code = INST_CODE[ic as usize][self.module.index()];
        self.eeprom
            .enter_bits(7, u16::from(code), self.last_span)?;
        Ok(())
    }

    /// Copy a parsed expression into EEPROM, preceded by the `1` marker.
    pub(crate) fn enter_expression(&mut self, slot: &ExpressionSlot) -> Result<()> {
        self.eeprom.enter_bits(1, 1, self.last_span)?;
        let mut reader = slot.reader();
        while reader.remaining() > 0 {
            let take = reader.remaining().min(16) as u8;
            let data = reader.read(take).unwrap();
            self.eeprom.enter_bits(take, data, self.last_span)?;
        }
        Ok(())
    }

    /// Parse a value expression into a fresh slot.
    pub(crate) fn get_value(&mut self, pin_is_constant: bool) -> Result<ExpressionSlot> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.get_expression(&mut slot, false, pin_is_constant, None, None, false)?;
        Ok(slot)
    }

    /// Parse a conditional expression into a fresh slot.
    pub(crate) fn get_conditional(&mut self) -> Result<ExpressionSlot> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.get_expression(&mut slot, true, false, None, None, false)?;
        Ok(slot)
    }

    /// Parse a value expression and emit it.
    pub(crate) fn get_value_enter(&mut self, pin_is_constant: bool) -> Result<()> {
        let slot = self.get_value(pin_is_constant)?;
        self.enter_expression(&slot)
    }

    /// Parse a write variable reference and emit it.
    pub(crate) fn get_write_enter(&mut self) -> Result<()> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        self.get_read_write(&mut slot, true)?;
        self.enter_expression(&slot)
    }

    /// Parse a write variable reference, demanding byte size, and emit it.
    pub(crate) fn get_byte_write_enter(&mut self) -> Result<()> {
        self.stack_idx = 0;
        let mut slot = ExpressionSlot::new();
        let span = self.try_peek_resolved().map(|(_, e)| e.span()).unwrap_or_default();
        let var = self.get_read_write(&mut slot, true)?;
        if var.size != crate::types::VarSize::Byte {
            return Err(CompileError::new(ErrorCode::ExpectedByteVariable, span));
        }
        self.enter_expression(&slot)
    }

    /// Emit a bare constant as an expression atom.
    pub(crate) fn enter_constant(&mut self, value: u16) -> Result<()> {
        let mut slot = ExpressionSlot::new();
        slot.push_constant(value)
            .map_err(|code| CompileError::new(code, self.last_span))?;
        self.enter_expression(&slot)
    }

    /// Emit a 14-bit address field for a label element: resolved labels get
    /// their address now, forward references join the patch list.
    pub(crate) fn enter_label_address(&mut self, idx: usize, el: Element) -> Result<()> {
        match el.kind {
            ElementKind::Address => {
                self.eeprom.enter_bits(14, el.value & 0x3FFF, el.span())?;
            }
            ElementKind::Undefined => {
                if self.patches.len() >= PATCH_LIST_SIZE {
                    return Err(CompileError::new(ErrorCode::PatchListFull, el.span()));
                }
                let field = self.eeprom.enter_bits(14, 0, el.span())?;
                self.patches.push(Patch {
                    element_idx: idx,
                    field_addr: field,
                });
            }
            _ => return Err(CompileError::new(ErrorCode::ExpectedLabel, el.span())),
        }
        Ok(())
    }

    /// Consume a label element and emit its address field.
    pub(crate) fn get_address_enter(&mut self) -> Result<()> {
        let (idx, el) = self.get_element()?;
        self.enter_label_address(idx, el)
    }

    /// Emit `GOTO <empty address>` and return the field to patch later.
    pub(crate) fn enter_goto_placeholder(&mut self) -> Result<u16> {
        self.enter0(Ic::Goto)?;
        let field = self.eeprom.enter_bits(14, 0, self.last_span)?;
        Ok(field)
    }

    /// Emit a conditional jump on an already-parsed condition; returns the
    /// address field of the true branch.
    pub(crate) fn enter_if_jump(&mut self, condition: &ExpressionSlot) -> Result<u16> {
        self.enter_expression(condition)?;
        self.enter0(Ic::If)?;
        let field = self.eeprom.enter_bits(14, 0, self.last_span)?;
        Ok(field)
    }

    /// Point a pending address field at the current bit position.
    pub(crate) fn patch_here(&mut self, field: u16) -> Result<()> {
        let here = self.eeprom.bit_index();
        self.eeprom.patch_address(field, here)
    }

    /// Consume `=`.
    pub(crate) fn get_equal(&mut self) -> Result<()> {
        let (_, el) = self.get_element()?;
        if el.kind != ElementKind::Cond1Op || el.value != Op::E as u16 {
            return Err(CompileError::new(ErrorCode::ExpectedEqual, el.span()));
        }
        Ok(())
    }

    /// Statements must finish at a statement boundary; the boundary element
    /// itself is left for the dispatch loop. Inside single-line IFs, ELSE
    /// follows a statement with no separator, so the block keywords count
    /// as boundaries too.
    pub(crate) fn check_statement_end(&mut self) -> Result<()> {
        match self.try_peek_resolved() {
            None => Ok(()),
            Some((_, el)) if el.kind == ElementKind::End => Ok(()),
            Some((_, el))
                if el.kind == ElementKind::Instruction
                    && matches!(
                        InstructionType::from_value(el.value),
                        Some(InstructionType::Else)
                            | Some(InstructionType::ElseIf)
                            | Some(InstructionType::EndIf)
                    ) =>
            {
                Ok(())
            }
            Some((_, el)) => Err(CompileError::new(ErrorCode::ExpectedEndOfLine, el.span())),
        }
    }

    // --- Nesting ---

    pub(crate) fn push_frame(&mut self, frame: Frame, family: Family) -> Result<()> {
        let opener_span = self.elements.get(frame.element_idx).span();
        let (count, cap) = match family {
            Family::For => (&mut self.counts.for_next, FOR_NEXT_STACK_SIZE),
            Family::If => (&mut self.counts.if_then, IF_THEN_STACK_SIZE),
            Family::Do => (&mut self.counts.do_loop, DO_LOOP_STACK_SIZE),
            Family::Select => (&mut self.counts.select, SELECT_STACK_SIZE),
        };
        if usize::from(*count) >= cap || self.nesting.len() >= NESTING_STACK_SIZE {
            return Err(CompileError::new(ErrorCode::NestingTooDeep, opener_span));
        }
        *count += 1;
        self.nesting.push(frame);
        Ok(())
    }

    pub(crate) fn pop_frame(&mut self, family: Family) -> Frame {
        let count = match family {
            Family::For => &mut self.counts.for_next,
            Family::If => &mut self.counts.if_then,
            Family::Do => &mut self.counts.do_loop,
            Family::Select => &mut self.counts.select,
        };
        *count -= 1;
        self.nesting.pop().expect("frame stack underflow")
    }

    /// Patch a frame's skip label (if pending) and all exit labels to the
    /// current position.
    pub(crate) fn patch_skip_and_exits(&mut self, frame: &Frame, exits: bool) -> Result<()> {
        if let Some(field) = frame.skip_label {
            self.patch_here(field)?;
        }
        if exits {
            for i in 0..usize::from(frame.exit_count) {
                self.patch_here(frame.exits[i])?;
            }
        }
        Ok(())
    }

    // --- Statement walk ---

    /// Compile every run-time statement in element order.
    pub(crate) fn compile_statements(&mut self) -> Result<()> {
        self.elements.set_cursor(0);

        loop {
            let Some((idx, el)) = self.try_peek_resolved() else { break };
            match el.kind {
                ElementKind::End => {
                    self.get_element()?;
                    if el.value == 0 {
                        self.close_single_line_ifs()?;
                    }
                }
                ElementKind::Undefined => {
                    self.define_label(el)?;
                }
                ElementKind::Address => {
                    self.get_element()?;
                    match self.try_peek_resolved() {
                        Some((_, next))
                            if next.kind == ElementKind::End && next.value == 1 =>
                        {
                            return Err(CompileError::new(
                                ErrorCode::LabelAlreadyDefined,
                                el.span(),
                            ));
                        }
                        _ => {
                            return Err(CompileError::new(
                                ErrorCode::ExpectedInstruction,
                                el.span(),
                            ));
                        }
                    }
                }
                ElementKind::Variable | ElementKind::PinNumber => {
                    self.guard_select_body(el, None)?;
                    self.statement_prologue(el)?;
                    self.compile_let()?;
                    self.check_statement_end()?;
                }
                ElementKind::Instruction => {
                    self.get_element()?;
                    self.guard_select_body(el, InstructionType::from_value(el.value))?;
                    self.statement_prologue(el)?;
                    self.dispatch_instruction(idx, el)?;
                }
                _ => {
                    return Err(CompileError::new(ErrorCode::ExpectedInstruction, el.span()));
                }
            }
        }

        // Program epilogue: the firmware's done marker.
        if self.entry_patched {
            self.enter0(Ic::Done)?;
        }
        Ok(())
    }

    /// First-undefined-symbol label definition.
    fn define_label(&mut self, el: Element) -> Result<()> {
        self.get_element()?;
        let followed_by_colon = matches!(
            self.try_peek_resolved(),
            Some((_, next)) if next.kind == ElementKind::End && next.value == 1
        );
        let followed_by_eol = matches!(
            self.try_peek_resolved(),
            Some((_, next)) if next.kind == ElementKind::End && next.value == 0
        );

        if followed_by_colon || (!self.rec.lang_250() && followed_by_eol) {
            let name = self.symbol_name(el.span());
            let address = self.eeprom.bit_index();
            self.symbols
                .enter(Symbol::new(name, ElementKind::Address, address))
                .map_err(|code| CompileError::new(code, el.span()))?;
            if followed_by_colon {
                self.get_element()?;
            }
            return Ok(());
        }

        // A bare name on its own line in 2.5 is a label missing its colon;
        // anything else is a reference to a name that was never declared.
        let code = if self.rec.lang_250() && followed_by_eol {
            ErrorCode::LabelMissingColon
        } else {
            ErrorCode::UndefinedSymbol
        };
        Err(CompileError::new(code, el.span()))
    }

    /// Entry patching and cross-reference entry at a statement boundary.
    fn statement_prologue(&mut self, el: Element) -> Result<()> {
        if !self.entry_patched {
            let here = self.eeprom.bit_index();
            self.eeprom.patch_address(0, here)?;
            self.entry_patched = true;
        }
        self.enter_src_tok_ref(el.start);
        Ok(())
    }

    /// Assignment statement: `target = expression`.
    pub(crate) fn compile_let(&mut self) -> Result<()> {
        self.stack_idx = 0;
        let mut target = ExpressionSlot::new();
        self.get_read_write(&mut target, true)?;
        self.get_equal()?;
        let value = self.get_value(false)?;
        self.enter_expression(&value)?;
        self.enter_expression(&target)
    }

    /// A SELECT body admits only CASE blocks before the first CASE.
    fn guard_select_body(
        &mut self,
        el: Element,
        inst: Option<InstructionType>,
    ) -> Result<()> {
        if let Some(frame) = self.nesting.last() {
            if frame.kind == FrameKind::Select
                && !frame.case_seen
                && !matches!(
                    inst,
                    Some(InstructionType::Case) | Some(InstructionType::EndSelect)
                )
            {
                return Err(CompileError::new(ErrorCode::ExpectedCase, el.span()));
            }
        }
        Ok(())
    }

    fn dispatch_instruction(&mut self, idx: usize, el: Element) -> Result<()> {
        use InstructionType as It;
        let inst = It::from_value(el.value)
            .ok_or_else(|| CompileError::new(ErrorCode::ExpectedInstruction, el.span()))?;
        match inst {
            // Control flow.
            It::If => self.compile_if(idx, el)?,
            It::ElseIf => self.compile_elseif(el)?,
            It::Else => self.compile_else(el)?,
            It::EndIf => self.compile_endif(el)?,
            It::Do => self.compile_do(idx, el)?,
            It::Loop => self.compile_loop(el)?,
            It::For => self.compile_for(idx, el)?,
            It::Next => self.compile_next(el)?,
            It::Select => self.compile_select(idx, el)?,
            It::Case => self.compile_case(el)?,
            It::EndSelect => self.compile_endselect(el)?,
            It::Exit => self.compile_exit(el)?,
            It::Goto => self.compile_goto()?,
            It::Gosub => self.compile_gosub()?,
            It::Return => self.compile_plain(Ic::Return)?,
            It::On => self.compile_on()?,
            It::Branch => self.compile_branch()?,
            It::Run => self.compile_one_value(Ic::Run)?,
            It::End => self.compile_plain(Ic::End)?,
            It::Stop => self.compile_plain(Ic::Stop)?,
            It::Sleep => self.compile_one_value(Ic::Sleep)?,
            It::Nap => self.compile_one_value(Ic::Nap)?,
            It::Pause => self.compile_one_value(Ic::Pause)?,

            // Pin and value primitives.
            It::High => self.compile_pin_op(Ic::High)?,
            It::Low => self.compile_pin_op(Ic::Low)?,
            It::Toggle => self.compile_pin_op(Ic::Toggle)?,
            It::Input => self.compile_pin_op(Ic::Input)?,
            It::Output => self.compile_pin_op(Ic::Output)?,
            It::Reverse => self.compile_pin_op(Ic::Reverse)?,
            It::Mainio => self.compile_plain(Ic::Mainio)?,
            It::Auxio => self.compile_plain(Ic::Auxio)?,
            It::Ioterm => self.compile_one_value(Ic::Ioterm)?,
            It::Pollmode => self.compile_one_value(Ic::Pollmode)?,
            It::Pollwait => self.compile_one_value(Ic::Pollwait)?,
            It::Pollrun => self.compile_one_value(Ic::Pollrun)?,
            It::Pollin => self.compile_pin_state(Ic::Pollin)?,
            It::Pollout => self.compile_pin_state(Ic::Pollout)?,
            It::Store => self.compile_one_value(Ic::Store)?,

            // Timing, measurement, storage.
            It::Pulsout => self.compile_pulsout()?,
            It::Pulsin => self.compile_pin_state_var(Ic::Pulsin)?,
            It::Rctime => self.compile_pin_state_var(Ic::Rctime)?,
            It::Count => self.compile_count()?,
            It::Pwm => self.compile_pwm()?,
            It::Random => self.compile_random()?,
            It::Read => self.compile_read()?,
            It::Write => self.compile_write()?,
            It::Get => self.compile_get()?,
            It::Put => self.compile_put()?,
            It::Button => self.compile_button()?,
            It::Freqout => self.compile_freqout()?,
            It::Lookup => self.compile_lookup()?,
            It::Lookdown => self.compile_lookdown()?,

            // IO sequences.
            It::Debug => self.compile_debug()?,
            It::DebugIn => self.compile_debugin()?,
            It::Serout => self.compile_serout()?,
            It::Serin => self.compile_serin()?,
            It::Dtmfout => self.compile_dtmfout()?,
            It::Xout => self.compile_xout()?,
            It::Shiftin => self.compile_shiftin()?,
            It::Shiftout => self.compile_shiftout()?,
            It::Lcdcmd => self.compile_lcdcmd()?,
            It::Lcdout => self.compile_lcdout()?,
            It::Lcdin => self.compile_lcdin()?,
            It::I2cin => self.compile_i2cin()?,
            It::I2cout => self.compile_i2cout()?,
            It::Owin => self.compile_owin()?,
            It::Owout => self.compile_owout()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table_module_columns() {
        assert_eq!(INST_CODE[Ic::Goto as usize], [9, 9, 9, 9, 9]);
        // Done differs across parts.
        assert_eq!(INST_CODE[Ic::Done as usize], [0x1A, 0x1D, 0x1D, 0x1F, 0x1F]);
        // Get shifts down where Done moved out of the way.
        assert_eq!(INST_CODE[Ic::Get as usize][0], 0x1B);
        assert_eq!(INST_CODE[Ic::Get as usize][3], 0x1A);
        // All codes fit 6 bits.
        assert!(INST_CODE.iter().flatten().all(|c| *c < 0x40));
    }

    #[test]
    fn test_frame_exit_capacity() {
        let mut frame = Frame::new(FrameKind::Do, 0);
        for i in 0..crate::types::MAX_EXITS {
            frame.push_exit(i as u16).unwrap();
        }
        assert_eq!(frame.push_exit(99), Err(ErrorCode::TooManyExits));
    }
}
