//! Compile driver.
//!
//! All state the reference implementation kept process-wide lives here as a
//! per-invocation context threaded through every pass. The pass order is
//! fixed: normalize, directives-only elementize, editor directives, symbol
//! adjustment, full elementize, preprocessor folding, declaration passes,
//! gosub counting, statement compilation, address patching, packetization.

use crate::eeprom::{Eeprom, Patch};
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::lexer::ElementList;
use crate::stmt::Frame;
use crate::symbols::{self, SymbolTable, UndefSymbolTable};
use crate::types::{
    CompileOptions, Element, ElementKind, ModuleRec, TargetModule, TokenRef, SRC_TOK_REF_SIZE,
};

/// Per-block-family open counts; each family is capped at 16.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FamilyCounts {
    pub for_next: u8,
    pub if_then: u8,
    pub do_loop: u8,
    pub select: u8,
    pub cc_if: u8,
    pub cc_select: u8,
}

/// One compilation in flight. Owns every table; borrows the source buffer.
pub struct Compiler<'a> {
    pub(crate) src: &'a mut Vec<u8>,
    pub(crate) src_len: usize,
    pub(crate) options: CompileOptions,
    pub(crate) rec: ModuleRec,
    pub(crate) elements: ElementList,
    pub(crate) symbols: SymbolTable,
    pub(crate) undef: UndefSymbolTable,
    pub(crate) filenames: Vec<(String, usize)>,
    pub(crate) op_stack: Vec<u8>,
    pub(crate) stack_idx: u8,
    pub(crate) eeprom: Eeprom,
    pub(crate) patches: Vec<Patch>,
    pub(crate) nesting: Vec<Frame>,
    pub(crate) counts: FamilyCounts,
    pub(crate) gosub_count: u16,
    pub(crate) next_gosub: u16,
    pub(crate) xref: Vec<TokenRef>,
    pub(crate) module: TargetModule,
    pub(crate) last_span: Span,
    pub(crate) entry_patched: bool,
    pub(crate) data_pointer: u16,
    pub(crate) var_totals: crate::decls::VarTotals,
    pub(crate) var_bases: [u16; 4],
    pub(crate) var_used: [u16; 4],
}

impl<'a> Compiler<'a> {
    /// Fresh context over a borrowed source buffer.
    pub fn new(src: &'a mut Vec<u8>, options: CompileOptions) -> Self {
        let src_len = src.len();
        Self {
            src,
            src_len,
            options,
            rec: ModuleRec::new(),
            elements: ElementList::new(),
            symbols: SymbolTable::new(),
            undef: UndefSymbolTable::new(),
            filenames: Vec::new(),
            op_stack: Vec::new(),
            stack_idx: 0,
            eeprom: Eeprom::new(),
            patches: Vec::new(),
            nesting: Vec::new(),
            counts: FamilyCounts::default(),
            gosub_count: 0,
            next_gosub: 0,
            xref: Vec::new(),
            module: TargetModule::Bs2,
            last_span: Span::default(),
            entry_patched: false,
            data_pointer: 0,
            var_totals: crate::decls::VarTotals::default(),
            var_bases: [0; 4],
            var_used: [0; 4],
        }
    }

    /// Load the common built-in symbol set.
    pub(crate) fn init_symbols(&mut self) -> Result<()> {
        symbols::enter_common_symbols(&mut self.symbols)
            .map_err(|code| CompileError::new(code, Span::default()))
    }

    /// Admit module/dialect custom symbols once directives are resolved.
    pub(crate) fn adjust_symbols(&mut self) -> Result<()> {
        symbols::adjust_symbols(
            &mut self.symbols,
            self.module,
            self.rec.language_version,
            self.rec.port.is_some(),
        )
        .map_err(|code| CompileError::new(code, Span::default()))
    }

    // --- Element access ---

    /// Re-resolve a lazily undefined element against the symbol table,
    /// writing the resolution back so later passes see it too.
    pub(crate) fn resolve_at(&mut self, idx: usize) -> Element {
        let el = self.elements.get(idx);
        if el.kind == ElementKind::Undefined {
            let name = self.symbol_name(el.span());
            if let Some(symbol) = self.symbols.find(&name) {
                let resolved = Element {
                    kind: symbol.kind,
                    value: symbol.value,
                    ..el
                };
                self.elements.set(idx, resolved);
                return resolved;
            }
        }
        el
    }

    /// Next element, lazily resolved. Past the end, a synthetic hard End.
    pub(crate) fn get_element(&mut self) -> Result<(usize, Element)> {
        match self.elements.next() {
            Some((idx, _)) => {
                let el = self.resolve_at(idx);
                self.last_span = el.span();
                Ok((idx, el))
            }
            None => Ok((
                self.elements.len(),
                Element {
                    kind: ElementKind::End,
                    value: 0,
                    start: self.src_len as u16,
                    length: 0,
                },
            )),
        }
    }

    /// Peek without advancing, raw.
    pub(crate) fn try_peek(&self) -> Option<(usize, Element)> {
        self.elements.peek()
    }

    /// Peek without advancing, lazily resolved.
    pub(crate) fn try_peek_resolved(&mut self) -> Option<(usize, Element)> {
        let (idx, _) = self.elements.peek()?;
        Some((idx, self.resolve_at(idx)))
    }

    /// Consume one element, demanding a kind.
    pub(crate) fn expect_kind(&mut self, kind: ElementKind, code: ErrorCode) -> Result<Element> {
        let (_, el) = self.get_element()?;
        if el.kind != kind {
            return Err(CompileError::new(code, el.span()));
        }
        Ok(el)
    }

    /// Consume the statement terminator.
    pub(crate) fn expect_end(&mut self) -> Result<Element> {
        self.expect_kind(ElementKind::End, ErrorCode::ExpectedEndOfLine)
    }

    /// Consume a comma.
    pub(crate) fn expect_comma(&mut self) -> Result<Element> {
        self.expect_kind(ElementKind::Comma, ErrorCode::ExpectedComma)
    }

    /// Whether the next element is of `kind`; consumes it when it is.
    pub(crate) fn check_kind(&mut self, kind: ElementKind) -> Result<bool> {
        if let Some((_, el)) = self.try_peek_resolved() {
            if el.kind == kind {
                self.get_element()?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the next element is a specific instruction; consumes it when
    /// it is.
    pub(crate) fn check_instruction(
        &mut self,
        inst: crate::types::InstructionType,
    ) -> Result<bool> {
        if let Some((_, el)) = self.try_peek_resolved() {
            if el.kind == ElementKind::Instruction && el.value == inst as u16 {
                self.get_element()?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The next two non-cancelled elements, lazily resolved, without
    /// consuming either.
    pub(crate) fn peek_two(&mut self) -> Option<(Element, Element)> {
        let (first_idx, _) = self.elements.peek()?;
        let first = self.resolve_at(first_idx);
        let mut idx = first_idx + 1;
        while idx < self.elements.len() {
            if self.elements.get(idx).kind != ElementKind::Cancel {
                let second = self.resolve_at(idx);
                return Some((first, second));
            }
            idx += 1;
        }
        None
    }

    // --- Driver ---

    /// Run every pass over the borrowed source.
    pub(crate) fn run(&mut self) -> Result<()> {
        self.rec.source_size = self.src_len;
        self.init_symbols()?;
        self.normalize_source()?;
        self.elementize(false)?;
        self.compile_editor_directives()?;
        if self.options.directives_only {
            return Ok(());
        }

        self.module = self
            .rec
            .target_module
            .ok_or_else(|| CompileError::new(ErrorCode::TargetModuleNotSpecified, Span::new(0, 0)))?;
        self.adjust_symbols()?;
        self.elementize(true)?;
        if self.rec.lang_250() {
            self.compile_cc_directives()?;
        }

        self.compile_pins(false)?;
        self.compile_pins(true)?;
        loop {
            let progress = self.compile_constants(false)?;
            if progress == 0 {
                break;
            }
        }
        self.compile_constants(true)?;
        self.compile_data(false)?;
        self.compile_data(true)?;
        self.compile_var(false)?;
        self.compile_var(true)?;

        self.count_gosubs()?;
        self.eeprom.set_bit_index(14 * (self.gosub_count + 1));

        self.compile_statements()?;
        self.check_nesting_closed()?;
        self.patch_remaining_addresses()?;

        self.rec.packet_count = self.eeprom.prepare_packets(&mut self.rec.packet_buffer);
        let (image, flags) = self.eeprom.planes();
        self.rec.eeprom = *image;
        self.rec.eeprom_flags = *flags;
        Ok(())
    }

    /// Report the "opener without closer" error for any frame left open.
    fn check_nesting_closed(&mut self) -> Result<()> {
        use crate::stmt::FrameKind;
        if let Some(frame) = self.nesting.last() {
            let opener = self.elements.get(frame.element_idx);
            let code = match frame.kind {
                FrameKind::For => ErrorCode::ForWithoutNext,
                FrameKind::Do => ErrorCode::DoWithoutLoop,
                FrameKind::IfSingle | FrameKind::IfMulti => ErrorCode::IfWithoutEndif,
                FrameKind::Select => ErrorCode::SelectWithoutEndselect,
                FrameKind::CcIf => ErrorCode::CcIfWithoutEndif,
                FrameKind::CcSelect => ErrorCode::CcSelectWithoutEndselect,
            };
            return Err(CompileError::new(code, opener.span()));
        }
        Ok(())
    }

    /// Drain the patch list; anything still unresolved is an undefined
    /// label.
    fn patch_remaining_addresses(&mut self) -> Result<()> {
        let patches = std::mem::take(&mut self.patches);
        for patch in patches {
            let el = self.elements.get(patch.element_idx);
            let name = self.symbol_name(el.span());
            match self.symbols.find(&name) {
                Some(symbol) if symbol.kind == ElementKind::Address => {
                    let address = symbol.value;
                    self.eeprom.patch_address(patch.field_addr, address)?;
                }
                _ => {
                    return Err(CompileError::new(ErrorCode::UndefinedLabel, el.span()));
                }
            }
        }
        Ok(())
    }

    /// Record a source-to-token reference at a statement boundary.
    pub(crate) fn enter_src_tok_ref(&mut self, src_start: u16) {
        if self.xref.len() < SRC_TOK_REF_SIZE {
            self.xref.push(TokenRef {
                src_start,
                tok_start: self.eeprom.bit_index(),
            });
        }
    }
}

/// Compile a source buffer into a caller-supplied result record.
///
/// The buffer is normalized in place and must not be reused after a failed
/// compile without reloading. `xref` receives one entry per compiled
/// statement when supplied.
pub fn compile_into(
    rec: &mut ModuleRec,
    source: &mut Vec<u8>,
    options: CompileOptions,
    xref: Option<&mut Vec<TokenRef>>,
) -> Result<()> {
    let mut compiler = Compiler::new(source, options);
    let outcome = compiler.run();
    compiler.rec.succeeded = outcome.is_ok();
    match &outcome {
        Ok(()) => {
            compiler.rec.error = None;
            compiler.rec.error_start = 0;
            compiler.rec.error_length = 0;
        }
        Err(err) => {
            let mut err = err.clone();
            // Keep the advertised invariant even for spans cut short by
            // normalization.
            if err.span.start + err.span.length > compiler.src_len {
                err.span.length = compiler.src_len.saturating_sub(err.span.start);
            }
            compiler.rec.set_error(&err);
        }
    }
    if let Some(out) = xref {
        out.clear();
        out.extend_from_slice(&compiler.xref);
    }
    *rec = compiler.rec;
    outcome
}

/// Compile a source buffer and return the result record.
pub fn compile(source: &mut Vec<u8>, options: CompileOptions) -> ModuleRec {
    let mut rec = ModuleRec::new();
    let _ = compile_into(&mut rec, source, options, None);
    rec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ExpressionSlot, Op};
    use crate::types::{eeprom_usage, VarSize, EEPROM_SIZE, PACKET_SIZE};

    fn build(source: &str) -> ModuleRec {
        let mut src = source.as_bytes().to_vec();
        compile(&mut src, CompileOptions::default())
    }

    fn build_with_xref(source: &str) -> (ModuleRec, Vec<TokenRef>) {
        let mut src = source.as_bytes().to_vec();
        let mut rec = ModuleRec::new();
        let mut xref = Vec::new();
        let _ = compile_into(
            &mut rec,
            &mut src,
            CompileOptions::default(),
            Some(&mut xref),
        );
        (rec, xref)
    }

    fn error_code(rec: &ModuleRec) -> u16 {
        rec.error
            .as_deref()
            .and_then(|e| e[..3].parse().ok())
            .unwrap_or(0)
    }

    /// Read program bits back out of the reverse-addressed image.
    fn read_bits(rec: &ModuleRec, mut bit: usize, count: usize) -> u16 {
        let mut value = 0u16;
        for _ in 0..count {
            let byte = rec.eeprom[EEPROM_SIZE - 1 - bit / 8];
            value = (value << 1) | u16::from((byte >> (7 - bit % 8)) & 1);
            bit += 1;
        }
        value
    }

    const HEADER: &str = "' {$STAMP BS2}\n' {$PBASIC 2.5}\n";

    #[test]
    fn test_minimal_debug_program() {
        let rec = build("' {$STAMP BS2}\n' {$PBASIC 2.5}\nDEBUG \"Hi\"\n");
        assert!(rec.succeeded, "{:?}", rec.error);
        assert!(rec.packet_count >= 1);
        assert!(rec.debug_flag);
        assert_eq!(rec.error_start, 0);
        assert_eq!(rec.error_length, 0);
        // The program grows from the top of the image.
        assert_eq!(rec.eeprom_flags[EEPROM_SIZE - 1] & 0x07, eeprom_usage::PROGRAM);
        assert_ne!(rec.eeprom_flags[EEPROM_SIZE - 1] & eeprom_usage::DOWNLOADED, 0);
    }

    #[test]
    fn test_packet_checksum_round_trip() {
        let rec = build(&format!("{HEADER}x VAR WORD\nx = 42\nDEBUG DEC x, CR\n"));
        assert!(rec.succeeded, "{:?}", rec.error);
        for packet in rec.packets() {
            assert_eq!(packet.len(), PACKET_SIZE);
            assert_ne!(packet[0] & 0x80, 0);
            let sum: u32 = packet.iter().map(|b| u32::from(*b)).sum();
            assert_eq!(sum % 256, 0);
        }
    }

    #[test]
    fn test_if_multiline_lowering() {
        let source = format!(
            "{HEADER}x VAR WORD\nIF x = 1 THEN\n  HIGH 0\nELSE\n  LOW 0\nENDIF\n"
        );
        let rec = build(&source);
        assert!(rec.succeeded, "{:?}", rec.error);

        let without_endif = source.replace("ENDIF\n", "");
        let rec = build(&without_endif);
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 168);
        assert_eq!(rec.error.as_deref(), Some("168-IF without ENDIF"));
        // The error points at the IF opener.
        let if_pos = without_endif.find("IF x").unwrap();
        assert_eq!(rec.error_start, if_pos);
    }

    #[test]
    fn test_elseif_chain() {
        let rec = build(&format!(
            "{HEADER}x VAR WORD\nIF x = 1 THEN\n HIGH 0\nELSEIF x = 2 THEN\n HIGH 1\nELSE\n LOW 0\nENDIF\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
    }

    #[test]
    fn test_data_collision_points_at_literal() {
        let source = format!("{HEADER}start DATA @2047, $AA\nHIGH 0\n");
        let rec = build(&source);
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 124);
        let literal = source.find("$AA").unwrap();
        assert_eq!(rec.error_start, literal);
        assert_eq!(rec.error_length, 3);
    }

    #[test]
    fn test_data_allocation_and_read() {
        let rec = build(&format!(
            "{HEADER}table DATA @16, 1, 2, WORD $1234, (4)\nx VAR BYTE\nREAD table, x\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
        assert_eq!(rec.eeprom[16], 1);
        assert_eq!(rec.eeprom[17], 2);
        // Words store low byte first.
        assert_eq!(rec.eeprom[18], 0x34);
        assert_eq!(rec.eeprom[19], 0x12);
        assert_eq!(rec.eeprom_flags[18] & 0x07, eeprom_usage::DEF_DATA);
        assert_eq!(rec.eeprom_flags[20] & 0x07, eeprom_usage::UNDEF_DATA);
        // The reservation rides along: its block holds defined data too.
        assert_ne!(rec.eeprom_flags[20] & eeprom_usage::DOWNLOADED, 0);
    }

    #[test]
    fn test_select_case_range_encoding() {
        let rec = build(&format!(
            "{HEADER}n VAR WORD\nSELECT n\nCASE 1 TO 3\n DEBUG \"a\"\nCASE ELSE\n DEBUG \"b\"\nENDSELECT\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);

        // First emission is the CASE condition: marker, then the packed
        // (n >= 1) AND (n <= 3) stream.
        let mut expected = ExpressionSlot::new();
        expected.push_variable(false, false, VarSize::Word, 3).unwrap();
        expected.push_constant(1).unwrap();
        expected.push_operator(Op::Ae).unwrap();
        let mut upper = ExpressionSlot::new();
        upper.push_variable(false, false, VarSize::Word, 3).unwrap();
        upper.push_constant(3).unwrap();
        upper.push_operator(Op::Be).unwrap();
        expected.append_stream(&upper).unwrap();
        expected.push_operator(Op::And).unwrap();

        let base = 14; // no gosubs: program starts past the entry slot
        assert_eq!(read_bits(&rec, base, 1), 1);
        for i in 0..expected.len() {
            assert_eq!(
                read_bits(&rec, base + 1 + usize::from(i), 1),
                u16::from(expected.bit(i)),
                "bit {i} differs"
            );
        }
    }

    #[test]
    fn test_undefined_label() {
        let source = format!("{HEADER}GOTO nowhere\n");
        let rec = build(&source);
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 111);
        let at = source.find("nowhere").unwrap();
        assert_eq!(rec.error_start, at);
        assert_eq!(rec.error_length, "nowhere".len());
    }

    #[test]
    fn test_forward_label_patches() {
        let rec = build(&format!(
            "{HEADER}GOTO finish\nHIGH 0\nfinish:\n  LOW 0\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
        // The patched field is no longer zero: it points past HIGH 0.
        assert_ne!(read_bits(&rec, 14 + 7, 14), 0);
    }

    #[test]
    fn test_preprocessor_folding_matches_plain_source() {
        let folded = build(&format!(
            "{HEADER}#DEFINE FOO = 7\n#IF FOO = 7 #THEN\nHIGH 0\n#ELSE\nLOW 0\n#ENDIF\n"
        ));
        let plain = build(&format!("{HEADER}HIGH 0\n"));
        assert!(folded.succeeded, "{:?}", folded.error);
        assert!(plain.succeeded);
        assert_eq!(folded.eeprom[..], plain.eeprom[..]);
        assert_eq!(folded.packet_count, plain.packet_count);
    }

    #[test]
    fn test_gosub_capacity() {
        let mut body = String::from(HEADER);
        for _ in 0..255 {
            body.push_str("GOSUB work\n");
        }
        body.push_str("work:\n RETURN\n");
        let rec = build(&body);
        assert!(rec.succeeded, "{:?}", rec.error);

        let mut body = String::from(HEADER);
        for _ in 0..256 {
            body.push_str("GOSUB work\n");
        }
        body.push_str("work:\n RETURN\n");
        let rec = build(&body);
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 145);
    }

    #[test]
    fn test_gosub_reserves_return_slots() {
        let (rec, xref) = build_with_xref(&format!("{HEADER}GOSUB sub\nsub:\n RETURN\n"));
        assert!(rec.succeeded, "{:?}", rec.error);
        // One gosub: the program starts after two 14-bit slots.
        assert_eq!(xref[0].tok_start, 28);
        // Slot 1 holds the return address: just past GOSUB's 7+14 bits.
        assert_eq!(read_bits(&rec, 14, 14), 28 + 21);
    }

    #[test]
    fn test_nesting_without_errors() {
        for (source, code) in [
            ("DO\n HIGH 0\n", 163u16),
            ("FOR i = 1 TO 3\n HIGH 0\n", 161),
            ("SELECT i\nCASE 1\n HIGH 0\n", 171),
            ("NEXT\n", 160),
            ("LOOP\n", 162),
            ("ENDIF\n", 166),
        ] {
            let rec = build(&format!("{HEADER}i VAR NIB\n{source}"));
            assert!(!rec.succeeded);
            assert_eq!(error_code(&rec), code, "for {source:?}");
        }
    }

    #[test]
    fn test_do_loop_conditions() {
        let rec = build(&format!(
            "{HEADER}x VAR WORD\nDO WHILE x < 5\n x = x + 1\nLOOP\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);

        let rec = build(&format!("{HEADER}DO\n HIGH 0\nLOOP UNTIL IN0 = 1\n"));
        assert!(rec.succeeded, "{:?}", rec.error);

        let rec = build(&format!(
            "{HEADER}DO WHILE IN0 = 0\n HIGH 0\nLOOP UNTIL IN1 = 1\n"
        ));
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 157);
    }

    #[test]
    fn test_for_next_with_exit() {
        let rec = build(&format!(
            "{HEADER}i VAR BYTE\nFOR i = 1 TO 10 STEP 2\n IF i = 5 THEN EXIT\n TOGGLE 0\nNEXT\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
    }

    #[test]
    fn test_on_goto_and_gosub() {
        let rec = build(&format!(
            "{HEADER}x VAR NIB\nON x GOTO one, two\none:\n HIGH 0\ntwo:\n LOW 0\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);

        let rec = build(&format!(
            "{HEADER}x VAR NIB\nON x GOSUB one, two\nEND\none:\n RETURN\ntwo:\n RETURN\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
    }

    #[test]
    fn test_variable_allocation_order() {
        let rec = build(&format!(
            "{HEADER}w VAR WORD\nb VAR BYTE\nn VAR NIB\nflag VAR BIT\narr VAR BYTE(4)\nx VAR w.LOWBYTE\nx = 1\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
        assert_eq!(rec.var_counts, [1, 1, 5, 1]);
    }

    #[test]
    fn test_out_of_variable_space() {
        let rec = build(&format!("{HEADER}a VAR WORD(13)\nb VAR BIT\nHIGH 0\n"));
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 143);
    }

    #[test]
    fn test_pin_declaration() {
        let rec = build(&format!("{HEADER}led PIN 5\nHIGH led\nled = 1\n"));
        assert!(rec.succeeded, "{:?}", rec.error);

        let rec = build(&format!("{HEADER}led PIN 16\nHIGH led\n"));
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 146);
    }

    #[test]
    fn test_constant_forward_reference() {
        let rec = build(&format!(
            "{HEADER}first CON second + 1\nsecond CON 5\nPAUSE first\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
    }

    #[test]
    fn test_error_range_invariant() {
        let sources = vec![
            "' {$PBASIC 2.5}\nHIGH 0\n".to_string(), // no $STAMP
            format!("{HEADER}GOTO nowhere\n"),
            format!("{HEADER}x = 5\n"), // undeclared
            format!("{HEADER}HIGH $\n"),
        ];
        for source in &sources {
            let rec = build(source);
            assert!(!rec.succeeded, "for {source:?}");
            assert!(
                rec.error_start + rec.error_length <= rec.source_size,
                "range escapes source for {source:?}"
            );
            assert!(rec.error.is_some());
        }
    }

    #[test]
    fn test_dialect_20_rejects_25_constructs() {
        // PIN is not a symbol in 2.0, so the declaration never parses.
        let rec = build("' {$STAMP BS2}\n' {$PBASIC 2.0}\nled PIN 5\nHIGH led\n");
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 110);

        // Multi-line IF needs 2.5; in 2.0 THEN must name a label.
        let rec = build("' {$STAMP BS2}\n' {$PBASIC 2.0}\nIF IN0 = 1 THEN\nHIGH 0\nENDIF\n");
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 142);
    }

    #[test]
    fn test_label_missing_colon_in_25() {
        let rec = build(&format!("{HEADER}mylabel\n HIGH 0\n"));
        assert!(!rec.succeeded);
        assert_eq!(error_code(&rec), 175);
    }

    #[test]
    fn test_xref_marks_statements() {
        let (rec, xref) = build_with_xref(&format!("{HEADER}HIGH 0\nLOW 0\n"));
        assert!(rec.succeeded);
        assert_eq!(xref.len(), 2);
        assert_eq!(xref[0].tok_start, 14);
        assert!(xref[1].tok_start > xref[0].tok_start);
        assert!(xref[1].src_start > xref[0].src_start);
    }

    #[test]
    fn test_recompilation_is_deterministic() {
        let source = format!("{HEADER}x VAR WORD\nx = 1\nDEBUG DEC x\n");
        let first = build(&source);
        let second = build(&source);
        assert!(first.succeeded);
        assert_eq!(first.eeprom[..], second.eeprom[..]);
        assert_eq!(first.packet_count, second.packet_count);
    }

    #[test]
    fn test_directives_only_stops_early() {
        let mut src = format!("{HEADER}THIS IS NOT VALID PBASIC ???\n").into_bytes();
        let rec = compile(
            &mut src,
            CompileOptions {
                directives_only: true,
                parse_stamp_directive: true,
            },
        );
        assert!(rec.succeeded, "{:?}", rec.error);
        assert_eq!(rec.target_module, Some(TargetModule::Bs2));
        assert_eq!(rec.packet_count, 0);
    }

    #[test]
    fn test_serial_and_lcd_on_bs2p() {
        let rec = build(
            "' {$STAMP BS2p}\n' {$PBASIC 2.5}\nx VAR BYTE\nSEROUT 1, 84, [DEC x, CR]\nSERIN 0, 84, [HEX2 x]\nLCDOUT 0, 1, [\"ok\"]\nI2CIN 0, $A1, 4, [x]\n",
        );
        assert!(rec.succeeded, "{:?}", rec.error);
    }

    #[test]
    fn test_lcd_rejected_on_bs2() {
        let rec = build(&format!("{HEADER}LCDOUT 0, 1, [\"ok\"]\n"));
        assert!(!rec.succeeded);
        // Not a symbol on the BS2, so the name never resolves.
        assert_eq!(error_code(&rec), 110);
    }

    #[test]
    fn test_lookup_lookdown() {
        let rec = build(&format!(
            "{HEADER}i VAR NIB\nx VAR BYTE\nLOOKUP i, [10, 20, 30], x\nLOOKDOWN x, [10, 20, 30], i\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
    }

    #[test]
    fn test_single_line_if_else() {
        let rec = build(&format!(
            "{HEADER}x VAR BIT\nIF IN0 = 1 THEN HIGH 0 : x = 1 ELSE LOW 0\nEND\n"
        ));
        assert!(rec.succeeded, "{:?}", rec.error);
    }
}
