//! Lexer: turns source text into the element stream.
//!
//! The scan runs in two modes. The directives-only pass normalizes the
//! source, recognizes editor directives inside `{$...}` on comment lines and
//! enters an End element per line. The full pass produces the entire
//! language. Elements live in a flat, random-access list; preprocessor
//! folding cancels elements in place so indices stay stable.

use memchr::memchr;

use crate::compiler::Compiler;
use crate::error::{CompileError, ErrorCode, Result, Span};
use crate::expr::Op;
use crate::types::{
    DirectiveKind, Element, ElementKind, ELEMENT_LIST_SIZE, ETX, MAX_SOURCE_SIZE,
};

/// Number base for literal scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    /// `%1010`
    Binary,
    /// `123`
    Decimal,
    /// `$FF`
    Hexadecimal,
}

impl Base {
    /// Radix value.
    pub fn radix(&self) -> u32 {
        match self {
            Base::Binary => 2,
            Base::Decimal => 10,
            Base::Hexadecimal => 16,
        }
    }
}

/// Identifier characters: `_`, digits, letters.
pub fn is_symbol_char(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphanumeric()
}

/// Characters permitted in `$STAMP`/`$PORT` file names.
pub fn is_file_path_char(c: u8, quoted: bool) -> bool {
    matches!(c,
        b'!' | b'#'..=b')' | b'+' | b'-'..=b';' | b'=' | b'@'..=b'z' | b'~')
        || (quoted && matches!(c, b' ' | b',' | b'{' | b'}'))
}

/// Flat, insertion-ordered token sequence with tombstone deletion.
///
/// Cancelled entries keep their index so references by element index stay
/// valid across preprocessor folding; iteration skips them.
#[derive(Debug, Clone, Default)]
pub struct ElementList {
    items: Vec<Element>,
    cursor: usize,
}

impl ElementList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all elements and rewind.
    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = 0;
    }

    /// Number of entries, cancelled ones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append an element.
    pub fn enter(&mut self, element: Element) -> std::result::Result<(), ErrorCode> {
        if self.items.len() >= ELEMENT_LIST_SIZE {
            return Err(ErrorCode::TooManyElements);
        }
        self.items.push(element);
        Ok(())
    }

    /// Element at an index, cancelled or not.
    pub fn get(&self, idx: usize) -> Element {
        self.items[idx]
    }

    /// Overwrite an element in place (lazy resolution of `Undefined`).
    pub fn set(&mut self, idx: usize, element: Element) {
        self.items[idx] = element;
    }

    /// The element most recently appended, if any.
    pub fn last(&self) -> Option<&Element> {
        self.items.last()
    }

    /// Mutable access to the most recently appended element.
    pub fn last_mut(&mut self) -> Option<&mut Element> {
        self.items.last_mut()
    }

    /// Current read position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the read position (SELECT/CASE and FOR/NEXT re-parse this way).
    pub fn set_cursor(&mut self, idx: usize) {
        self.cursor = idx;
    }

    /// Next non-cancelled element, advancing the cursor past it.
    pub fn next(&mut self) -> Option<(usize, Element)> {
        while self.cursor < self.items.len() {
            let idx = self.cursor;
            self.cursor += 1;
            if self.items[idx].kind != ElementKind::Cancel {
                return Some((idx, self.items[idx]));
            }
        }
        None
    }

    /// Next non-cancelled element without advancing.
    pub fn peek(&self) -> Option<(usize, Element)> {
        let mut idx = self.cursor;
        while idx < self.items.len() {
            if self.items[idx].kind != ElementKind::Cancel {
                return Some((idx, self.items[idx]));
            }
            idx += 1;
        }
        None
    }

    /// Logically delete elements in `start..=finish`.
    pub fn cancel(&mut self, start: usize, finish: usize) {
        let finish = finish.min(self.items.len().saturating_sub(1));
        if start > finish {
            return;
        }
        for item in &mut self.items[start..=finish] {
            item.kind = ElementKind::Cancel;
        }
    }
}

impl<'a> Compiler<'a> {
    /// Normalize the source in place: control characters other than NUL and
    /// tab become the ETX sentinel, and an ETX terminator is appended.
    pub(crate) fn normalize_source(&mut self) -> Result<()> {
        if self.src_len >= MAX_SOURCE_SIZE {
            return Err(CompileError::new(ErrorCode::SourceTooLarge, Span::new(0, 0)));
        }
        for b in self.src[..self.src_len].iter_mut() {
            if !(*b == 0 || *b == 9 || (32..=126).contains(b)) {
                *b = ETX;
            }
        }
        self.src.truncate(self.src_len);
        self.src.push(ETX);
        Ok(())
    }

    /// Uppercased source text for a span.
    pub(crate) fn symbol_name(&self, span: Span) -> String {
        self.src[span.start..span.start + span.length]
            .iter()
            .map(|b| b.to_ascii_uppercase() as char)
            .collect()
    }

    fn enter_element(&mut self, kind: ElementKind, value: u16, span: Span) -> Result<()> {
        let element = Element {
            kind,
            value,
            start: span.start as u16,
            length: span.length.min(u8::MAX as usize) as u8,
        };
        self.elements
            .enter(element)
            .map_err(|code| CompileError::new(code, span))
    }

    /// Enter an End element; adjacent Ends coalesce, and a hard end
    /// upgrades a preceding soft end.
    fn enter_end(&mut self, hard: bool, span: Span) -> Result<()> {
        if let Some(last) = self.elements.last_mut() {
            if last.kind == ElementKind::End {
                if hard {
                    last.value = 0;
                }
                return Ok(());
            }
        }
        self.enter_element(ElementKind::End, u16::from(!hard), span)
    }

    /// Produce the element stream.
    ///
    /// `full` selects the whole language; otherwise only editor directives
    /// and line ends are recognized.
    pub(crate) fn elementize(&mut self, full: bool) -> Result<()> {
        self.elements.clear();
        let mut i = 0usize;
        let len = self.src_len;

        while i <= len {
            let c = self.src[i];
            match c {
                0 | 9 | 32 => i += 1,
                ETX => {
                    self.enter_end(true, Span::new(i, 1))?;
                    i += 1;
                }
                b'\'' => {
                    if full {
                        i = self.skip_to_etx(i);
                    } else {
                        i = self.scan_directive_comment(i + 1)?;
                    }
                }
                _ if !full => i += 1,
                b':' => {
                    self.enter_end(false, Span::new(i, 1))?;
                    i += 1;
                }
                b',' => {
                    self.enter_element(ElementKind::Comma, 0, Span::new(i, 1))?;
                    i += 1;
                    if self.rec.lang_250() {
                        // A comma at end of line continues the statement.
                        let mut j = i;
                        while j < len && matches!(self.src[j], 0 | 9 | 32) {
                            j += 1;
                        }
                        if self.src[j] == ETX && j < len {
                            i = j + 1;
                        }
                    }
                }
                b'"' => i = self.scan_string(i)?,
                b'%' => i = self.scan_number(i + 1, Base::Binary, 0, Span::new(i, 1))?.0,
                b'$' => i = self.scan_number(i + 1, Base::Hexadecimal, 0, Span::new(i, 1))?.0,
                b'0'..=b'9' => i = self.scan_number(i, Base::Decimal, 0, Span::new(i, 1))?.0,
                b'#' => i = self.scan_cc_directive(i)?,
                c if is_symbol_char(c) => i = self.scan_symbol(i)?,
                b'.' => {
                    self.enter_element(ElementKind::Period, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b'?' => {
                    self.enter_element(ElementKind::Question, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b'\\' => {
                    self.enter_element(ElementKind::Backslash, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b'@' => {
                    self.enter_element(ElementKind::At, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b'(' => {
                    self.enter_element(ElementKind::Left, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b')' => {
                    self.enter_element(ElementKind::Right, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b'[' => {
                    self.enter_element(ElementKind::LeftBracket, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b']' => {
                    self.enter_element(ElementKind::RightBracket, 0, Span::new(i, 1))?;
                    i += 1;
                }
                b'}' => {
                    self.enter_element(ElementKind::RightCurlyBrace, 0, Span::new(i, 1))?;
                    i += 1;
                }
                _ => i = self.scan_operator(i)?,
            }
            if i > len {
                break;
            }
        }

        // Passes past the lexer rely on a trailing hard end.
        self.enter_end(true, Span::new(len, 0))?;
        Ok(())
    }

    /// Position of the line-terminating ETX at or after `i`.
    fn skip_to_etx(&self, i: usize) -> usize {
        match memchr(ETX, &self.src[i..=self.src_len]) {
            Some(off) => i + off,
            None => self.src_len,
        }
    }

    fn scan_string(&mut self, quote: usize) -> Result<usize> {
        let mut i = quote + 1;
        if self.src[i] == b'"' {
            return Err(CompileError::new(
                ErrorCode::EmptyString,
                Span::new(quote, 2),
            ));
        }
        let mut first = true;
        while self.src[i] != b'"' {
            if self.src[i] == ETX {
                return Err(CompileError::new(
                    ErrorCode::UnterminatedString,
                    Span::new(quote, i - quote),
                ));
            }
            if !first {
                self.enter_element(ElementKind::Comma, 0, Span::new(i, 1))?;
            }
            self.enter_element(ElementKind::Constant, u16::from(self.src[i]), Span::new(i, 1))?;
            first = false;
            i += 1;
        }
        Ok(i + 1)
    }

    /// Scan a numeric literal. Returns the index past the literal and its
    /// value. `dp_digits` enables a decimal point with that many fractional
    /// digits, right-padding the integral value (dialect-version literals).
    fn scan_number(
        &mut self,
        start: usize,
        base: Base,
        dp_digits: u32,
        prefix: Span,
    ) -> Result<(usize, u16)> {
        let mut i = start;
        let mut digits = 0u32;
        let mut value = 0u64;
        let mut frac: Option<u32> = None;
        let radix = u64::from(base.radix());

        loop {
            let c = self.src[i];
            if c == b'.' && dp_digits > 0 && frac.is_none() && base == Base::Decimal {
                frac = Some(0);
                i += 1;
                continue;
            }
            if !is_symbol_char(c) {
                break;
            }
            let digit = (c as char).to_digit(base.radix()).ok_or_else(|| {
                let code = match base {
                    Base::Binary => ErrorCode::ExpectedBinaryDigit,
                    Base::Hexadecimal => ErrorCode::ExpectedHexDigit,
                    Base::Decimal => ErrorCode::UnrecognizedCharacter,
                };
                CompileError::new(code, Span::new(i, 1))
            })?;
            digits += 1;
            if digits > 16 {
                return Err(CompileError::new(
                    ErrorCode::ConstantTooManyDigits,
                    Span::new(prefix.start, i - prefix.start + 1),
                ));
            }
            match frac.as_mut() {
                None => value = value * radix + u64::from(digit),
                Some(count) => {
                    *count += 1;
                    if *count > dp_digits {
                        return Err(CompileError::new(
                            ErrorCode::ConstantTooManyDigits,
                            Span::new(prefix.start, i - prefix.start + 1),
                        ));
                    }
                    value = value * 10 + u64::from(digit);
                }
            }
            if value > 0xFFFF {
                return Err(CompileError::new(
                    ErrorCode::ConstantOverflow,
                    Span::new(prefix.start, i - prefix.start + 1),
                ));
            }
            i += 1;
        }

        if digits == 0 {
            let code = match base {
                Base::Binary => ErrorCode::ExpectedBinaryDigit,
                Base::Hexadecimal => ErrorCode::ExpectedHexDigit,
                Base::Decimal => ErrorCode::ExpectedConstant,
            };
            return Err(CompileError::new(code, prefix));
        }

        // Right-pad to the requested number of fractional digits.
        for _ in frac.unwrap_or(0)..dp_digits {
            value *= 10;
            if value > 0xFFFF {
                return Err(CompileError::new(
                    ErrorCode::ConstantOverflow,
                    Span::new(prefix.start, i - prefix.start),
                ));
            }
        }

        let span = Span::new(prefix.start, i - prefix.start);
        self.enter_element(ElementKind::Constant, value as u16, span)?;
        Ok((i, value as u16))
    }

    fn scan_symbol(&mut self, start: usize) -> Result<usize> {
        let mut i = start;
        while is_symbol_char(self.src[i]) {
            i += 1;
        }
        let span = Span::new(start, i - start);
        if span.length > 32 {
            return Err(CompileError::new(ErrorCode::SymbolTooLong, span));
        }
        let name = self.symbol_name(span);
        match self.symbols.find(&name) {
            Some(symbol) => {
                let (kind, value) = (symbol.kind, symbol.value);
                self.enter_element(kind, value, span)?;
                // A declaration keyword retroactively marks the preceding
                // undefined name as a user declaration target.
                if matches!(
                    kind,
                    ElementKind::Data | ElementKind::Var | ElementKind::Con | ElementKind::Pin
                ) {
                    let count = self.elements.len();
                    if count >= 2 {
                        let prev = self.elements.get(count - 2);
                        if prev.kind == ElementKind::Undefined {
                            let prev_name = self.symbol_name(prev.span());
                            self.undef
                                .enter(&prev_name)
                                .map_err(|code| CompileError::new(code, prev.span()))?;
                        }
                    }
                }
            }
            None => self.enter_element(ElementKind::Undefined, 0, span)?,
        }
        Ok(i)
    }

    fn scan_cc_directive(&mut self, start: usize) -> Result<usize> {
        if !self.rec.lang_250() {
            return Err(CompileError::new(
                ErrorCode::UnrecognizedCharacter,
                Span::new(start, 1),
            ));
        }
        let mut i = start + 1;
        while is_symbol_char(self.src[i]) {
            i += 1;
        }
        let span = Span::new(start, i - start);
        if span.length < 2 || span.length > 32 {
            return Err(CompileError::new(ErrorCode::UnknownCcDirective, span));
        }
        let name = self.symbol_name(span);
        match self.symbols.find(&name) {
            Some(symbol) if matches!(symbol.kind, ElementKind::CcDirective | ElementKind::CcThen) => {
                let (kind, value) = (symbol.kind, symbol.value);
                self.enter_element(kind, value, span)?;
                Ok(i)
            }
            _ => Err(CompileError::new(ErrorCode::UnknownCcDirective, span)),
        }
    }

    /// Single- and two-character operators. A two-character match is tried
    /// first; whitespace may intervene between the two characters.
    fn scan_operator(&mut self, start: usize) -> Result<usize> {
        let first = self.src[start];
        let mut j = start + 1;
        while j < self.src_len && matches!(self.src[j], 0 | 9 | 32) {
            j += 1;
        }
        let second = self.src[j];

        let two = match (first, second) {
            (b'*', b'/') => Some((ElementKind::BinaryOp, Op::Mum)),
            (b'*', b'*') => Some((ElementKind::BinaryOp, Op::Muh)),
            (b'/', b'/') => Some((ElementKind::BinaryOp, Op::Mod)),
            (b'<', b'<') => Some((ElementKind::BinaryOp, Op::Shl)),
            (b'>', b'>') => Some((ElementKind::BinaryOp, Op::Shr)),
            (b'<', b'=') | (b'=', b'<') => Some((ElementKind::Cond1Op, Op::Be)),
            (b'>', b'=') | (b'=', b'>') => Some((ElementKind::Cond1Op, Op::Ae)),
            (b'<', b'>') | (b'>', b'<') => Some((ElementKind::Cond1Op, Op::Ne)),
            _ => None,
        };
        if let Some((kind, op)) = two {
            self.enter_element(kind, op as u16, Span::new(start, j - start + 1))?;
            return Ok(j + 1);
        }

        let one = match first {
            b'+' => Some((ElementKind::BinaryOp, Op::Add)),
            b'-' => Some((ElementKind::BinaryOp, Op::Sub)),
            b'*' => Some((ElementKind::BinaryOp, Op::Mul)),
            b'/' => Some((ElementKind::BinaryOp, Op::Div)),
            b'&' => Some((ElementKind::BinaryOp, Op::And)),
            b'|' => Some((ElementKind::BinaryOp, Op::Or)),
            b'^' => Some((ElementKind::BinaryOp, Op::Xor)),
            b'~' => Some((ElementKind::UnaryOp, Op::Not)),
            b'<' => Some((ElementKind::Cond1Op, Op::B)),
            b'>' => Some((ElementKind::Cond1Op, Op::A)),
            b'=' => Some((ElementKind::Cond1Op, Op::E)),
            _ => None,
        };
        match one {
            Some((kind, op)) => {
                self.enter_element(kind, op as u16, Span::new(start, 1))?;
                Ok(start + 1)
            }
            None => Err(CompileError::new(
                ErrorCode::UnrecognizedCharacter,
                Span::new(start, 1),
            )),
        }
    }

    // --- Directives-only pass ---

    /// Parse a `{$DIRECTIVE ...}` comment body. Non-directive comment
    /// content is skipped to end-of-line.
    fn scan_directive_comment(&mut self, start: usize) -> Result<usize> {
        let mut i = start;
        while matches!(self.src[i], 0 | 9 | 32) {
            i += 1;
        }
        if self.src[i] != b'{' {
            return Ok(self.skip_to_etx(i));
        }
        i += 1;
        while matches!(self.src[i], 0 | 9 | 32) {
            i += 1;
        }
        if self.src[i] != b'$' {
            return Ok(self.skip_to_etx(i));
        }
        let name_start = i + 1;
        i = name_start;
        while is_symbol_char(self.src[i]) {
            i += 1;
        }
        let span = Span::new(name_start, i - name_start);
        if span.length == 0 || span.length > 32 {
            return Err(CompileError::new(ErrorCode::ExpectedDirective, span));
        }
        let name = self.symbol_name(span);
        let directive = match self.symbols.find(&name) {
            Some(symbol) if symbol.kind == ElementKind::Directive => symbol.value,
            _ => return Err(CompileError::new(ErrorCode::ExpectedDirective, span)),
        };
        self.enter_element(ElementKind::Directive, directive, span)?;

        i = match directive {
            d if d == DirectiveKind::Stamp as u16 => self.scan_stamp_arguments(i)?,
            d if d == DirectiveKind::Port as u16 => self.scan_port_argument(i)?,
            _ => self.scan_pbasic_argument(i)?,
        };

        while matches!(self.src[i], 0 | 9 | 32) {
            i += 1;
        }
        if self.src[i] != b'}' {
            return Err(CompileError::new(
                ErrorCode::ExpectedRightCurly,
                Span::new(i, 1),
            ));
        }
        Ok(self.skip_to_etx(i + 1))
    }

    fn scan_stamp_arguments(&mut self, start: usize) -> Result<usize> {
        let mut i = start;
        while matches!(self.src[i], 0 | 9 | 32) {
            i += 1;
        }
        let name_start = i;
        while is_symbol_char(self.src[i]) {
            i += 1;
        }
        let span = Span::new(name_start, i - name_start);
        if span.length == 0 || span.length > 32 {
            return Err(CompileError::new(ErrorCode::ExpectedTargetModule, span));
        }
        let name = self.symbol_name(span);
        match self.symbols.find(&name) {
            Some(symbol) if symbol.kind == ElementKind::TargetModule => {
                let value = symbol.value;
                self.enter_element(ElementKind::TargetModule, value, span)?;
            }
            _ => return Err(CompileError::new(ErrorCode::ExpectedTargetModule, span)),
        }

        // Up to seven related project files.
        loop {
            while matches!(self.src[i], 0 | 9 | 32) {
                i += 1;
            }
            if self.src[i] != b',' {
                return Ok(i);
            }
            i += 1;
            while matches!(self.src[i], 0 | 9 | 32) {
                i += 1;
            }
            if self.filenames.len() >= 7 {
                return Err(CompileError::new(
                    ErrorCode::ExpectedRightCurly,
                    Span::new(i, 1),
                ));
            }
            i = self.scan_filename(i)?;
        }
    }

    fn scan_port_argument(&mut self, start: usize) -> Result<usize> {
        let mut i = start;
        while matches!(self.src[i], 0 | 9 | 32) {
            i += 1;
        }
        self.scan_filename(i)
    }

    fn scan_pbasic_argument(&mut self, start: usize) -> Result<usize> {
        let mut i = start;
        while matches!(self.src[i], 0 | 9 | 32) {
            i += 1;
        }
        if !self.src[i].is_ascii_digit() {
            return Err(CompileError::new(
                ErrorCode::InvalidVersion,
                Span::new(i, 1),
            ));
        }
        let (next, _) = self.scan_number(i, Base::Decimal, 2, Span::new(i, 1))?;
        Ok(next)
    }

    /// Scan a (possibly quoted) file name and enter a FileName element whose
    /// value indexes into the parsed-names list.
    fn scan_filename(&mut self, start: usize) -> Result<usize> {
        let mut i = start;
        let quoted = self.src[i] == b'"';
        if quoted {
            i += 1;
        }
        let name_start = i;
        while is_file_path_char(self.src[i], quoted) {
            i += 1;
        }
        let length = i - name_start;
        if length == 0 || length > 255 {
            return Err(CompileError::new(
                ErrorCode::ExpectedFilename,
                Span::new(start, 1),
            ));
        }
        if quoted {
            if self.src[i] != b'"' {
                return Err(CompileError::new(
                    ErrorCode::UnterminatedString,
                    Span::new(start, i - start),
                ));
            }
            i += 1;
        }
        let span = Span::new(name_start, length);
        let name: String = self.src[span.start..span.start + span.length]
            .iter()
            .map(|&b| b as char)
            .collect();
        let index = self.filenames.len() as u16;
        self.filenames.push((name, span.start));
        self.enter_element(ElementKind::FileName, index, span)?;
        Ok(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::types::CompileOptions;

    fn lex(source: &str) -> Vec<Element> {
        let mut src = source.as_bytes().to_vec();
        let mut compiler = Compiler::new(&mut src, CompileOptions::default());
        compiler.rec.language_version = crate::types::VERSION_2_5;
        compiler.init_symbols().unwrap();
        compiler.normalize_source().unwrap();
        compiler.elementize(true).unwrap();
        let mut out = Vec::new();
        while let Some((_, el)) = compiler.elements.next() {
            out.push(el);
        }
        out
    }

    fn lex_err(source: &str) -> ErrorCode {
        let mut src = source.as_bytes().to_vec();
        let mut compiler = Compiler::new(&mut src, CompileOptions::default());
        compiler.rec.language_version = crate::types::VERSION_2_5;
        compiler.init_symbols().unwrap();
        compiler.normalize_source().unwrap();
        compiler.elementize(true).unwrap_err().code
    }

    #[test]
    fn test_numbers() {
        let els = lex("99 $FF %101");
        assert_eq!(els[0].value, 99);
        assert_eq!(els[1].value, 0xFF);
        assert_eq!(els[2].value, 5);
        assert!(els[..3].iter().all(|e| e.kind == ElementKind::Constant));
    }

    #[test]
    fn test_number_errors() {
        assert_eq!(lex_err("$GG"), ErrorCode::ExpectedHexDigit);
        assert_eq!(lex_err("%2"), ErrorCode::ExpectedBinaryDigit);
        assert_eq!(lex_err("70000"), ErrorCode::ConstantOverflow);
        assert_eq!(lex_err("11111111111111111"), ErrorCode::ConstantTooManyDigits);
    }

    #[test]
    fn test_string_becomes_comma_separated_constants() {
        let els = lex("\"AB\"");
        assert_eq!(els[0].kind, ElementKind::Constant);
        assert_eq!(els[0].value, u16::from(b'A'));
        assert_eq!(els[1].kind, ElementKind::Comma);
        assert_eq!(els[2].value, u16::from(b'B'));
    }

    #[test]
    fn test_string_errors() {
        assert_eq!(lex_err("\"\""), ErrorCode::EmptyString);
        assert_eq!(lex_err("\"abc"), ErrorCode::UnterminatedString);
    }

    #[test]
    fn test_two_char_operators() {
        let els = lex("<< >= */ <>");
        assert_eq!(els[0].kind, ElementKind::BinaryOp);
        assert_eq!(els[0].value, Op::Shl as u16);
        assert_eq!(els[1].kind, ElementKind::Cond1Op);
        assert_eq!(els[1].value, Op::Ae as u16);
        assert_eq!(els[2].value, Op::Mum as u16);
        assert_eq!(els[3].value, Op::Ne as u16);
    }

    #[test]
    fn test_two_char_operator_with_gap() {
        let els = lex("< =");
        assert_eq!(els[0].kind, ElementKind::Cond1Op);
        assert_eq!(els[0].value, Op::Be as u16);
    }

    #[test]
    fn test_known_symbol_and_undefined() {
        let els = lex("high blinky");
        assert_eq!(els[0].kind, ElementKind::Instruction);
        assert_eq!(els[1].kind, ElementKind::Undefined);
    }

    #[test]
    fn test_ends_coalesce_and_colon_is_soft() {
        let els = lex("HIGH 0 : LOW 0\n\n\nEND");
        let ends: Vec<_> = els.iter().filter(|e| e.kind == ElementKind::End).collect();
        // soft end between statements, one coalesced hard end, trailing end
        assert_eq!(ends[0].value, 1);
        assert_eq!(ends[1].value, 0);
    }

    #[test]
    fn test_comment_skipped() {
        let els = lex("HIGH 0 ' this is { not a directive\nLOW 0");
        let kinds: Vec<_> = els.iter().map(|e| e.kind).collect();
        assert!(!kinds.contains(&ElementKind::Undefined));
        assert_eq!(
            kinds.iter().filter(|k| **k == ElementKind::Instruction).count(),
            2
        );
    }

    #[test]
    fn test_comma_continuation_in_250() {
        let els = lex("LOOKUP 1, \nHIGH 0");
        // no End element between the comma and the next token
        let comma_pos = els.iter().position(|e| e.kind == ElementKind::Comma).unwrap();
        assert_ne!(els[comma_pos + 1].kind, ElementKind::End);
    }

    #[test]
    fn test_symbol_too_long() {
        assert_eq!(lex_err(&"A".repeat(33)), ErrorCode::SymbolTooLong);
    }
}
