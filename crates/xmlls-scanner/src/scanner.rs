use crate::token::{is_name_char, is_name_start_char, Span, Token, TokenKind};

/// Scanner mode selects the initial lexical state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScannerMode {
    /// Element content: `<root>...</root>`.
    #[default]
    Xml,
    /// A standalone DTD file: the text starts directly in declaration content
    /// and `]` never terminates an internal subset.
    Dtd,
}

/// Lexical state of the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    WithinContent,
    AfterOpeningStartTag,
    WithinTag,
    AfterAttributeName,
    BeforeAttributeValue,
    WithinComment,
    WithinCData,
    /// After `<?`, expecting the target name.
    WithinProcessingInstruction,
    WithinPiContent,
    AfterOpeningEndTag,
    WithinEndTag,

    // <!DOCTYPE ...> header
    DtdWithinDoctype,
    DtdAfterDoctypeName,
    DtdAfterDoctypePublic,
    DtdAfterDoctypeSystem,
    DtdAfterDoctypePublicId,
    DtdAfterDoctypeSystemId,

    // Internal subset / DTD file
    DtdWithinContent,
    DtdAfterInternalSubset,
    DtdWithinElement,
    DtdWithinAttlist,
    DtdWithinEntity,
}

/// Outcome of one scanning attempt in the current state.
enum Step {
    /// A non-empty token ending at the current position.
    Emit(TokenKind),
    /// The state changed without consuming input; scan again.
    Rescan,
}

/// XML / DTD scanner.
///
/// A single-pass, forward-only state machine over the source text. Every call
/// to [`Scanner::scan`] returns the next token; malformed input is classified
/// as the most permissive token that applies so the stream always terminates.
///
/// Offsets are byte offsets. Every delimiter the scanner looks for is ASCII, so
/// token boundaries always fall on char boundaries.
pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    mode: ScannerMode,
    state: ScannerState,
    /// State resumed after a comment, PI or prolog ends.
    markup_return: ScannerState,
    has_space_after_tag: bool,
    within_prolog: bool,
    /// Position inside the current DTD declaration (name, type, value, ...).
    decl_step: u8,
}

impl<'a> Scanner<'a> {
    /// Create a scanner over XML element content.
    pub fn new(source: &'a str) -> Self {
        Self::with_mode(source, ScannerMode::Xml)
    }

    /// Create a scanner with a specific mode.
    pub fn with_mode(source: &'a str, mode: ScannerMode) -> Self {
        Self::starting_at(source, 0, mode)
    }

    /// Create a scanner that starts at `offset`. The offset is clamped to the
    /// text and moved back to the nearest char boundary.
    pub fn starting_at(source: &'a str, offset: usize, mode: ScannerMode) -> Self {
        let mut pos = offset.min(source.len());
        while !source.is_char_boundary(pos) {
            pos -= 1;
        }
        let initial = match mode {
            ScannerMode::Xml => ScannerState::WithinContent,
            ScannerMode::Dtd => ScannerState::DtdWithinContent,
        };
        Self {
            source,
            pos,
            mode,
            state: initial,
            markup_return: initial,
            has_space_after_tag: false,
            within_prolog: false,
            decl_step: 0,
        }
    }

    /// Tokenize the entire source. The last token is always `Eos`.
    pub fn tokenize(source: &'a str, mode: ScannerMode) -> Vec<Token<'a>> {
        let mut scanner = Scanner::with_mode(source, mode);
        let mut tokens = Vec::new();
        loop {
            let token = scanner.next_token();
            tokens.push(token);
            if token.kind == TokenKind::Eos {
                return tokens;
            }
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn mode(&self) -> ScannerMode {
        self.mode
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Scan the next token. Returns `Eos` at the end of the text, forever.
    pub fn next_token(&mut self) -> Token<'a> {
        loop {
            let start = self.pos;
            if self.is_at_end() {
                return self.finish(TokenKind::Eos, start);
            }
            if let Step::Emit(kind) = self.scan_step() {
                debug_assert!(self.pos > start, "{kind:?} token must consume input");
                return self.finish(kind, start);
            }
        }
    }

    fn scan_step(&mut self) -> Step {
        match self.state {
            ScannerState::WithinContent => self.scan_content(),
            ScannerState::AfterOpeningStartTag => self.scan_after_opening_start_tag(),
            ScannerState::WithinTag => self.scan_within_tag(),
            ScannerState::AfterAttributeName => self.scan_after_attribute_name(),
            ScannerState::BeforeAttributeValue => self.scan_before_attribute_value(),
            ScannerState::WithinComment => self.scan_comment(),
            ScannerState::WithinCData => self.scan_cdata(),
            ScannerState::WithinProcessingInstruction => self.scan_pi_target(),
            ScannerState::WithinPiContent => self.scan_pi_content(),
            ScannerState::AfterOpeningEndTag => self.scan_after_opening_end_tag(),
            ScannerState::WithinEndTag => self.scan_within_end_tag(),
            ScannerState::DtdWithinDoctype
            | ScannerState::DtdAfterDoctypeName
            | ScannerState::DtdAfterDoctypePublic
            | ScannerState::DtdAfterDoctypeSystem
            | ScannerState::DtdAfterDoctypePublicId
            | ScannerState::DtdAfterDoctypeSystemId => self.scan_doctype_header(),
            ScannerState::DtdWithinContent => self.scan_dtd_content(),
            ScannerState::DtdAfterInternalSubset => self.scan_after_internal_subset(),
            ScannerState::DtdWithinElement => self.scan_element_decl(),
            ScannerState::DtdWithinAttlist => self.scan_attlist_decl(),
            ScannerState::DtdWithinEntity => self.scan_entity_decl(),
        }
    }

    // --- Element content ---

    fn scan_content(&mut self) -> Step {
        if self.advance_if("<") {
            if self.advance_if("!--") {
                self.enter_markup(ScannerState::WithinComment);
                return Step::Emit(TokenKind::StartCommentTag);
            }
            if self.advance_if("![CDATA[") {
                self.state = ScannerState::WithinCData;
                return Step::Emit(TokenKind::CDataTagOpen);
            }
            if self.advance_if_ignore_case("!DOCTYPE") {
                self.state = ScannerState::DtdWithinDoctype;
                return Step::Emit(TokenKind::DtdStartDoctypeTag);
            }
            if self.advance_if("/") {
                self.state = ScannerState::AfterOpeningEndTag;
                return Step::Emit(TokenKind::EndTagOpen);
            }
            if self.advance_if("?") {
                self.enter_markup(ScannerState::WithinProcessingInstruction);
                return Step::Emit(TokenKind::StartPrologOrPi);
            }
            self.state = ScannerState::AfterOpeningStartTag;
            self.has_space_after_tag = false;
            return Step::Emit(TokenKind::StartTagOpen);
        }
        self.advance_until_str("<");
        Step::Emit(TokenKind::Content)
    }

    // --- Start tags and attributes ---

    fn scan_after_opening_start_tag(&mut self) -> Step {
        if self.advance_name() {
            self.state = ScannerState::WithinTag;
            return Step::Emit(TokenKind::StartTag);
        }
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        self.state = ScannerState::WithinTag;
        if self.advance_while(|c| !is_whitespace(c) && !matches!(c, '>' | '<' | '/')) {
            return Step::Emit(TokenKind::Unknown);
        }
        Step::Rescan
    }

    fn scan_within_tag(&mut self) -> Step {
        if self.skip_whitespace() {
            self.has_space_after_tag = true;
            return Step::Emit(TokenKind::Whitespace);
        }
        if self.within_prolog && self.advance_if("?>") {
            self.leave_tag();
            return Step::Emit(TokenKind::PrologEnd);
        }
        if self.has_space_after_tag && self.advance_attribute_name() {
            self.state = ScannerState::AfterAttributeName;
            self.has_space_after_tag = false;
            return Step::Emit(TokenKind::AttributeName);
        }
        if self.advance_if("/>") {
            self.leave_tag();
            return Step::Emit(TokenKind::StartTagSelfClose);
        }
        if self.advance_if(">") {
            self.leave_tag();
            return Step::Emit(TokenKind::StartTagClose);
        }
        if self.peek() == Some('<') {
            self.leave_tag();
            return Step::Rescan;
        }
        self.advance_char();
        Step::Emit(TokenKind::Unknown)
    }

    fn scan_after_attribute_name(&mut self) -> Step {
        if self.skip_whitespace() {
            self.has_space_after_tag = true;
            return Step::Emit(TokenKind::Whitespace);
        }
        if self.advance_if("=") {
            self.state = ScannerState::BeforeAttributeValue;
            return Step::Emit(TokenKind::DelimiterAssign);
        }
        self.state = ScannerState::WithinTag;
        Step::Rescan
    }

    fn scan_before_attribute_value(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        self.state = ScannerState::WithinTag;
        self.has_space_after_tag = false;
        if self.advance_unquoted_value() || self.advance_quoted() {
            return Step::Emit(TokenKind::AttributeValue);
        }
        Step::Rescan
    }

    // --- End tags ---

    fn scan_after_opening_end_tag(&mut self) -> Step {
        if self.advance_name() {
            self.state = ScannerState::WithinEndTag;
            return Step::Emit(TokenKind::EndTag);
        }
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        self.state = ScannerState::WithinEndTag;
        if self.advance_while(|c| !is_whitespace(c) && !matches!(c, '>' | '<')) {
            return Step::Emit(TokenKind::Unknown);
        }
        Step::Rescan
    }

    fn scan_within_end_tag(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if self.advance_if(">") {
            self.state = ScannerState::WithinContent;
            return Step::Emit(TokenKind::EndTagClose);
        }
        if self.peek() == Some('<') {
            self.state = ScannerState::WithinContent;
            return Step::Rescan;
        }
        self.advance_char();
        self.advance_while(|c| !is_whitespace(c) && !matches!(c, '>' | '<'));
        Step::Emit(TokenKind::Unknown)
    }

    // --- Comments, CDATA, processing instructions ---

    fn scan_comment(&mut self) -> Step {
        if self.advance_if("-->") {
            self.state = self.markup_return;
            return Step::Emit(TokenKind::EndCommentTag);
        }
        self.advance_until_str("-->");
        Step::Emit(TokenKind::Comment)
    }

    fn scan_cdata(&mut self) -> Step {
        if self.advance_if("]]>") {
            self.state = ScannerState::WithinContent;
            return Step::Emit(TokenKind::CDataTagClose);
        }
        self.advance_until_str("]]>");
        Step::Emit(TokenKind::CDataContent)
    }

    fn scan_pi_target(&mut self) -> Step {
        if self.advance_prolog_target() {
            self.state = ScannerState::WithinTag;
            self.within_prolog = true;
            self.has_space_after_tag = false;
            return Step::Emit(TokenKind::PrologName);
        }
        self.state = ScannerState::WithinPiContent;
        if self.advance_name() {
            return Step::Emit(TokenKind::PiName);
        }
        Step::Rescan
    }

    fn scan_pi_content(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if self.advance_if("?>") {
            self.state = self.markup_return;
            return Step::Emit(TokenKind::PiEnd);
        }
        self.advance_until_str("?>");
        Step::Emit(TokenKind::PiContent)
    }

    // --- <!DOCTYPE ...> ---

    fn scan_doctype_header(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if let Some(step) = self.doctype_delimiter() {
            return step;
        }
        match self.state {
            ScannerState::DtdWithinDoctype => {
                if self.advance_while(|c| !is_whitespace(c) && !matches!(c, '[' | ']' | '<' | '>' | '"' | '\'')) {
                    self.state = ScannerState::DtdAfterDoctypeName;
                    return Step::Emit(TokenKind::DtdDoctypeName);
                }
            }
            ScannerState::DtdAfterDoctypeName => {
                if self.advance_keyword("PUBLIC") {
                    self.state = ScannerState::DtdAfterDoctypePublic;
                    return Step::Emit(TokenKind::DtdDoctypeKindPublic);
                }
                if self.advance_keyword("SYSTEM") {
                    self.state = ScannerState::DtdAfterDoctypeSystem;
                    return Step::Emit(TokenKind::DtdDoctypeKindSystem);
                }
            }
            ScannerState::DtdAfterDoctypePublic => {
                if self.advance_quoted() {
                    self.state = ScannerState::DtdAfterDoctypePublicId;
                    return Step::Emit(TokenKind::DtdDoctypePublicId);
                }
            }
            ScannerState::DtdAfterDoctypeSystem | ScannerState::DtdAfterDoctypePublicId => {
                if self.advance_quoted() {
                    self.state = ScannerState::DtdAfterDoctypeSystemId;
                    return Step::Emit(TokenKind::DtdDoctypeSystemId);
                }
            }
            _ => {}
        }
        self.unrecognized()
    }

    /// `[`, `>` and `<` end the doctype header wherever they appear.
    fn doctype_delimiter(&mut self) -> Option<Step> {
        if self.advance_if("[") {
            self.state = ScannerState::DtdWithinContent;
            self.markup_return = ScannerState::DtdWithinContent;
            return Some(Step::Emit(TokenKind::DtdStartInternalSubset));
        }
        if self.advance_if(">") {
            self.state = ScannerState::WithinContent;
            return Some(Step::Emit(TokenKind::DtdEndDoctypeTag));
        }
        if self.peek() == Some('<') {
            self.state = ScannerState::WithinContent;
            return Some(Step::Rescan);
        }
        None
    }

    // --- Internal subset / DTD file content ---

    fn scan_dtd_content(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if self.mode == ScannerMode::Xml && self.advance_if("]") {
            self.state = ScannerState::DtdAfterInternalSubset;
            self.markup_return = ScannerState::WithinContent;
            return Step::Emit(TokenKind::DtdEndInternalSubset);
        }
        if self.advance_if("<!ELEMENT") {
            self.enter_decl(ScannerState::DtdWithinElement);
            return Step::Emit(TokenKind::DtdStartElementDecl);
        }
        if self.advance_if("<!ATTLIST") {
            self.enter_decl(ScannerState::DtdWithinAttlist);
            return Step::Emit(TokenKind::DtdStartAttlistDecl);
        }
        if self.advance_if("<!ENTITY") {
            self.enter_decl(ScannerState::DtdWithinEntity);
            return Step::Emit(TokenKind::DtdStartEntity);
        }
        if self.advance_if("<!--") {
            self.enter_markup(ScannerState::WithinComment);
            return Step::Emit(TokenKind::StartCommentTag);
        }
        if self.advance_if("<?") {
            self.enter_markup(ScannerState::WithinProcessingInstruction);
            return Step::Emit(TokenKind::StartPrologOrPi);
        }
        self.unrecognized()
    }

    fn scan_after_internal_subset(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if self.advance_if(">") {
            self.state = ScannerState::WithinContent;
            return Step::Emit(TokenKind::DtdEndDoctypeTag);
        }
        if self.peek() == Some('<') {
            self.state = ScannerState::WithinContent;
            return Step::Rescan;
        }
        self.unrecognized()
    }

    /// `>` closes a declaration; `<` (and `]` inside an internal subset)
    /// abandons it.
    fn decl_delimiter(&mut self) -> Option<Step> {
        if self.advance_if(">") {
            self.state = ScannerState::DtdWithinContent;
            return Some(Step::Emit(TokenKind::DtdEndTag));
        }
        match self.peek() {
            Some('<') => {
                self.state = ScannerState::DtdWithinContent;
                Some(Step::Rescan)
            }
            Some(']') if self.mode == ScannerMode::Xml => {
                self.state = ScannerState::DtdWithinContent;
                Some(Step::Rescan)
            }
            _ => None,
        }
    }

    /// `<!ELEMENT name (content)>` or `<!ELEMENT name EMPTY|ANY>`.
    fn scan_element_decl(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if let Some(step) = self.decl_delimiter() {
            return step;
        }
        let step = self.decl_step;
        match step {
            0 if self.advance_decl_word() => {
                self.decl_step = 1;
                return Step::Emit(TokenKind::DtdElementDeclName);
            }
            1 if self.advance_keyword("EMPTY") || self.advance_keyword("ANY") => {
                self.decl_step = 2;
                return Step::Emit(TokenKind::DtdElementCategory);
            }
            1 if self.advance_parenthesized() => {
                self.advance_if_any(&['?', '*', '+']);
                self.decl_step = 2;
                return Step::Emit(TokenKind::DtdElementContent);
            }
            _ => {}
        }
        self.unrecognized()
    }

    /// `<!ATTLIST element (name type default)*>`.
    fn scan_attlist_decl(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if let Some(step) = self.decl_delimiter() {
            return step;
        }
        let step = self.decl_step;
        match step {
            0 if self.advance_decl_word() => {
                self.decl_step = 1;
                Step::Emit(TokenKind::DtdAttlistElementName)
            }
            1 if self.advance_decl_word() => {
                self.decl_step = 2;
                Step::Emit(TokenKind::DtdAttlistAttributeName)
            }
            2 if self.advance_parenthesized() => {
                self.decl_step = 3;
                Step::Emit(TokenKind::DtdAttlistAttributeType)
            }
            2 if self.advance_decl_word() => {
                // `NOTATION (a|b)` keeps the enumeration as part of the type.
                if self.last_word() != "NOTATION" {
                    self.decl_step = 3;
                }
                Step::Emit(TokenKind::DtdAttlistAttributeType)
            }
            3 if self.advance_quoted() => {
                self.decl_step = 1;
                Step::Emit(TokenKind::DtdAttlistAttributeValue)
            }
            3 if self.peek() == Some('#') && self.advance_decl_word() => {
                if self.last_word() != "#FIXED" {
                    self.decl_step = 1;
                }
                Step::Emit(TokenKind::DtdAttlistAttributeValue)
            }
            3 if self.advance_decl_word() => {
                self.decl_step = 2;
                Step::Emit(TokenKind::DtdAttlistAttributeName)
            }
            _ => self.unrecognized(),
        }
    }

    /// `<!ENTITY [%] name ("value" | PUBLIC "pub" "sys" | SYSTEM "sys")>`.
    fn scan_entity_decl(&mut self) -> Step {
        if self.skip_whitespace() {
            return Step::Emit(TokenKind::Whitespace);
        }
        if let Some(step) = self.decl_delimiter() {
            return step;
        }
        let step = self.decl_step;
        match step {
            0 if self.peek() == Some('%') && self.peek_at(1).map_or(true, is_whitespace) => {
                self.advance_char();
                Step::Emit(TokenKind::DtdEntityPercent)
            }
            0 if self.advance_decl_word() => {
                self.decl_step = 1;
                Step::Emit(TokenKind::DtdEntityName)
            }
            1 if self.advance_quoted() => {
                self.decl_step = 5;
                Step::Emit(TokenKind::DtdEntityValue)
            }
            1 if self.advance_keyword("PUBLIC") => {
                self.decl_step = 2;
                Step::Emit(TokenKind::DtdEntityKindPublic)
            }
            1 if self.advance_keyword("SYSTEM") => {
                self.decl_step = 4;
                Step::Emit(TokenKind::DtdEntityKindSystem)
            }
            2 if self.advance_quoted() => {
                self.decl_step = 3;
                Step::Emit(TokenKind::DtdEntityPublicId)
            }
            3 | 4 if self.advance_quoted() => {
                self.decl_step = 5;
                Step::Emit(TokenKind::DtdEntitySystemId)
            }
            _ => self.unrecognized(),
        }
    }

    /// Consume at least one char, then up to the next whitespace or markup
    /// delimiter.
    fn unrecognized(&mut self) -> Step {
        self.advance_char();
        self.advance_while(|c| !is_whitespace(c) && !matches!(c, '<' | '>' | '[' | ']'));
        Step::Emit(TokenKind::DtdUnrecognizedParameters)
    }

    // --- State helpers ---

    /// Enter a comment or PI, remembering where to resume once it ends.
    fn enter_markup(&mut self, state: ScannerState) {
        self.markup_return = match self.state {
            ScannerState::DtdWithinContent => ScannerState::DtdWithinContent,
            _ => ScannerState::WithinContent,
        };
        self.state = state;
    }

    fn enter_decl(&mut self, state: ScannerState) {
        self.state = state;
        self.decl_step = 0;
    }

    fn leave_tag(&mut self) {
        self.state = if self.within_prolog {
            self.markup_return
        } else {
            ScannerState::WithinContent
        };
        self.within_prolog = false;
    }

    // --- Character helpers ---

    fn finish(&self, kind: TokenKind, start: usize) -> Token<'a> {
        let span = Span::new(start, self.pos);
        Token::new(kind, span, &self.source[start..self.pos])
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn advance_char(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += ch.len_utf8();
        }
    }

    fn advance_if(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    fn advance_if_ignore_case(&mut self, expected: &str) -> bool {
        let matches = self
            .rest()
            .as_bytes()
            .get(..expected.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(expected.as_bytes()));
        if matches {
            self.pos += expected.len();
        }
        matches
    }

    fn advance_if_any(&mut self, chars: &[char]) -> bool {
        match self.peek() {
            Some(ch) if chars.contains(&ch) => {
                self.pos += ch.len_utf8();
                true
            }
            _ => false,
        }
    }

    /// A keyword not immediately followed by a name char.
    fn advance_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest();
        if !rest.starts_with(keyword) {
            return false;
        }
        if rest[keyword.len()..].chars().next().is_some_and(is_name_char) {
            return false;
        }
        self.pos += keyword.len();
        true
    }

    /// Advance while `pred` holds; true if anything was consumed.
    fn advance_while(&mut self, pred: impl Fn(char) -> bool) -> bool {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        self.pos > start
    }

    /// Advance up to (not over) `pattern`, or to the end of the text.
    fn advance_until_str(&mut self, pattern: &str) -> bool {
        match self.rest().find(pattern) {
            Some(index) => {
                self.pos += index;
                true
            }
            None => {
                self.pos = self.source.len();
                false
            }
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        self.advance_while(is_whitespace)
    }

    fn advance_name(&mut self) -> bool {
        if !self.peek().is_some_and(is_name_start_char) {
            return false;
        }
        self.advance_while(is_name_char)
    }

    fn advance_attribute_name(&mut self) -> bool {
        let in_prolog = self.within_prolog;
        self.advance_while(|c| {
            !is_whitespace(c) && !matches!(c, '"' | '\'' | '<' | '>' | '/' | '=') && !(in_prolog && c == '?')
        })
    }

    /// `[^\s"'`=<>]+`, leaving a trailing `/` of `/>` unconsumed.
    fn advance_unquoted_value(&mut self) -> bool {
        let start = self.pos;
        self.advance_while(|c| !is_whitespace(c) && !matches!(c, '"' | '\'' | '`' | '=' | '<' | '>'));
        if self.pos > start && self.peek() == Some('>') && self.source.as_bytes()[self.pos - 1] == b'/' {
            self.pos -= 1;
        }
        self.pos > start
    }

    /// A `"` or `'` quoted string; an unterminated one runs to the end of text.
    fn advance_quoted(&mut self) -> bool {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return false,
        };
        self.pos += 1;
        self.advance_while(|c| c != quote);
        self.advance_if_any(&[quote]);
        true
    }

    /// `xml` followed by whitespace, `?` or the end of text.
    fn advance_prolog_target(&mut self) -> bool {
        let rest = self.rest();
        if !rest.starts_with("xml") {
            return false;
        }
        match rest[3..].chars().next() {
            None | Some('?') => {}
            Some(c) if is_whitespace(c) => {}
            Some(_) => return false,
        }
        self.pos += 3;
        true
    }

    fn advance_decl_word(&mut self) -> bool {
        self.advance_while(|c| !is_whitespace(c) && !matches!(c, '<' | '>' | '[' | ']' | '(' | ')' | '"' | '\''))
    }

    /// A parenthesized group with nesting, stopping early at `<` or `>`.
    fn advance_parenthesized(&mut self) -> bool {
        if self.peek() != Some('(') {
            return false;
        }
        let mut depth = 0usize;
        while let Some(ch) = self.peek() {
            match ch {
                '<' | '>' => break,
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        break;
                    }
                }
                _ => {}
            }
            self.pos += ch.len_utf8();
        }
        true
    }

    /// Text of the word that was just consumed by `advance_decl_word`.
    fn last_word(&self) -> &'a str {
        let head = &self.source[..self.pos];
        let start = head
            .rfind(|c: char| is_whitespace(c) || matches!(c, '<' | '>' | '[' | ']' | '(' | ')' | '"' | '\''))
            .map_or(0, |i| i + 1);
        &head[start..]
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    /// Yields tokens until the end of text; `Eos` itself is not yielded.
    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.next_token();
        (token.kind != TokenKind::Eos).then_some(token)
    }
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use TokenKind::*;

    /// Helper: token kinds without whitespace, excluding `Eos`.
    fn kinds(source: &str) -> Vec<TokenKind> {
        kinds_in(source, ScannerMode::Xml)
    }

    fn kinds_in(source: &str, mode: ScannerMode) -> Vec<TokenKind> {
        Scanner::with_mode(source, mode)
            .map(|t| t.kind)
            .filter(|k| *k != Whitespace)
            .collect()
    }

    /// Helper: (kind, text) pairs without whitespace.
    fn texts(source: &str, mode: ScannerMode) -> Vec<(TokenKind, &str)> {
        Scanner::with_mode(source, mode)
            .filter(|t| t.kind != Whitespace)
            .map(|t| (t.kind, t.text))
            .collect()
    }

    // =========================================================================
    // Stream shape
    // =========================================================================

    #[test]
    fn test_empty_source() {
        let tokens = Scanner::tokenize("", ScannerMode::Xml);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, Eos);
        assert_eq!(tokens[0].span, Span::new(0, 0));
    }

    #[test]
    fn test_eos_is_sticky() {
        let mut scanner = Scanner::new("a");
        assert_eq!(scanner.next_token().kind, Content);
        assert_eq!(scanner.next_token().kind, Eos);
        assert_eq!(scanner.next_token().kind, Eos);
    }

    #[test]
    fn test_next_token_then_iterate() {
        let mut scanner = Scanner::new("<a/>");
        assert_eq!(scanner.next_token().kind, StartTagOpen);
        let rest: Vec<TokenKind> = scanner.map(|token| token.kind).collect();
        assert_eq!(rest, vec![StartTag, StartTagSelfClose]);
    }

    #[test]
    fn test_tokens_cover_text_contiguously() {
        let source = "<?xml version=\"1.0\"?>\n<!DOCTYPE a [<!ELEMENT a (#PCDATA)>]>\n<a x='1'><!-- c --><![CDATA[d]]>e</a>";
        let tokens = Scanner::tokenize(source, ScannerMode::Xml);
        let mut expected_start = 0;
        for token in &tokens {
            assert_eq!(token.span.start, expected_start, "gap before {token:?}");
            expected_start = token.span.end;
        }
        assert_eq!(expected_start, source.len());
    }

    #[test]
    fn test_starting_at_offset() {
        let mut scanner = Scanner::starting_at("abc<a>", 3, ScannerMode::Xml);
        let token = scanner.next_token();
        assert_eq!(token.kind, StartTagOpen);
        assert_eq!(token.span, Span::new(3, 4));
    }

    #[test]
    fn test_starting_at_clamps_to_char_boundary() {
        let mut scanner = Scanner::starting_at("é<a>", 1, ScannerMode::Xml);
        let token = scanner.next_token();
        assert_eq!(token.kind, Content);
        assert_eq!(token.text, "é");
    }

    // =========================================================================
    // Tags
    // =========================================================================

    #[test]
    fn test_simple_element() {
        assert_eq!(
            texts("<a>text</a>", ScannerMode::Xml),
            vec![
                (StartTagOpen, "<"),
                (StartTag, "a"),
                (StartTagClose, ">"),
                (Content, "text"),
                (EndTagOpen, "</"),
                (EndTag, "a"),
                (EndTagClose, ">"),
            ]
        );
    }

    #[test]
    fn test_self_closing() {
        assert_eq!(kinds("<a/>"), vec![StartTagOpen, StartTag, StartTagSelfClose]);
    }

    #[test]
    fn test_prefixed_tag_name() {
        assert_eq!(
            texts("<xs:schema>", ScannerMode::Xml),
            vec![(StartTagOpen, "<"), (StartTag, "xs:schema"), (StartTagClose, ">")]
        );
    }

    #[test]
    fn test_attributes_quoted() {
        assert_eq!(
            texts("<a x=\"1\" y='2'>", ScannerMode::Xml),
            vec![
                (StartTagOpen, "<"),
                (StartTag, "a"),
                (AttributeName, "x"),
                (DelimiterAssign, "="),
                (AttributeValue, "\"1\""),
                (AttributeName, "y"),
                (DelimiterAssign, "="),
                (AttributeValue, "'2'"),
                (StartTagClose, ">"),
            ]
        );
    }

    #[test]
    fn test_attribute_unquoted_before_self_close() {
        assert_eq!(
            texts("<a x=1/>", ScannerMode::Xml),
            vec![
                (StartTagOpen, "<"),
                (StartTag, "a"),
                (AttributeName, "x"),
                (DelimiterAssign, "="),
                (AttributeValue, "1"),
                (StartTagSelfClose, "/>"),
            ]
        );
    }

    #[test]
    fn test_attribute_without_value() {
        assert_eq!(kinds("<a x>"), vec![StartTagOpen, StartTag, AttributeName, StartTagClose]);
    }

    #[test]
    fn test_attribute_glued_to_value_is_unknown() {
        let k = kinds("<a x='1'y='2'>");
        assert_eq!(k[..5], [StartTagOpen, StartTag, AttributeName, DelimiterAssign, AttributeValue]);
        assert!(k.contains(&Unknown));
        assert_eq!(*k.last().unwrap(), StartTagClose);
    }

    #[test]
    fn test_unterminated_quoted_value_runs_to_end() {
        let tokens: Vec<_> = Scanner::new("<a x=\"1></a>").collect();
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, AttributeValue);
        assert_eq!(last.text, "\"1></a>");
    }

    #[test]
    fn test_unclosed_start_tag_followed_by_tag() {
        assert_eq!(
            kinds("<a <b>"),
            vec![StartTagOpen, StartTag, StartTagOpen, StartTag, StartTagClose]
        );
    }

    #[test]
    fn test_lone_open_bracket() {
        assert_eq!(kinds("<"), vec![StartTagOpen]);
    }

    #[test]
    fn test_invalid_tag_name_is_unknown() {
        assert_eq!(
            texts("<!ELEMENT", ScannerMode::Xml),
            vec![(StartTagOpen, "<"), (Unknown, "!ELEMENT")]
        );
    }

    #[test]
    fn test_whitespace_before_tag_name() {
        assert_eq!(
            Scanner::new("< a>").map(|t| t.kind).collect::<Vec<_>>(),
            vec![StartTagOpen, Whitespace, StartTag, StartTagClose]
        );
    }

    #[test]
    fn test_end_tag_without_name() {
        assert_eq!(kinds("</>"), vec![EndTagOpen, EndTagClose]);
    }

    #[test]
    fn test_end_tag_garbage() {
        assert_eq!(
            texts("</a b>", ScannerMode::Xml),
            vec![(EndTagOpen, "</"), (EndTag, "a"), (Unknown, "b"), (EndTagClose, ">")]
        );
    }

    #[test]
    fn test_unclosed_end_tag_followed_by_tag() {
        assert_eq!(
            kinds("</a<b>"),
            vec![EndTagOpen, EndTag, StartTagOpen, StartTag, StartTagClose]
        );
    }

    #[test]
    fn test_state_after_start_tag_name() {
        let mut scanner = Scanner::new("<a ");
        scanner.next_token();
        scanner.next_token();
        assert_eq!(scanner.state(), ScannerState::WithinTag);
    }

    // =========================================================================
    // Comments and CDATA
    // =========================================================================

    #[test]
    fn test_comment() {
        assert_eq!(
            texts("<!-- hi -->", ScannerMode::Xml),
            vec![(StartCommentTag, "<!--"), (Comment, " hi "), (EndCommentTag, "-->")]
        );
    }

    #[test]
    fn test_empty_comment() {
        assert_eq!(kinds("<!---->"), vec![StartCommentTag, EndCommentTag]);
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(
            texts("<!-- <a>", ScannerMode::Xml),
            vec![(StartCommentTag, "<!--"), (Comment, " <a>")]
        );
    }

    #[test]
    fn test_cdata() {
        assert_eq!(
            texts("<![CDATA[<x>]]>", ScannerMode::Xml),
            vec![(CDataTagOpen, "<![CDATA["), (CDataContent, "<x>"), (CDataTagClose, "]]>")]
        );
    }

    #[test]
    fn test_unterminated_cdata() {
        assert_eq!(kinds("<![CDATA[abc"), vec![CDataTagOpen, CDataContent]);
    }

    // =========================================================================
    // Prolog and processing instructions
    // =========================================================================

    #[test]
    fn test_prolog() {
        assert_eq!(
            texts("<?xml version=\"1.0\" encoding=\"UTF-8\"?>", ScannerMode::Xml),
            vec![
                (StartPrologOrPi, "<?"),
                (PrologName, "xml"),
                (AttributeName, "version"),
                (DelimiterAssign, "="),
                (AttributeValue, "\"1.0\""),
                (AttributeName, "encoding"),
                (DelimiterAssign, "="),
                (AttributeValue, "\"UTF-8\""),
                (PrologEnd, "?>"),
            ]
        );
    }

    #[test]
    fn test_processing_instruction() {
        assert_eq!(
            texts("<?xml-stylesheet href=\"a.xsl\"?>", ScannerMode::Xml),
            vec![
                (StartPrologOrPi, "<?"),
                (PiName, "xml-stylesheet"),
                (PiContent, "href=\"a.xsl\""),
                (PiEnd, "?>"),
            ]
        );
    }

    #[test]
    fn test_pi_without_target() {
        assert_eq!(kinds("<??>"), vec![StartPrologOrPi, PiEnd]);
    }

    #[test]
    fn test_content_after_prolog() {
        assert_eq!(
            kinds("<?xml version='1.0'?><a/>"),
            vec![
                StartPrologOrPi,
                PrologName,
                AttributeName,
                DelimiterAssign,
                AttributeValue,
                PrologEnd,
                StartTagOpen,
                StartTag,
                StartTagSelfClose,
            ]
        );
    }

    // =========================================================================
    // Doctype
    // =========================================================================

    #[test]
    fn test_doctype_public() {
        assert_eq!(
            texts("<!DOCTYPE html PUBLIC \"-//W3C//DTD\" \"x.dtd\">", ScannerMode::Xml),
            vec![
                (DtdStartDoctypeTag, "<!DOCTYPE"),
                (DtdDoctypeName, "html"),
                (DtdDoctypeKindPublic, "PUBLIC"),
                (DtdDoctypePublicId, "\"-//W3C//DTD\""),
                (DtdDoctypeSystemId, "\"x.dtd\""),
                (DtdEndDoctypeTag, ">"),
            ]
        );
    }

    #[test]
    fn test_doctype_system_lowercase_keyword() {
        assert_eq!(
            kinds("<!doctype note SYSTEM 'note.dtd'>"),
            vec![DtdStartDoctypeTag, DtdDoctypeName, DtdDoctypeKindSystem, DtdDoctypeSystemId, DtdEndDoctypeTag]
        );
    }

    #[test]
    fn test_doctype_internal_subset() {
        assert_eq!(
            texts("<!DOCTYPE a [<!ELEMENT a (#PCDATA)>]><a/>", ScannerMode::Xml),
            vec![
                (DtdStartDoctypeTag, "<!DOCTYPE"),
                (DtdDoctypeName, "a"),
                (DtdStartInternalSubset, "["),
                (DtdStartElementDecl, "<!ELEMENT"),
                (DtdElementDeclName, "a"),
                (DtdElementContent, "(#PCDATA)"),
                (DtdEndTag, ">"),
                (DtdEndInternalSubset, "]"),
                (DtdEndDoctypeTag, ">"),
                (StartTagOpen, "<"),
                (StartTag, "a"),
                (StartTagSelfClose, "/>"),
            ]
        );
    }

    #[test]
    fn test_unterminated_doctype_resumes_content() {
        assert_eq!(
            kinds("<!DOCTYPE a <b/>"),
            vec![DtdStartDoctypeTag, DtdDoctypeName, StartTagOpen, StartTag, StartTagSelfClose]
        );
    }

    #[test]
    fn test_comment_inside_internal_subset() {
        assert_eq!(
            kinds("<!DOCTYPE a [<!-- c --><!ENTITY e 'v'>]>"),
            vec![
                DtdStartDoctypeTag,
                DtdDoctypeName,
                DtdStartInternalSubset,
                StartCommentTag,
                Comment,
                EndCommentTag,
                DtdStartEntity,
                DtdEntityName,
                DtdEntityValue,
                DtdEndTag,
                DtdEndInternalSubset,
                DtdEndDoctypeTag,
            ]
        );
    }

    // =========================================================================
    // DTD files
    // =========================================================================

    #[test]
    fn test_dtd_mode_element_decl() {
        assert_eq!(
            texts("<!ELEMENT note (to,from)*>", ScannerMode::Dtd),
            vec![
                (DtdStartElementDecl, "<!ELEMENT"),
                (DtdElementDeclName, "note"),
                (DtdElementContent, "(to,from)*"),
                (DtdEndTag, ">"),
            ]
        );
    }

    #[test]
    fn test_dtd_mode_unterminated_element_decl() {
        assert_eq!(kinds_in("<!ELEMENT", ScannerMode::Dtd), vec![DtdStartElementDecl]);
    }

    #[test]
    fn test_dtd_mode_element_category() {
        assert_eq!(
            kinds_in("<!ELEMENT br EMPTY>", ScannerMode::Dtd),
            vec![DtdStartElementDecl, DtdElementDeclName, DtdElementCategory, DtdEndTag]
        );
    }

    #[test]
    fn test_dtd_mode_attlist() {
        assert_eq!(
            texts(
                "<!ATTLIST note id ID #REQUIRED lang (en|fr) \"en\" v CDATA #FIXED \"1\">",
                ScannerMode::Dtd
            ),
            vec![
                (DtdStartAttlistDecl, "<!ATTLIST"),
                (DtdAttlistElementName, "note"),
                (DtdAttlistAttributeName, "id"),
                (DtdAttlistAttributeType, "ID"),
                (DtdAttlistAttributeValue, "#REQUIRED"),
                (DtdAttlistAttributeName, "lang"),
                (DtdAttlistAttributeType, "(en|fr)"),
                (DtdAttlistAttributeValue, "\"en\""),
                (DtdAttlistAttributeName, "v"),
                (DtdAttlistAttributeType, "CDATA"),
                (DtdAttlistAttributeValue, "#FIXED"),
                (DtdAttlistAttributeValue, "\"1\""),
                (DtdEndTag, ">"),
            ]
        );
    }

    #[test]
    fn test_dtd_mode_entities() {
        assert_eq!(
            texts(
                "<!ENTITY % common SYSTEM \"common.ent\"><!ENTITY copy PUBLIC \"-//X\" \"c.ent\">",
                ScannerMode::Dtd
            ),
            vec![
                (DtdStartEntity, "<!ENTITY"),
                (DtdEntityPercent, "%"),
                (DtdEntityName, "common"),
                (DtdEntityKindSystem, "SYSTEM"),
                (DtdEntitySystemId, "\"common.ent\""),
                (DtdEndTag, ">"),
                (DtdStartEntity, "<!ENTITY"),
                (DtdEntityName, "copy"),
                (DtdEntityKindPublic, "PUBLIC"),
                (DtdEntityPublicId, "\"-//X\""),
                (DtdEntitySystemId, "\"c.ent\""),
                (DtdEndTag, ">"),
            ]
        );
    }

    #[test]
    fn test_dtd_mode_new_declaration_abandons_open_one() {
        assert_eq!(
            kinds_in("<!ELEMENT a <!ELEMENT b EMPTY>", ScannerMode::Dtd),
            vec![
                DtdStartElementDecl,
                DtdElementDeclName,
                DtdStartElementDecl,
                DtdElementDeclName,
                DtdElementCategory,
                DtdEndTag,
            ]
        );
    }

    #[test]
    fn test_dtd_mode_bracket_is_unrecognized() {
        assert_eq!(kinds_in("]", ScannerMode::Dtd), vec![DtdUnrecognizedParameters]);
    }

    #[test]
    fn test_dtd_mode_text_declaration() {
        assert_eq!(
            kinds_in("<?xml version=\"1.0\"?><!ELEMENT a ANY>", ScannerMode::Dtd),
            vec![
                StartPrologOrPi,
                PrologName,
                AttributeName,
                DelimiterAssign,
                AttributeValue,
                PrologEnd,
                DtdStartElementDecl,
                DtdElementDeclName,
                DtdElementCategory,
                DtdEndTag,
            ]
        );
    }

    #[test]
    fn test_dtd_mode_parameter_entity_reference() {
        assert_eq!(
            texts("%common;", ScannerMode::Dtd),
            vec![(DtdUnrecognizedParameters, "%common;")]
        );
    }

    // =========================================================================
    // Totality
    // =========================================================================

    #[test]
    fn test_malformed_inputs_terminate() {
        let inputs = [
            "<", "</", "<?", "<!", "<!-", "<![CDATA", "<a", "<a x", "<a x=", "<a x='", "</a", "<?xml",
            "<?pi", "<!DOCTYPE", "<!DOCTYPE a [", "<!DOCTYPE a [<!ATTLIST", "<!DOCTYPE a [<!ENTITY %",
            "<a/><<>>", "]]>", "-->", "?>", "<a =\"1\">", "<a\u{e9}\u{e9}>\u{1f600}</a>", "<!ELEMENT a ((b|c)",
        ];
        for input in inputs {
            for mode in [ScannerMode::Xml, ScannerMode::Dtd] {
                let tokens = Scanner::tokenize(input, mode);
                assert_eq!(tokens.last().unwrap().kind, Eos, "{input:?}");
                assert!(tokens.len() <= input.len() + 1, "{input:?}");
                let covered: usize = tokens.iter().map(|t| t.span.len()).sum();
                assert_eq!(covered, input.len(), "{input:?} in {mode:?}");
            }
        }
    }
}
