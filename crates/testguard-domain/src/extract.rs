//! Lexical extraction of tests, assertion calls and runner invocations.
//!
//! Nothing here builds a syntax tree. Comments and strings are masked first,
//! the masked text is tokenized, and a handful of token patterns are matched.

use std::ops::Range;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::policy::{CalleeKind, CompiledPolicy, FileRole, normalize_callee};
use crate::preprocess::{Language, OpenConstruct, PreprocessOptions, Preprocessor};

/// Reasons a file is degraded instead of checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("unterminated {} opened on line {line}", .construct.as_str())]
    Unterminated { construct: OpenConstruct, line: u32 },

    #[error("extraction exceeded the {limit_ms} ms per-file limit")]
    Timeout { limit_ms: u64 },

    #[error("file is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("file is not valid UTF-8 (first invalid byte at offset {offset})")]
    InvalidUtf8 { offset: usize },
}

/// A cooperative per-file time limit.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    limit_ms: u64,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(limit),
            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn none() -> Self {
        Self {
            at: None,
            limit_ms: 0,
        }
    }

    pub fn check(&self) -> Result<(), ExtractError> {
        match self.at {
            Some(at) if Instant::now() >= at => Err(ExtractError::Timeout {
                limit_ms: self.limit_ms,
            }),
            _ => Ok(()),
        }
    }
}

/// One file ready for extraction.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Root-relative path with forward slashes.
    pub path: String,
    pub language: Language,
    pub role: FileRole,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, role: FileRole, text: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            language: Language::from_path(Path::new(&path)),
            path,
            role,
            text: text.into(),
        }
    }

    /// Decode raw bytes, rejecting invalid UTF-8.
    pub fn from_bytes(
        path: impl Into<String>,
        role: FileRole,
        bytes: Vec<u8>,
    ) -> Result<Self, ExtractError> {
        let text = String::from_utf8(bytes).map_err(|e| ExtractError::InvalidUtf8 {
            offset: e.utf8_error().valid_up_to(),
        })?;
        Ok(Self::new(path, role, text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDeclaration {
    /// The name token exactly as written (string literal contents for call-style tests).
    pub name: String,
    pub line: u32,
    pub column: u32,
    /// Byte range of the body, used to attribute assertions.
    pub body: Option<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionCallSite {
    pub callee: String,
    pub is_macro: bool,
    pub kind: CalleeKind,
    /// Index into [`FileModel::tests`] of the innermost enclosing test.
    pub test: Option<usize>,
    pub in_test_context: bool,
    pub line: u32,
    pub column: u32,
}

impl AssertionCallSite {
    /// The callee as it appears in source, with `!` for macros.
    pub fn token(&self) -> String {
        if self.is_macro {
            format!("{}!", self.callee)
        } else {
            self.callee.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Wrapper,
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInvocation {
    /// The matched source text, from the first word to the last.
    pub text: String,
    pub kind: InvocationKind,
    pub line: u32,
    pub column: u32,
}

/// Everything extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileModel {
    pub path: String,
    pub role: FileRole,
    pub tests: Vec<TestDeclaration>,
    pub assertions: Vec<AssertionCallSite>,
    pub invocations: Vec<RunnerInvocation>,
}

/// Extract the records for one file.
///
/// Fails soft: any [`ExtractError`] means the file contributes nothing else.
pub fn extract(
    file: &SourceFile,
    policy: &CompiledPolicy,
    deadline: Deadline,
) -> Result<FileModel, ExtractError> {
    let mut model = FileModel {
        path: file.path.clone(),
        role: file.role,
        tests: Vec::new(),
        assertions: Vec::new(),
        invocations: Vec::new(),
    };

    match file.role {
        FileRole::Source => {
            let masked = mask(
                &file.text,
                file.language,
                PreprocessOptions::comments_and_strings(),
                &deadline,
            )?;
            let tokens = tokenize(&masked.text, &file.text, &masked.literals, &deadline)?;
            let in_test_path = policy.scan.is_test_path(Path::new(&file.path));
            extract_source(
                &mut model,
                &file.text,
                &tokens,
                policy,
                in_test_path,
                &deadline,
            )?;
        }
        FileRole::Script => {
            let masked = mask(
                &file.text,
                file.language,
                PreprocessOptions::comments_only(),
                &deadline,
            )?;
            model.invocations = extract_invocations(&masked.text, &file.text, policy, &deadline)?;
        }
    }

    debug!(
        path = %file.path,
        language = %file.language,
        tests = model.tests.len(),
        assertions = model.assertions.len(),
        invocations = model.invocations.len(),
        "extracted file"
    );
    Ok(model)
}

// ============================================================================
// Masking
// ============================================================================

struct Masked {
    text: String,
    /// Byte ranges of string literals in the original text.
    literals: Vec<Range<usize>>,
}

fn mask(
    text: &str,
    language: Language,
    opts: PreprocessOptions,
    deadline: &Deadline,
) -> Result<Masked, ExtractError> {
    let mut pre = Preprocessor::new(opts, language);
    let mut out = String::with_capacity(text.len());
    let mut literals = Vec::new();
    let mut opened_on = 0u32;

    for (idx, chunk) in text.split_inclusive('\n').enumerate() {
        deadline.check()?;

        let start = out.len();
        let (content, newline) = match chunk.strip_suffix('\n') {
            Some(content) => (content, true),
            None => (chunk, false),
        };

        let was_open = pre.open_construct().is_some();
        out.push_str(&pre.sanitize_line(content));
        if newline {
            out.push('\n');
        }
        if !was_open && pre.open_construct().is_some() {
            opened_on = line_number(idx);
        }

        literals.extend(
            pre.literals()
                .iter()
                .map(|r| (start + r.start)..(start + r.end)),
        );
    }

    if let Some(construct) = pre.open_construct() {
        return Err(ExtractError::Unterminated {
            construct,
            line: opened_on,
        });
    }

    Ok(Masked {
        text: out,
        literals,
    })
}

fn line_number(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

/// Maps byte offsets to 1-based line and character columns.
struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, starts }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line_idx = self.starts.partition_point(|&s| s <= offset) - 1;
        let line_start = self.starts[line_idx];
        let column = self
            .text
            .get(line_start..offset)
            .map(|s| s.chars().count() + 1)
            .unwrap_or(1);
        (
            line_number(line_idx),
            u32::try_from(column).unwrap_or(u32::MAX),
        )
    }
}

// ============================================================================
// Tokenizing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Punct,
    /// A string or char literal; text is the literal's content.
    Str,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    offset: usize,
}

impl Token<'_> {
    fn is_punct(&self, c: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == c
    }

    fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }

    fn is_open(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text, "(" | "[" | "{")
    }

    fn is_close(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text, ")" | "]" | "}")
    }
}

const DEADLINE_STRIDE: usize = 1024;

/// Count one step, checking `deadline` once every [`DEADLINE_STRIDE`] steps.
fn stride_check(steps: &mut usize, deadline: &Deadline) -> Result<(), ExtractError> {
    let due = *steps % DEADLINE_STRIDE == 0;
    *steps += 1;
    if due { deadline.check() } else { Ok(()) }
}

fn tokenize<'a>(
    masked: &'a str,
    original: &'a str,
    literals: &[Range<usize>],
    deadline: &Deadline,
) -> Result<Vec<Token<'a>>, ExtractError> {
    let mut tokens = Vec::new();
    let mut next_literal = literals.iter().peekable();
    let mut chars = masked.char_indices().peekable();
    let mut steps = 0usize;

    while let Some(&(pos, c)) = chars.peek() {
        stride_check(&mut steps, deadline)?;

        while next_literal.peek().is_some_and(|r| r.end <= pos) {
            next_literal.next();
        }
        if let Some(range) = next_literal.peek().filter(|r| r.start == pos) {
            tokens.push(Token {
                kind: TokenKind::Str,
                text: literal_value(&original[(*range).clone()]),
                offset: pos,
            });
            let end = range.end;
            while chars.peek().is_some_and(|&(p, _)| p < end) {
                chars.next();
            }
            next_literal.next();
            continue;
        }

        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = if c.is_alphabetic() || c == '_' {
            TokenKind::Ident
        } else if c.is_ascii_digit() {
            TokenKind::Number
        } else {
            TokenKind::Punct
        };

        chars.next();
        let mut end = pos + c.len_utf8();
        if kind != TokenKind::Punct {
            while let Some(&(p, n)) = chars.peek() {
                if !(n.is_alphanumeric() || n == '_') {
                    break;
                }
                end = p + n.len_utf8();
                chars.next();
            }
        }

        tokens.push(Token {
            kind,
            text: &masked[pos..end],
            offset: pos,
        });
    }

    Ok(tokens)
}

/// Strip prefixes, quotes and raw-string hashes from a literal's source text.
fn literal_value(raw: &str) -> &str {
    let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '#');
    let Some(quote) = body.chars().next() else {
        return body;
    };
    if !matches!(quote, '"' | '\'' | '`') {
        return body;
    }

    let triple: String = std::iter::repeat_n(quote, 3).collect();
    let width = if body.len() >= 6 && body.starts_with(&triple) {
        3
    } else {
        1
    };

    let inner = &body[width..];
    let inner = inner.trim_end_matches('#');
    let closing = &body[..width];
    inner.strip_suffix(closing).unwrap_or(inner)
}

/// For each opening bracket, the index of its closing bracket.
///
/// Unbalanced openers close at end of input (`tokens.len()`).
fn match_brackets(tokens: &[Token<'_>]) -> Vec<usize> {
    let mut closes = vec![tokens.len(); tokens.len()];
    let mut stack = Vec::new();
    for (i, tok) in tokens.iter().enumerate() {
        if tok.is_open() {
            stack.push(i);
        } else if tok.is_close() {
            if let Some(open) = stack.pop() {
                closes[open] = i;
            }
        }
    }
    closes
}

// ============================================================================
// Source files
// ============================================================================

struct Attribute {
    path: String,
    /// Token range of the arguments, if any.
    args: Range<usize>,
    inner: bool,
    /// Index just past the closing `]`.
    end: usize,
}

/// Parse `#[path(args)]` or `#![path(args)]` starting at `i`.
fn parse_attribute(tokens: &[Token<'_>], closes: &[usize], i: usize) -> Option<Attribute> {
    if !tokens.get(i)?.is_punct("#") {
        return None;
    }
    let mut j = i + 1;
    let inner = tokens.get(j)?.is_punct("!");
    if inner {
        j += 1;
    }
    if !tokens.get(j)?.is_punct("[") {
        return None;
    }
    let close = closes[j];

    let mut path = String::new();
    let mut k = j + 1;
    while k < close {
        let tok = &tokens[k];
        if tok.kind == TokenKind::Ident {
            path.push_str(tok.text);
            k += 1;
        } else if tok.is_punct(":") && tokens.get(k + 1).is_some_and(|t| t.is_punct(":")) {
            if !path.is_empty() {
                path.push_str("::");
            }
            k += 2;
        } else {
            break;
        }
    }

    Some(Attribute {
        path,
        args: k..close,
        inner,
        end: (close + 1).min(tokens.len()),
    })
}

/// `cfg(test)` or `cfg(all(test, ..))`, but not `cfg(not(test))`.
fn is_cfg_test(tokens: &[Token<'_>], attr: &Attribute) -> bool {
    if attr.path != "cfg" {
        return false;
    }
    let args = &tokens[attr.args.clone()];
    args.iter().any(|t| t.is_ident("test")) && !args.iter().any(|t| t.is_ident("not"))
}

const QUALIFIERS: &[&str] = &["pub", "async", "unsafe", "const", "extern", "default"];

/// Skip visibility and function qualifiers starting at `i`.
fn skip_qualifiers(tokens: &[Token<'_>], closes: &[usize], mut i: usize) -> usize {
    while let Some(tok) = tokens.get(i) {
        if tok.kind != TokenKind::Ident || !QUALIFIERS.contains(&tok.text) {
            break;
        }
        i += 1;
        match tokens.get(i) {
            Some(t) if tok.text == "pub" && t.is_punct("(") => i = closes[i] + 1,
            Some(t) if tok.text == "extern" && t.kind == TokenKind::Str => i += 1,
            _ => {}
        }
    }
    i
}

/// Find the `{ .. }` body of an item whose header starts at `i`.
///
/// Parenthesized and bracketed groups are skipped; a `;` first means no body.
fn find_body(tokens: &[Token<'_>], closes: &[usize], mut i: usize) -> Option<(usize, usize)> {
    while let Some(tok) = tokens.get(i) {
        if tok.is_punct("{") {
            return Some((i, closes[i]));
        }
        if tok.is_punct(";") {
            return None;
        }
        if tok.is_open() {
            i = closes[i];
        }
        i += 1;
    }
    None
}

fn byte_span(tokens: &[Token<'_>], text_len: usize, open: usize, close: usize) -> Range<usize> {
    let start = tokens[open].offset;
    let end = tokens.get(close).map(|t| t.offset + 1).unwrap_or(text_len);
    start..end
}

fn extract_source(
    model: &mut FileModel,
    text: &str,
    tokens: &[Token<'_>],
    policy: &CompiledPolicy,
    in_test_path: bool,
    deadline: &Deadline,
) -> Result<(), ExtractError> {
    let closes = match_brackets(tokens);
    let lines = LineIndex::new(text);

    let mut file_is_test = in_test_path;
    let mut cfg_test_spans: Vec<Range<usize>> = Vec::new();
    let mut in_attribute = vec![false; tokens.len()];
    let mut steps = 0usize;

    // Attribute-style declarations and `#[cfg(test)]` modules.
    let mut i = 0;
    while i < tokens.len() {
        stride_check(&mut steps, deadline)?;
        let Some(first) = parse_attribute(tokens, &closes, i) else {
            i += 1;
            continue;
        };

        if first.inner {
            if is_cfg_test(tokens, &first) {
                file_is_test = true;
            }
            in_attribute[i..first.end].fill(true);
            i = first.end;
            continue;
        }

        let mut marks_test = false;
        let mut marks_cfg_test = false;
        let mut k = i;
        while let Some(attr) = parse_attribute(tokens, &closes, k) {
            if attr.inner {
                break;
            }
            marks_test |= policy.tests.attributes.contains(&attr.path);
            marks_cfg_test |= is_cfg_test(tokens, &attr);
            in_attribute[k..attr.end].fill(true);
            k = attr.end;
        }

        let item = skip_qualifiers(tokens, &closes, k);
        let keyword = tokens.get(item);
        let name = item_name(tokens, item + 1);

        if let (Some(keyword), Some((name, offset, after))) = (keyword, name) {
            if marks_test && keyword.is_ident("fn") {
                let (line, column) = lines.position(offset);
                let body = find_body(tokens, &closes, after)
                    .map(|(open, close)| byte_span(tokens, text.len(), open, close));
                model.tests.push(TestDeclaration {
                    name,
                    line,
                    column,
                    body,
                });
            } else if marks_cfg_test && keyword.is_ident("mod") {
                if let Some((open, close)) = find_body(tokens, &closes, after) {
                    cfg_test_spans.push(byte_span(tokens, text.len(), open, close));
                }
            }
        }

        i = k;
    }

    // Call-style declarations and assertion call sites.
    let mut sites: Vec<(usize, AssertionCallSite)> = Vec::new();
    for (idx, tok) in tokens.iter().enumerate() {
        stride_check(&mut steps, deadline)?;
        if tok.kind != TokenKind::Ident || in_attribute[idx] {
            continue;
        }

        let prev = idx.checked_sub(1).and_then(|p| tokens.get(p));
        if prev.is_some_and(|p| p.is_punct(".") || p.is_ident("fn")) {
            continue;
        }
        let defines_macro = prev.is_some_and(|p| p.is_punct("!"))
            && idx
                .checked_sub(2)
                .and_then(|p| tokens.get(p))
                .is_some_and(|p| p.is_ident("macro_rules"));
        if defines_macro {
            continue;
        }

        let mut open = idx + 1;
        let is_macro = tokens.get(open).is_some_and(|t| t.is_punct("!"));
        if is_macro {
            open += 1;
        }
        if !tokens.get(open).is_some_and(|t| t.is_open()) {
            continue;
        }

        if policy.tests.calls.contains(tok.text) && tokens[open].is_punct("(") {
            let name = tokens
                .get(open + 1)
                .filter(|t| matches!(t.kind, TokenKind::Str | TokenKind::Ident));
            if let Some(name) = name {
                let (line, column) = lines.position(name.offset);
                model.tests.push(TestDeclaration {
                    name: name.text.to_string(),
                    line,
                    column,
                    body: Some(byte_span(tokens, text.len(), open, closes[open])),
                });
            }
        }

        let callee = normalize_callee(tok.text);
        if let Some(kind) = policy.assertions.classify(callee) {
            let (line, column) = lines.position(tok.offset);
            sites.push((
                tok.offset,
                AssertionCallSite {
                    callee: callee.to_string(),
                    is_macro,
                    kind,
                    test: None,
                    in_test_context: false,
                    line,
                    column,
                },
            ));
        }
    }

    model.tests.sort_by_key(|t| (t.line, t.column));

    let cfg_test_spans = merge_spans(cfg_test_spans);
    let mut enclosing = EnclosingTests::new(&model.tests);
    let mut assertions = Vec::with_capacity(sites.len());
    // Sites were collected in token order, so offsets only grow.
    for (offset, mut site) in sites {
        stride_check(&mut steps, deadline)?;
        site.test = enclosing.at(offset);
        site.in_test_context =
            file_is_test || site.test.is_some() || spans_contain(&cfg_test_spans, offset);
        assertions.push(site);
    }
    model.assertions = assertions;
    Ok(())
}

/// The item name starting at token `i`: its text, byte offset and the index past it.
///
/// A raw identifier `r#name` keeps its marker.
fn item_name(tokens: &[Token<'_>], i: usize) -> Option<(String, usize, usize)> {
    let first = tokens.get(i).filter(|t| t.kind == TokenKind::Ident)?;
    if first.text == "r" {
        if let (Some(hash), Some(ident)) = (tokens.get(i + 1), tokens.get(i + 2)) {
            let adjacent = hash.offset == first.offset + 1 && ident.offset == hash.offset + 1;
            if adjacent && hash.is_punct("#") && ident.kind == TokenKind::Ident {
                return Some((format!("r#{}", ident.text), first.offset, i + 3));
            }
        }
    }
    Some((first.text.to_string(), first.offset, i + 1))
}

/// Sort and coalesce byte ranges so lookups can binary search.
fn merge_spans(mut spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
    spans.sort_by_key(|r| r.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

fn spans_contain(spans: &[Range<usize>], offset: usize) -> bool {
    let i = spans.partition_point(|r| r.start <= offset);
    i > 0 && spans[i - 1].end > offset
}

/// Innermost enclosing test for offsets visited in increasing order.
///
/// Test bodies come from matched brackets, so any two are nested or disjoint
/// and a stack of open bodies is enough.
struct EnclosingTests<'t> {
    tests: &'t [TestDeclaration],
    /// Indices of tests with a body, by body start.
    order: Vec<usize>,
    next: usize,
    open: Vec<usize>,
}

impl<'t> EnclosingTests<'t> {
    fn new(tests: &'t [TestDeclaration]) -> Self {
        let mut order: Vec<usize> = tests
            .iter()
            .enumerate()
            .filter(|(_, t)| t.body.is_some())
            .map(|(i, _)| i)
            .collect();
        order.sort_by_key(|&i| tests[i].body.as_ref().map_or(0, |b| b.start));
        Self {
            tests,
            order,
            next: 0,
            open: Vec::new(),
        }
    }

    fn end_of(&self, idx: usize) -> usize {
        self.tests[idx].body.as_ref().map_or(0, |b| b.end)
    }

    fn at(&mut self, offset: usize) -> Option<usize> {
        while let Some(&idx) = self.order.get(self.next) {
            let start = self.tests[idx].body.as_ref().map_or(0, |b| b.start);
            if start > offset {
                break;
            }
            while self.open.last().is_some_and(|&o| self.end_of(o) <= start) {
                self.open.pop();
            }
            self.open.push(idx);
            self.next += 1;
        }
        while self.open.last().is_some_and(|&o| self.end_of(o) <= offset) {
            self.open.pop();
        }
        self.open.last().copied()
    }
}

// ============================================================================
// Script files
// ============================================================================

fn is_word_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')' | '<' | '>' | '`' | '"' | '\'')
}

/// Shell words of one line with their byte ranges.
fn shell_words(line: &str) -> Vec<(Range<usize>, &str)> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        if is_word_separator(c) {
            if let Some(s) = start.take() {
                words.push((s..i, &line[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        words.push((s..line.len(), &line[s..]));
    }
    words
}

fn is_toolchain_selector(word: &str) -> bool {
    word.len() > 1 && word.starts_with('+')
}

/// Match `command` against `words` starting at `start`; returns the index past the match.
///
/// The first word matches on its last path segment, so `~/.cargo/bin/cargo` is `cargo`.
fn match_command(
    words: &[(Range<usize>, &str)],
    start: usize,
    command: &[String],
    skip_toolchain: bool,
) -> Option<usize> {
    let mut w = start;
    for (n, part) in command.iter().enumerate() {
        if n > 0 && skip_toolchain {
            while words.get(w).is_some_and(|(_, word)| is_toolchain_selector(word)) {
                w += 1;
            }
        }
        let (_, word) = words.get(w)?;
        let word = if n == 0 {
            word.rsplit('/').next().unwrap_or(word)
        } else {
            word
        };
        if word != part {
            return None;
        }
        w += 1;
    }
    Some(w)
}

fn extract_invocations(
    masked: &str,
    text: &str,
    policy: &CompiledPolicy,
    deadline: &Deadline,
) -> Result<Vec<RunnerInvocation>, ExtractError> {
    let lines = LineIndex::new(text);
    let mut out = Vec::new();
    let mut line_start = 0;

    for line in masked.split_inclusive('\n') {
        deadline.check()?;

        let words = shell_words(line);
        let mut w = 0;
        while w < words.len() {
            let matched = match_command(&words, w, &policy.runner.wrapper, false)
                .map(|end| (end, InvocationKind::Wrapper))
                .or_else(|| {
                    policy.runner.native.iter().find_map(|native| {
                        match_command(&words, w, native, true)
                            .map(|end| (end, InvocationKind::Native))
                    })
                });

            let Some((end, kind)) = matched else {
                w += 1;
                continue;
            };

            let first = line_start + words[w].0.start;
            let last = line_start + words[end - 1].0.end;
            let (line_no, column) = lines.position(first);
            out.push(RunnerInvocation {
                text: text[first..last].to_string(),
                kind,
                line: line_no,
                column,
            });
            w = end;
        }

        line_start += line.len();
    }

    Ok(out)
}
