use std::fmt;
use std::ops::Range;
use std::path::Path;

/// Source dialects known to the preprocessor.
///
/// The dialect only selects comment and string syntax; nothing else about a
/// file's language is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Ruby,
    C,
    Cpp,
    CSharp,
    Java,
    Kotlin,
    Shell,
    Make,
    Yaml,
    Toml,
    #[default]
    Unknown,
}

impl Language {
    /// Detect the dialect from a file name or extension.
    pub fn from_path(path: &Path) -> Self {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if matches!(
            name,
            "Makefile" | "makefile" | "GNUmakefile" | "justfile" | "Justfile" | ".justfile"
        ) {
            return Language::Make;
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("rs") => Language::Rust,
            Some("py" | "pyw") => Language::Python,
            Some("js" | "jsx" | "mjs" | "cjs") => Language::JavaScript,
            Some("ts" | "tsx" | "mts" | "cts") => Language::TypeScript,
            Some("go") => Language::Go,
            Some("rb" | "rake") => Language::Ruby,
            Some("c" | "h") => Language::C,
            Some("cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh") => Language::Cpp,
            Some("cs") => Language::CSharp,
            Some("java") => Language::Java,
            Some("kt" | "kts") => Language::Kotlin,
            Some("sh" | "bash" | "zsh") => Language::Shell,
            Some("mk") => Language::Make,
            Some("yml" | "yaml") => Language::Yaml,
            Some("toml") => Language::Toml,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Ruby => "ruby",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::Shell => "shell",
            Language::Make => "make",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Unknown => "unknown",
        }
    }

    /// Returns the comment syntax for this language.
    pub fn comment_syntax(self) -> CommentSyntax {
        match self {
            Language::Python | Language::Ruby | Language::Make | Language::Toml => {
                CommentSyntax::Hash
            }
            Language::Shell | Language::Yaml => CommentSyntax::ShellHash,
            Language::Rust => CommentSyntax::CStyleNested,
            _ => CommentSyntax::CStyle,
        }
    }

    /// Returns the string syntax for this language.
    pub fn string_syntax(self) -> StringSyntax {
        match self {
            Language::Rust => StringSyntax::Rust,
            Language::Python | Language::Ruby | Language::Toml => StringSyntax::Python,
            Language::JavaScript | Language::TypeScript => StringSyntax::JavaScript,
            Language::Go => StringSyntax::Go,
            Language::Shell | Language::Make | Language::Yaml => StringSyntax::Shell,
            _ => StringSyntax::CStyle,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comment syntax variants for different programming languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentSyntax {
    /// C-style comments: `//` line comments and `/* */` block comments
    CStyle,
    /// C-style comments with nesting support (Rust): `//` and `/* */` with nesting
    CStyleNested,
    /// `#` line comments anywhere outside strings (Python, Ruby, Makefile, TOML)
    Hash,
    /// `#` line comments only at the start of a word (shell, YAML)
    ShellHash,
}

/// String syntax variants for different programming languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringSyntax {
    /// C-style strings: `"..."` with backslash escapes, `'c'` char literals
    CStyle,
    /// Rust strings: `"..."`, `r#"..."#`, `b"..."`, char literals (not lifetimes)
    Rust,
    /// Python strings: `"..."`, `'...'`, `"""..."""`, `'''...'''`
    Python,
    /// JavaScript strings: `"..."`, `'...'`, `` `...` `` (template literals)
    JavaScript,
    /// Go strings: `"..."`, `` `...` `` (raw strings)
    Go,
    /// Shell strings: `"..."` with escapes, `'...'` without
    Shell,
}

/// Preprocessing options.
///
/// `mask_*` controls whether the corresponding token class is replaced with spaces.
///
/// Regardless of masking, the preprocessor still *tracks* strings when masking
/// comments, so that comment markers inside strings do not start a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub mask_comments: bool,
    pub mask_strings: bool,
}

impl PreprocessOptions {
    pub fn comments_only() -> Self {
        Self {
            mask_comments: true,
            mask_strings: false,
        }
    }

    pub fn comments_and_strings() -> Self {
        Self {
            mask_comments: true,
            mask_strings: true,
        }
    }

    fn track_strings(self) -> bool {
        self.mask_strings || self.mask_comments
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    LineComment,
    BlockComment { depth: u32 },
    /// Backslash escapes honored.
    Quoted { quote: u8, escaped: bool },
    /// No escapes: shell single quotes, Go raw strings.
    Verbatim { quote: u8 },
    Triple { quote: u8, escaped: bool },
    RawString { hashes: usize },
    Char { escaped: bool },
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => write!(f, "Normal"),
            Mode::LineComment => write!(f, "LineComment"),
            Mode::BlockComment { depth } => write!(f, "BlockComment(depth={depth})"),
            Mode::Quoted { quote, escaped } => {
                write!(f, "Quoted({}, escaped={escaped})", *quote as char)
            }
            Mode::Verbatim { quote } => write!(f, "Verbatim({})", *quote as char),
            Mode::Triple { quote, escaped } => {
                write!(f, "Triple({}, escaped={escaped})", *quote as char)
            }
            Mode::RawString { hashes } => write!(f, "RawString(hashes={hashes})"),
            Mode::Char { escaped } => write!(f, "Char(escaped={escaped})"),
        }
    }
}

/// A construct still open when input ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenConstruct {
    BlockComment,
    StringLiteral,
}

impl OpenConstruct {
    pub fn as_str(self) -> &'static str {
        match self {
            OpenConstruct::BlockComment => "block comment",
            OpenConstruct::StringLiteral => "string literal",
        }
    }
}

/// A stateful preprocessor, run on the sequential lines of one file.
///
/// Besides the masked text it records where string literals start on the most
/// recent line, so the tokenizer can recover literal values from the original.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    opts: PreprocessOptions,
    comments: CommentSyntax,
    strings: StringSyntax,
    mode: Mode,
    literals: Vec<Range<usize>>,
}

impl Preprocessor {
    pub fn new(opts: PreprocessOptions, language: Language) -> Self {
        Self {
            opts,
            comments: language.comment_syntax(),
            strings: language.string_syntax(),
            mode: Mode::Normal,
            literals: Vec::new(),
        }
    }

    /// The construct left open by the lines seen so far, if any.
    pub fn open_construct(&self) -> Option<OpenConstruct> {
        match self.mode {
            Mode::Normal | Mode::LineComment => None,
            Mode::BlockComment { .. } => Some(OpenConstruct::BlockComment),
            _ => Some(OpenConstruct::StringLiteral),
        }
    }

    /// Byte ranges of string literals that start on the last sanitized line.
    ///
    /// A literal still open at the end of the line extends to the line's end.
    pub fn literals(&self) -> &[Range<usize>] {
        &self.literals
    }

    /// Returns a sanitized line where masked segments are replaced with spaces.
    ///
    /// The output is the same length in bytes as the input.
    pub fn sanitize_line(&mut self, line: &str) -> String {
        let mut out: Vec<u8> = line.as_bytes().to_vec();
        let bytes = line.as_bytes();
        let len = bytes.len();

        self.literals.clear();
        let mut literal_start: Option<usize> = None;

        let mut i = 0;

        while i < len {
            match self.mode {
                Mode::Normal => {
                    let string_start = if self.opts.track_strings() {
                        self.detect_string_start(line, i)
                    } else {
                        None
                    };
                    if let Some((mode, open_end)) = string_start {
                        if self.opts.mask_strings {
                            mask_range(&mut out, i, open_end);
                        }
                        literal_start = Some(i);
                        self.mode = mode;
                        i = open_end;
                        continue;
                    }

                    if self.opts.mask_comments {
                        if let Some(block) = self.detect_comment_start(bytes, i) {
                            if block {
                                mask_range(&mut out, i, i + 2);
                                self.mode = Mode::BlockComment { depth: 1 };
                                i += 2;
                                continue;
                            }
                            // line comment until EOL
                            mask_range(&mut out, i, len);
                            self.mode = Mode::LineComment;
                            break;
                        }
                    }

                    i += 1;
                }

                Mode::LineComment => {
                    self.mode = Mode::Normal;
                    break;
                }

                Mode::BlockComment { depth } => {
                    out[i] = b' ';

                    if self.comments == CommentSyntax::CStyleNested
                        && bytes[i] == b'/'
                        && bytes.get(i + 1) == Some(&b'*')
                    {
                        out[i + 1] = b' ';
                        self.mode = Mode::BlockComment { depth: depth + 1 };
                        i += 2;
                        continue;
                    }

                    if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        out[i + 1] = b' ';
                        self.mode = if depth == 1 {
                            Mode::Normal
                        } else {
                            Mode::BlockComment { depth: depth - 1 }
                        };
                        i += 2;
                        continue;
                    }

                    i += 1;
                }

                Mode::Quoted { quote, escaped } => {
                    if self.opts.mask_strings {
                        out[i] = b' ';
                    }

                    if escaped {
                        self.mode = Mode::Quoted {
                            quote,
                            escaped: false,
                        };
                    } else if bytes[i] == b'\\' {
                        self.mode = Mode::Quoted {
                            quote,
                            escaped: true,
                        };
                    } else if bytes[i] == quote {
                        self.mode = Mode::Normal;
                        close_literal(&mut self.literals, &mut literal_start, i + 1);
                    }
                    i += 1;
                }

                Mode::Verbatim { quote } => {
                    if self.opts.mask_strings {
                        out[i] = b' ';
                    }
                    if bytes[i] == quote {
                        self.mode = Mode::Normal;
                        close_literal(&mut self.literals, &mut literal_start, i + 1);
                    }
                    i += 1;
                }

                Mode::Triple { quote, escaped } => {
                    if self.opts.mask_strings {
                        out[i] = b' ';
                    }

                    if escaped {
                        self.mode = Mode::Triple {
                            quote,
                            escaped: false,
                        };
                        i += 1;
                        continue;
                    }
                    if bytes[i] == b'\\' {
                        self.mode = Mode::Triple {
                            quote,
                            escaped: true,
                        };
                        i += 1;
                        continue;
                    }
                    if bytes[i] == quote
                        && bytes.get(i + 1) == Some(&quote)
                        && bytes.get(i + 2) == Some(&quote)
                    {
                        if self.opts.mask_strings {
                            mask_range(&mut out, i, i + 3);
                        }
                        self.mode = Mode::Normal;
                        close_literal(&mut self.literals, &mut literal_start, i + 3);
                        i += 3;
                        continue;
                    }
                    i += 1;
                }

                Mode::Char { escaped } => {
                    if self.opts.mask_strings {
                        out[i] = b' ';
                    }

                    if escaped {
                        self.mode = Mode::Char { escaped: false };
                    } else if bytes[i] == b'\\' {
                        self.mode = Mode::Char { escaped: true };
                    } else if bytes[i] == b'\'' {
                        self.mode = Mode::Normal;
                        close_literal(&mut self.literals, &mut literal_start, i + 1);
                    }
                    i += 1;
                }

                Mode::RawString { hashes } => {
                    if self.opts.mask_strings {
                        out[i] = b' ';
                    }

                    // Look for end delimiter: "###
                    if bytes[i] == b'"' {
                        let closes = (0..hashes).all(|j| bytes.get(i + 1 + j) == Some(&b'#'));
                        if closes {
                            let end = i + 1 + hashes;
                            if self.opts.mask_strings {
                                mask_range(&mut out, i, end);
                            }
                            self.mode = Mode::Normal;
                            close_literal(&mut self.literals, &mut literal_start, end);
                            i = end;
                            continue;
                        }
                    }

                    i += 1;
                }
            }
        }

        if let Some(start) = literal_start {
            self.literals.push(start..len);
        }

        if self.ends_at_line_break() {
            self.mode = Mode::Normal;
        }

        String::from_utf8(out).unwrap_or_else(|_| line.to_string())
    }

    /// Constructs that cannot span lines are closed at the line break.
    fn ends_at_line_break(&self) -> bool {
        match self.mode {
            Mode::LineComment | Mode::Char { .. } => true,
            Mode::Quoted { quote, .. } => match self.strings {
                StringSyntax::Rust => false,
                StringSyntax::JavaScript => quote != b'`',
                _ => true,
            },
            Mode::Verbatim { quote } => quote != b'`',
            _ => false,
        }
    }

    /// Returns the mode entered and the index just past the opening delimiter.
    fn detect_string_start(&self, line: &str, i: usize) -> Option<(Mode, usize)> {
        let bytes = line.as_bytes();
        let b = bytes[i];

        match self.strings {
            StringSyntax::Rust => {
                if let Some((quote_i, hashes)) = detect_raw_string_start(bytes, i) {
                    return Some((Mode::RawString { hashes }, quote_i + 1));
                }
                if b == b'b' && bytes.get(i + 1) == Some(&b'"') && !ident_before(bytes, i) {
                    return Some((quoted(b'"'), i + 2));
                }
                if b == b'"' {
                    return Some((quoted(b'"'), i + 1));
                }
                if b == b'\'' && is_rust_char_literal(line, i) {
                    return Some((Mode::Char { escaped: false }, i + 1));
                }
                None
            }
            StringSyntax::Python => {
                if b == b'"' || b == b'\'' {
                    if bytes.get(i + 1) == Some(&b) && bytes.get(i + 2) == Some(&b) {
                        return Some((
                            Mode::Triple {
                                quote: b,
                                escaped: false,
                            },
                            i + 3,
                        ));
                    }
                    return Some((quoted(b), i + 1));
                }
                None
            }
            StringSyntax::JavaScript => {
                matches!(b, b'"' | b'\'' | b'`').then(|| (quoted(b), i + 1))
            }
            StringSyntax::Go => match b {
                b'"' => Some((quoted(b), i + 1)),
                b'`' => Some((Mode::Verbatim { quote: b }, i + 1)),
                b'\'' => Some((Mode::Char { escaped: false }, i + 1)),
                _ => None,
            },
            StringSyntax::Shell => match b {
                b'"' => Some((quoted(b), i + 1)),
                b'\'' => Some((Mode::Verbatim { quote: b }, i + 1)),
                _ => None,
            },
            StringSyntax::CStyle => match b {
                b'"' => Some((quoted(b), i + 1)),
                b'\'' => Some((Mode::Char { escaped: false }, i + 1)),
                _ => None,
            },
        }
    }

    /// `Some(true)` for a block comment opener, `Some(false)` for a line comment.
    fn detect_comment_start(&self, bytes: &[u8], i: usize) -> Option<bool> {
        match self.comments {
            CommentSyntax::CStyle | CommentSyntax::CStyleNested => {
                if bytes[i] != b'/' {
                    return None;
                }
                match bytes.get(i + 1) {
                    Some(b'/') => Some(false),
                    Some(b'*') => Some(true),
                    _ => None,
                }
            }
            CommentSyntax::Hash => (bytes[i] == b'#').then_some(false),
            CommentSyntax::ShellHash => {
                let word_start = i == 0 || bytes[i - 1].is_ascii_whitespace();
                (bytes[i] == b'#' && word_start).then_some(false)
            }
        }
    }
}

fn quoted(quote: u8) -> Mode {
    Mode::Quoted {
        quote,
        escaped: false,
    }
}

fn close_literal(literals: &mut Vec<Range<usize>>, start: &mut Option<usize>, end: usize) {
    if let Some(s) = start.take() {
        literals.push(s..end);
    }
}

fn mask_range(out: &mut [u8], start: usize, end: usize) {
    let end = end.min(out.len());
    for b in &mut out[start..end] {
        *b = b' ';
    }
}

fn ident_before(bytes: &[u8], i: usize) -> bool {
    i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_')
}

/// Detect a raw string start (Rust): r#"..."# or br#"..."#.
///
/// Returns (quote_index, hash_count) where quote_index points to the opening `"`.
fn detect_raw_string_start(bytes: &[u8], i: usize) -> Option<(usize, usize)> {
    if ident_before(bytes, i) {
        return None;
    }

    // Either r... or br...
    let r_i = match (bytes.get(i), bytes.get(i + 1)) {
        (Some(b'r'), _) => i,
        (Some(b'b'), Some(b'r')) => i + 1,
        _ => return None,
    };

    let mut j = r_i + 1;
    let mut hashes = 0usize;
    while bytes.get(j) == Some(&b'#') {
        hashes += 1;
        j += 1;
    }

    (bytes.get(j) == Some(&b'"')).then_some((j, hashes))
}

/// `'a'` and `'\n'` are char literals; `'a` and `'static` are lifetimes or labels.
fn is_rust_char_literal(line: &str, quote_i: usize) -> bool {
    let mut rest = line[quote_i + 1..].chars();
    match rest.next() {
        Some('\\') => true,
        Some('\'') | None => false,
        Some(_) => rest.next() == Some('\''),
    }
}
