use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use thiserror::Error;

/// Errors produced while compiling a grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Grammar syntax error at offset {offset}: {message}")]
    Syntax { message: String, offset: usize },

    #[error("Grammar contains no rules")]
    Empty,

    #[error("Grammar file {path} could not be read: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Kind of a single grammar element.
///
/// Mirrors the element encoding consumed by grammar-constrained sampling in
/// whisper.cpp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// End of a rule definition.
    End,
    /// Start of an alternate definition for the rule.
    Alternate,
    /// Non-terminal: reference to another rule by symbol id.
    RuleRef,
    /// Terminal: a code point, or the start of a character class.
    Char,
    /// Inverse character class (`[^...]`).
    CharNot,
    /// Upper bound of a range started by the preceding char element.
    CharRangeUpper,
    /// Additional alternative inside a character class.
    CharAlt,
}

/// One element of a compiled rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrammarElement {
    pub kind: ElementKind,
    pub value: u32,
}

impl GrammarElement {
    pub const fn new(kind: ElementKind, value: u32) -> Self {
        Self { kind, value }
    }

    fn is_char(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Char
                | ElementKind::CharNot
                | ElementKind::CharAlt
                | ElementKind::CharRangeUpper
        )
    }
}

/// A compiled context-free grammar.
///
/// Rules are indexed by symbol id. Ids referenced but never defined hold an
/// empty rule; compilation is purely syntactic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarRuleSet {
    rules: Vec<Vec<GrammarElement>>,
    symbol_ids: HashMap<String, u32>,
}

impl GrammarRuleSet {
    /// Compile grammar text.
    ///
    /// A grammar that yields zero rules is an error, never an empty success.
    pub fn compile(text: &str) -> Result<Self, GrammarError> {
        let mut parser = Parser::new(text);
        parser.parse()?;

        if parser.rules.is_empty() {
            return Err(GrammarError::Empty);
        }

        Ok(Self {
            rules: parser.rules,
            symbol_ids: parser.symbol_ids,
        })
    }

    /// Compile a grammar from a file path or from inline text.
    ///
    /// If `source` names an existing file, the file contents are compiled.
    /// Otherwise `source` itself is treated as grammar text.
    pub fn from_source(source: &str) -> Result<Self, GrammarError> {
        let path = Path::new(source);
        if path.is_file() {
            let text = fs::read_to_string(path).map_err(|e| GrammarError::Unreadable {
                path: source.to_string(),
                reason: e.to_string(),
            })?;
            Self::compile(&text)
        } else {
            Self::compile(source)
        }
    }

    /// All rules, indexed by symbol id.
    pub fn rules(&self) -> &[Vec<GrammarElement>] {
        &self.rules
    }

    /// Look up the symbol id of a named rule.
    pub fn symbol_id(&self, name: &str) -> Option<u32> {
        self.symbol_ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn symbol_names(&self) -> Vec<&str> {
        let mut names = vec![""; self.symbol_ids.len()];
        for (name, &id) in &self.symbol_ids {
            if let Some(slot) = names.get_mut(id as usize) {
                *slot = name.as_str();
            }
        }
        names
    }
}

fn write_grammar_char(f: &mut fmt::Formatter<'_>, value: u32) -> fmt::Result {
    match char::from_u32(value) {
        Some(c) if (0x20..=0x7f).contains(&value) => write!(f, "{}", c),
        _ => write!(f, "<U+{:04X}>", value),
    }
}

impl fmt::Display for GrammarRuleSet {
    /// Human-readable dump, one `name ::= ...` line per defined rule.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self.symbol_names();

        for (id, rule) in self.rules.iter().enumerate() {
            // Referenced but undefined rules have nothing to print.
            if rule.is_empty() {
                continue;
            }

            write!(f, "{} ::= ", names.get(id).copied().unwrap_or("?"))?;

            let body = &rule[..rule.len() - 1];
            for (i, elem) in body.iter().enumerate() {
                match elem.kind {
                    ElementKind::End => {}
                    ElementKind::Alternate => write!(f, "| ")?,
                    ElementKind::RuleRef => {
                        let name = names.get(elem.value as usize).copied().unwrap_or("?");
                        write!(f, "{} ", name)?;
                    }
                    ElementKind::Char => {
                        write!(f, "[")?;
                        write_grammar_char(f, elem.value)?;
                    }
                    ElementKind::CharNot => {
                        write!(f, "[^")?;
                        write_grammar_char(f, elem.value)?;
                    }
                    ElementKind::CharRangeUpper => {
                        write!(f, "-")?;
                        write_grammar_char(f, elem.value)?;
                    }
                    ElementKind::CharAlt => write_grammar_char(f, elem.value)?,
                }

                if elem.is_char() {
                    let next = rule[i + 1].kind;
                    if !matches!(next, ElementKind::CharAlt | ElementKind::CharRangeUpper) {
                        write!(f, "] ")?;
                    }
                }
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// Recursive-descent parser over the grammar source.
struct Parser {
    chars: Vec<char>,
    pos: usize,
    rules: Vec<Vec<GrammarElement>>,
    symbol_ids: HashMap<String, u32>,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            rules: Vec::new(),
            symbol_ids: HashMap::new(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, GrammarError> {
        Err(GrammarError::Syntax {
            message: message.into(),
            offset: self.pos,
        })
    }

    fn parse(&mut self) -> Result<(), GrammarError> {
        self.skip_space(true);
        while self.peek(0).is_some() {
            self.parse_rule()?;
        }
        Ok(())
    }

    fn skip_space(&mut self, newline_ok: bool) {
        while let Some(c) = self.peek(0) {
            match c {
                ' ' | '\t' => self.pos += 1,
                '#' => {
                    while let Some(c) = self.peek(0) {
                        if c == '\r' || c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '\r' | '\n' if newline_ok => self.pos += 1,
                _ => break,
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, GrammarError> {
        let start = self.pos;
        while self.peek(0).is_some_and(is_word_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return self.error("expecting name");
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_hex(&mut self, digits: usize) -> Result<u32, GrammarError> {
        let mut value = 0u32;
        for _ in 0..digits {
            match self.peek(0).and_then(|c| c.to_digit(16)) {
                Some(d) => {
                    value = (value << 4) + d;
                    self.pos += 1;
                }
                None => return self.error(format!("expecting {} hex chars", digits)),
            }
        }
        Ok(value)
    }

    fn parse_char(&mut self) -> Result<u32, GrammarError> {
        match self.peek(0) {
            Some('\\') => {
                let escaped = match self.peek(1) {
                    Some(c) => c,
                    None => {
                        self.pos += 1;
                        return self.error("unexpected end of input");
                    }
                };
                self.pos += 2;
                match escaped {
                    'x' => self.parse_hex(2),
                    'u' => self.parse_hex(4),
                    'U' => self.parse_hex(8),
                    't' => Ok('\t' as u32),
                    'r' => Ok('\r' as u32),
                    'n' => Ok('\n' as u32),
                    '\\' | '"' | '[' | ']' => Ok(escaped as u32),
                    other => {
                        self.pos -= 2;
                        self.error(format!("unknown escape \\{}", other))
                    }
                }
            }
            Some(c) => {
                self.pos += 1;
                Ok(c as u32)
            }
            None => self.error("unexpected end of input"),
        }
    }

    fn symbol_id(&mut self, name: &str) -> u32 {
        let next = self.symbol_ids.len() as u32;
        *self.symbol_ids.entry(name.to_string()).or_insert(next)
    }

    fn generate_symbol_id(&mut self, base: &str) -> u32 {
        let next = self.symbol_ids.len() as u32;
        self.symbol_ids.insert(format!("{}_{}", base, next), next);
        next
    }

    fn add_rule(&mut self, id: u32, rule: Vec<GrammarElement>) {
        let id = id as usize;
        if self.rules.len() <= id {
            self.rules.resize(id + 1, Vec::new());
        }
        self.rules[id] = rule;
    }

    fn parse_rule(&mut self) -> Result<(), GrammarError> {
        let name = self.parse_name()?;
        self.skip_space(false);
        let rule_id = self.symbol_id(&name);

        if !(self.peek(0) == Some(':') && self.peek(1) == Some(':') && self.peek(2) == Some('=')) {
            return self.error("expecting ::=");
        }
        self.pos += 3;
        self.skip_space(true);

        self.parse_alternates(&name, rule_id, false)?;

        match self.peek(0) {
            Some('\r') => {
                self.pos += if self.peek(1) == Some('\n') { 2 } else { 1 };
            }
            Some('\n') => self.pos += 1,
            Some(_) => return self.error("expecting newline or end"),
            None => {}
        }

        self.skip_space(true);
        Ok(())
    }

    fn parse_alternates(
        &mut self,
        rule_name: &str,
        rule_id: u32,
        nested: bool,
    ) -> Result<(), GrammarError> {
        let mut rule = Vec::new();
        self.parse_sequence(rule_name, &mut rule, nested)?;

        while self.peek(0) == Some('|') {
            rule.push(GrammarElement::new(ElementKind::Alternate, 0));
            self.pos += 1;
            self.skip_space(true);
            self.parse_sequence(rule_name, &mut rule, nested)?;
        }

        rule.push(GrammarElement::new(ElementKind::End, 0));
        self.add_rule(rule_id, rule);
        Ok(())
    }

    fn parse_sequence(
        &mut self,
        rule_name: &str,
        out: &mut Vec<GrammarElement>,
        nested: bool,
    ) -> Result<(), GrammarError> {
        let mut last_sym_start = out.len();

        while let Some(c) = self.peek(0) {
            match c {
                '"' => {
                    self.pos += 1;
                    last_sym_start = out.len();
                    loop {
                        match self.peek(0) {
                            None => return self.error("unexpected end of input"),
                            Some('"') => break,
                            Some(_) => {
                                let value = self.parse_char()?;
                                out.push(GrammarElement::new(ElementKind::Char, value));
                            }
                        }
                    }
                    self.pos += 1;
                    self.skip_space(nested);
                }
                '[' => {
                    self.pos += 1;
                    let mut start_kind = ElementKind::Char;
                    if self.peek(0) == Some('^') {
                        self.pos += 1;
                        start_kind = ElementKind::CharNot;
                    }
                    last_sym_start = out.len();
                    loop {
                        match self.peek(0) {
                            None => return self.error("unexpected end of input"),
                            Some(']') => break,
                            Some(_) => {
                                let value = self.parse_char()?;
                                let kind = if last_sym_start < out.len() {
                                    ElementKind::CharAlt
                                } else {
                                    start_kind
                                };
                                out.push(GrammarElement::new(kind, value));

                                if self.peek(0) == Some('-') && self.peek(1) != Some(']') {
                                    self.pos += 1;
                                    let upper = self.parse_char()?;
                                    out.push(GrammarElement::new(
                                        ElementKind::CharRangeUpper,
                                        upper,
                                    ));
                                }
                            }
                        }
                    }
                    self.pos += 1;
                    self.skip_space(nested);
                }
                c if is_word_char(c) => {
                    let name = self.parse_name()?;
                    let ref_id = self.symbol_id(&name);
                    self.skip_space(nested);
                    last_sym_start = out.len();
                    out.push(GrammarElement::new(ElementKind::RuleRef, ref_id));
                }
                '(' => {
                    self.pos += 1;
                    self.skip_space(true);
                    let sub_id = self.generate_symbol_id(rule_name);
                    self.parse_alternates(rule_name, sub_id, true)?;
                    last_sym_start = out.len();
                    out.push(GrammarElement::new(ElementKind::RuleRef, sub_id));
                    if self.peek(0) != Some(')') {
                        return self.error("expecting ')'");
                    }
                    self.pos += 1;
                    self.skip_space(nested);
                }
                '*' | '+' | '?' => {
                    if last_sym_start == out.len() {
                        return self.error("expecting preceding item to */+/? operator");
                    }

                    // S* --> S' ::= S S' |
                    // S+ --> S' ::= S S' | S
                    // S? --> S' ::= S |
                    let sub_id = self.generate_symbol_id(rule_name);
                    let item = out[last_sym_start..].to_vec();

                    let mut sub_rule = item.clone();
                    if c != '?' {
                        sub_rule.push(GrammarElement::new(ElementKind::RuleRef, sub_id));
                    }
                    sub_rule.push(GrammarElement::new(ElementKind::Alternate, 0));
                    if c == '+' {
                        sub_rule.extend_from_slice(&item);
                    }
                    sub_rule.push(GrammarElement::new(ElementKind::End, 0));
                    self.add_rule(sub_id, sub_rule);

                    out.truncate(last_sym_start);
                    out.push(GrammarElement::new(ElementKind::RuleRef, sub_id));

                    self.pos += 1;
                    self.skip_space(nested);
                }
                _ => break,
            }
        }

        Ok(())
    }
}
