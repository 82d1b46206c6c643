//! Translation of the SQL dialect used in query `WHERE` clauses into RFC 4515
//! LDAP search filters.
//!
//! The dialect is the one of the ADSI OLE DB provider: comparisons with `=`,
//! `<>`, `<`, `<=`, `>`, `>=` combined with `AND`, `OR`, `NOT` and
//! parentheses. Values are quoted with `'` (a doubled `''` stands for a
//! quote) or bare words and numbers; `*` is a wildcard.
use std::{iter::Peekable, str::Chars};

use crate::error::Error;

/// Filter matching every entry, used for an empty clause.
pub const MATCH_ALL: &str = "(objectClass=*)";

/// How deep parentheses and `NOT` may nest.
const MAX_DEPTH: usize = 256;

/// Characters which end a bare word.
const WORD_END: &[char] = &['(', ')', '=', '<', '>', '!', '\''];

/// Lexical elements of a clause.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
	/// `(`
	Open,
	/// `)`
	Close,
	/// A comparison operator.
	Operator(Operator),
	/// An unquoted word: attribute name, keyword or bare value.
	Word(String),
	/// A quoted string, unescaped.
	Quoted(String),
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operator {
	/// `=`
	Equal,
	/// `<>` or `!=`
	NotEqual,
	/// `<`
	Less,
	/// `<=`
	LessOrEqual,
	/// `>`
	Greater,
	/// `>=`
	GreaterOrEqual,
}

/// Translate a `WHERE` clause (with or without the keyword) into an LDAP
/// filter.
///
/// Syntax errors are reported as [`Error::Query`] with the clause as query.
pub fn to_ldap_filter(where_clause: &str) -> Result<String, Error> {
	let syntax_error =
		|reason: String| Error::Query { query: where_clause.to_owned(), reason };
	let mut tokens = tokenize(where_clause).map_err(syntax_error)?;
	if matches!(tokens.first(), Some(Token::Word(word)) if word.eq_ignore_ascii_case("WHERE")) {
		tokens.remove(0);
	}
	if tokens.is_empty() {
		return Ok(MATCH_ALL.to_owned());
	}
	let mut parser = Parser { tokens, position: 0, depth: 0 };
	let filter = parser.disjunction().map_err(syntax_error)?;
	if let Some(token) = parser.tokens.get(parser.position) {
		return Err(syntax_error(format!("Unexpected {token:?} after end of expression")));
	}
	Ok(filter)
}

/// Split a clause into tokens.
fn tokenize(clause: &str) -> Result<Vec<Token>, String> {
	let mut tokens = Vec::new();
	let mut chars = clause.chars().peekable();
	while let Some(&c) = chars.peek() {
		match c {
			c if c.is_whitespace() => {
				chars.next();
			}
			'(' => {
				chars.next();
				tokens.push(Token::Open);
			}
			')' => {
				chars.next();
				tokens.push(Token::Close);
			}
			'\'' => {
				chars.next();
				tokens.push(Token::Quoted(quoted(&mut chars)?));
			}
			'=' | '<' | '>' | '!' => tokens.push(Token::Operator(operator(&mut chars)?)),
			_ => {
				let mut word = String::new();
				while let Some(&c) = chars.peek() {
					if c.is_whitespace() || WORD_END.contains(&c) {
						break;
					}
					word.push(c);
					chars.next();
				}
				tokens.push(Token::Word(word));
			}
		}
	}
	Ok(tokens)
}

/// Read the rest of a quoted string whose opening quote was consumed.
fn quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, String> {
	let mut value = String::new();
	loop {
		match chars.next() {
			Some('\'') if chars.peek() == Some(&'\'') => {
				chars.next();
				value.push('\'');
			}
			Some('\'') => return Ok(value),
			Some(c) => value.push(c),
			None => return Err(format!("Unterminated string '{value}")),
		}
	}
}

/// Read a comparison operator.
fn operator(chars: &mut Peekable<Chars<'_>>) -> Result<Operator, String> {
	let first = chars.next();
	let second = chars.peek().copied();
	let (operator, consumed) = match (first, second) {
		(Some('='), _) => (Operator::Equal, false),
		(Some('<'), Some('=')) => (Operator::LessOrEqual, true),
		(Some('<'), Some('>')) | (Some('!'), Some('=')) => (Operator::NotEqual, true),
		(Some('<'), _) => (Operator::Less, false),
		(Some('>'), Some('=')) => (Operator::GreaterOrEqual, true),
		(Some('>'), _) => (Operator::Greater, false),
		_ => return Err(format!("Unknown operator starting with {first:?}")),
	};
	if consumed {
		chars.next();
	}
	Ok(operator)
}

/// Recursive descent parser producing the filter string directly.
struct Parser {
	/// All tokens of the clause.
	tokens: Vec<Token>,
	/// Index of the next token.
	position: usize,
	/// Current nesting of parentheses and `NOT`.
	depth: usize,
}

impl Parser {
	/// The next token, without consuming it.
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.position)
	}

	/// Consume the next token.
	fn advance(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.position).cloned();
		self.position += 1;
		token
	}

	/// Consume the next token if it is the given keyword.
	fn keyword(&mut self, keyword: &str) -> bool {
		let found =
			matches!(self.peek(), Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword));
		if found {
			self.position += 1;
		}
		found
	}

	/// Parse a nested expression, bounding the recursion.
	fn nested(
		&mut self,
		parse: impl FnOnce(&mut Self) -> Result<String, String>,
	) -> Result<String, String> {
		if self.depth >= MAX_DEPTH {
			return Err(format!("Expression nested deeper than {MAX_DEPTH} levels"));
		}
		self.depth += 1;
		let result = parse(self);
		self.depth -= 1;
		result
	}

	/// `conjunction ("OR" conjunction)*`
	fn disjunction(&mut self) -> Result<String, String> {
		let mut terms = vec![self.conjunction()?];
		while self.keyword("OR") {
			terms.push(self.conjunction()?);
		}
		Ok(combine('|', terms))
	}

	/// `negation ("AND" negation)*`
	fn conjunction(&mut self) -> Result<String, String> {
		let mut terms = vec![self.negation()?];
		while self.keyword("AND") {
			terms.push(self.negation()?);
		}
		Ok(combine('&', terms))
	}

	/// `"NOT" negation | primary`
	fn negation(&mut self) -> Result<String, String> {
		if self.keyword("NOT") {
			return Ok(format!("(!{})", self.nested(Self::negation)?));
		}
		self.primary()
	}

	/// `"(" disjunction ")" | comparison`
	fn primary(&mut self) -> Result<String, String> {
		match self.advance() {
			Some(Token::Open) => {
				let inner = self.nested(Self::disjunction)?;
				match self.advance() {
					Some(Token::Close) => Ok(inner),
					other => Err(format!("Expected ')', found {other:?}")),
				}
			}
			Some(Token::Word(attribute)) => self.comparison(&attribute),
			other => Err(format!("Expected a comparison, found {other:?}")),
		}
	}

	/// `operator value`, the attribute having been consumed.
	fn comparison(&mut self, attribute: &str) -> Result<String, String> {
		let operator = match self.advance() {
			Some(Token::Operator(operator)) => operator,
			other => return Err(format!("Expected an operator after {attribute}, found {other:?}")),
		};
		let value = match self.advance() {
			Some(Token::Quoted(value) | Token::Word(value)) => escape_value(&value),
			other => return Err(format!("Expected a value after {attribute}, found {other:?}")),
		};
		Ok(match operator {
			Operator::Equal => format!("({attribute}={value})"),
			Operator::NotEqual => format!("(!({attribute}={value}))"),
			Operator::LessOrEqual => format!("({attribute}<={value})"),
			Operator::GreaterOrEqual => format!("({attribute}>={value})"),
			Operator::Less => format!("(!({attribute}>={value}))"),
			Operator::Greater => format!("(!({attribute}<={value}))"),
		})
	}
}

/// Join filters with `&` or `|`.
fn combine(operator: char, mut terms: Vec<String>) -> String {
	if terms.len() == 1 {
		return terms.remove(0);
	}
	format!("({operator}{})", terms.concat())
}

/// Escape filter metacharacters except the `*` wildcard.
fn escape_value(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'(' => escaped.push_str("\\28"),
			')' => escaped.push_str("\\29"),
			'\\' => escaped.push_str("\\5c"),
			'\0' => escaped.push_str("\\00"),
			c => escaped.push(c),
		}
	}
	escaped
}
