//! Model formulas in the `lme4` notation.
//!
//! ```text
//! votepct ~ party + money + (1 + money | state)
//! ```
//!
//! The fixed part is a `+`-separated list of column names and `a:b`
//! interactions; `0` or `- 1` drop the intercept. Exactly one random-effects
//! term `(terms | group)` is required, `||` requests independent random
//! effects.

use std::fmt;
use thiserror::Error;

/// Errors raised while parsing a formula.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormulaError {
    #[error("formula has no `~`")]
    MissingTilde,

    #[error("formula has no response")]
    EmptyResponse,

    #[error("empty term in `{0}`")]
    EmptyTerm(String),

    #[error("unbalanced parentheses in `{0}`")]
    UnbalancedParens(String),

    #[error("invalid term `{0}`")]
    InvalidTerm(String),

    #[error("formula has no random-effects term `(... | group)`")]
    MissingRandomTerm,

    #[error("only one random-effects term is supported")]
    MultipleRandomTerms,

    #[error("invalid random-effects term `{0}`")]
    InvalidRandomTerm(String),
}

/// A main effect or an interaction of columns.
#[derive(Debug, Clone, Eq)]
pub struct Term {
    factors: Vec<String>,
}

impl Term {
    /// A single column.
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            factors: vec![name.into()],
        }
    }

    /// Columns multiplied together.
    pub fn interaction(factors: Vec<String>) -> Self {
        Self { factors }
    }

    fn parse(text: &str) -> Result<Self, FormulaError> {
        let factors: Vec<String> = text.split(':').map(|f| f.trim().to_string()).collect();
        if factors.iter().any(|f| !is_identifier(f)) {
            return Err(FormulaError::InvalidTerm(text.trim().to_string()));
        }
        Ok(Self { factors })
    }

    /// Columns making up the term.
    pub fn factors(&self) -> &[String] {
        &self.factors
    }

    /// Display name, `a:b` for interactions.
    pub fn name(&self) -> String {
        self.factors.join(":")
    }

    fn key(&self) -> Vec<&str> {
        let mut key: Vec<&str> = self.factors.iter().map(String::as_str).collect();
        key.sort_unstable();
        key
    }
}

impl PartialEq for Term {
    // `a:b` and `b:a` are the same column.
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

/// The `(terms | group)` part of a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomTerm {
    pub intercept: bool,
    pub slopes: Vec<Term>,
    pub group: String,
    pub correlated: bool,
}

impl RandomTerm {
    fn parse(inner: &str) -> Result<Self, FormulaError> {
        let invalid = || FormulaError::InvalidRandomTerm(inner.trim().to_string());
        let (lhs, rhs, correlated) = match inner.split_once("||") {
            Some((l, r)) => (l, r, false),
            None => {
                let (l, r) = inner.split_once('|').ok_or_else(invalid)?;
                (l, r, true)
            }
        };

        let group = rhs.trim();
        if !is_identifier(group) {
            return Err(invalid());
        }

        let mut intercept = true;
        let mut slopes = Vec::new();
        for (negative, piece) in split_terms(lhs)? {
            match (negative, piece.as_str()) {
                (false, "1") => intercept = true,
                (false, "0") | (true, "1") => intercept = false,
                (false, p) if !p.starts_with('(') => {
                    let term = Term::parse(p)?;
                    if !slopes.contains(&term) {
                        slopes.push(term);
                    }
                }
                _ => return Err(invalid()),
            }
        }
        if !intercept && slopes.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            intercept,
            slopes,
            group: group.to_string(),
            correlated,
        })
    }

    /// Names of the random-effect columns, intercept first.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.slopes.len() + 1);
        if self.intercept {
            names.push(INTERCEPT.to_string());
        }
        names.extend(self.slopes.iter().map(Term::name));
        names
    }

    /// Number of random effects per group.
    pub fn len(&self) -> usize {
        self.slopes.len() + usize::from(self.intercept)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Label used for the intercept column.
pub const INTERCEPT: &str = "(Intercept)";

/// A parsed mixed-model formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub response: String,
    pub intercept: bool,
    pub fixed: Vec<Term>,
    pub random: RandomTerm,
}

impl Formula {
    /// Parse `response ~ fixed + (random | group)`.
    pub fn parse(text: &str) -> Result<Self, FormulaError> {
        let (lhs, rhs) = text.split_once('~').ok_or(FormulaError::MissingTilde)?;
        let response = lhs.trim();
        if response.is_empty() {
            return Err(FormulaError::EmptyResponse);
        }
        if !is_identifier(response) {
            return Err(FormulaError::InvalidTerm(response.to_string()));
        }

        let mut intercept = true;
        let mut fixed: Vec<Term> = Vec::new();
        let mut random = None;

        for (negative, piece) in split_terms(rhs)? {
            if let Some(inner) = piece.strip_prefix('(') {
                let inner = inner
                    .strip_suffix(')')
                    .ok_or_else(|| FormulaError::UnbalancedParens(piece.clone()))?;
                if negative {
                    return Err(FormulaError::InvalidTerm(piece));
                }
                if random.is_some() {
                    return Err(FormulaError::MultipleRandomTerms);
                }
                random = Some(RandomTerm::parse(inner)?);
                continue;
            }
            match (negative, piece.as_str()) {
                (false, "1") => intercept = true,
                (false, "0") | (true, "1") => intercept = false,
                (true, _) => return Err(FormulaError::InvalidTerm(format!("-{piece}"))),
                (false, p) => {
                    let term = Term::parse(p)?;
                    if !fixed.contains(&term) {
                        fixed.push(term);
                    }
                }
            }
        }

        Ok(Self {
            response: response.to_string(),
            intercept,
            fixed,
            random: random.ok_or(FormulaError::MissingRandomTerm)?,
        })
    }

    /// Names of the fixed-effect columns, intercept first.
    pub fn fixed_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.fixed.len() + 1);
        if self.intercept {
            names.push(INTERCEPT.to_string());
        }
        names.extend(self.fixed.iter().map(Term::name));
        names
    }

    /// Names of the random-effect columns.
    pub fn random_names(&self) -> Vec<String> {
        self.random.names()
    }

    /// Whether `self` is a special case of `larger`: same response and group,
    /// and every fixed and random term of `self` also appears in `larger`.
    pub fn is_nested_in(&self, larger: &Formula) -> bool {
        let random = &self.random;
        let big = &larger.random;

        // correlated effects carry covariance parameters an independent
        // structure does not have
        let covariance_nested =
            !(random.correlated && random.len() > 1 && !big.correlated);

        self.response == larger.response
            && random.group == big.group
            && (!self.intercept || larger.intercept)
            && self.fixed.iter().all(|t| larger.fixed.contains(t))
            && (!random.intercept || big.intercept)
            && random.slopes.iter().all(|t| big.slopes.contains(t))
            && covariance_nested
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if !self.intercept {
            parts.push("0".to_string());
        } else if self.fixed.is_empty() {
            parts.push("1".to_string());
        }
        parts.extend(self.fixed.iter().map(Term::name));

        let mut re: Vec<String> = Vec::new();
        re.push(if self.random.intercept { "1" } else { "0" }.to_string());
        re.extend(self.random.slopes.iter().map(Term::name));
        let bar = if self.random.correlated { "|" } else { "||" };
        parts.push(format!("({} {} {})", re.join(" + "), bar, self.random.group));

        write!(f, "{} ~ {}", self.response, parts.join(" + "))
    }
}

impl std::str::FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '.' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        }
        _ => false,
    }
}

/// Split at top-level `+` and `-`, returning `(negated, text)` pairs.
fn split_terms(text: &str) -> Result<Vec<(bool, String)>, FormulaError> {
    let mut pieces = Vec::new();
    let mut depth: i32 = 0;
    let mut current = String::new();
    let mut negative = false;

    let finish = |current: &mut String, negative: bool, pieces: &mut Vec<(bool, String)>| {
        let piece = current.trim().to_string();
        current.clear();
        if piece.is_empty() {
            return Err(FormulaError::EmptyTerm(text.trim().to_string()));
        }
        pieces.push((negative, piece));
        Ok(())
    };

    for c in text.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(FormulaError::UnbalancedParens(text.trim().to_string()));
                }
                current.push(c);
            }
            '+' | '-' if depth == 0 => {
                // a leading `-` belongs to the first term
                if !(current.trim().is_empty() && pieces.is_empty() && c == '-') {
                    finish(&mut current, negative, &mut pieces)?;
                }
                negative = c == '-';
            }
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(FormulaError::UnbalancedParens(text.trim().to_string()));
    }
    finish(&mut current, negative, &mut pieces)?;
    Ok(pieces)
}
