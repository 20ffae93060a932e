//! Structured type signatures and generic normalization.
//!
//! Contracts and dependency targets are compared as trees rather than
//! strings, so `Repo<List<User>>` and `Repo< List<User> >` are the same key
//! and nested generic arguments survive normalization intact.

use std::collections::HashMap;
use std::fmt;

use crate::error::{VerifyError, VerifyResult};

/// Name used for the array constructor, `T[]` parses as `Generic("[]", [T])`.
pub const ARRAY: &str = "[]";

/// A (possibly generic) type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeExpr {
    /// A concrete, non-generic type name.
    Leaf(String),
    /// A type parameter of the enclosing declaration.
    Param(String),
    /// A generic type applied to arguments.
    Generic { name: String, args: Vec<TypeExpr> },
    /// Positional placeholder produced by normalization.
    Placeholder(usize),
}

impl TypeExpr {
    /// Parses a signature such as `Repo<List<User>>` or `User[]`.
    ///
    /// Leaves named in `type_params` become [`TypeExpr::Param`]. A leading
    /// `global::` qualifier and trailing nullable markers (`?`) are dropped.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ferrous_di_verify::TypeExpr;
    ///
    /// let expr = TypeExpr::parse("IRepo< T >", &["T".to_string()]).unwrap();
    /// assert!(expr.is_open());
    /// assert_eq!(expr.to_string(), "IRepo<T>");
    /// ```
    pub fn parse(input: &str, type_params: &[String]) -> VerifyResult<TypeExpr> {
        let mut parser = Parser {
            input,
            chars: input.chars().collect(),
            pos: 0,
            type_params,
        };
        let expr = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != parser.chars.len() {
            return Err(VerifyError::malformed(
                input,
                format!("unexpected '{}' at {}", parser.chars[parser.pos], parser.pos),
            ));
        }
        Ok(expr)
    }

    /// Creates a non-generic leaf.
    pub fn leaf(name: impl Into<String>) -> TypeExpr {
        TypeExpr::Leaf(name.into())
    }

    /// Creates a generic application.
    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> TypeExpr {
        TypeExpr::Generic { name: name.into(), args }
    }

    /// Outermost type name, without arguments.
    pub fn base_name(&self) -> &str {
        match self {
            TypeExpr::Leaf(name) | TypeExpr::Param(name) => name,
            TypeExpr::Generic { name, .. } => name,
            TypeExpr::Placeholder(_) => "_",
        }
    }

    /// Number of top-level type arguments.
    pub fn arity(&self) -> usize {
        match self {
            TypeExpr::Generic { args, .. } => args.len(),
            _ => 0,
        }
    }

    /// Top-level type arguments.
    pub fn args(&self) -> &[TypeExpr] {
        match self {
            TypeExpr::Generic { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, TypeExpr::Generic { .. })
    }

    /// True if any type parameter or placeholder occurs in the tree.
    pub fn is_open(&self) -> bool {
        match self {
            TypeExpr::Leaf(_) => false,
            TypeExpr::Param(_) | TypeExpr::Placeholder(_) => true,
            TypeExpr::Generic { args, .. } => args.iter().any(TypeExpr::is_open),
        }
    }

    /// A generic applied to concrete arguments only, e.g. `Repo<User>`.
    pub fn is_constructed(&self) -> bool {
        self.is_generic() && !self.is_open()
    }

    /// `(base name, arity)` of a generic, the key open contracts are grouped by.
    pub fn open_key(&self) -> Option<(&str, usize)> {
        match self {
            TypeExpr::Generic { name, args } => Some((name.as_str(), args.len())),
            _ => None,
        }
    }

    /// Replaces type parameters using `bindings`; unbound parameters are kept.
    pub fn substitute(&self, bindings: &HashMap<String, TypeExpr>) -> TypeExpr {
        match self {
            TypeExpr::Param(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            TypeExpr::Generic { name, args } => TypeExpr::Generic {
                name: name.clone(),
                args: args.iter().map(|arg| arg.substitute(bindings)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Generic-normalized form.
    ///
    /// Every argument becomes a positional placeholder, except generic
    /// arguments for which `keep_nested(name, arity)` holds: those keep
    /// their structure and are normalized recursively. Placeholders are
    /// numbered in left-to-right order. Non-generic expressions normalize
    /// to themselves.
    ///
    /// ```rust
    /// use ferrous_di_verify::TypeExpr;
    ///
    /// let target = TypeExpr::parse("Repo<List<User>>", &[]).unwrap();
    /// assert_eq!(target.normalized(&|_, _| false).to_string(), "Repo<T0>");
    /// assert_eq!(
    ///     target.normalized(&|name, _| name == "List").to_string(),
    ///     "Repo<List<T0>>"
    /// );
    /// ```
    pub fn normalized(&self, keep_nested: &dyn Fn(&str, usize) -> bool) -> TypeExpr {
        match self {
            TypeExpr::Generic { name, args } => {
                let mut next = 0;
                TypeExpr::Generic {
                    name: name.clone(),
                    args: args
                        .iter()
                        .map(|arg| normalize_arg(arg, keep_nested, &mut next))
                        .collect(),
                }
            }
            other => other.clone(),
        }
    }

    /// Normalized form with every top-level argument collapsed to a placeholder.
    pub fn flat_normalized(&self) -> TypeExpr {
        self.normalized(&|_, _| false)
    }
}

fn normalize_arg(arg: &TypeExpr, keep_nested: &dyn Fn(&str, usize) -> bool, next: &mut usize) -> TypeExpr {
    match arg {
        TypeExpr::Generic { name, args } if keep_nested(name, args.len()) => TypeExpr::Generic {
            name: name.clone(),
            args: args
                .iter()
                .map(|inner| normalize_arg(inner, keep_nested, next))
                .collect(),
        },
        _ => {
            let placeholder = TypeExpr::Placeholder(*next);
            *next += 1;
            placeholder
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Leaf(name) | TypeExpr::Param(name) => f.write_str(name),
            TypeExpr::Placeholder(index) => write!(f, "T{}", index),
            TypeExpr::Generic { name, args } if name == ARRAY && args.len() == 1 => {
                write!(f, "{}[]", args[0])
            }
            TypeExpr::Generic { name, args } => {
                write!(f, "{}<", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")
            }
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
    type_params: &'a [String],
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn error(&self, reason: impl Into<String>) -> VerifyError {
        VerifyError::malformed(self.input, reason)
    }

    fn parse_ident(&mut self) -> VerifyResult<String> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == ':' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(match self.peek() {
                Some(c) => self.error(format!("expected type name, found '{}'", c)),
                None => self.error("expected type name, found end of input"),
            });
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let mut name = raw.as_str();
        while let Some(rest) = name.strip_prefix("global::") {
            name = rest;
        }
        let name = name.to_string();
        if name.is_empty() || name.ends_with(':') || name.ends_with('.') || name.starts_with('.') {
            return Err(self.error(format!("incomplete qualified name '{}'", raw)));
        }
        Ok(name)
    }

    fn parse_type(&mut self) -> VerifyResult<TypeExpr> {
        let name = self.parse_ident()?;
        self.skip_ws();
        let mut expr = if self.peek() == Some('<') {
            self.pos += 1;
            let mut args = Vec::new();
            loop {
                args.push(self.parse_type()?);
                self.skip_ws();
                match self.peek() {
                    Some(',') => self.pos += 1,
                    Some('>') => {
                        self.pos += 1;
                        break;
                    }
                    Some(c) => return Err(self.error(format!("expected ',' or '>', found '{}'", c))),
                    None => return Err(self.error("unterminated type argument list")),
                }
            }
            TypeExpr::Generic { name, args }
        } else if self.type_params.iter().any(|p| *p == name) {
            TypeExpr::Param(name)
        } else {
            TypeExpr::Leaf(name)
        };

        loop {
            self.skip_ws();
            match self.peek() {
                Some('?') => self.pos += 1,
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    if self.peek() != Some(']') {
                        return Err(self.error("expected ']' after '['"));
                    }
                    self.pos += 1;
                    expr = TypeExpr::Generic {
                        name: ARRAY.to_string(),
                        args: vec![expr],
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
}

/// Canonical form of a contract or dependency target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractSignature(TypeExpr);

impl ContractSignature {
    pub fn new(expr: TypeExpr) -> Self {
        ContractSignature(expr)
    }

    /// Parses a signature in the context of the given type parameters.
    pub fn parse(input: &str, type_params: &[String]) -> VerifyResult<Self> {
        TypeExpr::parse(input, type_params).map(ContractSignature)
    }

    pub fn expr(&self) -> &TypeExpr {
        &self.0
    }

    pub fn base_name(&self) -> &str {
        self.0.base_name()
    }

    pub fn arity(&self) -> usize {
        self.0.arity()
    }

    pub fn is_open(&self) -> bool {
        self.0.is_open()
    }
}

impl From<TypeExpr> for ContractSignature {
    fn from(expr: TypeExpr) -> Self {
        ContractSignature(expr)
    }
}

impl fmt::Display for ContractSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> TypeExpr {
        TypeExpr::parse(s, &[]).unwrap()
    }

    #[test]
    fn parses_nested_generics_and_canonicalizes_spacing() {
        let expr = parse(" Map< string ,List<User> > ");
        assert_eq!(expr.to_string(), "Map<string, List<User>>");
        assert_eq!(expr.arity(), 2);
        assert_eq!(expr.base_name(), "Map");
        assert!(expr.is_constructed());
    }

    #[test]
    fn parses_arrays_nullable_and_global_prefix() {
        assert_eq!(parse("global::App.User[]").to_string(), "App.User[]");
        assert_eq!(parse("User?"), TypeExpr::leaf("User"));
        let array = parse("User[]");
        assert_eq!(array.base_name(), ARRAY);
        assert_eq!(array.args(), &[TypeExpr::leaf("User")]);
    }

    #[test]
    fn type_parameters_parse_as_params() {
        let params = vec!["T".to_string()];
        let expr = TypeExpr::parse("Repo<List<T>>", &params).unwrap();
        assert!(expr.is_open());
        assert!(!expr.is_constructed());
        assert_eq!(
            expr,
            TypeExpr::generic("Repo", vec![TypeExpr::generic("List", vec![TypeExpr::Param("T".into())])])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "Repo<", "Repo<>", "Repo<A,>", "Repo<A>>", "Repo[", "App.", "<A>", "global::"] {
            assert!(TypeExpr::parse(bad, &[]).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn normalization_numbers_placeholders_left_to_right() {
        let expr = parse("Map<string, List<User>, int>");
        let keep_list = |name: &str, arity: usize| name == "List" && arity == 1;
        assert_eq!(
            expr.normalized(&keep_list),
            TypeExpr::generic(
                "Map",
                vec![
                    TypeExpr::Placeholder(0),
                    TypeExpr::generic("List", vec![TypeExpr::Placeholder(1)]),
                    TypeExpr::Placeholder(2),
                ]
            )
        );
        assert_eq!(expr.flat_normalized().to_string(), "Map<T0, T1, T2>");
    }

    #[test]
    fn open_and_constructed_forms_share_a_normalized_key() {
        let params = vec!["T".to_string()];
        let open = TypeExpr::parse("Repo<T>", &params).unwrap();
        let closed = parse("Repo<User>");
        assert_eq!(open.flat_normalized(), closed.flat_normalized());
        assert_ne!(open, closed);
    }

    #[test]
    fn substitution_binds_parameters() {
        let params = vec!["T".to_string()];
        let base = TypeExpr::parse("IRepo<List<T>>", &params).unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("T".to_string(), parse("User"));
        assert_eq!(base.substitute(&bindings).to_string(), "IRepo<List<User>>");
    }
}
