//! Property values and verilog-style integer literals.

use std::fmt;
use nom::{
    IResult,
    combinator::{ all_consuming, map, opt, recognize },
    sequence::{ pair, preceded, tuple },
    character::complete::{ char, digit0, one_of },
    bytes::complete::take_while1,
};
use crate::Ident;

/// Type tag of a property value.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum PropertyKind {
    Boolean,
    Integer,
    String,
}

impl PropertyKind {
    /// Keyword used in the text format.
    pub fn keyword(self) -> &'static str {
        match self {
            PropertyKind::Boolean => "boolean",
            PropertyKind::Integer => "integer",
            PropertyKind::String => "string",
        }
    }

    pub fn from_keyword(s: &str) -> Option<PropertyKind> {
        if s.eq_ignore_ascii_case("string") { Some(PropertyKind::String) }
        else if s.eq_ignore_ascii_case("integer") { Some(PropertyKind::Integer) }
        else if s.eq_ignore_ascii_case("boolean") { Some(PropertyKind::Boolean) }
        else { None }
    }

    /// Two-bit tag used by the binary format.
    pub fn code(self) -> u32 {
        match self {
            PropertyKind::Boolean => 0,
            PropertyKind::Integer => 1,
            PropertyKind::String => 2,
        }
    }

    pub fn from_code(c: u32) -> Option<PropertyKind> {
        match c {
            0 => Some(PropertyKind::Boolean),
            1 => Some(PropertyKind::Integer),
            2 => Some(PropertyKind::String),
            _ => None
        }
    }
}

/// A property value, kept verbatim as it appeared in the source.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct PropertyValue {
    pub kind: PropertyKind,
    pub value: Ident,
    /// Optional `(owner "...")` annotation.
    pub owner: Option<Ident>,
}

/// `[width]'[s]<radix>` prefix of a verilog literal.
fn radix_prefix(i: &str) -> IResult<&str, (bool, u32)> {
    preceded(
        pair(digit0, char('\'')),
        pair(
            map(opt(one_of("sS")), |s| s.is_some()),
            map(one_of("bBoOdDhH"), |r| match r {
                'b' | 'B' => 2,
                'o' | 'O' => 8,
                'h' | 'H' => 16,
                _ => 10
            })
        )
    )(i)
}

fn digits(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_hexdigit() || c == '_')
    ))(i)
}

fn literal(i: &str) -> IResult<&str, (Option<(bool, u32)>, &str)> {
    all_consuming(tuple((opt(radix_prefix), digits)))(i)
}

/// Parses a verilog-style integer such as `32'hFF`, `'sd-3` or `7`.
///
/// Signed parsing is used when an `s` follows the tick or the
/// digits contain a minus sign. Unsigned values are reinterpreted
/// as two's complement.
pub fn parse_verilog_int(s: &str) -> Option<i64> {
    let (_, (prefix, digits)) = literal(s.trim()).ok()?;
    let (signed, radix) = prefix.unwrap_or((false, 10));
    let clean: String = digits.chars().filter(|c| *c != '_').collect();
    if signed || clean.contains('-') {
        i64::from_str_radix(&clean, radix).ok()
    }
    else {
        u64::from_str_radix(&clean, radix).ok().map(|v| v as i64)
    }
}

impl PropertyValue {
    pub fn new(kind: PropertyKind, value: Ident) -> PropertyValue {
        PropertyValue { kind, value, owner: None }
    }

    pub fn string(value: Ident) -> PropertyValue {
        PropertyValue::new(PropertyKind::String, value)
    }

    pub fn with_owner(mut self, owner: Ident) -> PropertyValue {
        self.owner = Some(owner);
        self
    }

    /// Integer value as a 32-bit number, for integer properties.
    ///
    /// Unsigned literals up to `u32::MAX` wrap into the negative
    /// range like a 32-bit register would.
    pub fn int_value(&self) -> Option<i32> {
        if self.kind != PropertyKind::Integer {
            return None
        }
        let v = parse_verilog_int(&self.value)?;
        if v < i32::MIN as i64 || v > u32::MAX as i64 {
            return None
        }
        Some(v as i32)
    }

    /// Integer value as a 64-bit number. Wide constants are often
    /// written as strings, so both kinds are accepted.
    pub fn long_value(&self) -> Option<i64> {
        match self.kind {
            PropertyKind::Boolean => None,
            _ => parse_verilog_int(&self.value)
        }
    }

    pub fn bool_value(&self) -> Option<bool> {
        if self.kind != PropertyKind::Boolean {
            return None
        }
        let v = self.value.trim_start_matches('(').trim_end_matches(')').trim();
        if v.eq_ignore_ascii_case("true") { Some(true) }
        else if v.eq_ignore_ascii_case("false") { Some(false) }
        else { None }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            PropertyKind::String => write!(f, "(string \"{}\")", self.value),
            PropertyKind::Integer => write!(f, "(integer {})", self.value),
            PropertyKind::Boolean => write!(f, "(boolean ({}))", self.value),
        }
    }
}
