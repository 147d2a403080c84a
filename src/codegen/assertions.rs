//! Expansion of assertion macros into Fortran statements.
//!
//! Every expansion ends in an early `return` with `funit_passed_` cleared, so
//! the first failing assertion in a test decides its message and the rest of
//! the test does not run.

use crate::ast::MacroKind;

const FAIL_AND_RETURN: &str = "      funit_passed_ = .false.\n      return\n    end if";
const FAIL_AND_RETURN_IN_LOOP: &str =
    "        funit_passed_ = .false.\n        return\n      end if\n    end do";

/// A macro argument as Fortran code and as text shown inside a message
/// string.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgText<'a> {
    pub code: &'a str,
    pub message: String,
}

impl<'a> ArgText<'a> {
    pub fn new(raw: &'a str) -> Self {
        let code = raw.trim();
        Self {
            code,
            message: escape_quotes(&join_continuations(code)),
        }
    }
}

/// The tolerance an approximate comparison uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Tolerance {
    pub code: String,
    pub message: String,
    /// True when the macro call supplied it.
    pub explicit: bool,
}

impl Tolerance {
    /// A set-level tolerance, written the way C's `%g` would print it.
    pub fn from_value(value: f64) -> Self {
        let text = format_g(value);
        Self {
            message: text.clone(),
            code: text,
            explicit: false,
        }
    }

    /// A tolerance argument given on the call, emitted verbatim.
    pub fn from_argument(arg: &ArgText<'_>) -> Self {
        Self {
            code: arg.code.to_string(),
            message: arg.message.clone(),
            explicit: true,
        }
    }
}

/// Reads a Fortran real literal such as `1.0d-3` or `0.5_dp`. Returns `None`
/// for anything that is not a plain numeric literal.
pub fn parse_real_literal(text: &str) -> Option<f64> {
    let number = text.split_once('_').map_or(text, |(number, _kind)| number);
    number
        .replace(['d', 'D'], "e")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Formats like C's `printf("%g")`: six significant digits, trailing zeros
/// dropped, exponent form outside `1e-4 ..< 1e6`.
pub fn format_g(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{value:.5e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    if exponent < -4 || exponent >= 6 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    } else {
        let decimals = (5 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Doubles `"` so the text can sit inside a `"`-delimited Fortran string.
fn escape_quotes(text: &str) -> String {
    text.replace('"', "\"\"")
}

/// Re-joins an argument that spans `&` continuation lines into one line of
/// text. Comment and blank lines in between are dropped. Inside a string a
/// leading `&` on the continuation line marks where the text resumes;
/// outside one, leading blanks and the marker are dropped.
fn join_continuations(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut joined = String::with_capacity(raw.len());
    let mut part_start = 0;
    let mut amp: Option<usize> = None;
    let mut string_delim: Option<u8> = None;
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            quote @ (b'\'' | b'"') => {
                match string_delim {
                    None => string_delim = Some(quote),
                    Some(delim) if delim == quote => {
                        if bytes.get(pos + 1) == Some(&delim) {
                            pos += 1;
                        } else {
                            string_delim = None;
                        }
                    }
                    Some(_) => {}
                }
                amp = None;
            }
            b'&' => amp = Some(pos),
            b' ' | b'\t' => {}
            b'\n' | b'\r' => {
                joined.push_str(&raw[part_start..amp.unwrap_or(pos)]);
                part_start = continuation_start(bytes, pos, string_delim.is_some());
                pos = part_start;
                amp = None;
                continue;
            }
            _ => amp = None,
        }
        pos += 1;
    }

    joined.push_str(&raw[part_start..]);
    joined
}

fn continuation_start(bytes: &[u8], mut pos: usize, in_string: bool) -> usize {
    loop {
        // step over the line terminator
        if bytes.get(pos) == Some(&b'\r') {
            pos += 1;
        }
        if bytes.get(pos) == Some(&b'\n') {
            pos += 1;
        }

        let line_start = pos;
        while matches!(bytes.get(pos), Some(b' ' | b'\t')) {
            pos += 1;
        }
        match bytes.get(pos) {
            Some(b'!') | Some(b'\n') | Some(b'\r') => {
                while !matches!(bytes.get(pos), None | Some(b'\n' | b'\r')) {
                    pos += 1;
                }
            }
            Some(b'&') => return pos + 1,
            _ if in_string => return line_start,
            _ => return pos,
        }
    }
}

/// One macro call with its arguments in place. Approximate comparisons always
/// carry the tolerance they compare against.
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion<'a> {
    True(ArgText<'a>),
    False(ArgText<'a>),
    Equal(ArgText<'a>, ArgText<'a>),
    NotEqual(ArgText<'a>, ArgText<'a>),
    EqualWith {
        actual: ArgText<'a>,
        expected: ArgText<'a>,
        tolerance: Tolerance,
    },
    ArrayEqual(ArgText<'a>, ArgText<'a>),
    ArrayEqualWith {
        actual: ArgText<'a>,
        expected: ArgText<'a>,
        tolerance: Tolerance,
    },
    Flunk(ArgText<'a>),
}

impl Assertion<'_> {
    pub fn kind(&self) -> MacroKind {
        match self {
            Self::True(_) => MacroKind::True,
            Self::False(_) => MacroKind::False,
            Self::Equal(..) => MacroKind::Equal,
            Self::NotEqual(..) => MacroKind::NotEqual,
            Self::EqualWith { .. } => MacroKind::EqualWith,
            Self::ArrayEqual(..) => MacroKind::ArrayEqual,
            Self::ArrayEqualWith { .. } => MacroKind::ArrayEqualWith,
            Self::Flunk(_) => MacroKind::Flunk,
        }
    }

    /// The Fortran statements for this call.
    pub fn expand(&self) -> String {
        match self {
            Self::True(a) => assert_true(a),
            Self::False(a) => assert_false(a),
            Self::Equal(a, b) => assert_compare(self.kind(), "/=", "is not equal to", a, b),
            Self::NotEqual(a, b) => assert_compare(self.kind(), "==", "is equal to", a, b),
            Self::EqualWith {
                actual,
                expected,
                tolerance,
            } => assert_equal_with(actual, expected, tolerance),
            Self::ArrayEqual(a, b) => assert_array_equal(a, b),
            Self::ArrayEqualWith {
                actual,
                expected,
                tolerance,
            } => assert_array_equal_with(actual, expected, tolerance),
            Self::Flunk(message) => flunk(message),
        }
    }
}

fn assert_true(a: &ArgText<'_>) -> String {
    format!(
        "! assert_true()\n    if (.not. ({code})) then\n      write(funit_message_,*) \"'{msg}' is false\"\n{FAIL_AND_RETURN}",
        code = a.code,
        msg = a.message,
    )
}

fn assert_false(a: &ArgText<'_>) -> String {
    format!(
        "! assert_false()\n    if ({code}) then\n      write(funit_message_,*) \"'{msg}' is true\"\n{FAIL_AND_RETURN}",
        code = a.code,
        msg = a.message,
    )
}

fn assert_compare(
    kind: MacroKind,
    operator: &str,
    relation: &str,
    a: &ArgText<'_>,
    b: &ArgText<'_>,
) -> String {
    format!(
        "! {kind}()\n    if (({a}) {operator} ({b})) then\n      write(funit_message_,*) \"'{am}' (\", {a}, &\n        \") {relation} '{bm}'\"\n{FAIL_AND_RETURN}",
        a = a.code,
        b = b.code,
        am = a.message,
        bm = b.message,
    )
}

fn assert_equal_with(a: &ArgText<'_>, b: &ArgText<'_>, tol: &Tolerance) -> String {
    format!(
        "! assert_equal_with({label})\n    if (abs(({a}) - ({b})) > {tol}) then\n      write(funit_message_,*) \"'{am}' (\", {a}, &\n        \") is not within {tol_msg} of '{bm}'\"\n{FAIL_AND_RETURN}",
        label = if tol.explicit { "tol" } else { "" },
        a = a.code,
        b = b.code,
        am = a.message,
        bm = b.message,
        tol = tol.code,
        tol_msg = tol.message,
    )
}

fn array_size_check(a: &ArgText<'_>, b: &ArgText<'_>) -> String {
    format!(
        "    if (size({a}) /= size({b})) then\n      write(funit_message_,*) \"'{am}' and '{bm}' &\n        &are not the same length:\", size({a}), \"vs.\", size({b})\n{FAIL_AND_RETURN}\n",
        a = a.code,
        b = b.code,
        am = a.message,
        bm = b.message,
    )
}

fn assert_array_equal(a: &ArgText<'_>, b: &ArgText<'_>) -> String {
    format!(
        "! assert_array_equal()\n{size_check}    do funit_i_ = 1,size({a})\n      if ({a}(funit_i_) /= {b}(funit_i_)) then\n        write(funit_message_,*) \"{am}(\", funit_i_, &\n          \") is not equal to {bm}(\", funit_i_, &\n          \"): \", {a}(funit_i_), \"vs\", {b}(funit_i_)\n{FAIL_AND_RETURN_IN_LOOP}",
        size_check = array_size_check(a, b),
        a = a.code,
        b = b.code,
        am = a.message,
        bm = b.message,
    )
}

fn assert_array_equal_with(a: &ArgText<'_>, b: &ArgText<'_>, tol: &Tolerance) -> String {
    format!(
        "! assert_array_equal_with({label})\n{size_check}    do funit_i_ = 1,size({a})\n      if (abs({a}(funit_i_) - {b}(funit_i_)) > {tol}) then\n        write(funit_message_,*) \"{am}(\", funit_i_, &\n          \") is not within {tol_msg} of {bm}(\", funit_i_, &\n          \"): \", {a}(funit_i_), \"vs\", {b}(funit_i_)\n{FAIL_AND_RETURN_IN_LOOP}",
        label = if tol.explicit { "tol" } else { "" },
        size_check = array_size_check(a, b),
        a = a.code,
        b = b.code,
        am = a.message,
        bm = b.message,
        tol = tol.code,
        tol_msg = tol.message,
    )
}

fn flunk(message: &ArgText<'_>) -> String {
    format!(
        "! flunk()\n    write(funit_message_,*) {code}\n    funit_passed_ = .false.\n    return",
        code = message.code,
    )
}
