use std::fmt;

/// A value flowing through expressions, typed functions and helpers.
///
/// Literals only ever produce strings and numbers; comparisons produce
/// booleans, which every string/number validator rejects.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// JavaScript truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    /// JavaScript `ToNumber`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::String(s) => string_to_number(s),
        }
    }

    /// JavaScript abstract (`==`) equality.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // Mixed types compare numerically.
            (a, b) => a.to_number() == b.to_number(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let (radix, digits) = match trimmed.get(..2) {
        Some("0x") | Some("0X") => (16, &trimmed[2..]),
        Some("0o") | Some("0O") => (8, &trimmed[2..]),
        Some("0b") | Some("0B") => (2, &trimmed[2..]),
        _ => (10, trimmed),
    };
    if radix != 10 {
        return u64::from_str_radix(digits, radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts spellings such as "inf" and "nan" that JavaScript does not.
        t if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        t => t.parse().unwrap_or(f64::NAN),
    }
}

/// Format a number the way JavaScript's `String(n)` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let name = if n > 0.0 { "Infinity" } else { "-Infinity" };
        name.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        exponential(n)
    } else {
        // Display already prints the shortest round-trip digits, padded
        // with zeros and without a trailing `.0`.
        format!("{}", n)
    }
}

/// Shortest round-trip mantissa with a signed exponent: `1e+21`, `1.5e-7`.
fn exponential(n: f64) -> String {
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

/// Largest digit count accepted by [`to_fixed`], as in JavaScript.
pub const MAX_FIXED_DIGITS: usize = 100;

/// JavaScript `Number.prototype.toFixed`.
///
/// Exact ties round away from zero (`(2.5).toFixed(0)` is `"3"`), values of
/// magnitude 1e21 and above fall back to [`format_number`].
pub fn to_fixed(x: f64, digits: usize) -> String {
    if !x.is_finite() || x.abs() >= 1e21 {
        return format_number(x);
    }
    let digits = digits.min(MAX_FIXED_DIGITS);
    let x = if x == 0.0 { 0.0 } else { x };
    let rounded = format!("{:.*}", digits, x);
    if !is_exact_tie(x, digits) {
        return rounded;
    }
    // Rust rounds ties to even; JavaScript picks the larger magnitude.
    let truncated = truncate_fixed(x, digits);
    if truncated == rounded {
        increment_last_digit(&truncated)
    } else {
        rounded
    }
}

/// Whether the decimal expansion of `x` is exactly halfway between two
/// `digits`-place values.
fn is_exact_tie(x: f64, digits: usize) -> bool {
    // 1100 places hold the full expansion of any finite f64.
    let exact = format!("{:.1100}", x.abs());
    let Some(dot) = exact.find('.') else {
        return false;
    };
    let tail = &exact[dot + 1 + digits..];
    let mut chars = tail.chars();
    chars.next() == Some('5') && chars.all(|c| c == '0')
}

/// `x` cut (not rounded) to `digits` places.
fn truncate_fixed(x: f64, digits: usize) -> String {
    let exact = format!("{:.1100}", x);
    match exact.find('.') {
        Some(dot) if digits == 0 => exact[..dot].to_string(),
        Some(dot) => exact[..dot + 1 + digits].to_string(),
        None => exact,
    }
}

/// Add one unit in the last place of a fixed-point string, away from zero.
fn increment_last_digit(s: &str) -> String {
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s),
    };
    let mut bytes: Vec<u8> = body.bytes().collect();
    let mut carry = true;
    for b in bytes.iter_mut().rev() {
        if !carry {
            break;
        }
        match *b {
            b'.' => continue,
            b'9' => *b = b'0',
            _ => {
                *b += 1;
                carry = false;
            }
        }
    }
    let mut out = String::from(sign);
    if carry {
        out.push('1');
    }
    out.push_str(&String::from_utf8_lossy(&bytes));
    out
}
