//! printf-style and sexagesimal number formats.
//!
//! Number elements carry a format string. Plain printf conversions
//! (`%f`, `%.3f`, `%8.2e`, `%g`, `%d`) are rendered the way C would render
//! them. The INDI-specific `%<w>.<f>m` conversion renders sexagesimal
//! `D:MM`, `D:MM.m`, `D:MM:SS`, `D:MM:SS.s` or `D:MM:SS.ss` for
//! `f` = 3, 5, 6, 8 and 9.

use std::fmt;

/// A format string that is not a single supported conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported number format \"{0}\"")]
pub struct FormatError(pub String);

/// Sexagesimal fraction widths accepted by the `m` conversion.
pub const SEXAGESIMAL_FRACTIONS: [u8; 5] = [3, 5, 6, 8, 9];

/// Parsed number format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    Printf {
        flags: Flags,
        width: usize,
        precision: Option<usize>,
        conversion: char,
    },
    Sexagesimal {
        width: usize,
        fraction: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub left: bool,
    pub plus: bool,
    pub space: bool,
    pub zero: bool,
    pub alternate: bool,
}

impl NumberFormat {
    pub fn parse(fmt: &str) -> Result<Self, FormatError> {
        let err = || FormatError(fmt.to_string());
        let spec = fmt.trim().strip_prefix('%').ok_or_else(err)?;
        let bytes = spec.as_bytes();
        let mut i = 0;

        let mut flags = Flags::default();
        while i < bytes.len() {
            match bytes[i] {
                b'-' => flags.left = true,
                b'+' => flags.plus = true,
                b' ' => flags.space = true,
                b'0' => flags.zero = true,
                b'#' => flags.alternate = true,
                _ => break,
            }
            i += 1;
        }

        let width_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let width = spec[width_start..i].parse::<usize>().unwrap_or(0);

        let mut precision = None;
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            precision = Some(spec[start..i].parse::<usize>().unwrap_or(0));
        }

        while i < bytes.len() && matches!(bytes[i], b'l' | b'h' | b'L') {
            i += 1;
        }

        if i + 1 != bytes.len() {
            return Err(err());
        }

        match bytes[i] {
            b'm' => {
                let fraction = precision
                    .and_then(|p| u8::try_from(p).ok())
                    .filter(|p| SEXAGESIMAL_FRACTIONS.contains(p))
                    .ok_or_else(err)?;
                Ok(NumberFormat::Sexagesimal { width, fraction })
            }
            c @ (b'f' | b'F' | b'e' | b'E' | b'g' | b'G' | b'd' | b'i') => {
                Ok(NumberFormat::Printf {
                    flags,
                    width,
                    precision,
                    conversion: c as char,
                })
            }
            _ => Err(err()),
        }
    }

    pub fn is_sexagesimal(&self) -> bool {
        matches!(self, NumberFormat::Sexagesimal { .. })
    }

    /// Render `value` in this format.
    pub fn format(&self, value: f64) -> String {
        match *self {
            NumberFormat::Sexagesimal { width, fraction } => {
                pad(sexagesimal(value, fraction), width, Flags::default())
            }
            NumberFormat::Printf {
                flags,
                width,
                precision,
                conversion,
            } => {
                let mut body = printf(value, precision, conversion, flags.alternate);
                if !body.starts_with('-') {
                    if flags.plus {
                        body.insert(0, '+');
                    } else if flags.space {
                        body.insert(0, ' ');
                    }
                }
                pad(body, width, flags)
            }
        }
    }

    /// Parse wire text written in this format.
    pub fn parse_value(&self, text: &str) -> Option<f64> {
        match self {
            NumberFormat::Sexagesimal { .. } => parse_sexagesimal(text),
            NumberFormat::Printf { .. } => parse_decimal(text),
        }
    }
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            NumberFormat::Sexagesimal { width, fraction } => write!(f, "%{width}.{fraction}m"),
            NumberFormat::Printf {
                flags,
                width,
                precision,
                conversion,
            } => {
                f.write_str("%")?;
                for (set, c) in [
                    (flags.left, '-'),
                    (flags.plus, '+'),
                    (flags.space, ' '),
                    (flags.zero, '0'),
                    (flags.alternate, '#'),
                ] {
                    if set {
                        write!(f, "{c}")?;
                    }
                }
                if width > 0 {
                    write!(f, "{width}")?;
                }
                if let Some(p) = precision {
                    write!(f, ".{p}")?;
                }
                write!(f, "{conversion}")
            }
        }
    }
}

/// Render `value` with `fmt`, falling back to the shortest decimal form when
/// the format is not supported.
pub fn format_number(value: f64, fmt: &str) -> String {
    match NumberFormat::parse(fmt) {
        Ok(format) => format.format(value),
        Err(_) => value.to_string(),
    }
}

/// Parse wire text for a number element declared with `fmt`.
///
/// Sexagesimal formats also accept plain decimal text; unsupported formats
/// fall back to [`parse_any`].
pub fn parse_number(text: &str, fmt: &str) -> Option<f64> {
    match NumberFormat::parse(fmt) {
        Ok(format) => format.parse_value(text),
        Err(_) => parse_any(text),
    }
}

/// Parse either decimal or sexagesimal text.
pub fn parse_any(text: &str) -> Option<f64> {
    parse_decimal(text).or_else(|| parse_sexagesimal(text))
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse `D[:; ]MM[[:; ]SS]` with optional fractional last component.
/// Plain decimals are accepted as a single component.
pub fn parse_sexagesimal(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let parts: Vec<&str> = body
        .split([':', ';', ' '])
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut total = 0.0;
    let mut scale = 1.0;
    for part in parts {
        if part.starts_with(['-', '+']) {
            return None;
        }
        let component = part.parse::<f64>().ok().filter(|v| v.is_finite())?;
        total += component / scale;
        scale *= 60.0;
    }

    Some(if negative { -total } else { total })
}

fn sexagesimal(value: f64, fraction: u8) -> String {
    // Work in integer units of the smallest printed digit so rounding carries
    // into minutes and degrees instead of printing "60".
    let magnitude = value.abs();
    let (units_per_degree, body): (f64, fn(u64) -> String) = match fraction {
        3 => (60.0, |t| format!("{}:{:02}", t / 60, t % 60)),
        5 => (600.0, |t| {
            let rem = t % 600;
            format!("{}:{:02}.{}", t / 600, rem / 10, rem % 10)
        }),
        6 => (3600.0, |t| {
            format!("{}:{:02}:{:02}", t / 3600, (t / 60) % 60, t % 60)
        }),
        8 => (36_000.0, |t| {
            let rem = t % 36_000;
            let tenths = rem % 600;
            format!(
                "{}:{:02}:{:02}.{}",
                t / 36_000,
                rem / 600,
                tenths / 10,
                tenths % 10
            )
        }),
        _ => (360_000.0, |t| {
            let rem = t % 360_000;
            let hundredths = rem % 6000;
            format!(
                "{}:{:02}:{:02}.{:02}",
                t / 360_000,
                rem / 6000,
                hundredths / 100,
                hundredths % 100
            )
        }),
    };

    let units = (magnitude * units_per_degree).round() as u64;
    let text = body(units);
    if value < 0.0 && units != 0 {
        format!("-{text}")
    } else {
        text
    }
}

fn printf(value: f64, precision: Option<usize>, conversion: char, alternate: bool) -> String {
    match conversion {
        'e' | 'E' => {
            let text = exponent(value, precision.unwrap_or(6));
            if conversion == 'E' {
                text.to_uppercase()
            } else {
                text
            }
        }
        'g' | 'G' => {
            let text = general(value, precision.unwrap_or(6), alternate);
            if conversion == 'G' {
                text.to_uppercase()
            } else {
                text
            }
        }
        'd' | 'i' => format!("{}", value.round() as i64),
        _ => format!("{:.*}", precision.unwrap_or(6), value),
    }
}

/// C-style exponent: at least two exponent digits with explicit sign.
fn exponent(value: f64, precision: usize) -> String {
    let rust = format!("{value:.precision$e}");
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => rust,
    }
}

fn general(value: f64, precision: usize, alternate: bool) -> String {
    let precision = precision.max(1);
    if value == 0.0 {
        return "0".to_string();
    }
    let scientific = format!("{:.*e}", precision - 1, value);
    let exp: i32 = scientific
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    let text = if exp < -4 || exp >= precision as i32 {
        exponent(value, precision - 1)
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        format!("{value:.decimals$}")
    };

    if alternate {
        return text;
    }
    strip_trailing_zeros(&text)
}

fn strip_trailing_zeros(text: &str) -> String {
    let (mantissa, exp) = match text.find('e') {
        Some(idx) => text.split_at(idx),
        None => (text, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exp}")
}

fn pad(body: String, width: usize, flags: Flags) -> String {
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if flags.left {
        format!("{body}{}", " ".repeat(fill))
    } else if flags.zero {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (c.to_string(), &body[1..]),
            _ => (String::new(), body.as_str()),
        };
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printf_fixed() {
        assert_eq!(format_number(1.5, "%f"), "1.500000");
        assert_eq!(format_number(1.26, "%.1f"), "1.3");
        assert_eq!(format_number(3.14159, "%8.3f"), "   3.142");
        assert_eq!(format_number(-2.0, "%06.1f"), "-002.0");
        assert_eq!(format_number(2.0, "%-6.1f"), "2.0   ");
    }

    #[test]
    fn printf_exponent_and_general() {
        assert_eq!(format_number(1500.0, "%.2e"), "1.50e+03");
        assert_eq!(format_number(0.00012, "%E"), "1.200000E-04");
        assert_eq!(format_number(100000.0, "%g"), "100000");
        assert_eq!(format_number(1_000_000.0, "%g"), "1e+06");
        assert_eq!(format_number(0.5, "%g"), "0.5");
        assert_eq!(format_number(41.6, "%d"), "42");
    }

    #[test]
    fn sexagesimal_variants() {
        assert_eq!(format_number(12.5, "%9.3m"), "    12:30");
        assert_eq!(format_number(12.51, "%9.5m"), "  12:30.6");
        assert_eq!(format_number(12.5125, "%10.6m"), "  12:30:45");
        assert_eq!(format_number(12.5125, "%11.8m"), " 12:30:45.0");
        assert_eq!(format_number(12.5125, "%12.9m"), " 12:30:45.00");
    }

    #[test]
    fn sexagesimal_carries_instead_of_printing_sixty() {
        assert_eq!(format_number(1.99999, "%6.6m"), "2:00:00");
        assert_eq!(format_number(0.999999, "%3.3m"), "1:00");
    }

    #[test]
    fn sexagesimal_negative_uses_sign_magnitude() {
        assert_eq!(format_number(-1.5, "%6.3m"), " -1:30");
        let parsed = parse_number("-1:30", "%6.3m").expect("parses");
        assert!((parsed + 1.5).abs() < 1e-12);
    }

    #[test]
    fn sexagesimal_roundtrip_at_declared_precision() {
        for (value, fmt, tolerance) in [
            (23.9345, "%10.6m", 1.0 / 3600.0),
            (-45.25, "%9.3m", 1.0 / 60.0),
            (7.123456, "%12.9m", 1.0 / 360_000.0),
        ] {
            let text = format_number(value, fmt);
            let back = parse_number(&text, fmt).expect("roundtrip parses");
            assert!((back - value).abs() <= tolerance, "{fmt}: {text} -> {back}");
        }
    }

    #[test]
    fn sexagesimal_parse_accepts_separators_and_decimals() {
        let expected = 10.0 + 20.0 / 60.0 + 30.0 / 3600.0;
        for text in ["10:20:30", "10;20;30", "10 20 30"] {
            let value = parse_sexagesimal(text).expect("valid");
            assert!((value - expected).abs() < 1e-9, "{text}");
        }
        assert_eq!(parse_number("1.25", "%10.6m"), Some(1.25));
        assert_eq!(parse_sexagesimal("1:2:3:4"), None);
        assert_eq!(parse_sexagesimal("1:-2"), None);
    }

    #[test]
    fn format_parsing() {
        assert!(NumberFormat::parse("%10.6m")
            .expect("valid")
            .is_sexagesimal());
        assert!(NumberFormat::parse("%10.4m").is_err());
        assert!(NumberFormat::parse("%s").is_err());
        assert!(NumberFormat::parse("value %f").is_err());
        assert_eq!(
            NumberFormat::parse("%+08.3lf")
                .expect("valid")
                .to_string(),
            "%+08.3f"
        );
    }

    #[test]
    fn unsupported_format_falls_back() {
        assert_eq!(format_number(2.5, "%s"), "2.5");
        assert_eq!(parse_number("2:30", "%s"), Some(2.5));
        assert_eq!(parse_number("nan", "%f"), None);
    }
}
