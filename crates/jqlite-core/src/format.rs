//! `@format` string encoders.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::EvalError;
use crate::value::Value;

const FORMATS: &[&str] = &[
    "text", "json", "html", "uri", "csv", "tsv", "sh", "base64", "base64d", "base32", "base32d",
];

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Everything but the RFC 3986 unreserved characters.
const URI_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Standard alphabet; padding optional when decoding.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn is_format(name: &str) -> bool {
    FORMATS.contains(&name)
}

/// Render `value` with the named format.
pub fn apply(name: &str, value: &Value) -> Result<String, EvalError> {
    match name {
        "text" => Ok(to_text(value)),
        "json" => Ok(value.to_string()),
        "html" => Ok(escape_html(&to_text(value))),
        "uri" => Ok(escape_uri(&to_text(value))),
        "csv" => csv(value),
        "tsv" => tsv(value),
        "sh" => shell(value),
        "base64" => Ok(BASE64.encode(to_text(value))),
        "base64d" => {
            let text = to_text(value);
            BASE64
                .decode(text.trim_end())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(|_| EvalError::msg(format!("{} is not valid base64 data", value.describe())))
        }
        "base32" => Ok(base32_encode(to_text(value).as_bytes())),
        "base32d" => base32_decode(&to_text(value))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .ok_or_else(|| EvalError::msg(format!("{} is not valid base32 data", value.describe()))),
        other => Err(EvalError::msg(format!("{} is not a valid format", other))),
    }
}

/// `tostring`: strings as-is, everything else as compact JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn escape_uri(text: &str) -> String {
    utf8_percent_encode(text, URI_RESERVED).to_string()
}

fn row<'v>(value: &'v Value, kind: &str) -> Result<&'v [Value], EvalError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(EvalError::msg(format!(
            "{} cannot be {}-formatted, only an array can be",
            other.describe(),
            kind
        ))),
    }
}

fn csv(value: &Value) -> Result<String, EvalError> {
    let cells = row(value, "csv")?
        .iter()
        .map(|cell| match cell {
            Value::Null => Ok(String::new()),
            Value::Bool(_) | Value::Number(_) => Ok(cell.to_string()),
            Value::String(s) => Ok(format!("\"{}\"", s.replace('"', "\"\""))),
            other => Err(EvalError::msg(format!(
                "{} is not valid in a csv row",
                other.describe()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cells.join(","))
}

fn tsv(value: &Value) -> Result<String, EvalError> {
    let cells = row(value, "tsv")?
        .iter()
        .map(|cell| match cell {
            Value::Null => Ok(String::new()),
            Value::Bool(_) | Value::Number(_) => Ok(cell.to_string()),
            Value::String(s) => Ok(s
                .replace('\\', "\\\\")
                .replace('\t', "\\t")
                .replace('\n', "\\n")
                .replace('\r', "\\r")),
            other => Err(EvalError::msg(format!(
                "{} is not valid in a tsv row",
                other.describe()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cells.join("\t"))
}

fn shell(value: &Value) -> Result<String, EvalError> {
    let quote = |v: &Value| match v {
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "'\\''"))),
        Value::Array(_) | Value::Object(_) => Err(EvalError::msg(format!(
            "{} can not be escaped for shell",
            v.describe()
        ))),
        scalar => Ok(scalar.to_string()),
    };
    match value {
        Value::Array(items) => Ok(items
            .iter()
            .map(quote)
            .collect::<Result<Vec<_>, _>>()?
            .join(" ")),
        other => quote(other),
    }
}

fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    for chunk in bytes.chunks(5) {
        let mut buf = [0u8; 5];
        buf[..chunk.len()].copy_from_slice(chunk);
        let bits = buf.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        let symbols = (chunk.len() * 8).div_ceil(5);
        for i in 0..8 {
            if i < symbols {
                let index = (bits >> (35 - i * 5)) & 0x1f;
                out.push(BASE32_ALPHABET[index as usize] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}

fn base32_decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut bits = 0u64;
    let mut count = 0u32;
    for c in text.trim_end().trim_end_matches('=').bytes() {
        let value = BASE32_ALPHABET.iter().position(|a| *a == c.to_ascii_uppercase())?;
        bits = (bits << 5) | value as u64;
        count += 5;
        if count >= 8 {
            count -= 8;
            out.push((bits >> count) as u8);
            bits &= (1 << count) - 1;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(text: &str) -> Value {
        Value::from_json(text).unwrap()
    }

    #[test]
    fn csv_and_tsv_rows() {
        let input = json(r#"[1,"a\"b",null,true]"#);
        assert_eq!(apply("csv", &input).unwrap(), r#"1,"a""b",,true"#);
        assert_eq!(apply("tsv", &json(r#"["a\tb",2]"#)).unwrap(), "a\\tb\t2");
        assert!(apply("csv", &json("[[1]]")).is_err());
        assert!(apply("csv", &json("1")).is_err());
    }

    #[test]
    fn shell_quoting() {
        assert_eq!(apply("sh", &json(r#"["it's", 1]"#)).unwrap(), r#"'it'\''s' 1"#);
        assert!(apply("sh", &json(r#"{"a":1}"#)).is_err());
    }

    #[test]
    fn html_and_uri_escaping() {
        assert_eq!(apply("html", &json(r#""<a href='x'>""#)).unwrap(), "&lt;a href=&#39;x&#39;&gt;");
        assert_eq!(apply("uri", &json(r#""a b/ü""#)).unwrap(), "a%20b%2F%C3%BC");
        assert_eq!(apply("uri", &json(r#""-_.~AZaz09""#)).unwrap(), "-_.~AZaz09");
        assert_eq!(apply("uri", &json(r#""!*'()&=+""#)).unwrap(), "%21%2A%27%28%29%26%3D%2B");
    }

    #[test]
    fn base64_round_trip_without_padding() {
        assert_eq!(apply("base64", &json(r#""hello""#)).unwrap(), "aGVsbG8=");
        assert_eq!(apply("base64d", &json(r#""aGVsbG8""#)).unwrap(), "hello");
        assert!(apply("base64d", &json(r#""%%%""#)).is_err());
    }

    #[test]
    fn base32_round_trip() {
        assert_eq!(apply("base32", &json(r#""foobar""#)).unwrap(), "MZXW6YTBOI======");
        assert_eq!(apply("base32d", &json(r#""MZXW6YTBOI======""#)).unwrap(), "foobar");
    }

    #[test]
    fn text_and_json() {
        assert_eq!(apply("text", &json("[1,\"a\"]")).unwrap(), r#"[1,"a"]"#);
        assert_eq!(apply("json", &json("\"a\"")).unwrap(), r#""a""#);
    }
}
