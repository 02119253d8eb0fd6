//! `application/x-www-form-urlencoded` codec.
//!
//! # Responsibilities
//! - Strictly decode `key=value&key=value` bodies into `FormFields`
//! - Re-encode deterministically: keys ascending, values in list order
//!
//! # Design Decisions
//! - Malformed escapes and `;` separators are parse errors
//! - `+` means space on the way in and space becomes `+` on the way out

use crate::error::ParseError;
use crate::form::fields::FormFields;
use crate::form::mutation::MutationSpec;

/// Decode a URL-encoded form body.
pub fn parse(body: &[u8]) -> Result<FormFields, ParseError> {
    let body = std::str::from_utf8(body)
        .map_err(|_| ParseError::UrlEncoded("body is not valid UTF-8".to_string()))?;

    let mut fields = FormFields::new();
    for segment in body.split('&') {
        if segment.is_empty() {
            continue;
        }
        if segment.contains(';') {
            return Err(ParseError::UrlEncoded(
                "invalid semicolon separator in form body".to_string(),
            ));
        }
        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        let key = decode_component(key)?;
        let value = decode_component(value)?;
        fields.append(key, value);
    }
    Ok(fields)
}

/// Encode fields as `key=value` pairs joined by `&`.
pub fn encode(fields: &FormFields) -> String {
    let mut out = String::new();
    for (key, value) in fields.pairs() {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(&encode_component(key));
        out.push('=');
        out.push_str(&encode_component(value));
    }
    out
}

/// Parse, mutate and re-encode a body in one pass.
pub fn rewrite(body: &[u8], spec: &MutationSpec) -> Result<String, ParseError> {
    let mut fields = parse(body)?;
    spec.apply(&mut fields);
    Ok(encode(&fields))
}

fn decode_component(raw: &str) -> Result<String, ParseError> {
    validate_escapes(raw)?;
    let with_spaces = raw.replace('+', " ");
    urlencoding::decode(&with_spaces)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ParseError::UrlEncoded(format!("invalid UTF-8 in {:?}", raw)))
}

fn validate_escapes(raw: &str) -> Result<(), ParseError> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(ParseError::UrlEncoded(format!(
                    "invalid URL escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).replace("%20", "+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec(delete: &[&str], set: &[(&str, &str)], append: &[(&str, &str)]) -> MutationSpec {
        let map = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };
        MutationSpec::new(delete.iter().map(|s| s.to_string()).collect(), map(set), map(append))
            .unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let fields = parse(b"a=1&a=2&b=x&flag&&c=").unwrap();
        assert_eq!(fields.get_all("a"), ["1", "2"]);
        assert_eq!(fields.get_all("b"), ["x"]);
        assert_eq!(fields.get_all("flag"), [""]);
        assert_eq!(fields.get_all("c"), [""]);
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_empty_key_kept() {
        let fields = parse(b"=foo&a=1&=").unwrap();
        assert_eq!(fields.get_all(""), ["foo", ""]);
        assert_eq!(encode(&fields), "=foo&=&a=1");

        let spec = spec(&["a"], &[], &[]);
        assert_eq!(rewrite(b"=foo&a=1", &spec).unwrap(), "=foo");
    }

    #[test]
    fn test_parse_decodes_escapes_and_plus() {
        let fields = parse(b"first+name=Jane+Doe&email=jane%40example.com&note=100%25").unwrap();
        assert_eq!(fields.get("first name"), Some("Jane Doe"));
        assert_eq!(fields.get("email"), Some("jane@example.com"));
        assert_eq!(fields.get("note"), Some("100%"));
    }

    #[test]
    fn test_parse_rejects_bad_escape() {
        let err = parse(b"a=%zz").unwrap_err();
        assert!(err.to_string().contains("invalid URL escape"), "{}", err);

        assert!(parse(b"a=%4").is_err());
        assert!(parse(b"a%=1").is_err());
    }

    #[test]
    fn test_parse_rejects_semicolon_and_bad_utf8() {
        assert!(parse(b"a;b=1").is_err());
        let err = parse(b"a=1;b=2").unwrap_err();
        assert!(err.to_string().contains("semicolon"), "{}", err);
        assert!(parse(b"x=ok&a=1;b=2").is_err());
        assert!(parse(b"a=%ff").is_err());
        assert!(parse(&[b'a', b'=', 0xff]).is_err());
    }

    #[test]
    fn test_encode_sorted_and_escaped() {
        let fields: FormFields = [("z", "last"), ("a", "x y"), ("a", "&="), ("m", "~ok-_.")]
            .into_iter()
            .collect();
        assert_eq!(encode(&fields), "a=x+y&a=%26%3D&m=~ok-_.&z=last");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode(&FormFields::new()), "");
    }

    #[test]
    fn test_rewrite_scenario() {
        let spec = spec(&["a"], &[("b", "y"), ("c", "z")], &[("b", "w"), ("d", "q")]);
        let out = rewrite(b"a=1&a=2&b=x", &spec).unwrap();
        assert_eq!(out, "b=y&b=w&c=z&d=q");

        let decoded = parse(out.as_bytes()).unwrap();
        assert!(!decoded.contains_key("a"));
        assert_eq!(decoded.get_all("b"), ["y", "w"]);
        assert_eq!(decoded.get_all("c"), ["z"]);
        assert_eq!(decoded.get_all("d"), ["q"]);
    }

    #[test]
    fn test_untouched_fields_round_trip() {
        let body = "name=J%C3%BCrgen+M%C3%BCller&tags=a&tags=b&empty=&sym=%2B%26%3D%25";
        let original = parse(body.as_bytes()).unwrap();

        let spec = spec(&["absent"], &[], &[]);
        let out = rewrite(body.as_bytes(), &spec).unwrap();

        assert_eq!(parse(out.as_bytes()).unwrap(), original);
        assert_eq!(original.get("name"), Some("Jürgen Müller"));
        assert_eq!(original.get("sym"), Some("+&=%"));
    }
}
