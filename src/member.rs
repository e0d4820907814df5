//! Member reference parsing
//!
//! Directory member lists hold distinguished names such as
//! `uid=alice,cn=users,cn=accounts,dc=example,dc=edu`. Users are recognised by
//! a `uid` attribute in one of the RDNs; anything else (typically a nested
//! group's `cn=...` reference) is kept as [`MemberRef::Unresolved`].
//!
//! The parser covers the parts of the RFC 4514 string form that show up in
//! real member attributes: `,`/`;` RDN separators, `+` for multi-valued RDNs,
//! backslash escapes (`\,` and `\2C` forms), quoted values and insignificant
//! whitespace around types and values.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnError {
    #[error("empty distinguished name")]
    Empty,
    #[error("missing '=' after attribute type at byte {0}")]
    MissingEquals(usize),
    #[error("empty attribute type at byte {0}")]
    EmptyAttributeType(usize),
    #[error("invalid escape sequence at byte {0}")]
    BadEscape(usize),
    #[error("unexpected character after quoted value at byte {0}")]
    UnexpectedCharacter(usize),
    #[error("unterminated quoted value")]
    UnterminatedQuote,
    #[error("attribute value is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    pub kind: String,
    pub value: String,
}

/// One relative distinguished name; usually a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rdn(pub Vec<AttributeValue>);

impl Rdn {
    pub fn attributes(&self) -> &[AttributeValue] {
        &self.0
    }
}

pub fn parse_dn(input: &str) -> Result<Vec<Rdn>, DnError> {
    if input.trim().is_empty() {
        return Err(DnError::Empty);
    }

    let bytes = input.as_bytes();
    let mut pos = 0;
    let mut rdns = Vec::new();
    let mut current = Rdn::default();

    loop {
        let (kind, after_type) = parse_type(bytes, pos)?;
        let (value, separator, next) = parse_value(bytes, after_type)?;
        current.0.push(AttributeValue { kind, value });

        match separator {
            Some(b'+') => {}
            Some(_) => rdns.push(std::mem::take(&mut current)),
            None => {
                rdns.push(current);
                return Ok(rdns);
            }
        }
        pos = next;
    }
}

fn parse_type(bytes: &[u8], start: usize) -> Result<(String, usize), DnError> {
    let mut pos = start;
    while pos < bytes.len() && bytes[pos] != b'=' {
        if matches!(bytes[pos], b',' | b';' | b'+') {
            return Err(DnError::MissingEquals(start));
        }
        pos += 1;
    }
    if pos == bytes.len() {
        return Err(DnError::MissingEquals(start));
    }

    let kind = String::from_utf8_lossy(&bytes[start..pos]).trim().to_string();
    if kind.is_empty() {
        return Err(DnError::EmptyAttributeType(start));
    }
    Ok((kind, pos + 1))
}

/// Returns the decoded value, the separator that ended it (if any) and the
/// position just past that separator.
fn parse_value(bytes: &[u8], start: usize) -> Result<(String, Option<u8>, usize), DnError> {
    let mut pos = start;
    while pos < bytes.len() && bytes[pos] == b' ' {
        pos += 1;
    }

    let mut value: Vec<u8> = Vec::new();

    if pos < bytes.len() && bytes[pos] == b'"' {
        pos += 1;
        loop {
            match bytes.get(pos) {
                None => return Err(DnError::UnterminatedQuote),
                Some(b'"') => {
                    pos += 1;
                    break;
                }
                Some(b'\\') => {
                    let (byte, next) = unescape(bytes, pos)?;
                    value.push(byte);
                    pos = next;
                }
                Some(&b) => {
                    value.push(b);
                    pos += 1;
                }
            }
        }
        while pos < bytes.len() && bytes[pos] == b' ' {
            pos += 1;
        }
        return finish_value(value, bytes, pos);
    }

    // Trailing spaces are insignificant unless escaped.
    let mut significant_len = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b',' | b';' | b'+' => break,
            b'\\' => {
                let (byte, next) = unescape(bytes, pos)?;
                value.push(byte);
                significant_len = value.len();
                pos = next;
            }
            b => {
                value.push(b);
                if b != b' ' {
                    significant_len = value.len();
                }
                pos += 1;
            }
        }
    }
    value.truncate(significant_len);
    finish_value(value, bytes, pos)
}

fn finish_value(
    value: Vec<u8>,
    bytes: &[u8],
    pos: usize,
) -> Result<(String, Option<u8>, usize), DnError> {
    let value = String::from_utf8(value).map_err(|_| DnError::InvalidUtf8)?;
    match bytes.get(pos) {
        None => Ok((value, None, pos)),
        Some(&sep @ (b',' | b';' | b'+')) => Ok((value, Some(sep), pos + 1)),
        Some(_) => Err(DnError::UnexpectedCharacter(pos)),
    }
}

fn unescape(bytes: &[u8], pos: usize) -> Result<(u8, usize), DnError> {
    let first = *bytes.get(pos + 1).ok_or(DnError::BadEscape(pos))?;
    if first.is_ascii_hexdigit() {
        let second = *bytes.get(pos + 2).ok_or(DnError::BadEscape(pos))?;
        if !second.is_ascii_hexdigit() {
            return Err(DnError::BadEscape(pos));
        }
        let hex = [first, second];
        let text = std::str::from_utf8(&hex).map_err(|_| DnError::BadEscape(pos))?;
        let byte = u8::from_str_radix(text, 16).map_err(|_| DnError::BadEscape(pos))?;
        return Ok((byte, pos + 3));
    }
    Ok((first, pos + 2))
}

/// A member reference after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRef {
    /// A user, identified by its `uid`
    User(String),
    /// Anything without a usable `uid`: nested groups, malformed DNs
    Unresolved { reference: String, reason: String },
}

impl MemberRef {
    pub fn parse(reference: &str) -> Self {
        let rdns = match parse_dn(reference) {
            Ok(rdns) => rdns,
            Err(e) => {
                return MemberRef::Unresolved {
                    reference: reference.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let uid = rdns
            .iter()
            .flat_map(|rdn| rdn.attributes())
            .find(|attr| attr.kind.eq_ignore_ascii_case("uid"));

        match uid {
            Some(attr) if !attr.value.is_empty() => MemberRef::User(attr.value.clone()),
            Some(_) => MemberRef::Unresolved {
                reference: reference.to_string(),
                reason: "empty uid".to_string(),
            },
            None => MemberRef::Unresolved {
                reference: reference.to_string(),
                reason: "no uid attribute".to_string(),
            },
        }
    }

    pub fn user(&self) -> Option<&str> {
        match self {
            MemberRef::User(uid) => Some(uid),
            MemberRef::Unresolved { .. } => None,
        }
    }

    /// Key used for set membership: the uid for users, the raw reference otherwise
    pub fn identity(&self) -> &str {
        match self {
            MemberRef::User(uid) => uid,
            MemberRef::Unresolved { reference, .. } => reference,
        }
    }
}
