//! Minimal RFC 5424 parser.
//!
//! rtl_433 frames each decoded packet as
//! `<PRI>1 TIMESTAMP HOSTNAME rtl_433 - - - {json}`. Only the fields needed
//! to route and log a message are kept; the JSON body is returned untouched.

use crate::error::SyslogError;

// ---

const NIL: &str = "-";
const BOM: &str = "\u{feff}";

/// Header fields and message body of one syslog record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogParts<'a> {
    pub priority: u8,
    pub version: u16,
    pub timestamp: Option<&'a str>,
    pub hostname: Option<&'a str>,
    pub app_name: Option<&'a str>,
    pub proc_id: Option<&'a str>,
    pub msg_id: Option<&'a str>,
    pub structured_data: Option<&'a str>,
    pub message: &'a str,
}

impl LogParts<'_> {
    pub fn facility(&self) -> u8 {
        self.priority >> 3
    }

    pub fn severity(&self) -> u8 {
        self.priority & 0x07
    }
}

pub fn parse(datagram: &str) -> Result<LogParts<'_>, SyslogError> {
    // ---
    let line = datagram.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(SyslogError::Empty);
    }

    let rest = line.strip_prefix('<').ok_or(SyslogError::BadPriority)?;
    let close = rest.find('>').ok_or(SyslogError::BadPriority)?;
    let priority = parse_priority(&rest[..close])?;
    let rest = &rest[close + 1..];

    let (version, rest) = next_field(rest).ok_or(SyslogError::BadVersion)?;
    let version = version
        .parse::<u16>()
        .ok()
        .filter(|v| *v > 0 && !version.starts_with('0'))
        .ok_or(SyslogError::BadVersion)?;

    let (timestamp, rest) = next_field(rest).ok_or(SyslogError::Truncated("TIMESTAMP"))?;
    let (hostname, rest) = next_field(rest).ok_or(SyslogError::Truncated("HOSTNAME"))?;
    let (app_name, rest) = next_field(rest).ok_or(SyslogError::Truncated("APP-NAME"))?;
    let (proc_id, rest) = next_field(rest).ok_or(SyslogError::Truncated("PROCID"))?;
    let (msg_id, rest) = next_field(rest).ok_or(SyslogError::Truncated("MSGID"))?;
    if rest.is_empty() {
        return Err(SyslogError::Truncated("STRUCTURED-DATA"));
    }

    let (structured_data, rest) = split_structured_data(rest)?;
    let message = match rest.strip_prefix(' ') {
        Some(msg) => msg.strip_prefix(BOM).unwrap_or(msg),
        None if rest.is_empty() => "",
        None => return Err(SyslogError::BadStructuredData),
    };

    Ok(LogParts {
        priority,
        version,
        timestamp: nil_to_none(timestamp),
        hostname: nil_to_none(hostname),
        app_name: nil_to_none(app_name),
        proc_id: nil_to_none(proc_id),
        msg_id: nil_to_none(msg_id),
        structured_data: nil_to_none(structured_data),
        message,
    })
}

fn parse_priority(digits: &str) -> Result<u8, SyslogError> {
    // ---
    if digits.is_empty() || digits.len() > 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SyslogError::BadPriority);
    }
    match digits.parse::<u8>() {
        Ok(p) if p <= 191 => Ok(p),
        _ => Err(SyslogError::BadPriority),
    }
}

/// Split off one space-delimited header field. The remainder may be empty.
fn next_field(s: &str) -> Option<(&str, &str)> {
    // ---
    let (field, rest) = match s.split_once(' ') {
        Some((field, rest)) => (field, rest),
        None => (s, ""),
    };
    if field.is_empty() {
        return None;
    }
    Some((field, rest))
}

/// Split the STRUCTURED-DATA section (nil or `[..][..]`) from what follows.
fn split_structured_data(s: &str) -> Result<(&str, &str), SyslogError> {
    // ---
    if let Some(rest) = s.strip_prefix(NIL) {
        return Ok((NIL, rest));
    }
    if !s.starts_with('[') {
        return Err(SyslogError::BadStructuredData);
    }

    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] == b'[' {
        let mut in_quotes = false;
        i += 1;
        loop {
            match bytes.get(i) {
                None => return Err(SyslogError::UnterminatedStructuredData),
                Some(b'\\') if in_quotes => i += 2,
                Some(b'"') => {
                    in_quotes = !in_quotes;
                    i += 1;
                }
                Some(b']') if !in_quotes => {
                    i += 1;
                    break;
                }
                Some(_) => i += 1,
            }
        }
    }
    Ok((&s[..i], &s[i..]))
}

fn nil_to_none(field: &str) -> Option<&str> {
    (field != NIL).then_some(field)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    const RTL_433_LINE: &str = "<14>1 2024-01-01T00:00:00Z sdr rtl_433 - - - \
        {\"time\":\"2024-01-01 00:00:00\",\"id\":3}";

    #[test]
    fn test_parse_rtl_433_datagram() {
        // ---
        let parts = parse(RTL_433_LINE).unwrap();

        assert_eq!(parts.priority, 14);
        assert_eq!(parts.facility(), 1);
        assert_eq!(parts.severity(), 6);
        assert_eq!(parts.version, 1);
        assert_eq!(parts.timestamp, Some("2024-01-01T00:00:00Z"));
        assert_eq!(parts.hostname, Some("sdr"));
        assert_eq!(parts.app_name, Some("rtl_433"));
        assert_eq!(parts.proc_id, None);
        assert_eq!(parts.msg_id, None);
        assert_eq!(parts.structured_data, None);
        assert_eq!(parts.message, r#"{"time":"2024-01-01 00:00:00","id":3}"#);
    }

    #[test]
    fn test_trailing_newline_and_bom_stripped() {
        // ---
        let parts = parse("<14>1 - - app - - - \u{feff}hello world\n").unwrap();
        assert_eq!(parts.message, "hello world");
        assert_eq!(parts.timestamp, None);
    }

    #[test]
    fn test_structured_data_with_escapes() {
        // ---
        let line = r#"<165>1 2003-10-11T22:14:15.003Z host app 42 ID47 [ex@32473 a="x\]y" b="q\"r"][meta k="v"] body"#;
        let parts = parse(line).unwrap();

        assert_eq!(
            parts.structured_data,
            Some(r#"[ex@32473 a="x\]y" b="q\"r"][meta k="v"]"#)
        );
        assert_eq!(parts.proc_id, Some("42"));
        assert_eq!(parts.msg_id, Some("ID47"));
        assert_eq!(parts.message, "body");
    }

    #[test]
    fn test_message_is_optional() {
        // ---
        let parts = parse("<14>1 - - - - - -").unwrap();
        assert_eq!(parts.message, "");
    }

    #[test]
    fn test_malformed_datagrams() {
        // ---
        assert_eq!(parse(""), Err(SyslogError::Empty));
        assert_eq!(parse("hello"), Err(SyslogError::BadPriority));
        assert_eq!(parse("<>1 - - - - - -"), Err(SyslogError::BadPriority));
        assert_eq!(parse("<192>1 - - - - - -"), Err(SyslogError::BadPriority));
        assert_eq!(parse("<14>x - - - - - -"), Err(SyslogError::BadVersion));
        assert_eq!(parse("<14>1 - -"), Err(SyslogError::Truncated("APP-NAME")));
        assert_eq!(
            parse("<14>1 - - - - -"),
            Err(SyslogError::Truncated("STRUCTURED-DATA"))
        );
        assert_eq!(
            parse("<14>1 - - - - - [open a=\"b\""),
            Err(SyslogError::UnterminatedStructuredData)
        );
        assert_eq!(
            parse("<14>1 - - - - - {json}"),
            Err(SyslogError::BadStructuredData)
        );
    }
}
