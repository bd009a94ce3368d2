use crate::error::ProtocolError;

/// Mount paths always start with a single `/` and never end with one.
pub fn normalize_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_string();
    }
    let mut out = p.to_string();
    if !out.starts_with('/') {
        out = format!("/{out}");
    }
    if out.len() > 1 {
        out = out.trim_end_matches('/').to_string();
    }
    out
}

pub(crate) fn parse_u64(value: Option<&str>, name: &'static str) -> Result<u64, ProtocolError> {
    let s = value.ok_or(ProtocolError::MissingHeader(name))?;
    s.trim()
        .parse::<u64>()
        .map_err(|_| ProtocolError::InvalidInt(name))
}

/// Upload ids are 128 bits in hex: 32 hex characters, nothing else.
pub fn is_well_formed_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
