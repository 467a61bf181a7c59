use crate::error::{RepoError, Result};

/// Namespace for canonical unit identifiers.
pub const UNITS_NS: &str = "https://w3id.org/sigmux/units#";

/// Resolve a units token the way definition texts spell them: full URIs
/// (bare or `<bracketed>`) pass through, shorthand abbreviations map to
/// canonical identifiers.
pub fn resolve(token: &str) -> Result<String> {
    let token = token.trim();
    if let Some(stripped) = token.strip_prefix('<') {
        let inner = stripped.strip_suffix('>').unwrap_or(stripped);
        return Ok(inner.to_string());
    }
    if token.contains("://") {
        return Ok(token.to_string());
    }
    lookup(token)
}

/// Map a unit abbreviation to its canonical identifier.
pub fn lookup(token: &str) -> Result<String> {
    let name = match token {
        "V" => "volt",
        "mV" => "millivolt",
        "uV" | "µV" => "microvolt",
        "Hz" => "hertz",
        "kHz" => "kilohertz",
        "s" => "second",
        "ms" => "millisecond",
        "bpm" => "beats_per_minute",
        "mmHg" => "millimetres_of_mercury",
        "degC" => "degree_celsius",
        "K" => "kelvin",
        "Pa" => "pascal",
        "kPa" => "kilopascal",
        "%" | "percent" => "percent",
        other => return Err(RepoError::UnknownUnits(other.to_string())),
    };
    Ok(format!("{UNITS_NS}{name}"))
}
