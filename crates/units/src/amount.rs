use crate::UnitError;

/// Minor units per display unit (1 token = 10^8 e8s).
pub const E8S_PER_TOKEN: u64 = 100_000_000;

/// Below this many e8s (2^26 whole tokens) every value has its own display
/// amount. Past it neighbouring e8s values can share one f64.
pub const EXACT_E8S_LIMIT: u64 = (1 << 26) * E8S_PER_TOKEN;

/// `to_minor_units(to_display_amount(e8s)) == e8s` for every `e8s` below
/// [`EXACT_E8S_LIMIT`].
pub fn to_display_amount(e8s: u64) -> f64 {
    e8s as f64 / E8S_PER_TOKEN as f64
}

/// Display amount to e8s, rounded half up to the nearest minor unit.
///
/// Works on the shortest decimal form of `display` rather than on
/// `display * 10^8`, which picks up binary rounding error for large amounts.
pub fn to_minor_units(display: f64) -> Result<u64, UnitError> {
    if !display.is_finite() {
        return Err(UnitError::NotFinite);
    }
    if display < 0.0 {
        return Err(UnitError::Negative(display));
    }
    if display == 0.0 {
        // also covers -0.0, which formats with a sign
        return Ok(0);
    }

    // f64 Display prints the shortest round-tripping digits, never an exponent
    let text = display.to_string();
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let whole: u64 = whole.parse().map_err(|_| UnitError::Overflow(display))?;

    let frac = frac.as_bytes();
    let fraction = (0..8).fold(0u64, |acc, i| {
        let digit = frac.get(i).map_or(0, |b| u64::from(b - b'0'));
        acc * 10 + digit
    });
    let round_up = frac.get(8).is_some_and(|b| *b >= b'5');

    whole
        .checked_mul(E8S_PER_TOKEN)
        .and_then(|v| v.checked_add(fraction + u64::from(round_up)))
        .ok_or(UnitError::Overflow(display))
}
