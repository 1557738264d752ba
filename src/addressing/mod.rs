//! Gate address math
//!
//! Converts between location strings, numeric location IDs, base-N dial
//! sequences and letter-encoded sequences, and builds/parses Fully-Qualified
//! Location IDs (FQLID = `<galaxy>/<location>`).
//!
//! Digit convention: value digits are shifted up by one, so digit 0 is the
//! enter/terminator symbol. A sequence therefore carries digits in
//! `1..=NUMBERING_BASE`, optionally followed by a single trailing 0.
//! In the letter encoding the terminator renders as `a`.

mod galaxy;

pub use galaxy::Galaxy;

use serde::Serialize;
use thiserror::Error;

use crate::registry::LocationStore;

/// Symbol count of the standard gate glyph ring
pub const NUMBERING_BASE: u32 = 38;

/// Size of the gate address space (38^6)
pub const ADDRESS_SPACE: u64 = 3_010_936_384;

/// The enter key; also the trailing terminator of a complete sequence
pub const TERMINATOR: u8 = 0;

/// Chevrons on a gate; slots beyond the dialed symbols are lit silently
pub const TOTAL_CHEVRONS: usize = 9;

/// A dialed sequence normalized into an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAddress {
    /// Value digits (1-based, terminator stripped)
    pub digits: Vec<u8>,
    /// Numeric location ID the digits decode to
    pub location_id: u64,
    /// Target galaxy (source galaxy unless overridden by a leading digit)
    pub galaxy: Galaxy,
}

/// A parsed address merged with its registry entry
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAddress {
    pub location_id: u64,
    pub galaxy: Galaxy,
    /// Location string as registered
    pub location: String,
    /// Last successful connect from this endpoint, epoch milliseconds
    pub last_seen_ms: i64,
}

/// Address resolution failures.
///
/// `EmptySequence` and `MalformedAddress` are input-validation failures and
/// render with an `@` prefix; `Unregistered` is a valid address the registry
/// has no entry for and renders without one. Callers branch on the variant
/// (or the prefix, for status strings) to tell the two cases apart.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddressError {
    #[error("@empty_sequence")]
    EmptySequence,

    #[error("@malformed_address")]
    MalformedAddress,

    #[error("unregistered location {}", to_letters(&.0.digits))]
    Unregistered(ParsedAddress),
}

/// Derive the numeric location ID of a location string.
///
/// Non-cryptographic djb2-style hash reduced modulo the address space.
/// Deterministic; collisions are an accepted limitation.
pub fn location_id_of(location: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in location.bytes() {
        hash = hash.wrapping_mul(33) ^ u64::from(byte);
    }
    hash % ADDRESS_SPACE
}

/// Number of digits needed to express the full address space in `base`
pub fn required_digits(base: u32) -> usize {
    let mut digits = 0usize;
    let mut capacity: u64 = 1;
    while capacity < ADDRESS_SPACE {
        capacity = capacity.saturating_mul(u64::from(base));
        digits += 1;
    }
    digits
}

/// Decompose a location ID into a dial sequence.
///
/// Least significant digit first; each digit is offset by +1 to keep 0 free
/// for the terminator. The terminator itself is not appended here.
pub fn sequence_of(location_id: u64, base: u32) -> Vec<u8> {
    let digits = required_digits(base);
    let mut rest = location_id;
    let mut seq = Vec::with_capacity(digits);
    for _ in 0..digits {
        seq.push((rest % u64::from(base)) as u8 + 1);
        rest /= u64::from(base);
    }
    seq
}

/// Recompose a dial sequence into its location ID.
///
/// Inverse of [`sequence_of`]; digits past a terminator are ignored.
pub fn number_of(sequence: &[u8], base: u32) -> u64 {
    let mut value: u64 = 0;
    let mut weight: u64 = 1;
    for &digit in sequence {
        if digit == TERMINATOR {
            break;
        }
        value += u64::from(digit - 1) * weight;
        weight = weight.saturating_mul(u64::from(base));
    }
    value
}

/// Letter-encode a sequence: digit 0..=25 maps to `a`..`z`,
/// 26..=38 to `A`..`M`.
pub fn to_letters(sequence: &[u8]) -> String {
    sequence
        .iter()
        .map(|&digit| match digit {
            0..=25 => (b'a' + digit) as char,
            26..=38 => (b'A' + digit - 26) as char,
            _ => '?',
        })
        .collect()
}

/// Decode a letter-encoded sequence. Unrecognized characters decode to 0.
pub fn to_numbers(letters: &str) -> Vec<u8> {
    letters
        .chars()
        .map(|ch| match ch {
            'a'..='z' => ch as u8 - b'a',
            'A'..='M' => ch as u8 - b'A' + 26,
            _ => 0,
        })
        .collect()
}

/// Normalize an entered sequence into a [`ParsedAddress`].
///
/// Strips one trailing terminator, then interprets one extra leading digit
/// as an explicit galaxy override when the remainder still exceeds
/// [`required_digits`]. The final digit count must match exactly.
pub fn analyze(
    sequence: &[u8],
    base: u32,
    source_galaxy: Galaxy,
) -> Result<ParsedAddress, AddressError> {
    if sequence.is_empty() {
        return Err(AddressError::EmptySequence);
    }

    let mut digits = sequence.to_vec();
    if digits.last() == Some(&TERMINATOR) {
        digits.pop();
    }
    if digits.is_empty() {
        return Err(AddressError::EmptySequence);
    }

    let needed = required_digits(base);
    let mut galaxy = source_galaxy;
    if digits.len() > needed {
        let override_digit = digits.remove(0);
        galaxy = Galaxy::from_digit(override_digit.saturating_sub(1));
    }

    if digits.len() != needed {
        return Err(AddressError::MalformedAddress);
    }

    Ok(ParsedAddress {
        location_id: number_of(&digits, base),
        galaxy,
        digits,
    })
}

/// Analyze a dialed sequence and consult the registry for the target.
///
/// A hit merges the parsed address with the stored entry. A miss is
/// `Unregistered` (valid but unknown address, no `@` prefix).
pub async fn lookup_dialed_target(
    sequence: &[u8],
    base: u32,
    source_galaxy: Galaxy,
    store: &dyn LocationStore,
) -> Result<ResolvedAddress, AddressError> {
    let parsed = analyze(sequence, base, source_galaxy)?;

    match store.get(parsed.location_id, parsed.galaxy.digit()).await {
        Ok(entry) => Ok(ResolvedAddress {
            location_id: parsed.location_id,
            galaxy: parsed.galaxy,
            location: entry.location,
            last_seen_ms: entry.last_seen_ms,
        }),
        Err(_) => Err(AddressError::Unregistered(parsed)),
    }
}

/// Fully-Qualified Location ID: `<galaxyName>/<locationString>`
pub fn fqlid(location: &str, galaxy: Galaxy) -> String {
    format!("{}/{}", galaxy.name(), location)
}

/// Split an FQLID back into galaxy and location string
pub fn parse_fqlid(fqlid: &str) -> Option<(Galaxy, &str)> {
    let (galaxy_name, location) = fqlid.split_once('/')?;
    if location.is_empty() {
        return None;
    }
    Some((Galaxy::from_name(galaxy_name), location))
}

/// Turn a registered location into the realm-specific portal URL.
///
/// Location strings carry a `kind/` prefix (`event/...`, `space/...`);
/// the realm URL pluralizes the kind.
pub fn translate_to_url(location: &str, galaxy: Galaxy) -> Option<String> {
    let (kind, id) = location.split_once('/').unwrap_or(("space", location));
    match galaxy {
        Galaxy::Altspace => Some(format!("altspace://account.altvr.com/{kind}s/{id}")),
        Galaxy::Sansar => Some(format!("sansar://atlas.sansar.com/experiences/{id}")),
        Galaxy::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_digits() {
        assert_eq!(required_digits(38), 6);
        assert_eq!(required_digits(2), 32);
    }

    #[test]
    fn test_location_id_deterministic_and_bounded() {
        let id = location_id_of("space/home-hub");
        assert_eq!(id, location_id_of("space/home-hub"));
        assert!(id < ADDRESS_SPACE);
        assert_ne!(id, location_id_of("space/other"));
    }

    #[test]
    fn test_sequence_round_trip() {
        for location in ["space/alpha", "event/123456", "space/очень-далеко", ""] {
            let id = location_id_of(location);
            let seq = sequence_of(id, NUMBERING_BASE);
            assert_eq!(seq.len(), 6);
            assert_eq!(number_of(&seq, NUMBERING_BASE), id);
        }
    }

    // Pins down the canonical digit convention: value digits are 1-based and
    // the terminator occupies slot 0. A sibling convention with 0-based
    // digits and an implicit terminator exists in older dial computers; this
    // service deliberately does not follow it.
    #[test]
    fn test_digits_are_one_based_terminator_is_zero() {
        let seq = sequence_of(0, NUMBERING_BASE);
        assert_eq!(seq, vec![1, 1, 1, 1, 1, 1]);
        assert!(seq.iter().all(|&d| d != TERMINATOR));

        // A trailing terminator does not change the decoded value
        let mut with_term = seq.clone();
        with_term.push(TERMINATOR);
        assert_eq!(number_of(&with_term, NUMBERING_BASE), 0);
    }

    #[test]
    fn test_letters_round_trip_all_digits() {
        let all: Vec<u8> = (0..=38).collect();
        let letters = to_letters(&all);
        assert_eq!(to_numbers(&letters), all);
    }

    #[test]
    fn test_letters_known_values() {
        assert_eq!(to_letters(&[0]), "a");
        assert_eq!(to_letters(&[25]), "z");
        assert_eq!(to_letters(&[26]), "A");
        assert_eq!(to_letters(&[38]), "M");
    }

    #[test]
    fn test_unrecognized_letters_decode_to_zero() {
        assert_eq!(to_numbers("a?N9 "), vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_analyze_empty() {
        assert_eq!(
            analyze(&[], NUMBERING_BASE, Galaxy::Altspace),
            Err(AddressError::EmptySequence)
        );
        // A lone terminator strips down to nothing
        assert_eq!(
            analyze(&[TERMINATOR], NUMBERING_BASE, Galaxy::Altspace),
            Err(AddressError::EmptySequence)
        );
    }

    #[test]
    fn test_analyze_malformed_lengths() {
        assert_eq!(
            analyze(&[1, 2, 3], NUMBERING_BASE, Galaxy::Altspace),
            Err(AddressError::MalformedAddress)
        );
        assert_eq!(
            analyze(&[1; 9], NUMBERING_BASE, Galaxy::Altspace),
            Err(AddressError::MalformedAddress)
        );
    }

    #[test]
    fn test_analyze_strips_terminator() {
        let id = location_id_of("space/alpha");
        let mut seq = sequence_of(id, NUMBERING_BASE);
        seq.push(TERMINATOR);

        let parsed = analyze(&seq, NUMBERING_BASE, Galaxy::Altspace).unwrap();
        assert_eq!(parsed.location_id, id);
        assert_eq!(parsed.galaxy, Galaxy::Altspace);
    }

    #[test]
    fn test_analyze_galaxy_override() {
        let id = location_id_of("space/alpha");
        let mut seq = vec![Galaxy::Sansar.digit() + 1];
        seq.extend(sequence_of(id, NUMBERING_BASE));

        let parsed = analyze(&seq, NUMBERING_BASE, Galaxy::Altspace).unwrap();
        assert_eq!(parsed.galaxy, Galaxy::Sansar);
        assert_eq!(parsed.location_id, id);
    }

    #[test]
    fn test_error_markers() {
        assert!(AddressError::EmptySequence.to_string().starts_with('@'));
        assert!(AddressError::MalformedAddress.to_string().starts_with('@'));
        let parsed = ParsedAddress {
            digits: vec![1; 6],
            location_id: 0,
            galaxy: Galaxy::Altspace,
        };
        assert!(!AddressError::Unregistered(parsed).to_string().starts_with('@'));
    }

    #[test]
    fn test_fqlid_round_trip() {
        let id = fqlid("event/123456", Galaxy::Altspace);
        assert_eq!(id, "altspace/event/123456");
        let (galaxy, location) = parse_fqlid(&id).unwrap();
        assert_eq!(galaxy, Galaxy::Altspace);
        assert_eq!(location, "event/123456");

        assert_eq!(parse_fqlid("altspace"), None);
    }

    #[test]
    fn test_translate_to_url_pluralizes_kind() {
        assert_eq!(
            translate_to_url("event/123456", Galaxy::Altspace).unwrap(),
            "altspace://account.altvr.com/events/123456"
        );
        assert_eq!(
            translate_to_url("space/654321", Galaxy::Altspace).unwrap(),
            "altspace://account.altvr.com/spaces/654321"
        );
        assert!(translate_to_url("space/1", Galaxy::Unknown).is_none());
    }
}
