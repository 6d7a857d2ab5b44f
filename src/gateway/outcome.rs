//! Reservation outcome read from a call transcript.

use regex::Regex;
use std::sync::LazyLock;

static CONFIRMED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:is genoteerd|staat genoteerd|is gereserveerd|hebben gereserveerd|tot dan|we zien u|zie ik u|bevestig\w*|is gelukt|prima|perfect|uitstekend|tafel voor u|tafeltje voor)\b",
    )
    .expect("valid confirmation regex")
});

static REJECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:vol|volgeboekt|geen plek|geen plaats|niet mogelijk|helaas niet|gesloten|dicht)\b",
    )
    .expect("valid rejection regex")
});

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:reserveringsnummer|bevestigingsnummer|nummer|code)(?:\s+is)?[:\s]+([A-Z0-9\-]*\d[A-Z0-9\-]*)")
        .expect("valid number regex")
});

static ALTERNATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:wel plek|wel plaats|wel een tafel|alternatief|we hebben nog)\s*(?:om|op|voor|is)?\s*([^.?!\n]+)")
        .expect("valid alternative regex")
});

/// What a reservation call achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub reservation_confirmed: bool,
    pub confirmation_number: Option<String>,
    pub alternative_offered: Option<String>,
    pub summary: String,
}

/// Classify a transcript. A rejection phrase wins over a confirmation phrase
/// unless a confirmation number was given.
pub fn analyze_transcript(transcript: &str) -> CallOutcome {
    let confirmed = CONFIRMED_RE.is_match(transcript);
    let rejected = REJECTED_RE.is_match(transcript);
    let confirmation_number = NUMBER_RE
        .captures(transcript)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_uppercase());
    let alternative_offered = ALTERNATIVE_RE
        .captures(transcript)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    let reservation_confirmed = confirmed && (!rejected || confirmation_number.is_some());

    let summary = if reservation_confirmed {
        match &confirmation_number {
            Some(nr) => format!("Reservering bevestigd (#{nr})"),
            None => "Reservering bevestigd".to_string(),
        }
    } else if rejected {
        match &alternative_offered {
            Some(alt) => format!(
                "Restaurant was vol of kon niet reserveren. Alternatief aangeboden: {alt}"
            ),
            None => "Restaurant was vol of kon niet reserveren.".to_string(),
        }
    } else {
        "Gesprek gevoerd, uitkomst onduidelijk".to_string()
    };

    CallOutcome {
        reservation_confirmed,
        confirmation_number,
        alternative_offered,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmed_with_number() {
        let outcome = analyze_transcript(
            "Restaurant: Dat is genoteerd, uw reserveringsnummer is kas-4821. Tot dan!",
        );
        assert!(outcome.reservation_confirmed);
        assert_eq!(outcome.confirmation_number.as_deref(), Some("KAS-4821"));
        assert_eq!(outcome.summary, "Reservering bevestigd (#KAS-4821)");
    }

    #[test]
    fn test_rejected_with_alternative() {
        let outcome = analyze_transcript(
            "Restaurant: Helaas, vrijdag zijn we volgeboekt. We hebben nog om 21:30 een tafel.",
        );
        assert!(!outcome.reservation_confirmed);
        assert_eq!(outcome.alternative_offered.as_deref(), Some("21:30 een tafel"));
        assert!(outcome.summary.starts_with("Restaurant was vol"));
        assert!(outcome.summary.contains("21:30"));
    }

    #[test]
    fn test_unclear_outcome() {
        let outcome = analyze_transcript("Restaurant: Moment, ik verbind u door.");
        assert!(!outcome.reservation_confirmed);
        assert_eq!(outcome.summary, "Gesprek gevoerd, uitkomst onduidelijk");
    }

    #[test]
    fn test_word_boundaries() {
        // "volgende" and "dichtbij" must not read as a rejection.
        let outcome = analyze_transcript("De volgende keer zitten we dichtbij het raam. Perfect.");
        assert!(outcome.reservation_confirmed);
    }
}
