//! Opening line and behaviour prompt for outbound calls.

use belt_core::intent::{slot, Entities};

/// Dutch greeting for the hour of day (0-23).
pub fn greeting(hour: u32) -> &'static str {
    match hour {
        6..=11 => "Goedemorgen",
        12..=17 => "Goedemiddag",
        _ => "Goedenavond",
    }
}

/// First sentence the voice assistant speaks.
pub fn opening_line(task: &str, hour: u32) -> String {
    let greeting = greeting(hour);
    let lowered = task.to_lowercase();
    let reason = if lowered.contains("open") {
        "Ik bel met een korte vraag over uw openingstijden."
    } else if lowered.contains("reserv") || lowered.contains("tafel") {
        "Ik bel om een tafel te reserveren."
    } else {
        "Ik bel met een korte vraag."
    };
    format!("{greeting}, u spreekt met de digitale assistent van Connect Smart. {reason}")
}

/// Instructions for the voice assistant carrying out the call.
pub fn behavior_prompt(task: &str, entities: &Entities) -> String {
    let mut details = Vec::new();
    for (label, key) in [
        ("Restaurant of bedrijf", slot::VENUE),
        ("Contactpersoon", slot::CONTACT_NAME),
        ("Datum", slot::DATE),
        ("Tijd", slot::TIME),
        ("Aantal personen", slot::PARTY_SIZE),
    ] {
        if let Some(value) = entities.get(key) {
            details.push(format!("- {label}: {value}"));
        }
    }
    let details = if details.is_empty() {
        String::new()
    } else {
        format!("\n\nBekende gegevens:\n{}", details.join("\n"))
    };

    format!(
        "Je bent een beleefde Nederlandstalige telefoonassistent die belt namens een klant.\n\
         Doel van dit gesprek: {task}{details}\n\n\
         Houd het gesprek kort en vriendelijk. Vraag door als iets onduidelijk is. \
         Als er iets wordt vastgelegd, herhaal de afspraak en vraag naar een \
         bevestigings- of reserveringsnummer. Wordt het verzoek geweigerd, vraag dan \
         naar een alternatief. Sluit het gesprek beleefd af zodra het doel bereikt is."
    )
}
