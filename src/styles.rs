//! Poetic movements, their rules, and the creative-control directives.
//!
//! Style rules keep prompts slim: instead of the whole retrieved context the
//! Poet gets a one-line metric/lexical summary for the chosen movement.
//! Directive texts are kept in Italian, as the persona prompts expect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Output language for the poem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    English,
    Italiano,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Italiano => "Italiano",
        }
    }

    /// Theme suggested when the user gives none.
    pub fn default_topic(&self) -> &'static str {
        match self {
            Language::English => "The silence of the sea",
            Language::Italiano => "Il silenzio del mare",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" | "eng" => Ok(Language::English),
            "italiano" | "italian" | "it" | "ita" => Ok(Language::Italiano),
            other => Err(AppError::Usage(format!(
                "unknown language '{other}' (expected English or Italiano)"
            ))),
        }
    }
}

pub const STYLES_ENG: [&str; 10] = [
    "Metaphysical Poetry",
    "Romantic Poetry",
    "Victorian Poetry",
    "Modernism",
    "Harlem Renaissance",
    "Beat Generation",
    "Confessional Poetry",
    "Black Arts Movement",
    "Language Poetry",
    "Spoken Word / Slam",
];

pub const STYLES_ITA: [&str; 10] = [
    "Stilnovo",
    "Petrarchismo",
    "Barocco / Marinismo",
    "Romanticismo Italiano",
    "Scapigliatura",
    "Crepuscolarismo",
    "Decadentismo",
    "Futurismo",
    "Ermetismo",
    "Neoavanguardia (Gruppo 63)",
];

/// Movements offered for `language`.
pub fn styles_for(language: Language) -> &'static [&'static str] {
    match language {
        Language::English => &STYLES_ENG,
        Language::Italiano => &STYLES_ITA,
    }
}

/// Case-insensitive lookup across both catalogs; returns the canonical name.
pub fn canonical_style(name: &str) -> Option<&'static str> {
    let wanted = name.trim().to_lowercase();
    STYLES_ENG
        .iter()
        .chain(STYLES_ITA.iter())
        .chain(std::iter::once(&"Poesia Dialettale"))
        .find(|s| s.to_lowercase() == wanted)
        .copied()
}

const GENERIC_STYLE_RULE: &str = "Follow the provided style context carefully.";
const GENERIC_REFINEMENT_RULE: &str = "Rispetta l'essenza dello stile senza normalizzarlo.";

/// Metric and lexical rules for `style`.
pub fn style_rules(style: &str) -> &'static str {
    match style {
        "Stilnovo" => "Sonetto: 14 versi, endecasillabi (11 sillabe), rime ABAB ABAB CDC DCD. Tono elevato, lessico: gentile, onesto, salute.",
        "Petrarchismo" => "Sonetto: 14 versi, endecasillabi, rime ABBA ABBA CDC DCD. Antitesi (ghiaccio/fuoco), lessico: lume, sospiri.",
        "Barocco / Marinismo" => "Endecasillabi, metafora estesa (concetto), iperbole, stupore, lessico prezioso ed esotico.",
        "Romanticismo Italiano" => "Endecasillabi e settenari mescolati, canzone libera, personificazione natura, lessico vago.",
        "Scapigliatura" => "Metro tradizionale usato con ironia, ribellione, dualismo, lessico del brutto e del vizio.",
        "Decadentismo" => "Endecasillabi musicali, sinestesia, lessico raro (glauco, iridescente), tono languido e aristocratico.",
        "Crepuscolarismo" => "Misto (11, 7, 9 sillabe), tono dimesso e prosastico, lessico quotidiano e piccolo, ironia.",
        "Futurismo" => "Parole in libertà, NO punteggiatura, verbi all'infinito, onomatopee inventate, layout spaziale.",
        "Ermetismo" => "Versi brevissimi (frammento), analogia (A=C), spazio bianco come significato. NO spiegazioni.",
        "Neoavanguardia (Gruppo 63)" => "Collage, montaggio, sintassi spezzata, plurilinguismo, NO lirismo, disordine costruito.",
        "Poesia Dialettale" => "Dialetto autentico, oralità, ritmi popolari, proverbi, verità quotidiana.",
        "Metaphysical Poetry" => "Iambic pentameter, conceit (paradoxical metaphor), logical progression, abrupt opening.",
        "Romantic Poetry" => "Iambic pentameter or blank verse, sublime, nature as mirror of soul, elevated tone.",
        "Victorian Poetry" => "Iambic pentameter, dramatic monologue, moral seriousness, doubt and loss.",
        "Modernism" => "Free verse (remembers tradition), fragment, montage, juxtaposition, difficult tone.",
        "Harlem Renaissance" => "Jazz rhythms, blues structures (AAB), vernacular, pride and double consciousness.",
        "Beat Generation" => "Breath line, Whitman-like long lines, accumulation, jazz slang, spontaneity.",
        "Confessional Poetry" => "Traditional form + extreme taboo content, intimate and brutal 'I' exposed.",
        "Black Arts Movement" => "Oral, performative, revolutionary, call and response, militant, African references.",
        "Language Poetry" => "New Sentence, language as subject, anti-expressive, experimental, no narrative.",
        "Spoken Word / Slam" => "Oral performance, build to climax, direct address, memorable closing line.",
        _ => GENERIC_STYLE_RULE,
    }
}

/// Guidance that stops the Refiner from normalising a deliberately broken style.
pub fn refinement_rules(style: &str) -> &'static str {
    match style {
        "Neoavanguardia (Gruppo 63)" => "MANTIENI la frammentazione e la sintassi spezzata. NON aggiungere lirismo o 'bella scrittura'. Il disordine deve essere costruito.",
        "Futurismo" => "MANTIENI l'assenza di punteggiatura e il layout spaziale. NON rendere il testo lineare o 'corretto'.",
        "Ermetismo" => "MANTIENI la brevità estrema. Riduci all'osso, non aggiungere spiegazioni.",
        "Petrarchismo" => "MIGLIORA la metrica (11 sillabe) e la musicalità. Bilancia le antitesi.",
        "Stilnovo" => "MIGLIORA la fluidità dell'endecasillabo. Usa lessico spirituale e gentile.",
        _ => GENERIC_REFINEMENT_RULE,
    }
}

/// Slider values steering how daring the personas are. Each lies in `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeControls {
    /// How strictly to follow the style rules.
    pub adherence: u8,
    /// Higher values increase creativity (and chaos).
    pub originality: u8,
    /// Vocabulary richness and structural density.
    pub complexity: u8,
}

impl Default for CreativeControls {
    fn default() -> Self {
        Self { adherence: 8, originality: 6, complexity: 7 }
    }
}

impl CreativeControls {
    pub fn new(adherence: u8, originality: u8, complexity: u8) -> Result<Self, AppError> {
        for (name, value) in [
            ("adherence", adherence),
            ("originality", originality),
            ("complexity", complexity),
        ] {
            if !(1..=10).contains(&value) {
                return Err(AppError::Usage(format!("{name} must be within 1..=10, got {value}")));
            }
        }
        Ok(Self { adherence, originality, complexity })
    }
}

/// Directives for the Poet.
pub fn draft_directives(c: &CreativeControls) -> String {
    let mut directives = Vec::new();
    if c.originality > 7 {
        directives.push("🔥 ORIGINALITÀ MASSIMA: Evita ogni cliché. Distruggi le associazioni ovvie. Cercare immagini e parole UNICHE per descrivere il tema.");
    } else if c.originality < 4 {
        directives.push("📜 CLASSICISMO: Mantieni un tono misurato e tradizionale.");
    }
    if c.complexity > 7 {
        directives.push("🧠 COMPLESSITÀ ELEVATA: Usa un lessico ricercato e simbolismi stratificati.");
    }
    if c.adherence > 8 {
        directives.push("⚖️ RIGORE STILISTICO: Segui le regole metriche dello stile come un dogma.");
    }
    directives.join("\n")
}

/// Directives for the Refiner.
pub fn refinement_directives(c: &CreativeControls) -> String {
    let mut directives = Vec::new();
    if c.originality > 7 {
        directives.push("🔥 REVISIONE AUDACE: Se la bozza è banale, stravolgila. Cerca immagini che colpiscano, evita ogni espressione trita o 'scolastica'.");
    }
    if c.complexity > 7 {
        directives.push("🧠 RAFFINATEZZA: Eleva il lessico. Sostituisci concetti semplici con metafore più dense e stratificate.");
    }
    if c.adherence > 8 {
        directives.push("⚖️ PRECISIONE: Assicurati che ogni verso rispetti millimetricamente i canoni dello stile.");
    }
    directives.join("\n")
}
