use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use globwalk::GlobWalkerBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Sentinel for a feature never observed in a group.
pub const NOT_DETECTED: &str = "not_detected";

// Matches nothing; stands in for an empty word list.
const NEVER: &str = r"\b\B";

// =============================
// Normalizer
// =============================

/// Canonicalize a raw sample before any pattern matching.
/// - absent input becomes the empty string
/// - NFKC, non-breaking spaces turned into plain spaces, outer whitespace trimmed
pub fn normalize(raw: Option<&str>) -> String {
    let Some(text) = raw else {
        return String::new();
    };
    let folded: String = text.nfkc().collect();
    folded.replace('\u{00A0}', " ").trim().to_string()
}

// =============================
// Lexicons
// =============================

/// Word lists for one language.
#[derive(Debug, Clone, Copy)]
pub struct LocaleLexicon {
    pub code: &'static str,
    pub number_words: &'static [&'static str],
    /// Cardinals that double as indefinite articles.
    pub ambiguous_number_words: &'static [&'static str],
    pub ordinal_words: &'static [&'static str],
    pub unit_long: &'static [&'static str],
    pub month_words: &'static [&'static str],
    pub percent_words: &'static [&'static str],
}

pub const FRENCH: LocaleLexicon = LocaleLexicon {
    code: "fr",
    number_words: &[
        "deux", "trois", "quatre", "cinq", "six", "sept", "huit", "neuf", "dix", "onze", "douze", "treize",
        "quatorze", "quinze", "seize", "vingt", "trente", "quarante", "cinquante", "soixante", "cent", "mille",
        "million", "millions", "milliard", "milliards",
    ],
    ambiguous_number_words: &["un"],
    ordinal_words: &[
        "premier", "deuxième", "troisième", "quatrième", "cinquième", "sixième", "septième", "huitième",
        "neuvième", "dixième", "onzième", "douzième", "treizième", "quatorzième", "quinzième", "seizième",
        "vingtième", "trentième", "quarantième", "cinquantième", "soixantième", "centième", "millième",
    ],
    unit_long: &[
        "kilomètre", "kilometre", "mètre", "metre", "centimètre", "millimètre", "gramme", "kilogramme",
        "hectogramme", "milligramme", "litre", "millilitre", "centilitre", "hectolitre", "seconde", "minute",
        "heure", "degré celsius",
    ],
    month_words: &[
        "janvier", "février", "fevrier", "mars", "avril", "mai", "juin", "juillet", "août", "aout", "septembre",
        "octobre", "novembre", "décembre", "decembre",
    ],
    percent_words: &["pour cent"],
};

pub const SPANISH: LocaleLexicon = LocaleLexicon {
    code: "es",
    number_words: &[
        "dos", "tres", "cuatro", "cinco", "seis", "siete", "ocho", "nueve", "diez", "once", "doce", "trece",
        "catorce", "quince", "dieciséis", "diecisiete", "dieciocho", "diecinueve", "veinte", "veintiuno",
        "veintidós", "veintitrés", "veinticuatro", "veinticinco", "veintiséis", "veintisiete", "veintiocho",
        "veintinueve", "treinta", "cuarenta", "cincuenta", "cien", "mil", "millón", "millones", "millardo",
        "millardos", "mil millones", "billón", "billones",
    ],
    ambiguous_number_words: &["uno"],
    ordinal_words: &[
        "primero", "segundo", "tercero", "cuarto", "quinto", "sexto", "séptimo", "octavo", "noveno", "décimo",
        "undécimo", "duodécimo", "decimotercero", "decimocuarto", "decimoquinto", "vigesimo", "trigesimo",
        "cuadragesimo", "quincuagesimo", "centesimo", "milesimo",
    ],
    unit_long: &[
        "kilómetro", "metro", "centimetro", "centímetro", "milimetro", "milímetro", "gramo", "kilogramo",
        "hectogramo", "miligramo", "litro", "mililitro", "centilitro", "hectolitro", "segundo", "minuto", "hora",
        "grado celsius",
    ],
    month_words: &[
        "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre", "octubre",
        "noviembre", "diciembre",
    ],
    percent_words: &["por ciento"],
};

pub const PORTUGUESE: LocaleLexicon = LocaleLexicon {
    code: "pt",
    number_words: &[
        "dois", "três", "quatro", "cinco", "seis", "sete", "oito", "nove", "dez", "onze", "doze", "treze",
        "catorze", "quinze", "vinte", "trinta", "quarenta", "cinquenta", "cem", "mil", "milhão", "milhões",
        "bilhão", "bilhões",
    ],
    ambiguous_number_words: &["um"],
    ordinal_words: &[
        "primeiro", "segundo", "terceiro", "quarto", "quinto", "sexto", "sétimo", "oitavo", "nono", "décimo",
        "décimo primeiro", "décimo segundo", "vigésimo", "trigésimo", "quadragésimo", "quinquagésimo",
        "centésimo", "milésimo",
    ],
    unit_long: &[
        "quilómetro", "metro", "centímetro", "milímetro", "grama", "quilograma", "hectograma", "miligrama",
        "litro", "mililitro", "centilitro", "hectolitro", "segundo", "minuto", "hora", "grau celsius",
    ],
    month_words: &[
        "janeiro", "fevereiro", "março", "marco", "abril", "maio", "junho", "julho", "agosto", "setembro",
        "outubro", "novembro", "dezembro",
    ],
    percent_words: &["por cento"],
};

pub const GERMAN: LocaleLexicon = LocaleLexicon {
    code: "de",
    number_words: &[
        "eins", "zwei", "drei", "vier", "fünf", "sechs", "sieben", "acht", "neun", "zehn", "elf", "zwölf",
        "dreizehn", "vierzehn", "fünfzehn", "sechzehn", "zwanzig", "dreißig", "vierzig", "fünfzig", "hundert",
        "tausend", "million", "millionen", "milliarde", "milliarden", "billion", "billionen",
    ],
    ambiguous_number_words: &[],
    ordinal_words: &[
        "erste", "zweite", "dritte", "vierte", "fünfte", "sechste", "siebte", "achte", "neunte", "zehnte",
        "elfte", "zwölfte", "dreizehnte", "vierzehnte", "fünfzehnte", "sechzehnte", "zwanzigste", "dreißigste",
        "vierzigste", "fünfzigste", "hundertste", "tausendste",
    ],
    unit_long: &[
        "kilometer", "meter", "zentimeter", "millimeter", "gram", "kilogram", "hektogramm", "milligramm", "liter",
        "milliliter", "zentiliter", "hektoliter", "sekunde", "stunde", "grad celsius",
    ],
    month_words: &[
        "januar", "februar", "märz", "maerz", "april", "mai", "juni", "juli", "august", "september", "oktober",
        "november", "dezember",
    ],
    percent_words: &["prozent"],
};

pub const LOCALES: &[LocaleLexicon] = &[FRENCH, SPANISH, PORTUGUESE, GERMAN];

const CURRENCY_WORDS: &[&str] = &[
    "euro", "euros", "dollar", "dollars", "dólar", "dólares", "livre", "livres", "libra", "libras", "pfund", "yen",
    "yens", "yenes", "iene", "ienes", "yuan", "yuans", "yuanes", "franc", "francs", "franco", "francos", "franken",
    "rouble", "roubles", "peso", "pesos", "real", "reais", "reales", "sol", "soles", "quetzal", "quetzales",
    "colón", "colones", "bolívar", "bolívares",
];
const CURRENCY_SYMBOLS: &[&str] = &["€", "$", "£", "¥", "₹", "₽", "₺", "¢", "₩"];
const UNIT_SHORT: &[&str] = &["km", "m", "cm", "mm", "kg", "hg", "g", "mg", "l", "ml", "h", "min", "s", "°c"];
// English and language-neutral long unit names seen in every locale's output.
const UNIT_LONG_SHARED: &[&str] = &["second", "hour", "celsius"];
const ORDINAL_SUFFIXES: &[&str] = &["er", "re", "ère", "ème", "e", "º", "ª", "th", "st", "nd", "rd"];
const HESITATIONS: &[&str] = &["euh", "eh", "ehm", "hmm", "hm", "ah", "uh", "um", "äh", "mmm"];

/// Merged, read-only word lists the detector compiles its matchers from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexicon {
    pub number_words: Vec<String>,
    pub ambiguous_number_words: Vec<String>,
    pub ordinal_words: Vec<String>,
    pub ordinal_suffixes: Vec<String>,
    pub currency_words: Vec<String>,
    pub currency_symbols: Vec<String>,
    pub unit_short: Vec<String>,
    pub unit_long: Vec<String>,
    pub month_words: Vec<String>,
    pub percent_words: Vec<String>,
    pub hesitations: Vec<String>,
}

impl Lexicon {
    /// French, Spanish, Portuguese and German merged together.
    pub fn multilingual() -> Self {
        Self::from_locales(LOCALES)
    }

    pub fn from_locales(locales: &[LocaleLexicon]) -> Self {
        let mut unit_long = merged(locales, |l| l.unit_long);
        unit_long.extend(owned(UNIT_LONG_SHARED));

        Lexicon {
            number_words: merged(locales, |l| l.number_words),
            ambiguous_number_words: merged(locales, |l| l.ambiguous_number_words),
            ordinal_words: merged(locales, |l| l.ordinal_words),
            ordinal_suffixes: owned(ORDINAL_SUFFIXES),
            currency_words: owned(CURRENCY_WORDS),
            currency_symbols: owned(CURRENCY_SYMBOLS),
            unit_short: owned(UNIT_SHORT),
            unit_long,
            month_words: merged(locales, |l| l.month_words),
            percent_words: merged(locales, |l| l.percent_words),
            hesitations: owned(HESITATIONS),
        }
    }
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Union of one list across locales, deduplicated and sorted.
fn merged(locales: &[LocaleLexicon], pick: fn(&LocaleLexicon) -> &'static [&'static str]) -> Vec<String> {
    let set: BTreeSet<&str> = locales.iter().flat_map(|l| pick(l).iter().copied()).collect();
    set.into_iter().map(str::to_string).collect()
}

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Invalid pattern for {rule}: {message}")]
    Pattern { rule: &'static str, message: String },
}

/// Regex alternation of escaped words, longest first so multi-word entries win.
fn alternation(words: &[String]) -> String {
    let mut sorted: Vec<&str> = words.iter().map(|w| w.as_str()).filter(|w| !w.is_empty()).collect();
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
    sorted.dedup();
    if sorted.is_empty() {
        return NEVER.to_string();
    }
    sorted.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|")
}

/// Each letter of the base may repeat: "euh" admits "euuuh", "eeuhhh".
fn stretched(base: &str) -> String {
    base.chars().map(|c| format!("{}+", regex::escape(&c.to_string()))).collect()
}

fn compile(rule: &'static str, pattern: &str) -> Result<Regex, LexiconError> {
    Regex::new(pattern).map_err(|e| LexiconError::Pattern { rule, message: e.to_string() })
}

// =============================
// Features
// =============================

macro_rules! convention {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

convention!(PercentMode {
    SymbolSpace => "symbol_space",
    SymbolNoSpace => "symbol_no_space",
    Word => "word",
});

convention!(CurrencyMode {
    Symbol => "symbol",
    Word => "word",
});

convention!(ThousandSepMode {
    Space => "space",
    Dot => "dot",
    Comma => "comma",
});

convention!(UnitMode {
    Short => "short",
    Long => "long",
});

convention!(OrdinalStyle {
    DigitSuffix => "digit_suffix",
    Word => "word",
});

convention!(NumberStyle {
    Digit => "digit",
    Word => "word",
});

convention!(
    /// Declaration order is the tie-break order when counts are equal.
    DateFormat {
        DdMmYyyy => "dd/mm/yyyy",
        YyyyMmDd => "yyyy-mm-dd",
        DdMonthYyyy => "dd_month_yyyy",
    }
);

/// Categorical features, named after their summary table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "currency_format")]
    Currency,
    #[serde(rename = "date_format")]
    Date,
    #[serde(rename = "thousand_separator_format")]
    ThousandSeparator,
    #[serde(rename = "percent_format")]
    Percent,
    #[serde(rename = "unit_format")]
    Unit,
    #[serde(rename = "ordinal_style")]
    Ordinal,
    #[serde(rename = "number_style")]
    Number,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::Currency,
        Feature::Date,
        Feature::ThousandSeparator,
        Feature::Percent,
        Feature::Unit,
        Feature::Ordinal,
        Feature::Number,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Feature::Currency => "currency_format",
            Feature::Date => "date_format",
            Feature::ThousandSeparator => "thousand_separator_format",
            Feature::Percent => "percent_format",
            Feature::Unit => "unit_format",
            Feature::Ordinal => "ordinal_style",
            Feature::Number => "number_style",
        }
    }

    pub fn share_column(self) -> &'static str {
        match self {
            Feature::Currency => "currency_majority_pct",
            Feature::Date => "date_majority_pct",
            Feature::ThousandSeparator => "thousand_separator_majority_pct",
            Feature::Percent => "percent_majority_pct",
            Feature::Unit => "unit_majority_pct",
            Feature::Ordinal => "ordinal_majority_pct",
            Feature::Number => "number_majority_pct",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Feature {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.column() == s)
            .ok_or_else(|| ResolveError::UnknownFeature(s.to_string()))
    }
}

/// Formatting observations for a single sample. `None` means no instance seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub percent_mode: Option<PercentMode>,
    pub currency_mode: Option<CurrencyMode>,
    pub thousand_sep_mode: Option<ThousandSepMode>,
    pub unit_mode: Option<UnitMode>,
    pub ordinal_style: Option<OrdinalStyle>,
    pub number_style: Option<NumberStyle>,
    pub date_format: Option<DateFormat>,
    pub hesitation_plain: bool,
    pub punctuation: bool,
    pub uppercase: f64,
    /// Article-or-numeral tokens ("un", "uno", "um"). Left unclassified.
    pub ambiguous_numerals: usize,
}

impl FeatureRecord {
    pub fn convention(&self, feature: Feature) -> Option<&'static str> {
        match feature {
            Feature::Currency => self.currency_mode.map(CurrencyMode::label),
            Feature::Date => self.date_format.map(DateFormat::label),
            Feature::ThousandSeparator => self.thousand_sep_mode.map(ThousandSepMode::label),
            Feature::Percent => self.percent_mode.map(PercentMode::label),
            Feature::Unit => self.unit_mode.map(UnitMode::label),
            Feature::Ordinal => self.ordinal_style.map(OrdinalStyle::label),
            Feature::Number => self.number_style.map(NumberStyle::label),
        }
    }
}

// =============================
// Detector
// =============================

/// One entry of a priority table: if `pattern` matches, the feature takes `tag`.
#[derive(Debug, Clone)]
struct Rule<T> {
    tag: T,
    pattern: Regex,
}

impl<T: Copy> Rule<T> {
    fn new(tag: T, rule: &'static str, pattern: &str) -> Result<Self, LexiconError> {
        Ok(Rule { tag, pattern: compile(rule, pattern)? })
    }
}

/// First rule in table order whose pattern matches.
fn first_match<T: Copy>(rules: &[Rule<T>], text: &str) -> Option<T> {
    rules.iter().find(|r| r.pattern.is_match(text)).map(|r| r.tag)
}

/// Rule with the most occurrences; equal counts go to the earlier rule.
fn most_frequent<T: Copy>(rules: &[Rule<T>], text: &str) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    for rule in rules {
        let count = rule.pattern.find_iter(text).count();
        if count > 0 && best.map_or(true, |(_, c)| count > c) {
            best = Some((rule.tag, count));
        }
    }
    best.map(|(tag, _)| tag)
}

/// Fraction of alphabetic characters that are uppercase; 0 without letters.
pub fn uppercase_ratio(text: &str) -> f64 {
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(l, u), c| (l + 1, u + usize::from(c.is_uppercase())));
    if letters == 0 {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}

fn number_style(digits: usize, words: usize) -> Option<NumberStyle> {
    match (digits, words) {
        (0, 0) => None,
        (d, w) if d >= w => Some(NumberStyle::Digit),
        _ => Some(NumberStyle::Word),
    }
}

/// Compiled matchers for every feature. Immutable once built.
#[derive(Debug, Clone)]
pub struct Detector {
    percent: Vec<Rule<PercentMode>>,
    currency: Vec<Rule<CurrencyMode>>,
    thousand_sep: Vec<Rule<ThousandSepMode>>,
    unit: Vec<Rule<UnitMode>>,
    ordinal: Vec<Rule<OrdinalStyle>>,
    dates: Vec<Rule<DateFormat>>,
    digits: Regex,
    number_words: Regex,
    ambiguous_numbers: Regex,
    hesitation: Regex,
    punctuation: Regex,
}

impl Detector {
    pub fn new(lexicon: &Lexicon) -> Result<Self, LexiconError> {
        let numbers = alternation(&lexicon.number_words);
        // short units and currency words only count right after an amount
        let quantity = format!(r"(?:\d+(?:[.,]\d+)?\s*|\b(?:{})\s+)", numbers);

        let percent = vec![
            Rule::new(PercentMode::SymbolSpace, "percent_symbol_space", r"\d+ %")?,
            Rule::new(PercentMode::SymbolNoSpace, "percent_symbol_no_space", r"\d+%")?,
            Rule::new(
                PercentMode::Word,
                "percent_word",
                &format!(r"(?i)\b(?:{})\b", alternation(&lexicon.percent_words)),
            )?,
        ];

        let currency = vec![
            Rule::new(
                CurrencyMode::Symbol,
                "currency_symbol",
                &format!("(?:{})", alternation(&lexicon.currency_symbols)),
            )?,
            Rule::new(
                CurrencyMode::Word,
                "currency_word",
                &format!(r"(?i){}(?:{})\b", quantity, alternation(&lexicon.currency_words)),
            )?,
        ];

        let thousand_sep = vec![
            Rule::new(ThousandSepMode::Space, "thousand_space", r"\b\d{1,3}(?: \d{3})+\b")?,
            Rule::new(ThousandSepMode::Dot, "thousand_dot", r"\b\d{1,3}(?:\.\d{3})+\b")?,
            Rule::new(ThousandSepMode::Comma, "thousand_comma", r"\b\d{1,3}(?:,\d{3})+\b")?,
        ];

        let unit = vec![
            Rule::new(
                UnitMode::Short,
                "unit_short",
                &format!(r"(?i){}(?:{})\b", quantity, alternation(&lexicon.unit_short)),
            )?,
            Rule::new(
                UnitMode::Long,
                "unit_long",
                &format!(r"(?i)\b(?:{})(?:s|es|en)?\b", alternation(&lexicon.unit_long)),
            )?,
        ];

        let ordinal = vec![
            Rule::new(
                OrdinalStyle::DigitSuffix,
                "ordinal_digit",
                &format!(r"(?i)\d+(?:{})\b", alternation(&lexicon.ordinal_suffixes)),
            )?,
            Rule::new(
                OrdinalStyle::Word,
                "ordinal_word",
                &format!(r"(?i)\b(?:{})(?:es|as|er|e|s|a)?\b", alternation(&lexicon.ordinal_words)),
            )?,
        ];

        let day = r"(?:0?[1-9]|[12][0-9]|3[01])";
        let dates = vec![
            Rule::new(
                DateFormat::DdMmYyyy,
                "date_dd_mm_yyyy",
                &format!(r"\b{}[/.](?:0?[1-9]|1[0-2])[/.]\d{{4}}\b", day),
            )?,
            Rule::new(
                DateFormat::YyyyMmDd,
                "date_yyyy_mm_dd",
                r"\b\d{4}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12][0-9]|3[01])\b",
            )?,
            Rule::new(
                DateFormat::DdMonthYyyy,
                "date_dd_month_yyyy",
                &format!(r"(?i)\b{}\s+(?:{})\s+\d{{4}}\b", day, alternation(&lexicon.month_words)),
            )?,
        ];

        let hesitation = if lexicon.hesitations.is_empty() {
            NEVER.to_string()
        } else {
            let bases: Vec<String> = lexicon.hesitations.iter().map(|h| stretched(h)).collect();
            format!(r"(?i)\b(?:{})\b", bases.join("|"))
        };

        Ok(Detector {
            percent,
            currency,
            thousand_sep,
            unit,
            ordinal,
            dates,
            digits: compile("digits", r"\d+")?,
            number_words: compile("number_words", &format!(r"(?i)\b(?:{})\b", numbers))?,
            ambiguous_numbers: compile(
                "ambiguous_numbers",
                &format!(r"(?i)\b(?:{})\b", alternation(&lexicon.ambiguous_number_words)),
            )?,
            hesitation: compile("hesitation", &hesitation)?,
            punctuation: compile("punctuation", r"[,;:!?\-_.]")?,
        })
    }

    pub fn multilingual() -> Result<Self, LexiconError> {
        Detector::new(&Lexicon::multilingual())
    }

    /// Classify one sample. Total: any input, including "", yields a full record.
    /// The sample is normalized first, so raw text is accepted.
    pub fn detect(&self, sample: &str) -> FeatureRecord {
        let text = normalize(Some(sample));
        let digit_count = self.digits.find_iter(&text).count();
        let word_count = self.number_words.find_iter(&text).count();

        FeatureRecord {
            percent_mode: first_match(&self.percent, &text),
            currency_mode: first_match(&self.currency, &text),
            thousand_sep_mode: first_match(&self.thousand_sep, &text),
            unit_mode: first_match(&self.unit, &text),
            ordinal_style: first_match(&self.ordinal, &text),
            number_style: number_style(digit_count, word_count),
            date_format: most_frequent(&self.dates, &text),
            hesitation_plain: self.hesitation.is_match(&text),
            punctuation: self.punctuation.is_match(&text),
            uppercase: uppercase_ratio(&text),
            ambiguous_numerals: self.ambiguous_numbers.find_iter(&text).count(),
        }
    }
}

static DEFAULT_DETECTOR: Lazy<Detector> =
    Lazy::new(|| Detector::multilingual().expect("built-in lexicon compiles"));

/// Detect with the built-in multilingual lexicon.
pub fn detect(sample: &str) -> FeatureRecord {
    DEFAULT_DETECTOR.detect(sample)
}

// =============================
// Aggregator
// =============================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Majority {
    pub value: String,
    pub share: f64,
}

impl Majority {
    pub fn not_detected() -> Self {
        Majority { value: NOT_DETECTED.to_string(), share: 0.0 }
    }

    pub fn is_detected(&self) -> bool {
        self.value != NOT_DETECTED
    }
}

/// Most frequent present observation and its share of all present observations.
/// Equal counts go to the value encountered first.
pub fn majority<'a, I>(observations: I) -> Majority
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts: Vec<(&'a str, usize)> = Vec::new();
    let mut present = 0usize;
    for value in observations.into_iter().flatten() {
        present += 1;
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, c)) => *c += 1,
            None => counts.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for &(value, count) in &counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    match best {
        Some((value, count)) => Majority { value: value.to_string(), share: count as f64 / present as f64 },
        None => Majority::not_detected(),
    }
}

fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn not_detected() -> String {
    NOT_DETECTED.to_string()
}

/// One aggregated (file, model) group; column names match the persisted CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConventionSummaryRow {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub model: String,

    #[serde(default = "not_detected")]
    pub currency_format: String,
    #[serde(default = "not_detected")]
    pub date_format: String,
    #[serde(default = "not_detected")]
    pub thousand_separator_format: String,
    #[serde(default = "not_detected")]
    pub percent_format: String,
    #[serde(default = "not_detected")]
    pub unit_format: String,
    #[serde(default = "not_detected")]
    pub ordinal_style: String,
    #[serde(default = "not_detected")]
    pub number_style: String,

    #[serde(default)]
    pub currency_majority_pct: f64,
    #[serde(default)]
    pub date_majority_pct: f64,
    #[serde(default)]
    pub thousand_separator_majority_pct: f64,
    #[serde(default)]
    pub percent_majority_pct: f64,
    #[serde(default)]
    pub unit_majority_pct: f64,
    #[serde(default)]
    pub ordinal_majority_pct: f64,
    #[serde(default)]
    pub number_majority_pct: f64,

    #[serde(default)]
    pub uppercase_frequency: f64,
    #[serde(default)]
    pub punctuation_frequency: f64,
    #[serde(default)]
    pub hesitation_frequency: f64,
}

impl Default for ConventionSummaryRow {
    fn default() -> Self {
        ConventionSummaryRow {
            file: String::new(),
            model: String::new(),
            currency_format: not_detected(),
            date_format: not_detected(),
            thousand_separator_format: not_detected(),
            percent_format: not_detected(),
            unit_format: not_detected(),
            ordinal_style: not_detected(),
            number_style: not_detected(),
            currency_majority_pct: 0.0,
            date_majority_pct: 0.0,
            thousand_separator_majority_pct: 0.0,
            percent_majority_pct: 0.0,
            unit_majority_pct: 0.0,
            ordinal_majority_pct: 0.0,
            number_majority_pct: 0.0,
            uppercase_frequency: 0.0,
            punctuation_frequency: 0.0,
            hesitation_frequency: 0.0,
        }
    }
}

impl ConventionSummaryRow {
    /// (majority value, majority share) for `feature`.
    pub fn convention(&self, feature: Feature) -> (&str, f64) {
        match feature {
            Feature::Currency => (&self.currency_format, self.currency_majority_pct),
            Feature::Date => (&self.date_format, self.date_majority_pct),
            Feature::ThousandSeparator => (&self.thousand_separator_format, self.thousand_separator_majority_pct),
            Feature::Percent => (&self.percent_format, self.percent_majority_pct),
            Feature::Unit => (&self.unit_format, self.unit_majority_pct),
            Feature::Ordinal => (&self.ordinal_style, self.ordinal_majority_pct),
            Feature::Number => (&self.number_style, self.number_majority_pct),
        }
    }

    pub fn set_convention(&mut self, feature: Feature, majority: Majority) {
        let Majority { value, share } = majority;
        let (slot, pct) = match feature {
            Feature::Currency => (&mut self.currency_format, &mut self.currency_majority_pct),
            Feature::Date => (&mut self.date_format, &mut self.date_majority_pct),
            Feature::ThousandSeparator => {
                (&mut self.thousand_separator_format, &mut self.thousand_separator_majority_pct)
            }
            Feature::Percent => (&mut self.percent_format, &mut self.percent_majority_pct),
            Feature::Unit => (&mut self.unit_format, &mut self.unit_majority_pct),
            Feature::Ordinal => (&mut self.ordinal_style, &mut self.ordinal_majority_pct),
            Feature::Number => (&mut self.number_style, &mut self.number_majority_pct),
        };
        *slot = value;
        *pct = share;
    }
}

/// Reduce a group's records to majority conventions plus text-style means.
/// The returned row has empty `file`/`model`; see `aggregate_group`.
pub fn aggregate(records: &[FeatureRecord]) -> ConventionSummaryRow {
    let mut row = ConventionSummaryRow::default();
    for feature in Feature::ALL {
        row.set_convention(feature, majority(records.iter().map(|r| r.convention(feature))));
    }
    row.uppercase_frequency = mean(records.iter().map(|r| r.uppercase));
    row.punctuation_frequency = mean(records.iter().map(|r| if r.punctuation { 1.0 } else { 0.0 }));
    row.hesitation_frequency = mean(records.iter().map(|r| if r.hesitation_plain { 1.0 } else { 0.0 }));
    row
}

pub fn aggregate_group(file: &str, model: &str, records: &[FeatureRecord]) -> ConventionSummaryRow {
    ConventionSummaryRow { file: file.to_string(), model: model.to_string(), ..aggregate(records) }
}

// =============================
// Fallback resolver
// =============================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown feature: {0}")]
    UnknownFeature(String),
}

/// Which fallback level produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    LanguageModel,
    LanguageMajority,
    ModelMajority,
    GlobalMajority,
    Default,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::LanguageModel => "language_model",
            Source::LanguageMajority => "language_majority",
            Source::ModelMajority => "model_majority",
            Source::GlobalMajority => "global_majority",
            Source::Default => "default",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub value: String,
    pub confidence: f64,
    pub source: Source,
}

/// Values used when no group anywhere observed a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultConventions {
    pub currency_format: String,
    pub date_format: String,
    pub thousand_separator_format: String,
    pub percent_format: String,
    pub unit_format: String,
    pub ordinal_style: String,
    pub number_style: String,
}

impl Default for DefaultConventions {
    fn default() -> Self {
        DefaultConventions {
            currency_format: CurrencyMode::Word.label().to_string(),
            date_format: DateFormat::DdMonthYyyy.label().to_string(),
            thousand_separator_format: ThousandSepMode::Dot.label().to_string(),
            percent_format: PercentMode::SymbolNoSpace.label().to_string(),
            unit_format: UnitMode::Long.label().to_string(),
            ordinal_style: OrdinalStyle::Word.label().to_string(),
            number_style: NumberStyle::Digit.label().to_string(),
        }
    }
}

impl DefaultConventions {
    pub fn get(&self, feature: Feature) -> &str {
        match feature {
            Feature::Currency => &self.currency_format,
            Feature::Date => &self.date_format,
            Feature::ThousandSeparator => &self.thousand_separator_format,
            Feature::Percent => &self.percent_format,
            Feature::Unit => &self.unit_format,
            Feature::Ordinal => &self.ordinal_style,
            Feature::Number => &self.number_style,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub language: &'a str,
    pub model: &'a str,
    pub feature: Feature,
}

/// True when the file key embeds `_<language>_`.
pub fn file_has_language(file: &str, language: &str) -> bool {
    file.contains(&format!("_{}_", language))
}

fn detected(value: &str) -> Option<&str> {
    (value != NOT_DETECTED && !value.is_empty()).then_some(value)
}

fn majority_over<'a, I>(rows: I, feature: Feature) -> Option<(String, f64)>
where
    I: IntoIterator<Item = &'a ConventionSummaryRow>,
{
    let m = majority(rows.into_iter().map(|r| detected(r.convention(feature).0)));
    m.is_detected().then(|| (m.value, m.share))
}

/// The first row for this language and model, if its value was detected.
pub fn language_model_level(table: &[ConventionSummaryRow], q: &Query<'_>) -> Option<(String, f64)> {
    let row = table.iter().find(|r| file_has_language(&r.file, q.language) && r.model == q.model)?;
    let (value, share) = row.convention(q.feature);
    detected(value).map(|v| (v.to_string(), share))
}

pub fn language_majority_level(table: &[ConventionSummaryRow], q: &Query<'_>) -> Option<(String, f64)> {
    majority_over(table.iter().filter(|r| file_has_language(&r.file, q.language)), q.feature)
}

pub fn model_majority_level(table: &[ConventionSummaryRow], q: &Query<'_>) -> Option<(String, f64)> {
    majority_over(table.iter().filter(|r| r.model == q.model), q.feature)
}

pub fn global_majority_level(table: &[ConventionSummaryRow], q: &Query<'_>) -> Option<(String, f64)> {
    majority_over(table, q.feature)
}

pub type FallbackLevel = fn(&[ConventionSummaryRow], &Query<'_>) -> Option<(String, f64)>;

/// Levels tried in order; the first to yield a value wins.
pub const FALLBACK_CHAIN: [(Source, FallbackLevel); 4] = [
    (Source::LanguageModel, language_model_level),
    (Source::LanguageMajority, language_majority_level),
    (Source::ModelMajority, model_majority_level),
    (Source::GlobalMajority, global_majority_level),
];

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    pub defaults: DefaultConventions,
}

impl Resolver {
    pub fn new(defaults: DefaultConventions) -> Self {
        Resolver { defaults }
    }

    /// Resolve by column name. An unknown name is a caller error.
    pub fn resolve(
        &self,
        table: &[ConventionSummaryRow],
        language: &str,
        model: &str,
        feature: &str,
    ) -> Result<AggregationResult, ResolveError> {
        let feature: Feature = feature.parse()?;
        Ok(self.resolve_feature(table, language, model, feature))
    }

    pub fn resolve_feature(
        &self,
        table: &[ConventionSummaryRow],
        language: &str,
        model: &str,
        feature: Feature,
    ) -> AggregationResult {
        let query = Query { language, model, feature };
        FALLBACK_CHAIN
            .iter()
            .find_map(|(source, level)| {
                level(table, &query).map(|(value, confidence)| AggregationResult { value, confidence, source: *source })
            })
            .unwrap_or_else(|| AggregationResult {
                value: self.defaults.get(feature).to_string(),
                confidence: 0.0,
                source: Source::Default,
            })
    }
}

/// Resolve with the built-in default values.
pub fn resolve(
    table: &[ConventionSummaryRow],
    language: &str,
    model: &str,
    feature: &str,
) -> Result<AggregationResult, ResolveError> {
    Resolver::default().resolve(table, language, model, feature)
}

// =============================
// Guidelines
// =============================

pub fn language_name(code: &str) -> String {
    match code {
        "fr" => "French".to_string(),
        "es" => "Spanish".to_string(),
        "pt" => "Portuguese".to_string(),
        "de" => "German".to_string(),
        other => other.to_uppercase(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// (separator character, separator name)
fn separator(value: &str) -> (&'static str, &'static str) {
    match value {
        "space" => (" ", "space"),
        "comma" => (",", "comma"),
        _ => (".", "dot"),
    }
}

fn percent_instruction(value: &str) -> &'static str {
    match value {
        "symbol_space" => "space between number and symbol → 20 % ✅, 20% ❌",
        "word" => "write in words → twenty percent ✅, 20% ❌",
        _ => "symbol attached to number → 20% ✅, 20 % ❌",
    }
}

fn unit_instruction(value: &str) -> &'static str {
    match value {
        "short" => "use abbreviations → 10 km ✅, 10 kilometers ❌",
        _ => "use full words → 10 kilometers ✅, 10 km ❌",
    }
}

fn number_instruction(value: &str) -> &'static str {
    match value {
        "digit" => "use digits → 100 ✅, one hundred ❌",
        "word" => "use written words → one hundred ✅, 100 ❌",
        _ => "use written words for small numbers (<1000), digits for large numbers → ten ✅, 10 ❌; 1 234 ✅, one thousand two hundred thirty-four ❌",
    }
}

/// (instruction, format as quoted in special cases)
fn date_instruction(value: &str) -> (&'static str, &'static str) {
    match value {
        "dd/mm/yyyy" => ("use dd/mm/yyyy format → 10/02/2023 ✅, 10 february 2023 ❌", "dd/mm/yyyy"),
        "yyyy-mm-dd" => ("use ISO yyyy-mm-dd format → 2023-02-10 ✅, 10 february 2023 ❌", "yyyy-mm-dd"),
        _ => ("use dd month yyyy format → 10 february 2023 ✅, 10/02/2023 ❌", "dd month yyyy"),
    }
}

fn currency_instruction(value: &str) -> &'static str {
    match value {
        "symbol" => "use symbols → $ ✅, € ✅, dollars ❌, euros ❌",
        "word" => "use written words → dollars ✅, euros ✅, $ ❌, € ❌",
        _ => "format as heard",
    }
}

fn ordinal_instruction(value: &str) -> &'static str {
    match value {
        "digit_suffix" => "use digits with suffix → 1st ✅, first ❌",
        "word" => "use written words → first ✅, 1st ❌",
        _ => "format as heard",
    }
}

fn confidence_line(feature: Feature, result: &AggregationResult, lang_name: &str, model: &str) -> String {
    if result.value == NOT_DETECTED {
        return match feature {
            Feature::Date => "No standard date formats detected in the text".to_string(),
            Feature::Currency => "No currency formats detected in the text".to_string(),
            Feature::Ordinal => "No ordinal numbers detected in the text".to_string(),
            other => format!("No {} detected", other.column().replace('_', " ")),
        };
    }
    let basis = match result.source {
        Source::LanguageModel => format!("based on specific {}/{} data", lang_name, model),
        Source::LanguageMajority => format!("based on {} language majority", lang_name),
        Source::ModelMajority => format!("based on {} model majority", model),
        Source::GlobalMajority => "based on global majority".to_string(),
        Source::Default => "default value".to_string(),
    };
    if result.confidence > 0.0 {
        format!("{:.1}% confidence ({})", result.confidence * 100.0, basis)
    } else {
        basis
    }
}

/// Annotation guideline text for one language/model.
/// `None` when the table holds no row for that pair.
pub fn render_guidelines(
    table: &[ConventionSummaryRow],
    language: &str,
    model: &str,
    resolver: &Resolver,
) -> Option<String> {
    if !table.iter().any(|r| file_has_language(&r.file, language) && r.model == model) {
        return None;
    }

    let resolved = |feature: Feature| resolver.resolve_feature(table, language, model, feature);
    let currency = resolved(Feature::Currency);
    let date = resolved(Feature::Date);
    let thousand = resolved(Feature::ThousandSeparator);
    let percent = resolved(Feature::Percent);
    let unit = resolved(Feature::Unit);
    let ordinal = resolved(Feature::Ordinal);
    let number = resolved(Feature::Number);

    let lang_name = language_name(language);
    let model_title = capitalize(model);
    let (sep_char, sep_name) = separator(&thousand.value);
    let (date_rule, date_format_str) = date_instruction(&date.value);
    let spelling = if model == "whisper" { "Spell with spaces → d a n g" } else { "Spell without spaces → dang" };

    let mut rules = vec![
        format!("## 2. Model-specific Rules ({})", model_title),
        format!("- **Spelling letters**: {}", spelling),
        format!("- **Dates**: {}", date_rule),
        format!("- **Units**: {}", unit_instruction(&unit.value)),
        format!("- **Currency amounts**: {}", currency_instruction(&currency.value)),
        format!("- **Ordinal numbers**: {}", ordinal_instruction(&ordinal.value)),
        format!("- **General number style**: {}", number_instruction(&number.value)),
        format!("- **Digit grouping**: Use {} as separator for:", sep_name),
    ];
    if number.value == NumberStyle::Digit.label() {
        rules.push(format!("  - **Large numbers (≥1000)**: 1{}234", sep_char));
    }
    rules.push(format!("  - **Phone numbers**: 06{0}12{0}34{0}56{0}78", sep_char));
    rules.push(format!("- **Percentages**: {}", percent_instruction(&percent.value)));

    let confidence = |feature: Feature, result: &AggregationResult| confidence_line(feature, result, &lang_name, model);

    Some(format!(
        r#"# {lang_name} Annotation Guidelines for {model_title}

## 1. General Principles
- Everything must be written in **lowercase**, **with accents**, except for proper nouns.
- **No punctuation**: ? ! : . , ; - _
- Keep **spoken abbreviations/contractions**: gonna, gotta, etc.

- **Personal data** (name, address, ID, SSN, passport, etc.) must be enclosed with #.
  Example: "Hello my name is #Alice Dupont# my ID is #1 2 3#"

- **Hesitations and non-speech sounds**: Put between <> expressions like "hm", "hmm", "euh", "eh", "ah"...
  Example: "I love euhhhh sandwich hmmm" → **"I love <euhhhh> sandwich <hmmm>"**
  Note: <hm> and <hmmmmmmmmmmm> are normalized to the same token.

---

{rules}

---

## 3. Special Cases
- **Date format variations**: While the standard format is "{date_format_str}", if the speaker pronounces the date differently, transcribe it as heard.
  Examples of acceptable variations: "february 10", "10 de fevereiro de 2023"

- **Incomplete words**: If a person does not finish a word, transcribe exactly what is heard.
  Example: "he has mar" (instead of "he has marked") → **he has mar**

- **Inaudible speech handling**:
  - **Single inaudible segment**: Split the box to isolate [inaudible].
  - **Multiple inaudible segments**: Tag entire call as [inaudible].

---

## 4. Detection Confidence
- **Currency format**: {c_currency}
- **Date format**: {c_date}
- **Thousand separator**: {c_thousand}
- **Percentage format**: {c_percent}
- **Unit format**: {c_unit}
- **Ordinal style**: {c_ordinal}
- **Number style**: {c_number}
"#,
        lang_name = lang_name,
        model_title = model_title,
        rules = rules.join("\n"),
        date_format_str = date_format_str,
        c_currency = confidence(Feature::Currency, &currency),
        c_date = confidence(Feature::Date, &date),
        c_thousand = confidence(Feature::ThousandSeparator, &thousand),
        c_percent = confidence(Feature::Percent, &percent),
        c_unit = confidence(Feature::Unit, &unit),
        c_ordinal = confidence(Feature::Ordinal, &ordinal),
        c_number = confidence(Feature::Number, &number),
    ))
}

// =============================
// Configuration
// =============================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub input_dir: String,
    pub input_glob: String,
    pub summary_path: String,
    pub guidelines_dir: String,
    pub models: Vec<String>,
    pub languages: Vec<String>,
    pub defaults: DefaultConventions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            input_dir: ".".to_string(),
            input_glob: "transcriptions*.csv".to_string(),
            summary_path: "model_conventions_summary.csv".to_string(),
            guidelines_dir: ".".to_string(),
            models: vec!["whisper".to_string(), "canary".to_string(), "parakeet".to_string()],
            languages: vec!["fr".to_string(), "es".to_string(), "pt".to_string(), "de".to_string()],
            defaults: DefaultConventions::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.input_glob.trim().is_empty() {
            return Err(ConfigError::Invalid("empty input_glob".into()));
        }
        if self.models.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid("no models configured".into()));
        }
        Ok(self)
    }

    /// Every (language, model) pair, language-major.
    pub fn combinations(&self) -> Vec<(String, String)> {
        self.languages
            .iter()
            .flat_map(|l| self.models.iter().map(move |m| (l.clone(), m.clone())))
            .collect()
    }

    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.defaults.clone())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(String),
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub fn load_config(path: &Path) -> Result<AnalysisConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let config: AnalysisConfig = serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()
}

// =============================
// Tables on disk
// =============================

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("NoFilesFound")]
    NoFilesFound { guidance: String },
}

/// Sorted transcription files under `dir` matching `glob_pattern`.
/// A pattern without `/` or `**` only looks at the top level.
pub fn enumerate_transcriptions(dir: &Path, glob_pattern: &str) -> Result<Vec<PathBuf>, EnumerateError> {
    let guidance = || folder_guidance(dir, glob_pattern);
    let depth = if glob_pattern.contains('/') || glob_pattern.contains("**") { usize::MAX } else { 1 };
    let mut paths: Vec<PathBuf> = GlobWalkerBuilder::from_patterns(dir, &[glob_pattern])
        .case_insensitive(false)
        .follow_links(false)
        .max_depth(depth)
        .build()
        .map_err(|_| EnumerateError::NoFilesFound { guidance: guidance() })?
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_path_buf())
        .collect();

    paths.sort();
    paths.retain(|p| p.is_file());

    if paths.is_empty() {
        return Err(EnumerateError::NoFilesFound { guidance: guidance() });
    }
    Ok(paths)
}

fn folder_guidance(dir: &Path, glob_pattern: &str) -> String {
    format!(
        r#"No transcription file matches {} in {}
Expected: CSV files such as transcriptions_fr_batch1.csv, one column per model
(the column name must contain the model identifier, e.g. "whisper_text")."#,
        glob_pattern,
        dir.display()
    )
}

/// First configured model identifier contained in the lower-cased column name.
pub fn model_for_column<'m>(column: &str, models: &'m [String]) -> Option<&'m str> {
    let lower = column.to_lowercase();
    models.iter().find(|m| !m.is_empty() && lower.contains(m.to_lowercase().as_str())).map(|m| m.as_str())
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table: {0}")]
    Read(String),
    #[error("Malformed table: {0}")]
    Parse(String),
}

/// Detect and aggregate every model column of one transcription CSV.
/// Rows come back in column order; empty cells are absent samples.
pub fn analyze_file(path: &Path, detector: &Detector, models: &[String]) -> Result<Vec<ConventionSummaryRow>, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| TableError::Read(format!("{}: {}", path.display(), e)))?;
    let headers = reader.headers().map_err(|e| TableError::Parse(format!("{}: {}", path.display(), e)))?.clone();

    let columns: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| model_for_column(h, models).map(|m| (i, m)))
        .collect();
    let mut records: Vec<Vec<FeatureRecord>> = vec![Vec::new(); columns.len()];

    for row in reader.records() {
        let row = row.map_err(|e| TableError::Parse(format!("{}: {}", path.display(), e)))?;
        for (slot, (idx, _)) in columns.iter().enumerate() {
            let cell = row.get(*idx).filter(|c| !c.is_empty());
            records[slot].push(detector.detect(&normalize(cell)));
        }
    }

    let file = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
    Ok(columns
        .iter()
        .zip(records.iter())
        .map(|((_, model), recs)| aggregate_group(file, model, recs))
        .collect())
}

pub fn analyze_files(paths: &[PathBuf], detector: &Detector, models: &[String]) -> Result<Vec<ConventionSummaryRow>, TableError> {
    let mut rows = Vec::new();
    for path in paths {
        rows.extend(analyze_file(path, detector, models)?);
    }
    Ok(rows)
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("WriteFailed: {0}")]
    WriteFailed(String),
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("out");
    path.with_file_name(format!("{}.tmp.{}", name, std::process::id()))
}

/// Atomically write the summary table as CSV.
pub fn write_summary(rows: &[ConventionSummaryRow], path: &Path) -> Result<(), EmitError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    }
    let tmp = tmp_sibling(path);
    {
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
        for row in rows {
            writer.serialize(row).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
        }
        writer.flush().map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    }
    std::fs::rename(&tmp, path).map_err(|e| EmitError::WriteFailed(e.to_string()))
}

/// Read a summary table; missing convention columns read as `not_detected`.
pub fn read_summary(path: &Path) -> Result<Vec<ConventionSummaryRow>, TableError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| TableError::Read(format!("{}: {}", path.display(), e)))?;
    reader
        .deserialize()
        .map(|r| r.map_err(|e| TableError::Parse(format!("{}: {}", path.display(), e))))
        .collect()
}

/// Atomically write `guidelines_<language>_<model>.txt` into `outdir`.
pub fn emit_guidelines(text: &str, outdir: &Path, language: &str, model: &str) -> Result<PathBuf, EmitError> {
    std::fs::create_dir_all(outdir).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    let path = outdir.join(format!("guidelines_{}_{}.txt", language, model));
    let tmp = tmp_sibling(&path);
    std::fs::write(&tmp, text).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    std::fs::rename(&tmp, &path).map_err(|e| EmitError::WriteFailed(e.to_string()))?;
    Ok(path)
}

static LANGUAGE_IN_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([a-z]{2})_").expect("static pattern"));

/// Language codes embedded as `_xx_` in file keys.
pub fn available_languages(rows: &[ConventionSummaryRow]) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|r| LANGUAGE_IN_FILE.captures(&r.file))
        .map(|c| c[1].to_string())
        .collect()
}

pub fn available_models(rows: &[ConventionSummaryRow]) -> BTreeSet<String> {
    rows.iter().map(|r| r.model.clone()).collect()
}

/// sha256 of the serialized table; equal inputs give equal fingerprints.
pub fn summary_fingerprint(rows: &[ConventionSummaryRow]) -> String {
    sha256_hex(&serde_json::to_vec(rows).unwrap_or_default())
}

// Utility to compute sha256 hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    out.iter().map(|b| format!("{:02x}", b)).collect()
}
