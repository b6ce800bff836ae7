use asr_conventions::{language_name, render_guidelines, ConventionSummaryRow, Resolver};

fn fr_whisper() -> ConventionSummaryRow {
    ConventionSummaryRow {
        file: "transcriptions_fr_calls.csv".into(),
        model: "whisper".into(),
        thousand_separator_format: "space".into(),
        thousand_separator_majority_pct: 0.75,
        percent_format: "symbol_space".into(),
        percent_majority_pct: 1.0,
        number_style: "digit".into(),
        number_majority_pct: 0.8,
        ..Default::default()
    }
}

#[test]
fn renders_resolved_conventions() {
    let table = vec![fr_whisper()];
    let text = render_guidelines(&table, "fr", "whisper", &Resolver::default()).expect("row exists");

    assert!(text.starts_with("# French Annotation Guidelines for Whisper"));
    assert!(text.contains("## 2. Model-specific Rules (Whisper)"));
    assert!(text.contains("Spell with spaces → d a n g"));
    assert!(text.contains("- **Digit grouping**: Use space as separator for:"));
    assert!(text.contains("  - **Large numbers (≥1000)**: 1 234"));
    assert!(text.contains("  - **Phone numbers**: 06 12 34 56 78"));
    assert!(text.contains("space between number and symbol → 20 % ✅, 20% ❌"));
    assert!(text.contains("- **Thousand separator**: 75.0% confidence (based on specific French/whisper data)"));
    assert!(text.contains("- **Number style**: 80.0% confidence (based on specific French/whisper data)"));
    // nothing observed anywhere: defaults, no confidence figure
    assert!(text.contains("- **Date format**: default value"));
    assert!(text.contains("use dd month yyyy format → 10 february 2023 ✅, 10/02/2023 ❌"));
    assert!(text.contains("While the standard format is \"dd month yyyy\""));
}

#[test]
fn fallback_sources_are_reported() {
    let mut other = fr_whisper();
    other.model = "canary".into();
    other.date_format = "yyyy-mm-dd".into();
    other.date_majority_pct = 1.0;
    let mut es = fr_whisper();
    es.file = "transcriptions_es_calls.csv".into();
    es.currency_format = "symbol".into();
    es.currency_majority_pct = 1.0;

    let table = vec![fr_whisper(), other, es];
    let text = render_guidelines(&table, "fr", "whisper", &Resolver::default()).unwrap();
    assert!(text.contains("- **Date format**: 100.0% confidence (based on French language majority)"));
    assert!(text.contains("- **Currency format**: 100.0% confidence (based on whisper model majority)"));
    assert!(text.contains("use symbols → $ ✅, € ✅, dollars ❌, euros ❌"));
}

#[test]
fn non_whisper_models_spell_without_spaces() {
    let mut row = fr_whisper();
    row.model = "parakeet".into();
    row.number_style = "word".into();
    let text = render_guidelines(&[row], "fr", "parakeet", &Resolver::default()).unwrap();
    assert!(text.contains("# French Annotation Guidelines for Parakeet"));
    assert!(text.contains("Spell without spaces → dang"));
    assert!(!text.contains("Large numbers"));
}

#[test]
fn missing_pair_renders_nothing() {
    let table = vec![fr_whisper()];
    assert!(render_guidelines(&table, "de", "whisper", &Resolver::default()).is_none());
    assert!(render_guidelines(&table, "fr", "canary", &Resolver::default()).is_none());
    assert!(render_guidelines(&[], "fr", "whisper", &Resolver::default()).is_none());
}

#[test]
fn language_names() {
    assert_eq!(language_name("pt"), "Portuguese");
    assert_eq!(language_name("it"), "IT");
}
