use asr_conventions::normalize;

#[test]
fn absent_sample_becomes_empty_string() {
    assert_eq!(normalize(None), "");
}

#[test]
fn trims_and_replaces_non_breaking_spaces() {
    assert_eq!(normalize(Some("  20\u{00A0}%\t")), "20 %");
}

#[test]
fn applies_compatibility_folding() {
    // fullwidth digits, ligature and the "℃" sign fold to plain forms
    assert_eq!(normalize(Some("１２３")), "123");
    assert_eq!(normalize(Some("ﬁn")), "fin");
    assert_eq!(normalize(Some("5 ℃")), "5 °C");
}

#[test]
fn recombines_decomposed_accents() {
    let decomposed = "de\u{0301}cembre";
    assert_eq!(normalize(Some(decomposed)), "décembre");
}

#[test]
fn normalization_is_idempotent_on_examples() {
    for s in ["", "  vingt pour cent ", "5\u{00A0}€", "ﬁ １ ℃", "\u{2003}Hola\u{2003}"] {
        let once = normalize(Some(s));
        assert_eq!(normalize(Some(&once)), once, "input {:?}", s);
    }
}
