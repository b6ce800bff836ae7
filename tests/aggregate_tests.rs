use asr_conventions::{
    aggregate, aggregate_group, detect, majority, Feature, FeatureRecord, Majority, ThousandSepMode, NOT_DETECTED,
};

fn with_sep(sep: Option<ThousandSepMode>) -> FeatureRecord {
    FeatureRecord { thousand_sep_mode: sep, ..Default::default() }
}

#[test]
fn majority_share_counts_present_observations_only() {
    let records = vec![
        with_sep(Some(ThousandSepMode::Dot)),
        with_sep(None),
        with_sep(Some(ThousandSepMode::Dot)),
        with_sep(Some(ThousandSepMode::Comma)),
        with_sep(None),
    ];
    let row = aggregate(&records);
    assert_eq!(row.thousand_separator_format, "dot");
    assert!((row.thousand_separator_majority_pct - 2.0 / 3.0).abs() < 1e-12);
}

#[test]
fn all_absent_reports_not_detected() {
    let row = aggregate(&[FeatureRecord::default(), FeatureRecord::default()]);
    for feature in Feature::ALL {
        assert_eq!(row.convention(feature), (NOT_DETECTED, 0.0), "{}", feature);
    }
}

#[test]
fn empty_group_reports_not_detected_and_zero_means() {
    let row = aggregate(&[]);
    for feature in Feature::ALL {
        assert_eq!(row.convention(feature), (NOT_DETECTED, 0.0));
    }
    assert_eq!(row.uppercase_frequency, 0.0);
    assert_eq!(row.punctuation_frequency, 0.0);
    assert_eq!(row.hesitation_frequency, 0.0);
}

#[test]
fn ties_go_to_first_encountered_value() {
    let m = majority([Some("comma"), Some("dot"), Some("dot"), Some("comma")]);
    assert_eq!(m, Majority { value: "comma".into(), share: 0.5 });

    let m = majority([None, Some("dot"), Some("comma")]);
    assert_eq!(m.value, "dot");
}

#[test]
fn majority_of_nothing_is_not_detected() {
    let m = majority(Vec::<Option<&str>>::new());
    assert!(!m.is_detected());
    assert_eq!(m, Majority::not_detected());
}

#[test]
fn text_style_means_cover_every_sample() {
    let samples = ["Euh, OUI", "non", "", "hmm d'accord."];
    let records: Vec<FeatureRecord> = samples.iter().map(|s| detect(s)).collect();
    let row = aggregate_group("transcriptions_fr_test.csv", "whisper", &records);

    assert_eq!(row.file, "transcriptions_fr_test.csv");
    assert_eq!(row.model, "whisper");
    assert!((row.hesitation_frequency - 0.5).abs() < 1e-12);
    assert!((row.punctuation_frequency - 0.5).abs() < 1e-12);
    // "Euh, OUI": 4 of 6 letters uppercase, other samples 0
    assert!((row.uppercase_frequency - (4.0 / 6.0) / 4.0).abs() < 1e-12);
}

#[test]
fn aggregates_detected_samples_per_feature() {
    let samples = ["20 %", "30 %", "40%", "", "1.000 euros", "2.500 €"];
    let records: Vec<FeatureRecord> = samples.iter().map(|s| detect(s)).collect();
    let row = aggregate(&records);

    assert_eq!(row.convention(Feature::Percent).0, "symbol_space");
    assert!((row.percent_majority_pct - 2.0 / 3.0).abs() < 1e-12);
    assert_eq!(row.convention(Feature::ThousandSeparator), ("dot", 1.0));
    assert_eq!(row.convention(Feature::Currency).0, "word");
    assert!((row.currency_majority_pct - 0.5).abs() < 1e-12);
    assert_eq!(row.convention(Feature::Date).0, NOT_DETECTED);
    assert_eq!(row.convention(Feature::Number), ("digit", 1.0));
}
