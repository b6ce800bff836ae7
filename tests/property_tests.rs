use asr_conventions::{
    aggregate, detect, majority, normalize, resolve, ConventionSummaryRow, Feature, FeatureRecord, Source,
    ThousandSepMode, NOT_DETECTED,
};
use proptest::prelude::*;

fn sample() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC{0,48}",
        "[0-9 %€$.,/-]{0,24}",
        "(euh|vingt|pour cent|1 000|25/11/2024|5 km|premier|Hmm|  )( (euh|vingt|pour cent|1 000|25/11/2024|5 km|premier|Hmm|  )){0,6}",
    ]
}

fn separator() -> impl Strategy<Value = Option<ThousandSepMode>> {
    prop_oneof![
        Just(None),
        Just(Some(ThousandSepMode::Space)),
        Just(Some(ThousandSepMode::Dot)),
        Just(Some(ThousandSepMode::Comma)),
    ]
}

proptest! {
    #[test]
    fn normalize_is_idempotent(s in sample()) {
        let once = normalize(Some(&s));
        prop_assert_eq!(normalize(Some(&once)), once);
    }

    #[test]
    fn detect_is_deterministic(s in sample()) {
        let n = normalize(Some(&s));
        prop_assert_eq!(detect(&n), detect(&n));
        prop_assert_eq!(detect(&s), detect(&n));
    }

    #[test]
    fn uppercase_ratio_is_bounded(s in sample()) {
        let rec = detect(&s);
        prop_assert!((0.0..=1.0).contains(&rec.uppercase));
        if !normalize(Some(&s)).chars().any(char::is_alphabetic) {
            prop_assert_eq!(rec.uppercase, 0.0);
        }
    }

    #[test]
    fn majority_share_is_a_valid_fraction(values in prop::collection::vec(separator(), 0..40)) {
        let records: Vec<FeatureRecord> = values
            .iter()
            .map(|v| FeatureRecord { thousand_sep_mode: *v, ..Default::default() })
            .collect();
        let row = aggregate(&records);
        let (value, share) = row.convention(Feature::ThousandSeparator);

        let present: Vec<&str> = values.iter().flatten().map(|m| m.label()).collect();
        if present.is_empty() {
            prop_assert_eq!(value, NOT_DETECTED);
            prop_assert_eq!(share, 0.0);
        } else {
            prop_assert!(share > 0.0 && share <= 1.0);
            let count_of = |x: &str| present.iter().filter(|p| **p == x).count();
            let best = count_of(value);
            for other in &present {
                prop_assert!(count_of(*other) <= best);
            }
            let first_max = present.iter().find(|p| count_of(**p) == best).copied();
            prop_assert_eq!(Some(value), first_max);
            prop_assert_eq!(majority(present.iter().map(|p| Some(*p))).value, value.to_string());
        }
    }

    #[test]
    fn detected_language_model_value_always_wins(
        others in prop::collection::vec(("[a-z]{2}", "(whisper|canary|parakeet)", "(space|dot|comma|not_detected)"), 0..12),
        share in 0.01f64..=1.0,
    ) {
        let mut table = vec![ConventionSummaryRow {
            file: "transcriptions_fr_target.csv".into(),
            model: "whisper".into(),
            thousand_separator_format: "comma".into(),
            thousand_separator_majority_pct: share,
            ..Default::default()
        }];
        table.extend(others.into_iter().map(|(lang, model, sep)| ConventionSummaryRow {
            file: format!("transcriptions_{}_x.csv", lang),
            model,
            thousand_separator_format: sep,
            thousand_separator_majority_pct: 1.0,
            ..Default::default()
        }));

        let r = resolve(&table, "fr", "whisper", "thousand_separator_format").unwrap();
        prop_assert_eq!(r.source, Source::LanguageModel);
        prop_assert_eq!(r.value, "comma");
        prop_assert_eq!(r.confidence, share);
    }
}
