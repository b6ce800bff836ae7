use std::path::Path;

use asr_conventions::{
    analyze_file, available_languages, available_models, emit_guidelines, enumerate_transcriptions, load_config,
    render_guidelines, summary_fingerprint, write_summary, AnalysisConfig, Detector, EnumerateError, Feature,
};

const DEFAULT_CONFIG: &str = "conventions.yaml";

fn main() {
    // Simple CLI flags parsing
    let args: Vec<String> = std::env::args().collect();
    let flag_value = |name: &str| -> Option<String> {
        let pos = args.iter().position(|a| a == name)?;
        args.get(pos + 1).filter(|v| !v.starts_with("--")).cloned()
    };
    let summary_only = args.iter().any(|a| a == "--summary-only");
    let lang_filter = flag_value("--lang");
    let model_filter = flag_value("--model");

    // 1) Configuration: explicit path must exist, the default one is optional
    let config_path = flag_value("--config");
    let loaded = match &config_path {
        Some(p) => load_config(Path::new(p)),
        None if Path::new(DEFAULT_CONFIG).exists() => load_config(Path::new(DEFAULT_CONFIG)),
        None => Ok(AnalysisConfig::default()),
    };
    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "step": "load_config",
                    "file": config_path.as_deref().unwrap_or(DEFAULT_CONFIG),
                    "error": e.to_string(),
                    "error_code": 3
                })
            );
            std::process::exit(3);
        }
    };
    eprintln!(
        "{}",
        serde_json::json!({
            "step": "load_config",
            "status": "ok",
            "input_dir": config.input_dir,
            "input_glob": config.input_glob,
            "models": config.models,
            "languages": config.languages
        })
    );

    let detector = match Detector::multilingual() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{}", serde_json::json!({"step": "build_detector", "error": e.to_string(), "error_code": 3}));
            std::process::exit(3);
        }
    };

    // 2) Transcription files
    let files = match enumerate_transcriptions(Path::new(&config.input_dir), &config.input_glob) {
        Ok(files) => files,
        Err(EnumerateError::NoFilesFound { guidance }) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "step": "enumerate_transcriptions",
                    "error": "NoFilesFound",
                    "error_code": 1
                })
            );
            eprintln!("{}", guidance);
            std::process::exit(1);
        }
    };
    eprintln!("{}", serde_json::json!({"step": "enumerate_transcriptions", "count": files.len()}));

    // 3) Detect + aggregate, one row per file x model column
    let mut summary = Vec::new();
    for file in &files {
        match analyze_file(file, &detector, &config.models) {
            Ok(rows) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "step": "analyze_file",
                        "file": file,
                        "models": rows.iter().map(|r| r.model.as_str()).collect::<Vec<_>>()
                    })
                );
                summary.extend(rows);
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "step": "analyze_file",
                        "file": file,
                        "error": e.to_string(),
                        "error_code": 4
                    })
                );
                std::process::exit(4);
            }
        }
    }

    // 4) Persist summary
    let summary_path = Path::new(&config.summary_path);
    if let Err(e) = write_summary(&summary, summary_path) {
        eprintln!(
            "{}",
            serde_json::json!({
                "step": "write_summary",
                "file": summary_path,
                "error": e.to_string(),
                "error_code": 6
            })
        );
        std::process::exit(6);
    }
    eprintln!(
        "{}",
        serde_json::json!({
            "step": "write_summary",
            "file": summary_path,
            "rows": summary.len(),
            "fingerprint": summary_fingerprint(&summary)
        })
    );

    if summary_only {
        return;
    }

    let languages = available_languages(&summary);
    let models = available_models(&summary);
    eprintln!(
        "{}",
        serde_json::json!({
            "step": "available_data",
            "languages": languages,
            "models": models
        })
    );

    // 5) Resolve + render + emit per combination
    let resolver = config.resolver();
    let outdir = Path::new(&config.guidelines_dir);
    let combinations = config.combinations().into_iter().filter(|(l, m)| {
        lang_filter.as_deref().map_or(true, |f| f == l.as_str()) && model_filter.as_deref().map_or(true, |f| f == m.as_str())
    });
    for (lang, model) in combinations {
        let resolved: serde_json::Map<String, serde_json::Value> = Feature::ALL
            .iter()
            .map(|f| {
                let r = resolver.resolve_feature(&summary, &lang, &model, *f);
                (f.column().to_string(), serde_json::json!(r))
            })
            .collect();
        eprintln!(
            "{}",
            serde_json::json!({
                "step": "resolve",
                "language": lang,
                "model": model,
                "resolved": resolved
            })
        );

        let Some(text) = render_guidelines(&summary, &lang, &model, &resolver) else {
            eprintln!(
                "{}",
                serde_json::json!({
                    "step": "render_guidelines",
                    "language": lang,
                    "model": model,
                    "status": "skipped",
                    "reason": "no_data",
                    "available_languages": languages,
                    "available_models": models
                })
            );
            continue;
        };

        match emit_guidelines(&text, outdir, &lang, &model) {
            Ok(path) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "step": "emit_guidelines",
                        "language": lang,
                        "model": model,
                        "path": path
                    })
                );
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "step": "emit_guidelines",
                        "language": lang,
                        "model": model,
                        "error": e.to_string(),
                        "error_code": 6
                    })
                );
                std::process::exit(6);
            }
        }
    }
}
