// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! End-to-end workflows over files in a temporary directory

use spam_classifier::{
    read_inference_csv, run_batch_prediction, AppConfig, ClassifierError, ConfigOverrides, DatasetLoader,
    EvaluationReport, Estimator, Predictor, ResolvedConfig, SessionOrigin, SpamClassifier, TfidfLogisticRegression,
    Workbench,
};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const SAMPLE_CSV: &str = "label,text\n\
ham,\"Hi there, let's catch up tomorrow.\"\n\
spam,WIN a brand new car by clicking here!!!\n\
ham,Reminder: project meeting at 2pm.\n\
spam,Exclusive offer!!! Limited time deal.\n\
ham,Lunch plans for next week?\n\
spam,Get rich quick by subscribing now!!!\n\
ham,Team standup moved to 10am.\n\
spam,Mega discount newsletter just for you.\n";

fn config_in(dir: &Path) -> Arc<ResolvedConfig> {
    AppConfig::from_overrides(ConfigOverrides {
        local_data_path: Some(dir.join("data.csv")),
        model_path: Some(dir.join("models/model.json")),
        test_size: Some(0.25),
        ..Default::default()
    })
    .unwrap()
}

fn with_sample_data(dir: &Path) -> Arc<ResolvedConfig> {
    let config = config_in(dir);
    std::fs::write(&config.local_data_path, SAMPLE_CSV).unwrap();
    config
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_train_save_load_predict() {
    let dir = tempfile::tempdir().unwrap();
    let config = with_sample_data(dir.path());
    let dataset = DatasetLoader::new(config.clone()).load(None).unwrap();
    assert_eq!(dataset.len(), 8);

    let mut classifier = SpamClassifier::new(config.clone());
    let report = classifier.train(&dataset).unwrap();
    assert!(report.roc_auc >= 0.0 && report.roc_auc <= 1.0);

    let saved = classifier.save(None).unwrap();
    assert!(saved.exists());

    let mut restored = SpamClassifier::new(config);
    restored.load(None).unwrap();

    let inputs = strings(&["Limited time offer, claim your reward now!"]);
    let predictions = restored.predict(&inputs).unwrap();
    assert_eq!(predictions.labels.len(), 1);
    assert_eq!(predictions.probabilities.n_columns(), 2);
    assert_eq!(predictions, classifier.predict(&inputs).unwrap());
}

#[test]
fn test_training_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = with_sample_data(dir.path());
    let dataset = DatasetLoader::new(config.clone()).load(None).unwrap();

    let first = SpamClassifier::new(config.clone()).train(&dataset).unwrap();
    let second = SpamClassifier::new(config).train(&dataset).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_spam_scores_above_half() {
    let dir = tempfile::tempdir().unwrap();
    let config = with_sample_data(dir.path());
    let dataset = DatasetLoader::new(config.clone()).load(None).unwrap();

    // Trained on the stratified split (6 rows, seed 42); spam wins by a small
    // margin, around 0.56, so this only guards the direction.
    let mut classifier = SpamClassifier::new(config.clone());
    classifier.train(&dataset).unwrap();
    let predictions = classifier.predict(&strings(&["Exclusive offer, click now!!!"])).unwrap();
    assert_eq!(predictions.labels, vec!["spam"]);
    assert!(predictions.positive_probabilities()[0] > 0.5);

    // Fitted on every row the same message is spam as well
    let model = TfidfLogisticRegression::from_config(&config)
        .fit(&dataset.texts(), &dataset.labels())
        .unwrap();
    let probs = model.predict_proba(&strings(&["Exclusive offer, click now!!!"]));
    assert!(probs.column(1)[0] > 0.5);
}

#[test]
fn test_evaluate_covers_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = with_sample_data(dir.path());
    let dataset = DatasetLoader::new(config.clone()).load(None).unwrap();

    let mut classifier = SpamClassifier::new(config);
    classifier.train(&dataset).unwrap();
    let report = classifier.evaluate(&dataset).unwrap();

    assert_eq!(report.total_support(), dataset.len());
    assert_eq!(report.confusion_matrix.total(), dataset.len());
}

#[test]
fn test_fresh_classifier_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let config = with_sample_data(dir.path());
    let dataset = DatasetLoader::new(config.clone()).load(None).unwrap();
    let classifier = SpamClassifier::new(config);

    assert!(matches!(classifier.predict(&strings(&["hi"])), Err(ClassifierError::ModelNotReady)));
    assert!(matches!(classifier.save(None), Err(ClassifierError::ModelNotReady)));
    assert!(matches!(classifier.evaluate(&dataset), Err(ClassifierError::ModelNotReady)));
}

#[test]
fn test_headerless_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let path = dir.path().join("raw.csv");
    std::fs::write(&path, "ham,See you at six\nspam,\"Free entry, txt WIN\"\nham,ok\n").unwrap();

    let dataset = DatasetLoader::new(config).load(Some(&path)).unwrap();
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.records()[1].label, "spam");
    assert_eq!(dataset.records()[1].text, "Free entry, txt WIN");
}

#[test]
fn test_unreachable_url_without_local_copy() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        data_url: "http://127.0.0.1:9/spam.csv".to_string(),
        local_data_path: dir.path().join("missing.csv"),
        model_path: dir.path().join("model.json"),
        cache_dir: dir.path().join(".cache"),
        ..AppConfig::default()
    }
    .into_shared()
    .unwrap();

    let result = DatasetLoader::new(config.clone()).load(None);
    assert!(matches!(result, Err(ClassifierError::DatasetUnavailable { .. })));
    assert!(!config.local_data_path.exists());
}

/// Answer HTTP requests on localhost with canned responses in order, repeating
/// the last one. Returns the dataset URL and the number of requests seen.
fn serve(responses: Vec<(u16, Vec<u8>)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/spam.csv", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let (status, body) = &responses[n.min(responses.len() - 1)];

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(k) => request.extend_from_slice(&buf[..k]),
                }
            }

            let reason = if *status == 200 { "OK" } else { "Not Found" };
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                reason,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(body);
        }
    });

    (url, hits)
}

fn remote_config(dir: &Path, url: &str) -> Arc<ResolvedConfig> {
    AppConfig {
        data_url: url.to_string(),
        local_data_path: dir.join("datasets/spam.csv"),
        model_path: dir.join("model.json"),
        cache_dir: dir.join(".cache"),
        ..AppConfig::default()
    }
    .into_shared()
    .unwrap()
}

#[test]
fn test_remote_fetch_status_then_cached_copy() {
    let dir = tempfile::tempdir().unwrap();
    // Latin-1 byte 0xE9 must survive the round trip untouched
    let body = b"label,text\nham,Caf\xe9 at noon?\nspam,WIN cash now!!!\n".to_vec();
    let (url, hits) = serve(vec![(404, b"gone".to_vec()), (200, body.clone())]);
    let config = remote_config(dir.path(), &url);
    let loader = DatasetLoader::new(config.clone());

    let err = loader.load(None).unwrap_err();
    assert!(matches!(err, ClassifierError::DatasetUnavailable { .. }));
    assert!(err.to_string().contains("404"));
    assert!(!config.local_data_path.exists());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let dataset = loader.load(None).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(std::fs::read(&config.local_data_path).unwrap(), body);
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.records()[0].text, "Caf\u{e9} at noon?");

    // The local copy now answers without another request
    let again = loader.load(None).unwrap();
    assert_eq!(again, dataset);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_missing_and_corrupt_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let mut classifier = SpamClassifier::new(config.clone());

    assert!(matches!(classifier.load(None), Err(ClassifierError::ArtifactNotFound(_))));

    std::fs::create_dir_all(config.model_path.parent().unwrap()).unwrap();
    std::fs::write(&config.model_path, b"\x00\x01garbage").unwrap();
    let err = classifier.load(None).unwrap_err();
    assert!(matches!(err, ClassifierError::ArtifactCorrupt { .. }));
    assert!(err.is_missing_artifact());
}

#[test]
fn test_batch_without_text_header() {
    let dir = tempfile::tempdir().unwrap();
    let config = with_sample_data(dir.path());
    let dataset = DatasetLoader::new(config.clone()).load(None).unwrap();
    let mut classifier = SpamClassifier::new(config.clone());
    classifier.train(&dataset).unwrap();

    let upload = b"spam,Win a mega discount today\nham,Project meeting moved\n";
    let table = read_inference_csv(upload, &config.text_column).unwrap();
    assert_eq!(table.columns(), ["label", "text"]);

    let scored = run_batch_prediction(&classifier, &table).unwrap();
    assert_eq!(scored.len(), 2);
    assert_eq!(scored[0].text, "Win a mega discount today");
}

#[test]
fn test_workbench_report_flow() {
    let dir = tempfile::tempdir().unwrap();
    let config = with_sample_data(dir.path());
    let mut workbench = Workbench::new(config.clone());

    let dataset = workbench.dataset(None).unwrap();
    let first = workbench.session(&dataset, false).unwrap();
    assert_eq!(first.origin, SessionOrigin::Trained);
    assert!(config.model_path.exists());

    let again = workbench.session(&dataset, false).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let retrained = workbench.session(&dataset, true).unwrap();
    assert!(!Arc::ptr_eq(&first, &retrained));

    let report = EvaluationReport::from_session(&config, &dataset, &retrained).unwrap();
    assert_eq!(report.dataset.rows, 8);
    assert!(report.to_markdown().contains("held-out test split"));
}
