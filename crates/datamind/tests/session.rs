// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use datamind::data_handler::{export_csv, load_csv};
use datamind::{
    DataEngine, DataMindError, DatasetRepository, EngineConfig, ExportFormat, InMemoryRepository,
    OperationKind, OperationRequest, SessionKey, SessionState,
};
use std::sync::Arc;
use std::thread;

const SALES: &str = "Date,Region,Sales,Weight\n\
                     2022-03-01,East,100,10\n\
                     2022-07-01,West,120,12\n\
                     2023-01-15,East,90,\n\
                     2023-02-15,West,200,20\n";

fn key(file: &str) -> SessionKey {
    SessionKey::new("tester", file)
}

#[test]
fn load_replaces_dataset_and_clears_history() {
    let engine = DataEngine::default();
    let k = key("sales.csv");
    engine.load_dataset(&k, SALES.as_bytes()).unwrap();
    let to_kg = OperationRequest::from_json(
        r#"{"operation":"convert_units","column":"Weight","rule":"to_kg"}"#,
    )
    .unwrap();
    engine.apply_operation(&k, &to_kg).unwrap();
    assert_eq!(engine.session_state(&k).unwrap(), SessionState::Modified);
    let reloaded = engine.load_dataset(&k, b"Weight\n1\n").unwrap();
    assert_eq!(reloaded.kind, OperationKind::Load);
    assert_eq!(reloaded.dataset_version, 3);
    assert_eq!(engine.session_state(&k).unwrap(), SessionState::Ready);
    assert!(matches!(engine.revert(&k), Err(DataMindError::NothingToRevert { .. })));
}

#[test]
fn malformed_upload_is_a_parse_error() {
    let engine = DataEngine::default();
    let k = key("broken.csv");
    assert!(matches!(
        engine.load_dataset(&k, b"a,b\n1,2,3\n"),
        Err(DataMindError::Parse(_))
    ));
    assert!(matches!(engine.load_dataset(&k, b""), Err(DataMindError::Parse(_))));
    assert_eq!(engine.session_state(&k).unwrap(), SessionState::Idle);
}

#[test]
fn multi_step_history_reverts_in_order() {
    let engine = DataEngine::default();
    let k = key("sales.csv");
    engine.load_dataset(&k, SALES.as_bytes()).unwrap();
    let original = engine.get_current(&k).unwrap();
    let steps = [
        r#"{"operation":"fill_or_remove_missing","column":"Weight","fill_strategy":"mean"}"#,
        r#"{"operation":"encode_categorical","column":"Region","method":"one_hot"}"#,
        r#"{"operation":"transform_columns","new_column":"Ratio","formula":"Sales / Weight"}"#,
        r#"{"operation":"filter_rows","expression":"Sales > 100"}"#,
    ];
    for json in steps {
        engine
            .apply_operation(&k, &OperationRequest::from_json(json).unwrap())
            .unwrap();
    }
    let kinds: Vec<OperationKind> = engine.history(&k).unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::FillOrRemoveMissing,
            OperationKind::EncodeCategorical,
            OperationKind::TransformColumns,
            OperationKind::FilterRows,
        ]
    );
    assert_eq!(engine.get_current(&k).unwrap().row_count(), 2);
    for _ in 0..steps.len() {
        engine.revert(&k).unwrap();
    }
    assert_eq!(*engine.get_current(&k).unwrap(), *original);
    assert_eq!(engine.current_version(&k).unwrap(), 9);
}

#[test]
fn concurrent_applies_on_one_key_are_serialized() {
    let engine = Arc::new(DataEngine::default());
    let k = key("weights.csv");
    engine.load_dataset(&k, b"Weight\n1000\n").unwrap();
    let request = Arc::new(
        OperationRequest::from_json(r#"{"operation":"convert_units","column":"Weight","rule":"to_meter"}"#)
            .unwrap(),
    );
    let workers = 8;
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let request = Arc::clone(&request);
            let k = k.clone();
            thread::spawn(move || engine.apply_operation(&k, &request).map(|r| r.dataset_version))
        })
        .collect();
    let mut versions: Vec<u64> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (2..2 + workers as u64).collect::<Vec<_>>());
    assert_eq!(engine.history(&k).unwrap().len(), workers);
    let expected = 1000.0 * 0.3048f64.powi(workers as i32);
    let actual = engine.get_current(&k).unwrap().column("Weight").unwrap().f64_values()[0].unwrap();
    assert!((actual - expected).abs() < 1e-9);
}

#[test]
fn independent_keys_do_not_share_state() {
    let engine = Arc::new(DataEngine::default());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let k = key(&format!("file-{i}.csv"));
                engine.load_dataset(&k, format!("Weight\n{i}\n").as_bytes()).unwrap();
                engine
                    .apply_operation(
                        &k,
                        &OperationRequest::from_json(r#"{"operation":"normalize","column":"Weight"}"#)
                            .unwrap(),
                    )
                    .unwrap();
                engine.current_version(&k).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 2);
    }
    assert_eq!(engine.sessions().unwrap().len(), 4);
}

#[test]
fn injected_repository_sees_committed_snapshots() {
    let repository = Arc::new(InMemoryRepository::new());
    let engine = DataEngine::with_repository(EngineConfig::default(), repository.clone());
    let k = key("sales.csv");
    engine.load_dataset(&k, SALES.as_bytes()).unwrap();
    let snapshot = repository.get(&k).unwrap().unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.dataset.row_count(), 4);
    assert!(repository.get(&key("other.csv")).unwrap().is_none());
}

#[test]
fn summary_analysis_and_exports() {
    let engine = DataEngine::default();
    let k = key("sales.csv");
    engine.load_dataset(&k, SALES.as_bytes()).unwrap();
    let summary = engine.summarize(&k).unwrap();
    assert_eq!(summary.summary[0], "The dataset has 4 rows and 4 columns.");
    assert!(summary.trends[0].starts_with("Total Sales increased by 31.82%"));
    assert!(summary.insights[0].starts_with("'West' has the highest total Sales"));
    let trends = engine.trends(&k, "Date", "Sales").unwrap();
    assert_eq!(trends.yearly.len(), 2);
    let report = engine.analyze(&k).unwrap();
    assert_eq!((report.rows, report.columns), (4, 4));
    assert_eq!(report.categorical[0].unique, 2);
    let pdf = engine.export(&k, ExportFormat::Pdf).unwrap();
    assert!(pdf.starts_with(b"%PDF-1.4"));
    let csv = String::from_utf8(engine.export(&k, ExportFormat::Csv).unwrap()).unwrap();
    assert_eq!(csv.lines().next(), Some("Date,Region,Sales,Weight"));
    assert!(csv.contains("2023-01-15,East,90,\n"));
}

#[test]
fn exported_csv_reloads_from_disk() {
    let engine = DataEngine::default();
    let k = key("sales.csv");
    engine.load_dataset(&k, SALES.as_bytes()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales.csv");
    let current = engine.get_current(&k).unwrap();
    export_csv(&current, &path).unwrap();
    let reloaded = load_csv(&path, "sales.csv".to_string()).unwrap();
    assert_eq!(reloaded, *current);
}
