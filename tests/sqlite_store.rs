//! The review loop against an on-disk SQLite store.

use refurb_pricer::csv_io::read_devices;
use refurb_pricer::model::RunStatus;
use refurb_pricer::runs::{apply_review, create_run, submit_feedback, ReviewDecision};
use refurb_pricer::stats::analytics;
use refurb_pricer::store::{SqliteStore, Store};
use refurb_pricer::{Engine, MarketTable};
use tempfile::TempDir;

const DEVICES_CSV: &str = "\
brand,model,ram_gb,storage_gb,network_type,condition_tier,warranty_months
Apple,iPhone 14,6,128,5G,Excellent,6
Vivo,V23,8,128,4G,Good,3
";

#[test]
fn feedback_survives_reopen_and_shapes_next_run() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("pricer.db");
    let engine = Engine::new(MarketTable::builtin());

    let first_price;
    let run_id;
    {
        let store = SqliteStore::open(&db).unwrap();
        let devices = read_devices(DEVICES_CSV.as_bytes(), 10).unwrap();
        let mut run = create_run(&store, &engine, Some("week 1".into()), devices, 10).unwrap();
        run_id = run.id.clone();
        first_price = run.results[0].recommended_price;

        let device_id = run.devices[0].id.clone();
        apply_review(&mut run, &device_id, ReviewDecision {
            approved_price: Some(first_price + 3000),
            accepted: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(submit_feedback(&store, &mut run).unwrap(), 1);
    }

    let store = SqliteStore::open(&db).unwrap();
    let run = store.get_run(&run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.feedback_submitted);
    assert_eq!(run.results[0].human_approved_price, Some(first_price + 3000));
    assert_eq!(run.results[0].is_accepted, Some(true));

    let patterns = store.kb_patterns().unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].key, "Apple|iPhone 14|Excellent");
    assert_eq!(patterns[0].avg_delta, 3000);

    let devices = read_devices(DEVICES_CSV.as_bytes(), 10).unwrap();
    let next = create_run(&store, &engine, None, devices, 11).unwrap();
    assert!(next.results[0].recommended_price > first_price);
    assert_eq!(store.list_runs().unwrap().len(), 2);

    let summary = analytics(&store.list_runs().unwrap(), &store.kb_entries().unwrap());
    assert_eq!(summary.total_runs, 2);
    assert_eq!(summary.total_devices, 4);
    assert_eq!(summary.kb_entries, 1);
    assert_eq!(summary.acceptance_rate, 0);
    assert_eq!(summary.avg_kb_delta, 3000);
    assert_eq!(summary.brands.len(), 2);
}
