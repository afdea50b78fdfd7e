//! Run lifecycle around the engine: create, review, submit feedback.

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::model::{DeviceInput, KnowledgeBaseEntry, Run, RunStatus, VelocityCategory};
use crate::store::Store;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// A reviewer's decision on one result. `None` fields leave the overlay as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewDecision {
    pub approved_price: Option<u32>,
    pub velocity_override: Option<VelocityCategory>,
    pub note: Option<String>,
    pub accepted: Option<bool>,
}

/// Price a batch with the store's current KB patterns and persist the run.
/// A failed run is still saved, with status `error`.
pub fn create_run<S: Store + ?Sized>(
    store: &S,
    engine: &Engine<'_>,
    name: Option<String>,
    devices: Vec<DeviceInput>,
    seed: u64,
) -> Result<Run> {
    let patterns = store.kb_patterns()?;
    let mut run = Run::new(name, devices);
    run.status = RunStatus::Processing;

    match engine.run(&run.devices, &patterns, seed) {
        Ok(results) => {
            run.results = results;
            run.status = RunStatus::Completed;
            run.completed_at = Some(Utc::now());
            store.save_run(&run)?;
            info!(run = %run.id, name = %run.name, devices = run.devices.len(), "run completed");
            Ok(run)
        }
        Err(e) => {
            run.status = RunStatus::Error;
            store.save_run(&run)?;
            warn!(run = %run.id, error = %e, "run failed");
            Err(e)
        }
    }
}

/// Write the human-review overlay of one result in place.
pub fn apply_review(run: &mut Run, device_id: &str, decision: ReviewDecision) -> Result<()> {
    if run.feedback_submitted {
        return Err(Error::InvalidInput(format!(
            "feedback for run '{}' was already submitted",
            run.id
        )));
    }
    let result = run
        .results
        .iter_mut()
        .find(|r| r.device_id == device_id)
        .ok_or_else(|| Error::NotFound(format!("device '{}' in run '{}'", device_id, run.id)))?;

    if let Some(price) = decision.approved_price {
        result.human_approved_price = Some(price);
    }
    if let Some(v) = decision.velocity_override {
        result.human_velocity_override = Some(v);
    }
    if let Some(note) = decision.note {
        result.human_feedback_note = Some(note);
    }
    if let Some(accepted) = decision.accepted {
        result.is_accepted = Some(accepted);
    }
    result.reviewed_at = Some(Utc::now());
    Ok(())
}

/// KB entries for every result a reviewer approved a price for or accepted.
pub fn feedback_entries(run: &Run, now: DateTime<Utc>) -> Vec<KnowledgeBaseEntry> {
    run.results
        .iter()
        .filter(|r| r.human_approved_price.is_some() || r.is_accepted == Some(true))
        .filter_map(|result| {
            let device = run.device(&result.device_id)?;
            let approved = result.human_approved_price.unwrap_or(result.recommended_price);
            Some(KnowledgeBaseEntry {
                id: uuid::Uuid::new_v4().to_string(),
                brand: device.brand.clone(),
                model: device.model.clone(),
                ram: device.ram.clone(),
                storage: device.storage.clone(),
                condition_tier: device.condition_tier.clone(),
                recommended_price: result.recommended_price,
                human_approved_price: approved,
                delta: approved as i64 - result.recommended_price as i64,
                velocity_category: result.velocity_category,
                human_velocity_override: result.human_velocity_override,
                feedback_note: result.human_feedback_note.clone(),
                run_id: run.id.clone(),
                created_at: now,
            })
        })
        .collect()
}

/// Append the run's feedback to the KB and mark the run as submitted.
/// Returns the number of entries written.
pub fn submit_feedback<S: Store + ?Sized>(store: &S, run: &mut Run) -> Result<usize> {
    if run.feedback_submitted {
        return Err(Error::InvalidInput(format!(
            "feedback for run '{}' was already submitted",
            run.id
        )));
    }
    let entries = feedback_entries(run, Utc::now());
    store.add_kb_entries(&entries)?;
    run.feedback_submitted = true;
    store.save_run(run)?;
    info!(run = %run.id, entries = entries.len(), "feedback submitted");
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketTable;
    use crate::store::MemoryStore;

    fn completed_run(store: &MemoryStore) -> Run {
        let engine = Engine::new(MarketTable::builtin());
        let devices = vec![
            DeviceInput::new("Apple", "iPhone 13"),
            DeviceInput::new("Samsung", "S21"),
            DeviceInput::new("Nokia", "X"),
        ];
        create_run(store, &engine, Some("test".into()), devices, 1).unwrap()
    }

    #[test]
    fn create_run_persists_completed_run() {
        let store = MemoryStore::new();
        let run = completed_run(&store);
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.results.len(), 3);
        assert_eq!(store.get_run(&run.id).unwrap().unwrap(), run);
    }

    #[test]
    fn failed_run_is_saved_with_error_status() {
        let store = MemoryStore::new();
        let engine = Engine::new(MarketTable::builtin());
        let d = DeviceInput::new("Apple", "iPhone 13");
        assert!(create_run(&store, &engine, None, vec![d.clone(), d], 1).is_err());
        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Error);
    }

    #[test]
    fn review_overlay_and_entries() {
        let store = MemoryStore::new();
        let mut run = completed_run(&store);
        let ids: Vec<String> = run.devices.iter().map(|d| d.id.clone()).collect();
        let rec0 = run.results[0].recommended_price;
        let rec1 = run.results[1].recommended_price;

        apply_review(&mut run, &ids[0], ReviewDecision {
            approved_price: Some(rec0 + 1500),
            note: Some("clean unit".into()),
            ..Default::default()
        })
        .unwrap();
        apply_review(&mut run, &ids[1], ReviewDecision { accepted: Some(true), ..Default::default() }).unwrap();
        apply_review(&mut run, &ids[2], ReviewDecision { accepted: Some(false), ..Default::default() }).unwrap();

        // the engine output itself is untouched
        assert_eq!(run.results[0].recommended_price, rec0);

        let entries = feedback_entries(&run, Utc::now());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].delta, 1500);
        assert_eq!(entries[0].feedback_note.as_deref(), Some("clean unit"));
        assert_eq!(entries[1].human_approved_price, rec1);
        assert_eq!(entries[1].delta, 0);
        assert!(entries.iter().all(|e| e.run_id == run.id));
    }

    #[test]
    fn unknown_device_is_not_found() {
        let store = MemoryStore::new();
        let mut run = completed_run(&store);
        let err = apply_review(&mut run, "nope", ReviewDecision::default()).err().unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn submitted_feedback_feeds_next_run() {
        let store = MemoryStore::new();
        let mut run = completed_run(&store);
        let id = run.devices[0].id.clone();
        let rec = run.results[0].recommended_price;
        apply_review(&mut run, &id, ReviewDecision { approved_price: Some(rec + 2000), ..Default::default() }).unwrap();

        assert_eq!(submit_feedback(&store, &mut run).unwrap(), 1);
        assert!(store.get_run(&run.id).unwrap().unwrap().feedback_submitted);
        assert!(submit_feedback(&store, &mut run).is_err());
        assert!(apply_review(&mut run, &id, ReviewDecision::default()).is_err());

        let patterns = store.kb_patterns().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].key, "Apple|iPhone 13|Good");
        assert_eq!(patterns[0].avg_delta, 2000);

        let next = completed_run(&store);
        // 2000 * 0.4 moves the same device up by 800
        assert_eq!(next.results[0].recommended_price, rec + 800);
    }
}
